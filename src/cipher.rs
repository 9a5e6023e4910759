//! Block cipher plumbing.
//!
//! Wraps `block-modes`' `Ecb`/`Cbc` wrappers over Blowfish (V1/V2) and
//! Twofish (V3) behind a single small trait so the block I/O layer and the
//! field codec never have to think about `GenericArray`/`BlockMode`
//! directly. CBC instances carry IV state across calls; ECB instances are
//! stateless per block and are reused freely.

use block_modes::block_padding::ZeroPadding;
use block_modes::{BlockMode, Cbc, Ecb};
use blowfish::Blowfish;
use twofish::cipher::generic_array::GenericArray;
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// A keyed block cipher operating one fixed-size block at a time.
///
/// Implementors carry whatever chaining state their mode requires (CBC
/// advances an IV per call; ECB has none). A single instance encrypts *or*
/// decrypts, never both, matching the underlying stream ciphers this is
/// built for (the payload and header-field ciphers in this format are
/// always used in one direction per open file).
pub trait Cipher {
    const BLOCK_SIZE: usize;

    fn encrypt_block(&mut self, block: &mut [u8]);
    fn decrypt_block(&mut self, block: &mut [u8]);
}

macro_rules! mode_cipher {
    ($name:ident, $mode:ty, $block_size:expr) => {
        /// Alongside the `block-modes` wrapper, keeps a zeroising copy of
        /// the key this cipher was constructed with. `block-modes`/
        /// `blowfish`/`twofish` at the pinned versions don't expose the
        /// internal round-key schedule for zeroisation, so this is the key
        /// material we can actually reach; it is wiped on drop regardless
        /// of what the wrapped mode does internally.
        pub struct $name {
            mode: $mode,
            #[allow(dead_code)]
            key_material: Zeroizing<Vec<u8>>,
        }

        impl Cipher for $name {
            const BLOCK_SIZE: usize = $block_size;

            fn encrypt_block(&mut self, block: &mut [u8]) {
                let ga = GenericArray::from_mut_slice(block);
                self.mode.encrypt_blocks(core::slice::from_mut(ga));
            }

            fn decrypt_block(&mut self, block: &mut [u8]) {
                let ga = GenericArray::from_mut_slice(block);
                self.mode.decrypt_blocks(core::slice::from_mut(ga));
            }
        }
    };
}

type BlowfishEcbMode = Ecb<Blowfish, ZeroPadding>;
type BlowfishCbcMode = Cbc<Blowfish, ZeroPadding>;
type TwofishEcbMode = Ecb<Twofish, ZeroPadding>;
type TwofishCbcMode = Cbc<Twofish, ZeroPadding>;

mode_cipher!(BlowfishEcbCipher, BlowfishEcbMode, 8);
mode_cipher!(BlowfishCbcCipher, BlowfishCbcMode, 8);
mode_cipher!(TwofishEcbCipher, TwofishEcbMode, 16);
mode_cipher!(TwofishCbcCipher, TwofishCbcMode, 16);

fn bad_key(what: &str) -> Error {
    Error::InvalidArgument(format!("invalid {} key/iv length", what))
}

impl BlowfishEcbCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = BlowfishEcbMode::new_from_slices(key, &[])
            .map_err(|_| bad_key("Blowfish-ECB"))?;
        Ok(Self {
            mode: cipher,
            key_material: Zeroizing::new(key.to_vec()),
        })
    }
}

impl BlowfishCbcCipher {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        let cipher =
            BlowfishCbcMode::new_from_slices(key, iv).map_err(|_| bad_key("Blowfish-CBC"))?;
        Ok(Self {
            mode: cipher,
            key_material: Zeroizing::new(key.to_vec()),
        })
    }
}

impl TwofishEcbCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher =
            TwofishEcbMode::new_from_slices(key, &[]).map_err(|_| bad_key("Twofish-ECB"))?;
        Ok(Self {
            mode: cipher,
            key_material: Zeroizing::new(key.to_vec()),
        })
    }
}

impl TwofishCbcCipher {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        let cipher =
            TwofishCbcMode::new_from_slices(key, iv).map_err(|_| bad_key("Twofish-CBC"))?;
        Ok(Self {
            mode: cipher,
            key_material: Zeroizing::new(key.to_vec()),
        })
    }
}

/// CFB-over-Twofish used to veil Raw Field bodies in memory (see
/// `crate::veil`). Single-direction like the others: one instance either
/// veils or unveils.
pub type TwofishCfbMode = block_modes::Cfb<Twofish>;
mode_cipher!(TwofishCfbCipher, TwofishCfbMode, 16);

impl TwofishCfbCipher {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        let cipher = TwofishCfbMode::new_from_slices(key, iv).map_err(|_| bad_key("Twofish-CFB"))?;
        Ok(Self {
            mode: cipher,
            key_material: Zeroizing::new(key.to_vec()),
        })
    }
}
