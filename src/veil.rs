//! Process-local "veil": an in-memory CFB encryption of Raw Field bodies so
//! sensitive cleartext is not held in plaintext between uses.
//!
//! The veil key is process-scope and generated once from the OS RNG; each
//! veiled field gets its own random IV so the same key can be reused across
//! fields. `teardown` best-effort zeroises the key for long-running
//! processes that want to scrub it proactively — Rust gives static values
//! no destructor, so this must be called explicitly rather than relying on
//! process exit.

use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::cipher::{Cipher, TwofishCfbCipher};
use crate::error::Result;

const VEIL_KEY_LEN: usize = 32;
const VEIL_IV_LEN: usize = 16;

static VEIL_KEY: Mutex<Option<[u8; VEIL_KEY_LEN]>> = Mutex::new(None);

fn veil_key() -> [u8; VEIL_KEY_LEN] {
    let mut guard = VEIL_KEY.lock().unwrap();
    if guard.is_none() {
        let mut key = [0u8; VEIL_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        *guard = Some(key);
    }
    guard.unwrap()
}

/// Zeroises the process-local veil key. Any field veiled afterwards gets a
/// freshly generated key; fields veiled before this call remain readable
/// (unveiling re-derives nothing — it uses the key captured at veil time).
pub fn teardown() {
    let mut guard = VEIL_KEY.lock().unwrap();
    if let Some(mut key) = guard.take() {
        key.zeroize();
    }
}

pub fn random_iv() -> [u8; VEIL_IV_LEN] {
    let mut iv = [0u8; VEIL_IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

pub fn veil(iv: &[u8; VEIL_IV_LEN], cleartext: &[u8]) -> Result<Vec<u8>> {
    let key = veil_key();
    let mut cipher = TwofishCfbCipher::new(&key, iv)?;
    let mut buf = cleartext.to_vec();
    cfb_xor(&mut cipher, &mut buf);
    Ok(buf)
}

pub fn unveil(iv: &[u8; VEIL_IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let key = veil_key();
    let mut cipher = TwofishCfbCipher::new(&key, iv)?;
    let mut buf = ciphertext.to_vec();
    cfb_decrypt(&mut cipher, &mut buf);
    Ok(buf)
}

/// CFB operates a block at a time but a veiled field body is rarely an
/// exact multiple of the Twofish block size, so we chunk it ourselves
/// rather than ask `block-modes` to pad (the veil never touches disk, so
/// there is no padding convention to preserve).
fn cfb_xor(cipher: &mut TwofishCfbCipher, buf: &mut [u8]) {
    for chunk in buf.chunks_mut(TwofishCfbCipher::BLOCK_SIZE) {
        let mut block = [0u8; 16];
        block[..chunk.len()].copy_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
}

fn cfb_decrypt(cipher: &mut TwofishCfbCipher, buf: &mut [u8]) {
    for chunk in buf.chunks_mut(TwofishCfbCipher::BLOCK_SIZE) {
        let mut block = [0u8; 16];
        block[..chunk.len()].copy_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
}
