//! V3 file header: `"PWS3"` tag, stretched-key verification, Twofish-ECB
//! wrapped master key and HMAC seed, Twofish-CBC payload cipher.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::block_io::{BlockInputStream, BlockOutputStream};
use crate::cipher::{Cipher, TwofishCbcCipher, TwofishEcbCipher};
use crate::error::{Error, Result};
use crate::hmac_checksum::HmacChecksum;
use crate::key;

pub(crate) const TAG: &[u8; 4] = b"PWS3";
pub(crate) const EOF_TAG: [u8; 16] = *b"PWS3-EOFPWS3-EOF";

/// Lowest iteration count accepted when reading; `save` always uses at
/// least this many.
pub const MIN_HASH_ITERATIONS: u32 = 2048;

pub struct HeaderV3 {
    pub salt: [u8; 32],
    pub iter: u32,
    h_p: [u8; 32],
    b1: [u8; 16],
    b2: [u8; 16],
    b3: [u8; 16],
    b4: [u8; 16],
    pub iv: [u8; 16],
}

fn ecb_decrypt_block(cipher: &mut TwofishEcbCipher, block: &[u8; 16]) -> [u8; 16] {
    let mut buf = *block;
    cipher.decrypt_block(&mut buf);
    buf
}

fn ecb_encrypt_block(cipher: &mut TwofishEcbCipher, block: &[u8; 16]) -> [u8; 16] {
    let mut buf = *block;
    cipher.encrypt_block(&mut buf);
    buf
}

impl HeaderV3 {
    pub fn read_prefix<R: Read>(inner: &mut R) -> Result<Self> {
        let mut tag = [0u8; 4];
        inner.read_exact(&mut tag)?;
        if &tag != TAG {
            return Err(Error::WrongFileVersion);
        }
        let mut salt = [0u8; 32];
        inner.read_exact(&mut salt)?;
        let mut iter_bytes = [0u8; 4];
        inner.read_exact(&mut iter_bytes)?;
        let iter = u32::from_le_bytes(iter_bytes);
        let mut h_p = [0u8; 32];
        inner.read_exact(&mut h_p)?;
        let mut b1 = [0u8; 16];
        inner.read_exact(&mut b1)?;
        let mut b2 = [0u8; 16];
        inner.read_exact(&mut b2)?;
        let mut b3 = [0u8; 16];
        inner.read_exact(&mut b3)?;
        let mut b4 = [0u8; 16];
        inner.read_exact(&mut b4)?;
        let mut iv = [0u8; 16];
        inner.read_exact(&mut iv)?;
        Ok(HeaderV3 {
            salt,
            iter,
            h_p,
            b1,
            b2,
            b3,
            b4,
            iv,
        })
    }

    /// Checks the passphrase and, on success, unwraps the master key `K`
    /// and HMAC seed `L`. Returns `None` on a passphrase mismatch rather
    /// than an error — a wrong passphrase is an expected outcome here, not
    /// a structural failure.
    pub fn verify_and_unwrap(
        &self,
        passphrase: &[u8],
    ) -> Result<Option<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>)>> {
        let stretched = key::stretch_key_v3(passphrase, &self.salt, self.iter);
        let mut hasher = Sha256::new();
        hasher.update(&*stretched);
        let computed_h_p = hasher.finalize();
        if computed_h_p.as_slice() != self.h_p {
            log::warn!("V3 stretched-key verification hash did not match; wrong passphrase");
            return Ok(None);
        }

        let mut unwrap_cipher = TwofishEcbCipher::new(&*stretched)?;
        let mut k = Zeroizing::new([0u8; 32]);
        k[..16].copy_from_slice(&ecb_decrypt_block(&mut unwrap_cipher, &self.b1));
        k[16..].copy_from_slice(&ecb_decrypt_block(&mut unwrap_cipher, &self.b2));

        let mut l = Zeroizing::new([0u8; 32]);
        l[..16].copy_from_slice(&ecb_decrypt_block(&mut unwrap_cipher, &self.b3));
        l[16..].copy_from_slice(&ecb_decrypt_block(&mut unwrap_cipher, &self.b4));

        Ok(Some((k, l)))
    }

    /// Verifies the passphrase and, on success, builds the payload block
    /// stream (tagged with the EOF trailer marker) and its associated
    /// HMAC. Returns `None` on a passphrase mismatch.
    pub fn verify_and_open<R: Read>(
        &self,
        inner: R,
        passphrase: &[u8],
    ) -> Result<Option<(BlockInputStream<R, TwofishCbcCipher>, Rc<RefCell<HmacChecksum>>)>> {
        let (k, l) = match self.verify_and_unwrap(passphrase)? {
            None => return Ok(None),
            Some(pair) => pair,
        };

        let payload_cipher = TwofishCbcCipher::new(&k, &self.iv)?;
        let mut stream = BlockInputStream::with_eof_tag(inner, payload_cipher, EOF_TAG);
        let hmac = Rc::new(RefCell::new(HmacChecksum::new(&l)?));
        stream.set_hmac(hmac.clone());
        Ok(Some((stream, hmac)))
    }

    /// Reads and checks the 32-byte trailer HMAC against `hmac`'s digest
    /// over the fields already read. `inner` must be positioned
    /// immediately after the EOF tag, i.e. what `BlockInputStream::into_inner`
    /// returns once the field stream has signalled EOF.
    pub fn verify_trailer<R: Read>(mut inner: R, hmac: &HmacChecksum) -> Result<()> {
        let mut expected = [0u8; 32];
        inner.read_exact(&mut expected)?;
        let result = hmac.verify(&expected);
        if result.is_err() {
            log::warn!("V3 trailer HMAC did not match the computed digest");
        }
        result
    }

    /// Generates fresh random salt/iter/K/L/IV, writes the prefix, and
    /// returns the payload block output stream ready for header and
    /// record fields.
    pub fn save<W: Write>(
        passphrase: &[u8],
        iter: u32,
        mut inner: W,
    ) -> Result<(BlockOutputStream<W, TwofishCbcCipher>, Rc<RefCell<HmacChecksum>>)> {
        let iter = iter.max(MIN_HASH_ITERATIONS);

        let mut salt = [0u8; 32];
        OsRng.fill_bytes(&mut salt);
        let mut k = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *k);
        let mut l = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *l);
        let mut iv = [0u8; 16];
        OsRng.fill_bytes(&mut iv);

        let stretched = key::stretch_key_v3(passphrase, &salt, iter);
        let mut hasher = Sha256::new();
        hasher.update(&*stretched);
        let h_p = hasher.finalize();

        let mut wrap_cipher = TwofishEcbCipher::new(&*stretched)?;
        let mut k1 = Zeroizing::new([0u8; 16]);
        k1.copy_from_slice(&k[..16]);
        let mut k2 = Zeroizing::new([0u8; 16]);
        k2.copy_from_slice(&k[16..]);
        let b1 = ecb_encrypt_block(&mut wrap_cipher, &k1);
        let b2 = ecb_encrypt_block(&mut wrap_cipher, &k2);

        let mut l1 = Zeroizing::new([0u8; 16]);
        l1.copy_from_slice(&l[..16]);
        let mut l2 = Zeroizing::new([0u8; 16]);
        l2.copy_from_slice(&l[16..]);
        let b3 = ecb_encrypt_block(&mut wrap_cipher, &l1);
        let b4 = ecb_encrypt_block(&mut wrap_cipher, &l2);

        inner.write_all(TAG)?;
        inner.write_all(&salt)?;
        inner.write_all(&iter.to_le_bytes())?;
        inner.write_all(&h_p)?;
        inner.write_all(&b1)?;
        inner.write_all(&b2)?;
        inner.write_all(&b3)?;
        inner.write_all(&b4)?;
        inner.write_all(&iv)?;

        let payload_cipher = TwofishCbcCipher::new(&k, &iv)?;
        let stream = BlockOutputStream::new(inner, payload_cipher);
        let hmac = Rc::new(RefCell::new(HmacChecksum::new(&l)?));
        Ok((stream, hmac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{self, Format, RawField};
    use std::io::Cursor;

    fn write_v3(passphrase: &[u8], fields: &[(u8, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        let (mut stream, hmac) = HeaderV3::save(passphrase, MIN_HASH_ITERATIONS, &mut buf).unwrap();
        for (t, body) in fields {
            let field = RawField::new(*t, Some(body.to_vec()));
            field::write_field(&mut stream, &field, Format::V3, &mut OsRng).unwrap();
            hmac.borrow_mut().update(body);
        }
        let sentinel = RawField::new(0xFF, None);
        field::write_field(&mut stream, &sentinel, Format::V3, &mut OsRng).unwrap();
        let mut inner = stream.into_inner();
        inner.write_all(&EOF_TAG).unwrap();
        inner.write_all(&hmac.borrow().digest()).unwrap();
        buf
    }

    #[test]
    fn round_trip_with_matching_hmac() {
        let buf = write_v3(b"hello", &[(0x00, &[0x11; 16]), (3, b"Title")]);

        let mut cursor = Cursor::new(buf);
        let header = HeaderV3::read_prefix(&mut cursor).unwrap();
        let (mut stream, hmac) = header.verify_and_open(cursor, b"hello").unwrap().unwrap();

        let uuid = field::read_field(&mut stream, Format::V3).unwrap().unwrap();
        assert_eq!(uuid.data(), vec![0x11; 16]);
        let title = field::read_field(&mut stream, Format::V3).unwrap().unwrap();
        assert_eq!(title.data(), b"Title");
        hmac.borrow_mut().update(&uuid.data());
        hmac.borrow_mut().update(&title.data());

        let sentinel = field::read_field(&mut stream, Format::V3).unwrap().unwrap();
        assert_eq!(sentinel.field_type(), 0xFF);
        hmac.borrow_mut().update(&sentinel.data());

        assert!(field::read_field(&mut stream, Format::V3).unwrap().is_none());
        let remainder = stream.into_inner();
        HeaderV3::verify_trailer(remainder, &hmac.borrow()).unwrap();
    }

    #[test]
    fn wrong_passphrase_yields_none_not_error() {
        let buf = write_v3(b"hello", &[(0x00, &[0x11; 16])]);
        let mut cursor = Cursor::new(buf);
        let header = HeaderV3::read_prefix(&mut cursor).unwrap();
        let outcome = header.verify_and_open(cursor, b"goodbye").unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn missing_tag_is_wrong_file_version() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"NOPE");
        buf.extend_from_slice(&[0u8; 100]);
        let err = HeaderV3::read_prefix(&mut Cursor::new(buf)).err();
        assert!(matches!(err, Some(Error::WrongFileVersion)));
    }

    #[test]
    fn tampered_trailer_fails_checksum() {
        let mut buf = write_v3(b"hello", &[(3, b"Title")]);
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let mut cursor = Cursor::new(buf);
        let header = HeaderV3::read_prefix(&mut cursor).unwrap();
        let (mut stream, hmac) = header.verify_and_open(cursor, b"hello").unwrap().unwrap();
        while field::read_field(&mut stream, Format::V3).unwrap().is_some() {}
        let remainder = stream.into_inner();
        let result = HeaderV3::verify_trailer(remainder, &hmac.borrow());
        assert!(matches!(result, Err(Error::ChecksumFailed)));
    }
}
