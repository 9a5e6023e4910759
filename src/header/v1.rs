//! V1 file header: `randStuff:8 || randHash:20 || salt:20 || ipThing:8`,
//! verified via `genRandHash`, with a Blowfish/CBC payload cipher keyed by
//! `SHA1(passphrase || salt)`.

use std::io::{Chain, Cursor, Read};

use zeroize::Zeroizing;

use crate::block_io::BlockInputStream;
use crate::cipher::BlowfishCbcCipher;
use crate::error::{Error, Result};
use crate::field::{self, Format};
use crate::key;

pub const V2_MARKER_TEXT: &str =
    " !!!Version 2 File Format!!! Please upgrade to PasswordSafe 2.0 or later";

#[derive(Clone)]
pub struct HeaderV1 {
    pub rand_stuff: [u8; 8],
    pub rand_hash: [u8; 20],
    pub salt: [u8; 20],
    pub ip_thing: [u8; 8],
}

/// Records every byte pulled through it, so a probe read against a
/// non-seekable stream can be "undone" by replaying the captured bytes
/// ahead of the stream afterwards.
struct TeeReader<'a, R> {
    inner: &'a mut R,
    captured: Vec<u8>,
}

impl<'a, R: Read> Read for TeeReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.captured.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

impl HeaderV1 {
    pub fn read_prefix<R: Read>(inner: &mut R) -> Result<Self> {
        let mut rand_stuff = [0u8; 8];
        inner.read_exact(&mut rand_stuff)?;
        let mut rand_hash = [0u8; 20];
        inner.read_exact(&mut rand_hash)?;
        let mut salt = [0u8; 20];
        inner.read_exact(&mut salt)?;
        let mut ip_thing = [0u8; 8];
        inner.read_exact(&mut ip_thing)?;
        Ok(HeaderV1 {
            rand_stuff,
            rand_hash,
            salt,
            ip_thing,
        })
    }

    pub fn verify_pass(&self, passphrase: &[u8]) -> Result<bool> {
        let computed = key::gen_rand_hash(passphrase, &self.rand_stuff)?;
        Ok(computed == self.rand_hash)
    }

    pub fn file_key(&self, passphrase: &[u8]) -> Zeroizing<[u8; 20]> {
        key::file_key_v1v2(passphrase, &self.salt)
    }

    /// Builds the V1 payload cipher and block stream, probing for the V2
    /// marker field first. If found, fails with `WrongFileVersion` so the
    /// caller can retry as V2 — without ever mutating the CBC state the
    /// real stream will use: the probe runs over a tee'd copy of `inner`
    /// with its own freshly constructed cipher, and on success the bytes
    /// consumed by the probe are replayed ahead of `inner` for the real
    /// stream.
    pub fn open_stream<R: Read>(
        &self,
        mut inner: R,
        passphrase: &[u8],
    ) -> Result<BlockInputStream<Chain<Cursor<Vec<u8>>, R>, BlowfishCbcCipher>> {
        let key = self.file_key(passphrase);

        let captured = {
            let probe_cipher = BlowfishCbcCipher::new(&key, &self.ip_thing)?;
            let mut tee = TeeReader {
                inner: &mut inner,
                captured: Vec::new(),
            };
            let mut probe_stream = BlockInputStream::new(&mut tee, probe_cipher);
            let field = field::read_field(&mut probe_stream, Format::V1V2)?;
            if let Some(field) = &field {
                if std::str::from_utf8(&field.data()).ok() == Some(V2_MARKER_TEXT) {
                    log::debug!("V1 probe found the V2 marker field; deferring to the V2 reader");
                    return Err(Error::WrongFileVersion);
                }
            }
            tee.captured
        };

        let fresh_cipher = BlowfishCbcCipher::new(&key, &self.ip_thing)?;
        let replay: Chain<Cursor<Vec<u8>>, R> = Cursor::new(captured).chain(inner);
        Ok(BlockInputStream::new(replay, fresh_cipher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_io::BlockOutputStream;
    use crate::field::RawField;
    use rand::rngs::OsRng;
    use rand::RngCore;
    use std::io::Cursor as StdCursor;

    fn make_v1_payload(key: &[u8], iv: &[u8], fields: &[(u8, &[u8])]) -> Vec<u8> {
        let cipher = BlowfishCbcCipher::new(key, iv).unwrap();
        let mut sink = Vec::new();
        let mut out = BlockOutputStream::new(&mut sink, cipher);
        for (t, body) in fields {
            let field = RawField::new(*t, Some(body.to_vec()));
            field::write_field(&mut out, &field, Format::V1V2, &mut OsRng).unwrap();
        }
        sink
    }

    fn make_header(passphrase: &[u8]) -> (HeaderV1, [u8; 20], [u8; 8]) {
        let mut rand_stuff = [0u8; 8];
        OsRng.fill_bytes(&mut rand_stuff);
        let mut salt = [0u8; 20];
        OsRng.fill_bytes(&mut salt);
        let mut ip_thing = [0u8; 8];
        OsRng.fill_bytes(&mut ip_thing);
        let rand_hash = key::gen_rand_hash(passphrase, &rand_stuff).unwrap();
        (
            HeaderV1 {
                rand_stuff,
                rand_hash,
                salt,
                ip_thing,
            },
            salt,
            ip_thing,
        )
    }

    #[test]
    fn verify_pass_accepts_correct_and_rejects_wrong() {
        let (header, _, _) = make_header(b"hello");
        assert!(header.verify_pass(b"hello").unwrap());
        assert!(!header.verify_pass(b"Hello").unwrap());
    }

    #[test]
    fn probing_v2_marker_fails_as_v1_without_losing_data() {
        let (header, salt, ip_thing) = make_header(b"hello");
        let file_key = key::file_key_v1v2(b"hello", &salt);
        let payload = make_v1_payload(
            &file_key,
            &ip_thing,
            &[(0x00, V2_MARKER_TEXT.as_bytes()), (3, b"Title")],
        );

        let err = header.open_stream(StdCursor::new(payload), b"hello").err();
        assert!(matches!(err, Some(Error::WrongFileVersion)));
    }

    #[test]
    fn non_v2_payload_opens_and_replays_first_field() {
        let (header, salt, ip_thing) = make_header(b"hello");
        let file_key = key::file_key_v1v2(b"hello", &salt);
        let payload = make_v1_payload(&file_key, &ip_thing, &[(3, b"Title"), (4, b"user")]);

        let mut stream = header.open_stream(StdCursor::new(payload), b"hello").unwrap();
        let first = field::read_field(&mut stream, Format::V1V2).unwrap().unwrap();
        assert_eq!(first.field_type(), 3);
        assert_eq!(first.data(), b"Title");
        let second = field::read_field(&mut stream, Format::V1V2).unwrap().unwrap();
        assert_eq!(second.data(), b"user");
    }
}
