//! RFC-2104 HMAC-SHA256, used as the running integrity checksum over every
//! cleartext field body in a V3 database.
//!
//! Delegates the actual `ipad`/`opad` bookkeeping to the `hmac` crate (no
//! reason to reimplement RFC 2104 by hand) and adds the one thing that
//! crate doesn't give us: a memoized `digest()` so repeated calls (e.g. one
//! from `RawFieldReader` bookkeeping and one from the final `verify`) don't
//! redo the `opad || d1` rehash.

use hmac::{Hmac, Mac, NewMac};
use sha2::Sha256;
use std::cell::RefCell;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct HmacChecksum {
    inner: Hmac<Sha256>,
    // Cleared on every `update`; `RefCell` lets `digest()` memoize through
    // a `&self` receiver, matching how callers use it (read-only after the
    // field stream is exhausted).
    digest: RefCell<Option<[u8; 32]>>,
}

impl HmacChecksum {
    /// `key` is zero-extended to the SHA-256 block size (64 bytes) if
    /// shorter; longer keys are rejected rather than hashed down, per the
    /// file format's seed (`L`) being fixed at 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() > 64 {
            return Err(Error::InvalidArgument(
                "HMAC key longer than the SHA-256 block size".into(),
            ));
        }
        let inner = Hmac::<Sha256>::new_from_slice(key)
            .map_err(|_| Error::InvalidArgument("invalid HMAC key".into()))?;
        Ok(HmacChecksum {
            inner,
            digest: RefCell::new(None),
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        *self.digest.borrow_mut() = None;
    }

    pub fn digest(&self) -> [u8; 32] {
        if let Some(d) = *self.digest.borrow() {
            return d;
        }
        let bytes = self.inner.clone().finalize().into_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        *self.digest.borrow_mut() = Some(out);
        out
    }

    pub fn verify(&self, expected: &[u8]) -> Result<()> {
        self.inner
            .clone()
            .verify(expected)
            .map_err(|_| Error::ChecksumFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_update_matches_single_shot() {
        let msg = b"the quick brown fox jumps over the lazy dog, many times over";
        let key = b"0123456789abcdef0123456789abcdef";

        let mut whole = HmacChecksum::new(key).unwrap();
        whole.update(msg);

        let mut chunked = HmacChecksum::new(key).unwrap();
        for chunk in msg.chunks(7) {
            chunked.update(chunk);
        }

        assert_eq!(whole.digest(), chunked.digest());
    }

    #[test]
    fn clone_deep_copies_state() {
        let mut a = HmacChecksum::new(b"key").unwrap();
        a.update(b"hello");
        let digest_a = a.digest();

        let b = a.clone();
        assert_eq!(b.digest(), digest_a);

        a.update(b" world");
        assert_ne!(a.digest(), digest_a);
        // `b` must not have observed the mutation made to `a` after cloning.
        assert_eq!(b.digest(), digest_a);
    }

    #[test]
    fn rejects_overlong_key() {
        let key = vec![0u8; 65];
        assert!(HmacChecksum::new(&key).is_err());
    }
}
