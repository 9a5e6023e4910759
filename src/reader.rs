//! Pull-style iterator over the fields in a block stream, updating a
//! running HMAC as each field's cleartext body is read.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use crate::block_io::BlockInputStream;
use crate::cipher::Cipher;
use crate::error::{Error, Result};
use crate::field::{self, Format, RawField};
use crate::hmac_checksum::HmacChecksum;

/// One-ahead pull iterator: construction preloads the first field, and
/// `next` reads the following field before returning the current one, so
/// the underlying stream always reflects one field of lookahead. `remove`
/// is unsupported.
pub struct RawFieldReader<R, C: Cipher> {
    stream: BlockInputStream<R, C>,
    format: Format,
    hmac: Option<Rc<RefCell<HmacChecksum>>>,
    pending: Option<RawField>,
    closed: bool,
}

impl<R: Read, C: Cipher> RawFieldReader<R, C> {
    pub fn new(mut stream: BlockInputStream<R, C>, format: Format) -> Result<Self> {
        let hmac = stream.hmac();
        let pending = Self::read_and_checksum(&mut stream, format, &hmac)?;
        Ok(RawFieldReader {
            stream,
            format,
            hmac,
            pending,
            closed: false,
        })
    }

    fn read_and_checksum(
        stream: &mut BlockInputStream<R, C>,
        format: Format,
        hmac: &Option<Rc<RefCell<HmacChecksum>>>,
    ) -> Result<Option<RawField>> {
        let next = field::read_field(stream, format)?;
        if let (Some(field), Some(hmac)) = (&next, hmac) {
            hmac.borrow_mut().update(&field.data());
        }
        Ok(next)
    }

    pub fn has_next(&self) -> bool {
        !self.closed && self.pending.is_some()
    }

    pub fn next(&mut self) -> Result<Option<RawField>> {
        if self.closed {
            return Ok(None);
        }
        let current = self.pending.take();
        if current.is_some() {
            self.pending = Self::read_and_checksum(&mut self.stream, self.format, &self.hmac)?;
        }
        Ok(current)
    }

    /// Unsupported: there is no notion of removing a field from the
    /// underlying stream.
    pub fn remove(&mut self) -> Result<()> {
        Err(Error::Unsupported("RawFieldReader::remove".into()))
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.stream.close();
    }

    /// Reclaims the underlying block stream, e.g. to read the V3 trailer
    /// (EOF tag + HMAC) that follows the last field.
    pub fn into_inner(self) -> BlockInputStream<R, C> {
        self.stream
    }
}
