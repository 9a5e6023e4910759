//! Fixed-size encrypted block streams over an underlying byte stream.
//!
//! `BlockInputStream` reads with one block of lookahead (for `peek_block`);
//! `BlockOutputStream` zero-pads arbitrary cleartext to a block boundary on
//! write. Neither closes its underlying stream.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::cipher::Cipher;
use crate::error::{Error, Result};
use crate::hmac_checksum::HmacChecksum;

pub struct BlockInputStream<R, C: Cipher> {
    inner: R,
    cipher: C,
    count: u64,
    /// Raw (undecrypted) marker that signals end-of-stream when seen in
    /// place of a field header block — used for the V3 `PWS3-EOF...`
    /// trailer tag, which is written in cleartext immediately after the
    /// last encrypted block.
    eof_tag: Option<[u8; 16]>,
    /// `None` = nothing peeked; `Some(None)` = peeked and it was EOF;
    /// `Some(Some(block))` = a decrypted block is buffered.
    peeked: Option<Option<Vec<u8>>>,
    hmac: Option<Rc<RefCell<HmacChecksum>>>,
    closed: bool,
}

impl<R: Read, C: Cipher> BlockInputStream<R, C> {
    pub fn new(inner: R, cipher: C) -> Self {
        BlockInputStream {
            inner,
            cipher,
            count: 0,
            eof_tag: None,
            peeked: None,
            hmac: None,
            closed: false,
        }
    }

    pub fn with_eof_tag(inner: R, cipher: C, eof_tag: [u8; 16]) -> Self {
        let mut stream = Self::new(inner, cipher);
        stream.eof_tag = Some(eof_tag);
        stream
    }

    pub fn set_hmac(&mut self, hmac: Rc<RefCell<HmacChecksum>>) {
        self.hmac = Some(hmac);
    }

    pub fn hmac(&self) -> Option<Rc<RefCell<HmacChecksum>>> {
        self.hmac.clone()
    }

    pub fn block_size(&self) -> usize {
        C::BLOCK_SIZE
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_available(&mut self) -> Result<bool> {
        Ok(self.peek_block()?.is_some())
    }

    fn fill_raw(&mut self) -> Result<Option<Vec<u8>>> {
        let bs = C::BLOCK_SIZE;
        let mut buf = vec![0u8; bs];
        let mut total = 0;
        while total < bs {
            let n = self.inner.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        if total == 0 {
            Ok(None)
        } else if total < bs {
            Err(Error::UnexpectedEof)
        } else {
            Ok(Some(buf))
        }
    }

    fn advance(&mut self) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(Error::InvalidState("block input stream is closed".into()));
        }
        let raw = match self.fill_raw()? {
            None => return Ok(None),
            Some(raw) => raw,
        };
        if let Some(tag) = &self.eof_tag {
            if raw.as_slice() == &tag[..] {
                return Ok(None);
            }
        }
        let mut block = raw;
        self.cipher.decrypt_block(&mut block);
        self.count += 1;
        Ok(Some(block))
    }

    /// Non-advancing: repeated calls return equal bytes until the next
    /// `read_block`/`read_blocks`.
    pub fn peek_block(&mut self) -> Result<Option<Vec<u8>>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.advance()?);
        }
        Ok(self.peeked.clone().unwrap())
    }

    pub fn read_block(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(peeked) = self.peeked.take() {
            return Ok(peeked);
        }
        self.advance()
    }

    /// Reads `n` consecutive blocks atomically. EOF partway through raises
    /// `UnexpectedEof` rather than returning the blocks already consumed —
    /// callers must request whole semantic units (e.g. a field's full
    /// on-disk span).
    pub fn read_blocks(&mut self, n: usize) -> Result<Option<Vec<u8>>> {
        if n == 0 {
            return Ok(Some(Vec::new()));
        }
        let mut out = Vec::with_capacity(n * C::BLOCK_SIZE);
        for i in 0..n {
            match self.read_block()? {
                Some(block) => out.extend_from_slice(&block),
                None if i == 0 => return Ok(None),
                None => return Err(Error::UnexpectedEof),
            }
        }
        Ok(Some(out))
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Reclaims the underlying byte stream, e.g. to keep reading the
    /// unencrypted trailer bytes that follow the last block.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

pub struct BlockOutputStream<W, C: Cipher> {
    inner: W,
    cipher: C,
    closed: bool,
}

impl<W: Write, C: Cipher> BlockOutputStream<W, C> {
    pub fn new(inner: W, cipher: C) -> Self {
        BlockOutputStream {
            inner,
            cipher,
            closed: false,
        }
    }

    /// Zero-pads `data` to a multiple of the block size, encrypts, and
    /// writes it.
    pub fn write_blocks(&mut self, data: &[u8]) -> Result<()> {
        let bs = C::BLOCK_SIZE;
        let mut i = 0;
        while i < data.len() {
            let end = (i + bs).min(data.len());
            let mut block = vec![0u8; bs];
            block[..end - i].copy_from_slice(&data[i..end]);
            self.write_raw_block(&block)?;
            i += bs;
        }
        Ok(())
    }

    /// Encrypts and writes exactly one already block-sized buffer, with no
    /// padding applied. Used by the field codec, which builds each block's
    /// trailing bytes itself (inline header data, random padding).
    pub fn write_raw_block(&mut self, block: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidState("block output stream is closed".into()));
        }
        debug_assert_eq!(block.len(), C::BLOCK_SIZE);
        let mut buf = block.to_vec();
        self.cipher.encrypt_block(&mut buf);
        self.inner.write_all(&buf)?;
        Ok(())
    }

    /// No-op on the underlying sink (never closed by us); only marks this
    /// stream terminal.
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
