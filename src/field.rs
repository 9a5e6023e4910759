//! Raw Field: the type/length/value framing atop the block stream, plus
//! the V3 inline-data header optimisation.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::RngCore;
use std::hash::{Hash, Hasher};
use std::io::{Cursor, Read, Write};
use zeroize::Zeroizing;

use crate::block_io::{BlockInputStream, BlockOutputStream};
use crate::cipher::Cipher;
use crate::error::{Error, Result};
use crate::veil;

/// Which on-disk field framing is in effect. V1 and V2 share one layout;
/// V3 adds the inline-data optimisation in the header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    V1V2,
    V3,
}

impl Format {
    pub fn block_size(self) -> usize {
        match self {
            Format::V1V2 => 8,
            Format::V3 => 16,
        }
    }

    /// Bytes of field data that fit in the header block alongside the
    /// 5-byte `length || type` prefix. Zero for V1/V2, which carries no
    /// inline data.
    pub fn inline_capacity(self) -> usize {
        match self {
            Format::V1V2 => 0,
            Format::V3 => self.block_size() - 5,
        }
    }
}

/// Number of continuation (non-header) blocks a field of `length` bytes
/// occupies. V1/V2 always reserves at least one, even for an empty field;
/// V3 needs none when the body fits entirely inline.
pub(crate) fn continuation_blocks(format: Format, length: usize) -> usize {
    let bs = format.block_size();
    match format {
        Format::V3 => {
            let overflow = length.saturating_sub(format.inline_capacity());
            ceil_div(overflow, bs)
        }
        Format::V1V2 => {
            if length == 0 {
                1
            } else {
                ceil_div(length, bs)
            }
        }
    }
}

fn ceil_div(a: usize, b: usize) -> usize {
    if a == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

#[derive(Clone)]
enum FieldState {
    Clear(Zeroizing<Vec<u8>>),
    Veiled {
        iv: [u8; 16],
        data: Zeroizing<Vec<u8>>,
    },
}

/// A single `(type, length, data)` triple, optionally held "veiled"
/// (encrypted in memory) between uses. Equality and hashing are based on
/// `(type, crc32-of-cleartext)`, not the bytes themselves — two fields with
/// an accidental CRC collision on the same type will compare equal even if
/// their bodies differ (see DESIGN.md).
#[derive(Clone)]
pub struct RawField {
    field_type: u8,
    length: u32,
    crc: u32,
    state: FieldState,
}

impl RawField {
    pub fn new(field_type: u8, data: Option<Vec<u8>>) -> Self {
        Self::from_vec(field_type, data.unwrap_or_default())
    }

    /// Explicit slice constructor: `length` may exceed `data.len() -
    /// start`, in which case the missing tail is zero-filled.
    pub fn from_slice(field_type: u8, data: &[u8], start: usize, length: usize) -> Self {
        let mut buf = vec![0u8; length];
        let available = data.len().saturating_sub(start).min(length);
        buf[..available].copy_from_slice(&data[start..start + available]);
        Self::from_vec(field_type, buf)
    }

    pub fn text(field_type: u8, text: Option<&str>) -> Self {
        Self::new(field_type, text.map(|s| s.as_bytes().to_vec()))
    }

    /// `makeTimeField`: divides by 1000 and writes a little-endian unsigned
    /// integer of `byte_len` bytes (`4..=8`).
    pub fn time(field_type: u8, millis_since_epoch: i64, byte_len: usize) -> Result<Self> {
        if !(4..=8).contains(&byte_len) {
            return Err(Error::InvalidArgument(
                "time field byte length must be between 4 and 8".into(),
            ));
        }
        let secs = (millis_since_epoch / 1000) as u64;
        let full = secs.to_le_bytes();
        Ok(Self::from_vec(field_type, full[..byte_len].to_vec()))
    }

    fn from_vec(field_type: u8, data: Vec<u8>) -> Self {
        let crc = crc32fast::hash(&data);
        let length = data.len() as u32;
        RawField {
            field_type,
            length,
            crc,
            state: FieldState::Clear(Zeroizing::new(data)),
        }
    }

    pub fn field_type(&self) -> u8 {
        self.field_type
    }

    pub fn data_len(&self) -> u32 {
        self.length
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.state, FieldState::Veiled { .. })
    }

    /// Always returns cleartext, decrypting a copy if the field is
    /// currently veiled. Never returns the veiled internal buffer.
    pub fn data(&self) -> Vec<u8> {
        match &self.state {
            FieldState::Clear(data) => data.to_vec(),
            FieldState::Veiled { iv, data } => {
                veil::unveil(iv, data).expect("veil key material is always valid once generated")
            }
        }
    }

    /// Switches the in-memory representation. A no-op if already in the
    /// requested state.
    pub fn set_encrypted(&mut self, encrypted: bool) {
        match (&self.state, encrypted) {
            (FieldState::Clear(_), true) => {
                let iv = veil::random_iv();
                let data = self.data();
                let ciphertext =
                    veil::veil(&iv, &data).expect("veil key material is always valid once generated");
                self.state = FieldState::Veiled {
                    iv,
                    data: Zeroizing::new(ciphertext),
                };
            }
            (FieldState::Veiled { .. }, false) => {
                let cleartext = self.data();
                self.state = FieldState::Clear(Zeroizing::new(cleartext));
            }
            _ => {}
        }
    }

    /// Zeroes the buffer and resets the field to empty.
    pub fn destroy(&mut self) {
        self.state = FieldState::Clear(Zeroizing::new(Vec::new()));
        self.length = 0;
        self.crc = crc32fast::hash(&[]);
    }
}

impl PartialEq for RawField {
    fn eq(&self, other: &Self) -> bool {
        self.field_type == other.field_type && self.crc == other.crc
    }
}

impl Eq for RawField {}

impl Hash for RawField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.field_type.hash(state);
        self.crc.hash(state);
    }
}

impl std::fmt::Debug for RawField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawField")
            .field("field_type", &self.field_type)
            .field("length", &self.length)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

/// Reads one field from the wire. `Ok(None)` signals a clean end of the
/// block stream (no header block at all) — e.g. the V3 EOF trailer tag was
/// just consumed by the underlying `BlockInputStream`. A short read mid-way
/// through a field's continuation blocks is `UnexpectedEof`, not `None`.
pub fn read_field<R: Read, C: Cipher>(
    stream: &mut BlockInputStream<R, C>,
    format: Format,
) -> Result<Option<RawField>> {
    let header = match stream.read_block()? {
        None => return Ok(None),
        Some(header) => header,
    };

    let mut cursor = Cursor::new(&header);
    let raw_len = cursor.read_u32::<LittleEndian>()?;
    let field_type = cursor.read_u8()?;
    // Defensive clamp: a negative-looking length (high bit set) is treated
    // as the largest representable positive length, per spec.
    let length = if raw_len & 0x8000_0000 != 0 {
        i32::MAX as usize
    } else {
        raw_len as usize
    };

    let inline_cap = format.inline_capacity();
    let inline_len = inline_cap.min(length);
    let mut data = Vec::with_capacity(length);
    data.extend_from_slice(&header[5..5 + inline_len]);

    let mut taken = inline_len;
    let bs = format.block_size();
    for _ in 0..continuation_blocks(format, length) {
        let block = stream.read_block()?.ok_or(Error::UnexpectedEof)?;
        let take = (length - taken).min(bs);
        data.extend_from_slice(&block[..take]);
        taken += take;
    }

    Ok(Some(RawField::from_vec(field_type, data)))
}

/// Writes one field to the wire: header block (inlining V3 data), the
/// whole-block middle portion, then a padded final block for any tail.
/// Updates `hmac` (if supplied) with the cleartext body before encryption.
pub fn write_field<W: Write, C: Cipher>(
    stream: &mut BlockOutputStream<W, C>,
    field: &RawField,
    format: Format,
    rng: &mut impl RngCore,
) -> Result<()> {
    let data = field.data();
    let length = data.len();
    let bs = format.block_size();
    let inline_cap = format.inline_capacity();
    let inline_len = inline_cap.min(length);

    let mut header_block = vec![0u8; bs];
    {
        let mut cursor = Cursor::new(&mut header_block[..5]);
        cursor.write_u32::<LittleEndian>(length as u32)?;
        cursor.write_u8(field.field_type())?;
    }
    header_block[5..5 + inline_len].copy_from_slice(&data[..inline_len]);
    rng.fill_bytes(&mut header_block[5 + inline_len..]);
    stream.write_raw_block(&header_block)?;

    let mut taken = inline_len;
    while taken < length {
        let take = (length - taken).min(bs);
        if take == bs {
            stream.write_raw_block(&data[taken..taken + bs])?;
        } else {
            let mut block = vec![0u8; bs];
            block[..take].copy_from_slice(&data[taken..taken + take]);
            rng.fill_bytes(&mut block[take..]);
            stream.write_raw_block(&block)?;
        }
        taken += take;
    }

    if format == Format::V1V2 && length == 0 {
        let mut block = vec![0u8; bs];
        rng.fill_bytes(&mut block);
        stream.write_raw_block(&block)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::TwofishCbcCipher;
    use rand::rngs::OsRng;
    use std::io::Cursor;

    fn round_trip(format: Format, field_type: u8, body: &[u8]) -> RawField {
        let key = [9u8; 32];
        let iv = [8u8; 16];

        let mut sink = Vec::new();
        {
            let cipher = TwofishCbcCipher::new(&key, &iv).unwrap();
            let mut out = BlockOutputStream::new(&mut sink, cipher);
            let field = RawField::new(field_type, Some(body.to_vec()));
            write_field(&mut out, &field, format, &mut OsRng).unwrap();
        }

        let cipher = TwofishCbcCipher::new(&key, &iv).unwrap();
        let mut input = BlockInputStream::new(Cursor::new(sink), cipher);
        read_field(&mut input, format).unwrap().unwrap()
    }

    #[test]
    fn field_round_trip_across_boundary_lengths() {
        for &len in &[0usize, 1, 10, 11, 12, 32, 500] {
            let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let field = round_trip(Format::V3, 0x06, &body);
            assert_eq!(field.field_type(), 0x06);
            assert_eq!(field.data(), body);
        }
    }

    #[test]
    fn field_round_trip_v1v2() {
        for &len in &[0usize, 1, 7, 8, 9, 40] {
            let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let field = round_trip(Format::V1V2, 0x03, &body);
            assert_eq!(field.data(), body);
        }
    }

    #[test]
    fn block_count_law() {
        assert_eq!(continuation_blocks(Format::V3, 0), 0);
        assert_eq!(continuation_blocks(Format::V1V2, 0), 1);
        assert_eq!(continuation_blocks(Format::V3, 5), 0);
        assert_eq!(continuation_blocks(Format::V3, 12), 1);
        assert_eq!(continuation_blocks(Format::V1V2, 5), 1);
    }

    #[test]
    fn equality_follows_type_and_crc() {
        let a = RawField::new(3, Some(b"hello".to_vec()));
        let b = RawField::new(3, Some(b"hello".to_vec()));
        let c = RawField::new(4, Some(b"hello".to_vec()));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut hasher_a = std::collections::hash_map::DefaultHasher::new();
        let mut hasher_b = std::collections::hash_map::DefaultHasher::new();
        a.hash(&mut hasher_a);
        b.hash(&mut hasher_b);
        assert_eq!(
            std::hash::Hasher::finish(&hasher_a),
            std::hash::Hasher::finish(&hasher_b)
        );
    }

    #[test]
    fn veil_transparency() {
        let mut field = RawField::new(6, Some(b"p@ssw0rd".to_vec()));
        let before = field.data();
        field.set_encrypted(true);
        assert!(field.is_encrypted());
        let after = field.data();
        assert_eq!(before, after);

        // The cached CRC was computed on cleartext before veiling.
        assert_eq!(field.crc(), crc32fast::hash(b"p@ssw0rd"));
    }
}
