//! Top-level open/write API: tries V3, then V2, then V1 against the same
//! input, and drives the version-appropriate header + field-stream pair.

use std::cell::RefCell;
use std::io::{Chain, Cursor, Read, Write};
use std::rc::Rc;

use crate::cipher::{BlowfishCbcCipher, TwofishCbcCipher};
use crate::error::{Error, Result};
use crate::field::{self, Format, RawField};
use crate::hmac_checksum::HmacChecksum;
use crate::header::{HeaderV1, HeaderV2, HeaderV3};
use crate::reader::RawFieldReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
    V3,
}

pub enum Header {
    V1(HeaderV1),
    V2(HeaderV2),
    V3(HeaderV3),
}

enum InnerReader {
    V1(RawFieldReader<Chain<Cursor<Vec<u8>>, Cursor<Vec<u8>>>, BlowfishCbcCipher>),
    V2(RawFieldReader<Cursor<Vec<u8>>, BlowfishCbcCipher>),
    V3 {
        reader: RawFieldReader<Cursor<Vec<u8>>, TwofishCbcCipher>,
        hmac: Rc<RefCell<HmacChecksum>>,
    },
}

/// A field-stream reader over an opened database, uniform across versions.
pub struct FileReader {
    inner: InnerReader,
}

impl FileReader {
    pub fn has_next(&self) -> bool {
        match &self.inner {
            InnerReader::V1(r) => r.has_next(),
            InnerReader::V2(r) => r.has_next(),
            InnerReader::V3 { reader, .. } => reader.has_next(),
        }
    }

    pub fn next(&mut self) -> Result<Option<RawField>> {
        match &mut self.inner {
            InnerReader::V1(r) => r.next(),
            InnerReader::V2(r) => r.next(),
            InnerReader::V3 { reader, .. } => reader.next(),
        }
    }

    pub fn close(&mut self) {
        match &mut self.inner {
            InnerReader::V1(r) => r.close(),
            InnerReader::V2(r) => r.close(),
            InnerReader::V3 { reader, .. } => reader.close(),
        }
    }

    /// Reclaims the trailing bytes and checks the HMAC for a V3 database.
    /// A no-op for V1/V2, which carry no integrity trailer. Must be called
    /// only after the field stream has been fully drained (`has_next() ==
    /// false`), otherwise the trailer bytes have not been reached yet.
    pub fn finish(self) -> Result<()> {
        match self.inner {
            InnerReader::V3 { reader, hmac } => {
                let stream = reader.into_inner();
                let remainder = stream.into_inner();
                HeaderV3::verify_trailer(remainder, &hmac.borrow())
            }
            _ => Ok(()),
        }
    }
}

pub enum OpenResult {
    Opened {
        version: Version,
        header: Header,
        reader: FileReader,
    },
    WrongPassphrase,
    WrongFormat,
}

fn read_all<R: Read>(mut source: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    source.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Tries V3, then V2, then V1 against the same input. The whole input is
/// buffered once (the format requires reading the entire file to check
/// integrity anyway, and none of the three discrimination attempts can
/// assume a seekable source) and each attempt gets its own fresh cursor
/// over a private copy.
pub fn open<R: Read>(source: R, passphrase: &[u8]) -> Result<OpenResult> {
    let buf = read_all(source)?;

    match HeaderV3::read_prefix(&mut Cursor::new(buf.clone())) {
        Ok(header3) => {
            let remainder_offset = v3_prefix_len();
            let remainder = buf[remainder_offset..].to_vec();
            return match header3.verify_and_open(Cursor::new(remainder), passphrase)? {
                None => Ok(OpenResult::WrongPassphrase),
                Some((stream, hmac)) => {
                    let reader = RawFieldReader::new(stream, Format::V3)?;
                    Ok(OpenResult::Opened {
                        version: Version::V3,
                        header: Header::V3(header3),
                        reader: FileReader {
                            inner: InnerReader::V3 { reader, hmac },
                        },
                    })
                }
            };
        }
        Err(Error::WrongFileVersion) => {}
        Err(e) => return Err(e),
    }

    // Not V3. The V1/V2 prefix is a fixed 56 bytes; anything shorter can't
    // be a Password Safe database at all rather than merely the wrong
    // passphrase, so report it as a format mismatch instead of letting a
    // short read surface as an I/O error.
    const V1V2_PREFIX_LEN: usize = 8 + 20 + 20 + 8;
    if buf.len() < V1V2_PREFIX_LEN {
        return Ok(OpenResult::WrongFormat);
    }

    let v1v2_header = HeaderV1::read_prefix(&mut Cursor::new(buf.clone()))?;
    if !v1v2_header.verify_pass(passphrase)? {
        log::warn!("V1/V2 randHash verification did not match; wrong passphrase");
        return Ok(OpenResult::WrongPassphrase);
    }

    match HeaderV2::open(Cursor::new(buf.clone()), passphrase) {
        Ok((header2, stream)) => {
            let reader = RawFieldReader::new(stream, Format::V1V2)?;
            Ok(OpenResult::Opened {
                version: Version::V2,
                header: Header::V2(header2),
                reader: FileReader {
                    inner: InnerReader::V2(reader),
                },
            })
        }
        Err(Error::WrongFileVersion) => {
            let stream = v1v2_header.open_stream(Cursor::new(buf), passphrase)?;
            let reader = RawFieldReader::new(stream, Format::V1V2)?;
            Ok(OpenResult::Opened {
                version: Version::V1,
                header: Header::V1(v1v2_header),
                reader: FileReader {
                    inner: InnerReader::V1(reader),
                },
            })
        }
        Err(e) => Err(e),
    }
}

/// Byte length of the fixed V3 prefix: `TAG(4) + salt(32) + iter(4) +
/// h(P')(32) + B1..B4(64) + IV(16)`.
fn v3_prefix_len() -> usize {
    4 + 32 + 4 + 32 + 64 + 16
}

/// Writes a V3 database: the prefix, then `header_fields`, then
/// `record_fields`, then the `0xFF` sentinel, the EOF tag, and the trailer
/// HMAC. The record/header boundary is not marked on disk — it is a
/// convention enforced by the external record assembler, not the core.
pub fn write<W: Write>(
    sink: W,
    passphrase: &[u8],
    iter: u32,
    header_fields: &[RawField],
    record_fields: impl Iterator<Item = RawField>,
) -> Result<()> {
    let (mut stream, hmac) = HeaderV3::save(passphrase, iter, sink)?;

    for f in header_fields {
        field::write_field(&mut stream, f, Format::V3, &mut rand::rngs::OsRng)?;
        hmac.borrow_mut().update(&f.data());
    }
    for f in record_fields {
        field::write_field(&mut stream, &f, Format::V3, &mut rand::rngs::OsRng)?;
        hmac.borrow_mut().update(&f.data());
    }
    let sentinel = RawField::new(0xFF, None);
    field::write_field(&mut stream, &sentinel, Format::V3, &mut rand::rngs::OsRng)?;
    hmac.borrow_mut().update(&sentinel.data());

    let mut inner = stream.into_inner();
    inner.write_all(&crate::header::v3::EOF_TAG)?;
    inner.write_all(&hmac.borrow().digest())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_empty_file_round_trip() {
        let mut buf = Vec::new();
        let uuid_field = RawField::new(0x00, Some(vec![0x11; 16]));
        write(&mut buf, b"hello", 2048, &[uuid_field], std::iter::empty()).unwrap();

        let result = open(Cursor::new(buf), b"hello").unwrap();
        match result {
            OpenResult::Opened {
                version,
                header: Header::V3(_),
                mut reader,
            } => {
                assert_eq!(version, Version::V3);
                let uuid = reader.next().unwrap().unwrap();
                assert_eq!(uuid.field_type(), 0x00);
                assert_eq!(uuid.data(), vec![0x11; 16]);
                let sentinel = reader.next().unwrap().unwrap();
                assert_eq!(sentinel.field_type(), 0xFF);
                assert!(reader.next().unwrap().is_none());
                reader.finish().unwrap();
            }
            _ => panic!("expected a successful V3 open"),
        }
    }

    #[test]
    fn v3_one_record_round_trip() {
        let mut buf = Vec::new();
        let uuid_field = RawField::new(0x00, Some(vec![0x22; 16]));
        let record = vec![
            RawField::text(3, Some("Title")),
            RawField::text(4, Some("user")),
            RawField::new(6, Some(b"p@ss".to_vec())),
            RawField::new(0xFF, None),
        ];
        write(&mut buf, b"hello", 2048, &[uuid_field], record.into_iter()).unwrap();

        let result = open(Cursor::new(buf), b"hello").unwrap();
        let mut reader = match result {
            OpenResult::Opened { reader, .. } => reader,
            _ => panic!("expected a successful V3 open"),
        };
        let mut types = Vec::new();
        while let Some(f) = reader.next().unwrap() {
            types.push(f.field_type());
        }
        assert_eq!(types, vec![0x00, 3, 4, 6, 0xFF, 0xFF]);
        reader.finish().unwrap();
    }

    #[test]
    fn wrong_passphrase_is_reported_as_a_value_not_an_error() {
        let mut buf = Vec::new();
        write(&mut buf, b"hello", 2048, &[], std::iter::empty()).unwrap();

        let result = open(Cursor::new(buf), b"goodbye").unwrap();
        assert!(matches!(result, OpenResult::WrongPassphrase));
    }

    #[test]
    fn too_short_to_be_any_version_is_wrong_format() {
        let result = open(Cursor::new(vec![1, 2, 3]), b"hello").unwrap();
        assert!(matches!(result, OpenResult::WrongFormat));
    }

    #[test]
    fn truncated_file_yields_eof_or_checksum_failure() {
        let mut buf = Vec::new();
        let uuid_field = RawField::new(0x00, Some(vec![0x33; 16]));
        write(&mut buf, b"hello", 2048, &[uuid_field], std::iter::empty()).unwrap();
        buf.truncate(buf.len() - 17);

        match open(Cursor::new(buf), b"hello") {
            Err(Error::UnexpectedEof) => {}
            Ok(OpenResult::Opened { mut reader, .. }) => {
                let drain_result = (|| -> Result<()> {
                    while reader.next()?.is_some() {}
                    reader.finish()
                })();
                match drain_result {
                    Err(Error::UnexpectedEof) | Err(Error::ChecksumFailed) => {}
                    other => panic!("expected UnexpectedEof or ChecksumFailed, got {:?}", other.is_ok()),
                }
            }
            other => panic!("expected UnexpectedEof or a recoverable open, got {:?}", other.is_ok()),
        }
    }
}
