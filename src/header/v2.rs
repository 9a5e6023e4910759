//! V2 file header: the V1 prefix and cipher derivation, followed by three
//! encrypted administration fields (version marker, format version string,
//! user options) ahead of the first record field.

use std::io::{Read, Write};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::block_io::{BlockInputStream, BlockOutputStream};
use crate::cipher::BlowfishCbcCipher;
use crate::error::{Error, Result};
use crate::field::{self, Format, RawField};
use crate::header::v1::{HeaderV1, V2_MARKER_TEXT};

pub struct HeaderV2 {
    pub v1: HeaderV1,
    pub format_version: String,
    pub options: String,
}

/// ISO-8859-1 maps every byte to the identically numbered Unicode code
/// point, so decoding is a direct, lossless cast — no external charset
/// table needed.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

impl HeaderV2 {
    /// Reads the shared V1/V2 prefix, constructs the payload cipher, and
    /// reads the three administration fields. Returns `WrongFileVersion`
    /// if the first field is not the V2 marker literal.
    pub fn open<R: Read>(mut inner: R, passphrase: &[u8]) -> Result<(Self, BlockInputStream<R, BlowfishCbcCipher>)> {
        let v1 = HeaderV1::read_prefix(&mut inner)?;
        let key = v1.file_key(passphrase);
        let cipher = BlowfishCbcCipher::new(&key, &v1.ip_thing)?;
        let mut stream = BlockInputStream::new(inner, cipher);

        let marker = field::read_field(&mut stream, Format::V1V2)?.ok_or(Error::UnexpectedEof)?;
        if std::str::from_utf8(&marker.data()).ok() != Some(V2_MARKER_TEXT) {
            log::debug!("first field is not the V2 marker; deferring to the V1 reader");
            return Err(Error::WrongFileVersion);
        }

        let format_field = field::read_field(&mut stream, Format::V1V2)?.ok_or(Error::UnexpectedEof)?;
        let format_version = String::from_utf8(format_field.data())
            .map_err(|_| Error::InvalidArgument("V2 format version string is not valid UTF-8/ASCII".into()))?;

        let options_field = field::read_field(&mut stream, Format::V1V2)?.ok_or(Error::UnexpectedEof)?;
        let options = decode_latin1(&options_field.data());

        Ok((
            HeaderV2 {
                v1,
                format_version,
                options,
            },
            stream,
        ))
    }

    /// Generates a fresh V1-style prefix and writes it, then the three
    /// administration fields, encrypted, leaving the stream positioned for
    /// the first record field.
    pub fn save<W: Write>(
        passphrase: &[u8],
        format_version: &str,
        options: &str,
        mut inner: W,
    ) -> Result<BlockOutputStream<W, BlowfishCbcCipher>> {
        let mut rand_stuff = [0u8; 8];
        OsRng.fill_bytes(&mut rand_stuff);
        let mut salt = [0u8; 20];
        OsRng.fill_bytes(&mut salt);
        let mut ip_thing = [0u8; 8];
        OsRng.fill_bytes(&mut ip_thing);

        let rand_hash = crate::key::gen_rand_hash(passphrase, &rand_stuff)?;

        inner.write_all(&rand_stuff)?;
        inner.write_all(&rand_hash)?;
        inner.write_all(&salt)?;
        inner.write_all(&ip_thing)?;

        let file_key = crate::key::file_key_v1v2(passphrase, &salt);
        let cipher = BlowfishCbcCipher::new(&file_key, &ip_thing)?;
        let mut stream = BlockOutputStream::new(inner, cipher);

        let marker = RawField::text(0x00, Some(V2_MARKER_TEXT));
        field::write_field(&mut stream, &marker, Format::V1V2, &mut OsRng)?;

        let version_field = RawField::text(0x00, Some(format_version));
        field::write_field(&mut stream, &version_field, Format::V1V2, &mut OsRng)?;

        let options_field = RawField::new(0x00, Some(encode_latin1(options)));
        field::write_field(&mut stream, &options_field, Format::V1V2, &mut OsRng)?;

        Ok(stream)
    }
}
