//! Password Safe file format reader and writer.
//!
//! This crate reads and writes Password Safe database files in the V1, V2
//! and V3 on-disk formats. It does not impose any internal database
//! representation and can be used to write converters or integrate
//! import/export functionality into existing password managers.
//!
//! Neither reader nor writer require `std::io::Seek` from the underlying
//! reader or writer. That is because by design the Password Safe database
//! does not allow random access: blocks are encrypted in CBC mode and
//! checking the database integrity requires reading the whole file. On the
//! other hand, the database must be rekeyed after each modification, so the
//! whole file must be rewritten from scratch.
//!
//! `open` tries V3, then V2, then V1 in turn and reports a wrong passphrase
//! as a value, not an error. `write` only produces V3 databases — the
//! legacy formats are read-only here, matching upstream PasswordSafe's own
//! policy of never writing V1 or V2 files.
//!
//! The record model — which typed fields make up a logical record — is out
//! of scope: this crate hands back a flat stream of [`field::RawField`]s and
//! lets the caller group them.

pub mod block_io;
pub mod cipher;
mod error;
pub mod field;
mod field_list;
mod file;
pub mod header;
mod hmac_checksum;
pub mod key;
mod reader;
pub mod veil;

pub use crate::error::{Error, Result};
pub use crate::field::{Format, RawField};
pub use crate::field_list::{HeaderFieldList, RawFieldList, END_OF_LIST};
pub use crate::file::{open, write, FileReader, Header, OpenResult, Version};
pub use crate::header::{HeaderV1, HeaderV2, HeaderV3};
pub use crate::hmac_checksum::HmacChecksum;
pub use crate::reader::RawFieldReader;
