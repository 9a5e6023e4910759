//! Unique-by-type collections of Raw Fields.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::field::RawField;

/// Mapping from `type` to one `RawField`; inserting a type that is already
/// present replaces the previous field. Iteration order is unspecified.
#[derive(Default)]
pub struct RawFieldList {
    fields: HashMap<u8, RawField>,
}

impl RawFieldList {
    pub fn new() -> Self {
        RawFieldList {
            fields: HashMap::new(),
        }
    }

    pub fn insert(&mut self, field: RawField) -> Option<RawField> {
        self.fields.insert(field.field_type(), field)
    }

    pub fn get(&self, field_type: u8) -> Option<&RawField> {
        self.fields.get(&field_type)
    }

    pub fn remove(&mut self, field_type: u8) -> Option<RawField> {
        self.fields.remove(&field_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawField> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// End-of-list marker on disk: forbidden as a content type in a Header
/// Field List.
pub const END_OF_LIST: u8 = 0xFF;

/// Standard V3 header field types plus one reserved extension type.
const CANONICAL_HEADER_TYPES: &[u8] = &[
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0f, 0x10, 0x11, 0x12,
    0x13, 0x14,
];

/// A `RawFieldList` restricted to canonical V3 header-field types, shared
/// as a long-lived mutable collection and therefore internally
/// synchronised: every mutating or iterating method acquires an exclusive
/// lock for the duration of the call.
#[derive(Default)]
pub struct HeaderFieldList {
    inner: Mutex<RawFieldList>,
}

impl HeaderFieldList {
    pub fn new() -> Self {
        HeaderFieldList {
            inner: Mutex::new(RawFieldList::new()),
        }
    }

    pub fn is_canonical(field_type: u8) -> bool {
        CANONICAL_HEADER_TYPES.contains(&field_type)
    }

    pub fn insert(&self, field: RawField) -> Result<Option<RawField>> {
        if field.field_type() == END_OF_LIST {
            return Err(Error::InvalidArgument(
                "0xFF is the header end-of-list marker, not a content type".into(),
            ));
        }
        Ok(self.inner.lock().unwrap().insert(field))
    }

    pub fn get(&self, field_type: u8) -> Option<RawField> {
        self.inner.lock().unwrap().get(field_type).cloned()
    }

    pub fn remove(&self, field_type: u8) -> Option<RawField> {
        self.inner.lock().unwrap().remove(field_type)
    }

    pub fn snapshot(&self) -> Vec<RawField> {
        self.inner.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
