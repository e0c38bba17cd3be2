//! Fixed-width index keys.
//!
//! Integer keys are an `i64` in big-endian order in the first 8 bytes,
//! zero-padded to the key width. Text keys are the UTF-8 bytes truncated or
//! NUL-padded to the key width, so two strings that agree on their first
//! `width` bytes produce the same key.

use std::cmp::Ordering;

use crate::error::IndexError;
use crate::types::{FieldDescriptor, FieldType, Value};

/// How the bytes of a key are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Integer,
    Text,
}

impl KeyKind {
    pub fn tag(self) -> u32 {
        match self {
            KeyKind::Integer => 0,
            KeyKind::Text => 1,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(KeyKind::Integer),
            1 => Some(KeyKind::Text),
            _ => None,
        }
    }

    /// Key kind for an indexable field. Booleans cannot be indexed.
    pub fn for_field(field: &FieldDescriptor) -> Result<Self, IndexError> {
        match field.field_type() {
            FieldType::Integer => Ok(KeyKind::Integer),
            FieldType::FixedString | FieldType::VarString => Ok(KeyKind::Text),
            FieldType::Boolean => Err(IndexError::UnsupportedKeyType {
                field: field.name().to_string(),
                field_type: field.field_type().name(),
            }),
        }
    }

    /// Field type used to parse search literals.
    pub fn literal_type(self) -> FieldType {
        match self {
            KeyKind::Integer => FieldType::Integer,
            KeyKind::Text => FieldType::VarString,
        }
    }
}

/// Encodes and orders keys of one kind and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCodec {
    kind: KeyKind,
    width: usize,
}

impl KeyCodec {
    pub fn new(kind: KeyKind, width: usize) -> Self {
        Self { kind, width }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Encodes `value`, or `None` when its variant does not match the key kind.
    pub fn encode(&self, value: &Value) -> Option<Vec<u8>> {
        let mut key = vec![0u8; self.width];
        match (self.kind, value) {
            (KeyKind::Integer, Value::Integer(n)) => {
                key[..8].copy_from_slice(&n.to_be_bytes());
            }
            (KeyKind::Text, Value::Text(s)) => {
                let bytes = s.trim().as_bytes();
                let len = bytes.len().min(self.width);
                key[..len].copy_from_slice(&bytes[..len]);
            }
            _ => return None,
        }
        Some(key)
    }

    fn integer(key: &[u8]) -> i64 {
        let mut bytes = [0u8; 8];
        let len = key.len().min(8);
        bytes[..len].copy_from_slice(&key[..len]);
        i64::from_be_bytes(bytes)
    }

    fn text(key: &[u8]) -> &[u8] {
        let end = key.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        &key[..end]
    }

    /// Total order matching the build-time sort.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.kind {
            KeyKind::Integer => Self::integer(a).cmp(&Self::integer(b)),
            KeyKind::Text => Self::text(a).cmp(Self::text(b)),
        }
    }

    pub fn equal(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    pub fn less_than(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Bucket of `key` in a table of `bucket_count` buckets.
    pub fn bucket(&self, key: &[u8], bucket_count: usize) -> usize {
        let count = bucket_count.max(1);
        match self.kind {
            KeyKind::Integer => Self::integer(key).rem_euclid(count as i64) as usize,
            KeyKind::Text => crc32fast::hash(Self::text(key)) as usize % count,
        }
    }
}
