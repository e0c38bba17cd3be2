//! Field descriptor shared by the block store and the index engine.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Bytes reserved for a field name in the meta block.
pub const FIELD_NAME_LEN: usize = 10;

/// Encoded size of one descriptor: name, type tag, length.
pub const FIELD_DESCRIPTOR_SIZE: usize = FIELD_NAME_LEN + 4 + 4;

/// Type tag of a field, stored as a `u32` in the meta block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    FixedString,
    VarString,
    Integer,
    Boolean,
}

impl FieldType {
    /// On-disk tag (0 = str, 1 = varstr, 2 = int, 3 = bool).
    pub fn tag(self) -> u32 {
        match self {
            FieldType::FixedString => 0,
            FieldType::VarString => 1,
            FieldType::Integer => 2,
            FieldType::Boolean => 3,
        }
    }

    /// Decodes an on-disk tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(FieldType::FixedString),
            1 => Some(FieldType::VarString),
            2 => Some(FieldType::Integer),
            3 => Some(FieldType::Boolean),
            _ => None,
        }
    }

    /// Human-readable type name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::FixedString => "STRING",
            FieldType::VarString => "VARSTRING",
            FieldType::Integer => "INTEGER",
            FieldType::Boolean => "BOOLEAN",
        }
    }

    /// Returns true for the two string types.
    pub fn is_text(self) -> bool {
        matches!(self, FieldType::FixedString | FieldType::VarString)
    }
}

/// Field definition within a table.
///
/// # Invariants
///
/// - `name` is non-empty, at most [`FIELD_NAME_LEN`] bytes and contains no `.`
/// - `length` is the number of bytes the encoded value occupies in a record,
///   for every type (integers and booleans are stored as text)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    length: u32,
}

impl FieldDescriptor {
    /// Creates a validated descriptor.
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        length: u32,
    ) -> Result<Self, SchemaError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(SchemaError::InvalidFieldName {
                name,
                reason: "name is empty",
            });
        }
        if name.len() > FIELD_NAME_LEN {
            return Err(SchemaError::InvalidFieldName {
                name,
                reason: "name longer than 10 bytes",
            });
        }
        if name.contains('.') || name.contains(' ') {
            return Err(SchemaError::InvalidFieldName {
                name,
                reason: "name contains '.' or a space",
            });
        }
        if length == 0 {
            return Err(SchemaError::InvalidFieldName {
                name,
                reason: "declared length is zero",
            });
        }
        Ok(Self {
            name,
            field_type,
            length,
        })
    }

    /// Field name without padding.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type tag.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Declared byte width of the encoded value.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Writes the descriptor as `name[10] | type u32 | length u32` (big-endian),
    /// the name space-padded on the left.
    pub(crate) fn encode_into(&self, buf: &mut [u8]) {
        let pad = FIELD_NAME_LEN - self.name.len();
        buf[..pad].fill(b' ');
        buf[pad..FIELD_NAME_LEN].copy_from_slice(self.name.as_bytes());
        buf[FIELD_NAME_LEN..FIELD_NAME_LEN + 4].copy_from_slice(&self.field_type.tag().to_be_bytes());
        buf[FIELD_NAME_LEN + 4..FIELD_DESCRIPTOR_SIZE].copy_from_slice(&self.length.to_be_bytes());
    }

    /// Reads a descriptor written by [`encode_into`](Self::encode_into).
    pub(crate) fn decode(buf: &[u8]) -> Result<Self, String> {
        if buf.len() < FIELD_DESCRIPTOR_SIZE {
            return Err(format!(
                "descriptor needs {} bytes, found {}",
                FIELD_DESCRIPTOR_SIZE,
                buf.len()
            ));
        }
        let name = std::str::from_utf8(&buf[..FIELD_NAME_LEN])
            .map_err(|e| format!("field name is not UTF-8: {}", e))?
            .trim_matches(|c: char| c == ' ' || c == '\0')
            .to_string();
        let tag = u32::from_be_bytes(read4(buf, FIELD_NAME_LEN));
        let field_type =
            FieldType::from_tag(tag).ok_or_else(|| format!("unknown field type tag {}", tag))?;
        let length = u32::from_be_bytes(read4(buf, FIELD_NAME_LEN + 4));
        Self::new(name, field_type, length).map_err(|e| e.to_string())
    }
}

fn read4(buf: &[u8], at: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[at..at + 4]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_layout() {
        let field = FieldDescriptor::new("title", FieldType::VarString, 20).unwrap();
        let mut buf = [0u8; FIELD_DESCRIPTOR_SIZE];
        field.encode_into(&mut buf);
        assert_eq!(&buf[..10], b"     title");
        assert_eq!(&buf[10..14], &1u32.to_be_bytes());
        assert_eq!(&buf[14..18], &20u32.to_be_bytes());
        assert_eq!(FieldDescriptor::decode(&buf).unwrap(), field);
    }

    #[test]
    fn test_name_limits() {
        assert!(FieldDescriptor::new("abcdefghij", FieldType::Integer, 4).is_ok());
        assert!(matches!(
            FieldDescriptor::new("abcdefghijk", FieldType::Integer, 4),
            Err(SchemaError::InvalidFieldName { .. })
        ));
        assert!(FieldDescriptor::new("a.b", FieldType::Integer, 4).is_err());
        assert!(FieldDescriptor::new("", FieldType::Integer, 4).is_err());
        assert!(FieldDescriptor::new("id", FieldType::Integer, 0).is_err());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut buf = [b' '; FIELD_DESCRIPTOR_SIZE];
        buf[8..10].copy_from_slice(b"id");
        buf[10..14].copy_from_slice(&9u32.to_be_bytes());
        buf[14..18].copy_from_slice(&4u32.to_be_bytes());
        assert!(FieldDescriptor::decode(&buf).is_err());
    }
}
