//! Record codec: packs field values into the fixed-width record body.
//!
//! ```text
//! schema_ptr u32 | content_length u32 | last_update [10] | field_0 | field_1 | ...
//! ```
//!
//! Every field occupies exactly its declared length. Values are stored as
//! text, space-padded on the left.

use crate::error::SchemaError;
use crate::types::{FieldDescriptor, FieldType, Row, Value};

use super::block::{read_u32, write_u32, META_HEADER_SIZE};

/// Length of the `YYYY-MM-DD` update stamp.
pub const DATE_LEN: usize = 10;

/// Record header: schema pointer, content length, update stamp.
pub const RECORD_HEADER_SIZE: usize = 4 + 4 + DATE_LEN;

/// Offset of the field section inside the meta block, stored in every header.
pub const SCHEMA_PTR: u32 = META_HEADER_SIZE as u32;

/// A decoded row together with its update stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Field values in declared order
    pub values: Row,
    /// Date of the last write, `YYYY-MM-DD`
    pub last_update: String,
}

impl Record {
    /// Value of field `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// Sum of all declared field lengths.
pub fn content_length(fields: &[FieldDescriptor]) -> usize {
    fields.iter().map(FieldDescriptor::length).sum()
}

/// Full on-disk width of one record, header included.
pub fn record_length(fields: &[FieldDescriptor]) -> usize {
    RECORD_HEADER_SIZE + content_length(fields)
}

/// Today's date as stored in record headers.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Validates one raw value against its descriptor.
pub fn validate_value(
    table: &str,
    field: &FieldDescriptor,
    raw: &str,
) -> Result<Value, SchemaError> {
    let raw = raw.trim();
    let value =
        Value::parse(field.field_type(), raw).ok_or_else(|| SchemaError::TypeCoercionFailed {
            table: table.to_string(),
            field: field.name().to_string(),
            value: raw.to_string(),
            expected: field.field_type().name(),
        })?;
    let len = value.encoded_text().len();
    if len > field.length() {
        return Err(SchemaError::FieldTooLong {
            table: table.to_string(),
            field: field.name().to_string(),
            len,
            max: field.length(),
        });
    }
    Ok(value)
}

/// Validates a full row of raw values. Nothing is returned unless every
/// value passes.
pub fn validate_values<S: AsRef<str>>(
    table: &str,
    fields: &[FieldDescriptor],
    raw: &[S],
) -> Result<Row, SchemaError> {
    if raw.len() != fields.len() {
        return Err(SchemaError::ArityMismatch {
            table: table.to_string(),
            expected: fields.len(),
            got: raw.len(),
        });
    }
    fields
        .iter()
        .zip(raw)
        .map(|(field, value)| validate_value(table, field, value.as_ref()))
        .collect()
}

/// Encodes a record body (header included).
pub fn encode_record(fields: &[FieldDescriptor], values: &[Value], last_update: &str) -> Vec<u8> {
    let content_len = content_length(fields);
    let mut buf = vec![b' '; RECORD_HEADER_SIZE + content_len];
    write_u32(&mut buf, 0, SCHEMA_PTR);
    write_u32(&mut buf, 4, content_len as u32);
    let stamp = last_update.as_bytes();
    let stamp_len = stamp.len().min(DATE_LEN);
    buf[8..8 + stamp_len].copy_from_slice(&stamp[..stamp_len]);

    let mut at = RECORD_HEADER_SIZE;
    for (field, value) in fields.iter().zip(values) {
        let text = value.encoded_text();
        let bytes = text.as_bytes();
        let width = field.length();
        let used = bytes.len().min(width);
        let start = at + width - used;
        buf[start..at + width].copy_from_slice(&bytes[..used]);
        at += width;
    }
    buf
}

/// Byte range of field `index` inside a record body.
pub fn field_range(fields: &[FieldDescriptor], index: usize) -> (usize, usize) {
    let start = RECORD_HEADER_SIZE
        + fields[..index]
            .iter()
            .map(FieldDescriptor::length)
            .sum::<usize>();
    (start, start + fields[index].length())
}

/// Decodes one stored field.
pub fn decode_field(field: &FieldDescriptor, bytes: &[u8]) -> Result<Value, String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| format!("field '{}' is not UTF-8: {}", field.name(), e))?
        .trim_matches(|c: char| c == ' ' || c == '\0');
    match field.field_type() {
        FieldType::FixedString | FieldType::VarString => Ok(Value::Text(text.to_string())),
        FieldType::Integer | FieldType::Boolean => Value::parse(field.field_type(), text)
            .ok_or_else(|| {
                format!(
                    "field '{}' holds '{}', not a {}",
                    field.name(),
                    text,
                    field.field_type().name()
                )
            }),
    }
}

/// Decodes a record body, checking the stored content length.
pub fn decode_record(fields: &[FieldDescriptor], body: &[u8]) -> Result<Record, String> {
    let expected = record_length(fields);
    if body.len() < expected {
        return Err(format!(
            "record body is {} bytes, expected {}",
            body.len(),
            expected
        ));
    }
    let stored_len = read_u32(body, 4) as usize;
    if stored_len != content_length(fields) {
        return Err(format!(
            "content length {} does not match schema width {}",
            stored_len,
            content_length(fields)
        ));
    }
    let last_update = String::from_utf8_lossy(&body[8..8 + DATE_LEN])
        .trim()
        .to_string();

    let mut values = Vec::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        let (start, end) = field_range(fields, i);
        values.push(decode_field(field, &body[start..end])?);
    }
    Ok(Record {
        values,
        last_update,
    })
}
