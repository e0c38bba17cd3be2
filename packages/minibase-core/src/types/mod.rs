//! Field descriptors and the in-memory value representation.

mod field;
mod value;

pub use field::{FieldDescriptor, FieldType, FIELD_DESCRIPTOR_SIZE, FIELD_NAME_LEN};
pub use value::Value;

/// One logical row: field values in declared order.
pub type Row = Vec<Value>;
