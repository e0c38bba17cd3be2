//! Fixed-size block layouts for table files.
//!
//! ```text
//! block 0 (meta):  block_id u32 | data_block_count u32 | field_count u32 | descriptors...
//! block n (data):  block_id u32 | record_count u32 | slot[0] u32 | slot[1] u32 | ...
//!                  ... free space ...
//!                  record[n] | ... | record[1] | record[0]
//! ```
//!
//! All integers are big-endian. Slots grow forward from the header, record
//! bodies are bump-allocated backward from the end of the block.

use crate::error::StorageError;
use crate::types::{FieldDescriptor, FIELD_DESCRIPTOR_SIZE};

/// Size of every block in a table or index file.
pub const BLOCK_SIZE: usize = 4096;

/// Meta block header: block id, data block count, field count.
pub const META_HEADER_SIZE: usize = 12;

/// Data block header: block id, record count.
pub const DATA_HEADER_SIZE: usize = 8;

/// One slot offset entry.
pub const SLOT_SIZE: usize = 4;

/// Upper bound on descriptors that fit in the meta block.
pub const MAX_FIELDS: usize = (BLOCK_SIZE - META_HEADER_SIZE) / FIELD_DESCRIPTOR_SIZE;

pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_be_bytes(bytes)
}

pub(crate) fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

/// Decoded contents of block 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    /// Number of data blocks following the meta block
    pub data_block_count: u32,
    /// Field descriptors in declaration order
    pub fields: Vec<FieldDescriptor>,
}

impl TableMeta {
    /// Serialises the meta block into a full block buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        write_u32(&mut buf, 0, 0);
        write_u32(&mut buf, 4, self.data_block_count);
        write_u32(&mut buf, 8, self.fields.len() as u32);
        for (i, field) in self.fields.iter().enumerate() {
            let at = META_HEADER_SIZE + i * FIELD_DESCRIPTOR_SIZE;
            field.encode_into(&mut buf[at..at + FIELD_DESCRIPTOR_SIZE]);
        }
        buf
    }

    /// Parses block 0, failing fast on any inconsistency.
    pub fn decode(table: &str, buf: &[u8]) -> Result<Self, StorageError> {
        let corrupt = |detail: String| StorageError::CorruptMeta {
            table: table.to_string(),
            detail,
        };

        if buf.len() < BLOCK_SIZE {
            return Err(corrupt(format!(
                "meta block is {} bytes, expected {}",
                buf.len(),
                BLOCK_SIZE
            )));
        }
        let block_id = read_u32(buf, 0);
        if block_id != 0 {
            return Err(corrupt(format!("meta block id is {}", block_id)));
        }
        let data_block_count = read_u32(buf, 4);
        let field_count = read_u32(buf, 8) as usize;
        if field_count == 0 || field_count > MAX_FIELDS {
            return Err(corrupt(format!(
                "field count {} outside 1..={}",
                field_count, MAX_FIELDS
            )));
        }

        let mut fields = Vec::with_capacity(field_count);
        for i in 0..field_count {
            let at = META_HEADER_SIZE + i * FIELD_DESCRIPTOR_SIZE;
            let field = FieldDescriptor::decode(&buf[at..at + FIELD_DESCRIPTOR_SIZE])
                .map_err(|e| corrupt(format!("descriptor {}: {}", i, e)))?;
            fields.push(field);
        }

        Ok(Self {
            data_block_count,
            fields,
        })
    }
}

/// A slotted data page.
#[derive(Debug, Clone)]
pub struct DataBlock {
    buf: Vec<u8>,
}

impl DataBlock {
    /// Creates an empty data block.
    pub fn new(block_id: u32) -> Self {
        let mut buf = vec![0u8; BLOCK_SIZE];
        write_u32(&mut buf, 0, block_id);
        Self { buf }
    }

    /// Wraps bytes read from disk; short reads are zero-filled.
    pub fn from_bytes(mut buf: Vec<u8>) -> Self {
        buf.resize(BLOCK_SIZE, 0);
        Self { buf }
    }

    pub fn block_id(&self) -> u32 {
        read_u32(&self.buf, 0)
    }

    pub fn record_count(&self) -> u32 {
        read_u32(&self.buf, 4)
    }

    /// Raw block bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Byte offset of record `index`, if the slot exists.
    pub fn slot(&self, index: usize) -> Option<u32> {
        if index >= self.record_count() as usize {
            return None;
        }
        let at = DATA_HEADER_SIZE + index * SLOT_SIZE;
        if at + SLOT_SIZE > BLOCK_SIZE {
            return None;
        }
        Some(read_u32(&self.buf, at))
    }

    /// Checks that the slot array fits in the block and every slot points
    /// past it.
    pub fn validate(&self, table: &str) -> Result<(), StorageError> {
        let malformed = |detail: String| StorageError::MalformedBlock {
            table: table.to_string(),
            block_id: self.block_id(),
            detail,
        };
        let slot_end = self.slot_end();
        if slot_end > BLOCK_SIZE {
            return Err(malformed(format!(
                "{} slots do not fit in a block",
                self.record_count()
            )));
        }
        for i in 0..self.record_count() as usize {
            let offset = read_u32(&self.buf, DATA_HEADER_SIZE + i * SLOT_SIZE) as usize;
            if offset < slot_end || offset >= BLOCK_SIZE {
                return Err(malformed(format!("slot {} points at {}", i, offset)));
            }
        }
        Ok(())
    }

    fn slot_end(&self) -> usize {
        DATA_HEADER_SIZE + self.record_count() as usize * SLOT_SIZE
    }

    /// Lowest offset occupied by a record body.
    fn lowest_record(&self) -> usize {
        (0..self.record_count() as usize)
            .filter_map(|i| self.slot(i))
            .map(|offset| offset as usize)
            .min()
            .unwrap_or(BLOCK_SIZE)
    }

    /// Bytes between the end of the slot array and the lowest record body.
    pub fn free_space(&self) -> usize {
        self.lowest_record().saturating_sub(self.slot_end())
    }

    /// Whether a record body of `len` bytes plus its slot still fits.
    pub fn can_fit(&self, len: usize) -> bool {
        self.free_space() >= len + SLOT_SIZE
    }

    /// Appends a record body, returning its in-block offset, or `None` when
    /// the block is full.
    pub fn push_record(&mut self, body: &[u8]) -> Option<u32> {
        if !self.can_fit(body.len()) {
            return None;
        }
        let offset = self.lowest_record() - body.len();
        let index = self.record_count() as usize;
        self.buf[offset..offset + body.len()].copy_from_slice(body);
        write_u32(
            &mut self.buf,
            DATA_HEADER_SIZE + index * SLOT_SIZE,
            offset as u32,
        );
        write_u32(&mut self.buf, 4, index as u32 + 1);
        Some(offset as u32)
    }

    /// Record bytes at `offset`, if the range lies inside the block.
    pub fn body(&self, offset: u32, len: usize) -> Option<&[u8]> {
        let start = offset as usize;
        let end = start.checked_add(len)?;
        if end > BLOCK_SIZE {
            return None;
        }
        Some(&self.buf[start..end])
    }
}

/// Records of `record_len` bytes that fit in one empty data block.
pub fn records_per_block(record_len: usize) -> usize {
    (BLOCK_SIZE - DATA_HEADER_SIZE) / (record_len + SLOT_SIZE)
}
