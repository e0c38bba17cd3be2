//! Index meta block (block 0 of `.ind` and `.hash` files).
//!
//! ```text
//! 0   data_block_count u32
//! 4   has_root         u8
//! 5   level_count      u32
//! 9   root_block_id    i32   (-1 when empty)
//! 13  index_kind       u32   (0 = btree, 1 = hash)
//! 17  key_width        u32
//! 21  bucket_count     u32
//! 25  key_kind         u32
//! 29  field_name       [10]  space-padded on the left
//! ```

use crate::config::{MAX_KEY_WIDTH, MIN_KEY_WIDTH};
use crate::error::IndexError;
use crate::storage::block::{read_u32, write_u32, BLOCK_SIZE};
use crate::types::FIELD_NAME_LEN;

use super::key::KeyKind;

const META_LEN: usize = 29 + FIELD_NAME_LEN;

/// Index structure stored in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    BTree,
    Hash,
}

impl IndexKind {
    pub fn tag(self) -> u32 {
        match self {
            IndexKind::BTree => 0,
            IndexKind::Hash => 1,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(IndexKind::BTree),
            1 => Some(IndexKind::Hash),
            _ => None,
        }
    }

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            IndexKind::BTree => "ind",
            IndexKind::Hash => "hash",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IndexKind::BTree => "btree",
            IndexKind::Hash => "hash",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub data_block_count: u32,
    pub has_root: bool,
    /// Tree height including the leaf level; 0 for hash and empty indexes
    pub level_count: u32,
    pub root_block_id: i32,
    pub kind: IndexKind,
    pub key_width: u32,
    pub bucket_count: u32,
    pub key_kind: KeyKind,
    pub field_name: String,
}

impl IndexMeta {
    /// Meta of an index with no entries.
    pub fn empty(kind: IndexKind, key_kind: KeyKind, key_width: usize, field_name: &str) -> Self {
        Self {
            data_block_count: 0,
            has_root: false,
            level_count: 0,
            root_block_id: -1,
            kind,
            key_width: key_width as u32,
            bucket_count: 0,
            key_kind,
            field_name: field_name.to_string(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        write_u32(&mut buf, 0, self.data_block_count);
        buf[4] = u8::from(self.has_root);
        write_u32(&mut buf, 5, self.level_count);
        buf[9..13].copy_from_slice(&self.root_block_id.to_be_bytes());
        write_u32(&mut buf, 13, self.kind.tag());
        write_u32(&mut buf, 17, self.key_width);
        write_u32(&mut buf, 21, self.bucket_count);
        write_u32(&mut buf, 25, self.key_kind.tag());
        let name = self.field_name.as_bytes();
        let len = name.len().min(FIELD_NAME_LEN);
        let pad = FIELD_NAME_LEN - len;
        buf[29..29 + pad].fill(b' ');
        buf[29 + pad..META_LEN].copy_from_slice(&name[..len]);
        buf
    }

    pub fn decode(path: &str, buf: &[u8]) -> Result<Self, IndexError> {
        let corrupt = |detail: String| IndexError::Corrupt {
            path: path.to_string(),
            detail,
        };
        if buf.len() < META_LEN {
            return Err(corrupt(format!(
                "meta block is {} bytes, expected at least {}",
                buf.len(),
                META_LEN
            )));
        }
        let has_root = match buf[4] {
            0 => false,
            1 => true,
            other => return Err(corrupt(format!("has_root byte is {}", other))),
        };
        let mut root = [0u8; 4];
        root.copy_from_slice(&buf[9..13]);
        let kind_tag = read_u32(buf, 13);
        let kind = IndexKind::from_tag(kind_tag)
            .ok_or_else(|| corrupt(format!("unknown index kind {}", kind_tag)))?;
        let key_tag = read_u32(buf, 25);
        let key_kind = KeyKind::from_tag(key_tag)
            .ok_or_else(|| corrupt(format!("unknown key kind {}", key_tag)))?;
        let field_name = std::str::from_utf8(&buf[29..META_LEN])
            .map_err(|e| corrupt(format!("field name is not UTF-8: {}", e)))?
            .trim_matches(|c: char| c == ' ' || c == '\0')
            .to_string();

        let meta = Self {
            data_block_count: read_u32(buf, 0),
            has_root,
            level_count: read_u32(buf, 5),
            root_block_id: i32::from_be_bytes(root),
            kind,
            key_width: read_u32(buf, 17),
            bucket_count: read_u32(buf, 21),
            key_kind,
            field_name,
        };
        let width = meta.key_width as usize;
        if !(MIN_KEY_WIDTH..=MAX_KEY_WIDTH).contains(&width) {
            return Err(corrupt(format!(
                "key width {} outside {}..={}",
                width, MIN_KEY_WIDTH, MAX_KEY_WIDTH
            )));
        }
        if meta.has_root && meta.root_block_id < 1 {
            return Err(corrupt(format!(
                "has_root set but root block is {}",
                meta.root_block_id
            )));
        }
        Ok(meta)
    }
}
