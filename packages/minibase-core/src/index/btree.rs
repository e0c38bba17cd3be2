//! Bulk-loaded B-tree stored one node per block.
//!
//! ```text
//! node header:    node_kind u32 (0 = leaf, 1 = internal) | entry_count u32
//! leaf entry:     key[width] | data_block_id u32 | record_offset u32
//! internal entry: key[width] | child_block_id u32
//! ```
//!
//! Leaves are written first, in key order, at block ids 1..=n. Internal
//! levels follow, each entry carrying the lowest key of its child. Since
//! leaves are contiguous, a search continues into the next block id instead
//! of following sibling pointers.

use std::fs::File;
use std::path::Path;

use crate::error::{DbError, IndexError};
use crate::storage::block::{read_u32, write_u32, BLOCK_SIZE};
use crate::storage::RecordPointer;

use super::key::KeyCodec;
use super::meta::{IndexKind, IndexMeta};
use super::{block_offset, read_at, read_entry, write_at, write_entry, IndexEntry};

const NODE_HEADER_SIZE: usize = 8;
const LEAF: u32 = 0;
const INTERNAL: u32 = 1;

/// Entries per leaf node.
pub fn leaf_capacity(key_width: usize) -> usize {
    (BLOCK_SIZE - NODE_HEADER_SIZE) / (key_width + 8)
}

/// Entries per internal node.
pub fn internal_capacity(key_width: usize) -> usize {
    (BLOCK_SIZE - NODE_HEADER_SIZE) / (key_width + 4)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(Vec<IndexEntry>),
    Internal(Vec<(Vec<u8>, u32)>),
}

impl Node {
    fn encode(&self, width: usize) -> Vec<u8> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        match self {
            Node::Leaf(entries) => {
                write_u32(&mut buf, 0, LEAF);
                write_u32(&mut buf, 4, entries.len() as u32);
                for (i, (key, ptr)) in entries.iter().enumerate() {
                    write_entry(&mut buf, NODE_HEADER_SIZE + i * (width + 8), key, *ptr);
                }
            }
            Node::Internal(children) => {
                write_u32(&mut buf, 0, INTERNAL);
                write_u32(&mut buf, 4, children.len() as u32);
                for (i, (key, child)) in children.iter().enumerate() {
                    let at = NODE_HEADER_SIZE + i * (width + 4);
                    buf[at..at + width].copy_from_slice(key);
                    write_u32(&mut buf, at + width, *child);
                }
            }
        }
        buf
    }

    fn decode(buf: &[u8], width: usize, path: &Path, block_id: u32) -> Result<Self, IndexError> {
        let corrupt = |detail: String| IndexError::Corrupt {
            path: path.display().to_string(),
            detail: format!("node {}: {}", block_id, detail),
        };
        if buf.len() < NODE_HEADER_SIZE {
            return Err(corrupt(format!("read {} bytes", buf.len())));
        }
        let kind = read_u32(buf, 0);
        let count = read_u32(buf, 4) as usize;
        let (entry_size, capacity) = match kind {
            LEAF => (width + 8, leaf_capacity(width)),
            INTERNAL => (width + 4, internal_capacity(width)),
            other => return Err(corrupt(format!("unknown node kind {}", other))),
        };
        if count > capacity {
            return Err(corrupt(format!("{} entries exceed capacity {}", count, capacity)));
        }
        let needed = NODE_HEADER_SIZE + count * entry_size;
        if buf.len() < needed {
            return Err(corrupt(format!(
                "read {} bytes, {} entries need {}",
                buf.len(),
                count,
                needed
            )));
        }

        let at = |i: usize| NODE_HEADER_SIZE + i * entry_size;
        if kind == LEAF {
            Ok(Node::Leaf(
                (0..count).map(|i| read_entry(buf, at(i), width)).collect(),
            ))
        } else {
            Ok(Node::Internal(
                (0..count)
                    .map(|i| (buf[at(i)..at(i) + width].to_vec(), read_u32(buf, at(i) + width)))
                    .collect(),
            ))
        }
    }
}

fn read_node(file: &mut File, path: &Path, block_id: u32, width: usize) -> Result<Node, DbError> {
    let buf = read_at(file, path, block_offset(block_id), BLOCK_SIZE)?;
    Ok(Node::decode(&buf, width, path, block_id)?)
}

/// Sorts `entries` and writes the tree into `file`, meta block last.
pub fn build(
    file: &mut File,
    path: &Path,
    codec: &KeyCodec,
    mut entries: Vec<IndexEntry>,
    field_name: &str,
) -> Result<IndexMeta, DbError> {
    let width = codec.width();
    let mut meta = IndexMeta::empty(IndexKind::BTree, codec.kind(), width, field_name);
    entries.sort_by(|a, b| codec.compare(&a.0, &b.0).then(a.1.cmp(&b.1)));

    if !entries.is_empty() {
        let mut next_id = 1u32;
        let mut level: Vec<(Vec<u8>, u32)> = Vec::new();
        for chunk in entries.chunks(leaf_capacity(width)) {
            let node = Node::Leaf(chunk.to_vec());
            write_at(file, path, block_offset(next_id), &node.encode(width))?;
            level.push((chunk[0].0.clone(), next_id));
            next_id += 1;
        }
        let leaves = level.len();
        let mut level_count = 1u32;

        while level.len() > 1 {
            let mut parents = Vec::new();
            for chunk in level.chunks(internal_capacity(width)) {
                let node = Node::Internal(chunk.to_vec());
                write_at(file, path, block_offset(next_id), &node.encode(width))?;
                parents.push((chunk[0].0.clone(), next_id));
                next_id += 1;
            }
            level = parents;
            level_count += 1;
        }

        meta.data_block_count = next_id - 1;
        meta.has_root = true;
        meta.level_count = level_count;
        meta.root_block_id = level[0].1 as i32;
        tracing::debug!(
            "B-tree {}: {} entries, {} leaves, {} levels",
            path.display(),
            entries.len(),
            leaves,
            level_count
        );
    }

    write_at(file, path, 0, &meta.encode())?;
    Ok(meta)
}

/// Pointers of every entry whose key equals `key`.
///
/// Descends to the leftmost leaf that may hold `key`, then walks forward
/// through consecutive leaves while their last key is not past `key`, for
/// at most `scan_cap` leaves.
pub fn search(
    file: &mut File,
    path: &Path,
    meta: &IndexMeta,
    codec: &KeyCodec,
    key: &[u8],
    scan_cap: usize,
) -> Result<Vec<RecordPointer>, DbError> {
    if !meta.has_root {
        return Ok(Vec::new());
    }
    let width = codec.width();
    let corrupt = |detail: String| IndexError::Corrupt {
        path: path.display().to_string(),
        detail,
    };

    let mut block_id = meta.root_block_id as u32;
    let mut depth = 0u32;
    let mut entries = loop {
        if block_id == 0 || block_id > meta.data_block_count {
            return Err(corrupt(format!("child block {} out of range", block_id)).into());
        }
        match read_node(file, path, block_id, width)? {
            Node::Leaf(entries) => break entries,
            Node::Internal(children) => {
                depth += 1;
                if depth >= meta.level_count.max(1) {
                    return Err(corrupt(format!("descent deeper than {} levels", meta.level_count)).into());
                }
                let child = children
                    .iter()
                    .rposition(|(k, _)| codec.less_than(k, key))
                    .unwrap_or(0);
                block_id = children
                    .get(child)
                    .map(|(_, id)| *id)
                    .ok_or_else(|| corrupt(format!("internal node {} is empty", block_id)))?;
            }
        }
    };

    let mut hits = Vec::new();
    let mut visited = 0usize;
    loop {
        visited += 1;
        hits.extend(
            entries
                .iter()
                .filter(|(k, _)| codec.equal(k, key))
                .map(|(_, ptr)| *ptr),
        );
        let past_key = entries
            .last()
            .map_or(true, |(last, _)| codec.less_than(key, last));
        if past_key || visited >= scan_cap {
            break;
        }
        block_id += 1;
        if block_id > meta.data_block_count {
            break;
        }
        match read_node(file, path, block_id, width)? {
            Node::Leaf(next) => entries = next,
            Node::Internal(_) => break,
        }
    }
    Ok(hits)
}
