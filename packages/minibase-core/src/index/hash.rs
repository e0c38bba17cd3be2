//! Static hash index.
//!
//! Block 1 starts a table of `bucket_count` absolute file offsets (0 for an
//! empty bucket). Each non-empty bucket follows as `count u32` and `count`
//! entries of `key[width] | data_block_id u32 | record_offset u32`.

use std::fs::File;
use std::path::Path;

use crate::error::{DbError, IndexError};
use crate::storage::block::{read_u32, write_u32, BLOCK_SIZE};
use crate::storage::RecordPointer;

use super::key::KeyCodec;
use super::meta::{IndexKind, IndexMeta};
use super::{read_at, read_entry, write_at, write_entry, IndexEntry};

const POINTER_TABLE: u64 = BLOCK_SIZE as u64;

/// Distributes `entries` over `bucket_count` buckets and writes the file,
/// meta block last.
pub fn build(
    file: &mut File,
    path: &Path,
    codec: &KeyCodec,
    entries: Vec<IndexEntry>,
    bucket_count: usize,
    field_name: &str,
) -> Result<IndexMeta, DbError> {
    let width = codec.width();
    let entry_size = width + 8;
    let mut meta = IndexMeta::empty(IndexKind::Hash, codec.kind(), width, field_name);
    meta.bucket_count = bucket_count as u32;

    let total = entries.len();
    let mut buckets: Vec<Vec<IndexEntry>> = vec![Vec::new(); bucket_count];
    for entry in entries {
        let bucket = codec.bucket(&entry.0, bucket_count);
        buckets[bucket].push(entry);
    }

    let payload_start = POINTER_TABLE as usize + 4 * bucket_count;
    let mut table = vec![0u8; 4 * bucket_count];
    let mut payload = Vec::new();
    for (i, bucket) in buckets.iter().enumerate() {
        if bucket.is_empty() {
            continue;
        }
        let at = bucket_offset(path, payload_start + payload.len())?;
        write_u32(&mut table, i * 4, at);

        let start = payload.len();
        payload.resize(start + 4 + bucket.len() * entry_size, 0);
        write_u32(&mut payload, start, bucket.len() as u32);
        for (j, (key, ptr)) in bucket.iter().enumerate() {
            write_entry(&mut payload, start + 4 + j * entry_size, key, *ptr);
        }
    }

    write_at(file, path, POINTER_TABLE, &table)?;
    write_at(file, path, payload_start as u64, &payload)?;

    let body = table.len() + payload.len();
    meta.data_block_count = body.div_ceil(BLOCK_SIZE) as u32;
    if total > 0 {
        meta.has_root = true;
        meta.level_count = 1;
        meta.root_block_id = 1;
    }
    write_at(file, path, 0, &meta.encode())?;

    tracing::debug!(
        "Hash index {}: {} entries in {} of {} buckets",
        path.display(),
        total,
        buckets.iter().filter(|b| !b.is_empty()).count(),
        bucket_count
    );
    Ok(meta)
}

/// File offset of a bucket as stored in the pointer table.
fn bucket_offset(path: &Path, at: usize) -> Result<u32, IndexError> {
    u32::try_from(at).map_err(|_| IndexError::TooLarge {
        path: path.display().to_string(),
        detail: format!("bucket offset {} exceeds u32", at),
    })
}

/// Pointers of every entry in `key`'s bucket whose key equals `key`.
pub fn search(
    file: &mut File,
    path: &Path,
    meta: &IndexMeta,
    codec: &KeyCodec,
    key: &[u8],
) -> Result<Vec<RecordPointer>, DbError> {
    if !meta.has_root {
        return Ok(Vec::new());
    }
    let corrupt = |detail: String| IndexError::Corrupt {
        path: path.display().to_string(),
        detail,
    };
    let bucket_count = meta.bucket_count as usize;
    if bucket_count == 0 {
        return Err(corrupt("bucket count is zero".to_string()).into());
    }
    let bucket = codec.bucket(key, bucket_count);

    let ptr = read_at(file, path, POINTER_TABLE + 4 * bucket as u64, 4)?;
    if ptr.len() < 4 {
        return Err(corrupt(format!("pointer for bucket {} is truncated", bucket)).into());
    }
    let ptr = read_u32(&ptr, 0) as u64;
    if ptr == 0 {
        return Ok(Vec::new());
    }

    let count = read_at(file, path, ptr, 4)?;
    if count.len() < 4 {
        return Err(corrupt(format!("bucket {} header is truncated", bucket)).into());
    }
    let count = read_u32(&count, 0) as usize;
    let entry_size = codec.width() + 8;
    let needed = count
        .checked_mul(entry_size)
        .ok_or_else(|| corrupt(format!("bucket {} claims {} entries", bucket, count)))?;
    let body = read_at(file, path, ptr + 4, needed)?;
    if body.len() < needed {
        return Err(corrupt(format!(
            "bucket {} holds {} of {} entry bytes",
            bucket,
            body.len(),
            needed
        ))
        .into());
    }

    Ok((0..count)
        .map(|i| read_entry(&body, i * entry_size, codec.width()))
        .filter(|(k, _)| codec.equal(k, key))
        .map(|(_, ptr)| ptr)
        .collect())
}
