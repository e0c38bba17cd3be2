//! Table files: fixed 4096-byte blocks holding a meta block and slotted data
//! blocks of fixed-width records.

pub mod block;
pub mod record;
mod store;

pub use block::{records_per_block, DataBlock, TableMeta, BLOCK_SIZE};
pub use record::{Record, RECORD_HEADER_SIZE};
pub use store::{check_definition, table_file, BlockStore, RecordPointer, RecordPosition};
