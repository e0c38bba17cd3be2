//! Mutation notification sinks.
//!
//! Every insert, update and delete (and table create/drop at the
//! [`Database`](crate::database::Database) level) is narrated to a
//! [`MutationSink`]: `begin`, `before_image`, `after_image`, `commit`.
//! The sink records what happened; it is not used for recovery.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{classify_io_error, DbError, StorageError};
use crate::types::Value;

/// Identifier handed out by [`MutationSink::begin`].
pub type TxId = u64;

/// Kind of mutation being narrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateTable,
    DropTable,
    Insert,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::CreateTable => "CREATE_TABLE",
            MutationKind::DropTable => "DROP_TABLE",
            MutationKind::Insert => "INSERT",
            MutationKind::Update => "UPDATE",
            MutationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of before/after images for each mutation.
///
/// `None` images mean "no row" (the before image of an insert, the after
/// image of a delete).
pub trait MutationSink: Send + Sync + fmt::Debug {
    /// Opens a transaction and returns its id.
    fn begin(&self, kind: MutationKind, table: &str) -> Result<TxId, DbError>;

    fn before_image(
        &self,
        tx: TxId,
        kind: MutationKind,
        table: &str,
        row: Option<&[Value]>,
    ) -> Result<(), DbError>;

    fn after_image(
        &self,
        tx: TxId,
        kind: MutationKind,
        table: &str,
        row: Option<&[Value]>,
    ) -> Result<(), DbError>;

    fn commit(&self, tx: TxId, kind: MutationKind, table: &str) -> Result<(), DbError>;
}

/// Renders an image as `[v1, v2]`, or `NULL`.
pub fn format_image(row: Option<&[Value]>) -> String {
    match row {
        None => "NULL".to_string(),
        Some(values) => {
            let items: Vec<String> = values.iter().map(|v| v.to_string().trim().to_string()).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

/// Sink that discards every notification.
#[derive(Debug, Default)]
pub struct NoopSink {
    next_tx: AtomicU64,
}

impl MutationSink for NoopSink {
    fn begin(&self, _kind: MutationKind, _table: &str) -> Result<TxId, DbError> {
        Ok(self.next_tx.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn before_image(
        &self,
        _tx: TxId,
        _kind: MutationKind,
        _table: &str,
        _row: Option<&[Value]>,
    ) -> Result<(), DbError> {
        Ok(())
    }

    fn after_image(
        &self,
        _tx: TxId,
        _kind: MutationKind,
        _table: &str,
        _row: Option<&[Value]>,
    ) -> Result<(), DbError> {
        Ok(())
    }

    fn commit(&self, _tx: TxId, _kind: MutationKind, _table: &str) -> Result<(), DbError> {
        Ok(())
    }
}

/// Sink that emits each notification as a `tracing` event.
#[derive(Debug, Default)]
pub struct TracingSink {
    next_tx: AtomicU64,
}

impl MutationSink for TracingSink {
    fn begin(&self, kind: MutationKind, table: &str) -> Result<TxId, DbError> {
        let tx = self.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(tx_id = tx, operation = %kind, table, "transaction active");
        Ok(tx)
    }

    fn before_image(
        &self,
        tx: TxId,
        kind: MutationKind,
        table: &str,
        row: Option<&[Value]>,
    ) -> Result<(), DbError> {
        tracing::info!(tx_id = tx, operation = %kind, table, before = %format_image(row));
        Ok(())
    }

    fn after_image(
        &self,
        tx: TxId,
        kind: MutationKind,
        table: &str,
        row: Option<&[Value]>,
    ) -> Result<(), DbError> {
        tracing::info!(tx_id = tx, operation = %kind, table, after = %format_image(row));
        Ok(())
    }

    fn commit(&self, tx: TxId, kind: MutationKind, table: &str) -> Result<(), DbError> {
        tracing::info!(tx_id = tx, operation = %kind, table, "transaction committed");
        Ok(())
    }
}

/// The four log files written by [`FileLogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogFile {
    BeforeImage,
    AfterImage,
    ActiveTx,
    CommitTx,
}

impl LogFile {
    pub const ALL: [LogFile; 4] = [
        LogFile::BeforeImage,
        LogFile::AfterImage,
        LogFile::ActiveTx,
        LogFile::CommitTx,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            LogFile::BeforeImage => "before_image.log",
            LogFile::AfterImage => "after_image.log",
            LogFile::ActiveTx => "active_tx.log",
            LogFile::CommitTx => "commit_tx.log",
        }
    }
}

/// Line counts per log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStatistics {
    pub before_image: usize,
    pub after_image: usize,
    pub active_tx: usize,
    pub commit_tx: usize,
}

/// Append-only text log under a log directory.
///
/// Writes are serialised through a mutex so that lines from different
/// threads never interleave.
#[derive(Debug)]
pub struct FileLogSink {
    dir: PathBuf,
    next_tx: AtomicU64,
    lock: Mutex<()>,
}

impl FileLogSink {
    /// Opens (creating if needed) the log directory. Transaction ids continue
    /// after the entries already present in `active_tx.log`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, DbError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| classify_io_error(e, &format!("create log dir {}", dir.display())))?;
        let sink = Self {
            dir,
            next_tx: AtomicU64::new(0),
            lock: Mutex::new(()),
        };
        let existing = sink.read_log(LogFile::ActiveTx)?.len() as u64;
        sink.next_tx.store(existing, Ordering::Relaxed);
        Ok(sink)
    }

    /// Directory holding the log files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: LogFile) -> PathBuf {
        self.dir.join(file.file_name())
    }

    fn timestamp() -> String {
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn append(&self, file: LogFile, line: &str) -> Result<(), DbError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let path = self.path(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| classify_io_error(e, &format!("open {}", path.display())))?;
        writeln!(handle, "{}", line)
            .map_err(|e| classify_io_error(e, &format!("append {}", path.display())))
    }

    /// Lines of one log file; a missing file reads as empty.
    pub fn read_log(&self, file: LogFile) -> Result<Vec<String>, DbError> {
        let path = self.path(file);
        let handle = match File::open(&path) {
            Ok(handle) => handle,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(classify_io_error(e, &format!("open {}", path.display()))),
        };
        BufReader::new(handle)
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| classify_io_error(e, &format!("read {}", path.display())))
    }

    /// Truncates every existing log file.
    pub fn clear_all(&self) -> Result<(), DbError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        for file in LogFile::ALL {
            let path = self.path(file);
            if path.exists() {
                File::create(&path)
                    .map_err(|e| classify_io_error(e, &format!("truncate {}", path.display())))?;
                tracing::debug!("Cleared log file {}", path.display());
            }
        }
        Ok(())
    }

    /// Number of entries in each log file.
    pub fn statistics(&self) -> Result<LogStatistics, DbError> {
        Ok(LogStatistics {
            before_image: self.read_log(LogFile::BeforeImage)?.len(),
            after_image: self.read_log(LogFile::AfterImage)?.len(),
            active_tx: self.read_log(LogFile::ActiveTx)?.len(),
            commit_tx: self.read_log(LogFile::CommitTx)?.len(),
        })
    }
}

impl MutationSink for FileLogSink {
    fn begin(&self, kind: MutationKind, _table: &str) -> Result<TxId, DbError> {
        let tx = self.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        self.append(
            LogFile::ActiveTx,
            &format!(
                "[{}] tx_id={} operation={} status=ACTIVE",
                Self::timestamp(),
                tx,
                kind
            ),
        )?;
        Ok(tx)
    }

    fn before_image(
        &self,
        tx: TxId,
        kind: MutationKind,
        table: &str,
        row: Option<&[Value]>,
    ) -> Result<(), DbError> {
        self.append(
            LogFile::BeforeImage,
            &format!(
                "[{}] tx_id={} operation={} table='{}' BEFORE={}",
                Self::timestamp(),
                tx,
                kind,
                table.trim(),
                format_image(row)
            ),
        )
    }

    fn after_image(
        &self,
        tx: TxId,
        kind: MutationKind,
        table: &str,
        row: Option<&[Value]>,
    ) -> Result<(), DbError> {
        self.append(
            LogFile::AfterImage,
            &format!(
                "[{}] tx_id={} operation={} table='{}' AFTER={}",
                Self::timestamp(),
                tx,
                kind,
                table.trim(),
                format_image(row)
            ),
        )
    }

    fn commit(&self, tx: TxId, kind: MutationKind, _table: &str) -> Result<(), DbError> {
        self.append(
            LogFile::CommitTx,
            &format!(
                "[{}] tx_id={} operation={} status=COMMIT",
                Self::timestamp(),
                tx,
                kind
            ),
        )
    }
}
