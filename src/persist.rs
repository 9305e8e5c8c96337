//! Per-day append-only log files fed from bounded in-memory buffers.
//!
//! Records are only dropped by buffer eviction. Every write failure leaves the
//! buffer intact so the next cycle can retry.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use log::{debug, info, warn};
use thiserror::Error;

use crate::log_buffer::{DEFAULT_BUFFER_CAPACITY, LogBuffer, LogRecord};

/// A failed flush. The buffered records are still in memory.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{} is in use by another process", .path.display())]
    Locked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PersistError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if is_lock_contention(&source) {
            PersistError::Locked { path, source }
        } else {
            PersistError::Write { path, source }
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, PersistError::Locked { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            PersistError::Locked { path, .. } | PersistError::Write { path, .. } => path,
        }
    }
}

fn is_lock_contention(err: &io::Error) -> bool {
    if matches!(err.kind(), io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock) {
        return true;
    }
    // ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33))
}

/// Filesystem operations the log writer needs.
pub trait Filesystem: Send + Sync {
    /// Append data to a file, creating it if it doesn't exist.
    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Create directory and parents if needed.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(data)?;
        file.flush()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

/// In-memory filesystem with injectable failures.
/// Cloning creates a new handle to the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    locked: Arc<RwLock<HashSet<PathBuf>>>,
    failure: Arc<RwLock<Option<io::ErrorKind>>>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of a file, `None` if it was never written.
    pub fn get_file(&self, path: &Path) -> Option<String> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    pub fn add_file(&self, path: PathBuf, data: &str) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path, data.as_bytes().to_vec());
    }

    pub fn file_count(&self) -> usize {
        self.files.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Make appends to `path` fail as if another process held the file.
    pub fn lock(&self, path: PathBuf) {
        self.locked.write().unwrap_or_else(|e| e.into_inner()).insert(path);
    }

    pub fn unlock(&self, path: &Path) {
        self.locked.write().unwrap_or_else(|e| e.into_inner()).remove(path);
    }

    /// Make every operation fail with `kind` until cleared with `None`.
    pub fn fail_with(&self, kind: Option<io::ErrorKind>) {
        *self.failure.write().unwrap_or_else(|e| e.into_inner()) = kind;
    }

    fn injected_failure(&self) -> io::Result<()> {
        match *self.failure.read().unwrap_or_else(|e| e.into_inner()) {
            Some(kind) => Err(io::Error::new(kind, "injected failure")),
            None => Ok(()),
        }
    }
}

impl Filesystem for MockFilesystem {
    fn append(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.injected_failure()?;
        if self.locked.read().unwrap_or_else(|e| e.into_inner()).contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is being used by another process",
            ));
        }
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.entry(path.to_path_buf()).or_default().extend_from_slice(data);
        Ok(())
    }

    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        self.injected_failure()
    }
}

/// File name for one day of records: `<prefix>_YYYYMMDD.txt`.
pub fn log_filename(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}_{}.txt", date.format("%Y%m%d"))
}

/// A bounded buffer bound to the file of one calendar day.
#[derive(Debug)]
pub struct DailyLog<F: Filesystem> {
    fs: F,
    dir: PathBuf,
    prefix: String,
    date: NaiveDate,
    buffer: LogBuffer,
}

impl<F: Filesystem> DailyLog<F> {
    pub fn new(fs: F, dir: impl Into<PathBuf>, prefix: impl Into<String>, capacity: usize, date: NaiveDate) -> Self {
        Self {
            fs,
            dir: dir.into(),
            prefix: prefix.into(),
            date,
            buffer: LogBuffer::with_capacity(capacity),
        }
    }

    /// Path of the file records currently go to.
    pub fn path(&self) -> PathBuf {
        self.dir.join(log_filename(&self.prefix, self.date))
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Queue a record; returns the oldest one if it had to be dropped.
    pub fn enqueue(&mut self, record: LogRecord) -> Option<LogRecord> {
        let evicted = self.buffer.push(record);
        if let Some(old) = &evicted {
            debug!("{} buffer full, dropped record for {} at {}", self.prefix, old.target_name, old.timestamp);
        }
        evicted
    }

    /// Append every buffered record to the active file in one write.
    ///
    /// The buffer is cleared only when the write succeeds. An empty buffer
    /// does not touch the filesystem.
    pub fn flush(&mut self) -> Result<usize, PersistError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let path = self.path();
        self.fs
            .create_dir_all(&self.dir)
            .map_err(|e| PersistError::from_io(&self.dir, e))?;
        self.fs
            .append(&path, self.buffer.to_batch().as_bytes())
            .map_err(|e| PersistError::from_io(&path, e))?;

        let written = self.buffer.len();
        self.buffer.clear();
        debug!("wrote {written} record(s) to {}", path.display());
        Ok(written)
    }

    /// Switch to `today`'s file if the date moved on, flushing what is
    /// buffered to the previous day's file first.
    ///
    /// Returns `None` when the date is unchanged. A failed flush is returned
    /// but does not prevent the switch; the records stay buffered and land in
    /// the new file on the next successful flush.
    pub fn rotate_if_date_changed(&mut self, today: NaiveDate) -> Option<Result<usize, PersistError>> {
        if today == self.date {
            return None;
        }

        let result = self.flush();
        if let Err(e) = &result {
            warn!("could not flush before day rollover: {e}");
        }
        info!("{} rolling over from {} to {}", self.prefix, self.date, today);
        self.date = today;
        Some(result)
    }
}

/// Where and how the two log streams are written.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub log_prefix: String,
    pub error_log_prefix: String,
    pub capacity: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            log_prefix: "ping_log".to_string(),
            error_log_prefix: "error_log".to_string(),
            capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Outcome of flushing both streams.
#[derive(Debug)]
pub struct FlushReport {
    pub all: Result<usize, PersistError>,
    pub errors: Result<usize, PersistError>,
}

impl FlushReport {
    pub fn is_ok(&self) -> bool {
        self.all.is_ok() && self.errors.is_ok()
    }

    pub fn written(&self) -> usize {
        self.all.as_ref().map_or(0, |n| *n) + self.errors.as_ref().map_or(0, |n| *n)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PersistError> {
        self.all.as_ref().err().into_iter().chain(self.errors.as_ref().err())
    }
}

/// The full record stream plus the error-only stream.
#[derive(Debug)]
pub struct Journal<F: Filesystem> {
    all: DailyLog<F>,
    errors: DailyLog<F>,
}

impl<F: Filesystem + Clone> Journal<F> {
    pub fn new(fs: F, settings: &LogSettings, today: NaiveDate) -> Self {
        Self {
            all: DailyLog::new(fs.clone(), &settings.dir, &settings.log_prefix, settings.capacity, today),
            errors: DailyLog::new(fs, &settings.dir, &settings.error_log_prefix, settings.capacity, today),
        }
    }
}

impl<F: Filesystem> Journal<F> {
    pub fn all(&self) -> &DailyLog<F> {
        &self.all
    }

    pub fn errors(&self) -> &DailyLog<F> {
        &self.errors
    }

    /// Queue a record into the full stream, and into the error stream too
    /// when the probe did not succeed.
    pub fn record(&mut self, record: LogRecord, failed: bool) {
        if failed {
            self.errors.enqueue(record.clone());
        }
        self.all.enqueue(record);
    }

    pub fn flush(&mut self) -> FlushReport {
        FlushReport {
            all: self.all.flush(),
            errors: self.errors.flush(),
        }
    }

    pub fn buffered(&self) -> usize {
        self.all.buffer().len() + self.errors.buffer().len()
    }

    pub fn rotate_if_date_changed(&mut self, today: NaiveDate) -> Option<FlushReport> {
        let all = self.all.rotate_if_date_changed(today);
        let errors = self.errors.rotate_if_date_changed(today);
        if all.is_none() && errors.is_none() {
            return None;
        }
        Some(FlushReport {
            all: all.unwrap_or(Ok(0)),
            errors: errors.unwrap_or(Ok(0)),
        })
    }
}
