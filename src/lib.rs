//! # RollWriter
//!
//! RollWriter is a thread-safe rotating file writer. It accepts arbitrary byte
//! output, appends it to a single active file and, once a configured number of
//! write calls has been reached, archives that file under a timestamped name
//! and starts over with a fresh, empty one. **Rotation is counted in write
//! events, not bytes**: every call to `write` counts once, whatever its length,
//! which makes the writer a natural fit for line-oriented loggers that emit one
//! record per call.
//!
//! Archives live next to the active file and are named
//! `<RFC3339 timestamp>-<file name>`, e.g. `2025-04-01T19:55:02+08:00-app.log`.
//! Two rotations within the same second never overwrite each other: the second
//! archive gets a counter, `2025-04-01T19:55:02+08:00-1-app.log`.
//!
//! A single writer can be shared between threads. Every write, including the
//! rotation it may trigger, runs inside one critical section.
//!
//! Note that `write!`/`writeln!` with format arguments issue one `write` call
//! per formatted piece. Format the record into a buffer first when it has to
//! count as a single write event, as `tracing_subscriber::fmt` does.
//!
//! ## Example
//!
//! ```rust
//! use {rollwriter::RotatingWriter, std::io::Write};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = tempfile::tempdir()?;
//!     let mut writer = RotatingWriter::new(dir.path().join("app.log"), 3)?;
//!
//!     writeln!(writer, "first")?;
//!     writeln!(writer, "second")?;
//!     writeln!(writer, "third")?; // third write event: app.log is archived
//!
//!     assert_eq!(writer.write_count(), 0);
//!     assert_eq!(std::fs::read_dir(dir.path())?.count(), 2);
//!     writer.close()?;
//!     Ok(())
//! }
//! ```
use {
    chrono::{DateTime, FixedOffset, SecondsFormat, Utc},
    std::{
        ffi::OsString,
        fmt,
        fs::{self, File, OpenOptions},
        io::{self, Write as _},
        path::{Path, PathBuf},
        sync::{Arc, Mutex, MutexGuard, PoisonError},
    },
};

#[cfg(unix)]
use std::{fs::Permissions, os::unix::fs::PermissionsExt};

/// Rotation threshold used when the builder is not given one.
pub const DEFAULT_MAX_WRITES: usize = 1000;

/// Specifies the time zone used to render the timestamp in archive file names.
///
/// # Examples
/// ```
/// use chrono::FixedOffset;
/// use rollwriter::TimeZone;
///
/// // Archives named like 2025-04-01T11:55:02Z-app.log
/// let utc = TimeZone::UTC;
///
/// // Follows the system time zone, including daylight saving changes
/// let local = TimeZone::Local;
///
/// // Archives named like 2025-04-01T19:55:02+08:00-app.log
/// let china = TimeZone::Fix(FixedOffset::east_opt(8 * 3600).unwrap());
/// ```
#[derive(Debug, Clone)]
pub enum TimeZone {
    /// Use UTC. The offset is rendered as `Z`.
    UTC,
    /// Use the system's local time zone, resolved at every rotation.
    Local,
    /// Use a fixed offset regardless of where the application runs.
    Fix(FixedOffset),
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Configuration for a rotating writer. Fixed once the writer is built.
#[derive(Clone)]
struct RotatingWriterMeta {
    /// The active file. Archives are placed in its parent directory.
    path: PathBuf,
    /// Number of successful write calls after which the file is rotated.
    max_writes: usize,
    /// The time zone used to render archive timestamps.
    time_zone: TimeZone,
    /// The file permissions to set on newly created active files (Unix-like
    /// systems only), in octal notation (e.g., 0o644 for rw-r--r--).
    file_mode: Option<u32>,
    /// Create the parent directory of `path` when it is missing.
    create_dir: bool,
    /// Archive a file already present at `path` when the writer is built.
    /// When disabled the writer appends to it instead.
    archive_existing: bool,
    clock: Clock,
}

/// Mutable state, only ever touched with the writer's lock held.
struct RotatingWriterState {
    /// Absent only while rotating, or after a rotation failed to reopen a file.
    handle: Option<File>,
    /// Successful writes since the last completed rotation.
    write_count: usize,
    /// Most recent failure to close a handle during rotation.
    close_error: Option<RotatingWriterError>,
}

/// What happened during one rotation attempt.
///
/// Built with the lock held and reported after it is released, so that a
/// writer backing a tracing subscriber never logs into itself while locked.
struct RotationReport {
    result: Result<Option<PathBuf>, RotatingWriterError>,
    close_failure: Option<String>,
    reopen_failure: Option<String>,
}

impl RotationReport {
    fn emit(&self, path: &Path) {
        if let Some(reason) = &self.close_failure {
            tracing::warn!(path = %path.display(), %reason, "failed to close log file while rotating");
        }
        if let Some(reason) = &self.reopen_failure {
            tracing::warn!(path = %path.display(), %reason, "failed to reopen log file after aborted rotation");
        }
        match &self.result {
            Ok(Some(archive)) => {
                tracing::debug!(path = %path.display(), archive = %archive.display(), "rotated log file")
            }
            Ok(None) => tracing::debug!(path = %path.display(), "created log file"),
            Err(err) => tracing::debug!(path = %path.display(), %err, "log file rotation failed"),
        }
    }
}

impl RotatingWriterMeta {
    fn new<P: AsRef<Path>>(path: P) -> Self {
        RotatingWriterMeta {
            path: path.as_ref().to_path_buf(),
            max_writes: DEFAULT_MAX_WRITES,
            time_zone: TimeZone::Local,
            file_mode: None,
            create_dir: false,
            archive_existing: true,
            clock: Arc::new(Utc::now),
        }
    }

    /// Render the current time as a whole-second RFC3339 timestamp in the
    /// configured time zone.
    fn timestamp(&self) -> String {
        let now = (self.clock)();
        let now = match &self.time_zone {
            TimeZone::UTC => now.fixed_offset(),
            TimeZone::Local => now.with_timezone(&chrono::Local).fixed_offset(),
            TimeZone::Fix(offset) => now.with_timezone(offset),
        };
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Get a free archive path for the active file.
    ///
    /// The first candidate is `<dir>/<timestamp>-<file name>`. If that is
    /// taken, `<dir>/<timestamp>-<n>-<file name>` is tried for n = 1, 2, ...
    /// # Returns
    /// The first candidate that does not exist yet.
    fn archive_path(&self) -> Result<PathBuf, RotatingWriterError> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| RotatingWriterError::InvalidPath(self.path.clone()))?;
        let directory = self.path.parent().unwrap_or_else(|| Path::new(""));
        let stamp = self.timestamp();

        let candidate = |counter: Option<usize>| -> PathBuf {
            let mut name = match counter {
                Some(n) => OsString::from(format!("{stamp}-{n}-")),
                None => OsString::from(format!("{stamp}-")),
            };
            name.push(file_name);
            directory.join(name)
        };

        let mut archive = candidate(None);
        let mut counter = 1;
        while archive.try_exists()? {
            archive = candidate(Some(counter));
            counter += 1;
        }
        Ok(archive)
    }

    /// Create a new, empty active file, truncating anything found at `path`.
    fn create_active_file(&self) -> Result<File, RotatingWriterError> {
        let mut open_options = OpenOptions::new();
        open_options.write(true).create(true).truncate(true);
        let file = self.open_with_parents(&open_options, |path, source| RotatingWriterError::CreateFileFailed {
            path,
            source,
        })?;
        self.set_permissions(&self.path)?;
        Ok(file)
    }

    /// Open the active file for appending, creating it if it has vanished.
    fn open_active_file(&self) -> Result<File, RotatingWriterError> {
        let mut open_options = OpenOptions::new();
        open_options.append(true).create(true);
        self.open_with_parents(&open_options, |path, source| RotatingWriterError::OpenFileFailed {
            path,
            source,
        })
    }

    /// Open the active file, creating its parent directory and trying again
    /// if the first attempt fails and `create_dir` is set.
    fn open_with_parents<F>(&self, open_options: &OpenOptions, file_error: F) -> Result<File, RotatingWriterError>
    where
        F: Fn(PathBuf, io::Error) -> RotatingWriterError,
    {
        let mut open_res = open_options.open(&self.path);
        if open_res.is_err() && self.create_dir {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| RotatingWriterError::CreateDirectoryFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
                open_res = open_options.open(&self.path);
            }
        }
        open_res.map_err(|source| file_error(self.path.clone(), source))
    }

    /// Set the permissions for a file based on the configured file mode.
    ///
    /// Only has an effect when a file mode has been configured and the
    /// platform is Unix-like. The builder warns once about the unsupported
    /// case, so this is silent elsewhere.
    fn set_permissions(&self, path: &Path) -> Result<(), RotatingWriterError> {
        if let Some(mode) = self.file_mode {
            #[cfg(unix)]
            {
                fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|source| {
                    RotatingWriterError::SetFilePermissionsError {
                        path: path.to_path_buf(),
                        source,
                    }
                })?
            }
            #[cfg(not(unix))]
            {
                let _ = (mode, path);
            }
        }
        Ok(())
    }

    /// Write the whole buffer to the active file.
    ///
    /// Reopens the active file first if a previous rotation left the writer
    /// without a handle. On failure the error carries the number of bytes
    /// that did reach the file.
    fn write_locked(&self, state: &mut RotatingWriterState, buf: &[u8]) -> Result<usize, RotatingWriterError> {
        let file = match &mut state.handle {
            Some(file) => file,
            handle => handle.insert(self.open_active_file()?),
        };

        let mut written = 0;
        while written < buf.len() {
            match file.write(&buf[written..]) {
                Ok(0) => {
                    return Err(RotatingWriterError::Write {
                        written,
                        source: io::ErrorKind::WriteZero.into(),
                    })
                }
                Ok(n) => written += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => return Err(RotatingWriterError::Write { written, source }),
            }
        }
        Ok(written)
    }

    /// Rotate the active file. The caller must hold the writer's lock.
    ///
    /// 1. Flush, sync and close the current handle. A failure here is
    ///    recorded but does not stop the rotation.
    /// 2. If a file exists at `path`, rename it to a free archive path. If
    ///    that fails the old file is reopened and the rotation stops.
    /// 3. Create a fresh, empty file at `path`.
    /// 4. Reset the write counter.
    fn rotate_locked(&self, state: &mut RotatingWriterState) -> RotationReport {
        let mut close_failure = None;
        if let Some(mut file) = state.handle.take() {
            if let Err(source) = file.flush().and_then(|_| file.sync_all()) {
                let err = RotatingWriterError::CloseFailed {
                    path: self.path.clone(),
                    source,
                };
                close_failure = Some(err.to_string());
                state.close_error = Some(err);
            }
        }

        let mut reopen_failure = None;
        let result = self.archive_and_recreate(state, &mut reopen_failure);
        RotationReport {
            result,
            close_failure,
            reopen_failure,
        }
    }

    fn archive_and_recreate(
        &self,
        state: &mut RotatingWriterState,
        reopen_failure: &mut Option<String>,
    ) -> Result<Option<PathBuf>, RotatingWriterError> {
        let exists = match self.path.try_exists() {
            Ok(exists) => exists,
            Err(err) => {
                *reopen_failure = self.restore_handle(state);
                return Err(err.into());
            }
        };

        let archive = if exists {
            let archive = match self.archive_path() {
                Ok(archive) => archive,
                Err(err) => {
                    *reopen_failure = self.restore_handle(state);
                    return Err(err);
                }
            };
            if let Err(source) = fs::rename(&self.path, &archive) {
                *reopen_failure = self.restore_handle(state);
                return Err(RotatingWriterError::RenameFileError {
                    from: self.path.clone(),
                    to: archive,
                    source,
                });
            }
            Some(archive)
        } else {
            None
        };

        state.handle = Some(self.create_active_file()?);
        state.write_count = 0;
        Ok(archive)
    }

    /// Keep writing to the old file after an aborted rotation.
    ///
    /// If even that fails the handle stays empty and the next write retries
    /// the open. The failure is returned for the rotation report.
    fn restore_handle(&self, state: &mut RotatingWriterState) -> Option<String> {
        match self.open_active_file() {
            Ok(file) => {
                state.handle = Some(file);
                None
            }
            Err(err) => {
                state.handle = None;
                Some(err.to_string())
            }
        }
    }
}

/// A file writer that archives its file every `max_writes` write calls.
///
/// All methods take `&self`; share one writer between threads with an `Arc`
/// or a plain reference. [`std::io::Write`] is implemented for both
/// `RotatingWriter` and `&RotatingWriter`, so an `Arc<RotatingWriter>` can be
/// handed straight to `tracing_subscriber::fmt().with_writer(..)`.
pub struct RotatingWriter {
    meta: RotatingWriterMeta,
    state: Mutex<RotatingWriterState>,
}

impl RotatingWriter {
    /// Create a writer for `path` that rotates every `max_writes` writes.
    ///
    /// Any file already at `path` is archived first, so the writer always
    /// starts with an empty file. Use [`RotatingWriterBuilder`] for the other
    /// options.
    /// # Errors
    /// * `InvalidMaxWrites` if `max_writes` is 0.
    /// * Any filesystem error from the initial rotation, e.g. a missing
    ///   parent directory.
    pub fn new<P: AsRef<Path>>(path: P, max_writes: usize) -> Result<Self, RotatingWriterError> {
        RotatingWriterBuilder::new(path).max_writes(max_writes).build()
    }

    /// The path of the active file.
    pub fn path(&self) -> &Path {
        &self.meta.path
    }

    pub fn max_writes(&self) -> usize {
        self.meta.max_writes
    }

    /// Number of successful writes since the last rotation.
    pub fn write_count(&self) -> usize {
        self.lock().write_count
    }

    /// Write the whole buffer to the active file as one write event.
    ///
    /// The write, the counter update and any rotation it triggers happen under
    /// a single lock, so concurrent callers never interleave with each other
    /// or with a rotation. An empty buffer still counts as a write event.
    ///
    /// # Returns
    /// The number of bytes written, which is always `buf.len()` on success.
    ///
    /// # Errors
    /// * `Write` if the file rejected the bytes. The error holds the number of
    ///   bytes written before the failure; the counter is unchanged and no
    ///   rotation is attempted.
    /// * `OpenFileFailed` if the writer had lost its handle and could not
    ///   reopen the active file.
    /// * `RotateAfterWrite` if the write succeeded but the rotation it
    ///   triggered failed. The bytes are in the old file, the counter stays
    ///   at the threshold and the next write tries to rotate again.
    pub fn write(&self, buf: &[u8]) -> Result<usize, RotatingWriterError> {
        let mut state = self.lock();
        let written = self.meta.write_locked(&mut state, buf)?;
        state.write_count += 1;
        if state.write_count < self.meta.max_writes {
            return Ok(written);
        }

        let report = self.meta.rotate_locked(&mut state);
        drop(state);
        report.emit(&self.meta.path);
        report.result.map(|_| written).map_err(|source| RotatingWriterError::RotateAfterWrite {
            written,
            source: Box::new(source),
        })
    }

    /// Rotate now, regardless of the write counter.
    ///
    /// # Returns
    /// The path the previous file was archived to, or `None` if there was no
    /// file at the active path to archive.
    pub fn rotate(&self) -> Result<Option<PathBuf>, RotatingWriterError> {
        let report = self.meta.rotate_locked(&mut self.lock());
        report.emit(&self.meta.path);
        report.result
    }

    /// Flush the active file.
    pub fn flush(&self) -> Result<(), RotatingWriterError> {
        match &mut self.lock().handle {
            Some(file) => file.flush().map_err(RotatingWriterError::FileIOError),
            None => Ok(()),
        }
    }

    /// Take the most recent error raised while closing a file during
    /// rotation. Rotation carries on past such errors, so this is the only
    /// place they surface besides the log.
    pub fn take_close_error(&self) -> Option<RotatingWriterError> {
        self.lock().close_error.take()
    }

    /// Flush, sync and close the active file.
    ///
    /// Dropping the writer does the same but can only log failures.
    pub fn close(self) -> Result<(), RotatingWriterError> {
        let handle = self.lock().handle.take();
        match handle {
            Some(file) => self.meta.close_file(file),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RotatingWriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RotatingWriterMeta {
    fn close_file(&self, mut file: File) -> Result<(), RotatingWriterError> {
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|source| RotatingWriterError::CloseFailed {
                path: self.path.clone(),
                source,
            })
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = state.handle.take() {
            if let Err(err) = self.meta.close_file(file) {
                tracing::warn!(%err, "failed to close log file on drop");
            }
        }
    }
}

impl fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("path", &self.meta.path)
            .field("max_writes", &self.meta.max_writes)
            .field("write_count", &self.write_count())
            .finish()
    }
}

impl io::Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self).map_err(io::Error::from)
    }
}

impl io::Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self).map_err(io::Error::from)
    }
}

/// Errors that can occur when using the rotating writer.
#[derive(Debug, thiserror::Error)]
pub enum RotatingWriterError {
    #[error("Invalid max writes: the rotation threshold must be at least 1")]
    InvalidMaxWrites,
    #[error("Invalid log file path '{0}': no file name")]
    InvalidPath(PathBuf),
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectoryFailed { path: PathBuf, source: io::Error },
    #[error("Failed to create file '{path}': {source}")]
    CreateFileFailed { path: PathBuf, source: io::Error },
    #[error("Failed to open file '{path}': {source}")]
    OpenFileFailed { path: PathBuf, source: io::Error },
    #[error("Failed to close file '{path}': {source}")]
    CloseFailed { path: PathBuf, source: io::Error },
    #[error("Failed to rename file from '{from}' to '{to}': {source}")]
    RenameFileError { from: PathBuf, to: PathBuf, source: io::Error },
    #[error("Failed to set file permissions for '{path}': {source}")]
    SetFilePermissionsError { path: PathBuf, source: io::Error },
    #[error("Failed to write log data after {written} bytes: {source}")]
    Write { written: usize, source: io::Error },
    #[error("Wrote {written} bytes but failed to rotate: {source}")]
    RotateAfterWrite {
        written: usize,
        source: Box<RotatingWriterError>,
    },
    #[error("File IO error: {0}")]
    FileIOError(#[from] io::Error),
}

impl RotatingWriterError {
    /// Bytes that reached the file before the error, for errors returned by
    /// [`RotatingWriter::write`]. Zero for everything else.
    pub fn written(&self) -> usize {
        match self {
            RotatingWriterError::Write { written, .. } | RotatingWriterError::RotateAfterWrite { written, .. } => {
                *written
            }
            _ => 0,
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            RotatingWriterError::InvalidMaxWrites | RotatingWriterError::InvalidPath(_) => {
                io::ErrorKind::InvalidInput
            }
            RotatingWriterError::CreateDirectoryFailed { source, .. }
            | RotatingWriterError::CreateFileFailed { source, .. }
            | RotatingWriterError::OpenFileFailed { source, .. }
            | RotatingWriterError::CloseFailed { source, .. }
            | RotatingWriterError::RenameFileError { source, .. }
            | RotatingWriterError::SetFilePermissionsError { source, .. }
            | RotatingWriterError::Write { source, .. }
            | RotatingWriterError::FileIOError(source) => source.kind(),
            // The bytes are already in the file, so this must never look retryable.
            RotatingWriterError::RotateAfterWrite { source, .. } => match source.io_kind() {
                io::ErrorKind::Interrupted => io::ErrorKind::Other,
                kind => kind,
            },
        }
    }
}

impl From<RotatingWriterError> for io::Error {
    fn from(err: RotatingWriterError) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}

/// Provides a fluent interface for configuring RotatingWriter instances.
///
/// # Default Configuration
///
/// * Rotate every 1000 writes
/// * Local system time zone in archive names
/// * Archive a file already present at the path when building
/// * Fail if the parent directory is missing
/// * Standard file permissions
///
/// # Examples
///
/// ```rust
/// use rollwriter::{RotatingWriterBuilder, TimeZone};
///
/// let dir = tempfile::tempdir().unwrap();
/// let writer = RotatingWriterBuilder::new(dir.path().join("logs/app.log"))
///     .max_writes(10_000)
///     .time_zone(TimeZone::UTC)  // Archive names like 2025-04-01T11:55:02Z-app.log
///     .create_dir(true)          // Create logs/ if needed
///     .archive_existing(false)   // Keep appending to an existing app.log
///     .build()
///     .unwrap();
/// assert_eq!(writer.write_count(), 0);
/// ```
pub struct RotatingWriterBuilder {
    meta: RotatingWriterMeta,
}

impl RotatingWriterBuilder {
    /// Create a new builder for the active file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        RotatingWriterBuilder {
            meta: RotatingWriterMeta::new(path),
        }
    }

    /// Set the number of write calls after which the file is rotated.
    pub fn max_writes(self, max_writes: usize) -> Self {
        Self {
            meta: RotatingWriterMeta { max_writes, ..self.meta },
        }
    }

    /// Set the time zone for archive timestamps.
    pub fn time_zone(self, time_zone: TimeZone) -> Self {
        Self {
            meta: RotatingWriterMeta { time_zone, ..self.meta },
        }
    }

    /// Set the file permissions for new active files (Unix-like systems only).
    /// This sets the file mode bits in octal notation like when using chmod.
    /// For example, 0o640 for rw-r----- permissions.
    pub fn file_mode(self, mode: u32) -> Self {
        Self {
            meta: RotatingWriterMeta {
                file_mode: Some(mode),
                ..self.meta
            },
        }
    }

    /// Create missing parent directories of the active file.
    pub fn create_dir(self, create_dir: bool) -> Self {
        Self {
            meta: RotatingWriterMeta { create_dir, ..self.meta },
        }
    }

    /// Whether to archive a file already at the path when building (the
    /// default), or to append to it.
    pub fn archive_existing(self, archive_existing: bool) -> Self {
        Self {
            meta: RotatingWriterMeta {
                archive_existing,
                ..self.meta
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn clock(self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            meta: RotatingWriterMeta {
                clock: Arc::new(clock),
                ..self.meta
            },
        }
    }

    /// Build the writer.
    ///
    /// With `archive_existing` set this runs a full rotation: an existing
    /// file is archived and a fresh one is created. Otherwise the file is
    /// opened for appending and created if missing. Nothing is returned
    /// unless the active file is open.
    pub fn build(self) -> Result<RotatingWriter, RotatingWriterError> {
        if self.meta.max_writes == 0 {
            return Err(RotatingWriterError::InvalidMaxWrites);
        }
        if self.meta.path.file_name().is_none() {
            return Err(RotatingWriterError::InvalidPath(self.meta.path));
        }
        #[cfg(not(unix))]
        {
            if self.meta.file_mode.is_some() {
                tracing::warn!("setting file permissions is not supported on non-Unix platforms");
            }
        }

        let mut state = RotatingWriterState {
            handle: None,
            write_count: 0,
            close_error: None,
        };
        if self.meta.archive_existing {
            let report = self.meta.rotate_locked(&mut state);
            report.emit(&self.meta.path);
            report.result?;
        } else {
            let existed = self.meta.path.try_exists()?;
            state.handle = Some(self.meta.open_active_file()?);
            if !existed {
                self.meta.set_permissions(&self.meta.path)?;
            }
        }

        Ok(RotatingWriter {
            meta: self.meta,
            state: Mutex::new(state),
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::TimeZone as _,
        std::{fs, io::Write},
        tempfile::TempDir,
    };

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 11, 55, 2).unwrap()
    }

    fn frozen_writer(dir: &TempDir, max_writes: usize) -> RotatingWriter {
        RotatingWriterBuilder::new(dir.path().join("app.log"))
            .max_writes(max_writes)
            .time_zone(TimeZone::UTC)
            .clock(fixed_clock)
            .build()
            .unwrap()
    }

    #[test]
    fn archive_name_uses_rfc3339_and_base_name() {
        let dir = TempDir::new().unwrap();
        let writer = frozen_writer(&dir, 10);
        writer.write(b"x").unwrap();

        let archive = writer.rotate().unwrap().unwrap();
        assert_eq!(archive, dir.path().join("2025-04-01T11:55:02Z-app.log"));
    }

    #[test]
    fn archive_name_renders_fixed_offset() {
        let dir = TempDir::new().unwrap();
        let writer = RotatingWriterBuilder::new(dir.path().join("app.log"))
            .time_zone(TimeZone::Fix(FixedOffset::east_opt(8 * 3600).unwrap()))
            .clock(fixed_clock)
            .build()
            .unwrap();

        let archive = writer.rotate().unwrap().unwrap();
        assert_eq!(archive, dir.path().join("2025-04-01T19:55:02+08:00-app.log"));
    }

    #[test]
    fn same_second_rotations_get_counters() {
        let dir = TempDir::new().unwrap();
        let writer = frozen_writer(&dir, 1);

        writer.write(b"one").unwrap();
        writer.write(b"two").unwrap();
        writer.write(b"three").unwrap();

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("2025-04-01T11:55:02Z-app.log"), "one");
        assert_eq!(read("2025-04-01T11:55:02Z-1-app.log"), "two");
        assert_eq!(read("2025-04-01T11:55:02Z-2-app.log"), "three");
        assert_eq!(read("app.log"), "");
    }

    #[test]
    fn failed_write_does_not_count() {
        let dir = TempDir::new().unwrap();
        let writer = frozen_writer(&dir, 3);
        writer.write(b"a").unwrap();

        // Swap in a read-only handle so the next write fails at the OS level.
        let good = {
            let mut state = writer.lock();
            let read_only = File::open(dir.path().join("app.log")).unwrap();
            state.handle.replace(read_only).unwrap()
        };
        let err = writer.write(b"lost").unwrap_err();
        assert!(matches!(err, RotatingWriterError::Write { written: 0, .. }));
        assert_eq!(writer.write_count(), 1);

        writer.lock().handle = Some(good);
        writer.write(b"b").unwrap();
        assert_eq!(writer.write_count(), 2);
        writer.write(b"c").unwrap();
        assert_eq!(writer.write_count(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("2025-04-01T11:55:02Z-app.log")).unwrap(), "abc");
    }

    #[test]
    fn missing_handle_is_reopened_for_append() {
        let dir = TempDir::new().unwrap();
        let writer = frozen_writer(&dir, 10);
        writer.write(b"kept ").unwrap();

        writer.lock().handle = None;
        writer.write(b"after").unwrap();
        assert_eq!(writer.write_count(), 2);
        assert_eq!(fs::read_to_string(dir.path().join("app.log")).unwrap(), "kept after");
    }

    #[test]
    fn failed_recreate_keeps_threshold_and_recovers() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        fs::create_dir(&logs).unwrap();
        let writer = RotatingWriterBuilder::new(logs.join("app.log"))
            .max_writes(2)
            .clock(fixed_clock)
            .build()
            .unwrap();
        writer.write(b"a").unwrap();

        fs::remove_dir_all(&logs).unwrap();
        let err = writer.write(b"b").unwrap_err();
        assert_eq!(err.written(), 1);
        assert!(matches!(
            err,
            RotatingWriterError::RotateAfterWrite { ref source, .. }
                if matches!(**source, RotatingWriterError::CreateFileFailed { .. })
        ));
        assert_eq!(writer.write_count(), 2);

        fs::create_dir(&logs).unwrap();
        writer.write(b"c").unwrap();
        assert_eq!(writer.write_count(), 0);
        assert!(logs.join("app.log").exists());
    }

    #[test]
    fn io_error_keeps_kind_and_source() {
        let err = io::Error::from(RotatingWriterError::Write {
            written: 3,
            source: io::ErrorKind::PermissionDenied.into(),
        });
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        let inner = err.into_inner().unwrap().downcast::<RotatingWriterError>().unwrap();
        assert_eq!(inner.written(), 3);
    }

    #[test]
    fn rotate_after_write_is_never_retryable() {
        let err = io::Error::from(RotatingWriterError::RotateAfterWrite {
            written: 4,
            source: Box::new(RotatingWriterError::FileIOError(io::ErrorKind::Interrupted.into())),
        });
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn failed_reopen_after_aborted_rotation_is_reported() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        fs::create_dir(&logs).unwrap();
        let writer = RotatingWriterBuilder::new(logs.join("app.log"))
            .max_writes(10)
            .clock(fixed_clock)
            .build()
            .unwrap();

        // A regular file where the directory was: the existence check and the
        // reopen both fail with ENOTDIR.
        fs::remove_dir_all(&logs).unwrap();
        fs::write(&logs, "not a directory").unwrap();

        let report = writer.meta.rotate_locked(&mut writer.lock());
        assert!(matches!(report.result, Err(RotatingWriterError::FileIOError(_))));
        assert!(report.close_failure.is_none());
        let reason = report.reopen_failure.expect("reopen failure is reported");
        assert!(reason.contains("app.log"), "{reason}");
        assert!(writer.lock().handle.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn close_error_during_rotation_is_kept() {
        use nix::{sys::stat::Mode, unistd::mkfifo};

        let dir = TempDir::new().unwrap();
        let writer = frozen_writer(&dir, 1);

        // fsync on a FIFO fails with EINVAL, so closing it during rotation fails.
        let fifo = dir.path().join("pipe");
        mkfifo(&fifo, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
        let pipe = OpenOptions::new().read(true).write(true).open(&fifo).unwrap();
        writer.lock().handle = Some(pipe);

        assert_eq!(writer.write(b"x").unwrap(), 1);
        assert_eq!(writer.write_count(), 0);
        let err = writer.take_close_error().expect("close error is kept");
        assert!(matches!(err, RotatingWriterError::CloseFailed { .. }));
        assert!(writer.take_close_error().is_none());
        assert!(dir.path().join("2025-04-01T11:55:02Z-app.log").exists());
    }

    #[test]
    fn io_write_impl_counts_each_call() {
        let dir = TempDir::new().unwrap();
        let mut writer = frozen_writer(&dir, 5);
        write!(writer, "hello").unwrap();
        (&writer).write_all(b" world").unwrap();
        assert_eq!(writer.write_count(), 2);
    }
}
