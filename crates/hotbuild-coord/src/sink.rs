use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hotbuild_config::log_pipeline_warn;

/// Destination for phase banners and pipeline step output.
///
/// Cheap to clone; every clone writes to the same place. Writes are
/// best-effort: a full disk must not turn a good build into a failed one.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<SinkInner>>,
}

struct SinkInner {
    writer: Box<dyn Write + Send>,
    path: Option<PathBuf>,
}

impl LogSink {
    /// Append to the log file at `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with(Box::new(file), Some(path.to_path_buf())))
    }

    /// Wrap an arbitrary writer (used by tests and for stderr mirroring).
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self::with(Box::new(writer), None)
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self::from_writer(io::sink())
    }

    fn with(writer: Box<dyn Write + Send>, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkInner { writer, path })),
        }
    }

    /// Start a fresh log for a new owner. File-backed sinks are truncated;
    /// other writers are left alone.
    ///
    /// The file stays in append mode, so a preempted owner that still holds
    /// an older handle writes at the new end of file rather than its stale
    /// offset.
    pub fn reset(&self) -> io::Result<()> {
        let mut inner = self.lock();
        if let Some(path) = inner.path.clone() {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            file.set_len(0)?;
            inner.writer = Box::new(file);
        }
        Ok(())
    }

    pub fn line(&self, message: impl Display) {
        let mut inner = self.lock();
        if let Err(e) = writeln!(inner.writer, "{}", message).and_then(|_| inner.writer.flush()) {
            log_pipeline_warn!("Log write failed", error = tracing::field::display(e));
        }
    }

    pub fn bytes(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut inner = self.lock();
        if let Err(e) = inner.writer.write_all(data).and_then(|_| inner.writer.flush()) {
            log_pipeline_warn!("Log write failed", error = tracing::field::display(e));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkInner> {
        // A panic mid-write leaves the writer usable; keep logging.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("path", &self.lock().path)
            .finish()
    }
}

/// In-memory writer whose contents can be inspected after the fact.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
