use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::message::TelemetryMessage;

/// First line of every telemetry log.
pub const LOG_HEADER: &str = "x, y, z, angle";

/// Per-frame CSV log. Every row is flushed as soon as it is written.
pub struct TelemetryLog {
    path: PathBuf,
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl fmt::Debug for TelemetryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl TelemetryLog {
    /// Create (or truncate) the log file and write its header.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Self::from_writer(file, path)
    }

    /// Log into any writer; `path` only names it in diagnostics.
    pub fn from_writer(
        writer: impl Write + Send + 'static,
        path: impl Into<PathBuf>,
    ) -> io::Result<Self> {
        let mut writer = BufWriter::new(Box::new(writer) as Box<dyn Write + Send>);
        writeln!(writer, "{LOG_HEADER}")?;
        writer.flush()?;
        Ok(Self {
            path: path.into(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, message: &TelemetryMessage) -> io::Result<()> {
        writeln!(self.writer, "{}", message.log_row())?;
        self.writer.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Flush and release the file.
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Writer that accepts `budget` bytes, then fails like a full disk.
#[cfg(test)]
pub(crate) struct FullDisk {
    pub budget: usize,
}

#[cfg(test)]
impl FullDisk {
    /// Room for the header only.
    pub fn after_header() -> Self {
        Self {
            budget: LOG_HEADER.len() + 1,
        }
    }
}

#[cfg(test)]
impl Write for FullDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::other("no space left on device"));
        }
        let n = buf.len().min(self.budget);
        self.budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
