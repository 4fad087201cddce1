//! Destinations for reconstructed access units.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::Result;
use crate::media::AccessUnit;

/// Consumer of access units emitted by the receive loop.
///
/// Called from the media thread, one unit at a time in emission order.
/// An error is logged by the caller and does not stop reception.
pub trait FrameSink: Send + Sync {
    fn emit(&self, unit: AccessUnit) -> Result<()>;
}

/// Writes the raw Annex-B byte stream, playable with `ffplay -f h264`.
pub struct AnnexbWriter<W: Write + Send> {
    inner: Mutex<W>,
}

impl AnnexbWriter<BufWriter<File>> {
    /// Create (or truncate) a file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "recording Annex-B stream");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> AnnexbWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn flush(&self) -> Result<()> {
        Ok(self.inner.lock().flush()?)
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W: Write + Send> FrameSink for AnnexbWriter<W> {
    fn emit(&self, unit: AccessUnit) -> Result<()> {
        self.inner.lock().write_all(&unit.payload)?;
        Ok(())
    }
}

/// Logs one line per access unit; used when nothing consumes the frames.
#[derive(Debug, Default)]
pub struct LogSink;

impl FrameSink for LogSink {
    fn emit(&self, unit: AccessUnit) -> Result<()> {
        tracing::info!(
            codec = unit.codec,
            width = unit.width,
            height = unit.height,
            bytes = unit.payload.len(),
            capture_time_us = unit.capture_time_us,
            sender_id = unit.sender_id,
            "access unit"
        );
        Ok(())
    }
}
