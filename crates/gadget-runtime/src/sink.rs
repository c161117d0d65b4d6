//! Report sinks: where encoded input reports go

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::{RuntimeError, RuntimeResult};

/// Destination for whole input reports.
pub trait ReportSink: Send {
    /// Write one report in a single call.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ShortWrite`] when the device takes fewer bytes than
    /// the report holds, [`RuntimeError::Io`] for any other failure.
    fn send_report(&mut self, report: &[u8]) -> RuntimeResult<()>;
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn send_report(&mut self, report: &[u8]) -> RuntimeResult<()> {
        (**self).send_report(report)
    }
}

/// Write `report` with one `write` call. `hidg` devices treat each write as
/// one report, so a partial write is not retried.
pub fn write_report<W: Write + ?Sized>(writer: &mut W, report: &[u8]) -> RuntimeResult<()> {
    let written = writer.write(report)?;
    if written != report.len() {
        return Err(RuntimeError::ShortWrite {
            expected: report.len(),
            written,
        });
    }
    writer.flush()?;
    Ok(())
}

/// A `/dev/hidgN` character device opened for report writes.
#[derive(Debug)]
pub struct HidDevice {
    path: PathBuf,
    file: File,
}

impl HidDevice {
    /// Open `path` read-write. The read side carries host output reports.
    pub fn open(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| RuntimeError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Separate read-only handle on the same node for the output-report
    /// listener. It has its own file offset.
    pub fn open_reader(&self) -> RuntimeResult<File> {
        File::open(&self.path).map_err(|source| RuntimeError::Open {
            path: self.path.clone(),
            source,
        })
    }
}

impl ReportSink for HidDevice {
    fn send_report(&mut self, report: &[u8]) -> RuntimeResult<()> {
        trace!(device = %self.path.display(), len = report.len(), "report");
        write_report(&mut self.file, report)
    }
}
