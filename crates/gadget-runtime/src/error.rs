//! Error types for the runtime loops

use std::io;
use std::path::PathBuf;

use gadget_configfs::GadgetError;
use hid_gadget_protocol::{HidClass, ProtocolError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The device accepted only part of a report. Reports are never split.
    #[error("Short write: {written} of {expected} report bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("Device I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Readiness wait failed: {0}")]
    Poll(#[from] nix::errno::Errno),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Gadget(#[from] GadgetError),

    /// Configured state shape disagrees with the function's report descriptor
    #[error("{class} report is {expected} bytes per descriptor, shape encodes {actual}")]
    ShapeMismatch {
        class: HidClass,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid runtime configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input on line {line}: {reason}")]
    InvalidInput { line: usize, reason: String },

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Worker thread {0} panicked")]
    WorkerPanicked(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
