//! Error types for gadget tree operations

use std::io;
use std::path::PathBuf;

use hid_gadget_protocol::ProtocolError;
use thiserror::Error;

use crate::function::FunctionKind;

#[derive(Error, Debug)]
pub enum GadgetError {
    /// A configfs, sysfs or device-node operation failed
    #[error("Failed to {op} {path}: {source}")]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Gadget {0:?} is not configured")]
    NotConfigured(String),

    #[error("Gadget is bound to {0}; deactivate it first")]
    StillActive(String),

    #[error("No USB device controller available")]
    NoControllerAvailable,

    #[error("Unknown function: {0:?}")]
    UnknownFunction(String),

    #[error("Function {0} is not enabled")]
    NotEnabled(FunctionKind),

    #[error("Function {0} has no HID device node")]
    NotHid(FunctionKind),

    #[error("Cannot resolve device node for {function}: {reason}")]
    DeviceNode {
        function: FunctionKind,
        reason: String,
    },

    #[error("Invalid report descriptor: {0}")]
    Descriptor(#[from] ProtocolError),

    #[error("Invalid gadget configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to run {program}: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    CommandFailed { program: String, status: String },
}

impl GadgetError {
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }

    /// Underlying I/O error kind, when the failure came from the filesystem.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Filesystem { source, .. } | Self::CommandSpawn { source, .. } => {
                Some(source.kind())
            }
            _ => None,
        }
    }

    /// True for `EBUSY` style refusals and for an operation blocked by a bound gadget.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::StillActive(_))
            || self.io_kind() == Some(io::ErrorKind::ResourceBusy)
    }

    pub fn is_permission_denied(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::PermissionDenied)
    }
}

pub type GadgetResult<T> = Result<T, GadgetError>;
