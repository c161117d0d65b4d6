//! Error types and exit codes for gadgetctl

use std::path::PathBuf;

use gadget_configfs::GadgetError;
use gadget_runtime::RuntimeError;
use hid_gadget_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No HID function enabled for {0}")]
    NoDevices(&'static str),
}

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_NOT_CONFIGURED: i32 = 2;
pub const EXIT_NO_CONTROLLER: i32 = 3;
pub const EXIT_INVALID: i32 = 4;
pub const EXIT_BUSY: i32 = 5;
pub const EXIT_PERMISSION: i32 = 6;

fn gadget_exit_code(err: &GadgetError) -> i32 {
    match err {
        GadgetError::NotConfigured(_) => EXIT_NOT_CONFIGURED,
        GadgetError::NoControllerAvailable => EXIT_NO_CONTROLLER,
        GadgetError::UnknownFunction(_)
        | GadgetError::NotEnabled(_)
        | GadgetError::NotHid(_)
        | GadgetError::Descriptor(_)
        | GadgetError::InvalidConfig(_) => EXIT_INVALID,
        _ if err.is_busy() => EXIT_BUSY,
        _ if err.is_permission_denied() => EXIT_PERMISSION,
        _ => EXIT_FAILURE,
    }
}

/// Process exit code for an error that reached `main`.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(err) = err.downcast_ref::<GadgetError>() {
        return gadget_exit_code(err);
    }
    if let Some(err) = err.downcast_ref::<RuntimeError>() {
        return match err {
            RuntimeError::Gadget(inner) => gadget_exit_code(inner),
            RuntimeError::Protocol(_)
            | RuntimeError::InvalidConfig(_)
            | RuntimeError::InvalidInput { .. }
            | RuntimeError::ShapeMismatch { .. } => EXIT_INVALID,
            RuntimeError::Open { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                EXIT_PERMISSION
            }
            _ => EXIT_FAILURE,
        };
    }
    if err.downcast_ref::<ProtocolError>().is_some() {
        return EXIT_INVALID;
    }
    match err.downcast_ref::<CliError>() {
        Some(CliError::ConfigParse { .. } | CliError::InvalidConfig(_)) => EXIT_INVALID,
        Some(CliError::NoDevices(_)) => EXIT_NOT_CONFIGURED,
        _ => EXIT_FAILURE,
    }
}
