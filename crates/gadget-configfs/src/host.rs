//! Host side-services a gadget function depends on
//!
//! Kernel modules, FunctionFS mounts and getty units live outside configfs.
//! They go through [`HostServices`] so the manager can be exercised without
//! root.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::{GadgetError, GadgetResult};

pub trait HostServices: Send + Sync {
    fn load_module(&self, module: &str) -> GadgetResult<()>;

    fn mount_functionfs(&self, instance: &str, mountpoint: &Path) -> GadgetResult<()>;

    fn unmount(&self, mountpoint: &Path) -> GadgetResult<()>;

    fn start_service(&self, unit: &str) -> GadgetResult<()>;

    fn stop_service(&self, unit: &str) -> GadgetResult<()>;
}

/// Systemd getty unit for an ACM port.
pub fn getty_unit(port_num: &str) -> String {
    format!("getty@ttyGS{}.service", port_num.trim())
}

/// Runs `modprobe`, `mount`, `umount` and `systemctl`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostServices;

impl SystemHostServices {
    fn run(program: &str, args: &[&str]) -> GadgetResult<()> {
        debug!(program, ?args, "Running host command");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| GadgetError::CommandSpawn {
                program: program.to_string(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(GadgetError::CommandFailed {
                program: program.to_string(),
                status: status.to_string(),
            })
        }
    }
}

impl HostServices for SystemHostServices {
    fn load_module(&self, module: &str) -> GadgetResult<()> {
        info!(module, "Loading kernel module");
        Self::run("modprobe", &[module])
    }

    fn mount_functionfs(&self, instance: &str, mountpoint: &Path) -> GadgetResult<()> {
        let target = mountpoint.to_string_lossy();
        info!(instance, mountpoint = %target, "Mounting FunctionFS");
        Self::run("mount", &["-t", "functionfs", instance, &target])
    }

    fn unmount(&self, mountpoint: &Path) -> GadgetResult<()> {
        let target = mountpoint.to_string_lossy();
        info!(mountpoint = %target, "Unmounting");
        Self::run("umount", &[&target])
    }

    fn start_service(&self, unit: &str) -> GadgetResult<()> {
        info!(unit, "Starting service");
        Self::run("systemctl", &["start", unit])
    }

    fn stop_service(&self, unit: &str) -> GadgetResult<()> {
        info!(unit, "Stopping service");
        Self::run("systemctl", &["stop", unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_getty_unit_name() {
        assert_eq!(getty_unit("0\n"), "getty@ttyGS0.service");
        assert_eq!(getty_unit("3"), "getty@ttyGS3.service");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let result = SystemHostServices::run("gadgetctl-no-such-program", &[]);
        assert!(matches!(result, Err(GadgetError::CommandSpawn { .. })));
    }
}
