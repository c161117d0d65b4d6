//! Gadget lifecycle against the in-memory configfs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gadget_configfs::mock::{HostCall, MemoryConfigFs, RecordingHost};
use gadget_configfs::{
    ConfigFsBackend, FunctionKind, FunctionSettings, GadgetConfig, GadgetError, GadgetManager,
    GadgetPaths, GadgetResult, GadgetState,
};
use hid_gadget_protocol::{HidClass, builtin_descriptor};

const UDC: &str = "fe980000.usb";

struct Harness {
    fs: Arc<MemoryConfigFs>,
    host: Arc<RecordingHost>,
    manager: GadgetManager,
}

fn config() -> GadgetConfig {
    GadgetConfig {
        paths: GadgetPaths::under("/t"),
        functions: FunctionSettings {
            mtp_mountpoint: PathBuf::from("/t/dev/ffs-mtp"),
            ..FunctionSettings::default()
        },
        ..GadgetConfig::default()
    }
}

fn harness_with(config: GadgetConfig, controllers: &[&str]) -> GadgetResult<Harness> {
    let fs = Arc::new(MemoryConfigFs::new(config.paths.clone()));
    for controller in controllers {
        fs.add_controller(controller);
    }
    let host = Arc::new(RecordingHost::new());
    let manager = GadgetManager::new(fs.clone(), host.clone(), config)?;
    Ok(Harness { fs, host, manager })
}

fn harness() -> GadgetResult<Harness> {
    harness_with(config(), &[UDC])
}

fn gadget_path(rel: &str) -> PathBuf {
    Path::new("/t/sys/kernel/config/usb_gadget/gadget-deck").join(rel)
}

fn text(fs: &MemoryConfigFs, rel: &str) -> String {
    fs.contents(&gadget_path(rel))
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default()
}

#[test]
fn test_setup_writes_identity_and_configuration() -> GadgetResult<()> {
    let h = harness()?;
    assert_eq!(h.manager.state()?, GadgetState::Unconfigured);

    h.manager.setup()?;
    assert_eq!(h.manager.state()?, GadgetState::Configured);
    assert_eq!(text(&h.fs, "idVendor"), "0x1d6b");
    assert_eq!(text(&h.fs, "idProduct"), "0x0104");
    assert_eq!(text(&h.fs, "bcdDevice"), "0x0100");
    assert_eq!(text(&h.fs, "bcdUSB"), "0x0200");
    assert_eq!(text(&h.fs, "strings/0x409/serialnumber"), "0123456789");
    assert_eq!(text(&h.fs, "strings/0x409/manufacturer"), "Valve");
    assert_eq!(text(&h.fs, "strings/0x409/product"), "Steam Deck");
    assert_eq!(text(&h.fs, "configs/c.1/bmAttributes"), "0x80");
    assert_eq!(text(&h.fs, "configs/c.1/MaxPower"), "250");
    assert_eq!(
        text(&h.fs, "configs/c.1/strings/0x409/configuration"),
        "Steam Deck Configuration"
    );
    assert_eq!(
        h.host.calls(),
        vec![HostCall::LoadModule("libcomposite".to_string())]
    );

    // idempotent
    h.manager.setup()?;
    assert_eq!(h.manager.state()?, GadgetState::Configured);
    Ok(())
}

#[test]
fn test_enable_keyboard_binds_and_opens_node() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Keyboard, true)?;

    assert_eq!(h.manager.state()?, GadgetState::Active);
    assert_eq!(h.manager.bound_controller()?, Some(UDC.to_string()));
    assert_eq!(text(&h.fs, "functions/hid.keyboard/protocol"), "1");
    assert_eq!(text(&h.fs, "functions/hid.keyboard/subclass"), "1");
    assert_eq!(text(&h.fs, "functions/hid.keyboard/report_length"), "8");
    assert_eq!(
        h.fs.contents(&gadget_path("functions/hid.keyboard/report_desc")),
        Some(builtin_descriptor(HidClass::Keyboard).to_vec())
    );

    let node = h.manager.device_node(FunctionKind::Keyboard)?;
    assert_eq!(node, PathBuf::from("/t/dev/hidg0"));
    assert_eq!(h.fs.mode(&node), Some(0o666));
    Ok(())
}

#[test]
fn test_report_lengths_follow_descriptors() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Joystick, false)?;
    h.manager.enable(FunctionKind::Mouse, false)?;

    assert_eq!(text(&h.fs, "functions/hid.joystick/report_length"), "9");
    assert_eq!(text(&h.fs, "functions/hid.mouse/report_length"), "7");
    assert_eq!(text(&h.fs, "functions/hid.mouse/protocol"), "0");
    Ok(())
}

#[test]
fn test_enable_second_function_rebinds() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Keyboard, true)?;
    h.manager.enable(FunctionKind::Mouse, true)?;

    assert_eq!(h.fs.bind_count(), 2);
    let status = h.manager.status()?;
    assert_eq!(status.state, GadgetState::Active);
    assert_eq!(status.functions, vec!["hid.keyboard", "hid.mouse"]);
    assert_eq!(
        h.manager.enabled_functions()?,
        vec![FunctionKind::Keyboard, FunctionKind::Mouse]
    );
    assert_eq!(h.manager.device_node(FunctionKind::Mouse)?, PathBuf::from("/t/dev/hidg1"));
    Ok(())
}

#[test]
fn test_enable_is_idempotent() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Keyboard, true)?;
    h.manager.enable(FunctionKind::Keyboard, true)?;

    assert_eq!(h.manager.status()?.functions, vec!["hid.keyboard"]);
    assert_eq!(h.manager.state()?, GadgetState::Active);
    Ok(())
}

#[test]
fn test_enable_without_activation_stays_unbound() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Joystick, false)?;

    assert_eq!(h.manager.state()?, GadgetState::Configured);
    assert_eq!(h.fs.bind_count(), 0);

    assert_eq!(h.manager.activate(None)?, UDC);
    assert_eq!(h.manager.state()?, GadgetState::Active);
    // already bound
    assert_eq!(h.manager.activate(Some("other.usb"))?, UDC);
    assert_eq!(h.fs.bind_count(), 1);
    Ok(())
}

#[test]
fn test_disable_last_function_leaves_gadget_unbound() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Keyboard, true)?;
    h.manager.disable(FunctionKind::Keyboard, true)?;

    assert_eq!(h.manager.state()?, GadgetState::Configured);
    assert!(!h.fs.exists(&gadget_path("functions/hid.keyboard")));
    assert!(!h.fs.exists(Path::new("/t/dev/hidg0")));
    assert!(h.manager.status()?.functions.is_empty());
    Ok(())
}

#[test]
fn test_disable_with_remaining_functions_rebinds() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Keyboard, true)?;
    h.manager.enable(FunctionKind::Mouse, true)?;
    h.manager.disable(FunctionKind::Keyboard, true)?;

    assert_eq!(h.manager.state()?, GadgetState::Active);
    assert_eq!(h.fs.bind_count(), 3);
    assert_eq!(h.manager.status()?.functions, vec!["hid.mouse"]);
    Ok(())
}

#[test]
fn test_disable_not_enabled() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    assert!(matches!(
        h.manager.disable(FunctionKind::Mouse, true),
        Err(GadgetError::NotEnabled(FunctionKind::Mouse))
    ));
    Ok(())
}

#[test]
fn test_commands_before_setup() -> GadgetResult<()> {
    let h = harness()?;
    assert!(matches!(
        h.manager.enable(FunctionKind::Keyboard, true),
        Err(GadgetError::NotConfigured(_))
    ));
    assert!(matches!(
        h.manager.activate(None),
        Err(GadgetError::NotConfigured(_))
    ));
    assert!(matches!(h.manager.destroy(), Err(GadgetError::NotConfigured(_))));
    assert!(!h.manager.deactivate()?);
    Ok(())
}

#[test]
fn test_activate_without_controllers() -> GadgetResult<()> {
    let h = harness_with(config(), &[])?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Mouse, false)?;
    assert!(matches!(
        h.manager.activate(None),
        Err(GadgetError::NoControllerAvailable)
    ));
    assert_eq!(h.manager.state()?, GadgetState::Configured);
    Ok(())
}

#[test]
fn test_activate_prefers_configured_controller() -> GadgetResult<()> {
    let config = GadgetConfig {
        udc: Some("b.usb".to_string()),
        ..config()
    };
    let h = harness_with(config, &["a.usb", "b.usb"])?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Mouse, true)?;
    assert_eq!(h.manager.bound_controller()?, Some("b.usb".to_string()));
    assert_eq!(
        h.manager.status()?.available_controllers,
        vec!["a.usb", "b.usb"]
    );
    Ok(())
}

#[test]
fn test_activate_with_nothing_linked_is_rejected_by_kernel() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    let err = h.manager.activate(None);
    assert!(matches!(err, Err(GadgetError::Filesystem { op: "write", .. })));
    Ok(())
}

#[test]
fn test_deactivate_only_writes_when_bound() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Mouse, false)?;
    assert!(!h.manager.deactivate()?);

    let udc = gadget_path("UDC");
    assert!(h.fs.writes().iter().all(|(path, _)| *path != udc));

    h.manager.activate(None)?;
    assert!(h.manager.deactivate()?);
    assert_eq!(
        h.fs.writes().last(),
        Some(&(udc, b"\n".to_vec()))
    );
    Ok(())
}

#[test]
fn test_setup_refused_while_bound() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Mouse, true)?;
    assert!(matches!(h.manager.setup(), Err(GadgetError::StillActive(udc)) if udc == UDC));
    Ok(())
}

#[test]
fn test_destroy_refused_while_bound_then_tears_down() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Keyboard, true)?;
    h.manager.enable(FunctionKind::Joystick, true)?;

    let err = h.manager.destroy();
    assert!(matches!(err, Err(ref e) if e.is_busy()));
    assert_eq!(h.manager.state()?, GadgetState::Active);

    h.manager.deactivate()?;
    h.manager.destroy()?;
    assert_eq!(h.manager.state()?, GadgetState::Unconfigured);
    assert!(!h.fs.exists(&gadget_path("")));
    assert!(!h.fs.exists(Path::new("/t/dev/hidg0")));

    // a fresh setup works after teardown
    h.manager.setup()?;
    assert_eq!(h.manager.state()?, GadgetState::Configured);
    Ok(())
}

#[test]
fn test_mtp_mounts_and_unmounts_functionfs() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Mtp, false)?;

    let mountpoint = PathBuf::from("/t/dev/ffs-mtp");
    assert!(h.fs.exists(&mountpoint));
    assert!(h.host.calls().contains(&HostCall::Mount {
        instance: "mtp".to_string(),
        mountpoint: mountpoint.clone(),
    }));

    h.manager.disable(FunctionKind::Mtp, false)?;
    assert!(!h.fs.exists(&mountpoint));
    assert_eq!(h.host.calls().last(), Some(&HostCall::Unmount(mountpoint)));
    Ok(())
}

#[test]
fn test_shell_starts_and_stops_getty() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Shell, true)?;
    assert_eq!(
        h.host.calls().last(),
        Some(&HostCall::StartService("getty@ttyGS0.service".to_string()))
    );

    h.manager.disable(FunctionKind::Shell, true)?;
    assert_eq!(
        h.host.calls().last(),
        Some(&HostCall::StopService("getty@ttyGS0.service".to_string()))
    );
    assert_eq!(h.manager.state()?, GadgetState::Configured);
    Ok(())
}

#[test]
fn test_destroy_releases_side_resources() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Mtp, false)?;
    h.manager.enable(FunctionKind::Shell, false)?;
    h.manager.destroy()?;

    let calls = h.host.calls();
    assert!(calls.contains(&HostCall::Unmount(PathBuf::from("/t/dev/ffs-mtp"))));
    assert!(calls.contains(&HostCall::StopService("getty@ttyGS0.service".to_string())));
    assert_eq!(h.manager.state()?, GadgetState::Unconfigured);
    Ok(())
}

#[test]
fn test_device_node_errors() -> GadgetResult<()> {
    let h = harness()?;
    h.manager.setup()?;
    assert!(matches!(
        h.manager.device_node(FunctionKind::Mtp),
        Err(GadgetError::NotHid(FunctionKind::Mtp))
    ));
    assert!(matches!(
        h.manager.device_node(FunctionKind::Keyboard),
        Err(GadgetError::NotEnabled(FunctionKind::Keyboard))
    ));

    h.manager.enable(FunctionKind::Keyboard, false)?;
    h.fs.insert_file(Path::new("/t/sys/dev/char/240:0/uevent"), b"MAJOR=240\nMINOR=0\n");
    assert!(matches!(
        h.manager.device_node(FunctionKind::Keyboard),
        Err(GadgetError::DeviceNode { .. })
    ));
    Ok(())
}

#[test]
fn test_descriptor_file_overrides_builtin() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("keyboard.txt"),
        "0x05, 0x01, // Usage Page (Generic Desktop)\n\
         0x75, 0x08, 0x95, 0x04, 0x81, 0x02, // 4 bytes input\n",
    )?;
    let config = GadgetConfig {
        functions: FunctionSettings {
            descriptor_dir: Some(dir.path().to_path_buf()),
            ..config().functions
        },
        ..config()
    };
    let h = harness_with(config, &[UDC])?;
    h.manager.setup()?;
    h.manager.enable(FunctionKind::Keyboard, false)?;
    h.manager.enable(FunctionKind::Mouse, false)?;

    assert_eq!(text(&h.fs, "functions/hid.keyboard/report_length"), "4");
    assert_eq!(
        h.fs.contents(&gadget_path("functions/hid.keyboard/report_desc")),
        Some(vec![0x05, 0x01, 0x75, 0x08, 0x95, 0x04, 0x81, 0x02])
    );
    // no mouse.txt, built-in used
    assert_eq!(text(&h.fs, "functions/hid.mouse/report_length"), "7");
    Ok(())
}

#[test]
fn test_empty_descriptor_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("joystick.txt"), "// nothing here\n")?;
    let config = GadgetConfig {
        functions: FunctionSettings {
            descriptor_dir: Some(dir.path().to_path_buf()),
            ..config().functions
        },
        ..config()
    };
    let h = harness_with(config, &[UDC])?;
    h.manager.setup()?;
    assert!(matches!(
        h.manager.enable(FunctionKind::Joystick, true),
        Err(GadgetError::InvalidConfig(_))
    ));
    assert!(h.manager.status()?.functions.is_empty());
    Ok(())
}

#[test]
fn test_config_yaml_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let config: GadgetConfig = serde_yaml::from_str("name: pad\nudc: dummy_udc.0\n")?;
    assert_eq!(config.name, "pad");
    assert_eq!(config.udc.as_deref(), Some("dummy_udc.0"));
    assert_eq!(config.identity.vendor_id, 0x1d6b);
    assert!(config.load_module);
    Ok(())
}
