//! Gadget lifecycle commands

use anyhow::Result;
use gadget_configfs::FunctionKind;
use tracing::info;

use crate::commands::Context;
use crate::output;

pub fn setup(ctx: &Context) -> Result<()> {
    let manager = ctx.manager()?;
    manager.setup()?;
    output::print_success(
        &format!("Gadget {} configured", manager.config().name),
        ctx.json,
    );
    Ok(())
}

/// Tear the gadget down. With `force`, unbind it first.
pub fn destroy(ctx: &Context, force: bool) -> Result<()> {
    let manager = ctx.manager()?;
    if force && manager.deactivate()? {
        info!("Deactivated before destroy");
    }
    manager.destroy()?;
    output::print_success(
        &format!("Gadget {} removed", manager.config().name),
        ctx.json,
    );
    Ok(())
}

pub fn activate(ctx: &Context, udc: Option<&str>) -> Result<()> {
    let manager = ctx.manager()?;
    let bound = manager.activate(udc)?;
    output::print_result(&format!("Bound to {bound}"), &bound, ctx.json);
    Ok(())
}

pub fn deactivate(ctx: &Context) -> Result<()> {
    let manager = ctx.manager()?;
    let message = if manager.deactivate()? {
        "Gadget unbound"
    } else {
        "Gadget was not bound"
    };
    output::print_success(message, ctx.json);
    Ok(())
}

pub fn enable(ctx: &Context, function: FunctionKind, activate: bool) -> Result<()> {
    let manager = ctx.manager()?;
    manager.enable(function, activate)?;
    let node = if function.is_hid() {
        manager.device_node(function).ok()
    } else {
        None
    };
    match node {
        Some(node) => output::print_result(
            &format!("Enabled {function} at {}", node.display()),
            &node,
            ctx.json,
        ),
        None => output::print_success(&format!("Enabled {function}"), ctx.json),
    }
    Ok(())
}

pub fn disable(ctx: &Context, function: FunctionKind, activate: bool) -> Result<()> {
    let manager = ctx.manager()?;
    manager.disable(function, activate)?;
    output::print_success(&format!("Disabled {function}"), ctx.json);
    Ok(())
}

pub fn status(ctx: &Context) -> Result<()> {
    let manager = ctx.manager()?;
    output::print_status(&manager.status()?, ctx.json);
    Ok(())
}
