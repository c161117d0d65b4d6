//! Commands that drive the HID device nodes

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam::channel::RecvTimeoutError;
use gadget_runtime::{
    GadgetDevices, GadgetEvent, HidDevice, KeyboardDevice, KeyboardSession,
    OutputReportListener, ReportSink, Runtime, RuntimeError, RuntimeResult, StdinSource,
};
use hid_gadget_protocol::KeyDisplayState;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::commands::Context;
use crate::error::CliError;
use crate::output;

const EVENT_WAIT: Duration = Duration::from_millis(100);

fn discover(ctx: &Context) -> Result<GadgetDevices> {
    let manager = ctx.manager()?;
    Ok(GadgetDevices::discover(&manager, &ctx.config.runtime)?)
}

/// Translate JSON-lines controller frames from stdin until EOF.
pub fn run(ctx: &Context) -> Result<()> {
    let devices = discover(ctx)?;
    if devices.joystick.is_none() && devices.mouse.is_none() {
        return Err(CliError::NoDevices("run").into());
    }

    let runtime = Runtime::spawn(StdinSource::stdin(), &devices, &ctx.config.runtime)?;
    let events = runtime.events().clone();
    loop {
        match events.recv_timeout(EVENT_WAIT) {
            Ok(event) => output::print_event(&event, ctx.json),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if runtime.translation_finished() {
            break;
        }
    }
    for event in events.try_iter() {
        output::print_event(&event, ctx.json);
    }

    let frames = runtime.join()?;
    info!(frames, "Run finished");
    Ok(())
}

/// Type `text` on the keyboard function, or tap each entry as a key name.
pub fn type_text(ctx: &Context, text: &[String], keys: bool) -> Result<()> {
    let devices = discover(ctx)?;
    let path = devices.keyboard.ok_or(CliError::NoDevices("type"))?;

    let device = HidDevice::open(&path)?;
    let display = Arc::new(Mutex::new(KeyDisplayState::default()));
    let reader = device.open_reader()?;
    if let Some(leds) = OutputReportListener::new(reader, display.clone()).take_pending()? {
        debug!(?leds, "Host LED state");
    }

    let keyboard = KeyboardDevice::new(ctx.config.runtime.keyboard_rollover, device);
    let mut session = KeyboardSession::new(keyboard, display);
    type_and_release(&mut session, text, keys)?;
    output::print_success(&format!("Typed on {}", path.display()), ctx.json);
    Ok(())
}

/// Typing stops at the first error, but the keyboard is released either way.
fn type_and_release<S: ReportSink>(
    session: &mut KeyboardSession<S>,
    text: &[String],
    keys: bool,
) -> RuntimeResult<()> {
    let typed = if keys {
        text.iter().try_for_each(|key| session.type_key(key))
    } else {
        session.type_text(&text.join(" "))
    };
    let released = session.close();
    typed.and(released)
}

/// Print every LED report the host sends to the keyboard function.
pub fn watch_leds(ctx: &Context) -> Result<()> {
    let devices = discover(ctx)?;
    let path = devices.keyboard.ok_or(CliError::NoDevices("watch-leds"))?;
    let file = File::open(&path).map_err(|source| RuntimeError::Open {
        path: path.clone(),
        source,
    })?;

    if !ctx.json {
        println!("Watching {} (Ctrl+C to stop)", path.display());
    }
    let display = Arc::new(Mutex::new(KeyDisplayState::default()));
    let mut listener = OutputReportListener::new(file, display);
    while let Some(leds) = listener.step()? {
        output::print_event(&GadgetEvent::Leds(leds), ctx.json);
    }
    Ok(())
}
