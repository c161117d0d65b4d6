//! Output formatting for CLI responses

use anyhow::Error;
use colored::*;
use gadget_configfs::{GadgetState, GadgetStatus};
use gadget_runtime::GadgetEvent;
use hid_gadget_protocol::KeyboardLeds;
use serde::Serialize;
use serde_json::json;

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format output as JSON: {}", e),
    }
}

/// Print error in JSON format
pub fn print_error_json(error: &Error, exit_code: i32) {
    let causes: Vec<String> = error.chain().skip(1).map(|c| c.to_string()).collect();
    print_json(&json!({
        "success": false,
        "error": {
            "message": error.to_string(),
            "causes": causes,
            "exit_code": exit_code,
        }
    }));
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

/// Print the outcome of a lifecycle command
pub fn print_success(message: &str, json: bool) {
    if json {
        print_json(&json!({ "success": true, "message": message }));
    } else {
        println!("{} {}", "✓".green(), message);
    }
}

/// Print a serializable payload alongside a human message
pub fn print_result<T: Serialize>(message: &str, data: &T, json: bool) {
    if json {
        print_json(&json!({ "success": true, "message": message, "data": data }));
    } else {
        println!("{} {}", "✓".green(), message);
    }
}

pub fn print_status(status: &GadgetStatus, json: bool) {
    if json {
        print_json(&json!({ "success": true, "status": status }));
        return;
    }

    let state = match status.state {
        GadgetState::Active => "active".green(),
        GadgetState::Configured => "configured".yellow(),
        GadgetState::Unconfigured => "unconfigured".red(),
    };
    println!("{} {}", "Gadget:".bold(), status.name.bold());
    println!("  Path:        {}", status.path.display().to_string().dimmed());
    println!("  State:       {}", state);
    match &status.controller {
        Some(udc) => println!("  Controller:  {}", udc),
        None => println!("  Controller:  {}", "none".dimmed()),
    }
    if status.functions.is_empty() {
        println!("  Functions:   {}", "none".dimmed());
    } else {
        println!("  Functions:   {}", status.functions.join(", "));
    }
    if status.available_controllers.is_empty() {
        println!("  Available:   {}", "no UDC found".yellow());
    } else {
        println!("  Available:   {}", status.available_controllers.join(", "));
    }
}

fn led(name: &str, on: bool) -> ColoredString {
    if on { name.green().bold() } else { name.dimmed() }
}

pub fn format_leds(leds: &KeyboardLeds) -> String {
    format!(
        "{} {} {}",
        led("NUM", leds.num_lock),
        led("CAPS", leds.caps_lock),
        led("SCROLL", leds.scroll_lock)
    )
}

/// One line per event for `run` and `watch-leds`
pub fn print_event(event: &GadgetEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Failed to format event as JSON: {}", e),
        }
        return;
    }
    match event {
        GadgetEvent::ControllerConnected => println!("{}", "Controller connected".green()),
        GadgetEvent::ControllerDisconnected => {
            println!("{}", "Controller disconnected".yellow())
        }
        GadgetEvent::SourceFinished => println!("{}", "Input finished".dimmed()),
        GadgetEvent::Leds(leds) => println!("LEDs: {}", format_leds(leds)),
        GadgetEvent::KeyDisplay(display) => println!(
            "Keys: shift={} caps={} fn={} ({})",
            display.shift,
            display.capslock,
            display.function,
            if display.uppercase() { "UPPER" } else { "lower" }
        ),
        // Frames are too frequent for a terminal.
        GadgetEvent::Input(_) => {}
    }
}
