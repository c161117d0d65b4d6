//! gadgetctl - USB HID gadget control
//!
//! Sets up the configfs gadget, switches functions on and off, and drives
//! the resulting `hidg` device nodes.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod completion;
mod config;
mod error;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gadget_configfs::FunctionKind;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Context;
use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "gadgetctl")]
#[command(about = "USB HID gadget control - emulate a joystick, mouse and keyboard over USB")]
#[command(version)]
#[command(long_about = "
gadgetctl manages a Linux USB gadget that presents joystick, mouse and
keyboard HID functions (plus optional MTP and serial shell) to a USB host,
and drives those functions from controller input.

Most commands need write access to configfs, usually root.
Use --json for machine-readable output.
")]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "GADGETCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the gadget with its identity, strings and configuration
    Setup,

    /// Remove the gadget and all of its functions
    Destroy {
        /// Unbind the gadget first if it is active
        #[arg(short, long)]
        force: bool,
    },

    /// Bind the gadget to a USB device controller
    Activate {
        /// Controller name under /sys/class/udc (default: config, then first found)
        #[arg(long)]
        udc: Option<String>,
    },

    /// Unbind the gadget from its controller
    Deactivate,

    /// Create a function and link it into the configuration
    Enable {
        /// joystick, mouse, keyboard, mtp or shell
        function: FunctionKind,
        /// Leave the gadget unbound afterwards
        #[arg(long)]
        no_activate: bool,
    },

    /// Unlink and remove a function
    Disable {
        /// joystick, mouse, keyboard, mtp or shell
        function: FunctionKind,
        /// Leave the gadget unbound afterwards
        #[arg(long)]
        no_activate: bool,
    },

    /// Show gadget state, controller and linked functions
    Status,

    /// Translate JSON-lines controller input from stdin into HID reports
    Run,

    /// Type text on the keyboard function
    Type {
        /// Text to type; words are joined with spaces
        #[arg(required = true)]
        text: Vec<String>,
        /// Treat each argument as a key name (ENTER, F5, SHIFT_LEFT, ...)
        #[arg(short, long)]
        keys: bool,
    },

    /// Print keyboard LED changes sent by the host
    WatchLeds,

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "gadgetctl={log_level},gadget_configfs={log_level},gadget_runtime={log_level},hid_gadget_protocol={log_level}"
                )
                .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = execute_command(&cli) {
        let exit_code = error::exit_code(&e);
        if cli.json {
            output::print_error_json(&e, exit_code);
        } else {
            output::print_error_human(&e);
        }
        std::process::exit(exit_code);
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    if let Commands::Completion { shell } = &cli.command {
        completion::generate_completion(*shell);
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    let ctx = Context::new(config, cli.json);
    match &cli.command {
        Commands::Setup => commands::gadget::setup(&ctx),
        Commands::Destroy { force } => commands::gadget::destroy(&ctx, *force),
        Commands::Activate { udc } => commands::gadget::activate(&ctx, udc.as_deref()),
        Commands::Deactivate => commands::gadget::deactivate(&ctx),
        Commands::Enable {
            function,
            no_activate,
        } => commands::gadget::enable(&ctx, *function, !no_activate),
        Commands::Disable {
            function,
            no_activate,
        } => commands::gadget::disable(&ctx, *function, !no_activate),
        Commands::Status => commands::gadget::status(&ctx),
        Commands::Run => commands::runtime::run(&ctx),
        Commands::Type { text, keys } => commands::runtime::type_text(&ctx, text, *keys),
        Commands::WatchLeds => commands::runtime::watch_leds(&ctx),
        Commands::Completion { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_status_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["gadgetctl", "status"])?;
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        assert!(matches!(cli.command, Commands::Status));
        Ok(())
    }

    #[test]
    fn parse_global_flags_after_subcommand() -> TestResult {
        let cli = Cli::try_parse_from([
            "gadgetctl",
            "activate",
            "--udc",
            "fe980000.usb",
            "--json",
            "-vv",
            "--config",
            "/tmp/g.yaml",
        ])?;
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/g.yaml")));
        match cli.command {
            Commands::Activate { udc } => assert_eq!(udc.as_deref(), Some("fe980000.usb")),
            other => return Err(format!("unexpected {other:?}").into()),
        }
        Ok(())
    }

    #[test]
    fn parse_enable_function() -> TestResult {
        let cli = Cli::try_parse_from(["gadgetctl", "enable", "keyboard", "--no-activate"])?;
        match cli.command {
            Commands::Enable {
                function,
                no_activate,
            } => {
                assert_eq!(function, FunctionKind::Keyboard);
                assert!(no_activate);
            }
            other => return Err(format!("unexpected {other:?}").into()),
        }
        Ok(())
    }

    #[test]
    fn parse_rejects_unknown_function() {
        assert!(Cli::try_parse_from(["gadgetctl", "enable", "gamepad"]).is_err());
    }

    #[test]
    fn parse_destroy_force_and_type_keys() -> TestResult {
        let cli = Cli::try_parse_from(["gadgetctl", "destroy", "--force"])?;
        assert!(matches!(cli.command, Commands::Destroy { force: true }));

        let cli = Cli::try_parse_from(["gadgetctl", "type", "-k", "ENTER", "F5"])?;
        match cli.command {
            Commands::Type { text, keys } => {
                assert!(keys);
                assert_eq!(text, vec!["ENTER".to_string(), "F5".to_string()]);
            }
            other => return Err(format!("unexpected {other:?}").into()),
        }
        Ok(())
    }

    #[test]
    fn parse_type_requires_text() {
        assert!(Cli::try_parse_from(["gadgetctl", "type"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
