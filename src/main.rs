//! wireguard-loop daemon entry point.
//!
//! ```text
//! wireguard-loop [-f|--foreground] <INTERFACE-NAME>
//!     → config from environment
//!     → loop device
//!     → control socket (inherited or bootstrapped)
//!     → daemonize (parent exits 0) or serve until a termination source fires
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::Instrument;

use wireguard_loop::config::{self, validation::validate_interface_name};
use wireguard_loop::device::{LoopDevice, DEFAULT_MTU};
use wireguard_loop::engine::LoopbackEngine;
use wireguard_loop::lifecycle::startup::{self, ControlChannel, SetupError};
use wireguard_loop::lifecycle::{daemonize, should_daemonize, TerminationSignals};
use wireguard_loop::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "wireguard-loop", disable_version_flag = true)]
struct Cli {
    /// Stay in the foreground instead of daemonizing
    #[arg(short = 'f', long)]
    foreground: bool,

    /// Print version information and exit
    #[arg(long)]
    version: bool,

    /// Name of the interface to create
    #[arg(value_name = "INTERFACE-NAME", required_unless_present = "version")]
    interface: Option<String>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage problems are reported but are not setup failures.
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    if cli.version {
        println!("{}", version_text());
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Setup failed");
            ExitCode::FAILURE
        }
    }
}

fn version_text() -> String {
    format!(
        "wireguard-loop v{}\n\nUserspace WireGuard loop daemon for {}-{}.",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

fn run(cli: Cli) -> Result<(), SetupError> {
    let config = match config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging depends on the config, so report this one directly.
            eprintln!("wireguard-loop: {e}");
            return Err(e.into());
        }
    };
    logging::init(config.log_level);

    let interface = cli.interface.unwrap_or_default();
    validate_interface_name(&interface)?;

    let span = tracing::info_span!("wireguard", interface = %interface);
    let _entered = span.enter();
    tracing::debug!("Starting wireguard-loop version {}", env!("CARGO_PKG_VERSION"));

    let device = Arc::new(LoopDevice::create(interface.as_str(), DEFAULT_MTU as i32));
    let channel = startup::open_control_channel(&config, &interface)?;

    if should_daemonize(cli.foreground, &config) {
        if let ControlChannel::Listener { fd, .. } = channel {
            let pid = daemonize(fd, &config)?;
            tracing::debug!(pid, "Daemonized, parent exiting");
            return Ok(());
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let reason = runtime.block_on(
        async move {
            let signals = TerminationSignals::install()?;
            let engine = LoopbackEngine::new(Arc::clone(&device));
            let _pump = engine.start();
            startup::run(engine, device, channel, signals.recv()).await
        }
        .instrument(span.clone()),
    )?;

    tracing::debug!(reason = reason.label(), "Stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn foreground_flag_and_interface() {
        let cli = Cli::try_parse_from(["wireguard-loop", "-f", "wg0"]).unwrap();
        assert!(cli.foreground);
        assert_eq!(cli.interface.as_deref(), Some("wg0"));
    }

    #[test]
    fn version_needs_no_interface() {
        let cli = Cli::try_parse_from(["wireguard-loop", "--version"]).unwrap();
        assert!(cli.version);
        assert!(cli.interface.is_none());
    }

    #[test]
    fn missing_interface_is_an_error() {
        assert!(Cli::try_parse_from(["wireguard-loop"]).is_err());
        assert!(Cli::try_parse_from(["wireguard-loop", "wg0", "extra"]).is_err());
    }

    #[test]
    fn version_text_names_platform() {
        let text = version_text();
        assert!(text.starts_with(&format!("wireguard-loop v{}", env!("CARGO_PKG_VERSION"))));
        assert!(text.contains(std::env::consts::OS));
    }
}
