use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pushsniff::capture::{default_interface, list_interfaces, sort_by_activity};
use pushsniff::reporter::{ConsoleReporter, EventReporter};
use pushsniff::session::PACKET_LOG_TARGET;
use pushsniff::{CaptureController, PnetBackend, SnifferConfig, StreamEndpoint};

/// How often the main thread checks on the capture.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "pushsniff")]
#[command(about = "Capture an RTMP push server address and stream key from local traffic")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List network interfaces, active ones first
    Interfaces,
    /// Capture until the server address and stream key are found
    Capture {
        /// Interface to capture on (repeatable)
        #[arg(short, long = "interface")]
        interfaces: Vec<String>,
        /// Capture on every active interface
        #[arg(short, long)]
        all: bool,
        /// Log a line for every TCP segment seen
        #[arg(long)]
        show_packets: bool,
        /// Give up after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Also print the combined publish URL
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Messages delivered to the main thread.
enum Event {
    Found(StreamEndpoint),
    Interrupted,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = SnifferConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Interfaces => {
            init_tracing(&config.log_level, false);
            print_interfaces();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Capture {
            interfaces,
            all,
            show_packets,
            timeout,
            verbose,
        } => {
            init_tracing(&config.log_level, show_packets);
            let targets = resolve_targets(&config, interfaces, all)?;
            capture(&config, targets, timeout.map(Duration::from_secs), verbose)
        }
    }
}

/// Logs go to stderr; packet summaries only when asked for.
fn init_tracing(level: &str, show_packets: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let packets = if show_packets { "info" } else { "off" };
        EnvFilter::new(format!("{},{}={}", level, PACKET_LOG_TARGET, packets))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_interfaces() {
    let interfaces = sort_by_activity(list_interfaces());
    let default = default_interface(&interfaces).map(|iface| iface.name.clone());

    if interfaces.is_empty() {
        println!("No network interfaces found");
        return;
    }

    for iface in &interfaces {
        let marker = if default.as_deref() == Some(iface.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {} [{}]", marker, iface.display_name(), iface.ips_display());
    }

    let active = interfaces.iter().filter(|iface| iface.is_active()).count();
    println!("\n{} interface(s), {} active", interfaces.len(), active);
}

/// Command line first, then `listen_all`, then configured names, then the default.
fn resolve_targets(config: &SnifferConfig, cli_interfaces: Vec<String>, all: bool) -> Result<Vec<String>> {
    if all || (cli_interfaces.is_empty() && config.listen_all) {
        let active: Vec<String> = list_interfaces()
            .into_iter()
            .filter(|iface| iface.is_active())
            .map(|iface| iface.name)
            .collect();
        if active.is_empty() {
            bail!("no active network interface found");
        }
        return Ok(active);
    }

    if !cli_interfaces.is_empty() {
        return Ok(cli_interfaces);
    }

    if !config.interfaces.is_empty() {
        return Ok(config.interfaces.clone());
    }

    let interfaces = list_interfaces();
    match default_interface(&interfaces) {
        Some(iface) => {
            tracing::info!("Using default interface {}", iface.display_name());
            Ok(vec![iface.name.clone()])
        }
        None => bail!("no suitable interface found, pass one with --interface"),
    }
}

fn capture(
    config: &SnifferConfig,
    targets: Vec<String>,
    timeout: Option<Duration>,
    verbose: bool,
) -> Result<ExitCode> {
    let extractor = config.build_extractor().context("Invalid matcher configuration")?;
    for matcher in [extractor.server_matcher(), extractor.stream_key_matcher()] {
        tracing::debug!(
            "Looking for {} in payloads containing {:?} ({:?})",
            matcher.name(),
            matcher.signature(),
            matcher.cleanup()
        );
    }
    let controller = CaptureController::new(Arc::new(PnetBackend), extractor)
        .with_stop_timeout(config.stop_timeout);
    let reporter = ConsoleReporter::new().with_verbose(verbose);

    let (tx, rx) = mpsc::channel();

    let found_tx = tx.clone();
    controller.add_callback(move |server, key| {
        found_tx
            .send(Event::Found(StreamEndpoint::new(server, key)))
            .context("main thread is gone")
    });

    ctrlc::set_handler(move || {
        let _ = tx.send(Event::Interrupted);
    })
    .context("Failed to install Ctrl+C handler")?;

    reporter.on_start(&targets);
    controller.start_multi(targets.as_slice());

    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let result = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Event::Found(endpoint)) => {
                reporter.report(&endpoint);
                break Some(endpoint);
            }
            Ok(Event::Interrupted) => {
                tracing::info!("Interrupted");
                break None;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break None,
        }

        if !controller.is_active() {
            // Loops may have ended right after a result was sent
            break controller.result().inspect(|endpoint| reporter.report(endpoint));
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::warn!("Timed out waiting for the stream key");
            break None;
        }
    };

    controller.stop();
    reporter.on_stop(result.as_ref());

    Ok(if result.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
