use anyhow::{anyhow, bail, Result};
use clap::Parser;
use photobooth::console::{key_help, TerminalView};
use photobooth::keyboard_input::{BoothCommand, KeyboardInputHandler};
use photobooth::{BoothRequest, MonotonicClock, Orchestrator, PhotoboothConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "photobooth")]
#[command(about = "Camera photobooth with countdowns, collages and animations")]
#[command(version)]
#[command(long_about = "A photobooth that captures timed bursts of photos, assembles them \
into a collage or an animated GIF, and archives the result to a USB drive or an upload \
command. Keys bound to booth modes start a burst.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "photobooth.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the booth")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - bring the camera up and exit
    #[arg(long, help = "Perform dry run - initialize the camera but don't take photos")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR", help = "Directory for rolling log files")]
    log_dir: Option<String>,

    /// Run a single burst of the named mode and exit
    #[arg(long, value_name = "MODE", help = "Capture one burst of the named mode, then exit")]
    once: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting Photobooth v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match PhotoboothConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let mut orchestrator = Orchestrator::from_config(
        &config,
        Box::new(TerminalView::stdout()),
        Arc::new(MonotonicClock::new()),
    )
    .map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    // A camera failure here is not fatal; the next request retries it
    if let Err(e) = orchestrator.start() {
        warn!("Camera not ready at startup: {}", e);
    }

    let shutdown_timeout = Duration::from_secs(config.system.shutdown_timeout_secs);

    if args.dry_run {
        info!("Dry run mode - components initialized");
        println!("✓ Dry run completed successfully");
        orchestrator.shutdown(shutdown_timeout);
        return Ok(());
    }

    let poll_interval = Duration::from_millis(config.system.poll_interval_ms);
    let result = match args.once.as_deref() {
        Some(mode_name) => run_once(&mut orchestrator, &config, mode_name, poll_interval),
        None => run_interactive(&mut orchestrator, &config, poll_interval),
    };

    orchestrator.shutdown(shutdown_timeout);
    info!("Photobooth stopped");
    result
}

/// Key-driven loop. The keyboard poll timeout paces the ticks.
fn run_interactive(
    orchestrator: &mut Orchestrator,
    config: &PhotoboothConfig,
    poll_interval: Duration,
) -> Result<()> {
    let mode_keys: Vec<char> = config
        .modes
        .iter()
        .filter_map(|mode| mode.key.chars().next())
        .collect();

    for line in key_help(&config.modes) {
        println!("{}", line);
    }

    let mut keyboard = KeyboardInputHandler::new(mode_keys);
    keyboard.start()?;

    loop {
        match keyboard.poll(poll_interval) {
            Some(BoothCommand::Quit) => {
                info!("Quit requested");
                break;
            }
            Some(BoothCommand::Capture(key)) => {
                if let Some(mode) = config.mode_for_key(key) {
                    info!("Mode '{}' requested", mode.name);
                    orchestrator.request(BoothRequest::from_mode(mode));
                }
            }
            Some(BoothCommand::Email) => {
                orchestrator.email_last_artifact(None);
            }
            Some(BoothCommand::Cancel) => {
                orchestrator.cancel_burst();
            }
            None => {}
        }

        orchestrator.tick();
    }

    keyboard.stop();
    Ok(())
}

/// Capture one burst, wait for its background work, then return
fn run_once(
    orchestrator: &mut Orchestrator,
    config: &PhotoboothConfig,
    mode_name: &str,
    poll_interval: Duration,
) -> Result<()> {
    let mode = config
        .mode_by_name(mode_name)
        .ok_or_else(|| anyhow!("Unknown mode '{}'", mode_name))?;

    if !orchestrator.request(BoothRequest::from_mode(mode)) {
        bail!("Mode '{}' could not be started", mode.name);
    }

    while !orchestrator.is_idle() {
        orchestrator.tick();
        std::thread::sleep(poll_interval);
    }

    let deadline = Instant::now() + Duration::from_secs(config.system.shutdown_timeout_secs);
    while !orchestrator.worker().is_idle() && Instant::now() < deadline {
        std::thread::sleep(poll_interval);
    }
    orchestrator.drain_status();

    match orchestrator.last_artifact() {
        Some(artifact) => {
            println!("{}", artifact.path.display());
            Ok(())
        }
        None => bail!("No artifact was produced"),
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("photobooth={}", log_level)));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    // stdout belongs to the booth display; logs go to stderr
    let console_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };
    layers.push(console_layer);

    let guard = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "photobooth.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_target(true)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Photobooth Configuration File");
    println!("# This is the default configuration with all available options");
    println!();
    println!("{}", toml::to_string_pretty(&PhotoboothConfig::default())?);
    Ok(())
}
