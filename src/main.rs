use anyhow::Result;
use clap::Parser;
use facelight::control::Collaborators;
use facelight::device::DeviceInfo;
use facelight::local::{LocalObjectStorage, StillImageFrameSource};
use facelight::sim::{SimulatedAnalysisService, SimulatedDeviceTransport};
use facelight::{FacelightConfig, FacelightOrchestrator};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "facelight")]
#[command(about = "Photo booth that reads the mood on a face and colours the room to match")]
#[command(version)]
#[command(long_about = "Facelight captures a still, uploads it, asks an analysis service for age, \
gender and dominant emotion, overlays the result and sets every light on the paired bridge to \
the colour of that emotion. Captures are triggered from the keyboard or a UDP trigger channel.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "facelight.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - load known bridges but don't start components")]
    dry_run: bool,

    /// Disable the interactive keyboard trigger
    #[arg(long, help = "Do not read capture commands from the terminal")]
    no_keyboard: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file
    #[arg(long, value_name = "PATH", help = "Write logs to a daily rolling file at PATH")]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Dropping the guard flushes the file writer, so it lives until exit
    let log_guard = init_logging(&args)?;

    info!("Starting Facelight v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match FacelightConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let collaborators = build_collaborators(&config);

    let mut orchestrator = FacelightOrchestrator::new(config, collaborators).map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;
    if args.no_keyboard {
        orchestrator.set_keyboard_enabled(false);
    }

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - known bridges loaded");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Facelight exited with code: {}", exit_code);
    drop(log_guard);
    std::process::exit(exit_code);
}

/// Local still-image camera and filesystem uploads, with a scripted bridge
/// and analysis service standing in for the network
fn build_collaborators(config: &FacelightConfig) -> Collaborators {
    let bridge = DeviceInfo::new("127.0.0.1", "facelight-sim-bridge");

    Collaborators {
        frame_source: Arc::new(StillImageFrameSource::new(&config.camera.still_image_path)),
        storage: Arc::new(LocalObjectStorage::new(
            &config.storage.upload_root,
            config.storage.public_base_url.clone(),
        )),
        analysis: Arc::new(SimulatedAnalysisService::new()),
        transport: Arc::new(SimulatedDeviceTransport::with_bridge(bridge, 1, 3)),
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("facelight={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match args.log_file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| "facelight.log".into());

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Facelight Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Every key can be overridden with FACELIGHT_<SECTION>__<KEY> environment variables");
    println!();
    println!("{}", toml::to_string_pretty(&FacelightConfig::default())?);
    Ok(())
}
