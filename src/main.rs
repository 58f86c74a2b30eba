use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use adaptcam::budget::{CaptureConstraints, DegradeHint, DegradeReason, FacingMode};
use adaptcam::runtime::assess;
use adaptcam::storage::FragmentState;
use adaptcam::{AdaptcamConfig, AdaptiveRuntime, Assessment, CapabilitySignals, DeviceTier, ResourceBudget, StaticSignals};

#[derive(Parser, Debug)]
#[command(name = "adaptcam")]
#[command(about = "Classify a device and host and print the resolved camera resource budget")]
#[command(version)]
#[command(long_about = "Reads capability signals (a JSON file and/or a user agent), classifies \
the device tier and embedding host, resolves the resource budget and capture constraints, and \
prints them as a JSON report.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "adaptcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// User agent to classify
    #[arg(short, long, value_name = "UA", help = "User agent string, overrides the one in --signals")]
    user_agent: Option<String>,

    /// Capability signals as JSON
    #[arg(short, long, value_name = "FILE", help = "JSON file with capability signals")]
    signals: Option<String>,

    /// Resolve the budget one tier lower, as after a sustained degrade report
    #[arg(long, help = "Apply a degrade hint when resolving the budget")]
    degrade: bool,

    /// Camera facing mode for the capture constraints
    #[arg(long, default_value = "user", value_parser = parse_facing, help = "Camera facing mode: user or environment")]
    facing: FacingMode,

    /// Force a device tier instead of the classified one
    #[arg(long, value_parser = parse_tier, help = "Force the device tier: flagship, high, mid, low or unknown")]
    tier: Option<DeviceTier>,

    /// Also restore or mint the session token through the storage chain
    #[arg(long, help = "Initialize the storage chain and report the session token")]
    session: bool,

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
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

fn parse_facing(raw: &str) -> std::result::Result<FacingMode, String> {
    FacingMode::parse(raw).ok_or_else(|| format!("unknown facing mode '{}'", raw))
}

fn parse_tier(raw: &str) -> std::result::Result<DeviceTier, String> {
    DeviceTier::parse(raw).ok_or_else(|| format!("unknown device tier '{}'", raw))
}

#[derive(Serialize)]
struct Report {
    #[serde(flatten)]
    assessment: Assessment,
    /// Budget after the degrade hint, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded_budget: Option<ResourceBudget>,
    constraints: CaptureConstraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting adaptcam v{}", env!("CARGO_PKG_VERSION"));

    let config = match AdaptcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let mut signals = match &args.signals {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read signals file {}", path))?;
            serde_json::from_str::<CapabilitySignals>(&raw)
                .with_context(|| format!("Invalid signals JSON in {}", path))?
        }
        None => CapabilitySignals::default(),
    };
    if let Some(user_agent) = &args.user_agent {
        signals.user_agent = user_agent.clone();
    }

    let (assessment, session_token) = if args.session {
        let mut runtime = AdaptiveRuntime::builder()
            .config(config.clone())
            .signals(Arc::new(StaticSignals::new(signals)))
            .navigation(Arc::new(FragmentState::default()))
            .tier_override(args.tier)
            .build()?;
        runtime.initialize().await.map_err(|e| {
            error!("Failed to initialize runtime: {}", e);
            e
        })?;
        let token = runtime.session_token().map(str::to_string);
        let assessment = runtime
            .assessment()
            .cloned()
            .context("Runtime produced no assessment")?;
        (assessment, token)
    } else {
        (assess(&config, signals, args.tier), None)
    };

    let degraded_budget = args.degrade.then(|| {
        let hint = DegradeHint {
            reason: DegradeReason::LowFrameRate,
            observed_fps: 0.0,
            mean_memory_mb: None,
        };
        assessment.degraded_budget(&assessment.budget, &hint)
    });

    let effective = degraded_budget.as_ref().unwrap_or(&assessment.budget);
    let constraints = adaptcam::capture_constraints(effective, &assessment.host, args.facing);

    let report = Report {
        assessment,
        degraded_budget,
        constraints,
        session_token,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("adaptcam={}", log_level)));

    // The report goes to stdout, logs to stderr
    let fmt_layer = match args.log_format.as_deref() {
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
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
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
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# adaptcam configuration file");
    println!("# Default values for every available option");
    println!();
    println!("{}", toml::to_string_pretty(&AdaptcamConfig::default())?);
    Ok(())
}
