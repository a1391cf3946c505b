use anyhow::Result;
use clap::{Parser, ValueEnum};
use service_lifecycle::{LifecycleConfig, Service, ServiceOptions, State, TickerService};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "lifecycle-demo")]
#[command(about = "Drive a timer service through its start/stop lifecycle")]
#[command(version)]
#[command(long_about = "Runs a periodic ticker under the service lifecycle controller. \
The service is started, left running until Ctrl+C (or --run-for elapses), then stopped. \
Every state change is logged, and startup or shutdown failures set a non-zero exit code.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lifecycle.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the service")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Stop automatically after this many seconds
    #[arg(long, value_name = "SECONDS", help = "Stop the service after SECONDS instead of waiting for Ctrl+C")]
    run_for: Option<u64>,

    /// Make startup fail to exercise the failure path
    #[arg(long, help = "Make the ticker fail during startup")]
    fail_start: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// One line per event, suited to watching state changes scroll by
    Compact,
    /// Machine-readable JSON lines
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting lifecycle demo v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match LifecycleConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let exit_code = run(&args, config).await?;
    info!("Lifecycle demo exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

async fn run(args: &Args, config: LifecycleConfig) -> Result<i32> {
    let mut ticker = TickerService::new(config.ticker.clone());
    if args.fail_start {
        ticker = ticker.failing_start();
    }

    let service = Service::new(ticker, ServiceOptions::from_config(&config.service));
    let name = service.name().to_string();
    service.subscribe(move |state| info!("Service '{}' is now {}", name, state));

    let _ = service.start()?;

    match timeout(config.ticker.start_timeout(), service.running()).await {
        Ok(Ok(())) => info!("Service running, press Ctrl+C to stop"),
        Ok(Err(e)) => {
            error!("Service failed to start: {}", e);
            return Ok(1);
        }
        Err(_) => {
            warn!(
                "Service did not start within {:?}, stopping",
                config.ticker.start_timeout()
            );
        }
    }

    if service.state() == State::Running {
        wait_for_shutdown(args.run_for).await;
    }

    match service.stop() {
        Ok(stop) => match timeout(config.ticker.stop_timeout(), stop).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error stopping service: {}", e),
            Err(_) => error!("Service stop timeout"),
        },
        Err(e) => error!("Service could not be stopped: {}", e),
    }

    match timeout(config.ticker.stop_timeout(), service.terminated()).await {
        Ok(Ok(())) => {
            info!("Service stopped after {} ticks", service.lifecycle().ticks());
            Ok(0)
        }
        Ok(Err(e)) => {
            error!("Service failed during shutdown: {}", e);
            Ok(1)
        }
        Err(_) => {
            error!("Service did not terminate within {:?}", config.ticker.stop_timeout());
            Ok(1)
        }
    }
}

/// Wait for Ctrl+C, or for the optional run duration to elapse
async fn wait_for_shutdown(run_for: Option<u64>) {
    match run_for {
        Some(seconds) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {
                    info!("Run duration of {}s elapsed", seconds);
                }
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
            } else {
                info!("Received SIGINT signal (Ctrl+C)");
            }
        }
    }
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

    // State changes are logged at info, so keep them visible unless --quiet
    let demo_level = if args.quiet { "error" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "service_lifecycle={},lifecycle_demo={}",
            log_level, demo_level
        ))
    });

    let fmt_layer = match args.log_format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(args.debug)
            .with_line_number(args.debug)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Lifecycle demo configuration file");
    println!("# Every key may also be set through LIFECYCLE_<SECTION>__<KEY> environment variables");
    println!();
    println!("{}", toml::to_string_pretty(&LifecycleConfig::default())?);
    Ok(())
}
