use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use arena_vision::{AppConfig, ProcessSupervisor};

#[derive(Parser, Debug)]
#[command(name = "arena-vision")]
#[command(about = "Real-time marker tracking and robot coordination server for a robotics teaching arena")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "arena-vision.json", help = "Path to JSON configuration file")]
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
    #[arg(long, help = "Print default configuration in JSON format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - check ports and build components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    let ui = init_logging(&args)?;

    info!("starting arena vision system v{}", env!("CARGO_PKG_VERSION"));
    info!("configuration file: {}", args.config);

    let config = match AppConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("configuration validation successful");
        println!("configuration is valid");
        return Ok(());
    }

    let mut supervisor = ProcessSupervisor::new(config, std::sync::Arc::clone(&ui)).map_err(|e| {
        error!("failed to create process supervisor: {}", e);
        e
    })?;

    if args.dry_run {
        info!("dry run mode - components built but not started");
        println!("dry run completed successfully");
        return Ok(());
    }

    supervisor.start().await.map_err(|e| {
        error!("failed to start system: {}", e);
        e
    })?;

    let exit_code = supervisor.run().await.map_err(|e| {
        error!("system error during execution: {}", e);
        e
    })?;

    info!("arena vision system exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<std::sync::Arc<arena_vision::events::UiBroadcaster>> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("arena_vision={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer().json().with_target(true).with_file(true).with_line_number(true).boxed(),
        Some("compact") => fmt::layer().compact().with_target(false).boxed(),
        Some("pretty") | None => fmt::layer().pretty().with_target(true).with_file(args.debug).with_line_number(args.debug).boxed(),
        Some(format) => {
            eprintln!("warning: unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    let ui = std::sync::Arc::new(arena_vision::events::UiBroadcaster::new(1024));
    let web_sink = arena_vision::events::WebSinkLayer::new(std::sync::Arc::clone(&ui));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .with(web_sink)
        .init();

    Ok(ui)
}

/// Print default configuration in JSON format
fn print_default_config() {
    println!("// built-in defaults; override in a JSON config file or VISION_-prefixed env vars");

    let default_config = AppConfig::default();
    match serde_json::to_string_pretty(&default_config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to render default config: {}", e),
    }
}
