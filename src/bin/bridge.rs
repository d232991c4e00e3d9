use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sensu_bridge::{
    AlarmCallback, AlertEvent, SensuCallback,
    config::{RABBITMQ_PASSWORD, read_config_file},
    util::{get_config_path, get_password, get_send_timeout},
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Forward a log platform alert to Sensu over RabbitMQ")]
struct Args {
    /// Config file (falls back to $SENSU_BRIDGE_CONFIG)
    #[arg(short, long)]
    file: Option<String>,

    /// Alert event as JSON, read from stdin when omitted
    #[arg(short, long)]
    event: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,

    /// Print the configuration with secrets masked and exit
    #[arg(long)]
    show_config: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![("sensu_bridge", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn read_event(path: Option<&PathBuf>) -> anyhow::Result<AlertEvent> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read event from {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read event from stdin")?;
            buffer
        }
    };

    serde_json::from_str(&content).context("invalid alert event")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let path = args.file.clone().unwrap_or_else(get_config_path);
    let mut configuration = read_config_file(&path)?;
    if let Some(password) = get_password() {
        configuration.set(RABBITMQ_PASSWORD, password);
    }

    if args.show_config {
        println!("{}", serde_json::to_string_pretty(&configuration.attributes())?);
        return Ok(());
    }

    let callback = match SensuCallback::initialize(configuration) {
        Ok(callback) => callback.with_send_timeout(get_send_timeout()),
        Err(e) => {
            error!("invalid configuration in {path}: {e}");
            return Err(e.into());
        }
    };

    if args.validate {
        println!("Configuration is valid: {path}");
        return Ok(());
    }

    let event = read_event(args.event.as_ref())?;
    info!("dispatching alert for stream \"{}\"", event.stream_title);

    callback.dispatch(&event).await?;

    Ok(())
}
