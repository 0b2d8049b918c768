use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde_json::json;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use engine_rtc_client::client::SignalingClient;
use engine_rtc_client::config::ClientConfig;
use engine_rtc_client::endpoint::{EndpointOptions, WebRtcEndpoint};
use engine_rtc_client::events::EndpointEvent;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Joins an engine room as a receive-only participant and logs its events
#[derive(Parser, Debug)]
#[command(name = "engine-rtc-client")]
#[command(version, about = "WebRTC signaling client for a media-routing engine", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Engine websocket URL (overrides config)
    #[arg(short = 's', long, value_name = "URL")]
    server_url: Option<String>,

    /// Authentication token (overrides config)
    #[arg(short = 't', long, value_name = "TOKEN")]
    token: Option<String>,

    /// Display name sent as endpoint metadata
    #[arg(short = 'n', long, value_name = "NAME")]
    name: Option<String>,

    /// Seconds between statistics reports, 0 disables (overrides config)
    #[arg(long, value_name = "SECS")]
    stats_interval: Option<u64>,

    /// Do not reconnect when the session is lost
    #[arg(long)]
    no_reconnect: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting engine-rtc-client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            ClientConfig::load(path).await?
        }
        None => ClientConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    let (endpoint, endpoint_task) = WebRtcEndpoint::new(EndpointOptions::from_config(&config));
    let event_logger = tokio::spawn(log_events(endpoint.subscribe()));

    let client = SignalingClient::new(config, endpoint.clone());
    let shutdown = client.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for CTRL+C: {}", e),
        }
        shutdown.cancel();
    });

    let result = client.run().await;

    endpoint.cancel();
    let _ = endpoint_task.await;
    event_logger.abort();

    match result {
        Ok(()) => {
            tracing::info!("Bye");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Session ended with error: {}", e);
            Err(e.into())
        }
    }
}

fn apply_overrides(config: &mut ClientConfig, args: &CliArgs) {
    if let Some(url) = &args.server_url {
        config.server_url = url.clone();
    }
    if let Some(token) = &args.token {
        config.token = token.clone();
    }
    if let Some(name) = &args.name {
        config.metadata = json!({ "displayName": name });
    }
    if let Some(secs) = args.stats_interval {
        config.stats_interval_secs = secs;
    }
    if args.no_reconnect {
        config.reconnect.enabled = false;
    }
}

/// Log every endpoint event; outbound protocol traffic only at trace level
async fn log_events(mut events: broadcast::Receiver<EndpointEvent>) {
    loop {
        match events.recv().await {
            Ok(EndpointEvent::SendMediaEvent { data }) => tracing::trace!("-> {}", data),
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::info!("{}: {}", event.event_name(), json),
                Err(_) => tracing::info!("{}", event.event_name()),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event logger lagged by {} events", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "engine_rtc_client=error,webrtc=error",
        LogLevel::Warn => "engine_rtc_client=warn,webrtc=warn",
        LogLevel::Info => "engine_rtc_client=info,webrtc=warn",
        LogLevel::Verbose => "engine_rtc_client=debug,webrtc=warn",
        LogLevel::Debug => "engine_rtc_client=debug,webrtc=info",
        LogLevel::Trace => "engine_rtc_client=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
