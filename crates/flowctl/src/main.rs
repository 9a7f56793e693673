use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use flow_session::{DispatchSource, FlowConfig, FlowEvent, SessionRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{handle, Identity, Reply, Request};

#[derive(Parser, Debug, Clone)]
#[command(name = "flowctl")]
#[command(about = "Drive conversation flows from JSON lines on stdin")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// TOML file with flow timings
    #[arg(long, env = "FLOW_CONFIG")]
    config: Option<PathBuf>,

    /// User id for sessions created by this driver
    #[arg(long, env = "FLOW_USER", default_value = "cli-user")]
    user: String,

    /// Tenant id for sessions created by this driver
    #[arg(long, env = "FLOW_TENANT", default_value = "default")]
    tenant: String,

    /// Assistant name recorded on new sessions
    #[arg(long, env = "FLOW_ASSISTANT")]
    assistant: Option<String>,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_file(false),
        )
        .init();
}

fn log_events(mut rx: mpsc::Receiver<FlowEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.source {
                DispatchSource::Timer(kind) => tracing::info!(
                    "[{}] {} timer: {} -> {} via {}",
                    event.session_id,
                    kind.as_str(),
                    event.from,
                    event.to,
                    event.action
                ),
                DispatchSource::User if event.changed => tracing::debug!(
                    "[{}] {}: {} -> {}",
                    event.session_id,
                    event.action,
                    event.from,
                    event.to
                ),
                DispatchSource::User => {}
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = FlowConfig::load(cli.config.as_deref()).context("failed to load flow config")?;
    tracing::info!(
        "Starting flowctl (name timeout {}s, suggestion timeout {}s, auto-proceed {})",
        config.name_response_timeout_secs,
        config.suggestion_timeout_secs,
        config.auto_proceed_suggestions
    );

    let (tx, rx) = mpsc::channel(config.event_buffer);
    log_events(rx);
    let registry = SessionRegistry::builder(config)
        .event_channel(tx)
        .build()
        .context("invalid flow config")?;

    let identity = Identity {
        user_id: cli.user,
        tenant_id: cli.tenant,
        assistant_name: cli.assistant,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(line) {
            Ok(request) => handle(&registry, &identity, request).await,
            Err(e) => {
                tracing::warn!("Skipping malformed request: {}", e);
                Reply::error(format!("malformed request: {}", e))
            }
        };
        println!("{}", serde_json::to_string(&reply)?);
    }

    tracing::info!("Input closed, {} session(s) still open", registry.session_count());
    Ok(())
}
