//! jwquant-notify - send JWQuant alerts from the command line.

use anyhow::{Context, Result};
use clap::Parser;
use jwquant_notify::{
    cli::{Cli, Command},
    config::Config,
    core::Level,
    notification::{Message, NotificationRouter},
    telemetry::LoggingRecorder,
};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        let _ = tracing_subscriber::fmt().try_init();
        error!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    info!(config = %config.masked(), "jwquant-notify starting up");

    let recorder = config.log_metrics.then(LoggingRecorder::new);
    if let Some(recorder) = &recorder {
        if let Err(e) = metrics::set_global_recorder(recorder.clone()) {
            warn!(error = %e, "Could not install metrics recorder");
        }
    }

    let Some(command) = cli.command else {
        info!("No command given, nothing to do");
        return Ok(());
    };

    let (title, message, level) = match command {
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config.masked())?);
            return Ok(());
        }
        Command::Send { title, body, level } => (title, Message::Text(body), level),
        Command::Template {
            name,
            title,
            level,
            vars,
        } => {
            let vars: Map<String, Value> = vars.into_iter().collect();
            (title, Message::template(name, Value::Object(vars)), level)
        }
    };

    if let Err(e) = level.parse::<Level>() {
        warn!(error = %e, "Level not recognised, routing to the fallback channel");
    }
    if !config.notification.enabled {
        warn!("Notifications are disabled; pass --force-enable to send anyway");
    }

    // Channel senders block, so keep them off the async workers.
    let router = NotificationRouter::new(config.notification.clone());
    let report = tokio::task::spawn_blocking(move || router.notify(&title, message, &level))
        .await
        .context("notification task failed")?
        .context("could not render message")?;

    if let Some(recorder) = &recorder {
        recorder.log_snapshot();
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
