use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use profile_intake::channels::{Channel, CliChannel, TelegramChannel};
use profile_intake::config::{ChannelKind, IntakeConfig};
use profile_intake::parser::FilenameParser;
use profile_intake::router::ConversationRouter;
use profile_intake::routes::{StatusRouteState, status_routes};
use profile_intake::store::{JsonFileStore, ProfileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IntakeConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC...  (or PROFILE_INTAKE_CHANNEL=cli)");
        std::process::exit(1);
    });

    // Initialize tracing; the guard flushes the file writer on exit
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "profile-intake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    eprintln!("📇 Profile Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data file: {}", config.data_file.display());
    if let Some(port) = config.http_port {
        eprintln!("   Status API: http://0.0.0.0:{port}/api/profiles/{{user_id}}");
    }

    // ── Store ────────────────────────────────────────────────────────────
    let store: Arc<dyn ProfileStore> = Arc::new(
        JsonFileStore::open(&config.data_file)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open profile store at {}: {e}",
                    config.data_file.display()
                );
                std::process::exit(1);
            }),
    );

    let router = ConversationRouter::new(Arc::clone(&store), Arc::new(FilenameParser::new()))
        .with_policy(config.documents.clone());

    // ── Status API ───────────────────────────────────────────────────────
    if let Some(port) = config.http_port {
        let app = status_routes(StatusRouteState {
            store: Arc::clone(&store),
        });
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        tracing::info!(port, "Status API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Status API stopped: {e}");
            }
        });
    }

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Box<dyn Channel> = match (config.channel, config.telegram) {
        (ChannelKind::Telegram, Some(telegram)) => {
            let channel = TelegramChannel::new(telegram);
            if let Err(e) = channel.health_check().await {
                tracing::warn!("Telegram health check failed: {e}");
            }
            Box::new(channel)
        }
        (ChannelKind::Telegram, None) => {
            anyhow::bail!("Telegram channel selected without Telegram settings")
        }
        (ChannelKind::Cli, _) => {
            eprintln!("   Commands: /start, /my_profile, /history, /done");
            eprintln!("   doc <file name> submits a document, press <id> presses a button.\n");
            Box::new(CliChannel::new())
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    router.serve(channel.as_ref(), shutdown).await?;
    tracing::info!("Profile Intake stopped");
    Ok(())
}
