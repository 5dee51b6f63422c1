use std::sync::Arc;

use anyhow::{Context, Result};
use gymdesk::{
    MemoryStore, RetryingStore, Store, build_router, config::AppConfig, gym_catalog,
    seed::seed_sample_data,
    service::{EmailSender, HttpEmailSender, LogEmailSender},
    web::AppState,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let catalog = gym_catalog().context("failed to build the table catalog")?;
    let store: Arc<dyn Store> = Arc::new(RetryingStore::new(
        MemoryStore::new(catalog),
        config.retry_policy(),
    ));

    if config.seed {
        let report = seed_sample_data(store.as_ref())
            .await
            .context("failed to seed sample data")?;
        info!(rows = report.rows(), "seed finished");
    }

    let mailer: Arc<dyn EmailSender> = match &config.mail_endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "mail transport: http");
            let from = config.mail_sender().context("invalid mail sender")?;
            Arc::new(
                HttpEmailSender::new(endpoint.clone(), config.mail_api_key.clone(), from)
                    .context("failed to build the mail client")?,
            )
        }
        None => {
            info!("mail transport: log only");
            Arc::new(LogEmailSender)
        }
    };

    let app = build_router(AppState::new(store, mailer, config.page_size));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "gymdesk started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gymdesk=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
