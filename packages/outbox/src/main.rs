use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mq::{MqConfig, init_mq};
use outbox::config::AppConfig;
use outbox::database::init_db;
use outbox::metrics::DispatchStats;
use outbox::monitor::run_outbox_monitor;
use outbox::schema::ensure_indexes;
use outbox::state::AppState;
use outbox::{
    Dispatcher, LogSender, MessageSender, MessageStore, QueueSender, SeaOrmMessageStore,
    build_router,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = AppConfig::load().context("Failed to load config")?;
    config.poll.validate().context("Invalid poll config")?;
    config.monitor.validate().context("Invalid monitor config")?;

    let db = init_db(&config.database)
        .await
        .context("Failed to initialize database")?;
    ensure_indexes(&db).await.context("Failed to ensure indexes")?;
    let store: Arc<dyn MessageStore> = Arc::new(SeaOrmMessageStore::new(db));

    let sender: Arc<dyn MessageSender> = if config.mq.enabled {
        let mq = init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?;
        info!(url = %config.mq.url, "MQ connected");
        Arc::new(QueueSender::new(Arc::new(mq)))
    } else {
        warn!("MQ disabled, outbox messages will only be logged");
        Arc::new(LogSender)
    };

    let shutdown = CancellationToken::new();

    let mut handles = Vec::with_capacity(config.poll.workers);
    let mut dispatch_metrics = Vec::with_capacity(config.poll.workers);
    for n in 0..config.poll.workers {
        let dispatcher = Dispatcher::new(
            format!("dispatcher-{n}"),
            Arc::clone(&store),
            Arc::clone(&sender),
            config.poll.clone(),
        )
        .context("Invalid poll config")?;
        dispatch_metrics.push(dispatcher.metrics());
        handles.push(dispatcher.spawn(&shutdown));
    }

    let monitor = tokio::spawn(run_outbox_monitor(
        Arc::clone(&store),
        config.monitor.clone(),
        config.poll.policy(),
        shutdown.clone(),
    ));

    let app = build_router(AppState {
        store,
        monitor: config.monitor.clone(),
        dispatchers: dispatch_metrics,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Outbox relay listening on http://{}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Stopping dispatchers");
    shutdown.cancel();

    let mut total = DispatchStats::default();
    for handle in handles {
        total = total.merge(handle.join().await);
    }
    if let Err(e) = monitor.await {
        error!(error = %e, "Outbox monitor task failed");
    }

    info!(
        ticks = total.ticks,
        claimed = total.claimed,
        sent = total.sent,
        failed = total.failed,
        dead_lettered = total.dead_lettered,
        store_errors = total.store_errors,
        "Outbox relay stopped"
    );

    served.context("HTTP server failed")
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal");
}
