use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notifyd::config::Config;
use notifyd::queue::QueueWorkerConfig;
use notifyd::scheduler::SchedulerConfig;
use notifyd::{default_registry, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notifyd=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("starting notifyd");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let registry = default_registry();
    let state = AppState::new(pool.clone(), config.clone(), registry);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    notifyd::scheduler::spawn(
        pool.clone(),
        SchedulerConfig {
            tick_interval: Duration::from_secs(config.scheduler.tick_interval_seconds),
            reclaim_window: Duration::from_secs(config.scheduler.reclaim_window_seconds),
            default_max_attempts: config.queue.default_max_attempts as i64,
            base_retry_delay_seconds: config.queue.base_retry_delay_seconds as i64,
        },
        shutdown_tx.subscribe(),
    );

    notifyd::queue::spawn_workers(
        pool.clone(),
        Arc::new(notifyd::default_registry()),
        QueueWorkerConfig {
            worker_count: config.queue.worker_count,
            batch_size: config.queue.batch_size,
            poll_interval: Duration::from_secs(config.queue.poll_interval_seconds),
            dispatch_timeout: Duration::from_secs(config.dispatch.timeout_seconds),
        },
        &shutdown_tx,
    );

    state
        .rate_limiter
        .clone()
        .spawn_sweeper(Duration::from_secs(config.rate_limit.window_seconds), shutdown_tx.subscribe());

    let app = Router::new()
        .merge(routes::health::router())
        .merge(
            routes::protected_router()
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    notifyd::middleware::ratelimit::rate_limit,
                )),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
        tracing::info!("shutdown signal received");
    })
    .await?;

    Ok(())
}
