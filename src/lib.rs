//! notifyd: a multi-protocol notification dispatch engine — library crate.
//!
//! Exposes the descriptor parser, scheme registry, adapter contract, fan-out
//! dispatch engine, attachment manager, cron evaluator, persistent store,
//! scheduler, queue workers, and rate limiter as public types so the core
//! can be embedded directly or driven through the control-plane binary in
//! `src/bin/main.rs`.

pub mod adapter;
pub mod attachment;
pub mod config;
pub mod cron;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod notification;
pub mod queue;
pub mod ratelimit;
pub mod routes;
pub mod scheduler;
pub mod store;

use std::sync::Arc;

use sqlx::SqlitePool;

use adapter::registry::Registry;
use config::Config;
use dispatch::Dispatcher;
use ratelimit::RateLimiter;

/// Shared state handed to every axum handler: the persistent-store pool,
/// configuration, the live scheme registry, a pre-registered-destinations
/// dispatcher, and the rate limiter.
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub registry: Registry,
    pub dispatcher: Dispatcher,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config, registry: Registry) -> Arc<Self> {
        let dispatcher = Dispatcher::new(std::time::Duration::from_secs(
            config.dispatch.timeout_seconds,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.limit,
            std::time::Duration::from_secs(config.rate_limit.window_seconds),
        ));
        Arc::new(Self {
            pool,
            config,
            registry,
            dispatcher,
            rate_limiter,
        })
    }
}

/// Builds the default scheme registry with the reference adapters: generic
/// webhook, SMTP, and Discord chat-webhook.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(
        &["webhook", "webhooks"],
        "webhook",
        None,
        false,
        0,
        std::sync::Arc::new(adapter::webhook::factory()),
    );
    registry.register(
        &["smtp", "smtps"],
        "smtp",
        Some(587),
        false,
        0,
        std::sync::Arc::new(adapter::smtp::factory()),
    );
    registry.register(
        &["discord"],
        "discord",
        None,
        false,
        4096,
        std::sync::Arc::new(adapter::discord::factory()),
    );
    registry
}
