//! Queue workers: a fixed-size pool that drains the persistent retry queue,
//! resolves destinations through the registry, dispatches, and re-enqueues
//! or dead-letters failures.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::adapter::registry::Registry;
use crate::dispatch::{Dispatcher, NotifyOptions, Response};
use crate::notification::NotificationRequest;
use crate::store::history_repository::HistoryRepository;
use crate::store::metrics_repository::{outcome_key, MetricsRepository};
use crate::store::models::QueuedJob;
use crate::store::queue_repository::{new_worker_token, QueueRepository};

pub struct QueueWorkerConfig {
    pub worker_count: u32,
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub dispatch_timeout: Duration,
}

/// Build a throwaway `Dispatcher`, resolve every destination descriptor
/// through `registry`, and run one fan-out for `job`. Unresolvable
/// descriptors are skipped with a warning rather than failing the whole
/// job — a typo'd descriptor shouldn't stall deliveries to the rest.
async fn dispatch_job(
    registry: &Registry,
    dispatch_timeout: Duration,
    request: &NotificationRequest,
    destination_descriptors: &[String],
) -> Vec<Response> {
    let dispatcher = Dispatcher::new(dispatch_timeout);
    for descriptor in destination_descriptors {
        match registry.resolve(descriptor) {
            Ok(adapter) => dispatcher.add(adapter, []).await,
            Err(e) => {
                tracing::warn!(descriptor, error = ?e, "failed to resolve queued destination");
            }
        }
    }
    dispatcher.notify(request, &NotifyOptions::default()).await
}

/// Process one claimed `QueuedJob`: dispatch, then persist the outcome.
/// Exposed (not just `worker_loop`-internal) so integration tests and
/// embedders can drive one claim/process cycle without spinning up the
/// full worker pool.
pub async fn process_job(pool: &SqlitePool, registry: &Registry, cfg: &QueueWorkerConfig, job: QueuedJob) {
    let request: NotificationRequest = match serde_json::from_str(&job.request_json) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(job_id = job.id, error = ?e, "malformed queued request, dead-lettering");
            let _ = QueueRepository::complete_dead_letter(pool, job.id, job.attempts, &e.to_string()).await;
            return;
        }
    };
    let destinations: Vec<String> = match serde_json::from_str(&job.destinations_json) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(job_id = job.id, error = ?e, "malformed destination list, dead-lettering");
            let _ = QueueRepository::complete_dead_letter(pool, job.id, job.attempts, &e.to_string()).await;
            return;
        }
    };

    let responses = dispatch_job(registry, cfg.dispatch_timeout, &request, &destinations).await;

    for response in &responses {
        if let Err(e) = HistoryRepository::append(pool, Some(job.id), response).await {
            tracing::warn!(job_id = job.id, error = ?e, "failed to append delivery history");
        }
        let key = outcome_key(response.adapter_identifier, response.success);
        if let Err(e) = MetricsRepository::increment(pool, &key).await {
            tracing::warn!(job_id = job.id, error = ?e, "failed to increment notification metric");
        }
    }

    let first_failure = responses.iter().find(|r| !r.success);
    match first_failure {
        None => {
            if let Err(e) = QueueRepository::complete_success(pool, job.id).await {
                tracing::error!(job_id = job.id, error = ?e, "failed to mark queued job succeeded");
            } else {
                tracing::info!(job_id = job.id, "queued job delivered successfully");
            }
        }
        Some(failure) => {
            let message = failure
                .error_message
                .clone()
                .unwrap_or_else(|| "delivery failed".to_string());
            let retryable = failure
                .error_kind
                .as_ref()
                .map(|k| k.is_retryable())
                .unwrap_or(false);

            if retryable {
                if let Err(e) = QueueRepository::complete_failure_reenqueue(pool, &job, &message).await {
                    tracing::error!(job_id = job.id, error = ?e, "failed to re-enqueue failed queued job");
                } else {
                    tracing::warn!(job_id = job.id, attempts = job.attempts + 1, error = %message, "queued job delivery failed, retrying");
                }
            } else {
                if let Err(e) =
                    QueueRepository::complete_dead_letter(pool, job.id, job.attempts + 1, &message).await
                {
                    tracing::error!(job_id = job.id, error = ?e, "failed to dead-letter non-retryable queued job");
                } else {
                    tracing::warn!(job_id = job.id, error = %message, "queued job delivery failed with a non-retryable error, dead-lettering");
                }
            }
        }
    }
}

/// Run one worker's loop: claim a batch, process every claimed entry, sleep
/// `poll_interval` if nothing was due. Different workers run in parallel;
/// each serializes its own claimed batch.
async fn worker_loop(
    id: u32,
    pool: SqlitePool,
    registry: Arc<Registry>,
    cfg: Arc<QueueWorkerConfig>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let worker_token = format!("worker-{id}-{}", new_worker_token());
    loop {
        match QueueRepository::claim_due(&pool, cfg.batch_size as i64, &worker_token).await {
            Ok(claimed) if claimed.is_empty() => {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!(worker = id, "queue worker shutting down");
                        return;
                    }
                    _ = tokio::time::sleep(cfg.poll_interval) => {}
                }
            }
            Ok(claimed) => {
                for job in claimed {
                    if shutdown.try_recv().is_ok() {
                        tracing::info!(worker = id, "queue worker shutting down mid-batch");
                        return;
                    }
                    process_job(&pool, &registry, &cfg, job).await;
                }
            }
            Err(e) => {
                tracing::error!(worker = id, error = ?e, "failed to claim due queue entries");
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = tokio::time::sleep(cfg.poll_interval) => {}
                }
            }
        }
    }
}

/// Spawn the fixed-size worker pool.
pub fn spawn_workers(
    pool: SqlitePool,
    registry: Arc<Registry>,
    cfg: QueueWorkerConfig,
    shutdown: &tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let cfg = Arc::new(cfg);
    (0..cfg.worker_count)
        .map(|id| {
            tokio::spawn(worker_loop(
                id,
                pool.clone(),
                registry.clone(),
                cfg.clone(),
                shutdown.subscribe(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::{FakeAdapter, FakeBehavior};
    use crate::adapter::{Adapter, AdapterFactory, ErrorKind, ParseError};
    use crate::descriptor::ParsedDescriptor;
    use crate::store::queue_repository::NewQueuedJob;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn ok_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            &["ok"],
            "ok",
            None,
            false,
            0,
            Arc::new(|_p: &ParsedDescriptor| Ok(Box::new(FakeAdapter::new("ok")) as Box<dyn Adapter>)),
        );
        registry
    }

    fn failing_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            &["fail"],
            "fail",
            None,
            false,
            0,
            Arc::new(|_p: &ParsedDescriptor| {
                Ok(Box::new(FakeAdapter::with_behavior(
                    "fail",
                    FakeBehavior::Fail(ErrorKind::TransientRemote("boom".into())),
                )) as Box<dyn Adapter>)
            }),
        );
        registry
    }

    #[tokio::test]
    async fn successful_job_is_marked_succeeded() {
        let pool = test_pool().await;
        let registry = ok_registry();
        let job = QueueRepository::enqueue(
            &pool,
            NewQueuedJob {
                request_json: serde_json::to_string(&NotificationRequest::new("hi")).unwrap(),
                destinations_json: serde_json::to_string(&vec!["ok://host/".to_string()]).unwrap(),
                priority: 0,
                max_attempts: 3,
                base_retry_delay_seconds: 1,
            },
        )
        .await
        .unwrap();
        let claimed = QueueRepository::claim_due(&pool, 1, "t").await.unwrap();
        assert_eq!(claimed.len(), 1);

        let cfg = QueueWorkerConfig {
            worker_count: 1,
            batch_size: 10,
            poll_interval: Duration::from_millis(10),
            dispatch_timeout: Duration::from_secs(5),
        };
        process_job(&pool, &registry, &cfg, claimed.into_iter().next().unwrap()).await;

        let refreshed = QueueRepository::get_by_id(&pool, job.id).await.unwrap();
        assert_eq!(refreshed.status, "succeeded");
        assert!(refreshed.completed_at.is_some());
    }

    #[tokio::test]
    async fn failing_job_under_max_attempts_is_reenqueued() {
        let pool = test_pool().await;
        let registry = failing_registry();
        let job = QueueRepository::enqueue(
            &pool,
            NewQueuedJob {
                request_json: serde_json::to_string(&NotificationRequest::new("hi")).unwrap(),
                destinations_json: serde_json::to_string(&vec!["fail://host/".to_string()]).unwrap(),
                priority: 0,
                max_attempts: 3,
                base_retry_delay_seconds: 1,
            },
        )
        .await
        .unwrap();
        let claimed = QueueRepository::claim_due(&pool, 1, "t").await.unwrap();
        let cfg = QueueWorkerConfig {
            worker_count: 1,
            batch_size: 10,
            poll_interval: Duration::from_millis(10),
            dispatch_timeout: Duration::from_secs(5),
        };
        process_job(&pool, &registry, &cfg, claimed.into_iter().next().unwrap()).await;

        let refreshed = QueueRepository::get_by_id(&pool, job.id).await.unwrap();
        assert_eq!(refreshed.status, "pending");
        assert_eq!(refreshed.attempts, 1);
        assert!(refreshed.last_error.is_some());
    }

    #[tokio::test]
    async fn failing_job_at_max_attempts_is_dead_lettered() {
        let pool = test_pool().await;
        let registry = failing_registry();
        let job = QueueRepository::enqueue(
            &pool,
            NewQueuedJob {
                request_json: serde_json::to_string(&NotificationRequest::new("hi")).unwrap(),
                destinations_json: serde_json::to_string(&vec!["fail://host/".to_string()]).unwrap(),
                priority: 0,
                max_attempts: 1,
                base_retry_delay_seconds: 1,
            },
        )
        .await
        .unwrap();
        let claimed = QueueRepository::claim_due(&pool, 1, "t").await.unwrap();
        let cfg = QueueWorkerConfig {
            worker_count: 1,
            batch_size: 10,
            poll_interval: Duration::from_millis(10),
            dispatch_timeout: Duration::from_secs(5),
        };
        process_job(&pool, &registry, &cfg, claimed.into_iter().next().unwrap()).await;

        let refreshed = QueueRepository::get_by_id(&pool, job.id).await.unwrap();
        assert_eq!(refreshed.status, "dead_lettered");
    }

    #[tokio::test]
    async fn unresolvable_destination_is_skipped_not_fatal() {
        let pool = test_pool().await;
        let registry = ok_registry();
        let job = QueueRepository::enqueue(
            &pool,
            NewQueuedJob {
                request_json: serde_json::to_string(&NotificationRequest::new("hi")).unwrap(),
                destinations_json: serde_json::to_string(&vec!["unknown-scheme://host/".to_string()])
                    .unwrap(),
                priority: 0,
                max_attempts: 3,
                base_retry_delay_seconds: 1,
            },
        )
        .await
        .unwrap();
        let claimed = QueueRepository::claim_due(&pool, 1, "t").await.unwrap();
        let cfg = QueueWorkerConfig {
            worker_count: 1,
            batch_size: 10,
            poll_interval: Duration::from_millis(10),
            dispatch_timeout: Duration::from_secs(5),
        };
        // Zero destinations resolved -> empty responses -> treated as success
        // (no failures to retry on).
        process_job(&pool, &registry, &cfg, claimed.into_iter().next().unwrap()).await;
        let refreshed = QueueRepository::get_by_id(&pool, job.id).await.unwrap();
        assert_eq!(refreshed.status, "succeeded");
    }

    #[test]
    fn worker_token_format_embeds_worker_id() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst) as u32;
        let token = format!("worker-{id}-{}", new_worker_token());
        assert!(token.starts_with(&format!("worker-{id}-")));
    }
}
