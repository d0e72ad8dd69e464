//! End-to-end scenarios wiring the scheduler, queue, and dispatch engine
//! together through the persistent store.

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use notifyd::adapter::registry::Registry;
use notifyd::adapter::{Adapter, AdapterFactory, ErrorKind, ParseError};
use notifyd::adapter::fake::{FakeAdapter, FakeBehavior};
use notifyd::descriptor::ParsedDescriptor;
use notifyd::notification::NotificationRequest;
use notifyd::queue::{process_job, QueueWorkerConfig};
use notifyd::scheduler::{self, SchedulerConfig};
use notifyd::store::queue_repository::{NewQueuedJob, QueueRepository};
use notifyd::store::scheduled_job_repository::{NewScheduledJob, ScheduledJobRepository};

async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn always_failing_registry() -> Registry {
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
                FakeBehavior::Fail(ErrorKind::TransientRemote("simulated outage".into())),
            )) as Box<dyn Adapter>)
        }),
    );
    registry
}

/// Scenario 2: a job with max_attempts=3 run through three
/// failure cycles ends up dead-lettered with attempts == max_attempts and
/// never reverts out of that terminal state.
#[tokio::test]
async fn repeated_failures_exhaust_attempts_and_dead_letter() {
    let pool = pool().await;
    let registry = always_failing_registry();
    let cfg = QueueWorkerConfig {
        worker_count: 1,
        batch_size: 10,
        poll_interval: Duration::from_millis(10),
        dispatch_timeout: Duration::from_secs(5),
    };

    let queued = QueueRepository::enqueue(
        &pool,
        NewQueuedJob {
            request_json: serde_json::to_string(&NotificationRequest::new("outage notice")).unwrap(),
            destinations_json: serde_json::to_string(&vec!["fail://host/".to_string()]).unwrap(),
            priority: 0,
            max_attempts: 3,
            base_retry_delay_seconds: 1,
        },
    )
    .await
    .unwrap();

    for expected_attempts in 1..=3 {
        let claimed = QueueRepository::claim_due(&pool, 1, "worker-test").await.unwrap();
        assert_eq!(claimed.len(), 1, "job should be due on cycle {expected_attempts}");
        let job = claimed.into_iter().next().unwrap();
        process_job(&pool, &registry, &cfg, job).await;

        let refreshed = QueueRepository::get_by_id(&pool, queued.id).await.unwrap();
        if expected_attempts < 3 {
            assert_eq!(refreshed.status, "pending");
            assert_eq!(refreshed.attempts, expected_attempts);
            // Force the retry to be due immediately so the next cycle can claim it.
            sqlx::query("UPDATE queued_jobs SET next_attempt_at = CURRENT_TIMESTAMP WHERE id = ?")
                .bind(queued.id)
                .execute(&pool)
                .await
                .unwrap();
        } else {
            assert_eq!(refreshed.status, "dead_lettered");
            assert_eq!(refreshed.attempts, 3);
            assert!(refreshed.completed_at.is_some());
        }
    }

    // Terminal state never reverts: claiming again finds nothing due.
    let claimed_again = QueueRepository::claim_due(&pool, 10, "worker-test").await.unwrap();
    assert!(claimed_again.is_empty());
}

/// Scenario 3: a `*/5 * * * *` scheduled job created before its
/// fire time produces exactly one `QueuedJob` per due tick and advances
/// `next_fire_at` strictly forward.
#[tokio::test]
async fn due_scheduled_job_fires_exactly_once_per_tick() {
    let pool = pool().await;
    let request = NotificationRequest::new("recurring digest");
    let next_fire_at = scheduler::initial_next_fire("*/5 * * * *").unwrap();

    let job = ScheduledJobRepository::insert(
        &pool,
        NewScheduledJob {
            name: "digest".into(),
            cron_expression: "*/5 * * * *".into(),
            next_fire_at: Some(next_fire_at),
            request_template_json: serde_json::to_string(&request).unwrap(),
            destinations_json: serde_json::to_string(&vec!["fail://host/".to_string()]).unwrap(),
            body_template: None,
        },
    )
    .await
    .unwrap();

    // Not due yet: a tick right now must not enqueue anything.
    let cfg = SchedulerConfig {
        tick_interval: Duration::from_secs(10),
        reclaim_window: Duration::from_secs(300),
        default_max_attempts: 3,
        base_retry_delay_seconds: 1,
    };
    scheduler::tick(&pool, &cfg).await;
    let stats_before = QueueRepository::stats(&pool).await.unwrap();
    assert!(stats_before.is_empty());

    // Force it due and tick once more: exactly one QueuedJob appears.
    let past = chrono::Utc::now().naive_utc() - chrono::Duration::minutes(1);
    ScheduledJobRepository::set_next_fire(&pool, job.id, past).await.unwrap();
    scheduler::tick(&pool, &cfg).await;

    let stats_after = QueueRepository::stats(&pool).await.unwrap();
    let pending: i64 = stats_after
        .iter()
        .find(|(s, _)| s == "pending")
        .map(|(_, c)| *c)
        .unwrap_or(0);
    assert_eq!(pending, 1);

    let refreshed = ScheduledJobRepository::get_by_id(&pool, job.id).await.unwrap();
    assert!(refreshed.next_fire_at.unwrap() > past);
    assert!(refreshed.last_fire_at.is_some());

    // A second tick at the same instant must not double-fire.
    scheduler::tick(&pool, &cfg).await;
    let stats_final = QueueRepository::stats(&pool).await.unwrap();
    let pending_final: i64 = stats_final
        .iter()
        .find(|(s, _)| s == "pending")
        .map(|(_, c)| *c)
        .unwrap_or(0);
    assert_eq!(pending_final, 1);
}

/// A crash between claim and completion (simulated by skipping the
/// heartbeat past the reclaim window) returns the entry to Pending with
/// attempts unchanged.
#[tokio::test]
async fn stale_in_flight_entry_reclaims_to_pending_without_losing_attempts() {
    let pool = pool().await;
    let queued = QueueRepository::enqueue(
        &pool,
        NewQueuedJob {
            request_json: serde_json::to_string(&NotificationRequest::new("b")).unwrap(),
            destinations_json: serde_json::to_string(&Vec::<String>::new()).unwrap(),
            priority: 0,
            max_attempts: 5,
            base_retry_delay_seconds: 1,
        },
    )
    .await
    .unwrap();
    QueueRepository::claim_due(&pool, 1, "abandoned-worker").await.unwrap();

    let stale = chrono::Utc::now().naive_utc() - chrono::Duration::seconds(600);
    sqlx::query("UPDATE queued_jobs SET claimed_at = ? WHERE id = ?")
        .bind(stale)
        .bind(queued.id)
        .execute(&pool)
        .await
        .unwrap();

    let reclaimed = QueueRepository::reclaim_stale(&pool, chrono::Duration::seconds(300))
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);

    let refreshed = QueueRepository::get_by_id(&pool, queued.id).await.unwrap();
    assert_eq!(refreshed.status, "pending");
    assert_eq!(refreshed.attempts, 0);
}
