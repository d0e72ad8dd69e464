//! The persistent store: row types plus one repository per entity
//!. Schema lives in `migrations/`, applied via
//! `sqlx::migrate!` at startup (teacher's `services/init.rs::init_db`
//! pattern).

pub mod history_repository;
pub mod metadata_repository;
pub mod metrics_repository;
pub mod models;
pub mod queue_repository;
pub mod scheduled_job_repository;
