//! Rapport: relationship reminders, recurring events and streaks.
//!
//! The engine modules (`cadence`, `reminders`, `recurrence`, `event_status`,
//! `gamification`) are pure and take the clock as an argument. `services`
//! wraps them in validated, transactional operations over `db::RapportDb`,
//! and `scheduler`/`executor` run the background drivers.

pub mod cadence;
pub mod db;
pub mod error;
pub mod event_status;
pub mod executor;
pub mod gamification;
pub mod locks;
mod migrations;
pub mod notification;
pub mod recurrence;
pub mod reminders;
pub mod scheduler;
pub mod sent_registry;
pub mod services;
pub mod state;
pub mod types;

use std::sync::Arc;

use tokio::sync::mpsc;

use error::AppError;
use executor::{Executor, RunSummary};
use state::AppState;
use types::{ExecutionTrigger, JobId};

/// Channel buffer size for scheduler messages
const SCHEDULER_CHANNEL_SIZE: usize = 32;

/// Run the scheduler and executor until Ctrl-C.
pub async fn serve(state: Arc<AppState>) -> Result<(), AppError> {
    let (scheduler_tx, scheduler_rx) = mpsc::channel(SCHEDULER_CHANNEL_SIZE);

    let scheduler_state = state.clone();
    let scheduler_task = tokio::spawn(async move {
        scheduler::Scheduler::new(scheduler_state, scheduler_tx)
            .run()
            .await;
    });

    let executor_state = state.clone();
    let executor_task = tokio::spawn(async move {
        Executor::new(executor_state).run(scheduler_rx).await;
    });

    let config = state.config();
    let scan = &config.schedules.reminder_scan;
    match scheduler::get_next_run_time(scan) {
        Ok(next) if scan.enabled => log::info!("Rapport: running, next reminder scan at {}", next),
        Ok(_) => log::info!("Rapport: running, reminder scan disabled"),
        Err(e) => log::warn!("Rapport: running, reminder scan schedule invalid: {}", e),
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Rapport: failed to listen for shutdown signal: {}", e);
    }
    log::info!("Rapport: shutting down");
    scheduler_task.abort();
    executor_task.abort();
    Ok(())
}

/// Run one job now, as a manual trigger.
pub async fn run_job(state: Arc<AppState>, job: JobId) -> Result<RunSummary, AppError> {
    Executor::new(state)
        .execute_job(job, ExecutionTrigger::Manual)
        .await
}
