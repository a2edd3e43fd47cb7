use std::time::Duration;

use chrono::{NaiveDate, Timelike, Utc};
use sqlx::PgPool;
use tokio::time::sleep;

use crate::{
    error::{AppError, AppResult},
    services::asset_status::{run_asset_status_reconciliation, ReconcileScope},
    state::AppState,
};

const TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DailyJobsResult {
    pub contracts_expired: u64,
    pub payments_overdue: u64,
    pub assets_changed: u32,
    pub errors: u32,
}

/// Runs the daily housekeeping once per local calendar day, at or after
/// `SCHEDULER_DAILY_HOUR` in the business timezone.
pub async fn run_background_scheduler(state: AppState) {
    let Some(pool) = state.db_pool.clone() else {
        tracing::warn!("Scheduler: no database pool configured, exiting");
        return;
    };
    tracing::info!(
        timezone = %state.config.timezone,
        daily_hour = state.config.scheduler_daily_hour,
        "Background scheduler started"
    );

    let mut last_daily_run: Option<NaiveDate> = None;
    loop {
        sleep(TICK).await;

        let now_local = Utc::now().with_timezone(&state.config.timezone);
        let today = now_local.date_naive();
        if last_daily_run == Some(today) || now_local.hour() < state.config.scheduler_daily_hour {
            continue;
        }
        last_daily_run = Some(today);

        tracing::info!("Scheduler: running daily jobs for {today}");
        let pool = pool.clone();
        // Spawned so a panic in one run never takes the loop down.
        tokio::spawn(async move {
            let result = run_daily_jobs(&pool, today).await;
            tracing::info!(
                contracts_expired = result.contracts_expired,
                payments_overdue = result.payments_overdue,
                assets_changed = result.assets_changed,
                errors = result.errors,
                "Scheduler: daily jobs completed"
            );
        });
    }
}

/// Contracts expire before reconciliation so assets whose lease ended
/// yesterday are released in the same run.
pub async fn run_daily_jobs(pool: &PgPool, today: NaiveDate) -> DailyJobsResult {
    let mut result = DailyJobsResult::default();

    match expire_contracts(pool, today).await {
        Ok(count) => result.contracts_expired = count,
        Err(error) => {
            tracing::warn!("Scheduler: contract expiry failed: {error}");
            result.errors += 1;
        }
    }

    match mark_overdue_payments(pool, today).await {
        Ok(count) => result.payments_overdue = count,
        Err(error) => {
            tracing::warn!("Scheduler: overdue payment scan failed: {error}");
            result.errors += 1;
        }
    }

    match run_asset_status_reconciliation(pool, today, ReconcileScope::All).await {
        Ok(summary) => result.assets_changed = summary.changed,
        Err(error) => {
            tracing::warn!("Scheduler: asset status reconciliation failed: {error}");
            result.errors += 1;
        }
    }

    result
}

async fn expire_contracts(pool: &PgPool, today: NaiveDate) -> AppResult<u64> {
    let outcome = sqlx::query(
        "UPDATE contracts SET status = 'expired'
         WHERE status::text = 'active' AND end_date IS NOT NULL AND end_date < $1",
    )
    .bind(today)
    .execute(pool)
    .await
    .map_err(scheduler_db_error)?;
    Ok(outcome.rows_affected())
}

async fn mark_overdue_payments(pool: &PgPool, today: NaiveDate) -> AppResult<u64> {
    let outcome = sqlx::query(
        "UPDATE payments SET status = 'overdue'
         WHERE status::text = 'pending' AND due_date IS NOT NULL AND due_date < $1",
    )
    .bind(today)
    .execute(pool)
    .await
    .map_err(scheduler_db_error)?;
    Ok(outcome.rows_affected())
}

fn scheduler_db_error(error: sqlx::Error) -> AppError {
    AppError::Dependency(format!("Database request failed: {error}"))
}
