//! Subscription/Licensing Lifecycle (C10): expiry sweep, grace period,
//! subscription-expiring warnings, and payment-driven re-enable.
//!
//! Directly grounded on `src/jobs/{mod,grace_period,license_expiration,
//! stale_devices}.rs`: a `tokio_cron_scheduler::JobScheduler` running each
//! sweep on its own cron schedule, each sweep a pure `run_*_sweep(db, now)`
//! function the test suite calls directly without going through the
//! scheduler.

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler as TokioJobScheduler};
use tracing::{error, info};

use crate::commands::Dispatcher;
use crate::db::alert::{NewAlert, Severity};
use crate::db::device::DeviceStatus;
use crate::db::Database;
use crate::errors::CoreResult;

/// Subscriptions expiring within this many days get a warning (§4.10).
const EXPIRING_SOON_WINDOW_DAYS: i64 = 7;

/// Dedupe window for the expiring-soon warning: once per subscription per
/// 24-hour window (spec.md §9 Open Question, resolved in DESIGN.md).
const EXPIRING_SOON_DEDUPE: chrono::Duration = chrono::Duration::hours(24);

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub expire_cron: String,
    pub grace_period_cron: String,
    pub expiring_soon_cron: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expire_cron: "0 0 * * * *".to_string(),
            grace_period_cron: "0 15 * * * *".to_string(),
            expiring_soon_cron: "0 30 * * * *".to_string(),
        }
    }
}

/// §4.10 step 1: active subscriptions whose `expires_at` has passed become
/// `expired`.
pub async fn run_expire_sweep(db: &Database) -> CoreResult<u32> {
    let now = Utc::now();
    let candidates = db.list_active_past_expiry(now).await?;
    let mut count = 0;
    for sub in candidates {
        db.mark_expired(sub.id).await?;
        count += 1;
    }
    Ok(count)
}

/// §4.10 step 2: expired subscriptions past their grace period become
/// `suspended`; the bound device (if any) is issued `DISABLE`.
pub async fn run_grace_period_sweep(db: &Database, dispatcher: &Dispatcher) -> CoreResult<u32> {
    let now = Utc::now();
    let candidates = db.list_expired_past_grace(now).await?;
    let mut count = 0;
    for sub in candidates {
        db.mark_suspended(sub.id).await?;
        if let Some(device_id) = &sub.device_id {
            db.set_device_status(device_id, DeviceStatus::Suspended).await?;
            let _ = dispatcher
                .send(
                    device_id,
                    sub.tenant_id,
                    "DISABLE",
                    Some("Subscription suspended"),
                    None,
                    None,
                )
                .await;
        }
        count += 1;
    }
    Ok(count)
}

/// §4.10 step 3: subscriptions expiring within the window get a
/// `subscription_expiring` warning alert, deduped per 24h window.
pub async fn run_expiring_soon_sweep(db: &Database) -> CoreResult<u32> {
    let now = Utc::now();
    let candidates = db
        .list_expiring_within(now, EXPIRING_SOON_WINDOW_DAYS)
        .await?;
    let mut count = 0;
    for sub in candidates {
        let already_warned = db
            .has_recent_unacknowledged_alert(
                sub.device_id.as_deref(),
                None,
                "subscription_expiring",
                now,
                EXPIRING_SOON_DEDUPE,
            )
            .await?;
        if already_warned {
            continue;
        }

        let expires_at = sub.expires_at.expect("query filters on expires_at IS NOT NULL");
        db.insert_alert_standalone(&NewAlert {
            tenant_id: sub.tenant_id,
            location_id: None,
            device_id: sub.device_id.clone(),
            alert_type: "subscription_expiring".to_string(),
            severity: Severity::Warning,
            message: format!(
                "Subscription for tenant {} expires on {}",
                sub.tenant_id,
                expires_at.format("%Y-%m-%d")
            ),
            trigger_value: None,
            threshold_value: None,
        })
        .await?;
        count += 1;
    }
    Ok(count)
}

/// Payment recording: extends `expires_at`, re-enables a suspended device.
pub async fn record_payment(
    db: &Database,
    subscription_id: i64,
    extend_months: i64,
) -> CoreResult<()> {
    let now = Utc::now();
    let sub = db.record_payment(subscription_id, extend_months, now).await?;
    if let Some(device_id) = &sub.device_id {
        db.reactivate_device(device_id).await?;
    }
    Ok(())
}

/// Background scheduler wiring, mirroring the teacher's `JobScheduler`:
/// one cron job per sweep, each logging a summary and swallowing its own
/// error so one failing sweep never blocks the others.
pub struct Scheduler {
    scheduler: TokioJobScheduler,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl Scheduler {
    pub async fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        config: LifecycleConfig,
    ) -> Result<Self, LifecycleError> {
        let scheduler = TokioJobScheduler::new()
            .await
            .map_err(|e| LifecycleError::Scheduler(e.to_string()))?;

        {
            let db = Arc::clone(&db);
            let job = Job::new_async(config.expire_cron.as_str(), move |_uuid, _l| {
                let db = Arc::clone(&db);
                Box::pin(async move {
                    match run_expire_sweep(&db).await {
                        Ok(n) if n > 0 => info!("expire sweep: {n} subscriptions expired"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "expire sweep failed"),
                    }
                })
            })
            .map_err(|e| LifecycleError::Scheduler(e.to_string()))?;
            scheduler
                .add(job)
                .await
                .map_err(|e| LifecycleError::Scheduler(e.to_string()))?;
        }

        {
            let db = Arc::clone(&db);
            let dispatcher = dispatcher.clone();
            let job = Job::new_async(config.grace_period_cron.as_str(), move |_uuid, _l| {
                let db = Arc::clone(&db);
                let dispatcher = dispatcher.clone();
                Box::pin(async move {
                    match run_grace_period_sweep(&db, &dispatcher).await {
                        Ok(n) if n > 0 => info!("grace period sweep: {n} subscriptions suspended"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "grace period sweep failed"),
                    }
                })
            })
            .map_err(|e| LifecycleError::Scheduler(e.to_string()))?;
            scheduler
                .add(job)
                .await
                .map_err(|e| LifecycleError::Scheduler(e.to_string()))?;
        }

        {
            let db = Arc::clone(&db);
            let job = Job::new_async(config.expiring_soon_cron.as_str(), move |_uuid, _l| {
                let db = Arc::clone(&db);
                Box::pin(async move {
                    match run_expiring_soon_sweep(&db).await {
                        Ok(n) if n > 0 => info!("expiring-soon sweep: {n} warnings raised"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "expiring-soon sweep failed"),
                    }
                })
            })
            .map_err(|e| LifecycleError::Scheduler(e.to_string()))?;
            scheduler
                .add(job)
                .await
                .map_err(|e| LifecycleError::Scheduler(e.to_string()))?;
        }

        Ok(Self { scheduler })
    }

    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| LifecycleError::Scheduler(e.to_string()))
    }

    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| LifecycleError::Scheduler(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cron_expressions_are_distinct() {
        let c = LifecycleConfig::default();
        assert_ne!(c.expire_cron, c.grace_period_cron);
        assert_ne!(c.grace_period_cron, c.expiring_soon_cron);
    }
}
