//! Subscription entity (§3): the licensing record that gates whether a
//! device's readings are accepted, and the sweeper queries C10 runs over it.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, Postgres, Transaction};

use crate::errors::{CoreError, CoreResult};

use super::Database;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub tenant_id: i64,
    pub device_id: Option<String>,
    pub license_key: String,
    pub plan: String,
    pub status: String,
    pub monthly_fee: Option<f64>,
    pub currency: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub grace_period_days: i32,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub next_payment_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// "active while now < expires_at or trial_expires_at still valid"
    pub fn is_currently_valid(&self, now: DateTime<Utc>) -> bool {
        match self.status.as_str() {
            "active" => self.expires_at.map(|e| now < e).unwrap_or(true),
            "trial" => self.trial_expires_at.map(|e| now < e).unwrap_or(true),
            _ => false,
        }
    }
}

impl Database {
    pub async fn get_subscription_by_device_id(
        &self,
        device_id: &str,
    ) -> CoreResult<Option<Subscription>> {
        Ok(
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE device_id = $1")
                .bind(device_id)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn get_subscription_by_license_key(
        &self,
        license_key: &str,
    ) -> CoreResult<Option<Subscription>> {
        Ok(sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE license_key = $1",
        )
        .bind(license_key)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Create the trial Subscription minted during device approval, inside
    /// the caller's transaction so it commits atomically with the device
    /// status flip (§4.8).
    pub async fn create_trial_subscription(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: i64,
        device_id: &str,
        license_key: &str,
        plan: &str,
        trial_days: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<Subscription> {
        let trial_expires_at = now + Duration::days(trial_days);
        sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                tenant_id, device_id, license_key, plan, status,
                currency, starts_at, trial_expires_at, grace_period_days
            )
            VALUES ($1, $2, $3, $4, 'trial', 'USD', $5, $6, 7)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(device_id)
        .bind(license_key)
        .bind(plan)
        .bind(now)
        .bind(trial_expires_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(CoreError::from)
    }

    /// C10 step 1: active subscriptions whose `expires_at` has passed.
    pub async fn list_active_past_expiry(&self, now: DateTime<Utc>) -> CoreResult<Vec<Subscription>> {
        Ok(sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < $1",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn mark_expired(&self, subscription_id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE subscriptions SET status = 'expired' WHERE id = $1")
            .bind(subscription_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// C10 step 2: expired subscriptions past their grace period.
    pub async fn list_expired_past_grace(&self, now: DateTime<Utc>) -> CoreResult<Vec<Subscription>> {
        Ok(sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE status = 'expired'
              AND expires_at IS NOT NULL
              AND expires_at + (grace_period_days || ' days')::interval < $1
            "#,
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn mark_suspended(&self, subscription_id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE subscriptions SET status = 'suspended' WHERE id = $1")
            .bind(subscription_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// C10 step 3: subscriptions expiring within `window_days`.
    pub async fn list_expiring_within(
        &self,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> CoreResult<Vec<Subscription>> {
        let horizon = now + Duration::days(window_days);
        Ok(sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE status = 'active'
              AND expires_at IS NOT NULL
              AND expires_at >= $1
              AND expires_at < $2
            "#,
        )
        .bind(now)
        .bind(horizon)
        .fetch_all(self.pool())
        .await?)
    }

    /// Record a payment: extend `expires_at` by `30 * extend_months` days
    /// from the later of `now` or the current `expires_at`, per §4.10.
    pub async fn record_payment(
        &self,
        subscription_id: i64,
        extend_months: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<Subscription> {
        let sub = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1")
            .bind(subscription_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("subscription {subscription_id} not found")))?;

        let base = sub.expires_at.map(|e| e.max(now)).unwrap_or(now);
        let new_expires_at = base + Duration::days(30 * extend_months);
        let next_payment_at = new_expires_at - Duration::days(sub.grace_period_days as i64);

        sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = 'active', expires_at = $2, next_payment_at = $3, last_payment_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(new_expires_at)
        .bind(next_payment_at)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_validity_respects_trial_expires_at() {
        let now = Utc::now();
        let sub = Subscription {
            id: 1,
            tenant_id: 1,
            device_id: None,
            license_key: "LIC-AAAA-BBBB-CCCC".into(),
            plan: "starter".into(),
            status: "trial".into(),
            monthly_fee: None,
            currency: "USD".into(),
            starts_at: None,
            expires_at: None,
            trial_expires_at: Some(now + Duration::days(1)),
            grace_period_days: 7,
            last_payment_at: None,
            next_payment_at: None,
        };
        assert!(sub.is_currently_valid(now));

        let mut expired = sub.clone();
        expired.trial_expires_at = Some(now - Duration::hours(1));
        assert!(!expired.is_currently_valid(now));
    }

    #[test]
    fn suspended_is_never_valid() {
        let now = Utc::now();
        let sub = Subscription {
            id: 1,
            tenant_id: 1,
            device_id: None,
            license_key: "LIC-AAAA-BBBB-CCCC".into(),
            plan: "starter".into(),
            status: "suspended".into(),
            monthly_fee: None,
            currency: "USD".into(),
            starts_at: None,
            expires_at: Some(now + Duration::days(30)),
            trial_expires_at: None,
            grace_period_days: 7,
            last_payment_at: None,
            next_payment_at: None,
        };
        assert!(!sub.is_currently_valid(now));
    }
}
