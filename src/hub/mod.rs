//! Real-Time Hub (C9): a single in-process fan-out registry partitioned by
//! tenant (operator dashboards) and location (customer tracking).
//!
//! Grounded on the original's `ConnectionManager` (workshop/pit-partitioned
//! sets of live connections), restructured around the idiomatic Rust shape
//! for this: a registry guarded by `tokio::sync::RwLock`, one
//! `mpsc::UnboundedSender<Event>` per session. No external locks are
//! needed anywhere else — all cross-task handoff is through these channels
//! (spec §5).

pub mod auth;
pub mod session;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub type SessionId = Uuid;

/// Server -> client event envelope. `event` carries the tag named in
/// spec §4.9 (`sensor_update`, `alert`, `device_offline`, ...); `data` is
/// flattened alongside it.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event: &'static str,
    #[serde(flatten)]
    pub data: Value,
}

impl Event {
    pub fn sensor_update(data: Value) -> Self {
        Self { event: "sensor_update", data }
    }

    pub fn alert(data: Value) -> Self {
        Self { event: "alert", data }
    }

    pub fn device_offline(data: Value) -> Self {
        Self { event: "device_offline", data }
    }

    pub fn device_online(data: Value) -> Self {
        Self { event: "device_online", data }
    }

    pub fn camera_offline(data: Value) -> Self {
        Self { event: "camera_offline", data }
    }

    pub fn job_status(data: Value) -> Self {
        Self { event: "job_status", data }
    }

    pub fn pong() -> Self {
        Self {
            event: "pong",
            data: Value::Object(Default::default()),
        }
    }
}

type Subscribers = HashMap<SessionId, mpsc::UnboundedSender<Event>>;

#[derive(Default)]
pub struct Hub {
    tenant_subs: RwLock<HashMap<i64, Subscribers>>,
    location_subs: RwLock<HashMap<i64, Subscribers>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe_tenant(
        &self,
        session_id: SessionId,
        tenant_id: i64,
        sender: mpsc::UnboundedSender<Event>,
    ) {
        self.tenant_subs
            .write()
            .await
            .entry(tenant_id)
            .or_default()
            .insert(session_id, sender);
    }

    pub async fn subscribe_location(
        &self,
        session_id: SessionId,
        location_id: i64,
        sender: mpsc::UnboundedSender<Event>,
    ) {
        self.location_subs
            .write()
            .await
            .entry(location_id)
            .or_default()
            .insert(session_id, sender);
    }

    pub async fn unsubscribe_location(&self, session_id: SessionId, location_id: i64) {
        if let Some(subs) = self.location_subs.write().await.get_mut(&location_id) {
            subs.remove(&session_id);
        }
    }

    /// Remove a session from every partition, called on transport close or
    /// auth expiry.
    pub async fn remove_session(&self, session_id: SessionId) {
        let mut tenant_subs = self.tenant_subs.write().await;
        for subs in tenant_subs.values_mut() {
            subs.remove(&session_id);
        }
        drop(tenant_subs);

        let mut location_subs = self.location_subs.write().await;
        for subs in location_subs.values_mut() {
            subs.remove(&session_id);
        }
    }

    /// Non-blocking per subscriber; a failing send (the subscriber's
    /// channel is closed) removes it from the partition. Exactly one
    /// broadcast is emitted per persisted event (§4.9 detail floor).
    pub async fn broadcast_to_tenant(&self, tenant_id: i64, event: Event) {
        let mut tenant_subs = self.tenant_subs.write().await;
        if let Some(subs) = tenant_subs.get_mut(&tenant_id) {
            subs.retain(|_, tx| tx.send(event.clone()).is_ok());
        }
    }

    pub async fn broadcast_to_location(&self, location_id: i64, event: Event) {
        let mut location_subs = self.location_subs.write().await;
        if let Some(subs) = location_subs.get_mut(&location_id) {
            subs.retain(|_, tx| tx.send(event.clone()).is_ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_only_subscribed_partition() {
        let hub = Hub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        hub.subscribe_location(session_id, 3, tx).await;

        hub.broadcast_to_location(3, Event::sensor_update(serde_json::json!({"x": 1})))
            .await;
        hub.broadcast_to_location(4, Event::sensor_update(serde_json::json!({"x": 2})))
            .await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, "sensor_update");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_subscriber_is_dropped_on_send_failure() {
        let hub = Hub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        hub.subscribe_tenant(session_id, 7, tx).await;
        drop(rx);

        hub.broadcast_to_tenant(7, Event::alert(serde_json::json!({}))).await;

        let subs = hub.tenant_subs.read().await;
        assert!(subs.get(&7).map(|s| s.is_empty()).unwrap_or(true));
    }

    #[tokio::test]
    async fn remove_session_clears_all_partitions() {
        let hub = Hub::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        hub.subscribe_tenant(session_id, 7, tx1).await;
        hub.subscribe_location(session_id, 3, tx2).await;

        hub.remove_session(session_id).await;

        assert!(hub.tenant_subs.read().await.get(&7).unwrap().is_empty());
        assert!(hub.location_subs.read().await.get(&3).unwrap().is_empty());
    }
}
