//! Broker Client (C3): a long-lived MQTT connection with a fixed
//! subscribe set, reconnect-and-resubscribe, and a bounded handoff queue
//! into the ingest pipeline.
//!
//! Grounded on `original_source/backend/src/services/mqtt_service.py`'s
//! "network thread hands decoded messages to the asyncio loop" shape: here
//! `rumqttc::EventLoop::poll` is the network thread's analogue, run as a
//! tokio task this module owns, forwarding into a bounded `mpsc` channel.

pub mod topics;

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::errors::{CoreError, CoreResult};

use topics::InboundKind;

/// A decoded, UTF-8-validated inbound message, already classified against
/// the fixed subscribe set.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub kind: InboundKind,
    pub topic: String,
    pub payload: String,
}

/// Cheaply cloned publish handle, handed to the command dispatcher and the
/// provisioning handler. Does not own the event loop.
#[derive(Clone)]
pub struct Handle {
    client: AsyncClient,
    qos: QoS,
}

impl Handle {
    pub async fn publish(&self, topic: &str, retain: bool, payload: Vec<u8>) -> CoreResult<()> {
        self.client
            .publish(topic, self.qos, retain, payload)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("mqtt publish failed: {e}")))
    }
}

/// Owns the event loop and the inbound fan-in channel. `run` is spawned as
/// its own task and MUST NOT share transactional state with handlers
/// (per spec §4.3) — it only ever forwards `InboundMessage`s.
pub struct Client {
    eventloop: rumqttc::EventLoop,
    client: AsyncClient,
    tx: mpsc::Sender<InboundMessage>,
    reconnect_backoff: Duration,
}

/// Build the client and its publish handle without connecting yet; the
/// connection attempt happens inside `run`'s first `poll`.
pub fn new(
    config: &BrokerConfig,
    queue_capacity: usize,
) -> (Client, Handle, mpsc::Receiver<InboundMessage>) {
    let client_id = format!("pitlinkd-{}", uuid::Uuid::new_v4());
    let mut opts = MqttOptions::new(client_id, config.host.clone(), config.port);
    opts.set_credentials(config.user.clone(), config.password.clone());
    opts.set_keep_alive(Duration::from_secs(config.keepalive_s));
    opts.set_manual_acks(true);

    if config.tls {
        opts.set_transport(Transport::tls_with_default_config());
    }

    let qos = match config.qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    };

    let (client, eventloop) = AsyncClient::new(opts, queue_capacity.max(16));
    let (tx, rx) = mpsc::channel(queue_capacity);

    let handle = Handle {
        client: client.clone(),
        qos,
    };
    let core = Client {
        eventloop,
        client,
        tx,
        reconnect_backoff: Duration::from_secs(config.reconnect_backoff_s),
    };
    (core, handle, rx)
}

impl Client {
    /// Drive the event loop until `cancel` fires. Resubscribes to the fixed
    /// set on every successful `ConnAck`, matching "resubscribes ... on
    /// every successful (re)connection" (§4.3).
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("broker client shutting down");
                    break;
                }
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("broker connected, resubscribing");
                            if let Err(e) = self.resubscribe().await {
                                error!(error = %e, "resubscribe failed");
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.handle_publish(publish).await;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "broker connection error, backing off");
                            tokio::time::sleep(self.reconnect_backoff).await;
                        }
                    }
                }
            }
        }
    }

    async fn resubscribe(&self) -> CoreResult<()> {
        for topic in [
            topics::SUB_SENSORS,
            topics::SUB_STATUS,
            topics::SUB_PROVISIONING_ANNOUNCE,
        ] {
            self.client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| CoreError::UpstreamUnavailable(format!("subscribe failed: {e}")))?;
        }
        Ok(())
    }

    /// Decode, classify, and forward one inbound publish. A `try_send` that
    /// hits a full channel falls back to an awaited `send`, which naturally
    /// pauses `poll` (and therefore the manual ack below) until the ingest
    /// pipeline drains — the "pause acknowledgement" backpressure §4.3 asks
    /// for.
    async fn handle_publish(&mut self, publish: rumqttc::Publish) {
        let Some(kind) = topics::classify(&publish.topic) else {
            debug!(topic = %publish.topic, "ignoring unrecognized topic");
            let _ = self.client.ack(&publish).await;
            return;
        };

        let payload = match String::from_utf8(publish.payload.to_vec()) {
            Ok(s) => s,
            Err(_) => {
                warn!(topic = %publish.topic, "dropping non-utf8 payload");
                let _ = self.client.ack(&publish).await;
                return;
            }
        };

        let msg = InboundMessage {
            kind,
            topic: publish.topic.clone(),
            payload,
        };

        if self.tx.send(msg).await.is_err() {
            warn!("ingest channel closed, dropping message");
        }

        if let Err(e) = self.client.ack(&publish).await {
            warn!(error = %e, "failed to ack publish");
        }
    }
}
