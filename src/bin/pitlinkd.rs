//! Process entrypoint: wires the broker client, ingest pipeline,
//! provisioning handler, lifecycle scheduler and the real-time hub's HTTP
//! surface into one running daemon, then drives all of it until
//! `SIGINT`/`SIGTERM` cancels a shared `CancellationToken` (mirroring the
//! teacher's `server/main.rs` bind-and-serve shape, generalized to this
//! crate's multi-task layout).

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pitlink_core::broker::topics::InboundKind;
use pitlink_core::commands::Dispatcher;
use pitlink_core::config;
use pitlink_core::db::Database;
use pitlink_core::hub::Hub;
use pitlink_core::ingest::Pipeline;
use pitlink_core::lifecycle::{LifecycleConfig, Scheduler};
use pitlink_core::provisioning::ProvisioningHandler;
use pitlink_core::server::{self, AppState};
use pitlink_core::{broker, errors::CoreResult};

#[tokio::main]
async fn main() -> CoreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cfg = config::get_config()?;
    info!("starting pitlinkd");

    let db = Database::connect(&cfg.db).await?;

    let (broker_client, broker_handle, mut inbound_rx) = broker::new(&cfg.broker, 1024);
    let dispatcher = Dispatcher::new(Arc::clone(&db), broker_handle.clone());
    let hub = Arc::new(Hub::new());
    let pipeline = Pipeline::new(Arc::clone(&db), dispatcher.clone(), Arc::clone(&hub));
    let provisioning = ProvisioningHandler::new(
        Arc::clone(&db),
        dispatcher.clone(),
        cfg.subscriptions.clone(),
    );

    let cancel = CancellationToken::new();

    let broker_task = {
        let cancel = cancel.clone();
        tokio::spawn(broker_client.run(cancel))
    };

    let ingest_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe_msg = inbound_rx.recv() => {
                        let Some(msg) = maybe_msg else { break };
                        let result = match msg.kind {
                            InboundKind::Sensors => pipeline.handle_sensor_message(&msg.payload).await,
                            InboundKind::Status => pipeline.handle_status_message(&msg.payload).await,
                            InboundKind::ProvisioningAnnounce => {
                                provisioning.on_announce(&msg.payload).await
                            }
                        };
                        if let Err(e) = result {
                            warn!(error = %e, topic = %msg.topic, "failed to handle inbound message");
                        }
                    }
                }
            }
        })
    };

    let mut scheduler = Scheduler::new(Arc::clone(&db), dispatcher.clone(), LifecycleConfig::default())
        .await
        .map_err(|e| pitlink_core::errors::CoreError::InternalError(e.to_string()))?;
    scheduler.start().await.map_err(|e| {
        pitlink_core::errors::CoreError::InternalError(e.to_string())
    })?;

    let state = AppState::new(hub, cfg.auth.jwt_secret.clone());
    let app = server::build_router(state);
    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| pitlink_core::errors::CoreError::InternalError(format!("bind {addr} failed: {e}")))?;
    info!(%addr, "listening for hub connections");

    let server_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }
    cancel.cancel();

    let _ = broker_task.await;
    let _ = ingest_task.await;
    match server_task.await {
        Ok(Err(e)) => error!(error = %e, "server exited with an error"),
        Err(e) => error!(error = %e, "server task join failed"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = scheduler.shutdown().await {
        error!(error = %e, "scheduler shutdown failed");
    }

    Ok(())
}
