//! # Sync Agent
//!
//! Main orchestrator of the client's background work: the mutation queue,
//! the periodic dólar refresh and the stale-catalog refresh.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncAgent                                │  │
//! │  │                                                                  │  │
//! │  │  • Spawns the MutationProcessor                                  │  │
//! │  │  • Runs the supervisor loop (status, timers, session events)     │  │
//! │  │  • Emits status events to the frontend                           │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ OnlineManager  │  │MutationProcess.│  │  DolarService          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ watch<bool>    │  │ Replays queued │  │ Cached rate, refreshed │    │
//! │  │ offline mode   │  │ writes, rolls  │  │ every dolar_refresh    │    │
//! │  │                │  │ back rejects   │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  STATUS EVENTS (to Tauri):                                             │
//! │  ────────────────────────                                              │
//! │  "sync://status"   - { online: true, pending_count: 3, ... }           │
//! │  "sync://rejected" - { kind: "update_product", message: "..." }        │
//! │  "sync://error"    - { message: "...", retryable: false }              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use ecopila_core::Dolar;
use ecopila_db::Database;

use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::dolar::DolarService;
use crate::error::{SyncError, SyncResult};
use crate::online::OnlineManager;
use crate::queue::{BatchReport, MutationProcessor, MutationProcessorHandle, RejectedMutation};
use crate::refresh::{refresh_catalog, RefreshOutcome};

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for the status bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Whether the API answered the last request.
    pub online: bool,

    /// The user pinned the client offline.
    pub offline_mode: bool,

    /// Mutations waiting for the server.
    pub pending_count: i64,

    /// Mutations the server rejected (kept until discarded).
    pub failed_count: i64,

    /// Last accepted mutation or catalog refresh.
    pub last_sync: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    pub dolar: Option<Dolar>,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Trait for emitting sync events (implemented by the Tauri integration).
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);

    /// A queued mutation was rejected and rolled back.
    fn emit_rejected(&self, rejected: &RejectedMutation);

    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_rejected(&self, _rejected: &RejectedMutation) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Agent
// =============================================================================

pub struct SyncAgent {
    config: Arc<SyncConfig>,
    db: Arc<Database>,
    api: ApiClient,
    dolar: DolarService,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
    handle: Option<SyncAgentHandle>,
}

impl SyncAgent {
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn online(&self) -> &OnlineManager {
        self.api.online()
    }

    pub fn dolar(&self) -> &DolarService {
        &self.dolar
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Spawns the processor and the supervisor loop.
    ///
    /// Mutations left pending by the last session resume on the first
    /// pass. Calling `start` twice returns the running agent's handle.
    pub async fn start(&mut self) -> SyncResult<SyncAgentHandle> {
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }

        self.config.validate()?;

        if self.config.offline {
            self.api.online().set_offline_mode(true);
        }

        info!(
            base_url = %self.config.base_url(),
            offline = self.config.offline,
            "Starting sync agent"
        );

        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (processor, processor_handle) =
            MutationProcessor::new(self.db.clone(), self.api.clone(), self.config.clone());
        tokio::spawn(processor.with_reports(report_tx).run());

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let supervisor = Supervisor {
            config: self.config.clone(),
            db: self.db.clone(),
            api: self.api.clone(),
            dolar: self.dolar.clone(),
            status: self.status.clone(),
            emitter: self.emitter.clone(),
        };
        tokio::spawn(supervisor.run(report_rx, shutdown_rx));

        let handle = SyncAgentHandle {
            shutdown_tx,
            processor: processor_handle,
            status: self.status.clone(),
            db: self.db.clone(),
            api: self.api.clone(),
            emitter: self.emitter.clone(),
        };
        self.handle = Some(handle.clone());

        info!("Sync agent started");
        Ok(handle)
    }

    pub async fn shutdown(&mut self) -> SyncResult<()> {
        info!("Shutting down sync agent");
        if let Some(handle) = self.handle.take() {
            handle.shutdown().await;
        }
        info!("Sync agent stopped");
        Ok(())
    }
}

// =============================================================================
// Supervisor Loop
// =============================================================================

struct Supervisor {
    config: Arc<SyncConfig>,
    db: Arc<Database>,
    api: ApiClient,
    dolar: DolarService,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl Supervisor {
    async fn run(
        self,
        mut report_rx: mpsc::UnboundedReceiver<BatchReport>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut online_rx = self.api.online().subscribe();
        let mut unauthorized_rx = self.api.subscribe_unauthorized();

        let mut dolar_tick = tokio::time::interval(to_std(self.config.dolar_refresh()));
        dolar_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut catalog_tick = tokio::time::interval(to_std(self.config.query_stale()));
        catalog_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(report) = report_rx.recv() => {
                    self.on_report(report).await;
                }

                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    debug!(online, "Connectivity seen by supervisor");
                    self.publish(|_| {}).await;
                }

                received = unauthorized_rx.recv() => {
                    match received {
                        Ok(()) | Err(RecvError::Lagged(_)) => {
                            let message = SyncError::Unauthorized { status: 401 }.to_string();
                            self.emitter.emit_error(&message, false);
                            self.publish(|s| s.last_error = Some(message)).await;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                _ = dolar_tick.tick() => {
                    self.refresh_dolar().await;
                }

                _ = catalog_tick.tick() => {
                    self.refresh_catalog().await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Supervisor received shutdown");
                    break;
                }
            }
        }

        info!("Supervisor stopped");
    }

    async fn on_report(&self, report: BatchReport) {
        for rejected in &report.rejected {
            self.emitter.emit_rejected(rejected);
        }

        let now = Utc::now();
        self.publish(|s| {
            if report.sent > 0 || report.refreshed {
                s.last_sync = Some(now);
            }
            if let Some(r) = report.rejected.last() {
                s.last_error = Some(r.message.clone());
            }
        })
        .await;
    }

    async fn refresh_dolar(&self) {
        if self.api.online().is_offline_mode() {
            return;
        }
        match self.dolar.current().await {
            Ok(dolar) => self.publish(|s| s.dolar = Some(dolar)).await,
            Err(e) => {
                warn!(error = %e, "Dólar refresh failed");
                if !e.is_retryable() {
                    self.emitter.emit_error(&e.to_string(), false);
                }
            }
        }
    }

    async fn refresh_catalog(&self) {
        if self.api.online().is_offline_mode() {
            return;
        }
        match refresh_catalog(&self.db, &self.api).await {
            Ok(RefreshOutcome::Refreshed { at, .. }) => {
                self.publish(|s| s.last_sync = Some(at)).await;
            }
            Ok(RefreshOutcome::SkippedPending(_)) => {}
            Err(e) => {
                warn!(error = %e, "Catalog refresh failed");
                self.emitter.emit_error(&e.to_string(), e.is_retryable());
            }
        }
    }

    async fn publish(&self, update: impl FnOnce(&mut SyncStatus)) {
        publish_status(&self.status, &self.db, self.api.online(), &*self.emitter, update).await;
    }
}

/// Recounts the queue, applies `update` and emits the new status.
async fn publish_status(
    status: &RwLock<SyncStatus>,
    db: &Database,
    online: &OnlineManager,
    emitter: &dyn SyncEventEmitter,
    update: impl FnOnce(&mut SyncStatus),
) {
    let pending = db.mutations().count_pending().await;
    let failed = db.mutations().count_failed().await;

    let snapshot = {
        let mut s = status.write().await;
        s.online = online.is_online();
        s.offline_mode = online.is_offline_mode();
        if let Ok(pending) = pending {
            s.pending_count = pending;
        }
        if let Ok(failed) = failed {
            s.failed_count = failed;
        }
        update(&mut s);
        s.clone()
    };
    emitter.emit_status(&snapshot);
}

fn to_std(duration: chrono::Duration) -> std::time::Duration {
    duration
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(1))
        .max(std::time::Duration::from_secs(1))
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running SyncAgent from the desktop commands.
#[derive(Clone)]
pub struct SyncAgentHandle {
    shutdown_tx: mpsc::Sender<()>,
    processor: MutationProcessorHandle,
    status: Arc<RwLock<SyncStatus>>,
    db: Arc<Database>,
    api: ApiClient,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl SyncAgentHandle {
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Wakes the processor after a command queued something, and updates
    /// the pending count right away.
    pub async fn notify_queued(&self) {
        self.processor.trigger();
        self.refresh_status().await;
    }

    /// Recounts the queue and re-emits the status.
    pub async fn refresh_status(&self) {
        publish_status(&self.status, &self.db, self.api.online(), &*self.emitter, |_| {}).await;
    }

    /// Signals the agent to shut down gracefully.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.processor.shutdown().await;
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncAgent with options.
pub struct SyncAgentBuilder {
    config: SyncConfig,
    db: Option<Arc<Database>>,
    online: Option<OnlineManager>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncAgentBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncAgentBuilder {
            config,
            db: None,
            online: None,
            emitter: None,
        }
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }

    /// Shares an existing online flag (the desktop creates it first).
    pub fn with_online(mut self, online: OnlineManager) -> Self {
        self.online = Some(online);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn build(self) -> SyncResult<SyncAgent> {
        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;
        let online = self.online.unwrap_or_default();
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        let api = ApiClient::new(&self.config, online)?;
        let dolar = DolarService::new(db.clone(), api.clone(), &self.config);

        let status = SyncStatus {
            online: api.online().is_online(),
            offline_mode: self.config.offline,
            ..Default::default()
        };

        Ok(SyncAgent {
            config: Arc::new(self.config),
            db,
            api,
            dolar,
            status: Arc::new(RwLock::new(status)),
            emitter,
            handle: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_port_url, database, serve};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use ecopila_core::ProductRelationPayload;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        statuses: Mutex<Vec<SyncStatus>>,
    }

    impl SyncEventEmitter for Recorder {
        fn emit_status(&self, status: &SyncStatus) {
            self.statuses.lock().unwrap().push(status.clone());
        }
        fn emit_rejected(&self, _rejected: &RejectedMutation) {}
        fn emit_error(&self, _message: &str, _retryable: bool) {}
    }

    #[test]
    fn test_sync_status_default() {
        let status = SyncStatus::default();
        assert!(!status.online);
        assert_eq!(status.pending_count, 0);
        assert!(status.dolar.is_none());
    }

    #[tokio::test]
    async fn test_builder_requires_database() {
        let result = SyncAgentBuilder::new(SyncConfig::new()).build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_agent_drains_queue_and_reports() {
        let app = Router::new()
            .route(
                "/api/producto/productos/relaciones",
                post(|| async { axum::http::StatusCode::OK }),
            )
            .route(
                "/api/dolar/dolar",
                get(|| async { Json(json!([{ "id": 1, "nombre": "Oficial", "precio": 1050.0 }])) }),
            )
            .route("/api/producto/productos", get(|| async { Json(json!([])) }))
            .route("/api/proveedor/proveedores", get(|| async { Json(json!([])) }))
            .route("/api/tipo-producto/tiposproducto", get(|| async { Json(json!([])) }));
        let base = serve(app).await;

        let db = database().await;
        crate::mutation::QueuedMutation::RelateProduct {
            relation: ProductRelationPayload {
                producto_id: 1,
                producto_relacionado_id: 2,
            },
        }
        .enqueue(&db)
        .await
        .unwrap();

        let recorder = Arc::new(Recorder::default());
        let mut agent = SyncAgentBuilder::new(SyncConfig::with_base_url(base))
            .with_database(db.clone())
            .with_emitter(recorder.clone())
            .build()
            .unwrap();

        let handle = agent.start().await.unwrap();
        handle.notify_queued().await;

        let mut drained = false;
        for _ in 0..100 {
            if db.mutations().count_pending().await.unwrap() == 0 {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(drained);

        handle.refresh_status().await;
        let status = handle.status().await;
        assert_eq!(status.pending_count, 0);
        assert!(status.online);
        assert!(!recorder.statuses.lock().unwrap().is_empty());

        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_config_pins_offline() {
        let db = database().await;
        let mut config = SyncConfig::with_base_url(closed_port_url().await);
        config.offline = true;

        let mut agent = SyncAgentBuilder::new(config)
            .with_database(db)
            .build()
            .unwrap();
        let handle = agent.start().await.unwrap();
        handle.refresh_status().await;

        let status = handle.status().await;
        assert!(status.offline_mode);
        assert!(!status.online);
        agent.shutdown().await.unwrap();
    }
}
