//! # Mutation Processor
//!
//! Replays the persisted `mutation_queue` against the API, oldest first.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Mutation Processor Flow                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    mutation_queue Table                         │   │
//! │  │                                                                 │   │
//! │  │  id  | kind            | entity_id     | payload | status      │   │
//! │  │  ────┼─────────────────┼───────────────┼─────────┼──────────── │   │
//! │  │  a1  | create_product  | 1712345678901 | {...}   | pending     │   │
//! │  │  b2  | relate_product  | 1712345678901 | {...}   | pending     │   │
//! │  │  c3  | registrar_venta | venta         | {...}   | pending     │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │ one entry at a time                     │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    MutationProcessor                            │   │
//! │  │                                                                 │   │
//! │  │  claim ──► send ──► 2xx ──► apply reply (re-key) ──► done       │   │
//! │  │    │                                                            │   │
//! │  │    ├───► no response ──► retry later, go offline, stop batch    │   │
//! │  │    │                      (exponential backoff)                 │   │
//! │  │    │                                                            │   │
//! │  │    └───► 4xx/5xx ──► roll back optimistic change ──► failed     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  WAKE-UPS:                                                             │
//! │  • Poll interval (queue_interval_secs) while online                    │
//! │  • Trigger from a command that just queued something                   │
//! │  • Online flag turning true                                            │
//! │  • Backoff timer after a network failure                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are read one at a time rather than in a batch because accepting
//! a create re-keys the entries queued after it. An entry is claimed
//! (`in_flight`) before its request goes out; from then on a local delete
//! can no longer cancel it and is queued behind it instead.

use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use ecopila_core::{MutationEntry, MutationKind, Producto, Proveedor, TipoProducto, Venta};
use ecopila_db::Database;

use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::mutation::{ignore_missing, QueuedMutation};
use crate::refresh::{refresh_catalog, RefreshOutcome};

/// Marks dependents of a rejected create.
const DEPENDENCY_REJECTED: &str = "La creación de la que depende fue rechazada";

// =============================================================================
// Batch Report
// =============================================================================

/// A mutation the server refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedMutation {
    pub id: String,
    pub kind: MutationKind,
    pub message: String,
}

/// What one pass over the queue did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Entries the server accepted.
    pub sent: usize,
    pub rejected: Vec<RejectedMutation>,
    /// Set when a network error stopped the pass.
    pub paused: Option<String>,
    /// Whether the catalog was pulled after the pass.
    pub refreshed: bool,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.sent == 0 && self.rejected.is_empty() && self.paused.is_none()
    }
}

/// The server's reply, kept until it is written to the replica.
enum Reply {
    Producto(Producto),
    Proveedor(Proveedor),
    Tipo(TipoProducto),
    Tipos(Vec<TipoProducto>),
    Venta(Option<Venta>),
    Empty,
}

// =============================================================================
// Processor
// =============================================================================

pub struct MutationProcessor {
    db: Arc<Database>,
    api: ApiClient,
    config: Arc<SyncConfig>,

    backoff: ExponentialBackoff,
    /// Network failures since the last accepted request.
    consecutive_failures: u32,
    /// When the backoff timer fires next (None: not backing off).
    retry_at: Option<Instant>,

    report_tx: Option<mpsc::UnboundedSender<BatchReport>>,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling a running processor.
#[derive(Debug, Clone)]
pub struct MutationProcessorHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl MutationProcessorHandle {
    /// Asks for a pass as soon as possible. Wake-ups coalesce.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}

impl MutationProcessor {
    pub fn new(
        db: Arc<Database>,
        api: ApiClient,
        config: Arc<SyncConfig>,
    ) -> (Self, MutationProcessorHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(config.backoff_initial())
            .with_max_interval(config.backoff_max())
            .with_max_elapsed_time(None)
            .build();

        let processor = MutationProcessor {
            db,
            api,
            config,
            backoff,
            consecutive_failures: 0,
            retry_at: None,
            report_tx: None,
            trigger_rx,
            shutdown_rx,
        };

        (processor, MutationProcessorHandle { trigger_tx, shutdown_tx })
    }

    /// Sends a [`BatchReport`] to `tx` after every pass that did something.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<BatchReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Runs the processor loop until shutdown.
    ///
    /// Entries left pending by a previous run are picked up by the first
    /// pass, along with any it claimed but never finished.
    pub async fn run(mut self) {
        info!("Mutation processor starting");

        match self.db.mutations().release_in_flight().await {
            Ok(0) => {}
            Ok(released) => info!(released, "Re-queued mutations interrupted mid-send"),
            Err(e) => error!(?e, "Failed to release interrupted mutations"),
        }

        let mut online_rx: watch::Receiver<bool> = self.api.online().subscribe();
        let mut interval = tokio::time::interval(self.config.queue_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let retry_at = self.retry_at;

            tokio::select! {
                _ = interval.tick() => {
                    if self.api.online().is_online() && self.retry_at.is_none() {
                        self.pass().await;
                    }
                }

                Some(()) = self.trigger_rx.recv() => {
                    if self.retry_at.is_none() {
                        self.pass().await;
                    }
                }

                changed = online_rx.changed() => {
                    if changed.is_err() {
                        warn!("Online channel closed");
                        break;
                    }
                    if *online_rx.borrow_and_update() {
                        debug!("Back online, resuming queue");
                        self.reset_backoff();
                        self.pass().await;
                    }
                }

                _ = sleep_until(retry_at), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.pass().await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Mutation processor shutting down");
                    break;
                }
            }
        }

        info!("Mutation processor stopped");
    }

    async fn pass(&mut self) {
        match self.process_batch().await {
            Ok(report) => {
                if let Some(tx) = &self.report_tx {
                    if !report.is_empty() {
                        let _ = tx.send(report);
                    }
                }
            }
            Err(e) => error!(?e, "Failed to process mutation queue"),
        }
    }

    fn reset_backoff(&mut self) {
        self.backoff.reset();
        self.consecutive_failures = 0;
        self.retry_at = None;
    }

    /// Schedules the next attempt after a network failure, or parks the
    /// queue until the online flag turns true once the attempts run out.
    fn schedule_retry(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.queue.max_retry_attempts {
            warn!(
                failures = self.consecutive_failures,
                "Queue paused until the server is reachable again"
            );
            self.retry_at = None;
            return;
        }
        self.retry_at = self.backoff.next_backoff().map(|delay| {
            debug!(?delay, failures = self.consecutive_failures, "Backing off");
            Instant::now() + delay
        });
    }

    /// Replays up to `batch_size` pending entries.
    pub async fn process_batch(&mut self) -> SyncResult<BatchReport> {
        let mut report = BatchReport::default();

        if self.api.online().is_offline_mode() {
            debug!("Offline mode, queue left alone");
            return Ok(report);
        }

        let mut products_touched = false;

        for _ in 0..self.config.queue.batch_size {
            let Some(entry) = self.db.mutations().get_pending(1).await?.into_iter().next() else {
                break;
            };
            if !self.db.mutations().claim(&entry.id).await? {
                debug!(id = %entry.id, "Mutation cancelled before send");
                continue;
            }

            let mutation = match QueuedMutation::from_entry(&entry) {
                Ok(mutation) => mutation,
                Err(e) => {
                    error!(id = %entry.id, error = %e, "Dropping undecodable mutation");
                    self.db.mutations().mark_failed(&entry.id, &e.to_string()).await?;
                    report.rejected.push(rejected(&entry, &e));
                    continue;
                }
            };

            match self.send(&mutation).await {
                Ok(reply) => {
                    if let Err(e) = self.apply(&mutation, reply).await {
                        // the server has it; the next refresh repairs the replica
                        error!(id = %entry.id, error = %e, "Failed to apply server reply");
                    }
                    ignore_missing(self.db.mutations().mark_done(&entry.id).await)?;
                    self.reset_backoff();
                    products_touched |= matches!(
                        mutation,
                        QueuedMutation::BulkUploadProducts { .. }
                            | QueuedMutation::RegistrarVenta { .. }
                    );
                    report.sent += 1;
                    debug!(id = %entry.id, kind = %entry.kind, "Mutation accepted");
                }
                Err(e) if e.is_retryable() => {
                    warn!(id = %entry.id, kind = %entry.kind, error = %e, "Mutation will be retried");
                    self.db.mutations().mark_retry(&entry.id, &e.to_string()).await?;
                    self.api.online().set_online(false);
                    self.schedule_retry();
                    report.paused = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    warn!(id = %entry.id, kind = %entry.kind, error = %e, "Mutation rejected, rolling back");
                    self.rollback(&mutation).await;
                    self.db.mutations().mark_failed(&entry.id, &e.to_string()).await?;
                    report.rejected.push(rejected(&entry, &e));
                    self.reject_dependents(&mutation, &mut report).await?;
                }
            }
        }

        // bulk uploads and sales change server-side stock and ids
        if products_touched {
            match refresh_catalog(&self.db, &self.api).await {
                Ok(RefreshOutcome::Refreshed { .. }) => report.refreshed = true,
                Ok(RefreshOutcome::SkippedPending(_)) => {}
                Err(e) => warn!(error = %e, "Catalog refresh after queue pass failed"),
            }
        }

        if report.sent > 0 || !report.rejected.is_empty() {
            info!(
                sent = report.sent,
                rejected = report.rejected.len(),
                paused = report.paused.is_some(),
                "Queue pass finished"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Replay
    // =========================================================================

    async fn send(&self, mutation: &QueuedMutation) -> SyncResult<Reply> {
        let api = &self.api;
        let reply = match mutation {
            QueuedMutation::CreateProduct { payload, .. } => {
                Reply::Producto(api.create_producto(payload).await?)
            }
            QueuedMutation::UpdateProduct { id, payload, .. } => {
                Reply::Producto(api.update_producto(*id, payload).await?)
            }
            QueuedMutation::DeleteProduct { id, .. } => {
                gone_is_fine(api.delete_producto(*id).await)?;
                Reply::Empty
            }

            QueuedMutation::CreateProveedor { payload, .. } => {
                Reply::Proveedor(api.create_proveedor(payload).await?)
            }
            QueuedMutation::UpdateProveedor { id, payload, .. } => {
                Reply::Proveedor(api.update_proveedor(*id, payload).await?)
            }
            QueuedMutation::DeleteProveedor { id, .. } => {
                gone_is_fine(api.delete_proveedor(*id).await)?;
                Reply::Empty
            }

            QueuedMutation::CreateTipoProducto { payload, .. } => {
                Reply::Tipo(api.create_tipo(payload).await?)
            }
            QueuedMutation::UpdateTipoProducto { id, payload, .. } => {
                Reply::Tipo(api.update_tipo(*id, payload).await?)
            }
            QueuedMutation::DeleteTipoProducto { id, .. } => {
                gone_is_fine(api.delete_tipo(*id).await)?;
                Reply::Empty
            }

            QueuedMutation::BulkTipoProducto { payloads, .. } => {
                Reply::Tipos(api.create_tipos_bulk(payloads).await?)
            }
            QueuedMutation::BulkUploadProducts { payloads, .. } => {
                api.bulk_upload_productos(payloads).await?;
                Reply::Empty
            }

            QueuedMutation::RelateProducts { id, related_ids, .. } => {
                api.relate_productos(*id, related_ids).await?;
                Reply::Empty
            }
            QueuedMutation::RelateProduct { relation } => {
                api.add_relacion(relation).await?;
                Reply::Empty
            }
            QueuedMutation::UnrelateProduct { relation } => {
                api.remove_relacion(relation).await?;
                Reply::Empty
            }

            QueuedMutation::RegistrarVenta { venta } => {
                Reply::Venta(api.registrar_venta(venta).await?)
            }
        };
        Ok(reply)
    }

    /// Writes an accepted mutation's reply into the replica.
    async fn apply(&self, mutation: &QueuedMutation, reply: Reply) -> SyncResult<()> {
        let db = &self.db;
        match (mutation, reply) {
            (QueuedMutation::CreateProduct { temp_id, .. }, Reply::Producto(p)) => {
                db.mutations().rekey_entity(*temp_id, p.id).await?;
                if self.deleted_meanwhile(MutationKind::DeleteProduct, p.id).await? {
                    return Ok(());
                }
                ignore_missing(db.productos().rekey(*temp_id, p.id).await)?;
                db.productos().upsert(&p).await?;
                info!(temp_id, id = p.id, "Producto confirmed");
            }
            (QueuedMutation::UpdateProduct { .. }, Reply::Producto(p)) => {
                db.productos().upsert(&p).await?;
            }
            (QueuedMutation::DeleteProduct { id, .. }, _) => {
                ignore_missing(db.productos().delete(*id).await)?;
            }

            (QueuedMutation::CreateProveedor { temp_id, .. }, Reply::Proveedor(p)) => {
                db.mutations().rekey_entity(*temp_id, p.id).await?;
                if self.deleted_meanwhile(MutationKind::DeleteProveedor, p.id).await? {
                    return Ok(());
                }
                ignore_missing(db.proveedores().rekey(*temp_id, p.id).await)?;
                db.proveedores().upsert(&p).await?;
                info!(temp_id, id = p.id, "Proveedor confirmed");
            }
            (QueuedMutation::UpdateProveedor { .. }, Reply::Proveedor(p)) => {
                db.proveedores().upsert(&p).await?;
            }
            (QueuedMutation::DeleteProveedor { id, .. }, _) => {
                ignore_missing(db.proveedores().delete(*id).await)?;
            }

            (QueuedMutation::CreateTipoProducto { temp_id, .. }, Reply::Tipo(t)) => {
                self.confirm_tipo(*temp_id, &t).await?;
            }
            (QueuedMutation::UpdateTipoProducto { .. }, Reply::Tipo(t)) => {
                db.tipos_producto().upsert(&t).await?;
            }
            (QueuedMutation::DeleteTipoProducto { id, .. }, _) => {
                ignore_missing(db.tipos_producto().delete(*id).await)?;
            }

            (QueuedMutation::BulkTipoProducto { temp_ids, payloads }, Reply::Tipos(tipos)) => {
                for (index, (temp_id, payload)) in temp_ids.iter().zip(payloads).enumerate() {
                    let created = tipos
                        .iter()
                        .find(|t| t.nombre.trim().eq_ignore_ascii_case(payload.nombre.trim()))
                        .or_else(|| tipos.get(index));
                    match created {
                        Some(t) => self.confirm_tipo(*temp_id, t).await?,
                        None => warn!(temp_id, nombre = %payload.nombre, "Rubro missing from bulk reply"),
                    }
                }
            }
            (QueuedMutation::BulkUploadProducts { temp_ids, .. }, _) => {
                // server ids come with the refresh that follows the pass
                for id in temp_ids {
                    ignore_missing(db.productos().delete(*id).await)?;
                }
            }

            (QueuedMutation::RelateProducts { id, related_ids, .. }, _) => {
                db.productos().relate(*id, related_ids).await?;
            }
            (QueuedMutation::RelateProduct { relation }, _) => {
                ignore_missing(
                    db.productos()
                        .add_relation(relation.producto_id, relation.producto_relacionado_id)
                        .await,
                )?;
            }
            (QueuedMutation::UnrelateProduct { relation }, _) => {
                db.productos()
                    .remove_relation(relation.producto_id, relation.producto_relacionado_id)
                    .await?;
            }

            (QueuedMutation::RegistrarVenta { .. }, Reply::Venta(venta)) => {
                if let Some(v) = venta {
                    info!(id = v.id, comprobante = %v.numero_comprobante, "Venta registered");
                }
            }

            (mutation, _) => {
                return Err(SyncError::Internal(format!(
                    "unexpected reply for {}",
                    mutation.kind()
                )));
            }
        }
        Ok(())
    }

    async fn confirm_tipo(&self, temp_id: i64, tipo: &TipoProducto) -> SyncResult<()> {
        self.db.mutations().rekey_entity(temp_id, tipo.id).await?;
        if self.deleted_meanwhile(MutationKind::DeleteTipoProducto, tipo.id).await? {
            return Ok(());
        }
        ignore_missing(self.db.tipos_producto().rekey(temp_id, tipo.id).await)?;
        self.db.tipos_producto().upsert(tipo).await?;
        debug!(temp_id, id = tipo.id, nombre = %tipo.nombre, "Rubro confirmed");
        Ok(())
    }

    /// Whether the row was deleted locally while its create was on the
    /// wire. The queued delete now carries the server id; the replica row
    /// stays gone.
    async fn deleted_meanwhile(
        &self,
        delete_kind: MutationKind,
        server_id: i64,
    ) -> SyncResult<bool> {
        let queued = self
            .db
            .mutations()
            .find_pending(delete_kind, &server_id.to_string())
            .await?
            .is_some();
        if queued {
            debug!(server_id, kind = %delete_kind, "Created row already deleted locally");
        }
        Ok(queued)
    }

    // =========================================================================
    // Rollback
    // =========================================================================

    /// Undoes the optimistic change of a rejected mutation. Best effort:
    /// whatever cannot be restored comes back with the next refresh.
    async fn rollback(&self, mutation: &QueuedMutation) {
        if let Err(e) = mutation.undo(&self.db).await {
            error!(kind = %mutation.kind(), error = %e, "Rollback failed");
        }
    }

    /// A rejected create leaves everything queued against its temporary id
    /// pointing at nothing; those entries fail with it.
    async fn reject_dependents(
        &self,
        mutation: &QueuedMutation,
        report: &mut BatchReport,
    ) -> SyncResult<()> {
        let temp_id = match mutation {
            QueuedMutation::CreateProduct { temp_id, .. }
            | QueuedMutation::CreateProveedor { temp_id, .. }
            | QueuedMutation::CreateTipoProducto { temp_id, .. } => *temp_id,
            _ => return Ok(()),
        };

        for entry in self.db.mutations().pending_for_entity(&temp_id.to_string()).await? {
            self.db.mutations().mark_failed(&entry.id, DEPENDENCY_REJECTED).await?;
            report.rejected.push(RejectedMutation {
                id: entry.id,
                kind: entry.kind,
                message: DEPENDENCY_REJECTED.to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn rejected(entry: &MutationEntry, err: &SyncError) -> RejectedMutation {
    RejectedMutation {
        id: entry.id.clone(),
        kind: entry.kind,
        message: err.to_string(),
    }
}

/// Deleting something the server no longer has is what was asked for.
fn gone_is_fine(result: SyncResult<()>) -> SyncResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online::OnlineManager;
    use crate::testing::{closed_port_url, database, payload, producto, serve};
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use ecopila_core::{ProductDiscountPayload, ProductRelationPayload, VentaPayload};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    fn processor(db: Arc<Database>, base: String) -> MutationProcessor {
        let config = Arc::new(SyncConfig::with_base_url(base));
        let api = ApiClient::new(&config, OnlineManager::default()).unwrap();
        MutationProcessor::new(db, api, config).0
    }

    async fn queue(db: &Database, mutation: QueuedMutation) -> MutationEntry {
        mutation.enqueue(db).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_create_rekeys_row_and_later_entries() {
        let db = database().await;
        let temp_id = 1_700_000_000_000;
        db.productos().insert(&producto(temp_id, "AA-4")).await.unwrap();
        db.productos().insert(&producto(9, "AAA-2")).await.unwrap();

        queue(&db, QueuedMutation::CreateProduct { temp_id, payload: payload("AA-4") }).await;
        let relate = queue(
            &db,
            QueuedMutation::RelateProduct {
                relation: ProductRelationPayload {
                    producto_id: temp_id,
                    producto_relacionado_id: 9,
                },
            },
        )
        .await;

        let app = Router::new()
            .route(
                "/api/producto/productos",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "id": 77,
                        "codigo_producto": body["codigo_producto"],
                        "descripcion": body["descripcion"],
                        "iva": 0.21,
                        "porcentaje_ganancia": 30,
                        "precio_publico": 16520.0
                    }))
                }),
            )
            .route(
                "/api/producto/productos/relaciones",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["productoId"], 77);
                    StatusCode::OK
                }),
            );
        let mut processor = processor(db.clone(), serve(app).await);

        let report = processor.process_batch().await.unwrap();
        assert_eq!(report.sent, 2);
        assert!(report.rejected.is_empty());

        assert!(db.productos().get_by_id(temp_id).await.unwrap().is_none());
        let confirmed = db.productos().get_by_id(77).await.unwrap().unwrap();
        assert_eq!(confirmed.precio_publico_cents, 1_652_000);
        assert_eq!(confirmed.productos_relacionados_ids, vec![9]);

        let relate = db.mutations().get_by_id(&relate.id).await.unwrap().unwrap();
        assert_eq!(relate.entity_id, "77");
        assert_eq!(db.mutations().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_during_create_send_follows_server_id() {
        let db = database().await;
        let temp_id = 1_700_000_000_002;
        let local = producto(temp_id, "AA-4");
        db.productos().insert(&local).await.unwrap();
        queue(&db, QueuedMutation::CreateProduct { temp_id, payload: payload("AA-4") }).await;

        let deleted = Arc::new(Mutex::new(Vec::new()));
        let seen = deleted.clone();
        let app = Router::new()
            .route(
                "/api/producto/productos",
                post(|Json(body): Json<Value>| async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Json(json!({
                        "id": 77,
                        "codigo_producto": body["codigo_producto"],
                        "descripcion": body["descripcion"],
                        "iva": 0.21,
                        "porcentaje_ganancia": 30,
                        "precio_publico": 16520.0
                    }))
                }),
            )
            .route(
                "/api/producto/productos/{id}",
                axum::routing::delete(move |Path(id): Path<i64>| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(id);
                        StatusCode::OK
                    }
                }),
            );
        let mut processor = processor(db.clone(), serve(app).await);

        let user_delete = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            db.productos().delete(temp_id).await.unwrap();
            QueuedMutation::DeleteProduct { id: temp_id, snapshot: local.clone() }
                .enqueue(&db)
                .await
                .unwrap()
        };
        let (report, queued_delete) = tokio::join!(processor.process_batch(), user_delete);

        let report = report.unwrap();
        assert!(queued_delete.is_some());
        assert_eq!(report.sent, 2);
        assert!(report.rejected.is_empty());
        assert_eq!(*deleted.lock().unwrap(), vec![77]);

        assert!(db.productos().get_by_id(temp_id).await.unwrap().is_none());
        assert!(db.productos().get_by_id(77).await.unwrap().is_none());
        assert_eq!(db.mutations().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_server_error_rolls_back_update() {
        let db = database().await;
        let original = producto(5, "AA-4");
        let mut edited = original.clone();
        edited.descripcion = "Editado".into();
        db.productos().insert(&edited).await.unwrap();

        let entry = queue(
            &db,
            QueuedMutation::UpdateProduct {
                id: 5,
                payload: edited.to_payload(),
                previous: original.clone(),
            },
        )
        .await;

        let app = Router::new().route(
            "/api/producto/productos/{id}",
            put(|Path(_id): Path<i64>| async {
                (StatusCode::BAD_REQUEST, Json(json!({ "message": "IVA inválido" })))
            }),
        );
        let mut processor = processor(db.clone(), serve(app).await);

        let report = processor.process_batch().await.unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].message, "Server error 400: IVA inválido");

        let restored = db.productos().get_by_id(5).await.unwrap().unwrap();
        assert_eq!(restored.descripcion, original.descripcion);

        let entry = db.mutations().get_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(entry.status, ecopila_core::MutationStatus::Failed);
    }

    #[tokio::test]
    async fn test_rejected_create_fails_dependents() {
        let db = database().await;
        let temp_id = 1_700_000_000_001;
        let local = producto(temp_id, "AA-4");
        db.productos().insert(&local).await.unwrap();

        queue(&db, QueuedMutation::CreateProduct { temp_id, payload: payload("AA-4") }).await;
        queue(
            &db,
            QueuedMutation::UpdateProduct {
                id: temp_id,
                payload: payload("AA-4"),
                previous: local,
            },
        )
        .await;

        let app = Router::new().route(
            "/api/producto/productos",
            post(|| async { (StatusCode::CONFLICT, "duplicado") }),
        );
        let mut processor = processor(db.clone(), serve(app).await);

        let report = processor.process_batch().await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.rejected.len(), 2);
        assert!(db.productos().get_by_id(temp_id).await.unwrap().is_none());
        assert_eq!(db.mutations().count_failed().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_network_error_keeps_entry_and_pauses() {
        let db = database().await;
        db.productos().insert(&producto(5, "AA-4")).await.unwrap();
        let entry = queue(
            &db,
            QueuedMutation::DeleteProduct {
                id: 5,
                snapshot: producto(5, "AA-4"),
            },
        )
        .await;
        queue(
            &db,
            QueuedMutation::RegistrarVenta {
                venta: VentaPayload {
                    items: vec![],
                    total_cents: 0,
                },
            },
        )
        .await;

        let mut processor = processor(db.clone(), closed_port_url().await);
        let report = processor.process_batch().await.unwrap();

        assert!(report.paused.is_some());
        assert_eq!(report.sent, 0);
        assert!(!processor.api.online().is_online());
        assert!(processor.retry_at.is_some());

        let entry = db.mutations().get_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(entry.status, ecopila_core::MutationStatus::Pending);
        assert_eq!(entry.attempts, 1);
        assert_eq!(db.mutations().count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_backoff_gives_up_after_max_attempts() {
        let db = database().await;
        let mut processor = processor(db, closed_port_url().await);
        processor.config = Arc::new({
            let mut config = (*processor.config).clone();
            config.queue.max_retry_attempts = 2;
            config
        });

        processor.schedule_retry();
        assert!(processor.retry_at.is_some());
        processor.schedule_retry();
        assert!(processor.retry_at.is_none());

        processor.reset_backoff();
        assert_eq!(processor.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_rejected_sale_restores_stock_and_delete_404_is_success() {
        let db = database().await;
        let mut item = producto(5, "AA-4");
        item.cantidad = 8;
        db.productos().insert(&item).await.unwrap();

        queue(
            &db,
            QueuedMutation::DeleteProduct {
                id: 6,
                snapshot: producto(6, "AAA-2"),
            },
        )
        .await;
        queue(
            &db,
            QueuedMutation::RegistrarVenta {
                venta: VentaPayload {
                    items: vec![ProductDiscountPayload { id: 5, cantidad: 2 }],
                    total_cents: 3_304_000,
                },
            },
        )
        .await;

        let app = Router::new()
            .route(
                "/api/producto/productos/{id}",
                axum::routing::delete(|Path(_id): Path<i64>| async { StatusCode::NOT_FOUND }),
            )
            .route(
                "/api/venta/ventas",
                post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "Stock insuficiente") }),
            )
            .route("/api/producto/productos", get(|| async { Json(json!([])) }));
        let mut processor = processor(db.clone(), serve(app).await);

        let report = processor.process_batch().await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].kind, MutationKind::RegistrarVenta);

        let restored = db.productos().get_by_id(5).await.unwrap().unwrap();
        assert_eq!(restored.cantidad, 10);
    }

    #[tokio::test]
    async fn test_offline_mode_leaves_queue_alone() {
        let db = database().await;
        queue(
            &db,
            QueuedMutation::DeleteProduct {
                id: 5,
                snapshot: producto(5, "AA-4"),
            },
        )
        .await;

        let mut processor = processor(db.clone(), closed_port_url().await);
        processor.api.online().set_offline_mode(true);

        assert!(processor.process_batch().await.unwrap().is_empty());
        let pending = db.mutations().get_pending(10).await.unwrap();
        assert_eq!(pending[0].attempts, 0);
    }
}
