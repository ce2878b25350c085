//! # Dólar Service
//!
//! Serves the exchange rate every peso price depends on.
//!
//! ```text
//!   current()
//!     │
//!     ├── cache younger than dolar_refresh ──────────────► cached rate
//!     │
//!     └── GET /dolar/dolar
//!            ├── ok, precio > 0 ── reprice if changed ── save ──► rate
//!            └── error ── stale cache? ──► stale rate
//!                             └── none ──► error
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use ecopila_core::pricing::reprice_all;
use ecopila_core::Dolar;
use ecopila_db::{CachedDolar, Database};

/// How long the server needs to scrape a new rate after a force update.
pub const DEFAULT_FORCE_UPDATE_DELAY: Duration = Duration::from_secs(1);

/// Result of [`DolarService::force_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedUpdate {
    /// What the server said (`"Actualización iniciada"`, ...).
    pub message: String,
    pub dolar: Dolar,
}

#[derive(Debug, Clone)]
pub struct DolarService {
    db: Arc<Database>,
    api: ApiClient,
    max_age: chrono::Duration,
    force_delay: Duration,
}

impl DolarService {
    pub fn new(db: Arc<Database>, api: ApiClient, config: &SyncConfig) -> Self {
        DolarService {
            db,
            api,
            max_age: config.dolar_refresh(),
            force_delay: DEFAULT_FORCE_UPDATE_DELAY,
        }
    }

    pub fn with_force_delay(mut self, delay: Duration) -> Self {
        self.force_delay = delay;
        self
    }

    /// The cached rate, however old.
    pub async fn cached(&self) -> SyncResult<Option<CachedDolar>> {
        Ok(self.db.dolar().latest().await?)
    }

    /// The current rate, fetched only when the cache has gone stale.
    pub async fn current(&self) -> SyncResult<Dolar> {
        let cached = self.cached().await?;
        if let Some(c) = &cached {
            if !c.is_stale(Utc::now(), self.max_age) {
                return Ok(c.dolar.clone());
            }
        }

        match self.fetch().await {
            Ok(dolar) => Ok(dolar),
            Err(err) => match cached {
                Some(c) => {
                    warn!(error = %err, fetched_at = %c.fetched_at, "Using stale dólar");
                    Ok(c.dolar)
                }
                None => Err(err),
            },
        }
    }

    /// Fetches the rate regardless of the cache.
    pub async fn refresh(&self) -> SyncResult<Dolar> {
        self.fetch().await
    }

    /// Asks the server to re-scrape, waits for it, then refetches.
    pub async fn force_update(&self) -> SyncResult<ForcedUpdate> {
        let message = self.api.force_update_dolar().await?;
        info!(message = %message, "Dólar force update requested");

        tokio::time::sleep(self.force_delay).await;

        let dolar = self.fetch().await?;
        Ok(ForcedUpdate { message, dolar })
    }

    async fn fetch(&self) -> SyncResult<Dolar> {
        let dolar = self.api.fetch_dolar().await?;
        if !dolar.is_valid() {
            warn!(precio_centavos = dolar.precio_centavos, "Server returned an invalid dólar");
            return Err(SyncError::DolarUnavailable);
        }

        // the rate is stored only once the replica follows it, so a failed
        // reprice is retried by the next fetch
        let previous = self.db.dolar().latest().await?;
        let changed = previous.map_or(true, |p| p.dolar.precio_centavos != dolar.precio_centavos);
        if changed {
            self.reprice(&dolar).await?;
        }
        self.db.dolar().save(&dolar, Utc::now()).await?;
        Ok(dolar)
    }

    /// Re-derives local peso prices so the replica matches the new rate
    /// before the next catalog refresh.
    async fn reprice(&self, dolar: &Dolar) -> SyncResult<usize> {
        let mut productos = self.db.productos().list(&Default::default()).await?;
        let repriced = reprice_all(&mut productos, dolar.rate())?;
        if !repriced.skipped.is_empty() {
            warn!(ids = ?repriced.skipped, "Productos kept their old price");
        }
        if repriced.changed > 0 {
            self.db.productos().update_many(&productos).await?;
        }
        debug!(rate = %dolar.rate(), changed = repriced.changed, "Repriced productos");
        Ok(repriced.changed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online::OnlineManager;
    use crate::testing::{closed_port_url, database, producto, serve};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(db: Arc<Database>, base: String) -> DolarService {
        let config = SyncConfig::with_base_url(base);
        let api = ApiClient::new(&config, OnlineManager::default()).unwrap();
        DolarService::new(db, api, &config).with_force_delay(Duration::from_millis(10))
    }

    fn dolar_server(hits: Arc<AtomicUsize>, precio: f64) -> Router {
        Router::new()
            .route(
                "/api/dolar/dolar",
                get(move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Json(json!([{ "id": 1, "nombre": "", "precio": precio }]))
                    }
                }),
            )
            .route(
                "/api/dolar/dolar/force-update",
                post(|| async { Json(json!({ "message": "Actualización iniciada" })) }),
            )
    }

    #[tokio::test]
    async fn test_current_uses_fresh_cache() {
        let db = database().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(dolar_server(hits.clone(), 1100.0)).await;
        let service = service(db, base);

        let first = service.current().await.unwrap();
        let second = service.current().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.precio_centavos, 110_000);
        assert_eq!(first.nombre, ecopila_core::DEFAULT_DOLAR_NAME);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_survives_network_error() {
        let db = database().await;
        let old = Dolar {
            id: 1,
            nombre: "Oficial".into(),
            precio_centavos: 105_000,
        };
        db.dolar()
            .save(&old, Utc::now() - chrono::Duration::hours(2))
            .await
            .unwrap();

        let service = service(db, closed_port_url().await);
        assert_eq!(service.current().await.unwrap(), old);
    }

    #[tokio::test]
    async fn test_no_cache_and_no_server_fails() {
        let service = service(database().await, closed_port_url().await);
        assert!(service.current().await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_rate_is_rejected() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(dolar_server(hits, 0.0)).await;
        let service = service(database().await, base);

        assert!(matches!(service.refresh().await, Err(SyncError::DolarUnavailable)));
    }

    #[tokio::test]
    async fn test_unpriceable_product_does_not_block_new_rate() {
        let db = database().await;
        let before = producto(5, "AA-4");
        db.productos().insert(&before).await.unwrap();
        let mut broken = producto(6, "AAA-2");
        broken.precio_sin_iva_cents = -500;
        db.productos().insert(&broken).await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(dolar_server(hits, 1200.0)).await;
        let service = service(db.clone(), base);

        assert_eq!(service.refresh().await.unwrap().precio_centavos, 120_000);

        let cached = service.cached().await.unwrap().unwrap();
        assert_eq!(cached.dolar.precio_centavos, 120_000);
        let after = db.productos().get_by_id(5).await.unwrap().unwrap();
        assert!(after.precio_publico_cents > before.precio_publico_cents);
        let kept = db.productos().get_by_id(6).await.unwrap().unwrap();
        assert_eq!(kept.precio_publico_cents, broken.precio_publico_cents);
    }

    #[tokio::test]
    async fn test_force_update_refetches_and_reprices() {
        let db = database().await;
        let before = producto(5, "AA-4");
        db.productos().insert(&before).await.unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(dolar_server(hits.clone(), 1200.0)).await;
        let service = service(db.clone(), base);

        let forced = service.force_update().await.unwrap();
        assert_eq!(forced.message, "Actualización iniciada");
        assert_eq!(forced.dolar.precio_centavos, 120_000);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let after = db.productos().get_by_id(5).await.unwrap().unwrap();
        assert!(after.precio_publico_cents > before.precio_publico_cents);
        assert_eq!(after.precio_publico_us_cents, before.precio_publico_us_cents);
    }
}
