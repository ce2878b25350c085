//! Fixtures for the command tests: the managed states wired to an
//! in-memory replica and, where the server matters, an in-process axum
//! mock of the Ecopila API.

use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use tokio::net::TcpListener;

use ecopila_core::{pricing::build_producto, ExchangeRate, ProductPayload, Producto, Role};
use ecopila_db::{Database, DbConfig};
use ecopila_sync::{ApiClient, DolarService, OnlineManager, Session, SyncConfig};

use crate::state::{CartState, DbState, SessionState, SyncState};

pub(crate) const RATE: i64 = 105_000;

/// Serves `router` on an ephemeral port and returns its `/api` base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/api")
}

/// A base URL where nothing listens.
pub(crate) async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api")
}

pub(crate) fn payload(codigo: &str) -> ProductPayload {
    ProductPayload {
        codigo_producto: codigo.to_string(),
        descripcion: format!("Pila {codigo}"),
        cantidad: 10,
        proveedor_id: None,
        tipo_producto_id: None,
        porcentaje_ganancia_bps: 3000,
        iva_bps: 2100,
        resto: Some(10),
        costo_fijo: false,
        precio_sin_iva_cents: Some(1000),
        costo_pesos_cents: None,
    }
}

pub(crate) fn producto(id: i64, codigo: &str) -> Producto {
    build_producto(id, &payload(codigo), ExchangeRate::from_centavos(RATE), Utc::now()).unwrap()
}

pub(crate) fn session(role: Role) -> Session {
    Session {
        token: "token".to_string(),
        username: Some("vendedor".to_string()),
        role,
        expires_at: None,
    }
}

/// Every state a command can ask for.
pub(crate) struct Harness {
    pub db: DbState,
    pub cart: CartState,
    pub session: SessionState,
    pub sync: SyncState,
}

impl Harness {
    pub fn database(&self) -> &Database {
        self.db.inner()
    }

    pub async fn login(&self, role: Role) {
        self.session.set(session(role)).await;
    }
}

/// States pointing at `base_url`, logged in as admin, with a cached rate.
pub(crate) async fn harness(base_url: String) -> Harness {
    let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
    db.dolar()
        .save(
            &ecopila_core::Dolar {
                id: 1,
                nombre: ecopila_core::DEFAULT_DOLAR_NAME.to_string(),
                precio_centavos: RATE,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    let config = SyncConfig::with_base_url(base_url);
    let api = ApiClient::new(&config, OnlineManager::default()).unwrap();
    let dolar = DolarService::new(db.clone(), api.clone(), &config);

    let harness = Harness {
        db: DbState::new(db),
        cart: CartState::new(),
        session: SessionState::new(),
        sync: SyncState::new(api, dolar),
    };
    harness.login(Role::Admin).await;
    harness
}

/// States with offline mode on: nothing reaches the network.
pub(crate) async fn offline_harness() -> Harness {
    let harness = harness(closed_port_url().await).await;
    harness.sync.online().set_offline_mode(true);
    harness
}

/// Makes every insert into `mutation_queue` fail, as a full disk would.
pub(crate) async fn block_queue_writes(db: &Database) {
    sqlx::query(
        "CREATE TRIGGER block_queue BEFORE INSERT ON mutation_queue
         BEGIN SELECT RAISE(ABORT, 'database or disk is full'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();
}
