//! Shared fixtures for the sync tests: an in-process axum server standing
//! in for the Ecopila API, and an in-memory replica.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use ecopila_core::{ProductPayload, Producto};
use ecopila_db::{Database, DbConfig};

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

pub(crate) async fn database() -> Arc<Database> {
    Arc::new(Database::new(DbConfig::in_memory()).await.unwrap())
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

/// A confirmed product as the server would return it.
pub(crate) fn producto(id: i64, codigo: &str) -> Producto {
    ecopila_core::pricing::build_producto(
        id,
        &payload(codigo),
        ecopila_core::ExchangeRate::from_centavos(105_000),
        chrono::Utc::now(),
    )
    .unwrap()
}
