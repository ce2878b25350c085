//! # API Client
//!
//! Typed access to every endpoint of the Ecopila REST API.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  api.create_producto(&payload)                                          │
//! │       │                                                                 │
//! │       ├── offline mode? ───────────────────────► Err(Offline)           │
//! │       │                                                                 │
//! │       ├── Authorization: Bearer <token>                                 │
//! │       ▼                                                                 │
//! │  reqwest ── no response ──► set_online(false) ──► Err(Network/Timeout)  │
//! │       │                                            (retryable)          │
//! │       │ response                                                        │
//! │       ├── set_online(true)                                              │
//! │       ├── 401/403 ──► broadcast unauthorized ──► Err(Unauthorized)      │
//! │       ├── 4xx/5xx ──────────────────────────────► Err(Server{status})   │
//! │       └── 2xx ──► DTO ──► domain type                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::online::OnlineManager;
use crate::session::Session;
use crate::wire::{
    DolarDto, LoginRequest, LoginResponse, MessageResponse, ProductPayloadDto, ProductoDto,
    ProveedorDto, RegisterRequest, RelatedProductDto, RelationDto, VentaDto, VentaPayloadDto,
};
use ecopila_core::{
    is_optimistic_id, Dolar, ProductFilter, ProductPayload, ProductRelationPayload, Producto,
    Proveedor, ProveedorPayload, RelatedProduct, TipoProducto, TipoProductoPayload, Venta,
    VentaPayload,
};

/// Authority sent when registering from the app.
const DEFAULT_AUTHORITY: &str = "USER";

/// REST client shared by commands, the queue processor and the dólar
/// service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    timeout_secs: u64,
    token: Arc<RwLock<Option<String>>>,
    unauthorized_tx: broadcast::Sender<()>,
    online: OnlineManager,
}

impl ApiClient {
    pub fn new(config: &SyncConfig, online: OnlineManager) -> SyncResult<Self> {
        let mut base = Url::parse(config.base_url())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        let (unauthorized_tx, _) = broadcast::channel(8);

        Ok(ApiClient {
            http,
            base,
            timeout_secs: config.api.request_timeout_secs,
            token: Arc::new(RwLock::new(None)),
            unauthorized_tx,
            online,
        })
    }

    pub fn online(&self) -> &OnlineManager {
        &self.online
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Fires after every 401/403 so the app can drop the session.
    pub fn subscribe_unauthorized(&self) -> broadcast::Receiver<()> {
        self.unauthorized_tx.subscribe()
    }

    /// Exchanges credentials for a token and starts using it.
    pub async fn login(&self, username: &str, password: &str) -> SyncResult<Session> {
        let body = LoginRequest { username, password };
        let response: LoginResponse = self.send_json(Method::POST, "auth/login", &body).await?;

        let session = Session::from_token(response.id_token)?;
        self.set_token(Some(session.token.clone())).await;
        debug!(username, role = %session.role, "Logged in");
        Ok(session)
    }

    pub async fn register(&self, username: &str, password: &str) -> SyncResult<()> {
        let body = RegisterRequest {
            username,
            password,
            authorities: vec![DEFAULT_AUTHORITY.to_string()],
        };
        self.send_unit(self.request(Method::POST, "auth/register")?.json(&body))
            .await
    }

    // =========================================================================
    // Productos
    // =========================================================================

    pub async fn list_productos(&self, filter: &ProductFilter) -> SyncResult<Vec<Producto>> {
        let mut url = self.url("producto/productos")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(term) = filter.normalized_term() {
                query.append_pair("search", &term);
            }
            if let Some(id) = filter.proveedor_id {
                query.append_pair("proveedorId", &id.to_string());
            }
            if let Some(id) = filter.tipo_producto_id {
                query.append_pair("tipoId", &id.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let dtos: Option<Vec<ProductoDto>> =
            self.read_json(self.http.request(Method::GET, url)).await?;
        let now = Utc::now();
        Ok(dtos
            .unwrap_or_default()
            .into_iter()
            .map(|dto| dto.into_domain(now))
            .collect())
    }

    pub async fn get_producto(&self, id: i64) -> SyncResult<Producto> {
        let dto: ProductoDto = self
            .read_json(self.request(Method::GET, &format!("producto/productos/{id}"))?)
            .await?;
        Ok(dto.into_domain(Utc::now()))
    }

    pub async fn create_producto(&self, payload: &ProductPayload) -> SyncResult<Producto> {
        let dto: ProductoDto = self
            .send_json(Method::POST, "producto/productos", &ProductPayloadDto::from(payload))
            .await?;
        Ok(dto.into_domain(Utc::now()))
    }

    pub async fn update_producto(&self, id: i64, payload: &ProductPayload) -> SyncResult<Producto> {
        let dto: ProductoDto = self
            .send_json(
                Method::PUT,
                &format!("producto/productos/{id}"),
                &ProductPayloadDto::from(payload),
            )
            .await?;
        Ok(dto.into_domain(Utc::now()))
    }

    /// Deleting a product the server never saw is a no-op.
    pub async fn delete_producto(&self, id: i64) -> SyncResult<()> {
        if is_optimistic_id(id) {
            debug!(id, "Skipping delete of optimistic product");
            return Ok(());
        }
        self.send_unit(self.request(Method::DELETE, &format!("producto/productos/{id}"))?)
            .await
    }

    pub async fn relate_productos(&self, id: i64, related_ids: &[i64]) -> SyncResult<()> {
        self.send_unit(
            self.request(Method::POST, &format!("producto/productos/{id}/relacionar"))?
                .json(related_ids),
        )
        .await
    }

    pub async fn list_related(&self, id: i64) -> SyncResult<Vec<RelatedProduct>> {
        let dtos: Option<Vec<RelatedProductDto>> = self
            .read_json(self.request(Method::GET, &format!("producto/productos/{id}/relacionados"))?)
            .await?;
        Ok(dtos
            .unwrap_or_default()
            .into_iter()
            .map(RelatedProduct::from)
            .collect())
    }

    pub async fn add_relacion(&self, relation: &ProductRelationPayload) -> SyncResult<()> {
        self.send_unit(
            self.request(Method::POST, "producto/productos/relaciones")?
                .json(&RelationDto::from(relation)),
        )
        .await
    }

    pub async fn remove_relacion(&self, relation: &ProductRelationPayload) -> SyncResult<()> {
        self.send_unit(
            self.request(Method::DELETE, "producto/productos/relaciones")?
                .json(&RelationDto::from(relation)),
        )
        .await
    }

    pub async fn bulk_upload_productos(&self, payloads: &[ProductPayload]) -> SyncResult<()> {
        let body: Vec<ProductPayloadDto> = payloads.iter().map(ProductPayloadDto::from).collect();
        self.send_unit(
            self.request(Method::POST, "producto/productos/cargar-masivo")?
                .json(&body),
        )
        .await
    }

    // =========================================================================
    // Proveedores
    // =========================================================================

    pub async fn list_proveedores(&self) -> SyncResult<Vec<Proveedor>> {
        let dtos: Option<Vec<ProveedorDto>> = self
            .read_json(self.request(Method::GET, "proveedor/proveedores")?)
            .await?;
        Ok(dtos.unwrap_or_default().into_iter().map(Proveedor::from).collect())
    }

    pub async fn get_proveedor(&self, id: i64) -> SyncResult<Proveedor> {
        let dto: ProveedorDto = self
            .read_json(self.request(Method::GET, &format!("proveedor/proveedores/{id}"))?)
            .await?;
        Ok(dto.into())
    }

    pub async fn create_proveedor(&self, payload: &ProveedorPayload) -> SyncResult<Proveedor> {
        let dto: ProveedorDto = self
            .send_json(Method::POST, "proveedor/proveedores", payload)
            .await?;
        Ok(dto.into())
    }

    pub async fn update_proveedor(
        &self,
        id: i64,
        payload: &ProveedorPayload,
    ) -> SyncResult<Proveedor> {
        let dto: ProveedorDto = self
            .send_json(Method::PUT, &format!("proveedor/proveedores/{id}"), payload)
            .await?;
        Ok(dto.into())
    }

    pub async fn delete_proveedor(&self, id: i64) -> SyncResult<()> {
        self.send_unit(self.request(Method::DELETE, &format!("proveedor/proveedores/{id}"))?)
            .await
    }

    // =========================================================================
    // Tipos de producto (rubros)
    // =========================================================================

    pub async fn list_tipos(&self) -> SyncResult<Vec<TipoProducto>> {
        let tipos: Option<Vec<TipoProducto>> = self
            .read_json(self.request(Method::GET, "tipo-producto/tiposproducto")?)
            .await?;
        Ok(tipos.unwrap_or_default())
    }

    pub async fn get_tipo(&self, id: i64) -> SyncResult<TipoProducto> {
        self.read_json(self.request(Method::GET, &format!("tipo-producto/tiposproducto/{id}"))?)
            .await
    }

    pub async fn create_tipo(&self, payload: &TipoProductoPayload) -> SyncResult<TipoProducto> {
        self.send_json(Method::POST, "tipo-producto/tiposproducto", payload)
            .await
    }

    /// Creates several rubros at once; the server answers them in order.
    pub async fn create_tipos_bulk(
        &self,
        payloads: &[TipoProductoPayload],
    ) -> SyncResult<Vec<TipoProducto>> {
        let tipos: Option<Vec<TipoProducto>> = self
            .send_json(Method::POST, "tipo-producto/tiposproducto/bulk", payloads)
            .await?;
        Ok(tipos.unwrap_or_default())
    }

    pub async fn update_tipo(
        &self,
        id: i64,
        payload: &TipoProductoPayload,
    ) -> SyncResult<TipoProducto> {
        self.send_json(
            Method::PUT,
            &format!("tipo-producto/tiposproducto/{id}"),
            payload,
        )
        .await
    }

    pub async fn delete_tipo(&self, id: i64) -> SyncResult<()> {
        self.send_unit(self.request(Method::DELETE, &format!("tipo-producto/tiposproducto/{id}"))?)
            .await
    }

    // =========================================================================
    // Ventas
    // =========================================================================

    /// Registers a sale. Some server versions answer with an empty body.
    pub async fn registrar_venta(&self, venta: &VentaPayload) -> SyncResult<Option<Venta>> {
        let dto: Option<VentaDto> = self
            .send_json(Method::POST, "venta/ventas", &VentaPayloadDto::from(venta))
            .await?;
        Ok(dto.map(|d| d.into_domain(Utc::now())))
    }

    // =========================================================================
    // Dólar
    // =========================================================================

    pub async fn list_dolar(&self) -> SyncResult<Vec<Dolar>> {
        let dtos: Option<Vec<DolarDto>> = self
            .read_json(self.request(Method::GET, "dolar/dolar")?)
            .await?;
        Ok(dtos.unwrap_or_default().into_iter().map(Dolar::from).collect())
    }

    /// The first rate of `/dolar/dolar`.
    pub async fn fetch_dolar(&self) -> SyncResult<Dolar> {
        self.list_dolar()
            .await?
            .into_iter()
            .next()
            .ok_or(SyncError::DolarUnavailable)
    }

    /// Asks the server to re-scrape the rate. Returns its message.
    pub async fn force_update_dolar(&self) -> SyncResult<String> {
        let response: Option<MessageResponse> = self
            .read_json(self.request(Method::POST, "dolar/dolar/force-update")?)
            .await?;
        Ok(response.map(|r| r.message).unwrap_or_default())
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn url(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn request(&self, method: Method, path: &str) -> SyncResult<RequestBuilder> {
        Ok(self.http.request(method, self.url(path)?))
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> SyncResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.read_json(self.request(method, path)?.json(body)).await
    }

    async fn send_unit(&self, request: RequestBuilder) -> SyncResult<()> {
        self.execute(request).await.map(|_| ())
    }

    async fn read_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<T> {
        let response = self.execute(request).await?;
        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(body).map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    /// Sends the request and sorts the outcome into the error classes the
    /// queue's retry policy relies on.
    async fn execute(&self, request: RequestBuilder) -> SyncResult<Response> {
        if self.online.is_offline_mode() {
            return Err(SyncError::Offline);
        }

        let request = match self.token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let err = self.classify(err);
                if err.is_retryable() {
                    warn!(error = %err, "Request got no response");
                    self.online.set_online(false);
                }
                return Err(err);
            }
        };

        self.online.set_online(true);

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "Request rejected as unauthorized");
            let _ = self.unauthorized_tx.send(());
            return Err(SyncError::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Server {
            status: status.as_u16(),
            message: error_message(&body, status),
        })
    }

    fn classify(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout_secs)
        } else {
            SyncError::from(err)
        }
    }
}

/// Prefers the server's `message`/`error` field, then the raw body, then
/// the status text.
fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_port_url, serve};
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&SyncConfig::with_base_url(base), OnlineManager::default()).unwrap()
    }

    #[test]
    fn test_error_message_preference() {
        assert_eq!(
            error_message(r#"{"message":"Código duplicado"}"#, StatusCode::CONFLICT),
            "Código duplicado"
        );
        assert_eq!(error_message("boom", StatusCode::INTERNAL_SERVER_ERROR), "boom");
        assert_eq!(error_message("", StatusCode::NOT_FOUND), "Not Found");
    }

    #[tokio::test]
    async fn test_list_productos_sends_filters_and_token() {
        let app = Router::new().route(
            "/api/producto/productos",
            get(
                |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(json!([{
                        "id": 1,
                        "codigo_producto": "AA-4",
                        "descripcion": auth,
                        "proveedorId": q.get("proveedorId").and_then(|v| v.parse::<i64>().ok()),
                        "iva": 0.21,
                        "porcentaje_ganancia": 30,
                        "precio_publico": 1652.0
                    }]))
                },
            ),
        );
        let base = serve(app).await;
        let api = client(&base);
        api.set_token(Some("abc.def.ghi".into())).await;

        let filter = ProductFilter {
            term: Some("  Pila ".into()),
            proveedor_id: Some(2),
            tipo_producto_id: None,
        };
        let productos = api.list_productos(&filter).await.unwrap();

        assert_eq!(productos.len(), 1);
        assert_eq!(productos[0].descripcion, "Bearer abc.def.ghi");
        assert_eq!(productos[0].proveedor_id, Some(2));
        assert_eq!(productos[0].precio_publico_cents, 165_200);
    }

    #[tokio::test]
    async fn test_server_error_is_not_retryable() {
        let app = Router::new().route(
            "/api/producto/productos",
            post(|| async {
                (
                    AxumStatus::CONFLICT,
                    Json(json!({ "message": "El código ya existe" })),
                )
            }),
        );
        let base = serve(app).await;
        let api = client(&base);
        api.online().set_online(false);

        let payload = crate::testing::payload("AA-4");
        let err = api.create_producto(&payload).await.unwrap_err();

        assert!(matches!(err, SyncError::Server { status: 409, ref message } if message == "El código ya existe"));
        assert!(!err.is_retryable());
        // any answer proves the server is reachable
        assert!(api.online().is_online());
    }

    #[tokio::test]
    async fn test_unauthorized_is_broadcast() {
        let app = Router::new().route(
            "/api/proveedor/proveedores",
            get(|| async { AxumStatus::UNAUTHORIZED }),
        );
        let base = serve(app).await;
        let api = client(&base);
        let mut rx = api.subscribe_unauthorized();

        let err = api.list_proveedores().await.unwrap_err();
        assert!(err.is_auth_error());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_network_error_goes_offline() {
        let api = client(&closed_port_url().await);

        let err = api.list_tipos().await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err:?}");
        assert!(!api.online().is_online());
    }

    #[tokio::test]
    async fn test_offline_mode_sends_nothing() {
        let api = client(&closed_port_url().await);
        api.online().set_offline_mode(true);

        assert!(matches!(api.fetch_dolar().await, Err(SyncError::Offline)));
    }

    #[tokio::test]
    async fn test_dolar_and_force_update() {
        let app = Router::new()
            .route(
                "/api/dolar/dolar",
                get(|| async { Json(json!([{ "id": 1, "nombre": "Oficial", "precio": 1050.0 }])) }),
            )
            .route(
                "/api/dolar/dolar/force-update",
                post(|| async { Json(json!({ "message": "Actualización iniciada" })) }),
            );
        let base = serve(app).await;
        let api = client(&base);

        let dolar = api.fetch_dolar().await.unwrap();
        assert_eq!(dolar.precio_centavos, 105_000);
        assert_eq!(dolar.nombre, "Oficial");
        assert_eq!(api.force_update_dolar().await.unwrap(), "Actualización iniciada");
    }

    #[tokio::test]
    async fn test_empty_bodies() {
        let app = Router::new()
            .route("/api/dolar/dolar", get(|| async { "" }))
            .route("/api/venta/ventas", post(|| async { AxumStatus::CREATED }))
            .route(
                "/api/producto/productos/{id}/relacionados",
                get(|Path(_id): Path<i64>| async { Json(Value::Null) }),
            );
        let base = serve(app).await;
        let api = client(&base);

        assert!(matches!(api.fetch_dolar().await, Err(SyncError::DolarUnavailable)));
        assert!(api.list_related(3).await.unwrap().is_empty());

        let venta = VentaPayload {
            items: vec![],
            total_cents: 0,
        };
        assert_eq!(api.registrar_venta(&venta).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_reads_role() {
        let token = crate::session::tests::token(json!({ "sub": "tomas", "role": "ADMIN" }));
        let app = Router::new().route(
            "/api/auth/login",
            post(move |Json(body): Json<Value>| {
                let token = token.clone();
                async move {
                    assert_eq!(body["username"], "tomas");
                    Json(json!({ "idToken": token }))
                }
            }),
        );
        let base = serve(app).await;
        let api = client(&base);

        let session = api.login("tomas", "secreto").await.unwrap();
        assert!(session.is_admin());
        assert_eq!(api.token().await, Some(session.token));
    }

    #[tokio::test]
    async fn test_delete_optimistic_product_skips_server() {
        let api = client(&closed_port_url().await);
        api.delete_producto(1_700_000_000_000).await.unwrap();
        assert!(api.online().is_online());
    }
}
