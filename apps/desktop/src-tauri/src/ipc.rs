//! # Tauri Commands
//!
//! `#[tauri::command]` wrappers over [`crate::commands`]. Each one pulls
//! the managed states it needs and forwards; no logic lives here.
//!
//! ```text
//! invoke('add_to_cart', { productoId: 42, cantidad: 2 })
//!        │
//!        ▼
//! ipc::add_to_cart(State<DbState>, State<CartState>, 42, Some(2))
//!        │
//!        ▼
//! commands::cart::add_to_cart(&DbState, &CartState, 42, Some(2))
//! ```

use tauri::State;

use crate::commands::{
    auth, cart, config, dolar, import, producto, proveedor, report, rubro, sync,
};
use crate::error::ApiResult;
use crate::state::{CartState, ConfigState, DbState, SessionState, SyncState, SyncStatusDto};
use ecopila_core::{
    ImportPreview, MutationEntry, ProductFilter, ProductPayload, ProductRelationPayload,
    Proveedor, ProveedorPayload, RelatedProduct, TipoProducto, TipoProductoPayload,
};
use ecopila_sync::SyncConfig;

// =============================================================================
// Productos
// =============================================================================

#[tauri::command]
pub async fn list_productos(
    db: State<'_, DbState>,
    filter: Option<ProductFilter>,
) -> ApiResult<Vec<producto::ProductoDto>> {
    producto::list_productos(&db, filter.unwrap_or_default()).await
}

#[tauri::command]
pub async fn get_producto(db: State<'_, DbState>, id: i64) -> ApiResult<producto::ProductoDto> {
    producto::get_producto(&db, id).await
}

#[tauri::command]
pub async fn get_related_productos(
    db: State<'_, DbState>,
    id: i64,
) -> ApiResult<Vec<RelatedProduct>> {
    producto::get_related_productos(&db, id).await
}

#[tauri::command]
pub async fn create_producto(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
    payload: ProductPayload,
) -> ApiResult<producto::ProductoDto> {
    producto::create_producto(&db, &sync, payload).await
}

#[tauri::command]
pub async fn update_producto(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
    id: i64,
    payload: ProductPayload,
) -> ApiResult<producto::ProductoDto> {
    producto::update_producto(&db, &sync, id, payload).await
}

#[tauri::command]
pub async fn delete_producto(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
    id: i64,
) -> ApiResult<()> {
    producto::delete_producto(&db, &sync, id).await
}

#[tauri::command]
pub async fn relate_productos(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
    id: i64,
    related_ids: Vec<i64>,
) -> ApiResult<Vec<RelatedProduct>> {
    producto::relate_productos(&db, &sync, id, related_ids).await
}

#[tauri::command]
pub async fn add_relacion(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
    relation: ProductRelationPayload,
) -> ApiResult<()> {
    producto::add_relacion(&db, &sync, relation).await
}

#[tauri::command]
pub async fn remove_relacion(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
    relation: ProductRelationPayload,
) -> ApiResult<()> {
    producto::remove_relacion(&db, &sync, relation).await
}

#[tauri::command]
pub async fn scan_producto(
    db: State<'_, DbState>,
    cart: State<'_, CartState>,
    term: String,
) -> ApiResult<producto::ScanResponse> {
    producto::scan_producto(&db, &cart, term).await
}

#[tauri::command]
pub async fn refresh_productos(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
) -> ApiResult<producto::RefreshResponse> {
    producto::refresh_productos(&db, &sync).await
}

// =============================================================================
// Proveedores
// =============================================================================

#[tauri::command]
pub async fn list_proveedores(db: State<'_, DbState>) -> ApiResult<Vec<Proveedor>> {
    proveedor::list_proveedores(&db).await
}

#[tauri::command]
pub async fn get_proveedor(db: State<'_, DbState>, id: i64) -> ApiResult<Proveedor> {
    proveedor::get_proveedor(&db, id).await
}

#[tauri::command]
pub async fn create_proveedor(
    db: State<'_, DbState>,
    session: State<'_, SessionState>,
    sync: State<'_, SyncState>,
    payload: ProveedorPayload,
) -> ApiResult<Proveedor> {
    proveedor::create_proveedor(&db, &session, &sync, payload).await
}

#[tauri::command]
pub async fn update_proveedor(
    db: State<'_, DbState>,
    session: State<'_, SessionState>,
    sync: State<'_, SyncState>,
    id: i64,
    payload: ProveedorPayload,
) -> ApiResult<Proveedor> {
    proveedor::update_proveedor(&db, &session, &sync, id, payload).await
}

#[tauri::command]
pub async fn delete_proveedor(
    db: State<'_, DbState>,
    session: State<'_, SessionState>,
    sync: State<'_, SyncState>,
    id: i64,
) -> ApiResult<()> {
    proveedor::delete_proveedor(&db, &session, &sync, id).await
}

// =============================================================================
// Rubros
// =============================================================================

#[tauri::command]
pub async fn list_rubros(db: State<'_, DbState>) -> ApiResult<Vec<TipoProducto>> {
    rubro::list_rubros(&db).await
}

#[tauri::command]
pub async fn get_rubro(db: State<'_, DbState>, id: i64) -> ApiResult<TipoProducto> {
    rubro::get_rubro(&db, id).await
}

#[tauri::command]
pub async fn create_rubro(
    db: State<'_, DbState>,
    session: State<'_, SessionState>,
    sync: State<'_, SyncState>,
    payload: TipoProductoPayload,
) -> ApiResult<TipoProducto> {
    rubro::create_rubro(&db, &session, &sync, payload).await
}

#[tauri::command]
pub async fn update_rubro(
    db: State<'_, DbState>,
    session: State<'_, SessionState>,
    sync: State<'_, SyncState>,
    id: i64,
    payload: TipoProductoPayload,
) -> ApiResult<TipoProducto> {
    rubro::update_rubro(&db, &session, &sync, id, payload).await
}

#[tauri::command]
pub async fn delete_rubro(
    db: State<'_, DbState>,
    session: State<'_, SessionState>,
    sync: State<'_, SyncState>,
    id: i64,
) -> ApiResult<()> {
    rubro::delete_rubro(&db, &session, &sync, id).await
}

// =============================================================================
// Cart
// =============================================================================

#[tauri::command]
pub fn get_cart(cart: State<'_, CartState>) -> cart::CartResponse {
    cart::get_cart(&cart)
}

#[tauri::command]
pub async fn add_to_cart(
    db: State<'_, DbState>,
    cart: State<'_, CartState>,
    producto_id: i64,
    cantidad: Option<i64>,
) -> ApiResult<cart::CartResponse> {
    cart::add_to_cart(&db, &cart, producto_id, cantidad).await
}

#[tauri::command]
pub fn update_cart_quantity(
    cart: State<'_, CartState>,
    producto_id: i64,
    cantidad: i64,
) -> ApiResult<cart::CartResponse> {
    cart::update_cart_quantity(&cart, producto_id, cantidad)
}

#[tauri::command]
pub fn remove_from_cart(
    cart: State<'_, CartState>,
    producto_id: i64,
) -> ApiResult<cart::CartResponse> {
    cart::remove_from_cart(&cart, producto_id)
}

#[tauri::command]
pub fn clear_cart(cart: State<'_, CartState>) -> cart::CartResponse {
    cart::clear_cart(&cart)
}

#[tauri::command]
pub async fn checkout(
    db: State<'_, DbState>,
    cart: State<'_, CartState>,
    sync: State<'_, SyncState>,
) -> ApiResult<cart::CheckoutResponse> {
    cart::checkout(&db, &cart, &sync).await
}

// =============================================================================
// Import / Export / Reports
// =============================================================================

#[tauri::command]
pub async fn preview_import(
    db: State<'_, DbState>,
    csv: String,
    proveedor_id: Option<i64>,
) -> ApiResult<ImportPreview> {
    import::preview_import(&db, csv, proveedor_id).await
}

#[tauri::command]
pub async fn run_import(
    db: State<'_, DbState>,
    session: State<'_, SessionState>,
    sync: State<'_, SyncState>,
    csv: String,
    proveedor_id: Option<i64>,
) -> ApiResult<import::ImportResult> {
    import::run_import(&db, &session, &sync, csv, proveedor_id).await
}

#[tauri::command]
pub async fn export_productos_csv(db: State<'_, DbState>) -> ApiResult<String> {
    import::export_productos_csv(&db).await
}

#[tauri::command]
pub async fn price_list_pdf_custom(
    db: State<'_, DbState>,
    ids: Vec<i64>,
) -> ApiResult<report::PdfFile> {
    report::price_list_pdf_custom(&db, ids).await
}

#[tauri::command]
pub async fn price_list_pdf_proveedor(
    db: State<'_, DbState>,
    proveedor_id: i64,
) -> ApiResult<report::PdfFile> {
    report::price_list_pdf_proveedor(&db, proveedor_id).await
}

// =============================================================================
// Dólar
// =============================================================================

#[tauri::command]
pub async fn get_dolar(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
) -> ApiResult<dolar::DolarDto> {
    dolar::get_dolar(&db, &sync).await
}

#[tauri::command]
pub async fn force_update_dolar(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
) -> ApiResult<dolar::ForceUpdateResponse> {
    dolar::force_update_dolar(&db, &sync).await
}

// =============================================================================
// Auth
// =============================================================================

#[tauri::command]
pub async fn login(
    session: State<'_, SessionState>,
    sync: State<'_, SyncState>,
    username: String,
    password: String,
) -> ApiResult<auth::SessionInfo> {
    auth::login(&session, &sync, username, password).await
}

#[tauri::command]
pub async fn register(
    sync: State<'_, SyncState>,
    username: String,
    password: String,
    confirm: String,
) -> ApiResult<()> {
    auth::register(&sync, username, password, confirm).await
}

#[tauri::command]
pub async fn logout(session: State<'_, SessionState>, sync: State<'_, SyncState>) -> ApiResult<()> {
    auth::logout(&session, &sync).await;
    Ok(())
}

#[tauri::command]
pub async fn session_info(
    session: State<'_, SessionState>,
) -> ApiResult<Option<auth::SessionInfo>> {
    Ok(auth::session_info(&session).await)
}

// =============================================================================
// Sync / Config
// =============================================================================

#[tauri::command]
pub async fn get_sync_status(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
) -> ApiResult<SyncStatusDto> {
    sync::get_sync_status(&db, &sync).await
}

#[tauri::command]
pub async fn set_offline_mode(
    db: State<'_, DbState>,
    sync: State<'_, SyncState>,
    offline: bool,
) -> ApiResult<SyncStatusDto> {
    sync::set_offline_mode(&db, &sync, offline).await
}

#[tauri::command]
pub async fn list_failed_mutations(db: State<'_, DbState>) -> ApiResult<Vec<MutationEntry>> {
    sync::list_failed_mutations(&db).await
}

#[tauri::command]
pub async fn discard_mutation(db: State<'_, DbState>, id: String) -> ApiResult<()> {
    sync::discard_mutation(&db, id).await
}

#[tauri::command]
pub async fn get_config(config: State<'_, ConfigState>) -> ApiResult<SyncConfig> {
    Ok(config::get_config(&config).await)
}

#[tauri::command]
pub async fn update_config(
    config: State<'_, ConfigState>,
    new_config: SyncConfig,
) -> ApiResult<SyncConfig> {
    config::update_config(&config, new_config).await
}
