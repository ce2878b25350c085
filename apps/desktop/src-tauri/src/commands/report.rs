//! # Report Commands
//!
//! PDF price lists. The frontend receives the bytes and offers the save
//! dialog with the suggested file name.

use std::collections::HashSet;

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::error::ApiResult;
use crate::pdf::render_price_list;
use crate::state::DbState;
use ecopila_core::{CoreError, PriceList, ProductFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

fn render(list: PriceList) -> ApiResult<PdfFile> {
    let bytes = render_price_list(&list)?;
    info!(file = %list.file_name, rows = list.rows.len(), size = bytes.len(), "Price list rendered");
    Ok(PdfFile {
        file_name: list.file_name,
        bytes,
    })
}

/// Price list of the selected products, in table order. Unknown ids are
/// ignored.
pub async fn price_list_pdf_custom(db: &DbState, ids: Vec<i64>) -> ApiResult<PdfFile> {
    let selected: HashSet<i64> = ids.into_iter().collect();
    let productos = db.inner().productos().list(&ProductFilter::default()).await?;

    let list = PriceList::custom(
        productos.iter().filter(|p| selected.contains(&p.id)),
        Local::now().date_naive(),
    )?;
    render(list)
}

/// Price list of every product of one supplier.
pub async fn price_list_pdf_proveedor(db: &DbState, proveedor_id: i64) -> ApiResult<PdfFile> {
    let proveedor = db
        .inner()
        .proveedores()
        .get_by_id(proveedor_id)
        .await?
        .ok_or(CoreError::ProveedorNotFound(proveedor_id))?;
    let productos = db.inner().productos().list_by_proveedor(proveedor_id).await?;

    let list = PriceList::for_proveedor(&proveedor, &productos, Local::now().date_naive())?;
    render(list)
}
