//! # Dólar Commands

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::ApiResult;
use crate::state::{DbState, SyncState};
use ecopila_core::{Dolar, Money};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DolarDto {
    pub nombre: String,
    pub precio_centavos: i64,
    /// `$1.050,00`
    pub precio_formatted: String,
    /// When the rate was fetched; `None` before the first fetch.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl DolarDto {
    fn new(dolar: Dolar, fetched_at: Option<DateTime<Utc>>) -> Self {
        DolarDto {
            precio_formatted: Money::from_cents(dolar.precio_centavos).format_ars(),
            nombre: dolar.nombre,
            precio_centavos: dolar.precio_centavos,
            fetched_at,
        }
    }
}

async fn fetched_at(db: &DbState) -> ApiResult<Option<DateTime<Utc>>> {
    Ok(db.inner().dolar().latest().await?.map(|c| c.fetched_at))
}

/// The current rate: cached while fresh, fetched otherwise, stale cache
/// when the server cannot be reached.
pub async fn get_dolar(db: &DbState, sync: &SyncState) -> ApiResult<DolarDto> {
    let dolar = sync.dolar().current().await?;
    Ok(DolarDto::new(dolar, fetched_at(db).await?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceUpdateResponse {
    pub message: String,
    pub dolar: DolarDto,
}

/// Asks the server to re-scrape the rate, then refetches it. Local prices
/// follow the new rate.
pub async fn force_update_dolar(db: &DbState, sync: &SyncState) -> ApiResult<ForceUpdateResponse> {
    let update = sync.dolar().force_update().await?;
    info!(precio_centavos = update.dolar.precio_centavos, "Dólar force-updated");
    Ok(ForceUpdateResponse {
        message: update.message,
        dolar: DolarDto::new(update.dolar, fetched_at(db).await?),
    })
}
