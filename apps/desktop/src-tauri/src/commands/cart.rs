//! # Cart Commands
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Lifecycle                                       │
//! │                                                                         │
//! │  ┌──────────┐     ┌──────────┐     ┌──────────────────────────────┐    │
//! │  │  Empty   │────►│ In Cart  │────►│ checkout                     │    │
//! │  │  Cart    │     │          │     │  • queue registrar_venta     │    │
//! │  └──────────┘     └──────────┘     │  • lower local stock         │    │
//! │       ▲                │           │  • clear                     │    │
//! │       │           add_to_cart      └──────────────┬───────────────┘    │
//! │       │           update_quantity                 │                     │
//! │       │           remove_from_cart                │                     │
//! │       └──────────── clear_cart ◄──────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sale the server rejects gives its stock back (see the queue
//! rollback); the cart is not restored.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commands::queue;
use crate::error::ApiResult;
use crate::state::{Cart, CartItem, CartState, CartTotals, DbState, SyncState};
use ecopila_core::CoreError;
use ecopila_sync::QueuedMutation;

/// Cart response including items and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub totals: CartTotals,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        CartResponse {
            items: cart.items.clone(),
            totals: CartTotals::from(cart),
        }
    }
}

pub fn get_cart(cart: &CartState) -> CartResponse {
    cart.with_cart(|c| CartResponse::from(c))
}

/// Adds a product from the replica. Price and description are frozen in
/// the line.
pub async fn add_to_cart(
    db: &DbState,
    cart: &CartState,
    producto_id: i64,
    cantidad: Option<i64>,
) -> ApiResult<CartResponse> {
    let producto = db
        .inner()
        .productos()
        .get_by_id(producto_id)
        .await?
        .ok_or(CoreError::ProductoNotFound(producto_id))?;

    let cantidad = cantidad.unwrap_or(1);
    debug!(producto_id, cantidad, "add_to_cart");

    let response = cart.with_cart_mut(|c| {
        c.add_item(&producto, cantidad).map(|()| CartResponse::from(&*c))
    })?;
    Ok(response)
}

/// Sets a line's quantity; 0 removes the line.
pub fn update_cart_quantity(
    cart: &CartState,
    producto_id: i64,
    cantidad: i64,
) -> ApiResult<CartResponse> {
    let response = cart.with_cart_mut(|c| {
        c.update_quantity(producto_id, cantidad).map(|()| CartResponse::from(&*c))
    })?;
    Ok(response)
}

pub fn remove_from_cart(cart: &CartState, producto_id: i64) -> ApiResult<CartResponse> {
    let response = cart.with_cart_mut(|c| {
        c.remove_item(producto_id).map(|()| CartResponse::from(&*c))
    })?;
    Ok(response)
}

pub fn clear_cart(cart: &CartState) -> CartResponse {
    cart.with_cart_mut(|c| {
        c.clear();
        CartResponse::from(&*c)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub items: usize,
    pub total_cents: i64,
    pub total_formatted: String,
}

/// Queues the sale, lowers local stock and empties the cart.
pub async fn checkout(
    db: &DbState,
    cart: &CartState,
    sync: &SyncState,
) -> ApiResult<CheckoutResponse> {
    let (venta, totals) = cart.with_cart(|c| c.to_venta().map(|v| (v, CartTotals::from(c))))?;

    for item in &venta.items {
        match db.inner().productos().adjust_stock(item.id, -item.cantidad).await {
            Ok(()) => {}
            // deleted since it went into the cart; the server decides
            Err(e) if e.is_not_found() => warn!(id = item.id, "Sold product missing from replica"),
            Err(e) => return Err(e.into()),
        }
    }

    let response = CheckoutResponse {
        items: venta.items.len(),
        total_cents: venta.total_cents,
        total_formatted: totals.total_formatted,
    };
    queue(db, sync, QueuedMutation::RegistrarVenta { venta }).await?;
    cart.with_cart_mut(Cart::clear);

    info!(items = response.items, total_cents = response.total_cents, "Venta queued");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{block_queue_writes, offline_harness, producto};
    use ecopila_core::MutationKind;

    #[tokio::test]
    async fn test_add_update_remove() {
        let h = offline_harness().await;
        let p = producto(1, "AA-4");
        h.database().productos().insert(&p).await.unwrap();

        let response = add_to_cart(&h.db, &h.cart, 1, Some(2)).await.unwrap();
        assert_eq!(response.totals.total_cents, p.precio_publico_cents * 2);

        let response = update_cart_quantity(&h.cart, 1, 5).unwrap();
        assert_eq!(response.totals.total_quantity, 5);

        let response = remove_from_cart(&h.cart, 1).unwrap();
        assert!(response.items.is_empty());

        let err = add_to_cart(&h.db, &h.cart, 99, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_checkout_queues_sale_and_lowers_stock() {
        let h = offline_harness().await;
        h.database().productos().insert(&producto(1, "AA-4")).await.unwrap();
        add_to_cart(&h.db, &h.cart, 1, Some(3)).await.unwrap();

        let response = checkout(&h.db, &h.cart, &h.sync).await.unwrap();
        assert_eq!(response.items, 1);

        let stored = h.database().productos().get_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.cantidad, 7);
        assert!(get_cart(&h.cart).items.is_empty());

        let queued = h.database().mutations().get_pending(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, MutationKind::RegistrarVenta);
    }

    #[tokio::test]
    async fn test_checkout_that_cannot_queue_keeps_stock_and_cart() {
        let h = offline_harness().await;
        h.database().productos().insert(&producto(1, "AA-4")).await.unwrap();
        add_to_cart(&h.db, &h.cart, 1, Some(3)).await.unwrap();
        block_queue_writes(h.database()).await;

        assert!(checkout(&h.db, &h.cart, &h.sync).await.is_err());

        let stored = h.database().productos().get_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.cantidad, 10);
        assert_eq!(get_cart(&h.cart).items.len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_empty_cart() {
        let h = offline_harness().await;
        let err = checkout(&h.db, &h.cart, &h.sync).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CartError);
    }
}
