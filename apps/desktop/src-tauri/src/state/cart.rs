//! # Cart State
//!
//! The sales cart. Lines are unique per product; adding a product that is
//! already in the cart increases its quantity.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart State Operations                                │
//! │                                                                         │
//! │  Frontend Action          Command                 Cart State Change     │
//! │  ───────────────          ───────                 ─────────────────     │
//! │                                                                         │
//! │  Scan / Enter ───────────► scan_producto() ─────► add_item(p, 1)       │
//! │                                                                         │
//! │  Click Product ──────────► add_to_cart() ───────► add_item(p, n)       │
//! │                                                                         │
//! │  Change Quantity ────────► update_cart_quantity() ► items[i].qty = n   │
//! │                                                                         │
//! │  Click Remove ───────────► remove_from_cart() ──► items.remove(i)      │
//! │                                                                         │
//! │  Confirm Sale ───────────► checkout() ──────────► to_venta(), clear()  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is shown next to each line but not enforced: the shop sells what
//! is on the counter even when the replica disagrees.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecopila_core::{
    validation::validate_quantity, CoreError, CoreResult, Money, ProductDiscountPayload, Producto,
    VentaPayload, MAX_CART_ITEMS, MAX_ITEM_QUANTITY,
};

/// An item in the cart.
///
/// Description and price are frozen when the line is created, so a
/// repricing after a dólar change does not move a sale in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub producto_id: i64,
    pub codigo_producto: String,
    pub descripcion: String,

    /// Public price in ARS cents at time of adding
    pub precio_unitario_cents: i64,

    pub cantidad: i64,

    /// Stock in the replica at time of adding
    pub stock: i64,

    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn from_producto(producto: &Producto, cantidad: i64) -> Self {
        CartItem {
            producto_id: producto.id,
            codigo_producto: producto.codigo_producto.clone(),
            descripcion: producto.descripcion.clone(),
            precio_unitario_cents: producto.precio_publico_cents,
            cantidad,
            stock: producto.cantidad,
            added_at: Utc::now(),
        }
    }

    pub fn line_total_cents(&self) -> i64 {
        Money::from_cents(self.precio_unitario_cents)
            .multiply_quantity(self.cantidad)
            .cents()
    }

    /// More units in the cart than the replica says are in stock.
    pub fn exceeds_stock(&self) -> bool {
        self.cantidad > self.stock
    }
}

/// The cart.
///
/// ## Invariants
/// - Items are unique by `producto_id`
/// - Quantity is within 1..=999 (setting 0 removes the line)
/// - At most 100 lines
/// - Products whose create is still queued cannot be added
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,

    /// When the cart was created/last cleared
    pub created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a product, or increases the quantity of its line.
    pub fn add_item(&mut self, producto: &Producto, cantidad: i64) -> CoreResult<()> {
        if producto.is_pending() {
            return Err(CoreError::ProductoPending(producto.id));
        }
        validate_quantity(cantidad).map_err(|_| too_large(cantidad))?;

        if let Some(item) = self.items.iter_mut().find(|i| i.producto_id == producto.id) {
            let total = item.cantidad + cantidad;
            if total > MAX_ITEM_QUANTITY {
                return Err(too_large(total));
            }
            item.cantidad = total;
            return Ok(());
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        self.items.push(CartItem::from_producto(producto, cantidad));
        Ok(())
    }

    /// Sets the quantity of a line; 0 removes it.
    pub fn update_quantity(&mut self, producto_id: i64, cantidad: i64) -> CoreResult<()> {
        if cantidad == 0 {
            return self.remove_item(producto_id);
        }
        validate_quantity(cantidad)?;

        let item = self
            .items
            .iter_mut()
            .find(|i| i.producto_id == producto_id)
            .ok_or(CoreError::ProductoNotFound(producto_id))?;
        item.cantidad = cantidad;
        Ok(())
    }

    pub fn remove_item(&mut self, producto_id: i64) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|i| i.producto_id != producto_id);

        if self.items.len() == initial_len {
            Err(CoreError::ProductoNotFound(producto_id))
        } else {
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.created_at = Utc::now();
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.cantidad).sum()
    }

    /// Total in ARS cents. Public prices already include IVA.
    pub fn total_cents(&self) -> i64 {
        self.items.iter().map(CartItem::line_total_cents).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// What checkout sends to `/venta/ventas`.
    pub fn to_venta(&self) -> CoreResult<VentaPayload> {
        if self.is_empty() {
            return Err(CoreError::EmptyCart);
        }
        Ok(VentaPayload {
            items: self
                .items
                .iter()
                .map(|i| ProductDiscountPayload {
                    id: i.producto_id,
                    cantidad: i.cantidad,
                })
                .collect(),
            total_cents: self.total_cents(),
        })
    }
}

fn too_large(requested: i64) -> CoreError {
    CoreError::QuantityTooLarge {
        requested,
        max: MAX_ITEM_QUANTITY,
    }
}

/// Cart totals summary for command responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub total_cents: i64,
    /// `$1.234,50`
    pub total_formatted: String,
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals {
            item_count: cart.item_count(),
            total_quantity: cart.total_quantity(),
            total_cents: cart.total_cents(),
            total_formatted: Money::from_cents(cart.total_cents()).format_ars(),
        }
    }
}

/// Managed cart state.
///
/// Uses `Arc<Mutex<Cart>>`: cart operations are short and almost all of
/// them write, so a RwLock buys nothing.
#[derive(Debug, Default)]
pub struct CartState {
    cart: Arc<Mutex<Cart>>,
}

impl CartState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes a function with read access to the cart.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let totals = cart_state.with_cart(|cart| CartTotals::from(cart));
    /// ```
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Cart) -> R,
    {
        // a panic mid-update leaves the cart readable; keep serving it
        let cart = self.cart.lock().unwrap_or_else(|e| e.into_inner());
        f(&cart)
    }

    /// Executes a function with write access to the cart.
    pub fn with_cart_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Cart) -> R,
    {
        let mut cart = self.cart.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::producto;

    #[test]
    fn test_cart_add_item() {
        let mut cart = Cart::new();
        let p = producto(1, "AA-4");

        cart.add_item(&p, 2).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.total_cents(), p.precio_publico_cents * 2);
    }

    #[test]
    fn test_cart_add_same_product_increases_quantity() {
        let mut cart = Cart::new();
        let p = producto(1, "AA-4");

        cart.add_item(&p, 2).unwrap();
        cart.add_item(&p, 3).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_quantity_limits() {
        let mut cart = Cart::new();
        let p = producto(1, "AA-4");

        assert!(matches!(
            cart.add_item(&p, 0),
            Err(CoreError::QuantityTooLarge { .. })
        ));
        cart.add_item(&p, 998).unwrap();
        assert!(matches!(
            cart.add_item(&p, 2),
            Err(CoreError::QuantityTooLarge { requested: 1000, .. })
        ));
        assert!(cart.update_quantity(1, 1000).is_err());
        assert_eq!(cart.total_quantity(), 998);
    }

    #[test]
    fn test_cart_line_limit() {
        let mut cart = Cart::new();
        for id in 1..=MAX_CART_ITEMS as i64 {
            cart.add_item(&producto(id, &format!("P-{}", id)), 1).unwrap();
        }
        let extra = producto(500, "P-500");
        assert!(matches!(
            cart.add_item(&extra, 1),
            Err(CoreError::CartTooLarge { max: 100 })
        ));
    }

    #[test]
    fn test_pending_product_is_refused() {
        let mut cart = Cart::new();
        let p = producto(1_700_000_000_000, "NEW-1");
        assert!(matches!(cart.add_item(&p, 1), Err(CoreError::ProductoPending(_))));
    }

    #[test]
    fn test_stock_is_not_enforced() {
        let mut cart = Cart::new();
        let mut p = producto(1, "AA-4");
        p.cantidad = 1;

        cart.add_item(&p, 5).unwrap();
        assert!(cart.items[0].exceeds_stock());
    }

    #[test]
    fn test_update_to_zero_removes() {
        let mut cart = Cart::new();
        cart.add_item(&producto(1, "AA-4"), 2).unwrap();
        cart.update_quantity(1, 0).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(cart.remove_item(1), Err(CoreError::ProductoNotFound(1))));
    }

    #[test]
    fn test_to_venta() {
        let mut cart = Cart::new();
        assert!(matches!(cart.to_venta(), Err(CoreError::EmptyCart)));

        let a = producto(1, "AA-4");
        let b = producto(2, "AAA-2");
        cart.add_item(&a, 2).unwrap();
        cart.add_item(&b, 1).unwrap();

        let venta = cart.to_venta().unwrap();
        assert_eq!(venta.items.len(), 2);
        assert_eq!(venta.items[0], ProductDiscountPayload { id: 1, cantidad: 2 });
        assert_eq!(
            venta.total_cents,
            a.precio_publico_cents * 2 + b.precio_publico_cents
        );
    }
}
