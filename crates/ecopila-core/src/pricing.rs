//! # Pricing Engine
//!
//! Derives every price field of a [`Producto`] from its dollar cost, IVA,
//! margin and the current dollar rate.
//!
//! ## Price Derivation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  costo_fijo = false (dollar-linked, the common case)                    │
//! │                                                                         │
//! │   precio_sin_iva ──×(1+iva)──► costo_dolares ──×(1+margen)──►           │
//! │        (USD)                       (USD)                                │
//! │                                      │                precio_publico_us │
//! │                                      │ ×dólar               │ ×dólar    │
//! │                                      ▼                      ▼           │
//! │                                 costo_pesos       precio_sin_redondear  │
//! │                                                             │ resto ↑   │
//! │                                                             ▼           │
//! │                                                      precio_publico     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  costo_fijo = true (peso cost is authoritative)                         │
//! │                                                                         │
//! │   costo_pesos ──×(1+margen)──► precio_sin_redondear ──resto↑──► público │
//! │        │                                                                │
//! │        └──÷dólar──► costo_dolares ──÷(1+iva)──► precio_sin_iva          │
//! │                          └──×(1+margen)──► precio_publico_us            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A fixed-cost product keeps its public price when the dollar moves; only
//! its dollar projections change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::PricingError;
use crate::money::{ExchangeRate, Money};
use crate::types::{Percent, ProductPayload, Producto, TaxRate};

/// Result type for pricing operations.
pub type PricingResult<T> = Result<T, PricingError>;

// =============================================================================
// Input / Output
// =============================================================================

/// The editable fields that drive a product's prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingInput {
    pub precio_sin_iva: Money,
    pub iva: TaxRate,
    pub margen: Percent,
    pub resto: Option<i64>,
    pub costo_fijo: bool,
    pub costo_pesos: Option<Money>,
}

impl From<&ProductPayload> for PricingInput {
    fn from(payload: &ProductPayload) -> Self {
        PricingInput {
            precio_sin_iva: Money::from_cents(payload.precio_sin_iva_cents.unwrap_or(0)),
            iva: payload.iva(),
            margen: payload.margen(),
            resto: payload.resto,
            costo_fijo: payload.costo_fijo,
            costo_pesos: payload.costo_pesos_cents.map(Money::from_cents),
        }
    }
}

impl From<&Producto> for PricingInput {
    fn from(producto: &Producto) -> Self {
        PricingInput {
            precio_sin_iva: producto.precio_sin_iva(),
            iva: producto.iva(),
            margen: producto.margen(),
            resto: producto.resto,
            costo_fijo: producto.costo_fijo,
            costo_pesos: Some(producto.costo_pesos()),
        }
    }
}

/// Every derived price of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PriceBreakdown {
    pub precio_sin_iva: Money,
    pub costo_dolares: Money,
    pub costo_pesos: Money,
    pub precio_publico_us: Money,
    pub precio_sin_redondear: Money,
    pub precio_publico: Money,
}

// =============================================================================
// Calculation
// =============================================================================

/// Derives all price fields.
///
/// ## Arguments
/// * `input` - Cost, IVA, margin, resto and the fixed-cost flag
/// * `dolar` - Pesos per dollar
///
/// ## Returns
/// The full breakdown, or [`PricingError::InvalidRate`] when the rate is
/// zero or negative.
///
/// ## Example
/// ```rust
/// use ecopila_core::money::{ExchangeRate, Money};
/// use ecopila_core::pricing::{calculate, PricingInput};
/// use ecopila_core::types::{Percent, TaxRate};
///
/// let input = PricingInput {
///     precio_sin_iva: Money::from_cents(1000),   // US$ 10,00
///     iva: TaxRate::GENERAL,                     // 21%
///     margen: Percent::DEFAULT_MARGIN,           // 30%
///     resto: Some(10),
///     costo_fijo: false,
///     costo_pesos: None,
/// };
/// let p = calculate(&input, ExchangeRate::from_centavos(105_000)).unwrap();
/// assert_eq!(p.precio_publico_us.cents(), 1573);       // US$ 15,73
/// assert_eq!(p.precio_sin_redondear.cents(), 1_651_650); // $16.516,50
/// assert_eq!(p.precio_publico.cents(), 1_652_000);     // $16.520,00
/// ```
pub fn calculate(input: &PricingInput, dolar: ExchangeRate) -> PricingResult<PriceBreakdown> {
    if !dolar.is_valid() {
        return Err(PricingError::InvalidRate {
            centavos: dolar.centavos(),
        });
    }

    let breakdown = if input.costo_fijo {
        let costo_pesos = input.costo_pesos.ok_or(PricingError::MissingFixedCost)?;
        if costo_pesos.is_negative() {
            return Err(PricingError::NegativeCost {
                cents: costo_pesos.cents(),
            });
        }

        let costo_dolares = dolar.to_dollars(costo_pesos);
        let precio_sin_redondear = costo_pesos.with_margin(input.margen);

        PriceBreakdown {
            precio_sin_iva: costo_dolares.without_tax(input.iva),
            costo_dolares,
            costo_pesos,
            precio_publico_us: costo_dolares.with_margin(input.margen),
            precio_sin_redondear,
            precio_publico: round_resto(precio_sin_redondear, input.resto),
        }
    } else {
        if input.precio_sin_iva.is_negative() {
            return Err(PricingError::NegativeCost {
                cents: input.precio_sin_iva.cents(),
            });
        }

        let costo_dolares = input.precio_sin_iva.with_tax(input.iva);
        let precio_publico_us = costo_dolares.with_margin(input.margen);
        let precio_sin_redondear = dolar.to_pesos(precio_publico_us);

        PriceBreakdown {
            precio_sin_iva: input.precio_sin_iva,
            costo_dolares,
            costo_pesos: dolar.to_pesos(costo_dolares),
            precio_publico_us,
            precio_sin_redondear,
            precio_publico: round_resto(precio_sin_redondear, input.resto),
        }
    };

    Ok(breakdown)
}

/// Rounds a peso price up to the product's resto increment.
///
/// Without a resto (or with a non-positive one) the price is rounded up to
/// the next whole peso.
#[inline]
pub fn round_resto(price: Money, resto: Option<i64>) -> Money {
    price.round_up_to(resto.unwrap_or(0))
}

// =============================================================================
// Applying to Products
// =============================================================================

impl Producto {
    /// Overwrites the derived price fields with `prices`.
    pub fn apply_prices(&mut self, prices: &PriceBreakdown) {
        self.precio_sin_iva_cents = prices.precio_sin_iva.cents();
        self.costo_dolares_cents = prices.costo_dolares.cents();
        self.costo_pesos_cents = prices.costo_pesos.cents();
        self.precio_publico_us_cents = prices.precio_publico_us.cents();
        self.precio_sin_redondear_cents = prices.precio_sin_redondear.cents();
        self.precio_publico_cents = prices.precio_publico.cents();
    }

    /// Copies the editable fields of `payload` onto this product and
    /// re-derives its prices.
    pub fn apply_payload(
        &mut self,
        payload: &ProductPayload,
        dolar: ExchangeRate,
        now: DateTime<Utc>,
    ) -> PricingResult<()> {
        let prices = calculate(&PricingInput::from(payload), dolar)?;

        self.codigo_producto = payload.codigo_producto.clone();
        self.descripcion = payload.descripcion.clone();
        self.cantidad = payload.cantidad;
        self.proveedor_id = payload.proveedor_id;
        self.tipo_producto_id = payload.tipo_producto_id;
        self.porcentaje_ganancia_bps = payload.porcentaje_ganancia_bps;
        self.iva_bps = payload.iva_bps;
        self.resto = payload.resto;
        self.costo_fijo = payload.costo_fijo;
        self.apply_prices(&prices);
        self.updated_at = now;
        Ok(())
    }
}

/// Builds a full product from a payload, as the optimistic create does
/// before the server answers.
pub fn build_producto(
    id: i64,
    payload: &ProductPayload,
    dolar: ExchangeRate,
    now: DateTime<Utc>,
) -> PricingResult<Producto> {
    let mut producto = Producto {
        id,
        codigo_producto: String::new(),
        descripcion: String::new(),
        cantidad: 0,
        iva_bps: 0,
        porcentaje_ganancia_bps: 0,
        resto: None,
        costo_fijo: false,
        precio_sin_iva_cents: 0,
        costo_dolares_cents: 0,
        costo_pesos_cents: 0,
        precio_publico_us_cents: 0,
        precio_sin_redondear_cents: 0,
        precio_publico_cents: 0,
        fecha_ingreso: Some(now.date_naive()),
        proveedor_id: None,
        tipo_producto_id: None,
        productos_relacionados_ids: Vec::new(),
        updated_at: now,
    };
    producto.apply_payload(payload, dolar, now)?;
    Ok(producto)
}

/// What [`reprice_all`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repriced {
    /// Products whose public price moved.
    pub changed: usize,
    /// Products left as they were because their stored fields cannot be
    /// priced (a negative cost, a fixed cost without pesos).
    pub skipped: Vec<i64>,
}

/// Re-derives prices for every product after a dollar update.
///
/// One unpriceable product does not hold back the rest; it keeps its old
/// prices and is listed in [`Repriced::skipped`]. Only an invalid rate
/// fails the whole call.
pub fn reprice_all(productos: &mut [Producto], dolar: ExchangeRate) -> PricingResult<Repriced> {
    if !dolar.is_valid() {
        return Err(PricingError::InvalidRate {
            centavos: dolar.centavos(),
        });
    }

    let mut repriced = Repriced::default();
    for producto in productos.iter_mut() {
        match calculate(&PricingInput::from(&*producto), dolar) {
            Ok(prices) => {
                if prices.precio_publico.cents() != producto.precio_publico_cents {
                    repriced.changed += 1;
                }
                producto.apply_prices(&prices);
            }
            Err(_) => repriced.skipped.push(producto.id),
        }
    }
    Ok(repriced)
}

// =============================================================================
// Unit Tests
// =============================================================================
