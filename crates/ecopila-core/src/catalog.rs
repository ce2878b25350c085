//! # Catalog Filtering
//!
//! Client-side search over the product list and the scan-to-cart rule.
//!
//! ```text
//!   search box ──► ProductFilter::matches ──► visible rows
//!        │
//!        └─ Enter ──► scan_lookup ──┬─ Single   → add to cart
//!                                   ├─ Pending  → "pendiente de sincronización"
//!                                   ├─ Multiple → "Múltiples productos coinciden"
//!                                   └─ NoMatch  → nothing
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Producto;

/// Search criteria for the product list. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductFilter {
    pub term: Option<String>,
    pub proveedor_id: Option<i64>,
    pub tipo_producto_id: Option<i64>,
}

impl ProductFilter {
    pub fn term(term: impl Into<String>) -> Self {
        ProductFilter {
            term: Some(term.into()),
            ..Default::default()
        }
    }

    /// The trimmed, lowercased search term, or `None` when blank.
    pub fn normalized_term(&self) -> Option<String> {
        self.term
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
    }

    /// True when the product passes every criterion.
    ///
    /// The term matches a substring of the description, the code, or the
    /// decimal id.
    pub fn matches(&self, producto: &Producto) -> bool {
        if let Some(proveedor_id) = self.proveedor_id {
            if producto.proveedor_id != Some(proveedor_id) {
                return false;
            }
        }
        if let Some(tipo_id) = self.tipo_producto_id {
            if producto.tipo_producto_id != Some(tipo_id) {
                return false;
            }
        }
        match self.normalized_term() {
            None => true,
            Some(term) => matches_term(producto, &term),
        }
    }
}

fn matches_term(producto: &Producto, term: &str) -> bool {
    producto.descripcion.to_lowercase().contains(term)
        || producto.codigo_producto.to_lowercase().contains(term)
        || producto.id.to_string().contains(term)
}

/// Returns the products that pass `filter`, preserving order.
pub fn filter_products<'a>(productos: &'a [Producto], filter: &ProductFilter) -> Vec<&'a Producto> {
    productos.iter().filter(|p| filter.matches(p)).collect()
}

/// Outcome of pressing Enter in the search box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome<'a> {
    NoMatch,
    /// Exactly one confirmed product: add it to the cart.
    Single(&'a Producto),
    /// Exactly one match, but it has not reached the server yet.
    Pending(&'a Producto),
    Multiple(usize),
}

/// Applies the scan rule: only a single confirmed match goes to the cart.
pub fn scan_lookup<'a>(productos: &'a [Producto], filter: &ProductFilter) -> ScanOutcome<'a> {
    let mut matches = productos.iter().filter(|p| filter.matches(p));
    match (matches.next(), matches.next()) {
        (None, _) => ScanOutcome::NoMatch,
        (Some(p), None) if p.is_pending() => ScanOutcome::Pending(p),
        (Some(p), None) => ScanOutcome::Single(p),
        (Some(_), Some(_)) => ScanOutcome::Multiple(2 + matches.count()),
    }
}

/// Groups products by supplier for per-supplier price lists. Products with
/// no supplier are left out.
pub fn group_by_proveedor(productos: &[Producto]) -> BTreeMap<i64, Vec<&Producto>> {
    let mut groups: BTreeMap<i64, Vec<&Producto>> = BTreeMap::new();
    for producto in productos {
        if let Some(proveedor_id) = producto.proveedor_id {
            groups.entry(proveedor_id).or_default().push(producto);
        }
    }
    groups
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn producto(id: i64, codigo: &str, descripcion: &str) -> Producto {
        Producto {
            id,
            codigo_producto: codigo.to_string(),
            descripcion: descripcion.to_string(),
            cantidad: 1,
            iva_bps: 2100,
            porcentaje_ganancia_bps: 3000,
            resto: None,
            costo_fijo: false,
            precio_sin_iva_cents: 100,
            costo_dolares_cents: 121,
            costo_pesos_cents: 127_050,
            precio_publico_us_cents: 157,
            precio_sin_redondear_cents: 164_850,
            precio_publico_cents: 164_900,
            fecha_ingreso: None,
            proveedor_id: Some(1),
            tipo_producto_id: Some(10),
            productos_relacionados_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    fn catalog() -> Vec<Producto> {
        let mut cables = producto(3, "CAB-USB", "Cable USB-C 1m");
        cables.proveedor_id = Some(2);
        cables.tipo_producto_id = Some(20);
        vec![
            producto(1, "AA-4", "Pila AA alcalina x4"),
            producto(2, "AAA-2", "Pila AAA x2"),
            cables,
            producto(1_700_000_000_000, "LINT-1", "Linterna LED"),
        ]
    }

    #[test]
    fn test_term_matches_description_code_and_id() {
        let productos = catalog();
        assert_eq!(filter_products(&productos, &ProductFilter::term("  PILA ")).len(), 2);
        assert_eq!(filter_products(&productos, &ProductFilter::term("cab-")).len(), 1);
        assert_eq!(filter_products(&productos, &ProductFilter::term("3")).len(), 1);
    }

    #[test]
    fn test_blank_filter_matches_all() {
        let productos = catalog();
        assert_eq!(filter_products(&productos, &ProductFilter::term("   ")).len(), 4);
        assert_eq!(filter_products(&productos, &ProductFilter::default()).len(), 4);
    }

    #[test]
    fn test_exact_supplier_and_category() {
        let productos = catalog();
        let filter = ProductFilter {
            term: None,
            proveedor_id: Some(2),
            tipo_producto_id: Some(20),
        };
        let found = filter_products(&productos, &filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].codigo_producto, "CAB-USB");

        let filter = ProductFilter {
            term: Some("pila".into()),
            proveedor_id: Some(2),
            tipo_producto_id: None,
        };
        assert!(filter_products(&productos, &filter).is_empty());
    }

    #[test]
    fn test_scan_lookup_outcomes() {
        let productos = catalog();
        assert!(matches!(
            scan_lookup(&productos, &ProductFilter::term("AA-4")),
            ScanOutcome::Single(p) if p.id == 1
        ));
        assert_eq!(
            scan_lookup(&productos, &ProductFilter::term("pila")),
            ScanOutcome::Multiple(2)
        );
        assert_eq!(
            scan_lookup(&productos, &ProductFilter::term("zzz")),
            ScanOutcome::NoMatch
        );
        assert!(matches!(
            scan_lookup(&productos, &ProductFilter::term("linterna")),
            ScanOutcome::Pending(_)
        ));
    }

    #[test]
    fn test_group_by_proveedor() {
        let mut productos = catalog();
        productos[1].proveedor_id = None;
        let groups = group_by_proveedor(&productos);
        assert_eq!(groups[&1].len(), 2);
        assert_eq!(groups[&2].len(), 1);
    }
}
