//! # Wire Format
//!
//! JSON bodies exactly as the Ecopila API sends and accepts them: decimal
//! numbers, mixed snake_case/camelCase keys, nullable fields everywhere.
//! Nothing outside this module sees them; every DTO converts to or from
//! the integer-cents domain types at the boundary.
//!
//! ```text
//! ┌──────────────────────┐   From / into_domain   ┌──────────────────────┐
//! │  ProductoDto         │ ─────────────────────► │  Producto            │
//! │  precio_publico: f64 │                        │  precio_publico_cents│
//! │  proveedorId         │ ◄───────────────────── │  ProductPayload      │
//! └──────────────────────┘   ProductPayloadDto    └──────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use ecopila_core::{
    Dolar, ExchangeRate, Money, Percent, ProductDiscountPayload, ProductPayload,
    ProductRelationPayload, Producto, Proveedor, RelatedProduct, TaxRate, Venta, VentaItem,
    VentaPayload, DEFAULT_DOLAR_NAME,
};

fn cents(value: Option<f64>) -> i64 {
    Money::from_decimal(value.unwrap_or(0.0)).cents()
}

fn decimal(cents: i64) -> f64 {
    Money::from_cents(cents).to_decimal()
}

/// Accepts `2025-03-01`, `2025-03-01T10:00:00` and full RFC 3339.
fn parse_date(value: &str) -> Option<NaiveDate> {
    value
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

// =============================================================================
// Productos
// =============================================================================

/// A product as `/producto/productos` returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductoDto {
    pub id: i64,
    #[serde(default)]
    pub codigo_producto: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub cantidad: Option<f64>,
    /// Fraction (`0.21`).
    #[serde(default)]
    pub iva: Option<f64>,
    #[serde(default)]
    pub precio_publico: Option<f64>,
    #[serde(default)]
    pub resto: Option<f64>,
    #[serde(default)]
    pub precio_sin_redondear: Option<f64>,
    #[serde(default)]
    pub precio_publico_us: Option<f64>,
    /// Percentage (`30`).
    #[serde(default)]
    pub porcentaje_ganancia: Option<f64>,
    #[serde(default)]
    pub costo_dolares: Option<f64>,
    #[serde(default)]
    pub costo_pesos: Option<f64>,
    #[serde(default)]
    pub precio_sin_iva: Option<f64>,
    #[serde(default)]
    pub fecha_ingreso: Option<String>,
    #[serde(default, rename = "proveedorId")]
    pub proveedor_id: Option<i64>,
    #[serde(default, rename = "tipoProductoId")]
    pub tipo_producto_id: Option<i64>,
    #[serde(default, rename = "costoFijo")]
    pub costo_fijo: Option<bool>,
    #[serde(default, rename = "productosRelacionadosIds")]
    pub productos_relacionados_ids: Option<Vec<i64>>,
}

impl ProductoDto {
    pub fn into_domain(self, now: DateTime<Utc>) -> Producto {
        Producto {
            id: self.id,
            codigo_producto: self.codigo_producto.unwrap_or_default(),
            descripcion: self.descripcion.unwrap_or_default(),
            cantidad: self.cantidad.unwrap_or(0.0).round() as i64,
            iva_bps: TaxRate::from_fraction(self.iva.unwrap_or(0.0)).bps(),
            porcentaje_ganancia_bps: Percent::from_percentage(
                self.porcentaje_ganancia.unwrap_or(0.0),
            )
            .bps(),
            resto: self.resto.map(|r| r.trunc() as i64).filter(|r| *r > 0),
            costo_fijo: self.costo_fijo.unwrap_or(false),
            precio_sin_iva_cents: cents(self.precio_sin_iva),
            costo_dolares_cents: cents(self.costo_dolares),
            costo_pesos_cents: cents(self.costo_pesos),
            precio_publico_us_cents: cents(self.precio_publico_us),
            precio_sin_redondear_cents: cents(self.precio_sin_redondear),
            precio_publico_cents: cents(self.precio_publico),
            fecha_ingreso: self.fecha_ingreso.as_deref().and_then(parse_date),
            proveedor_id: self.proveedor_id,
            tipo_producto_id: self.tipo_producto_id,
            productos_relacionados_ids: self.productos_relacionados_ids.unwrap_or_default(),
            updated_at: now,
        }
    }
}

/// Body of create, update and each element of the bulk upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPayloadDto {
    pub codigo_producto: String,
    pub descripcion: String,
    pub cantidad: i64,
    #[serde(rename = "proveedorId")]
    pub proveedor_id: Option<i64>,
    #[serde(rename = "tipoProductoId")]
    pub tipo_producto_id: Option<i64>,
    pub porcentaje_ganancia: f64,
    pub iva: f64,
    pub resto: Option<i64>,
    #[serde(rename = "costoFijo")]
    pub costo_fijo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precio_sin_iva: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub costo_pesos: Option<f64>,
}

impl From<&ProductPayload> for ProductPayloadDto {
    fn from(p: &ProductPayload) -> Self {
        ProductPayloadDto {
            codigo_producto: p.codigo_producto.clone(),
            descripcion: p.descripcion.clone(),
            cantidad: p.cantidad,
            proveedor_id: p.proveedor_id,
            tipo_producto_id: p.tipo_producto_id,
            porcentaje_ganancia: p.margen().percentage(),
            iva: p.iva().fraction(),
            resto: p.resto,
            costo_fijo: p.costo_fijo,
            precio_sin_iva: p.precio_sin_iva_cents.map(decimal),
            costo_pesos: p.costo_pesos_cents.map(decimal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationDto {
    #[serde(rename = "productoId")]
    pub producto_id: i64,
    #[serde(rename = "productoRelacionadoId")]
    pub producto_relacionado_id: i64,
}

impl From<&ProductRelationPayload> for RelationDto {
    fn from(r: &ProductRelationPayload) -> Self {
        RelationDto {
            producto_id: r.producto_id,
            producto_relacionado_id: r.producto_relacionado_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedProductDto {
    pub id: i64,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub nombre_proveedor: Option<String>,
    #[serde(default)]
    pub precio_publico: Option<f64>,
    #[serde(default)]
    pub nombre_tipo_producto: Option<String>,
}

impl From<RelatedProductDto> for RelatedProduct {
    fn from(dto: RelatedProductDto) -> Self {
        RelatedProduct {
            id: dto.id,
            descripcion: dto.descripcion.unwrap_or_default(),
            nombre_proveedor: dto.nombre_proveedor,
            precio_publico_cents: cents(dto.precio_publico),
            nombre_tipo_producto: dto.nombre_tipo_producto,
        }
    }
}

// =============================================================================
// Proveedores
// =============================================================================

/// The server may omit `contacto`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProveedorDto {
    pub id: i64,
    pub nombre: String,
    #[serde(default)]
    pub contacto: Option<String>,
}

impl From<ProveedorDto> for Proveedor {
    fn from(dto: ProveedorDto) -> Self {
        Proveedor {
            id: dto.id,
            nombre: dto.nombre,
            contacto: dto.contacto.unwrap_or_default(),
        }
    }
}

// =============================================================================
// Ventas
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VentaPayloadDto {
    pub items: Vec<ProductDiscountPayload>,
    pub total: f64,
}

impl From<&VentaPayload> for VentaPayloadDto {
    fn from(v: &VentaPayload) -> Self {
        VentaPayloadDto {
            items: v.items.clone(),
            total: decimal(v.total_cents),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VentaItemDto {
    pub id: i64,
    pub producto_id: i64,
    #[serde(default)]
    pub producto_descripcion: Option<String>,
    pub cantidad: i64,
    #[serde(default)]
    pub precio_unitario: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VentaDto {
    pub id: i64,
    #[serde(default)]
    pub numero_comprobante: Option<String>,
    #[serde(default)]
    pub fecha_venta: Option<String>,
    #[serde(default)]
    pub total_venta: Option<f64>,
    #[serde(default)]
    pub items: Vec<VentaItemDto>,
}

impl VentaDto {
    pub fn into_domain(self, now: DateTime<Utc>) -> Venta {
        Venta {
            id: self.id,
            numero_comprobante: self.numero_comprobante.unwrap_or_default(),
            fecha_venta: self
                .fecha_venta
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(now),
            total_venta_cents: cents(self.total_venta),
            items: self
                .items
                .into_iter()
                .map(|i| VentaItem {
                    id: i.id,
                    producto_id: i.producto_id,
                    producto_descripcion: i.producto_descripcion.unwrap_or_default(),
                    cantidad: i.cantidad,
                    precio_unitario_cents: cents(i.precio_unitario),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Dólar
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DolarDto {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub precio: Option<f64>,
}

impl From<DolarDto> for Dolar {
    fn from(dto: DolarDto) -> Self {
        Dolar {
            id: dto.id,
            nombre: dto
                .nombre
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DOLAR_NAME.to_string()),
            precio_centavos: ExchangeRate::from_decimal(dto.precio.unwrap_or(0.0)).centavos(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub id_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub authorities: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_producto_from_server_json() {
        let dto: ProductoDto = serde_json::from_value(json!({
            "id": 12,
            "codigo_producto": "AA-4",
            "descripcion": "Pila AA x4",
            "cantidad": 3,
            "iva": 0.21,
            "precio_publico": 16520.0,
            "resto": 10,
            "precio_sin_redondear": 16516.5,
            "precio_publico_us": 15.73,
            "porcentaje_ganancia": 30,
            "costo_dolares": 12.1,
            "costo_pesos": 12705,
            "precio_sin_iva": 10,
            "fecha_ingreso": "2025-03-01T00:00:00",
            "proveedorId": 1,
            "tipoProductoId": null,
            "costoFijo": false,
            "productosRelacionadosIds": [3, 4]
        }))
        .unwrap();

        let p = dto.into_domain(Utc::now());
        assert_eq!(p.iva_bps, 2100);
        assert_eq!(p.porcentaje_ganancia_bps, 3000);
        assert_eq!(p.precio_publico_cents, 1_652_000);
        assert_eq!(p.precio_sin_redondear_cents, 1_651_650);
        assert_eq!(p.precio_publico_us_cents, 1573);
        assert_eq!(p.resto, Some(10));
        assert_eq!(p.fecha_ingreso, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(p.proveedor_id, Some(1));
        assert_eq!(p.tipo_producto_id, None);
        assert_eq!(p.productos_relacionados_ids, vec![3, 4]);
    }

    #[test]
    fn test_sparse_producto_defaults() {
        let dto: ProductoDto = serde_json::from_value(json!({ "id": 5, "resto": 0 })).unwrap();
        let p = dto.into_domain(Utc::now());
        assert_eq!(p.codigo_producto, "");
        assert_eq!(p.resto, None);
        assert!(!p.costo_fijo);
        assert!(p.productos_relacionados_ids.is_empty());
    }

    #[test]
    fn test_payload_uses_server_keys() {
        let payload = ProductPayload {
            codigo_producto: "AA-4".into(),
            descripcion: "Pila AA x4".into(),
            cantidad: 1,
            proveedor_id: Some(1),
            tipo_producto_id: Some(10),
            porcentaje_ganancia_bps: 3000,
            iva_bps: 2100,
            resto: Some(10),
            costo_fijo: false,
            precio_sin_iva_cents: Some(1000),
            costo_pesos_cents: None,
        };

        let value = serde_json::to_value(ProductPayloadDto::from(&payload)).unwrap();
        assert_eq!(value["proveedorId"], 1);
        assert_eq!(value["tipoProductoId"], 10);
        assert_eq!(value["costoFijo"], false);
        assert_eq!(value["porcentaje_ganancia"], 30.0);
        assert_eq!(value["iva"], 0.21);
        assert_eq!(value["precio_sin_iva"], 10.0);
        assert!(value.get("costo_pesos").is_none());
    }

    #[test]
    fn test_dolar_defaults_name() {
        let dolar: Dolar = serde_json::from_value::<DolarDto>(json!({ "id": 1, "precio": 1050.5 }))
            .unwrap()
            .into();
        assert_eq!(dolar.nombre, DEFAULT_DOLAR_NAME);
        assert_eq!(dolar.precio_centavos, 105_050);
    }

    #[test]
    fn test_venta_timestamps() {
        let venta = serde_json::from_value::<VentaDto>(json!({
            "id": 7,
            "numeroComprobante": "0001-00000007",
            "fechaVenta": "2025-03-01T10:15:00",
            "totalVenta": 3304.0,
            "items": [{ "id": 1, "productoId": 12, "cantidad": 2, "precioUnitario": 1652.0 }]
        }))
        .unwrap()
        .into_domain(Utc::now());

        assert_eq!(venta.total_venta_cents, 330_400);
        assert_eq!(venta.fecha_venta.to_rfc3339(), "2025-03-01T10:15:00+00:00");
        assert_eq!(venta.items[0].precio_unitario_cents, 165_200);
    }
}
