//! # Export
//!
//! CSV export of the catalog and the model behind the PDF price lists.
//!
//! The CSV uses the same columns and rubro-header rows that
//! [`crate::import`] reads, so an exported file can be edited and imported
//! again. Rendering the PDF itself happens in the desktop app; this module
//! only decides what goes on the page.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::import::{COL_CODIGO, COL_DESCRIPCION, COL_GANANCIA, COL_IVA, COL_PRECIO, COL_RESTO};
use crate::types::{Producto, Proveedor, TipoProducto};

/// Header used for products that have no rubro.
pub const SIN_RUBRO: &str = "SIN RUBRO";

// =============================================================================
// CSV Export
// =============================================================================

/// Formats a scaled integer with up to `decimals` places, dropping
/// trailing zeros (`12100, 4` → `"1.21"`, `3000, 2` → `"30"`).
fn fmt_fixed(value: i64, decimals: u32) -> String {
    let scale = 10_i64.pow(decimals);
    let sign = if value < 0 { "-" } else { "" };
    let whole = value.abs() / scale;
    let frac = value.abs() % scale;
    if frac == 0 {
        return format!("{}{}", sign, whole);
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}{}.{}", sign, whole, frac.trim_end_matches('0'))
}

/// Writes the catalog as an importable CSV.
///
/// Products are grouped under a header row per rubro (alphabetical), and
/// sorted by code inside each group.
///
/// ## Example
/// ```rust,ignore
/// let csv = export_products_csv(&productos, &rubros)?;
/// std::fs::write("catalogo.csv", csv)?;
/// ```
pub fn export_products_csv(
    productos: &[Producto],
    rubros: &[TipoProducto],
) -> Result<String, csv::Error> {
    let names: BTreeMap<i64, &str> = rubros.iter().map(|t| (t.id, t.nombre.as_str())).collect();

    let mut groups: BTreeMap<String, Vec<&Producto>> = BTreeMap::new();
    for producto in productos {
        let rubro = producto
            .tipo_producto_id
            .and_then(|id| names.get(&id).copied())
            .unwrap_or(SIN_RUBRO);
        groups.entry(rubro.to_string()).or_default().push(producto);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        COL_CODIGO,
        COL_DESCRIPCION,
        COL_PRECIO,
        COL_GANANCIA,
        COL_IVA,
        COL_RESTO,
    ])?;

    for (rubro, mut items) in groups {
        writer.write_record(["", rubro.as_str(), "", "", "", ""])?;
        items.sort_by(|a, b| a.codigo_producto.cmp(&b.codigo_producto));

        for p in items {
            writer.write_record([
                p.codigo_producto.clone(),
                p.descripcion.clone(),
                fmt_fixed(p.precio_sin_iva_cents, 2),
                fmt_fixed(p.porcentaje_ganancia_bps as i64, 2),
                fmt_fixed(10_000 + p.iva_bps as i64, 4),
                p.resto.map(|r| r.to_string()).unwrap_or_default(),
            ])?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| {
        csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

// =============================================================================
// Price List
// =============================================================================

/// Table header of every price list.
pub const PRICE_LIST_COLUMNS: [&str; 3] = ["Código", "Descripción", "Precio Venta (ARS)"];

/// Fill colour of the table header (RGB).
pub const PRICE_LIST_HEADER_RGB: (u8, u8, u8) = (76, 175, 80);

/// One row of a price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct PriceListRow {
    pub codigo: String,
    pub descripcion: String,
    /// Formatted price (`$1.234,50`).
    pub precio: String,
}

impl From<&Producto> for PriceListRow {
    fn from(p: &Producto) -> Self {
        PriceListRow {
            codigo: p.codigo_producto.clone(),
            descripcion: p.descripcion.clone(),
            precio: p.precio_publico().format_ars(),
        }
    }
}

/// Everything printed on a price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct PriceList {
    pub title: String,
    /// `Generado el: dd/mm/yyyy`
    pub subtitle: String,
    pub file_name: String,
    pub rows: Vec<PriceListRow>,
}

impl PriceList {
    /// Price list of hand-picked products.
    ///
    /// ## Errors
    /// [`CoreError::NadaSeleccionado`] when `selected` is empty.
    pub fn custom<'a, I>(selected: I, generated_on: NaiveDate) -> CoreResult<Self>
    where
        I: IntoIterator<Item = &'a Producto>,
    {
        let rows: Vec<PriceListRow> = selected.into_iter().map(PriceListRow::from).collect();
        if rows.is_empty() {
            return Err(CoreError::NadaSeleccionado);
        }
        Ok(PriceList {
            title: "Lista de Precios Personalizada".to_string(),
            subtitle: generated_line(generated_on),
            file_name: "Lista_Personalizada.pdf".to_string(),
            rows,
        })
    }

    /// Price list of every product from one supplier.
    ///
    /// ## Errors
    /// [`CoreError::ProveedorSinProductos`] when the supplier has none.
    pub fn for_proveedor<'a, I>(
        proveedor: &Proveedor,
        productos: I,
        generated_on: NaiveDate,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = &'a Producto>,
    {
        let rows: Vec<PriceListRow> = productos.into_iter().map(PriceListRow::from).collect();
        if rows.is_empty() {
            return Err(CoreError::ProveedorSinProductos(proveedor.nombre.clone()));
        }
        Ok(PriceList {
            title: format!("Lista de Precios - {}", proveedor.nombre),
            subtitle: generated_line(generated_on),
            file_name: format!(
                "Lista_Precios_{}.pdf",
                proveedor.nombre.split_whitespace().collect::<Vec<_>>().join("_")
            ),
            rows,
        })
    }
}

fn generated_line(date: NaiveDate) -> String {
    format!("Generado el: {}", date.format("%d/%m/%Y"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::producto;
    use crate::import::plan_import;

    fn rubros() -> Vec<TipoProducto> {
        vec![
            TipoProducto {
                id: 10,
                nombre: "Pilas".into(),
            },
            TipoProducto {
                id: 20,
                nombre: "Cables".into(),
            },
        ]
    }

    #[test]
    fn test_fmt_fixed() {
        assert_eq!(fmt_fixed(1250, 2), "12.5");
        assert_eq!(fmt_fixed(3000, 2), "30");
        assert_eq!(fmt_fixed(12_100, 4), "1.21");
        assert_eq!(fmt_fixed(11_050, 4), "1.105");
        assert_eq!(fmt_fixed(5, 2), "0.05");
    }

    #[test]
    fn test_export_groups_under_rubro_headers() {
        let mut cable = producto(3, "CAB-1", "Cable USB");
        cable.tipo_producto_id = Some(20);
        cable.resto = Some(50);
        let mut suelto = producto(4, "S-1", "Suelto");
        suelto.tipo_producto_id = None;
        let productos = vec![producto(2, "B-2", "Pila B"), producto(1, "A-1", "Pila A"), cable, suelto];

        let csv = export_products_csv(&productos, &rubros()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "CODIGO,DESCRIPCION,US S/IVA,%GAN,IVA,RES");
        assert_eq!(lines[1], ",Cables,,,,");
        assert_eq!(lines[2], "CAB-1,Cable USB,1,30,1.21,50");
        assert_eq!(lines[3], ",Pilas,,,,");
        assert_eq!(lines[4], "A-1,Pila A,1,30,1.21,");
        assert_eq!(lines[5], "B-2,Pila B,1,30,1.21,");
        assert_eq!(lines[6], ",SIN RUBRO,,,,");
    }

    #[test]
    fn test_exported_file_imports_cleanly() {
        let productos = vec![producto(1, "A-1", "Pila A"), producto(2, "B-2", "Pila B")];
        let csv = export_products_csv(&productos, &rubros()).unwrap();

        let plan = plan_import(&csv, Some(1), &rubros()).unwrap();
        assert!(plan.missing_rubros.is_empty());
        let payloads = plan.resolve(&rubros()).into_upload().unwrap();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].precio_sin_iva_cents, Some(100));
        assert_eq!(payloads[0].iva_bps, 2100);
        assert_eq!(payloads[0].tipo_producto_id, Some(10));
    }

    #[test]
    fn test_custom_price_list() {
        let productos = vec![producto(1, "A-1", "Pila A")];
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let list = PriceList::custom(&productos, date).unwrap();
        assert_eq!(list.title, "Lista de Precios Personalizada");
        assert_eq!(list.subtitle, "Generado el: 09/03/2025");
        assert_eq!(list.file_name, "Lista_Personalizada.pdf");
        assert_eq!(list.rows[0].precio, "$1.649,00");

        let none: Vec<Producto> = Vec::new();
        assert!(matches!(
            PriceList::custom(&none, date),
            Err(CoreError::NadaSeleccionado)
        ));
    }

    #[test]
    fn test_proveedor_price_list() {
        let proveedor = Proveedor {
            id: 1,
            nombre: "Energía  Total SA".into(),
            contacto: "ventas@et.com".into(),
        };
        let productos = vec![producto(1, "A-1", "Pila A")];
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();

        let list = PriceList::for_proveedor(&proveedor, &productos, date).unwrap();
        assert_eq!(list.title, "Lista de Precios - Energía  Total SA");
        assert_eq!(list.file_name, "Lista_Precios_Energía_Total_SA.pdf");

        let none: Vec<Producto> = Vec::new();
        let err = PriceList::for_proveedor(&proveedor, &none, date).unwrap_err();
        assert_eq!(
            err.to_string(),
            "El proveedor Energía  Total SA no tiene productos para listar"
        );
    }
}
