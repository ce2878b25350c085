//! # CSV Bulk Import
//!
//! Turns a supplier's CSV price list into product payloads.
//!
//! ## File Layout
//! ```text
//! CODIGO ,DESCRIPCION         ,US S/IVA ,%GAN ,IVA   ,RES
//!        ,PILAS               ,         ,     ,      ,        ◄ rubro header
//! AA-4   ,Pila AA alcalina x4 ,$2.10    ,35   ,1.21  ,10      ◄ product
//! AAA-2  ,Pila AAA x2         ,1.05     ,     ,      ,        ◄ defaults
//!        ,CARGADORES          ,         ,     ,      ,        ◄ next rubro
//! CH-USB ,Cargador USB        ,4.80     ,40   ,1.105 ,50
//! ```
//!
//! ## Two Phases
//! ```text
//! ┌──────────────┐   plan_import    ┌──────────────┐  create missing   ┌─────────┐
//! │  CSV text    │ ───────────────► │  ImportPlan  │ ──── rubros ────► │ resolve │
//! │  + proveedor │  parse rows,     │  rows        │  (caller does     │ → Vec<  │
//! │  + rubros    │  find missing    │  missing     │   the I/O)        │ Payload>│
//! └──────────────┘  rubros          └──────────────┘                   └─────────┘
//! ```
//!
//! Rows with neither code nor description are skipped. Line numbers count
//! the header as line 1.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use ts_rs::TS;

use crate::error::{ImportError, LineError};
use crate::money::parse_fixed;
use crate::types::{Percent, ProductPayload, TaxRate, TipoProducto};
use crate::validation::validate_product_payload;

pub const COL_CODIGO: &str = "CODIGO";
pub const COL_DESCRIPCION: &str = "DESCRIPCION";
pub const COL_PRECIO: &str = "US S/IVA";
pub const COL_GANANCIA: &str = "%GAN";
pub const COL_IVA: &str = "IVA";
pub const COL_RESTO: &str = "RES";

/// IVA multiplier used when the column is blank (1 + 21%).
const DEFAULT_IVA_MULTIPLIER_BPS: i64 = 12_100;

/// Stock assigned to every imported product.
const IMPORTED_CANTIDAD: i64 = 1;

// =============================================================================
// Parsed Rows
// =============================================================================

/// A product row, before its rubro is mapped to an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub line: usize,
    pub codigo: String,
    pub descripcion: String,
    /// Name of the last rubro header above this row (may be empty).
    pub rubro: String,
    pub precio_sin_iva_cents: i64,
    pub porcentaje_ganancia_bps: u32,
    pub iva_bps: u32,
    pub resto: Option<i64>,
}

/// Result of the first phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPlan {
    pub proveedor_id: i64,
    /// Rubro names in file order, de-duplicated case-insensitively.
    pub rubros_en_archivo: Vec<String>,
    /// Rubros that must be created before resolving.
    pub missing_rubros: Vec<String>,
    pub rows: Vec<ImportRow>,
}

/// Summary shown before the user confirms the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct ImportPreview {
    pub productos: usize,
    pub rubros_nuevos: Vec<String>,
    pub errores: Vec<String>,
}

/// Result of the second phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResolution {
    pub products: Vec<ProductPayload>,
    pub errors: Vec<LineError>,
}

impl ImportResolution {
    /// Refuses the upload when any row failed or nothing was parsed.
    pub fn into_upload(self) -> Result<Vec<ProductPayload>, ImportError> {
        if !self.errors.is_empty() {
            return Err(ImportError::InvalidRows(self.errors));
        }
        if self.products.is_empty() {
            return Err(ImportError::Empty);
        }
        Ok(self.products)
    }
}

// =============================================================================
// Phase 1: Plan
// =============================================================================

struct Columns {
    codigo: usize,
    descripcion: usize,
    precio: Option<usize>,
    ganancia: Option<usize>,
    iva: Option<usize>,
    resto: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        Ok(Columns {
            codigo: find(COL_CODIGO).ok_or(ImportError::MissingColumn(COL_CODIGO))?,
            descripcion: find(COL_DESCRIPCION)
                .ok_or(ImportError::MissingColumn(COL_DESCRIPCION))?,
            precio: find(COL_PRECIO),
            ganancia: find(COL_GANANCIA),
            iva: find(COL_IVA),
            resto: find(COL_RESTO),
        })
    }
}

fn field<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> &'r str {
    idx.and_then(|i| record.get(i)).unwrap_or("").trim()
}

/// Parses the file and works out which rubros are missing.
///
/// ## Arguments
/// * `csv_text` - The file contents
/// * `proveedor_id` - Supplier selected in the dialog (required)
/// * `existing` - Rubros already known, compared case-insensitively
///
/// ## Errors
/// [`ImportError::ProveedorRequired`] without a supplier; CSV syntax and
/// missing-column errors for unreadable files. Row-level problems are
/// reported later by [`ImportPlan::resolve`].
pub fn plan_import(
    csv_text: &str,
    proveedor_id: Option<i64>,
    existing: &[TipoProducto],
) -> Result<ImportPlan, ImportError> {
    let proveedor_id = proveedor_id.ok_or(ImportError::ProveedorRequired)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut rows = Vec::new();
    let mut rubros_en_archivo: Vec<String> = Vec::new();
    let mut seen_rubros = HashSet::new();
    let mut current_rubro = String::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let line = index + 2;
        let codigo = field(&record, Some(columns.codigo));
        let descripcion = field(&record, Some(columns.descripcion));

        if codigo.is_empty() {
            if !descripcion.is_empty() {
                current_rubro = descripcion.to_string();
                if seen_rubros.insert(descripcion.to_lowercase()) {
                    rubros_en_archivo.push(descripcion.to_string());
                }
            }
            continue;
        }

        rows.push(ImportRow {
            line,
            codigo: codigo.to_string(),
            descripcion: descripcion.to_string(),
            rubro: current_rubro.clone(),
            precio_sin_iva_cents: parse_fixed(field(&record, columns.precio), 2).unwrap_or(0),
            porcentaje_ganancia_bps: parse_ganancia(field(&record, columns.ganancia)).bps(),
            iva_bps: parse_iva(field(&record, columns.iva)).bps(),
            resto: parse_resto(field(&record, columns.resto)),
        });
    }

    let known: HashSet<String> = existing.iter().map(|t| t.nombre.to_lowercase()).collect();
    let missing_rubros = rubros_en_archivo
        .iter()
        .filter(|name| !known.contains(&name.to_lowercase()))
        .cloned()
        .collect();

    Ok(ImportPlan {
        proveedor_id,
        rubros_en_archivo,
        missing_rubros,
        rows,
    })
}

/// `%GAN`: a percentage; blank, zero or unreadable means 30%. Values too
/// large for a margin are kept out of range so validation rejects them.
fn parse_ganancia(raw: &str) -> Percent {
    match parse_fixed(raw, 2) {
        Some(bps) if bps > 0 => Percent::from_bps(u32::try_from(bps).unwrap_or(u32::MAX)),
        _ => Percent::DEFAULT_MARGIN,
    }
}

/// `IVA`: a multiplier such as `1.21`; blank or below 1 means 1.21.
fn parse_iva(raw: &str) -> TaxRate {
    let multiplier = match parse_fixed(raw, 4) {
        Some(m) if m >= 10_000 => m,
        _ => DEFAULT_IVA_MULTIPLIER_BPS,
    };
    TaxRate::from_bps(u32::try_from(multiplier - 10_000).unwrap_or(u32::MAX))
}

/// `RES`: leading integer part; blank, unreadable or zero means none.
/// Digits that overflow saturate, leaving the range check to validation.
fn parse_resto(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    Some(digits.parse::<i64>().unwrap_or(i64::MAX)).filter(|r| *r > 0)
}

// =============================================================================
// Phase 2: Resolve
// =============================================================================

impl ImportPlan {
    /// Maps every row's rubro to an id and builds the payloads.
    ///
    /// `rubros` should include the ones created for
    /// [`ImportPlan::missing_rubros`].
    pub fn resolve(&self, rubros: &[TipoProducto]) -> ImportResolution {
        let by_name: HashMap<String, i64> = rubros
            .iter()
            .map(|t| (t.nombre.trim().to_lowercase(), t.id))
            .collect();

        let mut products = Vec::with_capacity(self.rows.len());
        let mut errors = Vec::new();

        for row in &self.rows {
            let Some(&tipo_producto_id) = by_name.get(&row.rubro.to_lowercase()) else {
                errors.push(LineError {
                    line: row.line,
                    message: format!("Error inesperado al buscar el rubro \"{}\".", row.rubro),
                });
                continue;
            };

            if row.codigo.is_empty() || row.descripcion.is_empty() {
                errors.push(LineError {
                    line: row.line,
                    message: "Faltan código o descripción.".to_string(),
                });
                continue;
            }

            let payload = ProductPayload {
                codigo_producto: row.codigo.clone(),
                descripcion: row.descripcion.clone(),
                cantidad: IMPORTED_CANTIDAD,
                proveedor_id: Some(self.proveedor_id),
                tipo_producto_id: Some(tipo_producto_id),
                porcentaje_ganancia_bps: row.porcentaje_ganancia_bps,
                iva_bps: row.iva_bps,
                resto: row.resto,
                costo_fijo: false,
                precio_sin_iva_cents: Some(row.precio_sin_iva_cents),
                costo_pesos_cents: None,
            };
            match validate_product_payload(payload) {
                Ok(payload) => products.push(payload),
                Err(e) => errors.push(LineError {
                    line: row.line,
                    message: e.to_string(),
                }),
            }
        }

        ImportResolution { products, errors }
    }

    /// Checks the file as if the missing rubros already existed.
    pub fn preview(&self, existing: &[TipoProducto]) -> ImportPreview {
        let mut rubros: Vec<TipoProducto> = existing.to_vec();
        rubros.extend(self.missing_rubros.iter().enumerate().map(|(i, nombre)| {
            TipoProducto {
                id: -(i as i64) - 1,
                nombre: nombre.clone(),
            }
        }));

        let resolution = self.resolve(&rubros);
        ImportPreview {
            productos: resolution.products.len(),
            rubros_nuevos: self.missing_rubros.clone(),
            errores: resolution.errors.iter().map(ToString::to_string).collect(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
