//! # Price List PDF
//!
//! Renders a [`PriceList`] on A4 with the builtin Helvetica fonts.
//!
//! ## Page Layout (mm from the top-left corner)
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ (14,22)  Lista de Precios - Energizer  18pt  │
//! │ (14,29)  Generado el: 16/10/2026  11pt gray  │
//! │ (14,35) ┌──────────┬───────────────┬───────┐ │
//! │         │ Código   │ Descripción   │Precio │ │ ◄ green header, 9pt
//! │         ├──────────┼───────────────┼───────┤ │
//! │         │ AA-4     │ Pila AA x4    │ $...  │ │
//! │         │ ...      │               │       │ │
//! │         └──────────┴───────────────┴───────┘ │
//! └──────────────────────────────────────────────┘
//! ```
//! Rows that do not fit continue on a new page, header repeated.

use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, Greyscale, IndirectFontRef, Mm, PdfDocument, PdfLayerReference, Point,
    Polygon, Rgb,
};
use thiserror::Error;

use ecopila_core::export::{PRICE_LIST_COLUMNS, PRICE_LIST_HEADER_RGB};
use ecopila_core::PriceList;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_X: f32 = 14.0;
const MARGIN_BOTTOM: f32 = 15.0;

const TITLE_Y: f32 = 22.0;
const SUBTITLE_Y: f32 = 29.0;
const TABLE_Y: f32 = 35.0;
const ROW_HEIGHT: f32 = 7.0;

const TITLE_SIZE: f32 = 18.0;
const SUBTITLE_SIZE: f32 = 11.0;
const TABLE_SIZE: f32 = 9.0;

/// Left edge of each column.
const COLUMN_X: [f32; 3] = [MARGIN_X, 50.0, 160.0];

/// Characters of description that fit between the description and price
/// columns at 9pt.
const DESCRIPCION_MAX_CHARS: usize = 60;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF rendering failed: {0}")]
    Render(#[from] printpdf::Error),
}

pub type PdfResult<T> = Result<T, PdfError>;

/// Rows that fit on the first page, below the title block.
fn rows_on_first_page() -> usize {
    rows_below(TABLE_Y)
}

/// Rows that fit on the following pages, which start at the top margin.
fn rows_on_next_pages() -> usize {
    rows_below(MARGIN_X)
}

/// Data rows that fit under a header drawn at `top`.
fn rows_below(top: f32) -> usize {
    let usable = PAGE_HEIGHT - MARGIN_BOTTOM - top - ROW_HEIGHT;
    (usable / ROW_HEIGHT).floor() as usize
}

/// Splits `total` rows into per-page ranges. An empty list still gets one
/// page for the header.
fn paginate(total: usize) -> Vec<std::ops::Range<usize>> {
    let mut pages = Vec::new();
    let mut start = 0;
    let mut capacity = rows_on_first_page();
    loop {
        let end = (start + capacity).min(total);
        pages.push(start..end);
        if end >= total {
            return pages;
        }
        start = end;
        capacity = rows_on_next_pages();
    }
}

/// PDF y coordinate of a distance from the top edge.
fn from_top(y: f32) -> Mm {
    Mm(PAGE_HEIGHT - y)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Renders `list` and returns the file contents.
pub fn render_price_list(list: &PriceList) -> PdfResult<Vec<u8>> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(list.title.as_str(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Lista");
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
    };

    for (index, range) in paginate(list.rows.len()).into_iter().enumerate() {
        let (layer, top) = if index == 0 {
            let layer = doc.get_page(first_page).get_layer(first_layer);
            draw_title(&layer, &fonts, list);
            (layer, TABLE_Y)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Lista");
            (doc.get_page(page).get_layer(layer), MARGIN_X)
        };

        draw_header(&layer, &fonts, top);
        layer.set_fill_color(Color::Greyscale(Greyscale::new(0.0, None)));
        for (offset, row) in list.rows[range].iter().enumerate() {
            let baseline = top + ROW_HEIGHT * (offset as f32 + 2.0) - 2.0;
            let cells = [
                row.codigo.clone(),
                truncate(&row.descripcion, DESCRIPCION_MAX_CHARS),
                row.precio.clone(),
            ];
            for (x, text) in COLUMN_X.iter().zip(cells) {
                layer.use_text(text, TABLE_SIZE, Mm(*x + 1.5), from_top(baseline), &fonts.regular);
            }
        }
    }

    Ok(doc.save_to_bytes()?)
}

fn draw_title(layer: &PdfLayerReference, fonts: &Fonts, list: &PriceList) {
    layer.set_fill_color(Color::Greyscale(Greyscale::new(0.0, None)));
    layer.use_text(&list.title, TITLE_SIZE, Mm(MARGIN_X), from_top(TITLE_Y), &fonts.bold);

    layer.set_fill_color(Color::Greyscale(Greyscale::new(0.4, None)));
    layer.use_text(
        &list.subtitle,
        SUBTITLE_SIZE,
        Mm(MARGIN_X),
        from_top(SUBTITLE_Y),
        &fonts.regular,
    );
}

fn draw_header(layer: &PdfLayerReference, fonts: &Fonts, top: f32) {
    let (r, g, b) = PRICE_LIST_HEADER_RGB;
    layer.set_fill_color(Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    )));

    let left = Mm(MARGIN_X);
    let right = Mm(PAGE_WIDTH - MARGIN_X);
    let upper = from_top(top);
    let lower = from_top(top + ROW_HEIGHT);
    layer.add_polygon(Polygon {
        rings: vec![vec![
            (Point::new(left, lower), false),
            (Point::new(right, lower), false),
            (Point::new(right, upper), false),
            (Point::new(left, upper), false),
        ]],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });

    layer.set_fill_color(Color::Greyscale(Greyscale::new(1.0, None)));
    let baseline = from_top(top + ROW_HEIGHT - 2.0);
    for (x, title) in COLUMN_X.iter().zip(PRICE_LIST_COLUMNS) {
        layer.use_text(title, TABLE_SIZE, Mm(*x + 1.5), baseline, &fonts.bold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecopila_core::PriceListRow;

    fn list(rows: usize) -> PriceList {
        PriceList {
            title: "Lista de Precios - Energizer".to_string(),
            subtitle: "Generado el: 16/10/2026".to_string(),
            file_name: "Lista_Precios_Energizer.pdf".to_string(),
            rows: (0..rows)
                .map(|i| PriceListRow {
                    codigo: format!("AA-{i}"),
                    descripcion: "Pila alcalina".to_string(),
                    precio: "$1.234,50".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_paginate() {
        assert_eq!(paginate(0), vec![0..0]);
        assert_eq!(paginate(3), vec![0..3]);

        let first = rows_on_first_page();
        let next = rows_on_next_pages();
        assert!(next > first);

        let pages = paginate(first + next + 1);
        assert_eq!(pages, vec![0..first, first..first + next, first + next..first + next + 1]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Pila", 10), "Pila");
        assert_eq!(truncate("Cargador de pilas", 10), "Cargado...");
    }

    #[test]
    fn test_render_produces_pdf() {
        let bytes = render_price_list(&list(120)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
