use super::{Document, Section, Table};
use crate::error::AppError;
use printpdf::*;
use std::io::BufWriter;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN_X: f32 = 20.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const TABLE_WIDTH: f32 = PAGE_W - 2.0 * MARGIN_X;
/// Rough Helvetica advance at 9pt, used to fit cell text into its column.
const MM_PER_CHAR_9PT: f32 = 1.75;

/// Page cursor: writes top-down and starts a new page when it runs out of room.
struct Pager<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl<'a> Pager<'a> {
    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed >= BOTTOM {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_W),
            Mm(PAGE_H),
            format!("Layer {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP;
    }

    fn text(&mut self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn line(&mut self, text: &str, size: f32, bold: bool, advance: f32) {
        self.ensure_room(advance);
        self.text(text, size, MARGIN_X, bold);
        self.y -= advance;
    }

    fn centered(&mut self, text: &str, size: f32, bold: bool, advance: f32) {
        self.ensure_room(advance);
        // Helvetica averages about half an em per glyph.
        let width_mm = text.chars().count() as f32 * size * 0.5 * 0.3528;
        let x = ((PAGE_W - width_mm) / 2.0).max(MARGIN_X);
        self.text(text, size, x, bold);
        self.y -= advance;
    }

    fn table(&mut self, table: &Table) {
        let total_chars: f32 = table.columns.iter().map(|c| c.width.max(1) as f32).sum();
        let widths: Vec<f32> = table
            .columns
            .iter()
            .map(|c| TABLE_WIDTH * c.width.max(1) as f32 / total_chars.max(1.0))
            .collect();

        let header: Vec<String> = table.columns.iter().map(|c| c.header.clone()).collect();
        self.row(&header, &widths, true);
        self.rule();
        for row in &table.rows {
            let cells: Vec<String> = row.iter().map(|c| c.display()).collect();
            if self.y - 5.0 < BOTTOM {
                // Repeat the header on every continuation page.
                self.ensure_room(5.0);
                self.row(&header, &widths, true);
                self.rule();
            }
            self.row(&cells, &widths, false);
        }
        self.rule();
    }

    fn row(&mut self, cells: &[String], widths: &[f32], bold: bool) {
        self.ensure_room(5.0);
        let mut x = MARGIN_X;
        for (cell, w) in cells.iter().zip(widths) {
            let max_chars = ((w - 2.0) / MM_PER_CHAR_9PT).floor().max(1.0) as usize;
            let shown = truncate(cell, max_chars);
            self.text(&shown, 9.0, x, bold);
            x += w;
        }
        self.y -= 5.0;
    }

    fn rule(&mut self) {
        let dashes = (TABLE_WIDTH / 1.6) as usize;
        self.ensure_room(3.0);
        self.y += 1.5;
        self.text(&"-".repeat(dashes), 7.0, MARGIN_X, false);
        self.y -= 4.5;
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = s.chars().take(keep).collect();
    out.push('~');
    out
}

/// Word-wraps text for paragraph output.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

pub fn render(d: &Document) -> Result<Vec<u8>, AppError> {
    let (doc, page1, layer1) = PdfDocument::new(&d.title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| AppError::Render(format!("PDF font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| AppError::Render(format!("PDF font error: {e}")))?;

    {
        let mut p = Pager {
            doc: &doc,
            layer,
            font,
            bold,
            y: TOP,
            pages: 1,
        };

        p.centered(&d.title, 18.0, true, 10.0);
        if let Some(sub) = &d.subtitle {
            p.centered(sub, 10.0, false, 8.0);
        }
        p.y -= 4.0;

        for section in &d.sections {
            match section {
                Section::Heading(h) => {
                    p.y -= 2.0;
                    p.line(h, 13.0, true, 7.0);
                }
                Section::Paragraph(text) => {
                    for l in wrap_text(text, 90) {
                        p.line(&l, 11.0, false, 5.5);
                    }
                    p.y -= 2.0;
                }
                Section::KeyValues(pairs) => {
                    for (k, v) in pairs {
                        p.line(&format!("{}: {}", k, v), 11.0, false, 6.0);
                    }
                    p.y -= 3.0;
                }
                Section::Table(t) => p.table(t),
            }
        }

        if let Some(footer) = &d.footer {
            p.y -= 8.0;
            p.centered(footer, 9.0, false, 5.0);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| AppError::Render(format!("PDF save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| AppError::Render(format!("PDF buffer error: {e}")))
}
