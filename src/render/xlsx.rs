//! Minimal SpreadsheetML writer: one worksheet, inline strings, a bold
//! filled header row and fixed column widths.

use super::{Cell, Document, Section, Table};
use crate::error::AppError;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const HEADER_FILL_ARGB: &str = "FF4A90E2";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

/// Style 0 is the default; style 1 is the bold header on a solid fill.
fn styles_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>
<fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="{}"/><bgColor indexed="64"/></patternFill></fill></fills>
<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="2" borderId="0" xfId="0" applyFont="1" applyFill="1"/></cellXfs>
<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>"#,
        HEADER_FILL_ARGB
    )
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#,
        escape(&sheet_title(sheet_name))
    )
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`.
fn sheet_title(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

/// Flattens the document into a grid: the first table becomes the sheet body,
/// headings/paragraphs/key-values above it become single-cell rows.
fn sheet_xml(doc: &Document) -> String {
    let table: Option<&Table> = doc.sections.iter().find_map(|s| match s {
        Section::Table(t) => Some(t),
        _ => None,
    });

    let mut rows: Vec<String> = Vec::new();
    let mut r = 0usize;

    if table.is_none() {
        r += 1;
        rows.push(row_xml(r, &[Cell::text(doc.title.clone())], Some(1)));
        for section in &doc.sections {
            match section {
                Section::Heading(t) | Section::Paragraph(t) => {
                    r += 1;
                    rows.push(row_xml(r, &[Cell::text(t.clone())], None));
                }
                Section::KeyValues(pairs) => {
                    for (k, v) in pairs {
                        r += 1;
                        rows.push(row_xml(r, &[Cell::text(k.clone()), Cell::text(v.clone())], None));
                    }
                }
                Section::Table(_) => {}
            }
        }
    }

    let mut cols = String::new();
    if let Some(t) = table {
        r += 1;
        let header: Vec<Cell> = t.columns.iter().map(|c| Cell::text(c.header.clone())).collect();
        rows.push(row_xml(r, &header, Some(1)));
        for data in &t.rows {
            r += 1;
            rows.push(row_xml(r, data, None));
        }
        cols.push_str("<cols>");
        for (i, c) in t.columns.iter().enumerate() {
            cols.push_str(&format!(
                r#"<col min="{n}" max="{n}" width="{w}" customWidth="1"/>"#,
                n = i + 1,
                w = c.width.max(1)
            ));
        }
        cols.push_str("</cols>");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
{}<sheetData>{}</sheetData>
</worksheet>"#,
        cols,
        rows.join("")
    )
}

fn row_xml(r: usize, cells: &[Cell], style: Option<u8>) -> String {
    let s_attr = style.map(|s| format!(r#" s="{}""#, s)).unwrap_or_default();
    let mut out = format!(r#"<row r="{}">"#, r);
    for (i, cell) in cells.iter().enumerate() {
        let cref = format!("{}{}", column_letters(i), r);
        match cell {
            Cell::Number(n) if n.is_finite() => {
                out.push_str(&format!(r#"<c r="{}"{}><v>{}</v></c>"#, cref, s_attr, n));
            }
            other => {
                out.push_str(&format!(
                    r#"<c r="{}"{} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    cref,
                    s_attr,
                    escape(&other.display())
                ));
            }
        }
    }
    out.push_str("</row>");
    out
}

/// Zero-based column index to `A`, `B`, ..., `Z`, `AA`, ...
fn column_letters(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).to_string()
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab/newline are not valid XML 1.0.
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

pub fn render(doc: &Document) -> Result<Vec<u8>, AppError> {
    write_package(doc).map_err(|e| AppError::Render(format!("spreadsheet error: {e:#}")))
}

fn write_package(doc: &Document) -> anyhow::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, String); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", workbook_xml(&doc.sheet_name)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/styles.xml", styles_xml()),
        ("xl/worksheets/sheet1.xml", sheet_xml(doc)),
    ];
    for (name, body) in parts.iter() {
        zip.start_file(*name, opts)?;
        zip.write_all(body.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}
