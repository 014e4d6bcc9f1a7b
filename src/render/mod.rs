//! Declarative documents and their two encodings.
//!
//! Report builders describe *what* goes on the page (headings, key/value
//! blocks, tables); `render` turns that into bytes as a paginated PDF or a
//! styled spreadsheet.

mod pdf;
mod xlsx;

use crate::error::AppError;
use std::str::FromStr;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Pdf,
    Excel,
}

impl FromStr for Format {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Format::Pdf),
            "excel" | "xlsx" => Ok(Format::Excel),
            other => Err(AppError::invalid(format!(
                "format must be one of: pdf, excel (got {})",
                other
            ))),
        }
    }
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Excel => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Pdf => PDF_CONTENT_TYPE,
            Format::Excel => XLSX_CONTENT_TYPE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub header: String,
    /// Width in characters; the spreadsheet uses it as-is, the PDF scales it.
    pub width: u16,
}

impl Column {
    pub fn new(header: &str, width: u16) -> Self {
        Column {
            header: header.to_string(),
            width,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Heading(String),
    Paragraph(String),
    KeyValues(Vec<(String, String)>),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub title: String,
    pub subtitle: Option<String>,
    /// Worksheet name when rendered as a spreadsheet.
    pub sheet_name: String,
    pub sections: Vec<Section>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub content_type: &'static str,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Renders `doc` in `format`; the suggested filename is `<base_name>.<ext>`.
pub fn render(doc: &Document, format: Format, base_name: &str) -> Result<Rendered, AppError> {
    let bytes = match format {
        Format::Pdf => pdf::render(doc)?,
        Format::Excel => xlsx::render(doc)?,
    };
    Ok(Rendered {
        content_type: format.content_type(),
        filename: format!("{}.{}", base_name, format.extension()),
        bytes,
    })
}

/// Whole numbers print without a fraction, everything else with two places.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{:.2}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn sample_doc(rows: usize) -> Document {
        Document {
            title: "Students Report".into(),
            subtitle: Some("Generated on: 2026-10-19".into()),
            sheet_name: "Students".into(),
            sections: vec![
                Section::KeyValues(vec![("Course".into(), "BSc".into())]),
                Section::Table(Table {
                    columns: vec![Column::new("Name", 20), Column::new("Amount", 10)],
                    rows: (0..rows)
                        .map(|i| vec![Cell::text(format!("Student {}", i)), Cell::Number(i as f64)])
                        .collect(),
                }),
            ],
            footer: None,
        }
    }

    #[test]
    fn format_parsing_defaults_and_aliases() {
        assert_eq!(Format::default(), Format::Pdf);
        assert_eq!("PDF".parse::<Format>().expect("pdf"), Format::Pdf);
        assert_eq!("excel".parse::<Format>().expect("excel"), Format::Excel);
        assert_eq!("xlsx".parse::<Format>().expect("xlsx"), Format::Excel);
        assert_eq!("csv".parse::<Format>().expect_err("csv").code(), "invalid_input");
    }

    #[test]
    fn rendered_carries_type_and_filename() {
        let r = render(&sample_doc(2), Format::Excel, "students_report").expect("render");
        assert_eq!(r.filename, "students_report.xlsx");
        assert_eq!(r.content_type, XLSX_CONTENT_TYPE);
        let r = render(&sample_doc(2), Format::Pdf, "students_report").expect("render");
        assert_eq!(r.filename, "students_report.pdf");
        assert!(r.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn number_display() {
        assert_eq!(format_number(5000.0), "5000");
        assert_eq!(format_number(1200.5), "1200.50");
    }
}
