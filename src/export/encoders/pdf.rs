//! PDF encoder
//!
//! Renders rows as a plain text table in a PDF 1.4 document using the
//! standard Helvetica fonts. Rows are buffered and laid out when the
//! encoder finishes, since page breaks depend on the full row count.

use std::fmt::Write as _;

use chrono::Utc;
use tracing::debug;

use crate::config::PdfConfig;
use crate::error::{EncodeError, Result};
use crate::export::source::Row;

use super::{ColumnSet, RowEncoder, cell_text};

/// Line height relative to font size
const LINE_SPACING: f32 = 1.4;
/// Average Helvetica glyph width relative to font size
const GLYPH_WIDTH: f32 = 0.55;
/// Object ids of the fixed document objects
const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const FONT_ID: usize = 3;
const BOLD_FONT_ID: usize = 4;
const INFO_ID: usize = 5;
const FIRST_PAGE_ID: usize = 6;

/// Encoder for PDF format
pub struct PdfEncoder {
    config: PdfConfig,
    columns: ColumnSet,
    rows: Vec<Row>,
    pages_rendered: usize,
}

impl PdfEncoder {
    pub fn new(config: PdfConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EncodeError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            config,
            columns: ColumnSet::default(),
            rows: Vec::new(),
            pages_rendered: 0,
        })
    }

    /// Number of pages in the last rendered document
    pub fn page_count(&self) -> usize {
        self.pages_rendered
    }

    fn line_height(&self) -> f32 {
        self.config.font_size * LINE_SPACING
    }

    /// Data rows that fit on one page below the title and header
    fn rows_per_page(&self) -> usize {
        let (_, height) = self.config.page_dimensions();
        let usable = height - 2.0 * self.config.margin;
        let lines = (usable / self.line_height()).floor() as usize;
        let title_lines = usize::from(self.config.title.is_some());
        // header row, separator gap and footer
        lines.saturating_sub(title_lines + 3).max(1)
    }

    fn column_chars(&self) -> usize {
        let (width, _) = self.config.page_dimensions();
        let count = self.columns.names().len().max(1) as f32;
        let column_width = (width - 2.0 * self.config.margin) / count;
        let chars = (column_width / (self.config.font_size * GLYPH_WIDTH)).floor() as usize;
        chars.saturating_sub(1).max(1)
    }

    fn render_page(&self, rows: &[Row], page: usize, total: usize) -> String {
        let (width, height) = self.config.page_dimensions();
        let margin = self.config.margin;
        let size = self.config.font_size;
        let line = self.line_height();
        let names = self.columns.names();
        let column_width = (width - 2.0 * margin) / names.len().max(1) as f32;
        let max_chars = self.column_chars();

        let mut content = String::new();
        let mut y = height - margin - size;

        if let Some(title) = &self.config.title {
            text(&mut content, "F2", size + 2.0, margin, y, &fit(title, usize::MAX));
            y -= line;
        }

        if names.is_empty() {
            text(&mut content, "F1", size, margin, y, "(no rows)");
        } else {
            for (i, name) in names.iter().enumerate() {
                let x = margin + i as f32 * column_width;
                text(&mut content, "F2", size, x, y, &fit(name, max_chars));
            }
            let rule = y - line * 0.35;
            let _ = writeln!(
                content,
                "0.5 w {margin:.2} {rule:.2} m {:.2} {rule:.2} l S",
                width - margin
            );
            y -= line;

            for row in rows {
                for (i, name) in names.iter().enumerate() {
                    let x = margin + i as f32 * column_width;
                    let value = cell_text(row.get(name)).unwrap_or_default();
                    text(&mut content, "F1", size, x, y, &fit(&value, max_chars));
                }
                y -= line;
            }
        }

        let footer = format!("Page {page} of {total}");
        text(&mut content, "F1", size, margin, margin, &footer);
        content
    }

    fn render(&self) -> Vec<u8> {
        let per_page = self.rows_per_page();
        let chunks: Vec<&[Row]> = if self.rows.is_empty() {
            vec![&self.rows[..]]
        } else {
            self.rows.chunks(per_page).collect()
        };
        let total = chunks.len();
        let (width, height) = self.config.page_dimensions();

        let mut doc = PdfWriter::new(FIRST_PAGE_ID - 1 + 2 * total);
        doc.object(CATALOG_ID, &format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>"));

        let kids: Vec<String> = (0..total)
            .map(|i| format!("{} 0 R", FIRST_PAGE_ID + 2 * i))
            .collect();
        doc.object(
            PAGES_ID,
            &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), total),
        );
        doc.object(
            FONT_ID,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
        doc.object(
            BOLD_FONT_ID,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
        );

        let mut info = format!(
            "<< /Producer (rowexport {}) /CreationDate ({})",
            env!("CARGO_PKG_VERSION"),
            Utc::now().format("D:%Y%m%d%H%M%SZ")
        );
        if let Some(title) = &self.config.title {
            let _ = write!(info, " /Title ({})", escape_text(title));
        }
        info.push_str(" >>");
        doc.object(INFO_ID, &info);

        for (i, rows) in chunks.iter().enumerate() {
            let page_id = FIRST_PAGE_ID + 2 * i;
            let content_id = page_id + 1;
            doc.object(
                page_id,
                &format!(
                    "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {width} {height}] \
                     /Resources << /Font << /F1 {FONT_ID} 0 R /F2 {BOLD_FONT_ID} 0 R >> >> \
                     /Contents {content_id} 0 R >>"
                ),
            );
            doc.stream(content_id, &self.render_page(rows, i + 1, total));
        }

        doc.finish(CATALOG_ID, INFO_ID)
    }
}

impl RowEncoder for PdfEncoder {
    fn encode_batch(&mut self, rows: &[Row]) -> Result<Vec<u8>> {
        self.columns.observe(rows);
        self.rows.extend_from_slice(rows);
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        let bytes = self.render();
        self.pages_rendered = self.rows.len().div_ceil(self.rows_per_page()).max(1);
        debug!(
            "PDF encoder rendered {} rows on {} pages ({} bytes)",
            self.rows.len(),
            self.pages_rendered,
            bytes.len()
        );
        self.rows.clear();
        Ok(bytes)
    }
}

/// Byte-offset tracking writer for the PDF object/xref layout
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new(object_count: usize) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: vec![0; object_count],
        }
    }

    fn object(&mut self, id: usize, body: &str) {
        self.offsets[id - 1] = self.buf.len();
        self.buf
            .extend_from_slice(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    fn stream(&mut self, id: usize, content: &str) {
        self.object(
            id,
            &format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
        );
    }

    fn finish(mut self, root: usize, info: usize) -> Vec<u8> {
        let xref_offset = self.buf.len();
        let size = self.offsets.len() + 1;
        let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            let _ = writeln!(xref, "{offset:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {size} /Root {root} 0 R /Info {info} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        );
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

fn text(content: &mut String, font: &str, size: f32, x: f32, y: f32, value: &str) {
    let _ = writeln!(
        content,
        "BT /{font} {size:.1} Tf 1 0 0 1 {x:.2} {y:.2} Tm ({}) Tj ET",
        escape_text(value)
    );
}

/// Truncate to `max` characters, marking cut values with ".."
fn fit(value: &str, max: usize) -> String {
    let single_line: String = value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if single_line.chars().count() <= max {
        return single_line;
    }
    if max < 3 {
        return single_line.chars().take(max).collect();
    }
    let mut cut: String = single_line.chars().take(max - 2).collect();
    cut.push_str("..");
    cut
}

/// Escape a string for a PDF literal
///
/// Characters outside printable ASCII are written as octal escapes of their
/// WinAnsiEncoding code; anything that encoding lacks becomes '?'.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => match win_ansi_code(c) {
                Some(code) => {
                    let _ = write!(out, "\\{code:03o}");
                }
                None => out.push('?'),
            },
        }
    }
    out
}

/// WinAnsiEncoding code of a non-ASCII character
fn win_ansi_code(c: char) -> Option<u8> {
    let code = match c {
        '\u{a0}'..='\u{ff}' => return u8::try_from(u32::from(c)).ok(),
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        _ => return None,
    };
    Some(code)
}
