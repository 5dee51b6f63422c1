//! A minimal worksheet model for import and export.
//!
//! Cells are addressed 1-based as `(row, column)`. A worksheet is read from an
//! Excel workbook (`.xlsx`, `.xls`, `.ods`), CSV text or JSON
//! (`{"name": "...", "rows": [["Exercise", "FitnessCategory"], ...]}`), and is
//! written back out as `.xlsx` or CSV.

use crate::core::format::{format_currency, format_grouped};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Cursor;
use thiserror::Error;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpreadsheetError {
    #[error("Unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("Upload is not valid UTF-8 text")]
    NotUtf8,

    #[error("Invalid JSON worksheet: {0}")]
    Json(String),

    #[error("Unreadable workbook: {0}")]
    Workbook(String),

    #[error("Workbook has no worksheets")]
    NoWorksheet,

    #[error("Could not write workbook: {0}")]
    Write(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberFormat {
    #[default]
    General,
    /// `###,##0`
    Grouped,
    /// `###,##0.00`
    Decimal,
    /// `$###,##0.00`
    Currency,
}

impl NumberFormat {
    pub fn render(&self, value: f64) -> String {
        match self {
            Self::General => value.to_string(),
            Self::Grouped => format_grouped(value, 0),
            Self::Decimal => format_grouped(value, 2),
            Self::Currency => format_currency(value),
        }
    }

    /// Excel number format code; `None` leaves the cell on General.
    pub fn pattern(&self) -> Option<&'static str> {
        match self {
            Self::General => None,
            Self::Grouped => Some("###,##0"),
            Self::Decimal => Some("###,##0.00"),
            Self::Currency => Some("$###,##0.00"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64, NumberFormat),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn number(value: f64, format: NumberFormat) -> Self {
        Self::Number(value, format)
    }

    /// The cell as displayed, formats applied.
    pub fn display(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(text) => text.clone(),
            Self::Number(value, format) => format.render(*value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Worksheet {
    name: String,
    rows: Vec<Vec<Cell>>,
    bold_rows: BTreeSet<usize>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            bold_rows: BTreeSet::new(),
        }
    }

    /// Renders `row` in bold when written as a workbook.
    pub fn set_bold_row(&mut self, row: usize) {
        self.bold_rows.insert(row);
    }

    pub fn is_bold_row(&self, row: usize) -> bool {
        self.bold_rows.contains(&row)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows up to and including the last non-empty one.
    pub fn row_count(&self) -> usize {
        self.rows
            .iter()
            .rposition(|row| row.iter().any(|cell| *cell != Cell::Empty))
            .map_or(0, |last| last + 1)
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn set(&mut self, row: usize, column: usize, cell: Cell) {
        if row == 0 || column == 0 {
            return;
        }
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::new);
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < column {
            cells.resize_with(column, Cell::default);
        }
        cells[column - 1] = cell;
    }

    pub fn push_row(&mut self, cells: Vec<Cell>) {
        self.rows.push(cells);
    }

    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        const EMPTY: &Cell = &Cell::Empty;
        if row == 0 || column == 0 {
            return EMPTY;
        }
        self.rows
            .get(row - 1)
            .and_then(|cells| cells.get(column - 1))
            .unwrap_or(EMPTY)
    }

    /// Displayed text of a cell; empty for cells that were never set.
    pub fn text(&self, row: usize, column: usize) -> String {
        self.cell(row, column).display()
    }

    pub fn from_csv(input: &str) -> Result<Self, SpreadsheetError> {
        let mut sheet = Self::new("Sheet1");
        for record in parse_csv(input)? {
            sheet.push_row(record.into_iter().map(text_cell).collect());
        }
        Ok(sheet)
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, SpreadsheetError> {
        let text = std::str::from_utf8(bytes).map_err(|_| SpreadsheetError::NotUtf8)?;
        Self::from_csv(text.trim_start_matches('\u{feff}'))
    }

    pub fn to_csv(&self) -> String {
        let columns = self.column_count();
        let mut out = String::new();
        for row in 1..=self.row_count() {
            let line: Vec<String> = (1..=columns)
                .map(|column| quote_csv(&self.text(row, column)))
                .collect();
            out.push_str(&line.join(","));
            out.push_str("\r\n");
        }
        out
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, SpreadsheetError> {
        let raw: JsonWorksheet =
            serde_json::from_slice(bytes).map_err(|e| SpreadsheetError::Json(e.to_string()))?;
        let mut sheet = Self::new(raw.name.unwrap_or_else(|| "Sheet1".to_string()));
        for row in raw.rows {
            sheet.push_row(row.into_iter().map(json_cell).collect());
        }
        Ok(sheet)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let columns = self.column_count();
        let rows: Vec<Vec<String>> = (1..=self.row_count())
            .map(|row| (1..=columns).map(|column| self.text(row, column)).collect())
            .collect();
        serde_json::json!({ "name": self.name, "rows": rows })
    }

    /// Whether `bytes` open like a workbook container (zip for `.xlsx`/`.ods`,
    /// OLE compound file for `.xls`) rather than plain text.
    pub fn looks_like_workbook(bytes: &[u8]) -> bool {
        const ZIP: &[u8] = b"PK\x03\x04";
        const OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        bytes.starts_with(ZIP) || bytes.starts_with(OLE)
    }

    /// First worksheet of a workbook. Cells keep their absolute position, so
    /// A1 is `(1, 1)` even when the used range starts further in.
    pub fn from_workbook(bytes: &[u8]) -> Result<Self, SpreadsheetError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| SpreadsheetError::Workbook(e.to_string()))?;
        let name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(SpreadsheetError::NoWorksheet)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(SpreadsheetError::NoWorksheet)?
            .map_err(|e| SpreadsheetError::Workbook(e.to_string()))?;

        let mut sheet = Self::new(name);
        let Some((first_row, first_column)) = range.start() else {
            return Ok(sheet);
        };
        for (offset, cells) in range.rows().enumerate() {
            let row = first_row as usize + offset + 1;
            for (index, data) in cells.iter().enumerate() {
                let cell = workbook_cell(data);
                if cell != Cell::Empty {
                    sheet.set(row, first_column as usize + index + 1, cell);
                }
            }
        }
        Ok(sheet)
    }

    /// Writes a single-sheet `.xlsx` workbook, number formats and bold rows applied.
    pub fn to_xlsx(&self) -> Result<Vec<u8>, SpreadsheetError> {
        let mut workbook = Workbook::new();
        let target = workbook.add_worksheet();
        target.set_name(self.name.as_str()).map_err(write_error)?;

        for (row_index, cells) in self.rows.iter().enumerate() {
            let bold = self.is_bold_row(row_index + 1);
            let row = u32::try_from(row_index).map_err(write_error)?;
            for (column_index, cell) in cells.iter().enumerate() {
                let column = u16::try_from(column_index).map_err(write_error)?;
                let mut format = Format::new();
                if bold {
                    format = format.set_bold();
                }
                match cell {
                    Cell::Empty => {}
                    Cell::Text(text) => {
                        target
                            .write_string_with_format(row, column, text.as_str(), &format)
                            .map_err(write_error)?;
                    }
                    Cell::Number(value, number_format) => {
                        if let Some(pattern) = number_format.pattern() {
                            format = format.set_num_format(pattern);
                        }
                        target
                            .write_number_with_format(row, column, *value, &format)
                            .map_err(write_error)?;
                    }
                }
            }
        }
        target.autofit();

        workbook.save_to_buffer().map_err(write_error)
    }
}

fn write_error(err: impl std::fmt::Display) -> SpreadsheetError {
    SpreadsheetError::Write(err.to_string())
}

fn workbook_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(text) => text_cell(text.clone()),
        Data::Float(value) => Cell::Number(*value, NumberFormat::General),
        Data::Int(value) => Cell::Number(*value as f64, NumberFormat::General),
        other => text_cell(other.to_string()),
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct JsonWorksheet {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

fn text_cell(value: String) -> Cell {
    if value.is_empty() {
        Cell::Empty
    } else {
        Cell::Text(value)
    }
}

fn json_cell(value: serde_json::Value) -> Cell {
    match value {
        serde_json::Value::Null => Cell::Empty,
        serde_json::Value::String(text) => text_cell(text),
        serde_json::Value::Number(number) => match number.as_f64() {
            Some(value) => Cell::Number(value, NumberFormat::General),
            None => Cell::Text(number.to_string()),
        },
        other => Cell::Text(other.to_string()),
    }
}

fn quote_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// RFC 4180 records: quoted fields may contain separators, doubled quotes and
/// line breaks. Blank lines are kept as empty records so row numbers match the file.
fn parse_csv(input: &str) -> Result<Vec<Vec<String>>, SpreadsheetError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(SpreadsheetError::UnterminatedQuote { line: quote_line });
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
