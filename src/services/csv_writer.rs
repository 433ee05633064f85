//! Type-aware delimited writer for the export artifact.
//!
//! Fields are separated by ';' and quoted with '"'. Header cells and text
//! cells are quoted only when required (embedded delimiter, quote or line
//! break, leading whitespace, or the literal "\."). Numeric and boolean
//! columns are never quoted, whatever their content. Embedded quotes are
//! doubled.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

pub const DELIMITER: char = ';';
pub const QUOTE: char = '"';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Int,
    Float,
    Decimal,
    Bool,
}

impl ColumnType {
    /// Numeric and boolean columns bypass quoting entirely.
    pub fn skips_quoting(&self) -> bool {
        matches!(
            self,
            ColumnType::Int | ColumnType::Float | ColumnType::Decimal | ColumnType::Bool
        )
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// One export cell. `None` marks a value that never resolved; it renders
/// as the column type's zero value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(Option<i64>),
    Float(Option<f64>),
    Decimal(Option<Decimal>),
    Bool(Option<bool>),
}

impl Cell {
    pub fn date(value: Option<DateTime<Utc>>) -> Self {
        Cell::Text(
            value
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
        )
    }

    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Int(v) => v.unwrap_or(0).to_string(),
            Cell::Float(v) => format!("{}", v.unwrap_or(0.0)),
            Cell::Decimal(v) => v.unwrap_or_default().to_string(),
            Cell::Bool(v) => v.unwrap_or(false).to_string(),
        }
    }
}

fn needs_quotes(field: &str) -> bool {
    if field.is_empty() {
        return false;
    }
    if field == "\\." {
        return true;
    }
    if field.contains(DELIMITER)
        || field.contains(QUOTE)
        || field.contains('\r')
        || field.contains('\n')
    {
        return true;
    }
    field.chars().next().is_some_and(|c| c.is_whitespace())
}

pub struct CsvWriter<W: Write> {
    w: W,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    fn write_field(&mut self, field: &str, quote: bool) -> io::Result<()> {
        if !quote {
            return self.w.write_all(field.as_bytes());
        }
        let escaped = field.replace(QUOTE, "\"\"");
        write!(self.w, "{}{}{}", QUOTE, escaped, QUOTE)
    }

    fn write_record(&mut self, fields: &[(String, bool)]) -> io::Result<()> {
        for (n, (field, quote)) in fields.iter().enumerate() {
            if n > 0 {
                write!(self.w, "{}", DELIMITER)?;
            }
            self.write_field(field, *quote)?;
        }
        writeln!(self.w)
    }

    /// Header row: every cell follows the generic quoting rule.
    pub fn write_header(&mut self, columns: &[Column]) -> io::Result<()> {
        let fields: Vec<(String, bool)> = columns
            .iter()
            .map(|c| (c.name.clone(), needs_quotes(&c.name)))
            .collect();
        self.write_record(&fields)
    }

    /// Data row: numeric/bool columns are written bare, the rest follow
    /// the generic rule.
    pub fn write_row(&mut self, columns: &[Column], cells: &[Cell]) -> io::Result<()> {
        let fields: Vec<(String, bool)> = columns
            .iter()
            .enumerate()
            .map(|(n, column)| {
                let rendered = cells.get(n).map(Cell::render).unwrap_or_default();
                let quote = !column.column_type.skips_quoting() && needs_quotes(&rendered);
                (rendered, quote)
            })
            .collect();
        self.write_record(&fields)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

/// Write a whole table (header + rows) to a file, creating parent
/// directories as needed.
pub fn write_table(
    path: &Path,
    columns: &[Column],
    rows: &[Vec<Cell>],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = CsvWriter::new(BufWriter::new(file));
    writer.write_header(columns)?;
    for row in rows {
        writer.write_row(columns, row)?;
    }
    writer.flush()?;
    Ok(())
}
