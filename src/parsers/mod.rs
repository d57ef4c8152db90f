pub mod columnar;
pub mod delimited;

use std::path::Path;

use crate::error::Result;

/// Cell values read as missing, whatever the source column.
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Source layout, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Parquet,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") || ext.eq_ignore_ascii_case("pq") => {
                SourceFormat::Parquet
            }
            _ => SourceFormat::Delimited,
        }
    }
}

/// Key/value pairs from the leading `# key = value` lines of a text source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    entries: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Insert or overwrite, keeping first-seen key order.
    pub fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source rows as text, columns named the way the vendor named them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Rows shorter than the header are padded with missing cells, longer ones truncated.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<Option<String>>>) -> Self {
        for row in &mut rows {
            row.resize(columns.len(), None);
        }
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact-name column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }
}

/// Everything read from one source file.
#[derive(Debug, Clone, Default)]
pub struct RawInput {
    /// `None` for columnar sources, which carry no header block.
    pub header: Option<HeaderBlock>,
    pub table: RawTable,
}

pub fn load(path: &Path) -> Result<RawInput> {
    match SourceFormat::from_path(path) {
        SourceFormat::Delimited => delimited::read(path),
        SourceFormat::Parquet => columnar::read(path),
    }
}

/// Text cell as loaded: NA tokens become missing.
pub(crate) fn cell_value(raw: &str) -> Option<String> {
    if NA_TOKENS.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Numeric coercion; anything unparseable (or NaN) is missing.
pub fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}
