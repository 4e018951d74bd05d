// Primitives shared by the Excel and CSV readers.

use std::collections::HashMap;
use std::path::Path;

use crate::dash::*;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// The content of a worksheet or of a CSV file, before the header is located.
#[derive(PartialEq, Debug, Clone)]
pub struct RawSheet {
    pub path: String,
    pub name: String,
    pub rows: Vec<Vec<RawValue>>,
}

/// Header names are compared without case and with runs of whitespace collapsed.
/// The published files are not consistent about either.
fn header_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

fn cell_key(cell: &RawValue) -> Option<String> {
    match cell {
        RawValue::Text(s) => Some(header_key(s)),
        _ => None,
    }
}

/// A sheet with its header located.
#[derive(Debug)]
pub struct Located<'a> {
    sheet: &'a RawSheet,
    header_row: usize,
    columns: HashMap<String, usize>,
}

impl RawSheet {
    /// Finds the header: the first row that contains `key_column`. Some workbooks have
    /// title rows above it.
    pub fn locate(&self, key_column: &str) -> LoadResult<Located<'_>> {
        let key = header_key(key_column);
        for (idx, row) in self.rows.iter().enumerate() {
            if row.iter().any(|c| cell_key(c).as_deref() == Some(key.as_str())) {
                let mut columns: HashMap<String, usize> = HashMap::new();
                for (col, cell) in row.iter().enumerate() {
                    if let Some(k) = cell_key(cell) {
                        columns.entry(k).or_insert(col);
                    }
                }
                debug!(
                    "locate: {} [{}]: header at row {}: {:?}",
                    simplify_file_name(&self.path),
                    self.name,
                    idx + 1,
                    columns
                );
                return Ok(Located {
                    sheet: self,
                    header_row: idx,
                    columns,
                });
            }
        }
        MissingColumnSnafu {
            path: self.path.clone(),
            sheet: self.name.clone(),
            column: key_column,
        }
        .fail()
    }
}

impl<'a> Located<'a> {
    pub fn column(&self, name: &str) -> LoadResult<usize> {
        self.columns
            .get(&header_key(name))
            .cloned()
            .context(MissingColumnSnafu {
                path: self.sheet.path.clone(),
                sheet: self.sheet.name.clone(),
                column: name,
            })
    }

    pub fn optional_column(&self, name: &str) -> Option<usize> {
        self.columns.get(&header_key(name)).cloned()
    }

    /// The rows below the header, with blank rows skipped.
    pub fn data_rows(&self) -> impl Iterator<Item = &'a Vec<RawValue>> {
        let sheet: &'a RawSheet = self.sheet;
        sheet
            .rows
            .iter()
            .skip(self.header_row + 1)
            .filter(|row| row.iter().any(|c| *c != RawValue::Missing))
    }
}

/// The cell at `idx`, or Missing for short rows.
pub fn cell(row: &[RawValue], idx: usize) -> &RawValue {
    row.get(idx).unwrap_or(&RawValue::Missing)
}

/// Empty CSV fields are missing values, everything else is text.
pub fn field_to_raw(field: &str) -> RawValue {
    if field.trim().is_empty() {
        RawValue::Missing
    } else {
        RawValue::Text(field.to_string())
    }
}

/// Converts a JSON property, which may be a string or a number.
pub fn json_to_raw(js: Option<&JSValue>) -> RawValue {
    match js {
        Some(JSValue::String(s)) => field_to_raw(s),
        Some(JSValue::Number(n)) => match n.as_i64() {
            Some(i) => RawValue::Int(i),
            None => n.as_f64().map(RawValue::Float).unwrap_or(RawValue::Missing),
        },
        _ => RawValue::Missing,
    }
}
