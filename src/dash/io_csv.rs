// Primitives for reading CSV files.

use crate::dash::io_common::{field_to_raw, simplify_file_name, RawSheet};
use crate::dash::*;

/// Reads all the lines of a CSV file. The header is located later, like for the worksheets.
pub fn read_csv_sheet(path: &str) -> LoadResult<RawSheet> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut rows: Vec<Vec<RawValue>> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let lineno = idx + 1;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        rows.push(line.iter().map(field_to_raw).collect());
    }
    let name = simplify_file_name(path);
    info!("read_csv_sheet: {}: {} rows", name, rows.len());
    Ok(RawSheet {
        path: path.to_string(),
        name,
        rows,
    })
}
