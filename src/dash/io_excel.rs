// Primitives for reading Excel workbooks.

use calamine::{open_workbook, DataType, Range, Reader, Xlsx};

use crate::dash::io_common::{simplify_file_name, RawSheet};
use crate::dash::*;

pub fn cell_to_raw(cell: &DataType) -> RawValue {
    match cell {
        DataType::Int(i) => RawValue::Int(*i),
        DataType::Float(f) => RawValue::Float(*f),
        DataType::String(s) if s.trim().is_empty() => RawValue::Missing,
        DataType::String(s) => RawValue::Text(s.clone()),
        DataType::Bool(b) => RawValue::Text(b.to_string()),
        DataType::Empty => RawValue::Missing,
        _ => {
            debug!("cell_to_raw: treating cell {:?} as missing", cell);
            RawValue::Missing
        }
    }
}

fn to_sheet(path: &str, name: &str, range: &Range<DataType>) -> RawSheet {
    RawSheet {
        path: path.to_string(),
        name: name.to_string(),
        rows: range
            .rows()
            .map(|row| row.iter().map(cell_to_raw).collect())
            .collect(),
    }
}

fn open(path: &str) -> LoadResult<Xlsx<std::io::BufReader<std::fs::File>>> {
    open_workbook(path).context(OpeningExcelSnafu { path })
}

/// Reads one worksheet: the one with the given name, or the first one.
pub fn read_worksheet(path: &str, worksheet_name: Option<&str>) -> LoadResult<RawSheet> {
    let mut workbook = open(path)?;
    let (name, wrange) = match worksheet_name {
        Some(name) => {
            let wrange = workbook
                .worksheet_range(name)
                .context(MissingWorksheetSnafu { path, name })?
                .context(OpeningExcelSnafu { path })?;
            (name.to_string(), wrange)
        }
        None => {
            let name = workbook
                .sheet_names()
                .to_vec()
                .into_iter()
                .next()
                .context(EmptyExcelSnafu { path })?;
            let wrange = workbook
                .worksheet_range_at(0)
                .context(EmptyExcelSnafu { path })?
                .context(OpeningExcelSnafu { path })?;
            (name, wrange)
        }
    };
    let sheet = to_sheet(path, &name, &wrange);
    info!(
        "read_worksheet: {} [{}]: {} rows",
        simplify_file_name(path),
        name,
        sheet.rows.len()
    );
    Ok(sheet)
}

/// Reads every worksheet of the workbook, in order.
pub fn read_all_worksheets(path: &str) -> LoadResult<Vec<RawSheet>> {
    let mut workbook = open(path)?;
    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut res: Vec<RawSheet> = Vec::new();
    for name in names.iter() {
        let wrange = workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name })?
            .context(OpeningExcelSnafu { path })?;
        res.push(to_sheet(path, name, &wrange));
    }
    info!(
        "read_all_worksheets: {}: {} worksheets",
        simplify_file_name(path),
        res.len()
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_keep_their_type() {
        assert_eq!(cell_to_raw(&DataType::Int(5)), RawValue::Int(5));
        assert_eq!(cell_to_raw(&DataType::Float(5.0)), RawValue::Float(5.0));
        assert_eq!(
            cell_to_raw(&DataType::String("05".to_string())),
            RawValue::Text("05".to_string())
        );
        assert_eq!(
            cell_to_raw(&DataType::String("  ".to_string())),
            RawValue::Missing
        );
        assert_eq!(cell_to_raw(&DataType::Empty), RawValue::Missing);
    }

    #[test]
    fn missing_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nothing.xlsx").display().to_string();
        assert!(matches!(
            read_worksheet(&p, None),
            Err(LoadError::OpeningExcel { .. })
        ));
        assert!(read_all_worksheets(&p).is_err());
    }
}
