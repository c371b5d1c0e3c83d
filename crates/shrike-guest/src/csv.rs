use std::path::Path;

use crate::{BudgetTracker, Error};

/// A parsed CSV resource: column-oriented string cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    /// One string vector per header, row-aligned.
    pub columns: Vec<Vec<String>>,
    pub row_count: i64,
}

/// Check a guest-supplied resource path before resolving it.
///
/// Absolute paths, any `..` segment, and backslashes are rejected so the
/// resolved path cannot escape the assets directory.
pub fn validate_resource(resource: &str) -> Result<(), Error> {
    if resource.starts_with('/') {
        return Err(Error::PathTraversal {
            resource: resource.to_owned(),
            reason: "absolute paths are not allowed",
        });
    }
    if resource.contains('\\') {
        return Err(Error::PathTraversal {
            resource: resource.to_owned(),
            reason: "backslashes are not allowed",
        });
    }
    if resource.split('/').any(|segment| segment == "..") {
        return Err(Error::PathTraversal {
            resource: resource.to_owned(),
            reason: "'..' segments are not allowed",
        });
    }
    Ok(())
}

/// Read and parse a CSV file, charging every byte and row against the IO
/// budget before it is accepted.
///
/// Format: header row, comma separation, whitespace-trimmed cells, no
/// quoted-field handling. Short rows are padded with empty strings.
pub fn read_csv(path: &Path, budget: &mut BudgetTracker) -> Result<CsvTable, Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_| Error::CsvRead(path.display().to_string()))?;

    let mut lines = contents.lines();
    let mut table = CsvTable::default();

    let Some(header) = lines.next() else {
        return Ok(table);
    };
    budget.charge_io(header.len() as i64 + 1, 0)?;
    table.headers = header.split(',').map(trim_cell).collect();
    table.columns = vec![Vec::new(); table.headers.len()];

    for line in lines {
        budget.charge_io(line.len() as i64 + 1, 1)?;
        let mut cells = line.split(',').map(trim_cell);
        for column in &mut table.columns {
            column.push(cells.next().unwrap_or_default());
        }
        table.row_count += 1;
    }

    Ok(table)
}

fn trim_cell(cell: &str) -> String {
    cell.trim().to_owned()
}
