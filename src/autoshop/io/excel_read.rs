use std::io::{Read, Seek};
use std::path::Path;

use calamine::{DataType, Range, Reader, Xls, Xlsx, open_workbook};
use tracing::{debug, instrument};

use crate::autoshop::error::{ReportError, Result};

/// One sheet of a generated report. `rows[r][c]` is the cell at absolute
/// position `(r, c)`; empty cells read as empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetContents {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl SheetContents {
    fn from_range(name: String, range: &Range<DataType>) -> Self {
        let rows = match range.end() {
            Some((last_row, last_col)) => (0..=last_row)
                .map(|row| {
                    (0..=last_col)
                        .map(|col| cell_to_string(range.get_value((row, col))))
                        .collect()
                })
                .collect(),
            None => Vec::new(),
        };
        Self { name, rows }
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Reads an `.xlsx` or `.xls` report back into its sheets, in workbook order.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_report(path: &Path) -> Result<Vec<SheetContents>> {
    if !path.exists() {
        return Err(ReportError::MissingInput(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let sheets = match extension.as_str() {
        "xlsx" => {
            let mut workbook: Xlsx<_> = open_workbook(path)?;
            let names = workbook.sheet_names().to_owned();
            names
                .into_iter()
                .map(|name| {
                    let range = read_required_sheet(&mut workbook, &name)?;
                    Ok(SheetContents::from_range(name, &range))
                })
                .collect::<Result<Vec<_>>>()?
        }
        "xls" => {
            let mut workbook: Xls<_> = open_workbook(path)?;
            let names = workbook.sheet_names().to_owned();
            names
                .into_iter()
                .map(|name| {
                    let range = read_required_legacy_sheet(&mut workbook, &name)?;
                    Ok(SheetContents::from_range(name, &range))
                })
                .collect::<Result<Vec<_>>>()?
        }
        other => {
            return Err(ReportError::Unsupported(format!(
                "cannot inspect '.{other}' files"
            )));
        }
    };

    debug!(sheets = sheets.len(), "report read");
    Ok(sheets)
}

fn read_required_sheet<R: Read + Seek>(workbook: &mut Xlsx<R>, name: &str) -> Result<Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ReportError::InvalidData(format!("missing sheet '{name}'")))?;
    Ok(range_result?)
}

fn read_required_legacy_sheet<R: Read + Seek>(workbook: &mut Xls<R>, name: &str) -> Result<Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ReportError::InvalidData(format!("missing sheet '{name}'")))?;
    Ok(range_result?)
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_and_unknown_files_are_rejected() {
        let dir = tempdir().expect("temporary directory");
        assert!(matches!(
            read_report(&dir.path().join("absent.xlsx")),
            Err(ReportError::MissingInput(_))
        ));

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "plain").unwrap();
        assert!(matches!(read_report(&text), Err(ReportError::Unsupported(_))));
    }

    #[test]
    fn numbers_render_without_trailing_zeroes() {
        assert_eq!(cell_to_string(Some(&DataType::Float(3.0))), "3");
        assert_eq!(cell_to_string(None), "");
    }

    #[test]
    fn out_of_grid_cells_read_empty() {
        let sheet = SheetContents {
            name: "A".into(),
            rows: vec![vec!["x".into()]],
        };
        assert_eq!(sheet.cell(0, 0), "x");
        assert_eq!(sheet.cell(5, 5), "");
    }
}
