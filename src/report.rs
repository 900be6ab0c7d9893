//! Whole-workbook writer for the results file.
//!
//! The results workbook is small and owned by this tool, so it is always
//! written from scratch: every sheet (the new one plus any carried over from
//! a previous run) is serialized with `rust_xlsxwriter` and swapped in
//! atomically.

use crate::codec::{CellValue, Document, Sheet, XlsxDocument};
use crate::errors::{Error, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_sheet(worksheet: &mut Worksheet, sheet: &Sheet, path: &Path) -> Result<()> {
    worksheet.set_name(sheet.name())?;
    for (row, cells) in sheet.rows() {
        for (col, cell) in cells.cells() {
            let col = u16::try_from(col).map_err(|_| Error::InvalidWorkbook {
                path: path.to_path_buf(),
                reason: format!("column {col} of sheet '{}' is out of range", sheet.name()),
            })?;
            match cell.value() {
                CellValue::String(s) => {
                    worksheet.write_string(row, col, s)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number(row, col, *n)?;
                }
                CellValue::Boolean(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
                CellValue::Formula(f) => {
                    worksheet.write_formula(row, col, f.as_str())?;
                }
                CellValue::Error(e) => {
                    worksheet.write_string(row, col, e)?;
                }
                CellValue::Blank => {}
            }
        }
    }
    Ok(())
}

/// The results workbook: an ordered list of sheets, the first one active.
#[derive(Debug, Default)]
pub struct ReportWorkbook {
    sheets: Vec<Sheet>,
}

impl ReportWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the sheets of an existing results workbook.
    ///
    /// Cell values (including link formulas) are carried over; formatting and
    /// drawings of the previous file are not.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = XlsxDocument::open(path)?;
        Ok(Self {
            sheets: doc.sheets().to_vec(),
        })
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn contains_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Inserts `sheet` in front of all existing sheets.
    pub fn insert_first(&mut self, sheet: Sheet) {
        self.sheets.insert(0, sheet);
    }

    /// Writes the workbook to `path` through a temporary file in the same
    /// directory, so the target is never left half written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        for sheet in &self.sheets {
            write_sheet(workbook.add_worksheet(), sheet, path)?;
        }
        if !self.sheets.is_empty() {
            workbook.worksheet_from_index(0)?.set_active(true);
        }
        let bytes = workbook.save_to_buffer()?;

        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(&bytes)?;
        temp.flush()?;
        temp.persist(path)?;
        Ok(())
    }
}
