//! Legacy BIFF (`.xls`) reader backed by `calamine`.
//!
//! Legacy workbooks are read-only: cells are loaded with their values (and
//! formula text where present) so they can be searched, but there is no
//! writer and drawing shapes are not exposed.

use super::{CellValue, Document, Sheet, SpreadsheetFormat};
use crate::errors::{Error, Result};
use calamine::{open_workbook, Data, Reader, Xls};
use std::path::{Path, PathBuf};

pub struct XlsDocument {
    path: PathBuf,
    sheets: Vec<Sheet>,
}

impl XlsDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let mut workbook: Xls<_> = open_workbook(path)?;
        let names = workbook.sheet_names().to_vec();

        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let mut sheet = Sheet::new(name.as_str());

            let range = workbook.worksheet_range(&name)?;
            if let Some((row0, col0)) = range.start() {
                for (r, c, data) in range.used_cells() {
                    sheet.insert_cell(row0 + r as u32, col0 + c as u32, cell_value(data));
                }
            }

            // Formula text wins over the cached result, matching the xlsx reader.
            if let Ok(formulas) = workbook.worksheet_formula(&name) {
                if let Some((row0, col0)) = formulas.start() {
                    for (r, c, formula) in formulas.used_cells() {
                        if !formula.is_empty() {
                            sheet.insert_cell(
                                row0 + r as u32,
                                col0 + c as u32,
                                CellValue::Formula(formula.clone()),
                            );
                        }
                    }
                }
            }

            sheets.push(sheet);
        }

        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::String(s) => CellValue::String(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::Error(e) => CellValue::Error(e.to_string()),
        Data::Empty => CellValue::Blank,
        other => CellValue::String(other.to_string()),
    }
}

impl Document for XlsDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> SpreadsheetFormat {
        SpreadsheetFormat::Xls
    }

    fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    fn sheets_mut(&mut self) -> &mut [Sheet] {
        &mut self.sheets
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn save(&mut self) -> Result<()> {
        Err(Error::ReadOnly(self.path.clone()))
    }
}
