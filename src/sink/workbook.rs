use super::{HitSink, REPORT_HEADER};
use crate::codec::{CellValue, Sheet};
use crate::errors::Result;
use crate::hit::HitRecord;
use crate::report::ReportWorkbook;
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::info;

/// Longest sheet name spreadsheet applications accept.
const MAX_SHEET_NAME: usize = 31;

/// Collects hits into a new sheet of the results workbook.
///
/// The sheet is named after the search word and the start time, placed in
/// front of any sheets left by earlier runs, and made active. Nothing is
/// written until [`HitSink::finish`].
pub struct ReportSink {
    path: PathBuf,
    workbook: ReportWorkbook,
    sheet: Sheet,
    next_row: u32,
}

impl ReportSink {
    /// Opens (or starts) the results workbook at `path`.
    ///
    /// # Errors
    ///
    /// Fails if `path` exists but is not a readable workbook, so a run never
    /// overwrites results it could not carry over.
    pub fn create(path: &Path, search_word: &str) -> Result<Self> {
        Self::with_timestamp(path, search_word, Local::now().naive_local())
    }

    pub fn with_timestamp(path: &Path, search_word: &str, started: NaiveDateTime) -> Result<Self> {
        let workbook = if path.exists() {
            ReportWorkbook::load(path)?
        } else {
            ReportWorkbook::new()
        };

        let proposed = format!("{} {}", search_word, started.format("%Y%m%d_%H%M%S"));
        let name = unique_sheet_name(&workbook, &safe_sheet_name(&proposed));
        info!("Results go to sheet '{}' of {}", name, path.display());

        let mut sheet = Sheet::new(name);
        for (col, title) in REPORT_HEADER.iter().enumerate() {
            sheet.insert_cell(0, col as u32, CellValue::String(title.to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            workbook,
            sheet,
            next_row: 1,
        })
    }

    pub fn sheet_name(&self) -> &str {
        self.sheet.name()
    }
}

impl HitSink for ReportSink {
    fn record(&mut self, hit: &HitRecord) -> Result<()> {
        let row = self.next_row;
        let n = u64::from(row) + 1;
        let sheet = &mut self.sheet;

        sheet.insert_cell(row, 0, CellValue::Number(hit.file_index as f64));
        sheet.insert_cell(row, 1, CellValue::Number(hit.sheet_index as f64));
        sheet.insert_cell(row, 2, CellValue::Number(hit.cell_index() as f64));
        sheet.insert_cell(row, 3, CellValue::String(hit.file_path.display().to_string()));
        sheet.insert_cell(row, 4, CellValue::String(hit.sheet_name.clone()));
        sheet.insert_cell(row, 5, CellValue::String(hit.position.clone()));
        sheet.insert_cell(row, 6, CellValue::String(hit.original.clone()));
        if let Some(replaced) = &hit.replaced {
            sheet.insert_cell(row, 7, CellValue::String(replaced.clone()));
        }
        sheet.insert_cell(
            row,
            8,
            CellValue::Formula(format!(
                "HYPERLINK(D{n} & \"#'\" & E{n} & \"'!\" & F{n}, \"LINK\")"
            )),
        );

        self.next_row += 1;
        Ok(())
    }

    fn end_sheet(&mut self) -> Result<()> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let ReportSink {
            path,
            mut workbook,
            sheet,
            next_row,
        } = *self;
        workbook.insert_first(sheet);
        workbook.save(&path)?;
        info!("Wrote {} result rows to {}", next_row - 1, path.display());
        Ok(())
    }
}

/// Makes `proposal` acceptable as a sheet name: at most 31 characters,
/// none of `: / \ ? * [ ]` or control markers, and no quote at either end.
pub fn safe_sheet_name(proposal: &str) -> String {
    let chars: Vec<char> = proposal.chars().take(MAX_SHEET_NAME).collect();
    if chars.is_empty() {
        return "empty".to_string();
    }
    let last = chars.len() - 1;
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| match c {
            '\0' | '\u{3}' | ':' | '/' | '\\' | '?' | '*' | '[' | ']' => '_',
            '\'' if i == 0 || i == last => '_',
            c => c,
        })
        .collect()
}

/// Appends ` (2)`, ` (3)`, ... until the name is not taken, trimming the base
/// so the result still fits.
fn unique_sheet_name(workbook: &ReportWorkbook, name: &str) -> String {
    if !workbook.contains_sheet(name) {
        return name.to_string();
    }
    let mut n = 2;
    loop {
        let suffix = format!(" ({n})");
        let base: String = name
            .chars()
            .take(MAX_SHEET_NAME - suffix.chars().count())
            .collect();
        let candidate = format!("{base}{suffix}");
        if !workbook.contains_sheet(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::HitRecorder;
    use crate::walker::DocumentRef;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn started() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
    }

    fn hits() -> Vec<HitRecord> {
        let mut rec = HitRecorder::new(&DocumentRef {
            path: PathBuf::from("/data/dir01/book.xlsx"),
            dir_index: 2,
            file_id: 7,
        });
        rec.begin_sheet(1, "Sheet2");
        vec![
            rec.record_shape((3, 0), "Jakarta box", Some("Bogor box".into())).unwrap(),
            rec.record_cell(9, 4, "Jakarta", Some("Bogor".into())).unwrap(),
        ]
    }

    #[test]
    fn test_safe_sheet_names() {
        assert_eq!(safe_sheet_name("Jakarta 20240309_140507"), "Jakarta 20240309_140507");
        assert_eq!(safe_sheet_name("a/b:c[d]*?\\"), "a_b_c_d____");
        assert_eq!(safe_sheet_name("'quoted'"), "_quoted_");
        assert_eq!(safe_sheet_name("it's"), "it's");
        assert_eq!(safe_sheet_name(""), "empty");
        assert_eq!(safe_sheet_name(&"x".repeat(40)).chars().count(), 31);
    }

    #[test]
    fn test_new_report_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("result.xlsx");

        let mut sink = Box::new(ReportSink::with_timestamp(&path, "Jakarta", started()).unwrap());
        for hit in hits() {
            sink.record(&hit).unwrap();
        }
        sink.end_sheet().unwrap();
        sink.finish().unwrap();

        let workbook = ReportWorkbook::load(&path).unwrap();
        let sheet = &workbook.sheets()[0];
        assert_eq!(sheet.name(), "Jakarta 20240309_140507");

        let value = |r: u32, c: u32| sheet.row(r).and_then(|row| row.cell(c)).map(|c| c.value().clone());
        for (col, title) in REPORT_HEADER.iter().enumerate() {
            assert_eq!(value(0, col as u32), Some(CellValue::String(title.to_string())));
        }
        assert_eq!(value(1, 0), Some(CellValue::Number(2.0)));
        assert_eq!(value(1, 1), Some(CellValue::Number(1.0)));
        assert_eq!(value(1, 2), Some(CellValue::Number(-1.0)));
        assert_eq!(value(1, 5), Some(CellValue::String("A4".into())));
        assert_eq!(value(2, 2), Some(CellValue::Number(0.0)));
        assert_eq!(value(2, 5), Some(CellValue::String("E10".into())));
        assert_eq!(value(2, 6), Some(CellValue::String("Jakarta".into())));
        assert_eq!(value(2, 7), Some(CellValue::String("Bogor".into())));
        assert_eq!(
            value(2, 8),
            Some(CellValue::Formula("HYPERLINK(D3 & \"#'\" & E3 & \"'!\" & F3, \"LINK\")".into()))
        );
    }

    #[test]
    fn test_append_keeps_previous_sheets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("result.xlsx");

        for word in ["Jakarta", "Bogor"] {
            let mut sink = Box::new(ReportSink::with_timestamp(&path, word, started()).unwrap());
            for hit in hits() {
                sink.record(&hit).unwrap();
            }
            sink.finish().unwrap();
        }

        // Same word and timestamp again: the name must be de-duplicated.
        let sink = ReportSink::with_timestamp(&path, "Bogor", started()).unwrap();
        assert_eq!(sink.sheet_name(), "Bogor 20240309_140507 (2)");
        Box::new(sink).finish().unwrap();

        let workbook = ReportWorkbook::load(&path).unwrap();
        let names: Vec<&str> = workbook.sheets().iter().map(Sheet::name).collect();
        assert_eq!(
            names,
            vec![
                "Bogor 20240309_140507 (2)",
                "Bogor 20240309_140507",
                "Jakarta 20240309_140507"
            ]
        );
        assert_eq!(workbook.sheets()[2].last_row_index(), Some(2));
        assert_eq!(workbook.sheets()[0].last_row_index(), Some(0));
    }

    #[test]
    fn test_corrupt_existing_report_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("result.xlsx");
        fs::write(&path, b"garbage").unwrap();
        assert!(ReportSink::create(&path, "Jakarta").is_err());
        assert_eq!(fs::read(&path).unwrap(), b"garbage");
    }
}
