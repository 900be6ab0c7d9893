use crate::position::{self, PositionError};
use crate::walker::DocumentRef;
use std::path::{Path, PathBuf};

/// What a hit points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    /// The `index`-th cell hit of its sheet.
    Cell { index: usize },
    /// A drawing shape; reported with a cell index of -1.
    Shape,
}

/// One match, fully described. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct HitRecord {
    pub file_index: usize,
    pub file_id: usize,
    pub sheet_index: usize,
    pub target: HitTarget,
    pub file_path: PathBuf,
    pub sheet_name: String,
    /// `A1`-style label of the cell, or of the shape's anchor cell.
    pub position: String,
    pub original: String,
    /// The value written back, `None` for search-only runs.
    pub replaced: Option<String>,
    /// Zero-based `(row, col)` that `position` was encoded from.
    pub source: (u32, u32),
}

impl HitRecord {
    pub fn cell_index(&self) -> i64 {
        match self.target {
            HitTarget::Cell { index } => index as i64,
            HitTarget::Shape => -1,
        }
    }

    pub fn is_shape(&self) -> bool {
        self.target == HitTarget::Shape
    }

    /// `path#'sheet'!B12`, the same target the report's link formula builds.
    pub fn link_target(&self) -> String {
        format!("{}#'{}'!{}", self.file_path.display(), self.sheet_name, self.position)
    }
}

/// Builds [`HitRecord`]s for one document, tracking the current sheet and
/// its cell-hit counter.
pub struct HitRecorder {
    file_index: usize,
    file_id: usize,
    file_path: PathBuf,
    sheet_index: usize,
    sheet_name: String,
    cell_hits: usize,
}

impl HitRecorder {
    pub fn new(doc: &DocumentRef) -> Self {
        Self {
            file_index: doc.dir_index,
            file_id: doc.file_id,
            file_path: doc.path.clone(),
            sheet_index: 0,
            sheet_name: String::new(),
            cell_hits: 0,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Switches to sheet `index` and restarts the cell-hit counter.
    pub fn begin_sheet(&mut self, index: usize, name: &str) {
        self.sheet_index = index;
        self.sheet_name = name.to_string();
        self.cell_hits = 0;
    }

    /// Records a cell hit. The counter advances only when a record is produced.
    pub fn record_cell(
        &mut self,
        row: u32,
        col: u32,
        original: &str,
        replaced: Option<String>,
    ) -> Result<HitRecord, PositionError> {
        let record = self.build(HitTarget::Cell { index: self.cell_hits }, row, col, original, replaced)?;
        self.cell_hits += 1;
        Ok(record)
    }

    /// Records a shape hit at its anchor cell; shapes do not consume the
    /// cell-hit counter.
    pub fn record_shape(
        &self,
        anchor: (u32, u32),
        original: &str,
        replaced: Option<String>,
    ) -> Result<HitRecord, PositionError> {
        self.build(HitTarget::Shape, anchor.0, anchor.1, original, replaced)
    }

    fn build(
        &self,
        target: HitTarget,
        row: u32,
        col: u32,
        original: &str,
        replaced: Option<String>,
    ) -> Result<HitRecord, PositionError> {
        Ok(HitRecord {
            file_index: self.file_index,
            file_id: self.file_id,
            sheet_index: self.sheet_index,
            target,
            file_path: self.file_path.clone(),
            sheet_name: self.sheet_name.clone(),
            position: position::encode(row, col)?,
            original: original.to_string(),
            replaced,
            source: (row, col),
        })
    }
}
