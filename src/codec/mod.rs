//! Spreadsheet document model and the codecs that load and store it.
//!
//! Both container formats are decoded into the same [`Sheet`] / [`Row`] /
//! [`Cell`] / [`Shape`] model. The traversal engine only talks to the
//! [`Document`] trait; which codec backs it is decided once, by [`open`].

pub mod xls;
pub mod xlsx;
pub(crate) mod xml;

use crate::errors::Result;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub use xls::XlsDocument;
pub use xlsx::XlsxDocument;

/// The two supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// Legacy BIFF8 compound document (`.xls`).
    Xls,
    /// Office Open XML package (`.xlsx`).
    Xlsx,
}

impl SpreadsheetFormat {
    /// Picks the format from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "xls" => Some(SpreadsheetFormat::Xls),
            "xlsx" => Some(SpreadsheetFormat::Xlsx),
            _ => None,
        }
    }
}

impl fmt::Display for SpreadsheetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadsheetFormat::Xls => write!(f, "xls"),
            SpreadsheetFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Number(f64),
    Boolean(bool),
    /// Formula text without the leading `=`.
    Formula(String),
    /// Error literal such as `#DIV/0!`.
    Error(String),
    Blank,
}

impl CellValue {
    /// The text the value is matched against.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::String(s) | CellValue::Formula(s) | CellValue::Error(s) => Cow::Borrowed(s),
            CellValue::Number(n) => Cow::Owned(format_number(*n)),
            CellValue::Boolean(true) => Cow::Borrowed("TRUE"),
            CellValue::Boolean(false) => Cow::Borrowed("FALSE"),
            CellValue::Blank => Cow::Borrowed(""),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Integral values render without a fractional part, as a sheet displays them.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    value: CellValue,
    modified: bool,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            modified: false,
        }
    }

    pub fn value(&self) -> &CellValue {
        &self.value
    }

    /// Overwrites the cell with a string value.
    pub fn set_value(&mut self, text: impl Into<String>) {
        self.value = CellValue::String(text.into());
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

/// A sparse row: only populated columns are stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: BTreeMap<u32, Cell>,
}

impl Row {
    /// One past the highest populated column, or 0 for an empty row.
    pub fn last_cell_num(&self) -> u32 {
        self.cells.keys().next_back().map_or(0, |c| c + 1)
    }

    pub fn cell(&self, col: u32) -> Option<&Cell> {
        self.cells.get(&col)
    }

    pub fn cell_mut(&mut self, col: u32) -> Option<&mut Cell> {
        self.cells.get_mut(&col)
    }

    /// Populated cells in column order.
    pub fn cells(&self) -> impl Iterator<Item = (u32, &Cell)> {
        self.cells.iter().map(|(c, cell)| (*c, cell))
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = (u32, &mut Cell)> {
        self.cells.iter_mut().map(|(c, cell)| (*c, cell))
    }

    pub fn insert(&mut self, col: u32, cell: Cell) {
        self.cells.insert(col, cell);
    }
}

/// A text-bearing drawing shape anchored to a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    text: String,
    anchor: (u32, u32),
    modified: bool,
}

impl Shape {
    pub fn new(text: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            text: text.into(),
            anchor: (row, col),
            modified: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Zero-based `(row, col)` of the cell holding the top-left corner.
    pub fn anchor(&self) -> (u32, u32) {
        self.anchor
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

/// A named tab holding a sparse cell grid and its drawing shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    rows: BTreeMap<u32, Row>,
    shapes: Vec<Shape>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: BTreeMap::new(),
            shapes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Highest populated row, or `None` for an empty sheet.
    pub fn last_row_index(&self) -> Option<u32> {
        self.rows.keys().next_back().copied()
    }

    pub fn row(&self, index: u32) -> Option<&Row> {
        self.rows.get(&index)
    }

    pub fn row_mut(&mut self, index: u32) -> Option<&mut Row> {
        self.rows.get_mut(&index)
    }

    /// Populated rows in order; absent rows are skipped.
    pub fn rows(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows.iter().map(|(r, row)| (*r, row))
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = (u32, &mut Row)> {
        self.rows.iter_mut().map(|(r, row)| (*r, row))
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn shapes_mut(&mut self) -> &mut [Shape] {
        &mut self.shapes
    }

    pub fn insert_cell(&mut self, row: u32, col: u32, value: CellValue) {
        self.rows.entry(row).or_default().insert(col, Cell::new(value));
    }

    pub fn push_shape(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    /// `true` if any cell or shape was changed since loading.
    pub fn is_modified(&self) -> bool {
        self.shapes.iter().any(Shape::is_modified)
            || self
                .rows
                .values()
                .any(|row| row.cells().any(|(_, cell)| cell.is_modified()))
    }
}

/// An open spreadsheet document.
pub trait Document {
    /// The path the document was loaded from and is saved back to.
    fn path(&self) -> &Path;

    fn format(&self) -> SpreadsheetFormat;

    /// Sheets in workbook order.
    fn sheets(&self) -> &[Sheet];

    fn sheets_mut(&mut self) -> &mut [Sheet];

    /// `false` for formats that can only be read.
    fn is_writable(&self) -> bool;

    /// Writes all modified cells and shapes back to [`Document::path`].
    fn save(&mut self) -> Result<()>;
}

/// Opens `path` with the codec matching its extension.
pub fn open(path: &Path) -> Result<Box<dyn Document>> {
    match SpreadsheetFormat::from_path(path) {
        Some(SpreadsheetFormat::Xlsx) => Ok(Box::new(XlsxDocument::open(path)?)),
        Some(SpreadsheetFormat::Xls) => Ok(Box::new(XlsDocument::open(path)?)),
        None => Err(format!("Unsupported document type: {}", path.display()).into()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures;
