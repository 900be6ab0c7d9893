//! Destinations for hit records.

pub mod stream;
pub mod workbook;

use crate::errors::Result;
use crate::hit::HitRecord;
use std::fmt;

pub use stream::StreamSink;
pub use workbook::ReportSink;

/// Column titles shared by both sinks, in output order.
pub const REPORT_HEADER: [&str; 9] = [
    "fileIndex",
    "sheetIndex",
    "cellIndex",
    "filePath",
    "sheetName",
    "position",
    "value",
    "replaced",
    "link",
];

/// Where a run sends its hits.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Append a sheet to the results workbook.
    #[default]
    Report,
    /// Print tab-separated lines to standard output.
    Stdout,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Report => f.write_str("report"),
            OutputKind::Stdout => f.write_str("stdout"),
        }
    }
}

/// Receives hits in discovery order.
///
/// `end_sheet` is called after every sheet of every document, whether or not
/// it produced hits. `finish` is called once, after the last document.
pub trait HitSink {
    fn record(&mut self, hit: &HitRecord) -> Result<()>;

    fn end_sheet(&mut self) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<()>;
}
