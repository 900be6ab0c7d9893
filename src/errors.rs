use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in `sheetgrep`.
///
/// This enum uses `thiserror` to wrap the various kinds of errors that can occur,
/// from I/O issues to malformed spreadsheet packages.
#[derive(Error, Debug)]
pub enum Error {
    /// An error related to file system I/O.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The fuzzy-mode search word is not a valid regular expression.
    #[error("Pattern compilation failed: {0}")]
    Regex(#[from] regex::Error),

    /// An error that occurred while parsing a YAML configuration file.
    #[error("Config parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A general configuration-related error.
    #[error("Config error: {0}")]
    Config(String),

    /// An error that occurred during the processing of a single file.
    #[error("File processing failed for {path}: {source}")]
    Processing {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An error related to persisting a temporary file.
    #[error("Tempfile error: {0}")]
    TempFile(#[from] tempfile::PersistError),

    /// An error related to writing delimited output.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The OOXML package could not be read or written.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A package part is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A package part contains an invalid character or entity reference.
    #[error("XML escape error: {0}")]
    XmlEscape(#[from] quick_xml::escape::EscapeError),

    /// A legacy workbook could not be read.
    #[error("Legacy workbook error: {0}")]
    Xls(#[from] calamine::XlsError),

    /// The results workbook could not be serialized.
    #[error("Report writing error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    /// A package is readable as a zip but is missing a required part.
    #[error("Invalid workbook {path}: {reason}")]
    InvalidWorkbook { path: PathBuf, reason: String },

    /// The document format does not support writing changes back.
    #[error("Saving is not supported for {0}")]
    ReadOnly(PathBuf),
}

/// A convenient type alias for `Result<T, sheetgrep::errors::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Config(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Config(s.to_string())
    }
}
