//! `sheetgrep` is a library for searching and rewriting text in spreadsheet
//! workbooks across a directory tree.
//!
//! It provides the core logic for the `sheetgrep` command-line tool but can
//! also be used as a standalone library. The main components are:
//!
//! - `walker`: Depth-first discovery of `.xls` and `.xlsx` files.
//! - `codec`: Loads both formats into one sheet/row/cell/shape model and
//!   writes `.xlsx` packages back in place.
//! - `matcher`: Decides whether a value matches and computes its replacement.
//! - `engine`: Drives a run and counts what happened.
//! - `sink`: Sends hits to a results workbook or to a tab-separated stream.
//! - `config`: Merges command-line flags with an optional YAML file.

pub mod cli;
pub mod codec;
pub mod condition;
pub mod config;
pub mod engine;
pub mod errors;
pub mod hit;
pub mod matcher;
pub mod position;
pub mod report;
pub mod sink;
pub mod walker;

// Re-export main types for easier access by library users.
pub use condition::{SearchCondition, SearchMode};
pub use engine::{Engine, RunSummary};
pub use errors::{Error, Result};
pub use hit::HitRecord;
pub use matcher::Matcher;
