use crate::errors::Result;
use std::fmt;
use std::path::{Path, PathBuf};

/// How a replacement value is computed for a matched cell or shape.
///
/// Both modes detect matches the same way (literal substring containment);
/// they only differ once a replacement word is supplied.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
pub enum SearchMode {
    /// Treat the search word as a regex and substitute every occurrence.
    #[value(name = "FUZZY")]
    #[serde(rename = "FUZZY")]
    Fuzzy,
    /// Overwrite the whole matched value with the replacement word.
    #[value(name = "STRICTLY", alias = "STRICT")]
    #[serde(rename = "STRICTLY", alias = "STRICT")]
    Strict,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Fuzzy => f.write_str("FUZZY"),
            SearchMode::Strict => f.write_str("STRICTLY"),
        }
    }
}

/// The immutable description of one search run.
#[derive(Debug, Clone)]
pub struct SearchCondition {
    root: PathBuf,
    search_word: String,
    mode: SearchMode,
    replace_word: Option<String>,
}

impl SearchCondition {
    /// Builds a condition, rejecting an empty search word.
    ///
    /// An empty word would be contained in every cell of every document, which
    /// is never what the caller wants and would rewrite every value on replace.
    pub fn new(
        root: impl Into<PathBuf>,
        search_word: impl Into<String>,
        mode: SearchMode,
        replace_word: Option<String>,
    ) -> Result<Self> {
        let search_word = search_word.into();
        if search_word.is_empty() {
            return Err("The search word must not be empty".into());
        }
        Ok(Self {
            root: root.into(),
            search_word,
            mode,
            replace_word,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn search_word(&self) -> &str {
        &self.search_word
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// `None` means search-only: nothing is written back.
    pub fn replace_word(&self) -> Option<&str> {
        self.replace_word.as_deref()
    }

    pub fn is_replacing(&self) -> bool {
        self.replace_word.is_some()
    }
}
