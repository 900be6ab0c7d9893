use crate::condition::SearchMode;
use crate::sink::OutputKind;
use clap::Parser;
use std::path::PathBuf;

/// Search (and optionally replace) text in every spreadsheet under a directory.
///
/// Cell values and the text of drawing shapes in `.xls` and `.xlsx` files are
/// matched. Hits go to a results workbook or to standard output.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Recursive search and replace for .xls/.xlsx workbooks",
    long_about = "sheetgrep - search every cell and text box of every workbook below a directory.

Modes:
  FUZZY     a value matches when it contains the search word; with a
            replacement, the search word is a regular expression and every
            match is replaced
  STRICTLY  a value matches when it contains the search word; with a
            replacement, the whole value is overwritten by it

Legacy .xls files are searched but never rewritten.

QUICK EXAMPLES:
  sheetgrep ./ledgers Jakarta FUZZY                 # List hits in result.xlsx
  sheetgrep ./ledgers Jakarta STRICTLY Bogor        # Overwrite whole values
  sheetgrep ./ledgers 'Jak\\w+' FUZZY Bogor -o stdout # Regex replace, TSV to stdout
  sheetgrep ./ledgers Jakarta FUZZY --report ~/hits.xlsx"
)]
pub struct Args {
    /// The directory to search recursively.
    pub root: PathBuf,

    /// The text to look for.
    pub search_word: String,

    /// How values are compared with the search word (FUZZY or STRICTLY).
    #[arg(value_enum, ignore_case = true)]
    pub mode: SearchMode,

    /// Replacement text. Without it the run only searches.
    pub replace_word: Option<String>,

    /// Where hits are written. Defaults to `report`.
    #[arg(short, long, value_enum)]
    pub output: Option<OutputKind>,

    /// Path of the results workbook. Defaults to `result.xlsx` in the current directory.
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Path to a YAML file with `report`, `output` and `verbose` settings.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log every file and skipped item.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parses command-line arguments and returns the populated `Args` struct.
pub fn parse_args() -> Args {
    Args::parse()
}
