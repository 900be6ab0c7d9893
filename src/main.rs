//! The main entry point for the `sheetgrep` command-line application.
//!
//! This file parses command-line arguments, sets up logging and hands the
//! resolved settings to the search engine in the `sheetgrep` library.

use sheetgrep::cli;
use sheetgrep::config::Settings;
use sheetgrep::engine;
use sheetgrep::errors::Result;
use std::env;
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Bare `sheetgrep` gets usage examples instead of a clap error.
    if env::args().len() == 1 {
        eprintln!("Recursive search and replace for .xls/.xlsx workbooks\n");
        eprintln!("USAGE:");
        eprintln!("  sheetgrep <ROOT> <SEARCH_WORD> <FUZZY|STRICTLY> [REPLACE_WORD]\n");
        eprintln!("QUICK START EXAMPLES:");
        eprintln!("  sheetgrep . Jakarta FUZZY                  # Find every cell containing Jakarta");
        eprintln!("  sheetgrep . Jakarta STRICTLY Bogor         # Overwrite cells containing Jakarta");
        eprintln!("  sheetgrep . Jakarta FUZZY -o stdout        # Print hits as tab-separated lines\n");
        eprintln!("Run 'sheetgrep --help' for all options");
        process::exit(1);
    }

    let args = cli::parse_args();
    let settings = Settings::resolve(&args)?;

    let default_level = if settings.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    engine::run_search(&settings)?;
    Ok(())
}
