use crate::codec::{self, Document, Sheet};
use crate::condition::SearchCondition;
use crate::config::Settings;
use crate::errors::{Error, Result};
use crate::hit::HitRecorder;
use crate::matcher::Matcher;
use crate::sink::{HitSink, OutputKind, ReportSink, StreamSink};
use crate::walker::{DirectoryWalker, DocumentRef};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Candidate documents found by the walk.
    pub files_scanned: usize,
    /// Documents that could not be opened or saved.
    pub files_failed: usize,
    /// Documents written back with replacements.
    pub files_saved: usize,
    /// Documents with replacements that their format cannot write.
    pub files_read_only: usize,
    pub hits: usize,
    /// Matched cells or shapes dropped because their position has no label.
    pub items_skipped: usize,
}

impl RunSummary {
    pub fn print<W: Write>(&self, out: &mut W, replacing: bool) -> io::Result<()> {
        writeln!(out, "\n{}", "-".repeat(50))?;
        writeln!(out, "Files scanned : {}", self.files_scanned)?;
        writeln!(out, "Files failed  : {}", self.files_failed)?;
        if replacing {
            writeln!(out, "Files saved   : {}", self.files_saved)?;
            if self.files_read_only > 0 {
                writeln!(out, "Read-only     : {}", self.files_read_only)?;
            }
        }
        writeln!(out, "Total hits    : {}", self.hits)?;
        if self.items_skipped > 0 {
            writeln!(out, "Skipped items : {}", self.items_skipped)?;
        }
        Ok(())
    }
}

/// Drives the walk, matching, recording and saving for one search condition.
///
/// Documents are processed one at a time. Within a document, every sheet is
/// visited in workbook order; in each sheet the drawing shapes come first,
/// then the populated cells row by row. Failures are contained at the
/// smallest unit that can be skipped: an unlabelable cell or shape is dropped
/// on its own, an unreadable or unwritable document on its own.
pub struct Engine {
    condition: SearchCondition,
    matcher: Matcher,
    excluded: Vec<PathBuf>,
}

impl Engine {
    pub fn new(condition: SearchCondition) -> Result<Self> {
        let matcher = Matcher::new(&condition)?;
        Ok(Self {
            condition,
            matcher,
            excluded: Vec::new(),
        })
    }

    /// Keeps `path` out of the walk.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    /// Processes every document below the root, feeding hits to `sink`.
    ///
    /// Each hit reaches the sink as soon as it is found, and each sheet is
    /// closed with [`HitSink::end_sheet`], before the document is saved. Only
    /// sink failures abort the run; the caller still owns `sink` and is
    /// responsible for finishing it.
    pub fn run(&self, sink: &mut dyn HitSink) -> Result<RunSummary> {
        let mut walker = DirectoryWalker::new(self.condition.root());
        for path in &self.excluded {
            walker = walker.exclude(path.clone());
        }

        let mut summary = RunSummary::default();
        for doc_ref in walker {
            summary.files_scanned += 1;
            info!("Processing {}", doc_ref.path.display());

            let mut document = match codec::open(&doc_ref.path) {
                Ok(document) => document,
                Err(e) => {
                    warn!("Skipping {}", processing_error(&doc_ref, e));
                    summary.files_failed += 1;
                    continue;
                }
            };

            let hits_before = summary.hits;
            self.scan(document.as_mut(), &doc_ref, &mut summary, sink)?;

            if self.condition.is_replacing() && !document.is_writable() {
                if summary.hits > hits_before {
                    warn!(
                        "{} is read-only ({}); hits were reported without replacements",
                        doc_ref.path.display(),
                        document.format()
                    );
                    summary.files_read_only += 1;
                }
                continue;
            }
            self.persist(document.as_mut(), &doc_ref, &mut summary);
        }

        info!(
            "Collected {} documents, {} hits",
            summary.files_scanned, summary.hits
        );
        Ok(summary)
    }

    /// Matches every shape and cell and hands each hit to `sink`.
    ///
    /// Values are only mutated when replacing into a writable document; a
    /// read-only document reports its hits without a replacement.
    fn scan(
        &self,
        document: &mut dyn Document,
        doc_ref: &DocumentRef,
        summary: &mut RunSummary,
        sink: &mut dyn HitSink,
    ) -> Result<()> {
        let replacing = self.condition.is_replacing() && document.is_writable();
        let mut recorder = HitRecorder::new(doc_ref);

        for (sheet_index, sheet) in document.sheets_mut().iter_mut().enumerate() {
            recorder.begin_sheet(sheet_index, sheet.name());
            let hits_before = summary.hits;
            self.scan_shapes(sheet, &recorder, replacing, summary, sink)?;
            self.scan_cells(sheet, &mut recorder, replacing, summary, sink)?;
            debug!("Sheet '{}': {} hits", sheet.name(), summary.hits - hits_before);
            sink.end_sheet()?;
        }
        Ok(())
    }

    fn scan_shapes(
        &self,
        sheet: &mut Sheet,
        recorder: &HitRecorder,
        replacing: bool,
        summary: &mut RunSummary,
        sink: &mut dyn HitSink,
    ) -> Result<()> {
        for shape in sheet.shapes_mut() {
            if shape.text().is_empty() {
                continue;
            }
            let result = self.matcher.match_value(shape.text());
            if !result.matched {
                continue;
            }
            let output = result.output.filter(|_| replacing);
            match recorder.record_shape(shape.anchor(), shape.text(), output.clone()) {
                Ok(hit) => {
                    if let Some(output) = output {
                        shape.set_text(output);
                    }
                    sink.record(&hit)?;
                    summary.hits += 1;
                }
                Err(e) => {
                    warn!("Skipping shape in {}: {}", recorder.file_path().display(), e);
                    summary.items_skipped += 1;
                }
            }
        }
        Ok(())
    }

    fn scan_cells(
        &self,
        sheet: &mut Sheet,
        recorder: &mut HitRecorder,
        replacing: bool,
        summary: &mut RunSummary,
        sink: &mut dyn HitSink,
    ) -> Result<()> {
        for (row_index, row) in sheet.rows_mut() {
            for (col, cell) in row.cells_mut() {
                let text = cell.value().as_text().into_owned();
                let result = self.matcher.match_value(&text);
                if !result.matched {
                    continue;
                }
                let output = result.output.filter(|_| replacing);
                match recorder.record_cell(row_index, col, &text, output.clone()) {
                    Ok(hit) => {
                        if let Some(output) = output {
                            cell.set_value(output);
                        }
                        sink.record(&hit)?;
                        summary.hits += 1;
                    }
                    Err(e) => {
                        warn!("Skipping cell in {}: {}", recorder.file_path().display(), e);
                        summary.items_skipped += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes a mutated document back over its source path.
    fn persist(&self, document: &mut dyn Document, doc_ref: &DocumentRef, summary: &mut RunSummary) {
        if !document.sheets().iter().any(Sheet::is_modified) {
            return;
        }
        match document.save() {
            Ok(()) => {
                info!("Saved {} ({})", doc_ref.path.display(), document.format());
                summary.files_saved += 1;
            }
            Err(e) => {
                error!("{}", processing_error(doc_ref, e));
                summary.files_failed += 1;
            }
        }
    }
}

fn processing_error(doc_ref: &DocumentRef, source: Error) -> Error {
    Error::Processing {
        path: doc_ref.path.clone(),
        source: Box::new(source),
    }
}

/// The main entry point for a search run.
///
/// Builds the sink selected by `settings`, runs the engine over the search
/// root and finishes the sink. A report sink keeps its own file out of the
/// walk. The summary goes to standard error when hits stream to standard
/// output.
pub fn run_search(settings: &Settings) -> Result<RunSummary> {
    let condition = &settings.condition;
    let engine = Engine::new(condition.clone())?;
    info!(
        "Searching {} for '{}' ({})",
        condition.root().display(),
        condition.search_word(),
        condition.mode()
    );

    let summary = match settings.output {
        OutputKind::Report => {
            let mut sink = Box::new(ReportSink::create(&settings.report, condition.search_word())?);
            let engine = engine.exclude(settings.report.clone());
            let summary = engine.run(sink.as_mut())?;
            sink.finish()?;
            summary.print(&mut io::stdout().lock(), condition.is_replacing())?;
            summary
        }
        OutputKind::Stdout => {
            let mut sink = Box::new(StreamSink::new(io::stdout().lock()));
            let summary = engine.run(sink.as_mut())?;
            sink.finish()?;
            summary.print(&mut io::stderr().lock(), condition.is_replacing())?;
            summary
        }
    };

    Ok(summary)
}
