use super::HitSink;
use crate::errors::Result;
use crate::hit::HitRecord;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::io::Write;

/// Writes one tab-separated line per hit, with a blank line after every
/// sheet that produced hits. Output is flushed at each sheet boundary so a
/// consumer piping the stream sees results as they are found.
pub struct StreamSink<W: Write> {
    out: W,
    sheet_hits: usize,
}

impl<W: Write> StreamSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, sheet_hits: 0 }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Formats one record with tab delimiters, quoting only fields that need it.
fn format_line(fields: &[String]) -> Result<Vec<u8>> {
    let mut line = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());
    line.write_record(fields)?;
    line.into_inner().map_err(|e| e.into_error().into())
}

impl<W: Write> HitSink for StreamSink<W> {
    fn record(&mut self, hit: &HitRecord) -> Result<()> {
        let line = format_line(&[
            hit.file_index.to_string(),
            hit.sheet_index.to_string(),
            hit.cell_index().to_string(),
            hit.file_path.display().to_string(),
            hit.sheet_name.clone(),
            hit.position.clone(),
            hit.original.clone(),
            hit.replaced.clone().unwrap_or_default(),
            hit.link_target(),
        ])?;
        self.out.write_all(&line)?;
        self.sheet_hits += 1;
        Ok(())
    }

    fn end_sheet(&mut self) -> Result<()> {
        if self.sheet_hits == 0 {
            return Ok(());
        }
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.sheet_hits = 0;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.end_sheet()?;
        self.out.flush()?;
        Ok(())
    }
}
