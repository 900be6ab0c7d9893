//! OOXML (`.xlsx`) reader and in-place writer.
//!
//! The package is held in memory entry by entry. Parsing records the byte
//! span of every cell element and of every shape's paragraph list, so saving
//! only splices the modified spans and copies every other part verbatim.

use super::xml::{attr, prefix_of, splice, TextBuf};
use super::{CellValue, Document, Shape, Sheet, SpreadsheetFormat};
use crate::errors::{Error, Result};
use crate::position;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

struct Part {
    name: String,
    data: Vec<u8>,
}

/// The raw entries of a zip package, in archive order.
struct Package {
    path: PathBuf,
    parts: Vec<Part>,
}

impl Package {
    fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            parts.push(Part {
                name: entry.name().to_string(),
                data,
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            parts,
        })
    }

    fn text(&self, name: &str) -> Result<Option<&str>> {
        let Some(part) = self.parts.iter().find(|p| p.name == name) else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&part.data)
            .map_err(|_| self.invalid(format!("part {name} is not UTF-8")))?;
        Ok(Some(text.strip_prefix('\u{feff}').unwrap_or(text)))
    }

    fn require(&self, name: &str) -> Result<&str> {
        self.text(name)?
            .ok_or_else(|| self.invalid(format!("missing part {name}")))
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidWorkbook {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Rewrites the package atomically, substituting `replaced` part contents
    /// and leaving out the `dropped` parts.
    fn write(&self, replaced: &HashMap<String, String>, dropped: &HashSet<String>) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(parent)?;
        {
            let mut zip = ZipWriter::new(temp.as_file_mut());
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for part in self.parts.iter().filter(|p| !dropped.contains(&p.name)) {
                zip.start_file(part.name.as_str(), options)?;
                match replaced.get(&part.name) {
                    Some(xml) => zip.write_all(xml.as_bytes())?,
                    None => zip.write_all(&part.data)?,
                }
            }
            zip.finish()?;
        }

        if let Ok(metadata) = fs::metadata(&self.path) {
            fs::set_permissions(temp.path(), metadata.permissions())?;
        }
        temp.persist(&self.path)?;
        Ok(())
    }
}

struct Relationship {
    id: String,
    kind: String,
    target: String,
}

/// Where a cell element lives in its worksheet part.
struct CellSlot {
    span: Range<usize>,
    prefix: String,
    reference: Option<String>,
    style: Option<String>,
    formula: bool,
}

impl CellSlot {
    /// The replacement element: an inline string keeping reference and style.
    fn inline_string(&self, text: &str) -> String {
        let p = &self.prefix;
        let mut out = format!("<{p}c");
        if let Some(r) = &self.reference {
            out.push_str(&format!(" r=\"{}\"", escape(r)));
        }
        if let Some(s) = &self.style {
            out.push_str(&format!(" s=\"{}\"", escape(s)));
        }
        out.push_str(&format!(
            " t=\"inlineStr\"><{p}is><{p}t xml:space=\"preserve\">{}</{p}t></{p}is></{p}c>",
            escape(text)
        ));
        out
    }
}

/// Where a shape's paragraphs live in its drawing part, and the formatting
/// its rewritten text keeps.
struct ShapeSlot {
    paragraphs: Range<usize>,
    prefix: String,
    para_props: Option<String>,
    run_props: Option<String>,
    end_props: Option<String>,
    /// One entry per line break of the original text: `true` for an `a:br`
    /// inside a paragraph, `false` for a paragraph boundary.
    breaks: Vec<bool>,
}

impl ShapeSlot {
    /// Rebuilds the paragraph list for `text`.
    ///
    /// When the line count is unchanged, every break keeps its original kind;
    /// otherwise each line becomes a paragraph. All paragraphs carry the first
    /// captured `pPr`, `rPr` and `endParaRPr`.
    fn paragraphs_xml(&self, text: &str) -> String {
        let p = &self.prefix;
        let para_props = self.para_props.as_deref().unwrap_or("");
        let run_props = self.run_props.as_deref().unwrap_or("");
        let end_props = self.end_props.as_deref().unwrap_or("");

        let lines: Vec<&str> = text.split('\n').collect();
        let keep_breaks = lines.len() == self.breaks.len() + 1;
        let mut paragraphs: Vec<Vec<&str>> = Vec::new();
        for (i, line) in lines.into_iter().enumerate() {
            let soft = i > 0 && keep_breaks && self.breaks[i - 1];
            match paragraphs.last_mut() {
                Some(current) if soft => current.push(line),
                _ => paragraphs.push(vec![line]),
            }
        }

        let mut out = String::new();
        for segments in paragraphs {
            out.push_str(&format!("<{p}p>{para_props}"));
            for (i, segment) in segments.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(&format!("<{p}br/>"));
                }
                if !segment.is_empty() {
                    out.push_str(&format!(
                        "<{p}r>{run_props}<{p}t>{}</{p}t></{p}r>",
                        escape(segment)
                    ));
                }
            }
            out.push_str(&format!("{end_props}</{p}p>"));
        }
        out
    }
}

struct DrawingLayout {
    part: String,
    slots: Vec<ShapeSlot>,
}

struct SheetLayout {
    part: String,
    cells: HashMap<(u32, u32), CellSlot>,
    drawing: Option<DrawingLayout>,
}

struct CalcChain {
    part: String,
    rels_part: String,
}

/// An `.xlsx` workbook opened for reading and in-place modification.
pub struct XlsxDocument {
    package: Package,
    sheets: Vec<Sheet>,
    layouts: Vec<SheetLayout>,
    calc_chain: Option<CalcChain>,
}

impl XlsxDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let package = Package::read(path)?;

        let workbook_part = match package.text("_rels/.rels")? {
            Some(xml) => parse_relationships(xml, "")?
                .into_iter()
                .find(|r| r.kind.ends_with("/officeDocument"))
                .map(|r| r.target),
            None => None,
        }
        .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());

        let workbook_rels_part = rels_part_for(&workbook_part);
        let workbook_rels = match package.text(&workbook_rels_part)? {
            Some(xml) => parse_relationships(xml, part_dir(&workbook_part))?,
            None => Vec::new(),
        };

        let shared = match workbook_rels.iter().find(|r| r.kind.ends_with("/sharedStrings")) {
            Some(rel) => match package.text(&rel.target)? {
                Some(xml) => parse_shared_strings(xml)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        let calc_chain = workbook_rels
            .iter()
            .find(|r| r.kind.ends_with("/calcChain"))
            .map(|r| CalcChain {
                part: r.target.clone(),
                rels_part: workbook_rels_part.clone(),
            });

        let mut sheets = Vec::new();
        let mut layouts = Vec::new();
        for (name, rid) in parse_workbook(package.require(&workbook_part)?)? {
            let rel = workbook_rels
                .iter()
                .find(|r| r.id == rid)
                .ok_or_else(|| package.invalid(format!("sheet '{name}' has no relationship {rid}")))?;
            let xml = package.require(&rel.target)?;
            let (mut sheet, cells, drawing_rid) = parse_worksheet(&name, xml, &shared)?;

            let drawing = match drawing_rid {
                Some(drawing_rid) => load_drawing(&package, &rel.target, &drawing_rid, &mut sheet)?,
                None => None,
            };

            sheets.push(sheet);
            layouts.push(SheetLayout {
                part: rel.target.clone(),
                cells,
                drawing,
            });
        }

        Ok(Self {
            package,
            sheets,
            layouts,
            calc_chain,
        })
    }

    /// Splices every modified cell and shape into fresh part contents.
    /// The flag tells whether a formula cell was overwritten.
    fn modified_parts(&self) -> Result<(HashMap<String, String>, bool)> {
        let mut replaced = HashMap::new();
        let mut formula_overwritten = false;

        for (sheet, layout) in self.sheets.iter().zip(&self.layouts) {
            let mut edits = Vec::new();
            for (row_idx, row) in sheet.rows() {
                for (col, cell) in row.cells() {
                    if !cell.is_modified() {
                        continue;
                    }
                    if let Some(slot) = layout.cells.get(&(row_idx, col)) {
                        formula_overwritten |= slot.formula;
                        edits.push((slot.span.clone(), slot.inline_string(&cell.value().as_text())));
                    }
                }
            }
            if !edits.is_empty() {
                let xml = self.package.require(&layout.part)?;
                replaced.insert(layout.part.clone(), splice(xml, edits));
            }

            if let Some(drawing) = &layout.drawing {
                let edits: Vec<_> = sheet
                    .shapes()
                    .iter()
                    .zip(&drawing.slots)
                    .filter(|(shape, _)| shape.is_modified())
                    .map(|(shape, slot)| (slot.paragraphs.clone(), slot.paragraphs_xml(shape.text())))
                    .collect();
                if !edits.is_empty() {
                    let xml = self.package.require(&drawing.part)?;
                    replaced.insert(drawing.part.clone(), splice(xml, edits));
                }
            }
        }

        Ok((replaced, formula_overwritten))
    }
}

impl Document for XlsxDocument {
    fn path(&self) -> &Path {
        &self.package.path
    }

    fn format(&self) -> SpreadsheetFormat {
        SpreadsheetFormat::Xlsx
    }

    fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    fn sheets_mut(&mut self) -> &mut [Sheet] {
        &mut self.sheets
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn save(&mut self) -> Result<()> {
        let (mut replaced, formula_overwritten) = self.modified_parts()?;
        if replaced.is_empty() {
            debug!("No changes to write for {}", self.package.path.display());
            return Ok(());
        }

        // The calculation chain lists formula cells; a stale entry makes
        // spreadsheet applications report the file as damaged.
        let mut dropped = HashSet::new();
        if formula_overwritten {
            if let Some(calc) = &self.calc_chain {
                let override_name = format!("/{}", calc.part);
                let types = self.package.require(CONTENT_TYPES_PART)?;
                replaced.insert(
                    CONTENT_TYPES_PART.to_string(),
                    remove_elements(types, b"Override", |e| {
                        Ok(attr(e, b"PartName")?.as_deref() == Some(override_name.as_str()))
                    })?,
                );
                let rels = self.package.require(&calc.rels_part)?;
                replaced.insert(
                    calc.rels_part.clone(),
                    remove_elements(rels, b"Relationship", |e| {
                        Ok(attr(e, b"Type")?.is_some_and(|t| t.ends_with("/calcChain")))
                    })?,
                );
                dropped.insert(calc.part.clone());
            }
        }

        self.package.write(&replaced, &dropped)?;

        // Spans are stale after a rewrite; reload from disk.
        let path = self.package.path.clone();
        *self = Self::open(&path)?;
        Ok(())
    }
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`
fn rels_part_for(part: &str) -> String {
    let dir = part_dir(part);
    format!("{dir}_rels/{}.rels", &part[dir.len()..])
}

/// The directory of a part name including the trailing slash.
fn part_dir(part: &str) -> &str {
    match part.rfind('/') {
        Some(i) => &part[..=i],
        None => "",
    }
}

/// Resolves a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{base_dir}{target}"),
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Start of the tag ending at byte `end`.
fn tag_start(xml: &str, end: usize) -> usize {
    xml[..end].rfind('<').unwrap_or(0)
}

/// Removes every `element` for which `matches` holds.
fn remove_elements<F>(xml: &str, element: &[u8], matches: F) -> Result<String>
where
    F: Fn(&BytesStart<'_>) -> Result<bool>,
{
    let mut reader = Reader::from_str(xml);
    let mut edits = Vec::new();
    let mut open: Option<usize> = None;
    loop {
        let event = reader.read_event()?;
        let end = reader.buffer_position() as usize;
        match event {
            Event::Empty(ref e) if e.local_name().as_ref() == element && matches(e)? => {
                edits.push((tag_start(xml, end)..end, String::new()));
            }
            Event::Start(ref e) if e.local_name().as_ref() == element && matches(e)? => {
                open = Some(tag_start(xml, end));
            }
            Event::End(ref e) if e.local_name().as_ref() == element => {
                if let Some(start) = open.take() {
                    edits.push((start..end, String::new()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(splice(xml, edits))
}

fn parse_relationships(xml: &str, base_dir: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml);
    let mut rels = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"Relationship" => {
                if attr(e, b"TargetMode")?.as_deref() == Some("External") {
                    continue;
                }
                let (Some(id), Some(kind), Some(target)) =
                    (attr(e, b"Id")?, attr(e, b"Type")?, attr(e, b"Target")?)
                else {
                    continue;
                };
                rels.push(Relationship {
                    id,
                    kind,
                    target: resolve_target(base_dir, &target),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// Sheet names and relationship ids, in tab order.
fn parse_workbook(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(rid)) = (attr(e, b"name")?, attr(e, b"id")?) {
                    sheets.push((name, rid));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut text = TextBuf::default();
    let mut in_t = false;
    let mut phonetic = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => phonetic += 1,
                b"t" if phonetic == 0 => {
                    in_t = true;
                    text.clear();
                }
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(ref e) if in_t => text.push_text(e),
            Event::GeneralRef(ref e) if in_t => text.push_ref(e),
            Event::CData(ref e) if in_t => text.push_cdata(e),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"t" if in_t => {
                    current.push_str(&text.take()?);
                    in_t = false;
                }
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CellField {
    None,
    Value,
    Formula,
    Inline,
}

struct PendingCell {
    row: u32,
    col: u32,
    start: usize,
    prefix: String,
    reference: Option<String>,
    kind: Option<String>,
    style: Option<String>,
    value: Option<String>,
    formula: Option<String>,
    has_formula: bool,
    inline: String,
}

impl PendingCell {
    fn open(e: &BytesStart<'_>, start: usize, row: u32, next_col: u32) -> Result<Self> {
        let reference = attr(e, b"r")?;
        let (row, col) = match reference.as_deref().map(position::decode) {
            Some(Ok(rc)) => rc,
            _ => (row, next_col),
        };
        Ok(Self {
            row,
            col,
            start,
            prefix: prefix_of(e),
            reference,
            kind: attr(e, b"t")?,
            style: attr(e, b"s")?,
            value: None,
            formula: None,
            has_formula: false,
            inline: String::new(),
        })
    }

    fn value(&self, shared: &[String]) -> CellValue {
        if let Some(formula) = self.formula.as_ref().filter(|f| !f.is_empty()) {
            return CellValue::Formula(formula.clone());
        }
        let raw = self.value.as_deref();
        match self.kind.as_deref() {
            Some("s") => raw
                .and_then(|v| v.trim().parse::<usize>().ok())
                .and_then(|i| shared.get(i))
                .map_or(CellValue::Blank, |s| CellValue::String(s.clone())),
            Some("inlineStr") => CellValue::String(self.inline.clone()),
            Some("str") | Some("d") => CellValue::String(raw.unwrap_or_default().to_string()),
            Some("b") => CellValue::Boolean(matches!(raw.map(str::trim), Some("1") | Some("true"))),
            Some("e") => CellValue::Error(raw.unwrap_or_default().to_string()),
            _ => match raw {
                None => CellValue::Blank,
                Some(v) if v.trim().is_empty() => CellValue::Blank,
                Some(v) => v
                    .trim()
                    .parse::<f64>()
                    .map_or_else(|_| CellValue::String(v.to_string()), CellValue::Number),
            },
        }
    }

    fn finish(self, end: usize, shared: &[String], sheet: &mut Sheet, slots: &mut HashMap<(u32, u32), CellSlot>) {
        let value = self.value(shared);
        sheet.insert_cell(self.row, self.col, value);
        slots.insert(
            (self.row, self.col),
            CellSlot {
                span: self.start..end,
                prefix: self.prefix,
                reference: self.reference,
                style: self.style,
                formula: self.has_formula,
            },
        );
    }
}

type ParsedWorksheet = (Sheet, HashMap<(u32, u32), CellSlot>, Option<String>);

/// Parses a worksheet part into cells plus the relationship id of its drawing.
fn parse_worksheet(name: &str, xml: &str, shared: &[String]) -> Result<ParsedWorksheet> {
    let mut reader = Reader::from_str(xml);
    let mut sheet = Sheet::new(name);
    let mut slots = HashMap::new();
    let mut drawing = None;

    let mut row = 0u32;
    let mut next_row = 0u32;
    let mut next_col = 0u32;
    let mut pending: Option<PendingCell> = None;
    let mut field = CellField::None;
    let mut phonetic = 0usize;
    let mut text = TextBuf::default();

    loop {
        let event = reader.read_event()?;
        let end = reader.buffer_position() as usize;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"row" => {
                        row = attr(e, b"r")?
                            .and_then(|r| r.trim().parse::<u32>().ok())
                            .and_then(|r| r.checked_sub(1))
                            .unwrap_or(next_row);
                        next_row = row + 1;
                        next_col = 0;
                    }
                    b"c" => {
                        let cell = PendingCell::open(e, tag_start(xml, end), row, next_col)?;
                        next_col = cell.col + 1;
                        if empty {
                            cell.finish(end, shared, &mut sheet, &mut slots);
                        } else {
                            pending = Some(cell);
                        }
                    }
                    b"v" if pending.is_some() && !empty => {
                        field = CellField::Value;
                        text.clear();
                    }
                    b"f" => {
                        if let Some(cell) = pending.as_mut() {
                            cell.has_formula = true;
                            if !empty {
                                field = CellField::Formula;
                                text.clear();
                            }
                        }
                    }
                    b"rPh" if !empty => phonetic += 1,
                    b"t" if pending.is_some() && phonetic == 0 && !empty => {
                        field = CellField::Inline;
                        text.clear();
                    }
                    b"drawing" => drawing = attr(e, b"id")?,
                    _ => {}
                }
            }
            Event::Text(ref e) if field != CellField::None => text.push_text(e),
            Event::GeneralRef(ref e) if field != CellField::None => text.push_ref(e),
            Event::CData(ref e) if field != CellField::None => text.push_cdata(e),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"v" if field == CellField::Value => {
                    if let Some(cell) = pending.as_mut() {
                        cell.value = Some(text.take()?);
                    }
                    field = CellField::None;
                }
                b"f" if field == CellField::Formula => {
                    if let Some(cell) = pending.as_mut() {
                        cell.formula = Some(text.take()?);
                    }
                    field = CellField::None;
                }
                b"t" if field == CellField::Inline => {
                    if let Some(cell) = pending.as_mut() {
                        cell.inline.push_str(&text.take()?);
                    }
                    field = CellField::None;
                }
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                b"c" => {
                    if let Some(cell) = pending.take() {
                        cell.finish(end, shared, &mut sheet, &mut slots);
                    }
                    field = CellField::None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((sheet, slots, drawing))
}

fn load_drawing(
    package: &Package,
    sheet_part: &str,
    drawing_rid: &str,
    sheet: &mut Sheet,
) -> Result<Option<DrawingLayout>> {
    let Some(rels_xml) = package.text(&rels_part_for(sheet_part))? else {
        return Ok(None);
    };
    let rels = parse_relationships(rels_xml, part_dir(sheet_part))?;
    let Some(rel) = rels
        .iter()
        .find(|r| r.id == drawing_rid && r.kind.ends_with("/drawing"))
    else {
        return Ok(None);
    };
    let Some(xml) = package.text(&rel.target)? else {
        return Ok(None);
    };

    let mut slots = Vec::new();
    for (shape, slot) in parse_drawing(xml)? {
        sheet.push_shape(shape);
        slots.push(slot);
    }
    Ok(Some(DrawingLayout {
        part: rel.target.clone(),
        slots,
    }))
}

/// Formatting elements copied from the original shape body.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Captured {
    ParaProps,
    RunProps,
    EndProps,
}

impl Captured {
    fn tag(self) -> &'static [u8] {
        match self {
            Captured::ParaProps => b"pPr",
            Captured::RunProps => b"rPr",
            Captured::EndProps => b"endParaRPr",
        }
    }
}

#[derive(Default)]
struct ShapeState {
    paragraphs: Vec<String>,
    paragraph: String,
    breaks: Vec<bool>,
    first_p: Option<usize>,
    last_p_end: usize,
    body_close: Option<usize>,
    prefix: String,
    para_props: Option<String>,
    run_props: Option<String>,
    end_props: Option<String>,
    capture: Option<(Captured, usize)>,
    has_body: bool,
    in_body: bool,
    in_paragraph: bool,
    in_run: bool,
    in_t: bool,
}

impl ShapeState {
    fn captured(&mut self, kind: Captured) -> &mut Option<String> {
        match kind {
            Captured::ParaProps => &mut self.para_props,
            Captured::RunProps => &mut self.run_props,
            Captured::EndProps => &mut self.end_props,
        }
    }

    /// Starts copying the first occurrence of `kind`, or copies it at once
    /// when the element is empty.
    fn begin_capture(&mut self, kind: Captured, xml: &str, start: usize, end: usize, empty: bool) {
        if self.captured(kind).is_some() || self.capture.is_some() {
            return;
        }
        if empty {
            *self.captured(kind) = Some(xml[start..end].to_string());
        } else {
            self.capture = Some((kind, start));
        }
    }

    fn end_capture(&mut self, name: &[u8], xml: &str, end: usize) {
        if let Some((kind, start)) = self.capture {
            if kind.tag() == name {
                self.capture = None;
                *self.captured(kind) = Some(xml[start..end].to_string());
            }
        }
    }

    fn finish(self, anchor: (u32, u32)) -> Option<(Shape, ShapeSlot)> {
        if !self.has_body {
            return None;
        }
        let paragraphs = match self.first_p {
            Some(start) => start..self.last_p_end,
            None => {
                let at = self.body_close?;
                at..at
            }
        };
        let prefix = if self.prefix.is_empty() && self.first_p.is_none() {
            "a:".to_string()
        } else {
            self.prefix
        };
        Some((
            Shape::new(self.paragraphs.join("\n"), anchor.0, anchor.1),
            ShapeSlot {
                paragraphs,
                prefix,
                para_props: self.para_props,
                run_props: self.run_props,
                end_props: self.end_props,
                breaks: self.breaks,
            },
        ))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AnchorField {
    None,
    Col,
    Row,
}

/// Collects the top-level text shapes of a drawing part.
///
/// Only `sp` elements directly under a cell anchor are considered; shapes
/// nested in groups and fallback content are ignored.
fn parse_drawing(xml: &str) -> Result<Vec<(Shape, ShapeSlot)>> {
    let mut reader = Reader::from_str(xml);
    let mut shapes = Vec::new();

    let mut in_anchor = false;
    let mut in_from = false;
    let mut anchor = (0u32, 0u32);
    let mut anchor_field = AnchorField::None;
    let mut group_depth = 0usize;
    let mut fallback_depth = 0usize;
    let mut shape: Option<ShapeState> = None;
    let mut text = TextBuf::default();

    loop {
        let event = reader.read_event()?;
        let end = reader.buffer_position() as usize;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                let name = e.local_name();
                match name.as_ref() {
                    b"Fallback" if !empty => fallback_depth += 1,
                    _ if fallback_depth > 0 => {}
                    b"twoCellAnchor" | b"oneCellAnchor" if !empty => {
                        in_anchor = true;
                        anchor = (0, 0);
                    }
                    b"from" if in_anchor && shape.is_none() && !empty => in_from = true,
                    b"col" if in_from && !empty => {
                        anchor_field = AnchorField::Col;
                        text.clear();
                    }
                    b"row" if in_from && !empty => {
                        anchor_field = AnchorField::Row;
                        text.clear();
                    }
                    b"grpSp" if !empty => group_depth += 1,
                    b"sp" if in_anchor && group_depth == 0 && shape.is_none() && !empty => {
                        shape = Some(ShapeState::default());
                    }
                    _ => {
                        if let Some(state) = shape.as_mut() {
                            on_shape_open(state, name.as_ref(), e, empty, xml, end);
                        }
                    }
                }
            }
            Event::Text(ref e) => {
                if anchor_field != AnchorField::None || shape.as_ref().is_some_and(|s| s.in_t) {
                    text.push_text(e);
                }
            }
            Event::GeneralRef(ref e) if shape.as_ref().is_some_and(|s| s.in_t) => text.push_ref(e),
            Event::CData(ref e) if shape.as_ref().is_some_and(|s| s.in_t) => text.push_cdata(e),
            Event::End(ref e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"Fallback" => fallback_depth = fallback_depth.saturating_sub(1),
                    _ if fallback_depth > 0 => {}
                    b"col" if anchor_field == AnchorField::Col => {
                        anchor.1 = text.take()?.trim().parse().unwrap_or(0);
                        anchor_field = AnchorField::None;
                    }
                    b"row" if anchor_field == AnchorField::Row => {
                        anchor.0 = text.take()?.trim().parse().unwrap_or(0);
                        anchor_field = AnchorField::None;
                    }
                    b"from" => in_from = false,
                    b"grpSp" => group_depth = group_depth.saturating_sub(1),
                    b"twoCellAnchor" | b"oneCellAnchor" => in_anchor = false,
                    b"sp" if group_depth == 0 && shape.is_some() => {
                        if let Some(found) = shape.take().and_then(|s| s.finish(anchor)) {
                            shapes.push(found);
                        }
                    }
                    _ => {
                        if let Some(state) = shape.as_mut() {
                            on_shape_close(state, name.as_ref(), &mut text, xml, end)?;
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(shapes)
}

fn on_shape_open(state: &mut ShapeState, name: &[u8], e: &BytesStart<'_>, empty: bool, xml: &str, end: usize) {
    let start = tag_start(xml, end);
    match name {
        b"txBody" if !empty => {
            state.has_body = true;
            state.in_body = true;
        }
        b"p" if state.in_body => {
            match state.first_p {
                None => {
                    state.first_p = Some(start);
                    state.prefix = prefix_of(e);
                }
                Some(_) => state.breaks.push(false),
            }
            if empty {
                state.paragraphs.push(String::new());
                state.last_p_end = end;
            } else {
                state.in_paragraph = true;
                state.paragraph.clear();
            }
        }
        b"pPr" if state.in_paragraph => state.begin_capture(Captured::ParaProps, xml, start, end, empty),
        b"endParaRPr" if state.in_paragraph => state.begin_capture(Captured::EndProps, xml, start, end, empty),
        b"r" if state.in_paragraph && !empty => state.in_run = true,
        b"rPr" if state.in_run => state.begin_capture(Captured::RunProps, xml, start, end, empty),
        b"t" if state.in_paragraph && !empty => state.in_t = true,
        b"br" if state.in_paragraph => {
            state.paragraph.push('\n');
            state.breaks.push(true);
        }
        _ => {}
    }
}

fn on_shape_close(state: &mut ShapeState, name: &[u8], text: &mut TextBuf, xml: &str, end: usize) -> Result<()> {
    match name {
        b"t" if state.in_t => {
            state.paragraph.push_str(&text.take()?);
            state.in_t = false;
        }
        b"pPr" | b"rPr" | b"endParaRPr" => state.end_capture(name, xml, end),
        b"r" => state.in_run = false,
        b"p" if state.in_paragraph => {
            state.paragraphs.push(std::mem::take(&mut state.paragraph));
            state.last_p_end = end;
            state.in_paragraph = false;
        }
        b"txBody" => {
            state.body_close = Some(tag_start(xml, end));
            state.in_body = false;
        }
        _ => {}
    }
    Ok(())
}
