//! Test-only builder for small `.xlsx` packages with cells and text boxes.

use crate::position::cell_reference;
use quick_xml::escape::escape;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

enum FixtureCell {
    Text(String),
    Number(f64),
    Boolean(bool),
    Formula(String, String),
}

pub(crate) struct FixtureSheet {
    name: String,
    cells: Vec<(u32, u32, FixtureCell)>,
    shapes: Vec<(u32, u32, String)>,
}

impl FixtureSheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: Vec::new(),
            shapes: Vec::new(),
        }
    }

    pub(crate) fn text(mut self, row: u32, col: u32, text: &str) -> Self {
        self.cells.push((row, col, FixtureCell::Text(text.to_string())));
        self
    }

    pub(crate) fn number(mut self, row: u32, col: u32, value: f64) -> Self {
        self.cells.push((row, col, FixtureCell::Number(value)));
        self
    }

    pub(crate) fn boolean(mut self, row: u32, col: u32, value: bool) -> Self {
        self.cells.push((row, col, FixtureCell::Boolean(value)));
        self
    }

    pub(crate) fn formula(mut self, row: u32, col: u32, formula: &str, cached: &str) -> Self {
        self.cells
            .push((row, col, FixtureCell::Formula(formula.to_string(), cached.to_string())));
        self
    }

    /// A text box with one plain paragraph per line of `text`.
    pub(crate) fn shape(self, row: u32, col: u32, text: &str) -> Self {
        let paragraphs = text
            .split('\n')
            .map(|line| {
                format!(
                    "<a:p><a:r><a:rPr lang=\"en-US\" sz=\"1100\"/><a:t>{}</a:t></a:r></a:p>",
                    escape(line)
                )
            })
            .collect::<String>();
        self.shape_xml(row, col, &paragraphs)
    }

    /// A text box whose `txBody` paragraphs are given verbatim.
    pub(crate) fn shape_xml(mut self, row: u32, col: u32, paragraphs: &str) -> Self {
        self.shapes.push((row, col, paragraphs.to_string()));
        self
    }

    fn has_formula(&self) -> bool {
        self.cells
            .iter()
            .any(|(_, _, c)| matches!(c, FixtureCell::Formula(..)))
    }

    fn worksheet_xml(&self, shared: &mut Vec<String>) -> String {
        let mut cells: Vec<&(u32, u32, FixtureCell)> = self.cells.iter().collect();
        cells.sort_by_key(|(r, c, _)| (*r, *c));

        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetData>"#,
        );
        let mut current_row: Option<u32> = None;
        for (row, col, cell) in cells {
            if current_row != Some(*row) {
                if current_row.is_some() {
                    xml.push_str("</row>");
                }
                xml.push_str(&format!("<row r=\"{}\">", row + 1));
                current_row = Some(*row);
            }
            let r = cell_reference(*row, *col);
            match cell {
                FixtureCell::Text(text) => {
                    shared.push(text.clone());
                    xml.push_str(&format!("<c r=\"{r}\" t=\"s\"><v>{}</v></c>", shared.len() - 1));
                }
                FixtureCell::Number(n) => xml.push_str(&format!("<c r=\"{r}\"><v>{n}</v></c>")),
                FixtureCell::Boolean(b) => {
                    xml.push_str(&format!("<c r=\"{r}\" t=\"b\"><v>{}</v></c>", u8::from(*b)))
                }
                FixtureCell::Formula(f, cached) => xml.push_str(&format!(
                    "<c r=\"{r}\" t=\"str\"><f>{}</f><v>{}</v></c>",
                    escape(f),
                    escape(cached)
                )),
            }
        }
        if current_row.is_some() {
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");
        if !self.shapes.is_empty() {
            xml.push_str("<drawing r:id=\"rId1\"/>");
        }
        xml.push_str("</worksheet>");
        xml
    }

    fn drawing_xml(&self) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
        );
        for (i, (row, col, paragraphs)) in self.shapes.iter().enumerate() {
            xml.push_str(&format!(
                "<xdr:twoCellAnchor><xdr:from><xdr:col>{col}</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>\
<xdr:to><xdr:col>{}</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to>\
<xdr:sp><xdr:nvSpPr><xdr:cNvPr id=\"{}\" name=\"TextBox {}\"/><xdr:cNvSpPr txBox=\"1\"/></xdr:nvSpPr>\
<xdr:spPr><a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></xdr:spPr><xdr:txBody><a:bodyPr/><a:lstStyle/>",
                col + 3,
                row + 2,
                i + 2,
                i + 1
            ));
            xml.push_str(paragraphs);
            xml.push_str("</xdr:txBody></xdr:sp><xdr:clientData/></xdr:twoCellAnchor>");
        }
        xml.push_str("</xdr:wsDr>");
        xml
    }
}

/// A workbook assembled from [`FixtureSheet`]s. Text cells go through the
/// shared string table; formula cells also produce a calculation chain.
pub(crate) struct Fixture {
    sheets: Vec<FixtureSheet>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self { sheets: Vec::new() }
    }

    pub(crate) fn sheet(mut self, sheet: FixtureSheet) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub(crate) fn write(&self, path: &Path) {
        let mut shared = Vec::new();
        let mut parts: Vec<(String, String)> = Vec::new();
        let mut overrides = String::new();
        let mut sheet_rels = String::new();
        let mut sheet_entries = String::new();
        let with_formulas = self.sheets.iter().any(FixtureSheet::has_formula);
        let mut calc_cells = String::new();

        for (i, sheet) in self.sheets.iter().enumerate() {
            let n = i + 1;
            parts.push((format!("xl/worksheets/sheet{n}.xml"), sheet.worksheet_xml(&mut shared)));
            overrides.push_str(&format!(
                "<Override PartName=\"/xl/worksheets/sheet{n}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>"
            ));
            sheet_rels.push_str(&format!(
                "<Relationship Id=\"rId{n}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{n}.xml\"/>"
            ));
            sheet_entries.push_str(&format!(
                "<sheet name=\"{}\" sheetId=\"{n}\" r:id=\"rId{n}\"/>",
                escape(&sheet.name)
            ));

            for (row, col, cell) in &sheet.cells {
                if matches!(cell, FixtureCell::Formula(..)) {
                    calc_cells.push_str(&format!("<c r=\"{}\" i=\"{n}\"/>", cell_reference(*row, *col)));
                }
            }

            if !sheet.shapes.is_empty() {
                parts.push((format!("xl/drawings/drawing{n}.xml"), sheet.drawing_xml()));
                parts.push((
                    format!("xl/worksheets/_rels/sheet{n}.xml.rels"),
                    format!(
                        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"><Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing\" Target=\"../drawings/drawing{n}.xml\"/></Relationships>"
                    ),
                ));
                overrides.push_str(&format!(
                    "<Override PartName=\"/xl/drawings/drawing{n}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.drawing+xml\"/>"
                ));
            }
        }

        let count = self.sheets.len();
        sheet_rels.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings\" Target=\"sharedStrings.xml\"/>",
            count + 1
        ));
        overrides.push_str("<Override PartName=\"/xl/sharedStrings.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml\"/>");
        if with_formulas {
            sheet_rels.push_str(&format!(
                "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain\" Target=\"calcChain.xml\"/>",
                count + 2
            ));
            overrides.push_str("<Override PartName=\"/xl/calcChain.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml\"/>");
            parts.push((
                "xl/calcChain.xml".to_string(),
                format!("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<calcChain xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">{calc_cells}</calcChain>"),
            ));
        }

        let shared_xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<sst xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" count=\"{0}\" uniqueCount=\"{0}\">{1}</sst>",
            shared.len(),
            shared
                .iter()
                .map(|s| format!("<si><t xml:space=\"preserve\">{}</t></si>", escape(s)))
                .collect::<String>()
        );

        let mut head: Vec<(String, String)> = vec![
            (
                "[Content_Types].xml".to_string(),
                format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"><Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/><Default Extension=\"xml\" ContentType=\"application/xml\"/><Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>{overrides}</Types>"
                ),
            ),
            (
                "_rels/.rels".to_string(),
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"><Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/></Relationships>".to_string(),
            ),
            (
                "xl/workbook.xml".to_string(),
                format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"><sheets>{sheet_entries}</sheets></workbook>"
                ),
            ),
            (
                "xl/_rels/workbook.xml.rels".to_string(),
                format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{sheet_rels}</Relationships>"
                ),
            ),
            ("xl/sharedStrings.xml".to_string(), shared_xml),
        ];
        head.append(&mut parts);

        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in &head {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}

const SECTOR: usize = 512;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const NO_STREAM: u32 = 0xFFFF_FFFF;
/// The workbook stream is padded to this size so it lives in regular
/// sectors instead of the mini stream.
const XLS_STREAM_LEN: usize = 4096;

fn biff_record(out: &mut Vec<u8>, typ: u16, data: &[u8]) {
    out.extend_from_slice(&typ.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

fn cell_header(row: u32, col: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&(row as u16).to_le_bytes());
    data.extend_from_slice(&(col as u16).to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data
}

fn biff_label(row: u32, col: u32, text: &str) -> Vec<u8> {
    let mut data = cell_header(row, col);
    data.extend_from_slice(&(text.len() as u16).to_le_bytes());
    data.push(0);
    data.extend_from_slice(text.as_bytes());
    data
}

impl FixtureSheet {
    /// BIFF8 cell records followed by EOF. Formula cells are stored as their
    /// cached text; shapes are left out.
    fn biff_records(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (row, col, cell) in &self.cells {
            match cell {
                FixtureCell::Text(text) => biff_record(&mut out, 0x0204, &biff_label(*row, *col, text)),
                FixtureCell::Formula(_, cached) => {
                    biff_record(&mut out, 0x0204, &biff_label(*row, *col, cached))
                }
                FixtureCell::Number(n) => {
                    let mut data = cell_header(*row, *col);
                    data.extend_from_slice(&n.to_le_bytes());
                    biff_record(&mut out, 0x0203, &data);
                }
                FixtureCell::Boolean(b) => {
                    let mut data = cell_header(*row, *col);
                    data.extend_from_slice(&[u8::from(*b), 0]);
                    biff_record(&mut out, 0x0205, &data);
                }
            }
        }
        biff_record(&mut out, 0x000A, &[]);
        out
    }
}

impl Fixture {
    /// Writes the sheets as a legacy `.xls`: a BIFF8 workbook stream inside a
    /// version 3 compound file. Text must be ASCII.
    pub(crate) fn write_xls(&self, path: &Path) {
        let globals_len: usize = self.sheets.iter().map(|s| 4 + 8 + s.name.len()).sum::<usize>() + 4;
        let bodies: Vec<Vec<u8>> = self.sheets.iter().map(FixtureSheet::biff_records).collect();

        let mut stream = Vec::new();
        let mut pos = globals_len;
        for (sheet, body) in self.sheets.iter().zip(&bodies) {
            let mut data = Vec::new();
            data.extend_from_slice(&(pos as u32).to_le_bytes());
            data.extend_from_slice(&[0, 0, sheet.name.len() as u8, 0]);
            data.extend_from_slice(sheet.name.as_bytes());
            biff_record(&mut stream, 0x0085, &data);
            pos += body.len();
        }
        biff_record(&mut stream, 0x000A, &[]);
        for body in &bodies {
            stream.extend_from_slice(body);
        }
        assert!(stream.len() <= XLS_STREAM_LEN, "fixture too large for one workbook stream");
        stream.resize(XLS_STREAM_LEN, 0);

        let mut header = vec![0u8; SECTOR];
        header[..8].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
        let mut put = |at: usize, bytes: &[u8]| header[at..at + bytes.len()].copy_from_slice(bytes);
        put(24, &0x003Eu16.to_le_bytes());
        put(26, &3u16.to_le_bytes());
        put(28, &0xFFFEu16.to_le_bytes());
        put(30, &9u16.to_le_bytes());
        put(32, &6u16.to_le_bytes());
        put(44, &1u32.to_le_bytes());
        put(48, &1u32.to_le_bytes());
        put(56, &4096u32.to_le_bytes());
        put(60, &END_OF_CHAIN.to_le_bytes());
        put(68, &END_OF_CHAIN.to_le_bytes());
        put(76, &0u32.to_le_bytes());
        for at in (80..SECTOR).step_by(4) {
            put(at, &NO_STREAM.to_le_bytes());
        }

        // Sector 0 is the FAT, sector 1 the directory, then the stream.
        let stream_sectors = XLS_STREAM_LEN / SECTOR;
        let mut fat = vec![NO_STREAM; SECTOR / 4];
        fat[0] = 0xFFFF_FFFD;
        fat[1] = END_OF_CHAIN;
        for i in 0..stream_sectors {
            let sector = 2 + i;
            fat[sector] = if i + 1 == stream_sectors {
                END_OF_CHAIN
            } else {
                (sector + 1) as u32
            };
        }

        let mut directory = Vec::with_capacity(SECTOR);
        directory.extend(directory_entry("Root Entry", 5, 1, END_OF_CHAIN, 0));
        directory.extend(directory_entry("Workbook", 2, NO_STREAM, 2, XLS_STREAM_LEN as u32));
        directory.extend(directory_entry("", 0, NO_STREAM, 0, 0));
        directory.extend(directory_entry("", 0, NO_STREAM, 0, 0));

        let mut file = File::create(path).unwrap();
        file.write_all(&header).unwrap();
        for entry in fat {
            file.write_all(&entry.to_le_bytes()).unwrap();
        }
        file.write_all(&directory).unwrap();
        file.write_all(&stream).unwrap();
    }
}

fn directory_entry(name: &str, kind: u8, child: u32, start: u32, size: u32) -> Vec<u8> {
    let mut entry = vec![0u8; 128];
    let units: Vec<u16> = name.encode_utf16().collect();
    for (i, unit) in units.iter().enumerate() {
        entry[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    let name_len = if name.is_empty() { 0 } else { (units.len() as u16 + 1) * 2 };
    entry[64..66].copy_from_slice(&name_len.to_le_bytes());
    entry[66] = kind;
    entry[67] = 1;
    entry[68..72].copy_from_slice(&NO_STREAM.to_le_bytes());
    entry[72..76].copy_from_slice(&NO_STREAM.to_le_bytes());
    entry[76..80].copy_from_slice(&child.to_le_bytes());
    entry[116..120].copy_from_slice(&start.to_le_bytes());
    entry[120..124].copy_from_slice(&size.to_le_bytes());
    entry
}
