//! Small helpers shared by the package readers and writers.

use crate::errors::Result;
use quick_xml::events::BytesStart;
use quick_xml::escape::{escape, unescape};
use std::ops::Range;

/// Returns the unescaped value of the attribute whose *local* name is `name`.
///
/// Prefixes are ignored, so `b"id"` finds `r:id`.
pub(crate) fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for a in e.attributes().flatten() {
        if a.key.local_name().as_ref() == name {
            let raw = String::from_utf8_lossy(&a.value);
            return Ok(Some(unescape(&raw)?.into_owned()));
        }
    }
    Ok(None)
}

/// Returns the namespace prefix of an element including the colon (`"a:"`),
/// or an empty string for unprefixed elements.
pub(crate) fn prefix_of(e: &BytesStart<'_>) -> String {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    match name.find(':') {
        Some(i) => name[..=i].to_string(),
        None => String::new(),
    }
}

/// Accumulates the raw (still escaped) character data of an element.
///
/// Entity references arrive as separate events; they are put back in their
/// escaped form so the whole run can be unescaped at once.
#[derive(Default)]
pub(crate) struct TextBuf {
    raw: String,
}

impl TextBuf {
    pub(crate) fn push_text(&mut self, bytes: &[u8]) {
        self.raw.push_str(&String::from_utf8_lossy(bytes));
    }

    pub(crate) fn push_ref(&mut self, name: &[u8]) {
        self.raw.push('&');
        self.raw.push_str(&String::from_utf8_lossy(name));
        self.raw.push(';');
    }

    pub(crate) fn push_cdata(&mut self, bytes: &[u8]) {
        self.raw.push_str(&escape(String::from_utf8_lossy(bytes)));
    }

    pub(crate) fn clear(&mut self) {
        self.raw.clear();
    }

    /// Unescapes and returns the collected text, leaving the buffer empty.
    pub(crate) fn take(&mut self) -> Result<String> {
        let text = unescape(&self.raw)?.into_owned();
        self.raw.clear();
        Ok(text)
    }
}

/// Replaces byte ranges of `source`. Ranges must not overlap.
pub(crate) fn splice(source: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(source.len() + 256);
    let mut cursor = 0;
    for (range, replacement) in edits {
        out.push_str(&source[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&source[cursor..]);
    out
}
