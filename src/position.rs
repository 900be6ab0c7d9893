use thiserror::Error;

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RADIX: u32 = ALPHABET.len() as u32;

/// Highest column (exclusive) that `encode` can express with at most two letters.
pub const MAX_ENCODABLE_COLUMN: u32 = RADIX * (RADIX + 1);

/// Highest column count of an OOXML worksheet (`XFD`).
const MAX_SHEET_COLUMNS: u32 = 16_384;

/// Errors raised when converting between grid coordinates and `A1` labels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// The column needs three or more letters.
    #[error("cell at row {row}, column {col} is outside the encodable range")]
    OutOfRange { row: u32, col: u32 },

    /// The label is not of the form `<letters><digits>`.
    #[error("invalid cell label: {0:?}")]
    InvalidLabel(String),
}

/// Converts a zero-based `(row, col)` pair into an `A1`-style label.
///
/// Columns use one or two letters (`A`..`ZZ`); anything at or beyond
/// [`MAX_ENCODABLE_COLUMN`] is rejected. The row part is one-based.
///
/// ```
/// assert_eq!(sheetgrep::position::encode(11, 1).unwrap(), "B12");
/// ```
pub fn encode(row: u32, col: u32) -> Result<String, PositionError> {
    let offset = col / RADIX;
    let mut label = String::with_capacity(8);
    if offset == 0 {
        label.push(ALPHABET[col as usize] as char);
    } else if offset <= RADIX {
        label.push(ALPHABET[(offset - 1) as usize] as char);
        label.push(ALPHABET[(col - RADIX * offset) as usize] as char);
    } else {
        return Err(PositionError::OutOfRange { row, col });
    }
    label.push_str(&(u64::from(row) + 1).to_string());
    Ok(label)
}

/// Parses an `A1`-style label back into a zero-based `(row, col)` pair.
///
/// Accepts optional `$` absolute markers and up to three column letters, so it
/// also understands the references stored inside worksheet parts.
pub fn decode(label: &str) -> Result<(u32, u32), PositionError> {
    let invalid = || PositionError::InvalidLabel(label.to_string());
    let trimmed = label.trim().replace('$', "");
    let split = trimmed
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (letters, digits) = trimmed.split_at(split);
    if letters.is_empty() || letters.len() > 3 {
        return Err(invalid());
    }

    let mut col: u32 = 0;
    for ch in letters.chars() {
        let ch = ch.to_ascii_uppercase();
        if !ch.is_ascii_uppercase() {
            return Err(invalid());
        }
        col = col * RADIX + (ch as u32 - 'A' as u32 + 1);
    }
    let col = col - 1;
    if col >= MAX_SHEET_COLUMNS {
        return Err(invalid());
    }

    let row: u32 = digits.parse().map_err(|_| invalid())?;
    if row == 0 {
        return Err(invalid());
    }
    Ok((row - 1, col))
}

/// Worksheet cell reference for any column, e.g. `AAA1` for column 702.
///
/// Unlike [`encode`] this never fails; it is used when writing workbook parts,
/// not for reported positions.
pub fn cell_reference(row: u32, col: u32) -> String {
    let mut letters = Vec::with_capacity(3);
    let mut n = col + 1;
    while n > 0 {
        let rem = (n - 1) % RADIX;
        letters.push(ALPHABET[rem as usize]);
        n = (n - 1) / RADIX;
    }
    letters.reverse();
    let mut label = String::from_utf8_lossy(&letters).into_owned();
    label.push_str(&(u64::from(row) + 1).to_string());
    label
}
