//! Fixed-width field formatting and parsing
//!
//! Records are built left to right with [`RecordWriter`] and read back by
//! offset with [`RecordReader`]. Both work in characters; every encoding the
//! codec supports is single-byte, so character offsets equal byte offsets.

use super::codec::RecordError;

/// Every record is exactly this wide
pub const RECORD_LEN: usize = 80;

/// Width of the leading record-type slot
pub const TYPE_LEN: usize = 8;

/// Fractional bits of the simulation's fixed-point coordinates
pub const FRACBITS: u32 = 16;

/// Fixed-point world coordinate to whole map units (floors toward -inf)
pub fn to_map_units(raw: i32) -> i32 {
    raw >> FRACBITS
}

/// Whole map units back to fixed point; sub-unit precision is gone
pub fn from_map_units(units: i32) -> i32 {
    units.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) << FRACBITS
}

fn max_digits(digits: usize) -> i64 {
    10i64.saturating_pow(digits as u32) - 1
}

/// Zero-padded unsigned decimal, clamped to what `width` digits can hold
pub fn unsigned(value: i64, width: usize) -> String {
    let clamped = value.clamp(0, max_digits(width));
    format!("{clamped:0width$}")
}

/// Explicit sign plus `width - 1` zero-padded digits, clamped to fit
pub fn signed(value: i64, width: usize) -> String {
    let limit = max_digits(width.saturating_sub(1));
    let clamped = value.clamp(-limit, limit);
    format!("{clamped:+0width$}")
}

/// Sign only when negative, otherwise `width` digits (COMMAND value field)
pub fn optionally_signed(value: i64, width: usize) -> String {
    if value < 0 {
        signed(value, width)
    } else {
        unsigned(value, width)
    }
}

/// Left-justified text, space-padded or truncated to `width`
pub fn text(value: &str, width: usize) -> String {
    let mut field: String = value.chars().take(width).collect();
    let len = field.chars().count();
    field.extend(std::iter::repeat(' ').take(width - len));
    field
}

/// Sequential field builder for one record
pub struct RecordWriter {
    buf: String,
    len: usize,
}

impl RecordWriter {
    /// Start a record with its type tag in the leading slot
    pub fn new(tag: &str) -> Self {
        let mut writer = Self {
            buf: String::with_capacity(RECORD_LEN),
            len: 0,
        };
        writer.push(&text(tag, TYPE_LEN));
        writer
    }

    /// Append a pre-formatted field
    pub fn push(&mut self, field: &str) -> &mut Self {
        self.buf.push_str(field);
        self.len += field.chars().count();
        self
    }

    /// Pad with filler to the full record width
    pub fn finish(mut self) -> String {
        debug_assert!(self.len <= RECORD_LEN, "record overflow: {}", self.len);
        if self.len < RECORD_LEN {
            self.buf
                .extend(std::iter::repeat(' ').take(RECORD_LEN - self.len));
        }
        self.buf
    }
}

/// Offset-based field access over one record, right-padded to full width
pub struct RecordReader {
    chars: Vec<char>,
}

impl RecordReader {
    pub fn new(record: &str) -> Self {
        let mut chars: Vec<char> = record
            .trim_end_matches(['\r', '\n'])
            .chars()
            .take(RECORD_LEN)
            .collect();
        chars.resize(RECORD_LEN, ' ');
        Self { chars }
    }

    /// Raw field contents, padding included
    pub fn raw(&self, start: usize, width: usize) -> String {
        self.chars[start..start + width].iter().collect()
    }

    /// Field contents with surrounding blanks removed
    pub fn text(&self, start: usize, width: usize) -> String {
        self.raw(start, width).trim().to_string()
    }

    pub fn tag(&self) -> String {
        self.text(0, TYPE_LEN)
    }

    /// Numeric field; blanks or non-digits are a `FieldParse` error
    pub fn number(
        &self,
        name: &'static str,
        start: usize,
        width: usize,
    ) -> Result<i64, RecordError> {
        let raw = self.raw(start, width);
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RecordError::FieldParse { field: name, raw });
        }
        trimmed
            .parse::<i64>()
            .map_err(|_| RecordError::FieldParse { field: name, raw })
    }

    /// Numeric field that resolves to 0 when it cannot be parsed
    pub fn lenient(&self, name: &'static str, start: usize, width: usize) -> i64 {
        self.number(name, start, width).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Defaulting unparseable field to 0");
            0
        })
    }

    /// Lenient numeric field narrowed to `i32`
    pub fn lenient_i32(&self, name: &'static str, start: usize, width: usize) -> i32 {
        // Fields are at most 8 characters wide, so this never saturates
        i32::try_from(self.lenient(name, start, width)).unwrap_or(0)
    }
}
