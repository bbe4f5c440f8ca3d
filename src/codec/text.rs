//! Text cell codec.
//!
//! Rules for rendering a cell:
//!
//! | Type | Text |
//! |------|------|
//! | null (any type) | the null token, `null` by default |
//! | `int64`, `uint8`, `int8` | decimal |
//! | `double`, `float` | shortest round-trip decimal, NaN as the NaN token |
//! | `bool` | `true` / `false` |
//! | `string` | `'...'` with `\` and `'` backslash-escaped |
//! | `binary` | lowercase hex |
//! | other | the registered stringifier's output |
//!
//! Only `\` and `'` are escaped, so an attribute delimiter inside a quoted
//! string travels as is and rows are split with [`TextCodec::split_row`],
//! which keeps quoted delimiters inside their cell. Rows are framed by lines,
//! so no cell may contain the line delimiter, and text emitted without quotes
//! (unquoted strings, stringifier output) may not contain either delimiter.

use std::fmt::Write as _;

use super::stringify::Stringifiers;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{DataType, Value};

const FORMAT_NAME: &str = "text";

/// Delimiters and sentinel tokens of the text protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    pub attribute_delimiter: char,
    pub line_delimiter: char,
    pub null_token: String,
    pub nan_token: String,
    pub quote_strings: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            attribute_delimiter: '\t',
            line_delimiter: '\n',
            null_token: "null".to_string(),
            nan_token: "nan".to_string(),
            quote_strings: true,
        }
    }
}

/// Converts single values to and from text cells.
#[derive(Debug, Clone, Default)]
pub struct TextCodec {
    options: TextOptions,
    stringifiers: Stringifiers,
}

impl TextCodec {
    pub fn new(options: TextOptions, stringifiers: Stringifiers) -> Self {
        Self {
            options,
            stringifiers,
        }
    }

    pub fn options(&self) -> &TextOptions {
        &self.options
    }

    /// Fails if values of `data_type` cannot be rendered as text.
    pub fn check_encodable(&self, data_type: &DataType) -> ExchangeResult<()> {
        match data_type {
            DataType::Other(name) if !self.stringifiers.contains(name) => {
                Err(ExchangeError::unsupported(data_type, FORMAT_NAME))
            }
            _ => Ok(()),
        }
    }

    /// Fails if cells of `data_type` cannot be parsed from text.
    pub fn check_decodable(&self, data_type: &DataType) -> ExchangeResult<()> {
        if data_type.is_native() {
            Ok(())
        } else {
            Err(ExchangeError::unsupported(data_type, FORMAT_NAME))
        }
    }

    /// Render `value` as a cell.
    pub fn encode_text(&self, value: &Value) -> ExchangeResult<String> {
        let mut out = String::new();
        self.encode_cell(value, &mut out)?;
        Ok(out)
    }

    /// Append the cell text of `value` to `out`.
    pub fn encode_cell(&self, value: &Value, out: &mut String) -> ExchangeResult<()> {
        match value {
            Value::Null => out.push_str(&self.options.null_token),
            Value::Int64(v) => push_display(out, v),
            Value::UInt8(v) => push_display(out, v),
            Value::Int8(v) => push_display(out, v),
            Value::Float64(v) => {
                if v.is_nan() {
                    out.push_str(&self.options.nan_token);
                } else {
                    out.push_str(ryu::Buffer::new().format(*v));
                }
            }
            Value::Float32(v) => {
                if v.is_nan() {
                    out.push_str(&self.options.nan_token);
                } else {
                    out.push_str(ryu::Buffer::new().format(*v));
                }
            }
            Value::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Value::Utf8(s) => {
                if self.options.quote_strings {
                    self.check_framed(s, &DataType::Utf8, false)?;
                    push_quoted(s, out);
                } else {
                    self.check_framed(s, &DataType::Utf8, true)?;
                    out.push_str(s);
                }
            }
            Value::Binary(bytes) => {
                for b in bytes {
                    push_display(out, format_args!("{:02x}", b));
                }
            }
            Value::Other(other) => {
                let data_type = DataType::Other(other.type_name.clone());
                let stringify = self
                    .stringifiers
                    .get(&other.type_name)
                    .ok_or_else(|| ExchangeError::unsupported(&data_type, FORMAT_NAME))?;
                let text = stringify(other);
                self.check_framed(&text, &data_type, true)?;
                out.push_str(&text);
            }
        }
        Ok(())
    }

    /// Fails if `text` holds the line delimiter, or with `bare` set, the
    /// attribute delimiter.
    fn check_framed(&self, text: &str, data_type: &DataType, bare: bool) -> ExchangeResult<()> {
        let found = text.chars().find(|c| {
            *c == self.options.line_delimiter || (bare && *c == self.options.attribute_delimiter)
        });
        match found {
            Some(c) => Err(ExchangeError::invalid_cell(
                0,
                0,
                text,
                data_type,
                format!("contains the delimiter {:?}", c),
            )),
            None => Ok(()),
        }
    }

    /// Split a row into cells on the attribute delimiter. A delimiter inside
    /// a quoted cell belongs to that cell.
    pub fn split_row<'a>(&self, line: &'a str) -> Vec<&'a str> {
        let delimiter = self.options.attribute_delimiter;
        let mut cells = Vec::new();
        let mut start = 0;
        let mut quoted = false;
        let mut escaped = false;
        let mut cell_start = true;
        for (i, c) in line.char_indices() {
            if quoted {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '\'' {
                    quoted = false;
                }
                continue;
            }
            if c == delimiter {
                cells.push(&line[start..i]);
                start = i + c.len_utf8();
                cell_start = true;
                continue;
            }
            quoted = cell_start && c == '\'';
            cell_start = false;
        }
        cells.push(&line[start..]);
        cells
    }

    /// Parse a cell under `data_type`.
    ///
    /// Errors carry row and column 0; callers that know the cell's position
    /// relocate them with [`ExchangeError::at_cell`].
    pub fn decode_text(&self, cell: &str, data_type: &DataType) -> ExchangeResult<Value> {
        if cell == self.options.null_token {
            return Ok(Value::Null);
        }
        let bad = |reason: &dyn ToString| ExchangeError::invalid_cell(0, 0, cell, data_type, reason.to_string());
        let trimmed = cell.trim();
        let value = match data_type {
            DataType::Int64 => Value::Int64(trimmed.parse().map_err(|e| bad(&e))?),
            DataType::UInt8 => Value::UInt8(trimmed.parse().map_err(|e| bad(&e))?),
            DataType::Int8 => Value::Int8(trimmed.parse().map_err(|e| bad(&e))?),
            DataType::Float64 => {
                if trimmed == self.options.nan_token {
                    Value::Float64(f64::NAN)
                } else {
                    Value::Float64(trimmed.parse().map_err(|e| bad(&e))?)
                }
            }
            DataType::Float32 => {
                if trimmed == self.options.nan_token {
                    Value::Float32(f32::NAN)
                } else {
                    Value::Float32(trimmed.parse().map_err(|e| bad(&e))?)
                }
            }
            DataType::Bool => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Value::Bool(true)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Value::Bool(false)
                } else {
                    return Err(bad(&"expected true or false"));
                }
            }
            DataType::Utf8 => {
                if cell.len() >= 2 && cell.starts_with('\'') && cell.ends_with('\'') {
                    Value::Utf8(unescape(&cell[1..cell.len() - 1]).map_err(|e| bad(&e))?)
                } else {
                    Value::Utf8(cell.to_string())
                }
            }
            DataType::Binary => Value::Binary(decode_hex(trimmed).map_err(|e| bad(&e))?),
            DataType::Other(_) => return Err(ExchangeError::unsupported(data_type, FORMAT_NAME)),
        };
        Ok(value)
    }
}

fn push_display(out: &mut String, value: impl std::fmt::Display) {
    // Writing to a String cannot fail.
    let _ = write!(out, "{}", value);
}

fn push_quoted(s: &str, out: &mut String) {
    out.push('\'');
    for c in s.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
}

fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(escaped) => out.push(escaped),
            None => return Err("dangling backslash".to_string()),
        }
    }
    Ok(out)
}

fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    text.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| format!("invalid hex digits {:?}", String::from_utf8_lossy(pair)))
        })
        .collect()
}
