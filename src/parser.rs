//! Wire-protocol line parser
//!
//! One metric per line: `key:value|type[|@flag]`. Parsing is pure; a bad
//! line yields a `ParseError` and must never affect sibling lines in the
//! same packet or connection. Callers log and count skipped lines.

use crate::metric::{MetricKind, Sample};

/// Error type for a single rejected wire line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `:` separator, so no value field
    MissingValue,
    /// No `|` separator after the value, so no type tag
    MissingKind,
    /// Key is empty or contains a character outside `[A-Za-z0-9\-_.]`
    InvalidKey,
    /// Value is not a decimal integer or float
    InvalidValue,
    /// Flag is missing its `@`, is not numeric, or is negative
    InvalidFlag,
    /// Type tag is not one of `c`, `ms`, `kv`
    UnknownKind(String),
    /// More fields than the grammar allows
    TrailingField,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingValue => write!(f, "missing value field"),
            ParseError::MissingKind => write!(f, "missing type tag"),
            ParseError::InvalidKey => write!(f, "invalid metric key"),
            ParseError::InvalidValue => write!(f, "invalid metric value"),
            ParseError::InvalidFlag => write!(f, "invalid metric flag"),
            ParseError::UnknownKind(tag) => write!(f, "unknown type tag '{}'", tag),
            ParseError::TrailingField => write!(f, "unexpected trailing field"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse one wire line into a typed sample.
pub fn parse_line(line: &str) -> Result<Sample, ParseError> {
    let (key, rest) = line.split_once(':').ok_or(ParseError::MissingValue)?;
    if !is_valid_key(key) {
        return Err(ParseError::InvalidKey);
    }

    let mut fields = rest.split('|');
    let value_field = fields.next().unwrap_or("");
    let kind_field = fields.next().ok_or(ParseError::MissingKind)?;
    let flag_field = fields.next();
    if fields.next().is_some() {
        return Err(ParseError::TrailingField);
    }

    let value = parse_number(value_field).ok_or(ParseError::InvalidValue)?;

    let kind = match kind_field {
        "c" => MetricKind::Counter,
        "ms" => MetricKind::Timer,
        "kv" => MetricKind::KeyValue,
        other => return Err(ParseError::UnknownKind(other.to_string())),
    };

    let flag = match flag_field {
        None => None,
        Some(raw) => {
            let digits = raw.strip_prefix('@').ok_or(ParseError::InvalidFlag)?;
            let parsed = parse_number(digits).ok_or(ParseError::InvalidFlag)?;
            if parsed < 0.0 {
                return Err(ParseError::InvalidFlag);
            }
            Some(parsed)
        }
    };

    Ok(Sample {
        key: key.to_string(),
        value,
        kind,
        flag,
    })
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

// Floats must carry a `.`; everything else has to be a plain signed integer.
fn parse_number(field: &str) -> Option<f64> {
    if field.contains('.') {
        field.parse::<f64>().ok().filter(|v| v.is_finite())
    } else {
        field.parse::<i64>().ok().map(|v| v as f64)
    }
}
