//! Record parser
//!
//! One raw JSON record plus its kind tag in, one typed record out. Missing
//! optional fields become `None`; field order and unknown fields are
//! irrelevant.

use crate::error::ParseError;
use crate::models::{LogEvent, RawRecord, RecordKind, SongRecord};
use serde_json::Value;

/// Parse one line of line-delimited JSON
pub fn parse_line(kind: RecordKind, line: &str) -> Result<RawRecord, ParseError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    parse_record(kind, value)
}

/// Parse an already-decoded JSON value
pub fn parse_record(kind: RecordKind, value: Value) -> Result<RawRecord, ParseError> {
    if !value.is_object() {
        return Err(ParseError::NotAnObject(json_type_name(&value)));
    }

    match kind {
        RecordKind::SongMetadata => {
            let song: SongRecord = serde_json::from_value(value).map_err(|e| ParseError::Record {
                kind,
                message: e.to_string(),
            })?;
            if !(song.duration.is_finite() && song.duration > 0.0) {
                return Err(ParseError::InvalidValue {
                    field: "duration",
                    message: format!("must be a positive number of seconds, got {}", song.duration),
                });
            }
            Ok(RawRecord::Song(song))
        }
        RecordKind::LogEvent => {
            let event: LogEvent = serde_json::from_value(value).map_err(|e| ParseError::Record {
                kind,
                message: e.to_string(),
            })?;
            Ok(RawRecord::Event(event))
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
