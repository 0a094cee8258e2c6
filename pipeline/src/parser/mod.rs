//! Raw event loader with encoding and delimiter auto-detection.
//!
//! Reads the extracted event log (delimited text, a JSON array, or
//! newline-delimited JSON) into [`RawEvent`]s. Every input shape is first
//! turned into a JSON object per row so one set of field readers applies
//! to all of them.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::api::logs::log_warning;
use crate::config::InputFormat;
use crate::error::{LoadError, LoadResult};
use crate::models::{Gender, Level, RawEvent};

/// Columns the loader reads. Anything else (including a store's `_id`) is ignored.
pub const EVENT_COLUMNS: [&str; 13] = [
    "artist",
    "location",
    "song",
    "length",
    "userId",
    "firstName",
    "lastName",
    "gender",
    "level",
    "ts",
    "page",
    "sessionId",
    "userAgent",
];

/// Result of loading with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Loaded events, in input order
    pub events: Vec<RawEvent>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected delimiter (CSV input only)
    pub delimiter: Option<char>,
    /// Column headers (CSV) or the union of document keys (JSON)
    pub headers: Vec<String>,
}

/// Supplier of the raw event set for one run.
pub trait EventSource {
    fn load_events(&self) -> LoadResult<ParseResult>;
}

/// Raw events stored in a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    pub format: InputFormat,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: InputFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

impl EventSource for FileSource {
    fn load_events(&self) -> LoadResult<ParseResult> {
        parse_file_auto(&self.path, self.format)
    }
}

/// Raw events already held in memory (uploads).
#[derive(Debug, Clone)]
pub struct BytesSource<'a> {
    pub bytes: &'a [u8],
    pub format: InputFormat,
}

impl EventSource for BytesSource<'_> {
    fn load_events(&self) -> LoadResult<ParseResult> {
        parse_bytes_auto(self.bytes, self.format)
    }
}

// =============================================================================
// Encoding and delimiter detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        // Fallback: UTF-8 with lossy conversion
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the header line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

// =============================================================================
// Entry points
// =============================================================================

/// Load an event file with auto-detection of encoding (and delimiter for CSV).
pub fn parse_file_auto<P: AsRef<Path>>(path: P, format: InputFormat) -> LoadResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes, format)
}

/// Load event bytes with auto-detection of encoding (and delimiter for CSV).
pub fn parse_bytes_auto(bytes: &[u8], format: InputFormat) -> LoadResult<ParseResult> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(LoadError::EmptyInput);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let content = content.trim_start_matches('\u{feff}');

    let mut result = match format {
        InputFormat::Csv => {
            let delimiter = detect_delimiter(content);
            parse_csv_events(content, delimiter)?
        }
        InputFormat::Json => parse_json_events(content)?,
        InputFormat::Ndjson => parse_ndjson_events(content)?,
    };
    result.encoding = encoding;

    warn_missing_columns(&result.headers);
    Ok(result)
}

/// Parse delimited text with a header row into events.
pub fn parse_csv_events(content: &str, delimiter: char) -> LoadResult<ParseResult> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(1, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(LoadError::NoHeaders);
    }

    let mut events = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
            csv_error(line, e)
        })?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let mut doc = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            if !field.is_empty() {
                doc.insert(header.clone(), Value::String(field.to_string()));
            }
        }

        events.push(event_from_document(&doc, line)?);
    }

    Ok(ParseResult {
        events,
        encoding: "utf-8".to_string(),
        delimiter: Some(delimiter),
        headers,
    })
}

/// Parse a JSON array of event documents.
pub fn parse_json_events(content: &str) -> LoadResult<ParseResult> {
    let value: Value = serde_json::from_str(content).map_err(|e| LoadError::Json {
        line: e.line(),
        message: e.to_string(),
    })?;

    let docs = match value {
        Value::Array(items) => items,
        _ => {
            return Err(LoadError::Json {
                line: 1,
                message: "expected an array of event documents".to_string(),
            })
        }
    };

    let mut headers = Vec::new();
    let mut events = Vec::with_capacity(docs.len());
    for (idx, doc) in docs.iter().enumerate() {
        let obj = expect_object(doc, idx + 1)?;
        collect_keys(obj, &mut headers);
        events.push(event_from_document(obj, idx + 1)?);
    }

    Ok(ParseResult {
        events,
        encoding: "utf-8".to_string(),
        delimiter: None,
        headers,
    })
}

/// Parse newline-delimited JSON documents.
pub fn parse_ndjson_events(content: &str) -> LoadResult<ParseResult> {
    let mut headers = Vec::new();
    let mut events = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_num = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let doc: Value = serde_json::from_str(line).map_err(|e| LoadError::Json {
            line: line_num,
            message: e.to_string(),
        })?;
        let obj = expect_object(&doc, line_num)?;
        collect_keys(obj, &mut headers);
        events.push(event_from_document(obj, line_num)?);
    }

    Ok(ParseResult {
        events,
        encoding: "utf-8".to_string(),
        delimiter: None,
        headers,
    })
}

// =============================================================================
// Field readers
// =============================================================================

/// Build a [`RawEvent`] from one row document.
///
/// Absent keys, JSON `null` and empty strings are all nulls.
pub fn event_from_document(doc: &Map<String, Value>, line: usize) -> LoadResult<RawEvent> {
    let ts = read_integer(doc, "ts", line).map_err(|err| match err {
        LoadError::InvalidField { value, .. } => LoadError::MalformedTimestamp { line, value },
        other => other,
    })?;

    Ok(RawEvent {
        artist: read_text(doc, "artist"),
        location: read_text(doc, "location"),
        song: read_text(doc, "song"),
        length: read_float(doc, "length", line)?,
        user_id: read_integer(doc, "userId", line)?,
        first_name: read_text(doc, "firstName"),
        last_name: read_text(doc, "lastName"),
        gender: read_code(doc, "gender", line, Gender::from_code)?,
        level: read_code(doc, "level", line, Level::from_code)?,
        ts,
        page: read_text(doc, "page"),
        session_id: read_integer(doc, "sessionId", line)?,
        user_agent: read_text(doc, "userAgent"),
    })
}

fn read_text(doc: &Map<String, Value>, key: &str) -> Option<String> {
    match doc.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Integers may arrive as `12`, `"12"` or `"12.0"` (a nullable integer
/// column exported through a float type).
fn read_integer(doc: &Map<String, Value>, key: &str, line: usize) -> LoadResult<Option<i64>> {
    let invalid = |value: String| LoadError::InvalidField {
        line,
        column: key.to_string(),
        value,
        message: "expected an integer".to_string(),
    };

    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            None => n
                .as_f64()
                .and_then(integral)
                .map(Some)
                .ok_or_else(|| invalid(n.to_string())),
        },
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
                .map(Some)
                .ok_or_else(|| invalid(s.clone()))
        }
        Some(other) => Err(invalid(other.to_string())),
    }
}

fn read_float(doc: &Map<String, Value>, key: &str, line: usize) -> LoadResult<Option<f64>> {
    let invalid = |value: String| LoadError::InvalidField {
        line,
        column: key.to_string(),
        value,
        message: "expected a number".to_string(),
    };

    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| invalid(n.to_string())),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_nan() => Ok(None),
                Ok(f) => Ok(Some(f)),
                Err(_) => Err(invalid(s.clone())),
            }
        }
        Some(other) => Err(invalid(other.to_string())),
    }
}

fn read_code<T>(
    doc: &Map<String, Value>,
    key: &str,
    line: usize,
    parse: fn(&str) -> Option<T>,
) -> LoadResult<Option<T>> {
    match read_text(doc, key) {
        None => Ok(None),
        Some(code) => parse(&code).map(Some).ok_or_else(|| LoadError::InvalidField {
            line,
            column: key.to_string(),
            value: code,
            message: "unknown code".to_string(),
        }),
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(f as i64)
    } else {
        None
    }
}

fn expect_object(doc: &Value, line: usize) -> LoadResult<&Map<String, Value>> {
    doc.as_object().ok_or_else(|| LoadError::Json {
        line,
        message: "event document is not an object".to_string(),
    })
}

fn collect_keys(doc: &Map<String, Value>, headers: &mut Vec<String>) {
    for key in doc.keys() {
        if !headers.iter().any(|h| h == key) {
            headers.push(key.clone());
        }
    }
}

fn csv_error(line: usize, err: csv::Error) -> LoadError {
    LoadError::Csv {
        line,
        message: err.to_string(),
    }
}

fn warn_missing_columns(headers: &[String]) {
    let missing: Vec<&str> = EVENT_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == col))
        .collect();

    if !missing.is_empty() {
        log_warning(format!("Input has no column(s): {}", missing.join(", ")));
    }
}
