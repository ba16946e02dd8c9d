//! 📦 Body encoders — turning documents into newline-delimited JSON.
//!
//! The bulk endpoint wants alternating meta/document lines, each a single
//! JSON value terminated by `\n`, optionally gzip-compressed. Two
//! interchangeable encoders implement that contract: [`JsonEncoder`]
//! writes plain NDJSON, [`GzipEncoder`] streams the same bytes through a
//! compressor. A [`Connection`](crate::connection::Connection) owns
//! exactly one of them and reuses its buffer across calls, which is why
//! none of this is `Sync` and why `reset` exists.
//!
//! Line framing is the invariant everything downstream leans on: the
//! buffer never holds a partial line. `add_raw` either appends one
//! complete `value\n` or leaves the buffer untouched; `add` does the same
//! for its meta/document pair as a unit.

use std::io;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::ser::SerializeMap;
use serde::Serialize;
use thiserror::Error;

use crate::bulk::BulkAction;

mod escape;
mod gzip;
mod json;

pub use escape::EscapeHtmlFormatter;
pub use gzip::GzipEncoder;
pub use json::JsonEncoder;

/// Carries the uncompressed body length so servers can pre-size buffers
/// and log compression ratios.
pub const UNCOMPRESSED_LENGTH_HEADER: HeaderName =
    HeaderName::from_static("x-elastic-uncompressed-request-length");

const CONTENT_TYPE_JSON: HeaderValue =
    HeaderValue::from_static("application/json; charset=UTF-8");

// ===== Errors =====

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to encode document as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("i/o error while writing bulk body: {0}")]
    Io(#[from] io::Error),
    #[error("invalid gzip compression level {0}, expected 1 to 9")]
    InvalidCompressionLevel(u32),
}

// ===== Body items =====

/// One encodable value in a bulk body.
///
/// `Event` and `Json` go through the JSON folder; `Raw` is appended
/// verbatim for callers that already hold encoded bytes (an NDJSON file,
/// a pre-rendered document) and must not pay for a re-serialization.
#[derive(Debug, Clone)]
pub enum Doc {
    /// A bulk action meta line, e.g. `{"index":{"_index":"logs"}}`.
    Action(BulkAction),
    /// A timestamped event; folds into one flat JSON object.
    Event(Event),
    /// Generic fallback: any JSON value.
    Json(serde_json::Value),
    /// Pre-encoded bytes, appended without inspection.
    Raw(Vec<u8>),
}

impl From<BulkAction> for Doc {
    fn from(action: BulkAction) -> Self {
        Doc::Action(action)
    }
}

impl From<Event> for Doc {
    fn from(event: Event) -> Self {
        Doc::Event(event)
    }
}

impl From<serde_json::Value> for Doc {
    fn from(value: serde_json::Value) -> Self {
        Doc::Json(value)
    }
}

/// A timestamp plus a flat field map.
///
/// Serializes as one flat object with `@timestamp` first, never as a
/// nested `{timestamp, fields}` wrapper:
/// `{"@timestamp":"2024-05-01T12:00:00.000Z","message":"..."}`.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Event {
            timestamp,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(1 + self.fields.len()))?;
        map.serialize_entry(
            "@timestamp",
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ===== Encoder trait =====

/// The operations a bulk body encoder must support.
///
/// Call order per request: `reset`, any number of `add`/`add_raw`,
/// `finish`, then `apply_headers`. `marshal` is the single-document
/// shortcut for non-bulk requests.
pub trait BodyEncoder {
    /// Truncate the buffer to empty. Idempotent; fully reinitializes the
    /// compressor state for the gzip variant.
    fn reset(&mut self);

    /// Append one JSON value followed by `\n`. Atomic at line
    /// granularity: on failure the buffer is unchanged.
    fn add_raw(&mut self, doc: &Doc) -> Result<(), EncodeError>;

    /// Append a meta line and a document line. Atomic as a pair: either
    /// both lines land or neither does.
    fn add(&mut self, action: &BulkAction, doc: &Doc) -> Result<(), EncodeError>;

    /// `reset` + `add_raw`, for single-document requests.
    fn marshal(&mut self, doc: &Doc) -> Result<(), EncodeError> {
        self.reset();
        self.add_raw(doc)
    }

    /// Finalize and take the accumulated body. The gzip variant closes
    /// the compressor first so all buffered bytes are flushed.
    fn finish(&mut self) -> Result<Vec<u8>, EncodeError>;

    /// Uncompressed bytes encoded since the last `reset`, newlines
    /// included.
    fn raw_len(&self) -> usize;

    /// Stamp content-type, the uncompressed-length header and, for gzip,
    /// the content-encoding. Call after `finish`.
    fn apply_headers(&self, headers: &mut HeaderMap);
}

/// Encoder selection, resolved once per connection from the configured
/// compression level: 0 is plain JSON, 1-9 select gzip.
#[derive(Debug)]
pub enum Encoder {
    Json(JsonEncoder),
    Gzip(GzipEncoder),
}

impl Encoder {
    pub fn for_level(level: u32, escape_html: bool) -> Result<Self, EncodeError> {
        if level == 0 {
            Ok(Encoder::Json(JsonEncoder::new(escape_html)))
        } else {
            Ok(Encoder::Gzip(GzipEncoder::new(level, escape_html)?))
        }
    }
}

impl BodyEncoder for Encoder {
    fn reset(&mut self) {
        match self {
            Encoder::Json(enc) => enc.reset(),
            Encoder::Gzip(enc) => enc.reset(),
        }
    }

    fn add_raw(&mut self, doc: &Doc) -> Result<(), EncodeError> {
        match self {
            Encoder::Json(enc) => enc.add_raw(doc),
            Encoder::Gzip(enc) => enc.add_raw(doc),
        }
    }

    fn add(&mut self, action: &BulkAction, doc: &Doc) -> Result<(), EncodeError> {
        match self {
            Encoder::Json(enc) => enc.add(action, doc),
            Encoder::Gzip(enc) => enc.add(action, doc),
        }
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        match self {
            Encoder::Json(enc) => enc.finish(),
            Encoder::Gzip(enc) => enc.finish(),
        }
    }

    fn raw_len(&self) -> usize {
        match self {
            Encoder::Json(enc) => enc.raw_len(),
            Encoder::Gzip(enc) => enc.raw_len(),
        }
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        match self {
            Encoder::Json(enc) => enc.apply_headers(headers),
            Encoder::Gzip(enc) => enc.apply_headers(headers),
        }
    }
}

// ===== Shared line-writing internals =====

/// Serialize `value` into `scratch` and terminate the line. On failure
/// any partially written bytes are rolled back so `scratch` stays
/// line-framed.
pub(crate) fn write_value<T: Serialize + ?Sized>(
    scratch: &mut Vec<u8>,
    value: &T,
    escape_html: bool,
) -> Result<(), EncodeError> {
    let start = scratch.len();
    let result = if escape_html {
        let mut ser =
            serde_json::Serializer::with_formatter(&mut *scratch, EscapeHtmlFormatter::new());
        value.serialize(&mut ser)
    } else {
        let mut ser = serde_json::Serializer::new(&mut *scratch);
        value.serialize(&mut ser)
    };
    match result {
        Ok(()) => {
            scratch.push(b'\n');
            Ok(())
        }
        Err(err) => {
            scratch.truncate(start);
            Err(err.into())
        }
    }
}

/// Append one `Doc` as a complete line into `scratch`.
pub(crate) fn write_doc(
    scratch: &mut Vec<u8>,
    doc: &Doc,
    escape_html: bool,
) -> Result<(), EncodeError> {
    match doc {
        Doc::Action(action) => write_value(scratch, action, escape_html),
        Doc::Event(event) => write_value(scratch, event, escape_html),
        Doc::Json(value) => write_value(scratch, value, escape_html),
        Doc::Raw(bytes) => {
            scratch.extend_from_slice(bytes);
            if !bytes.ends_with(b"\n") {
                scratch.push(b'\n');
            }
            Ok(())
        }
    }
}

/// The headers both encoders share.
pub(crate) fn apply_common_headers(headers: &mut HeaderMap, raw_len: usize) {
    headers.insert(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_JSON);
    headers.insert(UNCOMPRESSED_LENGTH_HEADER, HeaderValue::from(raw_len as u64));
}
