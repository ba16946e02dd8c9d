//! 📬 Bulk wire types and response walkers.
//!
//! The request side is two small serde types: [`BulkMeta`] carries the
//! per-document routing fields and [`BulkAction`] wraps it in the verb
//! object the `_bulk` endpoint expects (`{"index":{...}}`). The response
//! side never deserializes: [`read_to_items`] and [`read_item_status`]
//! walk the body with a [`JsonReader`], pulling out only each item's
//! status code and raw error bytes.

use semver::Version;
use serde::Serialize;
use thiserror::Error;

use crate::reader::{JsonReader, ReadError, Token};

// ===== Request side =====

/// Routing fields for one bulk action meta line.
///
/// Serializes with the underscore-prefixed wire names; absent options
/// are omitted entirely rather than sent as null.
#[derive(Debug, Clone, Serialize)]
pub struct BulkMeta {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl BulkMeta {
    pub fn new(index: impl Into<String>) -> Self {
        BulkMeta {
            index: index.into(),
            doc_type: None,
            pipeline: None,
            id: None,
        }
    }
}

/// A bulk meta line: the action verb wrapping its routing fields.
///
/// The variant name becomes the single JSON key, so
/// `BulkAction::Index(meta)` encodes as `{"index":{"_index":...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Index(BulkMeta),
    Create(BulkMeta),
    Update(BulkMeta),
    Delete(BulkMeta),
}

impl BulkAction {
    /// Pick the ingestion verb the way recent servers prefer it: `create`
    /// when the document carries an explicit id (so replays conflict with
    /// 409 instead of silently overwriting) or when the server is 7.5 or
    /// newer, `index` otherwise.
    pub fn for_version(meta: BulkMeta, version: &Version) -> Self {
        let prefers_create = Version::new(7, 5, 0);
        if meta.id.is_some() || *version >= prefers_create {
            BulkAction::Create(meta)
        } else {
            BulkAction::Index(meta)
        }
    }

    pub fn meta(&self) -> &BulkMeta {
        match self {
            BulkAction::Index(meta)
            | BulkAction::Create(meta)
            | BulkAction::Update(meta)
            | BulkAction::Delete(meta) => meta,
        }
    }
}

// ===== Response side =====

/// Shape violations while walking a bulk response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("expected bulk response object")]
    ExpectedObject,
    #[error("bulk response has no items array")]
    ExpectedItemsArray,
    #[error("expected bulk item object")]
    ExpectedItemObject,
    #[error("expected item status code")]
    ExpectedStatusCode,
    #[error("empty object")]
    UnexpectedEmptyObject,
    #[error("expected end of object")]
    ExpectedObjectEnd,
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// The raw bytes of a bulk response body.
///
/// Owns the buffer so the callers walking it can borrow item error
/// slices without copying.
#[derive(Debug)]
pub struct BulkResult(Vec<u8>);

impl BulkResult {
    pub fn new(body: Vec<u8>) -> Self {
        BulkResult(body)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// A reader positioned at the start of the body. Feed it to
    /// [`read_to_items`], then call [`read_item_status`] once per
    /// document sent.
    pub fn reader(&self) -> JsonReader<'_> {
        JsonReader::new(&self.0)
    }
}

/// Advance the reader into the `items` array.
///
/// Consumes the response envelope (`took`, `errors`, anything else the
/// server adds) up to and including the `[` of `items`, leaving the
/// cursor on the first item.
pub fn read_to_items(reader: &mut JsonReader<'_>) -> Result<(), ResponseError> {
    reader
        .expect_object()
        .map_err(|_| ResponseError::ExpectedObject)?;
    loop {
        match reader.next_field_name()? {
            (Token::ObjectEnd, _) => return Err(ResponseError::ExpectedItemsArray),
            (_, Some(b"items")) => {
                reader
                    .expect_array()
                    .map_err(|_| ResponseError::ExpectedItemsArray)?;
                return Ok(());
            }
            (_, Some(_)) => {
                reader.ignore_next()?;
            }
            (_, None) => return Err(ResponseError::ExpectedItemsArray),
        }
    }
}

/// Read one element of the `items` array.
///
/// Each item is an object with exactly one key, the action verb echoed
/// back, wrapping the per-document result. Returns the HTTP-style status
/// code and, if present, the raw bytes of the `error` value for logging.
pub fn read_item_status<'a>(
    reader: &mut JsonReader<'a>,
) -> Result<(i64, Option<&'a [u8]>), ResponseError> {
    reader
        .expect_object()
        .map_err(|_| ResponseError::ExpectedItemObject)?;
    let (token, _) = reader.next_field_name()?;
    if token == Token::ObjectEnd {
        return Err(ResponseError::UnexpectedEmptyObject);
    }

    let (status, error) = item_status_inner(reader)?;

    // exactly one key per item
    let (token, _) = reader.next_field_name()?;
    if token != Token::ObjectEnd {
        return Err(ResponseError::ExpectedObjectEnd);
    }
    Ok((status, error))
}

fn item_status_inner<'a>(
    reader: &mut JsonReader<'a>,
) -> Result<(i64, Option<&'a [u8]>), ResponseError> {
    reader
        .expect_object()
        .map_err(|_| ResponseError::ExpectedItemObject)?;
    let mut status: i64 = -1;
    let mut error: Option<&'a [u8]> = None;
    loop {
        match reader.next_field_name()? {
            (Token::ObjectEnd, _) => break,
            (_, Some(b"status")) => {
                status = reader.next_int()?;
            }
            (_, Some(b"error")) => {
                error = Some(reader.ignore_next()?);
            }
            _ => {
                reader.ignore_next()?;
            }
        }
    }
    if status < 0 {
        return Err(ResponseError::ExpectedStatusCode);
    }
    Ok((status, error))
}
