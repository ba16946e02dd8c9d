//! Plain NDJSON body encoder.

use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::bulk::BulkAction;
use crate::encoder::{apply_common_headers, write_doc, write_value, BodyEncoder, Doc, EncodeError};

/// Accumulates newline-delimited JSON in a reusable byte buffer.
///
/// Every `add*` call stages its line(s) in a scratch buffer first and
/// only copies them into the body on success, so a failed encode can
/// never leave a partial line behind.
#[derive(Debug)]
pub struct JsonEncoder {
    buf: Vec<u8>,
    scratch: Vec<u8>,
    escape_html: bool,
    raw_len: usize,
}

impl JsonEncoder {
    pub fn new(escape_html: bool) -> Self {
        JsonEncoder {
            buf: Vec::new(),
            scratch: Vec::new(),
            escape_html,
            raw_len: 0,
        }
    }

    /// Stage one serialized line and commit it. Takes any `Serialize`
    /// impl so the line-atomicity contract is testable with a failing
    /// one.
    pub(crate) fn add_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.scratch.clear();
        write_value(&mut self.scratch, value, self.escape_html)?;
        self.commit_scratch();
        Ok(())
    }

    fn commit_scratch(&mut self) {
        self.buf.extend_from_slice(&self.scratch);
        self.raw_len += self.scratch.len();
    }
}

impl BodyEncoder for JsonEncoder {
    fn reset(&mut self) {
        self.buf.clear();
        self.raw_len = 0;
    }

    fn add_raw(&mut self, doc: &Doc) -> Result<(), EncodeError> {
        match doc {
            Doc::Action(action) => self.add_value(action),
            Doc::Event(event) => self.add_value(event),
            Doc::Json(value) => self.add_value(value),
            Doc::Raw(_) => {
                self.scratch.clear();
                write_doc(&mut self.scratch, doc, self.escape_html)?;
                self.commit_scratch();
                Ok(())
            }
        }
    }

    fn add(&mut self, action: &BulkAction, doc: &Doc) -> Result<(), EncodeError> {
        self.scratch.clear();
        // both lines or neither: the body is only touched on success
        write_value(&mut self.scratch, action, self.escape_html)?;
        write_doc(&mut self.scratch, doc, self.escape_html)?;
        self.commit_scratch();
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        Ok(std::mem::take(&mut self.buf))
    }

    fn raw_len(&self) -> usize {
        self.raw_len
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        apply_common_headers(headers, self.raw_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::{BulkAction, BulkMeta};
    use crate::encoder::tests::PoisonDoc;
    use crate::encoder::UNCOMPRESSED_LENGTH_HEADER;
    use serde_json::json;

    fn meta(index: &str) -> BulkMeta {
        BulkMeta {
            index: index.to_string(),
            doc_type: None,
            pipeline: None,
            id: None,
        }
    }

    #[test]
    fn the_one_where_each_value_gets_exactly_one_newline() {
        let mut enc = JsonEncoder::new(false);
        enc.add_raw(&Doc::Json(json!({"a":1}))).unwrap();
        enc.add_raw(&Doc::Json(json!({"b":2}))).unwrap();
        let body = enc.finish().unwrap();
        assert_eq!(body, b"{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn the_one_where_add_writes_the_meta_and_doc_pair() {
        let mut enc = JsonEncoder::new(false);
        enc.add(&BulkAction::Index(meta("logs")), &Doc::Json(json!({"msg":"hi"})))
            .unwrap();
        let body = String::from_utf8(enc.finish().unwrap()).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"index":{"_index":"logs"}}"#);
        assert_eq!(lines[1], r#"{"msg":"hi"}"#);
    }

    #[test]
    fn the_one_where_reset_is_idempotent() {
        let mut enc = JsonEncoder::new(false);
        enc.add_raw(&Doc::Json(json!({"a":1}))).unwrap();
        enc.reset();
        let once = (enc.raw_len(), enc.finish().unwrap());
        enc.reset();
        enc.reset();
        let twice = (enc.raw_len(), enc.finish().unwrap());
        assert_eq!(once, (0, Vec::new()));
        assert_eq!(once, twice);
    }

    #[test]
    fn the_one_where_a_failed_encode_leaves_no_partial_line() {
        // A failing document must leave the body exactly as it was: no
        // partial JSON, and no stray newline either.
        let mut enc = JsonEncoder::new(false);
        enc.add_raw(&Doc::Json(json!({"keep":true}))).unwrap();
        let before = enc.raw_len();

        assert!(enc.add_value(&PoisonDoc).is_err());

        assert_eq!(enc.raw_len(), before);
        let body = enc.finish().unwrap();
        assert_eq!(body, b"{\"keep\":true}\n");
    }

    #[test]
    fn the_one_where_headers_carry_the_uncompressed_length() {
        let mut enc = JsonEncoder::new(false);
        enc.add_raw(&Doc::Json(json!({"a":1}))).unwrap();
        let body = enc.finish().unwrap();

        let mut headers = reqwest::header::HeaderMap::new();
        enc.apply_headers(&mut headers);
        assert_eq!(
            headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json; charset=UTF-8"
        );
        assert!(headers.get(reqwest::header::CONTENT_ENCODING).is_none());
        assert_eq!(
            headers.get(UNCOMPRESSED_LENGTH_HEADER).unwrap(),
            &body.len().to_string()
        );
    }

    #[test]
    fn the_one_where_marshal_is_reset_plus_add_raw() {
        let mut enc = JsonEncoder::new(false);
        enc.add_raw(&Doc::Json(json!({"stale":true}))).unwrap();
        enc.marshal(&Doc::Json(json!({"fresh":true}))).unwrap();
        assert_eq!(enc.finish().unwrap(), b"{\"fresh\":true}\n");
    }
}
