//! Gzip-compressed NDJSON body encoder.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::bulk::BulkAction;
use crate::encoder::{
    apply_common_headers, write_doc, write_value, BodyEncoder, Doc, EncodeError,
};

/// Same line-framing contract as [`JsonEncoder`](super::JsonEncoder),
/// with the bytes streamed through a gzip compressor.
///
/// Lines are staged uncompressed in a scratch buffer and only fed to the
/// compressor once fully encoded, so a failed serialize never corrupts
/// the stream. `raw_len` counts the uncompressed bytes; the compressed
/// body comes out of `finish`, which closes the current compressor.
#[derive(Debug)]
pub struct GzipEncoder {
    writer: Option<GzEncoder<Vec<u8>>>,
    scratch: Vec<u8>,
    level: u32,
    escape_html: bool,
    raw_len: usize,
}

impl GzipEncoder {
    pub fn new(level: u32, escape_html: bool) -> Result<Self, EncodeError> {
        if !(1..=9).contains(&level) {
            return Err(EncodeError::InvalidCompressionLevel(level));
        }
        Ok(GzipEncoder {
            writer: Some(GzEncoder::new(Vec::new(), Compression::new(level))),
            scratch: Vec::new(),
            level,
            escape_html,
            raw_len: 0,
        })
    }

    fn commit_scratch(&mut self) -> Result<(), EncodeError> {
        let writer = self
            .writer
            .get_or_insert_with(|| GzEncoder::new(Vec::new(), Compression::new(self.level)));
        writer.write_all(&self.scratch)?;
        self.raw_len += self.scratch.len();
        Ok(())
    }
}

impl BodyEncoder for GzipEncoder {
    fn reset(&mut self) {
        self.writer = Some(GzEncoder::new(Vec::new(), Compression::new(self.level)));
        self.raw_len = 0;
    }

    fn add_raw(&mut self, doc: &Doc) -> Result<(), EncodeError> {
        self.scratch.clear();
        write_doc(&mut self.scratch, doc, self.escape_html)?;
        self.commit_scratch()
    }

    fn add(&mut self, action: &BulkAction, doc: &Doc) -> Result<(), EncodeError> {
        self.scratch.clear();
        write_value(&mut self.scratch, action, self.escape_html)?;
        write_doc(&mut self.scratch, doc, self.escape_html)?;
        self.commit_scratch()
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncodeError> {
        match self.writer.take() {
            Some(writer) => Ok(writer.finish()?),
            None => Ok(Vec::new()),
        }
    }

    fn raw_len(&self) -> usize {
        self.raw_len
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        apply_common_headers(headers, self.raw_len);
        headers.insert(
            reqwest::header::CONTENT_ENCODING,
            HeaderValue::from_static("gzip"),
        );
    }
}
