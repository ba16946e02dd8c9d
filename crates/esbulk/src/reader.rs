//! 🔍 Streaming JSON reader — a pull parser over response bytes.
//!
//! Bulk responses can be large, and the only fields anyone cares about per
//! item are `status` and `error`. Deserializing the whole response into a
//! `serde_json::Value` just to pull out two fields per item allocates the
//! entire JSON tree. This reader walks the buffer with a byte cursor
//! instead: memory stays O(1) beyond the current item, and everything it
//! returns borrows from the input buffer.
//!
//! The reader is deliberately not a general-purpose JSON validator. It
//! trusts the server to produce well-formed JSON and reports a structured
//! [`ReadError`] when the shape diverges from what the caller asked for.

use memchr::memchr2;
use thiserror::Error;

// ===== Token kinds =====

/// The closed set of token kinds the reader can land on.
///
/// `FieldName` is only produced by [`JsonReader::next_field_name`]; the
/// low-level [`JsonReader::step`] reports the raw value tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    FieldName,
    String,
    Number,
    Bool,
    Null,
}

// ===== Errors =====

/// Low-level shape violations reported by the reader.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("unexpected end of input")]
    Eof,
    #[error("expected object")]
    ExpectedObject,
    #[error("expected array")]
    ExpectedArray,
    #[error("expected field name")]
    ExpectedFieldName,
    #[error("expected integer value")]
    ExpectedInteger,
    #[error("unexpected byte 0x{byte:02x} at offset {at}")]
    UnexpectedByte { byte: u8, at: usize },
}

// ===== Reader =====

/// A cursor over a JSON byte buffer.
///
/// All returned slices borrow from the input buffer; nothing is copied.
/// Separators (whitespace and commas) are consumed implicitly, so callers
/// can walk array elements back to back without caring about the commas
/// in between.
#[derive(Debug)]
pub struct JsonReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> JsonReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        JsonReader { buf, pos: 0 }
    }

    /// Byte offset of the cursor, for diagnostics.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Assert the cursor is at the start of an object and consume the `{`.
    pub fn expect_object(&mut self) -> Result<(), ReadError> {
        match self.peek()? {
            b'{' => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(ReadError::ExpectedObject),
        }
    }

    /// Assert the cursor is at the start of an array and consume the `[`.
    pub fn expect_array(&mut self) -> Result<(), ReadError> {
        match self.peek()? {
            b'[' => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(ReadError::ExpectedArray),
        }
    }

    /// Advance to the next key of the current object.
    ///
    /// Returns `(Token::FieldName, Some(name))` positioned on the field's
    /// value, or `(Token::ObjectEnd, None)` when the object closes. End of
    /// object is a distinguished kind, not an error.
    pub fn next_field_name(&mut self) -> Result<(Token, Option<&'a [u8]>), ReadError> {
        match self.peek()? {
            b'}' => {
                self.pos += 1;
                Ok((Token::ObjectEnd, None))
            }
            b'"' => {
                let name = self.parse_string()?;
                match self.peek()? {
                    b':' => {
                        self.pos += 1;
                        Ok((Token::FieldName, Some(name)))
                    }
                    byte => Err(ReadError::UnexpectedByte {
                        byte,
                        at: self.pos,
                    }),
                }
            }
            _ => Err(ReadError::ExpectedFieldName),
        }
    }

    /// Parse the value at the cursor as an integer.
    pub fn next_int(&mut self) -> Result<i64, ReadError> {
        let (token, raw) = self.step()?;
        if token != Token::Number {
            return Err(ReadError::ExpectedInteger);
        }
        let raw = raw.unwrap_or_default();
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(ReadError::ExpectedInteger)
    }

    /// Skip over the next value of any kind, returning its raw bytes.
    ///
    /// Used both to discard uninteresting fields and to capture the raw
    /// `error` object verbatim for later logging. For strings the slice
    /// includes the surrounding quotes; for objects and arrays it includes
    /// the delimiters.
    pub fn ignore_next(&mut self) -> Result<&'a [u8], ReadError> {
        let start_byte = self.peek()?;
        let start = self.pos;
        match start_byte {
            b'"' => {
                self.parse_string()?;
            }
            b'{' | b'[' => {
                self.skip_nested()?;
            }
            _ => {
                self.step()?;
            }
        }
        Ok(&self.buf[start..self.pos])
    }

    /// Single low-level advance. Consumes one token and returns its kind
    /// plus, for scalar values, the raw bytes (string content without
    /// quotes, numbers and literals verbatim).
    pub fn step(&mut self) -> Result<(Token, Option<&'a [u8]>), ReadError> {
        match self.peek()? {
            b'{' => {
                self.pos += 1;
                Ok((Token::ObjectStart, None))
            }
            b'}' => {
                self.pos += 1;
                Ok((Token::ObjectEnd, None))
            }
            b'[' => {
                self.pos += 1;
                Ok((Token::ArrayStart, None))
            }
            b']' => {
                self.pos += 1;
                Ok((Token::ArrayEnd, None))
            }
            b'"' => {
                let content = self.parse_string()?;
                Ok((Token::String, Some(content)))
            }
            b't' => self.literal(b"true", Token::Bool),
            b'f' => self.literal(b"false", Token::Bool),
            b'n' => self.literal(b"null", Token::Null),
            b'-' | b'0'..=b'9' => {
                let raw = self.parse_number();
                Ok((Token::Number, Some(raw)))
            }
            byte => Err(ReadError::UnexpectedByte {
                byte,
                at: self.pos,
            }),
        }
    }

    // ===== internals =====

    /// Skip whitespace and commas, then return the byte under the cursor
    /// without consuming it.
    fn peek(&mut self) -> Result<u8, ReadError> {
        while self.pos < self.buf.len() {
            match self.buf[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' | b',' => self.pos += 1,
                byte => return Ok(byte),
            }
        }
        Err(ReadError::Eof)
    }

    /// Parse a string at the cursor (which must be on the opening quote),
    /// returning the content without quotes. Escapes are left unprocessed;
    /// the bulk response keys this reader compares against contain none.
    fn parse_string(&mut self) -> Result<&'a [u8], ReadError> {
        debug_assert_eq!(self.buf[self.pos], b'"');
        let start = self.pos + 1;
        let mut at = start;
        loop {
            match memchr2(b'"', b'\\', &self.buf[at..]) {
                None => return Err(ReadError::Eof),
                Some(off) => {
                    let hit = at + off;
                    if self.buf[hit] == b'"' {
                        self.pos = hit + 1;
                        return Ok(&self.buf[start..hit]);
                    }
                    // skip the escape pair
                    at = hit + 2;
                    if at > self.buf.len() {
                        return Err(ReadError::Eof);
                    }
                }
            }
        }
    }

    fn parse_number(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self.pos < self.buf.len()
            && matches!(self.buf[self.pos], b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E')
        {
            self.pos += 1;
        }
        &self.buf[start..self.pos]
    }

    fn literal(
        &mut self,
        expected: &'static [u8],
        token: Token,
    ) -> Result<(Token, Option<&'a [u8]>), ReadError> {
        let end = self.pos + expected.len();
        if end > self.buf.len() {
            return Err(ReadError::Eof);
        }
        let raw = &self.buf[self.pos..end];
        if raw != expected {
            return Err(ReadError::UnexpectedByte {
                byte: self.buf[self.pos],
                at: self.pos,
            });
        }
        self.pos = end;
        Ok((token, Some(raw)))
    }

    /// Skip a nested object or array by tracking delimiter depth while
    /// staying out of string content.
    fn skip_nested(&mut self) -> Result<(), ReadError> {
        let mut depth = 0usize;
        while self.pos < self.buf.len() {
            match self.buf[self.pos] {
                b'"' => {
                    self.parse_string()?;
                    continue;
                }
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(ReadError::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_an_object_opens_and_closes() {
        let mut reader = JsonReader::new(b"{}");
        reader.expect_object().unwrap();
        let (token, name) = reader.next_field_name().unwrap();
        assert_eq!(token, Token::ObjectEnd);
        assert_eq!(name, None);
    }

    #[test]
    fn the_one_where_field_names_come_back_in_order() {
        let mut reader = JsonReader::new(br#"{"took": 5, "errors": false}"#);
        reader.expect_object().unwrap();

        let (token, name) = reader.next_field_name().unwrap();
        assert_eq!(token, Token::FieldName);
        assert_eq!(name, Some(b"took".as_ref()));
        assert_eq!(reader.next_int().unwrap(), 5);

        let (token, name) = reader.next_field_name().unwrap();
        assert_eq!(token, Token::FieldName);
        assert_eq!(name, Some(b"errors".as_ref()));
        let (token, raw) = reader.step().unwrap();
        assert_eq!(token, Token::Bool);
        assert_eq!(raw, Some(b"false".as_ref()));

        let (token, _) = reader.next_field_name().unwrap();
        assert_eq!(token, Token::ObjectEnd);
    }

    #[test]
    fn the_one_where_ignore_next_returns_raw_nested_bytes() {
        let raw_error = br#"{"type":"mapper_parsing_exception","reason":"failed [x]"}"#;
        let doc = format!(r#"{{"error":{},"status":400}}"#, String::from_utf8_lossy(raw_error));
        let mut reader = JsonReader::new(doc.as_bytes());
        reader.expect_object().unwrap();

        let (_, name) = reader.next_field_name().unwrap();
        assert_eq!(name, Some(b"error".as_ref()));
        let captured = reader.ignore_next().unwrap();
        assert_eq!(captured, raw_error.as_ref());

        let (_, name) = reader.next_field_name().unwrap();
        assert_eq!(name, Some(b"status".as_ref()));
        assert_eq!(reader.next_int().unwrap(), 400);
    }

    #[test]
    fn the_one_where_ignore_next_skips_every_value_kind() {
        let doc = br#"{"a":"text","b":[1,2,[3]],"c":null,"d":true,"e":-12.5,"f":7}"#;
        let mut reader = JsonReader::new(doc);
        reader.expect_object().unwrap();
        for _ in 0..5 {
            let (token, _) = reader.next_field_name().unwrap();
            assert_eq!(token, Token::FieldName);
            reader.ignore_next().unwrap();
        }
        let (_, name) = reader.next_field_name().unwrap();
        assert_eq!(name, Some(b"f".as_ref()));
        assert_eq!(reader.next_int().unwrap(), 7);
    }

    #[test]
    fn the_one_where_strings_with_escapes_do_not_derail_the_cursor() {
        let doc = br#"{"msg":"a \"quoted\" brace }","next":1}"#;
        let mut reader = JsonReader::new(doc);
        reader.expect_object().unwrap();
        let (_, name) = reader.next_field_name().unwrap();
        assert_eq!(name, Some(b"msg".as_ref()));
        reader.ignore_next().unwrap();
        let (_, name) = reader.next_field_name().unwrap();
        assert_eq!(name, Some(b"next".as_ref()));
    }

    #[test]
    fn the_one_where_array_elements_walk_without_explicit_commas() {
        let mut reader = JsonReader::new(br#"[{"a":1},{"a":2}]"#);
        reader.expect_array().unwrap();
        for expected in [1, 2] {
            reader.expect_object().unwrap();
            let (_, name) = reader.next_field_name().unwrap();
            assert_eq!(name, Some(b"a".as_ref()));
            assert_eq!(reader.next_int().unwrap(), expected);
            let (token, _) = reader.next_field_name().unwrap();
            assert_eq!(token, Token::ObjectEnd);
        }
        let (token, _) = reader.step().unwrap();
        assert_eq!(token, Token::ArrayEnd);
    }

    #[test]
    fn the_one_where_the_wrong_shape_is_named_not_guessed() {
        let mut reader = JsonReader::new(b"[1]");
        assert_eq!(reader.expect_object(), Err(ReadError::ExpectedObject));

        let mut reader = JsonReader::new(b"{\"a\":1}");
        assert_eq!(reader.expect_array(), Err(ReadError::ExpectedArray));

        let mut reader = JsonReader::new(b"");
        assert_eq!(reader.expect_object(), Err(ReadError::Eof));
    }

    #[test]
    fn the_one_where_next_int_rejects_non_numbers() {
        let mut reader = JsonReader::new(br#""not a number""#);
        assert_eq!(reader.next_int(), Err(ReadError::ExpectedInteger));
    }

    #[test]
    fn the_one_where_a_truncated_buffer_reports_eof() {
        let mut reader = JsonReader::new(br#"{"items": [{"index": {"status""#);
        reader.expect_object().unwrap();
        let (_, name) = reader.next_field_name().unwrap();
        assert_eq!(name, Some(b"items".as_ref()));
        assert_eq!(reader.ignore_next(), Err(ReadError::Eof));
    }
}
