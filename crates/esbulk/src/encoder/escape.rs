//! HTML-safe JSON formatter.
//!
//! When bulk bodies may later be embedded in HTML-adjacent contexts, the
//! characters `<`, `>` and `&` inside string values are escaped as
//! `\u003c`, `\u003e` and `\u0026`. serde_json never does this on its
//! own, so the toggle is implemented as a [`Formatter`] that intercepts
//! string fragments; everything else (control characters, quotes) keeps
//! the default escaping.

use std::io;

use serde_json::ser::{CompactFormatter, Formatter};

#[derive(Debug, Default)]
pub struct EscapeHtmlFormatter {
    inner: CompactFormatter,
}

impl EscapeHtmlFormatter {
    pub fn new() -> Self {
        EscapeHtmlFormatter {
            inner: CompactFormatter,
        }
    }

    fn escape_for(byte: u8) -> Option<&'static str> {
        match byte {
            b'<' => Some("\\u003c"),
            b'>' => Some("\\u003e"),
            b'&' => Some("\\u0026"),
            _ => None,
        }
    }
}

impl Formatter for EscapeHtmlFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        for (at, byte) in bytes.iter().enumerate() {
            let Some(escaped) = Self::escape_for(*byte) else {
                continue;
            };
            if start < at {
                writer.write_all(&bytes[start..at])?;
            }
            writer.write_all(escaped.as_bytes())?;
            start = at + 1;
        }
        writer.write_all(&bytes[start..])
    }

    fn write_char_escape<W>(
        &mut self,
        writer: &mut W,
        char_escape: serde_json::ser::CharEscape,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.write_char_escape(writer, char_escape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    fn encode(value: &serde_json::Value) -> String {
        let mut out = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut out, EscapeHtmlFormatter::new());
        value.serialize(&mut ser).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn the_one_where_angle_brackets_and_ampersands_are_escaped() {
        let encoded = encode(&json!({"html": "<b>bold & brash</b>"}));
        assert_eq!(
            encoded,
            r#"{"html":"\u003cb\u003ebold \u0026 brash\u003c/b\u003e"}"#
        );
    }

    #[test]
    fn the_one_where_clean_strings_pass_through_unchanged() {
        let encoded = encode(&json!({"message": "plain text, no markup"}));
        assert_eq!(encoded, r#"{"message":"plain text, no markup"}"#);
    }

    #[test]
    fn the_one_where_default_escapes_still_apply() {
        let encoded = encode(&json!({"q": "say \"hi\"\n"}));
        assert_eq!(encoded, r#"{"q":"say \"hi\"\n"}"#);
    }
}
