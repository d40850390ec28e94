//! Character encodings used by the legacy grammars.
//!
//! Strings are held as UTF-8 in memory and transcoded at the byte boundary.

use crate::error::ProtocolError;
use std::fmt;

/// Default encoding of the XML grammar family.
pub const DEFAULT_ENCODING: &str = "iso-8859-1";

/// Supported character encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    /// Resolves a charset label, case-insensitively.
    pub fn from_label(label: &str) -> Result<Self, ProtocolError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => Ok(Charset::Latin1),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            _ => Err(ProtocolError::UnsupportedEncoding(label.to_string())),
        }
    }

    /// Canonical label, as written into declarations and headers.
    pub fn label(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Latin1 => "iso-8859-1",
            Charset::Ascii => "us-ascii",
        }
    }

    fn max_char(&self) -> u32 {
        match self {
            Charset::Utf8 => u32::MAX,
            Charset::Latin1 => 0xFF,
            Charset::Ascii => 0x7F,
        }
    }

    /// Decodes raw bytes into a string.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, ProtocolError> {
        match self {
            Charset::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes)
                    .map(str::to_string)
                    .map_err(|e| {
                        ProtocolError::malformed(format!(
                            "invalid utf-8 sequence at byte {}",
                            e.valid_up_to()
                        ))
                    })
            }
            Charset::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Charset::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(pos) => Err(ProtocolError::malformed(format!(
                    "non-ascii byte {:#04x} at byte {}",
                    bytes[pos], pos
                ))),
                None => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            },
        }
    }

    /// Encodes a string, writing characters this charset cannot hold
    /// through `escape`. The escape output must itself be ASCII.
    pub fn encode(&self, text: &str, escape: fn(char, &mut String)) -> Vec<u8> {
        if *self == Charset::Utf8 {
            return text.as_bytes().to_vec();
        }

        let max = self.max_char();
        let mut out = Vec::with_capacity(text.len());
        let mut scratch = String::new();
        for c in text.chars() {
            if (c as u32) <= max {
                out.push(c as u32 as u8);
            } else {
                scratch.clear();
                escape(c, &mut scratch);
                out.extend_from_slice(scratch.as_bytes());
            }
        }
        out
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extracts the `charset` parameter of a Content-Type header value.
pub fn content_type_charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

/// Picks the effective encoding: the payload's own declaration wins over
/// the externally declared one, which wins over the grammar default.
pub fn resolve<'a>(
    in_payload: Option<&'a str>,
    declared: Option<&'a str>,
    default: &'a str,
) -> Result<Charset, ProtocolError> {
    Charset::from_label(in_payload.or(declared).unwrap_or(default))
}
