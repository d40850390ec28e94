//! Minimal XML tree reader and writer for the XML grammars.
//!
//! Supports elements, attributes, character data, CDATA sections, comments,
//! processing instructions and the predefined/numeric entities. Document
//! type declarations are rejected.

use crate::charset::{self, Charset};
use crate::error::ProtocolError;
use bytes::Bytes;

/// An element node. Text is the concatenation of all direct character data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
    /// Source line of the start tag (1-based, 0 for built trees).
    pub line: usize,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Creates an element holding only character data.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Human-readable location used in error messages.
    pub fn describe(&self) -> String {
        if self.line > 0 {
            format!("<{}> at line {}", self.name, self.line)
        } else {
            format!("<{}>", self.name)
        }
    }

    /// Fails when the element carries non-whitespace character data.
    pub fn expect_no_text(&self) -> Result<(), ProtocolError> {
        if self.text.trim().is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::malformed(format!(
                "unexpected text {:?} in {}",
                self.text.trim(),
                self.describe()
            )))
        }
    }

    /// Returns the single child element, which must be named `name`.
    pub fn expect_only_child(&self, name: &str) -> Result<&Element, ProtocolError> {
        self.expect_no_text()?;
        match self.children.as_slice() {
            [only] if only.name == name => Ok(only),
            [only] => Err(ProtocolError::malformed(format!(
                "expected <{}> in {}, found {}",
                name,
                self.describe(),
                only.describe()
            ))),
            [] => Err(ProtocolError::malformed(format!(
                "missing <{}> in {}",
                name,
                self.describe()
            ))),
            _ => Err(ProtocolError::malformed(format!(
                "expected exactly one <{}> in {}, found {} elements",
                name,
                self.describe(),
                self.children.len()
            ))),
        }
    }

    /// Fails when the element has child elements.
    pub fn expect_leaf(&self) -> Result<(), ProtocolError> {
        match self.children.first() {
            None => Ok(()),
            Some(child) => Err(ProtocolError::malformed(format!(
                "unexpected {} in {}",
                child.describe(),
                self.describe()
            ))),
        }
    }

    /// Serializes the element without a declaration and without
    /// indentation. Empty elements are written as start/end tag pairs.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_into(value, out, true);
            out.push('"');
        }
        out.push('>');
        escape_into(&self.text, out, false);
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// A parsed document: the root element and the encoding named in the
/// XML declaration, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub encoding: Option<String>,
    pub root: Element,
}

/// Renders a document with an XML declaration naming `encoding`.
pub fn render(root: &Element, encoding: &str) -> String {
    let mut out = format!("<?xml version=\"1.0\" encoding=\"{}\"?>\n", encoding);
    root.write_to(&mut out);
    out
}

/// Writes a character as a numeric character reference.
pub fn char_ref(c: char, out: &mut String) {
    out.push_str("&#");
    out.push_str(&(c as u32).to_string());
    out.push(';');
}

fn escape_into(text: &str, out: &mut String, attr: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

/// Reads the encoding named in an XML declaration straight from raw bytes.
///
/// Only ASCII-compatible encodings are sniffed, which covers every
/// charset this crate supports.
pub fn sniff_encoding(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if !bytes.starts_with(b"<?xml") {
        return None;
    }
    let end = bytes.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&bytes[5..end]).ok()?;
    let mut reader = Reader::new(decl);
    reader.parse_attributes().ok()?.into_iter().find_map(|(name, value)| {
        (name == "encoding").then_some(value)
    })
}

/// Decodes a raw payload into a document, returning the charset used.
pub fn read_document(
    payload: &[u8],
    declared: Option<&str>,
    default: &str,
) -> Result<(Document, Charset), ProtocolError> {
    let sniffed = sniff_encoding(payload);
    let charset = charset::resolve(sniffed.as_deref(), declared, default)?;
    let text = charset.decode(payload)?;
    Ok((parse(&text)?, charset))
}

/// Renders a document into bytes in the given encoding.
pub fn write_document(root: &Element, encoding: &str) -> Result<Bytes, ProtocolError> {
    let charset = Charset::from_label(encoding)?;
    let text = render(root, charset.label());
    Ok(Bytes::from(charset.encode(&text, char_ref)))
}

/// Parses a complete document.
pub fn parse(text: &str) -> Result<Document, ProtocolError> {
    let mut reader = Reader::new(text.strip_prefix('\u{feff}').unwrap_or(text));
    let mut encoding = None;

    if reader.starts_with("<?xml") && reader.peek_at(5).is_some_and(is_space) {
        reader.advance(5);
        for (name, value) in reader.parse_attributes()? {
            if name == "encoding" {
                encoding = Some(value);
            }
        }
        reader.skip_space();
        reader.expect("?>")?;
    }

    reader.skip_misc()?;
    if reader.at_end() {
        return Err(reader.error("no root element"));
    }
    let root = reader.parse_element()?;
    reader.skip_misc()?;
    if !reader.at_end() {
        return Err(reader.error("content after root element"));
    }

    Ok(Document { encoding, root })
}

/// Deepest element nesting the reader accepts.
pub const MAX_DEPTH: usize = 128;

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.')
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    col: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            col: 1,
            depth: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn error(&self, msg: impl std::fmt::Display) -> ProtocolError {
        ProtocolError::malformed(format!("{} at line {}, column {}", msg, self.line, self.col))
    }

    fn expect(&mut self, s: &str) -> Result<(), ProtocolError> {
        if self.starts_with(s) {
            self.advance(s.chars().count());
            Ok(())
        } else if self.at_end() {
            Err(self.error(format!("unexpected end of input, expected {:?}", s)))
        } else {
            Err(self.error(format!("expected {:?}", s)))
        }
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.bump();
        }
    }

    /// Consumes input up to and including `end`, returning what came before.
    fn take_until(&mut self, end: &str, what: &str) -> Result<&'a str, ProtocolError> {
        match self.rest().find(end) {
            Some(idx) => {
                let start = self.pos;
                let taken = &self.src[start..start + idx];
                self.advance(taken.chars().count() + end.chars().count());
                Ok(taken)
            }
            None => Err(self.error(format!("unterminated {}", what))),
        }
    }

    /// Skips whitespace, comments and processing instructions.
    fn skip_misc(&mut self) -> Result<(), ProtocolError> {
        loop {
            self.skip_space();
            if self.starts_with("<!--") {
                self.advance(4);
                self.take_until("-->", "comment")?;
            } else if self.starts_with("<?") {
                self.advance(2);
                self.take_until("?>", "processing instruction")?;
            } else if self.starts_with("<!DOCTYPE") {
                return Err(self.error("document type declarations are not supported"));
            } else {
                return Ok(());
            }
        }
    }

    fn parse_name(&mut self) -> Result<String, ProtocolError> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.bump();
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => self.error(format!("invalid character {:?} in name", c)),
                None => self.error("unexpected end of input, expected a name"),
            });
        }
        Ok(self.src[start..self.pos].to_string())
    }

    /// Parses `name="value"` pairs until `>`, `/>` or `?>`.
    fn parse_attributes(&mut self) -> Result<Vec<(String, String)>, ProtocolError> {
        let mut attrs: Vec<(String, String)> = Vec::new();
        loop {
            self.skip_space();
            match self.peek() {
                None | Some('>') | Some('/') | Some('?') => return Ok(attrs),
                _ => {}
            }
            let name = self.parse_name()?;
            self.skip_space();
            self.expect("=")?;
            self.skip_space();
            let quote = match self.bump() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.error(format!("expected quoted value for attribute {}", name))),
            };
            let mut value = String::new();
            loop {
                match self.peek() {
                    None => return Err(self.error("unterminated attribute value")),
                    Some(c) if c == quote => {
                        self.bump();
                        break;
                    }
                    Some('&') => self.parse_reference(&mut value)?,
                    Some('<') => return Err(self.error("'<' in attribute value")),
                    Some(c) => {
                        self.bump();
                        value.push(c);
                    }
                }
            }
            if attrs.iter().any(|(n, _)| *n == name) {
                return Err(self.error(format!("duplicate attribute {}", name)));
            }
            attrs.push((name, value));
        }
    }

    fn parse_reference(&mut self, out: &mut String) -> Result<(), ProtocolError> {
        self.expect("&")?;
        let body = self.take_until(";", "entity reference")?;
        let resolved = match body {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                let code = if let Some(hex) = body.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = body.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
            }
        };
        match resolved {
            Some(c) => {
                out.push(c);
                Ok(())
            }
            None => Err(self.error(format!("unknown entity &{};", body))),
        }
    }

    fn parse_element(&mut self) -> Result<Element, ProtocolError> {
        if self.depth == MAX_DEPTH {
            return Err(self.error(format!("elements nested deeper than {}", MAX_DEPTH)));
        }
        self.depth += 1;
        let element = self.read_element();
        self.depth -= 1;
        element
    }

    fn read_element(&mut self) -> Result<Element, ProtocolError> {
        let line = self.line;
        self.expect("<")?;
        let name = self.parse_name()?;
        let attrs = self.parse_attributes()?;
        let mut element = Element {
            name,
            attrs,
            line,
            ..Default::default()
        };

        if self.starts_with("/>") {
            self.advance(2);
            return Ok(element);
        }
        self.expect(">")?;

        loop {
            if self.at_end() {
                return Err(self.error(format!(
                    "unexpected end of input inside <{}> opened at line {}",
                    element.name, line
                )));
            }
            if self.starts_with("</") {
                self.advance(2);
                let closing = self.parse_name()?;
                if closing != element.name {
                    return Err(self.error(format!(
                        "mismatched end tag </{}>, expected </{}>",
                        closing, element.name
                    )));
                }
                self.skip_space();
                self.expect(">")?;
                return Ok(element);
            } else if self.starts_with("<!--") {
                self.advance(4);
                self.take_until("-->", "comment")?;
            } else if self.starts_with("<![CDATA[") {
                self.advance(9);
                let data = self.take_until("]]>", "CDATA section")?;
                element.text.push_str(data);
            } else if self.starts_with("<?") {
                self.advance(2);
                self.take_until("?>", "processing instruction")?;
            } else if self.starts_with("<") {
                let child = self.parse_element()?;
                element.children.push(child);
            } else if self.starts_with("&") {
                self.parse_reference(&mut element.text)?;
            } else if let Some(c) = self.bump() {
                element.text.push(c);
            }
        }
    }
}
