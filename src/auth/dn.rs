// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Distinguished Name parsing and formatting.
//!
//! Subjects issued by the security service are DN strings such as
//! `uid=jdoe,ou=acme`. The grammar accepted here:
//!
//! - elements are separated by `,`, `;` or `/`; each element is `name=value`
//! - names and values may be double-quoted; inside quotes a quote is written
//!   either doubled (`""`) or backslash-escaped (`\"`)
//! - names and values may be hex-encoded: `#` followed by hex digits, decoded
//!   to raw bytes (see [`DistinguishedName::get_binary`])
//! - in unquoted text a backslash escapes any special character
//!
//! Lookups are case-insensitive on the element name and return the first
//! match. Setting an existing name replaces its value in place.
//!
//! Formatting hex-encodes every component that would not survive a reparse
//! verbatim, so `parse(format(dn)) == dn` holds for any parsed `dn`.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Separators between elements, and between a name and its value.
const DELIMITERS: [char; 4] = [',', ';', '/', '='];

/// Characters that force a component to be hex-encoded on output.
const SPECIAL_CHARS: [char; 10] = [',', '+', '=', '"', '\r', '<', '>', '#', ';', '/'];

const WHITESPACE: [char; 3] = [' ', '\t', '\r'];

/// Errors raised for structurally invalid DN strings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DnError {
    #[error("expected '=' after element name at offset {0}")]
    MissingEquals(usize),

    #[error("empty element name at offset {0}")]
    EmptyName(usize),

    #[error("unterminated quoted string starting at offset {0}")]
    UnterminatedQuote(usize),

    #[error("invalid hex encoding at offset {offset}: {source}")]
    InvalidHex {
        offset: usize,
        #[source]
        source: hex::FromHexError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Element {
    name: String,
    value: Vec<u8>,
}

/// An ordered list of `(name, value)` elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    elements: Vec<Element>,
}

impl DistinguishedName {
    /// Create an empty name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a DN string.
    pub fn parse(input: &str) -> Result<Self, DnError> {
        let mut dn = Self::new();
        let mut cursor = Cursor::new(input);

        loop {
            cursor.skip_while(|c| is_whitespace(c) || matches!(c, ',' | ';' | '/'));
            if cursor.is_at_end() {
                break;
            }

            let name_offset = cursor.pos;
            let name = cursor.component()?;
            if name.is_empty() {
                return Err(DnError::EmptyName(name_offset));
            }

            cursor.skip_while(is_whitespace);
            let equals_offset = cursor.pos;
            if cursor.bump() != Some('=') {
                return Err(DnError::MissingEquals(equals_offset));
            }

            let value = cursor.component()?;
            dn.set_bytes(&String::from_utf8_lossy(&name), value);
        }

        Ok(dn)
    }

    /// Value of the first element called `name`, or an empty string.
    ///
    /// Hex-encoded values that are not valid UTF-8 are decoded lossily; use
    /// [`get_binary`](Self::get_binary) for the raw bytes.
    pub fn get(&self, name: &str) -> String {
        String::from_utf8_lossy(self.get_binary(name)).into_owned()
    }

    /// Raw bytes of the first element called `name`, or an empty slice.
    pub fn get_binary(&self, name: &str) -> &[u8] {
        self.find(name)
            .map_or(&[][..], |index| self.elements[index].value.as_slice())
    }

    /// Set a text value. An existing element keeps its position.
    pub fn set(&mut self, name: &str, value: &str) {
        self.set_bytes(name, value.as_bytes().to_vec());
    }

    /// Set a binary value, written hex-encoded.
    pub fn set_binary(&mut self, name: &str, value: &[u8]) {
        self.set_bytes(name, value.to_vec());
    }

    /// Element names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// `uid=` element.
    pub fn user_id(&self) -> String {
        self.get("uid")
    }

    /// `ou=` element.
    pub fn organizational_unit(&self) -> String {
        self.get("ou")
    }

    /// `o=` element.
    pub fn organization(&self) -> String {
        self.get("o")
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.elements
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    fn set_bytes(&mut self, name: &str, value: Vec<u8>) {
        match self.find(name) {
            Some(index) => self.elements[index].value = value,
            None => self.elements.push(Element {
                name: name.to_string(),
                value,
            }),
        }
    }
}

impl FromStr for DistinguishedName {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                "{}={}",
                encode_component(element.name.as_bytes()),
                encode_component(&element.value)
            )?;
        }
        Ok(())
    }
}

fn is_whitespace(c: char) -> bool {
    WHITESPACE.contains(&c)
}

fn is_escapable(c: char) -> bool {
    c == '\\' || SPECIAL_CHARS.contains(&c)
}

fn encode_component(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) if !needs_encoding(text) => Cow::Borrowed(text),
        _ => Cow::Owned(format!("#{}", hex::encode(bytes))),
    }
}

fn needs_encoding(text: &str) -> bool {
    text.contains(|c: char| is_escapable(c) || c == '\n')
        || text.starts_with(&WHITESPACE[..])
        || text.ends_with(&WHITESPACE[..])
}

/// Byte-offset cursor over the input string.
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.bump();
        }
    }

    /// Read one name or value.
    fn component(&mut self) -> Result<Vec<u8>, DnError> {
        self.skip_while(is_whitespace);
        match self.peek() {
            None => Ok(Vec::new()),
            Some('#') => self.hex(),
            Some('"') => self.quoted().map(String::into_bytes),
            Some(_) => Ok(self.unquoted().into_bytes()),
        }
    }

    fn hex(&mut self) -> Result<Vec<u8>, DnError> {
        let offset = self.pos;
        self.bump();
        let start = self.pos;
        self.skip_while(|c| !DELIMITERS.contains(&c));
        let digits = self.input[start..self.pos].trim_end_matches(&WHITESPACE[..]);
        hex::decode(digits).map_err(|source| DnError::InvalidHex { offset, source })
    }

    fn quoted(&mut self) -> Result<String, DnError> {
        let offset = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(DnError::UnterminatedQuote(offset)),
                Some('\\') => match self.peek() {
                    Some(next) if is_escapable(next) => {
                        out.push(next);
                        self.bump();
                    }
                    _ => out.push('\\'),
                },
                Some('"') if self.peek() == Some('"') => {
                    out.push('"');
                    self.bump();
                }
                Some('"') => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn unquoted(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if DELIMITERS.contains(&c) {
                break;
            }
            self.bump();
            if c == '\\' {
                if let Some(next) = self.peek().filter(|n| is_escapable(*n)) {
                    out.push(next);
                    self.bump();
                    continue;
                }
            }
            out.push(c);
        }
        let trimmed = out.trim_end_matches(&WHITESPACE[..]).len();
        out.truncate(trimmed);
        out
    }
}
