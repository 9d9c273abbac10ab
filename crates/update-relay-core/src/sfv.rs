// crates/update-relay-core/src/sfv.rs
// ============================================================================
// Module: Structured Field Dictionaries
// Description: RFC 8941 dictionary serialization and parsing.
// Purpose: Render and read the `expo-signature` header value.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A minimal structured-field dictionary codec covering the bare item kinds
//! the update protocol uses: strings, tokens, integers, and booleans, each
//! with optional parameters. Serialization joins members with `"; "`, which
//! RFC 8941 parsers read as parameters on the preceding member; the parser
//! here follows the RFC grammar so it agrees with client-side parsers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Largest magnitude an RFC 8941 integer may carry.
pub const MAX_INTEGER: i64 = 999_999_999_999_999;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the structured-field codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SfvError {
    /// Key violates the `lcalpha / "*"` key grammar.
    #[error("invalid structured field key: `{0}`")]
    InvalidKey(String),
    /// String contains characters outside printable ASCII.
    #[error("invalid structured field string: `{0}`")]
    InvalidString(String),
    /// Token violates the token grammar.
    #[error("invalid structured field token: `{0}`")]
    InvalidToken(String),
    /// Integer is out of range.
    #[error("structured field integer out of range: {0}")]
    IntegerOutOfRange(i64),
    /// Input could not be parsed.
    #[error("structured field parse error at byte {position}: {message}")]
    Parse {
        /// Byte offset where parsing failed.
        position: usize,
        /// Failure description.
        message: String,
    },
}

// ============================================================================
// SECTION: Items
// ============================================================================

/// Bare item value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BareItem {
    /// Quoted string.
    String(String),
    /// Unquoted token.
    Token(String),
    /// Decimal integer.
    Integer(i64),
    /// Boolean (`?1` / `?0`).
    Boolean(bool),
}

impl BareItem {
    /// Returns the string payload of a string item.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Appends the serialized item to `out`.
    fn serialize_into(&self, out: &mut String) -> Result<(), SfvError> {
        match self {
            Self::String(value) => {
                if !value.bytes().all(|b| (0x20 ..= 0x7e).contains(&b)) {
                    return Err(SfvError::InvalidString(value.clone()));
                }
                out.push('"');
                for ch in value.chars() {
                    if ch == '\\' || ch == '"' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('"');
            }
            Self::Token(value) => {
                if !is_valid_token(value) {
                    return Err(SfvError::InvalidToken(value.clone()));
                }
                out.push_str(value);
            }
            Self::Integer(value) => {
                if value.unsigned_abs() > MAX_INTEGER.unsigned_abs() {
                    return Err(SfvError::IntegerOutOfRange(*value));
                }
                let _ = write!(out, "{value}");
            }
            Self::Boolean(value) => out.push_str(if *value { "?1" } else { "?0" }),
        }
        Ok(())
    }
}

/// One dictionary member with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Member key.
    pub key: String,
    /// Member value.
    pub value: BareItem,
    /// Ordered parameters attached to the value.
    pub params: Vec<(String, BareItem)>,
}

impl Member {
    /// Returns a parameter value by key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&BareItem> {
        self.params.iter().find(|(name, _)| name == key).map(|(_, value)| value)
    }
}

// ============================================================================
// SECTION: Dictionary
// ============================================================================

/// Ordered structured-field dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    /// Members in insertion order.
    members: Vec<Member>,
}

impl Dictionary {
    /// Creates an empty dictionary.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// Inserts a member without parameters, replacing any existing value.
    pub fn insert(&mut self, key: impl Into<String>, value: BareItem) {
        self.insert_with_params(key, value, Vec::new());
    }

    /// Inserts a member with parameters, replacing any existing value in place.
    pub fn insert_with_params(
        &mut self,
        key: impl Into<String>,
        value: BareItem,
        params: Vec<(String, BareItem)>,
    ) {
        let key = key.into();
        if let Some(existing) = self.members.iter_mut().find(|member| member.key == key) {
            existing.value = value;
            existing.params = params;
            return;
        }
        self.members.push(Member {
            key,
            value,
            params,
        });
    }

    /// Returns a member by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Member> {
        self.members.iter().find(|member| member.key == key)
    }

    /// Returns the members in insertion order.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true when the dictionary has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Serializes members as `key=value;param=value`, joined by `"; "`.
    ///
    /// # Errors
    ///
    /// Returns [`SfvError`] when a key, string, token, or integer is invalid.
    pub fn serialize(&self) -> Result<String, SfvError> {
        let mut out = String::new();
        for (index, member) in self.members.iter().enumerate() {
            if index > 0 {
                out.push_str("; ");
            }
            validate_key(&member.key)?;
            out.push_str(&member.key);
            out.push('=');
            member.value.serialize_into(&mut out)?;
            for (name, value) in &member.params {
                validate_key(name)?;
                out.push(';');
                out.push_str(name);
                if *value != BareItem::Boolean(true) {
                    out.push('=');
                    value.serialize_into(&mut out)?;
                }
            }
        }
        Ok(out)
    }

    /// Parses a dictionary following the RFC 8941 grammar.
    ///
    /// # Errors
    ///
    /// Returns [`SfvError::Parse`] when the input is malformed.
    pub fn parse(input: &str) -> Result<Self, SfvError> {
        Parser::new(input).parse_dictionary()
    }
}

// ============================================================================
// SECTION: Grammar Helpers
// ============================================================================

/// Validates a dictionary or parameter key.
///
/// # Errors
///
/// Returns [`SfvError::InvalidKey`] when the key is empty or malformed.
pub fn validate_key(key: &str) -> Result<(), SfvError> {
    let mut bytes = key.bytes();
    let valid = match bytes.next() {
        Some(first) if first.is_ascii_lowercase() || first == b'*' => bytes.all(|b| {
            b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.' | b'*')
        }),
        _ => false,
    };
    if valid { Ok(()) } else { Err(SfvError::InvalidKey(key.to_string())) }
}

/// Returns true for RFC 9110 token characters.
fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// Returns true when `value` is a valid token.
fn is_valid_token(value: &str) -> bool {
    let mut bytes = value.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() || first == b'*' => {
            bytes.all(|b| is_tchar(b) || b == b':' || b == b'/')
        }
        _ => false,
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Cursor over a header value.
struct Parser<'a> {
    /// Input bytes.
    bytes: &'a [u8],
    /// Current offset.
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser at the start of `input`.
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Returns the current byte.
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Builds a parse error at the current offset.
    fn error(&self, message: &str) -> SfvError {
        SfvError::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Skips spaces.
    fn skip_sp(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    /// Skips optional whitespace.
    fn skip_ows(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    /// Parses a complete dictionary.
    fn parse_dictionary(mut self) -> Result<Dictionary, SfvError> {
        let mut dictionary = Dictionary::new();
        self.skip_sp();
        if self.peek().is_none() {
            return Ok(dictionary);
        }
        loop {
            let key = self.parse_key()?;
            let value = if self.peek() == Some(b'=') {
                self.pos += 1;
                self.parse_bare_item()?
            } else {
                BareItem::Boolean(true)
            };
            let params = self.parse_parameters()?;
            dictionary.insert_with_params(key, value, params);
            self.skip_ows();
            match self.peek() {
                None => return Ok(dictionary),
                Some(b',') => {
                    self.pos += 1;
                    self.skip_ows();
                    if self.peek().is_none() {
                        return Err(self.error("trailing comma"));
                    }
                }
                Some(_) => return Err(self.error("expected comma between members")),
            }
        }
    }

    /// Parses `;key=value` parameters.
    fn parse_parameters(&mut self) -> Result<Vec<(String, BareItem)>, SfvError> {
        let mut params: Vec<(String, BareItem)> = Vec::new();
        while self.peek() == Some(b';') {
            self.pos += 1;
            self.skip_sp();
            let key = self.parse_key()?;
            let value = if self.peek() == Some(b'=') {
                self.pos += 1;
                self.parse_bare_item()?
            } else {
                BareItem::Boolean(true)
            };
            if let Some(existing) = params.iter_mut().find(|(name, _)| *name == key) {
                existing.1 = value;
            } else {
                params.push((key, value));
            }
        }
        Ok(params)
    }

    /// Parses a dictionary or parameter key.
    fn parse_key(&mut self) -> Result<String, SfvError> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_lowercase() || b == b'*' => self.pos += 1,
            _ => return Err(self.error("expected key")),
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_lowercase()
                || b.is_ascii_digit()
                || matches!(b, b'_' | b'-' | b'.' | b'*')
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(self.slice(start))
    }

    /// Parses a string, token, boolean, or integer.
    fn parse_bare_item(&mut self) -> Result<BareItem, SfvError> {
        match self.peek() {
            Some(b'"') => self.parse_string(),
            Some(b'?') => self.parse_boolean(),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.parse_integer(),
            Some(b) if b.is_ascii_alphabetic() || b == b'*' => Ok(self.parse_token()),
            _ => Err(self.error("expected bare item")),
        }
    }

    /// Parses a quoted string.
    fn parse_string(&mut self) -> Result<BareItem, SfvError> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match b {
                b'"' => return Ok(BareItem::String(value)),
                b'\\' => match self.peek() {
                    Some(escaped @ (b'"' | b'\\')) => {
                        self.pos += 1;
                        value.push(char::from(escaped));
                    }
                    _ => return Err(self.error("invalid escape")),
                },
                0x20 ..= 0x7e => value.push(char::from(b)),
                _ => return Err(self.error("invalid string character")),
            }
        }
    }

    /// Parses `?0` or `?1`.
    fn parse_boolean(&mut self) -> Result<BareItem, SfvError> {
        self.pos += 1;
        let value = match self.peek() {
            Some(b'1') => true,
            Some(b'0') => false,
            _ => return Err(self.error("invalid boolean")),
        };
        self.pos += 1;
        Ok(BareItem::Boolean(value))
    }

    /// Parses a decimal integer.
    fn parse_integer(&mut self) -> Result<BareItem, SfvError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits = self.pos - digits_start;
        if digits == 0 || digits > 15 {
            return Err(self.error("invalid integer"));
        }
        if self.peek() == Some(b'.') {
            return Err(self.error("decimals are not supported"));
        }
        self.slice(start)
            .parse::<i64>()
            .map(BareItem::Integer)
            .map_err(|_| self.error("invalid integer"))
    }

    /// Parses a token.
    fn parse_token(&mut self) -> BareItem {
        let start = self.pos;
        self.pos += 1;
        while matches!(self.peek(), Some(b) if is_tchar(b) || b == b':' || b == b'/') {
            self.pos += 1;
        }
        BareItem::Token(self.slice(start))
    }

    /// Returns the input from `start` to the cursor.
    fn slice(&self, start: usize) -> String {
        self.bytes
            .get(start .. self.pos)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
