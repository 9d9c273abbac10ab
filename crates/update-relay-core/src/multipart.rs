// crates/update-relay-core/src/multipart.rs
// ============================================================================
// Module: Multipart Framing
// Description: Byte-exact multipart/mixed bodies for update responses.
// Purpose: Frame manifest, extension, and directive parts for clients.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Update responses are `multipart/mixed` bodies. Each part carries a
//! `Content-Disposition: form-data` line naming the part, a `Content-Type`
//! line, any extra part headers, a blank line, and the body, all separated by
//! CRLF. Boundaries are 28 dashes followed by 24 random decimal digits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::Rng;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Dash prefix of every generated boundary.
pub const BOUNDARY_PREFIX: &str = "----------------------------";
/// Number of random digits following the dash prefix.
pub const BOUNDARY_DIGITS: usize = 24;

/// Line terminator between framing lines.
const CRLF: &[u8] = b"\r\n";

// ============================================================================
// SECTION: Boundary
// ============================================================================

/// Multipart boundary token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    /// Generates a boundary from the supplied random source.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut value = String::with_capacity(BOUNDARY_PREFIX.len() + BOUNDARY_DIGITS);
        value.push_str(BOUNDARY_PREFIX);
        for index in 0 .. BOUNDARY_DIGITS {
            let low = if index == 0 { 1 } else { 0 };
            let digit: u8 = rng.gen_range(low .. 10);
            value.push(char::from(b'0' + digit));
        }
        Self(value)
    }

    /// Generates a boundary from the thread-local random source.
    #[must_use]
    pub fn random() -> Self {
        Self::generate(&mut rand::thread_rng())
    }

    /// Returns the boundary token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the `Content-Type` header value for a body using this boundary.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.0)
    }
}

// ============================================================================
// SECTION: Parts
// ============================================================================

/// One multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Form-data field name.
    pub name: String,
    /// Form-data filename.
    pub filename: String,
    /// Part content type.
    pub content_type: String,
    /// Extra part headers emitted after the content type.
    pub headers: Vec<(String, String)>,
    /// Part body.
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a part with no extra headers.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds an extra part header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends the delimiter, headers, and body.
    fn write_to(&self, boundary: &Boundary, out: &mut Vec<u8>) {
        out.extend_from_slice(b"--");
        out.extend_from_slice(boundary.as_str().as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                self.name, self.filename
            )
            .as_bytes(),
        );
        out.extend_from_slice(CRLF);
        out.extend_from_slice(format!("Content-Type: {}", self.content_type).as_bytes());
        out.extend_from_slice(CRLF);
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}").as_bytes());
            out.extend_from_slice(CRLF);
        }
        out.extend_from_slice(CRLF);
        out.extend_from_slice(&self.body);
        out.extend_from_slice(CRLF);
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Accumulates parts and renders the final body.
#[derive(Debug, Clone)]
pub struct MultipartBuilder {
    /// Boundary shared by all parts.
    boundary: Boundary,
    /// Parts in output order.
    parts: Vec<Part>,
}

impl MultipartBuilder {
    /// Creates a builder for the given boundary.
    #[must_use]
    pub const fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            parts: Vec::new(),
        }
    }

    /// Returns the boundary in use.
    #[must_use]
    pub const fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Appends a part.
    pub fn push(&mut self, part: Part) -> &mut Self {
        self.parts.push(part);
        self
    }

    /// Renders every part followed by the closing delimiter.
    #[must_use]
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            part.write_to(&self.boundary, &mut out);
        }
        out.extend_from_slice(b"--");
        out.extend_from_slice(self.boundary.as_str().as_bytes());
        out.extend_from_slice(b"--");
        out.extend_from_slice(CRLF);
        out
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn boundary_has_prefix_and_nonzero_leading_digit() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0 .. 64 {
            let boundary = Boundary::generate(&mut rng);
            let digits = boundary.as_str().strip_prefix(BOUNDARY_PREFIX).unwrap_or_default();
            assert_eq!(digits.len(), BOUNDARY_DIGITS);
            assert!(digits.bytes().all(|b| b.is_ascii_digit()));
            assert_ne!(digits.as_bytes().first(), Some(&b'0'));
        }
    }

    #[test]
    fn body_layout_is_byte_exact() {
        let boundary = Boundary("----------------------------123".to_string());
        let mut builder = MultipartBuilder::new(boundary);
        builder.push(
            Part::new("manifest", "manifest", "application/json; charset=utf-8", "{}")
                .with_header("expo-signature", "sig=\"x\""),
        );
        let body = builder.finish();
        let expected = "------------------------------123\r\n\
Content-Disposition: form-data; name=\"manifest\"; filename=\"manifest\"\r\n\
Content-Type: application/json; charset=utf-8\r\n\
expo-signature: sig=\"x\"\r\n\
\r\n\
{}\r\n\
------------------------------123--\r\n";
        assert_eq!(String::from_utf8_lossy(&body), expected);
    }
}
