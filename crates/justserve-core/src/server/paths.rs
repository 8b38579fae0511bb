//! Request path decoding and URL encoding.

use std::path::{Path, PathBuf};

/// A decoded, normalized request path that cannot climb above the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    segments: Vec<String>,
    trailing_slash: bool,
}

impl RequestPath {
    /// Decode and normalize the path component of a request URI.
    ///
    /// `.` segments are dropped and `..` pops one segment, stopping at the
    /// root. Returns `None` for invalid percent escapes, non UTF-8 input,
    /// and segments containing NUL or a backslash.
    pub fn parse(raw: &str) -> Option<Self> {
        let decoded = percent_decode(raw)?;
        let mut segments: Vec<String> = Vec::new();

        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s if s.contains('\0') || s.contains('\\') => return None,
                s => segments.push(s.to_string()),
            }
        }

        let trailing_slash = decoded.ends_with('/') && !segments.is_empty();
        Some(Self {
            segments,
            trailing_slash,
        })
    }

    /// Whether this is the served root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the client asked for a slash-terminated path.
    pub fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// The normalized path as shown to users, starting with `/`.
    pub fn display(&self) -> String {
        let mut out = format!("/{}", self.segments.join("/"));
        if self.trailing_slash {
            out.push('/');
        }
        out
    }

    /// The same path with a trailing slash, percent-encoded for a `Location`.
    pub fn slash_terminated_href(&self) -> String {
        let mut out = encode_path(&format!("/{}", self.segments.join("/")));
        if !out.ends_with('/') {
            out.push('/');
        }
        out
    }

    /// Map onto the filesystem below `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encode one path segment for use in an `href`.
pub fn encode_href(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for &b in segment.as_bytes() {
        if is_unreserved(b) {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Percent-encode a `/`-separated path, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/').map(encode_href).collect::<Vec<_>>().join("/")
}
