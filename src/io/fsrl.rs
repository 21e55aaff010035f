//! Content locators.
//!
//! An [`Fsrl`] names the origin of a byte source and may carry checksums
//! computed earlier (for example by a file system browser that already
//! hashed the file). The string form is `file://<path>` followed by optional
//! `?MD5=<hex>` and `SHA256=<hex>` query parameters. `%`, `?` and `&` in the
//! path are percent-encoded so the query stays unambiguous.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::io::error::IoError;

const SCHEME: &str = "file://";

fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => out.push_str("%25"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            _ => out.push(c),
        }
    }
    out
}

fn decode_path(encoded: &str) -> Option<String> {
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = rest.get(pos + 1..pos + 3)?;
        out.push(match escape.to_ascii_uppercase().as_str() {
            "25" => '%',
            "3F" => '?',
            "26" => '&',
            _ => return None,
        });
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

/// Structured reference to the origin of a byte source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fsrl {
    path: String,
    md5: Option<String>,
    sha256: Option<String>,
}

impl Fsrl {
    /// Locator for a path with no precomputed checksums.
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            md5: None,
            sha256: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path component, used as the canonical program name.
    pub fn name(&self) -> &str {
        let trimmed = self.path.trim_end_matches(['/', '\\']);
        trimmed
            .rsplit(['/', '\\'])
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or(trimmed)
    }

    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    /// Copy of this locator carrying the given MD5 hex digest.
    pub fn with_md5(&self, md5: impl Into<String>) -> Self {
        Self {
            md5: Some(md5.into().to_ascii_lowercase()),
            ..self.clone()
        }
    }

    /// Copy of this locator carrying the given SHA-256 hex digest.
    pub fn with_sha256(&self, sha256: impl Into<String>) -> Self {
        Self {
            sha256: Some(sha256.into().to_ascii_lowercase()),
            ..self.clone()
        }
    }
}

impl fmt::Display for Fsrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SCHEME, encode_path(&self.path))?;
        let mut sep = '?';
        if let Some(md5) = &self.md5 {
            write!(f, "{}MD5={}", sep, md5)?;
            sep = '&';
        }
        if let Some(sha256) = &self.sha256 {
            write!(f, "{}SHA256={}", sep, sha256)?;
        }
        Ok(())
    }
}

impl FromStr for Fsrl {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| IoError::MalformedLocator(s.to_string()))?;
        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };
        if path.is_empty() {
            return Err(IoError::MalformedLocator(s.to_string()));
        }

        let path = decode_path(path).ok_or_else(|| IoError::MalformedLocator(s.to_string()))?;
        let mut fsrl = Fsrl::from_path(path);
        for param in query.into_iter().flat_map(|q| q.split('&')) {
            match param.split_once('=') {
                Some(("MD5", v)) if !v.is_empty() => fsrl.md5 = Some(v.to_ascii_lowercase()),
                Some(("SHA256", v)) if !v.is_empty() => {
                    fsrl.sha256 = Some(v.to_ascii_lowercase())
                }
                _ => return Err(IoError::MalformedLocator(s.to_string())),
            }
        }
        Ok(fsrl)
    }
}
