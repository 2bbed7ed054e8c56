use std::path::{Path, PathBuf};

use axum::http::{header, HeaderMap, HeaderValue};

use crate::compress::sibling;

/// Encodings that may sit next to an asset as a precompressed sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Zstd,
    Gzip,
}

impl Encoding {
    /// Most preferred first.
    const ALL: [Self; 2] = [Self::Zstd, Self::Gzip];

    pub fn token(self) -> &'static str {
        match self {
            Self::Zstd => "zstd",
            Self::Gzip => "gzip",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Zstd => ".zst",
            Self::Gzip => ".gz",
        }
    }

    pub fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.token())
    }

    pub fn sibling_of(self, path: &Path) -> PathBuf {
        sibling(path, self.suffix())
    }

    /// Encodings the client advertises, best first.
    pub fn accepted(headers: &HeaderMap) -> Vec<Self> {
        //a plain substring test, quality values are not honoured
        let accept = headers
            .get(header::ACCEPT_ENCODING)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        Self::ALL
            .into_iter()
            .filter(|enc| accept.contains(enc.token()))
            .collect()
    }
}
