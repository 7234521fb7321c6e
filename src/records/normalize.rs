use serde::Serialize;
use std::fmt;

/// Text that is trimmed and known to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NormalizedText(String);

impl NormalizedText {
    /// Trims `raw`; blank or missing input yields `None`.
    pub fn new(raw: Option<&str>) -> Option<Self> {
        let trimmed = raw?.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(NormalizedText(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a trimmed integer; blank or unparseable input yields `None`.
pub fn normalize_integer(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse().ok()
}

/// Parses `true`/`false` (any case) into 1/0.
pub fn normalize_flag(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    if raw.eq_ignore_ascii_case("true") {
        Some(1)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(0)
    } else {
        None
    }
}
