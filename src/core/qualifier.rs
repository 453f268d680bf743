//! Dataset qualifier normalization and pattern matching.
//!
//! A qualifier is a dot-separated name prefix such as `IBMUSER` or
//! `IBMUSER.*.LOAD`. Within a segment `*` matches any run of characters;
//! `**` matches across segments. A qualifier without wildcards selects the
//! named dataset and everything below it.

use regex::Regex;

use crate::core::errors::{DstError, Result};

/// Longest qualifier accepted (z/OS dataset names cap at 44 characters).
pub const MAX_QUALIFIER_LEN: usize = 44;

/// Normalize user input the way the path field does: trim, and optionally
/// uppercase.
#[must_use]
pub fn normalize(raw: &str, uppercase: bool) -> String {
    let trimmed = raw.trim();
    if uppercase {
        trimmed.to_uppercase()
    } else {
        trimmed.to_string()
    }
}

/// Compiled qualifier pattern.
#[derive(Debug, Clone)]
pub struct QualifierPattern {
    raw: String,
    regex: Regex,
}

impl QualifierPattern {
    /// Validate and compile a qualifier.
    pub fn parse(qualifier: &str) -> Result<Self> {
        let invalid = |details: &str| DstError::InvalidQualifier {
            qualifier: qualifier.to_string(),
            details: details.to_string(),
        };

        if qualifier.is_empty() {
            return Err(invalid("qualifier is empty"));
        }
        if qualifier.len() > MAX_QUALIFIER_LEN {
            return Err(invalid("qualifier exceeds 44 characters"));
        }

        let mut segments: Vec<&str> = qualifier.split('.').collect();
        // `**.**` selects exactly what `**` does.
        segments.dedup_by(|next, prev| *next == "**" && *prev == "**");
        let mut has_wildcard = false;
        let mut body = String::from("(?i)^");
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(invalid("empty qualifier segment"));
            }
            if let Some(bad) = segment
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '@' | '#' | '$' | '-' | '*')))
            {
                return Err(invalid(&format!("unsupported character {bad:?}")));
            }

            let is_last = i + 1 == segments.len();
            if *segment == "**" {
                has_wildcard = true;
                if i == 0 {
                    body.push_str(if is_last { ".*" } else { "(?:[^.]*\\.)*" });
                } else if is_last {
                    // `A.**` also selects `A` itself.
                    body.push_str("(?:\\..*)?");
                } else {
                    body.push_str("(?:\\.[^.]*)*");
                }
                continue;
            }

            // A leading `**` already consumed the separator.
            if i > 0 && !(i == 1 && segments[0] == "**") {
                body.push_str("\\.");
            }
            for ch in segment.chars() {
                if ch == '*' {
                    has_wildcard = true;
                    body.push_str("[^.]*");
                } else {
                    body.push_str(&regex::escape(&ch.to_string()));
                }
            }
        }
        if !has_wildcard {
            body.push_str("(?:\\..*)?");
        }
        body.push('$');

        let regex = Regex::new(&body).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            raw: qualifier.to_string(),
            regex,
        })
    }

    /// Whether a dataset name falls under this qualifier.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The qualifier as entered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
