//! Leak filter applied to streamed model output before it is displayed.
//!
//! Matching is literal and case-insensitive against the exact secret. It is
//! intentionally stricter than [`crate::normalize`]: near-misses are left alone
//! here but still count as wins.

use regex::{NoExpand, Regex, RegexBuilder};
use tracing::warn;

/// Compiled program budget for the secret pattern. Secrets too large even for
/// this are matched with [`Matcher::Literal`].
const PATTERN_SIZE_LIMIT: usize = 64 * (1 << 20);

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    /// Char-by-char case-insensitive scan over the secret.
    Literal(Vec<char>),
}

impl Matcher {
    fn compile(secret: &str) -> Self {
        let pattern = RegexBuilder::new(&regex::escape(secret))
            .case_insensitive(true)
            .size_limit(PATTERN_SIZE_LIMIT)
            .dfa_size_limit(PATTERN_SIZE_LIMIT)
            .build();
        match pattern {
            Ok(re) => Matcher::Pattern(re),
            Err(e) => {
                warn!(secret_len = secret.len(), error = %e, "Secret pattern too large, using literal scan");
                Matcher::Literal(secret.chars().collect())
            }
        }
    }

    fn is_match(&self, haystack: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(haystack),
            Matcher::Literal(needle) => find_literal(haystack, needle, 0).is_some(),
        }
    }

    fn replace_all(&self, haystack: &str, placeholder: &str) -> String {
        match self {
            Matcher::Pattern(re) => re.replace_all(haystack, NoExpand(placeholder)).into_owned(),
            Matcher::Literal(needle) => {
                let mut out = String::with_capacity(haystack.len());
                let mut pos = 0;
                while let Some((start, end)) = find_literal(haystack, needle, pos) {
                    out.push_str(&haystack[pos..start]);
                    out.push_str(placeholder);
                    pos = end;
                }
                out.push_str(&haystack[pos..]);
                out
            }
        }
    }
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Byte range of the first case-insensitive occurrence of `needle` at or after `from`.
fn find_literal(haystack: &str, needle: &[char], from: usize) -> Option<(usize, usize)> {
    let (&first, rest) = needle.split_first()?;
    let tail = &haystack[from..];
    for (offset, c) in tail.char_indices() {
        if !chars_eq_ignore_case(c, first) {
            continue;
        }
        let start = from + offset;
        let mut end = start + c.len_utf8();
        let mut candidate = haystack[end..].chars();
        let matched = rest.iter().all(|&expected| match candidate.next() {
            Some(found) if chars_eq_ignore_case(found, expected) => {
                end += found.len_utf8();
                true
            }
            _ => false,
        });
        if matched {
            return Some((start, end));
        }
    }
    None
}

/// Compiled literal matcher for one secret, reused for every stream increment.
#[derive(Debug, Clone)]
pub struct Redactor {
    matcher: Option<Matcher>,
    placeholder: String,
}

impl Redactor {
    /// Builds a redactor for `secret`. An empty secret matches nothing.
    pub fn new(secret: &str, placeholder: impl Into<String>) -> Self {
        let matcher = if secret.is_empty() {
            None
        } else {
            Some(Matcher::compile(secret))
        };
        Self {
            matcher,
            placeholder: placeholder.into(),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Replaces every occurrence of the secret in `buffer` with the placeholder.
    pub fn redact(&self, buffer: &str) -> String {
        match &self.matcher {
            None => buffer.to_string(),
            Some(matcher) => matcher.replace_all(buffer, &self.placeholder),
        }
    }

    /// Redacts `buffer` in place, returning whether anything was replaced.
    pub fn redact_in_place(&self, buffer: &mut String) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        if !matcher.is_match(buffer.as_str()) {
            return false;
        }
        *buffer = matcher.replace_all(buffer.as_str(), &self.placeholder);
        true
    }
}

/// One-shot form of [`Redactor::redact`].
pub fn redact(buffer: &str, secret: &str, placeholder: &str) -> String {
    Redactor::new(secret, placeholder).redact(buffer)
}
