//! Path pattern matching with specificity-ordered lookup.
//!
//! Gateway routes are declared as `/`-separated patterns built from four
//! segment kinds: literals, `:name` parameters, `*` single-segment wildcards,
//! and a trailing `**` catch-all. Patterns are compiled once at gateway
//! construction and ordered by specificity so the first matching pattern in
//! iteration order is always the most specific one for any request path.

use ahash::HashMap as AHashMap;
use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised while compiling a route pattern.
#[derive(Error, Debug, PartialEq)]
pub enum PatternError {
    /// The pattern is structurally invalid (empty segment name, missing
    /// leading slash, or malformed wildcard).
    #[error("Invalid route pattern: {pattern}")]
    InvalidPattern {
        /// The offending pattern string
        pattern: String,
    },

    /// `**` appeared somewhere other than the final segment.
    #[error("Catch-all '**' must be the last segment: {pattern}")]
    MisplacedCatchAll {
        /// The offending pattern string
        pattern: String,
    },
}

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// Exact-text segment, compared case-sensitively
    Literal(String),
    /// `:name`, capturing exactly one path segment under `name`
    Param(String),
    /// `*`, matching exactly one path segment without capturing
    Wildcard,
    /// `**`, matching zero or more trailing segments
    CatchAll,
}

impl Segment {
    /// Specificity score used for ordering: literal > param > wildcard > catch-all.
    fn score(&self) -> u8 {
        match self {
            Segment::Literal(_) => 3,
            Segment::Param(_) => 2,
            Segment::Wildcard => 1,
            Segment::CatchAll => 0,
        }
    }
}

/// Result of a successful pattern match.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// Captured `:name` parameters in pattern order
    pub params: AHashMap<String, String>,
    /// The path remainder consumed by a trailing `**`, without a leading
    /// slash. `None` when the pattern has no catch-all; `Some("")` when the
    /// catch-all matched zero segments.
    pub remaining_path: Option<String>,
}

/// A route pattern compiled for repeated matching.
///
/// Compilation validates the pattern shape up front so matching itself is
/// infallible. The compiled form is immutable and safe to share across
/// worker threads.
///
/// # Examples
///
/// ```rust
/// use vanguard_rs::utils::pattern::RoutePattern;
///
/// let pattern = RoutePattern::parse("/api/users/:id").unwrap();
/// let m = pattern.matches("/api/users/42").unwrap();
/// assert_eq!(m.params.get("id").map(String::as_str), Some("42"));
/// assert!(pattern.matches("/api/users").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
    has_catch_all: bool,
}

impl RoutePattern {
    /// Compiles a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidPattern`] when the pattern does not
    /// start with `/`, contains an empty `:param` name, or contains an empty
    /// non-root segment. Returns [`PatternError::MisplacedCatchAll`] when
    /// `**` is not the final segment.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::InvalidPattern {
                pattern: pattern.to_string(),
            });
        }

        let normalized = normalize_path(pattern);
        let parts = split_segments(&normalized);
        let mut segments = Vec::with_capacity(parts.len());

        for (index, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" => Segment::CatchAll,
                "*" => Segment::Wildcard,
                s if s.starts_with(':') => {
                    let name = &s[1..];
                    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                        return Err(PatternError::InvalidPattern {
                            pattern: pattern.to_string(),
                        });
                    }
                    Segment::Param(name.to_string())
                }
                s => Segment::Literal(s.to_string()),
            };

            if segment == Segment::CatchAll && index + 1 != parts.len() {
                return Err(PatternError::MisplacedCatchAll {
                    pattern: pattern.to_string(),
                });
            }

            segments.push(segment);
        }

        let has_catch_all = matches!(segments.last(), Some(Segment::CatchAll));

        Ok(Self {
            raw: normalized,
            segments,
            has_catch_all,
        })
    }

    /// The normalized pattern string this was compiled from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern ends in a `**` catch-all.
    pub fn has_catch_all(&self) -> bool {
        self.has_catch_all
    }

    /// Evaluates the pattern against a normalized request path.
    ///
    /// Matching is deterministic and allocation-light: the same pattern and
    /// path always produce the same result. Segment counts must agree unless
    /// the pattern ends in `**`, in which case the path may carry zero or
    /// more extra segments which are exposed as `remaining_path`.
    pub fn matches(&self, path: &str) -> Option<PatternMatch> {
        let normalized = normalize_path(path);
        let path_segments = split_segments(&normalized);

        let fixed_len = if self.has_catch_all {
            self.segments.len() - 1
        } else {
            self.segments.len()
        };

        if self.has_catch_all {
            if path_segments.len() < fixed_len {
                return None;
            }
        } else if path_segments.len() != fixed_len {
            return None;
        }

        let mut params = AHashMap::default();

        for (segment, part) in self.segments.iter().zip(path_segments.iter()) {
            match segment {
                Segment::Literal(text) => {
                    if text != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
                Segment::Wildcard => {}
                Segment::CatchAll => break,
            }
        }

        let remaining_path = if self.has_catch_all {
            Some(path_segments[fixed_len..].join("/"))
        } else {
            None
        };

        Some(PatternMatch {
            params,
            remaining_path,
        })
    }

    /// Per-segment specificity scores, most significant first.
    fn specificity(&self) -> Vec<u8> {
        self.segments.iter().map(Segment::score).collect()
    }
}

/// Total specificity order over patterns.
///
/// Scores are compared lexicographically per segment; when one pattern is a
/// prefix of the other's score vector, the shorter pattern ranks first (an
/// exact route beats its own catch-all extension, and a longer literal
/// prefix beats a shorter catch-all). Ties fall back to the raw pattern
/// string so the order is total and stable across calls.
pub fn compare_specificity(a: &RoutePattern, b: &RoutePattern) -> Ordering {
    let sa = a.specificity();
    let sb = b.specificity();

    for pair in sa.iter().zip(sb.iter()) {
        match pair.1.cmp(pair.0) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    match sa.len().cmp(&sb.len()) {
        Ordering::Equal => a.raw.cmp(&b.raw),
        // Shorter score vector wins the shared-prefix tie: the extra
        // segments can only make the longer pattern less exact for the
        // paths both accept (a trailing catch-all).
        other => other,
    }
}

/// Sorts patterns most-specific-first.
///
/// Idempotent and permutation-invariant: any input ordering of the same
/// pattern set produces the same output ordering.
pub fn sort_by_specificity(patterns: &mut [RoutePattern]) {
    patterns.sort_by(compare_specificity);
}

/// Normalizes a path to a canonical form: leading slash, no trailing slash
/// except for the root path, empty interior segments collapsed.
pub fn normalize_path(path: &str) -> String {
    let trimmed: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if trimmed.is_empty() {
        return "/".to_string();
    }
    format!("/{}", trimmed.join("/"))
}

fn split_segments(normalized: &str) -> Vec<&str> {
    normalized.split('/').filter(|s| !s.is_empty()).collect()
}
