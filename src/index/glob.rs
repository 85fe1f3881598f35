//! Glob Matcher - per-segment pattern matching for hierarchical names
//!
//! A pattern such as `metric.{f*,demo}.cpu[0-3]` is split on `.` and every
//! segment compiled once:
//!
//! ```text
//! metric      → Literal("metric")      (direct child lookup)
//! {f*,demo}   → Regex(^(?:f.*|demo)$)
//! cpu[0-3]    → Regex(^cpu[0-3]$)
//! ```
//!
//! Matching is segment-count exact: `a.*` never matches `a.b.c`.

use crate::index::{IndexError, IndexResult};
use regex::Regex;

/// Matcher for a single path segment
#[derive(Debug, Clone)]
pub enum SegmentMatcher {
    Literal(String),
    /// Bare `*`
    Any,
    Pattern(Regex),
}

impl SegmentMatcher {
    pub fn matches(&self, segment: &str) -> bool {
        match self {
            SegmentMatcher::Literal(lit) => lit == segment,
            SegmentMatcher::Any => true,
            SegmentMatcher::Pattern(re) => re.is_match(segment),
        }
    }
}

/// Compiled multi-segment glob
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    segments: Vec<SegmentMatcher>,
}

impl GlobMatcher {
    /// Compile a dotted glob pattern
    pub fn compile(pattern: &str) -> IndexResult<Self> {
        if pattern.is_empty() {
            return Err(IndexError::Pattern("empty pattern".to_string()));
        }

        let segments = pattern
            .split('.')
            .map(compile_segment)
            .collect::<IndexResult<Vec<_>>>()?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[SegmentMatcher] {
        &self.segments
    }

    /// Match a full dotted path
    pub fn matches_path(&self, path: &str) -> bool {
        let mut parts = path.split('.');
        for matcher in &self.segments {
            match parts.next() {
                Some(part) if matcher.matches(part) => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

fn compile_segment(segment: &str) -> IndexResult<SegmentMatcher> {
    if segment == "*" {
        return Ok(SegmentMatcher::Any);
    }
    if !segment.contains(['*', '?', '[', ']', '{', '}']) {
        return Ok(SegmentMatcher::Literal(segment.to_string()));
    }

    let mut re = String::with_capacity(segment.len() * 2 + 8);
    re.push_str("^(?:");

    let mut in_brace = false;
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for cc in chars.by_ref() {
                    if cc == ']' {
                        closed = true;
                        break;
                    }
                    class.push(cc);
                }
                if !closed {
                    return Err(unbalanced(segment, '['));
                }
                if class.is_empty() {
                    return Err(IndexError::Pattern(format!(
                        "empty character class in {:?}",
                        segment
                    )));
                }
                re.push('[');
                let body = match class.strip_prefix('!') {
                    Some(rest) => {
                        re.push('^');
                        rest
                    }
                    None => class.as_str(),
                };
                for cc in body.chars() {
                    if matches!(cc, '[' | '\\' | '&' | '~') {
                        re.push('\\');
                    }
                    re.push(cc);
                }
                re.push(']');
            }
            ']' => return Err(unbalanced(segment, ']')),
            '{' => {
                if in_brace {
                    return Err(IndexError::Pattern(format!(
                        "nested alternation in {:?}",
                        segment
                    )));
                }
                in_brace = true;
                re.push_str("(?:");
            }
            '}' => {
                if !in_brace {
                    return Err(unbalanced(segment, '}'));
                }
                in_brace = false;
                re.push(')');
            }
            ',' if in_brace => re.push('|'),
            other => {
                let mut buf = [0u8; 4];
                re.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }

    if in_brace {
        return Err(unbalanced(segment, '{'));
    }
    re.push_str(")$");

    Regex::new(&re)
        .map(SegmentMatcher::Pattern)
        .map_err(|e| IndexError::Pattern(format!("{:?}: {}", segment, e)))
}

fn unbalanced(segment: &str, c: char) -> IndexError {
    IndexError::Pattern(format!("unbalanced '{}' in {:?}", c, segment))
}
