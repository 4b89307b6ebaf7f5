//! JSON extraction from free-form LLM text
//!
//! Models rarely return bare JSON. They wrap it in prose, code fences or
//! trailing explanations. Extraction is an ordered list of [`Strategy`]
//! values: each one tries to locate a JSON-shaped substring, and the first
//! strategy that finds a candidate wins. Locating and parsing are separate
//! steps, so a candidate that fails to parse is a failure, not a reason to
//! try the next strategy.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

use crate::llm::GenerationError;
use crate::log_debug;

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("Failed to compile object regex"));
static GREEDY_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[\s\S]*\]").expect("Failed to compile array regex"));

/// One heuristic for locating a JSON candidate inside LLM output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// First `{` through its matching `}`
    ObjectSpan,
    /// First `[` through its matching `]`
    ArraySpan,
    /// The whole trimmed text, when it starts with `{` or `[`
    WholeText,
    /// From the first line starting with `{` or `[` to the end of the text
    LeadingLine,
}

impl Strategy {
    /// Default order used by the synthesizer
    pub const DEFAULT_ORDER: &'static [Strategy] = &[
        Strategy::ObjectSpan,
        Strategy::ArraySpan,
        Strategy::WholeText,
        Strategy::LeadingLine,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::ObjectSpan => "object-span",
            Self::ArraySpan => "array-span",
            Self::WholeText => "whole-text",
            Self::LeadingLine => "leading-line",
        }
    }

    /// Locate a candidate substring, or `None` if this heuristic does not apply
    pub fn locate(self, text: &str) -> Option<&str> {
        match self {
            Self::ObjectSpan => delimited_span(text, ('{', '}'), ('[', ']'), &GREEDY_OBJECT),
            Self::ArraySpan => delimited_span(text, ('[', ']'), ('{', '}'), &GREEDY_ARRAY),
            Self::WholeText => {
                let trimmed = text.trim();
                starts_like_json(trimmed).then_some(trimmed)
            }
            Self::LeadingLine => {
                let mut offset = 0;
                for line in text.split_inclusive('\n') {
                    let indent = line.len() - line.trim_start().len();
                    if starts_like_json(line.trim_start()) {
                        return Some(text[offset + indent..].trim_end());
                    }
                    offset += line.len();
                }
                None
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of running the strategy list over a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction<'a> {
    Found {
        strategy: Strategy,
        candidate: &'a str,
    },
    NotFound,
}

/// Runs an ordered list of strategies over LLM output
#[derive(Debug, Clone)]
pub struct JsonExtractor {
    strategies: Vec<Strategy>,
}

impl JsonExtractor {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Find the first candidate located by any strategy, in order
    pub fn extract<'a>(&self, text: &'a str) -> Extraction<'a> {
        for &strategy in &self.strategies {
            if let Some(candidate) = strategy.locate(text) {
                log_debug!(
                    "🔍 Extract: {} located {} chars",
                    strategy,
                    candidate.len()
                );
                return Extraction::Found {
                    strategy,
                    candidate,
                };
            }
            log_debug!("Extract: {} found nothing", strategy);
        }
        Extraction::NotFound
    }

    /// Locate and parse a JSON value out of `text`
    pub fn extract_json(&self, text: &str) -> Result<Value, GenerationError> {
        match self.extract(text) {
            Extraction::Found {
                strategy,
                candidate,
            } => serde_json::from_str(candidate).map_err(|source| GenerationError::Parse {
                strategy,
                source,
            }),
            Extraction::NotFound => Err(GenerationError::NoJsonFound),
        }
    }
}

impl Default for JsonExtractor {
    fn default() -> Self {
        Self::new(Strategy::DEFAULT_ORDER.to_vec())
    }
}

fn starts_like_json(text: &str) -> bool {
    text.starts_with('{') || text.starts_with('[')
}

/// Balanced span starting at the first top-level `open`, falling back to the
/// greedy match
///
/// An `open` nested inside an earlier balanced `other` span belongs to that
/// span, so `[{"a":1},{"a":2}]` has no top-level object.
fn delimited_span<'a>(
    text: &'a str,
    (open, close): (char, char),
    other: (char, char),
    greedy: &Regex,
) -> Option<&'a str> {
    let start = first_outer(text, open, other)?;
    if let Some(end) = balanced_end(&text[start..], open, close) {
        return Some(&text[start..start + end]);
    }
    greedy.find(text).map(|m| m.as_str())
}

/// Offset of the first `open` not enclosed by a balanced `other` span
fn first_outer(text: &str, open: char, (other_open, other_close): (char, char)) -> Option<usize> {
    let mut pos = 0;
    loop {
        let candidate = pos + text[pos..].find(open)?;
        let Some(other) = text[pos..candidate].find(other_open).map(|i| pos + i) else {
            return Some(candidate);
        };
        match balanced_end(&text[other..], other_open, other_close) {
            Some(end) => pos = other + end,
            None => return Some(candidate),
        }
    }
}

/// Byte offset just past the delimiter closing the one at the start of `text`
///
/// Delimiters inside JSON string literals are ignored.
fn balanced_end(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i + c.len_utf8());
            }
        }
    }
    None
}
