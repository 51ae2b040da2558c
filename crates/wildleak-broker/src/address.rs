// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hierarchical address names and wildcard matching.
//!
//! Addresses are delimiter-separated segments (`publish/org/user`). A pattern
//! may contain the single-word token (`+`, exactly one segment) and the
//! any-words token (`#`, zero or more segments).

use crate::error::{BrokerError, Result};
use crate::settings::WildcardConfig;

/// One parsed segment of an address pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    SingleWord,
    AnyWords,
}

/// A parsed address that may contain wildcard tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPattern {
    raw: String,
    segments: Vec<Segment>,
    wildcard: bool,
}

impl AddressPattern {
    /// Parse an address using the given wildcard syntax.
    pub fn parse(address: &str, config: &WildcardConfig) -> Self {
        let single = config.single_word.to_string();
        let any = config.any_words.to_string();
        let segments: Vec<Segment> = address
            .split(config.delimiter)
            .map(|s| {
                if s == single {
                    Segment::SingleWord
                } else if s == any {
                    Segment::AnyWords
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        let wildcard = segments.iter().any(|s| !matches!(s, Segment::Literal(_)));
        Self {
            raw: address.to_string(),
            segments,
            wildcard,
        }
    }

    /// The original address text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if the pattern contains at least one wildcard token.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Check whether a concrete address matches this pattern.
    pub fn matches(&self, concrete: &str, config: &WildcardConfig) -> bool {
        if !self.wildcard {
            return self.raw == concrete;
        }
        let words: Vec<&str> = concrete.split(config.delimiter).collect();
        match_segments(&self.segments, &words)
    }
}

fn match_segments(pattern: &[Segment], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((Segment::AnyWords, rest)) => {
            // Zero or more words
            (0..=words.len()).any(|skip| match_segments(rest, &words[skip..]))
        }
        Some((Segment::SingleWord, rest)) => !words.is_empty() && match_segments(rest, &words[1..]),
        Some((Segment::Literal(lit), rest)) => {
            !words.is_empty() && words[0] == lit && match_segments(rest, &words[1..])
        }
    }
}

/// Reject names the broker cannot route.
pub fn validate_address(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BrokerError::InvalidAddress("empty address".into()));
    }
    if name.chars().any(char::is_control) {
        return Err(BrokerError::InvalidAddress(format!(
            "control character in '{}'",
            name.escape_debug()
        )));
    }
    Ok(())
}

/// True if `name` contains wildcard tokens under `config`.
pub fn is_wildcard(name: &str, config: &WildcardConfig) -> bool {
    AddressPattern::parse(name, config).is_wildcard()
}
