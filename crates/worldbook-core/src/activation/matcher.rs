//! Keyword matching for a single entry against a scan buffer.
//!
//! Each key is tested in exactly one mode:
//! - regex: the key is the pattern (case-insensitive unless `case_sensitive`)
//! - whole-word: the escaped key wrapped in `\b...\b`
//! - substring: plain `contains`, case-folded unless `case_sensitive`
//!
//! A key that fails to compile is a non-match for that key only.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::config::DEFAULT_REGEX_SIZE_LIMIT;
use crate::error::{WorldbookError, WorldbookResult};
use crate::types::{SelectiveLogic, WorldbookEntry};

/// Result of matching one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    /// Matching primary keys plus the secondary-logic bonus.
    pub score: f64,
}

impl MatchOutcome {
    /// A non-match with zero score.
    pub const MISS: Self = Self {
        matched: false,
        score: 0.0,
    };

    fn hit(score: f64) -> Self {
        Self {
            matched: true,
            score,
        }
    }
}

/// Per-key matching flags taken from an entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyFlags {
    pub use_regex: bool,
    pub whole_words: bool,
    pub case_sensitive: bool,
}

impl From<&WorldbookEntry> for KeyFlags {
    fn from(entry: &WorldbookEntry) -> Self {
        Self {
            use_regex: entry.use_regex,
            whole_words: entry.match_whole_words,
            case_sensitive: entry.case_sensitive,
        }
    }
}

/// Evaluates primary/secondary key logic.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    regex_size_limit: usize,
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_REGEX_SIZE_LIMIT)
    }
}

impl KeywordMatcher {
    /// Create a matcher that caps compiled regex size at `regex_size_limit` bytes.
    pub fn new(regex_size_limit: usize) -> Self {
        Self { regex_size_limit }
    }

    /// Match an entry's keys against `buffer`.
    ///
    /// Score bonus per secondary logic mode:
    /// - `AndAny`: +1 per secondary hit (requires at least one)
    /// - `AndAll`: +1 per secondary key (requires all to hit)
    /// - `NotAny`: +0.5 (requires zero hits)
    /// - `NotAll`: +0.5 per missing secondary key (requires at least one miss)
    pub fn evaluate(&self, entry: &WorldbookEntry, buffer: &str) -> MatchOutcome {
        let flags = KeyFlags::from(entry);
        let folded = (!flags.case_sensitive).then(|| buffer.to_lowercase());
        let haystack = Haystack {
            raw: buffer,
            folded: folded.as_deref(),
        };

        let primary_hits = entry
            .active_keys()
            .filter(|key| self.test_key(key, &haystack, flags))
            .count();
        if primary_hits == 0 {
            return MatchOutcome::MISS;
        }
        let score = primary_hits as f64;

        let secondary: Vec<&str> = entry.active_secondary_keys().collect();
        if secondary.is_empty() {
            return MatchOutcome::hit(score);
        }

        let total = secondary.len();
        let hits = secondary
            .iter()
            .filter(|key| self.test_key(key, &haystack, flags))
            .count();

        match entry.selective_logic {
            SelectiveLogic::AndAny if hits > 0 => MatchOutcome::hit(score + hits as f64),
            SelectiveLogic::AndAll if hits == total => MatchOutcome::hit(score + total as f64),
            SelectiveLogic::NotAny if hits == 0 => MatchOutcome::hit(score + 0.5),
            SelectiveLogic::NotAll if hits < total => {
                MatchOutcome::hit(score + (total - hits) as f64 * 0.5)
            }
            _ => MatchOutcome::MISS,
        }
    }

    /// Test a single key against `buffer`.
    pub fn key_matches(&self, key: &str, buffer: &str, flags: KeyFlags) -> bool {
        let folded = (!flags.case_sensitive).then(|| buffer.to_lowercase());
        self.test_key(
            key,
            &Haystack {
                raw: buffer,
                folded: folded.as_deref(),
            },
            flags,
        )
    }

    fn test_key(&self, key: &str, haystack: &Haystack<'_>, flags: KeyFlags) -> bool {
        if flags.use_regex || flags.whole_words {
            let pattern = if flags.use_regex {
                key.to_string()
            } else {
                format!(r"\b{}\b", regex::escape(key))
            };
            return match self.compile(&pattern, flags.case_sensitive) {
                Ok(re) => re.is_match(haystack.raw),
                Err(err) => {
                    debug!(key = %key, error = %err, "Skipping unusable key");
                    false
                }
            };
        }

        match haystack.folded {
            Some(folded) => folded.contains(&key.to_lowercase()),
            None => haystack.raw.contains(key),
        }
    }

    fn compile(&self, pattern: &str, case_sensitive: bool) -> WorldbookResult<Regex> {
        RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .size_limit(self.regex_size_limit)
            .build()
            .map_err(|e| WorldbookError::invalid_regex(pattern, e))
    }
}

struct Haystack<'a> {
    raw: &'a str,
    /// Lowercased copy, present only for case-insensitive matching.
    folded: Option<&'a str>,
}
