//! Injection budget: caps on entry count and rendered characters.

use std::cmp::Ordering;
use tracing::debug;

use crate::types::{WorldbookInjection, WorldbookSettings};

/// Limits applied to the merged set of group survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionBudget {
    pub max_entries: usize,
    pub max_characters: usize,
}

impl InjectionBudget {
    /// No limits.
    pub fn unlimited() -> Self {
        Self {
            max_entries: usize::MAX,
            max_characters: usize::MAX,
        }
    }

    /// The tightest limits across the given settings.
    pub fn most_restrictive<'a>(settings: impl IntoIterator<Item = &'a WorldbookSettings>) -> Self {
        settings
            .into_iter()
            .fold(Self::unlimited(), |budget, s| Self {
                max_entries: budget.max_entries.min(s.max_injected_entries),
                max_characters: budget.max_characters.min(s.max_injected_characters),
            })
    }
}

impl From<&WorldbookSettings> for InjectionBudget {
    fn from(settings: &WorldbookSettings) -> Self {
        Self {
            max_entries: settings.max_injected_entries,
            max_characters: settings.max_injected_characters,
        }
    }
}

/// Priority order: higher `order`, then higher trigger score, then entry id.
fn priority(a: &WorldbookInjection, b: &WorldbookInjection) -> Ordering {
    b.order
        .cmp(&a.order)
        .then_with(|| b.trigger_score.total_cmp(&a.trigger_score))
        .then_with(|| a.entry_id.cmp(&b.entry_id))
}

/// Greedily accept candidates in priority order.
///
/// A candidate that would overflow the character cap is skipped; later,
/// smaller candidates may still fit.
pub fn apply_budget(
    mut candidates: Vec<WorldbookInjection>,
    budget: &InjectionBudget,
) -> Vec<WorldbookInjection> {
    candidates.sort_by(priority);

    let mut accepted = Vec::new();
    let mut used_chars = 0usize;
    for candidate in candidates {
        if accepted.len() >= budget.max_entries {
            debug!(entry = %candidate.entry_id, "Entry budget exhausted");
            break;
        }
        let len = candidate.rendered_len();
        match used_chars.checked_add(len) {
            Some(total) if total <= budget.max_characters => {
                used_chars = total;
                accepted.push(candidate);
            }
            _ => {
                debug!(entry = %candidate.entry_id, len, used_chars, "Entry exceeds character budget");
            }
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InjectionRole, WorldbookPosition};
    use uuid::Uuid;

    fn candidate(id: u128, order: i64, content: &str) -> WorldbookInjection {
        WorldbookInjection {
            worldbook_id: Uuid::nil(),
            worldbook_name: "lore".to_string(),
            entry_id: Uuid::from_u128(id),
            comment: String::new(),
            content: content.to_string(),
            position: WorldbookPosition::After,
            outlet_name: None,
            order,
            depth: None,
            role: InjectionRole::System,
            trigger_score: 1.0,
        }
    }

    fn ids(accepted: &[WorldbookInjection]) -> Vec<u128> {
        accepted.iter().map(|i| i.entry_id.as_u128()).collect()
    }

    #[test]
    fn test_character_cap_skips_overflowing_entry() {
        let budget = InjectionBudget {
            max_entries: 10,
            max_characters: 10,
        };
        let accepted = apply_budget(
            vec![
                candidate(1, 300, "123456"),
                candidate(2, 200, "1234567"),
                candidate(3, 100, "1234"),
            ],
            &budget,
        );
        assert_eq!(ids(&accepted), vec![1, 3]);
    }

    #[test]
    fn test_entry_cap() {
        let budget = InjectionBudget {
            max_entries: 2,
            max_characters: usize::MAX,
        };
        let accepted = apply_budget(
            vec![candidate(1, 1, "a"), candidate(2, 3, "b"), candidate(3, 2, "c")],
            &budget,
        );
        assert_eq!(ids(&accepted), vec![2, 3]);
    }

    #[test]
    fn test_comment_counts_toward_characters() {
        let mut with_comment = candidate(1, 1, "abc");
        with_comment.comment = "note".to_string();
        assert_eq!(with_comment.rendered_len(), "[note]\nabc".chars().count());

        let budget = InjectionBudget {
            max_entries: 5,
            max_characters: 5,
        };
        assert!(apply_budget(vec![with_comment], &budget).is_empty());
    }

    #[test]
    fn test_ties_break_on_score_then_id() {
        let mut low = candidate(1, 10, "x");
        low.trigger_score = 0.5;
        let high = candidate(2, 10, "y");
        let other = candidate(3, 10, "z");
        let accepted = apply_budget(vec![other, low, high], &InjectionBudget::unlimited());
        assert_eq!(ids(&accepted), vec![2, 3, 1]);
    }

    #[test]
    fn test_most_restrictive_merge() {
        let a = WorldbookSettings {
            max_injected_entries: 5,
            max_injected_characters: 9000,
            ..Default::default()
        };
        let b = WorldbookSettings {
            max_injected_entries: 40,
            max_injected_characters: 300,
            ..Default::default()
        };
        let budget = InjectionBudget::most_restrictive([&a, &b]);
        assert_eq!(budget.max_entries, 5);
        assert_eq!(budget.max_characters, 300);
        assert_eq!(InjectionBudget::from(&a).max_characters, 9000);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let budget = InjectionBudget {
            max_entries: 5,
            max_characters: 3,
        };
        let accepted = apply_budget(vec![candidate(1, 1, "龍龍龍")], &budget);
        assert_eq!(accepted.len(), 1);
    }
}
