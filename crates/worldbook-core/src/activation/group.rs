//! Inclusion-group resolution.
//!
//! Entries sharing a group tag compete; one winner survives unless some
//! members carry `group_override`, in which case every overriding member
//! survives and the rest are dropped.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use super::engine::Activation;

/// Competition score for a group member.
pub fn group_score(activation: &Activation<'_>) -> f64 {
    let entry = activation.entry;
    let trigger = if entry.use_group_scoring {
        activation.injection.trigger_score
    } else {
        0.0
    };
    trigger * 100.0 + entry.group_weight * 10.0 + entry.order as f64 * 0.01
}

/// Collapse each inclusion group to its survivors.
///
/// Ungrouped activations pass through; relative order is preserved.
pub fn resolve_groups(activations: Vec<Activation<'_>>) -> Vec<Activation<'_>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, activation) in activations.iter().enumerate() {
        if let Some(tag) = activation.entry.group_tag() {
            groups.entry(tag).or_default().push(idx);
        }
    }
    if groups.is_empty() {
        return activations;
    }

    let mut dropped: HashSet<usize> = HashSet::new();
    for (tag, members) in &groups {
        let overriding: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| activations[i].entry.group_override)
            .collect();

        let keep: Vec<usize> = if overriding.is_empty() {
            members
                .iter()
                .copied()
                .max_by(|&a, &b| compare_members(&activations[a], &activations[b]))
                .into_iter()
                .collect()
        } else {
            overriding
        };

        tracing::debug!(group = %tag, members = members.len(), kept = keep.len(), "Resolved inclusion group");
        dropped.extend(members.iter().copied().filter(|i| !keep.contains(i)));
    }

    activations
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !dropped.contains(idx))
        .map(|(_, activation)| activation)
        .collect()
}

/// Higher score wins, then the larger entry id.
fn compare_members(a: &Activation<'_>, b: &Activation<'_>) -> Ordering {
    group_score(a)
        .total_cmp(&group_score(b))
        .then_with(|| a.entry.id.cmp(&b.entry.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Worldbook, WorldbookEntry, WorldbookInjection, WorldbookPosition};
    use uuid::Uuid;

    fn injection(entry: &WorldbookEntry, trigger_score: f64) -> WorldbookInjection {
        let book = Worldbook::new("lore");
        WorldbookInjection {
            worldbook_id: book.id,
            worldbook_name: book.name,
            entry_id: entry.id,
            comment: entry.comment.clone(),
            content: entry.content.clone(),
            position: WorldbookPosition::After,
            outlet_name: None,
            order: entry.order,
            depth: None,
            role: entry.role,
            trigger_score,
        }
    }

    fn activate(entry: &WorldbookEntry, score: f64) -> Activation<'_> {
        Activation {
            entry,
            injection: injection(entry, score),
        }
    }

    fn ids(result: &[Activation<'_>]) -> Vec<Uuid> {
        result.iter().map(|a| a.entry.id).collect()
    }

    #[test]
    fn test_higher_order_wins_on_equal_weight() {
        let a = WorldbookEntry::new("a").in_group("weather").with_order(50);
        let b = WorldbookEntry::new("b").in_group("weather").with_order(80);
        let result = resolve_groups(vec![activate(&a, 1.0), activate(&b, 1.0)]);
        assert_eq!(ids(&result), vec![b.id]);
    }

    #[test]
    fn test_weight_beats_order() {
        let mut a = WorldbookEntry::new("a").in_group("weather").with_order(10);
        a.group_weight = 200.0;
        let b = WorldbookEntry::new("b").in_group("weather").with_order(900);
        let result = resolve_groups(vec![activate(&a, 1.0), activate(&b, 1.0)]);
        assert_eq!(ids(&result), vec![a.id]);
    }

    #[test]
    fn test_group_scoring_uses_trigger_score() {
        let mut a = WorldbookEntry::new("a").in_group("g");
        a.use_group_scoring = true;
        let mut b = WorldbookEntry::new("b").in_group("g").with_order(500);
        b.use_group_scoring = true;
        let result = resolve_groups(vec![activate(&a, 3.0), activate(&b, 1.0)]);
        assert_eq!(ids(&result), vec![a.id]);
    }

    #[test]
    fn test_ties_go_to_larger_id() {
        let a = WorldbookEntry::new("a").in_group("g").with_id(Uuid::from_u128(1));
        let b = WorldbookEntry::new("b").in_group("g").with_id(Uuid::from_u128(2));
        let result = resolve_groups(vec![activate(&b, 1.0), activate(&a, 1.0)]);
        assert_eq!(ids(&result), vec![b.id]);
    }

    #[test]
    fn test_override_members_all_survive() {
        let mut a = WorldbookEntry::new("a").in_group("g");
        a.group_override = true;
        let mut b = WorldbookEntry::new("b").in_group("g");
        b.group_override = true;
        let c = WorldbookEntry::new("c").in_group("g").with_order(1000);
        let result = resolve_groups(vec![activate(&a, 1.0), activate(&b, 1.0), activate(&c, 1.0)]);
        assert_eq!(ids(&result), vec![a.id, b.id]);
    }

    #[test]
    fn test_ungrouped_pass_through() {
        let a = WorldbookEntry::new("a");
        let b = WorldbookEntry::new("b").in_group("  ");
        let c = WorldbookEntry::new("c").in_group("g");
        let result = resolve_groups(vec![activate(&a, 1.0), activate(&b, 1.0), activate(&c, 1.0)]);
        assert_eq!(ids(&result), vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_groups_are_independent() {
        let a = WorldbookEntry::new("a").in_group("x").with_order(1);
        let b = WorldbookEntry::new("b").in_group("x").with_order(2);
        let c = WorldbookEntry::new("c").in_group("y").with_order(1);
        let d = WorldbookEntry::new("d").in_group("y").with_order(2);
        let result = resolve_groups(vec![
            activate(&a, 1.0),
            activate(&b, 1.0),
            activate(&c, 1.0),
            activate(&d, 1.0),
        ]);
        assert_eq!(ids(&result), vec![b.id, d.id]);
    }
}
