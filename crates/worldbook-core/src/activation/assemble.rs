//! Bucket accepted injections by prompt position.

use std::collections::BTreeMap;

use crate::types::{
    DepthGroup, WorldbookEvaluationResult, WorldbookInjection, WorldbookPosition,
    DEFAULT_INJECTION_DEPTH,
};

/// Build a result from the budgeted set.
///
/// Every flat list and depth bucket is ordered by `(order desc, entry id asc)`;
/// depth buckets run deepest first. Diagnostics fields are left at defaults.
pub fn assemble(accepted: Vec<WorldbookInjection>) -> WorldbookEvaluationResult {
    let mut result = WorldbookEvaluationResult::default();
    let mut by_depth: BTreeMap<usize, Vec<WorldbookInjection>> = BTreeMap::new();

    for injection in accepted {
        let bucket = match injection.position {
            WorldbookPosition::Before => &mut result.before,
            WorldbookPosition::After => &mut result.after,
            WorldbookPosition::AnTop => &mut result.an_top,
            WorldbookPosition::AnBottom => &mut result.an_bottom,
            WorldbookPosition::EmTop => &mut result.em_top,
            WorldbookPosition::EmBottom => &mut result.em_bottom,
            WorldbookPosition::Outlet => &mut result.outlet,
            WorldbookPosition::AtDepth => by_depth
                .entry(injection.depth.unwrap_or(DEFAULT_INJECTION_DEPTH))
                .or_default(),
        };
        bucket.push(injection);
    }

    for list in [
        &mut result.before,
        &mut result.after,
        &mut result.an_top,
        &mut result.an_bottom,
        &mut result.em_top,
        &mut result.em_bottom,
        &mut result.outlet,
    ] {
        sort_bucket(list);
    }

    result.at_depth = by_depth
        .into_iter()
        .rev()
        .map(|(depth, mut entries)| {
            sort_bucket(&mut entries);
            DepthGroup { depth, entries }
        })
        .collect();

    result
}

fn sort_bucket(list: &mut [WorldbookInjection]) {
    list.sort_by(|a, b| b.order.cmp(&a.order).then_with(|| a.entry_id.cmp(&b.entry_id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InjectionRole;
    use uuid::Uuid;

    fn injection(id: u128, position: WorldbookPosition, order: i64) -> WorldbookInjection {
        WorldbookInjection {
            worldbook_id: Uuid::nil(),
            worldbook_name: "lore".to_string(),
            entry_id: Uuid::from_u128(id),
            comment: String::new(),
            content: format!("entry {}", id),
            position,
            outlet_name: None,
            order,
            depth: None,
            role: InjectionRole::System,
            trigger_score: 1.0,
        }
    }

    fn at_depth(id: u128, depth: usize, order: i64) -> WorldbookInjection {
        WorldbookInjection {
            depth: Some(depth),
            ..injection(id, WorldbookPosition::AtDepth, order)
        }
    }

    #[test]
    fn test_buckets_by_position() {
        let result = assemble(vec![
            injection(1, WorldbookPosition::Before, 1),
            injection(2, WorldbookPosition::AnTop, 1),
            injection(3, WorldbookPosition::EmBottom, 1),
            injection(4, WorldbookPosition::After, 1),
        ]);
        assert_eq!(result.before.len(), 1);
        assert_eq!(result.an_top.len(), 1);
        assert_eq!(result.em_bottom.len(), 1);
        assert_eq!(result.after.len(), 1);
        assert!(result.an_bottom.is_empty());
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_flat_lists_order_desc_then_id() {
        let result = assemble(vec![
            injection(3, WorldbookPosition::After, 10),
            injection(2, WorldbookPosition::After, 50),
            injection(1, WorldbookPosition::After, 10),
        ]);
        let ids: Vec<u128> = result.after.iter().map(|i| i.entry_id.as_u128()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_depth_buckets_deepest_first() {
        let result = assemble(vec![
            at_depth(1, 0, 5),
            at_depth(2, 6, 5),
            at_depth(3, 2, 5),
            at_depth(4, 6, 9),
        ]);
        let depths: Vec<usize> = result.at_depth.iter().map(|g| g.depth).collect();
        assert_eq!(depths, vec![6, 2, 0]);

        let deepest: Vec<u128> = result.at_depth[0]
            .entries
            .iter()
            .map(|i| i.entry_id.as_u128())
            .collect();
        assert_eq!(deepest, vec![4, 2]);
    }

    #[test]
    fn test_depth_defaults_when_missing() {
        let result = assemble(vec![injection(1, WorldbookPosition::AtDepth, 1)]);
        assert_eq!(result.at_depth[0].depth, DEFAULT_INJECTION_DEPTH);
    }

    #[test]
    fn test_empty_input() {
        let result = assemble(Vec::new());
        assert!(result.is_empty());
        assert!(result.at_depth.is_empty());
    }
}
