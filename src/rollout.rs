// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bounded-concurrency admission of pool members.
//!
//! The budget is recomputed from live member state on every pass: members
//! already unavailable for any reason use up the same budget as members this
//! controller admitted, so no separate queue is kept.

use crate::status::MemberObservation;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::warn;

/// Resolve `maxUnavailable` against the pool size.
///
/// Percentages round down; the result is never below 1. An unparsable value
/// falls back to 1 so a typo cannot stall or flood a rollout.
pub fn resolve_max_unavailable(value: Option<&IntOrString>, pool_size: usize) -> usize {
    let resolved = match value {
        None => 1,
        Some(IntOrString::Int(n)) => usize::try_from(*n).unwrap_or(0),
        Some(IntOrString::String(s)) => match parse_percent(s) {
            Some(percent) => percent.saturating_mul(pool_size) / 100,
            None => {
                warn!("Invalid maxUnavailable {:?}, using 1", s);
                1
            }
        },
    };
    resolved.max(1)
}

fn parse_percent(value: &str) -> Option<usize> {
    value.trim().strip_suffix('%')?.trim().parse().ok()
}

/// Admission decision for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    /// Members allowed to be unavailable at once
    pub max_unavailable: usize,
    /// Members currently unavailable
    pub unavailable: usize,
    /// Names of members admitted this pass, in name order
    pub admitted: Vec<String>,
}

/// Pick the members that may start moving to `target` now.
///
/// Eligible members are not yet pointed at the target and are available:
/// ready, not degraded and not already mid-update. They are admitted in name
/// order until the budget is used up. A paused pool admits nobody.
pub fn plan_admission(
    members: &[MemberObservation],
    target: &str,
    max_unavailable: usize,
    paused: bool,
) -> Admission {
    let unavailable = members.iter().filter(|m| m.is_unavailable()).count();
    let mut admission = Admission {
        max_unavailable,
        unavailable,
        admitted: Vec::new(),
    };
    if paused {
        return admission;
    }

    let budget = max_unavailable.saturating_sub(unavailable);
    let mut candidates: Vec<&MemberObservation> = members
        .iter()
        .filter(|m| m.desired_config.as_deref() != Some(target) && !m.is_unavailable())
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name));

    admission.admitted = candidates
        .into_iter()
        .take(budget)
        .map(|m| m.name.clone())
        .collect();
    admission
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::AgentState;
    use proptest::prelude::*;

    fn make_member(name: &str, current: &str, desired: &str, state: AgentState, ready: bool) -> MemberObservation {
        MemberObservation {
            name: name.to_string(),
            current_config: Some(current.to_string()),
            desired_config: Some(desired.to_string()),
            state,
            ready,
            reason: None,
            resource_version: None,
        }
    }

    fn at_config(name: &str, config: &str) -> MemberObservation {
        make_member(name, config, config, AgentState::Done, true)
    }

    /// Simulate the agent finishing every in-flight update.
    fn settle(members: &mut [MemberObservation]) {
        for m in members.iter_mut() {
            if m.is_mid_update() {
                m.current_config = m.desired_config.clone();
                m.state = AgentState::Done;
            }
        }
    }

    fn admit(members: &mut [MemberObservation], admitted: &[String], target: &str) {
        for m in members.iter_mut() {
            if admitted.contains(&m.name) {
                m.desired_config = Some(target.to_string());
            }
        }
    }

    #[test]
    fn test_resolve_max_unavailable() {
        assert_eq!(resolve_max_unavailable(None, 10), 1);
        assert_eq!(resolve_max_unavailable(Some(&IntOrString::Int(3)), 10), 3);
        assert_eq!(resolve_max_unavailable(Some(&IntOrString::Int(0)), 10), 1);
        assert_eq!(resolve_max_unavailable(Some(&IntOrString::Int(-2)), 10), 1);
        assert_eq!(resolve_max_unavailable(Some(&IntOrString::String("25%".to_string())), 10), 2);
        assert_eq!(resolve_max_unavailable(Some(&IntOrString::String("10%".to_string())), 5), 1);
        assert_eq!(resolve_max_unavailable(Some(&IntOrString::String("100%".to_string())), 4), 4);
        assert_eq!(resolve_max_unavailable(Some(&IntOrString::String("many".to_string())), 10), 1);
    }

    #[test]
    fn test_admits_in_name_order_up_to_budget() {
        let members = vec![
            at_config("worker-2", "r1"),
            at_config("worker-0", "r1"),
            at_config("worker-1", "r1"),
        ];

        let admission = plan_admission(&members, "r2", 2, false);

        assert_eq!(admission.admitted, vec!["worker-0", "worker-1"]);
    }

    #[test]
    fn test_existing_unavailability_uses_budget() {
        let members = vec![
            make_member("worker-0", "r1", "r1", AgentState::Done, false),
            at_config("worker-1", "r1"),
            at_config("worker-2", "r1"),
        ];

        let admission = plan_admission(&members, "r2", 1, false);

        assert_eq!(admission.unavailable, 1);
        assert!(admission.admitted.is_empty());
    }

    #[test]
    fn test_degraded_member_is_skipped_but_others_continue() {
        let members = vec![
            make_member("worker-0", "r1", "r1", AgentState::Degraded, true),
            at_config("worker-1", "r1"),
            at_config("worker-2", "r1"),
        ];

        let admission = plan_admission(&members, "r2", 2, false);

        assert_eq!(admission.admitted, vec!["worker-1"]);
    }

    #[test]
    fn test_paused_admits_nothing() {
        let members = vec![at_config("worker-0", "r1")];
        let admission = plan_admission(&members, "r2", 1, true);
        assert!(admission.admitted.is_empty());
    }

    #[test]
    fn test_members_already_targeted_are_not_readmitted() {
        let members = vec![
            make_member("worker-0", "r1", "r2", AgentState::Working, true),
            at_config("worker-1", "r2"),
        ];
        let admission = plan_admission(&members, "r2", 3, false);
        assert!(admission.admitted.is_empty());
    }

    #[test]
    fn test_rollout_of_five_members_one_at_a_time() {
        let mut members: Vec<MemberObservation> = (0..5)
            .map(|i| at_config(&format!("worker-{}", i), "r1"))
            .collect();
        let mut order = Vec::new();

        for _ in 0..10 {
            let admission = plan_admission(&members, "r2", 1, false);
            assert!(admission.admitted.len() <= 1);
            admit(&mut members, &admission.admitted, "r2");
            assert!(members.iter().filter(|m| m.is_mid_update()).count() <= 1);
            order.extend(admission.admitted);
            settle(&mut members);
        }

        assert_eq!(order, vec!["worker-0", "worker-1", "worker-2", "worker-3", "worker-4"]);
        assert!(members.iter().all(|m| m.is_updated(Some("r2"))));
    }

    fn arb_member(index: usize) -> impl Strategy<Value = MemberObservation> {
        let config = prop_oneof![Just("r1"), Just("r2")];
        let state = prop_oneof![
            4 => Just(AgentState::Done),
            1 => Just(AgentState::Working),
            1 => Just(AgentState::Degraded),
        ];
        (config.clone(), config, state, prop::bool::weighted(0.9)).prop_map(
            move |(current, desired, state, ready)| make_member(&format!("m{:02}", index), current, desired, state, ready),
        )
    }

    fn arb_pool() -> impl Strategy<Value = Vec<MemberObservation>> {
        (0usize..12).prop_flat_map(|n| (0..n).map(arb_member).collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn test_admission_never_exceeds_bound(members in arb_pool(), max in 1usize..5) {
            let admission = plan_admission(&members, "r2", max, false);

            let before = members.iter().filter(|m| m.is_unavailable()).count();
            prop_assert!(admission.admitted.len() <= max.saturating_sub(before));

            let mut after = members.clone();
            admit(&mut after, &admission.admitted, "r2");
            let unavailable = after.iter().filter(|m| m.is_unavailable()).count();
            prop_assert!(unavailable <= max.max(before));
        }
    }
}
