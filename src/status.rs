// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Member observation and pool status aggregation.

use crate::constants::{annotations, reasons};
use crate::types::condition::{self, Condition};
use crate::types::{MachineConfigPoolStatus, PoolConditionType, PoolConfiguration};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

/// State reported by the node-local agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentState {
    #[default]
    Done,
    Working,
    Degraded,
    Unreconcilable,
}

impl AgentState {
    /// Parse the agent state annotation. A missing annotation means the agent
    /// is idle; anything unrecognised is treated as work in progress.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("Done") => Self::Done,
            Some("Degraded") => Self::Degraded,
            Some("Unreconcilable") => Self::Unreconcilable,
            Some(_) => Self::Working,
        }
    }
}

/// What the controller knows about one pool member in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberObservation {
    pub name: String,
    pub current_config: Option<String>,
    pub desired_config: Option<String>,
    pub state: AgentState,
    pub ready: bool,
    /// Agent supplied detail when degraded
    pub reason: Option<String>,
    /// Node version the observation was read at; admission writes are conditional on it
    pub resource_version: Option<String>,
}

impl MemberObservation {
    pub fn from_node(node: &Node) -> Self {
        let annotation = |key: &str| node.annotations().get(key).cloned();

        let ready = node
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|c| c.iter().find(|c| c.type_ == "Ready"))
            .is_some_and(|c| c.status == "True");

        Self {
            name: node.name_any(),
            current_config: annotation(annotations::CURRENT_CONFIG),
            desired_config: annotation(annotations::DESIRED_CONFIG),
            state: AgentState::parse(node.annotations().get(annotations::STATE).map(String::as_str)),
            ready,
            reason: annotation(annotations::REASON).filter(|r| !r.is_empty()),
            resource_version: node.resource_version(),
        }
    }

    /// Applied the target and the agent is idle
    pub fn is_updated(&self, target: Option<&str>) -> bool {
        target.is_some()
            && self.current_config.as_deref() == target
            && self.desired_config.as_deref() == target
            && self.state == AgentState::Done
    }

    /// Told to move to a config it has not applied yet, or the agent is busy
    pub fn is_mid_update(&self) -> bool {
        self.state == AgentState::Working
            || (self.desired_config.is_some() && self.desired_config != self.current_config)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.state, AgentState::Degraded | AgentState::Unreconcilable)
    }

    pub fn is_unavailable(&self) -> bool {
        self.is_mid_update() || self.is_degraded() || !self.ready
    }
}

/// Machine counts written to pool status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineCounts {
    pub total: usize,
    pub updated: usize,
    pub ready: usize,
    pub unavailable: usize,
    pub degraded: usize,
}

impl MachineCounts {
    pub fn observe(members: &[MemberObservation], target: Option<&str>) -> Self {
        let mut counts = Self {
            total: members.len(),
            ..Default::default()
        };
        for member in members {
            let updated = member.is_updated(target);
            if updated {
                counts.updated += 1;
                if member.ready {
                    counts.ready += 1;
                }
            }
            if member.is_unavailable() {
                counts.unavailable += 1;
            }
            if member.is_degraded() {
                counts.degraded += 1;
            }
        }
        counts
    }

    pub fn all_updated(&self) -> bool {
        self.updated == self.total
    }
}

/// A pass-level failure that keeps the pool from rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub reason: &'static str,
    pub message: String,
}

/// Everything status aggregation depends on.
#[derive(Debug, Clone)]
pub struct StatusInput<'a> {
    pub members: &'a [MemberObservation],
    /// Rendered configuration members are moving to
    pub target: Option<&'a str>,
    /// Full reference to publish once every member reached the target
    pub target_ref: Option<&'a PoolConfiguration>,
    pub paused: bool,
    pub render_failure: Option<&'a RenderFailure>,
    pub generation: i64,
}

fn to_count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn degraded_message(members: &[MemberObservation]) -> String {
    members
        .iter()
        .filter(|m| m.is_degraded())
        .map(|m| match m.reason.as_deref() {
            Some(reason) => format!("Node {} is reporting: {}", m.name, reason),
            None => format!("Node {} is reporting degraded", m.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn position(condition_type: &PoolConditionType) -> usize {
    PoolConditionType::ALL
        .iter()
        .position(|t| t == condition_type)
        .unwrap_or(PoolConditionType::ALL.len())
}

/// Derive the pool status for this pass.
///
/// Pure apart from `now`, which is only used for conditions whose status
/// flipped; unchanged conditions keep their previous transition time, so
/// aggregating unchanged inputs reproduces `previous` exactly.
pub fn aggregate(
    input: &StatusInput<'_>,
    previous: Option<&MachineConfigPoolStatus>,
    now: DateTime<Utc>,
) -> MachineConfigPoolStatus {
    let counts = MachineCounts::observe(input.members, input.target);
    let target = input.target.unwrap_or_default();

    let updated = counts.all_updated();
    let updating = !updated && !input.paused;
    let node_degraded = counts.degraded > 0;
    let render_degraded = input.render_failure.is_some();

    let updated_condition = if updated {
        Condition::new(
            PoolConditionType::Updated,
            true,
            reasons::ALL_UPDATED,
            format!("All nodes are updated with {}", target),
            now,
        )
    } else {
        Condition::new(
            PoolConditionType::Updated,
            false,
            if input.paused { reasons::PAUSED } else { reasons::UPDATING },
            format!("{} of {} nodes updated", counts.updated, counts.total),
            now,
        )
    };

    let updating_condition = if updating {
        Condition::new(
            PoolConditionType::Updating,
            true,
            reasons::UPDATING,
            format!("All nodes are updating to {}", target),
            now,
        )
    } else if !updated {
        Condition::new(
            PoolConditionType::Updating,
            false,
            reasons::PAUSED,
            "Pool is paused",
            now,
        )
    } else {
        Condition::new(PoolConditionType::Updating, false, reasons::AS_EXPECTED, "", now)
    };

    let node_degraded_condition = if node_degraded {
        Condition::new(
            PoolConditionType::NodeDegraded,
            true,
            reasons::NODES_DEGRADED,
            degraded_message(input.members),
            now,
        )
    } else {
        Condition::new(PoolConditionType::NodeDegraded, false, reasons::AS_EXPECTED, "", now)
    };

    let render_degraded_condition = match input.render_failure {
        Some(failure) => Condition::new(
            PoolConditionType::RenderDegraded,
            true,
            failure.reason,
            failure.message.clone(),
            now,
        ),
        None => Condition::new(PoolConditionType::RenderDegraded, false, reasons::AS_EXPECTED, "", now),
    };

    let degraded_condition = match (render_degraded, node_degraded) {
        (true, _) => Condition::new(
            PoolConditionType::Degraded,
            true,
            render_degraded_condition.reason.clone(),
            render_degraded_condition.message.clone(),
            now,
        ),
        (false, true) => Condition::new(
            PoolConditionType::Degraded,
            true,
            reasons::NODES_DEGRADED,
            node_degraded_condition.message.clone(),
            now,
        ),
        (false, false) => Condition::new(PoolConditionType::Degraded, false, reasons::AS_EXPECTED, "", now),
    };

    let mut conditions = previous.map(|p| p.conditions.clone()).unwrap_or_default();
    for c in [
        updated_condition,
        updating_condition,
        node_degraded_condition,
        render_degraded_condition,
        degraded_condition,
    ] {
        condition::upsert(&mut conditions, c);
    }
    conditions.sort_by_key(|c| position(&c.condition_type));

    let configuration = match (updated, input.target_ref) {
        (true, Some(reference)) => reference.clone(),
        _ => previous.map(|p| p.configuration.clone()).unwrap_or_default(),
    };

    MachineConfigPoolStatus {
        observed_generation: input.generation,
        configuration,
        machine_count: to_count(counts.total),
        updated_machine_count: to_count(counts.updated),
        ready_machine_count: to_count(counts.ready),
        unavailable_machine_count: to_count(counts.unavailable),
        degraded_machine_count: to_count(counts.degraded),
        conditions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};
    use kube::api::ObjectMeta;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn make_member(name: &str, current: Option<&str>, desired: Option<&str>, state: AgentState, ready: bool) -> MemberObservation {
        MemberObservation {
            name: name.to_string(),
            current_config: current.map(str::to_string),
            desired_config: desired.map(str::to_string),
            state,
            ready,
            reason: None,
            resource_version: None,
        }
    }

    fn make_input<'a>(members: &'a [MemberObservation], target: Option<&'a str>) -> StatusInput<'a> {
        StatusInput {
            members,
            target,
            target_ref: None,
            paused: false,
            render_failure: None,
            generation: 1,
        }
    }

    fn status_of(status: &MachineConfigPoolStatus, t: PoolConditionType) -> bool {
        condition::find(&status.conditions, &t).unwrap().is_true()
    }

    #[test]
    fn test_member_from_node() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-0".to_string()),
                resource_version: Some("17".to_string()),
                annotations: Some(BTreeMap::from([
                    (annotations::CURRENT_CONFIG.to_string(), "rendered-a".to_string()),
                    (annotations::DESIRED_CONFIG.to_string(), "rendered-b".to_string()),
                    (annotations::STATE.to_string(), "Degraded".to_string()),
                    (annotations::REASON.to_string(), "disk full".to_string()),
                ])),
                ..Default::default()
            },
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let member = MemberObservation::from_node(&node);

        assert_eq!(member.name, "worker-0");
        assert_eq!(member.current_config.as_deref(), Some("rendered-a"));
        assert_eq!(member.desired_config.as_deref(), Some("rendered-b"));
        assert_eq!(member.state, AgentState::Degraded);
        assert_eq!(member.reason.as_deref(), Some("disk full"));
        assert_eq!(member.resource_version.as_deref(), Some("17"));
        assert!(member.ready);
        assert!(member.is_degraded());
        assert!(member.is_unavailable());
    }

    #[test]
    fn test_agent_state_parse() {
        assert_eq!(AgentState::parse(None), AgentState::Done);
        assert_eq!(AgentState::parse(Some("Working")), AgentState::Working);
        assert_eq!(AgentState::parse(Some("Unreconcilable")), AgentState::Unreconcilable);
        assert_eq!(AgentState::parse(Some("Rebooting")), AgentState::Working);
    }

    #[test]
    fn test_fresh_member_is_neither_updated_nor_mid_update() {
        let member = make_member("w", None, None, AgentState::Done, true);
        assert!(!member.is_updated(Some("rendered-a")));
        assert!(!member.is_mid_update());
        assert!(!member.is_unavailable());
    }

    #[test]
    fn test_all_updated() {
        let members = vec![
            make_member("w0", Some("r1"), Some("r1"), AgentState::Done, true),
            make_member("w1", Some("r1"), Some("r1"), AgentState::Done, true),
        ];
        let target_ref = PoolConfiguration {
            name: Some("r1".to_string()),
            source: vec![],
        };
        let mut input = make_input(&members, Some("r1"));
        input.target_ref = Some(&target_ref);

        let status = aggregate(&input, None, at(10));

        assert_eq!(status.machine_count, 2);
        assert_eq!(status.updated_machine_count, 2);
        assert_eq!(status.ready_machine_count, 2);
        assert_eq!(status.unavailable_machine_count, 0);
        assert!(status_of(&status, PoolConditionType::Updated));
        assert!(!status_of(&status, PoolConditionType::Updating));
        assert!(!status_of(&status, PoolConditionType::Degraded));
        assert_eq!(status.configuration.name.as_deref(), Some("r1"));
    }

    #[test]
    fn test_updating_keeps_previous_configuration() {
        let members = vec![
            make_member("w0", Some("r1"), Some("r2"), AgentState::Working, true),
            make_member("w1", Some("r1"), Some("r1"), AgentState::Done, true),
        ];
        let previous = MachineConfigPoolStatus {
            configuration: PoolConfiguration {
                name: Some("r1".to_string()),
                source: vec![],
            },
            ..Default::default()
        };

        let status = aggregate(&make_input(&members, Some("r2")), Some(&previous), at(10));

        assert_eq!(status.updated_machine_count, 0);
        assert_eq!(status.unavailable_machine_count, 1);
        assert!(status_of(&status, PoolConditionType::Updating));
        assert!(!status_of(&status, PoolConditionType::Updated));
        assert_eq!(status.configuration.name.as_deref(), Some("r1"));
    }

    #[test]
    fn test_paused_is_not_updating() {
        let members = vec![make_member("w0", Some("r1"), Some("r1"), AgentState::Done, true)];
        let mut input = make_input(&members, Some("r2"));
        input.paused = true;

        let status = aggregate(&input, None, at(10));

        assert!(!status_of(&status, PoolConditionType::Updating));
        assert!(!status_of(&status, PoolConditionType::Updated));
        let updating = condition::find(&status.conditions, &PoolConditionType::Updating).unwrap();
        assert_eq!(updating.reason, reasons::PAUSED);
    }

    #[test]
    fn test_degraded_is_node_or_render_degraded() {
        let members = vec![make_member("w0", Some("r1"), Some("r1"), AgentState::Unreconcilable, true)];
        let status = aggregate(&make_input(&members, Some("r1")), None, at(10));
        assert!(status_of(&status, PoolConditionType::NodeDegraded));
        assert!(!status_of(&status, PoolConditionType::RenderDegraded));
        assert!(status_of(&status, PoolConditionType::Degraded));
        assert_eq!(status.degraded_machine_count, 1);
        assert_eq!(status.unavailable_machine_count, 1);

        let healthy = vec![make_member("w0", Some("r1"), Some("r1"), AgentState::Done, true)];
        let failure = RenderFailure {
            reason: reasons::RENDER_FAILED,
            message: "invalid MachineConfig b".to_string(),
        };
        let mut input = make_input(&healthy, Some("r1"));
        input.render_failure = Some(&failure);
        let status = aggregate(&input, None, at(10));
        assert!(!status_of(&status, PoolConditionType::NodeDegraded));
        assert!(status_of(&status, PoolConditionType::RenderDegraded));
        assert!(status_of(&status, PoolConditionType::Degraded));
        let degraded = condition::find(&status.conditions, &PoolConditionType::Degraded).unwrap();
        assert_eq!(degraded.message, "invalid MachineConfig b");
    }

    #[test]
    fn test_conditions_in_fixed_order() {
        let status = aggregate(&make_input(&[], Some("r1")), None, at(10));
        let types: Vec<PoolConditionType> = status.conditions.iter().map(|c| c.condition_type).collect();
        assert_eq!(types, PoolConditionType::ALL.to_vec());
    }

    #[test]
    fn test_unchanged_inputs_reproduce_previous_status() {
        let members = vec![make_member("w0", Some("r1"), Some("r2"), AgentState::Working, true)];
        let input = make_input(&members, Some("r2"));

        let first = aggregate(&input, None, at(10));
        let second = aggregate(&input, Some(&first), at(20));

        assert_eq!(first, second);
    }

    #[test]
    fn test_flipped_condition_gets_new_timestamp() {
        let working = vec![make_member("w0", Some("r1"), Some("r2"), AgentState::Working, true)];
        let done = vec![make_member("w0", Some("r2"), Some("r2"), AgentState::Done, true)];

        let first = aggregate(&make_input(&working, Some("r2")), None, at(10));
        let second = aggregate(&make_input(&done, Some("r2")), Some(&first), at(20));

        let updated = condition::find(&second.conditions, &PoolConditionType::Updated).unwrap();
        assert_eq!(updated.last_transition_time.as_ref().unwrap().0, at(20));
        let node_degraded = condition::find(&second.conditions, &PoolConditionType::NodeDegraded).unwrap();
        assert_eq!(node_degraded.last_transition_time.as_ref().unwrap().0, at(10));
    }

    fn arb_member() -> impl Strategy<Value = MemberObservation> {
        let config = proptest::option::of(prop_oneof![Just("r1".to_string()), Just("r2".to_string())]);
        let state = prop_oneof![
            Just(AgentState::Done),
            Just(AgentState::Working),
            Just(AgentState::Degraded),
            Just(AgentState::Unreconcilable),
        ];
        (config.clone(), config, state, any::<bool>()).prop_map(|(current_config, desired_config, state, ready)| {
            MemberObservation {
                name: "m".to_string(),
                current_config,
                desired_config,
                state,
                ready,
                reason: None,
                resource_version: None,
            }
        })
    }

    proptest! {
        #[test]
        fn test_counts_respect_bounds(members in proptest::collection::vec(arb_member(), 0..12), paused in any::<bool>()) {
            let mut input = make_input(&members, Some("r2"));
            input.paused = paused;
            let status = aggregate(&input, None, at(0));

            prop_assert_eq!(status.machine_count as usize, members.len());
            prop_assert!(status.updated_machine_count <= status.machine_count);
            prop_assert!(status.ready_machine_count <= status.updated_machine_count);
            prop_assert!(status.degraded_machine_count <= status.unavailable_machine_count);
            prop_assert!(status.unavailable_machine_count <= status.machine_count);

            let degraded = condition::find(&status.conditions, &PoolConditionType::Degraded).unwrap().is_true();
            let node_degraded = condition::find(&status.conditions, &PoolConditionType::NodeDegraded).unwrap().is_true();
            prop_assert_eq!(degraded, node_degraded);

            let updating = condition::find(&status.conditions, &PoolConditionType::Updating).unwrap().is_true();
            prop_assert_eq!(updating, status.updated_machine_count < status.machine_count && !paused);
        }
    }
}
