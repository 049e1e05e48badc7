// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label selector resolution.
//!
//! A missing or empty selector matches nothing. A selector that is malformed,
//! or that no label set could ever satisfy, is reported as a [`SelectorError`]
//! so callers can tell "intentionally empty" apart from "broken".

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("malformed requirement on key {key:?}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("requirements on key {0:?} can never be satisfied")]
    Unsatisfiable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl Operator {
    fn parse(key: &str, op: &str) -> Result<Self, SelectorError> {
        match op {
            "In" => Ok(Self::In),
            "NotIn" => Ok(Self::NotIn),
            "Exists" => Ok(Self::Exists),
            "DoesNotExist" => Ok(Self::DoesNotExist),
            other => Err(SelectorError::Malformed {
                key: key.to_string(),
                reason: format!("unknown operator {:?}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::In => value.is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => value.is_none_or(|v| !self.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

/// A validated, conjunctive label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Validate a selector. Returns `Ok(None)` when it has no requirements at all.
    pub fn parse(selector: &LabelSelector) -> Result<Option<Self>, SelectorError> {
        let mut requirements = Vec::new();

        for (key, value) in selector.match_labels.iter().flatten() {
            check_key(key)?;
            requirements.push(Requirement {
                key: key.clone(),
                operator: Operator::In,
                values: BTreeSet::from([value.clone()]),
            });
        }

        for expr in selector.match_expressions.iter().flatten() {
            check_key(&expr.key)?;
            let operator = Operator::parse(&expr.key, &expr.operator)?;
            let values: BTreeSet<String> = expr.values.iter().flatten().cloned().collect();

            match operator {
                Operator::In | Operator::NotIn if values.is_empty() => {
                    return Err(SelectorError::Malformed {
                        key: expr.key.clone(),
                        reason: format!("operator {} requires at least one value", expr.operator),
                    });
                }
                Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                    return Err(SelectorError::Malformed {
                        key: expr.key.clone(),
                        reason: format!("operator {} takes no values", expr.operator),
                    });
                }
                _ => {}
            }

            requirements.push(Requirement {
                key: expr.key.clone(),
                operator,
                values,
            });
        }

        if requirements.is_empty() {
            return Ok(None);
        }

        check_satisfiable(&requirements)?;
        Ok(Some(Self { requirements }))
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

fn check_key(key: &str) -> Result<(), SelectorError> {
    if key.is_empty() {
        return Err(SelectorError::Malformed {
            key: String::new(),
            reason: "empty label key".to_string(),
        });
    }
    Ok(())
}

/// Reject selectors whose requirements on a single key contradict each other.
fn check_satisfiable(requirements: &[Requirement]) -> Result<(), SelectorError> {
    let mut by_key: BTreeMap<&str, Vec<&Requirement>> = BTreeMap::new();
    for r in requirements {
        by_key.entry(r.key.as_str()).or_default().push(r);
    }

    for (key, reqs) in by_key {
        let must_be_absent = reqs.iter().any(|r| r.operator == Operator::DoesNotExist);
        let must_be_present = reqs
            .iter()
            .any(|r| matches!(r.operator, Operator::Exists | Operator::In));
        if must_be_absent && must_be_present {
            return Err(SelectorError::Unsatisfiable(key.to_string()));
        }

        let mut allowed: Option<BTreeSet<&String>> = None;
        for r in reqs.iter().filter(|r| r.operator == Operator::In) {
            let values: BTreeSet<&String> = r.values.iter().collect();
            allowed = Some(match allowed {
                Some(prev) => prev.intersection(&values).copied().collect(),
                None => values,
            });
        }

        if let Some(allowed) = allowed {
            let excluded: BTreeSet<&String> = reqs
                .iter()
                .filter(|r| r.operator == Operator::NotIn)
                .flat_map(|r| r.values.iter())
                .collect();
            if allowed.difference(&excluded).next().is_none() {
                return Err(SelectorError::Unsatisfiable(key.to_string()));
            }
        }
    }

    Ok(())
}

/// Check a label set against an optional selector. An absent or empty selector never matches.
pub fn matches(
    selector: Option<&LabelSelector>,
    labels: &BTreeMap<String, String>,
) -> Result<bool, SelectorError> {
    let Some(selector) = selector else {
        return Ok(false);
    };
    Ok(Selector::parse(selector)?.is_some_and(|s| s.matches(labels)))
}

/// Return the candidates matching the selector, ordered by name.
pub fn select<'a, K, I>(selector: Option<&LabelSelector>, candidates: I) -> Result<Vec<&'a K>, SelectorError>
where
    K: Resource + 'a,
    I: IntoIterator<Item = &'a K>,
{
    let Some(parsed) = selector.map(Selector::parse).transpose()?.flatten() else {
        return Ok(Vec::new());
    };

    let mut selected: Vec<&K> = candidates
        .into_iter()
        .filter(|c| parsed.matches(c.labels()))
        .collect();
    selected.sort_by_key(|c| c.name_any());
    Ok(selected)
}
