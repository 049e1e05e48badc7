// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Overlay reconciler - validates KubeletConfig and ContainerRuntimeConfig
//! objects and reports the outcome in their own status.
//!
//! Rendering re-validates overlays on every pool pass, so this reconciler only
//! owns the `Success`/`Failure` conditions and never touches pools.

use crate::config::Config;
use crate::constants::reasons;
use crate::error::{ControllerError, Result};
use crate::kubernetes::patch_params;
use crate::overlay::{container_runtime, kubelet, OverlayError};
use crate::types::condition::{self, Condition};
use crate::types::{ContainerRuntimeConfig, KubeletConfig, OverlayConditionType};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::{
    api::Patch,
    runtime::{controller::Action, Controller},
    Api, Client, Resource, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// A pool-selected overlay whose payload can be checked on its own.
pub trait Overlay:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
    /// Validate the pool selector and payload
    fn check(&self) -> std::result::Result<(), OverlayError>;

    fn conditions(&self) -> &[Condition<OverlayConditionType>];

    fn observed_generation(&self) -> i64;
}

impl Overlay for KubeletConfig {
    fn check(&self) -> std::result::Result<(), OverlayError> {
        kubelet::validate(self).map(|_| ())
    }

    fn conditions(&self) -> &[Condition<OverlayConditionType>] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or_default()
    }

    fn observed_generation(&self) -> i64 {
        self.status.as_ref().map_or(0, |s| s.observed_generation)
    }
}

impl Overlay for ContainerRuntimeConfig {
    fn check(&self) -> std::result::Result<(), OverlayError> {
        container_runtime::resolve(self).map(|_| ())
    }

    fn conditions(&self) -> &[Condition<OverlayConditionType>] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or_default()
    }

    fn observed_generation(&self) -> i64 {
        self.status.as_ref().map_or(0, |s| s.observed_generation)
    }
}

fn failure_reason(err: &OverlayError) -> &'static str {
    match err {
        OverlayError::NoPoolSelector => reasons::NO_POOL_SELECTOR,
        OverlayError::Selector(_) => reasons::INVALID_SELECTOR,
        _ => reasons::INVALID_PAYLOAD,
    }
}

/// Conditions reflecting a validation outcome; exactly one of `Success` and
/// `Failure` is true.
pub fn overlay_conditions(
    previous: &[Condition<OverlayConditionType>],
    outcome: &std::result::Result<(), OverlayError>,
    now: DateTime<Utc>,
) -> Vec<Condition<OverlayConditionType>> {
    let mut conditions = previous.to_vec();
    match outcome {
        Ok(()) => {
            condition::upsert(
                &mut conditions,
                Condition::new(OverlayConditionType::Success, true, reasons::APPLIED, "", now),
            );
            condition::upsert(
                &mut conditions,
                Condition::new(OverlayConditionType::Failure, false, reasons::AS_EXPECTED, "", now),
            );
        }
        Err(e) => {
            let reason = failure_reason(e);
            condition::upsert(
                &mut conditions,
                Condition::new(OverlayConditionType::Success, false, reason, "", now),
            );
            condition::upsert(
                &mut conditions,
                Condition::new(OverlayConditionType::Failure, true, reason, e.to_string(), now),
            );
        }
    }
    conditions.sort_by_key(|c| c.condition_type != OverlayConditionType::Success);
    conditions
}

pub struct OverlayReconciler<K> {
    client: Client,
    config: Config,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Overlay> OverlayReconciler<K> {
    pub fn new(client: Client, config: Config) -> Self {
        Self {
            client,
            config,
            _kind: PhantomData,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let overlays: Api<K> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(overlays, WatcherConfig::default())
            .shutdown_on_signal()
            .run(reconcile::<K>, error_policy::<K>, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled {}: {:?}", K::kind(&()), o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

#[instrument(skip(overlay, ctx), fields(kind = %K::kind(&()), name = %overlay.name_any()))]
async fn reconcile<K: Overlay>(overlay: Arc<K>, ctx: Arc<OverlayReconciler<K>>) -> Result<Action> {
    let name = overlay.name_any();
    let outcome = overlay.check();
    if let Err(e) = &outcome {
        info!("{} {} is invalid: {}", K::kind(&()), name, e);
    }

    let generation = overlay.meta().generation.unwrap_or_default();
    let conditions = overlay_conditions(overlay.conditions(), &outcome, Utc::now());
    if generation == overlay.observed_generation() && conditions == overlay.conditions() {
        debug!("Status of {} {} is current", K::kind(&()), name);
        return Ok(Action::await_change());
    }

    let api: Api<K> = Api::all(ctx.client.clone());
    let patch = serde_json::json!({
        "status": {
            "observedGeneration": generation,
            "conditions": conditions,
        }
    });
    api.patch_status(&name, &patch_params(), &Patch::Merge(&patch))
        .await?;
    debug!("Updated status of {} {}", K::kind(&()), name);

    Ok(Action::await_change())
}

fn error_policy<K: Overlay>(overlay: Arc<K>, error: &ControllerError, ctx: Arc<OverlayReconciler<K>>) -> Action {
    error!(
        "Reconciliation error for {} {}: {}",
        K::kind(&()),
        overlay.name_any(),
        error
    );
    Action::requeue(ctx.config.error_requeue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{object_json, MockService};
    use crate::types::{
        ContainerRuntimeConfigSpec, ContainerRuntimeConfiguration, KubeletConfigSpec, KubeletConfigStatus,
    };
    use chrono::TimeZone;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    const GROUP: &str = "/apis/machineconfiguration.openshift.io/v1";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn worker_selector() -> Option<LabelSelector> {
        Some(LabelSelector {
            match_labels: Some(BTreeMap::from([(
                "pools.operator.machineconfiguration.openshift.io/worker".to_string(),
                String::new(),
            )])),
            match_expressions: None,
        })
    }

    fn make_kubelet_config(selector: Option<LabelSelector>) -> KubeletConfig {
        KubeletConfig {
            metadata: ObjectMeta {
                name: Some("max-pods".to_string()),
                generation: Some(2),
                ..Default::default()
            },
            spec: KubeletConfigSpec {
                machine_config_pool_selector: selector,
                kubelet_config: Some(RawExtension(serde_json::json!({"maxPods": 250}))),
            },
            status: None,
        }
    }

    fn make_runtime_config(pids_limit: i64) -> ContainerRuntimeConfig {
        ContainerRuntimeConfig {
            metadata: ObjectMeta {
                name: Some("set-pids".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: ContainerRuntimeConfigSpec {
                machine_config_pool_selector: worker_selector(),
                container_runtime_config: Some(ContainerRuntimeConfiguration {
                    pids_limit,
                    ..Default::default()
                }),
            },
            status: None,
        }
    }

    fn make_context<K: Overlay>(mock: MockService) -> Arc<OverlayReconciler<K>> {
        Arc::new(OverlayReconciler::new(mock.into_client(), Config::default()))
    }

    fn find(conditions: &[Condition<OverlayConditionType>], t: OverlayConditionType) -> &Condition<OverlayConditionType> {
        condition::find(conditions, &t).unwrap()
    }

    #[test]
    fn test_success_conditions() {
        let conditions = overlay_conditions(&[], &Ok(()), at(10));

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].condition_type, OverlayConditionType::Success);
        assert!(find(&conditions, OverlayConditionType::Success).is_true());
        assert!(!find(&conditions, OverlayConditionType::Failure).is_true());
    }

    #[test]
    fn test_failure_reasons() {
        let no_selector = overlay_conditions(&[], &Err(OverlayError::NoPoolSelector), at(10));
        let failure = find(&no_selector, OverlayConditionType::Failure);
        assert!(failure.is_true());
        assert_eq!(failure.reason, reasons::NO_POOL_SELECTOR);

        let bad_payload = overlay_conditions(&[], &Err(OverlayError::PidsLimitTooLow(5)), at(10));
        let failure = find(&bad_payload, OverlayConditionType::Failure);
        assert_eq!(failure.reason, reasons::INVALID_PAYLOAD);
        assert!(failure.message.contains("pidsLimit"));
        assert!(!find(&bad_payload, OverlayConditionType::Success).is_true());
    }

    #[test]
    fn test_transition_time_kept_while_outcome_is_stable() {
        let first = overlay_conditions(&[], &Ok(()), at(10));
        let second = overlay_conditions(&first, &Ok(()), at(20));
        assert_eq!(first, second);

        let failed = overlay_conditions(&second, &Err(OverlayError::MissingPayload), at(30));
        let success = find(&failed, OverlayConditionType::Success);
        assert_eq!(success.last_transition_time.as_ref().unwrap().0, at(30));
    }

    #[test]
    fn test_check_dispatches_per_kind() {
        assert!(make_kubelet_config(worker_selector()).check().is_ok());
        assert_eq!(
            make_kubelet_config(None).check(),
            Err(OverlayError::NoPoolSelector)
        );
        assert!(make_runtime_config(2048).check().is_ok());
        assert_eq!(
            make_runtime_config(5).check(),
            Err(OverlayError::PidsLimitTooLow(5))
        );
    }

    #[tokio::test]
    async fn test_invalid_overlay_reports_failure() {
        let kc = make_kubelet_config(None);
        let mock = MockService::new().on_patch(
            &format!("{}/kubeletconfigs/max-pods/status", GROUP),
            200,
            &object_json(&kc),
        );
        let requests = mock.requests();
        let ctx = make_context::<KubeletConfig>(mock);

        let action = reconcile(Arc::new(kc), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query_param("fieldManager"), Some("machine-config-controller"));
        let body = requests[0].json();
        assert_eq!(body["status"]["observedGeneration"], 2);
        assert_eq!(body["status"]["conditions"][1]["type"], "Failure");
        assert_eq!(body["status"]["conditions"][1]["status"], "True");
        assert_eq!(body["status"]["conditions"][1]["reason"], reasons::NO_POOL_SELECTOR);
    }

    #[tokio::test]
    async fn test_current_status_is_not_rewritten() {
        let mut kc = make_kubelet_config(worker_selector());
        kc.status = Some(KubeletConfigStatus {
            observed_generation: 2,
            conditions: overlay_conditions(&[], &Ok(()), at(10)),
        });
        let mock = MockService::new();
        let requests = mock.requests();
        let ctx = make_context::<KubeletConfig>(mock);

        reconcile(Arc::new(kc), ctx).await.unwrap();

        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_config_status_path() {
        let cc = make_runtime_config(5);
        let mock = MockService::new().on_patch(
            &format!("{}/containerruntimeconfigs/set-pids/status", GROUP),
            200,
            &object_json(&cc),
        );
        let requests = mock.requests();
        let ctx = make_context::<ContainerRuntimeConfig>(mock);

        reconcile(Arc::new(cc), ctx).await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].method, "PATCH");
        assert_eq!(
            requests[0].json()["status"]["conditions"][1]["reason"],
            reasons::INVALID_PAYLOAD
        );
    }
}
