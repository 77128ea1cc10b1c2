//! Shared fixtures for the integration tests: a capturing sink so a test can
//! await what an `Evaluator` actually published, plus small `CarrierConfig`
//! builders for the scenarios that need a rove-in/rove-out policy wired up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qns_core::collaborators::AccessNetworkSink;
use qns_core::model::{Policy, PolicyDirection, PreCondition};
use qns_core::policy::carrier_config::{ApnPolicyConfig, CarrierConfig};
use qns_core::signal::condition::Condition;
use qns_events::{ApnKind, QualifiedNetworksChanged, TransportKind};

pub struct CapturingSink {
    tx: flume::Sender<QualifiedNetworksChanged>,
}

#[async_trait]
impl AccessNetworkSink for CapturingSink {
    async fn publish(&self, change: QualifiedNetworksChanged) {
        let _ = self.tx.send(change);
    }
}

/// Builds a sink plus the receiving end. Every `publish` call the Evaluator
/// makes (skipped when it repeats the last value) lands on `rx`.
pub fn capturing_sink() -> (Arc<CapturingSink>, flume::Receiver<QualifiedNetworksChanged>) {
    let (tx, rx) = flume::unbounded();
    (Arc::new(CapturingSink { tx }), rx)
}

/// Waits for the next publish, failing the test if none arrives in time.
pub async fn next_publish(rx: &flume::Receiver<QualifiedNetworksChanged>) -> QualifiedNetworksChanged {
    tokio::time::timeout(Duration::from_millis(500), rx.recv_async())
        .await
        .expect("evaluator should have published by now")
        .expect("sink channel should not have closed")
}

/// Fails the test if a publish arrives within `window` — used to assert a
/// restriction is holding the last publish steady.
pub async fn assert_no_publish_within(rx: &flume::Receiver<QualifiedNetworksChanged>, window: Duration) {
    if let Ok(Ok(change)) = tokio::time::timeout(window, rx.recv_async()).await {
        panic!("unexpected publish during quiet window: {change:?}");
    }
}

/// Waits for the first publish, then keeps draining until the channel has
/// been quiet for 150ms, returning the last value seen. Driving an
/// `Evaluator` with a batch of events can legitimately produce more than
/// one intermediate publish before the inputs settle (e.g. a transient
/// cellular-only publish before IWLAN availability arrives) — tests that
/// only care about the final state should assert against this rather than
/// the very first publish.
pub async fn settle(rx: &flume::Receiver<QualifiedNetworksChanged>) -> QualifiedNetworksChanged {
    let mut last = next_publish(rx).await;
    while let Ok(Ok(next)) = tokio::time::timeout(Duration::from_millis(150), rx.recv_async()).await {
        last = next;
    }
    last
}

/// One rove-in/rove-out policy for `apn`, applicable whenever `pre_condition`
/// matches, firing on `condition` alone.
pub fn single_condition_policy(
    direction: PolicyDirection,
    pre_condition: PreCondition,
    target_transport: TransportKind,
    condition: Condition,
) -> Policy {
    Policy {
        direction,
        pre_condition,
        target_transport,
        condition_groups: vec![vec![condition]],
    }
}

pub fn config_with_apn_policy(apn: ApnKind, policy: Policy) -> CarrierConfig {
    let mut config = CarrierConfig::default();
    let mut apn_cfg = ApnPolicyConfig::default();
    match policy.direction {
        PolicyDirection::RoveIn => apn_cfg.rove_in_policies.push(policy),
        PolicyDirection::RoveOut => apn_cfg.rove_out_policies.push(policy),
    }
    config.per_apn.insert(apn, apn_cfg);
    config
}
