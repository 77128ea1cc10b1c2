//! Exercises `PolicyStore::reload_from_source` against a mocked
//! `CarrierConfigSource`, the same `mockall::mock!` style the host would use
//! to stand in for its own carrier-config XML loader in tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use qns_core::collaborators::CarrierConfigSource;
use qns_core::error::QnsError;
use qns_core::policy::carrier_config::{CarrierConfig, RawCarrierConfig, ThresholdTriple};
use qns_core::policy::PolicyStore;
use qns_events::{AccessNetworkKind, CallType, MeasurementType};
use test_utils::async_bag::AsyncBag;

/// A config that differs from the all-defaults snapshot `PolicyStore::new`
/// starts with, so `reload` reports a material change.
fn raw_config_with_one_threshold(carrier_id: u32) -> RawCarrierConfig {
    let mut raw = RawCarrierConfig { carrier_id, ..Default::default() };
    raw.thresholds.insert(
        (AccessNetworkKind::Eutran, MeasurementType::Rsrp, CallType::Idle),
        ThresholdTriple { good: -95.0, bad: -110.0, worst: Some(-120.0) },
    );
    raw
}

mock! {
    pub ConfigSource {}

    #[async_trait]
    impl CarrierConfigSource for ConfigSource {
        async fn load(&self, carrier_id: u32) -> Result<RawCarrierConfig, QnsError>;
    }
}

/// `reload_from_source` retries a transient load failure and succeeds once
/// the source recovers within the timeout budget.
#[test_log::test(tokio::test)]
async fn reload_from_source_retries_until_it_succeeds() {
    let failures_remaining = Arc::new(AtomicU32::new(2));
    let attempts = Arc::new(AtomicU32::new(0));

    let mut source = MockConfigSource::new();
    source.expect_load().returning({
        let failures_remaining = failures_remaining.clone();
        let attempts = attempts.clone();
        move |carrier_id| {
            attempts.fetch_add(1, Ordering::SeqCst);
            if failures_remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(QnsError::ConfigInvalid {
                    rule: "carrier-config".to_owned(),
                    reason: "source temporarily unreachable".to_owned(),
                });
            }
            Ok(raw_config_with_one_threshold(carrier_id))
        }
    });

    let store = PolicyStore::new(CarrierConfig::default());
    let changed = store
        .reload_from_source(&source, 7, Duration::from_secs(1), Duration::from_millis(1))
        .await
        .expect("should eventually succeed within the timeout budget");

    assert!(changed);
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "two failures then a success");
}

/// A source that never recovers surfaces its last error once the retry
/// budget is exhausted, and never panics the caller.
#[tokio::test]
async fn reload_from_source_gives_up_after_its_timeout() {
    let mut source = MockConfigSource::new();
    source.expect_load().returning(|_| {
        Err(QnsError::ConfigInvalid {
            rule: "carrier-config".to_owned(),
            reason: "source permanently unreachable".to_owned(),
        })
    });

    let store = PolicyStore::new(CarrierConfig::default());
    let result = store
        .reload_from_source(&source, 99, Duration::from_millis(20), Duration::from_millis(5))
        .await;

    assert!(matches!(result, Err(QnsError::ConfigInvalid { .. })));
}

/// A background task polling the mocked source reports its outcome through
/// an `AsyncBag`, the same collection idiom the scenario tests would use for
/// anything collected off a spawned task rather than a channel.
#[tokio::test]
async fn background_reload_task_reports_its_outcome_through_an_async_bag() {
    let mut source = MockConfigSource::new();
    source.expect_load().returning(|carrier_id| Ok(raw_config_with_one_threshold(carrier_id)));

    let store = Arc::new(PolicyStore::new(CarrierConfig::default()));
    let outcome = AsyncBag::new(None::<bool>);

    let task = {
        let store = store.clone();
        let outcome = outcome.clone();
        tokio::spawn(async move {
            let changed = store
                .reload_from_source(&source, 42, Duration::from_millis(50), Duration::from_millis(5))
                .await
                .expect("mocked source never fails");
            outcome.set(Some(changed)).await;
        })
    };
    task.await.expect("background reload task should not panic");

    assert_eq!(outcome.read().await, Some(true));
}
