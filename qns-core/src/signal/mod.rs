//! C1: SignalQualityMonitor. One instance per transport (cellular, Wi-Fi),
//! shared across every APN on a slot.

pub mod condition;
pub mod threshold;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use qns_events::{AccessNetworkKind, ApnKind, MeasurementType, ThresholdCrossing};

pub use threshold::{reduce_thresholds, Comparator, Threshold};

type RegistrationKey = (u32, ApnKind);
type MeasurementKey = (AccessNetworkKind, MeasurementType);

/// Tracks the latest measurement per `(access_network, measurement_type)`
/// for one transport, and which thresholds each `(slot, apn)` currently has
/// registered. Crossing events are debounced per threshold by its
/// `wait_time_ms` and delivered to that `(slot, apn)`'s listener.
#[derive(Clone)]
pub struct SignalQualityMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    latest: DashMap<MeasurementKey, f64>,
    registered: DashMap<RegistrationKey, Vec<Threshold>>,
    listeners: DashMap<RegistrationKey, flume::Sender<ThresholdCrossing>>,
    /// Bumped per `(registration, measurement_key)` so an in-flight debounce
    /// timer can tell it has been superseded and should not fire.
    generation: DashMap<(RegistrationKey, MeasurementKey), Arc<AtomicU64>>,
}

impl Default for SignalQualityMonitor {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                latest: DashMap::new(),
                registered: DashMap::new(),
                listeners: DashMap::new(),
                generation: DashMap::new(),
            }),
        }
    }
}

impl SignalQualityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the monitored threshold set for `(slot, apn)`. An empty set
    /// unregisters entirely.
    pub fn update_thresholds(&self, slot: u32, apn: ApnKind, thresholds: Vec<Threshold>) {
        let key = (slot, apn);
        if thresholds.is_empty() {
            self.inner.registered.remove(&key);
        } else {
            self.inner.registered.insert(key, thresholds);
        }
    }

    pub fn register_listener(&self, slot: u32, apn: ApnKind, sender: flume::Sender<ThresholdCrossing>) {
        self.inner.listeners.insert((slot, apn), sender);
    }

    pub fn unregister_listener(&self, slot: u32, apn: ApnKind) {
        self.inner.listeners.remove(&(slot, apn));
    }

    /// Given a candidate set, returns those whose condition is currently
    /// not satisfied by the latest measurement. A measurement gap (no
    /// sample yet for that key) counts as unsatisfied.
    pub fn find_unmatched(&self, thresholds: &[Threshold]) -> Vec<Threshold> {
        thresholds
            .iter()
            .filter(|t| !self.is_satisfied(t))
            .cloned()
            .collect()
    }

    fn is_satisfied(&self, t: &Threshold) -> bool {
        self.inner
            .latest
            .get(&t.key())
            .map(|latest| t.comparator.satisfied(*latest, t.value))
            .unwrap_or(false)
    }

    /// Records a new sample and, for every `(slot, apn)` registration whose
    /// threshold on this measurement key newly becomes satisfied, arms a
    /// debounce timer; when it fires without being superseded, the crossing
    /// is delivered to that registration's listener.
    ///
    /// A measurement gap never fires on its own — this is only ever called
    /// with an actual sample, so debounce is edge-triggered by construction.
    pub fn report_measurement(&self, access_network: AccessNetworkKind, measurement_type: MeasurementType, value: f64) {
        let mkey = (access_network, measurement_type);
        self.inner.latest.insert(mkey, value);

        for entry in self.inner.registered.iter() {
            let reg_key = *entry.key();
            let Some(threshold) = entry.value().iter().find(|t| t.key() == mkey) else {
                continue;
            };
            if !threshold.comparator.satisfied(value, threshold.value) {
                continue;
            }

            let gen_key = (reg_key, mkey);
            let generation = self
                .inner
                .generation
                .entry(gen_key)
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .clone();
            let my_generation = generation.fetch_add(1, Ordering::SeqCst) + 1;

            let monitor = self.clone();
            let crossing = ThresholdCrossing {
                access_network,
                measurement_type,
                value,
            };
            let wait = Duration::from_millis(threshold.wait_time_ms as u64);

            tokio::spawn(async move {
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                if generation.load(Ordering::SeqCst) != my_generation {
                    return;
                }
                if let Some(sender) = monitor.inner.listeners.get(&reg_key) {
                    let _ = sender.send(crossing);
                }
            });
        }
    }
}
