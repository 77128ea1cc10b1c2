//! The named quality bands policies are written against.

use qns_events::{AccessNetworkKind, CallType, MeasurementType, Preference};

use crate::policy::PolicyStore;

use super::threshold::{Comparator, Threshold};

/// A tagged sum over the quality bands named in §3. Each resolves to one or
/// more [`crate::signal::threshold::Threshold`]s via
/// [`crate::policy::PolicyStore`], keyed on `(call_type, measurement,
/// good/bad/worst)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    WifiAvailable,
    WifiGood,
    WifiBad,
    CellularGood,
    CellularBad,
    EutranGood,
    EutranBad,
    EutranWorst,
    NgranGood,
    NgranBad,
    NgranWorst,
    UtranAvailable,
    GeranAvailable,
}

/// Which side of a `ThresholdTriple` a condition is testing.
enum Band {
    /// Signal present at all: satisfied at or above the `bad` bound, since
    /// the store has no separate "is there a reading" threshold and a
    /// measurement at least as good as `bad` is the weakest one the carrier
    /// still calls usable.
    Available,
    Good,
    Bad,
    /// Omitted entirely when the triple carries no `worst` value (IWLAN,
    /// two-value profiles).
    Worst,
}

/// A measurement has no defined threshold for a transport that is not the
/// one named by the condition; this is the one place that mapping is made
/// explicit, so a reader does not have to reconstruct it from the RAT ↔
/// measurement pairing used elsewhere (`§3`'s measurement enum).
fn measurement_for_cellular_network(net: AccessNetworkKind) -> MeasurementType {
    match net {
        AccessNetworkKind::Eutran => MeasurementType::Rsrp,
        AccessNetworkKind::Ngran => MeasurementType::SsRsrp,
        AccessNetworkKind::Utran => MeasurementType::Rscp,
        AccessNetworkKind::Geran | AccessNetworkKind::Unknown | AccessNetworkKind::Iwlan => MeasurementType::Rssi,
    }
}

impl Condition {
    /// Conditions whose satisfaction depends on a Wi-Fi measurement rather
    /// than a cellular one.
    pub fn is_wifi(self) -> bool {
        matches!(self, Condition::WifiAvailable | Condition::WifiGood | Condition::WifiBad)
    }

    pub fn is_cellular(self) -> bool {
        !self.is_wifi()
    }

    fn band(self) -> Band {
        match self {
            Condition::WifiAvailable | Condition::UtranAvailable | Condition::GeranAvailable => Band::Available,
            Condition::WifiGood | Condition::CellularGood | Condition::EutranGood | Condition::NgranGood => Band::Good,
            Condition::WifiBad | Condition::CellularBad | Condition::EutranBad | Condition::NgranBad => Band::Bad,
            Condition::EutranWorst | Condition::NgranWorst => Band::Worst,
        }
    }

    /// The `(access_network, measurement_type)` this condition is measured
    /// against. `CellularGood`/`CellularBad` float onto whichever cellular
    /// access network is currently live, since the spec names them without
    /// pinning a specific RAT.
    fn network_and_measurement(self, cellular_network: AccessNetworkKind) -> (AccessNetworkKind, MeasurementType) {
        match self {
            Condition::WifiAvailable | Condition::WifiGood | Condition::WifiBad => (AccessNetworkKind::Iwlan, MeasurementType::Rssi),
            Condition::CellularGood | Condition::CellularBad => {
                (cellular_network, measurement_for_cellular_network(cellular_network))
            }
            Condition::EutranGood | Condition::EutranBad | Condition::EutranWorst => (AccessNetworkKind::Eutran, MeasurementType::Rsrp),
            Condition::NgranGood | Condition::NgranBad | Condition::NgranWorst => {
                (AccessNetworkKind::Ngran, MeasurementType::SsRsrp)
            }
            Condition::UtranAvailable => (AccessNetworkKind::Utran, MeasurementType::Rscp),
            Condition::GeranAvailable => (AccessNetworkKind::Geran, MeasurementType::Rssi),
        }
    }

    /// Resolves this condition to the `Threshold`(s) backing it right now,
    /// via `store`'s `(network, call_type, measurement, preference)`
    /// lookup. `wait_time_ms` and `group_id` are the caller's concern (the
    /// registration-optimisation pass sets them; evaluation-only callers
    /// that just want live satisfaction can pass `0`/`-1`).
    pub fn thresholds(
        self,
        store: &PolicyStore,
        call_type: CallType,
        preference: Preference,
        cellular_network: AccessNetworkKind,
        wait_time_ms: u32,
        group_id: i32,
    ) -> Vec<Threshold> {
        let (access_network, measurement_type) = self.network_and_measurement(cellular_network);
        let triple = store.threshold_by_preference(access_network, call_type, measurement_type, preference);

        let mk = |comparator: Comparator, value: f64| Threshold {
            access_network,
            measurement_type,
            comparator,
            value,
            group_id,
            wait_time_ms,
        };

        match self.band() {
            Band::Available => vec![mk(Comparator::Ge, triple.bad)],
            Band::Good => vec![mk(Comparator::Ge, triple.good)],
            Band::Bad => vec![mk(Comparator::Le, triple.bad)],
            Band::Worst => triple.worst.into_iter().map(|w| mk(Comparator::Le, w)).collect(),
        }
    }
}
