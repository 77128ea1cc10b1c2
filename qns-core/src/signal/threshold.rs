//! [`Threshold`] and the registration-reduction optimisation from §4.1.

use std::collections::HashMap;

use qns_events::{AccessNetworkKind, MeasurementType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Ge,
    Le,
}

impl Comparator {
    pub fn satisfied(self, latest: f64, value: f64) -> bool {
        match self {
            Comparator::Ge => latest >= value,
            Comparator::Le => latest <= value,
        }
    }
}

/// A single numeric gate on a measurement. `group_id < 0` means the
/// threshold is never reducible during registration optimisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub access_network: AccessNetworkKind,
    pub measurement_type: MeasurementType,
    pub comparator: Comparator,
    pub value: f64,
    pub group_id: i32,
    pub wait_time_ms: u32,
}

impl Threshold {
    pub fn key(&self) -> (AccessNetworkKind, MeasurementType) {
        (self.access_network, self.measurement_type)
    }

    pub fn is_reducible(&self) -> bool {
        self.group_id >= 0
    }
}

/// Given a candidate set of unmatched thresholds, drop whichever
/// `(access_network, measurement_type)` groups are redundant: registering
/// them would not change which `group_id`s are represented in the
/// remaining set. Iterates from the most frequent type down, since dropping
/// a more common type first maximises savings. Thresholds with
/// `group_id < 0` are never dropped.
pub fn reduce_thresholds(candidates: &[Threshold]) -> Vec<Threshold> {
    let mut counts: HashMap<(AccessNetworkKind, MeasurementType), usize> = HashMap::new();
    for t in candidates {
        if t.is_reducible() {
            *counts.entry(t.key()).or_insert(0) += 1;
        }
    }

    let mut types_by_count: Vec<_> = counts.into_iter().collect();
    types_by_count.sort_by(|a, b| b.1.cmp(&a.1));

    let mut kept: Vec<Threshold> = candidates.to_vec();
    let all_group_ids = |ts: &[Threshold]| -> std::collections::HashSet<i32> {
        ts.iter().map(|t| t.group_id).collect()
    };
    let full_group_ids = all_group_ids(candidates);

    for (key, _count) in types_by_count {
        let without: Vec<Threshold> = kept.iter().filter(|t| t.key() != key).cloned().collect();
        if all_group_ids(&without).is_superset(&full_group_ids) {
            kept = without;
        }
    }

    kept
}
