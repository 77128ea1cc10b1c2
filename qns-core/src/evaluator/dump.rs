//! §6's diagnostic snapshot: a pure, side-effect-free read of one
//! Evaluator's current state, for `dumpsys`-style tooling and bug reports.

use qns_events::{
    AccessNetworkKind, ApnKind, CallType, Coverage, Preference, ProvisioningOverrides, RestrictType, TransportKind,
};

use crate::model::{Policy, PolicyDirection};

use super::pipeline::satisfied_policies;
use super::Evaluator;

/// A point-in-time read of everything the evaluation pipeline consults.
/// Never published, never compared for change detection — only for display.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticSnapshot {
    pub apn: ApnKind,
    pub initialized: bool,
    pub sim_absent: bool,
    pub call_type: CallType,
    pub preference: Preference,
    pub coverage: Coverage,
    pub cellular_available: bool,
    pub cellular_access_network: AccessNetworkKind,
    pub iwlan_available: bool,
    pub last_published: Option<Vec<AccessNetworkKind>>,
    pub wifi_restrictions: Vec<RestrictType>,
    pub cellular_restrictions: Vec<RestrictType>,
    pub active_policies: Vec<Policy>,
    pub provisioning_overrides: ProvisioningOverrides,
}

impl Evaluator {
    pub fn diagnostic_snapshot(&self) -> DiagnosticSnapshot {
        let mut active_policies = satisfied_policies(&self.store, &self.signal, self.apn, &self.cached, PolicyDirection::RoveIn);
        active_policies.extend(satisfied_policies(
            &self.store,
            &self.signal,
            self.apn,
            &self.cached,
            PolicyDirection::RoveOut,
        ));

        DiagnosticSnapshot {
            apn: self.apn,
            initialized: self.cached.initialized,
            sim_absent: self.cached.sim_absent,
            call_type: self.cached.call_type,
            preference: self.cached.preference,
            coverage: self.cached.coverage,
            cellular_available: self.cached.cellular_available,
            cellular_access_network: self.cached.cellular_access_network,
            iwlan_available: self.cached.iwlan_available,
            last_published: self.cached.last_published.clone(),
            wifi_restrictions: self.restrictions.restrictions_of(TransportKind::Wifi),
            cellular_restrictions: self.restrictions.restrictions_of(TransportKind::Cellular),
            active_policies,
            provisioning_overrides: self.store.overrides_snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::carrier_config::CarrierConfig;
    use crate::policy::PolicyStore;
    use crate::signal::SignalQualityMonitor;
    use async_trait::async_trait;
    use qns_events::QualifiedNetworksChanged;
    use std::sync::Arc;

    struct NullSink;

    #[async_trait]
    impl crate::collaborators::AccessNetworkSink for NullSink {
        async fn publish(&self, _change: QualifiedNetworksChanged) {}
    }

    #[tokio::test]
    async fn snapshot_reflects_cached_state_after_sim_loaded() {
        let store = PolicyStore::new(CarrierConfig::default());
        let signal = SignalQualityMonitor::new();
        let (handle, join) = Evaluator::spawn(0, ApnKind::Ims, store, signal, Arc::new(NullSink));

        handle.send(qns_events::InboundEvent::SimLoaded);
        let snapshot = handle.snapshot().await.expect("evaluator task still running");

        assert!(snapshot.initialized);
        assert!(!snapshot.sim_absent);
        assert_eq!(snapshot.apn, ApnKind::Ims);

        join.abort();
    }
}
