//! C3: PolicyStore. A two-layer configuration lookup (carrier config over
//! asset default over hard-coded default) behind an immutable, atomically
//! swapped snapshot.

pub mod carrier_config;
pub mod rules;

use std::time::Duration;

use qns_events::{AccessNetworkKind, ApnKind, CallType, Coverage, MeasurementType, Preference, ProvisioningOverrides, RoamingType};

use crate::collaborators::CarrierConfigSource;
use crate::error::QnsError;
use crate::model::{PolicyDirection, PreCondition, Policy};
use crate::utils::{retry_for, State};

use carrier_config::{ApnPolicyConfig, CarrierConfig, InitialFallbackConfig, RatPreference, SupportedTransports, ThresholdTriple};

/// Loads, versions and answers queries on carrier configuration. One
/// instance per slot, shared across every APN on that slot.
pub struct PolicyStore {
    config: State<CarrierConfig>,
    overrides: State<ProvisioningOverrides>,
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self {
            config: State::new(CarrierConfig::default()),
            overrides: State::new(ProvisioningOverrides::default()),
        }
    }
}

impl PolicyStore {
    pub fn new(config: CarrierConfig) -> Self {
        Self {
            config: State::new(config),
            overrides: State::new(ProvisioningOverrides::default()),
        }
    }

    fn snapshot(&self) -> CarrierConfig {
        // Poisoning here means an earlier panic corrupted shared state;
        // there is no well-defined recovery, only surfacing it loudly.
        self.config
            .read(Clone::clone)
            .expect("policy store config lock poisoned by a prior panic")
    }

    fn apn_config(&self, apn: ApnKind) -> ApnPolicyConfig {
        self.snapshot().per_apn.get(&apn).cloned().unwrap_or_default()
    }

    /// Swaps in a freshly loaded carrier config. Returns `true` iff the
    /// threshold table or any APN's handover-rule set materially changed,
    /// so the caller knows whether to emit a config-changed event and
    /// rebuild derived tables rather than rebuilding on every reload.
    pub fn reload(&self, new_config: CarrierConfig) -> bool {
        let old = self.snapshot();
        let material_change = old.thresholds != new_config.thresholds
            || old.per_apn.iter().any(|(apn, cfg)| {
                new_config
                    .per_apn
                    .get(apn)
                    .is_none_or(|new_cfg| new_cfg.handover_rules != cfg.handover_rules)
            });
        self.config
            .write(|c| *c = new_config)
            .expect("policy store config lock poisoned by a prior panic");
        material_change
    }

    /// Loads carrier config for `carrier_id` via `source`, retrying on
    /// failure (the host's carrier-config service is frequently unavailable
    /// for a few hundred ms right after a SIM swap), then reloads it in.
    /// Returns whatever `reload` reports.
    pub async fn reload_from_source(
        &self,
        source: &dyn CarrierConfigSource,
        carrier_id: u32,
        timeout: Duration,
        backoff: Duration,
    ) -> Result<bool, QnsError> {
        let raw = retry_for(timeout, backoff, || async { source.load(carrier_id).await }).await?;
        Ok(self.reload(CarrierConfig::from_raw(raw)))
    }

    pub fn set_provisioning_overrides(&self, overrides: ProvisioningOverrides) {
        self.overrides
            .write(|o| *o = overrides)
            .expect("policy store overrides lock poisoned by a prior panic");
    }

    fn current_overrides(&self) -> ProvisioningOverrides {
        self.overrides
            .read(Clone::clone)
            .expect("policy store overrides lock poisoned by a prior panic")
    }

    /// `{good, bad, worst?}` for `(network, call_type, measurement)`.
    /// `preference` selects among carrier-configured variants when present;
    /// the hard-coded default table does not itself vary by preference.
    /// Provisioning overrides apply only to LTE RSRP / Wi-Fi RSSI (§9).
    pub fn threshold_by_preference(
        &self,
        network: AccessNetworkKind,
        call_type: CallType,
        measurement: MeasurementType,
        _preference: Preference,
    ) -> ThresholdTriple {
        let triple = self.snapshot().threshold(network, measurement, call_type);
        self.apply_overrides(triple, network, measurement)
    }

    fn apply_overrides(&self, triple: ThresholdTriple, network: AccessNetworkKind, measurement: MeasurementType) -> ThresholdTriple {
        if !carrier_config::overridable(measurement) {
            return triple;
        }
        let overrides = self.current_overrides();
        match (network, measurement) {
            (AccessNetworkKind::Eutran, MeasurementType::Rsrp) => ThresholdTriple {
                good: overrides.lte_th_1.map(f64::from).unwrap_or(triple.good),
                bad: overrides.lte_th_2.map(f64::from).unwrap_or(triple.bad),
                worst: overrides.lte_th_3.map(f64::from).or(triple.worst),
            },
            (AccessNetworkKind::Iwlan, MeasurementType::Rssi) => ThresholdTriple {
                good: overrides.wifi_th_a.map(f64::from).unwrap_or(triple.good),
                bad: overrides.wifi_th_b.map(f64::from).unwrap_or(triple.bad),
                worst: triple.worst,
            },
            _ => triple,
        }
    }

    /// Provisioning override first (IMS LTE/Wi-Fi EPDG timers), then the
    /// per-APN table, then a zero default.
    pub fn hysteresis_timer(&self, apn: ApnKind, transport_is_wlan: bool, call_type: CallType) -> u32 {
        if apn == ApnKind::Ims {
            let overrides = self.current_overrides();
            let override_ms = if transport_is_wlan {
                overrides.wifi_epdg_timer_sec
            } else {
                overrides.lte_epdg_timer_sec
            };
            if let Some(sec) = override_ms {
                return sec.saturating_mul(1000);
            }
        }

        let idx = if transport_is_wlan { 1 } else { 0 };
        self.apn_config(apn)
            .hysteresis_timer_ms
            .get(&call_type)
            .map(|pair| pair[idx])
            .unwrap_or(0)
    }

    pub fn rat_preference(&self, apn: ApnKind) -> RatPreference {
        self.apn_config(apn).rat_preference
    }

    pub fn supported_transports(&self, apn: ApnKind) -> SupportedTransports {
        self.apn_config(apn).supported_transports
    }

    /// Evaluates the ordered handover-rule list for `apn`: first match
    /// wins. With no match, IMS defaults to allow, everything else to deny.
    pub fn handover_allowed(&self, apn: ApnKind, src: AccessNetworkKind, dst: AccessNetworkKind, coverage: Coverage) -> bool {
        let cfg = self.apn_config(apn);
        for rule in &cfg.handover_rules {
            if !rule.matches(src, dst) {
                continue;
            }
            if let Some(roaming) = rule.roaming {
                if roaming != (coverage == Coverage::Roam) {
                    continue;
                }
            }
            return rule.allowed;
        }
        apn == ApnKind::Ims
    }

    pub fn fallback_time_ims_unregistered(&self, apn: ApnKind, cause_code: i32, preference: Preference) -> u32 {
        self.fallback_time(apn, cause_code, preference)
    }

    pub fn fallback_time_ims_ho_register_failed(&self, apn: ApnKind, cause_code: i32, preference: Preference) -> u32 {
        self.fallback_time(apn, cause_code, preference)
    }

    fn fallback_time(&self, apn: ApnKind, cause_code: i32, preference: Preference) -> u32 {
        self.apn_config(apn)
            .fallback_rules
            .iter()
            .find(|r| r.matches_cause(cause_code) && r.preference.is_none_or(|p| p == preference))
            .map(|r| r.time_ms as u32)
            .unwrap_or(0)
    }

    pub fn initial_connection_fallback(&self, apn: ApnKind) -> Option<InitialFallbackConfig> {
        self.apn_config(apn).initial_fallback
    }

    pub fn rtp_metrics_config(&self) -> carrier_config::RtpMetricsConfig {
        self.snapshot().rtp_metrics
    }

    pub fn rtt_backhaul_fallback_time(&self, apn: ApnKind) -> u32 {
        self.apn_config(apn).rtt_backhaul_fallback_ms
    }

    pub fn iwlan_in_call_rove_out_max(&self, apn: ApnKind) -> u32 {
        self.apn_config(apn).iwlan_in_call_rove_out_max
    }

    pub fn overrides_snapshot(&self) -> ProvisioningOverrides {
        self.current_overrides()
    }

    /// IMS uses the carrier-configured RAT allow-list; EMERGENCY inherits
    /// IMS's; other APNs allow any known (non-`UNKNOWN`) network.
    pub fn is_access_network_allowed(&self, network: AccessNetworkKind, apn: ApnKind) -> bool {
        if network == AccessNetworkKind::Unknown {
            return false;
        }
        if network == AccessNetworkKind::Iwlan {
            return true;
        }
        match apn {
            ApnKind::Ims | ApnKind::Emergency => self.snapshot().ims_rat_allow_list.contains(&network),
            ApnKind::Mms | ApnKind::Xcap | ApnKind::Cbs => true,
        }
    }

    pub fn is_mmtel_capability_required(&self, coverage: Coverage) -> bool {
        let cfg = self.snapshot();
        match coverage {
            Coverage::Home => cfg.mmtel_requires_provisioning,
            Coverage::Roam => cfg.mmtel_requires_provisioning && cfg.volte_roaming_supported,
        }
    }

    pub fn is_volte_roaming_supported(&self, coverage: Coverage) -> bool {
        match coverage {
            Coverage::Home => true,
            Coverage::Roam => self.snapshot().volte_roaming_supported,
        }
    }

    /// For APNs on the international-roaming list: a domestic-listed PLMN
    /// refutes an `INTERNATIONAL` roaming type back to `HOME`; an
    /// international-listed PLMN refutes `DOMESTIC` back to `ROAM`.
    /// Otherwise any roaming indication is `ROAM`.
    pub fn is_international_roaming(&self, apn: ApnKind, roaming_type: RoamingType, plmn: Option<&str>) -> Coverage {
        let cfg = self.snapshot();
        if roaming_type == RoamingType::Domestic {
            if let Some(plmn) = plmn {
                if cfg.international_roaming_apns.contains(&apn) && cfg.international_plmns.iter().any(|p| p == plmn) {
                    return Coverage::Roam;
                }
            }
            return Coverage::Home;
        }

        if let Some(plmn) = plmn {
            if cfg.international_roaming_apns.contains(&apn) && cfg.domestic_plmns.iter().any(|p| p == plmn) {
                return Coverage::Home;
            }
        }
        Coverage::Roam
    }

    pub fn override_ims_wfc_in_cell_pref(&self) -> bool {
        self.snapshot().override_ims_wfc_in_cell_pref
    }

    pub fn in_call_ho_decision_wlan_to_wwan_without_vops_condition(&self) -> bool {
        self.snapshot().in_call_ho_decision_wlan_to_wwan_without_vops_condition
    }

    /// The policies registered for `(apn, direction)` whose pre-condition
    /// matches. While no transport is under `GUARDING` (the live
    /// pre-condition's `guarding` is `None`), every policy applies regardless
    /// of what it was written with; once a transport is guarded, only a
    /// policy whose own pre-condition names that exact guarding state is
    /// evaluable — an ordinary rove policy is suppressed for the duration of
    /// the guarding window rather than firing against a transport that is
    /// about to become available again anyway.
    pub fn policies_for(&self, apn: ApnKind, pre_condition: PreCondition, direction: PolicyDirection) -> Vec<Policy> {
        let cfg = self.apn_config(apn);
        let list = match direction {
            PolicyDirection::RoveIn => &cfg.rove_in_policies,
            PolicyDirection::RoveOut => &cfg.rove_out_policies,
        };
        list.iter().filter(|p| p.direction == direction && pre_condition.matches(&p.pre_condition)).cloned().collect()
    }
}
