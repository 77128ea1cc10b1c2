//! The carrier-config schema named in §4.3: typed keys, hard-coded
//! defaults, and the structures `PolicyStore` loads into an immutable
//! snapshot.

use std::collections::HashMap;

use qns_events::{AccessNetworkKind, ApnKind, CallType, MeasurementType, Preference};

use super::rules::{FallbackRule, HandoverRule};
use crate::model::Policy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTriple {
    pub good: f64,
    pub bad: f64,
    /// Omitted for IWLAN and for two-value profiles.
    pub worst: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatPreference {
    Default,
    WifiOnly,
    WifiWhenWfcAvailable,
    WifiWhenNoCellular,
    WifiWhenHomeIsNotAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedTransports {
    Wwan,
    Wlan,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialFallbackConfig {
    pub enabled: bool,
    pub retry_count: u32,
    pub retry_timer_ms: u32,
    pub fallback_guard_ms: u32,
    pub max_fallback_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtpMetricsConfig {
    pub jitter: f64,
    pub loss_rate_pct: f64,
    pub loss_time_ms: u32,
    pub no_rtp_interval_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApnPolicyConfig {
    pub rove_in_policies: Vec<Policy>,
    pub rove_out_policies: Vec<Policy>,
    pub handover_rules: Vec<HandoverRule>,
    pub fallback_rules: Vec<FallbackRule>,
    /// `[wwan_ms, wlan_ms]` keyed by call type.
    pub hysteresis_timer_ms: HashMap<CallType, [u32; 2]>,
    pub rat_preference: RatPreference,
    pub supported_transports: SupportedTransports,
    pub initial_fallback: Option<InitialFallbackConfig>,
    /// Hysteresis for `FALLBACK_TO_WWAN_RTT_BACKHAUL_FAIL` (ms). 0 disables
    /// the RTT backhaul check fallback entirely.
    pub rtt_backhaul_fallback_ms: u32,
    /// Consecutive low-RTP-quality reports on WLAN before
    /// `RESTRICT_IWLAN_IN_CALL` is armed.
    pub iwlan_in_call_rove_out_max: u32,
}

impl Default for ApnPolicyConfig {
    fn default() -> Self {
        Self {
            rove_in_policies: Vec::new(),
            rove_out_policies: Vec::new(),
            handover_rules: Vec::new(),
            fallback_rules: Vec::new(),
            hysteresis_timer_ms: HashMap::new(),
            rat_preference: RatPreference::Default,
            supported_transports: SupportedTransports::Both,
            initial_fallback: None,
            rtt_backhaul_fallback_ms: 0,
            iwlan_in_call_rove_out_max: 3,
        }
    }
}

/// An immutable snapshot of one carrier's configuration. A reload swaps the
/// whole snapshot atomically; `PolicyStore::reload` diffs the new one
/// against the old to decide whether to emit a config-changed event.
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierConfig {
    pub carrier_id: u32,
    pub per_apn: HashMap<ApnKind, ApnPolicyConfig>,
    pub thresholds: HashMap<(AccessNetworkKind, MeasurementType, CallType), ThresholdTriple>,
    pub ims_rat_allow_list: Vec<AccessNetworkKind>,
    pub mmtel_requires_provisioning: bool,
    pub volte_roaming_supported: bool,
    pub international_roaming_apns: Vec<ApnKind>,
    pub domestic_plmns: Vec<String>,
    pub international_plmns: Vec<String>,
    pub override_ims_wfc_in_cell_pref: bool,
    pub in_call_ho_decision_wlan_to_wwan_without_vops_condition: bool,
    pub rtp_metrics: RtpMetricsConfig,
}

impl CarrierConfig {
    pub fn threshold(&self, network: AccessNetworkKind, measurement: MeasurementType, call_type: CallType) -> ThresholdTriple {
        self.thresholds
            .get(&(network, measurement, call_type))
            .copied()
            .unwrap_or_else(|| default_threshold(network, measurement))
    }
}

/// Hard-coded fallback when neither the carrier config nor an asset default
/// supplies a value, per "missing keys return a hard-coded default" (§4.3).
fn default_threshold(network: AccessNetworkKind, measurement: MeasurementType) -> ThresholdTriple {
    match (network, measurement) {
        (AccessNetworkKind::Iwlan, MeasurementType::Rssi) => ThresholdTriple {
            good: -60.0,
            bad: -80.0,
            worst: None,
        },
        (AccessNetworkKind::Eutran, MeasurementType::Rsrp) => ThresholdTriple {
            good: -90.0,
            bad: -100.0,
            worst: Some(-110.0),
        },
        (AccessNetworkKind::Ngran, MeasurementType::SsRsrp) => ThresholdTriple {
            good: -95.0,
            bad: -105.0,
            worst: Some(-115.0),
        },
        _ => ThresholdTriple {
            good: f64::NEG_INFINITY,
            bad: f64::NEG_INFINITY,
            worst: None,
        },
    }
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            carrier_id: 0,
            per_apn: HashMap::new(),
            thresholds: HashMap::new(),
            ims_rat_allow_list: vec![
                AccessNetworkKind::Eutran,
                AccessNetworkKind::Ngran,
                AccessNetworkKind::Utran,
                AccessNetworkKind::Geran,
            ],
            mmtel_requires_provisioning: false,
            volte_roaming_supported: true,
            international_roaming_apns: Vec::new(),
            domestic_plmns: Vec::new(),
            international_plmns: Vec::new(),
            override_ims_wfc_in_cell_pref: false,
            in_call_ho_decision_wlan_to_wwan_without_vops_condition: false,
            rtp_metrics: RtpMetricsConfig {
                jitter: 30.0,
                loss_rate_pct: 5.0,
                loss_time_ms: 5000,
                no_rtp_interval_ms: 4000,
            },
        }
    }
}

/// Unused by direct name but documents the provisioning-override
/// precedence rule from §9: overrides apply only to LTE RSRP / Wi-Fi RSSI,
/// never to other measurement types.
pub fn overridable(measurement: MeasurementType) -> bool {
    matches!(measurement, MeasurementType::Rsrp | MeasurementType::Rssi)
}

pub fn preference_from_str(s: &str) -> Option<Preference> {
    match s.to_ascii_lowercase().as_str() {
        "cell" => Some(Preference::CellPref),
        "wifi" => Some(Preference::WifiPref),
        _ => None,
    }
}

/// The handover/fallback rule lists as the carrier-config source hands them
/// over: plain strings in the §6 grammar, not yet parsed. Everything else
/// in a carrier config is already a typed value by the time it reaches the
/// core (XML parsing itself stays the host's concern, per §1), but these
/// two grammars are named textually in the spec as something "a reader
/// must honour" — the core owns parsing them, including discarding a
/// malformed rule rather than failing the whole load (§7 `ConfigInvalid`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawApnPolicyConfig {
    pub rove_in_policies: Vec<Policy>,
    pub rove_out_policies: Vec<Policy>,
    pub handover_rules: Vec<String>,
    pub fallback_rules: Vec<String>,
    pub hysteresis_timer_ms: HashMap<CallType, [u32; 2]>,
    pub rat_preference: RatPreference,
    pub supported_transports: SupportedTransports,
    pub initial_fallback: Option<InitialFallbackConfig>,
    pub rtt_backhaul_fallback_ms: u32,
    pub iwlan_in_call_rove_out_max: u32,
}

impl Default for RatPreference {
    fn default() -> Self {
        RatPreference::Default
    }
}

impl Default for SupportedTransports {
    fn default() -> Self {
        SupportedTransports::Both
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCarrierConfig {
    pub carrier_id: u32,
    pub per_apn: HashMap<ApnKind, RawApnPolicyConfig>,
    pub thresholds: HashMap<(AccessNetworkKind, MeasurementType, CallType), ThresholdTriple>,
    pub ims_rat_allow_list: Vec<AccessNetworkKind>,
    pub mmtel_requires_provisioning: bool,
    pub volte_roaming_supported: bool,
    pub international_roaming_apns: Vec<ApnKind>,
    pub domestic_plmns: Vec<String>,
    pub international_plmns: Vec<String>,
    pub override_ims_wfc_in_cell_pref: bool,
    pub in_call_ho_decision_wlan_to_wwan_without_vops_condition: bool,
    pub rtp_metrics: Option<RtpMetricsConfig>,
}

impl CarrierConfig {
    /// Parses the §6 grammar strings in `raw` into `HandoverRule`/
    /// `FallbackRule`; a rule that fails to parse is logged and dropped,
    /// the remainder of that APN's config still loads (§7 `ConfigInvalid`).
    pub fn from_raw(raw: RawCarrierConfig) -> Self {
        let mut per_apn = HashMap::with_capacity(raw.per_apn.len());
        for (apn, raw_cfg) in raw.per_apn {
            let handover_rules = raw_cfg
                .handover_rules
                .iter()
                .filter_map(|rule| match super::rules::HandoverRule::parse(rule) {
                    Ok(parsed) => Some(parsed),
                    Err(err) => {
                        tracing::warn!(%apn, rule, %err, "discarding malformed handover rule");
                        None
                    }
                })
                .collect();
            let fallback_rules = raw_cfg
                .fallback_rules
                .iter()
                .filter_map(|rule| match super::rules::FallbackRule::parse(rule) {
                    Ok(parsed) => Some(parsed),
                    Err(err) => {
                        tracing::warn!(%apn, rule, %err, "discarding malformed fallback rule");
                        None
                    }
                })
                .collect();

            per_apn.insert(
                apn,
                ApnPolicyConfig {
                    rove_in_policies: raw_cfg.rove_in_policies,
                    rove_out_policies: raw_cfg.rove_out_policies,
                    handover_rules,
                    fallback_rules,
                    hysteresis_timer_ms: raw_cfg.hysteresis_timer_ms,
                    rat_preference: raw_cfg.rat_preference,
                    supported_transports: raw_cfg.supported_transports,
                    initial_fallback: raw_cfg.initial_fallback,
                    rtt_backhaul_fallback_ms: raw_cfg.rtt_backhaul_fallback_ms,
                    iwlan_in_call_rove_out_max: raw_cfg.iwlan_in_call_rove_out_max,
                },
            );
        }

        CarrierConfig {
            carrier_id: raw.carrier_id,
            per_apn,
            thresholds: raw.thresholds,
            ims_rat_allow_list: raw.ims_rat_allow_list,
            mmtel_requires_provisioning: raw.mmtel_requires_provisioning,
            volte_roaming_supported: raw.volte_roaming_supported,
            international_roaming_apns: raw.international_roaming_apns,
            domestic_plmns: raw.domestic_plmns,
            international_plmns: raw.international_plmns,
            override_ims_wfc_in_cell_pref: raw.override_ims_wfc_in_cell_pref,
            in_call_ho_decision_wlan_to_wwan_without_vops_condition: raw.in_call_ho_decision_wlan_to_wwan_without_vops_condition,
            rtp_metrics: raw.rtp_metrics.unwrap_or(CarrierConfig::default().rtp_metrics),
        }
    }
}

#[cfg(test)]
mod raw_tests {
    use super::*;

    #[test]
    fn malformed_handover_rule_is_dropped_but_valid_ones_survive() {
        let mut raw = RawCarrierConfig::default();
        raw.per_apn.insert(
            ApnKind::Ims,
            RawApnPolicyConfig {
                handover_rules: vec![
                    "source=EUTRAN,target=IWLAN,type=allowed".to_string(),
                    "garbage".to_string(),
                ],
                ..Default::default()
            },
        );

        let config = CarrierConfig::from_raw(raw);
        let apn_cfg = &config.per_apn[&ApnKind::Ims];
        assert_eq!(apn_cfg.handover_rules.len(), 1);
        assert!(apn_cfg.handover_rules[0].allowed);
    }
}
