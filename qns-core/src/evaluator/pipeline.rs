//! C5's pure decision logic: the `Allowed`/`Availability` predicates and the
//! seven-step main pipeline. Kept free of channels and timers so it can be
//! exercised directly in tests against a `CachedInputs` snapshot.

use qns_events::{AccessNetworkKind, ApnKind, CallType, Coverage, Preference, TelephonyInfo, TransportKind};

use crate::model::PolicyDirection;
use crate::policy::carrier_config::RatPreference;
use crate::policy::PolicyStore;
use crate::restriction::RestrictionManager;
use crate::signal::SignalQualityMonitor;

use super::CachedInputs;

/// True iff WFC is usable right now under the platform/user/roaming/
/// airplane knobs, ignoring rat-preference and per-APN exceptions.
fn wfc_enabled(cached: &CachedInputs) -> bool {
    if cached.wfc_activation_override {
        return true;
    }
    cached.wfc_platform_enabled
        && cached.wfc_user_enabled
        && !cached.airplane_mode
        && (cached.coverage == Coverage::Home || cached.wfc_roaming_enabled)
}

/// `Allowed(transport)`: whether `transport` may carry this APN at all,
/// independent of current signal/restriction state.
pub fn allowed(store: &PolicyStore, apn: ApnKind, transport: TransportKind, cached: &CachedInputs, telephony: &TelephonyInfo) -> bool {
    match transport {
        TransportKind::Invalid => false,
        TransportKind::Cellular => !cached.sim_absent,
        TransportKind::Wifi => {
            if cached.sim_absent {
                return false;
            }

            // Allow-IMS/video-over-IWLAN-in-limited-cellular: a voice-capable
            // APN mid voice/video/emergency call with no VoPS on the
            // cellular side may use IWLAN regardless of preference.
            let limited_cellular_voice_exception = apn.is_voice_capable()
                && matches!(cached.call_type, CallType::Voice | CallType::Video | CallType::Emergency)
                && !telephony.vops_supported.unwrap_or(true);
            if limited_cellular_voice_exception {
                return true;
            }

            if cached.international_roaming_without_wwan && !apn.is_voice_capable() {
                return false;
            }

            if !wfc_enabled(cached) {
                return false;
            }

            match store.rat_preference(apn) {
                RatPreference::WifiOnly => true,
                RatPreference::WifiWhenWfcAvailable => true,
                RatPreference::WifiWhenNoCellular => !cached.cellular_available,
                RatPreference::WifiWhenHomeIsNotAvailable => cached.coverage == Coverage::Roam,
                RatPreference::Default => true,
            }
        }
    }
}

/// `Availability(transport, other_allowed)`.
pub fn availability(restrictions: &RestrictionManager, cached: &CachedInputs, transport: TransportKind, other_allowed: bool) -> bool {
    let available = match transport {
        TransportKind::Cellular => cached.cellular_available,
        TransportKind::Wifi => cached.iwlan_available,
        TransportKind::Invalid => false,
    };
    if !available {
        return false;
    }

    let not_restricted = !restrictions.is_restricted(transport);
    let single_transport_ok = !other_allowed && restrictions.is_allowed_on_single_transport(transport);
    if !(not_restricted || single_transport_ok) {
        return false;
    }

    if transport == TransportKind::Wifi && cached.cross_wfc && cached.cellular_available {
        return false;
    }

    true
}

fn preferred_access_network(cached: &CachedInputs) -> AccessNetworkKind {
    match cached.preference {
        Preference::CellPref => cached.cellular_access_network,
        Preference::WifiPref | Preference::WifiOnly => AccessNetworkKind::Iwlan,
    }
}

/// The access networks one satisfied `Policy` contributes: `IWLAN` for a
/// WLAN target, or the live cellular access network for a WWAN target
/// (`UNKNOWN` when cellular is not currently available — callers filter it).
fn policy_candidate(target: TransportKind, cached: &CachedInputs) -> AccessNetworkKind {
    match target {
        TransportKind::Wifi => AccessNetworkKind::Iwlan,
        TransportKind::Cellular => cached.cellular_access_network,
        TransportKind::Invalid => AccessNetworkKind::Unknown,
    }
}

/// Policies whose every condition group is satisfied by current
/// measurements, for the given direction.
pub(crate) fn satisfied_policies(
    store: &PolicyStore,
    signal: &SignalQualityMonitor,
    apn: ApnKind,
    cached: &CachedInputs,
    direction: PolicyDirection,
) -> Vec<crate::model::Policy> {
    let pre_condition = crate::model::PreCondition {
        call_type: cached.call_type,
        preference: cached.preference,
        coverage: cached.coverage,
        guarding: cached.guarding,
    };
    store
        .policies_for(apn, pre_condition, direction)
        .into_iter()
        .filter(|policy| {
            policy
                .condition_groups
                .iter()
                .any(|group| signal.find_unmatched(&expand_group(store, group, cached)).is_empty())
        })
        .collect()
}

/// Turns a condition group into the live thresholds backing it, via each
/// `Condition`'s resolution against `store`'s threshold table (§4.1: "each
/// resolves to one or more Threshold objects"). `wait_time_ms`/`group_id`
/// are irrelevant to a satisfaction check (only `SignalQualityMonitor`'s
/// debounced registration cares about them), so both are `0`/`-1` here.
fn expand_group(store: &PolicyStore, group: &[crate::signal::condition::Condition], cached: &CachedInputs) -> Vec<crate::signal::Threshold> {
    group
        .iter()
        .flat_map(|c| c.thresholds(store, cached.call_type, cached.preference, cached.cellular_access_network, 0, -1))
        .collect()
}

pub struct EvaluationOutcome {
    pub publish: Option<Vec<AccessNetworkKind>>,
}

fn no_publish() -> EvaluationOutcome {
    EvaluationOutcome { publish: None }
}

fn publish(list: Vec<AccessNetworkKind>) -> EvaluationOutcome {
    EvaluationOutcome { publish: Some(list) }
}

/// The seven-step main pipeline. `data_conn_active` / `data_conn_transport`
/// reflect `DataConnectionTracker`'s current state.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    store: &PolicyStore,
    signal: &SignalQualityMonitor,
    restrictions: &RestrictionManager,
    apn: ApnKind,
    cached: &CachedInputs,
    telephony: &TelephonyInfo,
    data_conn_active: bool,
    data_conn_transport: TransportKind,
) -> EvaluationOutcome {
    // Step 1.
    if !cached.initialized || (apn == ApnKind::Emergency && !data_conn_active) {
        return no_publish();
    }

    let allowed_iwlan = allowed(store, apn, TransportKind::Wifi, cached, telephony);
    let allowed_cellular = allowed(store, apn, TransportKind::Cellular, cached, telephony);
    let avail_iwlan = availability(restrictions, cached, TransportKind::Wifi, allowed_cellular);
    let avail_cellular = availability(restrictions, cached, TransportKind::Cellular, allowed_iwlan);

    // Step 2: handover-policy check, only when there is an active connection
    // on the transport that matches the last publish and the other
    // transport has just become available.
    if data_conn_active {
        let other = data_conn_transport.other();
        let other_now_available = match other {
            TransportKind::Wifi => avail_iwlan,
            TransportKind::Cellular => avail_cellular,
            TransportKind::Invalid => false,
        };
        let last_matches_current = cached
            .last_published
            .as_ref()
            .is_some_and(|nets| nets.first().is_some_and(|net| TransportKind::from(*net) == data_conn_transport));

        if last_matches_current && other_now_available {
            let src = if data_conn_transport == TransportKind::Wifi {
                AccessNetworkKind::Iwlan
            } else {
                cached.cellular_access_network
            };
            let dst = if other == TransportKind::Wifi { AccessNetworkKind::Iwlan } else { cached.cellular_access_network };

            let ims_idle_override = apn == ApnKind::Ims && cached.call_type == CallType::Idle;
            let no_cellular_override =
                store.rat_preference(apn) == RatPreference::WifiWhenNoCellular && cached.cellular_available;
            // MMS/XCAP/CBS with a different APN already on IWLAN: the data
            // path is shared, so there's no handover of voice state to
            // protect and the rule-based check is skipped outright.
            let other_apn_on_iwlan_override = !apn.is_voice_capable() && other == TransportKind::Wifi && cached.other_apn_active_on_iwlan;

            // VoPS check (§9 open question): no gate while idle (the IMS
            // idle override above already allows it unconditionally); a
            // WLAN-last handover back to WWAN is gated on the destination's
            // VoPS support unless the carrier flag waives it; a WWAN-last
            // handover into WLAN carries no VoPS gate of its own.
            let vops_gate_ok = if cached.call_type == CallType::Idle {
                true
            } else if data_conn_transport == TransportKind::Wifi && other == TransportKind::Cellular {
                telephony.vops_supported.unwrap_or(true) || store.in_call_ho_decision_wlan_to_wwan_without_vops_condition()
            } else {
                true
            };

            let handover_allowed = ims_idle_override
                || no_cellular_override
                || other_apn_on_iwlan_override
                || (vops_gate_ok && store.handover_allowed(apn, src, dst, cached.coverage));
            if !handover_allowed {
                return no_publish();
            }
        }
    }

    match (avail_iwlan, avail_cellular) {
        (true, true) => evaluate_both_available(store, signal, apn, cached),
        (true, false) => evaluate_only_iwlan(store, signal, apn, cached),
        (false, true) => publish(vec![cached.cellular_access_network]),
        (false, false) => {
            if cached.iwlan_disabled_reason {
                publish(Vec::new())
            } else {
                no_publish()
            }
        }
    }
}

/// The override-IMS-preference second-access-network entry criterion
/// (§4.5 "If override-ims-preference is enabled..."): carrier flag on,
/// APN is IMS, preference is CELL_PREF, and the live cellular access
/// network is itself allowed for IMS. Used both to append the secondary
/// IWLAN candidate and, every evaluation, to decide whether a previously
/// appended one should be withdrawn.
fn second_access_network_applies(store: &PolicyStore, apn: ApnKind, cached: &CachedInputs) -> bool {
    store.override_ims_wfc_in_cell_pref()
        && apn == ApnKind::Ims
        && cached.preference == Preference::CellPref
        && store.is_access_network_allowed(cached.cellular_access_network, apn)
}

fn evaluate_both_available(store: &PolicyStore, signal: &SignalQualityMonitor, apn: ApnKind, cached: &CachedInputs) -> EvaluationOutcome {
    let rove_in = satisfied_policies(store, signal, apn, cached, PolicyDirection::RoveIn);
    let rove_out = satisfied_policies(store, signal, apn, cached, PolicyDirection::RoveOut);

    let mut candidates: Vec<AccessNetworkKind> = rove_in
        .iter()
        .chain(rove_out.iter())
        .map(|p| policy_candidate(p.target_transport, cached))
        .filter(|net| *net != AccessNetworkKind::Unknown)
        .collect();

    if candidates.is_empty() {
        match &cached.last_published {
            // No rove policy fired and nothing has ever been published:
            // fall back to the preference's own default network.
            None => candidates.push(preferred_access_network(cached)),
            // No rove policy fired: keep the current primary steady
            // rather than recomputing it from preference alone.
            Some(previous) => candidates.push(previous[0]),
        }
    } else if cached.last_published.is_none() {
        let preferred = preferred_access_network(cached);
        if let Some(pos) = candidates.iter().position(|n| *n == preferred) {
            candidates.swap(0, pos);
        }
    }

    // `candidates` now holds the primary network alone. The second-
    // access-network override is layered on top of it and re-checked on
    // every evaluation, independent of whether a rove policy fired: its
    // exit criterion is not symmetric with its entry criterion (§9 Open
    // Question 1), so a previously appended IWLAN has to be withdrawn
    // the moment the entry criteria stop holding even with no rove
    // candidate in play.
    candidates.truncate(1);
    if second_access_network_applies(store, apn, cached) && candidates[0] != AccessNetworkKind::Iwlan {
        candidates.push(AccessNetworkKind::Iwlan);
    }

    publish(candidates)
}

fn evaluate_only_iwlan(store: &PolicyStore, signal: &SignalQualityMonitor, apn: ApnKind, cached: &CachedInputs) -> EvaluationOutcome {
    if cached.cross_wfc {
        return publish(vec![AccessNetworkKind::Iwlan]);
    }

    let rove_out_without_cellular = satisfied_policies(store, signal, apn, cached, PolicyDirection::RoveOut)
        .into_iter()
        .find(|p| p.has_wifi_threshold_without_cellular_condition());

    match rove_out_without_cellular {
        Some(_) => publish(Vec::new()),
        None => publish(vec![AccessNetworkKind::Iwlan]),
    }
}
