//! Property-based tests for the invariants named in §8 (P1-P8). Each
//! property is checked against the pure pipeline/restriction/rule-parsing
//! surfaces directly rather than through a live `Evaluator` task, so a
//! shrunk failure points straight at the offending function.

mod support;

use std::time::Duration;

use proptest::prelude::*;

use qns_core::evaluator::pipeline;
use qns_core::evaluator::CachedInputs;
use qns_core::policy::carrier_config::CarrierConfig;
use qns_core::policy::rules::{FallbackRule, HandoverRule};
use qns_core::policy::PolicyStore;
use qns_core::restriction::RestrictionManager;
use qns_core::signal::SignalQualityMonitor;
use qns_events::{
    AccessNetworkKind, ApnKind, CallType, Coverage, DataRegState, Preference, RestrictType, RoamingType, TelephonyInfo, TransportKind,
};

fn access_network() -> impl Strategy<Value = AccessNetworkKind> {
    prop_oneof![
        Just(AccessNetworkKind::Geran),
        Just(AccessNetworkKind::Utran),
        Just(AccessNetworkKind::Eutran),
        Just(AccessNetworkKind::Ngran),
        Just(AccessNetworkKind::Iwlan),
    ]
}

/// Includes `Unknown`, unlike [`access_network`] — used wherever a test
/// wants to exercise the "telephony info hasn't arrived yet" case that
/// P1 actually guards against.
fn access_network_maybe_unknown() -> impl Strategy<Value = AccessNetworkKind> {
    prop_oneof![access_network(), Just(AccessNetworkKind::Unknown)]
}

fn preference() -> impl Strategy<Value = Preference> {
    prop_oneof![Just(Preference::WifiOnly), Just(Preference::WifiPref), Just(Preference::CellPref)]
}

fn call_type() -> impl Strategy<Value = CallType> {
    prop_oneof![Just(CallType::Idle), Just(CallType::Voice), Just(CallType::Video), Just(CallType::Emergency)]
}

fn apn_kind() -> impl Strategy<Value = ApnKind> {
    prop_oneof![
        Just(ApnKind::Ims),
        Just(ApnKind::Emergency),
        Just(ApnKind::Mms),
        Just(ApnKind::Xcap),
        Just(ApnKind::Cbs),
    ]
}

fn telephony(vops: Option<bool>) -> TelephonyInfo {
    TelephonyInfo {
        voice_rat: AccessNetworkKind::Eutran,
        data_rat: AccessNetworkKind::Eutran,
        data_reg_state: DataRegState::InService,
        coverage: Coverage::Home,
        roaming_type: RoamingType::Domestic,
        registered_plmn: None,
        cellular_available: true,
        vops_supported: vops,
        vops_emergency_supported: None,
        voice_barred: None,
        emergency_barred: None,
    }
}

fn arbitrary_cached(
    apn: ApnKind,
    preference: Preference,
    call_type: CallType,
    cellular_net: AccessNetworkKind,
    iwlan_available: bool,
    cellular_available: bool,
) -> CachedInputs {
    // The telephony source never reports `cellular_available` while the
    // access network itself is `Unknown` — that coupling is what keeps
    // the "only cellular available" publish branch from ever leaking
    // `Unknown` (P1), so arbitrary generation respects it too.
    let cellular_available = cellular_available && cellular_net != AccessNetworkKind::Unknown;
    CachedInputs {
        initialized: true,
        preference,
        call_type,
        cellular_access_network: cellular_net,
        iwlan_available,
        cellular_available,
        wfc_platform_enabled: true,
        wfc_user_enabled: true,
        wfc_roaming_enabled: true,
        ..Default::default()
    }
}

proptest! {
    /// P1: no UNKNOWN leak — the published list never contains `Unknown`,
    /// regardless of which APN, preference, call type, or availability
    /// combination drives the pipeline.
    #[test]
    fn p1_no_unknown_leak(
        apn in apn_kind(),
        preference in preference(),
        call_type in call_type(),
        cellular_net in access_network_maybe_unknown(),
        iwlan_available in any::<bool>(),
        cellular_available in any::<bool>(),
    ) {
        let store = PolicyStore::new(CarrierConfig::default());
        let signal = SignalQualityMonitor::new();
        let restrictions = RestrictionManager::new();
        let cached = arbitrary_cached(apn, preference, call_type, cellular_net, iwlan_available, cellular_available);

        let outcome = pipeline::evaluate(&store, &signal, &restrictions, apn, &cached, &telephony(Some(true)), false, TransportKind::Invalid);

        if let Some(list) = outcome.publish {
            prop_assert!(!list.contains(&AccessNetworkKind::Unknown));
        }
    }

    /// P5: idempotent re-evaluation — feeding the first evaluation's own
    /// published list back as `last_published` and re-evaluating with
    /// identical inputs never proposes a *different* list (the Evaluator's
    /// `publish_now` dedupe then emits nothing downstream).
    #[test]
    fn p5_idempotent_reevaluation(
        apn in apn_kind(),
        preference in preference(),
        call_type in call_type(),
        cellular_net in access_network(),
    ) {
        let store = PolicyStore::new(CarrierConfig::default());
        let signal = SignalQualityMonitor::new();
        let restrictions = RestrictionManager::new();
        let mut cached = arbitrary_cached(apn, preference, call_type, cellular_net, true, true);

        let first = pipeline::evaluate(&store, &signal, &restrictions, apn, &cached, &telephony(Some(true)), false, TransportKind::Invalid);
        let Some(published) = first.publish else { return Ok(()); };
        cached.last_published = Some(published.clone());

        let second = pipeline::evaluate(&store, &signal, &restrictions, apn, &cached, &telephony(Some(true)), false, TransportKind::Invalid);
        if let Some(again) = second.publish {
            prop_assert_eq!(again, published);
        }
    }

    /// P6: monotone allow-list — adding a restriction to a transport can
    /// only take it from available to unavailable, never the reverse, for
    /// any restriction type and any prior restricted/unrestricted state.
    #[test]
    fn p6_monotone_allow_list(
        transport in prop_oneof![Just(TransportKind::Cellular), Just(TransportKind::Wifi)],
        restrict_type in prop_oneof![
            Just(RestrictType::Guarding),
            Just(RestrictType::Throttling),
            Just(RestrictType::HoNotAllowed),
            Just(RestrictType::NonPreferredTransport),
            Just(RestrictType::RtpLowQuality),
        ],
    ) {
        let restrictions = RestrictionManager::new();
        let cached = CachedInputs { initialized: true, iwlan_available: true, cellular_available: true, ..Default::default() };

        let before = pipeline::availability(&restrictions, &cached, transport, true);
        restrictions.add(transport, restrict_type, [], None);
        let after = pipeline::availability(&restrictions, &cached, transport, true);

        prop_assert!(!after || before, "adding a restriction must never increase availability");
    }

    /// P8: config roundtrip — parsing then rendering a syntactically valid
    /// handover rule yields a rule that parses back to the same value.
    #[test]
    fn p8_handover_rule_roundtrip(
        source in access_network(),
        target_extra in access_network(),
        allowed in any::<bool>(),
        roaming in proptest::option::of(any::<bool>()),
    ) {
        // At least one side must be IWLAN per the grammar (§6); alternate
        // which side carries it based on the sampled `source`.
        let (source, target) = if source == AccessNetworkKind::Iwlan {
            (source, target_extra)
        } else {
            (source, AccessNetworkKind::Iwlan)
        };
        let mut raw = format!("source={source},target={target},type={}", if allowed { "allowed" } else { "disallowed" });
        if let Some(roaming) = roaming {
            raw.push_str(&format!(",roaming={roaming}"));
        }

        let rule = HandoverRule::parse(&raw).expect("well-formed rule must parse");
        let rendered = rule.to_string();
        let reparsed = HandoverRule::parse(&rendered).expect("rendered rule must re-parse");
        prop_assert_eq!(rule, reparsed);
    }

    /// P8 (malformed side): a handover rule naming no IWLAN side on either
    /// end is always rejected, for any pair of non-IWLAN access networks.
    #[test]
    fn p8_handover_rule_without_iwlan_side_rejected(
        source in prop_oneof![Just(AccessNetworkKind::Geran), Just(AccessNetworkKind::Utran), Just(AccessNetworkKind::Eutran), Just(AccessNetworkKind::Ngran)],
        target in prop_oneof![Just(AccessNetworkKind::Geran), Just(AccessNetworkKind::Utran), Just(AccessNetworkKind::Eutran), Just(AccessNetworkKind::Ngran)],
    ) {
        let raw = format!("source={source},target={target},type=allowed");
        prop_assert!(HandoverRule::parse(&raw).is_err());
    }

    /// P8 (trailing garbage rejected): a source/target token with extra
    /// bytes after a valid access-network name must fail the whole rule,
    /// not silently parse the valid prefix and drop the rest.
    #[test]
    fn p8_handover_rule_trailing_garbage_rejected(
        net in access_network(),
        garbage in "[A-Z]{1,6}",
    ) {
        let raw = format!("source={net}{garbage},target=IWLAN,type=allowed");
        prop_assert!(HandoverRule::parse(&raw).is_err());
    }

    /// P8 (fallback roundtrip): same property for the fallback rule grammar.
    #[test]
    fn p8_fallback_rule_roundtrip(
        cause in 0i32..2000,
        time_ms in 0u64..600_000,
        preference in proptest::option::of(prop_oneof![Just(Preference::CellPref), Just(Preference::WifiPref)]),
    ) {
        let mut raw = format!("cause={cause},time={time_ms}");
        if let Some(preference) = preference {
            raw.push_str(if preference == Preference::CellPref { ",preference=cell" } else { ",preference=wifi" });
        }

        let rule = FallbackRule::parse(&raw).expect("well-formed rule must parse");
        let rendered = rule.to_string();
        let reparsed = FallbackRule::parse(&rendered).expect("rendered rule must re-parse");
        prop_assert_eq!(rule, reparsed);
    }
}

/// P2: empty list is the cellular default — `QualifiedNetworksChanged`
/// always carries `primary_is_empty_means_cellular_default = true`, whether
/// the Evaluator is publishing an empty list (SIM absent) or a normal one,
/// so a consumer never needs to special-case which it got.
#[tokio::test]
async fn p2_empty_publish_carries_the_same_cellular_default_flag() {
    use qns_events::InboundEvent;
    use support::capturing_sink;

    let store = PolicyStore::new(CarrierConfig::default());
    let signal = SignalQualityMonitor::new();
    let (sink, rx) = capturing_sink();
    let (handle, join) = qns_core::Evaluator::spawn(0, ApnKind::Ims, store, signal, sink);

    handle.send(InboundEvent::SimAbsent);
    let empty = support::next_publish(&rx).await;
    assert!(empty.access_networks.is_empty());
    assert!(empty.primary_is_empty_means_cellular_default);

    handle.send(InboundEvent::SimLoaded);
    handle.send(InboundEvent::TelephonyInfoChanged(telephony(Some(true))));
    let non_empty = support::next_publish(&rx).await;
    assert!(!non_empty.access_networks.is_empty());
    assert!(non_empty.primary_is_empty_means_cellular_default);

    join.abort();
}

/// P3: single GUARDING — driving the guarding-arm policy (release-other-
/// then-arm, as `Evaluator::arm_guarding_on_connect` does) for any sequence
/// of transport connects never leaves both transports holding `GUARDING`
/// at once.
#[tokio::test]
async fn p3_single_guarding_across_arbitrary_connect_sequence() {
    let restrictions = RestrictionManager::new();
    let sequence = [
        TransportKind::Wifi,
        TransportKind::Cellular,
        TransportKind::Wifi,
        TransportKind::Wifi,
        TransportKind::Cellular,
    ];

    for transport in sequence {
        // Mirrors `arm_guarding_on_connect`: release guarding on the side
        // that just connected, arm it on the other side.
        restrictions.release(transport, RestrictType::Guarding, true);
        let other = transport.other();
        if other != TransportKind::Invalid {
            restrictions.add(other, RestrictType::Guarding, [], Some(Duration::from_secs(10)));
        }

        let both_guarded =
            restrictions.has(TransportKind::Wifi, RestrictType::Guarding) && restrictions.has(TransportKind::Cellular, RestrictType::Guarding);
        assert!(!both_guarded, "at most one transport may hold GUARDING at a time");
    }
}

/// P4: restriction timer release — a restriction armed with duration `d`
/// and never matched by a release event is released by the timer at
/// exactly `d`, for several different magnitudes of `d`.
#[tokio::test(start_paused = true)]
async fn p4_restriction_releases_at_its_deadline() {
    for millis in [1u64, 50, 500, 5_000, 60_000] {
        let restrictions = RestrictionManager::new();
        restrictions.add(TransportKind::Wifi, RestrictType::Guarding, [], Some(Duration::from_millis(millis)));
        assert!(restrictions.has(TransportKind::Wifi, RestrictType::Guarding));

        tokio::time::sleep(Duration::from_millis(millis) + Duration::from_millis(1)).await;

        assert!(!restrictions.has(TransportKind::Wifi, RestrictType::Guarding), "restriction should have released by {millis}ms");
    }
}

/// P7: policy match determinism — for a fixed `(pre_condition, measurements)`
/// pair, reporting the same measurements in a different order produces the
/// identical satisfied-threshold set (order-independence of the signal
/// cache, which is all `satisfied_policies` reads from).
#[test]
fn p7_policy_match_determinism_is_order_independent() {
    use qns_core::signal::condition::Condition;

    let measurements = [
        (AccessNetworkKind::Eutran, qns_events::MeasurementType::Rsrp, -95.0),
        (AccessNetworkKind::Iwlan, qns_events::MeasurementType::Rssi, -70.0),
    ];

    let forward = SignalQualityMonitor::new();
    for (net, kind, value) in measurements {
        forward.report_measurement(net, kind, value);
    }

    let backward = SignalQualityMonitor::new();
    for (net, kind, value) in measurements.iter().rev() {
        backward.report_measurement(*net, *kind, *value);
    }

    let store = PolicyStore::new(CarrierConfig::default());
    let group = [Condition::EutranBad, Condition::WifiGood];
    let thresholds: Vec<_> = group
        .iter()
        .flat_map(|c| c.thresholds(&store, CallType::Idle, Preference::WifiPref, AccessNetworkKind::Eutran, 0, -1))
        .collect();

    assert_eq!(forward.find_unmatched(&thresholds), backward.find_unmatched(&thresholds));
}
