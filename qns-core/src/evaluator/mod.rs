//! C5: Evaluator, the orchestrator. One task per `(slot, apn)`, owning a
//! single `flume` inbox per §5; every inbound event dispatches to a mutation
//! of [`CachedInputs`] (and, where the dispatch table in §4.5 says so, the
//! restriction policies enumerated in §4.4) followed by a re-evaluation of
//! the pure pipeline in [`pipeline`].

pub mod dump;
pub mod pipeline;

use std::sync::Arc;
use std::time::{Duration, Instant};

use qns_events::{
    AccessNetworkKind, ApnKind, CallState, CallType, Coverage, DataConnectionChange, DataConnectionEvent,
    DataConnectionState, Guarding, ImsRegistrationChange, ImsRegistrationEvent, InboundEvent, Preference,
    ProvisioningOverrides, QualifiedNetworksChanged, ReleaseEvent, RestrictType, RoamingType, SrvccState,
    TelephonyInfo, TransportKind,
};

use crate::collaborators::AccessNetworkSink;
use crate::data_connection::DataConnectionTracker;
use crate::model::{PolicyDirection, IGNORABLE_RESTRICTIONS};
use crate::policy::carrier_config::SupportedTransports;
use crate::policy::PolicyStore;
use crate::restriction::RestrictionManager;
use crate::signal::SignalQualityMonitor;

/// Inputs cached by the Evaluator task between events. Owned by the task,
/// not behind a lock: nothing outside this task ever touches it (§4.5
/// grounding note).
#[derive(Debug, Clone)]
pub struct CachedInputs {
    pub initialized: bool,
    pub sim_absent: bool,
    pub iwlan_available: bool,
    pub cross_wfc: bool,
    /// True when the most recent `IwlanAvailabilityInfo` went unavailable
    /// with `notify_disabled` set — the "specific reason = IWLAN_DISABLE"
    /// the neither-available pipeline step checks.
    pub iwlan_disabled_reason: bool,
    pub cellular_available: bool,
    pub cellular_access_network: AccessNetworkKind,
    pub coverage: Coverage,
    pub international_roaming_without_wwan: bool,
    pub call_type: CallType,
    pub preference: Preference,
    pub guarding: Option<Guarding>,
    pub wfc_platform_enabled: bool,
    pub wfc_user_enabled: bool,
    pub wfc_roaming_enabled: bool,
    pub wfc_activation_override: bool,
    pub airplane_mode: bool,
    pub last_published: Option<Vec<AccessNetworkKind>>,
    /// A different APN on this slot is currently active on IWLAN — feeds
    /// the MMS/XCAP/CBS handover override in pipeline step 2.
    pub other_apn_active_on_iwlan: bool,
}

impl Default for CachedInputs {
    fn default() -> Self {
        Self {
            initialized: false,
            sim_absent: false,
            iwlan_available: false,
            cross_wfc: false,
            iwlan_disabled_reason: false,
            cellular_available: false,
            cellular_access_network: AccessNetworkKind::Unknown,
            coverage: Coverage::Home,
            international_roaming_without_wwan: false,
            call_type: CallType::Idle,
            preference: Preference::CellPref,
            guarding: None,
            wfc_platform_enabled: false,
            wfc_user_enabled: false,
            wfc_roaming_enabled: false,
            wfc_activation_override: false,
            airplane_mode: false,
            last_published: None,
            other_apn_active_on_iwlan: false,
        }
    }
}

fn default_telephony() -> TelephonyInfo {
    TelephonyInfo {
        voice_rat: AccessNetworkKind::Unknown,
        data_rat: AccessNetworkKind::Unknown,
        data_reg_state: qns_events::DataRegState::OutOfService,
        coverage: Coverage::Home,
        roaming_type: RoamingType::Domestic,
        registered_plmn: None,
        cellular_available: false,
        vops_supported: None,
        vops_emergency_supported: None,
        voice_barred: None,
        emergency_barred: None,
    }
}

/// A cloneable sender into one Evaluator's inbox. The only way anything
/// outside the Evaluator's own task touches its state.
#[derive(Clone)]
pub struct EvaluatorHandle {
    tx: flume::Sender<InboundEvent>,
    snapshot_tx: flume::Sender<tokio::sync::oneshot::Sender<dump::DiagnosticSnapshot>>,
}

impl EvaluatorHandle {
    pub fn send(&self, event: InboundEvent) {
        // An Evaluator task that has exited no longer cares; this mirrors
        // §7's "never blocks, never throws upward" for restriction arming.
        let _ = self.tx.send(event);
    }

    /// Round-trips a diagnostic read through the Evaluator's own task so the
    /// snapshot never races a concurrent event. `None` means the task has
    /// already exited.
    pub async fn snapshot(&self) -> Option<dump::DiagnosticSnapshot> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.snapshot_tx.send(reply_tx).ok()?;
        reply_rx.await.ok()
    }
}

/// C5. Lives for as long as its `(slot, apn)`: created at init, rebuilt on
/// carrier-id change, closed on SIM-absent or slot teardown (§4 "Lifecycle").
pub struct Evaluator {
    slot: u32,
    apn: ApnKind,
    store: PolicyStore,
    signal: SignalQualityMonitor,
    restrictions: RestrictionManager,
    data_conn: DataConnectionTracker,
    sink: Arc<dyn AccessNetworkSink>,
    cached: CachedInputs,
    telephony: TelephonyInfo,
    last_overrides: ProvisioningOverrides,
    call_state: CallState,
    ims_registered: bool,
    srvcc_in_progress: bool,
    iwlan_in_call_rove_out_count: u32,
    initial_fail_count: u32,
    initial_fail_window_start: Option<Instant>,
    initial_fallback_count: u32,
    rx: flume::Receiver<InboundEvent>,
    snapshot_rx: flume::Receiver<tokio::sync::oneshot::Sender<dump::DiagnosticSnapshot>>,
}

impl Evaluator {
    /// Spawns the Evaluator task and wires the two feedback channels
    /// described in §2/§4.4: `RestrictionManager`'s `restrict-info-changed`
    /// and `SignalQualityMonitor`'s threshold crossings are each forwarded
    /// back onto this Evaluator's own inbox, so the single-inbox ordering
    /// guarantee in §5 holds for every source, not just external ones.
    pub fn spawn(
        slot: u32,
        apn: ApnKind,
        store: PolicyStore,
        signal: SignalQualityMonitor,
        sink: Arc<dyn AccessNetworkSink>,
    ) -> (EvaluatorHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = flume::unbounded();
        let (snapshot_tx, snapshot_rx) = flume::unbounded();
        let restrictions = RestrictionManager::new();

        let (restrict_tx, restrict_rx) = flume::unbounded();
        restrictions.register_listener(restrict_tx);
        {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Ok(changed) = restrict_rx.recv_async().await {
                    if tx.send(InboundEvent::RestrictInfoChanged(changed.transport)).is_err() {
                        break;
                    }
                }
            });
        }

        let (crossing_tx, crossing_rx) = flume::unbounded();
        signal.register_listener(slot, apn, crossing_tx);
        {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Ok(crossing) = crossing_rx.recv_async().await {
                    if tx.send(InboundEvent::ThresholdCrossed(crossing)).is_err() {
                        break;
                    }
                }
            });
        }

        let (timer_tx, timer_rx) = flume::unbounded();
        restrictions.register_timer_listener(timer_tx);
        {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Ok(fired) = timer_rx.recv_async().await {
                    if tx.send(InboundEvent::RestrictionTimerFired(fired)).is_err() {
                        break;
                    }
                }
            });
        }

        let evaluator = Evaluator {
            slot,
            apn,
            store,
            signal,
            restrictions,
            data_conn: DataConnectionTracker::new(),
            sink,
            cached: CachedInputs::default(),
            telephony: default_telephony(),
            last_overrides: ProvisioningOverrides::default(),
            call_state: CallState::Idle,
            ims_registered: false,
            srvcc_in_progress: false,
            iwlan_in_call_rove_out_count: 0,
            initial_fail_count: 0,
            initial_fail_window_start: None,
            initial_fallback_count: 0,
            rx,
            snapshot_rx,
        };

        let handle = EvaluatorHandle { tx, snapshot_tx };
        let join = tokio::spawn(evaluator.run());
        (handle, join)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.rx.recv_async() => {
                    match event {
                        Ok(event) => self.handle_event(event).await,
                        Err(_) => break,
                    }
                }
                reply = self.snapshot_rx.recv_async() => {
                    match reply {
                        Ok(reply_tx) => {
                            let snapshot = self.diagnostic_snapshot();
                            let _ = reply_tx.send(snapshot);
                        }
                        Err(_) => break,
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: InboundEvent) {
        use InboundEvent as E;
        match event {
            E::IwlanAvailabilityChanged(info) => {
                self.cached.iwlan_available = info.available;
                self.cached.cross_wfc = info.cross_wfc;
                if !info.available {
                    self.cached.iwlan_disabled_reason = info.notify_disabled;
                }
                self.reevaluate().await;
            }
            E::TelephonyInfoChanged(info) => {
                self.cached.cellular_available = info.cellular_available;
                self.cached.cellular_access_network = info.data_rat;
                self.cached.coverage = self.store.is_international_roaming(self.apn, info.roaming_type, info.registered_plmn.as_deref());
                self.cached.international_roaming_without_wwan = info.roaming_type == RoamingType::International
                    && self.cached.coverage == Coverage::Roam
                    && self.store.supported_transports(self.apn) == SupportedTransports::Wlan;
                self.telephony = info;
                self.reevaluate().await;
            }
            E::RestrictInfoChanged(_transport) => {
                self.reevaluate().await;
            }
            E::CallTypeChanged(call_type) => {
                let was_idle = self.cached.call_type == CallType::Idle;
                self.cached.call_type = call_type;
                if call_type == CallType::Idle && !was_idle {
                    self.on_call_ended();
                }
                self.reevaluate().await;
            }
            E::DataConnectionChanged(change) => {
                self.handle_data_connection_change(change).await;
            }
            E::EmergencyPreferredTransportChanged(transport) => {
                if self.apn == ApnKind::Emergency && self.data_conn.state() == DataConnectionState::Inactive {
                    let net = match transport {
                        TransportKind::Wifi => AccessNetworkKind::Iwlan,
                        TransportKind::Cellular => self.cached.cellular_access_network,
                        TransportKind::Invalid => AccessNetworkKind::Unknown,
                    };
                    self.publish_now(vec![net]).await;
                }
            }
            E::ProvisioningInfoChanged(overrides) => {
                let material = self.last_overrides.threshold_keys_differ(&overrides);
                self.last_overrides = overrides.clone();
                self.store.set_provisioning_overrides(overrides);
                self.reevaluate_with(material).await;
            }
            E::ImsRegistrationChanged(change) => {
                self.handle_ims_registration_change(change);
                self.reevaluate().await;
            }
            E::ThresholdCrossed(_crossing) => {
                self.reevaluate().await;
            }
            E::WfcUserEnabledChanged(enabled) => {
                self.cached.wfc_user_enabled = enabled;
                self.reevaluate().await;
            }
            E::WfcRoamingEnabledChanged(enabled) => {
                self.cached.wfc_roaming_enabled = enabled;
                self.reevaluate().await;
            }
            E::WfcModeChanged(preference) => {
                self.cached.preference = preference;
                self.reevaluate().await;
            }
            E::PlatformWfcEnabledChanged(enabled) => {
                self.cached.wfc_platform_enabled = enabled;
                if !enabled {
                    let net = self.cached.cellular_access_network;
                    self.publish_now(vec![net]).await;
                } else {
                    self.reevaluate().await;
                }
            }
            E::AirplaneModeChanged(on) => {
                self.cached.airplane_mode = on;
                self.reevaluate().await;
            }
            E::SimAbsent => {
                tracing::info!(apn = ?self.apn, slot = self.slot, "SIM absent, publishing empty qualified list");
                self.cached.sim_absent = true;
                self.publish_now(Vec::new()).await;
            }
            E::SimLoaded => {
                tracing::info!(apn = ?self.apn, slot = self.slot, "SIM loaded, evaluator initialized");
                self.cached.sim_absent = false;
                self.cached.initialized = true;
                self.arm_non_preferred_transport_at_power_on();
                self.reevaluate().await;
            }
            E::WfcActivationChanged(on) => {
                self.cached.wfc_activation_override = on;
                self.reevaluate().await;
            }
            E::SrvccStateChanged(state) => {
                self.handle_srvcc_state(state);
                self.reevaluate().await;
            }
            E::CallStateChanged(state) => {
                self.call_state = state;
                if state == CallState::Idle {
                    self.on_call_ended();
                }
                self.reevaluate().await;
            }
            E::RtpLowQualityReported => {
                self.handle_rtp_low_quality();
                self.reevaluate().await;
            }
            E::RttBackhaulCheckFailed => {
                self.handle_rtt_backhaul_failed();
                self.reevaluate().await;
            }
            E::ModemThrottlingChanged { transport, on, deadline_ms } => {
                let active = self.data_conn.last_transport() == transport;
                self.restrictions.notify_throttling(transport, on, deadline_ms, active);
                self.reevaluate().await;
            }
            E::OtherApnOnIwlanChanged(active) => {
                self.cached.other_apn_active_on_iwlan = active;
                self.reevaluate().await;
            }
            E::RestrictionTimerFired(fired) => {
                self.restrictions.apply_timer_fired(fired);
                self.reevaluate().await;
            }
        }
    }

    async fn handle_data_connection_change(&mut self, change: DataConnectionChange) {
        // `apply` resets the tracker's own transport to `Invalid` on a
        // Disconnected/Failed transition (nothing is carried any more), so
        // `actual.transport` can't tell us which side just dropped. The
        // incoming transport is the one the event was reported against —
        // use that for the two terminal events instead.
        let reported_transport = change.transport;
        let Some(actual) = self.data_conn.apply(change.event, change.transport) else {
            return;
        };

        match actual.event {
            DataConnectionEvent::Disconnected => {
                self.restrictions.process_release_event(reported_transport, ReleaseEvent::Disconnect);
                self.restrictions.on_disconnected(reported_transport);
            }
            DataConnectionEvent::Connected | DataConnectionEvent::HandoverSuccess | DataConnectionEvent::Suspended => {
                self.arm_guarding_on_connect(actual.transport);
                self.initial_fail_count = 0;
                self.initial_fail_window_start = None;
            }
            DataConnectionEvent::Failed => {
                self.handle_initial_pdn_fail(reported_transport);
            }
            _ => {}
        }

        self.reevaluate().await;

        // "schedule a follow-up re-eval if the other transport is not
        // restricted" — the handover-policy check in the pipeline only
        // fires once a connected transport is observed with its sibling
        // newly available; re-running here lets that branch fire in the
        // same tick rather than waiting for an unrelated event.
        if actual.state == DataConnectionState::Connected && !self.restrictions.is_restricted(actual.transport.other()) {
            self.reevaluate().await;
        }
    }

    /// Policy 1 (§4.4): on CONNECTED or successful handover to `transport`,
    /// arm `GUARDING` on the other transport for the configured hysteresis;
    /// zero releases instead of arming. The single-GUARDING invariant (§3.4)
    /// is kept by always releasing the just-connected side's own guarding
    /// first.
    fn arm_guarding_on_connect(&self, transport: TransportKind) {
        self.restrictions.release(transport, RestrictType::Guarding, true);

        let other = transport.other();
        if other == TransportKind::Invalid {
            return;
        }
        let ms = self.store.hysteresis_timer(self.apn, other == TransportKind::Wifi, self.cached.call_type);
        if ms == 0 {
            self.restrictions.release(other, RestrictType::Guarding, false);
        } else {
            self.restrictions.add(other, RestrictType::Guarding, [], Some(Duration::from_millis(ms as u64)));
        }
    }

    /// Policy 2 (§4.4): at power-on, for IMS while not in airplane mode, arm
    /// `NON_PREFERRED_TRANSPORT` on the transport opposite the current WFC
    /// preference. The spec names no dedicated wait-time accessor for this
    /// restriction, so it reuses `hysteresis_timer` the same way the guarding
    /// policy does (documented in DESIGN.md).
    fn arm_non_preferred_transport_at_power_on(&self) {
        if self.apn != ApnKind::Ims || self.cached.airplane_mode {
            return;
        }
        let preferred_transport = match self.cached.preference {
            Preference::WifiOnly | Preference::WifiPref => TransportKind::Wifi,
            Preference::CellPref => TransportKind::Cellular,
        };
        let opposite = preferred_transport.other();
        let wait_ms = self.store.hysteresis_timer(self.apn, opposite == TransportKind::Wifi, self.cached.call_type);
        if wait_ms > 0 {
            self.restrictions.add(
                opposite,
                RestrictType::NonPreferredTransport,
                [ReleaseEvent::Disconnect],
                Some(Duration::from_millis(wait_ms as u64)),
            );
        }
    }

    /// Policy 8 (§4.4): initial-PDN-fail fallback.
    fn handle_initial_pdn_fail(&mut self, transport: TransportKind) {
        let Some(cfg) = self.store.initial_connection_fallback(self.apn) else {
            return;
        };
        if !cfg.enabled || self.initial_fallback_count >= cfg.max_fallback_count {
            return;
        }

        let within_window = self
            .initial_fail_window_start
            .is_some_and(|start| start.elapsed() <= Duration::from_millis(cfg.retry_timer_ms as u64));
        self.initial_fail_count = if within_window { self.initial_fail_count + 1 } else { 1 };
        self.initial_fail_window_start = Some(Instant::now());

        if self.initial_fail_count >= cfg.retry_count {
            self.restrictions.add(
                transport,
                RestrictType::FallbackOnDataConnectionFail,
                [ReleaseEvent::Disconnect, ReleaseEvent::WfcPreferModeChanged],
                Some(Duration::from_millis(cfg.fallback_guard_ms as u64)),
            );
            self.initial_fallback_count += 1;
            self.initial_fail_count = 0;
            self.initial_fail_window_start = None;
        }
    }

    /// Policy 7 (§4.4): IMS fallback to WWAN on unregistration / HO-register
    /// failure on WLAN. Invariant §3.6: releases the ignorable set on WWAN
    /// before arming itself on WLAN.
    fn handle_ims_registration_change(&mut self, change: ImsRegistrationChange) {
        if change.event == ImsRegistrationEvent::Registered {
            if change.transport == TransportKind::Wifi {
                self.ims_registered = true;
            }
            return;
        }
        if change.transport == TransportKind::Wifi {
            self.ims_registered = false;
        }
        if self.apn != ApnKind::Ims || change.transport != TransportKind::Wifi {
            return;
        }

        let duration_ms = match change.event {
            ImsRegistrationEvent::Unregistered => {
                self.store.fallback_time_ims_unregistered(self.apn, change.reason_code, self.cached.preference)
            }
            ImsRegistrationEvent::AccessNetworkChangeFailed => {
                self.store.fallback_time_ims_ho_register_failed(self.apn, change.reason_code, self.cached.preference)
            }
            ImsRegistrationEvent::Registered => unreachable!(),
        };
        if duration_ms == 0 {
            return;
        }
        if !self.store.is_access_network_allowed(self.cached.cellular_access_network, self.apn) {
            return;
        }

        for restrict_type in IGNORABLE_RESTRICTIONS {
            self.restrictions.release(TransportKind::Cellular, *restrict_type, true);
        }
        self.restrictions.add(
            TransportKind::Wifi,
            RestrictType::FallbackToWwanImsRegiFail,
            [ReleaseEvent::Disconnect, ReleaseEvent::WfcPreferModeChanged],
            Some(Duration::from_millis(duration_ms as u64)),
        );
    }

    /// Policy 4 + 5 (§4.4): low-RTP-quality report during a voice/emergency
    /// IMS call arms `RTP_LOW_QUALITY` on the current transport and, when the
    /// fallback reason maps to this class and the call is on WLAN, bumps the
    /// IWLAN-in-call rove-out counter, capping it with
    /// `RESTRICT_IWLAN_IN_CALL` once the configured maximum is reached.
    fn handle_rtp_low_quality(&mut self) {
        if !self.apn.is_voice_capable() || !matches!(self.cached.call_type, CallType::Voice | CallType::Video | CallType::Emergency) {
            return;
        }
        let transport = self.data_conn.last_transport();
        if transport == TransportKind::Invalid {
            return;
        }

        let cfg = self.store.rtp_metrics_config();
        self.restrictions.add(
            transport,
            RestrictType::RtpLowQuality,
            [ReleaseEvent::CallEnd],
            Some(Duration::from_millis(cfg.loss_time_ms as u64)),
        );

        if transport == TransportKind::Wifi {
            self.iwlan_in_call_rove_out_count += 1;
            if self.iwlan_in_call_rove_out_count >= self.store.iwlan_in_call_rove_out_max(self.apn) {
                self.restrictions.add(TransportKind::Wifi, RestrictType::RestrictIwlanInCall, [ReleaseEvent::CallEnd], None);
            }
        }
    }

    /// Policy 9 (§4.4): a failed RTT backhaul check on WLAN while IMS is
    /// registered arms `FALLBACK_TO_WWAN_RTT_BACKHAUL_FAIL`. Open Question 2
    /// (§9): the release-event set deliberately omits
    /// `WFC_PREFER_MODE_CHANGED`, unlike `FALLBACK_ON_DATA_CONNECTION_FAIL`.
    fn handle_rtt_backhaul_failed(&mut self) {
        if self.apn != ApnKind::Ims || !self.ims_registered {
            return;
        }
        let ms = self.store.rtt_backhaul_fallback_time(self.apn);
        if ms == 0 {
            return;
        }
        self.restrictions.add(
            TransportKind::Wifi,
            RestrictType::FallbackToWwanRttBackhaulFail,
            [ReleaseEvent::Disconnect, ReleaseEvent::CallEnd],
            Some(Duration::from_millis(ms as u64)),
        );
    }

    /// Policy 6 (§4.4): SRVCC over cellular blocks WLAN for the IMS call's
    /// duration.
    fn handle_srvcc_state(&mut self, state: SrvccState) {
        match state {
            SrvccState::Started => {
                if self.apn == ApnKind::Ims && self.call_state == CallState::Active {
                    self.srvcc_in_progress = true;
                    self.restrictions.add(TransportKind::Wifi, RestrictType::RestrictIwlanCsCall, [ReleaseEvent::CallEnd], None);
                }
            }
            SrvccState::Cancelled | SrvccState::Failed => {
                self.srvcc_in_progress = false;
                self.restrictions.release(TransportKind::Wifi, RestrictType::RestrictIwlanCsCall, false);
            }
            SrvccState::Completed => {
                self.srvcc_in_progress = false;
            }
        }
    }

    fn on_call_ended(&mut self) {
        self.restrictions.process_release_event(TransportKind::Wifi, ReleaseEvent::CallEnd);
        self.restrictions.process_release_event(TransportKind::Cellular, ReleaseEvent::CallEnd);
        self.iwlan_in_call_rove_out_count = 0;
        self.srvcc_in_progress = false;
    }

    /// `Some(Guarding::Wifi)` / `Some(Guarding::Cellular)` while that
    /// transport holds a `GUARDING` restriction; `None` when neither does,
    /// so `PreCondition::matches` treats a guarding-less policy as
    /// unconditionally applicable (§3.4's single-GUARDING invariant means
    /// these two branches are mutually exclusive in practice).
    fn current_guarding(&self) -> Option<Guarding> {
        if self.restrictions.has(TransportKind::Wifi, RestrictType::Guarding) {
            Some(Guarding::Wifi)
        } else if self.restrictions.has(TransportKind::Cellular, RestrictType::Guarding) {
            Some(Guarding::Cellular)
        } else {
            None
        }
    }

    /// Registration optimisation (§4.1): collects every `Condition` named
    /// by a rove-in/rove-out policy applicable to the live `PreCondition`,
    /// resolves each to its backing `Threshold`, reduces the redundant
    /// ones, and replaces this `(slot, apn)`'s registered set in one call.
    /// An empty resolved set unregisters entirely (`update_thresholds`'s
    /// contract).
    fn register_active_thresholds(&self) {
        let pre_condition = crate::model::PreCondition {
            call_type: self.cached.call_type,
            preference: self.cached.preference,
            coverage: self.cached.coverage,
            guarding: self.cached.guarding,
        };

        let mut group_id = 0i32;
        let mut candidates = Vec::new();
        for direction in [PolicyDirection::RoveIn, PolicyDirection::RoveOut] {
            for policy in self.store.policies_for(self.apn, pre_condition, direction) {
                for group in &policy.condition_groups {
                    for condition in group {
                        candidates.extend(condition.thresholds(
                            &self.store,
                            self.cached.call_type,
                            self.cached.preference,
                            self.cached.cellular_access_network,
                            0,
                            group_id,
                        ));
                    }
                    group_id += 1;
                }
            }
        }

        let reduced = crate::signal::reduce_thresholds(&candidates);
        self.signal.update_thresholds(self.slot, self.apn, reduced);
    }

    async fn reevaluate(&mut self) {
        self.reevaluate_with(true).await;
    }

    /// Core of [`Self::reevaluate`]. `rebuild_thresholds` is only ever
    /// `false` from the `ProvisioningInfoChanged` handler, per §4.5's
    /// dispatch table entry ("diff keys...; rebuild policy if threshold
    /// changed") — a non-material override change still re-runs the
    /// pipeline and may republish, it just skips re-registering the active
    /// threshold set with the signal monitor.
    async fn reevaluate_with(&mut self, rebuild_thresholds: bool) {
        self.cached.guarding = self.current_guarding();
        if rebuild_thresholds {
            self.register_active_thresholds();
        }
        let data_conn_active = matches!(self.data_conn.state(), DataConnectionState::Connected | DataConnectionState::Handover);
        let outcome = pipeline::evaluate(
            &self.store,
            &self.signal,
            &self.restrictions,
            self.apn,
            &self.cached,
            &self.telephony,
            data_conn_active,
            self.data_conn.last_transport(),
        );
        if let Some(list) = outcome.publish {
            self.publish_now(list).await;
        }
    }

    async fn publish_now(&mut self, list: Vec<AccessNetworkKind>) {
        if self.cached.last_published.as_ref() == Some(&list) {
            return;
        }
        tracing::debug!(apn = ?self.apn, slot = self.slot, networks = ?list, "qualified networks changed");
        self.cached.last_published = Some(list.clone());
        self.sink
            .publish(QualifiedNetworksChanged {
                apn: self.apn,
                access_networks: list,
                primary_is_empty_means_cellular_default: true,
            })
            .await;
    }
}
