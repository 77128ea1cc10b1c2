//! Wire types shared between the qualified networks selector core and the
//! collaborators that feed it (telephony callbacks, the IWLAN tracker, the
//! WFC preference dispatcher, carrier config) and consume its output (the
//! modem).
//!
//! Nothing in this crate does I/O. It exists so a collaborator can depend on
//! the event shapes without pulling in the evaluator, the restriction
//! manager or the policy store.

use derive_more::Display;
use std::collections::HashMap;

/// A radio technology the modem can register on, or IWLAN.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum AccessNetworkKind {
    Unknown,
    Geran,
    Utran,
    Eutran,
    Ngran,
    Iwlan,
}

/// The transport carrying an [`AccessNetworkKind`]. Every cellular RAT maps
/// to `Cellular`; only `Iwlan` maps to `Wifi`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TransportKind {
    Cellular,
    Wifi,
    Invalid,
}

impl From<AccessNetworkKind> for TransportKind {
    fn from(net: AccessNetworkKind) -> Self {
        match net {
            AccessNetworkKind::Iwlan => TransportKind::Wifi,
            AccessNetworkKind::Unknown => TransportKind::Invalid,
            AccessNetworkKind::Geran
            | AccessNetworkKind::Utran
            | AccessNetworkKind::Eutran
            | AccessNetworkKind::Ngran => TransportKind::Cellular,
        }
    }
}

impl TransportKind {
    /// The other transport. `Invalid` maps to itself.
    pub fn other(self) -> Self {
        match self {
            TransportKind::Cellular => TransportKind::Wifi,
            TransportKind::Wifi => TransportKind::Cellular,
            TransportKind::Invalid => TransportKind::Invalid,
        }
    }
}

/// The logical packet-data profile being evaluated.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ApnKind {
    Ims,
    Emergency,
    Mms,
    Xcap,
    Cbs,
}

impl ApnKind {
    /// IMS and EMERGENCY are the only profiles with call-type sensitive
    /// behavior; the rest are best-effort data APNs.
    pub fn is_voice_capable(self) -> bool {
        matches!(self, ApnKind::Ims | ApnKind::Emergency)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CallType {
    Idle,
    Voice,
    Video,
    Emergency,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Preference {
    WifiOnly,
    WifiPref,
    CellPref,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Coverage {
    Home,
    Roam,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Guarding {
    None,
    Wifi,
    Cellular,
}

/// One of the measurements a threshold can be written against.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MeasurementType {
    Rsrp,
    Rsrq,
    Rssnr,
    SsRsrp,
    SsRsrq,
    SsSinr,
    Rscp,
    Rssi,
    Ecno,
}

/// A single signal-strength sample, the unit the quality monitor caches per
/// `(access_network, measurement_type)`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThresholdCrossing {
    pub access_network: AccessNetworkKind,
    pub measurement_type: MeasurementType,
    pub value: f64,
}

/// Radio state the telephony stack pushes in whenever it changes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TelephonyInfo {
    pub voice_rat: AccessNetworkKind,
    pub data_rat: AccessNetworkKind,
    pub data_reg_state: DataRegState,
    pub coverage: Coverage,
    pub roaming_type: RoamingType,
    pub registered_plmn: Option<String>,
    pub cellular_available: bool,
    /// Present when the APN is IMS or EMERGENCY.
    pub vops_supported: Option<bool>,
    pub vops_emergency_supported: Option<bool>,
    pub voice_barred: Option<bool>,
    pub emergency_barred: Option<bool>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DataRegState {
    InService,
    OutOfService,
    EmergencyOnly,
    PowerOff,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RoamingType {
    Domestic,
    International,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IwlanAvailability {
    pub available: bool,
    pub cross_wfc: bool,
    pub notify_disabled: bool,
}

/// A transition of the per-APN data-connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DataConnectionChange {
    pub event: DataConnectionEvent,
    pub state: DataConnectionState,
    pub transport: TransportKind,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DataConnectionEvent {
    Started,
    Connected,
    Disconnected,
    Failed,
    HandoverStarted,
    HandoverSuccess,
    HandoverFailed,
    /// `DATA_SUSPENDED`. Only meaningful mid-handover.
    Suspended,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DataConnectionState {
    Inactive,
    Connecting,
    Connected,
    Handover,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SrvccState {
    Started,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CallState {
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImsRegistrationChange {
    pub transport: TransportKind,
    pub event: ImsRegistrationEvent,
    pub reason_code: i32,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ImsRegistrationEvent {
    Registered,
    Unregistered,
    AccessNetworkChangeFailed,
}

/// Sparse provisioning overrides, keyed by the carrier-config tokens named in
/// the spec. Only the LTE RSRP thresholds, the Wi-Fi RSSI thresholds and the
/// two EPDG timers are ever read back by the policy store; the rest are
/// carried so the inbound event shape stays complete.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProvisioningOverrides {
    pub lte_th_1: Option<i32>,
    pub lte_th_2: Option<i32>,
    pub lte_th_3: Option<i32>,
    pub wifi_th_a: Option<i32>,
    pub wifi_th_b: Option<i32>,
    pub lte_epdg_timer_sec: Option<u32>,
    pub wifi_epdg_timer_sec: Option<u32>,
    pub wfc_mode_override: Option<Preference>,
    pub wfc_roaming_override: Option<bool>,
    pub wfc_enabled_override: Option<bool>,
}

impl ProvisioningOverrides {
    /// True when any key that feeds threshold registration changed, so the
    /// evaluator knows a `ProvisioningInfoChanged` event requires rebuilding
    /// the active policy set rather than just a re-evaluation.
    pub fn threshold_keys_differ(&self, other: &ProvisioningOverrides) -> bool {
        self.lte_th_1 != other.lte_th_1
            || self.lte_th_2 != other.lte_th_2
            || self.lte_th_3 != other.lte_th_3
            || self.wifi_th_a != other.wifi_th_a
            || self.wifi_th_b != other.wifi_th_b
    }
}

/// The exhaustive set of inbound events an evaluator's inbox can receive.
/// Closed on purpose: new input sources are added here, not dispatched by
/// string tag.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InboundEvent {
    IwlanAvailabilityChanged(IwlanAvailability),
    TelephonyInfoChanged(TelephonyInfo),
    RestrictInfoChanged(TransportKind),
    CallTypeChanged(CallType),
    DataConnectionChanged(DataConnectionChange),
    EmergencyPreferredTransportChanged(TransportKind),
    ProvisioningInfoChanged(ProvisioningOverrides),
    ImsRegistrationChanged(ImsRegistrationChange),
    ThresholdCrossed(ThresholdCrossing),
    WfcUserEnabledChanged(bool),
    WfcRoamingEnabledChanged(bool),
    WfcModeChanged(Preference),
    PlatformWfcEnabledChanged(bool),
    AirplaneModeChanged(bool),
    SimAbsent,
    SimLoaded,
    WfcActivationChanged(bool),
    SrvccStateChanged(SrvccState),
    CallStateChanged(CallState),
    /// A low-RTP-quality report fired during an active voice/emergency IMS
    /// call, sourced from the IMS stack's RTP quality monitor.
    RtpLowQualityReported,
    /// A periodic ICMP-ping RTT backhaul check on the WLAN path failed.
    RttBackhaulCheckFailed,
    /// Modem-signalled back-off on a transport.
    ModemThrottlingChanged {
        transport: TransportKind,
        on: bool,
        deadline_ms: Option<u64>,
    },
    /// Another APN on this slot holds an active data connection on IWLAN.
    /// Sourced from the per-slot APN coordinator, not this Evaluator's own
    /// `DataConnectionTracker` (each Evaluator only tracks its own APN).
    OtherApnOnIwlanChanged(bool),
    /// A restriction's deadline timer fired. Posted back by
    /// `RestrictionManager`'s own spawned timer task rather than applied
    /// directly, so the release happens on this Evaluator's single inbox.
    RestrictionTimerFired(RestrictionTimerFired),
}

/// The authoritative output of the engine for one `(slot, apn)`. Emitted
/// only when it differs from the previous publish.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QualifiedNetworksChanged {
    pub apn: ApnKind,
    /// Empty means "treat as cellular default"; never contains `Unknown`.
    pub access_networks: Vec<AccessNetworkKind>,
    /// Always `true`. Carried so a collaborator reading only this message
    /// never needs to special-case an empty `access_networks` against
    /// out-of-band knowledge of what an empty list means.
    pub primary_is_empty_means_cellular_default: bool,
}

/// Visible to collaborators for telemetry only; the core does not require
/// anyone to act on it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RestrictInfoChanged {
    pub transport: TransportKind,
    pub restrictions: Vec<RestrictType>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RestrictType {
    Guarding,
    Throttling,
    HoNotAllowed,
    NonPreferredTransport,
    RtpLowQuality,
    RestrictIwlanInCall,
    RestrictIwlanCsCall,
    FallbackToWwanImsRegiFail,
    FallbackOnDataConnectionFail,
    FallbackToWwanRttBackhaulFail,
}

/// A restriction deadline timer's identity, round-tripped through the
/// owning Evaluator's inbox when it fires so the release it names applies
/// serialized with every other mutation of that Evaluator's restriction
/// state, instead of racing it from the timer's own background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RestrictionTimerFired {
    pub transport: TransportKind,
    pub restrict_type: RestrictType,
    pub timer_id: u64,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum ReleaseEvent {
    Disconnect,
    WifiApChanged,
    WfcPreferModeChanged,
    CallEnd,
    ImsNotSupportRat,
}

/// Process-lifetime persisted fact: the last-known ISO country code per
/// slot, used when deciding international roaming.
pub type CountryCodeCache = HashMap<u32, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_bijection() {
        assert_eq!(TransportKind::from(AccessNetworkKind::Iwlan), TransportKind::Wifi);
        for net in [
            AccessNetworkKind::Geran,
            AccessNetworkKind::Utran,
            AccessNetworkKind::Eutran,
            AccessNetworkKind::Ngran,
        ] {
            assert_eq!(TransportKind::from(net), TransportKind::Cellular);
        }
    }

    #[test]
    fn other_transport_round_trips() {
        assert_eq!(TransportKind::Cellular.other(), TransportKind::Wifi);
        assert_eq!(TransportKind::Wifi.other(), TransportKind::Cellular);
        assert_eq!(TransportKind::Cellular.other().other(), TransportKind::Cellular);
    }
}
