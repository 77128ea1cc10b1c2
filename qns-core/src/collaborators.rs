//! Trait boundaries between the core and everything explicitly out of
//! scope: IMS stack bindings, `TelephonyCallback`/RIL access, carrier-config
//! XML parsing. The host implements these against its own modem/telephony
//! stack; the core only ever sees the event shapes in `qns_events`.

use async_trait::async_trait;
use qns_events::{InboundEvent, QualifiedNetworksChanged};

use crate::error::QnsError;
use crate::policy::carrier_config::RawCarrierConfig;

/// Feeds the evaluator's inbox. One implementation per slot; the host is
/// responsible for translating telephony/RIL callbacks, IWLAN availability
/// changes and WFC knob changes into [`InboundEvent`]s.
#[async_trait]
pub trait TelephonyEventSource: Send + Sync + 'static {
    /// Blocks until the next event is available. Returning `None` signals
    /// the source is permanently exhausted (slot torn down).
    async fn next_event(&mut self) -> Option<InboundEvent>;
}

/// Loads carrier configuration for a slot. Called by the policy store on
/// carrier-id change; never called from inside the evaluation pipeline
/// itself. Returns the raw (string-grammar) handover/fallback rule lists —
/// the host is responsible for XML parsing down to this point, but rule
/// grammar parsing is the policy store's own concern (see
/// `CarrierConfig::from_raw`).
#[async_trait]
pub trait CarrierConfigSource: Send + Sync + 'static {
    async fn load(&self, carrier_id: u32) -> Result<RawCarrierConfig, QnsError>;
}

/// The only place the core's output leaves the process: the modem-facing
/// publish call. Implementations should not block meaningfully; the
/// evaluator does not retry a failed publish, it simply re-publishes on the
/// next change.
#[async_trait]
pub trait AccessNetworkSink: Send + Sync + 'static {
    async fn publish(&self, change: QualifiedNetworksChanged);
}
