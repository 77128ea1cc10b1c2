//! The failure taxonomy the core surfaces, and only the core: recoverable
//! failures are logged and short-circuit the affected branch rather than
//! propagating, so most of this enum is constructed only at a handful of
//! call sites (rule parsing, SIM teardown).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum QnsError {
    /// A handover or fallback rule string failed to parse, or named an
    /// unknown token, or was missing a required side. The offending rule is
    /// discarded and the remainder of the carrier config still loads.
    #[error("invalid rule `{rule}`: {reason}")]
    ConfigInvalid { rule: String, reason: String },

    /// Raised only when tearing an evaluator down: SIM absent. The core
    /// publishes an empty qualified-network list, clears cached state, and
    /// waits for `SimLoaded`.
    #[error("fatal: {0}")]
    Fatal(#[from] FatalReason),
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum FatalReason {
    #[error("SIM absent")]
    SimAbsent,
    #[error("carrier id unknown")]
    CarrierIdUnknown,
}
