//! Internal-only entities: the policy condition tree, restrictions, and the
//! pre-condition map key. Nothing here crosses a process boundary, so none
//! of it needs to be in `qns-events`.

use std::collections::BTreeSet;
use std::time::Duration;

use qns_events::{CallType, Coverage, Guarding, Preference, ReleaseEvent, RestrictType, TransportKind};

use crate::signal::condition::Condition;

/// The map key policy lookups are keyed on. Equality includes `guarding`
/// only when present, matching the "equality includes guarding when
/// present" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreCondition {
    pub call_type: CallType,
    pub preference: Preference,
    pub coverage: Coverage,
    pub guarding: Option<Guarding>,
}

impl PreCondition {
    pub fn new(call_type: CallType, preference: Preference, coverage: Coverage) -> Self {
        Self {
            call_type,
            preference,
            coverage,
            guarding: None,
        }
    }

    pub fn with_guarding(mut self, guarding: Guarding) -> Self {
        self.guarding = Some(guarding);
        self
    }

    /// Like `==`, except when `self.guarding` is `None` the other side's
    /// guarding is ignored. Called as `live.matches(&policy.pre_condition)`:
    /// while nothing is guarded, every policy's pre-condition matches
    /// regardless of what it says about guarding; once something is guarded,
    /// only a policy whose guarding clause names that exact state matches.
    pub fn matches(&self, other: &PreCondition) -> bool {
        self.call_type == other.call_type
            && self.preference == other.preference
            && self.coverage == other.coverage
            && match self.guarding {
                Some(g) => other.guarding == Some(g),
                None => true,
            }
    }
}

/// One condition group: every condition in the list must be satisfied.
pub type ConditionGroup = Vec<Condition>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDirection {
    RoveIn,
    RoveOut,
}

/// An Access Network Selection Policy: satisfied iff at least one of its
/// condition groups has every condition met.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub direction: PolicyDirection,
    pub pre_condition: PreCondition,
    pub target_transport: TransportKind,
    pub condition_groups: Vec<ConditionGroup>,
}

impl Policy {
    /// True if any condition group in this policy contains a Wi-Fi
    /// threshold condition with no accompanying cellular condition —
    /// used by the "only IWLAN available" pipeline step.
    pub fn has_wifi_threshold_without_cellular_condition(&self) -> bool {
        self.condition_groups.iter().any(|group| {
            let has_wifi = group.iter().any(|c| c.is_wifi());
            let has_cellular = group.iter().any(|c| c.is_cellular());
            has_wifi && !has_cellular
        })
    }
}

/// One restriction held against a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Restriction {
    pub restrict_type: RestrictType,
    pub release_events: BTreeSet<ReleaseEventKey>,
    pub release_time: Option<Duration>,
}

/// `ReleaseEvent` wrapped so it can live in a `BTreeSet` (no `Ord` on the
/// wire type, since `qns-events` has no reason to carry one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseEventKey(pub ReleaseEvent);

impl From<ReleaseEvent> for ReleaseEventKey {
    fn from(e: ReleaseEvent) -> Self {
        ReleaseEventKey(e)
    }
}

/// The restrictions the ignorable set excludes from blocking availability
/// when a transport is otherwise the only one reachable.
pub const IGNORABLE_RESTRICTIONS: &[RestrictType] = &[
    RestrictType::Guarding,
    RestrictType::RtpLowQuality,
    RestrictType::RestrictIwlanInCall,
    RestrictType::FallbackToWwanImsRegiFail,
    RestrictType::FallbackOnDataConnectionFail,
    RestrictType::FallbackToWwanRttBackhaulFail,
];

pub fn is_ignorable(restrict_type: RestrictType) -> bool {
    IGNORABLE_RESTRICTIONS.contains(&restrict_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_equality_respects_guarding_presence() {
        let a = PreCondition::new(CallType::Idle, Preference::CellPref, Coverage::Home);
        let b = a.with_guarding(Guarding::Wifi);
        assert_ne!(a, b);
    }

    #[test]
    fn ignorable_set_matches_spec() {
        assert!(is_ignorable(RestrictType::Guarding));
        assert!(!is_ignorable(RestrictType::HoNotAllowed));
        assert!(!is_ignorable(RestrictType::NonPreferredTransport));
        assert!(!is_ignorable(RestrictType::Throttling));
    }
}
