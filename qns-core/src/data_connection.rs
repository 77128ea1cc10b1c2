//! C2: DataConnectionTracker — one per `(slot, apn)`, the per-APN
//! data-connection state machine from §4.2.

use qns_events::{DataConnectionChange, DataConnectionEvent, DataConnectionState, TransportKind};

/// Mirrors the data-connection state and the transport it is carried on.
/// Observers are notified on every state transition via the
/// [`DataConnectionChange`] returned from [`DataConnectionTracker::apply`];
/// `None` means the event did not change anything observable (a silent
/// re-arm, or an event that does not apply in the current state).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataConnectionTracker {
    state: DataConnectionState,
    transport: TransportKind,
}

impl Default for DataConnectionTracker {
    fn default() -> Self {
        Self {
            state: DataConnectionState::Inactive,
            transport: TransportKind::Invalid,
        }
    }
}

impl DataConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DataConnectionState {
        self.state
    }

    /// `INVALID` outside `CONNECTED`/`HANDOVER`.
    pub fn last_transport(&self) -> TransportKind {
        match self.state {
            DataConnectionState::Connected | DataConnectionState::Handover => self.transport,
            DataConnectionState::Inactive | DataConnectionState::Connecting => TransportKind::Invalid,
        }
    }

    /// Applies one incoming event for `transport` and advances the state
    /// machine. Returns the resulting [`DataConnectionChange`] iff the
    /// transition is observable.
    pub fn apply(&mut self, event: DataConnectionEvent, transport: TransportKind) -> Option<DataConnectionChange> {
        use DataConnectionEvent as E;
        use DataConnectionState as S;

        let (new_state, new_transport) = match (self.state, event) {
            (S::Inactive, E::Started) => (S::Connecting, transport),

            (S::Connecting, E::Connected) => (S::Connected, transport),
            (S::Connecting, E::Failed) => (S::Inactive, TransportKind::Invalid),
            // A retry attempt on the same side while still connecting is a
            // silent re-arm: nothing observable changes.
            (S::Connecting, E::Started) if transport == self.transport => return None,

            (S::Connected, E::Disconnected) => (S::Inactive, TransportKind::Invalid),
            (S::Connected, E::HandoverStarted) => (S::Handover, self.transport),

            (S::Handover, E::HandoverSuccess) => (S::Connected, transport),
            (S::Handover, E::HandoverFailed) => (S::Connected, self.transport),
            (S::Handover, E::Disconnected) => (S::Inactive, TransportKind::Invalid),
            // A re-arm for a retry on the side already mid-handover.
            (S::Handover, E::Started) if transport == self.transport => return None,
            // DATA_SUSPENDED while mid-handover on a different transport is
            // treated as a successful handover.
            (S::Handover, E::Suspended) if transport != self.transport => (S::Connected, transport),
            (S::Handover, E::Suspended) => return None,

            // Any other (state, event) pair does not apply.
            _ => return None,
        };

        self.state = new_state;
        self.transport = new_transport;

        Some(DataConnectionChange {
            event,
            state: new_state,
            transport: new_transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_connects() {
        let mut t = DataConnectionTracker::new();
        assert_eq!(t.last_transport(), TransportKind::Invalid);

        let change = t.apply(DataConnectionEvent::Started, TransportKind::Cellular).unwrap();
        assert_eq!(change.state, DataConnectionState::Connecting);

        let change = t.apply(DataConnectionEvent::Connected, TransportKind::Cellular).unwrap();
        assert_eq!(change.state, DataConnectionState::Connected);
        assert_eq!(t.last_transport(), TransportKind::Cellular);
    }

    #[test]
    fn handover_to_other_transport_updates_transport() {
        let mut t = DataConnectionTracker::new();
        t.apply(DataConnectionEvent::Started, TransportKind::Cellular);
        t.apply(DataConnectionEvent::Connected, TransportKind::Cellular);
        t.apply(DataConnectionEvent::HandoverStarted, TransportKind::Cellular);
        assert_eq!(t.state(), DataConnectionState::Handover);

        let change = t.apply(DataConnectionEvent::HandoverSuccess, TransportKind::Wifi).unwrap();
        assert_eq!(change.state, DataConnectionState::Connected);
        assert_eq!(t.last_transport(), TransportKind::Wifi);
    }

    #[test]
    fn handover_failure_stays_on_original_transport() {
        let mut t = DataConnectionTracker::new();
        t.apply(DataConnectionEvent::Started, TransportKind::Cellular);
        t.apply(DataConnectionEvent::Connected, TransportKind::Cellular);
        t.apply(DataConnectionEvent::HandoverStarted, TransportKind::Cellular);

        let change = t.apply(DataConnectionEvent::HandoverFailed, TransportKind::Wifi).unwrap();
        assert_eq!(change.state, DataConnectionState::Connected);
        assert_eq!(t.last_transport(), TransportKind::Cellular);
    }

    #[test]
    fn suspended_on_other_transport_mid_handover_is_treated_as_success() {
        let mut t = DataConnectionTracker::new();
        t.apply(DataConnectionEvent::Started, TransportKind::Cellular);
        t.apply(DataConnectionEvent::Connected, TransportKind::Cellular);
        t.apply(DataConnectionEvent::HandoverStarted, TransportKind::Cellular);

        let change = t.apply(DataConnectionEvent::Suspended, TransportKind::Wifi).unwrap();
        assert_eq!(change.state, DataConnectionState::Connected);
        assert_eq!(t.last_transport(), TransportKind::Wifi);
    }

    #[test]
    fn retry_on_same_transport_mid_handover_is_silent() {
        let mut t = DataConnectionTracker::new();
        t.apply(DataConnectionEvent::Started, TransportKind::Cellular);
        t.apply(DataConnectionEvent::Connected, TransportKind::Cellular);
        t.apply(DataConnectionEvent::HandoverStarted, TransportKind::Cellular);

        let change = t.apply(DataConnectionEvent::Started, TransportKind::Cellular);
        assert!(change.is_none());
        assert_eq!(t.state(), DataConnectionState::Handover);
    }

    #[test]
    fn disconnect_from_any_active_state_returns_to_inactive() {
        let mut t = DataConnectionTracker::new();
        t.apply(DataConnectionEvent::Started, TransportKind::Cellular);
        t.apply(DataConnectionEvent::Connected, TransportKind::Cellular);
        let change = t.apply(DataConnectionEvent::Disconnected, TransportKind::Cellular).unwrap();
        assert_eq!(change.state, DataConnectionState::Inactive);
        assert_eq!(t.last_transport(), TransportKind::Invalid);
    }
}
