//! C4: RestrictionManager. Holds the `transport -> set<Restriction>` map for
//! one (slot, APN) and the primitive operations the Evaluator drives the
//! nine enforced policies through.

pub mod timer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use qns_events::{ReleaseEvent, RestrictInfoChanged, RestrictType, RestrictionTimerFired, TransportKind};

use crate::model::{is_ignorable, ReleaseEventKey, Restriction};
use timer::{TimerGuard, TimerId};

struct ArmedRestriction {
    restriction: Restriction,
    guard: TimerGuard,
}

#[derive(Clone)]
pub struct RestrictionManager {
    inner: Arc<Inner>,
}

struct Inner {
    restrictions: DashMap<TransportKind, HashMap<RestrictType, ArmedRestriction>>,
    /// Throttle requests deferred while a data connection is active on that
    /// transport, replayed on disconnect.
    pending_throttle: DashMap<TransportKind, (bool, Option<u64>)>,
    listener: Mutex<Option<flume::Sender<RestrictInfoChanged>>>,
    /// Registered by an owning Evaluator so a fired deadline timer posts
    /// back into its inbox instead of mutating `restrictions` directly; left
    /// unregistered, `fire_timer` releases immediately (e.g. this module's
    /// own standalone tests).
    timer_listener: Mutex<Option<flume::Sender<RestrictionTimerFired>>>,
}

impl Default for RestrictionManager {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                restrictions: DashMap::new(),
                pending_throttle: DashMap::new(),
                listener: Mutex::new(None),
                timer_listener: Mutex::new(None),
            }),
        }
    }
}

impl RestrictionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_listener(&self, sender: flume::Sender<RestrictInfoChanged>) {
        *self.inner.listener.lock().expect("restriction listener lock poisoned by a prior panic") = Some(sender);
    }

    /// Wires an owning Evaluator's inbox forwarder so deadline timers fire
    /// through it rather than mutating this manager's map directly (§4.4,
    /// §5's single-inbox serialization).
    pub fn register_timer_listener(&self, sender: flume::Sender<RestrictionTimerFired>) {
        *self.inner.timer_listener.lock().expect("restriction timer listener lock poisoned by a prior panic") = Some(sender);
    }

    /// Idempotent per type: re-arming an already-held restriction replaces
    /// its release-event set and restarts its deadline timer.
    pub fn add(
        &self,
        transport: TransportKind,
        restrict_type: RestrictType,
        release_events: impl IntoIterator<Item = ReleaseEvent>,
        duration: Option<Duration>,
    ) {
        let release_events: std::collections::BTreeSet<ReleaseEventKey> =
            release_events.into_iter().map(ReleaseEventKey::from).collect();

        let guard = {
            let mut shard = self.inner.restrictions.entry(transport).or_default();
            let guard = shard.get(&restrict_type).map(|armed| armed.guard.clone()).unwrap_or_default();
            shard.insert(
                restrict_type,
                ArmedRestriction {
                    restriction: Restriction {
                        restrict_type,
                        release_events,
                        release_time: duration,
                    },
                    guard: guard.clone(),
                },
            );
            guard
        };

        tracing::trace!(?transport, ?restrict_type, ?duration, "restriction armed");

        match duration {
            Some(duration) => {
                let id = guard.arm();
                let manager = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    if guard.is_current(id) {
                        manager.fire_timer(transport, restrict_type, id);
                    }
                });
            }
            None => guard.cancel(),
        }

        self.notify(transport);
    }

    /// Called by a spawned deadline timer on fire. When an Evaluator has
    /// registered a timer listener (the normal case), posts the identity
    /// back through it instead of releasing directly, so the actual
    /// mutation happens serialized on that Evaluator's own inbox; used
    /// standalone, with nothing else able to race this manager's state, it
    /// releases immediately.
    fn fire_timer(&self, transport: TransportKind, restrict_type: RestrictType, id: TimerId) {
        let listener = self
            .inner
            .timer_listener
            .lock()
            .expect("restriction timer listener lock poisoned by a prior panic")
            .clone();
        match listener {
            Some(sender) => {
                let _ = sender.send(RestrictionTimerFired {
                    transport,
                    restrict_type,
                    timer_id: id.raw(),
                });
            }
            None => self.release(transport, restrict_type, false),
        }
    }

    /// Applies a `RestrictionTimerFired` identity received back through the
    /// owning Evaluator's inbox. Re-checks the restriction's current guard
    /// before releasing, since a re-arm can race the message while it is in
    /// flight.
    pub fn apply_timer_fired(&self, fired: RestrictionTimerFired) {
        let guard = self
            .inner
            .restrictions
            .get(&fired.transport)
            .and_then(|shard| shard.get(&fired.restrict_type).map(|armed| armed.guard.clone()));
        if let Some(guard) = guard {
            if guard.is_current(TimerId::from_raw(fired.timer_id)) {
                self.release(fired.transport, fired.restrict_type, false);
            }
        }
    }

    pub fn release(&self, transport: TransportKind, restrict_type: RestrictType, skip_notify: bool) {
        let removed = self
            .inner
            .restrictions
            .get_mut(&transport)
            .and_then(|mut shard| shard.remove(&restrict_type));
        if let Some(armed) = removed {
            tracing::trace!(?transport, ?restrict_type, "restriction released");
            armed.guard.cancel();
            if !skip_notify {
                self.notify(transport);
            }
        }
    }

    pub fn process_release_event(&self, transport: TransportKind, event: ReleaseEvent) {
        let key = ReleaseEventKey::from(event);
        let to_release: Vec<RestrictType> = self
            .inner
            .restrictions
            .get(&transport)
            .map(|shard| {
                shard
                    .iter()
                    .filter(|(_, armed)| armed.restriction.release_events.contains(&key))
                    .map(|(t, _)| *t)
                    .collect()
            })
            .unwrap_or_default();
        for restrict_type in to_release {
            self.release(transport, restrict_type, false);
        }
    }

    pub fn has(&self, transport: TransportKind, restrict_type: RestrictType) -> bool {
        self.inner
            .restrictions
            .get(&transport)
            .is_some_and(|shard| shard.contains_key(&restrict_type))
    }

    pub fn is_restricted(&self, transport: TransportKind) -> bool {
        self.inner.restrictions.get(&transport).is_some_and(|shard| !shard.is_empty())
    }

    /// The restriction types currently held against `transport`, for the
    /// diagnostic dump.
    pub fn restrictions_of(&self, transport: TransportKind) -> Vec<RestrictType> {
        self.inner
            .restrictions
            .get(&transport)
            .map(|shard| shard.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_restricted_except_guarding(&self, transport: TransportKind) -> bool {
        self.inner
            .restrictions
            .get(&transport)
            .is_some_and(|shard| shard.keys().any(|t| *t != RestrictType::Guarding))
    }

    /// True iff every restriction currently held on `transport` is in the
    /// ignorable set — meaning it should not block this transport from
    /// being the sole available one.
    pub fn is_allowed_on_single_transport(&self, transport: TransportKind) -> bool {
        self.inner
            .restrictions
            .get(&transport)
            .is_none_or(|shard| shard.keys().all(|t| is_ignorable(*t)))
    }

    /// Deferred while `data_connection_active`; replayed via
    /// [`Self::on_disconnected`] once the connection drops.
    pub fn notify_throttling(&self, transport: TransportKind, on: bool, deadline_ms: Option<u64>, data_connection_active: bool) {
        if data_connection_active {
            self.inner.pending_throttle.insert(transport, (on, deadline_ms));
            return;
        }
        self.apply_throttle(transport, on, deadline_ms);
    }

    pub fn on_disconnected(&self, transport: TransportKind) {
        if let Some((_, (on, deadline_ms))) = self.inner.pending_throttle.remove(&transport) {
            self.apply_throttle(transport, on, deadline_ms);
        }
    }

    fn apply_throttle(&self, transport: TransportKind, on: bool, deadline_ms: Option<u64>) {
        if on {
            self.add(transport, RestrictType::Throttling, [], deadline_ms.map(Duration::from_millis));
        } else {
            self.release(transport, RestrictType::Throttling, false);
        }
    }

    fn notify(&self, transport: TransportKind) {
        let restrictions: Vec<RestrictType> = self
            .inner
            .restrictions
            .get(&transport)
            .map(|shard| shard.keys().copied().collect())
            .unwrap_or_default();
        let listener = self
            .inner
            .listener
            .lock()
            .expect("restriction listener lock poisoned by a prior panic")
            .clone();
        if let Some(sender) = listener {
            let _ = sender.send(RestrictInfoChanged { transport, restrictions });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_release_round_trip() {
        let manager = RestrictionManager::new();
        manager.add(TransportKind::Wifi, RestrictType::Guarding, [ReleaseEvent::Disconnect], None);
        assert!(manager.has(TransportKind::Wifi, RestrictType::Guarding));
        manager.release(TransportKind::Wifi, RestrictType::Guarding, false);
        assert!(!manager.has(TransportKind::Wifi, RestrictType::Guarding));
    }

    #[test]
    fn process_release_event_releases_matching_restrictions_only() {
        let manager = RestrictionManager::new();
        manager.add(TransportKind::Wifi, RestrictType::Guarding, [ReleaseEvent::CallEnd], None);
        manager.add(TransportKind::Wifi, RestrictType::Throttling, [ReleaseEvent::Disconnect], None);

        manager.process_release_event(TransportKind::Wifi, ReleaseEvent::CallEnd);

        assert!(!manager.has(TransportKind::Wifi, RestrictType::Guarding));
        assert!(manager.has(TransportKind::Wifi, RestrictType::Throttling));
    }

    #[test]
    fn is_allowed_on_single_transport_checks_ignorable_set() {
        let manager = RestrictionManager::new();
        manager.add(TransportKind::Wifi, RestrictType::Guarding, [], None);
        assert!(manager.is_allowed_on_single_transport(TransportKind::Wifi));

        manager.add(TransportKind::Wifi, RestrictType::HoNotAllowed, [], None);
        assert!(!manager.is_allowed_on_single_transport(TransportKind::Wifi));
    }

    #[test]
    fn is_restricted_except_guarding_ignores_only_guarding() {
        let manager = RestrictionManager::new();
        manager.add(TransportKind::Cellular, RestrictType::Guarding, [], None);
        assert!(!manager.is_restricted_except_guarding(TransportKind::Cellular));

        manager.add(TransportKind::Cellular, RestrictType::Throttling, [], None);
        assert!(manager.is_restricted_except_guarding(TransportKind::Cellular));
    }

    #[test]
    fn throttling_defers_while_data_connection_is_active() {
        let manager = RestrictionManager::new();
        manager.notify_throttling(TransportKind::Cellular, true, Some(5_000), true);
        assert!(!manager.has(TransportKind::Cellular, RestrictType::Throttling));

        manager.on_disconnected(TransportKind::Cellular);
        assert!(manager.has(TransportKind::Cellular, RestrictType::Throttling));
    }

    #[tokio::test]
    async fn timed_restriction_releases_on_deadline() {
        let manager = RestrictionManager::new();
        manager.add(TransportKind::Wifi, RestrictType::Guarding, [], Some(Duration::from_millis(10)));
        assert!(manager.has(TransportKind::Wifi, RestrictType::Guarding));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!manager.has(TransportKind::Wifi, RestrictType::Guarding));
    }

    #[tokio::test]
    async fn rearming_before_deadline_cancels_the_stale_timer() {
        let manager = RestrictionManager::new();
        manager.add(TransportKind::Wifi, RestrictType::Guarding, [], Some(Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.add(TransportKind::Wifi, RestrictType::Guarding, [], Some(Duration::from_millis(100)));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(manager.has(TransportKind::Wifi, RestrictType::Guarding), "re-armed deadline should still be pending");
    }
}
