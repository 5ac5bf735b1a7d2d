//! Control bus - observable named parameters shared with the audio engine
//!
//! The engine publishes each deck's real-time state (play flag, position,
//! cue points, sample rate, ...) as named `f64` parameters grouped by deck,
//! e.g. `[Channel1],play`. Anyone holding the bus can read the latest value,
//! request a change, or subscribe to change notifications for a set of groups.
//!
//! Guarantees:
//! - A notification is dispatched exactly once per actual value change;
//!   writing the value a parameter already has is silent.
//! - Notifications reach each subscriber in the order the values changed
//!   (all writes serialize through one lock and each subscriber has a FIFO
//!   channel).
//! - Every change carries its [`Origin`], so a subscriber can tell its own
//!   writes echoing back from changes made by the engine or the operator.
//!
//! Track loading is not a numeric parameter, so load requests and load
//! progress travel over the same channels as [`BusEvent`] variants to keep a
//! single ordered stream per subscriber.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::types::TrackId;

/// Identifies one parameter: a group (deck, mixer, ...) and an item name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamKey {
    pub group: String,
    pub item: String,
}

impl ParamKey {
    pub fn new(group: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            item: item.into(),
        }
    }
}

impl std::fmt::Display for ParamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.group, self.item)
    }
}

/// Handle returned by [`ControlBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Who caused a value change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The engine, a controller, or any writer without a subscription
    External,
    /// A write made through [`ControlBus::set_from`] by this subscriber
    Subscriber(SubscriptionId),
}

/// Notification delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A parameter changed value
    ValueChanged {
        key: ParamKey,
        value: f64,
        origin: Origin,
    },
    /// Ask the player owning `group` to load `track` (or eject with `None`)
    LoadRequested {
        group: String,
        track: Option<TrackId>,
        play: bool,
    },
    /// The player started loading a track; its attributes are inconsistent until loaded
    TrackLoading { group: String, track: TrackId },
    /// The player finished loading a track
    TrackLoaded { group: String, track: TrackId },
    /// The player was ejected
    PlayerEmpty { group: String },
}

impl BusEvent {
    /// Group the event belongs to, used for subscription filtering
    pub fn group(&self) -> &str {
        match self {
            BusEvent::ValueChanged { key, .. } => &key.group,
            BusEvent::LoadRequested { group, .. }
            | BusEvent::TrackLoading { group, .. }
            | BusEvent::TrackLoaded { group, .. }
            | BusEvent::PlayerEmpty { group } => group,
        }
    }
}

/// Receiving end of a bus subscription
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: Receiver<BusEvent>,
}

struct Subscriber {
    id: SubscriptionId,
    groups: HashSet<String>,
    tx: Sender<BusEvent>,
}

#[derive(Default)]
struct BusInner {
    values: HashMap<ParamKey, f64>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl BusInner {
    fn dispatch(&mut self, event: BusEvent) {
        let group = event.group().to_string();
        // Drop subscribers whose receiver went away
        self.subscribers.retain(|sub| {
            if !sub.groups.contains(&group) {
                return true;
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }
}

/// Typed observable-parameter registry
///
/// Shared between the engine and its consumers behind an `Arc`. All methods
/// take `&self` and never block on anything but the registry lock.
#[derive(Default)]
pub struct ControlBus {
    inner: Mutex<BusInner>,
}

impl ControlBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        // A panicking writer cannot leave the map half-updated, so keep going
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a parameter with an initial value if it doesn't exist yet.
    /// Does not notify.
    pub fn register(&self, key: ParamKey, initial: f64) {
        self.lock().values.entry(key).or_insert(initial);
    }

    /// Latest value of a parameter, `None` if it was never registered or set
    pub fn get(&self, key: &ParamKey) -> Option<f64> {
        self.lock().values.get(key).copied()
    }

    /// Latest value of a parameter or `default`
    pub fn get_or(&self, key: &ParamKey, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    /// Set a parameter on behalf of the engine or another external writer.
    ///
    /// Returns `true` if the value changed (and subscribers were notified).
    pub fn set(&self, key: ParamKey, value: f64) -> bool {
        self.set_from(Origin::External, key, value)
    }

    /// Set a parameter, tagging the resulting notification with `origin`
    pub fn set_from(&self, origin: Origin, key: ParamKey, value: f64) -> bool {
        let mut inner = self.lock();
        match inner.values.get(&key) {
            Some(old) if *old == value => return false,
            _ => {}
        }
        inner.values.insert(key.clone(), value);
        inner.dispatch(BusEvent::ValueChanged { key, value, origin });
        true
    }

    /// Publish a non-value event (load requests and load progress)
    pub fn publish(&self, event: BusEvent) {
        self.lock().dispatch(event);
    }

    /// Subscribe to every event of the given groups
    pub fn subscribe<I, S>(&self, groups: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, receiver) = unbounded();
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            groups: groups.into_iter().map(Into::into).collect(),
            tx,
        });
        Subscription { id, receiver }
    }

    /// Stop delivering events to a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscribers.retain(|sub| sub.id != id);
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(item: &str) -> ParamKey {
        ParamKey::new("[Channel1]", item)
    }

    #[test]
    fn test_single_dispatch_per_change() {
        let bus = ControlBus::new();
        let sub = bus.subscribe(["[Channel1]"]);

        assert!(bus.set(key("play"), 1.0));
        assert!(!bus.set(key("play"), 1.0));
        assert!(bus.set(key("play"), 0.0));

        let events: Vec<_> = sub.receiver.try_iter().collect();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_notifications_keep_order() {
        let bus = ControlBus::new();
        let sub = bus.subscribe(["[Channel1]"]);

        for i in 1..=5 {
            bus.set(key("play_position"), i as f64 / 10.0);
        }

        let values: Vec<f64> = sub
            .receiver
            .try_iter()
            .filter_map(|e| match e {
                BusEvent::ValueChanged { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_group_filter() {
        let bus = ControlBus::new();
        let sub = bus.subscribe(["[Channel2]"]);

        bus.set(key("play"), 1.0);
        bus.set(ParamKey::new("[Channel2]", "play"), 1.0);

        let events: Vec<_> = sub.receiver.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].group(), "[Channel2]");
    }

    #[test]
    fn test_origin_is_reported() {
        let bus = ControlBus::new();
        let sub = bus.subscribe(["[Channel1]"]);

        bus.set_from(Origin::Subscriber(sub.id), key("play"), 1.0);
        bus.set(key("play"), 0.0);

        let origins: Vec<Origin> = sub
            .receiver
            .try_iter()
            .filter_map(|e| match e {
                BusEvent::ValueChanged { origin, .. } => Some(origin),
                _ => None,
            })
            .collect();
        assert_eq!(origins, vec![Origin::Subscriber(sub.id), Origin::External]);
    }

    #[test]
    fn test_register_does_not_notify_or_overwrite() {
        let bus = ControlBus::new();
        let sub = bus.subscribe(["[Channel1]"]);

        bus.register(key("samplerate"), 44100.0);
        bus.register(key("samplerate"), 48000.0);

        assert_eq!(bus.get(&key("samplerate")), Some(44100.0));
        assert!(sub.receiver.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_and_dropped_receivers() {
        let bus = ControlBus::new();
        let kept = bus.subscribe(["[Channel1]"]);
        let dropped = bus.subscribe(["[Channel1]"]);
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        bus.set(key("play"), 1.0);
        assert_eq!(bus.subscriber_count(), 1);

        bus.unsubscribe(kept.id);
        assert_eq!(bus.subscriber_count(), 0);
        bus.set(key("play"), 0.0);
        assert_eq!(kept.receiver.try_iter().count(), 1);
    }

    #[test]
    fn test_publish_track_events() {
        let bus = ControlBus::new();
        let sub = bus.subscribe(["[Channel1]"]);

        bus.publish(BusEvent::TrackLoaded {
            group: "[Channel1]".to_string(),
            track: TrackId(3),
        });

        assert_eq!(
            sub.receiver.try_recv().unwrap(),
            BusEvent::TrackLoaded {
                group: "[Channel1]".to_string(),
                track: TrackId(3)
            }
        );
    }
}
