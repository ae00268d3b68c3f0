//! Synchronous publish/subscribe registry for controller notifications.

use rapier3d::prelude::RigidBodyHandle;

use super::state::LocomotionMode;

/// Notifications published by the controller at the point of detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// Once per walking tick, after sensing and gravity, before displacement
    BeforeMove,
    StateExited(LocomotionMode),
    StateEntered(LocomotionMode),
    StateChanged(LocomotionMode),
    GroundStateChanged(bool),
    Grounded { fall_distance: f32, fall_time: f32 },
    Ungrounded,
    SlidingStateChanged(bool),
    StartedSliding,
    StoppedSliding,
    Jumped,
    CrouchStateChanged(bool),
    Crouched,
    Uncrouched,
    GrabbableLookedAt(RigidBodyHandle),
    GrabbableLookedAway(RigidBodyHandle),
    Grabbed(RigidBodyHandle),
    Released(RigidBodyHandle),
    /// The held body disappeared from the world while it was held
    GrabSessionDestroyed,
}

/// Payload-free discriminant of [`PlayerEvent`], used to filter subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeMove,
    StateExited,
    StateEntered,
    StateChanged,
    GroundStateChanged,
    Grounded,
    Ungrounded,
    SlidingStateChanged,
    StartedSliding,
    StoppedSliding,
    Jumped,
    CrouchStateChanged,
    Crouched,
    Uncrouched,
    GrabbableLookedAt,
    GrabbableLookedAway,
    Grabbed,
    Released,
    GrabSessionDestroyed,
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::BeforeMove => EventKind::BeforeMove,
            PlayerEvent::StateExited(_) => EventKind::StateExited,
            PlayerEvent::StateEntered(_) => EventKind::StateEntered,
            PlayerEvent::StateChanged(_) => EventKind::StateChanged,
            PlayerEvent::GroundStateChanged(_) => EventKind::GroundStateChanged,
            PlayerEvent::Grounded { .. } => EventKind::Grounded,
            PlayerEvent::Ungrounded => EventKind::Ungrounded,
            PlayerEvent::SlidingStateChanged(_) => EventKind::SlidingStateChanged,
            PlayerEvent::StartedSliding => EventKind::StartedSliding,
            PlayerEvent::StoppedSliding => EventKind::StoppedSliding,
            PlayerEvent::Jumped => EventKind::Jumped,
            PlayerEvent::CrouchStateChanged(_) => EventKind::CrouchStateChanged,
            PlayerEvent::Crouched => EventKind::Crouched,
            PlayerEvent::Uncrouched => EventKind::Uncrouched,
            PlayerEvent::GrabbableLookedAt(_) => EventKind::GrabbableLookedAt,
            PlayerEvent::GrabbableLookedAway(_) => EventKind::GrabbableLookedAway,
            PlayerEvent::Grabbed(_) => EventKind::Grabbed,
            PlayerEvent::Released(_) => EventKind::Released,
            PlayerEvent::GrabSessionDestroyed => EventKind::GrabSessionDestroyed,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&PlayerEvent)>;

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    listener: Listener,
}

/// Registry of listeners. Delivery is synchronous and follows registration order.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for a single event kind
    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: FnMut(&PlayerEvent) + 'static,
    {
        self.insert(Some(kind), Box::new(listener))
    }

    /// Registers a listener for every event
    pub fn subscribe_all<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&PlayerEvent) + 'static,
    {
        self.insert(None, Box::new(listener))
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn publish(&mut self, event: PlayerEvent) {
        let kind = event.kind();
        for subscription in &mut self.subscriptions {
            if subscription.kind.map_or(true, |k| k == kind) {
                (subscription.listener)(&event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    fn insert(&mut self, kind: Option<EventKind>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription { id, kind, listener });
        id
    }
}
