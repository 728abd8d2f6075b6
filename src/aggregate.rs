//! Aggregate trait and the `AggregateRoot` staging wrapper.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// A domain aggregate whose state is derived from its event history.
///
/// The implementing type itself serves as the aggregate's state. State is
/// built by folding domain events through [`apply`](Aggregate::apply),
/// starting from [`Default::default`].
///
/// # Contract
///
/// - [`apply`](Aggregate::apply) must be a pure, total function. It takes
///   ownership of the current state and a reference to a domain event and
///   returns the next state. Validation never happens here: every event that
///   reaches the log was validated before it was raised.
/// - `DomainEvent` must use adjacently tagged serde
///   (`#[serde(tag = "type", content = "data")]`) so the event type name can
///   be lifted into the stored event envelope.
pub trait Aggregate: Default + Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Identifies this aggregate type (e.g. "post-code"). Part of the
    /// stream id derivation, so it must never change.
    const AGGREGATE_TYPE: &'static str;

    /// The set of events this aggregate can produce and apply.
    type DomainEvent: Serialize
        + DeserializeOwned
        + Clone
        + fmt::Debug
        + PartialEq
        + Send
        + Sync
        + 'static;

    /// The entity identifier, or the nil UUID before creation.
    fn id(&self) -> Uuid;

    /// Whether a `Deleted` event has been applied.
    fn is_deleted(&self) -> bool;

    /// Apply a single event to produce the next state.
    fn apply(self, event: &Self::DomainEvent) -> Self;
}

/// Fold a sequence of events into a fresh aggregate state.
///
/// This is the replay algorithm: start from the empty state and apply every
/// event in recorded order. Replaying the same events always yields the
/// same state.
pub fn replay<'a, A: Aggregate>(events: impl IntoIterator<Item = &'a A::DomainEvent>) -> A {
    events
        .into_iter()
        .fold(A::default(), |state, event| state.apply(event))
}

/// One aggregate instance together with its persisted version and the
/// events staged since it was loaded.
///
/// Command methods (implemented per entity in [`crate::domain`]) validate
/// against the current state, then stage exactly one event and apply it
/// immediately, so several commands against the same instance compose
/// before anything is persisted. Hand the instance to
/// [`AggregateStore::save`](crate::AggregateStore::save) to persist the
/// staged events.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRoot<A: Aggregate> {
    state: A,
    version: u64,
    uncommitted: Vec<A::DomainEvent>,
}

impl<A: Aggregate> Default for AggregateRoot<A> {
    fn default() -> Self {
        Self {
            state: A::default(),
            version: 0,
            uncommitted: Vec::new(),
        }
    }
}

impl<A: Aggregate> AggregateRoot<A> {
    /// An empty, not yet created aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate an aggregate by replaying its persisted history.
    ///
    /// The resulting version equals the number of events replayed.
    pub fn from_history(events: &[A::DomainEvent]) -> Self {
        Self {
            state: replay::<A>(events),
            version: events.len() as u64,
            uncommitted: Vec::new(),
        }
    }

    /// Current state, including the effect of staged events.
    pub fn state(&self) -> &A {
        &self.state
    }

    /// The entity identifier, or the nil UUID before creation.
    pub fn id(&self) -> Uuid {
        self.state.id()
    }

    /// Whether a `Created` event has been applied.
    pub fn is_created(&self) -> bool {
        !self.state.id().is_nil()
    }

    /// Number of persisted events this instance was built from.
    ///
    /// Used as the expected stream length when appending.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Events staged by commands but not yet persisted.
    pub fn uncommitted_events(&self) -> &[A::DomainEvent] {
        &self.uncommitted
    }

    /// Remove and return the staged events, counting them as persisted.
    ///
    /// For callers that write to the event log themselves instead of going
    /// through [`AggregateStore`](crate::AggregateStore).
    pub fn take_uncommitted(&mut self) -> Vec<A::DomainEvent> {
        self.version += self.uncommitted.len() as u64;
        std::mem::take(&mut self.uncommitted)
    }

    /// Drop the staged events after the event log accepted them.
    pub(crate) fn mark_committed(&mut self) {
        self.version += self.uncommitted.len() as u64;
        self.uncommitted.clear();
    }

    /// Stage an already validated event and apply it to the in-memory state.
    pub(crate) fn raise(&mut self, event: A::DomainEvent) {
        let state = std::mem::take(&mut self.state);
        self.state = state.apply(&event);
        self.uncommitted.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::post_code::{PostCode, PostCodeEvent};

    fn id() -> Uuid {
        Uuid::parse_str("0b3b5c9e-9a34-4c57-8f0f-2a1f7f5e1c01").unwrap()
    }

    fn history() -> Vec<PostCodeEvent> {
        vec![
            PostCodeEvent::PostCodeCreated {
                id: id(),
                number: "7000".into(),
                name: "Fredericia".into(),
            },
            PostCodeEvent::PostCodeUpdated {
                id: id(),
                name: "Fredericia C".into(),
            },
        ]
    }

    #[test]
    fn new_root_is_empty() {
        let root = AggregateRoot::<PostCode>::new();
        assert!(!root.is_created());
        assert_eq!(root.version(), 0);
        assert!(root.uncommitted_events().is_empty());
        assert!(root.id().is_nil());
    }

    #[test]
    fn from_history_sets_version_to_event_count() {
        let root = AggregateRoot::<PostCode>::from_history(&history());
        assert_eq!(root.version(), 2);
        assert_eq!(root.id(), id());
        assert_eq!(root.state().name, "Fredericia C");
        assert!(root.uncommitted_events().is_empty());
    }

    #[test]
    fn replay_twice_yields_identical_state() {
        let events = history();
        let first = replay::<PostCode>(&events);
        let second = replay::<PostCode>(&events);
        assert_eq!(first, second);
    }

    #[test]
    fn raise_applies_immediately_and_stages() {
        let mut root = AggregateRoot::<PostCode>::new();
        root.raise(history()[0].clone());

        assert!(root.is_created());
        assert_eq!(root.version(), 0);
        assert_eq!(root.uncommitted_events().len(), 1);
        assert_eq!(root.state().number, "7000");
    }

    #[test]
    fn mark_committed_advances_version() {
        let mut root = AggregateRoot::<PostCode>::new();
        for event in history() {
            root.raise(event);
        }
        root.mark_committed();

        assert_eq!(root.version(), 2);
        assert!(root.uncommitted_events().is_empty());
        assert_eq!(root, AggregateRoot::from_history(&history()));
    }

    #[test]
    fn take_uncommitted_drains_and_advances_version() {
        let mut root = AggregateRoot::<PostCode>::from_history(&history()[..1]);
        root.raise(history()[1].clone());

        let taken = root.take_uncommitted();
        assert_eq!(taken, vec![history()[1].clone()]);
        assert_eq!(root.version(), 2);
        assert!(root.uncommitted_events().is_empty());
    }
}
