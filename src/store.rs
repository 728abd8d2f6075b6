//! Load, command, save: the write side of the registry.
//!
//! [`AggregateStore`] rebuilds aggregates from their streams, and persists
//! the events staged on an [`AggregateRoot`] with optimistic concurrency on
//! the stream length it was loaded at.

use std::sync::Arc;

use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::command::CommandContext;
use crate::error::{CommandError, ExecuteError, StoreError};
use crate::event::{decode_domain_event, encode_domain_event, stream_uuid};
use crate::storage::{EventStore, ExpectedVersion};

/// Typed access to aggregates on top of an [`EventStore`].
///
/// `Clone` is cheap; clones share the same event store.
#[derive(Debug)]
pub struct AggregateStore<S> {
    events: Arc<S>,
}

impl<S> Clone for AggregateStore<S> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<S: EventStore> AggregateStore<S> {
    pub fn new(events: S) -> Self {
        Self {
            events: Arc::new(events),
        }
    }

    /// The underlying event store.
    pub fn event_store(&self) -> &S {
        &self.events
    }

    pub(crate) fn shared_event_store(&self) -> Arc<S> {
        Arc::clone(&self.events)
    }

    /// Rebuild the aggregate `id` by replaying its stream.
    ///
    /// An unknown id yields an empty, not yet created aggregate.
    ///
    /// # Errors
    ///
    /// [`StoreError::Codec`] if a stored event does not decode into
    /// `A::DomainEvent`; nothing is skipped during replay.
    pub fn load<A: Aggregate>(&self, id: Uuid) -> Result<AggregateRoot<A>, StoreError> {
        let stream_id = stream_uuid(A::AGGREGATE_TYPE, id);
        let events = self
            .events
            .load(stream_id)?
            .iter()
            .map(decode_domain_event::<A>)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            instance_id = %id,
            version = events.len(),
            "aggregate loaded"
        );
        Ok(AggregateRoot::from_history(&events))
    }

    /// Append the aggregate's staged events and mark them committed.
    ///
    /// The append expects the stream to still have the length the aggregate
    /// was loaded at. Returns the new stream length; with nothing staged
    /// this is a no-op returning the current version.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConcurrencyConflict`] if another writer appended to the
    /// stream in the meantime. The staged events are kept; reload and retry
    /// the command.
    pub fn save<A: Aggregate>(
        &self,
        root: &mut AggregateRoot<A>,
        ctx: &CommandContext,
    ) -> Result<u64, StoreError> {
        if root.uncommitted_events().is_empty() {
            return Ok(root.version());
        }

        let id = root.id();
        let stream_id = stream_uuid(A::AGGREGATE_TYPE, id);
        let proposed = root
            .uncommitted_events()
            .iter()
            .map(|event| encode_domain_event::<A>(event, ctx, id))
            .collect::<Result<Vec<_>, _>>()?;
        let count = proposed.len();

        let expected = ExpectedVersion::for_version(root.version());
        let version = self.events.append(stream_id, expected, proposed)?;
        root.mark_committed();

        tracing::info!(
            aggregate_type = A::AGGREGATE_TYPE,
            instance_id = %id,
            count,
            version,
            "events appended"
        );
        Ok(version)
    }

    /// Load `id`, run `command` against it, and save what it staged.
    ///
    /// Returns the aggregate as persisted.
    ///
    /// # Errors
    ///
    /// [`ExecuteError::Command`] if the command rejects (nothing is
    /// written), [`ExecuteError::Store`] if loading or appending fails.
    pub fn execute<A, F>(
        &self,
        id: Uuid,
        ctx: &CommandContext,
        command: F,
    ) -> Result<AggregateRoot<A>, ExecuteError>
    where
        A: Aggregate,
        F: FnOnce(&mut AggregateRoot<A>) -> Result<(), CommandError>,
    {
        let span = tracing::info_span!(
            "execute",
            aggregate_type = A::AGGREGATE_TYPE,
            instance_id = %id
        );
        let _enter = span.enter();

        let mut root = self.load::<A>(id)?;
        if let Err(e) = command(&mut root) {
            tracing::debug!(code = %e.code, message = %e.message, "command rejected");
            return Err(e.into());
        }
        self.save(&mut root, ctx)?;
        Ok(root)
    }
}
