//! Event log abstraction and the built-in in-memory backend.
//!
//! The event log is an external collaborator: durable backends implement
//! [`EventStore`] elsewhere. [`InMemoryEventStore`] provides the same
//! contract (per-stream ordering, optimistic concurrency, a global
//! restartable feed) for tests and single-process use.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::error::StoreError;
use crate::event::{ProposedEventData, StoredEvent};

/// Default number of live events buffered per subscriber before it lags.
const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Expected stream state for optimistic concurrency on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Accept any current stream length (no concurrency check).
    Any,
    /// The stream must not contain any events yet.
    NoStream,
    /// The stream must contain exactly this many events.
    Exact(u64),
}

impl ExpectedVersion {
    /// Whether a stream currently holding `len` events satisfies this
    /// expectation.
    pub fn matches(self, len: u64) -> bool {
        match self {
            Self::Any => true,
            Self::NoStream => len == 0,
            Self::Exact(expected) => len == expected,
        }
    }

    /// The expectation for an aggregate loaded at `version`.
    pub fn for_version(version: u64) -> Self {
        if version == 0 {
            Self::NoStream
        } else {
            Self::Exact(version)
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(len) => write!(f, "length {len}"),
        }
    }
}

/// One item of the global event feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A persisted event, in global order.
    Event(StoredEvent),
    /// All events persisted before the subscription was opened have been
    /// delivered; everything after this is live.
    CaughtUp,
}

/// A lazy, ordered feed of persisted events across all streams.
pub type EventFeed = Pin<Box<dyn Stream<Item = Result<FeedMessage, StoreError>> + Send>>;

/// Append-only, per-stream ordered event storage.
///
/// # Contract
///
/// - `append` is atomic: either every event in the batch is persisted, in
///   order, or none is.
/// - Events of one stream are returned by `load` in append order.
/// - Global positions are dense, zero-based and assigned in persistence
///   order across all streams.
/// - `subscribe_all_from(p)` yields every event with global position
///   `>= p` exactly once, then [`FeedMessage::CaughtUp`], then live events.
pub trait EventStore: Send + Sync + 'static {
    /// Append `events` to `stream_id` if the stream matches `expected`.
    ///
    /// Returns the new stream length.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConcurrencyConflict`] if the stream length does not
    /// match `expected`; nothing is written in that case.
    fn append(
        &self,
        stream_id: Uuid,
        expected: ExpectedVersion,
        events: Vec<ProposedEventData>,
    ) -> Result<u64, StoreError>;

    /// All events of one stream, in append order. Empty if the stream
    /// does not exist.
    fn load(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, StoreError>;

    /// All events with global position `>= position`, in global order.
    fn read_all_from(&self, position: u64) -> Result<Vec<StoredEvent>, StoreError>;

    /// Open a global feed starting at `position`.
    fn subscribe_all_from(&self, position: u64) -> Result<EventFeed, StoreError>;
}

#[derive(Default)]
struct Log {
    events: Vec<StoredEvent>,
    /// Global positions of each stream's events, in stream order.
    streams: HashMap<Uuid, Vec<usize>>,
}

/// Process-local [`EventStore`] backed by a vector and a broadcast channel.
///
/// `Clone` is cheap; clones share the same log.
#[derive(Clone)]
pub struct InMemoryEventStore {
    log: Arc<Mutex<Log>>,
    live: broadcast::Sender<StoredEvent>,
}

impl fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("events", &self.lock().events.len())
            .finish()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Create a store whose live subscribers may fall `capacity` events
    /// behind before receiving [`StoreError::Lagged`].
    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity.max(1));
        Self {
            log: Arc::new(Mutex::new(Log::default())),
            live,
        }
    }

    /// Total number of persisted events.
    pub fn len(&self) -> u64 {
        self.lock().events.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        stream_id: Uuid,
        expected: ExpectedVersion,
        events: Vec<ProposedEventData>,
    ) -> Result<u64, StoreError> {
        let mut log = self.lock();
        let current = log.streams.get(&stream_id).map_or(0, Vec::len) as u64;

        if !expected.matches(current) {
            return Err(StoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual: current,
            });
        }

        let recorded_at = now_millis();
        let count = events.len() as u64;
        for (offset, proposed) in events.into_iter().enumerate() {
            let global_position = log.events.len();
            let stored = StoredEvent {
                event_id: proposed.event_id,
                stream_id,
                stream_version: current + offset as u64,
                global_position: global_position as u64,
                event_type: proposed.event_type,
                payload: proposed.payload,
                metadata: proposed.metadata,
                recorded_at,
            };
            log.streams.entry(stream_id).or_default().push(global_position);
            // Published under the lock so subscribers opened concurrently
            // see each event either in their history or live, never both.
            let _ = self.live.send(stored.clone());
            log.events.push(stored);
        }

        tracing::debug!(%stream_id, count, "events appended to in-memory log");
        Ok(current + count)
    }

    fn load(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
        let log = self.lock();
        let events = log
            .streams
            .get(&stream_id)
            .map(|positions| positions.iter().map(|&p| log.events[p].clone()).collect())
            .unwrap_or_default();
        Ok(events)
    }

    fn read_all_from(&self, position: u64) -> Result<Vec<StoredEvent>, StoreError> {
        let log = self.lock();
        let start = (position as usize).min(log.events.len());
        Ok(log.events[start..].to_vec())
    }

    fn subscribe_all_from(&self, position: u64) -> Result<EventFeed, StoreError> {
        let (history, live_from, rx) = {
            let log = self.lock();
            let rx = self.live.subscribe();
            let start = (position as usize).min(log.events.len());
            (
                log.events[start..].to_vec(),
                (log.events.len() as u64).max(position),
                rx,
            )
        };

        let history = tokio_stream::iter(history.into_iter().map(|e| Ok(FeedMessage::Event(e))));
        let caught_up = tokio_stream::once(Ok(FeedMessage::CaughtUp));
        let live = BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(event) if event.global_position >= live_from => Some(Ok(FeedMessage::Event(event))),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                Some(Err(StoreError::Lagged { skipped }))
            }
        });

        Ok(Box::pin(history.chain(caught_up).chain(live)))
    }
}
