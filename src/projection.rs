//! Cross-stream projections (read models) backed by the global event log.
//!
//! A projection consumes events from every aggregate stream through
//! [`EventStore::subscribe_all_from`] and keeps a single global cursor
//! position, which makes catch-up and checkpointing a matter of remembering
//! one number.

use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};

use crate::error::{CatchUpError, ProjectionError, StoreError};
use crate::event::StoredEvent;
use crate::storage::{EventStore, FeedMessage};

/// A cross-stream read model that consumes events from the global log.
///
/// # Contract
///
/// - [`apply`](Projection::apply) must be deterministic: given the same
///   sequence of events, it must produce the same state.
/// - Events of aggregate types or event types the projection does not track
///   are ignored. Filtering on `event.aggregate_type()` or
///   `event.event_type` happens in the method body.
/// - On `Err` the state must be left exactly as it was before the call.
pub trait Projection:
    Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Human-readable name, used as a directory name for checkpoints.
    const NAME: &'static str;

    /// Apply a single event from the global log.
    ///
    /// # Errors
    ///
    /// [`ProjectionError`] when a tracked event cannot be decoded or would
    /// break one of the projection's invariants.
    fn apply(&mut self, event: &StoredEvent) -> Result<(), ProjectionError>;
}

/// Persisted state of a projection including the global cursor position.
///
/// Serialized to JSON as `{ "state": <P>, "last_global_position": <N> }`.
/// The `last_global_position` field is a resume token: the next global
/// position to read from. A value of `0` means "start from the beginning."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionCheckpoint<P> {
    /// The projection's current state.
    pub state: P,
    /// Resume token: the next global position to read from.
    ///
    /// After processing an event at global position N, this is set to N + 1.
    pub last_global_position: u64,
}

impl<P: Default> Default for ProjectionCheckpoint<P> {
    fn default() -> Self {
        Self {
            state: P::default(),
            last_global_position: 0,
        }
    }
}

const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Save a projection checkpoint atomically.
///
/// Writes to a temporary file then renames to `checkpoint.json` in `dir`.
/// Creates `dir` if it does not exist.
///
/// # Errors
///
/// Returns `io::Error` if directory creation, file writing, or renaming fails.
pub fn save_checkpoint<P: Projection>(
    dir: &Path,
    checkpoint: &ProjectionCheckpoint<P>,
) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(CHECKPOINT_FILE);
    let tmp_path = dir.join("checkpoint.json.tmp");
    let json = serde_json::to_string_pretty(checkpoint).map_err(io::Error::other)?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Load a projection checkpoint from disk.
///
/// Returns `Ok(None)` if the file does not exist or is corrupt.
/// A corrupt checkpoint is not a hard error -- the projection will rebuild.
///
/// # Errors
///
/// Returns `io::Error` for I/O failures other than file-not-found.
pub fn load_checkpoint<P: Projection>(dir: &Path) -> io::Result<Option<ProjectionCheckpoint<P>>> {
    let path = dir.join(CHECKPOINT_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                tracing::warn!(
                    projection = P::NAME,
                    path = %path.display(),
                    error = %e,
                    "corrupt projection checkpoint, will rebuild"
                );
                Ok(None)
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Drives a single [`Projection`]: owns its checkpoint, applies events in
/// global order exactly once, and persists the checkpoint on request.
#[derive(Debug, Clone)]
pub struct ProjectionRunner<P: Projection> {
    checkpoint: ProjectionCheckpoint<P>,
    /// Directory of this projection's checkpoint file. `None` keeps the
    /// projection in memory only.
    checkpoint_dir: Option<PathBuf>,
}

impl<P: Projection> ProjectionRunner<P> {
    /// Create a runner, resuming from the checkpoint in `checkpoint_dir` if
    /// one exists.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if reading an existing checkpoint file fails
    /// (other than file-not-found).
    pub fn new(checkpoint_dir: Option<PathBuf>) -> io::Result<Self> {
        let checkpoint = match &checkpoint_dir {
            Some(dir) => load_checkpoint::<P>(dir)?.unwrap_or_default(),
            None => ProjectionCheckpoint::default(),
        };
        if checkpoint.last_global_position > 0 {
            tracing::info!(
                projection = P::NAME,
                position = checkpoint.last_global_position,
                "resuming projection from checkpoint"
            );
        }
        Ok(Self {
            checkpoint,
            checkpoint_dir,
        })
    }

    /// Returns the current projection state.
    pub fn state(&self) -> &P {
        &self.checkpoint.state
    }

    /// Returns the current global cursor position (resume token).
    pub fn position(&self) -> u64 {
        self.checkpoint.last_global_position
    }

    /// Apply one event from the global log and advance the cursor past it.
    ///
    /// Events below the cursor were already applied and are skipped.
    ///
    /// # Errors
    ///
    /// Propagates the projection's error; the cursor does not move.
    pub fn apply_event(&mut self, event: &StoredEvent) -> Result<(), ProjectionError> {
        if event.global_position < self.checkpoint.last_global_position {
            return Ok(());
        }

        if let Err(e) = self.checkpoint.state.apply(event) {
            tracing::error!(
                projection = P::NAME,
                global_position = event.global_position,
                event_type = %event.event_type,
                error = %e,
                "projection rejected event"
            );
            return Err(e);
        }
        tracing::debug!(
            projection = P::NAME,
            global_position = event.global_position,
            event_type = %event.event_type,
            "event applied"
        );

        self.checkpoint.last_global_position = event.global_position + 1;
        Ok(())
    }

    /// Pull every event from the cursor up to the current end of the log,
    /// then save the checkpoint.
    ///
    /// Returns the number of events applied.
    ///
    /// # Errors
    ///
    /// Fails on subscription errors, projection errors, and checkpoint
    /// write errors. Events applied before the failure stay applied.
    pub async fn catch_up<S: EventStore + ?Sized>(&mut self, store: &S) -> Result<u64, CatchUpError> {
        tracing::debug!(
            projection = P::NAME,
            from = self.position(),
            "starting projection catch-up"
        );
        let feed = store.subscribe_all_from(self.position())?;
        let applied = self.process_feed(feed).await?;
        self.save()?;
        tracing::debug!(projection = P::NAME, applied, "caught up");
        Ok(applied)
    }

    /// Apply feed messages until the `CaughtUp` sentinel or end of stream.
    ///
    /// Factored out of [`catch_up`](Self::catch_up) so tests can feed a
    /// hand-built stream.
    async fn process_feed(
        &mut self,
        mut feed: impl Stream<Item = Result<FeedMessage, StoreError>> + Unpin,
    ) -> Result<u64, CatchUpError> {
        let mut applied = 0;
        while let Some(message) = feed.next().await {
            match message? {
                FeedMessage::Event(event) => {
                    let before = self.position();
                    self.apply_event(&event)?;
                    if self.position() != before {
                        applied += 1;
                    }
                }
                FeedMessage::CaughtUp => break,
            }
        }
        Ok(applied)
    }

    /// Persist the checkpoint. A no-op for in-memory runners.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if writing the checkpoint fails.
    pub fn save(&self) -> io::Result<()> {
        match &self.checkpoint_dir {
            Some(dir) => save_checkpoint::<P>(dir, &self.checkpoint),
            None => Ok(()),
        }
    }
}
