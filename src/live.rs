//! Live subscription: keeps a projection current with the global feed.
//!
//! [`LiveConfig`] tunes checkpointing and resubscription, [`SharedProjection`]
//! is the single-writer cell the loop applies events to, and [`LiveHandle`]
//! controls the background task.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio_stream::StreamExt;

use crate::error::{CatchUpError, ProjectionError, StoreError};
use crate::event::StoredEvent;
use crate::projection::{Projection, ProjectionRunner};
use crate::storage::{EventFeed, EventStore, FeedMessage};

/// Configuration for live subscription behaviour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use address_registry_es::LiveConfig;
///
/// let config = LiveConfig {
///     checkpoint_interval: Duration::from_secs(10),
///     ..LiveConfig::default()
/// };
/// assert_eq!(config.checkpoint_interval, Duration::from_secs(10));
/// assert_eq!(config.reconnect_base_delay, Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// How often to flush the projection checkpoint to disk while live.
    ///
    /// Checkpoints are also saved on shutdown and whenever the feed is
    /// resubscribed.
    ///
    /// Default: 5 seconds.
    pub checkpoint_interval: Duration,

    /// Base delay for exponential backoff when resubscribing after the feed
    /// lagged or failed. Reaching `CaughtUp` resets the backoff.
    ///
    /// Default: 100 milliseconds.
    pub reconnect_base_delay: Duration,

    /// Maximum delay between resubscription attempts.
    ///
    /// Default: 30 seconds.
    pub reconnect_max_delay: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: Duration::from_secs(5),
            reconnect_base_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

/// A projection runner shared between the live loop (the only writer) and
/// any number of readers.
///
/// `Clone` is cheap. The lock is never held across an `.await`.
#[derive(Debug)]
pub struct SharedProjection<P: Projection> {
    runner: Arc<RwLock<ProjectionRunner<P>>>,
}

impl<P: Projection> Clone for SharedProjection<P> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<P: Projection> SharedProjection<P> {
    pub fn new(runner: ProjectionRunner<P>) -> Self {
        Self {
            runner: Arc::new(RwLock::new(runner)),
        }
    }

    /// A clone of the current projection state.
    pub fn snapshot(&self) -> P {
        self.with_state(P::clone)
    }

    /// Borrow the current state for the duration of `f`.
    ///
    /// Blocks the live loop while `f` runs; keep it short.
    pub fn with_state<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        let runner = self.runner.read().unwrap_or_else(PoisonError::into_inner);
        f(runner.state())
    }

    /// The next global position the projection expects.
    pub fn position(&self) -> u64 {
        self.runner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .position()
    }

    fn apply_event(&self, event: &StoredEvent) -> Result<u64, ProjectionError> {
        let mut runner = self.runner.write().unwrap_or_else(PoisonError::into_inner);
        runner.apply_event(event)?;
        Ok(runner.position())
    }

    fn save(&self) -> io::Result<()> {
        self.runner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .save()
    }
}

/// Handle for controlling the live subscription loop.
///
/// Call [`shutdown`](LiveHandle::shutdown) for graceful termination; it
/// waits for the final checkpoint save and reports why the loop stopped.
/// Dropping every clone of the handle also stops the loop, without waiting.
///
/// `Clone` is cheap: all fields are `Arc`-wrapped or channel handles.
#[derive(Debug, Clone)]
pub struct LiveHandle {
    shutdown_tx: watch::Sender<bool>,
    caught_up: Arc<AtomicBool>,
    position_rx: watch::Receiver<u64>,
    task: Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<Result<(), CatchUpError>>>>>,
}

impl LiveHandle {
    /// Returns `true` once the loop has received a `CaughtUp` sentinel.
    pub fn is_caught_up(&self) -> bool {
        self.caught_up.load(Ordering::Acquire)
    }

    /// Wait until the projection has applied every event below `position`.
    ///
    /// Returns `false` if the live loop stopped before getting there.
    pub async fn wait_for_position(&self, position: u64) -> bool {
        let mut rx = self.position_rx.clone();
        rx.wait_for(|&current| current >= position).await.is_ok()
    }

    /// Signal the live loop to stop and wait for its final checkpoint save.
    ///
    /// Calling `shutdown` more than once is safe -- subsequent calls
    /// return `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// The error that stopped the loop, if it stopped on its own because the
    /// projection rejected an event, or a task join failure.
    pub async fn shutdown(&self) -> Result<(), CatchUpError> {
        // The receiver is gone if the task already exited.
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().await.take();
        match task {
            Some(join_handle) => join_handle.await?,
            None => Ok(()),
        }
    }
}

/// Spawn the live loop for `projection` on the current tokio runtime.
pub(crate) fn start_live<P, S>(
    projection: SharedProjection<P>,
    store: Arc<S>,
    config: LiveConfig,
) -> LiveHandle
where
    P: Projection,
    S: EventStore,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (position_tx, position_rx) = watch::channel(projection.position());
    let caught_up = Arc::new(AtomicBool::new(false));

    let task = tokio::spawn(run_live_loop(
        projection,
        store,
        config,
        Arc::clone(&caught_up),
        position_tx,
        shutdown_rx,
    ));

    LiveHandle {
        shutdown_tx,
        caught_up,
        position_rx,
        task: Arc::new(tokio::sync::Mutex::new(Some(task))),
    }
}

fn save_checkpoint<P: Projection>(projection: &SharedProjection<P>) {
    if let Err(e) = projection.save() {
        tracing::error!(
            projection = P::NAME,
            error = %e,
            "failed to save projection checkpoint"
        );
    }
}

/// Apply feed messages until the feed ends or fails.
///
/// Publishes the position after every applied event and resets `backoff`
/// once the historical part of the feed has been drained.
async fn follow_feed<P: Projection>(
    projection: &SharedProjection<P>,
    mut feed: EventFeed,
    caught_up: &AtomicBool,
    position_tx: &watch::Sender<u64>,
    backoff: &mut Duration,
    base_delay: Duration,
) -> Result<(), CatchUpError> {
    while let Some(message) = feed.next().await {
        match message? {
            FeedMessage::Event(event) => {
                let position = projection.apply_event(&event)?;
                position_tx.send_replace(position);
            }
            FeedMessage::CaughtUp => {
                if !caught_up.swap(true, Ordering::AcqRel) {
                    tracing::info!(
                        projection = P::NAME,
                        position = projection.position(),
                        "live loop: caught up"
                    );
                }
                *backoff = base_delay;
            }
        }
    }
    Ok(())
}

/// Run the live subscription loop until shutdown or a projection error.
///
/// Subscribes from the projection's own position, applies every event,
/// checkpoints periodically, and resubscribes with exponential backoff when
/// the feed lags or fails. A projection error stops the loop: the offending
/// event is not skipped.
async fn run_live_loop<P, S>(
    projection: SharedProjection<P>,
    store: Arc<S>,
    config: LiveConfig,
    caught_up: Arc<AtomicBool>,
    position_tx: watch::Sender<u64>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), CatchUpError>
where
    P: Projection,
    S: EventStore,
{
    let mut backoff = config.reconnect_base_delay;
    let mut checkpoint_interval = tokio::time::interval(config.checkpoint_interval);
    // The first tick completes immediately; consume it.
    checkpoint_interval.tick().await;

    loop {
        if *shutdown_rx.borrow() {
            save_checkpoint(&projection);
            return Ok(());
        }

        let from_position = projection.position();
        tracing::info!(projection = P::NAME, from_position, "live loop: subscribing");

        let outcome = match store.subscribe_all_from(from_position) {
            Ok(feed) => {
                let feed_fut = follow_feed(
                    &projection,
                    feed,
                    &caught_up,
                    &position_tx,
                    &mut backoff,
                    config.reconnect_base_delay,
                );
                tokio::pin!(feed_fut);

                loop {
                    tokio::select! {
                        result = &mut feed_fut => {
                            break result;
                        }
                        _ = checkpoint_interval.tick() => {
                            save_checkpoint(&projection);
                        }
                        _ = shutdown_rx.changed() => {
                            save_checkpoint(&projection);
                            return Ok(());
                        }
                    }
                }
            }
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(projection = P::NAME, "live loop: feed ended, resubscribing");
                save_checkpoint(&projection);
                continue;
            }
            Err(CatchUpError::Store(StoreError::Lagged { skipped })) => {
                tracing::warn!(
                    projection = P::NAME,
                    skipped,
                    "live loop: feed lagged, resubscribing from checkpoint"
                );
            }
            Err(CatchUpError::Store(e)) => {
                tracing::error!(
                    projection = P::NAME,
                    error = %e,
                    "live loop: feed error, will resubscribe"
                );
            }
            Err(e) => {
                tracing::error!(
                    projection = P::NAME,
                    error = %e,
                    "live loop: stopped"
                );
                save_checkpoint(&projection);
                return Err(e);
            }
        }

        save_checkpoint(&projection);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown_rx.changed() => {
                return Ok(());
            }
        }
        backoff = (backoff * 2).min(config.reconnect_max_delay);
    }
}
