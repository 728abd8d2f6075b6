//! [`AddressRegistry`]: the aggregate store and the address projection,
//! wired together and kept current by the live loop.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::command::CommandContext;
use crate::domain::AddressProjection;
use crate::error::{CatchUpError, CommandError, ExecuteError, StoreError};
use crate::live::{LiveConfig, LiveHandle, SharedProjection, start_live};
use crate::projection::{Projection, ProjectionRunner};
use crate::storage::EventStore;
use crate::store::AggregateStore;

/// An opened address registry.
///
/// Commands read their existence sets and key owners from the projection as
/// it stands when the command runs, so a reference to an entity created a
/// moment ago is only accepted once the projection has seen it. Use
/// [`sync`](AddressRegistry::sync) to wait for that.
#[derive(Debug)]
pub struct AddressRegistry<S: EventStore> {
    aggregates: AggregateStore<S>,
    projection: SharedProjection<AddressProjection>,
    live: LiveHandle,
}

impl<S: EventStore> AddressRegistry<S> {
    pub fn builder(store: S) -> AddressRegistryBuilder<S> {
        AddressRegistryBuilder::new(store)
    }

    pub fn aggregates(&self) -> &AggregateStore<S> {
        &self.aggregates
    }

    pub fn projection(&self) -> &SharedProjection<AddressProjection> {
        &self.projection
    }

    pub fn live(&self) -> &LiveHandle {
        &self.live
    }

    /// Load `id`, run `command` against the current projection, and save
    /// what it staged.
    ///
    /// The projection is borrowed in place while `command` runs, which holds
    /// off the live loop; the borrow ends before the events are appended.
    /// `command` must not read [`projection`](Self::projection) itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use address_registry_es::{AddressRegistry, CommandContext, InMemoryEventStore, PostCode};
    /// use uuid::Uuid;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let registry = AddressRegistry::builder(InMemoryEventStore::new()).open().await?;
    /// let id = Uuid::new_v4();
    /// registry.execute::<PostCode, _>(id, &CommandContext::default(), |root, projection| {
    ///     root.create(id, "7000", "Fredericia", projection.post_code_numbers())
    /// })?;
    ///
    /// registry.sync().await?;
    /// let projection = registry.projection().snapshot();
    /// assert_eq!(projection.post_code_id_by_number("7000"), Some(id));
    /// registry.shutdown().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// As [`AggregateStore::execute`].
    pub fn execute<A, F>(
        &self,
        id: Uuid,
        ctx: &CommandContext,
        command: F,
    ) -> Result<AggregateRoot<A>, ExecuteError>
    where
        A: Aggregate,
        F: FnOnce(&mut AggregateRoot<A>, &AddressProjection) -> Result<(), CommandError>,
    {
        self.aggregates.execute::<A, _>(id, ctx, |root| {
            self.projection
                .with_state(move |projection| command(root, projection))
        })
    }

    /// Wait until the projection has applied every event that is in the
    /// log right now.
    ///
    /// Returns `Ok(false)` if the live loop stopped first; call
    /// [`shutdown`](Self::shutdown) to learn why.
    ///
    /// # Errors
    ///
    /// Reading the tail of the log failed.
    pub async fn sync(&self) -> Result<bool, StoreError> {
        let pending = self
            .aggregates
            .event_store()
            .read_all_from(self.projection.position())?;
        match pending.last() {
            Some(last) => Ok(self.live.wait_for_position(last.global_position + 1).await),
            None => Ok(true),
        }
    }

    /// Stop the live loop and save the final checkpoint.
    ///
    /// # Errors
    ///
    /// As [`LiveHandle::shutdown`].
    pub async fn shutdown(&self) -> Result<(), CatchUpError> {
        self.live.shutdown().await
    }
}

/// Builder for opening an [`AddressRegistry`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use address_registry_es::{AddressRegistry, InMemoryEventStore, LiveConfig};
///
/// # async fn example() -> Result<(), address_registry_es::CatchUpError> {
/// let registry = AddressRegistry::builder(InMemoryEventStore::new())
///     .checkpoint_dir("/var/lib/address-registry")
///     .live_config(LiveConfig {
///         checkpoint_interval: Duration::from_secs(30),
///         ..LiveConfig::default()
///     })
///     .open()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AddressRegistryBuilder<S> {
    store: S,
    checkpoint_dir: Option<PathBuf>,
    live_config: LiveConfig,
}

impl<S: EventStore> AddressRegistryBuilder<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            checkpoint_dir: None,
            live_config: LiveConfig::default(),
        }
    }

    /// Root directory for projection checkpoints. Without one, the
    /// projection is rebuilt from the log on every open.
    pub fn checkpoint_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.checkpoint_dir = Some(path.as_ref().to_owned());
        self
    }

    pub fn live_config(mut self, config: LiveConfig) -> Self {
        self.live_config = config;
        self
    }

    /// Load the projection checkpoint, catch up with the log, and start the
    /// live loop.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Reading the checkpoint, reading the log, or applying an event failed.
    pub async fn open(self) -> Result<AddressRegistry<S>, CatchUpError> {
        let aggregates = AggregateStore::new(self.store);
        let projection_dir = self
            .checkpoint_dir
            .map(|dir| dir.join(AddressProjection::NAME));

        let mut runner = ProjectionRunner::<AddressProjection>::new(projection_dir)?;
        let applied = runner.catch_up(aggregates.event_store()).await?;
        tracing::info!(
            projection = AddressProjection::NAME,
            applied,
            position = runner.position(),
            "address registry opened"
        );

        let projection = SharedProjection::new(runner);
        let live = start_live(
            projection.clone(),
            aggregates.shared_event_store(),
            self.live_config,
        );

        Ok(AddressRegistry {
            aggregates,
            projection,
            live,
        })
    }
}
