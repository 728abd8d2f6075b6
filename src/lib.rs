//! Event-sourced address registry: access addresses, unit addresses, roads
//! and post codes, with an incrementally maintained lookup projection.

mod aggregate;
pub use aggregate::{Aggregate, AggregateRoot, replay};
mod command;
pub mod domain;
mod error;
mod event;
mod live;
mod projection;
mod registry;
mod storage;
mod store;

pub use command::CommandContext;
pub use domain::{
    AccessAddress, AccessAddressDetails, AccessAddressEvent, AccessAddressRefs,
    AccessAddressStatus, AddressProjection, PostCode, PostCodeEvent, Road, RoadEvent, RoadStatus, UnitAddress,
    UnitAddressDetails, UnitAddressEvent, UnitAddressStatus,
};
pub use error::{CatchUpError, CommandError, ErrorCode, ExecuteError, ProjectionError, StoreError};
pub use event::{
    EventMetadata, ProposedEventData, StoredEvent, decode_domain_event, encode_domain_event,
    stream_uuid,
};
pub use live::{LiveConfig, LiveHandle, SharedProjection};
pub use projection::{
    Projection, ProjectionCheckpoint, ProjectionRunner, load_checkpoint, save_checkpoint,
};
pub use registry::{AddressRegistry, AddressRegistryBuilder};
pub use storage::{EventFeed, EventStore, ExpectedVersion, FeedMessage, InMemoryEventStore};
pub use store::AggregateStore;
