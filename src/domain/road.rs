//! Road aggregate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::domain::rules;
use crate::error::CommandError;

/// Lifecycle status of a road as reported by the official register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadStatus {
    #[default]
    Temporary,
    Effective,
}

/// A named road.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Road {
    pub id: Uuid,
    /// Identifier assigned by the official road register.
    pub official_id: String,
    pub name: String,
    pub status: RoadStatus,
    pub deleted: bool,
}

/// Domain events produced by the [`Road`] aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoadEvent {
    RoadCreated {
        id: Uuid,
        official_id: String,
        name: String,
        status: RoadStatus,
    },
    RoadUpdated {
        id: Uuid,
        official_id: String,
        name: String,
        status: RoadStatus,
    },
    RoadDeleted {
        id: Uuid,
    },
}

impl Aggregate for Road {
    const AGGREGATE_TYPE: &'static str = "road";
    type DomainEvent = RoadEvent;

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn apply(mut self, event: &RoadEvent) -> Self {
        match event {
            RoadEvent::RoadCreated {
                id,
                official_id,
                name,
                status,
            } => {
                self.id = *id;
                self.official_id = official_id.clone();
                self.name = name.clone();
                self.status = *status;
            }
            RoadEvent::RoadUpdated {
                official_id,
                name,
                status,
                ..
            } => {
                self.official_id = official_id.clone();
                self.name = name.clone();
                self.status = *status;
            }
            RoadEvent::RoadDeleted { .. } => {
                self.deleted = true;
            }
        }
        self
    }
}

impl AggregateRoot<Road> {
    /// `official_ids` maps the official ids already in use to their roads.
    ///
    /// # Errors
    ///
    /// `InvalidIdentifier`, `RequiredFieldMissing` (official_id),
    /// `DuplicateKey` (official_id), `AlreadyCreated`.
    pub fn create(
        &mut self,
        id: Uuid,
        official_id: &str,
        name: &str,
        status: RoadStatus,
        official_ids: &HashMap<String, Uuid>,
    ) -> Result<(), CommandError> {
        rules::identifier(id)?;
        rules::required(official_id, "official_id")?;
        rules::unique(official_id, official_ids, id, "official_id")?;
        rules::not_created(self)?;

        self.raise(RoadEvent::RoadCreated {
            id,
            official_id: official_id.to_string(),
            name: name.to_string(),
            status,
        });
        Ok(())
    }

    /// Replace every mutable field of the road.
    ///
    /// # Errors
    ///
    /// `RequiredFieldMissing`, `DuplicateKey`, `NotInitialized`,
    /// `CannotUpdateDeleted`, `NoChanges`.
    pub fn update(
        &mut self,
        official_id: &str,
        name: &str,
        status: RoadStatus,
        official_ids: &HashMap<String, Uuid>,
    ) -> Result<(), CommandError> {
        rules::required(official_id, "official_id")?;
        rules::unique(official_id, official_ids, self.id(), "official_id")?;
        rules::updatable(self)?;
        let current = self.state();
        rules::changed(
            self,
            current.official_id != official_id || current.name != name || current.status != status,
        )?;

        self.raise(RoadEvent::RoadUpdated {
            id: self.id(),
            official_id: official_id.to_string(),
            name: name.to_string(),
            status,
        });
        Ok(())
    }

    /// # Errors
    ///
    /// `NotInitialized`, `AlreadyDeleted`.
    pub fn delete(&mut self) -> Result<(), CommandError> {
        rules::deletable(self)?;
        self.raise(RoadEvent::RoadDeleted { id: self.id() });
        Ok(())
    }
}
