//! PostCode aggregate -- postal districts referenced by access addresses.
//!
//! The number is fixed at creation; only the name can change afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::domain::rules;
use crate::error::CommandError;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A postal district.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostCode {
    pub id: Uuid,
    /// Postal number, e.g. "7000".
    pub number: String,
    /// District name, e.g. "Fredericia".
    pub name: String,
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Domain events produced by the [`PostCode`] aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PostCodeEvent {
    PostCodeCreated {
        id: Uuid,
        number: String,
        name: String,
    },
    PostCodeUpdated {
        id: Uuid,
        name: String,
    },
    PostCodeDeleted {
        id: Uuid,
    },
}

// ---------------------------------------------------------------------------
// Aggregate impl
// ---------------------------------------------------------------------------

impl Aggregate for PostCode {
    const AGGREGATE_TYPE: &'static str = "post-code";
    type DomainEvent = PostCodeEvent;

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn apply(mut self, event: &PostCodeEvent) -> Self {
        match event {
            PostCodeEvent::PostCodeCreated { id, number, name } => {
                self.id = *id;
                self.number = number.clone();
                self.name = name.clone();
            }
            PostCodeEvent::PostCodeUpdated { name, .. } => {
                self.name = name.clone();
            }
            PostCodeEvent::PostCodeDeleted { .. } => {
                self.deleted = true;
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

impl AggregateRoot<PostCode> {
    /// Create the post code.
    ///
    /// `numbers` maps the numbers already in use to their post codes.
    ///
    /// # Errors
    ///
    /// `InvalidIdentifier`, `RequiredFieldMissing` (number, name),
    /// `DuplicateKey` (number), `AlreadyCreated`.
    pub fn create(
        &mut self,
        id: Uuid,
        number: &str,
        name: &str,
        numbers: &HashMap<String, Uuid>,
    ) -> Result<(), CommandError> {
        rules::identifier(id)?;
        rules::required(number, "number")?;
        rules::required(name, "name")?;
        rules::unique(number, numbers, id, "number")?;
        rules::not_created(self)?;

        self.raise(PostCodeEvent::PostCodeCreated {
            id,
            number: number.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    /// Rename the post code.
    ///
    /// # Errors
    ///
    /// `RequiredFieldMissing`, `NotInitialized`, `CannotUpdateDeleted`,
    /// `NoChanges`.
    pub fn update(&mut self, name: &str) -> Result<(), CommandError> {
        rules::required(name, "name")?;
        rules::updatable(self)?;
        rules::changed(self, self.state().name != name)?;

        self.raise(PostCodeEvent::PostCodeUpdated {
            id: self.id(),
            name: name.to_string(),
        });
        Ok(())
    }

    /// Mark the post code deleted.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `AlreadyDeleted`.
    pub fn delete(&mut self) -> Result<(), CommandError> {
        rules::deletable(self)?;
        self.raise(PostCodeEvent::PostCodeDeleted { id: self.id() });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
