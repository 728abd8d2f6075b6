//! UnitAddress aggregate -- a floor/suite inside the building behind an
//! access address.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::domain::rules;
use crate::error::CommandError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitAddressStatus {
    #[default]
    Active,
    Canceled,
    Pending,
    Discontinued,
}

/// The mutable attributes of a unit address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAddressDetails {
    /// Identifier in the official address register, if already assigned.
    pub external_id: Option<String>,
    pub access_address_id: Uuid,
    pub status: UnitAddressStatus,
    pub floor_name: Option<String>,
    pub suite_name: Option<String>,
    pub pending_official: bool,
    pub external_updated_date: Option<DateTime<Utc>>,
}

impl UnitAddressDetails {
    /// Field-wise equality, ignoring `external_updated_date`.
    fn same_content(&self, other: &Self) -> bool {
        Self {
            external_updated_date: None,
            ..self.clone()
        } == Self {
            external_updated_date: None,
            ..other.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAddress {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub access_address_id: Uuid,
    pub status: UnitAddressStatus,
    pub floor_name: Option<String>,
    pub suite_name: Option<String>,
    pub pending_official: bool,
    pub external_created_date: Option<DateTime<Utc>>,
    pub external_updated_date: Option<DateTime<Utc>>,
    pub deleted: bool,
}

impl UnitAddress {
    pub fn details(&self) -> UnitAddressDetails {
        UnitAddressDetails {
            external_id: self.external_id.clone(),
            access_address_id: self.access_address_id,
            status: self.status,
            floor_name: self.floor_name.clone(),
            suite_name: self.suite_name.clone(),
            pending_official: self.pending_official,
            external_updated_date: self.external_updated_date,
        }
    }

    fn set_details(&mut self, details: &UnitAddressDetails) {
        self.external_id = details.external_id.clone();
        self.access_address_id = details.access_address_id;
        self.status = details.status;
        self.floor_name = details.floor_name.clone();
        self.suite_name = details.suite_name.clone();
        self.pending_official = details.pending_official;
        self.external_updated_date = details.external_updated_date;
    }
}

/// Domain events produced by the [`UnitAddress`] aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UnitAddressEvent {
    UnitAddressCreated {
        id: Uuid,
        external_created_date: Option<DateTime<Utc>>,
        details: UnitAddressDetails,
    },
    UnitAddressUpdated {
        id: Uuid,
        details: UnitAddressDetails,
    },
    UnitAddressExternalIdUpdated {
        id: Uuid,
        external_id: Option<String>,
        external_updated_date: Option<DateTime<Utc>>,
    },
    UnitAddressAccessAddressIdUpdated {
        id: Uuid,
        access_address_id: Uuid,
        external_updated_date: Option<DateTime<Utc>>,
    },
    UnitAddressStatusUpdated {
        id: Uuid,
        status: UnitAddressStatus,
        external_updated_date: Option<DateTime<Utc>>,
    },
    UnitAddressFloorNameUpdated {
        id: Uuid,
        floor_name: Option<String>,
        external_updated_date: Option<DateTime<Utc>>,
    },
    UnitAddressSuiteNameUpdated {
        id: Uuid,
        suite_name: Option<String>,
        external_updated_date: Option<DateTime<Utc>>,
    },
    UnitAddressPendingOfficialUpdated {
        id: Uuid,
        pending_official: bool,
        external_updated_date: Option<DateTime<Utc>>,
    },
    UnitAddressDeleted {
        id: Uuid,
        external_updated_date: Option<DateTime<Utc>>,
    },
}

impl Aggregate for UnitAddress {
    const AGGREGATE_TYPE: &'static str = "unit-address";
    type DomainEvent = UnitAddressEvent;

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn apply(mut self, event: &UnitAddressEvent) -> Self {
        use UnitAddressEvent::*;

        match event {
            UnitAddressCreated {
                id,
                external_created_date,
                details,
            } => {
                self.id = *id;
                self.external_created_date = *external_created_date;
                self.set_details(details);
            }
            UnitAddressUpdated { details, .. } => self.set_details(details),
            UnitAddressExternalIdUpdated {
                external_id,
                external_updated_date,
                ..
            } => {
                self.external_id = external_id.clone();
                self.external_updated_date = *external_updated_date;
            }
            UnitAddressAccessAddressIdUpdated {
                access_address_id,
                external_updated_date,
                ..
            } => {
                self.access_address_id = *access_address_id;
                self.external_updated_date = *external_updated_date;
            }
            UnitAddressStatusUpdated {
                status,
                external_updated_date,
                ..
            } => {
                self.status = *status;
                self.external_updated_date = *external_updated_date;
            }
            UnitAddressFloorNameUpdated {
                floor_name,
                external_updated_date,
                ..
            } => {
                self.floor_name = floor_name.clone();
                self.external_updated_date = *external_updated_date;
            }
            UnitAddressSuiteNameUpdated {
                suite_name,
                external_updated_date,
                ..
            } => {
                self.suite_name = suite_name.clone();
                self.external_updated_date = *external_updated_date;
            }
            UnitAddressPendingOfficialUpdated {
                pending_official,
                external_updated_date,
                ..
            } => {
                self.pending_official = *pending_official;
                self.external_updated_date = *external_updated_date;
            }
            UnitAddressDeleted {
                external_updated_date,
                ..
            } => {
                self.deleted = true;
                self.external_updated_date = *external_updated_date;
            }
        }
        self
    }
}

impl AggregateRoot<UnitAddress> {
    /// Create the unit address under an existing access address.
    ///
    /// # Errors
    ///
    /// `InvalidIdentifier`, `ReferenceInvalid` / `ReferenceNotFound`
    /// (access_address_id), `AlreadyCreated`.
    pub fn create(
        &mut self,
        id: Uuid,
        details: UnitAddressDetails,
        external_created_date: Option<DateTime<Utc>>,
        access_address_ids: &HashSet<Uuid>,
    ) -> Result<(), CommandError> {
        rules::identifier(id)?;
        rules::reference(
            details.access_address_id,
            access_address_ids,
            "access_address_id",
        )?;
        rules::not_created(self)?;

        self.raise(UnitAddressEvent::UnitAddressCreated {
            id,
            external_created_date,
            details,
        });
        Ok(())
    }

    /// Replace every mutable attribute.
    ///
    /// # Errors
    ///
    /// `ReferenceInvalid`, `ReferenceNotFound`, `NotInitialized`,
    /// `CannotUpdateDeleted`, `NoChanges`.
    pub fn update(
        &mut self,
        details: UnitAddressDetails,
        access_address_ids: &HashSet<Uuid>,
    ) -> Result<(), CommandError> {
        rules::reference(
            details.access_address_id,
            access_address_ids,
            "access_address_id",
        )?;
        rules::updatable(self)?;
        rules::changed(self, !self.state().details().same_content(&details))?;

        self.raise(UnitAddressEvent::UnitAddressUpdated {
            id: self.id(),
            details,
        });
        Ok(())
    }

    pub fn update_external_id(
        &mut self,
        external_id: Option<String>,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        rules::updatable(self)?;
        rules::changed(self, self.state().external_id != external_id)?;

        self.raise(UnitAddressEvent::UnitAddressExternalIdUpdated {
            id: self.id(),
            external_id,
            external_updated_date,
        });
        Ok(())
    }

    /// Move the unit to another access address.
    ///
    /// # Errors
    ///
    /// `ReferenceInvalid`, `ReferenceNotFound`, `NotInitialized`,
    /// `CannotUpdateDeleted`, `NoChanges`.
    pub fn update_access_address_id(
        &mut self,
        access_address_id: Uuid,
        external_updated_date: Option<DateTime<Utc>>,
        access_address_ids: &HashSet<Uuid>,
    ) -> Result<(), CommandError> {
        rules::reference(access_address_id, access_address_ids, "access_address_id")?;
        rules::updatable(self)?;
        rules::changed(self, self.state().access_address_id != access_address_id)?;

        self.raise(UnitAddressEvent::UnitAddressAccessAddressIdUpdated {
            id: self.id(),
            access_address_id,
            external_updated_date,
        });
        Ok(())
    }

    pub fn update_status(
        &mut self,
        status: UnitAddressStatus,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        rules::updatable(self)?;
        rules::changed(self, self.state().status != status)?;

        self.raise(UnitAddressEvent::UnitAddressStatusUpdated {
            id: self.id(),
            status,
            external_updated_date,
        });
        Ok(())
    }

    pub fn update_floor_name(
        &mut self,
        floor_name: Option<String>,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        rules::updatable(self)?;
        rules::changed(self, self.state().floor_name != floor_name)?;

        self.raise(UnitAddressEvent::UnitAddressFloorNameUpdated {
            id: self.id(),
            floor_name,
            external_updated_date,
        });
        Ok(())
    }

    pub fn update_suite_name(
        &mut self,
        suite_name: Option<String>,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        rules::updatable(self)?;
        rules::changed(self, self.state().suite_name != suite_name)?;

        self.raise(UnitAddressEvent::UnitAddressSuiteNameUpdated {
            id: self.id(),
            suite_name,
            external_updated_date,
        });
        Ok(())
    }

    pub fn update_pending_official(
        &mut self,
        pending_official: bool,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        rules::updatable(self)?;
        rules::changed(self, self.state().pending_official != pending_official)?;

        self.raise(UnitAddressEvent::UnitAddressPendingOfficialUpdated {
            id: self.id(),
            pending_official,
            external_updated_date,
        });
        Ok(())
    }

    /// # Errors
    ///
    /// `NotInitialized`, `AlreadyDeleted`.
    pub fn delete(
        &mut self,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        rules::deletable(self)?;
        self.raise(UnitAddressEvent::UnitAddressDeleted {
            id: self.id(),
            external_updated_date,
        });
        Ok(())
    }
}
