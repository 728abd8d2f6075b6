//! AccessAddress aggregate -- the entrance point of a building, located on
//! a road inside a postal district.
//!
//! Besides a full `update`, every commonly changed attribute has a narrow
//! setter that records only that attribute. Narrow events carry the
//! caller-supplied `external_updated_date` so the change can be dated
//! without consulting the clock.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::domain::rules;
use crate::error::CommandError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessAddressStatus {
    #[default]
    Active,
    Canceled,
    Pending,
    Discontinued,
}

/// The mutable attributes of an access address, as supplied to `create` and
/// `update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessAddressDetails {
    /// Identifier in the official address register, if already assigned.
    pub official_id: Option<String>,
    pub municipal_code: String,
    pub status: AccessAddressStatus,
    pub road_code: String,
    pub house_number: String,
    pub post_code_id: Uuid,
    pub east_coordinate: f64,
    pub north_coordinate: f64,
    pub town_name: Option<String>,
    pub plot_id: Option<String>,
    pub road_id: Uuid,
    /// Created locally and awaiting registration in the official register.
    pub pending_official: bool,
    pub external_updated_date: Option<DateTime<Utc>>,
}

impl AccessAddressDetails {
    /// Field-wise equality, ignoring `external_updated_date`.
    fn same_content(&self, other: &Self) -> bool {
        self.official_id == other.official_id
            && self.municipal_code == other.municipal_code
            && self.status == other.status
            && self.road_code == other.road_code
            && self.house_number == other.house_number
            && self.post_code_id == other.post_code_id
            && self.east_coordinate == other.east_coordinate
            && self.north_coordinate == other.north_coordinate
            && self.town_name == other.town_name
            && self.plot_id == other.plot_id
            && self.road_id == other.road_id
            && self.pending_official == other.pending_official
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessAddress {
    pub id: Uuid,
    pub official_id: Option<String>,
    pub municipal_code: String,
    pub status: AccessAddressStatus,
    pub road_code: String,
    pub house_number: String,
    pub post_code_id: Uuid,
    pub east_coordinate: f64,
    pub north_coordinate: f64,
    pub town_name: Option<String>,
    pub plot_id: Option<String>,
    pub road_id: Uuid,
    pub pending_official: bool,
    pub external_created_date: Option<DateTime<Utc>>,
    pub external_updated_date: Option<DateTime<Utc>>,
    pub deleted: bool,
}

impl AccessAddress {
    /// The current mutable attributes.
    pub fn details(&self) -> AccessAddressDetails {
        AccessAddressDetails {
            official_id: self.official_id.clone(),
            municipal_code: self.municipal_code.clone(),
            status: self.status,
            road_code: self.road_code.clone(),
            house_number: self.house_number.clone(),
            post_code_id: self.post_code_id,
            east_coordinate: self.east_coordinate,
            north_coordinate: self.north_coordinate,
            town_name: self.town_name.clone(),
            plot_id: self.plot_id.clone(),
            road_id: self.road_id,
            pending_official: self.pending_official,
            external_updated_date: self.external_updated_date,
        }
    }

    fn set_details(&mut self, details: &AccessAddressDetails) {
        self.official_id = details.official_id.clone();
        self.municipal_code = details.municipal_code.clone();
        self.status = details.status;
        self.road_code = details.road_code.clone();
        self.house_number = details.house_number.clone();
        self.post_code_id = details.post_code_id;
        self.east_coordinate = details.east_coordinate;
        self.north_coordinate = details.north_coordinate;
        self.town_name = details.town_name.clone();
        self.plot_id = details.plot_id.clone();
        self.road_id = details.road_id;
        self.pending_official = details.pending_official;
        self.external_updated_date = details.external_updated_date;
    }
}

/// Domain events produced by the [`AccessAddress`] aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AccessAddressEvent {
    AccessAddressCreated {
        id: Uuid,
        external_created_date: Option<DateTime<Utc>>,
        details: AccessAddressDetails,
    },
    AccessAddressUpdated {
        id: Uuid,
        details: AccessAddressDetails,
    },
    AccessAddressOfficialIdUpdated {
        id: Uuid,
        official_id: Option<String>,
        external_updated_date: Option<DateTime<Utc>>,
    },
    AccessAddressStatusUpdated {
        id: Uuid,
        status: AccessAddressStatus,
        external_updated_date: Option<DateTime<Utc>>,
    },
    AccessAddressRoadIdUpdated {
        id: Uuid,
        road_id: Uuid,
        external_updated_date: Option<DateTime<Utc>>,
    },
    AccessAddressPostCodeIdUpdated {
        id: Uuid,
        post_code_id: Uuid,
        external_updated_date: Option<DateTime<Utc>>,
    },
    AccessAddressHouseNumberUpdated {
        id: Uuid,
        house_number: String,
        external_updated_date: Option<DateTime<Utc>>,
    },
    AccessAddressLocationUpdated {
        id: Uuid,
        east_coordinate: f64,
        north_coordinate: f64,
        external_updated_date: Option<DateTime<Utc>>,
    },
    AccessAddressPendingOfficialUpdated {
        id: Uuid,
        pending_official: bool,
        external_updated_date: Option<DateTime<Utc>>,
    },
    AccessAddressDeleted {
        id: Uuid,
        external_updated_date: Option<DateTime<Utc>>,
    },
}

impl Aggregate for AccessAddress {
    const AGGREGATE_TYPE: &'static str = "access-address";
    type DomainEvent = AccessAddressEvent;

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn apply(mut self, event: &AccessAddressEvent) -> Self {
        use AccessAddressEvent::*;

        match event {
            AccessAddressCreated {
                id,
                external_created_date,
                details,
            } => {
                self.id = *id;
                self.external_created_date = *external_created_date;
                self.set_details(details);
            }
            AccessAddressUpdated { details, .. } => self.set_details(details),
            AccessAddressOfficialIdUpdated {
                official_id,
                external_updated_date,
                ..
            } => {
                self.official_id = official_id.clone();
                self.external_updated_date = *external_updated_date;
            }
            AccessAddressStatusUpdated {
                status,
                external_updated_date,
                ..
            } => {
                self.status = *status;
                self.external_updated_date = *external_updated_date;
            }
            AccessAddressRoadIdUpdated {
                road_id,
                external_updated_date,
                ..
            } => {
                self.road_id = *road_id;
                self.external_updated_date = *external_updated_date;
            }
            AccessAddressPostCodeIdUpdated {
                post_code_id,
                external_updated_date,
                ..
            } => {
                self.post_code_id = *post_code_id;
                self.external_updated_date = *external_updated_date;
            }
            AccessAddressHouseNumberUpdated {
                house_number,
                external_updated_date,
                ..
            } => {
                self.house_number = house_number.clone();
                self.external_updated_date = *external_updated_date;
            }
            AccessAddressLocationUpdated {
                east_coordinate,
                north_coordinate,
                external_updated_date,
                ..
            } => {
                self.east_coordinate = *east_coordinate;
                self.north_coordinate = *north_coordinate;
                self.external_updated_date = *external_updated_date;
            }
            AccessAddressPendingOfficialUpdated {
                pending_official,
                external_updated_date,
                ..
            } => {
                self.pending_official = *pending_official;
                self.external_updated_date = *external_updated_date;
            }
            AccessAddressDeleted {
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

/// The existence sets and owner map an access address is validated against.
#[derive(Debug, Clone, Copy)]
pub struct AccessAddressRefs<'a> {
    pub road_ids: &'a HashSet<Uuid>,
    pub post_code_ids: &'a HashSet<Uuid>,
    /// Official ids already in use, mapped to their access addresses.
    pub official_ids: &'a HashMap<String, Uuid>,
}

fn validate_location(east_coordinate: f64, north_coordinate: f64) -> Result<(), CommandError> {
    rules::finite(east_coordinate, "east_coordinate")?;
    rules::finite(north_coordinate, "north_coordinate")
}

fn validate_official_id(
    official_id: Option<&str>,
    official_ids: &HashMap<String, Uuid>,
    id: Uuid,
) -> Result<(), CommandError> {
    match official_id {
        Some(official_id) => rules::unique(official_id, official_ids, id, "official_id"),
        None => Ok(()),
    }
}

fn validate_details(
    id: Uuid,
    details: &AccessAddressDetails,
    refs: AccessAddressRefs<'_>,
) -> Result<(), CommandError> {
    rules::required(&details.municipal_code, "municipal_code")?;
    rules::required(&details.road_code, "road_code")?;
    rules::required(&details.house_number, "house_number")?;
    validate_location(details.east_coordinate, details.north_coordinate)?;
    rules::reference(details.road_id, refs.road_ids, "road_id")?;
    rules::reference(details.post_code_id, refs.post_code_ids, "post_code_id")?;
    validate_official_id(details.official_id.as_deref(), refs.official_ids, id)
}

impl AggregateRoot<AccessAddress> {
    /// Create the access address.
    ///
    /// `refs` carries the existence sets the road and post code references
    /// are checked against and the official ids already in use.
    ///
    /// # Errors
    ///
    /// `InvalidIdentifier`, `RequiredFieldMissing` (municipal_code,
    /// road_code, house_number), `InvalidCoordinate`, `ReferenceInvalid` /
    /// `ReferenceNotFound` (road_id, post_code_id), `DuplicateKey`
    /// (official_id), `AlreadyCreated`.
    pub fn create(
        &mut self,
        id: Uuid,
        details: AccessAddressDetails,
        external_created_date: Option<DateTime<Utc>>,
        refs: AccessAddressRefs<'_>,
    ) -> Result<(), CommandError> {
        rules::identifier(id)?;
        validate_details(id, &details, refs)?;
        rules::not_created(self)?;

        self.raise(AccessAddressEvent::AccessAddressCreated {
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
    /// As [`create`](Self::create) for field and reference checks, then
    /// `NotInitialized`, `CannotUpdateDeleted`, `NoChanges`.
    pub fn update(
        &mut self,
        details: AccessAddressDetails,
        refs: AccessAddressRefs<'_>,
    ) -> Result<(), CommandError> {
        validate_details(self.id(), &details, refs)?;
        rules::updatable(self)?;
        rules::changed(self, !self.state().details().same_content(&details))?;

        self.raise(AccessAddressEvent::AccessAddressUpdated {
            id: self.id(),
            details,
        });
        Ok(())
    }

    /// # Errors
    ///
    /// `DuplicateKey`, `NotInitialized`, `CannotUpdateDeleted`, `NoChanges`.
    pub fn update_official_id(
        &mut self,
        official_id: Option<String>,
        external_updated_date: Option<DateTime<Utc>>,
        official_ids: &HashMap<String, Uuid>,
    ) -> Result<(), CommandError> {
        validate_official_id(official_id.as_deref(), official_ids, self.id())?;
        rules::updatable(self)?;
        rules::changed(self, self.state().official_id != official_id)?;

        self.raise(AccessAddressEvent::AccessAddressOfficialIdUpdated {
            id: self.id(),
            official_id,
            external_updated_date,
        });
        Ok(())
    }

    pub fn update_status(
        &mut self,
        status: AccessAddressStatus,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        rules::updatable(self)?;
        rules::changed(self, self.state().status != status)?;

        self.raise(AccessAddressEvent::AccessAddressStatusUpdated {
            id: self.id(),
            status,
            external_updated_date,
        });
        Ok(())
    }

    /// Move the address to another road.
    ///
    /// # Errors
    ///
    /// `ReferenceInvalid`, `ReferenceNotFound`, `NotInitialized`,
    /// `CannotUpdateDeleted`, `NoChanges`.
    pub fn update_road_id(
        &mut self,
        road_id: Uuid,
        external_updated_date: Option<DateTime<Utc>>,
        road_ids: &HashSet<Uuid>,
    ) -> Result<(), CommandError> {
        rules::reference(road_id, road_ids, "road_id")?;
        rules::updatable(self)?;
        rules::changed(self, self.state().road_id != road_id)?;

        self.raise(AccessAddressEvent::AccessAddressRoadIdUpdated {
            id: self.id(),
            road_id,
            external_updated_date,
        });
        Ok(())
    }

    /// Move the address to another postal district.
    ///
    /// # Errors
    ///
    /// `ReferenceInvalid`, `ReferenceNotFound`, `NotInitialized`,
    /// `CannotUpdateDeleted`, `NoChanges`.
    pub fn update_post_code_id(
        &mut self,
        post_code_id: Uuid,
        external_updated_date: Option<DateTime<Utc>>,
        post_code_ids: &HashSet<Uuid>,
    ) -> Result<(), CommandError> {
        rules::reference(post_code_id, post_code_ids, "post_code_id")?;
        rules::updatable(self)?;
        rules::changed(self, self.state().post_code_id != post_code_id)?;

        self.raise(AccessAddressEvent::AccessAddressPostCodeIdUpdated {
            id: self.id(),
            post_code_id,
            external_updated_date,
        });
        Ok(())
    }

    pub fn update_house_number(
        &mut self,
        house_number: &str,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        rules::required(house_number, "house_number")?;
        rules::updatable(self)?;
        rules::changed(self, self.state().house_number != house_number)?;

        self.raise(AccessAddressEvent::AccessAddressHouseNumberUpdated {
            id: self.id(),
            house_number: house_number.to_string(),
            external_updated_date,
        });
        Ok(())
    }

    /// # Errors
    ///
    /// `InvalidCoordinate`, `NotInitialized`, `CannotUpdateDeleted`,
    /// `NoChanges`.
    pub fn update_location(
        &mut self,
        east_coordinate: f64,
        north_coordinate: f64,
        external_updated_date: Option<DateTime<Utc>>,
    ) -> Result<(), CommandError> {
        validate_location(east_coordinate, north_coordinate)?;
        rules::updatable(self)?;
        let current = self.state();
        rules::changed(
            self,
            current.east_coordinate != east_coordinate
                || current.north_coordinate != north_coordinate,
        )?;

        self.raise(AccessAddressEvent::AccessAddressLocationUpdated {
            id: self.id(),
            east_coordinate,
            north_coordinate,
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

        self.raise(AccessAddressEvent::AccessAddressPendingOfficialUpdated {
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
        self.raise(AccessAddressEvent::AccessAddressDeleted {
            id: self.id(),
            external_updated_date,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::TimeZone;

    fn id() -> Uuid {
        Uuid::parse_str("5e1d2b0c-8d3a-4f55-a0d4-0c7b1f2e0001").unwrap()
    }

    fn road_id() -> Uuid {
        Uuid::parse_str("5e1d2b0c-8d3a-4f55-a0d4-0c7b1f2e0002").unwrap()
    }

    fn post_code_id() -> Uuid {
        Uuid::parse_str("5e1d2b0c-8d3a-4f55-a0d4-0c7b1f2e0003").unwrap()
    }

    fn at(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2023, 5, day, 12, 0, 0).unwrap())
    }

    fn details() -> AccessAddressDetails {
        AccessAddressDetails {
            official_id: Some("0a3f507a-b2e6-32b8-e044-0003ba298018".into()),
            municipal_code: "0607".into(),
            status: AccessAddressStatus::Active,
            road_code: "0042".into(),
            house_number: "12B".into(),
            post_code_id: post_code_id(),
            east_coordinate: 552_410.25,
            north_coordinate: 6_156_922.5,
            town_name: Some("Fredericia".into()),
            plot_id: Some("1234a".into()),
            road_id: road_id(),
            pending_official: false,
            external_updated_date: at(1),
        }
    }

    fn roads() -> HashSet<Uuid> {
        HashSet::from([road_id()])
    }

    fn post_codes() -> HashSet<Uuid> {
        HashSet::from([post_code_id()])
    }

    fn no_official_ids() -> HashMap<String, Uuid> {
        HashMap::new()
    }

    fn refs<'a>(
        road_ids: &'a HashSet<Uuid>,
        post_code_ids: &'a HashSet<Uuid>,
        official_ids: &'a HashMap<String, Uuid>,
    ) -> AccessAddressRefs<'a> {
        AccessAddressRefs {
            road_ids,
            post_code_ids,
            official_ids,
        }
    }

    fn created() -> AggregateRoot<AccessAddress> {
        let mut root = AggregateRoot::<AccessAddress>::new();
        root.create(id(), details(), at(1), refs(&roads(), &post_codes(), &no_official_ids()))
            .expect("create should succeed");
        root
    }

    #[test]
    fn create_sets_all_fields() {
        let root = created();
        let state = root.state();
        assert_eq!(state.id, id());
        assert_eq!(state.details(), details());
        assert_eq!(state.external_created_date, at(1));
        assert!(!state.deleted);
        assert_eq!(root.uncommitted_events().len(), 1);
    }

    #[test]
    fn nil_id_wins_over_every_other_failure() {
        let mut root = AggregateRoot::<AccessAddress>::new();
        let err = root
            .create(
                Uuid::nil(),
                AccessAddressDetails::default(),
                None,
                refs(&HashSet::new(), &HashSet::new(), &no_official_ids()),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidIdentifier);
    }

    #[test]
    fn required_fields_are_checked_before_references() {
        let mut root = AggregateRoot::<AccessAddress>::new();
        let bad = AccessAddressDetails {
            house_number: "  ".into(),
            ..details()
        };
        let err = root
            .create(id(), bad, None, refs(&HashSet::new(), &HashSet::new(), &no_official_ids()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredFieldMissing);
        assert!(err.message.contains("house_number"));
    }

    #[test]
    fn nil_road_reference_is_invalid() {
        let mut root = AggregateRoot::<AccessAddress>::new();
        let bad = AccessAddressDetails {
            road_id: Uuid::nil(),
            ..details()
        };
        let err = root
            .create(id(), bad, None, refs(&roads(), &post_codes(), &no_official_ids()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferenceInvalid);
    }

    #[test]
    fn unknown_post_code_then_retry_after_it_appears() {
        let mut root = AggregateRoot::<AccessAddress>::new();
        let err = root
            .create(id(), details(), None, refs(&roads(), &HashSet::new(), &no_official_ids()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferenceNotFound);
        assert!(err.message.contains("post_code_id"));
        assert!(!root.is_created());

        root.create(id(), details(), None, refs(&roads(), &post_codes(), &no_official_ids()))
            .expect("retry should succeed once the post code exists");
        assert_eq!(root.state().post_code_id, post_code_id());
    }

    #[test]
    fn create_twice_is_already_created() {
        let mut root = created();
        let before = root.clone();
        let err = root
            .create(id(), details(), None, refs(&roads(), &post_codes(), &no_official_ids()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyCreated);
        assert_eq!(root, before);
    }

    #[test]
    fn update_ignores_external_updated_date_for_change_detection() {
        let mut root = created();
        let same = AccessAddressDetails {
            external_updated_date: at(9),
            ..details()
        };
        let err = root.update(same, refs(&roads(), &post_codes(), &no_official_ids())).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoChanges);
        assert_eq!(root.uncommitted_events().len(), 1);
    }

    #[test]
    fn update_replaces_details() {
        let mut root = created();
        let changed = AccessAddressDetails {
            town_name: None,
            status: AccessAddressStatus::Pending,
            external_updated_date: at(2),
            ..details()
        };
        root.update(changed.clone(), refs(&roads(), &post_codes(), &no_official_ids()))
            .expect("update should succeed");
        assert_eq!(root.state().details(), changed);
    }

    #[test]
    fn update_before_create_is_not_initialized() {
        let mut root = AggregateRoot::<AccessAddress>::new();
        let err = root
            .update(details(), refs(&roads(), &post_codes(), &no_official_ids()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotInitialized);
    }

    #[test]
    fn narrow_setters_stage_narrow_events() {
        let mut root = created();
        root.update_status(AccessAddressStatus::Discontinued, at(2))
            .unwrap();
        root.update_house_number("14", at(3)).unwrap();
        root.update_location(552_500.0, 6_157_000.0, at(4)).unwrap();
        root.update_pending_official(true, at(5)).unwrap();
        root.update_official_id(None, at(6), &no_official_ids())
            .unwrap();

        let state = root.state();
        assert_eq!(state.status, AccessAddressStatus::Discontinued);
        assert_eq!(state.house_number, "14");
        assert_eq!(state.east_coordinate, 552_500.0);
        assert_eq!(state.north_coordinate, 6_157_000.0);
        assert!(state.pending_official);
        assert_eq!(state.official_id, None);
        assert_eq!(state.external_updated_date, at(6));

        assert!(matches!(
            root.uncommitted_events()[2],
            AccessAddressEvent::AccessAddressHouseNumberUpdated { .. }
        ));
    }

    #[test]
    fn narrow_setter_with_current_value_is_no_changes() {
        let mut root = created();
        assert_eq!(
            root.update_status(AccessAddressStatus::Active, at(2))
                .unwrap_err()
                .code,
            ErrorCode::NoChanges
        );
        assert_eq!(
            root.update_location(552_410.25, 6_156_922.5, at(2))
                .unwrap_err()
                .code,
            ErrorCode::NoChanges
        );
        assert_eq!(
            root.update_road_id(road_id(), at(2), &roads())
                .unwrap_err()
                .code,
            ErrorCode::NoChanges
        );
    }

    #[test]
    fn reference_setters_validate_against_existence_sets() {
        let mut root = created();
        let other_road = Uuid::new_v4();
        assert_eq!(
            root.update_road_id(other_road, at(2), &roads())
                .unwrap_err()
                .code,
            ErrorCode::ReferenceNotFound
        );

        let mut known = roads();
        known.insert(other_road);
        root.update_road_id(other_road, at(2), &known).unwrap();
        assert_eq!(root.state().road_id, other_road);

        assert_eq!(
            root.update_post_code_id(Uuid::nil(), at(3), &post_codes())
                .unwrap_err()
                .code,
            ErrorCode::ReferenceInvalid
        );
    }

    #[test]
    fn non_finite_coordinates_are_rejected_before_staging() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut root = AggregateRoot::<AccessAddress>::new();
            let err = root
                .create(
                    id(),
                    AccessAddressDetails {
                        east_coordinate: bad,
                        ..details()
                    },
                    None,
                    refs(&roads(), &post_codes(), &no_official_ids()),
                )
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidCoordinate);
            assert!(err.message.contains("east_coordinate"));
            assert!(!root.is_created());

            let mut root = created();
            let err = root
                .update(
                    AccessAddressDetails {
                        north_coordinate: bad,
                        ..details()
                    },
                    refs(&roads(), &post_codes(), &no_official_ids()),
                )
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidCoordinate);
            assert!(err.message.contains("north_coordinate"));

            let err = root.update_location(552_500.0, bad, at(2)).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidCoordinate);
            assert_eq!(root.uncommitted_events().len(), 1);
            assert_eq!(root.state().north_coordinate, 6_156_922.5);
        }
    }

    #[test]
    fn coordinate_check_precedes_references() {
        let mut root = AggregateRoot::<AccessAddress>::new();
        let bad = AccessAddressDetails {
            east_coordinate: f64::NAN,
            ..details()
        };
        let err = root
            .create(
                id(),
                bad,
                None,
                refs(&HashSet::new(), &HashSet::new(), &no_official_ids()),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCoordinate);
    }

    #[test]
    fn official_id_owned_by_another_address_is_duplicate() {
        let official_id = details().official_id.unwrap();
        let owners = HashMap::from([(official_id.clone(), Uuid::new_v4())]);

        let mut fresh = AggregateRoot::<AccessAddress>::new();
        let err = fresh
            .create(id(), details(), None, refs(&roads(), &post_codes(), &owners))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateKey);
        assert!(!fresh.is_created());

        // Without an official id there is nothing to collide with.
        fresh
            .create(
                id(),
                AccessAddressDetails {
                    official_id: None,
                    ..details()
                },
                None,
                refs(&roads(), &post_codes(), &owners),
            )
            .expect("address without official id is accepted");

        let err = fresh
            .update(details(), refs(&roads(), &post_codes(), &owners))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateKey);

        let err = fresh
            .update_official_id(Some(official_id), at(2), &owners)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateKey);
        assert_eq!(fresh.state().official_id, None);
        assert_eq!(fresh.uncommitted_events().len(), 1);
    }

    #[test]
    fn keeping_own_official_id_is_not_a_duplicate() {
        let mut root = created();
        let owners = HashMap::from([(details().official_id.unwrap(), id())]);
        root.update(
            AccessAddressDetails {
                house_number: "14".into(),
                ..details()
            },
            refs(&roads(), &post_codes(), &owners),
        )
        .expect("own official id is accepted");
    }

    #[test]
    fn delete_records_date_and_blocks_mutation() {
        let mut root = created();
        root.delete(at(7)).expect("delete should succeed");
        assert!(root.state().deleted);
        assert_eq!(root.state().external_updated_date, at(7));

        assert_eq!(
            root.update_house_number("99", at(8)).unwrap_err().code,
            ErrorCode::CannotUpdateDeleted
        );
        assert_eq!(
            root.delete(at(8)).unwrap_err().code,
            ErrorCode::AlreadyDeleted
        );
    }

    #[test]
    fn replay_reproduces_state_through_json() {
        let mut root = created();
        root.update_house_number("14", at(3)).unwrap();
        root.update_location(1.5, 2.5, at(4)).unwrap();
        root.delete(at(5)).unwrap();

        let json = serde_json::to_string(root.uncommitted_events()).unwrap();
        let events: Vec<AccessAddressEvent> = serde_json::from_str(&json).unwrap();
        let replayed = AggregateRoot::<AccessAddress>::from_history(&events);
        assert_eq!(replayed.state(), root.state());
        assert_eq!(replayed.version(), 4);
    }
}
