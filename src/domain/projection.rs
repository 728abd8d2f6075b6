//! The address registry read model.
//!
//! [`AddressProjection`] keeps the existence sets that commands check their
//! references against, plus bijective lookups from external keys (official
//! ids, postal numbers) to entity ids.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::domain::access_address::{AccessAddress, AccessAddressEvent, AccessAddressRefs};
use crate::domain::post_code::{PostCode, PostCodeEvent};
use crate::domain::road::{Road, RoadEvent};
use crate::error::ProjectionError;
use crate::event::{StoredEvent, decode_domain_event};
use crate::projection::Projection;

/// A one-to-one mapping between an external string key and an entity id.
///
/// Every mutation checks first and writes second, so a rejected change
/// leaves both directions untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Lookup {
    by_key: HashMap<String, Uuid>,
    by_id: HashMap<Uuid, String>,
}

impl Lookup {
    fn id(&self, key: &str) -> Option<Uuid> {
        self.by_key.get(key).copied()
    }

    fn key(&self, id: Uuid) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    fn check_key_free(&self, what: &str, key: &str, id: Uuid) -> Result<(), ProjectionError> {
        match self.by_key.get(key) {
            Some(&owner) if owner != id => Err(ProjectionError::Invariant(format!(
                "{what} '{key}' already maps to {owner}, cannot map it to {id}"
            ))),
            _ => Ok(()),
        }
    }

    fn insert(&mut self, what: &str, key: &str, id: Uuid) -> Result<(), ProjectionError> {
        self.check_key_free(what, key, id)?;
        if let Some(existing) = self.by_id.get(&id)
            && existing != key
        {
            return Err(ProjectionError::Invariant(format!(
                "{id} already has {what} '{existing}'"
            )));
        }
        self.by_key.insert(key.to_string(), id);
        self.by_id.insert(id, key.to_string());
        Ok(())
    }

    /// Point `id` at `key`, dropping whatever key it had before. `None`
    /// removes the mapping.
    fn replace(&mut self, what: &str, id: Uuid, key: Option<&str>) -> Result<(), ProjectionError> {
        if let Some(key) = key {
            self.check_key_free(what, key, id)?;
        }
        if let Some(old) = self.by_id.remove(&id) {
            self.by_key.remove(&old);
        }
        if let Some(key) = key {
            self.by_key.insert(key.to_string(), id);
            self.by_id.insert(id, key.to_string());
        }
        Ok(())
    }

    fn remove(&mut self, what: &str, id: Uuid) -> Result<(), ProjectionError> {
        let Some(key) = self.by_id.remove(&id) else {
            return Err(ProjectionError::Invariant(format!(
                "no {what} recorded for {id}"
            )));
        };
        self.by_key.remove(&key);
        Ok(())
    }

    fn remove_if_present(&mut self, id: Uuid) {
        if let Some(key) = self.by_id.remove(&id) {
            self.by_key.remove(&key);
        }
    }
}

/// Existence sets and external-key lookups for the address registry.
///
/// Deleted entities leave every set and lookup, so a deleted road or post
/// code can no longer be referenced by new or updated access addresses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressProjection {
    access_address_ids: HashSet<Uuid>,
    access_address_official_ids: Lookup,
    road_ids: HashSet<Uuid>,
    road_official_ids: Lookup,
    post_code_ids: HashSet<Uuid>,
    post_code_numbers: Lookup,
}

impl AddressProjection {
    /// Ids of every live access address.
    pub fn access_address_ids(&self) -> &HashSet<Uuid> {
        &self.access_address_ids
    }

    pub fn access_address_id_by_official_id(&self, official_id: &str) -> Option<Uuid> {
        self.access_address_official_ids.id(official_id)
    }

    pub fn access_address_official_id(&self, id: Uuid) -> Option<&str> {
        self.access_address_official_ids.key(id)
    }

    /// Official id to access address id, the owner map commands check new
    /// official ids against.
    pub fn access_address_official_ids(&self) -> &HashMap<String, Uuid> {
        &self.access_address_official_ids.by_key
    }

    /// Ids of every live road.
    pub fn road_ids(&self) -> &HashSet<Uuid> {
        &self.road_ids
    }

    pub fn road_id_by_official_id(&self, official_id: &str) -> Option<Uuid> {
        self.road_official_ids.id(official_id)
    }

    pub fn road_official_id(&self, id: Uuid) -> Option<&str> {
        self.road_official_ids.key(id)
    }

    pub fn road_official_ids(&self) -> &HashMap<String, Uuid> {
        &self.road_official_ids.by_key
    }

    /// Ids of every live post code.
    pub fn post_code_ids(&self) -> &HashSet<Uuid> {
        &self.post_code_ids
    }

    pub fn post_code_id_by_number(&self, number: &str) -> Option<Uuid> {
        self.post_code_numbers.id(number)
    }

    pub fn post_code_number_by_id(&self, id: Uuid) -> Option<&str> {
        self.post_code_numbers.key(id)
    }

    pub fn post_code_numbers(&self) -> &HashMap<String, Uuid> {
        &self.post_code_numbers.by_key
    }

    /// Everything an access address command is validated against.
    pub fn access_address_refs(&self) -> AccessAddressRefs<'_> {
        AccessAddressRefs {
            road_ids: &self.road_ids,
            post_code_ids: &self.post_code_ids,
            official_ids: &self.access_address_official_ids.by_key,
        }
    }

    fn apply_post_code(&mut self, event: PostCodeEvent) -> Result<(), ProjectionError> {
        match event {
            PostCodeEvent::PostCodeCreated { id, number, .. } => {
                ensure_absent(&self.post_code_ids, "post code", id)?;
                self.post_code_numbers.insert("post code number", &number, id)?;
                self.post_code_ids.insert(id);
            }
            PostCodeEvent::PostCodeDeleted { id } => {
                ensure_present(&self.post_code_ids, "post code", id)?;
                self.post_code_numbers.remove("post code number", id)?;
                self.post_code_ids.remove(&id);
            }
            PostCodeEvent::PostCodeUpdated { .. } => {}
        }
        Ok(())
    }

    fn apply_road(&mut self, event: RoadEvent) -> Result<(), ProjectionError> {
        match event {
            RoadEvent::RoadCreated {
                id, official_id, ..
            } => {
                ensure_absent(&self.road_ids, "road", id)?;
                self.road_official_ids
                    .insert("road official id", &official_id, id)?;
                self.road_ids.insert(id);
            }
            RoadEvent::RoadUpdated {
                id, official_id, ..
            } => {
                ensure_present(&self.road_ids, "road", id)?;
                self.road_official_ids
                    .replace("road official id", id, Some(&official_id))?;
            }
            RoadEvent::RoadDeleted { id } => {
                ensure_present(&self.road_ids, "road", id)?;
                self.road_official_ids.remove("road official id", id)?;
                self.road_ids.remove(&id);
            }
        }
        Ok(())
    }

    fn apply_access_address(&mut self, event: AccessAddressEvent) -> Result<(), ProjectionError> {
        use AccessAddressEvent::*;

        const WHAT: &str = "access address official id";
        match event {
            AccessAddressCreated { id, details, .. } => {
                ensure_absent(&self.access_address_ids, "access address", id)?;
                if let Some(official_id) = &details.official_id {
                    self.access_address_official_ids
                        .insert(WHAT, official_id, id)?;
                }
                self.access_address_ids.insert(id);
            }
            AccessAddressUpdated { id, details } => {
                ensure_present(&self.access_address_ids, "access address", id)?;
                self.access_address_official_ids
                    .replace(WHAT, id, details.official_id.as_deref())?;
            }
            AccessAddressOfficialIdUpdated {
                id, official_id, ..
            } => {
                ensure_present(&self.access_address_ids, "access address", id)?;
                self.access_address_official_ids
                    .replace(WHAT, id, official_id.as_deref())?;
            }
            AccessAddressDeleted { id, .. } => {
                ensure_present(&self.access_address_ids, "access address", id)?;
                self.access_address_official_ids.remove_if_present(id);
                self.access_address_ids.remove(&id);
            }
            AccessAddressStatusUpdated { .. }
            | AccessAddressRoadIdUpdated { .. }
            | AccessAddressPostCodeIdUpdated { .. }
            | AccessAddressHouseNumberUpdated { .. }
            | AccessAddressLocationUpdated { .. }
            | AccessAddressPendingOfficialUpdated { .. } => {}
        }
        Ok(())
    }
}

fn ensure_absent(set: &HashSet<Uuid>, what: &str, id: Uuid) -> Result<(), ProjectionError> {
    if set.contains(&id) {
        return Err(ProjectionError::Invariant(format!(
            "{what} {id} was created twice"
        )));
    }
    Ok(())
}

fn ensure_present(set: &HashSet<Uuid>, what: &str, id: Uuid) -> Result<(), ProjectionError> {
    if !set.contains(&id) {
        return Err(ProjectionError::Invariant(format!(
            "{what} {id} is not known to the projection"
        )));
    }
    Ok(())
}

fn decode<A: Aggregate>(event: &StoredEvent) -> Result<A::DomainEvent, ProjectionError> {
    decode_domain_event::<A>(event).map_err(|source| ProjectionError::Decode {
        event_type: event.event_type.clone(),
        global_position: event.global_position,
        source,
    })
}

impl Projection for AddressProjection {
    const NAME: &'static str = "address-projection";

    fn apply(&mut self, event: &StoredEvent) -> Result<(), ProjectionError> {
        let aggregate_type = event.aggregate_type();
        if aggregate_type == PostCode::AGGREGATE_TYPE {
            self.apply_post_code(decode::<PostCode>(event)?)
        } else if aggregate_type == Road::AGGREGATE_TYPE {
            self.apply_road(decode::<Road>(event)?)
        } else if aggregate_type == AccessAddress::AGGREGATE_TYPE {
            self.apply_access_address(decode::<AccessAddress>(event)?)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandContext;
    use crate::domain::access_address::{AccessAddressDetails, AccessAddressStatus};
    use crate::domain::road::RoadStatus;
    use crate::domain::unit_address::{UnitAddress, UnitAddressDetails, UnitAddressEvent};
    use crate::event::{encode_domain_event, stream_uuid};

    /// Wraps domain events into stored events with consecutive global
    /// positions, the way the event log would.
    #[derive(Default)]
    struct Log {
        next: u64,
    }

    impl Log {
        fn record<A: Aggregate>(&mut self, id: Uuid, event: A::DomainEvent) -> StoredEvent {
            let proposed = encode_domain_event::<A>(&event, &CommandContext::default(), id)
                .expect("encode should succeed");
            let position = self.next;
            self.next += 1;
            StoredEvent {
                event_id: proposed.event_id,
                stream_id: stream_uuid(A::AGGREGATE_TYPE, id),
                stream_version: 0,
                global_position: position,
                event_type: proposed.event_type,
                payload: proposed.payload,
                metadata: proposed.metadata,
                recorded_at: 0,
            }
        }
    }

    fn post_code_created(id: Uuid, number: &str) -> PostCodeEvent {
        PostCodeEvent::PostCodeCreated {
            id,
            number: number.into(),
            name: "Fredericia".into(),
        }
    }

    fn road_created(id: Uuid, official_id: &str) -> RoadEvent {
        RoadEvent::RoadCreated {
            id,
            official_id: official_id.into(),
            name: "Vejlevej".into(),
            status: RoadStatus::Effective,
        }
    }

    fn access_address_created(id: Uuid, official_id: Option<&str>) -> AccessAddressEvent {
        AccessAddressEvent::AccessAddressCreated {
            id,
            external_created_date: None,
            details: AccessAddressDetails {
                official_id: official_id.map(str::to_string),
                municipal_code: "0607".into(),
                status: AccessAddressStatus::Active,
                road_code: "0042".into(),
                house_number: "1".into(),
                ..AccessAddressDetails::default()
            },
        }
    }

    #[test]
    fn post_code_created_then_deleted_clears_both_directions() {
        let mut log = Log::default();
        let mut projection = AddressProjection::default();
        let id = Uuid::new_v4();

        projection
            .apply(&log.record::<PostCode>(id, post_code_created(id, "7000")))
            .unwrap();
        assert_eq!(projection.post_code_id_by_number("7000"), Some(id));
        assert_eq!(projection.post_code_number_by_id(id), Some("7000"));
        assert!(projection.post_code_ids().contains(&id));

        projection
            .apply(&log.record::<PostCode>(id, PostCodeEvent::PostCodeDeleted { id }))
            .unwrap();
        assert_eq!(projection.post_code_id_by_number("7000"), None);
        assert_eq!(projection.post_code_number_by_id(id), None);
        assert!(projection.post_code_ids().is_empty());
    }

    #[test]
    fn duplicate_post_code_number_is_an_invariant_violation() {
        let mut log = Log::default();
        let mut projection = AddressProjection::default();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        projection
            .apply(&log.record::<PostCode>(first, post_code_created(first, "7000")))
            .unwrap();
        let before = projection.clone();

        let err = projection
            .apply(&log.record::<PostCode>(second, post_code_created(second, "7000")))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Invariant(_)));
        assert_eq!(projection, before);
    }

    #[test]
    fn deleting_unknown_post_code_is_an_invariant_violation() {
        let mut log = Log::default();
        let mut projection = AddressProjection::default();
        let id = Uuid::new_v4();

        let err = projection
            .apply(&log.record::<PostCode>(id, PostCodeEvent::PostCodeDeleted { id }))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Invariant(_)));
    }

    #[test]
    fn road_update_moves_official_id() {
        let mut log = Log::default();
        let mut projection = AddressProjection::default();
        let id = Uuid::new_v4();

        projection
            .apply(&log.record::<Road>(id, road_created(id, "0042")))
            .unwrap();
        projection
            .apply(&log.record::<Road>(
                id,
                RoadEvent::RoadUpdated {
                    id,
                    official_id: "0043".into(),
                    name: "Vejlevej".into(),
                    status: RoadStatus::Effective,
                },
            ))
            .unwrap();

        assert_eq!(projection.road_id_by_official_id("0042"), None);
        assert_eq!(projection.road_id_by_official_id("0043"), Some(id));
        assert_eq!(projection.road_official_id(id), Some("0043"));
        assert!(projection.road_ids().contains(&id));

        projection
            .apply(&log.record::<Road>(id, RoadEvent::RoadDeleted { id }))
            .unwrap();
        assert!(projection.road_ids().is_empty());
        assert_eq!(projection.road_id_by_official_id("0043"), None);
    }

    #[test]
    fn access_address_official_id_follows_narrow_updates() {
        let mut log = Log::default();
        let mut projection = AddressProjection::default();
        let id = Uuid::new_v4();

        projection
            .apply(&log.record::<AccessAddress>(id, access_address_created(id, None)))
            .unwrap();
        assert!(projection.access_address_ids().contains(&id));
        assert_eq!(projection.access_address_official_id(id), None);

        projection
            .apply(&log.record::<AccessAddress>(
                id,
                AccessAddressEvent::AccessAddressOfficialIdUpdated {
                    id,
                    official_id: Some("0a3f507a".into()),
                    external_updated_date: None,
                },
            ))
            .unwrap();
        assert_eq!(projection.access_address_id_by_official_id("0a3f507a"), Some(id));

        projection
            .apply(&log.record::<AccessAddress>(
                id,
                AccessAddressEvent::AccessAddressDeleted {
                    id,
                    external_updated_date: None,
                },
            ))
            .unwrap();
        assert!(projection.access_address_ids().is_empty());
        assert_eq!(projection.access_address_id_by_official_id("0a3f507a"), None);
    }

    #[test]
    fn untracked_events_are_ignored() {
        let mut log = Log::default();
        let mut projection = AddressProjection::default();
        let id = Uuid::new_v4();

        projection
            .apply(&log.record::<UnitAddress>(
                id,
                UnitAddressEvent::UnitAddressCreated {
                    id,
                    external_created_date: None,
                    details: UnitAddressDetails::default(),
                },
            ))
            .unwrap();
        projection
            .apply(&log.record::<PostCode>(
                id,
                PostCodeEvent::PostCodeUpdated {
                    id,
                    name: "Taulov".into(),
                },
            ))
            .unwrap();

        assert_eq!(projection, AddressProjection::default());
    }

    #[test]
    fn undecodable_tracked_event_is_a_decode_error() {
        let mut log = Log::default();
        let mut projection = AddressProjection::default();
        let id = Uuid::new_v4();
        let mut stored = log.record::<Road>(id, road_created(id, "0042"));
        stored.payload = serde_json::json!({ "unexpected": true });

        let err = projection.apply(&stored).unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::Decode { ref event_type, global_position: 0, .. }
                if event_type == "RoadCreated"
        ));
    }

    #[test]
    fn replaying_the_same_events_gives_the_same_projection() {
        let mut log = Log::default();
        let road = Uuid::new_v4();
        let post_code = Uuid::new_v4();
        let events = vec![
            log.record::<Road>(road, road_created(road, "0042")),
            log.record::<PostCode>(post_code, post_code_created(post_code, "7000")),
        ];

        let mut first = AddressProjection::default();
        let mut second = AddressProjection::default();
        for event in &events {
            first.apply(event).unwrap();
            second.apply(event).unwrap();
        }
        assert_eq!(first, second);

        let json = serde_json::to_string(&first).unwrap();
        let restored: AddressProjection = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, first);
    }
}
