//! Validation rules shared by every aggregate kind.
//!
//! Command methods call these in a fixed order: identifier checks, field
//! values, references, external key ownership, lifecycle state, and finally
//! change detection. The first failing rule is the one reported.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::error::{CommandError, ErrorCode};

/// The aggregate's own identifier must not be nil.
pub(crate) fn identifier(id: Uuid) -> Result<(), CommandError> {
    if id.is_nil() {
        return Err(CommandError::new(
            ErrorCode::InvalidIdentifier,
            "id cannot be the nil uuid",
        ));
    }
    Ok(())
}

/// A required string must contain something other than whitespace.
pub(crate) fn required(value: &str, field: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError::new(
            ErrorCode::RequiredFieldMissing,
            format!("{field} cannot be empty or whitespace"),
        ));
    }
    Ok(())
}

/// Coordinates must be finite; JSON has no encoding for NaN or infinity.
pub(crate) fn finite(value: f64, field: &str) -> Result<(), CommandError> {
    if !value.is_finite() {
        return Err(CommandError::new(
            ErrorCode::InvalidCoordinate,
            format!("{field} must be a finite number, got {value}"),
        ));
    }
    Ok(())
}

/// A foreign identifier must be non-nil and present in the existence set
/// taken from the referenced kind's projection.
pub(crate) fn reference(
    id: Uuid,
    existing: &HashSet<Uuid>,
    field: &str,
) -> Result<(), CommandError> {
    if id.is_nil() {
        return Err(CommandError::new(
            ErrorCode::ReferenceInvalid,
            format!("{field} cannot be the nil uuid"),
        ));
    }
    if !existing.contains(&id) {
        return Err(CommandError::new(
            ErrorCode::ReferenceNotFound,
            format!("{field} '{id}' does not exist"),
        ));
    }
    Ok(())
}

/// An external key may only be owned by one entity. `owners` maps keys to
/// the ids currently holding them; `id` may already own `key`.
pub(crate) fn unique(
    key: &str,
    owners: &HashMap<String, Uuid>,
    id: Uuid,
    field: &str,
) -> Result<(), CommandError> {
    match owners.get(key) {
        Some(&owner) if owner != id => Err(CommandError::new(
            ErrorCode::DuplicateKey,
            format!("{field} '{key}' is already used by {owner}"),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn not_created<A: Aggregate>(root: &AggregateRoot<A>) -> Result<(), CommandError> {
    if root.is_created() {
        return Err(CommandError::new(
            ErrorCode::AlreadyCreated,
            format!("{} '{}' has already been created", A::AGGREGATE_TYPE, root.id()),
        ));
    }
    Ok(())
}

fn initialized<A: Aggregate>(root: &AggregateRoot<A>) -> Result<(), CommandError> {
    if !root.is_created() {
        return Err(CommandError::new(
            ErrorCode::NotInitialized,
            format!("{} has not been created", A::AGGREGATE_TYPE),
        ));
    }
    Ok(())
}

/// The aggregate exists and has not been deleted.
pub(crate) fn updatable<A: Aggregate>(root: &AggregateRoot<A>) -> Result<(), CommandError> {
    initialized(root)?;
    if root.state().is_deleted() {
        return Err(CommandError::new(
            ErrorCode::CannotUpdateDeleted,
            format!("cannot update deleted {} '{}'", A::AGGREGATE_TYPE, root.id()),
        ));
    }
    Ok(())
}

/// The aggregate exists and has not been deleted yet.
pub(crate) fn deletable<A: Aggregate>(root: &AggregateRoot<A>) -> Result<(), CommandError> {
    initialized(root)?;
    if root.state().is_deleted() {
        return Err(CommandError::new(
            ErrorCode::AlreadyDeleted,
            format!("{} '{}' is already deleted", A::AGGREGATE_TYPE, root.id()),
        ));
    }
    Ok(())
}

/// At least one compared field differs from the current state.
pub(crate) fn changed<A: Aggregate>(
    root: &AggregateRoot<A>,
    has_changes: bool,
) -> Result<(), CommandError> {
    if !has_changes {
        return Err(CommandError::new(
            ErrorCode::NoChanges,
            format!("no changes for {} '{}'", A::AGGREGATE_TYPE, root.id()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_is_missing() {
        let err = required(" \t\n", "name").unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredFieldMissing);
        assert!(err.message.contains("name"));
        assert!(required(" x ", "name").is_ok());
    }

    #[test]
    fn nil_reference_is_invalid_before_lookup() {
        let existing = HashSet::from([Uuid::nil()]);
        let err = reference(Uuid::nil(), &existing, "road_id").unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferenceInvalid);
    }

    #[test]
    fn missing_reference_is_not_found() {
        let err = reference(Uuid::new_v4(), &HashSet::new(), "road_id").unwrap_err();
        assert_eq!(err.code, ErrorCode::ReferenceNotFound);
    }

    #[test]
    fn non_finite_values_are_invalid_coordinates() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = finite(value, "east_coordinate").unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidCoordinate);
            assert!(err.message.contains("east_coordinate"));
        }
        assert!(finite(-0.0, "east_coordinate").is_ok());
        assert!(finite(f64::MAX, "east_coordinate").is_ok());
    }

    #[test]
    fn key_owned_by_another_id_is_duplicate() {
        let owner = Uuid::new_v4();
        let owners = HashMap::from([("7000".to_string(), owner)]);

        let err = unique("7000", &owners, Uuid::new_v4(), "number").unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateKey);
        assert!(err.message.contains("7000"));

        assert!(unique("7000", &owners, owner, "number").is_ok());
        assert!(unique("6000", &owners, Uuid::new_v4(), "number").is_ok());
    }

    #[test]
    fn nil_identifier_is_invalid() {
        assert_eq!(
            identifier(Uuid::nil()).unwrap_err().code,
            ErrorCode::InvalidIdentifier
        );
        assert!(identifier(Uuid::new_v4()).is_ok());
    }
}
