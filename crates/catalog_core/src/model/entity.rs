//! Entity contract shared by every persisted kind.
//!
//! # Responsibility
//! - Describe how a kind is constructed blank, merged from a sparse payload,
//!   written to and read from its table.
//! - Carry the audit block common to every kind.
//!
//! # Invariants
//! - Only columns listed in `Entity::FIELDS` are ever written from payloads.
//! - `Audit::id` is assigned by storage and never changed afterwards.
//! - `created_by_id` is stamped once at creation; `updated_by_id` on every
//!   mutating update.

use crate::model::actor::{Actor, ActorId};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::Serialize;

/// Numeric primary key assigned by storage.
pub type EntityId = i64;

/// One `(column, value)` pair destined for storage.
pub type Assignment = (&'static str, Value);

/// Columns owned by the audit block, present on every entity table.
pub const AUDIT_COLUMNS: &[&str] = &[
    "id",
    "created_by_id",
    "updated_by_id",
    "created_at",
    "updated_at",
    "deleted_at",
];

/// Identity, actor stamps, timestamps and soft-delete marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub id: Option<EntityId>,
    pub created_by_id: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Actor>,
    pub updated_by_id: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Actor>,
    /// Unix epoch milliseconds.
    pub created_at: Option<i64>,
    /// Unix epoch milliseconds.
    pub updated_at: Option<i64>,
    /// Soft delete tombstone; `None` means live.
    pub deleted_at: Option<i64>,
}

impl Audit {
    /// Stamps the creating actor.
    pub fn stamp_created(&mut self, actor: &Actor) {
        self.created_by_id = Some(actor.id);
        self.created_by = Some(actor.clone());
    }

    /// Stamps the actor of the latest mutation.
    pub fn stamp_updated(&mut self, actor: &Actor) {
        self.updated_by_id = Some(actor.id);
        self.updated_by = Some(actor.clone());
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Audit relations that can be expanded on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Actor referenced by `created_by_id`.
    CreatedBy,
    /// Actor referenced by `updated_by_id`.
    UpdatedBy,
}

impl Relation {
    pub(crate) fn foreign_key(self) -> &'static str {
        match self {
            Self::CreatedBy => "created_by_id",
            Self::UpdatedBy => "updated_by_id",
        }
    }

    pub(crate) fn join_alias(self) -> &'static str {
        match self {
            Self::CreatedBy => "created_by",
            Self::UpdatedBy => "updated_by",
        }
    }
}

/// Sparse payload for one entity kind.
///
/// Implementations are typed per kind, so keys outside the declared field
/// schema cannot be expressed at all.
pub trait FieldPatch {
    /// Returns one assignment per defined field; undefined fields are absent.
    fn assignments(&self) -> Vec<Assignment>;

    fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }
}

/// Persisted entity kind.
///
/// `blank()` is the factory the generic service uses to build a record of
/// the kind it was constructed for.
pub trait Entity: Sized {
    /// Sparse create/update payload for this kind.
    type Patch: FieldPatch;

    /// Short kind name used in log events.
    const KIND: &'static str;
    /// Backing table name.
    const TABLE: &'static str;
    /// Declared writable columns, excluding audit columns.
    const FIELDS: &'static [&'static str];

    /// Builds a record with every entity field at its default.
    fn blank() -> Self;

    /// Copies every defined payload field onto `self`; undefined fields are
    /// left untouched.
    fn merge(&mut self, patch: &Self::Patch);

    fn audit(&self) -> &Audit;

    fn audit_mut(&mut self) -> &mut Audit;

    /// Values for every column in `FIELDS`, in declaration order.
    fn field_values(&self) -> Vec<Assignment>;

    /// Reads entity fields from a row aliased by column name. The audit
    /// block is filled by the repository.
    fn read_fields(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Resolves a caller-provided column name against the declared schema of `E`.
pub fn declared_column<E: Entity>(name: &str) -> Option<&'static str> {
    AUDIT_COLUMNS
        .iter()
        .chain(E::FIELDS.iter())
        .find(|column| **column == name)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::{declared_column, Audit};
    use crate::model::actor::Actor;
    use crate::model::product::Product;

    #[test]
    fn stamps_keep_id_and_snapshot() {
        let actor = Actor::new(7, "Ada");
        let mut audit = Audit::default();
        audit.stamp_created(&actor);
        assert_eq!(audit.created_by_id, Some(7));
        assert_eq!(audit.created_by.as_ref().map(|a| a.full_name.as_str()), Some("Ada"));
        assert_eq!(audit.updated_by_id, None);
        assert!(!audit.is_deleted());
    }

    #[test]
    fn declared_column_rejects_unknown_names() {
        assert_eq!(declared_column::<Product>("title"), Some("title"));
        assert_eq!(declared_column::<Product>("deleted_at"), Some("deleted_at"));
        assert_eq!(declared_column::<Product>("password_hash"), None);
        assert_eq!(declared_column::<Product>("title; DROP TABLE users"), None);
    }
}
