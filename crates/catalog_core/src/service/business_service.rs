//! Generic business service shared by every entity kind.
//!
//! # Responsibility
//! - Build records through the kind's factory and merge sparse payloads.
//! - Stamp audit actors on create and update.
//! - Map store failures into `ServiceError` at each store call.
//!
//! # Invariants
//! - Absent payload fields are never written; they keep their default on
//!   create and their stored value on update.
//! - Ownership lookups fail with the same `NotFound` as missing rows.
//! - Mutations whose success is an affected-row count go through
//!   `check_affected`.

use crate::error::{ServiceError, ServiceResult};
use crate::model::actor::{Actor, ActorId};
use crate::model::entity::{declared_column, Audit, Entity, EntityId, FieldPatch, Relation};
use crate::repo::entity_repo::{EntityFilter, EntityRepository, Projection};
use crate::store::{StoreError, TransactionScope};
use log::{debug, warn};
use std::marker::PhantomData;

/// Options for `save_transactional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Re-read the inserted row inside the scope. When false the merged
    /// in-memory record is returned with only its id filled in by storage.
    pub reload: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { reload: true }
    }
}

/// CRUD primitives for entity kind `E` over repository `R`.
pub struct BusinessService<E: Entity, R: EntityRepository<E>> {
    repo: R,
    _kind: PhantomData<fn() -> E>,
}

impl<E: Entity, R: EntityRepository<E>> BusinessService<E, R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            _kind: PhantomData,
        }
    }

    /// Creates one record of kind `E` through `scope`.
    ///
    /// # Errors
    /// - `Conflict` on a uniqueness violation, with the store message.
    /// - `Internal` on any other store failure.
    pub fn save_transactional(
        &self,
        payload: &E::Patch,
        actor: Option<&Actor>,
        scope: &TransactionScope<'_>,
        options: SaveOptions,
    ) -> ServiceResult<E> {
        let mut record = E::blank();
        if let Some(actor) = actor {
            record.audit_mut().stamp_created(actor);
        }
        record.merge(payload);

        let id = self
            .repo
            .insert(scope, &record)
            .map_err(|err| write_failed::<E>("insert", err))?;
        debug!(
            "event=entity_insert module=service kind={} status=ok id={} scope_id={}",
            E::KIND,
            id,
            scope.scope_id()
        );

        if !options.reload {
            record.audit_mut().id = Some(id);
            return Ok(record);
        }

        self.repo
            .find_one_in(scope, &EntityFilter::by_id(id), &[Relation::CreatedBy])?
            .ok_or(ServiceError::NotFound)
    }

    /// Asserts that a live row exists and returns `id` plus `fields`.
    ///
    /// # Errors
    /// - `InvalidInput` when a field is not a declared column of `E`.
    /// - `NotFound` when no live row matches.
    pub fn assert_or_fail(&self, id: EntityId, fields: &[&str]) -> ServiceResult<Projection> {
        let columns = fields
            .iter()
            .map(|field| {
                declared_column::<E>(field).ok_or_else(|| {
                    ServiceError::InvalidInput(format!("unknown {} field `{field}`", E::KIND))
                })
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        self.repo
            .find_projection(id, &columns)?
            .ok_or(ServiceError::NotFound)
    }

    /// Loads one live row with `relations` expanded.
    pub fn find_one_by_id(&self, id: EntityId, relations: &[Relation]) -> ServiceResult<E> {
        self.repo
            .find_one(&EntityFilter::by_id(id), relations)?
            .ok_or(ServiceError::NotFound)
    }

    /// Loads one live row created by `actor_id`.
    ///
    /// A row owned by another actor is reported exactly like a missing one.
    pub fn assert_by_id_and_user(&self, id: EntityId, actor_id: ActorId) -> ServiceResult<E> {
        self.repo
            .find_one(&EntityFilter::by_id(id).owned_by(actor_id), &[])?
            .ok_or(ServiceError::NotFound)
    }

    /// Applies the defined fields of `payload` to row `id` through `scope`.
    ///
    /// Existence is asserted before the write; the write itself must affect
    /// exactly one live row.
    ///
    /// # Errors
    /// - `NotFound` when the row is missing or soft-deleted.
    /// - `Conflict` / `Internal` as for `save_transactional`.
    pub fn update_by_id_transactional(
        &self,
        id: EntityId,
        payload: &E::Patch,
        actor: Option<&Actor>,
        scope: &TransactionScope<'_>,
    ) -> ServiceResult<E> {
        let mut stamp = Audit {
            id: Some(id),
            ..Audit::default()
        };
        if let Some(actor) = actor {
            stamp.stamp_updated(actor);
        }
        let assignments = payload.assignments();

        self.assert_or_fail(id, &[])?;

        let affected = self
            .repo
            .update_by_id(scope, id, stamp.updated_by_id, &assignments)
            .map_err(|err| write_failed::<E>("update", err))?;
        check_affected(affected)?;

        self.repo
            .find_one_in(
                scope,
                &EntityFilter::by_id(id),
                &[Relation::CreatedBy, Relation::UpdatedBy],
            )?
            .ok_or(ServiceError::NotFound)
    }

    /// Marks row `id` deleted without removing it.
    pub fn soft_delete(&self, id: EntityId) -> ServiceResult<()> {
        let affected = self
            .repo
            .soft_delete_by_id(id)
            .map_err(|err| write_failed::<E>("soft_delete", err))?;
        check_affected(affected)
    }
}

/// Fails with `NotFound` when a mutation affected no rows.
pub fn check_affected(affected: usize) -> ServiceResult<()> {
    if affected == 0 {
        return Err(ServiceError::NotFound);
    }
    Ok(())
}

fn write_failed<E: Entity>(operation: &str, err: StoreError) -> ServiceError {
    warn!(
        "event=entity_write module=service kind={} operation={} status=error error_code={} error={}",
        E::KIND,
        operation,
        err.kind().as_str(),
        err
    );
    err.into()
}

#[cfg(test)]
mod tests {
    use super::check_affected;
    use crate::error::ServiceError;

    #[test]
    fn zero_affected_rows_is_not_found() {
        assert_eq!(check_affected(0), Err(ServiceError::NotFound));
        assert_eq!(check_affected(1), Ok(()));
    }
}
