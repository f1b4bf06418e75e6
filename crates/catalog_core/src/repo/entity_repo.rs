//! Generic entity repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide predicate lookup with relation expansion and field projection.
//! - Provide insert/update through an active transaction scope.
//! - Provide soft delete by id.
//!
//! # Invariants
//! - Default reads exclude rows with `deleted_at` set.
//! - Writes only touch columns declared by `Entity::FIELDS` plus audit
//!   columns.
//! - Write methods report affected-row counts; interpreting zero is the
//!   caller's job.

use crate::model::actor::{Actor, ActorId};
use crate::model::entity::{Assignment, Entity, EntityId, Relation};
use crate::store::{StoreError, StoreErrorKind, StoreResult, TransactionScope};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::marker::PhantomData;

const NOW_MS_SQL: &str = "(strftime('%s', 'now') * 1000)";

/// Row predicate for single-entity lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityFilter {
    pub id: EntityId,
    /// Restricts the match to rows created by this actor.
    pub created_by_id: Option<ActorId>,
    pub include_deleted: bool,
}

impl EntityFilter {
    pub fn by_id(id: EntityId) -> Self {
        Self {
            id,
            created_by_id: None,
            include_deleted: false,
        }
    }

    pub fn owned_by(mut self, actor_id: ActorId) -> Self {
        self.created_by_id = Some(actor_id);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// Minimal read of `id` plus a set of named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub id: EntityId,
    pub values: BTreeMap<&'static str, Value>,
}

impl Projection {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}

/// Persistence contract used by the generic business service.
pub trait EntityRepository<E: Entity> {
    /// Reads one row outside any scope.
    fn find_one(&self, filter: &EntityFilter, relations: &[Relation]) -> StoreResult<Option<E>>;
    /// Reads one row through the scope's transaction.
    fn find_one_in(
        &self,
        scope: &TransactionScope<'_>,
        filter: &EntityFilter,
        relations: &[Relation],
    ) -> StoreResult<Option<E>>;
    /// Reads `id` plus `columns` of one live row.
    fn find_projection(
        &self,
        id: EntityId,
        columns: &[&'static str],
    ) -> StoreResult<Option<Projection>>;
    /// Inserts `record` and returns the assigned id.
    fn insert(&self, scope: &TransactionScope<'_>, record: &E) -> StoreResult<EntityId>;
    /// Applies `assignments` to one live row and returns the affected count.
    fn update_by_id(
        &self,
        scope: &TransactionScope<'_>,
        id: EntityId,
        updated_by_id: Option<ActorId>,
        assignments: &[Assignment],
    ) -> StoreResult<usize>;
    /// Marks one live row deleted and returns the affected count.
    fn soft_delete_by_id(&self, id: EntityId) -> StoreResult<usize>;
}

/// SQLite-backed repository for one entity kind.
pub struct SqliteEntityRepository<'conn, E> {
    conn: &'conn Connection,
    _kind: PhantomData<fn() -> E>,
}

impl<'conn, E: Entity> SqliteEntityRepository<'conn, E> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            _kind: PhantomData,
        }
    }
}

impl<E: Entity> EntityRepository<E> for SqliteEntityRepository<'_, E> {
    fn find_one(&self, filter: &EntityFilter, relations: &[Relation]) -> StoreResult<Option<E>> {
        select_one(self.conn, filter, relations)
    }

    fn find_one_in(
        &self,
        scope: &TransactionScope<'_>,
        filter: &EntityFilter,
        relations: &[Relation],
    ) -> StoreResult<Option<E>> {
        select_one(scope.connection()?, filter, relations)
    }

    fn find_projection(
        &self,
        id: EntityId,
        columns: &[&'static str],
    ) -> StoreResult<Option<Projection>> {
        let mut selected = vec!["id"];
        selected.extend(columns.iter().copied().filter(|column| *column != "id"));
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1 AND deleted_at IS NULL;",
            selected.join(", "),
            E::TABLE
        );

        let projection = self
            .conn
            .query_row(&sql, [id], |row| {
                let mut values = BTreeMap::new();
                for (index, column) in selected.iter().enumerate().skip(1) {
                    values.insert(*column, row.get::<_, Value>(index)?);
                }
                Ok(Projection {
                    id: row.get(0)?,
                    values,
                })
            })
            .optional()?;
        Ok(projection)
    }

    fn insert(&self, scope: &TransactionScope<'_>, record: &E) -> StoreResult<EntityId> {
        let conn = scope.connection()?;
        let mut assignments = record.field_values();
        ensure_declared::<E>(&assignments)?;

        let audit = record.audit();
        assignments.push(("created_by_id", optional_integer(audit.created_by_id)));
        assignments.push(("updated_by_id", optional_integer(audit.updated_by_id)));

        let columns: Vec<&str> = assignments.iter().map(|(column, _)| *column).collect();
        let placeholders: Vec<String> = (1..=assignments.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            E::TABLE,
            columns.join(", "),
            placeholders.join(", ")
        );

        conn.execute(
            &sql,
            params_from_iter(assignments.into_iter().map(|(_, value)| value)),
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_by_id(
        &self,
        scope: &TransactionScope<'_>,
        id: EntityId,
        updated_by_id: Option<ActorId>,
        assignments: &[Assignment],
    ) -> StoreResult<usize> {
        let conn = scope.connection()?;
        ensure_declared::<E>(assignments)?;

        let mut sets: Vec<String> = Vec::with_capacity(assignments.len() + 2);
        let mut bind_values: Vec<Value> = Vec::with_capacity(assignments.len() + 2);
        for (column, value) in assignments {
            sets.push(format!("{column} = ?"));
            bind_values.push(value.clone());
        }
        if let Some(actor_id) = updated_by_id {
            sets.push("updated_by_id = ?".to_string());
            bind_values.push(Value::Integer(actor_id));
        }
        sets.push(format!("updated_at = {NOW_MS_SQL}"));
        bind_values.push(Value::Integer(id));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? AND deleted_at IS NULL;",
            E::TABLE,
            sets.join(", ")
        );
        let changed = conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed)
    }

    fn soft_delete_by_id(&self, id: EntityId) -> StoreResult<usize> {
        let sql = format!(
            "UPDATE {}
             SET
                deleted_at = {NOW_MS_SQL},
                updated_at = {NOW_MS_SQL}
             WHERE id = ?1
               AND deleted_at IS NULL;",
            E::TABLE
        );
        let changed = self.conn.execute(&sql, [id])?;
        Ok(changed)
    }
}

fn select_one<E: Entity>(
    conn: &Connection,
    filter: &EntityFilter,
    relations: &[Relation],
) -> StoreResult<Option<E>> {
    let sql = format!(
        "{}
         WHERE t.id = ?1
           AND (?2 IS NULL OR t.created_by_id = ?2)
           AND (?3 = 1 OR t.deleted_at IS NULL);",
        select_sql::<E>(relations)
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![
        filter.id,
        filter.created_by_id,
        bool_to_int(filter.include_deleted),
    ])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_entity_row(row, relations)?));
    }

    Ok(None)
}

fn select_sql<E: Entity>(relations: &[Relation]) -> String {
    let mut columns: Vec<String> = vec![
        "t.id AS id".to_string(),
        "t.created_by_id AS created_by_id".to_string(),
        "t.updated_by_id AS updated_by_id".to_string(),
        "t.created_at AS created_at".to_string(),
        "t.updated_at AS updated_at".to_string(),
        "t.deleted_at AS deleted_at".to_string(),
    ];
    columns.extend(E::FIELDS.iter().map(|field| format!("t.{field} AS {field}")));

    let mut joins = String::new();
    for relation in relations {
        let alias = relation.join_alias();
        columns.push(format!("{alias}.full_name AS {alias}_full_name"));
        joins.push_str(&format!(
            " LEFT JOIN users {alias} ON {alias}.id = t.{}",
            relation.foreign_key()
        ));
    }

    format!("SELECT {} FROM {} t{}", columns.join(", "), E::TABLE, joins)
}

fn parse_entity_row<E: Entity>(row: &Row<'_>, relations: &[Relation]) -> rusqlite::Result<E> {
    let mut entity = E::read_fields(row)?;
    let audit = entity.audit_mut();
    audit.id = Some(row.get("id")?);
    audit.created_by_id = row.get("created_by_id")?;
    audit.updated_by_id = row.get("updated_by_id")?;
    audit.created_at = row.get("created_at")?;
    audit.updated_at = row.get("updated_at")?;
    audit.deleted_at = row.get("deleted_at")?;

    for relation in relations {
        let full_name: Option<String> =
            row.get(format!("{}_full_name", relation.join_alias()).as_str())?;
        match relation {
            Relation::CreatedBy => {
                audit.created_by = expand_actor(audit.created_by_id, full_name);
            }
            Relation::UpdatedBy => {
                audit.updated_by = expand_actor(audit.updated_by_id, full_name);
            }
        }
    }

    Ok(entity)
}

fn expand_actor(id: Option<ActorId>, full_name: Option<String>) -> Option<Actor> {
    match (id, full_name) {
        (Some(id), Some(full_name)) => Some(Actor { id, full_name }),
        _ => None,
    }
}

fn ensure_declared<E: Entity>(assignments: &[Assignment]) -> StoreResult<()> {
    for (column, _) in assignments {
        if !E::FIELDS.contains(column) {
            return Err(StoreError::new(
                StoreErrorKind::Unknown,
                format!("column `{column}` is not declared for {}", E::KIND),
            ));
        }
    }
    Ok(())
}

fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
