//! User repository.
//!
//! # Responsibility
//! - Persist the identities referenced by audit foreign keys.
//!
//! # Invariants
//! - Users are never deleted here; audit references stay resolvable.

use crate::model::actor::{Actor, ActorId};
use crate::store::StoreResult;
use rusqlite::{Connection, OptionalExtension};

pub trait UserRepository {
    fn create_user(&self, full_name: &str) -> StoreResult<Actor>;
    fn get_user(&self, id: ActorId) -> StoreResult<Option<Actor>>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, full_name: &str) -> StoreResult<Actor> {
        self.conn
            .execute("INSERT INTO users (full_name) VALUES (?1);", [full_name])?;
        Ok(Actor::new(self.conn.last_insert_rowid(), full_name))
    }

    fn get_user(&self, id: ActorId) -> StoreResult<Option<Actor>> {
        let actor = self
            .conn
            .query_row(
                "SELECT id, full_name FROM users WHERE id = ?1;",
                [id],
                |row| Ok(Actor::new(row.get(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(actor)
    }
}
