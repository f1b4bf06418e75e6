//! Acting identity attached to audited writes.
//!
//! # Invariants
//! - An `Actor` is already authenticated when it reaches core.
//! - Entities reference actors by `ActorId`; expanded actors are read-only
//!   snapshots loaded through relation expansion.

use serde::{Deserialize, Serialize};

/// Numeric user identifier, matching `users.id`.
pub type ActorId = i64;

/// Authenticated identity performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: ActorId,
    pub full_name: String,
}

impl Actor {
    pub fn new(id: ActorId, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
        }
    }
}
