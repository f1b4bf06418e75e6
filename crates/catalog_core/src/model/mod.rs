//! Domain model for audited, soft-deletable entities.
//!
//! # Responsibility
//! - Define the entity contract consumed by the generic business service.
//! - Define concrete entity kinds and their sparse update payloads.
//!
//! # Invariants
//! - Every entity embeds one `Audit` block with id, actor stamps and the
//!   soft-delete marker.
//! - Deletion is represented by `deleted_at`, never by physical removal.

pub mod actor;
pub mod entity;
pub mod product;
