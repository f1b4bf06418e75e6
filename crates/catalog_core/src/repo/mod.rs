//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts used by the business services.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories report missing rows as `None` or a zero affected count;
//!   mapping to `NotFound` happens in the service layer.

pub mod entity_repo;
pub mod user_repo;
