//! Transactional CRUD core for the catalog.
//! Generic business primitives, concrete entity services and the SQLite
//! store they run on.

pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod pagination;
pub mod repo;
pub mod service;
pub mod store;

pub use error::{ServiceError, ServiceResult};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status, LoggingConfig};
pub use model::actor::{Actor, ActorId};
pub use model::entity::{Audit, Entity, EntityId, FieldPatch, Relation};
pub use model::product::{Product, ProductPatch};
pub use pagination::{Page, PageMeta, PageRequest, SelectQuery, SortOptions};
pub use repo::entity_repo::{EntityFilter, EntityRepository, Projection, SqliteEntityRepository};
pub use repo::user_repo::{SqliteUserRepository, UserRepository};
pub use service::business_service::{check_affected, BusinessService, SaveOptions};
pub use service::product_service::{ProductListFilter, ProductService, ProductSummary};
pub use store::{
    run_in_scope, DataSource, ScopeError, ScopeState, StoreError, StoreErrorKind,
    TransactionScope, UnitOfWork,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
