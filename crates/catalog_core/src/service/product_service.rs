//! Product use-case service.
//!
//! # Responsibility
//! - Run product create/update inside transaction scopes.
//! - Enforce ownership before mutating.
//! - Compose filtered, sorted product listings.
//!
//! # Invariants
//! - Ownership is checked before any write of `update` and `delete`.
//! - Every scope opened here is released exactly once.
//! - `created_by_me` without an actor is `Unauthorized`, not an empty page.

use crate::error::{ServiceError, ServiceResult};
use crate::model::actor::{Actor, ActorId};
use crate::model::entity::{EntityId, Relation};
use crate::model::product::{Product, ProductPatch, PRODUCT_SORTABLE_COLUMNS};
use crate::pagination::{
    escape_like, paginate, Page, PageRequest, ResponseShape, SelectQuery, SortOptions,
};
use crate::repo::entity_repo::SqliteEntityRepository;
use crate::service::business_service::{BusinessService, SaveOptions};
use crate::store::{run_in_scope, DataSource};
use log::{error, info};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

const PRODUCT_ALIAS: &str = "product";
const DEFAULT_SORT_COLUMN: &str = "created_at";

/// Listing filter accepted by `ProductService::get_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductListFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Case-insensitive substring match on `title`.
    pub search: Option<String>,
    /// Unqualified column from `PRODUCT_SORTABLE_COLUMNS`.
    pub sort_by: Option<String>,
    pub is_desc: bool,
    /// Only products created by the calling actor.
    pub created_by_me: bool,
    /// Only products created by this actor.
    pub created_by_id: Option<ActorId>,
}

/// List row returned by `get_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: EntityId,
    pub title: String,
    pub price_cents: i64,
    pub created_at: i64,
    pub created_by_id: Option<ActorId>,
    pub created_by_full_name: Option<String>,
}

impl ResponseShape for ProductSummary {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            price_cents: row.get("price_cents")?,
            created_at: row.get("created_at")?,
            created_by_id: row.get("created_by_id")?,
            created_by_full_name: row.get("created_by_full_name")?,
        })
    }
}

pub type ProductBusinessService<'conn> =
    BusinessService<Product, SqliteEntityRepository<'conn, Product>>;

/// Product service over one connection.
pub struct ProductService<'conn> {
    business: ProductBusinessService<'conn>,
    source: DataSource<'conn>,
}

impl<'conn> ProductService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            business: BusinessService::new(SqliteEntityRepository::new(conn)),
            source: DataSource::new(conn),
        }
    }

    /// Creates one product owned by `actor`.
    pub fn create(&self, payload: &ProductPatch, actor: &Actor) -> ServiceResult<Product> {
        let result = run_in_scope(self.source.create_scope(), |scope| {
            self.business
                .save_transactional(payload, Some(actor), scope, SaveOptions::default())
        });
        log_outcome("product_create", None, actor, &result);
        result
    }

    /// Applies `payload` to product `id` when `actor` owns it.
    ///
    /// Returns the product re-read with `created_by` expanded.
    pub fn update(
        &self,
        id: EntityId,
        payload: &ProductPatch,
        actor: &Actor,
    ) -> ServiceResult<Product> {
        let result = run_in_scope(self.source.create_scope(), |scope| {
            self.business.assert_by_id_and_user(id, actor.id)?;
            self.business
                .update_by_id_transactional(id, payload, Some(actor), scope)
        })
        .and_then(|_| self.business.find_one_by_id(id, &[Relation::CreatedBy]));
        log_outcome("product_update", Some(id), actor, &result);
        result
    }

    /// Soft-deletes product `id` when `actor` owns it.
    ///
    /// Single-row logical delete; runs without a transaction scope.
    pub fn delete(&self, id: EntityId, actor: &Actor) -> ServiceResult<()> {
        let result = self
            .business
            .assert_by_id_and_user(id, actor.id)
            .and_then(|_| self.business.soft_delete(id));
        log_outcome("product_delete", Some(id), actor, &result);
        result
    }

    /// Lists live products as one page.
    ///
    /// # Errors
    /// - `Unauthorized` when `created_by_me` is set without an actor.
    /// - `InvalidInput` when `sort_by` is not a sortable column.
    pub fn get_all(
        &self,
        filter: &ProductListFilter,
        actor: Option<&Actor>,
    ) -> ServiceResult<Page<ProductSummary>> {
        let mut query = SelectQuery::live::<Product>(PRODUCT_ALIAS)
            .select("product.id AS id")
            .select("product.title AS title")
            .select("product.price_cents AS price_cents")
            .select("product.created_at AS created_at")
            .select("product.created_by_id AS created_by_id")
            .left_join("users", "creator", "creator.id = product.created_by_id")
            .select("creator.full_name AS created_by_full_name");

        if filter.created_by_me {
            let actor = actor.ok_or(ServiceError::Unauthorized)?;
            query = query.and_where("product.created_by_id = ?", [Value::Integer(actor.id)]);
        }

        if let Some(created_by_id) = filter.created_by_id {
            query = query.and_where(
                "product.created_by_id = ?",
                [Value::Integer(created_by_id)],
            );
        }

        if let Some(search) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            query = query.and_where(
                "product.title LIKE ? ESCAPE '\\'",
                [Value::Text(format!("%{}%", escape_like(search)))],
            );
        }

        let sort = SortOptions {
            sort_by: qualified_sort_column(filter.sort_by.as_deref())?,
            is_desc: filter.is_desc,
        };

        paginate(
            self.source.connection(),
            &query,
            PageRequest::new(filter.page, filter.page_size),
            &sort,
        )
    }

    /// Loads one live product with `created_by` expanded.
    pub fn get_one(&self, id: EntityId) -> ServiceResult<Product> {
        self.business.find_one_by_id(id, &[Relation::CreatedBy])
    }
}

fn qualified_sort_column(sort_by: Option<&str>) -> ServiceResult<String> {
    let column = match sort_by.map(str::trim).filter(|value| !value.is_empty()) {
        None => DEFAULT_SORT_COLUMN,
        Some(requested) => PRODUCT_SORTABLE_COLUMNS
            .iter()
            .find(|column| **column == requested)
            .copied()
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("cannot sort products by `{requested}`"))
            })?,
    };
    Ok(format!("{PRODUCT_ALIAS}.{column}"))
}

fn log_outcome<T>(
    event: &str,
    id: Option<EntityId>,
    actor: &Actor,
    result: &ServiceResult<T>,
) {
    let target = id.map_or_else(|| "new".to_string(), |id| id.to_string());
    match result {
        Ok(_) => info!(
            "event={event} module=service status=ok product_id={target} actor_id={}",
            actor.id
        ),
        Err(ServiceError::Internal(message)) => error!(
            "event={event} module=service status=error product_id={target} actor_id={} error_code=internal error={message}",
            actor.id
        ),
        Err(err) => info!(
            "event={event} module=service status=rejected product_id={target} actor_id={} error_code={}",
            actor.id,
            err.code()
        ),
    }
}
