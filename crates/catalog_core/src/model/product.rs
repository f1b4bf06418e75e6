//! Product entity.
//!
//! # Invariants
//! - `title` is unique among live products (enforced by storage).
//! - `price_cents` is non-negative (enforced by storage).

use crate::model::entity::{Assignment, Audit, Entity, FieldPatch};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Columns a product listing may be sorted by.
pub const PRODUCT_SORTABLE_COLUMNS: &[&str] =
    &["id", "title", "price_cents", "created_at", "updated_at"];

/// Persisted product record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(flatten)]
    pub audit: Audit,
    pub title: String,
    pub description: Option<String>,
    /// Price in minor currency units.
    pub price_cents: i64,
}

/// Sparse create/update payload for products.
///
/// Absent keys deserialize to `None` and mean "leave unchanged". Unknown keys
/// are rejected at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
}

impl ProductPatch {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

impl FieldPatch for ProductPatch {
    fn assignments(&self) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        if let Some(title) = &self.title {
            assignments.push(("title", Value::Text(title.clone())));
        }
        if let Some(description) = &self.description {
            assignments.push(("description", Value::Text(description.clone())));
        }
        if let Some(price_cents) = self.price_cents {
            assignments.push(("price_cents", Value::Integer(price_cents)));
        }
        assignments
    }
}

impl Entity for Product {
    type Patch = ProductPatch;

    const KIND: &'static str = "product";
    const TABLE: &'static str = "products";
    const FIELDS: &'static [&'static str] = &["title", "description", "price_cents"];

    fn blank() -> Self {
        Self::default()
    }

    fn merge(&mut self, patch: &ProductPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(price_cents) = patch.price_cents {
            self.price_cents = price_cents;
        }
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn field_values(&self) -> Vec<Assignment> {
        vec![
            ("title", Value::Text(self.title.clone())),
            (
                "description",
                self.description.clone().map_or(Value::Null, Value::Text),
            ),
            ("price_cents", Value::Integer(self.price_cents)),
        ]
    }

    fn read_fields(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            audit: Audit::default(),
            title: row.get("title")?,
            description: row.get("description")?,
            price_cents: row.get("price_cents")?,
        })
    }
}
