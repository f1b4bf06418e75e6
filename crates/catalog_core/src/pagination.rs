//! Composable list queries and page execution.
//!
//! # Responsibility
//! - Build a filtered `SELECT` from conditions added by entity services.
//! - Execute it as one page plus a total count and shape each row.
//!
//! # Invariants
//! - Page numbers start at 1; page size is clamped to `1..=MAX_PAGE_SIZE`.
//! - Sort keys are qualified identifiers only; they are never bound as
//!   values, so they are validated before being placed in SQL.
//! - Ordering always ends with the primary key for stable pages.

use crate::error::{ServiceError, ServiceResult};
use crate::model::entity::Entity;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

static SORT_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\.[A-Za-z_][A-Za-z0-9_]*$").expect("valid sort key regex")
});
static LIKE_SPECIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\\%_])").expect("valid like escape regex"));

/// Requested page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Normalizes optional caller input into a valid window.
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Sort column (qualified, e.g. `product.title`) and direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOptions {
    pub sort_by: String,
    pub is_desc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

/// Response shaping for one list row.
pub trait ResponseShape: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// `SELECT` over one aliased table with joins and `AND`-ed conditions.
///
/// Conditions use anonymous `?` placeholders bound in insertion order.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    table: &'static str,
    alias: &'static str,
    columns: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<String>,
    bind_values: Vec<Value>,
}

impl SelectQuery {
    pub fn new(table: &'static str, alias: &'static str) -> Self {
        Self {
            table,
            alias,
            columns: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            bind_values: Vec::new(),
        }
    }

    /// Query over live rows of `E`.
    pub fn live<E: Entity>(alias: &'static str) -> Self {
        Self::new(E::TABLE, alias).and_where(format!("{alias}.deleted_at IS NULL"), [])
    }

    pub fn select(mut self, expression: impl Into<String>) -> Self {
        self.columns.push(expression.into());
        self
    }

    pub fn left_join(mut self, table: &str, alias: &str, on: &str) -> Self {
        self.joins.push(format!("LEFT JOIN {table} {alias} ON {on}"));
        self
    }

    pub fn and_where(
        mut self,
        clause: impl Into<String>,
        bind_values: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.conditions.push(clause.into());
        self.bind_values.extend(bind_values);
        self
    }

    fn from_clause(&self) -> String {
        let mut sql = format!("FROM {} {}", self.table, self.alias);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }

    fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) {}", self.from_clause())
    }

    fn page_sql(&self, sort: &SortOptions) -> String {
        let columns = if self.columns.is_empty() {
            format!("{}.*", self.alias)
        } else {
            self.columns.join(", ")
        };
        let direction = if sort.is_desc { "DESC" } else { "ASC" };
        format!(
            "SELECT {columns} {} ORDER BY {} {direction}, {}.id ASC LIMIT ? OFFSET ?",
            self.from_clause(),
            sort.sort_by,
            self.alias
        )
    }
}

/// Runs `query` as one page ordered by `sort`.
///
/// `page` is normalized first, so deserialized windows with a zero page or
/// page size behave like `PageRequest::new` input.
///
/// # Errors
/// - `InvalidInput` when `sort.sort_by` is not a qualified identifier.
/// - `Internal` on store failures.
pub fn paginate<S: ResponseShape>(
    conn: &Connection,
    query: &SelectQuery,
    page: PageRequest,
    sort: &SortOptions,
) -> ServiceResult<Page<S>> {
    let page = PageRequest::new(Some(page.page), Some(page.page_size));
    if !SORT_KEY_RE.is_match(&sort.sort_by) {
        return Err(ServiceError::InvalidInput(format!(
            "unsupported sort key `{}`",
            sort.sort_by
        )));
    }

    let total: i64 = conn.query_row(
        &query.count_sql(),
        params_from_iter(query.bind_values.iter()),
        |row| row.get(0),
    )?;

    let mut bind_values = query.bind_values.clone();
    bind_values.push(Value::Integer(i64::from(page.page_size)));
    bind_values.push(Value::Integer(page.offset()));

    let mut stmt = conn.prepare(&query.page_sql(sort))?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(S::from_row(row)?);
    }

    let total_items = u64::try_from(total).unwrap_or(0);
    let page_size = u64::from(page.page_size);
    Ok(Page {
        items,
        meta: PageMeta {
            page: page.page,
            page_size: page.page_size,
            total_items,
            total_pages: total_items.div_ceil(page_size),
        },
    })
}

/// Escapes `LIKE` wildcards so `value` matches literally with `ESCAPE '\'`.
pub fn escape_like(value: &str) -> String {
    LIKE_SPECIAL_RE.replace_all(value, r"\${1}").into_owned()
}
