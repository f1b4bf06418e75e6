//! Use-case services.
//!
//! # Responsibility
//! - `business_service`: generic CRUD primitives for any entity kind.
//! - Concrete services: transaction scopes, ownership and listings per kind.

pub mod business_service;
pub mod product_service;
