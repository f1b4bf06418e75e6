//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise one create/update/list/delete cycle against an in-memory
//!   database to verify `catalog_core` wiring.
//! - Keep output deterministic for quick local sanity checks.

use catalog_core::db::open_db_in_memory;
use catalog_core::{
    ProductListFilter, ProductPatch, ProductService, SqliteUserRepository, UserRepository,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("catalog_core smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("catalog_core version={}", catalog_core::core_version());

    let conn = open_db_in_memory()?;
    let owner = SqliteUserRepository::new(&conn).create_user("Smoke Tester")?;
    let service = ProductService::new(&conn);

    let created = service.create(&ProductPatch::titled("Sample"), &owner)?;
    println!(
        "created id={:?} title={} created_by_id={:?}",
        created.audit.id, created.title, created.audit.created_by_id
    );

    let id = created.audit.id.ok_or("created product has no id")?;
    let updated = service.update(
        id,
        &ProductPatch {
            price_cents: Some(1250),
            ..ProductPatch::default()
        },
        &owner,
    )?;
    println!(
        "updated id={id} price_cents={} updated_by_id={:?}",
        updated.price_cents, updated.audit.updated_by_id
    );

    let page = service.get_all(
        &ProductListFilter {
            created_by_me: true,
            ..ProductListFilter::default()
        },
        Some(&owner),
    )?;
    println!("listed total_items={}", page.meta.total_items);

    service.delete(id, &owner)?;
    println!("deleted id={id} visible={}", service.get_one(id).is_ok());
    Ok(())
}
