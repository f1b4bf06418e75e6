use catalog_core::db::open_db_in_memory;
use catalog_core::{
    Actor, ProductListFilter, ProductPatch, ProductService, ServiceError, SqliteUserRepository,
    UserRepository,
};
use rusqlite::Connection;

fn user(conn: &Connection, name: &str) -> Actor {
    SqliteUserRepository::new(conn).create_user(name).unwrap()
}

fn priced(title: &str, price_cents: i64) -> ProductPatch {
    ProductPatch {
        title: Some(title.to_string()),
        price_cents: Some(price_cents),
        ..ProductPatch::default()
    }
}

#[test]
fn create_update_delete_lifecycle() {
    let conn = open_db_in_memory().unwrap();
    let user1 = user(&conn, "User One");
    let user2 = user(&conn, "User Two");
    let service = ProductService::new(&conn);

    let created = service.create(&ProductPatch::titled("A"), &user1).unwrap();
    assert_eq!(created.audit.id, Some(1));
    assert_eq!(created.audit.created_by_id, Some(1));

    let err = service
        .update(1, &ProductPatch::titled("B"), &user2)
        .unwrap_err();
    assert_eq!(err, ServiceError::NotFound);
    let unchanged = service.get_one(1).unwrap();
    assert_eq!(unchanged.title, "A");
    assert_eq!(unchanged.audit.updated_by_id, None);

    let updated = service
        .update(1, &ProductPatch::titled("B"), &user1)
        .unwrap();
    assert_eq!(updated.title, "B");
    assert_eq!(updated.audit.updated_by_id, Some(1));
    assert_eq!(
        updated.audit.created_by.as_ref().map(|a| a.full_name.as_str()),
        Some("User One")
    );

    service.delete(1, &user1).unwrap();
    assert_eq!(service.get_one(1), Err(ServiceError::NotFound));

    let deleted_at: Option<i64> = conn
        .query_row("SELECT deleted_at FROM products WHERE id = 1;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert!(deleted_at.is_some());
    assert!(conn.is_autocommit());
}

#[test]
fn create_conflict_releases_scope_and_keeps_first_row() {
    let conn = open_db_in_memory().unwrap();
    let ada = user(&conn, "Ada");
    let service = ProductService::new(&conn);

    service.create(&priced("Lamp", 100), &ada).unwrap();
    let err = service.create(&priced("Lamp", 200), &ada).unwrap_err();

    assert!(matches!(err, ServiceError::Conflict(_)));
    assert!(conn.is_autocommit());
    let stored = service.get_one(1).unwrap();
    assert_eq!(stored.price_cents, 100);

    let next = service.create(&priced("Desk", 300), &ada).unwrap();
    assert_eq!(next.title, "Desk");
}

#[test]
fn update_of_missing_product_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let ada = user(&conn, "Ada");
    let service = ProductService::new(&conn);

    let err = service
        .update(5, &ProductPatch::titled("Nope"), &ada)
        .unwrap_err();

    assert_eq!(err, ServiceError::NotFound);
    assert!(conn.is_autocommit());
}

#[test]
fn delete_by_non_owner_is_not_found_and_keeps_product() {
    let conn = open_db_in_memory().unwrap();
    let ada = user(&conn, "Ada");
    let bob = user(&conn, "Bob");
    let service = ProductService::new(&conn);
    service.create(&ProductPatch::titled("Lamp"), &ada).unwrap();

    assert_eq!(service.delete(1, &bob), Err(ServiceError::NotFound));
    assert!(service.get_one(1).is_ok());

    service.delete(1, &ada).unwrap();
    assert_eq!(service.delete(1, &ada), Err(ServiceError::NotFound));
}

#[test]
fn title_is_reusable_after_soft_delete() {
    let conn = open_db_in_memory().unwrap();
    let ada = user(&conn, "Ada");
    let service = ProductService::new(&conn);
    service.create(&ProductPatch::titled("Lamp"), &ada).unwrap();
    service.delete(1, &ada).unwrap();

    let again = service.create(&ProductPatch::titled("Lamp"), &ada).unwrap();

    assert_eq!(again.audit.id, Some(2));
}

#[test]
fn created_by_me_without_actor_is_unauthorized() {
    let conn = open_db_in_memory().unwrap();
    let service = ProductService::new(&conn);
    let filter = ProductListFilter {
        created_by_me: true,
        ..ProductListFilter::default()
    };

    assert_eq!(service.get_all(&filter, None), Err(ServiceError::Unauthorized));
}

#[test]
fn get_all_filters_by_owner_and_search() {
    let conn = open_db_in_memory().unwrap();
    let ada = user(&conn, "Ada");
    let bob = user(&conn, "Bob");
    let service = ProductService::new(&conn);
    service.create(&priced("Brass Lamp", 100), &ada).unwrap();
    service.create(&priced("Desk Lamp", 200), &bob).unwrap();
    service.create(&priced("Oak Desk", 300), &ada).unwrap();
    service.create(&priced("100% Wool", 400), &bob).unwrap();

    let mine = service
        .get_all(
            &ProductListFilter {
                created_by_me: true,
                sort_by: Some("title".to_string()),
                ..ProductListFilter::default()
            },
            Some(&ada),
        )
        .unwrap();
    let titles: Vec<_> = mine.items.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Brass Lamp", "Oak Desk"]);
    assert!(mine
        .items
        .iter()
        .all(|p| p.created_by_full_name.as_deref() == Some("Ada")));

    let lamps = service
        .get_all(
            &ProductListFilter {
                search: Some("lamp".to_string()),
                sort_by: Some("price_cents".to_string()),
                is_desc: true,
                ..ProductListFilter::default()
            },
            None,
        )
        .unwrap();
    let titles: Vec<_> = lamps.items.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Desk Lamp", "Brass Lamp"]);
    assert_eq!(lamps.meta.total_items, 2);

    let literal_percent = service
        .get_all(
            &ProductListFilter {
                search: Some("0%".to_string()),
                ..ProductListFilter::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(literal_percent.items.len(), 1);
    assert_eq!(literal_percent.items[0].title, "100% Wool");

    let by_bob = service
        .get_all(
            &ProductListFilter {
                created_by_id: Some(bob.id),
                ..ProductListFilter::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(by_bob.meta.total_items, 2);
}

#[test]
fn search_term_is_trimmed_and_blank_search_is_ignored() {
    let conn = open_db_in_memory().unwrap();
    let ada = user(&conn, "Ada");
    let service = ProductService::new(&conn);
    service.create(&priced("Desk Lamp", 100), &ada).unwrap();
    service.create(&priced("Oak Desk", 200), &ada).unwrap();
    let search = |term: &str| ProductListFilter {
        search: Some(term.to_string()),
        ..ProductListFilter::default()
    };

    let padded = service.get_all(&search("  lamp "), None).unwrap();
    assert_eq!(padded.meta.total_items, 1);
    assert_eq!(padded.items[0].title, "Desk Lamp");

    let blank = service.get_all(&search("   "), None).unwrap();
    assert_eq!(blank.meta.total_items, 2);
}

#[test]
fn get_all_pages_and_excludes_deleted() {
    let conn = open_db_in_memory().unwrap();
    let ada = user(&conn, "Ada");
    let service = ProductService::new(&conn);
    for index in 1..=5 {
        service
            .create(&priced(&format!("Item {index}"), index * 10), &ada)
            .unwrap();
    }
    service.delete(3, &ada).unwrap();

    let page = service
        .get_all(
            &ProductListFilter {
                page: Some(2),
                page_size: Some(3),
                sort_by: Some("id".to_string()),
                ..ProductListFilter::default()
            },
            None,
        )
        .unwrap();

    assert_eq!(page.meta.total_items, 4);
    assert_eq!(page.meta.total_pages, 2);
    let ids: Vec<_> = page.items.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![5]);
}

#[test]
fn get_all_rejects_unknown_sort_column() {
    let conn = open_db_in_memory().unwrap();
    let service = ProductService::new(&conn);
    let filter = ProductListFilter {
        sort_by: Some("title; DROP TABLE products".to_string()),
        ..ProductListFilter::default()
    };

    assert!(matches!(
        service.get_all(&filter, None),
        Err(ServiceError::InvalidInput(_))
    ));
}

#[test]
fn payloads_deserialize_sparsely_and_reject_unknown_keys() {
    let patch: ProductPatch = serde_json::from_str(r#"{"priceCents": 250}"#).unwrap();
    assert_eq!(patch.title, None);
    assert_eq!(patch.description, None);
    assert_eq!(patch.price_cents, Some(250));

    let mass_assignment =
        serde_json::from_str::<ProductPatch>(r#"{"title": "x", "createdById": 9}"#);
    assert!(mass_assignment.is_err());

    let filter: ProductListFilter =
        serde_json::from_str(r#"{"page": 2, "createdByMe": true, "isDesc": true}"#).unwrap();
    assert_eq!(filter.page, Some(2));
    assert!(filter.created_by_me);
    assert!(filter.is_desc);
    assert_eq!(filter.sort_by, None);
}

#[test]
fn product_serializes_with_flattened_audit() {
    let conn = open_db_in_memory().unwrap();
    let ada = user(&conn, "Ada");
    let service = ProductService::new(&conn);
    let product = service.create(&ProductPatch::titled("Lamp"), &ada).unwrap();

    let json = serde_json::to_value(&product).unwrap();

    assert_eq!(json["id"], 1);
    assert_eq!(json["title"], "Lamp");
    assert_eq!(json["createdById"], ada.id);
    assert_eq!(json["createdBy"]["fullName"], "Ada");
    assert!(json["deletedAt"].is_null());
}
