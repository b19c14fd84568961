// Behaviour every store with deletes must share, run against the memory
// store and against the relational client on SQLite.

use polystore_domain::{
    collect_records, Connect, Delete, Record, SchemaDescriptor, SchemaOutcome, StoreClient,
};

use crate::relational::open_test;
use crate::{MemoryStore, MemoryTarget, Predicate, SqlClient, SqlFilter};

trait Fixture: StoreClient + Delete {
    fn by_id(id: &str) -> Self::Filter;
    fn by_name(name: &str) -> Self::Filter;
    fn name_contains(needle: &str) -> Self::Filter;
}

impl Fixture for MemoryStore {
    fn by_id(id: &str) -> Predicate {
        Predicate::eq("id", id)
    }

    fn by_name(name: &str) -> Predicate {
        Predicate::eq("name", name)
    }

    fn name_contains(needle: &str) -> Predicate {
        Predicate::contains("name", needle)
    }
}

impl Fixture for SqlClient {
    fn by_id(id: &str) -> SqlFilter {
        SqlFilter::eq("id", id)
    }

    fn by_name(name: &str) -> SqlFilter {
        SqlFilter::eq("name", name)
    }

    fn name_contains(needle: &str) -> SqlFilter {
        SqlFilter::contains("name", needle)
    }
}

fn tags() -> SchemaDescriptor {
    SchemaDescriptor::new("tags")
        .text("id", 50)
        .text("name", 50)
        .key(["id"])
}

fn tag(id: &str, name: &str) -> Record {
    Record::new().with("id", id).with("name", name)
}

async fn find_all<S: Fixture>(store: &S, filter: &S::Filter) -> Vec<Record> {
    collect_records(store.find(filter, None).await.unwrap())
        .await
        .unwrap()
}

async fn check_all<S: Fixture>(store: &S) {
    assert_eq!(
        store.create_schema(&tags()).await.unwrap(),
        SchemaOutcome::Created
    );
    assert_eq!(
        store.create_schema(&tags()).await.unwrap(),
        SchemaOutcome::AlreadyExists
    );

    // Insert then find by key
    let result = store
        .insert(vec![tag("123", "Rachit"), tag("4", "TEST4")])
        .await
        .unwrap();
    assert_eq!(result.inserted, 2);
    assert_eq!(
        find_all(store, &S::by_id("123")).await,
        vec![tag("123", "Rachit")]
    );

    // A failing batch writes nothing
    let err = store
        .insert(vec![tag("1", "a"), tag("123", "dup")])
        .await;
    assert!(err.is_err());
    assert!(find_all(store, &S::by_id("1")).await.is_empty());

    // Substring scenario
    assert_eq!(
        find_all(store, &S::name_contains("Rach")).await,
        vec![tag("123", "Rachit")]
    );
    assert!(find_all(store, &S::name_contains("Zzz")).await.is_empty());

    // Update twice
    let mutation = Record::new().with("name", "dummy");
    let first = store.update(&S::by_name("TEST4"), &mutation).await.unwrap();
    assert_eq!(first.matched, 1);
    let second = store.update(&S::by_name("TEST4"), &mutation).await.unwrap();
    assert_eq!(second.matched, 0);

    store.update(&S::by_id("4"), &mutation).await.unwrap();
    let before = find_all(store, &S::by_id("4")).await;
    store.update(&S::by_id("4"), &mutation).await.unwrap();
    assert_eq!(find_all(store, &S::by_id("4")).await, before);
    assert_eq!(before, vec![tag("4", "dummy")]);

    // Delete then find
    let deleted = store.delete_matching(&S::by_id("4")).await.unwrap();
    assert_eq!(deleted.deleted, 1);
    assert!(find_all(store, &S::by_id("4")).await.is_empty());

    store.close().await;
    assert!(store.insert(vec![tag("5", "x")]).await.is_err());
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = MemoryStore::connect(&MemoryTarget::default()).await.unwrap();
    check_all(&store).await;
}

#[tokio::test]
async fn test_sql_client_contract() {
    let (_handle, db) = open_test().await;
    check_all(&db).await;
}
