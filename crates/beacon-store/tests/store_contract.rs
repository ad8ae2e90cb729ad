//! Behaviour every `DataStore` must share, exercised through a trait object.

use beacon_store::{DataStore, MemoryStore, Record, StoreError, MESSAGES, REVIEWS, USERS};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn store() -> Arc<dyn DataStore> {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn test_crud_lifecycle() {
    let store = store();

    let user = store
        .insert(&USERS, record(json!({"name": "Ada", "email": "ada@example.com"})))
        .await
        .unwrap();
    let user_id = user["id"].as_i64().unwrap();

    let review = store
        .insert(
            &REVIEWS,
            REVIEWS.coerce(&record(json!({"user_id": user_id.to_string(), "rating": "4"}))).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(review["rating"], json!(4));

    let review_id = review["id"].as_i64().unwrap();
    let updated = store
        .update(&REVIEWS, review_id, record(json!({"comment": "solid"})))
        .await
        .unwrap();
    assert_eq!(updated["comment"], json!("solid"));
    assert_eq!(updated["rating"], json!(4));

    assert_eq!(store.list(&REVIEWS).await.unwrap().len(), 1);
    store.delete(&REVIEWS, review_id).await.unwrap();
    assert!(store.list(&REVIEWS).await.unwrap().is_empty());

    store.delete(&USERS, user_id).await.unwrap();
    assert!(matches!(
        store.get(&USERS, user_id).await,
        Err(StoreError::NotFound { table: "users", .. })
    ));
}

#[tokio::test]
async fn test_list_is_ordered_by_id() {
    let store = store();
    for n in 0..5 {
        store
            .insert(&USERS, record(json!({"name": format!("u{n}"), "email": format!("u{n}@x.test")})))
            .await
            .unwrap();
    }
    let ids: Vec<i64> = store
        .list(&USERS)
        .await
        .unwrap()
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_concurrent_inserts_get_distinct_ids() {
    let store = store();
    let user = store
        .insert(&USERS, record(json!({"name": "Ada", "email": "ada@example.com"})))
        .await
        .unwrap();
    let user_id = user["id"].clone();

    let mut tasks = Vec::new();
    for n in 0..50 {
        let store = Arc::clone(&store);
        let user_id = user_id.clone();
        tasks.push(tokio::spawn(async move {
            store
                .insert(&MESSAGES, record(json!({"user_id": user_id, "content": format!("m{n}")})))
                .await
                .unwrap()["id"]
                .as_i64()
                .unwrap()
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        assert!(ids.insert(task.await.unwrap()));
    }
    assert_eq!(ids.len(), 50);
}

#[tokio::test]
async fn test_ping_and_backend() {
    let store = store();
    store.ping().await.unwrap();
    assert_eq!(store.backend(), "memory");
}
