//! In-memory data store.
//!
//! Tables are `BTreeMap`s keyed by id behind one `RwLock`, so cross-table
//! reference checks see a consistent view. Ids are assigned from a
//! per-table counter and never reused. The lock is never held across an
//! await point.
//!
//! Each operation reports the statement a SQL backend would have run, so
//! query logging looks the same on both backends.

use crate::error::{StoreError, StoreResult};
use crate::schema::{render_binding, Record, TableSchema, ALL_TABLES};
use crate::DataStore;
use async_trait::async_trait;
use beacon_telemetry::query::QueryTimer;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, Record>,
}

/// Process-local [`DataStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<&'static str, Table>>,
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn report<T>(timer: QueryTimer, result: &StoreResult<T>, rows: impl FnOnce(&T) -> u64) {
    match result {
        Ok(value) => timer.finish(Some(rows(value))),
        Err(StoreError::NotFound { .. }) => timer.finish(Some(0)),
        Err(_) => timer.fail(),
    }
}

fn check_not_null(schema: &TableSchema, record: &Record, inserting: bool) -> StoreResult<()> {
    for field in schema.fields.iter().filter(|f| f.required) {
        let missing = match record.get(field.name) {
            Some(value) => value.is_null(),
            None => inserting,
        };
        if missing {
            return Err(StoreError::Constraint(format!(
                "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                field.name, schema.table
            )));
        }
    }
    Ok(())
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a table.
    #[must_use]
    pub fn row_count(&self, schema: &TableSchema) -> usize {
        self.tables
            .read()
            .get(schema.table)
            .map_or(0, |table| table.rows.len())
    }

    fn check_references(
        tables: &HashMap<&'static str, Table>,
        schema: &TableSchema,
        record: &Record,
    ) -> StoreResult<()> {
        for field in schema.fields {
            let (Some(target), Some(value)) = (field.references, record.get(field.name)) else {
                continue;
            };
            let Some(id) = value.as_i64() else {
                continue;
            };
            let exists = tables
                .get(target)
                .is_some_and(|table| table.rows.contains_key(&id));
            if !exists {
                return Err(StoreError::Constraint(format!(
                    "insert or update on table \"{}\" violates foreign key constraint on \"{}\": {target} {id} does not exist",
                    schema.table, field.name
                )));
            }
        }
        Ok(())
    }

    fn check_unique(
        table: Option<&Table>,
        schema: &TableSchema,
        record: &Record,
        own_id: Option<i64>,
    ) -> StoreResult<()> {
        let Some(table) = table else {
            return Ok(());
        };
        for field in schema.fields.iter().filter(|f| f.unique) {
            let Some(value) = record.get(field.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = table
                .rows
                .iter()
                .any(|(id, row)| Some(*id) != own_id && row.get(field.name) == Some(value));
            if taken {
                return Err(StoreError::Constraint(format!(
                    "duplicate key value violates unique constraint on \"{}\".\"{}\"",
                    schema.table, field.name
                )));
            }
        }
        Ok(())
    }

    fn check_not_referenced(
        tables: &HashMap<&'static str, Table>,
        schema: &TableSchema,
        id: i64,
    ) -> StoreResult<()> {
        for other in ALL_TABLES {
            for field in other.fields.iter().filter(|f| f.references == Some(schema.table)) {
                let referenced = tables.get(other.table).is_some_and(|table| {
                    table
                        .rows
                        .values()
                        .any(|row| row.get(field.name).and_then(Value::as_i64) == Some(id))
                });
                if referenced {
                    return Err(StoreError::Constraint(format!(
                        "update or delete on table \"{}\" violates foreign key constraint on table \"{}\"",
                        schema.table, other.table
                    )));
                }
            }
        }
        Ok(())
    }

    fn insert_row(&self, schema: &'static TableSchema, mut record: Record) -> StoreResult<Record> {
        check_not_null(schema, &record, true)?;

        let mut tables = self.tables.write();
        Self::check_references(&tables, schema, &record)?;
        Self::check_unique(tables.get(schema.table), schema, &record, None)?;

        let table = tables.entry(schema.table).or_default();
        table.last_id += 1;
        let id = table.last_id;

        record.insert("id".to_string(), Value::from(id));
        if schema.timestamps {
            let stamp = now();
            record.insert("created_at".to_string(), stamp.clone());
            record.insert("updated_at".to_string(), stamp);
        }
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    fn update_row(
        &self,
        schema: &'static TableSchema,
        id: i64,
        changes: Record,
    ) -> StoreResult<Record> {
        let mut tables = self.tables.write();
        let exists = tables
            .get(schema.table)
            .is_some_and(|table| table.rows.contains_key(&id));
        if !exists {
            return Err(StoreError::NotFound { table: schema.table, id });
        }

        check_not_null(schema, &changes, false)?;
        Self::check_references(&tables, schema, &changes)?;
        Self::check_unique(tables.get(schema.table), schema, &changes, Some(id))?;

        let row = tables
            .get_mut(schema.table)
            .and_then(|table| table.rows.get_mut(&id))
            .ok_or(StoreError::NotFound { table: schema.table, id })?;
        row.extend(changes);
        if schema.timestamps {
            row.insert("updated_at".to_string(), now());
        }
        Ok(row.clone())
    }

    fn delete_row(&self, schema: &'static TableSchema, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let exists = tables
            .get(schema.table)
            .is_some_and(|table| table.rows.contains_key(&id));
        if !exists {
            return Err(StoreError::NotFound { table: schema.table, id });
        }

        Self::check_not_referenced(&tables, schema, id)?;

        if let Some(table) = tables.get_mut(schema.table) {
            table.rows.remove(&id);
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, schema: &'static TableSchema) -> StoreResult<Vec<Record>> {
        let timer = QueryTimer::start(schema.select_all_sql(), Vec::new());
        let rows: Vec<Record> = self
            .tables
            .read()
            .get(schema.table)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default();
        timer.finish(Some(rows.len() as u64));
        Ok(rows)
    }

    async fn get(&self, schema: &'static TableSchema, id: i64) -> StoreResult<Record> {
        let timer = QueryTimer::start(schema.select_one_sql(), vec![id.to_string()]);
        let result = self
            .tables
            .read()
            .get(schema.table)
            .and_then(|table| table.rows.get(&id).cloned())
            .ok_or(StoreError::NotFound { table: schema.table, id });
        report(timer, &result, |_| 1);
        result
    }

    async fn insert(&self, schema: &'static TableSchema, mut record: Record) -> StoreResult<Record> {
        record.retain(|key, _| schema.field(key).is_some());
        let columns: Vec<&str> = record.keys().map(String::as_str).collect();
        let bindings = record.values().map(render_binding).collect();
        let timer = QueryTimer::start(schema.insert_sql(&columns), bindings);

        let result = self.insert_row(schema, record);
        report(timer, &result, |_| 1);
        result
    }

    async fn update(
        &self,
        schema: &'static TableSchema,
        id: i64,
        mut changes: Record,
    ) -> StoreResult<Record> {
        changes.retain(|key, _| schema.field(key).is_some());
        if changes.is_empty() {
            return Err(StoreError::empty_update());
        }

        let columns: Vec<&str> = changes.keys().map(String::as_str).collect();
        let mut bindings: Vec<String> = changes.values().map(render_binding).collect();
        bindings.push(id.to_string());
        let timer = QueryTimer::start(schema.update_sql(&columns), bindings);

        let result = self.update_row(schema, id, changes);
        report(timer, &result, |_| 1);
        result
    }

    async fn delete(&self, schema: &'static TableSchema, id: i64) -> StoreResult<()> {
        let timer = QueryTimer::start(schema.delete_sql(), vec![id.to_string()]);
        let result = self.delete_row(schema, id);
        report(timer, &result, |_| 1);
        result
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MESSAGES, USERS};
    use beacon_telemetry::query::{self, QueryLog};
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn user(store: &MemoryStore, name: &str) -> i64 {
        store
            .insert(
                &USERS,
                record(json!({"name": name, "email": format!("{name}@example.com")})),
            )
            .await
            .unwrap()["id"]
            .as_i64()
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamps() {
        let store = MemoryStore::new();
        let row = store
            .insert(&USERS, record(json!({"name": "Ada", "email": "ada@example.com"})))
            .await
            .unwrap();

        assert_eq!(row["id"], json!(1));
        assert!(row["created_at"].as_str().unwrap().ends_with('Z'));
        assert_eq!(row["created_at"], row["updated_at"]);
        assert_eq!(store.get(&USERS, 1).await.unwrap(), row);
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let store = MemoryStore::new();
        let first = user(&store, "a").await;
        store.delete(&USERS, first).await.unwrap();
        assert_eq!(user(&store, "b").await, first + 1);
    }

    #[tokio::test]
    async fn test_required_fields() {
        let store = MemoryStore::new();
        let err = store
            .insert(&USERS, record(json!({"name": "Ada"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(ref msg) if msg.contains("\"email\"")));

        let id = user(&store, "ada").await;
        let err = store
            .update(&USERS, id, record(json!({"name": null})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_unique_email() {
        let store = MemoryStore::new();
        let id = user(&store, "ada").await;
        let err = store
            .insert(&USERS, record(json!({"name": "Other", "email": "ada@example.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        // Re-saving a row's own value is not a conflict
        store
            .update(&USERS, id, record(json!({"email": "ada@example.com"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_foreign_keys() {
        let store = MemoryStore::new();
        let err = store
            .insert(&MESSAGES, record(json!({"user_id": 42, "content": "hi"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        let id = user(&store, "ada").await;
        store
            .insert(&MESSAGES, record(json!({"user_id": id, "content": "hi"})))
            .await
            .unwrap();

        let err = store.delete(&USERS, id).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(ref msg) if msg.contains("messages")));
        assert_eq!(store.row_count(&USERS), 1);
    }

    #[tokio::test]
    async fn test_update_merges_and_touches() {
        let store = MemoryStore::new();
        let id = user(&store, "ada").await;
        let before = store.get(&USERS, id).await.unwrap();

        let after = store
            .update(&USERS, id, record(json!({"name": "Ada Lovelace"})))
            .await
            .unwrap();
        assert_eq!(after["name"], json!("Ada Lovelace"));
        assert_eq!(after["email"], before["email"]);
        assert_eq!(after["created_at"], before["created_at"]);
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = MemoryStore::new();
        assert!(store.get(&USERS, 9).await.unwrap_err().is_not_found());
        assert!(store.delete(&USERS, 9).await.unwrap_err().is_not_found());
        assert!(store
            .update(&USERS, 9, record(json!({"name": "x"})))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_empty_update_rejected() {
        let store = MemoryStore::new();
        let id = user(&store, "ada").await;
        let err = store.update(&USERS, id, Record::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidField { .. }));
    }

    #[tokio::test]
    async fn test_reports_queries() {
        let store = MemoryStore::new();
        let log = QueryLog::new();

        query::scope(log.clone(), async {
            user(&store, "ada").await;
            store.list(&USERS).await.unwrap();
            let _ = store.get(&USERS, 5).await;
        })
        .await;

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert!(events[0].sql.starts_with("insert into users"));
        assert_eq!(events[1].rows, Some(1));
        assert_eq!(events[2].bindings, vec!["5".to_string()]);
        assert_eq!(events[2].rows, Some(0));
        assert!(events.iter().all(|e| !e.failed));
    }
}
