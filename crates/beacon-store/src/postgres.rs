//! PostgreSQL data store.
//!
//! Statements are built from the static [`TableSchema`], so only schema
//! column names are ever interpolated; all values are bound. Rows come back
//! as `jsonb` via `to_jsonb`, which keeps the store independent of the
//! exact column set of each table.

use crate::error::{StoreError, StoreResult};
use crate::schema::{render_binding, Field, FieldKind, Record, TableSchema};
use crate::DataStore;
use async_trait::async_trait;
use beacon_telemetry::query::QueryTimer;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, Row};
use std::time::Duration;

/// Connection settings for [`PgStore::connect`].
#[derive(Debug, Clone)]
pub struct PgStoreOptions {
    /// `postgres://` connection URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
    /// How long to wait for a connection.
    pub connect_timeout: Duration,
}

impl PgStoreOptions {
    /// Options for `url` with a pool of 5 and a 5 second timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// [`DataStore`] backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code() {
                // Integrity constraint violations: not null, foreign key, unique, check
                Some(code) if code.starts_with("23") => StoreError::Constraint(msg),
                // Invalid text representation, numeric out of range
                Some(code) if code == "22P02" || code == "22003" => StoreError::InvalidField {
                    field: "value".to_string(),
                    reason: msg,
                },
                _ => StoreError::Query(msg),
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => StoreError::Connection(format!("{operation}: {err}")),
        _ => StoreError::Query(format!("{operation}: {err}")),
    }
}

fn decode_row(row: &PgRow) -> StoreResult<Record> {
    let Json(value): Json<Value> = row
        .try_get("row")
        .map_err(|e| StoreError::Query(format!("failed to read row: {e}")))?;
    match value {
        Value::Object(record) => Ok(record),
        other => Err(StoreError::Query(format!("expected a json object row, got {other}"))),
    }
}

/// Known columns of `record` paired with their schema entries.
fn columns<'r>(schema: &TableSchema, record: &'r Record) -> Vec<(&'static Field, &'r Value)> {
    record
        .iter()
        .filter_map(|(name, value)| schema.field(name).map(|field| (field, value)))
        .collect()
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    field: &Field,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match field.kind {
        FieldKind::Integer => query.bind(value.as_i64()),
        FieldKind::Text => query.bind(value.as_str().map(str::to_owned)),
    }
}

impl PgStore {
    /// Opens the pool and verifies a connection can be acquired.
    pub async fn connect(options: &PgStoreOptions) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.connect_timeout)
            .connect(&options.url)
            .await
            .map_err(|err| map_sqlx_error("connect", err))?;

        tracing::info!(
            max_connections = options.max_connections,
            "connected to postgres"
        );
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the pool, waiting for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_record(
        &self,
        operation: &str,
        schema: &'static TableSchema,
        id: Option<i64>,
        sql: String,
        pairs: &[(&'static Field, &Value)],
    ) -> StoreResult<Record> {
        let mut bindings: Vec<String> = pairs.iter().map(|(_, v)| render_binding(v)).collect();
        bindings.extend(id.map(|id| id.to_string()));
        let timer = QueryTimer::start(sql.clone(), bindings);

        let mut query = sqlx::query(&sql);
        for (field, value) in pairs {
            query = bind_value(query, field, value);
        }
        if let Some(id) = id {
            query = query.bind(id);
        }

        match query.fetch_optional(&self.pool).await {
            Ok(Some(row)) => {
                timer.finish(Some(1));
                decode_row(&row)
            }
            Ok(None) => {
                timer.finish(Some(0));
                Err(StoreError::NotFound {
                    table: schema.table,
                    id: id.unwrap_or_default(),
                })
            }
            Err(err) => {
                timer.fail();
                Err(map_sqlx_error(operation, err))
            }
        }
    }
}

#[async_trait]
impl DataStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn list(&self, schema: &'static TableSchema) -> StoreResult<Vec<Record>> {
        let sql = schema.select_all_sql();
        let timer = QueryTimer::start(sql.clone(), Vec::new());

        match sqlx::query(&sql).fetch_all(&self.pool).await {
            Ok(rows) => {
                timer.finish(Some(rows.len() as u64));
                rows.iter().map(decode_row).collect()
            }
            Err(err) => {
                timer.fail();
                Err(map_sqlx_error("list", err))
            }
        }
    }

    async fn get(&self, schema: &'static TableSchema, id: i64) -> StoreResult<Record> {
        self.fetch_record("get", schema, Some(id), schema.select_one_sql(), &[])
            .await
    }

    async fn insert(&self, schema: &'static TableSchema, record: Record) -> StoreResult<Record> {
        let pairs = columns(schema, &record);
        let names: Vec<&str> = pairs.iter().map(|(field, _)| field.name).collect();
        self.fetch_record("insert", schema, None, schema.insert_sql(&names), &pairs)
            .await
    }

    async fn update(
        &self,
        schema: &'static TableSchema,
        id: i64,
        changes: Record,
    ) -> StoreResult<Record> {
        let pairs = columns(schema, &changes);
        if pairs.is_empty() {
            return Err(StoreError::empty_update());
        }
        let names: Vec<&str> = pairs.iter().map(|(field, _)| field.name).collect();
        self.fetch_record("update", schema, Some(id), schema.update_sql(&names), &pairs)
            .await
    }

    async fn delete(&self, schema: &'static TableSchema, id: i64) -> StoreResult<()> {
        let sql = schema.delete_sql();
        let timer = QueryTimer::start(sql.clone(), vec![id.to_string()]);

        match sqlx::query(&sql).bind(id).execute(&self.pool).await {
            Ok(result) => {
                timer.finish(Some(result.rows_affected()));
                if result.rows_affected() == 0 {
                    Err(StoreError::NotFound { table: schema.table, id })
                } else {
                    Ok(())
                }
            }
            Err(err) => {
                timer.fail();
                Err(map_sqlx_error("delete", err))
            }
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        let timer = QueryTimer::start("select 1", Vec::new());
        match sqlx::query("select 1").execute(&self.pool).await {
            Ok(_) => {
                timer.finish(Some(1));
                Ok(())
            }
            Err(err) => {
                timer.fail();
                Err(map_sqlx_error("ping", err))
            }
        }
    }
}
