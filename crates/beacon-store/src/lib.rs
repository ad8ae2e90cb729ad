//! # Beacon Store
//!
//! The data store gateway behind the resource handlers.
//!
//! [`DataStore`] is the one persistence seam. Two implementations exist:
//!
//! - [`MemoryStore`]: process-local tables, used when the active database
//!   profile has no URL (development and tests).
//! - [`PgStore`]: a PostgreSQL pool issuing parameterised SQL built from the
//!   static [`schema`].
//!
//! Every statement either store runs is reported through
//! [`beacon_telemetry::query::QueryTimer`], so the query log stage sees the
//! same events regardless of backend.
//!
//! ## Example
//!
//! ```
//! use beacon_store::{DataStore, MemoryStore, Record, USERS};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let mut user = Record::new();
//! user.insert("name".into(), json!("Ada"));
//! user.insert("email".into(), json!("ada@example.com"));
//!
//! let created = store.insert(&USERS, user).await.unwrap();
//! assert_eq!(created["id"], json!(1));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/beacon-store/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::{PgStore, PgStoreOptions};
pub use schema::{Field, FieldKind, Record, TableSchema, ALL_TABLES, MESSAGES, REVIEWS, USERS};

use async_trait::async_trait;

/// CRUD access to the resource tables.
///
/// Input records passed to [`insert`](DataStore::insert) and
/// [`update`](DataStore::update) are expected to be coerced already (see
/// [`TableSchema::coerce`]). Required-field, uniqueness and reference checks
/// happen here.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    /// Short backend name for logs (`memory`, `postgres`).
    fn backend(&self) -> &'static str;

    /// All rows, ordered by id.
    async fn list(&self, table: &'static TableSchema) -> StoreResult<Vec<Record>>;

    /// One row by id.
    async fn get(&self, table: &'static TableSchema, id: i64) -> StoreResult<Record>;

    /// Inserts a row and returns it with its id and timestamps.
    async fn insert(&self, table: &'static TableSchema, record: Record) -> StoreResult<Record>;

    /// Applies the given column changes and returns the updated row.
    async fn update(
        &self,
        table: &'static TableSchema,
        id: i64,
        changes: Record,
    ) -> StoreResult<Record>;

    /// Deletes a row.
    async fn delete(&self, table: &'static TableSchema, id: i64) -> StoreResult<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> StoreResult<()>;
}

impl std::fmt::Debug for dyn DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataStore({})", self.backend())
    }
}
