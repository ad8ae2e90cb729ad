//! Static table schemas.
//!
//! Each resource table is described once: its name, its writable columns and
//! their constraints. The schema drives input coercion in the resource
//! handlers, constraint checks in [`MemoryStore`](crate::MemoryStore), and the
//! parameterised SQL issued by [`PgStore`](crate::PgStore).

use crate::error::StoreError;
use serde_json::{Map, Value};

/// A stored row as a JSON object, including `id`.
pub type Record = Map<String, Value>;

/// Column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 64-bit integer.
    Integer,
    /// Text.
    Text,
}

/// A writable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Column name.
    pub name: &'static str,
    /// Column type.
    pub kind: FieldKind,
    /// `NOT NULL`.
    pub required: bool,
    /// `UNIQUE`.
    pub unique: bool,
    /// Foreign key target table, referencing its `id`.
    pub references: Option<&'static str>,
}

impl Field {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            unique: false,
            references: None,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    const fn references(mut self, table: &'static str) -> Self {
        self.references = Some(table);
        self
    }

    /// Coerces an input value to this column's type.
    ///
    /// Form bodies deliver everything as strings, so numeric strings are
    /// accepted for integer columns and numbers or booleans are rendered as
    /// text for text columns. `null` passes through.
    pub fn coerce(&self, value: &Value) -> Result<Value, StoreError> {
        let invalid = |reason: &str| StoreError::InvalidField {
            field: self.name.to_string(),
            reason: reason.to_string(),
        };

        match (self.kind, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldKind::Integer, Value::Number(n)) => n
                .as_i64()
                .map(Value::from)
                .ok_or_else(|| invalid("expected an integer")),
            (FieldKind::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid("expected an integer")),
            (FieldKind::Integer, _) => Err(invalid("expected an integer")),
            (FieldKind::Text, Value::String(_)) => Ok(value.clone()),
            (FieldKind::Text, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (FieldKind::Text, Value::Bool(b)) => Ok(Value::String(b.to_string())),
            (FieldKind::Text, _) => Err(invalid("expected text")),
        }
    }
}

/// A resource table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub table: &'static str,
    /// Writable columns. `id` and the timestamps are managed by the store.
    pub fields: &'static [Field],
    /// Whether the table carries `created_at`/`updated_at`.
    pub timestamps: bool,
}

/// `users (name, email)`.
pub const USERS: TableSchema = TableSchema {
    table: "users",
    fields: &[
        Field::new("name", FieldKind::Text).required(),
        Field::new("email", FieldKind::Text).required().unique(),
    ],
    timestamps: true,
};

/// `messages (user_id, content)`.
pub const MESSAGES: TableSchema = TableSchema {
    table: "messages",
    fields: &[
        Field::new("user_id", FieldKind::Integer).required().references("users"),
        Field::new("content", FieldKind::Text).required(),
    ],
    timestamps: true,
};

/// `reviews (user_id, rating, comment)`.
pub const REVIEWS: TableSchema = TableSchema {
    table: "reviews",
    fields: &[
        Field::new("user_id", FieldKind::Integer).required().references("users"),
        Field::new("rating", FieldKind::Integer).required(),
        Field::new("comment", FieldKind::Text),
    ],
    timestamps: true,
};

/// Every resource table.
pub const ALL_TABLES: [&TableSchema; 3] = [&USERS, &MESSAGES, &REVIEWS];

impl TableSchema {
    /// Looks up a column.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Keeps the known columns of `input`, coerced to their types.
    ///
    /// Unknown keys, including `id` and the timestamps, are dropped.
    pub fn coerce(&self, input: &Map<String, Value>) -> Result<Record, StoreError> {
        let mut record = Record::new();
        for field in self.fields {
            if let Some(value) = input.get(field.name) {
                record.insert(field.name.to_string(), field.coerce(value)?);
            }
        }
        Ok(record)
    }

    /// `SELECT` of every row.
    #[must_use]
    pub fn select_all_sql(&self) -> String {
        format!("select to_jsonb(t) as row from {} t order by t.id", self.table)
    }

    /// `SELECT` of one row by id (`$1`).
    #[must_use]
    pub fn select_one_sql(&self) -> String {
        format!("select to_jsonb(t) as row from {} t where t.id = $1", self.table)
    }

    /// `INSERT` of the given columns, returning the row.
    #[must_use]
    pub fn insert_sql(&self, columns: &[&str]) -> String {
        if columns.is_empty() {
            return format!(
                "insert into {table} default values returning to_jsonb({table}.*) as row",
                table = self.table
            );
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
        format!(
            "insert into {table} ({columns}) values ({values}) returning to_jsonb({table}.*) as row",
            table = self.table,
            columns = columns.join(", "),
            values = placeholders.join(", "),
        )
    }

    /// `UPDATE` of the given columns; the id is the last parameter.
    #[must_use]
    pub fn update_sql(&self, columns: &[&str]) -> String {
        let mut assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ${}", i + 1))
            .collect();
        if self.timestamps {
            assignments.push("updated_at = now()".to_string());
        }
        format!(
            "update {table} set {assignments} where id = ${id} returning to_jsonb({table}.*) as row",
            table = self.table,
            assignments = assignments.join(", "),
            id = columns.len() + 1,
        )
    }

    /// `DELETE` of one row by id (`$1`).
    #[must_use]
    pub fn delete_sql(&self) -> String {
        format!("delete from {} where id = $1", self.table)
    }
}

/// Renders a bound value for query logging.
pub(crate) fn render_binding(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_coerce_form_strings() {
        let record = REVIEWS
            .coerce(&object(json!({"user_id": "3", "rating": " 5 ", "comment": 10})))
            .unwrap();
        assert_eq!(Value::Object(record), json!({"user_id": 3, "rating": 5, "comment": "10"}));
    }

    #[test]
    fn test_coerce_drops_unknown_and_managed_keys() {
        let record = USERS
            .coerce(&object(json!({"id": 99, "name": "Ada", "admin": true, "created_at": "x"})))
            .unwrap();
        assert_eq!(Value::Object(record), json!({"name": "Ada"}));
    }

    #[test]
    fn test_coerce_rejects_bad_types() {
        let err = MESSAGES
            .coerce(&object(json!({"user_id": "abc"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidField { ref field, .. } if field == "user_id"));

        assert!(MESSAGES.coerce(&object(json!({"user_id": 1.5}))).is_err());
        assert!(USERS.coerce(&object(json!({"name": {"first": "Ada"}}))).is_err());
    }

    #[test]
    fn test_null_passes_through() {
        let record = REVIEWS.coerce(&object(json!({"comment": null}))).unwrap();
        assert_eq!(record["comment"], Value::Null);
    }

    #[test]
    fn test_sql_builders() {
        assert_eq!(
            USERS.select_one_sql(),
            "select to_jsonb(t) as row from users t where t.id = $1"
        );
        assert_eq!(
            MESSAGES.insert_sql(&["user_id", "content"]),
            "insert into messages (user_id, content) values ($1, $2) returning to_jsonb(messages.*) as row"
        );
        assert_eq!(
            REVIEWS.update_sql(&["rating"]),
            "update reviews set rating = $1, updated_at = now() where id = $2 returning to_jsonb(reviews.*) as row"
        );
        assert_eq!(
            USERS.insert_sql(&[]),
            "insert into users default values returning to_jsonb(users.*) as row"
        );
        assert_eq!(USERS.delete_sql(), "delete from users where id = $1");
    }

    #[test]
    fn test_schema_lookup() {
        assert!(USERS.field("email").unwrap().unique);
        assert_eq!(MESSAGES.field("user_id").unwrap().references, Some("users"));
        assert!(REVIEWS.field("comment").is_some_and(|f| !f.required));
        assert!(USERS.field("id").is_none());
        assert_eq!(ALL_TABLES.len(), 3);
    }
}
