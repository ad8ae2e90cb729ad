//! Resource handlers.
//!
//! One [`ResourceHandler`] serves the CRUD route group of one table:
//!
//! | Route                   | Success          | Failure |
//! |-------------------------|------------------|---------|
//! | `GET /`                 | 200 array        |         |
//! | `GET /{id}`             | 200 record       | 404     |
//! | `POST /`                | 201 record       | 422     |
//! | `PUT`, `PATCH /{id}`    | 200 record       | 404     |
//! | `DELETE /{id}`          | 204              | 404     |
//!
//! Input is coerced to the column types of the table schema; everything
//! else (required fields, uniqueness, references) is the store's call.

use std::sync::Arc;

use beacon_middleware::{ParsedBody, Response, ResponseExt};
use beacon_store::{DataStore, Record, StoreError, TableSchema};
use http::{header, HeaderValue, Method, StatusCode};
use serde_json::Value;

use crate::router::ResourcePath;

const COLLECTION_METHODS: &str = "GET, HEAD, POST";
const ITEM_METHODS: &str = "GET, HEAD, PUT, PATCH, DELETE";

/// Translates a store error into the JSON error envelope.
#[must_use]
pub fn store_error_response(err: &StoreError) -> Response {
    let status = match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Constraint(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::InvalidField { .. } => StatusCode::BAD_REQUEST,
        StoreError::Connection(_) | StoreError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if err.is_client_error() {
        Response::json_error(status, err.code(), &err.to_string())
    } else {
        tracing::error!(error = %err, "store failure");
        Response::json_error(status, err.code(), "internal server error")
    }
}

fn method_not_allowed(allow: &'static str) -> Response {
    let mut response = Response::json_error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "method not allowed",
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

/// CRUD route group for one table.
#[derive(Debug)]
pub struct ResourceHandler {
    schema: &'static TableSchema,
    store: Arc<dyn DataStore>,
}

impl ResourceHandler {
    /// Creates the handler for `schema` over `store`.
    #[must_use]
    pub fn new(schema: &'static TableSchema, store: Arc<dyn DataStore>) -> Self {
        Self { schema, store }
    }

    /// The table this handler serves.
    #[must_use]
    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    /// Handles one request addressed to this route group.
    pub async fn handle(&self, method: &Method, path: ResourcePath<'_>, body: ParsedBody) -> Response {
        match path {
            ResourcePath::Collection => match *method {
                Method::GET | Method::HEAD => self.list().await,
                Method::POST => self.create(body).await,
                _ => method_not_allowed(COLLECTION_METHODS),
            },
            ResourcePath::Item(raw_id) => {
                if !matches!(
                    *method,
                    Method::GET | Method::HEAD | Method::PUT | Method::PATCH | Method::DELETE
                ) {
                    return method_not_allowed(ITEM_METHODS);
                }
                let Ok(id) = raw_id.parse::<i64>() else {
                    return Response::json_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_id",
                        &format!("`{raw_id}` is not a valid id"),
                    );
                };
                match *method {
                    Method::PUT | Method::PATCH => self.update(id, body).await,
                    Method::DELETE => self.delete(id).await,
                    _ => self.get(id).await,
                }
            }
            ResourcePath::Unknown => {
                Response::json_error(StatusCode::NOT_FOUND, "not_found", "route not found")
            }
        }
    }

    fn input(&self, body: ParsedBody) -> Result<Record, Response> {
        let object = match body.into_value() {
            None => Record::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(Response::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_body",
                    "expected an object",
                ))
            }
        };
        self.schema
            .coerce(&object)
            .map_err(|err| store_error_response(&err))
    }

    async fn list(&self) -> Response {
        match self.store.list(self.schema).await {
            Ok(rows) => {
                let rows = rows.into_iter().map(Value::Object).collect();
                Response::json(StatusCode::OK, &Value::Array(rows))
            }
            Err(err) => store_error_response(&err),
        }
    }

    async fn get(&self, id: i64) -> Response {
        match self.store.get(self.schema, id).await {
            Ok(row) => Response::json(StatusCode::OK, &Value::Object(row)),
            Err(err) => store_error_response(&err),
        }
    }

    async fn create(&self, body: ParsedBody) -> Response {
        let record = match self.input(body) {
            Ok(record) => record,
            Err(response) => return response,
        };
        match self.store.insert(self.schema, record).await {
            Ok(row) => {
                tracing::debug!(table = self.schema.table, id = ?row.get("id"), "created");
                Response::json(StatusCode::CREATED, &Value::Object(row))
            }
            Err(err) => store_error_response(&err),
        }
    }

    async fn update(&self, id: i64, body: ParsedBody) -> Response {
        let changes = match self.input(body) {
            Ok(changes) => changes,
            Err(response) => return response,
        };
        match self.store.update(self.schema, id, changes).await {
            Ok(row) => Response::json(StatusCode::OK, &Value::Object(row)),
            Err(err) => store_error_response(&err),
        }
    }

    async fn delete(&self, id: i64) -> Response {
        match self.store.delete(self.schema, id).await {
            Ok(()) => Response::empty(StatusCode::NO_CONTENT),
            Err(err) => store_error_response(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_store::{MemoryStore, MESSAGES, USERS};
    use http_body_util::BodyExt;
    use serde_json::json;

    fn handler(schema: &'static TableSchema) -> (ResourceHandler, Arc<dyn DataStore>) {
        let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
        (ResourceHandler::new(schema, Arc::clone(&store)), store)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_body(value: Value) -> ParsedBody {
        ParsedBody::Json(value)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (users, _) = handler(&USERS);
        let response = users
            .handle(
                &Method::POST,
                ResourcePath::Collection,
                json_body(json!({"name": "Ada", "email": "ada@example.com"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["id"], json!(1));

        let response = users
            .handle(&Method::GET, ResourcePath::Item("1"), ParsedBody::Empty)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], json!("Ada"));
    }

    #[tokio::test]
    async fn test_form_strings_coerced() {
        let (_, store) = handler(&USERS);
        store
            .insert(&USERS, match json!({"name": "Ada", "email": "a@x.test"}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            })
            .await
            .unwrap();

        let messages = ResourceHandler::new(&MESSAGES, store);
        let response = messages
            .handle(
                &Method::POST,
                ResourcePath::Collection,
                ParsedBody::Form(json!({"user_id": "1", "content": "hello"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["user_id"], json!(1));
    }

    #[tokio::test]
    async fn test_missing_required_field_is_422() {
        let (users, _) = handler(&USERS);
        let response = users
            .handle(&Method::POST, ResourcePath::Collection, json_body(json!({"name": "Ada"})))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["error"]["code"],
            json!("constraint_violation")
        );
    }

    #[tokio::test]
    async fn test_invalid_id_and_not_found() {
        let (users, _) = handler(&USERS);

        let response = users
            .handle(&Method::GET, ResourcePath::Item("abc"), ParsedBody::Empty)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], json!("invalid_id"));

        for method in [Method::GET, Method::DELETE] {
            let response = users
                .handle(&method, ResourcePath::Item("99"), ParsedBody::Empty)
                .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_method_not_allowed_sets_allow() {
        let (users, _) = handler(&USERS);

        let response = users
            .handle(&Method::DELETE, ResourcePath::Collection, ParsedBody::Empty)
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], COLLECTION_METHODS);

        let response = users
            .handle(&Method::POST, ResourcePath::Item("1"), ParsedBody::Empty)
            .await;
        assert_eq!(response.headers()[header::ALLOW], ITEM_METHODS);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (users, _) = handler(&USERS);
        users
            .handle(
                &Method::POST,
                ResourcePath::Collection,
                json_body(json!({"name": "Ada", "email": "ada@example.com"})),
            )
            .await;

        let response = users
            .handle(&Method::PATCH, ResourcePath::Item("1"), json_body(json!({"name": "Grace"})))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], json!("Grace"));

        let response = users
            .handle(&Method::DELETE, ResourcePath::Item("1"), ParsedBody::Empty)
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = users
            .handle(&Method::GET, ResourcePath::Collection, ParsedBody::Empty)
            .await;
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_array_body_rejected() {
        let (users, _) = handler(&USERS);
        let response = users
            .handle(&Method::POST, ResourcePath::Collection, json_body(json!([1, 2])))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_error_statuses() {
        let cases = [
            (StoreError::NotFound { table: "users", id: 1 }, StatusCode::NOT_FOUND),
            (StoreError::Constraint("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                StoreError::InvalidField { field: "f".into(), reason: "r".into() },
                StatusCode::BAD_REQUEST,
            ),
            (StoreError::Connection("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (StoreError::Query("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(store_error_response(&err).status(), status);
        }
    }
}
