//! Per-request query logging.
//!
//! The data store reports every statement it runs through [`record_query`].
//! Each event is logged at `debug` immediately and, when the current task is
//! inside a [`scope`], appended to that scope's [`QueryLog`] so the request
//! that issued it can report all of its queries together.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

tokio::task_local! {
    static CURRENT: QueryLog;
}

/// A single executed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEvent {
    /// The statement text.
    pub sql: String,
    /// Rendered bind parameters, in order.
    pub bindings: Vec<String>,
    /// Wall time spent executing.
    pub duration: Duration,
    /// Rows returned or affected, when known.
    pub rows: Option<u64>,
    /// Whether the statement failed.
    pub failed: bool,
}

impl QueryEvent {
    /// Duration in fractional milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// Shared, append-only list of the queries issued while handling one request.
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    events: Arc<Mutex<Vec<QueryEvent>>>,
}

impl QueryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: QueryEvent) {
        self.events.lock().push(event);
    }

    /// Returns a snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

/// Runs `future` with `log` as the current query log.
pub async fn scope<F: Future>(log: QueryLog, future: F) -> F::Output {
    CURRENT.scope(log, future).await
}

/// Returns the query log of the enclosing [`scope`], if any.
#[must_use]
pub fn current() -> Option<QueryLog> {
    CURRENT.try_with(Clone::clone).ok()
}

/// Reports an executed statement.
pub fn record_query(event: QueryEvent) {
    tracing::debug!(
        db.statement = %event.sql,
        bindings = ?event.bindings,
        duration_ms = event.duration_ms(),
        rows = event.rows,
        failed = event.failed,
        "query"
    );

    // Outside a scope (startup pings, background work) there is nothing to append to
    let _ = CURRENT.try_with(|log| log.push(event));
}

/// Measures one statement and reports it on completion.
///
/// # Example
///
/// ```
/// use beacon_telemetry::query::QueryTimer;
///
/// let timer = QueryTimer::start("select * from users", Vec::new());
/// // ... run the statement ...
/// timer.finish(Some(3));
/// ```
#[derive(Debug)]
pub struct QueryTimer {
    sql: String,
    bindings: Vec<String>,
    started: Instant,
}

impl QueryTimer {
    /// Starts timing a statement.
    #[must_use]
    pub fn start(sql: impl Into<String>, bindings: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
            started: Instant::now(),
        }
    }

    /// Records a successful execution.
    pub fn finish(self, rows: Option<u64>) {
        self.record(rows, false);
    }

    /// Records a failed execution.
    pub fn fail(self) {
        self.record(None, true);
    }

    fn record(self, rows: Option<u64>, failed: bool) {
        record_query(QueryEvent {
            sql: self.sql,
            bindings: self.bindings,
            duration: self.started.elapsed(),
            rows,
            failed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(sql: &str) -> QueryEvent {
        QueryEvent {
            sql: sql.to_string(),
            bindings: vec!["1".to_string()],
            duration: Duration::from_micros(1500),
            rows: Some(1),
            failed: false,
        }
    }

    #[test]
    fn test_duration_ms() {
        assert!((event("select 1").duration_ms() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_outside_scope_is_noop() {
        assert!(current().is_none());
        record_query(event("select 1"));
    }

    #[tokio::test]
    async fn test_scope_collects_queries() {
        let log = QueryLog::new();

        scope(log.clone(), async {
            record_query(event("select * from users"));
            QueryTimer::start("delete from users where id = $1", vec!["7".to_string()]).fail();
        })
        .await;

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sql, "select * from users");
        assert!(events[1].failed);
        assert_eq!(events[1].bindings, vec!["7".to_string()]);
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let first = QueryLog::new();
        let second = QueryLog::new();

        scope(first.clone(), async { record_query(event("a")) }).await;
        scope(second.clone(), async {
            record_query(event("b"));
            record_query(event("c"));
        })
        .await;

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert!(current().is_none());
    }
}
