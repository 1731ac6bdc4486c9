//! Graph query port and the retrying runner in front of it.
//!
//! The analyzer and planner never talk to a store directly. They build a
//! [`GraphQuery`] and hand it to a [`GraphQueryPort`]; the [`QueryRunner`]
//! adds a per-query timeout and bounded retry for transient failures.

use crate::config::RetryConfig;
use crate::error::QueryError;
use async_trait::async_trait;
use ontoplan_proto::{Binding, GraphQuery};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Executes graph queries against an ontology store.
#[async_trait]
pub trait GraphQueryPort: Send + Sync {
    /// Evaluate a query and return one binding per result row.
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError>;
}

#[async_trait]
impl<P: GraphQueryPort + ?Sized> GraphQueryPort for Arc<P> {
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        (**self).query(query).await
    }
}

/// Runs queries through a port with timeout and retry.
#[derive(Clone)]
pub struct QueryRunner {
    port: Arc<dyn GraphQueryPort>,
    retry: RetryConfig,
}

impl QueryRunner {
    /// Wrap a port.
    pub fn new(port: Arc<dyn GraphQueryPort>, retry: RetryConfig) -> Self {
        Self { port, retry }
    }

    /// The retry policy in use.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run a query, retrying `Unavailable` and `Timeout` with exponential backoff.
    pub async fn run(&self, query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
        let timeout = self.retry.query_timeout();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(timeout, self.port.query(query)).await {
                Ok(result) => result,
                Err(_) => Err(QueryError::Timeout(timeout)),
            };

            match result {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    debug!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying graph query"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// An optional point in time after which work is abandoned.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now, or none.
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
        }
    }

    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Drive `fut` to completion unless the deadline passes first.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        match self.at {
            None => Some(fut.await),
            Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyPort {
        failures: u32,
        error: QueryError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl GraphQueryPort for FlakyPort {
        async fn query(&self, _query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(vec![Binding::new()])
            }
        }
    }

    struct SlowPort;

    #[async_trait]
    impl GraphQueryPort for SlowPort {
        async fn query(&self, _query: &GraphQuery) -> Result<Vec<Binding>, QueryError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(vec![])
        }
    }

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_attempts(attempts)
            .with_initial_backoff(Duration::from_millis(1))
    }

    fn query() -> GraphQuery {
        GraphQuery::select(["n"])
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let port = Arc::new(FlakyPort {
            failures: 2,
            error: QueryError::Unavailable("connection reset".into()),
            calls: AtomicU32::new(0),
        });
        let runner = QueryRunner::new(port.clone(), fast_retry(3));

        let rows = runner.run(&query()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(port.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let port = Arc::new(FlakyPort {
            failures: 10,
            error: QueryError::Unavailable("down".into()),
            calls: AtomicU32::new(0),
        });
        let runner = QueryRunner::new(port.clone(), fast_retry(2));

        let err = runner.run(&query()).await.unwrap_err();
        assert!(matches!(err, QueryError::Unavailable(_)));
        assert_eq!(port.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_rejections() {
        let port = Arc::new(FlakyPort {
            failures: 1,
            error: QueryError::Rejected("syntax".into()),
            calls: AtomicU32::new(0),
        });
        let runner = QueryRunner::new(port.clone(), fast_retry(5));

        assert!(runner.run(&query()).await.is_err());
        assert_eq!(port.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_timeout() {
        let retry = RetryConfig::no_retry().with_query_timeout(Duration::from_millis(20));
        let runner = QueryRunner::new(Arc::new(SlowPort), retry);

        let err = runner.run(&query()).await.unwrap_err();
        assert_eq!(err, QueryError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_deadline() {
        assert!(!Deadline::none().expired());
        assert_eq!(Deadline::none().run(async { 7 }).await, Some(7));

        let deadline = Deadline::after(Some(Duration::from_millis(10)));
        let slow = deadline.run(tokio::time::sleep(Duration::from_millis(200))).await;
        assert!(slow.is_none());
        assert!(deadline.expired());
    }
}
