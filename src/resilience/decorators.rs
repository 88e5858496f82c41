//! Resilience decorators for the workspace client
//!
//! Both wrappers implement [`WorkspaceApi`] so they compose with the base
//! client and with each other: `RetryingClient::new(CircuitBreakingClient::
//! new(http, breaker), executor)`. Each layer stays independently testable
//! against a mock inner client.

use async_trait::async_trait;
use std::future::Future;
use tracing::warn;

use super::breaker::CircuitBreaker;
use super::retry::RetryExecutor;
use crate::error::{ApiError, ApiErrorKind};
use crate::remote::api::{
    BlockListResponse, CreatePageRequest, DatabasePayload, PagePayload, QueryRequest,
    QueryResponse, SearchRequest, UpdatePageRequest,
};
use crate::remote::WorkspaceApi;

/// Whether an error counts as a breaker failure
///
/// Transient infrastructure errors and authoritative failures
/// (authentication, permission) both trip the breaker; validation and
/// not-found responses are healthy remote behavior, and rate limiting is
/// handled by the retry layer's Retry-After handling instead.
fn trips_breaker(err: &ApiError) -> bool {
    matches!(
        err.kind(),
        ApiErrorKind::Network
            | ApiErrorKind::Timeout
            | ApiErrorKind::Server
            | ApiErrorKind::Authentication
            | ApiErrorKind::Permission
    )
}

/// Client wrapper that consults a circuit breaker around every call
pub struct CircuitBreakingClient<C> {
    inner: C,
    breaker: CircuitBreaker,
}

impl<C: WorkspaceApi> CircuitBreakingClient<C> {
    /// Wrap `inner` with the given breaker
    pub fn new(inner: C, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    /// The breaker in use
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guard<T>(
        &self,
        call: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let permitted = self
            .breaker
            .can_execute()
            .await
            .map_err(|e| ApiError::Network(format!("Breaker state unavailable: {}", e)))?;
        if !permitted {
            return Err(ApiError::CircuitOpen(self.breaker.name().to_string()));
        }

        match call.await {
            Ok(value) => {
                if let Err(e) = self.breaker.record_success().await {
                    warn!(breaker = self.breaker.name(), error = %e, "Failed to record breaker success");
                }
                Ok(value)
            }
            Err(err) => {
                if trips_breaker(&err) {
                    if let Err(e) = self.breaker.record_failure().await {
                        warn!(breaker = self.breaker.name(), error = %e, "Failed to record breaker failure");
                    }
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<C: WorkspaceApi> WorkspaceApi for CircuitBreakingClient<C> {
    async fn get_database(&self, database_id: &str) -> Result<DatabasePayload, ApiError> {
        self.guard(self.inner.get_database(database_id)).await
    }

    async fn query_database(
        &self,
        database_id: &str,
        request: QueryRequest,
    ) -> Result<QueryResponse, ApiError> {
        self.guard(self.inner.query_database(database_id, request))
            .await
    }

    async fn get_page(&self, page_id: &str) -> Result<PagePayload, ApiError> {
        self.guard(self.inner.get_page(page_id)).await
    }

    async fn get_page_content(&self, page_id: &str) -> Result<BlockListResponse, ApiError> {
        self.guard(self.inner.get_page_content(page_id)).await
    }

    async fn create_page(&self, request: CreatePageRequest) -> Result<PagePayload, ApiError> {
        self.guard(self.inner.create_page(request)).await
    }

    async fn update_page(
        &self,
        page_id: &str,
        request: UpdatePageRequest,
    ) -> Result<PagePayload, ApiError> {
        self.guard(self.inner.update_page(page_id, request)).await
    }

    async fn archive_page(&self, page_id: &str) -> Result<PagePayload, ApiError> {
        self.guard(self.inner.archive_page(page_id)).await
    }

    async fn search(&self, request: SearchRequest) -> Result<QueryResponse, ApiError> {
        self.guard(self.inner.search(request)).await
    }
}

/// Client wrapper that retries every call per the executor's policy
pub struct RetryingClient<C> {
    inner: C,
    executor: RetryExecutor,
}

impl<C: WorkspaceApi> RetryingClient<C> {
    /// Wrap `inner` with the given retry executor
    pub fn new(inner: C, executor: RetryExecutor) -> Self {
        Self { inner, executor }
    }

    /// The executor in use
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }
}

#[async_trait]
impl<C: WorkspaceApi> WorkspaceApi for RetryingClient<C> {
    async fn get_database(&self, database_id: &str) -> Result<DatabasePayload, ApiError> {
        self.executor
            .execute(|| self.inner.get_database(database_id))
            .await
            .into_result()
    }

    async fn query_database(
        &self,
        database_id: &str,
        request: QueryRequest,
    ) -> Result<QueryResponse, ApiError> {
        self.executor
            .execute(|| self.inner.query_database(database_id, request.clone()))
            .await
            .into_result()
    }

    async fn get_page(&self, page_id: &str) -> Result<PagePayload, ApiError> {
        self.executor
            .execute(|| self.inner.get_page(page_id))
            .await
            .into_result()
    }

    async fn get_page_content(&self, page_id: &str) -> Result<BlockListResponse, ApiError> {
        self.executor
            .execute(|| self.inner.get_page_content(page_id))
            .await
            .into_result()
    }

    async fn create_page(&self, request: CreatePageRequest) -> Result<PagePayload, ApiError> {
        self.executor
            .execute(|| self.inner.create_page(request.clone()))
            .await
            .into_result()
    }

    async fn update_page(
        &self,
        page_id: &str,
        request: UpdatePageRequest,
    ) -> Result<PagePayload, ApiError> {
        self.executor
            .execute(|| self.inner.update_page(page_id, request.clone()))
            .await
            .into_result()
    }

    async fn archive_page(&self, page_id: &str) -> Result<PagePayload, ApiError> {
        self.executor
            .execute(|| self.inner.archive_page(page_id))
            .await
            .into_result()
    }

    async fn search(&self, request: SearchRequest) -> Result<QueryResponse, ApiError> {
        self.executor
            .execute(|| self.inner.search(request.clone()))
            .await
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::coordination::MemoryStateStore;
    use crate::remote::client::MockWorkspaceApi;
    use crate::resilience::backoff::BackoffStrategy;
    use crate::resilience::breaker::CircuitState;
    use crate::resilience::retry::RetryPolicy;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            BreakerConfig {
                name: "test".to_string(),
                failure_threshold: threshold,
                recovery_timeout_secs: 3600,
            },
            Arc::new(MemoryStateStore::new()),
        )
    }

    fn fast_executor(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(
            RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            },
            BackoffStrategy::new(Duration::ZERO, Duration::ZERO, 2.0, 0.0),
        )
    }

    fn page(id: &str) -> PagePayload {
        PagePayload {
            id: id.to_string(),
            parent: None,
            properties: Default::default(),
            created_time: chrono::Utc::now(),
            last_edited_time: chrono::Utc::now(),
            created_by: None,
            last_edited_by: None,
            archived: false,
        }
    }

    // Test 1: Breaker client passes calls through while closed
    #[tokio::test]
    async fn test_breaker_client_passthrough() {
        let mut mock = MockWorkspaceApi::new();
        mock.expect_get_page()
            .returning(|id| Ok(page(&id.to_string())));

        let client = CircuitBreakingClient::new(mock, test_breaker(3));
        let result = client.get_page("page-1").await;

        assert_eq!(result.unwrap().id, "page-1");
    }

    // Test 2: Breaker opens after threshold failures and rejects locally
    #[tokio::test]
    async fn test_breaker_client_opens() {
        let mut mock = MockWorkspaceApi::new();
        // Exactly 2 calls reach the inner client; the third is rejected locally
        mock.expect_get_page()
            .times(2)
            .returning(|_| Err(ApiError::Server(503)));

        let client = CircuitBreakingClient::new(mock, test_breaker(2));

        assert!(client.get_page("p").await.is_err());
        assert!(client.get_page("p").await.is_err());

        let result = client.get_page("p").await;
        match result.unwrap_err() {
            ApiError::CircuitOpen(name) => assert_eq!(name, "test"),
            err => panic!("Expected CircuitOpen, got {:?}", err),
        }
    }

    // Test 3: Validation and not-found errors do not trip the breaker
    #[tokio::test]
    async fn test_breaker_ignores_healthy_errors() {
        let mut mock = MockWorkspaceApi::new();
        mock.expect_get_page()
            .returning(|_| Err(ApiError::NotFound("page".to_string())));

        let client = CircuitBreakingClient::new(mock, test_breaker(1));

        assert!(client.get_page("p").await.is_err());
        assert!(client.get_page("p").await.is_err());

        // Breaker stayed closed despite repeated NotFound
        assert_eq!(
            client.breaker().state().await.unwrap(),
            CircuitState::Closed
        );
    }

    // Test 4: Authoritative errors trip the breaker
    #[tokio::test]
    async fn test_breaker_trips_on_authentication() {
        let mut mock = MockWorkspaceApi::new();
        mock.expect_get_page()
            .returning(|_| Err(ApiError::Authentication));

        let client = CircuitBreakingClient::new(mock, test_breaker(1));
        assert!(client.get_page("p").await.is_err());

        assert_eq!(client.breaker().state().await.unwrap(), CircuitState::Open);
    }

    // Test 5: Retrying client retries transient errors to success
    #[tokio::test]
    async fn test_retrying_client_retries() {
        let mut mock = MockWorkspaceApi::new();
        let mut calls = 0;
        mock.expect_get_page().times(3).returning(move |id| {
            calls += 1;
            if calls < 3 {
                Err(ApiError::Timeout)
            } else {
                Ok(page(&id.to_string()))
            }
        });

        let client = RetryingClient::new(mock, fast_executor(3));
        let result = client.get_page("page-1").await;

        assert_eq!(result.unwrap().id, "page-1");
    }

    // Test 6: Retrying client does not retry non-retryable errors
    #[tokio::test]
    async fn test_retrying_client_short_circuits() {
        let mut mock = MockWorkspaceApi::new();
        mock.expect_update_page()
            .times(1)
            .returning(|_, _| Err(ApiError::Permission));

        let client = RetryingClient::new(mock, fast_executor(5));
        let result = client
            .update_page("page-1", UpdatePageRequest::default())
            .await;

        assert!(matches!(result.unwrap_err(), ApiError::Permission));
    }

    // Test 7: Full composition: retry wraps circuit breaking
    #[tokio::test]
    async fn test_composed_stack() {
        let mut mock = MockWorkspaceApi::new();
        let mut calls = 0;
        mock.expect_get_page().returning(move |id| {
            calls += 1;
            if calls == 1 {
                Err(ApiError::Server(502))
            } else {
                Ok(page(&id.to_string()))
            }
        });

        let stack = RetryingClient::new(
            CircuitBreakingClient::new(mock, test_breaker(5)),
            fast_executor(2),
        );

        let result = stack.get_page("page-1").await;
        assert_eq!(result.unwrap().id, "page-1");
    }
}
