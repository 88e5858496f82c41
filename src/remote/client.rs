//! Workspace API HTTP client
//!
//! [`WorkspaceApi`] is the seam the rest of the crate programs against; the
//! resilience decorators implement the same trait, so a retrying,
//! circuit-breaking client composes out of wrappers around
//! [`HttpWorkspaceClient`].
//!
//! Every HTTP outcome maps to a typed [`ApiError`]:
//! 400 → `Validation` (with field detail), 401 → `Authentication`,
//! 403 → `Permission`, 404 → `NotFound`, 429 → `RateLimited` (carrying the
//! Retry-After header), 5xx → `Server`, transport failures → `Timeout` /
//! `Network`.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::api::{
    BlockListResponse, CreatePageRequest, DatabasePayload, ErrorBody, PagePayload, QueryRequest,
    QueryResponse, SearchRequest, UpdatePageRequest,
};
use crate::config::RemoteConfig;
use crate::error::ApiError;

/// Typed surface of the workspace API
///
/// Implementations never mutate local state; side effects are confined to
/// the remote service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    /// Fetch database metadata (title, property schema)
    async fn get_database(&self, database_id: &str) -> Result<DatabasePayload, ApiError>;

    /// Query one page of a database enumeration
    async fn query_database(
        &self,
        database_id: &str,
        request: QueryRequest,
    ) -> Result<QueryResponse, ApiError>;

    /// Fetch one page by id
    async fn get_page(&self, page_id: &str) -> Result<PagePayload, ApiError>;

    /// Fetch all content blocks of a page
    async fn get_page_content(&self, page_id: &str) -> Result<BlockListResponse, ApiError>;

    /// Create a page in a database
    async fn create_page(&self, request: CreatePageRequest) -> Result<PagePayload, ApiError>;

    /// Update a page's properties
    async fn update_page(
        &self,
        page_id: &str,
        request: UpdatePageRequest,
    ) -> Result<PagePayload, ApiError>;

    /// Archive a page
    async fn archive_page(&self, page_id: &str) -> Result<PagePayload, ApiError>;

    /// Full-text search across the workspace
    async fn search(&self, request: SearchRequest) -> Result<QueryResponse, ApiError>;
}

/// reqwest-backed workspace API client
#[derive(Debug, Clone)]
pub struct HttpWorkspaceClient {
    client: Client,
    config: RemoteConfig,
}

impl HttpWorkspaceClient {
    /// Create a client from configuration
    pub fn new(config: RemoteConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create a client with a custom reqwest Client
    pub fn with_client(client: Client, config: RemoteConfig) -> Self {
        Self { client, config }
    }

    /// Configured page size for paginated queries
    pub fn page_size(&self) -> u32 {
        self.config.page_size
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("X-Api-Version", &self.config.api_version);
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        resource: &str,
    ) -> Result<T, ApiError> {
        debug!(resource = resource, "Sending workspace API request");

        let response = self.request(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else if e.is_connect() {
                ApiError::Network(format!("Connection failed: {}", e))
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        map_response(response, resource).await
    }
}

/// Map an HTTP response to a parsed payload or a typed error
async fn map_response<T: DeserializeOwned>(
    response: Response,
    resource: &str,
) -> Result<T, ApiError> {
    let status = response.status();
    match status {
        StatusCode::OK | StatusCode::CREATED => response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string())),
        StatusCode::BAD_REQUEST => {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            warn!(resource = resource, field = ?body.field, "Request rejected by remote validation");
            Err(ApiError::Validation {
                message: body
                    .message
                    .unwrap_or_else(|| "Request rejected".to_string()),
                field: body.field,
            })
        }
        StatusCode::UNAUTHORIZED => {
            warn!(resource = resource, "Unauthorized");
            Err(ApiError::Authentication)
        }
        StatusCode::FORBIDDEN => {
            warn!(resource = resource, "Permission denied");
            Err(ApiError::Permission)
        }
        StatusCode::NOT_FOUND => {
            debug!(resource = resource, "Resource not found (404)");
            Err(ApiError::NotFound(resource.to_string()))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            warn!(
                resource = resource,
                retry_after = ?retry_after_secs,
                "Rate limited by remote service"
            );
            Err(ApiError::RateLimited { retry_after_secs })
        }
        status if status.is_server_error() => {
            warn!(resource = resource, status = status.as_u16(), "Server error");
            Err(ApiError::Server(status.as_u16()))
        }
        status => {
            warn!(
                resource = resource,
                status = status.as_u16(),
                "Unexpected status"
            );
            Err(ApiError::Server(status.as_u16()))
        }
    }
}

#[async_trait]
impl WorkspaceApi for HttpWorkspaceClient {
    async fn get_database(&self, database_id: &str) -> Result<DatabasePayload, ApiError> {
        let url = self.url(&format!("databases/{}", database_id));
        self.send(self.client.get(&url), &format!("database {}", database_id))
            .await
    }

    async fn query_database(
        &self,
        database_id: &str,
        request: QueryRequest,
    ) -> Result<QueryResponse, ApiError> {
        let url = self.url(&format!("databases/{}/query", database_id));
        self.send(
            self.client.post(&url).json(&request),
            &format!("database {} query", database_id),
        )
        .await
    }

    async fn get_page(&self, page_id: &str) -> Result<PagePayload, ApiError> {
        let url = self.url(&format!("pages/{}", page_id));
        self.send(self.client.get(&url), &format!("page {}", page_id))
            .await
    }

    async fn get_page_content(&self, page_id: &str) -> Result<BlockListResponse, ApiError> {
        // Block children are paginated; aggregate to exhaustion
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = self.url(&format!("blocks/{}/children", page_id));
            if let Some(c) = &cursor {
                url.push_str(&format!("?startCursor={}", c));
            }

            let page: BlockListResponse = self
                .send(self.client.get(&url), &format!("page {} content", page_id))
                .await?;

            results.extend(page.results);
            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
        }

        Ok(BlockListResponse {
            results,
            has_more: false,
            next_cursor: None,
        })
    }

    async fn create_page(&self, request: CreatePageRequest) -> Result<PagePayload, ApiError> {
        let url = self.url("pages");
        self.send(
            self.client.post(&url).json(&request),
            &format!("create page in {}", request.parent.database_id),
        )
        .await
    }

    async fn update_page(
        &self,
        page_id: &str,
        request: UpdatePageRequest,
    ) -> Result<PagePayload, ApiError> {
        let url = self.url(&format!("pages/{}", page_id));
        self.send(
            self.client.patch(&url).json(&request),
            &format!("page {}", page_id),
        )
        .await
    }

    async fn archive_page(&self, page_id: &str) -> Result<PagePayload, ApiError> {
        let url = self.url(&format!("pages/{}", page_id));
        let request = UpdatePageRequest {
            properties: Default::default(),
            archived: Some(true),
        };
        self.send(
            self.client.patch(&url).json(&request),
            &format!("page {}", page_id),
        )
        .await
    }

    async fn search(&self, request: SearchRequest) -> Result<QueryResponse, ApiError> {
        let url = self.url("search");
        self.send(self.client.post(&url).json(&request), "search")
            .await
    }
}
