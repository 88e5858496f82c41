//! Shared test fixtures
//!
//! `ScriptedWorkspace` is an in-memory stand-in for the remote workspace
//! service: tests script its databases, pages, and failures, then run the
//! real engine, scheduler, and store against it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use workspace_sync::error::ApiError;
use workspace_sync::models::{PropertyValue, RichText};
use workspace_sync::remote::api::{
    BlockListResponse, CreatePageRequest, DatabasePayload, PagePayload, ParentRef,
    PropertyDescriptor, QueryRequest, QueryResponse, SearchRequest, UpdatePageRequest, UserRef,
};
use workspace_sync::remote::WorkspaceApi;

const QUERY_PAGE_SIZE: usize = 2;

#[derive(Default)]
struct Inner {
    databases: HashMap<String, DatabasePayload>,
    /// Pages per database remote id, in enumeration order
    pages: HashMap<String, Vec<PagePayload>>,
    /// Raw block payloads per page id
    content: HashMap<String, Vec<serde_json::Value>>,
    /// When set, every query fails with this error
    query_failure: Option<ApiError>,
    /// Delay applied to every query, for concurrency tests
    query_delay: Option<Duration>,
    /// Recorded update_page calls
    update_calls: Vec<(String, UpdatePageRequest)>,
}

/// Scriptable in-memory workspace service
#[derive(Default)]
pub struct ScriptedWorkspace {
    inner: Arc<RwLock<Inner>>,
}

/// Build a page payload with a title property
pub fn page_payload(id: &str, title: &str, edited_at: DateTime<Utc>) -> PagePayload {
    let mut properties = BTreeMap::new();
    properties.insert(
        "Name".to_string(),
        PropertyValue::Title(vec![RichText::plain(title)]),
    );
    PagePayload {
        id: id.to_string(),
        parent: None,
        properties,
        created_time: edited_at,
        last_edited_time: edited_at,
        created_by: Some(UserRef {
            id: "remote-user".to_string(),
        }),
        last_edited_by: Some(UserRef {
            id: "remote-user".to_string(),
        }),
        archived: false,
    }
}

impl ScriptedWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a database with a title-only schema
    pub async fn put_database(&self, remote_id: &str, title: &str) {
        let mut properties = BTreeMap::new();
        properties.insert(
            "Name".to_string(),
            PropertyDescriptor {
                id: Some("p1".to_string()),
                kind: "title".to_string(),
            },
        );
        let payload = DatabasePayload {
            id: remote_id.to_string(),
            title: vec![RichText::plain(title)],
            properties,
        };
        let mut inner = self.inner.write().await;
        inner.databases.insert(remote_id.to_string(), payload);
        inner.pages.entry(remote_id.to_string()).or_default();
    }

    /// Script a page under a database
    pub async fn put_page(&self, database_remote_id: &str, payload: PagePayload) {
        let mut inner = self.inner.write().await;
        let pages = inner.pages.entry(database_remote_id.to_string()).or_default();
        pages.retain(|p| p.id != payload.id);
        pages.push(payload);
    }

    /// Bump a page's edit timestamp and title, as a remote editor would
    pub async fn edit_page(&self, database_remote_id: &str, page_id: &str, edited_at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(pages) = inner.pages.get_mut(database_remote_id) {
            if let Some(page) = pages.iter_mut().find(|p| p.id == page_id) {
                page.last_edited_time = edited_at;
                page.properties.insert(
                    "Name".to_string(),
                    PropertyValue::Title(vec![RichText::plain(format!("{} (edited)", page_id))]),
                );
            }
        }
    }

    /// Remove a page from the remote enumeration
    pub async fn remove_page(&self, database_remote_id: &str, page_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(pages) = inner.pages.get_mut(database_remote_id) {
            pages.retain(|p| p.id != page_id);
        }
    }

    /// Make every query fail with the given error
    pub async fn fail_queries_with(&self, error: Option<ApiError>) {
        self.inner.write().await.query_failure = error;
    }

    /// Slow every query down, for concurrency tests
    pub async fn set_query_delay(&self, delay: Option<Duration>) {
        self.inner.write().await.query_delay = delay;
    }

    /// Pages pushed via update_page, in call order
    pub async fn update_calls(&self) -> Vec<(String, UpdatePageRequest)> {
        self.inner.read().await.update_calls.clone()
    }
}

#[async_trait]
impl WorkspaceApi for ScriptedWorkspace {
    async fn get_database(&self, database_id: &str) -> Result<DatabasePayload, ApiError> {
        self.inner
            .read()
            .await
            .databases
            .get(database_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("database {}", database_id)))
    }

    async fn query_database(
        &self,
        database_id: &str,
        request: QueryRequest,
    ) -> Result<QueryResponse, ApiError> {
        let delay = self.inner.read().await.query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.inner.read().await;
        if let Some(error) = &inner.query_failure {
            return Err(error.clone());
        }

        let pages = inner
            .pages
            .get(database_id)
            .ok_or_else(|| ApiError::NotFound(format!("database {}", database_id)))?;

        let offset: usize = request
            .start_cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let results: Vec<PagePayload> =
            pages.iter().skip(offset).take(QUERY_PAGE_SIZE).cloned().collect();
        let next_offset = offset + results.len();
        let has_more = next_offset < pages.len();

        Ok(QueryResponse {
            results,
            has_more,
            next_cursor: has_more.then(|| next_offset.to_string()),
        })
    }

    async fn get_page(&self, page_id: &str) -> Result<PagePayload, ApiError> {
        let inner = self.inner.read().await;
        for (database_id, pages) in &inner.pages {
            if let Some(page) = pages.iter().find(|p| p.id == page_id) {
                let mut page = page.clone();
                page.parent = Some(ParentRef {
                    database_id: database_id.clone(),
                });
                return Ok(page);
            }
        }
        Err(ApiError::NotFound(format!("page {}", page_id)))
    }

    async fn get_page_content(&self, page_id: &str) -> Result<BlockListResponse, ApiError> {
        let inner = self.inner.read().await;
        Ok(BlockListResponse {
            results: inner.content.get(page_id).cloned().unwrap_or_default(),
            has_more: false,
            next_cursor: None,
        })
    }

    async fn create_page(&self, request: CreatePageRequest) -> Result<PagePayload, ApiError> {
        let mut inner = self.inner.write().await;
        let database_id = request.parent.database_id.clone();
        let id = format!("created-{}", inner.pages.values().flatten().count() + 1);

        let now = Utc::now();
        let payload = PagePayload {
            id: id.clone(),
            parent: Some(request.parent),
            properties: request.properties,
            created_time: now,
            last_edited_time: now,
            created_by: None,
            last_edited_by: None,
            archived: false,
        };
        inner
            .pages
            .entry(database_id)
            .or_default()
            .push(payload.clone());
        Ok(payload)
    }

    async fn update_page(
        &self,
        page_id: &str,
        request: UpdatePageRequest,
    ) -> Result<PagePayload, ApiError> {
        let mut inner = self.inner.write().await;
        inner
            .update_calls
            .push((page_id.to_string(), request.clone()));

        for pages in inner.pages.values_mut() {
            if let Some(page) = pages.iter_mut().find(|p| p.id == page_id) {
                if !request.properties.is_empty() {
                    page.properties = request.properties;
                }
                page.last_edited_time = Utc::now();
                if let Some(archived) = request.archived {
                    page.archived = archived;
                }
                return Ok(page.clone());
            }
        }
        Err(ApiError::NotFound(format!("page {}", page_id)))
    }

    async fn archive_page(&self, page_id: &str) -> Result<PagePayload, ApiError> {
        self.update_page(
            page_id,
            UpdatePageRequest {
                properties: BTreeMap::new(),
                archived: Some(true),
            },
        )
        .await
    }

    async fn search(&self, request: SearchRequest) -> Result<QueryResponse, ApiError> {
        let inner = self.inner.read().await;
        let query = request.query.to_lowercase();
        let results: Vec<PagePayload> = inner
            .pages
            .values()
            .flatten()
            .filter(|page| {
                page.properties.values().any(|value| {
                    value
                        .as_plain_text()
                        .map(|text| text.to_lowercase().contains(&query))
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect();
        Ok(QueryResponse {
            results,
            has_more: false,
            next_cursor: None,
        })
    }
}
