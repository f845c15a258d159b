use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PlanError;
use crate::recipe::RecipeDocument;
use crate::search::index::{IndexFilters, IndexHit, RecipeIndex};

pub const INDEX_URL_ENV_VAR: &str = "NUTRI_INDEX_URL";
pub const INDEX_API_KEY_ENV_VAR: &str = "NUTRI_INDEX_API_KEY";

#[derive(Debug, Serialize)]
struct IndexRequest<'a> {
    text: &'a str,
    filters: &'a IndexFilters,
    k: usize,
}

#[derive(Debug, Deserialize)]
struct IndexResponseItem {
    id: String,
    similarity: f32,
    payload: RecipeDocument,
}

/// Client for a remote index that accepts `{text, filters, k}` and answers
/// with `[{id, similarity, payload}]`.
pub struct HttpRecipeIndex {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpRecipeIndex {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, PlanError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PlanError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Builds a client from the environment. An explicit `endpoint` wins over
    /// `NUTRI_INDEX_URL`; the bearer key always comes from `NUTRI_INDEX_API_KEY`.
    pub fn from_env(endpoint: Option<String>, request_timeout: Duration) -> Result<Self, PlanError> {
        dotenv::dotenv().ok();
        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => env::var(INDEX_URL_ENV_VAR)
                .map_err(|_| PlanError::Config(format!("{INDEX_URL_ENV_VAR} is not set")))?,
        };
        let index = Self::new(endpoint, request_timeout)?;
        Ok(match env::var(INDEX_API_KEY_ENV_VAR) {
            Ok(key) if !key.trim().is_empty() => index.with_api_key(key),
            _ => index,
        })
    }
}

#[async_trait]
impl RecipeIndex for HttpRecipeIndex {
    async fn query(
        &self,
        text: &str,
        filters: &IndexFilters,
        k: usize,
    ) -> Result<Vec<IndexHit>, PlanError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&IndexRequest { text, filters, k });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlanError::IndexUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(status_error(status, body));
        }

        let items: Vec<IndexResponseItem> = response
            .json()
            .await
            .map_err(|e| PlanError::IndexUnavailable(format!("malformed index response: {e}")))?;
        debug!(endpoint = %self.endpoint, hits = items.len(), "remote index answered");

        Ok(items
            .into_iter()
            .map(|item| IndexHit {
                id: item.id,
                similarity: item.similarity,
                document: Arc::new(item.payload),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "remote recipe index"
    }
}

/// Server-side trouble, throttling and request timeouts are worth retrying;
/// other client errors will fail the same way again.
fn status_error(status: StatusCode, body: String) -> PlanError {
    let retryable = status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT;
    if retryable {
        PlanError::IndexUnavailable(format!("status {status}: {body}"))
    } else {
        PlanError::IndexRejected {
            status: status.as_u16(),
            message: body,
        }
    }
}
