//! # Subgraph Client
//!
//! Every read goes through [`QueryClient`] so the walker, the sync job and the
//! server can be handed a real HTTP client or an in-process fake.
//!
//! Both subgraphs speak plain GraphQL over HTTP POST:
//! - request body `{ "query": ..., "variables": ... }`
//! - response body `{ "data": ..., "errors": [...] }`
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{GovernanceError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Runs one GraphQL document and returns its `data` member.
    async fn query(&self, document: &str, variables: Value) -> Result<Value>;
}

#[derive(Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Option<Value>,

    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    endpoint: String,
}

impl GraphClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryClient for GraphClient {
    async fn query(&self, document: &str, variables: Value) -> Result<Value> {
        let payload = json!({
            "query": document,
            "variables": variables,
        });

        let res = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: GraphResponse = res.json().await?;

        into_data(body)
    }
}

fn into_data(body: GraphResponse) -> Result<Value> {
    if !body.errors.is_empty() {
        let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();

        return Err(GovernanceError::fetch(messages.join("; ")));
    }

    body.data
        .ok_or_else(|| GovernanceError::fetch("response carried no data"))
}
