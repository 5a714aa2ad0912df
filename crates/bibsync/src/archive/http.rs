//! HTTP implementation of the archive client.
//!
//! Talks JSON to a remote archive gateway. Endpoint shapes:
//! `GET /api/sources`, `GET /api/sources/{source}/children?path=`,
//! `GET /api/records/{id}/properties`, `GET /api/records/{id}/content`,
//! `GET /api/search?q=&source=&limit=`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::archive::client::ArchiveClient;
use crate::archive::types::{ArchiveRecord, ArchiveSource, RecordProperties};
use crate::error::ArchiveError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Archive client over a JSON REST gateway.
pub struct HttpArchiveClient {
    base_url: String,
    client: Client,
    api_token: Option<String>,
}

impl HttpArchiveClient {
    pub fn new(base_url: &str) -> Result<Self, ArchiveError> {
        Self::with_token(base_url, None)
    }

    pub fn with_token(base_url: &str, api_token: Option<String>) -> Result<Self, ArchiveError> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ArchiveError::Request(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            api_token,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(ref token) = self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ArchiveError> {
        let response = self
            .request(path)
            .query(query)
            .send()
            .await
            .map_err(|e| ArchiveError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ArchiveError::RecordNotFound(path.to_string())),
            status if !status.is_success() => Err(ArchiveError::Request(format!(
                "archive returned {} for {}",
                status, path
            ))),
            _ => response
                .json::<T>()
                .await
                .map_err(|e| ArchiveError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl ArchiveClient for HttpArchiveClient {
    async fn is_available(&self) -> bool {
        match self.request("/api/health").send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_open_sources(&self) -> Result<Vec<ArchiveSource>, ArchiveError> {
        self.get_json("/api/sources", &[]).await
    }

    async fn list_children(
        &self,
        path: &str,
        source: &str,
    ) -> Result<Vec<ArchiveRecord>, ArchiveError> {
        let endpoint = format!("/api/sources/{source}/children");
        self.get_json(&endpoint, &[("path", path)]).await
    }

    async fn get_properties(&self, record_id: &str) -> Result<RecordProperties, ArchiveError> {
        let endpoint = format!("/api/records/{record_id}/properties");
        self.get_json(&endpoint, &[]).await
    }

    async fn get_content(&self, record_id: &str) -> Result<Vec<u8>, ArchiveError> {
        let endpoint = format!("/api/records/{record_id}/content");
        let response = self
            .request(&endpoint)
            .send()
            .await
            .map_err(|e| ArchiveError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ArchiveError::RecordNotFound(record_id.to_string())),
            status if !status.is_success() => Err(ArchiveError::Request(format!(
                "archive returned {} for record {}",
                status, record_id
            ))),
            _ => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| ArchiveError::Request(e.to_string())),
        }
    }

    async fn search(
        &self,
        query: &str,
        source: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ArchiveRecord>, ArchiveError> {
        let limit_str = limit.map(|l| l.to_string());
        let mut params: Vec<(&str, &str)> = vec![("q", query), ("source", source)];
        if let Some(ref l) = limit_str {
            params.push(("limit", l));
        }
        self.get_json("/api/search", &params).await
    }
}
