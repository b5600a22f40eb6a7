use crate::errors::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;

/// HTTP response as seen by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// Final URL after redirects were followed
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Lower-cased header names
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(url: &str, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.to_string(),
            status,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_status_text(mut self, status_text: &str) -> Self {
        self.status_text = status_text.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload a binary body
    async fn put(&self, url: &str, body: Bytes) -> Result<TransportResponse, TransportError>;

    /// Submit form fields
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<TransportResponse, TransportError>;

    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;
}

/// `reqwest` backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn into_response(response: reqwest::Response) -> Result<TransportResponse, TransportError> {
        let url = response.url().to_string();
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(TransportResponse {
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn put(&self, url: &str, body: Bytes) -> Result<TransportResponse, TransportError> {
        log::debug!("PUT {} ({} bytes)", url, body.len());
        let response = self.client.put(url).body(body).send().await?;
        Self::into_response(response).await
    }

    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<TransportResponse, TransportError> {
        log::debug!("POST {} ({} fields)", url, fields.len());
        let response = self.client.post(url).form(fields).send().await?;
        Self::into_response(response).await
    }

    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::into_response(response).await
    }
}
