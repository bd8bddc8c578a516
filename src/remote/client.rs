//! HTTP client for the operations API.
//!
//! One endpoint shape: `GET {base}/facilities/{facility}/{query}`. Success
//! is a 2xx response with a JSON body; everything else is a fetch error.

use async_trait::async_trait;
use url::Url;

use crate::error::FetchError;

/// Source of fresh snapshots for named queries.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch(
        &self,
        query: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, FetchError>;
}

/// `reqwest`-backed remote source scoped to one facility.
pub struct HttpRemoteSource {
    client: reqwest::Client,
    base_url: Url,
    facility_id: String,
}

impl HttpRemoteSource {
    pub fn new(
        base_url: &str,
        facility_id: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, String> {
        let base_url =
            Url::parse(base_url).map_err(|e| format!("Invalid API base URL: {}", e))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url,
            facility_id: facility_id.to_string(),
        })
    }

    fn endpoint(&self, query: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(&format!("facilities/{}/{}", self.facility_id, query))
            .map_err(|e| FetchError::Network(format!("Bad endpoint for {}: {}", query, e)))
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch(
        &self,
        query: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, FetchError> {
        let url = self.endpoint(query)?;

        let mut request = self.client.get(url);
        if let Some(params) = params {
            request = request.query(params);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}
