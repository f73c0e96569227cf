//! HTTP client for the IoT Studio REST backend

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::ApiError;
use crate::config::ApiConfig;
use crate::store::Session;

pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List all sessions
    pub async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.get_json(&format!("{}/sessions", self.base_url)).await
    }

    /// Fetch one session by id
    pub async fn get_session(&self, id: &str) -> Result<Session, ApiError> {
        self.get_json(&format!("{}/sessions/{}", self.base_url, id)).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        tracing::debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::from_send(e, url))?;

        let response = check_status(response, url).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: Response, url: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(url.to_string()));
    }

    let message = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}
