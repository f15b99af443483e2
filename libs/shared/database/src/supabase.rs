use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Errors surfaced by the PostgREST layer. The scheduling and ledger
/// services branch on `Conflict` and `NotFound`, everything else is an
/// infrastructure fault for the caller to treat as fatal.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response shape: {0}")]
    Decode(String),
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_role_key: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    fn headers(&self, returning: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // The engine runs against the service role; row-level security is
        // enforced upstream by the staff auth middleware.
        let bearer = self.service_role_key.as_deref().unwrap_or(&self.anon_key);
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", bearer)) {
            headers.insert(AUTHORIZATION, value);
        }

        if returning {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }

        headers
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        returning: bool,
    ) -> Result<reqwest::Response, DbError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.headers(returning));

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DbError::Auth(error_text),
                StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => DbError::NotFound(error_text),
                StatusCode::CONFLICT => DbError::Conflict(error_text),
                _ => DbError::Api {
                    status: status.as_u16(),
                    message: error_text,
                },
            });
        }

        Ok(response)
    }

    /// Read request; deserializes the response body.
    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, body, false).await?;
        let data = response
            .json::<T>()
            .await
            .map_err(|e| DbError::Decode(e.to_string()))?;
        Ok(data)
    }

    /// Write request with `Prefer: return=representation`, so PostgREST
    /// echoes the affected rows back. An empty row set on PATCH means the
    /// filter matched nothing.
    pub async fn request_returning<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, body, true).await?;
        let data = response
            .json::<T>()
            .await
            .map_err(|e| DbError::Decode(e.to_string()))?;
        Ok(data)
    }

    /// Write request where the response body is irrelevant (PostgREST
    /// answers 204 for plain writes).
    pub async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<(), DbError> {
        self.send(method, path, body, false).await?;
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
