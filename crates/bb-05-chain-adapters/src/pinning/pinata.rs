//! Pinata pinning API client.
//!
//! Uploads authenticate with the JWT; pin-by-hash and unpin use the API key
//! pair. Retrieval goes through the public gateway.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use shared_types::{Cid, PinningError, PinningService};
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone, Debug)]
pub struct PinataConfig {
    pub jwt: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_base: String,
    pub gateway_base: String,
    pub timeout: Duration,
}

impl Default for PinataConfig {
    fn default() -> Self {
        Self {
            jwt: None,
            api_key: None,
            api_secret: None,
            api_base: "https://api.pinata.cloud".to_string(),
            gateway_base: "https://gateway.pinata.cloud/ipfs".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinataResponse {
    ipfs_hash: String,
}

pub struct PinataClient {
    http_client: reqwest::Client,
    config: PinataConfig,
}

impl PinataClient {
    pub fn new(config: PinataConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http_client,
            config,
        }
    }

    fn jwt(&self) -> Result<&str, PinningError> {
        self.config
            .jwt
            .as_deref()
            .filter(|jwt| !jwt.is_empty())
            .ok_or(PinningError::NotConfigured)
    }

    fn api_keys(&self) -> Result<(&str, &str), PinningError> {
        match (&self.config.api_key, &self.config.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Ok((key.as_str(), secret.as_str()))
            }
            _ => Err(PinningError::NotConfigured),
        }
    }

    async fn upload(&self, content: Vec<u8>, file_name: &str) -> Result<Cid, PinningError> {
        let jwt = self.jwt()?;
        let size = content.len();
        let form = Form::new().part("file", Part::bytes(content).file_name(file_name.to_string()));

        let response = self
            .http_client
            .post(format!("{}/pinning/pinFileToIPFS", self.config.api_base))
            .bearer_auth(jwt)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: PinataResponse = response
            .json()
            .await
            .map_err(|e| PinningError::InvalidResponse(e.to_string()))?;
        let cid = Cid::parse(body.ipfs_hash)
            .map_err(|e| PinningError::InvalidResponse(e.to_string()))?;

        info!(file_name, size, cid = %cid, "Pinned file");
        Ok(cid)
    }
}

#[async_trait]
impl PinningService for PinataClient {
    async fn pin_file(&self, content: Vec<u8>, file_name: &str) -> Result<Cid, PinningError> {
        self.upload(content, file_name).await.inspect_err(|e| {
            error!(file_name, error = %e, "File upload failed");
        })
    }

    async fn pin_json(
        &self,
        value: &serde_json::Value,
        name: Option<&str>,
    ) -> Result<Cid, PinningError> {
        let content = serde_json::to_vec(value)
            .map_err(|e| PinningError::InvalidResponse(e.to_string()))?;
        self.upload(content, name.unwrap_or("data.json")).await
    }

    async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>, PinningError> {
        let response = self
            .http_client
            .get(self.gateway_url(cid))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn pin(&self, cid: &Cid) -> Result<(), PinningError> {
        let (key, secret) = self.api_keys()?;
        let response = self
            .http_client
            .post(format!("{}/pinning/pinByHash", self.config.api_base))
            .header("pinata_api_key", key)
            .header("pinata_secret_api_key", secret)
            .json(&json!({ "hashToPin": cid.as_str() }))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        info!(cid = %cid, "Pinned by hash");
        Ok(())
    }

    async fn unpin(&self, cid: &Cid) -> Result<(), PinningError> {
        let (key, secret) = self.api_keys()?;
        let response = self
            .http_client
            .delete(format!("{}/pinning/unpin/{cid}", self.config.api_base))
            .header("pinata_api_key", key)
            .header("pinata_secret_api_key", secret)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        info!(cid = %cid, "Unpinned");
        Ok(())
    }

    fn gateway_url(&self, cid: &Cid) -> String {
        format!("{}/{cid}", self.config.gateway_base.trim_end_matches('/'))
    }
}

fn transport_error(error: reqwest::Error) -> PinningError {
    PinningError::Unavailable(error.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PinningError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(PinningError::NotFound(message));
    }
    Err(PinningError::Rejected {
        status: status.as_u16(),
        message,
    })
}
