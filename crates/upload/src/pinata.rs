use std::time::Duration;

use async_trait::async_trait;
use hustle_core::ids::Cid;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

use crate::{PinMetadata, PinningService, UploadError};

pub const DEFAULT_API_URL: &str = "https://api.pinata.cloud";
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.pinata.cloud";

#[derive(Debug, Clone)]
pub struct PinataConfig {
    pub jwt: String,
    pub api_url: String,
    pub gateway_url: String,
    pub request_timeout: Duration,
}

impl PinataConfig {
    pub fn new(jwt: impl Into<String>) -> Self {
        Self {
            jwt: jwt.into(),
            api_url: DEFAULT_API_URL.to_string(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: Option<String>,
}

pub struct PinataClient {
    http: reqwest::Client,
    config: PinataConfig,
}

impl PinataClient {
    pub fn new(config: PinataConfig) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PinningService for PinataClient {
    async fn pin_file(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        metadata: &PinMetadata,
    ) -> Result<Cid, UploadError> {
        let mut keyvalues = json!({
            "description": metadata.description,
            "timestamp": metadata.timestamp.to_string(),
        });
        if let Some(index) = metadata.index {
            keyvalues["index"] = json!(index.to_string());
        }
        let pinata_metadata = json!({ "name": metadata.name, "keyvalues": keyvalues });

        let mut part = Part::bytes(bytes).file_name(file_name.to_string());
        if !content_type.is_empty() {
            part = part.mime_str(content_type)?;
        }
        let form = Form::new()
            .part("file", part)
            .text("pinataMetadata", pinata_metadata.to_string())
            .text("pinataOptions", json!({ "cidVersion": 1 }).to_string());

        let response = self
            .http
            .post(self.endpoint("/pinning/pinFileToIPFS"))
            .bearer_auth(&self.config.jwt)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected {
                name: file_name.to_string(),
                reason: format!("{status}: {reason}"),
            });
        }

        let body: PinResponse = response.json().await?;
        body.ipfs_hash
            .filter(|hash| !hash.is_empty())
            .map(Cid)
            .ok_or_else(|| UploadError::Rejected {
                name: file_name.to_string(),
                reason: "response carried no IpfsHash".into(),
            })
    }

    async fn unpin(&self, cid: &Cid) -> Result<(), UploadError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("/pinning/unpin/{cid}")))
            .bearer_auth(&self.config.jwt)
            .send()
            .await?;
        response.error_for_status()?;
        Ok(())
    }

    fn gateway_url(&self, cid: &Cid) -> String {
        format!("{}/ipfs/{cid}", self.config.gateway_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_url_joins_cleanly() {
        let mut config = PinataConfig::new("jwt");
        config.gateway_url = "https://example.mypinata.cloud/".into();
        let client = PinataClient::new(config).unwrap();
        assert_eq!(
            client.gateway_url(&Cid("bafyabc".into())),
            "https://example.mypinata.cloud/ipfs/bafyabc"
        );
    }
}
