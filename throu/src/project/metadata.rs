use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use services_common::utils::decode_response_type_or_raw;
use std::time::Duration;

/// Off-chain metadata document referenced by a project.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub attributes: Vec<MetadataAttribute>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: serde_json::Value,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, uri: &str) -> anyhow::Result<ProjectMetadata>;
}

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct MetadataConfig {
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
    #[serde(default = "default_arweave_gateway")]
    pub arweave_gateway: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Shown for projects without a usable image.
    #[serde(default = "default_fallback_image")]
    pub fallback_image: String,
}

fn default_ipfs_gateway() -> String {
    "https://ipfs.io/ipfs/".into()
}

fn default_arweave_gateway() -> String {
    "https://arweave.net/".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_fallback_image() -> String {
    "/images/project-placeholder.png".into()
}

impl MetadataConfig {
    /// Maps content-addressed uris onto http gateways.
    pub fn resolve_uri(&self, uri: &str) -> String {
        let uri = uri.trim();
        if let Some(path) = uri.strip_prefix("ipfs://") {
            let path = path.strip_prefix("ipfs/").unwrap_or(path);
            format!("{}{path}", self.ipfs_gateway)
        } else if let Some(path) = uri.strip_prefix("ar://") {
            format!("{}{path}", self.arweave_gateway)
        } else {
            uri.to_string()
        }
    }
}

pub struct HttpMetadata {
    client: reqwest::Client,
    config: MetadataConfig,
}

impl HttpMetadata {
    pub fn new(config: MetadataConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build metadata http client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl MetadataSource for HttpMetadata {
    async fn fetch(&self, uri: &str) -> anyhow::Result<ProjectMetadata> {
        let url = self.config.resolve_uri(uri);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("fetch metadata {url}"))?
            .error_for_status()?;
        let mut metadata: ProjectMetadata = decode_response_type_or_raw(response).await?;
        metadata.image = metadata.image.map(|image| self.config.resolve_uri(&image));
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uri() {
        let config = MetadataConfig::default();
        assert_eq!(
            config.resolve_uri("ipfs://bafy/meta.json"),
            "https://ipfs.io/ipfs/bafy/meta.json"
        );
        assert_eq!(config.resolve_uri("ipfs://ipfs/bafy"), "https://ipfs.io/ipfs/bafy");
        assert_eq!(config.resolve_uri("ar://tx"), "https://arweave.net/tx");
        assert_eq!(
            config.resolve_uri("https://example.com/a.json"),
            "https://example.com/a.json"
        );
    }

    #[test]
    fn test_partial_document() -> anyhow::Result<()> {
        let metadata: ProjectMetadata = serde_json::from_value(serde_json::json!({
            "name": "Casa Azul",
            "attributes": [{ "trait_type": "rooms", "value": 3 }],
        }))?;
        assert_eq!(metadata.name.as_deref(), Some("Casa Azul"));
        assert_eq!(metadata.image, None);
        assert_eq!(metadata.attributes[0].value, serde_json::json!(3));
        Ok(())
    }
}
