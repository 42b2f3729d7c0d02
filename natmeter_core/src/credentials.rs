//! Lookup of the metering API credential secret.

use std::path::Path;

use async_trait::async_trait;

use crate::{Error, Result};

/// Resolves a named secret to its JSON payload.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self, secret_id: &str) -> Result<serde_json::Value>;
}

/// Returns the same payload for any secret id. Used for local runs and tests.
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    payload: serde_json::Value,
}

impl StaticCredentialSource {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    #[tracing::instrument(level = "debug")]
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read credentials file {}: {e}", path.display()))
        })?;
        let payload = parse_secret_payload(&text)?;
        Ok(Self::new(payload))
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch(&self, secret_id: &str) -> Result<serde_json::Value> {
        tracing::debug!(secret_id, "using static credentials");
        Ok(self.payload.clone())
    }
}

/// Parses a secret string; anything other than a JSON object is a configuration error.
pub fn parse_secret_payload(text: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::configuration(format!("credential secret is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(Error::configuration("credential secret is not a JSON object"));
    }
    Ok(value)
}
