use std::fmt;

use crate::{Error, Result};

/// Where and as whom a batch is delivered. Built from the credential secret.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub api_url: String,
    pub api_key: String,
    pub customer_context: String,
}

impl EndpointConfig {
    /// All three fields must be present, non-empty strings.
    pub fn from_secret(secret: &serde_json::Value) -> Result<Self> {
        let obj = secret
            .as_object()
            .ok_or_else(|| Error::configuration("credential secret is not a JSON object"))?;
        let field = |name: &str| -> Result<String> {
            obj.get(name)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::configuration(format!("credential secret is missing '{name}'"))
                })
        };
        Ok(Self {
            api_url: field("api_url")?,
            api_key: field("api_key")?,
            customer_context: field("customer_context")?,
        })
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("customer_context", &self.customer_context)
            .finish()
    }
}
