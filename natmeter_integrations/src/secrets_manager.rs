//! AWS Secrets Manager as the credential source.

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use natmeter_core::credentials::{CredentialSource, parse_secret_payload};
use natmeter_core::{Error, Result};
use tracing::instrument;

#[derive(Clone)]
pub struct SecretsManagerCredentialSource {
    client: Client,
}

impl SecretsManagerCredentialSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(shared: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(shared))
    }
}

#[async_trait]
impl CredentialSource for SecretsManagerCredentialSource {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, secret_id: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| Error::backend("secretsmanager get_secret_value", e))?;

        let text = resp.secret_string().ok_or_else(|| {
            Error::configuration(format!("secret '{secret_id}' has no string value"))
        })?;
        parse_secret_payload(text)
    }
}
