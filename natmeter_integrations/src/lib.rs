//! AWS adapters for natmeter's collaborator traits.

#[cfg(feature = "athena")]
pub mod athena;
#[cfg(feature = "secretsmanager")]
pub mod secrets_manager;

#[cfg(feature = "athena")]
pub use athena::AthenaQueryEngine;
#[cfg(feature = "secretsmanager")]
pub use secrets_manager::SecretsManagerCredentialSource;

use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Shared SDK config from the default provider chain; `region` overrides the resolved region.
#[tracing::instrument(level = "debug")]
pub async fn load_aws_config(region: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    loader.load().await
}
