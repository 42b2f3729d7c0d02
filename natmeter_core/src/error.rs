use std::error::Error as StdError;

use crate::models::ExecutionStatus;

/// Common error type for `natmeter_core`.
///
/// Every variant is fatal for a run: the orchestrator stops at the first one and turns it
/// into a failure response. Per-row mapping problems are not errors; see
/// [`crate::events::mapping::RowRejection`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("query {execution_id} did not complete within {waited_secs} seconds ({attempts} attempts)")]
    Timeout {
        execution_id: String,
        attempts: u32,
        waited_secs: u64,
    },

    #[error("query {execution_id} failed with status: {status}")]
    QueryFailed {
        execution_id: String,
        status: ExecutionStatus,
    },

    #[error("fetching results for query {execution_id} failed: {source}")]
    Fetch {
        execution_id: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("result header of variant '{variant}' does not match the header of batch '{provider}'")]
    HeaderMismatch { provider: String, variant: String },

    #[error("metering API error: {status} - {body}")]
    Delivery { status: u16, body: String },

    #[error("backend error: {context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("backend error: {0}")]
    BackendMessage(String),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    #[tracing::instrument(level = "debug", name = "natmeter.error.backend", skip(source))]
    pub fn backend(
        context: impl Into<String> + std::fmt::Debug,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Convenience: wrap any error into `Backend` with "reqwest" context.
    pub fn backend_reqwest(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Backend {
            context: "reqwest".into(),
            source: Box::new(source),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
