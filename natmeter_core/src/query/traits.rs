use crate::Result;
use crate::models::{ExecutionHandle, ExecutionStatus};
use async_trait::async_trait;

/// Everything the engine needs to start one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartQueryRequest {
    pub query: String,
    pub database: String,
    /// Where the engine writes its result files, e.g. `s3://bucket/query-results/`.
    pub output_location: String,
    pub workgroup: String,
    /// Positional execution parameters (year, month, day).
    pub parameters: Vec<String>,
}

/// One page of raw result rows. The very first page starts with the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    pub rows: Vec<Vec<String>>,
    pub next_token: Option<String>,
}

/// Submit / poll / fetch contract of an asynchronous query engine.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Starts remote execution and returns without waiting for it.
    async fn start_query(&self, request: StartQueryRequest) -> Result<ExecutionHandle>;

    async fn status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus>;

    async fn results_page(
        &self,
        handle: &ExecutionHandle,
        page_size: i32,
        next_token: Option<String>,
    ) -> Result<ResultPage>;
}
