//! Amazon Athena as the query engine.

use async_trait::async_trait;
use aws_sdk_athena::Client;
use aws_sdk_athena::types::{
    QueryExecutionContext, QueryExecutionState, ResultConfiguration, ResultSet as AthenaResultSet,
};
use natmeter_core::query::{QueryEngine, ResultPage, StartQueryRequest};
use natmeter_core::{Error, ExecutionHandle, ExecutionStatus, Result};
use tracing::instrument;

#[derive(Clone)]
pub struct AthenaQueryEngine {
    client: Client,
}

impl AthenaQueryEngine {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(shared: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(shared))
    }
}

#[async_trait]
impl QueryEngine for AthenaQueryEngine {
    #[instrument(level = "debug", skip(self, request), fields(database = %request.database, workgroup = %request.workgroup))]
    async fn start_query(&self, request: StartQueryRequest) -> Result<ExecutionHandle> {
        let resp = self
            .client
            .start_query_execution()
            .query_string(request.query)
            .query_execution_context(
                QueryExecutionContext::builder()
                    .database(request.database)
                    .build(),
            )
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(request.output_location)
                    .build(),
            )
            .work_group(request.workgroup)
            .set_execution_parameters(Some(request.parameters))
            .send()
            .await
            .map_err(|e| Error::backend("athena start_query_execution", e))?;

        resp.query_execution_id()
            .map(ExecutionHandle::new)
            .ok_or_else(|| {
                Error::BackendMessage("athena returned no query execution id".to_string())
            })
    }

    #[instrument(level = "debug", skip(self))]
    async fn status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let resp = self
            .client
            .get_query_execution()
            .query_execution_id(handle.as_str())
            .send()
            .await
            .map_err(|e| Error::backend("athena get_query_execution", e))?;

        let status = resp.query_execution().and_then(|q| q.status());
        let state = status.and_then(|s| s.state()).ok_or_else(|| {
            Error::BackendMessage(format!("athena returned no state for query {handle}"))
        })?;
        let mapped = map_state(state)?;
        if matches!(mapped, ExecutionStatus::Failed | ExecutionStatus::Cancelled) {
            let reason = status.and_then(|s| s.state_change_reason()).unwrap_or("");
            tracing::warn!(execution_id = %handle, state = %mapped, reason, "query did not succeed");
        }
        Ok(mapped)
    }

    #[instrument(level = "debug", skip(self))]
    async fn results_page(
        &self,
        handle: &ExecutionHandle,
        page_size: i32,
        next_token: Option<String>,
    ) -> Result<ResultPage> {
        let resp = self
            .client
            .get_query_results()
            .query_execution_id(handle.as_str())
            .max_results(page_size)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| Error::backend("athena get_query_results", e))?;

        Ok(ResultPage {
            rows: resp.result_set().map(rows_of).unwrap_or_default(),
            next_token: resp.next_token().map(str::to_string),
        })
    }
}

/// `QUEUED` counts as still running.
fn map_state(state: &QueryExecutionState) -> Result<ExecutionStatus> {
    match state {
        QueryExecutionState::Queued | QueryExecutionState::Running => Ok(ExecutionStatus::Running),
        QueryExecutionState::Succeeded => Ok(ExecutionStatus::Succeeded),
        QueryExecutionState::Failed => Ok(ExecutionStatus::Failed),
        QueryExecutionState::Cancelled => Ok(ExecutionStatus::Cancelled),
        other => Err(Error::BackendMessage(format!(
            "unknown athena query state: {}",
            other.as_str()
        ))),
    }
}

/// NULL cells become empty strings.
fn rows_of(result_set: &AthenaResultSet) -> Vec<Vec<String>> {
    result_set
        .rows()
        .iter()
        .map(|row| {
            row.data()
                .iter()
                .map(|d| d.var_char_value().unwrap_or_default().to_string())
                .collect()
        })
        .collect()
}
