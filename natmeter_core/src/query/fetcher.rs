use std::sync::Arc;

use crate::models::{ExecutionHandle, ResultSet};
use crate::query::traits::QueryEngine;
use crate::{Error, Result};

/// Upper bound the engine accepts for one results page.
pub const MAX_PAGE_SIZE: i32 = 1000;

/// Pulls every result page of a finished execution into one [`ResultSet`].
#[derive(Clone)]
pub struct ResultFetcher {
    engine: Arc<dyn QueryEngine>,
    page_size: i32,
}

impl ResultFetcher {
    pub fn new(engine: Arc<dyn QueryEngine>, page_size: i32) -> Self {
        Self {
            engine,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Follows continuation tokens until exhausted. All-or-nothing: any failing page aborts
    /// with [`Error::Fetch`] and nothing collected so far is returned.
    #[tracing::instrument(level = "info", skip(self), fields(execution_id = %handle))]
    pub async fn fetch_all(&self, handle: &ExecutionHandle) -> Result<ResultSet> {
        let mut raw: Vec<Vec<String>> = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0u32;
        loop {
            let page = self
                .engine
                .results_page(handle, self.page_size, token.take())
                .await
                .map_err(|e| Error::Fetch {
                    execution_id: handle.to_string(),
                    source: Box::new(e),
                })?;
            pages += 1;
            raw.extend(page.rows);

            match page.next_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }

        let result = ResultSet::from_raw_rows(raw);
        tracing::debug!(pages, rows = result.row_count(), "fetched query results");
        Ok(result)
    }
}
