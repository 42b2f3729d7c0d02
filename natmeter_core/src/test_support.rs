#![cfg(test)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::delivery::traits::{DeliveryOutcome, EventSink};
use crate::delivery::EndpointConfig;
use crate::events::models::DeliveryBatch;
use crate::models::{ExecutionHandle, ExecutionStatus};
use crate::query::traits::{QueryEngine, ResultPage, StartQueryRequest};
use crate::{Error, Result};

/// Canned behaviour for one query text.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedQuery {
    pub statuses: Vec<ExecutionStatus>,
    /// Raw pages; `Err` makes that page request fail.
    pub pages: Vec<std::result::Result<Vec<Vec<String>>, String>>,
}

impl ScriptedQuery {
    pub(crate) fn succeeding(raw_rows: Vec<Vec<&str>>) -> Self {
        Self {
            statuses: vec![ExecutionStatus::Running, ExecutionStatus::Succeeded],
            pages: vec![Ok(owned(raw_rows))],
        }
    }
}

pub(crate) fn owned(rows: Vec<Vec<&str>>) -> Vec<Vec<String>> {
    rows.into_iter()
        .map(|r| r.into_iter().map(str::to_string).collect())
        .collect()
}

#[derive(Default)]
struct EngineState {
    scripts: HashMap<String, ScriptedQuery>,
    handles: HashMap<String, String>,
    remaining_statuses: HashMap<String, VecDeque<ExecutionStatus>>,
    started: Vec<StartQueryRequest>,
    status_polls: HashMap<String, u32>,
    page_requests: Vec<(String, i32, Option<String>)>,
}

/// In-memory query engine driven by per-query scripts.
#[derive(Default)]
pub(crate) struct ScriptedQueryEngine {
    state: Mutex<EngineState>,
}

impl ScriptedQueryEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_script(self, query: &str, script: ScriptedQuery) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(query.to_string(), script);
        self
    }

    pub(crate) fn started(&self) -> Vec<StartQueryRequest> {
        self.state.lock().unwrap().started.clone()
    }

    pub(crate) fn status_polls(&self, handle: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .status_polls
            .get(handle)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn page_requests(&self) -> Vec<(String, i32, Option<String>)> {
        self.state.lock().unwrap().page_requests.clone()
    }
}

#[async_trait]
impl QueryEngine for ScriptedQueryEngine {
    async fn start_query(&self, request: StartQueryRequest) -> Result<ExecutionHandle> {
        let mut st = self.state.lock().unwrap();
        let Some(script) = st.scripts.get(&request.query).cloned() else {
            return Err(Error::BackendMessage(format!(
                "no script for query: {}",
                request.query
            )));
        };
        let id = format!("exec-{}", st.started.len() + 1);
        st.handles.insert(id.clone(), request.query.clone());
        st.remaining_statuses
            .insert(id.clone(), script.statuses.into_iter().collect());
        st.started.push(request);
        Ok(ExecutionHandle::new(id))
    }

    async fn status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let mut st = self.state.lock().unwrap();
        *st.status_polls.entry(handle.0.clone()).or_insert(0) += 1;
        let queue = st
            .remaining_statuses
            .get_mut(handle.as_str())
            .ok_or_else(|| Error::BackendMessage(format!("unknown handle {handle}")))?;
        // The last scripted status repeats forever.
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        status.ok_or_else(|| Error::BackendMessage("empty status script".to_string()))
    }

    async fn results_page(
        &self,
        handle: &ExecutionHandle,
        page_size: i32,
        next_token: Option<String>,
    ) -> Result<ResultPage> {
        let mut st = self.state.lock().unwrap();
        st.page_requests
            .push((handle.0.clone(), page_size, next_token.clone()));
        let query = st
            .handles
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| Error::BackendMessage(format!("unknown handle {handle}")))?;
        let pages = &st.scripts[&query].pages;
        let index = match next_token.as_deref() {
            None => 0,
            Some(t) => t
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| Error::BackendMessage(format!("bad token {t}")))?,
        };
        let page = pages
            .get(index)
            .cloned()
            .ok_or_else(|| Error::BackendMessage(format!("no page {index}")))?;
        let rows = page.map_err(Error::BackendMessage)?;
        let next_token = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(ResultPage { rows, next_token })
    }
}

/// Sink that records every batch and answers from a scripted list of statuses.
#[derive(Default)]
pub(crate) struct RecordingSink {
    statuses: Mutex<VecDeque<u16>>,
    delivered: Mutex<Vec<DeliveryBatch>>,
}

impl RecordingSink {
    pub(crate) fn accepting() -> Self {
        Self::default()
    }

    /// Answers the n-th delivery with the n-th status; afterwards with 200.
    pub(crate) fn answering(statuses: Vec<u16>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn delivered(&self) -> Vec<DeliveryBatch> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(
        &self,
        batch: &DeliveryBatch,
        _endpoint: &EndpointConfig,
    ) -> Result<DeliveryOutcome> {
        self.delivered.lock().unwrap().push(batch.clone());
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        if !matches!(status, 200 | 201 | 202) {
            return Err(Error::Delivery {
                status,
                body: format!("rejected with {status}"),
            });
        }
        Ok(DeliveryOutcome {
            status,
            event_count: batch.events.len(),
            response_excerpt: String::new(),
        })
    }
}
