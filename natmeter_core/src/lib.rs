//! natmeter core library: query orchestration over flow records, event mapping and delivery
//! to the metering API.

pub mod config;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod events;
pub mod handler;
pub mod models;
pub mod o11y;
pub mod orchestrator;
pub mod plan;
pub mod query;

mod test_support;

pub use config::{
    DeliverySettings, EventTimeMode, PollSettings, QueryTarget, RunConfig, RunDateMode,
};
pub use credentials::{CredentialSource, StaticCredentialSource, parse_secret_payload};
pub use delivery::{DeliveryClient, DeliveryOutcome, EndpointConfig, EventSink};
pub use error::{Error, Result};
pub use events::{
    DeliveryBatch, Dimension, DimensionKind, EventBatcher, EventRecord, Metric, MetricsShape,
    RowRejection,
};
pub use handler::{InvocationResponse, invoke};
pub use models::{ExecutionHandle, ExecutionStatus, QueryVariant, ResultSet, RunDate, VariantResult};
pub use orchestrator::{BatchSummary, Orchestrator, RunStage, RunSummary, VariantSummary};
pub use plan::{BatchSpec, DeliveryPlan};
pub use query::{QueryEngine, ResultPage, StartQueryRequest};
