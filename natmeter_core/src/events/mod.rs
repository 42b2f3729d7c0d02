pub mod batcher;
pub mod mapping;
pub mod models;

pub use batcher::EventBatcher;
pub use mapping::{HeaderIndex, RowMapper, RowRejection};
pub use models::{DeliveryBatch, Dimension, DimensionKind, EventRecord, Metric, MetricsShape};
