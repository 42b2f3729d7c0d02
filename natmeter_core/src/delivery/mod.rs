pub mod client;
pub mod endpoint;
pub mod traits;

pub use client::DeliveryClient;
pub use endpoint::EndpointConfig;
pub use traits::{DeliveryOutcome, EventSink};
