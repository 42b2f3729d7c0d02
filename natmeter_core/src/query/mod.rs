//! Query side of a run: submit, wait for a terminal state, fetch every result page.
//!
//! The query engine is consumed only through [`traits::QueryEngine`]; the Athena adapter lives
//! in `natmeter_integrations`.

pub mod executor;
pub mod fetcher;
pub mod poller;
pub mod traits;

pub use executor::QueryExecutor;
pub use fetcher::ResultFetcher;
pub use poller::CompletionPoller;
pub use traits::{QueryEngine, ResultPage, StartQueryRequest};
