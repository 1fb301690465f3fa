pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod run;
pub mod sinks;
pub mod sources;
pub mod store;
pub mod transform;

pub use pipeline::{Envelope, Pipeline};
pub use report::{Reporter, RunReport};
pub use store::JsonStore;
