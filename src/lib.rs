pub mod config;
pub mod constants;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod types;

pub use config::{load_config, Config, RunOverrides};
pub use error::{PipelineError, Result};
pub use pipeline::driver::{run_pipeline, PipelineSummary};
