pub mod config;
pub mod error;
pub mod store;
pub mod types;
pub mod workflow;

pub use config::{ConfigLoader, StageflowConfig};
pub use error::{AppError, ErrorReporter, StderrReporter};
pub use types::*;
