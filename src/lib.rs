pub mod archive;
pub mod config;
pub mod error;
pub mod process;
pub mod queue;
pub mod read;
pub mod schema;

pub use error::{PipelineError, Result};
