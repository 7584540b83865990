//! Configuration module for the agent
//!
//! Configuration is read from a single YAML file, with credentials resolved
//! from the process environment or `.env` style files at load time.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

use crate::errors::AgentError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<ParleyConfig, AgentError> {
    ConfigLoader::from_file(path).await
}
