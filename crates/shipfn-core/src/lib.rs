pub mod config;
pub mod error;
pub mod report;
pub mod runtime;
pub mod types;

pub use config::{DeployConfig, RetryConfig, SandboxConfig, ShipConfig};
pub use error::{ConfigError, ErrorKind};
pub use report::{ArtifactState, ChangeSet, RunReport};
pub use runtime::{Ecosystem, Runtime, RuntimeError};
pub use types::*;
