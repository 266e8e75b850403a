//! shipfn rollout: the publisher.
//!
//! Compares current fingerprints with the last deployment record, rebuilds
//! only what changed, and publishes through the execution platform ending
//! with a single atomic alias move.
//!
//! # Components
//!
//! - **`controller`**: the [`Publisher`] state machine ([`Phase`])
//! - **`retry`**: bounded exponential backoff for transient failures
//! - **`plan`**: dry-run and status views
//! - **`error`**: [`PublishError`], the failing phase plus its kind

pub mod controller;
pub mod error;
pub mod plan;
pub mod retry;

pub use controller::{Phase, Publisher};
pub use error::{Cause, PublishError};
pub use plan::{PlanReport, StatusReport};
pub use retry::RetryPolicy;
