//! Publisher errors: the failing step plus its taxonomy kind.

use shipfn_core::{ErrorKind, RecordError};
use shipfn_pack::{BuildError, PackError};
use shipfn_platform::PlatformError;
use shipfn_store::StoreError;
use thiserror::Error;

use crate::controller::Phase;

/// Underlying failure of a publisher step.
#[derive(Debug, Error)]
pub enum Cause {
    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Record(#[from] RecordError),

    /// Version registration succeeded but the alias could not be moved.
    #[error("version {version} is published but alias {alias} was not moved to it: {source}")]
    AliasNotShifted {
        version: String,
        alias: String,
        #[source]
        source: PlatformError,
    },

    /// Prior state that the change set relies on is missing.
    #[error("{0}")]
    Inconsistent(String),

    #[error("cancelled before {0}")]
    Cancelled(Phase),
}

impl Cause {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Cause::Pack(e) => e.kind(),
            Cause::Build(e) => e.kind(),
            Cause::Store(e) => e.kind(),
            Cause::Platform(e) => e.kind(),
            Cause::Record(e) => e.kind(),
            Cause::AliasNotShifted { .. } => ErrorKind::PartialDeployment,
            Cause::Inconsistent(_) => ErrorKind::ValidationError,
            Cause::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

/// A fatal publisher failure, tagged with the step where it happened.
#[derive(Debug, Error)]
#[error("[{kind}] at {phase}: {cause}")]
pub struct PublishError {
    pub phase: Phase,
    pub kind: ErrorKind,
    #[source]
    pub cause: Cause,
}

impl PublishError {
    pub fn new(phase: Phase, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        Self {
            phase,
            kind: cause.kind(),
            cause,
        }
    }

    pub fn is_partial_deployment(&self) -> bool {
        self.kind == ErrorKind::PartialDeployment
    }
}
