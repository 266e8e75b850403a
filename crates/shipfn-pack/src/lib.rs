//! shipfn pack: fingerprinting, code packaging and sandboxed dependency builds.
//!
//! - [`fingerprint`] hashes the source tree and the dependency descriptor.
//! - [`archive`] produces deterministic zip archives ([`ZipPackager`]).
//! - [`builder`] installs dependencies inside a [`sandbox`] container and
//!   archives them in the platform's layer layout.

pub mod archive;
pub mod builder;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod installer;
pub mod sandbox;

pub use archive::{Archive, Packager, ZipPackager};
pub use builder::{DependencyBuilder, SandboxBuilder};
pub use descriptor::Descriptor;
pub use error::{BuildError, PackError};
pub use fingerprint::{Exclusions, fingerprint_dependencies, fingerprint_source};
pub use sandbox::{ContainerEngine, DockerEngine, Sandbox};
