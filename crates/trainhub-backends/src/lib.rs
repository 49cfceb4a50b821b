#![forbid(unsafe_code)]

//! Concrete collaborators: git CLI, local filesystem, Slurm, and an HTTP reporting sink.

mod cmd;
pub mod git;
pub mod layout;
pub mod local_store;
pub mod reporting;
pub mod slurm;

pub use git::GitPlatform;
pub use local_store::LocalArtifactStore;
pub use reporting::HttpReportingSink;
pub use slurm::{SlurmBackend, SlurmConfig};
