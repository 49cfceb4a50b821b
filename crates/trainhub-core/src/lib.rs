#![forbid(unsafe_code)]

//! Shared model, errors and collaborator contracts for the training control plane.

pub mod admission;
pub mod error;
pub mod model;
pub mod ports;
pub mod retry;
pub mod validation;

pub use admission::{AdmissionGate, AdmissionSlot};
pub use error::TrainingError;
pub use model::*;
pub use ports::{ArtifactStore, ComputeBackend, ReportingSink, SourcePlatform};
pub use retry::LinearBackoff;
pub use validation::ValidationError;
