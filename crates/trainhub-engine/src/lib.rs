#![forbid(unsafe_code)]

//! Sync coordination, job watching and the create-training workflow.

pub mod sync;
pub mod training;
pub mod watch;

pub use sync::SyncCoordinator;
pub use training::TrainingService;
pub use watch::{RunningWatch, WatchConfig, WatchEngine, WatchHandle, WatchRegistration};
