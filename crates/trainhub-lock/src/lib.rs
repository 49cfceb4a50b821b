pub mod memory;
pub mod traits;

pub use memory::InMemoryLockStore;
pub use traits::{RepoSyncLockStore, SaveOutcome};
