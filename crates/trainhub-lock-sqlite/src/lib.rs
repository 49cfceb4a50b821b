mod store;

pub use store::SqliteLockStore;
