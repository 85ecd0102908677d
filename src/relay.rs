pub mod cache;
pub mod mapping;
pub mod store;

pub use self::cache::RelayCache;
pub use self::mapping::{AddOutcome, RemoveOutcome, RemoveTarget};
pub use self::store::{RelayStore, StoreError};
