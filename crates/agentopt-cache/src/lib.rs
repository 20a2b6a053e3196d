pub mod backend;
pub mod error;
pub mod memory;
pub mod single_flight;
pub mod store;

pub use backend::{build_cache, CacheBackend, MAX_TTL};
pub use error::CacheError;
pub use memory::MemoryCache;
pub use single_flight::SingleFlight;
pub use store::CacheStore;
