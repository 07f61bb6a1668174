//! Cache store implementations.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage (always available)
//! - `RedisStore` - Redis storage (requires `redis` feature)

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
