pub mod simple_cache;
pub mod simple_memory;

pub use simple_cache::{CacheLinks, CacheStats, SimpleCache};
pub use simple_memory::{MemoryStats, SimpleMemory};
