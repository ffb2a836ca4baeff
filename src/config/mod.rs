pub mod cache;

pub use cache::CacheConfig;
