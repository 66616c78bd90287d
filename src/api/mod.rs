pub mod client;
pub mod keys;
pub mod types;

pub use client::ImcsClient;
pub use keys::CacheKey;
