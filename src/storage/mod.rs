//! Storage module for S3-compatible backends
//!
//! The blob store is a stateless gateway: every call is a single attempt
//! against the backend, retry policy belongs to the caller.

mod memory;
mod s3_client;
mod types;

pub use memory::MemoryStore;
pub use s3_client::S3Client;
pub use types::*;
