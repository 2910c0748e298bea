// Infrastructure error types
pub mod error;

// Storage implementations
pub mod apache_object_store_adapter;
pub mod memory;

// Provider-specific implementations
pub mod s3;

// Re-export key types
pub use apache_object_store_adapter::ApacheObjectStoreAdapter;
pub use memory::{InMemoryObjectStore, StoreOperation};
pub use s3::{S3Config, S3ObjectStore};
