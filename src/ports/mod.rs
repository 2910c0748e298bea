pub mod services;
pub mod storage;

// Re-export all port traits for convenience
pub use services::{
    BucketService, ImportRequest, ImportedObject, ObjectService, Payload, ProgressCallback,
    ReorganizeService, UploadRequest, UploadService, VersioningService,
};
pub use storage::{object_listing, version_listing, BucketAdmin, ObjectStore, Page};
