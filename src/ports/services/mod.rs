mod bucket_service;
mod object_service;
mod reorganize_service;
mod upload_service;
mod versioning_service;

pub use bucket_service::BucketService;
pub use object_service::{ImportRequest, ImportedObject, ObjectService};
pub use reorganize_service::ReorganizeService;
pub use upload_service::{Payload, ProgressCallback, UploadRequest, UploadService};
pub use versioning_service::VersioningService;
