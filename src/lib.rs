pub mod adapters;
pub mod app;
pub mod domain;
pub mod ports;
pub mod services;

// Re-export key types for convenience

// Domain types - core business entities and value objects
pub use domain::{
    // Value objects
    BucketName,
    ObjectKey,
    VersionId,
    // Models
    BatchResult,
    BucketBatchResult,
    ClassificationRule,
    ObjectDescriptor,
    ObjectVersion,
    PolicyDocument,
    PruneReport,
    ReorganizePlan,
    UploadProgress,
    VersionHistory,
    VersionSelector,
    // Errors
    StorageError,
    StorageResult,
    UploadError,
    ValidationError,
    VersionError,
};

// Port types - interfaces for external systems
pub use ports::{
    // Storage ports
    BucketAdmin,
    ObjectStore,
    // Service ports
    BucketService,
    ObjectService,
    ReorganizeService,
    UploadRequest,
    UploadService,
    VersioningService,
};

// Service implementations - business logic
pub use services::{
    BatchReorganizer, BucketServiceImpl, MultipartAssembler, ObjectServiceImpl,
    VersioningServiceImpl,
};

// Application factory and configuration
pub use app::{
    create_app_from_env, create_in_memory_app, AppBuilder, AppConfig, AppError, AppServices,
    BatchConfig, MultipartConfig, StorageBackend,
};

// Adapter types - infrastructure implementations
pub use adapters::outbound::storage::{
    ApacheObjectStoreAdapter, InMemoryObjectStore, S3Config, S3ObjectStore, StoreOperation,
};

// Public facade for easy construction
pub mod prelude {
    pub use crate::{
        create_in_memory_app, AppBuilder, AppServices, BucketName, BucketService,
        ClassificationRule, InMemoryObjectStore, ObjectKey, ObjectService, ObjectStore,
        ReorganizeService, UploadRequest, UploadService, VersionId, VersionSelector,
        VersioningService,
    };
}
