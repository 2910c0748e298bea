use std::{path::PathBuf, sync::Arc};

use tracing::info;

use crate::{
    adapters::outbound::storage::{
        s3::DEFAULT_MAX_ATTEMPTS, ApacheObjectStoreAdapter, InMemoryObjectStore, S3Config,
        S3ObjectStore,
    },
    ports::{
        services::{BucketService, ObjectService, ReorganizeService, UploadService, VersioningService},
        storage::{BucketAdmin, ObjectStore},
    },
    services::{
        BatchReorganizer, BucketServiceImpl, MultipartAssembler, ObjectServiceImpl,
        VersioningServiceImpl,
    },
};

const MIB: u64 = 1024 * 1024;

/// Configuration for the application
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub storage_backend: StorageBackend,
    pub multipart: MultipartConfig,
    pub batch: BatchConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Default)]
pub enum StorageBackend {
    #[default]
    InMemory,
    /// Buckets are directories under `root`
    Local { root: PathBuf },
    S3(S3Config),
}

/// Multipart upload limits
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    pub min_part_size: u64,
    /// Largest single part the backend accepts
    pub max_part_size: u64,
    pub default_part_size: u64,
    pub max_parts: u32,
    /// Parts in flight at once
    pub concurrency: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            min_part_size: 5 * MIB,
            max_part_size: 5 * 1024 * MIB,
            default_part_size: 8 * MIB,
            max_parts: 10_000,
            concurrency: 1,
        }
    }
}

/// Limits for reorganize and prune batches
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Entries moved at once
    pub concurrency: usize,
    /// Identifiers per bulk delete request, capped by the store's own limit
    pub delete_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            delete_batch_size: 1000,
        }
    }
}

/// Application services container
#[derive(Clone)]
pub struct AppServices {
    pub uploads: Arc<dyn UploadService>,
    pub reorganizer: Arc<dyn ReorganizeService>,
    pub versions: Arc<dyn VersioningService>,
    pub buckets: Arc<dyn BucketService>,
    pub objects: Arc<dyn ObjectService>,
    pub store: Arc<dyn ObjectStore>,
    pub admin: Arc<dyn BucketAdmin>,
    pub config: AppConfig,
}

/// Application builder for dependency injection
#[derive(Debug, Default)]
pub struct AppBuilder {
    config: AppConfig,
}

impl AppBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the application with custom settings
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure storage backend
    pub fn with_storage_backend(mut self, backend: StorageBackend) -> Self {
        self.config.storage_backend = backend;
        self
    }

    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.config.multipart = multipart;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.config.batch = batch;
        self
    }

    /// Build services over the configured backend
    pub fn build(self) -> Result<AppServices, AppError> {
        let (store, admin): (Arc<dyn ObjectStore>, Arc<dyn BucketAdmin>) =
            match &self.config.storage_backend {
                StorageBackend::InMemory => {
                    let store = Arc::new(InMemoryObjectStore::new());
                    (store.clone() as Arc<dyn ObjectStore>, store as Arc<dyn BucketAdmin>)
                }
                StorageBackend::Local { root } => {
                    let adapter = ApacheObjectStoreAdapter::local(root.clone()).map_err(|err| {
                        AppError::StorageInit {
                            message: format!("local root {}: {}", root.display(), err),
                        }
                    })?;
                    let adapter = Arc::new(adapter);
                    (adapter.clone() as Arc<dyn ObjectStore>, adapter as Arc<dyn BucketAdmin>)
                }
                StorageBackend::S3(s3) => {
                    let adapter =
                        S3ObjectStore::from_config(s3).map_err(|err| AppError::StorageInit {
                            message: err.to_string(),
                        })?;
                    let adapter = Arc::new(adapter);
                    (adapter.clone() as Arc<dyn ObjectStore>, adapter as Arc<dyn BucketAdmin>)
                }
            };
        Ok(self.build_with(store, admin))
    }

    /// Build services over already constructed store handles
    pub fn build_with(
        self,
        store: Arc<dyn ObjectStore>,
        admin: Arc<dyn BucketAdmin>,
    ) -> AppServices {
        let config = self.config;
        info!(backend = config.storage_backend.name(), "building services");

        AppServices {
            uploads: Arc::new(MultipartAssembler::new(
                store.clone(),
                config.multipart.clone(),
            )),
            reorganizer: Arc::new(BatchReorganizer::new(store.clone(), config.batch.clone())),
            versions: Arc::new(VersioningServiceImpl::new(
                store.clone(),
                config.batch.clone(),
            )),
            buckets: Arc::new(BucketServiceImpl::new(admin.clone())),
            objects: Arc::new(ObjectServiceImpl::new(store.clone())),
            store,
            admin,
            config,
        }
    }
}

impl StorageBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::InMemory => "memory",
            StorageBackend::Local { .. } => "local",
            StorageBackend::S3(_) => "s3",
        }
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage initialization error: {message}")]
    StorageInit { message: String },
}

/// Create an in-memory application for testing and development
pub fn create_in_memory_app() -> Result<AppServices, AppError> {
    AppBuilder::new()
        .with_storage_backend(StorageBackend::InMemory)
        .build()
}

/// Read the backend from the environment, after loading `.env` if present
pub fn storage_backend_from_env() -> Result<StorageBackend, AppError> {
    let _ = dotenvy::dotenv();

    match std::env::var("HOUSEKEEPER_BACKEND").as_deref() {
        Ok("s3") | Err(_) => {
            let access_key = required_env("AWS_ACCESS_KEY_ID")?;
            let secret_key = required_env("AWS_SECRET_ACCESS_KEY")?;
            Ok(StorageBackend::S3(S3Config {
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key,
                secret_key,
                session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
                max_attempts: match std::env::var("S3_MAX_ATTEMPTS") {
                    Ok(value) => value.parse().map_err(|_| AppError::Configuration {
                        message: format!("S3_MAX_ATTEMPTS must be a positive integer, got '{}'", value),
                    })?,
                    Err(_) => DEFAULT_MAX_ATTEMPTS,
                },
            }))
        }
        Ok("local") => Ok(StorageBackend::Local {
            root: PathBuf::from(required_env("HOUSEKEEPER_LOCAL_ROOT")?),
        }),
        Ok("memory") => Ok(StorageBackend::InMemory),
        Ok(other) => Err(AppError::Configuration {
            message: format!(
                "unknown HOUSEKEEPER_BACKEND '{}', expected s3, local or memory",
                other
            ),
        }),
    }
}

/// Create application from environment variables
pub fn create_app_from_env() -> Result<AppServices, AppError> {
    AppBuilder::new()
        .with_storage_backend(storage_backend_from_env()?)
        .build()
}

fn required_env(name: &str) -> Result<String, AppError> {
    std::env::var(name).map_err(|_| AppError::Configuration {
        message: format!("{} environment variable required", name),
    })
}
