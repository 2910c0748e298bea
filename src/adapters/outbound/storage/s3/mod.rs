//! S3 storage adapter built on the AWS SDK
//!
//! Request signing, retries with backoff and response parsing all happen
//! inside `aws-sdk-s3`. The adapter implements both the ObjectStore and
//! BucketAdmin ports.

pub mod s3_adapter;

pub use s3_adapter::S3ObjectStore;

use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::{Credentials, Region};

use crate::domain::errors::{StorageError, StorageResult};

/// Attempts per request, the first one included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for S3 storage backend
#[derive(Clone)]
pub struct S3Config {
    /// Custom endpoint for S3-compatible services; requests then use
    /// path-style addressing
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub max_attempts: u32,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl S3Config {
    pub fn new(
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: None,
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_session_token(mut self, session_token: Option<String>) -> Self {
        self.session_token = session_token;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn validate(&self) -> StorageResult<()> {
        if let Some(endpoint) = &self.endpoint {
            let uri: http::Uri = endpoint.parse().map_err(|err| {
                StorageError::invalid_input(format!("invalid S3 endpoint '{}': {}", endpoint, err))
            })?;
            if uri.scheme().is_none() || uri.host().is_none() {
                return Err(StorageError::invalid_input(format!(
                    "S3 endpoint '{}' must be an absolute http(s) URL",
                    endpoint
                )));
            }
        }
        if self.max_attempts == 0 {
            return Err(StorageError::invalid_input("max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Build an SDK client with static credentials and standard retries
    pub fn build_client(&self) -> StorageResult<aws_sdk_s3::Client> {
        self.validate()?;

        let credentials = Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            self.session_token.clone(),
            None,
            "s3-housekeeper",
        );
        let timeout_config = TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(5))
            .build();

        let sdk_config = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(self.max_attempts))
            .timeout_config(timeout_config)
            .build();

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .credentials_provider(credentials)
            .force_path_style(self.endpoint.is_some());
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(aws_sdk_s3::Client::from_conf(builder.build()))
    }
}
