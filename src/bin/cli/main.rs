mod commands;
mod report;

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use s3_housekeeper::{AppBuilder, AppConfig, S3Config, StorageBackend};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::{Command, Outcome};

#[derive(Parser, Debug)]
#[command(name = "s3-housekeeper")]
#[command(about = "Housekeeping for S3 buckets: multipart uploads, reorganizing and version pruning", long_about = None)]
struct Cli {
    /// Storage backend
    #[arg(long, env = "HOUSEKEEPER_BACKEND", value_enum, default_value = "s3", global = true)]
    backend: Backend,

    /// Root directory of the local backend
    #[arg(long, env = "HOUSEKEEPER_LOCAL_ROOT", global = true)]
    local_root: Option<PathBuf>,

    /// S3 endpoint URL, for S3-compatible services
    #[arg(long, env = "S3_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// S3 region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1", global = true)]
    region: String,

    /// S3 access key
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true, global = true)]
    access_key: Option<String>,

    /// S3 secret key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    secret_key: Option<String>,

    /// S3 session token
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true, global = true)]
    session_token: Option<String>,

    /// Attempts per S3 request, retries included
    #[arg(long, env = "S3_MAX_ATTEMPTS", default_value_t = 3, global = true)]
    max_attempts: u32,

    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    S3,
    Local,
    Memory,
}

impl Cli {
    fn to_app_config(&self) -> Result<AppConfig> {
        let storage_backend = match self.backend {
            Backend::Memory => StorageBackend::InMemory,
            Backend::Local => StorageBackend::Local {
                root: self
                    .local_root
                    .clone()
                    .context("HOUSEKEEPER_LOCAL_ROOT is required for the local backend")?,
            },
            Backend::S3 => StorageBackend::S3(S3Config {
                endpoint: self.endpoint.clone(),
                region: self.region.clone(),
                access_key: self
                    .access_key
                    .clone()
                    .context("AWS_ACCESS_KEY_ID is required for the S3 backend")?,
                secret_key: self
                    .secret_key
                    .clone()
                    .context("AWS_SECRET_ACCESS_KEY is required for the S3 backend")?,
                session_token: self.session_token.clone(),
                max_attempts: self.max_attempts,
            }),
        };

        let mut config = AppConfig {
            storage_backend,
            ..AppConfig::default()
        };
        self.command.tune(&mut config);
        Ok(config)
    }

    fn init_logging(&self) {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.log_level.to_lowercase()));

        // stdout carries command output
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    cli.init_logging();

    let config = cli.to_app_config()?;
    debug!(backend = config.storage_backend.name(), "configuration loaded");

    let app = AppBuilder::new()
        .with_config(config)
        .build()
        .context("Failed to build application")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight work");
            on_interrupt.cancel();
        }
    });

    match cli.command.run(&app, cancel).await? {
        Outcome::Success => Ok(ExitCode::SUCCESS),
        Outcome::PartialFailure => Ok(ExitCode::from(2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "s3-housekeeper",
            "--backend",
            "local",
            "--local-root",
            "/tmp/store",
            "reorganize",
            "photos",
            "--by",
            "content-type",
            "--concurrency",
            "4",
        ]);

        assert_eq!(cli.backend, Backend::Local);
        let config = cli.to_app_config().unwrap();
        assert_eq!(config.batch.concurrency, 4);
        assert!(matches!(config.storage_backend, StorageBackend::Local { .. }));
    }

    #[test]
    fn test_s3_backend_requires_credentials() {
        let cli = Cli::parse_from([
            "s3-housekeeper",
            "--backend",
            "s3",
            "bucket",
            "list",
        ]);
        // Credentials may come from the environment of the test run
        if cli.access_key.is_none() {
            assert!(cli.to_app_config().is_err());
        }
    }

    #[test]
    fn test_upload_flags() {
        let cli = Cli::parse_from([
            "s3-housekeeper",
            "--backend",
            "memory",
            "upload",
            "media",
            "clips/big.mp4",
            "big.mp4",
            "--part-size-mib",
            "16",
            "--concurrency",
            "3",
        ]);

        let config = cli.to_app_config().unwrap();
        assert_eq!(config.multipart.default_part_size, 16 * 1024 * 1024);
        assert_eq!(config.multipart.concurrency, 3);
    }
}
