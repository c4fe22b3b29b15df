//! Object listing backends and browse operations for Nimbus.
//!
//! This crate provides:
//! - The [`ObjectStore`] listing boundary with lazy page streams
//! - Browse operations: full tree, single folder level, folder size
//! - Backends: S3-compatible and local filesystem

pub mod backends;
pub mod browse;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use browse::{aggregate_size, build_tree, list_level, normalize_prefix};
pub use error::{StorageError, StorageResult};
pub use traits::{
    ContinuationToken, ListingPage, ListingRequest, ObjectEntry, ObjectStore,
    ObjectStorePagesExt, PageStream,
};

use nimbus_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
