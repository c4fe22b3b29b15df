//! Configuration types shared across crates.

use crate::session::SessionClaims;
use crate::tree::FolderTimestamps;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest page size an S3 `ListObjectsV2` call honours.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upper bound for a folder-size computation before the request fails.
    #[serde(default = "default_folder_size_timeout_ms")]
    pub folder_size_timeout_ms: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Lifetime of presigned upload and download URLs.
    #[serde(default = "default_presign_expiry_secs")]
    pub presign_expiry_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_folder_size_timeout_ms() -> u64 {
    500
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_presign_expiry_secs() -> u64 {
    900 // 15 minutes
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            folder_size_timeout_ms: default_folder_size_timeout_ms(),
            metrics_enabled: default_metrics_enabled(),
            cors_origins: Vec::new(),
            presign_expiry_secs: default_presign_expiry_secs(),
        }
    }
}

impl ServerConfig {
    pub fn folder_size_timeout(&self) -> Duration {
        Duration::from_millis(self.folder_size_timeout_ms)
    }

    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.folder_size_timeout_ms == 0 {
            return Err("server.folder_size_timeout_ms must be greater than 0".to_string());
        }
        // SigV4 presigned URLs are capped at seven days.
        if self.presign_expiry_secs == 0 || self.presign_expiry_secs > 604_800 {
            return Err(format!(
                "server.presign_expiry_secs {} must be between 1 and 604800",
                self.presign_expiry_secs
            ));
        }
        for origin in &self.cors_origins {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return Err(format!(
                    "server.cors_origins entry '{origin}' must start with http:// or https://"
                ));
            }
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix. Keys are reported relative to it.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a non-empty bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem config requires a path".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Listing behaviour shared by the browse operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Objects requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// How folder timestamps are derived from their contents.
    #[serde(default)]
    pub folder_timestamps: FolderTimestamps,
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            folder_timestamps: FolderTimestamps::default(),
        }
    }
}

impl ListingConfig {
    /// Page size clamped to what the listing service accepts.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

/// A pre-issued session accepted by the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// SHA-256 hex of the session token (64 characters).
    /// Generate with: `echo -n "your-session-token" | sha256sum`
    pub token_hash: String,
    /// Identity the session resolves to.
    pub claims: SessionClaims,
}

/// Authentication configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (index, session) in self.sessions.iter().enumerate() {
            let hash = &session.token_hash;
            if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(format!(
                    "auth.sessions[{index}].token_hash must be 64 hex characters"
                ));
            }
        }
        Ok(())
    }

    /// Look up the claims for a token hash.
    pub fn find(&self, token_hash: &str) -> Option<&SessionClaims> {
        self.sessions
            .iter()
            .find(|session| session.token_hash.eq_ignore_ascii_case(token_hash))
            .map(|session| &session.claims)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Listing configuration.
    #[serde(default)]
    pub listing: ListingConfig,
    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage and no sessions.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            listing: ListingConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.auth.validate()?;
        Ok(())
    }
}
