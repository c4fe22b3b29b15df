//! Test fixtures: sessions, files on disk and a slow object store.

use async_trait::async_trait;
use nimbus_core::SessionClaims;
use nimbus_core::config::SessionConfig;
use nimbus_storage::{
    ContinuationToken, ListingPage, ListingRequest, ObjectEntry, ObjectStore, StorageError,
    StorageResult,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::macros::datetime;

/// Session token accepted by every [`super::TestServer`].
#[allow(dead_code)]
pub const TEST_TOKEN: &str = "test-session-token";

/// Compute SHA-256 hash of data as hex string.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Claims of the test user.
#[allow(dead_code)]
pub fn test_claims() -> SessionClaims {
    SessionClaims::decode(&json!({
        "sub": "user-123",
        "email": "ada@example.com",
        "email_verified": true,
        "given_name": "Ada",
        "family_name": "Lovelace"
    }))
    .expect("test claims are valid")
}

/// Session entry for a raw token.
#[allow(dead_code)]
pub fn session_for(token: &str, claims: SessionClaims) -> SessionConfig {
    SessionConfig {
        token_hash: sha256_hash(token.as_bytes()),
        claims,
    }
}

/// Write a file below the storage root, creating parent directories.
#[allow(dead_code)]
pub fn write_object(root: &Path, key: &str, contents: &[u8]) {
    let path = root.join(key);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(path, contents).expect("Failed to write object");
}

/// Backend that never runs out of pages and sleeps before each one.
///
/// Presigning succeeds with deterministic fake URLs.
#[allow(dead_code)]
pub struct SlowStore {
    page_delay: Duration,
    pages_fetched: Arc<AtomicUsize>,
    health_checks: AtomicUsize,
}

#[allow(dead_code)]
impl SlowStore {
    pub fn new(page_delay: Duration) -> (Arc<Self>, Arc<AtomicUsize>) {
        let pages_fetched = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(Self {
            page_delay,
            pages_fetched: pages_fetched.clone(),
            health_checks: AtomicUsize::new(0),
        });
        (store, pages_fetched)
    }

    /// Number of write-path health checks run against this store.
    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for SlowStore {
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        let index = match &token {
            Some(token) => token.as_str()?.parse::<usize>().unwrap_or(0),
            None => 0,
        };
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.page_delay).await;

        let key = format!("{}slow-{index:06}", request.prefix);
        Ok(ListingPage {
            objects: vec![ObjectEntry::new(key, 1, datetime!(2024-03-01 12:00 UTC))],
            common_prefixes: Vec::new(),
            next_token: Some(ContinuationToken::new((index + 1).to_string().into_bytes())?),
        })
    }

    async fn presign_download(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        Ok(format!(
            "https://presigned.test/{key}?op=get&expires={}",
            expires_in.as_secs()
        ))
    }

    async fn presign_upload(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        Ok(format!(
            "https://presigned.test/{key}?op=put&expires={}",
            expires_in.as_secs()
        ))
    }

    fn backend_name(&self) -> &'static str {
        "slow"
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend whose listings fail on the page at index `fail_at`.
///
/// Earlier pages hold one 10-byte object each and point at the next page.
#[allow(dead_code)]
pub struct FailingStore {
    fail_at: usize,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(fail_at: usize) -> Arc<Self> {
        Arc::new(Self { fail_at })
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        let index = match &token {
            Some(token) => token.as_str()?.parse::<usize>().unwrap_or(0),
            None => 0,
        };
        if index >= self.fail_at {
            return Err(StorageError::S3(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))));
        }

        let key = format!("{}part-{index:03}.bin", request.prefix);
        Ok(ListingPage {
            objects: vec![ObjectEntry::new(key, 10, datetime!(2024-03-01 12:00 UTC))],
            common_prefixes: Vec::new(),
            next_token: Some(ContinuationToken::new((index + 1).to_string().into_bytes())?),
        })
    }

    async fn presign_download(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("https://presigned.test/{key}"))
    }

    async fn presign_upload(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("https://presigned.test/{key}"))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
