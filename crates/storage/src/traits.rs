//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use futures::Stream;
use nimbus_core::KEY_DELIMITER;
use std::pin::Pin;
use std::time::Duration;
use time::OffsetDateTime;

/// A boxed stream of listing pages.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>>;

/// Page size requested when the caller has no preference.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Maximum size for continuation tokens (2 KB).
pub const MAX_TOKEN_SIZE: usize = 2048;

/// A single object returned by a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full key relative to the store root.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    pub last_modified: OffsetDateTime,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, size: u64, last_modified: OffsetDateTime) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
        }
    }
}

/// Parameters for one listing request.
///
/// With a delimiter, keys containing it after the prefix are rolled up into
/// `common_prefixes` instead of being returned as objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingRequest {
    pub prefix: String,
    pub delimiter: Option<char>,
    pub page_size: u32,
}

impl ListingRequest {
    /// Every key under `prefix`, no roll-up.
    pub fn recursive(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Direct children of `prefix`, deeper keys rolled up at the next `/`.
    pub fn one_level(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: Some(KEY_DELIMITER),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// An opaque continuation token for resuming a listing.
///
/// This token is backend-specific and should not be parsed or modified.
/// Maximum size is 2 KB.
#[derive(Clone, PartialEq, Eq)]
pub struct ContinuationToken(Vec<u8>);

impl ContinuationToken {
    /// Create a new continuation token from raw bytes.
    ///
    /// Returns an error if the token exceeds MAX_TOKEN_SIZE.
    pub fn new(data: Vec<u8>) -> StorageResult<Self> {
        if data.len() > MAX_TOKEN_SIZE {
            return Err(StorageError::InvalidContinuationToken(format!(
                "continuation token too large: {} bytes (max: {})",
                data.len(),
                MAX_TOKEN_SIZE
            )));
        }
        Ok(Self(data))
    }

    /// Get the raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Interpret the token as UTF-8, which is what every backend issues.
    pub fn as_str(&self) -> StorageResult<&str> {
        std::str::from_utf8(&self.0).map_err(|e| {
            StorageError::InvalidContinuationToken(format!(
                "continuation token is not valid UTF-8: {e}"
            ))
        })
    }
}

impl std::fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContinuationToken")
            .field(&"<redacted>")
            .finish()
    }
}

/// A single page of listing results.
#[derive(Clone, Debug, Default)]
pub struct ListingPage {
    /// Objects in this page.
    pub objects: Vec<ObjectEntry>,

    /// Rolled-up prefixes, each ending with the delimiter. Only populated
    /// when the request carried a delimiter.
    pub common_prefixes: Vec<String>,

    /// Continuation token for the next page, if there are more results.
    /// If None, this is the last page.
    pub next_token: Option<ContinuationToken>,
}

impl ListingPage {
    pub fn is_truncated(&self) -> bool {
        self.next_token.is_some()
    }
}

/// Object store abstraction over a bucket or a local directory.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch one page of a listing.
    ///
    /// `token` is the `next_token` of the previous page of the same request,
    /// or `None` for the first page.
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage>;

    /// Time-limited URL to fetch `key` directly from the backend.
    async fn presign_download(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Time-limited URL to upload `key` directly to the backend.
    async fn presign_upload(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Read-only reachability probe, cheap enough for liveness checks.
    ///
    /// The default implementation fetches a single-key page of the bucket
    /// root.
    async fn ping(&self) -> StorageResult<()> {
        self.list_page(&ListingRequest::recursive("").with_page_size(1), None)
            .await
            .map(|_| ())
    }

    /// Verify storage backend connectivity, including write access.
    ///
    /// Called during server startup so the process fails fast when the
    /// backend is unreachable or misconfigured. The default implementation
    /// returns Ok(()).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Extension trait that follows continuation tokens across pages.
///
/// Automatically implemented for every [`ObjectStore`]; do not implement it
/// manually.
pub trait ObjectStorePagesExt: ObjectStore {
    /// Stream every page of `request`, in order, until the listing is no
    /// longer truncated.
    ///
    /// Pages are fetched lazily. Dropping the stream stops further requests,
    /// which is how callers cancel a long listing.
    fn list_pages<'a>(&'a self, request: ListingRequest) -> PageStream<'a> {
        let stream = async_stream::try_stream! {
            let mut token: Option<ContinuationToken> = None;

            loop {
                let page = self.list_page(&request, token.take()).await?;
                let next = page.next_token.clone();
                yield page;

                match next {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
        };

        Box::pin(stream)
    }
}

// Blanket implementation for all ObjectStore types
impl<T: ObjectStore + ?Sized> ObjectStorePagesExt for T {}
