use async_trait::async_trait;
use nimbus_storage::error::{StorageError, StorageResult};
use nimbus_storage::traits::{
    ContinuationToken, ListingPage, ListingRequest, ObjectEntry, ObjectStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

use super::fixtures::fixed_time;

/// Tokens issued by the mocks are plain page indexes.
fn page_index(token: Option<ContinuationToken>) -> StorageResult<usize> {
    match token {
        None => Ok(0),
        Some(token) => token.as_str()?.parse::<usize>().map_err(|e| {
            StorageError::InvalidContinuationToken(format!("mock token is not an index: {e}"))
        }),
    }
}

fn index_token(index: usize) -> StorageResult<ContinuationToken> {
    ContinuationToken::new(index.to_string().into_bytes())
}

/// One canned page of a [`ScriptedBackend`] listing.
#[derive(Clone, Debug, Default)]
#[allow(dead_code)]
pub struct ScriptedPage {
    pub objects: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
}

#[allow(dead_code)]
impl ScriptedPage {
    pub fn objects(objects: Vec<ObjectEntry>) -> Self {
        Self {
            objects,
            common_prefixes: Vec::new(),
        }
    }

    pub fn with_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.common_prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Backend that replays a fixed sequence of pages regardless of the request,
/// recording every request it receives.
#[allow(dead_code)]
pub struct ScriptedBackend {
    pages: Vec<ScriptedPage>,
    pub calls: AtomicUsize,
    requests: Mutex<Vec<ListingRequest>>,
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn new(pages: Vec<ScriptedPage>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ListingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for ScriptedBackend {
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let index = page_index(token)?;
        let Some(scripted) = self.pages.get(index) else {
            return Ok(ListingPage::default());
        };

        let next_token = if index + 1 < self.pages.len() {
            Some(index_token(index + 1)?)
        } else {
            None
        };

        Ok(ListingPage {
            objects: scripted.objects.clone(),
            common_prefixes: scripted.common_prefixes.clone(),
            next_token,
        })
    }

    async fn presign_download(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("https://scripted.test/{key}?op=get"))
    }

    async fn presign_upload(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        Ok(format!("https://scripted.test/{key}?op=put"))
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// Instrumented backend that synthesizes `total_keys` objects and counts the
/// number of pages fetched. An optional per-page delay makes it slow enough
/// to exercise timeouts.
#[allow(dead_code)]
pub struct InstrumentedBackend {
    pub total_keys: usize,
    pub object_size: u64,
    pub page_delay: Duration,
    pub pages_fetched: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl InstrumentedBackend {
    pub fn new(total_keys: usize) -> (Arc<Self>, Arc<AtomicUsize>) {
        Self::with_delay(total_keys, Duration::from_millis(1))
    }

    pub fn with_delay(total_keys: usize, page_delay: Duration) -> (Arc<Self>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(Self {
            total_keys,
            object_size: 1,
            page_delay,
            pages_fetched: counter.clone(),
        });
        (backend, counter)
    }
}

#[async_trait]
impl ObjectStore for InstrumentedBackend {
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        // Count before the delay so a cancelled call is still visible.
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.page_delay).await;

        let page_size = request.page_size.max(1) as usize;
        let start = page_index(token)?;
        let end = (start + page_size).min(self.total_keys);

        let objects = (start..end)
            .map(|i| {
                ObjectEntry::new(
                    format!("{}key-{:06}", request.prefix, i),
                    self.object_size,
                    fixed_time(),
                )
            })
            .collect();

        let next_token = if end < self.total_keys {
            Some(index_token(end)?)
        } else {
            None
        };

        Ok(ListingPage {
            objects,
            common_prefixes: Vec::new(),
            next_token,
        })
    }

    async fn presign_download(&self, _key: &str, _expires_in: Duration) -> StorageResult<String> {
        Err(StorageError::Unsupported {
            backend: "instrumented",
            operation: "presign_download",
        })
    }

    async fn presign_upload(&self, _key: &str, _expires_in: Duration) -> StorageResult<String> {
        Err(StorageError::Unsupported {
            backend: "instrumented",
            operation: "presign_upload",
        })
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }
}

/// Backend whose listing succeeds for `fail_at` pages and then errors.
#[allow(dead_code)]
pub struct FailingBackend {
    pub fail_at: usize,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FailingBackend {
    pub fn new(fail_at: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_at,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FailingBackend {
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = page_index(token)?;
        if index >= self.fail_at {
            return Err(StorageError::S3(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "listing service unavailable",
            ))));
        }

        Ok(ListingPage {
            objects: vec![ObjectEntry::new(
                format!("{}part-{index}", request.prefix),
                10,
                fixed_time(),
            )],
            common_prefixes: Vec::new(),
            next_token: Some(index_token(index + 1)?),
        })
    }

    async fn presign_download(&self, _key: &str, _expires_in: Duration) -> StorageResult<String> {
        Err(StorageError::NotFound("failing backend".to_string()))
    }

    async fn presign_upload(&self, _key: &str, _expires_in: Duration) -> StorageResult<String> {
        Err(StorageError::NotFound("failing backend".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
