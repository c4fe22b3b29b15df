//! Local filesystem storage backend.
//!
//! Serves a directory tree as if it were a bucket: every regular file is an
//! object whose key is its path relative to the root, joined with `/`.
//! Listings are sorted by key and paginated with a start-after token, which
//! mirrors how `ListObjectsV2` behaves closely enough for development and
//! tests.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ContinuationToken, ListingPage, ListingRequest, ObjectEntry, ObjectStore};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs;
use tracing::instrument;

/// Local filesystem object store.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

/// One listing entry before pagination: an object or a rolled-up prefix.
enum Entry {
    Object(ObjectEntry),
    Prefix(String),
}

impl Entry {
    fn sort_key(&self) -> &str {
        match self {
            Entry::Object(object) => &object.key,
            Entry::Prefix(prefix) => prefix,
        }
    }
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Runs on the blocking pool since it canonicalizes paths.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Returns an error if the key would escape the storage root, either
    /// lexically or through a symlink.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Check the nearest existing ancestor (or the path itself) so a
        // symlinked directory cannot lead outside the root.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let canonical = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    candidate = current.parent();
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(path)
    }

    /// Every object under the directory that contains `prefix`, keyed
    /// relative to the root. Symlinks are never followed.
    async fn walk(&self, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let dir_key = match prefix.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
        let base_path = if dir_key.is_empty() {
            self.root.clone()
        } else {
            self.key_path(dir_key).await?
        };

        let mut objects = Vec::new();
        match fs::try_exists(&base_path).await {
            Ok(true) => {}
            Ok(false) => return Ok(objects),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(objects),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![base_path];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && let Some(key) = self.relative_key(&path)
                    && key.starts_with(prefix)
                {
                    let metadata = entry.metadata().await?;
                    let last_modified = metadata
                        .modified()
                        .map(OffsetDateTime::from)
                        .unwrap_or_else(|_| OffsetDateTime::now_utc());
                    objects.push(ObjectEntry::new(key, metadata.len(), last_modified));
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<_> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect();
        Some(segments.join("/"))
    }
}

/// Merge objects into the sorted entry sequence a delimiter listing returns.
fn partition(objects: Vec<ObjectEntry>, prefix: &str, delimiter: Option<char>) -> Vec<Entry> {
    let Some(delimiter) = delimiter else {
        return objects.into_iter().map(Entry::Object).collect();
    };

    let mut prefixes = BTreeSet::new();
    let mut entries = Vec::new();
    for object in objects {
        let rest = &object.key[prefix.len()..];
        match rest.find(delimiter) {
            Some(index) => {
                let end = prefix.len() + index + delimiter.len_utf8();
                prefixes.insert(object.key[..end].to_string());
            }
            None => entries.push(Entry::Object(object)),
        }
    }

    entries.extend(prefixes.into_iter().map(Entry::Prefix));
    entries.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
    entries
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self, token), fields(backend = "filesystem"))]
    async fn list_page(
        &self,
        request: &ListingRequest,
        token: Option<ContinuationToken>,
    ) -> StorageResult<ListingPage> {
        let start_after = match &token {
            Some(token) => Some(token.as_str()?.to_string()),
            None => None,
        };
        if let Some(start_after) = &start_after
            && !start_after.starts_with(&request.prefix)
        {
            return Err(StorageError::InvalidContinuationToken(
                "token does not belong to this listing".to_string(),
            ));
        }

        let objects = self.walk(&request.prefix).await?;
        let entries = partition(objects, &request.prefix, request.delimiter);

        let remaining = entries.into_iter().filter(|entry| match &start_after {
            None => true,
            Some(after) => {
                let key = entry.sort_key();
                // A rolled-up prefix covers every key below it.
                let covered = request.delimiter.is_some_and(|d| after.ends_with(d))
                    && key.starts_with(after.as_str());
                key > after.as_str() && !covered
            }
        });

        let page_size = request.page_size.max(1) as usize;
        let mut page = ListingPage::default();
        let mut last_key = None;
        let mut truncated = false;
        for (index, entry) in remaining.enumerate() {
            if index == page_size {
                truncated = true;
                break;
            }
            last_key = Some(entry.sort_key().to_string());
            match entry {
                Entry::Object(object) => page.objects.push(object),
                Entry::Prefix(prefix) => page.common_prefixes.push(prefix),
            }
        }

        if truncated && let Some(last_key) = last_key {
            page.next_token = Some(ContinuationToken::new(last_key.into_bytes())?);
        }

        Ok(page)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn presign_download(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        self.key_path(key).await?;
        Err(StorageError::Unsupported {
            backend: "filesystem",
            operation: "presign_download",
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn presign_upload(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        self.key_path(key).await?;
        Err(StorageError::Unsupported {
            backend: "filesystem",
            operation: "presign_upload",
        })
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn ping(&self) -> StorageResult<()> {
        self.health_check().await
    }

    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {}", e),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(root: &Path, files: &[(&str, usize)]) {
        for (key, size) in files {
            let path = root.join(key);
            fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            fs::write(&path, vec![b'x'; *size]).await.unwrap();
        }
    }

    fn keys(page: &ListingPage) -> Vec<&str> {
        page.objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_recursive_listing_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[("b.txt", 1), ("a/z.txt", 2), ("a/b/c.txt", 3)]).await;
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let page = backend
            .list_page(&ListingRequest::recursive(""), None)
            .await
            .unwrap();
        assert_eq!(keys(&page), vec!["a/b/c.txt", "a/z.txt", "b.txt"]);
        assert_eq!(page.objects[2].size, 1);
        assert!(!page.is_truncated());
    }

    #[tokio::test]
    async fn test_delimiter_rolls_up_children() {
        let dir = tempfile::tempdir().unwrap();
        seed(
            dir.path(),
            &[("photos/a.jpg", 5), ("photos/2020/b.jpg", 7), ("photos/2021/c.jpg", 1)],
        )
        .await;
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let page = backend
            .list_page(&ListingRequest::one_level("photos/"), None)
            .await
            .unwrap();
        assert_eq!(keys(&page), vec!["photos/a.jpg"]);
        assert_eq!(page.common_prefixes, vec!["photos/2020/", "photos/2021/"]);
    }

    #[tokio::test]
    async fn test_pagination_with_start_after() {
        let dir = tempfile::tempdir().unwrap();
        seed(
            dir.path(),
            &[("r/1", 1), ("r/2", 1), ("r/d/x", 1), ("r/d/y", 1), ("r/e", 1)],
        )
        .await;
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        let request = ListingRequest::one_level("r/").with_page_size(2);

        let first = backend.list_page(&request, None).await.unwrap();
        assert_eq!(keys(&first), vec!["r/1", "r/2"]);
        assert!(first.is_truncated());

        let second = backend
            .list_page(&request, first.next_token.clone())
            .await
            .unwrap();
        assert_eq!(second.common_prefixes, vec!["r/d/"]);
        assert_eq!(keys(&second), vec!["r/e"]);
        assert!(!second.is_truncated());
    }

    #[tokio::test]
    async fn test_missing_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let page = backend
            .list_page(&ListingRequest::one_level("nothing/here/"), None)
            .await
            .unwrap();
        assert!(page.objects.is_empty());
        assert!(page.common_prefixes.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_token_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        let token = ContinuationToken::new(b"other/key".to_vec()).unwrap();

        let result = backend
            .list_page(&ListingRequest::recursive("photos/"), Some(token))
            .await;
        assert!(matches!(
            result,
            Err(StorageError::InvalidContinuationToken(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        for prefix in ["../escape/", "foo/../../etc/"] {
            let result = backend
                .list_page(&ListingRequest::recursive(prefix), None)
                .await;
            assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        }

        let result = backend
            .presign_download("/absolute/path", Duration::from_secs(60))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_presign_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let result = backend
            .presign_upload("notes/today.txt", Duration::from_secs(60))
            .await;
        assert!(matches!(result, Err(StorageError::Unsupported { .. })));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();
        std::fs::write(outside_dir.path().join("secret.txt"), "secret data").unwrap();

        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        symlink(outside_dir.path(), dir.path().join("link_to_outside")).unwrap();

        let result = backend
            .list_page(&ListingRequest::recursive("link_to_outside/"), None)
            .await;
        match result {
            Err(StorageError::InvalidKey(msg)) => assert!(
                msg.contains("escapes storage root"),
                "error should mention escaping root: {msg}"
            ),
            other => panic!("expected InvalidKey error, got: {other:?}"),
        }

        // Root listings skip the symlink instead of following it.
        let page = backend
            .list_page(&ListingRequest::recursive(""), None)
            .await
            .unwrap();
        assert!(page.objects.is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("store")).await.unwrap();
        backend.health_check().await.unwrap();
        backend.ping().await.unwrap();

        std::fs::remove_dir_all(dir.path().join("store")).unwrap();
        assert!(backend.ping().await.is_err());
    }
}
