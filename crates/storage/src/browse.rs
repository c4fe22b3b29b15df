//! Browse operations over an [`ObjectStore`]: the full tree, one folder level
//! and the recursive size of a folder.
//!
//! Every operation follows continuation tokens until the listing is no longer
//! truncated. A failure on any page fails the whole operation; there are no
//! retries and no partial results.

use crate::error::StorageResult;
use crate::traits::{ListingRequest, ObjectStore, ObjectStorePagesExt};
use futures::TryStreamExt;
use nimbus_core::{Folder, FolderTimestamps, KEY_DELIMITER, PathTree};
use time::OffsetDateTime;
use tracing::{debug, instrument};

/// Name given to the bucket root.
pub const ROOT_NAME: &str = "/";

/// Normalize a folder prefix so it ends with exactly one delimiter.
///
/// The empty prefix stays empty and addresses the bucket root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches(KEY_DELIMITER);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}{KEY_DELIMITER}")
    }
}

/// Build the complete folder tree of the store.
#[instrument(skip(store), fields(backend = store.backend_name()))]
pub async fn build_tree<S>(
    store: &S,
    page_size: u32,
    timestamps: FolderTimestamps,
) -> StorageResult<Folder>
where
    S: ObjectStore + ?Sized,
{
    let mut tree = PathTree::new(ROOT_NAME, timestamps);
    let mut pages = store.list_pages(ListingRequest::recursive("").with_page_size(page_size));
    let mut objects = 0usize;

    while let Some(page) = pages.try_next().await? {
        for object in &page.objects {
            if tree.insert(&object.key, object.size, object.last_modified) {
                objects += 1;
            }
        }
    }

    debug!(objects, "built folder tree");
    Ok(tree.into_root())
}

/// List the direct children of the folder at `prefix`.
///
/// The returned folder is named after the normalized prefix (`/` for the
/// root). Its size covers the immediate files only; child folders are empty
/// placeholders. `timestamps` picks the level's `lastModified` from its files,
/// the same policy [`build_tree`] applies.
#[instrument(skip(store), fields(backend = store.backend_name()))]
pub async fn list_level<S>(
    store: &S,
    prefix: &str,
    page_size: u32,
    timestamps: FolderTimestamps,
) -> StorageResult<Folder>
where
    S: ObjectStore + ?Sized,
{
    let prefix = normalize_prefix(prefix);
    let request = ListingRequest::one_level(prefix.clone()).with_page_size(page_size);
    let mut pages = store.list_pages(request);

    let mut files = Vec::new();
    let mut common_prefixes = Vec::new();
    while let Some(page) = pages.try_next().await? {
        files.extend(
            page.objects
                .into_iter()
                .map(|object| (object.key, object.size, object.last_modified)),
        );
        common_prefixes.extend(page.common_prefixes);
    }

    let name = if prefix.is_empty() {
        ROOT_NAME.to_string()
    } else {
        prefix
    };

    debug!(
        files = files.len(),
        folders = common_prefixes.len(),
        "listed folder level"
    );
    Ok(Folder::level(
        name,
        files,
        common_prefixes,
        timestamps,
        OffsetDateTime::now_utc(),
    ))
}

/// Total size in bytes of every object under `prefix`.
#[instrument(skip(store), fields(backend = store.backend_name()))]
pub async fn aggregate_size<S>(store: &S, prefix: &str, page_size: u32) -> StorageResult<u64>
where
    S: ObjectStore + ?Sized,
{
    let request = ListingRequest::recursive(normalize_prefix(prefix)).with_page_size(page_size);
    let mut pages = store.list_pages(request);

    let mut total = 0u64;
    while let Some(page) = pages.try_next().await? {
        total = page
            .objects
            .iter()
            .fold(total, |acc, object| acc.saturating_add(object.size));
    }

    Ok(total)
}
