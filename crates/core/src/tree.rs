//! File and folder entities, and the builders that turn flat object listings
//! into them.
//!
//! Object stores have no directories, only keys such as `photos/2020/a.jpg`.
//! [`PathTree`] rebuilds the implied hierarchy from a full recursive listing,
//! aggregating folder sizes eagerly as keys are inserted. [`Folder::level`]
//! assembles a single directory level from a delimiter-scoped listing.

use crate::KEY_DELIMITER;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// How a folder's `lastModified` is derived from its descendants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderTimestamps {
    /// Most recently modified descendant wins.
    #[default]
    Latest,
    /// Oldest descendant wins (legacy behaviour).
    Earliest,
}

impl FolderTimestamps {
    fn merge(self, current: OffsetDateTime, incoming: OffsetDateTime) -> OffsetDateTime {
        match self {
            Self::Latest => current.max(incoming),
            Self::Earliest => current.min(incoming),
        }
    }
}

/// A node in a browse result: either a file leaf or a folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileItem {
    // Folder first: untagged deserialization picks the first variant that fits,
    // and only folders carry `items`.
    Folder(Folder),
    File(File),
}

impl FileItem {
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(folder) => folder.name(),
            Self::File(file) => file.name(),
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Folder(folder) => folder.size(),
            Self::File(file) => file.size(),
        }
    }

    /// Children of a folder; empty for files.
    pub fn items(&self) -> &[FileItem] {
        match self {
            Self::Folder(folder) => folder.items(),
            Self::File(_) => &[],
        }
    }

    pub fn last_modified(&self) -> OffsetDateTime {
        match self {
            Self::Folder(folder) => folder.last_modified(),
            Self::File(file) => file.last_modified(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Folder(_))
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Self::Folder(folder) => Some(folder),
            Self::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Self::File(file) => Some(file),
            Self::Folder(_) => None,
        }
    }
}

impl From<File> for FileItem {
    fn from(file: File) -> Self {
        Self::File(file)
    }
}

impl From<Folder> for FileItem {
    fn from(folder: Folder) -> Self {
        Self::Folder(folder)
    }
}

/// A stored object, immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    name: String,
    size: u64,
    #[serde(with = "time::serde::rfc3339")]
    last_modified: OffsetDateTime,
    is_dir: bool,
}

impl File {
    pub fn new(name: impl Into<String>, size: u64, last_modified: OffsetDateTime) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified,
            is_dir: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified(&self) -> OffsetDateTime {
        self.last_modified
    }
}

/// A pseudo-directory.
///
/// `size` is the running total of every file below this folder and is kept
/// up to date on each insertion. A folder with no descendants keeps the
/// timestamp it was created with.
///
/// Names are unique per kind: a folder never holds two files or two folders
/// with the same name, but a file `notes` and a folder `notes/` may sit side
/// by side, since object keys allow both. Use [`Folder::file`] or
/// [`Folder::folder`] to pick one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    name: String,
    size: u64,
    items: Vec<FileItem>,
    #[serde(with = "time::serde::rfc3339")]
    last_modified: OffsetDateTime,
    is_dir: bool,
}

impl Folder {
    /// Create an empty folder.
    pub fn new(name: impl Into<String>, created_at: OffsetDateTime) -> Self {
        Self {
            name: name.into(),
            size: 0,
            items: Vec::new(),
            last_modified: created_at,
            is_dir: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Children in discovery order.
    pub fn items(&self) -> &[FileItem] {
        &self.items
    }

    pub fn last_modified(&self) -> OffsetDateTime {
        self.last_modified
    }

    /// Find a direct child folder by name.
    pub fn folder(&self, name: &str) -> Option<&Folder> {
        self.items
            .iter()
            .filter_map(FileItem::as_folder)
            .find(|folder| folder.name == name)
    }

    /// Find a direct child file by name.
    pub fn file(&self, name: &str) -> Option<&File> {
        self.items
            .iter()
            .filter_map(FileItem::as_file)
            .find(|file| file.name == name)
    }

    /// Assemble one directory level from a delimiter-scoped listing.
    ///
    /// `files` are objects directly under the level; only the final key
    /// segment is kept as the file name. `common_prefixes` are the child
    /// pseudo-directories (`photos/2020/`), each becoming an empty placeholder
    /// folder named after its last segment. Entries whose derived name is
    /// empty, such as the directory marker for the level itself, are skipped.
    ///
    /// The folder's size is the sum of the immediate files only; child
    /// folders are not descended into.
    pub fn level<K, P>(
        name: impl Into<String>,
        files: impl IntoIterator<Item = (K, u64, OffsetDateTime)>,
        common_prefixes: impl IntoIterator<Item = P>,
        timestamps: FolderTimestamps,
        created_at: OffsetDateTime,
    ) -> Self
    where
        K: AsRef<str>,
        P: AsRef<str>,
    {
        let mut level = Self::new(name, created_at);

        for (key, size, last_modified) in files {
            let file_name = final_segment(key.as_ref());
            if file_name.is_empty() {
                continue;
            }
            level.absorb(size, last_modified, timestamps);
            level.items.push(File::new(file_name, size, last_modified).into());
        }

        for prefix in common_prefixes {
            let prefix = prefix.as_ref();
            let folder_name = final_segment(prefix.strip_suffix(KEY_DELIMITER).unwrap_or(prefix));
            if folder_name.is_empty() {
                continue;
            }
            level.items.push(Self::new(folder_name, created_at).into());
        }

        level
    }

    /// Every file below this folder as `(path, size)`, with paths relative to
    /// this folder and segments joined by `/`.
    pub fn flatten(&self) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        self.flatten_into(None, &mut out);
        out
    }

    fn flatten_into(&self, parent: Option<&str>, out: &mut Vec<(String, u64)>) {
        for item in &self.items {
            let path = match parent {
                Some(parent) => format!("{parent}{KEY_DELIMITER}{}", item.name()),
                None => item.name().to_string(),
            };
            match item {
                FileItem::File(file) => out.push((path, file.size)),
                FileItem::Folder(folder) => folder.flatten_into(Some(&path), out),
            }
        }
    }

    /// Account for a descendant file of `size` bytes.
    ///
    /// Must run before the descendant is linked in: an empty folder adopts the
    /// incoming timestamp instead of merging with its creation time.
    fn absorb(&mut self, size: u64, last_modified: OffsetDateTime, timestamps: FolderTimestamps) {
        self.last_modified = if self.items.is_empty() {
            last_modified
        } else {
            timestamps.merge(self.last_modified, last_modified)
        };
        self.size += size;
    }

    /// Return the child folder called `name`, creating it at the end of
    /// `items` if absent. Lookup is a linear scan over the children.
    ///
    /// `None` only if the slot found for `name` does not hold a folder, which
    /// the lookup rules out.
    fn child_folder_mut(
        &mut self,
        name: &str,
        created_at: OffsetDateTime,
    ) -> Option<&mut Folder> {
        let position = self
            .items
            .iter()
            .position(|item| matches!(item, FileItem::Folder(folder) if folder.name == name));

        let item = match position {
            Some(index) => self.items.get_mut(index),
            None => {
                self.items.push(Self::new(name, created_at).into());
                self.items.last_mut()
            }
        };

        if let Some(FileItem::Folder(folder)) = item {
            Some(folder)
        } else {
            None
        }
    }
}

/// Incremental builder for a folder tree from flat object keys.
///
/// Every insertion adds the object's size to the root and to each folder on
/// the way down, so after any sequence of insertions each folder's size is the
/// sum of its children's sizes.
///
/// Child lookup is a linear scan per path segment. Fan-out in real buckets is
/// small, but a single directory holding tens of thousands of objects makes a
/// full build quadratic in that directory's size.
#[derive(Clone, Debug)]
pub struct PathTree {
    root: Folder,
    timestamps: FolderTimestamps,
    created_at: OffsetDateTime,
}

impl PathTree {
    /// Create a tree whose new folders are stamped with the current time.
    pub fn new(root_name: impl Into<String>, timestamps: FolderTimestamps) -> Self {
        Self::with_created_at(root_name, timestamps, OffsetDateTime::now_utc())
    }

    /// Create a tree with an explicit creation timestamp for new folders.
    pub fn with_created_at(
        root_name: impl Into<String>,
        timestamps: FolderTimestamps,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            root: Folder::new(root_name, created_at),
            timestamps,
            created_at,
        }
    }

    /// Insert an object by its `/`-delimited key.
    ///
    /// Returns `false` without touching the tree for keys with no file name:
    /// the empty key and directory markers ending in `/`.
    pub fn insert(&mut self, key: &str, size: u64, last_modified: OffsetDateTime) -> bool {
        let (folders, file_name) = match key.rsplit_once(KEY_DELIMITER) {
            Some((folders, file_name)) => (Some(folders), file_name),
            None => (None, key),
        };
        if file_name.is_empty() {
            return false;
        }

        let timestamps = self.timestamps;
        let created_at = self.created_at;

        self.root.absorb(size, last_modified, timestamps);
        let mut current = &mut self.root;
        if let Some(folders) = folders {
            for segment in folders.split(KEY_DELIMITER) {
                let Some(next) = current.child_folder_mut(segment, created_at) else {
                    return false;
                };
                current = next;
                current.absorb(size, last_modified, timestamps);
            }
        }

        current
            .items
            .push(File::new(file_name, size, last_modified).into());
        true
    }

    pub fn root(&self) -> &Folder {
        &self.root
    }

    pub fn into_root(self) -> Folder {
        self.root
    }
}

fn final_segment(key: &str) -> &str {
    key.rsplit(KEY_DELIMITER).next().unwrap_or(key)
}
