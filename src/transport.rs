//! Abstract RPC boundary to the master.
//!
//! The client never speaks a wire protocol itself. A [`MasterTransport`]
//! opens channels to whichever master is currently primary, and a
//! [`MasterChannel`] performs the metadata RPCs over one open channel. Both
//! report failures as [`RpcError`], already tagged with enough structure to be
//! classified as Transient or Terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// Opens channels to the master.
pub trait MasterTransport: Send + Sync {
    /// Make a single attempt at opening a channel.
    ///
    /// A failover may route this to a different endpoint than the previous
    /// channel used. Implementations must not retry internally.
    fn connect(&self) -> Result<Box<dyn MasterChannel>, RpcError>;
}

/// One open channel to the master.
pub trait MasterChannel: Send {
    /// Create a file at `path`.
    fn create_file(
        &mut self,
        path: &ResourcePath,
        options: &CreateFileOptions,
    ) -> Result<(), RpcError>;

    /// Fetch metadata for `path`.
    fn get_status(
        &mut self,
        path: &ResourcePath,
        options: &GetStatusOptions,
    ) -> Result<FileInfo, RpcError>;

    /// List the entries under `path`.
    fn list_status(
        &mut self,
        path: &ResourcePath,
        options: &ListStatusOptions,
    ) -> Result<Vec<FileInfo>, RpcError>;

    /// Release the channel. Never fails.
    fn disconnect(&mut self);
}

/// Identifier of a resource on the master.
///
/// The client passes it through unmodified; interpretation is up to the master.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Wrap `path` as given.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The path exactly as supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the path starts at the namespace root.
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    /// Whether this is the namespace root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last component, or `""` for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// Parent path, or `None` for the root and for paths with no `/`.
    #[must_use]
    pub fn parent(&self) -> Option<ResourcePath> {
        let trimmed = self.0.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rfind('/') {
            Some(0) => Some(ResourcePath::new("/")),
            Some(idx) => Some(ResourcePath::new(&trimmed[..idx])),
            None => None,
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourcePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ResourcePath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Metadata the master keeps for a file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Full path of the entry.
    pub path: ResourcePath,
    /// Last path component.
    pub name: String,
    /// Whether the entry is a folder.
    pub is_folder: bool,
    /// Length in bytes; zero for folders and freshly created files.
    pub length: u64,
    /// Block size the file was created with; zero for folders.
    pub block_size_bytes: u64,
    /// POSIX permission bits
    pub mode: u16,
    /// Creation time on the master.
    pub created_at: DateTime<Utc>,
}

/// Options for [`MasterChannel::create_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFileOptions {
    /// Create missing parent folders.
    pub recursive: bool,
    /// Block size for the new file.
    pub block_size_bytes: u64,
    /// POSIX permission bits for the new file.
    pub mode: u16,
}

impl Default for CreateFileOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            block_size_bytes: 64 * 1024 * 1024,
            mode: 0o644,
        }
    }
}

impl CreateFileOptions {
    /// Set whether missing parents are created.
    #[must_use]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

/// When the master should consult the under storage for metadata it lacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMetadataType {
    /// Never consult the under storage.
    Never,
    /// Load once, on the first miss.
    #[default]
    Once,
    /// Load on every request.
    Always,
}

/// Options for [`MasterChannel::get_status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStatusOptions {
    /// Metadata loading behavior on a miss.
    pub load_metadata: LoadMetadataType,
}

/// Options for [`MasterChannel::list_status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListStatusOptions {
    /// Include all descendants, not just direct children.
    pub recursive: bool,
}
