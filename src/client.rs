//! Public client for the filesystem master.

use std::fmt;

use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::Result;
use crate::invoker::RpcInvoker;
use crate::retry::RetryPolicy;
use crate::transport::{
    CreateFileOptions, FileInfo, GetStatusOptions, ListStatusOptions, MasterTransport,
    ResourcePath,
};

/// Client for the filesystem metadata master.
///
/// Metadata operations reconnect and retry transparently while the master is
/// unreachable (restart, failover) and return the master's own rejections,
/// such as a missing path, immediately.
///
/// All methods take `&self`; a client can be shared between threads, and
/// attempts from different threads are serialized on one connection.
///
/// # Example
///
/// ```
/// use fsmaster_client::local::LocalMaster;
/// use fsmaster_client::{ClientConfig, CreateFileOptions, FileSystemMasterClient, GetStatusOptions};
///
/// let master = LocalMaster::new();
/// let client = FileSystemMasterClient::new(master.transport(), ClientConfig::default());
///
/// client.create_file("/file", &CreateFileOptions::default())?;
/// let info = client.get_status("/file", &GetStatusOptions::default())?;
/// assert_eq!(info.name, "file");
///
/// let missing = client.get_status("/doesNotExist", &GetStatusOptions::default());
/// assert!(missing.unwrap_err().is_not_found());
/// client.close();
/// # Ok::<(), fsmaster_client::ClientError>(())
/// ```
pub struct FileSystemMasterClient<T: MasterTransport> {
    config: ClientConfig,
    connection: Mutex<ConnectionManager<T>>,
    invoker: RpcInvoker,
}

impl<T: MasterTransport> FileSystemMasterClient<T> {
    /// Create a disconnected client. No I/O happens until the first call.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let invoker = RpcInvoker::new(RetryPolicy::from_config(&config));
        Self {
            config,
            connection: Mutex::new(ConnectionManager::new(transport)),
            invoker,
        }
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a channel to the master if none is open. Single attempt.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionFailed`](crate::ClientError::ConnectionFailed)
    /// if the master is unreachable, [`ClientError::Closed`](crate::ClientError::Closed)
    /// after [`close`](Self::close).
    pub fn connect(&self) -> Result<()> {
        self.connection.lock().connect()
    }

    /// Release the channel if one is open.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`](crate::ClientError::Closed) after [`close`](Self::close).
    pub fn disconnect(&self) -> Result<()> {
        self.connection.lock().disconnect()
    }

    /// Whether a channel to the master is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.lock().state()
    }

    /// Number of channels opened over the client's lifetime.
    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.connection.lock().connect_count()
    }

    /// Release all resources. Safe to call repeatedly and without a prior
    /// `connect()`. Every later operation fails with `Closed`.
    pub fn close(&self) {
        self.connection.lock().close();
    }

    /// Create a file at `path`.
    pub fn create_file(
        &self,
        path: impl Into<ResourcePath>,
        options: &CreateFileOptions,
    ) -> Result<()> {
        let path = path.into();
        let _span = tracing::info_span!("create_file", path = %path).entered();
        self.invoker.invoke(&self.connection, "create_file", |channel| {
            channel.create_file(&path, options)
        })
    }

    /// Fetch metadata for `path`.
    pub fn get_status(
        &self,
        path: impl Into<ResourcePath>,
        options: &GetStatusOptions,
    ) -> Result<FileInfo> {
        let path = path.into();
        let _span = tracing::info_span!("get_status", path = %path).entered();
        self.invoker.invoke(&self.connection, "get_status", |channel| {
            channel.get_status(&path, options)
        })
    }

    /// List entries under `path`.
    pub fn list_status(
        &self,
        path: impl Into<ResourcePath>,
        options: &ListStatusOptions,
    ) -> Result<Vec<FileInfo>> {
        let path = path.into();
        let _span = tracing::info_span!("list_status", path = %path).entered();
        self.invoker.invoke(&self.connection, "list_status", |channel| {
            channel.list_status(&path, options)
        })
    }
}

impl<T: MasterTransport> fmt::Debug for FileSystemMasterClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemMasterClient")
            .field("config", &self.config)
            .field("connection", &*self.connection.lock())
            .finish()
    }
}
