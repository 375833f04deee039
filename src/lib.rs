//! # fsmaster-client
//!
//! Client-side connector to a filesystem metadata master. It keeps one
//! logical connection to the master, runs metadata RPCs over it, and rides
//! out master restarts and failovers by reconnecting and retrying with
//! backoff, while returning the master's own rejections (such as a missing
//! path) straight away.
//!
//! ## Crate Structure
//!
//! - **`client`**: [`FileSystemMasterClient`], the public facade.
//! - **`invoker`**: the reconnect-and-retry loop around one logical RPC.
//! - **`connection`**: [`ConnectionManager`], the Disconnected/Connected/Closed
//!   state machine owning the channel.
//! - **`retry`**: [`RetryPolicy`], bounded attempts and backoff delays.
//! - **`error`**: [`RpcError`] and its Transient/Terminal [`classify`]
//!   function, and the facade's [`ClientError`].
//! - **`transport`**: the abstract RPC boundary ([`MasterTransport`],
//!   [`MasterChannel`]) and request/response types.
//! - **`config`**: layered settings loading via Figment.
//! - **`logging`**: tracing subscriber setup.
//! - **`local`**: an in-process master for tests and demos.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod invoker;
pub mod local;
pub mod logging;
pub mod retry;
pub mod transport;

pub use client::FileSystemMasterClient;
pub use config::{BackoffConfig, ClientConfig, Settings};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{
    classify, ApplicationError, ClientError, FailureKind, Result, RpcError, StatusCode,
    UnreachableReason,
};
pub use invoker::RpcInvoker;
pub use retry::RetryPolicy;
pub use transport::{
    CreateFileOptions, FileInfo, GetStatusOptions, ListStatusOptions, LoadMetadataType,
    MasterChannel, MasterTransport, ResourcePath,
};
