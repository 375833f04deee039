//! Error types and failure classification for the master client.
//!
//! Every failure observed at the transport boundary is an [`RpcError`]. Each
//! one carries enough structure for [`classify`] to decide, without looking at
//! message text, whether the failure is:
//!
//! - **Transient**: the master or the channel to it is currently unreachable
//!   (connection refused, handshake timeout, channel reset, master in standby).
//!   The caller may reconnect and retry.
//! - **Terminal**: the master answered with a well-formed negative response
//!   (e.g. the path does not exist). The master is reachable, so reconnecting
//!   cannot change the answer. These propagate to the caller immediately.
//!
//! The facade surfaces a [`ClientError`], which adds the outcomes that only
//! exist above a single RPC: retry exhaustion, use after close, and
//! configuration problems.

use std::fmt;

use thiserror::Error;

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

// =============================================================================
// Transport-boundary failures
// =============================================================================

/// Why a channel could not be established or stopped working.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachableReason {
    /// Nothing is listening at the master endpoint.
    ConnectionRefused,
    /// The endpoint accepted the socket but the handshake did not complete in time.
    HandshakeTimeout,
    /// An established channel was torn down underneath the client.
    ChannelReset,
}

impl fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnreachableReason::ConnectionRefused => "connection refused",
            UnreachableReason::HandshakeTimeout => "handshake timed out",
            UnreachableReason::ChannelReset => "channel reset",
        };
        write!(f, "{}", label)
    }
}

/// Status codes a reachable master may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The path does not exist.
    NotFound,
    /// The path is already taken.
    AlreadyExists,
    /// The caller may not perform the operation.
    PermissionDenied,
    /// The request itself is malformed.
    InvalidArgument,
    /// The namespace is not in the state the request needs.
    FailedPrecondition,
    /// The master failed while handling the request.
    Internal,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusCode::NotFound => "not_found",
            StatusCode::AlreadyExists => "already_exists",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::FailedPrecondition => "failed_precondition",
            StatusCode::Internal => "internal",
        };
        write!(f, "{}", label)
    }
}

/// A well-formed negative response from a reachable master.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ApplicationError {
    /// Machine-readable rejection reason.
    pub code: StatusCode,
    /// Message from the master.
    pub message: String,
}

impl ApplicationError {
    /// Build a response with `code` and `message`.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a `NotFound` response naming `path`.
    pub fn not_found(path: impl fmt::Display) -> Self {
        Self::new(StatusCode::NotFound, format!("path {} does not exist", path))
    }
}

/// Failure observed the first time an RPC (or a connect) result is seen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The master could not be reached over the channel.
    #[error("master unreachable ({reason}): {message}")]
    Unreachable {
        /// What went wrong at the connection level.
        reason: UnreachableReason,
        /// Transport detail, such as the endpoint.
        message: String,
    },

    /// The endpoint answered but is not the serving primary (standby or failover window).
    #[error("master not serving: {0}")]
    NotServing(String),

    /// The master processed the request and rejected it.
    #[error(transparent)]
    Status(#[from] ApplicationError),
}

impl RpcError {
    /// Shorthand for [`RpcError::Unreachable`].
    pub fn unreachable(reason: UnreachableReason, message: impl Into<String>) -> Self {
        Self::Unreachable {
            reason,
            message: message.into(),
        }
    }

    /// Classification of this failure; same as [`classify`].
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        classify(self)
    }

    /// Split a failure by classification: `Ok` with the master's answer when
    /// Terminal, `Err` with the failure itself when Transient.
    pub fn into_terminal(self) -> std::result::Result<ApplicationError, RpcError> {
        match (classify(&self), self) {
            (FailureKind::Terminal, RpcError::Status(app)) => Ok(app),
            (_, other) => Err(other),
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Whether a failure is worth a reconnect-and-retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connectivity problem; reconnect and retry within the retry bound.
    Transient,
    /// The master answered; propagate without retrying or disconnecting.
    Terminal,
}

/// Classify an RPC failure.
///
/// Any answer from the master, whatever its code, proves reachability and is
/// Terminal. Only failures that say nothing about the request itself are
/// Transient. Treating a `NotFound` as Transient turns a missing path into an
/// endless reconnect loop.
#[must_use]
pub fn classify(error: &RpcError) -> FailureKind {
    match error {
        RpcError::Unreachable { .. } | RpcError::NotServing(_) => FailureKind::Transient,
        RpcError::Status(_) => FailureKind::Terminal,
    }
}

// =============================================================================
// Client errors
// =============================================================================

/// Errors returned by [`FileSystemMasterClient`](crate::FileSystemMasterClient).
#[derive(Error, Debug)]
pub enum ClientError {
    /// A single explicit `connect()` attempt failed.
    #[error("failed to connect to master: {0}")]
    ConnectionFailed(#[source] RpcError),

    /// Terminal response from the master, surfaced unchanged.
    #[error(transparent)]
    Application(#[from] ApplicationError),

    /// Every permitted attempt failed with a Transient error.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Name of the operation that gave up.
        operation: &'static str,
        /// Attempts made, including the first.
        attempts: u32,
        /// The last Transient failure.
        #[source]
        source: RpcError,
    },

    /// The client was closed; no I/O was attempted.
    #[error("client is closed")]
    Closed,

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds unusable values.
    #[error("configuration validation error: {0}")]
    InvalidConfig(String),
}

impl From<figment::Error> for ClientError {
    fn from(err: figment::Error) -> Self {
        ClientError::Config(Box::new(err))
    }
}

impl ClientError {
    /// The terminal status code, if this is an application error.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ClientError::Application(err) => Some(err.code),
            _ => None,
        }
    }

    /// Whether the master answered `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(StatusCode::NotFound)
    }

    /// Whether every permitted attempt failed.
    #[must_use]
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, ClientError::RetryExhausted { .. })
    }

    /// Whether the client was already closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, ClientError::Closed)
    }
}
