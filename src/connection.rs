//! Connection state machine for the master channel.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect() ok──> Connected ──connect()──> Connected (no-op)
//!      ▲                             │
//!      └────────disconnect()─────────┘
//!
//! any state ──close()──> Closed (terminal)
//! ```
//!
//! `connect()` is a single attempt. Retrying is the RPC invoker's job.

use std::fmt;

use crate::error::{ClientError, Result, RpcError};
use crate::transport::{MasterChannel, MasterTransport};

/// Observable state of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel is held.
    Disconnected,
    /// A channel to the master is held.
    Connected,
}

impl ConnectionState {
    /// Returns a short status label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
        }
    }
}

enum Slot {
    Disconnected,
    Connected(Box<dyn MasterChannel>),
    Closed,
}

/// Owns the channel to the master and its lifecycle.
pub struct ConnectionManager<T: MasterTransport> {
    transport: T,
    slot: Slot,
    /// Successful connects over the manager's lifetime
    connect_count: u64,
}

impl<T: MasterTransport> ConnectionManager<T> {
    /// Create a disconnected manager over `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            slot: Slot::Disconnected,
            connect_count: 0,
        }
    }

    /// Current connection state. Reports `Disconnected` once closed.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.slot {
            Slot::Connected(_) => ConnectionState::Connected,
            Slot::Disconnected | Slot::Closed => ConnectionState::Disconnected,
        }
    }

    /// Whether a channel is currently held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.slot, Slot::Closed)
    }

    /// Number of channels successfully opened so far.
    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.connect_count
    }

    /// Open a channel unless one is already held.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] after [`close`](Self::close), without touching
    /// the transport, or [`ClientError::ConnectionFailed`] if this attempt
    /// could not reach the master.
    pub fn connect(&mut self) -> Result<()> {
        self.try_connect().map_err(|err| match err {
            ConnectFailure::Closed => ClientError::Closed,
            ConnectFailure::Rpc(err) => ClientError::ConnectionFailed(err),
        })
    }

    /// [`connect`](Self::connect) with the raw transport failure kept intact.
    pub(crate) fn try_connect(&mut self) -> std::result::Result<(), ConnectFailure> {
        match self.slot {
            Slot::Closed => return Err(ConnectFailure::Closed),
            Slot::Connected(_) => return Ok(()),
            Slot::Disconnected => {}
        }

        match self.transport.connect() {
            Ok(channel) => {
                self.slot = Slot::Connected(channel);
                self.connect_count += 1;
                tracing::info!(connects = self.connect_count, "Connected to master");
                Ok(())
            }
            Err(err) => {
                tracing::debug!(error = %err, "Connect attempt failed");
                Err(ConnectFailure::Rpc(err))
            }
        }
    }

    /// Release the channel if one is held.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] after [`close`](Self::close).
    pub fn disconnect(&mut self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.release();
        Ok(())
    }

    /// Disconnect if needed and refuse all further use. Idempotent.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.release();
        self.slot = Slot::Closed;
        tracing::debug!("Connection manager closed");
    }

    /// The open channel, if connected.
    pub(crate) fn channel(&mut self) -> Option<&mut (dyn MasterChannel + 'static)> {
        match &mut self.slot {
            Slot::Connected(channel) => Some(channel.as_mut()),
            Slot::Disconnected | Slot::Closed => None,
        }
    }

    fn release(&mut self) {
        if let Slot::Connected(mut channel) = std::mem::replace(&mut self.slot, Slot::Disconnected)
        {
            channel.disconnect();
            tracing::info!("Disconnected from master");
        }
    }
}

impl<T: MasterTransport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: MasterTransport> fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_closed() {
            "Closed"
        } else {
            self.state().label()
        };
        f.debug_struct("ConnectionManager")
            .field("state", &state)
            .field("connect_count", &self.connect_count)
            .finish()
    }
}

/// Why a connect attempt did not produce a channel.
#[derive(Debug)]
pub(crate) enum ConnectFailure {
    Closed,
    Rpc(RpcError),
}
