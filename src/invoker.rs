//! Retry loop around a single logical RPC.
//!
//! For attempt `n = 0, 1, ...`:
//! 1. make sure a channel is open, connecting if needed (a failed connect
//!    counts as a Transient failure);
//! 2. run the RPC and return its result on success;
//! 3. on a Terminal failure return it unchanged, keeping the channel;
//! 4. on a Transient failure drop the channel, then either give up with
//!    [`ClientError::RetryExhausted`] or sleep and try again on a fresh
//!    channel.
//!
//! The connection lock is held for one attempt at a time and released while
//! sleeping, so attempts never interleave across threads and a sleeping retry
//! does not stall `is_connected()` or `close()`.

use parking_lot::Mutex;

use crate::connection::{ConnectFailure, ConnectionManager};
use crate::error::{ClientError, Result, RpcError};
use crate::retry::RetryPolicy;
use crate::transport::{MasterChannel, MasterTransport};

/// Per-call retry state. Lives for exactly one [`RpcInvoker::invoke`] call.
struct RetryContext {
    operation: &'static str,
    attempt: u32,
}

/// Outcome of one attempt.
enum Attempt<R> {
    Done(R),
    Transient(RpcError),
}

/// Runs RPCs with reconnect-and-retry on Transient failures.
#[derive(Debug, Clone)]
pub struct RpcInvoker {
    policy: RetryPolicy,
}

impl RpcInvoker {
    /// Invoker applying `policy` to every call.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` against the master, retrying per the policy.
    ///
    /// `call` may run several times, each time on a freshly connected channel.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Application`] as soon as the master rejects the request
    /// - [`ClientError::RetryExhausted`] once every permitted attempt failed
    ///   with a Transient error, carrying the last one
    /// - [`ClientError::Closed`] if the connection manager is closed before
    ///   an attempt starts
    pub fn invoke<T, R, F>(
        &self,
        connection: &Mutex<ConnectionManager<T>>,
        operation: &'static str,
        mut call: F,
    ) -> Result<R>
    where
        T: MasterTransport,
        F: FnMut(&mut dyn MasterChannel) -> std::result::Result<R, RpcError>,
    {
        let mut ctx = RetryContext {
            operation,
            attempt: 0,
        };

        loop {
            let failure = match self.attempt(connection, &mut call)? {
                Attempt::Done(result) => return Ok(result),
                Attempt::Transient(err) => err,
            };

            if !self.policy.should_retry(ctx.attempt) {
                tracing::error!(
                    operation = ctx.operation,
                    attempts = ctx.attempt + 1,
                    error = %failure,
                    "Retries exhausted"
                );
                return Err(ClientError::RetryExhausted {
                    operation: ctx.operation,
                    attempts: ctx.attempt + 1,
                    source: failure,
                });
            }

            ctx.attempt += 1;
            let delay = self.policy.delay_before_attempt(ctx.attempt);
            tracing::warn!(
                operation = ctx.operation,
                attempt = ctx.attempt,
                max_retries = self.policy.max_retries(),
                ?delay,
                error = %failure,
                "Transient failure, retrying"
            );
            std::thread::sleep(delay);
        }
    }

    /// One connect-call-classify step under the connection lock.
    fn attempt<T, R, F>(
        &self,
        connection: &Mutex<ConnectionManager<T>>,
        call: &mut F,
    ) -> Result<Attempt<R>>
    where
        T: MasterTransport,
        F: FnMut(&mut dyn MasterChannel) -> std::result::Result<R, RpcError>,
    {
        let mut manager = connection.lock();

        match manager.try_connect() {
            Ok(()) => {}
            Err(ConnectFailure::Closed) => return Err(ClientError::Closed),
            Err(ConnectFailure::Rpc(err)) => return Ok(Attempt::Transient(err)),
        }

        let outcome = match manager.channel() {
            Some(channel) => call(channel),
            None => return Err(ClientError::Closed),
        };

        match outcome {
            Ok(result) => Ok(Attempt::Done(result)),
            Err(err) => match err.into_terminal() {
                Ok(app) => {
                    tracing::debug!(error = %app, "Terminal failure from master");
                    Err(ClientError::Application(app))
                }
                Err(transient) => {
                    // The channel is likely broken; the next attempt must reconnect.
                    manager.disconnect()?;
                    Ok(Attempt::Transient(transient))
                }
            },
        }
    }
}
