//! In-process master for tests and demos.
//!
//! [`LocalMaster`] keeps a small namespace in memory and implements the
//! transport boundary directly, so a [`FileSystemMasterClient`] can run
//! against it without sockets. It can be stopped, restarted and put into
//! standby to exercise the client's recovery paths, and it counts connect
//! and RPC attempts so tests can assert that no I/O happened.
//!
//! Stopping the master invalidates every open channel; their next call fails
//! with a channel reset, just like a real master restart.
//!
//! [`FileSystemMasterClient`]: crate::FileSystemMasterClient

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{ApplicationError, RpcError, StatusCode, UnreachableReason};
use crate::transport::{
    CreateFileOptions, FileInfo, GetStatusOptions, ListStatusOptions, MasterChannel,
    MasterTransport, ResourcePath,
};

struct MasterState {
    running: bool,
    serving: bool,
    /// Bumped on every stop; channels from an older epoch are dead.
    epoch: u64,
    namespace: BTreeMap<ResourcePath, FileInfo>,
    connect_attempts: u64,
    rpc_calls: u64,
}

impl MasterState {
    fn new() -> Self {
        let root = ResourcePath::from("/");
        let mut namespace = BTreeMap::new();
        namespace.insert(root.clone(), folder_info(&root));
        Self {
            running: true,
            serving: true,
            epoch: 0,
            namespace,
            connect_attempts: 0,
            rpc_calls: 0,
        }
    }
}

fn folder_info(path: &ResourcePath) -> FileInfo {
    FileInfo {
        path: path.clone(),
        name: path.name().to_string(),
        is_folder: true,
        length: 0,
        block_size_bytes: 0,
        mode: 0o755,
        created_at: Utc::now(),
    }
}

/// A master living in the current process.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct LocalMaster {
    state: Arc<Mutex<MasterState>>,
}

impl LocalMaster {
    /// A running, serving master whose namespace holds only `/`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MasterState::new())),
        }
    }

    /// Transport that connects to this master.
    #[must_use]
    pub fn transport(&self) -> LocalTransport {
        LocalTransport {
            state: self.state.clone(),
        }
    }

    /// Stop the master. Open channels break and connects are refused.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.epoch += 1;
        tracing::info!(epoch = state.epoch, "Local master stopped");
    }

    /// Start a stopped master. The namespace survives restarts.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.running = true;
        tracing::info!(epoch = state.epoch, "Local master started");
    }

    /// Toggle standby. A non-serving master answers every request with "not serving".
    pub fn set_serving(&self, serving: bool) {
        self.state.lock().serving = serving;
    }

    /// Whether the master accepts connections.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Connect attempts seen so far, including refused ones.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.state.lock().connect_attempts
    }

    /// RPCs received so far, including failed ones.
    #[must_use]
    pub fn rpc_calls(&self) -> u64 {
        self.state.lock().rpc_calls
    }
}

impl Default for LocalMaster {
    fn default() -> Self {
        Self::new()
    }
}

/// [`MasterTransport`] for a [`LocalMaster`].
#[derive(Clone)]
pub struct LocalTransport {
    state: Arc<Mutex<MasterState>>,
}

impl MasterTransport for LocalTransport {
    fn connect(&self) -> Result<Box<dyn MasterChannel>, RpcError> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;

        if !state.running {
            return Err(RpcError::unreachable(
                UnreachableReason::ConnectionRefused,
                "local master is stopped",
            ));
        }
        if !state.serving {
            return Err(RpcError::NotServing("local master is in standby".into()));
        }

        Ok(Box::new(LocalChannel {
            state: self.state.clone(),
            epoch: state.epoch,
            open: true,
        }))
    }
}

struct LocalChannel {
    state: Arc<Mutex<MasterState>>,
    epoch: u64,
    open: bool,
}

impl LocalChannel {
    /// Lock the master for one RPC, failing if this channel is no longer usable.
    fn begin(&self) -> Result<parking_lot::MutexGuard<'_, MasterState>, RpcError> {
        let mut state = self.state.lock();
        state.rpc_calls += 1;

        if !self.open || !state.running || state.epoch != self.epoch {
            return Err(RpcError::unreachable(
                UnreachableReason::ChannelReset,
                "channel to local master is gone",
            ));
        }
        if !state.serving {
            return Err(RpcError::NotServing("local master is in standby".into()));
        }
        Ok(state)
    }
}

fn require_absolute(path: &ResourcePath) -> Result<(), RpcError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ApplicationError::new(
            StatusCode::InvalidArgument,
            format!("path {} is not absolute", path),
        )
        .into())
    }
}

impl MasterChannel for LocalChannel {
    fn create_file(
        &mut self,
        path: &ResourcePath,
        options: &CreateFileOptions,
    ) -> Result<(), RpcError> {
        let mut state = self.begin()?;
        require_absolute(path)?;

        if state.namespace.contains_key(path) {
            return Err(ApplicationError::new(
                StatusCode::AlreadyExists,
                format!("path {} already exists", path),
            )
            .into());
        }

        // Walk up to the nearest existing ancestor.
        let mut missing = Vec::new();
        let mut cursor = path.parent();
        while let Some(parent) = cursor {
            match state.namespace.get(&parent) {
                Some(info) if info.is_folder => break,
                Some(_) => {
                    return Err(ApplicationError::new(
                        StatusCode::InvalidArgument,
                        format!("parent {} of {} is a file", parent, path),
                    )
                    .into());
                }
                None => {
                    cursor = parent.parent();
                    missing.push(parent);
                }
            }
        }

        if let Some(nearest) = missing.first() {
            if !options.recursive {
                return Err(ApplicationError::new(
                    StatusCode::NotFound,
                    format!("parent {} of {} does not exist", nearest, path),
                )
                .into());
            }
        }
        for folder in missing.into_iter().rev() {
            let info = folder_info(&folder);
            state.namespace.insert(folder, info);
        }

        state.namespace.insert(
            path.clone(),
            FileInfo {
                path: path.clone(),
                name: path.name().to_string(),
                is_folder: false,
                length: 0,
                block_size_bytes: options.block_size_bytes,
                mode: options.mode,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn get_status(
        &mut self,
        path: &ResourcePath,
        _options: &GetStatusOptions,
    ) -> Result<FileInfo, RpcError> {
        let state = self.begin()?;
        state
            .namespace
            .get(path)
            .cloned()
            .ok_or_else(|| ApplicationError::not_found(path).into())
    }

    fn list_status(
        &mut self,
        path: &ResourcePath,
        options: &ListStatusOptions,
    ) -> Result<Vec<FileInfo>, RpcError> {
        let state = self.begin()?;
        let target = state
            .namespace
            .get(path)
            .ok_or_else(|| RpcError::from(ApplicationError::not_found(path)))?;

        if !target.is_folder {
            return Ok(vec![target.clone()]);
        }

        let prefix = if path.is_root() {
            "/".to_string()
        } else {
            format!("{}/", path.as_str().trim_end_matches('/'))
        };

        Ok(state
            .namespace
            .range(path.clone()..)
            .filter(|(key, _)| *key != path && key.as_str().starts_with(&prefix))
            .filter(|(key, _)| options.recursive || key.parent().as_ref() == Some(path))
            .map(|(_, info)| info.clone())
            .collect())
    }

    fn disconnect(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(master: &LocalMaster) -> Box<dyn MasterChannel> {
        master.transport().connect().unwrap()
    }

    #[test]
    fn test_create_then_get() {
        let master = LocalMaster::new();
        let mut ch = channel(&master);
        let path = ResourcePath::from("/file");

        ch.create_file(&path, &CreateFileOptions::default()).unwrap();
        let info = ch.get_status(&path, &GetStatusOptions::default()).unwrap();
        assert_eq!(info.name, "file");
        assert!(!info.is_folder);
        assert_eq!(info.mode, 0o644);
    }

    #[test]
    fn test_create_existing_fails() {
        let master = LocalMaster::new();
        let mut ch = channel(&master);
        let path = ResourcePath::from("/file");
        ch.create_file(&path, &CreateFileOptions::default()).unwrap();

        let err = ch
            .create_file(&path, &CreateFileOptions::default())
            .unwrap_err();
        assert_eq!(
            err.into_terminal().map(|app| app.code),
            Ok(StatusCode::AlreadyExists)
        );
    }

    #[test]
    fn test_missing_parent_requires_recursive() {
        let master = LocalMaster::new();
        let mut ch = channel(&master);
        let path = ResourcePath::from("/a/b/file");

        let err = ch
            .create_file(&path, &CreateFileOptions::default())
            .unwrap_err();
        assert_eq!(
            err.into_terminal().map(|app| app.code),
            Ok(StatusCode::NotFound)
        );

        ch.create_file(&path, &CreateFileOptions::default().recursive(true))
            .unwrap();
        let parent = ch
            .get_status(&ResourcePath::from("/a/b"), &GetStatusOptions::default())
            .unwrap();
        assert!(parent.is_folder);
    }

    #[test]
    fn test_relative_path_rejected() {
        let master = LocalMaster::new();
        let mut ch = channel(&master);
        let err = ch
            .create_file(&ResourcePath::from("file"), &CreateFileOptions::default())
            .unwrap_err();
        assert_eq!(
            err.into_terminal().map(|app| app.code),
            Ok(StatusCode::InvalidArgument)
        );
    }

    #[test]
    fn test_list_status() {
        let master = LocalMaster::new();
        let mut ch = channel(&master);
        let recursive = CreateFileOptions::default().recursive(true);
        for p in ["/b", "/a/x", "/a/y/z", "/ab"] {
            ch.create_file(&ResourcePath::from(p), &recursive).unwrap();
        }

        let names = |infos: Vec<FileInfo>| {
            infos
                .into_iter()
                .map(|i| i.path.to_string())
                .collect::<Vec<_>>()
        };

        let root = ch
            .list_status(&ResourcePath::from("/"), &ListStatusOptions::default())
            .unwrap();
        assert_eq!(names(root), ["/a", "/ab", "/b"]);

        let a = ch
            .list_status(&ResourcePath::from("/a"), &ListStatusOptions::default())
            .unwrap();
        assert_eq!(names(a), ["/a/x", "/a/y"]);

        let all = ch
            .list_status(
                &ResourcePath::from("/a"),
                &ListStatusOptions { recursive: true },
            )
            .unwrap();
        assert_eq!(names(all), ["/a/x", "/a/y", "/a/y/z"]);

        let file = ch
            .list_status(&ResourcePath::from("/b"), &ListStatusOptions::default())
            .unwrap();
        assert_eq!(names(file), ["/b"]);
    }

    #[test]
    fn test_stop_breaks_channels_and_refuses_connects() {
        let master = LocalMaster::new();
        let mut ch = channel(&master);
        master.stop();

        let err = ch
            .get_status(&ResourcePath::from("/"), &GetStatusOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            RpcError::Unreachable {
                reason: UnreachableReason::ChannelReset,
                ..
            }
        ));

        let refused = master.transport().connect().err().unwrap();
        assert!(matches!(
            refused,
            RpcError::Unreachable {
                reason: UnreachableReason::ConnectionRefused,
                ..
            }
        ));

        // A restart does not revive old channels.
        master.start();
        assert!(ch
            .get_status(&ResourcePath::from("/"), &GetStatusOptions::default())
            .is_err());
        assert!(channel(&master)
            .get_status(&ResourcePath::from("/"), &GetStatusOptions::default())
            .is_ok());
        assert_eq!(master.connect_attempts(), 3);
    }

    #[test]
    fn test_standby_is_not_serving() {
        let master = LocalMaster::new();
        master.set_serving(false);
        let err = master.transport().connect().err().unwrap();
        assert_eq!(err, RpcError::NotServing("local master is in standby".into()));
    }
}
