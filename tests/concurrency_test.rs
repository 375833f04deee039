//! Concurrent use of one client from several threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fsmaster_client::local::LocalMaster;
use fsmaster_client::{
    ClientConfig, CreateFileOptions, FileInfo, FileSystemMasterClient, GetStatusOptions,
    ListStatusOptions, MasterChannel, MasterTransport, ResourcePath, RpcError,
};

/// Wraps a master channel and records how many calls overlap.
struct Probe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Probe {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ProbeTransport {
    inner: fsmaster_client::local::LocalTransport,
    probe: Arc<Probe>,
}

struct ProbeChannel {
    inner: Box<dyn MasterChannel>,
    probe: Arc<Probe>,
}

impl MasterTransport for ProbeTransport {
    fn connect(&self) -> Result<Box<dyn MasterChannel>, RpcError> {
        Ok(Box::new(ProbeChannel {
            inner: self.inner.connect()?,
            probe: Arc::clone(&self.probe),
        }))
    }
}

impl MasterChannel for ProbeChannel {
    fn create_file(
        &mut self,
        path: &ResourcePath,
        options: &CreateFileOptions,
    ) -> Result<(), RpcError> {
        self.probe.enter();
        let result = self.inner.create_file(path, options);
        self.probe.exit();
        result
    }

    fn get_status(
        &mut self,
        path: &ResourcePath,
        options: &GetStatusOptions,
    ) -> Result<FileInfo, RpcError> {
        self.probe.enter();
        let result = self.inner.get_status(path, options);
        self.probe.exit();
        result
    }

    fn list_status(
        &mut self,
        path: &ResourcePath,
        options: &ListStatusOptions,
    ) -> Result<Vec<FileInfo>, RpcError> {
        self.probe.enter();
        let result = self.inner.list_status(path, options);
        self.probe.exit();
        result
    }

    fn disconnect(&mut self) {
        self.inner.disconnect();
    }
}

#[test]
fn test_attempts_are_serialized_across_threads() {
    let master = LocalMaster::new();
    let probe = Arc::new(Probe {
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let client = Arc::new(FileSystemMasterClient::new(
        ProbeTransport {
            inner: master.transport(),
            probe: Arc::clone(&probe),
        },
        ClientConfig::with_fixed_backoff(20, Duration::from_millis(10)),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let path = format!("/file-{i}");
                client
                    .create_file(path.as_str(), &CreateFileOptions::default())
                    .unwrap();
                client
                    .get_status(path.as_str(), &GetStatusOptions::default())
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    let listing = client
        .list_status("/", &ListStatusOptions::default())
        .unwrap();
    assert_eq!(listing.len(), 8);
    // One shared channel for all threads
    assert_eq!(client.connect_count(), 1);
}

#[test]
fn test_threads_recover_from_shared_restart() {
    let master = LocalMaster::new();
    let client = Arc::new(FileSystemMasterClient::new(
        master.transport(),
        ClientConfig::with_fixed_backoff(50, Duration::from_millis(20)),
    ));
    client.connect().unwrap();
    master.stop();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let client = Arc::clone(&client);
            thread::spawn(move || client.list_status("/", &ListStatusOptions::default()).is_ok())
        })
        .collect();

    thread::sleep(Duration::from_millis(150));
    master.start();

    for worker in workers {
        assert!(worker.join().unwrap());
    }
    assert!(client.is_connected());
}
