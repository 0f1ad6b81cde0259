//! Registry of open count-stream connections
//!
//! Constructed once per process and shared by reference with the stream
//! handler and the broadcaster. Every member is an open connection: a failed
//! push removes it immediately.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Why a frame could not be handed to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The browser is gone or the connection was torn down.
    Closed,
    /// The client stopped reading and its buffer is full.
    Full,
}

/// One open server-push channel to a browser
pub struct Connection {
    id: ConnectionId,
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: AtomicBool,
    poller: Mutex<Option<AbortHandle>>,
}

impl Connection {
    /// Create a connection and the receiving half its response body drains
    pub fn open(buffer: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(buffer);
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            sender: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            poller: Mutex::new(None),
        });
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn push(&self, frame: Bytes) -> Result<(), PushError> {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(PushError::Closed);
        };

        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Hand the connection its poll task. A connection that is already closed
    /// cancels the task straight away.
    pub fn attach_poller(&self, handle: AbortHandle) {
        let mut poller = self.poller.lock();
        if self.is_closed() {
            handle.abort();
            return;
        }
        *poller = Some(handle);
    }

    /// Forget the poll task without cancelling it; used by the task itself
    /// when it is already on its way out.
    pub fn detach_poller(&self) {
        self.poller.lock().take();
    }

    /// Close the channel and cancel the poll task.
    ///
    /// Safe to call any number of times from any path; only the first call
    /// does anything. Returns whether this call closed the connection.
    pub fn close(&self) -> bool {
        let mut poller = self.poller.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        // Dropping the only sender ends the response body
        self.sender.lock().take();
        if let Some(handle) = poller.take() {
            handle.abort();
        }
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the connection was already registered.
    pub fn register(&self, connection: Arc<Connection>) -> bool {
        let mut connections = self.connections.lock();
        if connections.contains_key(&connection.id()) {
            return false;
        }
        connections.insert(connection.id(), connection);
        debug!("[Registry] registered, {} open", connections.len());
        true
    }

    /// Removing an absent connection is not an error.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut connections = self.connections.lock();
        let removed = connections.remove(&id);
        if removed.is_some() {
            debug!("[Registry] unregistered {}, {} open", id, connections.len());
        }
        removed
    }

    /// Unregister and close. Tolerates repeated calls from the disconnect
    /// hook, the poll loop and the broadcaster.
    pub fn disconnect(&self, connection: &Connection) {
        self.unregister(connection.id());
        connection.close();
    }

    /// Visit a snapshot of the members taken when the call starts; the lock
    /// is not held while `f` runs.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Connection>),
    {
        let snapshot: Vec<Arc<Connection>> = self.connections.lock().values().cloned().collect();
        for connection in &snapshot {
            f(connection);
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = Connection::open(4);
        assert!(registry.register(conn.clone()));
        assert!(!registry.register(conn.clone()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_twice() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = Connection::open(4);
        let (b, _rx_b) = Connection::open(4);
        registry.register(a.clone());
        registry.register(b.clone());

        assert!(registry.unregister(a.id()).is_some());
        assert!(registry.unregister(a.id()).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(b.id()));
        assert!(!registry.contains(a.id()));
    }

    #[test]
    fn test_for_each_visits_snapshot() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = Connection::open(4);
        let (b, _rx_b) = Connection::open(4);
        registry.register(a.clone());
        registry.register(b.clone());

        let mut visited = 0;
        let mut late = Vec::new();
        registry.for_each(|conn| {
            visited += 1;
            // Mutation during iteration neither deadlocks nor changes the visit set
            registry.unregister(conn.id());
            let (extra, rx) = Connection::open(4);
            registry.register(extra);
            late.push(rx);
        });

        assert_eq!(visited, 2);
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(a.id()));
        assert!(!registry.contains(b.id()));
    }

    #[tokio::test]
    async fn test_push_and_close() {
        let (conn, mut rx) = Connection::open(1);
        conn.push(Bytes::from("one")).unwrap();
        assert_eq!(conn.push(Bytes::from("two")), Err(PushError::Full));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from("one"));

        assert!(conn.close());
        assert!(!conn.close());
        assert_eq!(conn.push(Bytes::from("three")), Err(PushError::Closed));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_fails_push() {
        let (conn, rx) = Connection::open(4);
        drop(rx);
        assert_eq!(conn.push(Bytes::from("x")), Err(PushError::Closed));
    }

    #[tokio::test]
    async fn test_close_cancels_poller_once() {
        let (conn, _rx) = Connection::open(4);
        let task = tokio::spawn(std::future::pending::<()>());
        conn.attach_poller(task.abort_handle());

        let registry = ConnectionRegistry::new();
        registry.register(conn.clone());
        registry.disconnect(&conn);
        registry.disconnect(&conn);

        assert!(task.await.unwrap_err().is_cancelled());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_attach_after_close_aborts() {
        let (conn, _rx) = Connection::open(4);
        conn.close();
        let task = tokio::spawn(std::future::pending::<()>());
        conn.attach_poller(task.abort_handle());
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister_for_each() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (stable, mut stable_rx) = Connection::open(1024);
        registry.register(stable.clone());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let (conn, _rx) = Connection::open(4);
                    assert!(registry.register(conn.clone()));
                    assert!(registry.contains(conn.id()));
                    tokio::task::yield_now().await;
                    registry.disconnect(&conn);
                    assert!(registry.unregister(conn.id()).is_none());
                }
            }));
        }

        let walker = {
            let registry = registry.clone();
            let stable_id = stable.id();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let mut seen_stable = 0;
                    registry.for_each(|conn| {
                        if conn.id() == stable_id {
                            seen_stable += 1;
                            let _ = conn.push(Bytes::from("tick"));
                        }
                    });
                    assert_eq!(seen_stable, 1);
                    tokio::task::yield_now().await;
                }
            })
        };

        for task in tasks {
            task.await.unwrap();
        }
        walker.await.unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(stable.id()));
        let mut ticks = 0;
        while stable_rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert_eq!(ticks, 200);
    }
}
