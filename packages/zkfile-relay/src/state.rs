//! Server state management.
//!
//! Tracks the connections currently being served. The registry is a
//! `DashMap` behind an `Arc`, cloned into every connection task; entries
//! are keyed by [`ConnectionId`] so two live connections never share one.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use zkfile_core::config::{DEFAULT_IO_TIMEOUT, DEFAULT_ROUNDS};
use zkfile_core::network::{TransferState, DEFAULT_MAX_FILE_SIZE};
use zkfile_core::{DeploymentParameters, ReceivedFiles, SchemeKind, SessionConfig};

use crate::protocol::{ConnectionId, ConnectionInfo, ConnectionStatus, StatsResponse};

/// Default listening port.
const DEFAULT_PORT: u16 = 8080;

/// Default directory for received files.
const DEFAULT_OUTPUT_DIR: &str = "received_files";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub io_timeout: Duration,
    pub rounds: u32,
    pub max_file_size: u64,
    /// Port for `/health` and `/stats`; disabled when `None`
    pub stats_port: Option<u16>,
    pub params: DeploymentParameters,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            io_timeout: DEFAULT_IO_TIMEOUT,
            rounds: DEFAULT_ROUNDS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            stats_port: None,
            params: DeploymentParameters::default(),
        }
    }
}

impl ServerConfig {
    /// Settings handed to every verifier session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            params: self.params.clone(),
            rounds: self.rounds,
            io_timeout: self.io_timeout,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    authenticated: AtomicU64,
    files_received: AtomicU64,
}

/// Shared server state.
#[derive(Clone)]
pub struct ServerState {
    /// Connection ID → live connection info.
    /// Inserted on accept, removed by the connection's [`RegistrationGuard`].
    pub connections: Arc<DashMap<ConnectionId, ConnectionInfo>>,

    /// Output directory shared by every connection.
    pub files: ReceivedFiles,

    /// Server configuration.
    pub config: Arc<ServerConfig>,

    counters: Arc<Counters>,
}

impl ServerState {
    /// Create a new server state around an already opened output directory.
    pub fn new(config: ServerConfig, files: ReceivedFiles) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            files,
            config: Arc::new(config),
            counters: Arc::new(Counters::default()),
        }
    }

    // ── Registry ──────────────────────────────────────────────────────────

    /// Register a freshly accepted connection.
    ///
    /// The entry lives as long as the returned guard.
    pub fn register(&self, peer: SocketAddr) -> RegistrationGuard {
        let id = ConnectionId::new(peer);
        self.connections.insert(id, ConnectionInfo::new(id));
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(conn_id = %id, "connection registered");
        RegistrationGuard {
            id,
            connections: Arc::clone(&self.connections),
        }
    }

    /// Number of connections currently registered.
    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Update a connection's status. Counters move on transitions only.
    pub fn set_status(&self, id: &ConnectionId, status: ConnectionStatus) {
        match self.connections.get_mut(id) {
            Some(mut info) if info.status != status => info.status = status,
            _ => return,
        }
        match status {
            ConnectionStatus::Authenticated => {
                self.counters.authenticated.fetch_add(1, Ordering::Relaxed);
            }
            ConnectionStatus::Completed => {
                self.counters.files_received.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Record the scheme the peer selected.
    pub fn set_scheme(&self, id: &ConnectionId, scheme: Option<SchemeKind>) {
        if let Some(mut info) = self.connections.get_mut(id) {
            info.scheme = scheme;
        }
    }

    /// Record transfer progress.
    pub fn set_transfer(&self, id: &ConnectionId, state: TransferState, bytes: u64) {
        if let Some(mut info) = self.connections.get_mut(id) {
            info.transfer = Some(state);
            if bytes > 0 {
                info.bytes_received = bytes;
            }
        }
    }

    /// Record the name of the file being received.
    pub fn set_file_name(&self, id: &ConnectionId, name: &str) {
        if let Some(mut info) = self.connections.get_mut(id) {
            info.file_name = Some(name.to_string());
        }
    }

    /// Snapshot for the `/stats` endpoint, oldest connection first.
    pub fn stats(&self) -> StatsResponse {
        let mut connections: Vec<ConnectionInfo> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        connections.sort_by_key(|info| info.connected_at);
        StatsResponse {
            active_connections: connections.len(),
            total_accepted: self.counters.accepted.load(Ordering::Relaxed),
            total_authenticated: self.counters.authenticated.load(Ordering::Relaxed),
            total_files_received: self.counters.files_received.load(Ordering::Relaxed),
            connections,
        }
    }
}

/// Removes a connection from the registry when dropped, whichever way the
/// connection task ends.
#[derive(Debug)]
pub struct RegistrationGuard {
    id: ConnectionId,
    connections: Arc<DashMap<ConnectionId, ConnectionInfo>>,
}

impl RegistrationGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.connections.remove(&self.id);
        tracing::debug!(conn_id = %self.id, "connection unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.7:4242".parse().unwrap()
    }

    async fn test_state() -> (ServerState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        (ServerState::new(ServerConfig::default(), files), dir)
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.output_dir, PathBuf::from("received_files"));
        assert_eq!(config.rounds, 1);
        assert_eq!(config.io_timeout, Duration::from_secs(30));
        assert!(config.stats_port.is_none());
        assert!(config.session_config().validate().is_ok());
    }

    #[tokio::test]
    async fn test_register_and_guard_drop() {
        let (state, _dir) = test_state().await;

        let guard = state.register(peer());
        assert_eq!(state.active_count(), 1);
        assert_eq!(
            state.connections.get(&guard.id()).unwrap().status,
            ConnectionStatus::Connected
        );

        drop(guard);
        assert_eq!(state.active_count(), 0);
        assert_eq!(state.stats().total_accepted, 1);
    }

    #[tokio::test]
    async fn test_same_peer_twice() {
        let (state, _dir) = test_state().await;

        let a = state.register(peer());
        let b = state.register(peer());
        assert_ne!(a.id(), b.id());
        assert_eq!(state.active_count(), 2);

        drop(a);
        assert_eq!(state.active_count(), 1);
        assert!(state.connections.contains_key(&b.id()));
    }

    #[tokio::test]
    async fn test_status_updates_and_counters() {
        let (state, _dir) = test_state().await;
        let guard = state.register(peer());
        let id = guard.id();

        state.set_scheme(&id, Some(SchemeKind::GuillouQuisquater));
        state.set_status(&id, ConnectionStatus::Authenticated);
        state.set_file_name(&id, "notes.txt");
        state.set_transfer(&id, TransferState::Receiving, 512);
        state.set_transfer(&id, TransferState::Completed, 0);
        state.set_status(&id, ConnectionStatus::Completed);

        let stats = state.stats();
        assert_eq!(stats.total_authenticated, 1);
        assert_eq!(stats.total_files_received, 1);
        let info = &stats.connections[0];
        assert_eq!(info.scheme, Some(SchemeKind::GuillouQuisquater));
        assert_eq!(info.transfer, Some(TransferState::Completed));
        assert_eq!(info.bytes_received, 512);
        assert_eq!(info.file_name.as_deref(), Some("notes.txt"));
    }

    #[tokio::test]
    async fn test_updates_after_removal_are_ignored() {
        let (state, _dir) = test_state().await;
        let id = state.register(peer()).id();
        state.set_status(&id, ConnectionStatus::Failed);
        assert_eq!(state.active_count(), 0);
    }
}
