//! Observability payloads.
//!
//! The identification and transfer protocol itself lives in `zkfile-core`;
//! this module only describes what the HTTP endpoint reports about the
//! connections currently being served.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use zkfile_core::network::TransferState;
use zkfile_core::SchemeKind;

// ── Connection Registry Entries ───────────────────────────────────────────────

/// Unique key of one accepted connection.
///
/// The peer address alone is not enough: a client can reconnect from the
/// same address and port while the old entry is still being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId {
    pub id: Uuid,
    pub peer: SocketAddr,
}

impl ConnectionId {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
        }
    }

    /// Prefix for files written on behalf of this connection.
    pub fn file_tag(&self) -> String {
        self.id.simple().to_string()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.peer)
    }
}

/// Where a connection is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Authenticating,
    Authenticated,
    Rejected,
    Transferring,
    Completed,
    Failed,
}

/// Registry entry for one connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    #[serde(serialize_with = "serialize_scheme")]
    pub scheme: Option<SchemeKind>,
    pub status: ConnectionStatus,
    pub transfer: Option<TransferState>,
    pub file_name: Option<String>,
    pub bytes_received: u64,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            scheme: None,
            status: ConnectionStatus::Connected,
            transfer: None,
            file_name: None,
            bytes_received: 0,
            connected_at: Utc::now(),
        }
    }
}

fn serialize_scheme<S>(scheme: &Option<SchemeKind>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match scheme {
        Some(kind) => serializer.serialize_some(kind.name()),
        None => serializer.serialize_none(),
    }
}

// ── HTTP Responses ────────────────────────────────────────────────────────────

/// `/stats` body.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub active_connections: usize,
    pub total_accepted: u64,
    pub total_authenticated: u64,
    pub total_files_received: u64,
    pub connections: Vec<ConnectionInfo>,
}
