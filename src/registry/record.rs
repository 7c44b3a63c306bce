// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque connection identifier derived from the address and creation time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn derive(address: &str, created_at: DateTime<Utc>) -> Self {
        ConnectionId(format!("{}#{}", address, created_at.timestamp_micros()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        ConnectionId(s.to_string())
    }
}

/// Per-record lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Reconnecting,
}

impl ConnectionStatus {
    /// A handshake is outstanding
    pub fn is_in_flight(self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Reconnecting)
    }

    /// Eligible for an automatic reconnect attempt
    pub fn is_retryable(self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Snapshot of one logical connection.
///
/// Records are owned by the registry; callers receive clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub address: String,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub auto_reconnect: bool,
    /// Set by an explicit `close`; suppresses automatic reconnects until the
    /// caller reconnects the record again.
    pub closed_by_caller: bool,
}

impl ConnectionRecord {
    pub(crate) fn new(address: String, auto_reconnect: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: ConnectionId::derive(&address, now),
            address,
            status: ConnectionStatus::Connecting,
            last_error: None,
            created_at: now,
            connected_at: None,
            last_attempt_at: Some(now),
            attempt_count: 1,
            auto_reconnect,
            closed_by_caller: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
