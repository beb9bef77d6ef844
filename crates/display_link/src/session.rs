//! Estado da sessão com o periférico.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Estado do link serial.
///
/// ```text
/// Disconnected → Connecting → AwaitingHandshake → Ready
///      ↑              │                             │
///      └──────────────┴──── erro / porta fechada ───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Ready,
}

/// Sessão mutável, escrita só pelo [`LinkManager`](crate::LinkManager).
#[derive(Debug, Clone)]
pub(crate) struct LinkSession {
    pub state: LinkState,
    pub connected: bool,
    pub peripheral_ready: bool,
    pub port_name: Option<String>,
    pub device_ref: Option<i64>,
    pub last_heartbeat: DateTime<Utc>,
    /// Falso após `disconnect()` explícito: o loop não reconecta.
    pub auto_reconnect: bool,
}

impl LinkSession {
    pub fn new() -> Self {
        Self {
            state: LinkState::Disconnected,
            connected: false,
            peripheral_ready: false,
            port_name: None,
            device_ref: None,
            last_heartbeat: Utc::now(),
            auto_reconnect: false,
        }
    }

    pub fn mark_disconnected(&mut self) {
        self.state = LinkState::Disconnected;
        self.connected = false;
        self.peripheral_ready = false;
    }

    pub fn snapshot(&self, baud_rate: u32) -> LinkStatus {
        LinkStatus {
            connected: self.connected,
            state: self.state,
            peripheral_ready: self.peripheral_ready,
            port: self.port_name.clone(),
            device_ref: self.device_ref,
            baud_rate,
            last_heartbeat: self.last_heartbeat,
        }
    }
}

/// Snapshot do link para consulta externa.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub state: LinkState,
    pub peripheral_ready: bool,
    pub port: Option<String>,
    pub device_ref: Option<i64>,
    pub baud_rate: u32,
    pub last_heartbeat: DateTime<Utc>,
}
