//! Server-side (backend) protocol view.

use std::collections::BTreeMap;

use crate::messages::constants::{CLIENT_MULTI_STATEMENTS, SEQ_ID_RESET, SERVER_STATUS_AUTOCOMMIT};

/// The initial server-to-client handshake data kept on a cached backend.
/// Its presence means the socket completed a handshake before and can be
/// reused without a fresh greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGreeting {
    pub version: String,
    pub connection_id: u32,
    pub capabilities: u32,
    pub collation: u8,
    pub status_flags: u16,
}

/// The router's view of the backend side of the splice.
#[derive(Debug)]
pub struct ServerChannel {
    /// Whether the backend socket is currently open.
    pub open: bool,

    pub greeting: Option<ServerGreeting>,

    /// User the backend session is authenticated as.
    pub username: String,

    /// Schema currently selected on the backend. Empty when none.
    pub schema: String,

    /// Connection attributes sent to the backend at handshake.
    pub sent_attributes: BTreeMap<String, String>,

    pub capabilities: u32,

    /// Status flags from the last OK/EOF the backend sent.
    pub status_flags: u16,

    pub seq_id: u8,
}

impl ServerChannel {
    pub fn new() -> ServerChannel {
        ServerChannel {
            open: false,
            greeting: None,
            username: String::new(),
            schema: String::new(),
            sent_attributes: BTreeMap::new(),
            capabilities: 0,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            seq_id: 0,
        }
    }

    #[inline(always)]
    pub fn multi_statements(&self) -> bool {
        self.capabilities & CLIENT_MULTI_STATEMENTS != 0
    }

    /// Reset the packet sequence so the next command starts clean.
    #[inline(always)]
    pub fn reset_seq_id(&mut self) {
        self.seq_id = SEQ_ID_RESET;
    }
}

impl Default for ServerChannel {
    fn default() -> Self {
        Self::new()
    }
}
