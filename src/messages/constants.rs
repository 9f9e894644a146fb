//! MySQL protocol constants used by the preparation core.
//!
//! Only the subset the core decides on is defined here; the full capability
//! and status vocabulary lives in the codec.

/// Capability flags (client/server handshake bitmask).
pub const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
pub const CLIENT_SSL: u32 = 0x0000_0800;
pub const CLIENT_MULTI_STATEMENTS: u32 = 0x0001_0000;
pub const CLIENT_MULTI_RESULTS: u32 = 0x0002_0000;
pub const CLIENT_CONNECT_ATTRS: u32 = 0x0010_0000;
pub const CLIENT_SESSION_TRACK: u32 = 0x0080_0000;

/// Status flags reported by the server in OK/EOF packets.
pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

/// OK packet marker byte.
pub const OK_PACKET_HEADER: u8 = 0x00;

/// Sequence-id sentinel meaning "no prior packet": the next command starts
/// a fresh sequence.
pub const SEQ_ID_RESET: u8 = 0xFF;

/// `COM_SET_OPTION` arguments.
pub const MYSQL_OPTION_MULTI_STATEMENTS_ON: u16 = 0;
pub const MYSQL_OPTION_MULTI_STATEMENTS_OFF: u16 = 1;

/// Client-side error codes (CR_*) raised for network-level failures.
pub const CR_CONNECTION_ERROR: u16 = 2002;
pub const CR_CONN_HOST_ERROR: u16 = 2003;
pub const CR_SERVER_GONE_ERROR: u16 = 2006;
pub const CR_SERVER_LOST: u16 = 2013;

/// Server-side error codes observed during the early handshake.
pub const ER_CON_COUNT_ERROR: u16 = 1040;
pub const ER_ACCESS_DENIED_ERROR: u16 = 1045;
pub const ER_SERVER_SHUTDOWN: u16 = 1053;
