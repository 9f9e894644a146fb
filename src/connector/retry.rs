//! Transient-error classification for connect retries.

use crate::messages::constants::{
    CR_CONNECTION_ERROR, CR_CONN_HOST_ERROR, CR_SERVER_GONE_ERROR, CR_SERVER_LOST,
    ER_CON_COUNT_ERROR, ER_SERVER_SHUTDOWN,
};
use crate::messages::MysqlError;

/// Classifier deciding whether a connect/handshake error is worth retrying.
pub type TransientClassifier = fn(&MysqlError) -> bool;

/// Default classification: network-level failures and early-handshake
/// conditions that resolve on their own.
pub fn connect_error_is_transient(err: &MysqlError) -> bool {
    matches!(
        err.code,
        CR_CONNECTION_ERROR
            | CR_CONN_HOST_ERROR
            | CR_SERVER_GONE_ERROR
            | CR_SERVER_LOST
            | ER_CON_COUNT_ERROR
            | ER_SERVER_SHUTDOWN
    )
}
