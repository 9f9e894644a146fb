//! Wire-level error value.

use super::constants::ER_ACCESS_DENIED_ERROR;

/// An error as carried by the protocol: numeric code, human-readable message
/// and a five-character SQLSTATE.
///
/// This is a plain value, not an unwinding error: the connector stores at
/// most one of these and reports it through its error callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ERROR {code} ({sqlstate}): {message}")]
pub struct MysqlError {
    pub code: u16,
    pub message: String,
    pub sqlstate: String,
}

impl MysqlError {
    pub fn new(code: u16, message: impl Into<String>, sqlstate: &str) -> MysqlError {
        debug_assert_eq!(sqlstate.len(), 5, "SQLSTATE must be five characters");
        MysqlError {
            code,
            message: message.into(),
            sqlstate: sqlstate.to_string(),
        }
    }

    /// The authentication failure reported when required connection
    /// attributes are missing or not met.
    pub fn access_denied() -> MysqlError {
        MysqlError::new(ER_ACCESS_DENIED_ERROR, "Access denied", "28000")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_sqlstate() {
        let err = MysqlError::new(1064, "You have an error in your SQL syntax", "42000");
        assert_eq!(
            err.to_string(),
            "ERROR 1064 (42000): You have an error in your SQL syntax"
        );
    }

    #[test]
    fn access_denied_is_1045() {
        let err = MysqlError::access_denied();
        assert_eq!(err.code, 1045);
        assert_eq!(err.sqlstate, "28000");
    }
}
