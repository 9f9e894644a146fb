//! The client session state mirrored by the router.
//!
//! The router tracks every session variable the client is known to have set
//! (fed by the server's session trackers) so that a freshly acquired backend
//! can be brought to an observationally equivalent state.

use std::collections::BTreeMap;
use std::fmt;

pub mod reconcile;

/// Read-only variable that must never be emitted in a `SET`.
pub const STATEMENT_ID: &str = "statement_id";

/// System variables fetched from the backend when absent from the store,
/// tried in this order.
pub const SYS_VAR_FETCH_TARGETS: [&str; 3] =
    ["collation_connection", "character_set_client", "sql_mode"];

pub const SESSION_TRACK_SYSTEM_VARIABLES: &str = "session_track_system_variables";
pub const SESSION_TRACK_GTIDS: &str = "session_track_gtids";
pub const SESSION_TRACK_TRANSACTION_INFO: &str = "session_track_transaction_info";
pub const SESSION_TRACK_STATE_CHANGE: &str = "session_track_state_change";

/// A session-variable value: SQL NULL or a textual value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Text(String),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Value {
        Value::Text(value.into())
    }

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL literal form: `NULL`, or the text single-quoted with `'` and `\`
    /// escaped.
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Text(text) => {
                let mut quoted = String::with_capacity(text.len() + 2);
                quoted.push('\'');
                for ch in text.chars() {
                    match ch {
                        '\'' => quoted.push_str("''"),
                        '\\' => quoted.push_str("\\\\"),
                        _ => quoted.push(ch),
                    }
                }
                quoted.push('\'');
                quoted
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(text) => f.write_str(text),
        }
    }
}

/// Session variables by name. Iteration is sorted by name so emitted
/// statements and trace output are stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionVariables {
    vars: BTreeMap<String, Value>,
}

impl SessionVariables {
    pub fn new() -> SessionVariables {
        SessionVariables::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}

/// Per-session execution state shared between the splice and the connector.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub system_variables: SessionVariables,

    /// Opaque statement sequence that rebuilds the transaction's isolation,
    /// access mode and start state, as reported by the session tracker.
    pub trx_characteristics: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_literal_quotes_and_escapes() {
        assert_eq!(Value::Null.sql_literal(), "NULL");
        assert_eq!(Value::text("*").sql_literal(), "'*'");
        assert_eq!(Value::text("+00:00").sql_literal(), "'+00:00'");
        assert_eq!(Value::text("it's").sql_literal(), "'it''s'");
        assert_eq!(Value::text("a\\b").sql_literal(), "'a\\\\b'");
    }

    #[test]
    fn iteration_is_sorted_by_name() {
        let mut vars = SessionVariables::new();
        vars.set("time_zone", Value::text("+00:00"));
        vars.set("sql_mode", Value::text("STRICT_ALL_TABLES"));
        vars.set("autocommit", Value::text("1"));

        let names: Vec<&str> = vars.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["autocommit", "sql_mode", "time_zone"]);
    }

    #[test]
    fn set_overwrites() {
        let mut vars = SessionVariables::new();
        vars.set("sql_mode", Value::text("ANSI"));
        vars.set("sql_mode", Value::Null);
        assert_eq!(vars.get("sql_mode"), Some(&Value::Null));
        assert_eq!(vars.len(), 1);
    }
}
