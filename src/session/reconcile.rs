//! Builds the statements that bring a backend session in line with the
//! client's mirrored session state.

use super::{
    SessionVariables, Value, SESSION_TRACK_GTIDS, SESSION_TRACK_STATE_CHANGE,
    SESSION_TRACK_SYSTEM_VARIABLES, SESSION_TRACK_TRANSACTION_INFO, STATEMENT_ID,
    SYS_VAR_FETCH_TARGETS,
};

/// Session-tracker variables appended when sharing needs them, with their
/// wire-observable defaults.
const SESSION_TRACKER_DEFAULTS: [(&str, &str); 3] = [
    (SESSION_TRACK_GTIDS, "OWN_GTID"),
    (SESSION_TRACK_TRANSACTION_INFO, "CHARACTERISTICS"),
    (SESSION_TRACK_STATE_CHANGE, "ON"),
];

fn push_assignment(stmt: &mut String, name: &str, literal: &str) {
    if stmt.is_empty() {
        stmt.push_str("SET ");
    } else {
        stmt.push_str(",\n    ");
    }
    stmt.push_str("@@SESSION.");
    stmt.push_str(name);
    stmt.push_str(" = ");
    stmt.push_str(literal);
}

/// Assemble the `SET @@SESSION.* = ...` batch statement.
///
/// When `need_session_trackers` is set, `session_track_system_variables` is
/// forced (to its stored value, or `'*'`) and leads the statement; the other
/// tracker variables are appended with their defaults unless the client
/// already set them. A stored `session_track_system_variables` is re-emitted
/// first even when the trackers are not needed, mirroring client intent.
///
/// Returns an empty string when there is nothing to set.
pub fn set_session_vars_stmt(vars: &SessionVariables, need_session_trackers: bool) -> String {
    let mut stmt = String::new();

    if need_session_trackers {
        let literal = match vars.get(SESSION_TRACK_SYSTEM_VARIABLES) {
            Some(value) => value.sql_literal(),
            None => Value::text("*").sql_literal(),
        };
        push_assignment(&mut stmt, SESSION_TRACK_SYSTEM_VARIABLES, &literal);
    } else if let Some(value) = vars.get(SESSION_TRACK_SYSTEM_VARIABLES) {
        if !value.is_null() {
            push_assignment(&mut stmt, SESSION_TRACK_SYSTEM_VARIABLES, &value.sql_literal());
        }
    }

    for (name, value) in vars.iter() {
        // session_track_system_variables is already leading the statement;
        // statement_id is read-only on the server side.
        if name == SESSION_TRACK_SYSTEM_VARIABLES || name == STATEMENT_ID {
            continue;
        }
        push_assignment(&mut stmt, name, &value.sql_literal());
    }

    if need_session_trackers {
        for (name, default) in SESSION_TRACKER_DEFAULTS {
            if !vars.contains(name) {
                push_assignment(&mut stmt, name, &Value::text(default).sql_literal());
            }
        }
    }

    stmt
}

/// Compose the query that captures the backend's values for the fetch
/// targets absent from the store. `None` when nothing is missing.
pub fn fetch_sys_vars_stmt(vars: &SessionVariables) -> Option<String> {
    let selects: Vec<String> = SYS_VAR_FETCH_TARGETS
        .iter()
        .filter(|name| !vars.contains(name))
        .map(|name| {
            format!(
                "SELECT {}, @@SESSION.{}",
                Value::text(*name).sql_literal(),
                quote_identifier(name)
            )
        })
        .collect();

    if selects.is_empty() {
        None
    } else {
        Some(selects.join(" UNION "))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Split a possibly multi-statement script on the first `;`. The head is
/// returned for execution; the remainder loses one leading space.
pub fn split_first_stmt(script: &str) -> (String, String) {
    match script.find(';') {
        Some(pos) => {
            let rest = &script[pos + 1..];
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            (script[..pos].to_string(), rest.to_string())
        }
        None => (script.to_string(), String::new()),
    }
}

/// The statement that makes a read-only backend wait until the client's own
/// writes are visible. A zero timeout turns the wait into a single probe.
pub fn gtid_wait_stmt(gtid_set: &str, timeout_secs: u64) -> String {
    let gtid = Value::text(gtid_set).sql_literal();
    if timeout_secs == 0 {
        format!("SELECT GTID_SUBSET({gtid}, @@GLOBAL.gtid_executed)")
    } else {
        format!("SELECT NOT WAIT_FOR_EXECUTED_GTID_SET({gtid}, {timeout_secs})")
    }
}
