//! Result-stream handlers.
//!
//! Every query the connector dispatches names one of three handlers. The
//! handler consumes the stream events `{on_column_count, on_column, on_row,
//! on_row_end, on_ok, on_error}` in arrival order; `on_ok`, `on_error` and
//! `on_row_end` are terminal for the query.

use log::warn;
use smallvec::SmallVec;

use crate::messages::MysqlError;
use crate::session::Value;

/// Which handler consumes a query's result stream.
#[derive(Debug)]
pub enum QueryHandler {
    /// Success-or-log: a server error fails the connector with that error.
    FailedQuery { stmt: String },

    /// Expect exactly one row with exactly one textual `"1"`. Any other
    /// value fails with the caller-supplied sentinel.
    IsTrue { sentinel: MysqlError },

    /// Capture `(name, value)` rows for the session-variable store.
    CaptureSysVars,
}

/// Terminal state of a completed stream, folded into connector and
/// connection state when the suspended connector resumes.
#[derive(Debug, PartialEq)]
pub enum HandlerOutcome {
    Ok,
    Failed(MysqlError),
    /// Pairs to commit into the session-variable store, in arrival order.
    Captured(Vec<(String, Value)>),
    /// Capture anomaly: commit nothing, disable sharing, carry on.
    SharingDisabled,
}

/// Streaming state for one query.
#[derive(Debug)]
pub struct ResultSink {
    handler: QueryHandler,
    rows: u64,
    failure: Option<MysqlError>,
    anomaly: bool,
    captured: SmallVec<[(String, Value); 4]>,
    terminated: bool,
}

impl ResultSink {
    pub fn new(handler: QueryHandler) -> ResultSink {
        ResultSink {
            handler,
            rows: 0,
            failure: None,
            anomaly: false,
            captured: SmallVec::new(),
            terminated: false,
        }
    }

    pub fn on_column_count(&mut self, count: u64) {
        match &self.handler {
            QueryHandler::IsTrue { .. } if count != 1 => {
                self.fail(MysqlError::new(0, "Too many columns", "HY000"));
            }
            QueryHandler::CaptureSysVars if count != 2 => self.anomaly = true,
            _ => {}
        }
    }

    pub fn on_column(&mut self, _name: &str) {}

    pub fn on_row(&mut self, row: &[Option<String>]) {
        self.rows += 1;
        match &self.handler {
            QueryHandler::FailedQuery { .. } => {}
            QueryHandler::IsTrue { sentinel } => {
                if self.failure.is_some() {
                    return;
                }
                match row.first() {
                    None => self.fail(MysqlError::new(0, "No fields", "HY000")),
                    Some(None) => {
                        self.fail(MysqlError::new(0, "Expected integer, got NULL", "HY000"))
                    }
                    Some(Some(field)) if field == "1" => {}
                    Some(Some(_)) => {
                        let sentinel = sentinel.clone();
                        self.fail(sentinel);
                    }
                }
            }
            QueryHandler::CaptureSysVars => {
                if self.anomaly {
                    return;
                }
                if row.len() != 2 {
                    self.anomaly = true;
                    return;
                }
                match (&row[0], &row[1]) {
                    (None, _) => self.anomaly = true,
                    (Some(name), value) => {
                        let value = match value {
                            None => Value::Null,
                            Some(text) => Value::text(text.clone()),
                        };
                        self.captured.push((name.clone(), value));
                    }
                }
            }
        }
    }

    pub fn on_row_end(&mut self) {
        self.terminated = true;
        if let QueryHandler::IsTrue { .. } = &self.handler {
            if self.failure.is_none() && self.rows != 1 {
                self.fail(MysqlError::new(0, "Too many rows", "HY000"));
            }
        }
    }

    pub fn on_ok(&mut self) {
        if self.terminated {
            // OK trailing a finished result set carries nothing new.
            return;
        }
        self.terminated = true;
        match &self.handler {
            QueryHandler::FailedQuery { .. } => {}
            QueryHandler::IsTrue { .. } => {
                if self.failure.is_none() && self.rows != 1 {
                    self.fail(MysqlError::new(0, "Too many rows", "HY000"));
                }
            }
            // An OK where a result set was expected.
            QueryHandler::CaptureSysVars => self.anomaly = true,
        }
    }

    pub fn on_error(&mut self, err: MysqlError) {
        self.terminated = true;
        match &self.handler {
            QueryHandler::FailedQuery { stmt } => {
                warn!("Query {stmt:?} failed: {err}");
                self.fail(err);
            }
            QueryHandler::IsTrue { .. } => self.fail(err),
            QueryHandler::CaptureSysVars => self.anomaly = true,
        }
    }

    fn fail(&mut self, err: MysqlError) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    /// Fold the terminal state into an outcome for the connector.
    pub fn finish(self) -> HandlerOutcome {
        if let Some(err) = self.failure {
            return HandlerOutcome::Failed(err);
        }
        match self.handler {
            QueryHandler::FailedQuery { .. } | QueryHandler::IsTrue { .. } => HandlerOutcome::Ok,
            QueryHandler::CaptureSysVars => {
                if self.anomaly {
                    HandlerOutcome::SharingDisabled
                } else {
                    HandlerOutcome::Captured(self.captured.into_vec())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinel() -> MysqlError {
        MysqlError::new(0, "wait_for_my_writes timed out", "HY000")
    }

    fn is_true_single_cell(cell: Option<&str>) -> HandlerOutcome {
        let mut sink = ResultSink::new(QueryHandler::IsTrue {
            sentinel: sentinel(),
        });
        sink.on_column_count(1);
        sink.on_row(&[cell.map(str::to_string)]);
        sink.on_row_end();
        sink.finish()
    }

    #[test]
    fn is_true_accepts_exactly_textual_one() {
        assert_eq!(is_true_single_cell(Some("1")), HandlerOutcome::Ok);
        assert_eq!(
            is_true_single_cell(Some("0")),
            HandlerOutcome::Failed(sentinel())
        );
        assert_eq!(
            is_true_single_cell(Some("2")),
            HandlerOutcome::Failed(sentinel())
        );
        assert_eq!(
            is_true_single_cell(Some("")),
            HandlerOutcome::Failed(sentinel())
        );
        assert_eq!(
            is_true_single_cell(None),
            HandlerOutcome::Failed(MysqlError::new(0, "Expected integer, got NULL", "HY000"))
        );
    }

    #[test]
    fn is_true_rejects_wrong_shapes() {
        let mut sink = ResultSink::new(QueryHandler::IsTrue {
            sentinel: sentinel(),
        });
        sink.on_column_count(2);
        assert_eq!(
            sink.finish(),
            HandlerOutcome::Failed(MysqlError::new(0, "Too many columns", "HY000"))
        );

        let mut sink = ResultSink::new(QueryHandler::IsTrue {
            sentinel: sentinel(),
        });
        sink.on_column_count(1);
        sink.on_row(&[]);
        assert_eq!(
            sink.finish(),
            HandlerOutcome::Failed(MysqlError::new(0, "No fields", "HY000"))
        );

        let mut sink = ResultSink::new(QueryHandler::IsTrue {
            sentinel: sentinel(),
        });
        sink.on_column_count(1);
        sink.on_row(&[Some("1".to_string())]);
        sink.on_row(&[Some("1".to_string())]);
        sink.on_row_end();
        assert_eq!(
            sink.finish(),
            HandlerOutcome::Failed(MysqlError::new(0, "Too many rows", "HY000"))
        );

        let mut sink = ResultSink::new(QueryHandler::IsTrue {
            sentinel: sentinel(),
        });
        sink.on_column_count(1);
        sink.on_row_end();
        assert_eq!(
            sink.finish(),
            HandlerOutcome::Failed(MysqlError::new(0, "Too many rows", "HY000"))
        );
    }

    #[test]
    fn is_true_first_failure_wins() {
        let mut sink = ResultSink::new(QueryHandler::IsTrue {
            sentinel: sentinel(),
        });
        sink.on_column_count(1);
        sink.on_row(&[Some("0".to_string())]);
        sink.on_row(&[Some("0".to_string())]);
        sink.on_row_end();
        assert_eq!(sink.finish(), HandlerOutcome::Failed(sentinel()));
    }

    #[test]
    fn is_true_propagates_server_errors() {
        let mut sink = ResultSink::new(QueryHandler::IsTrue {
            sentinel: sentinel(),
        });
        let err = MysqlError::new(1146, "Table doesn't exist", "42S02");
        sink.on_error(err.clone());
        assert_eq!(sink.finish(), HandlerOutcome::Failed(err));
    }

    #[test]
    fn failed_query_is_quiet_on_success() {
        let mut sink = ResultSink::new(QueryHandler::FailedQuery {
            stmt: "SET @@SESSION.sql_mode = ''".to_string(),
        });
        sink.on_ok();
        assert_eq!(sink.finish(), HandlerOutcome::Ok);

        let mut sink = ResultSink::new(QueryHandler::FailedQuery {
            stmt: "SET x".to_string(),
        });
        let err = MysqlError::new(1064, "syntax error", "42000");
        sink.on_error(err.clone());
        assert_eq!(sink.finish(), HandlerOutcome::Failed(err));
    }

    #[test]
    fn capture_commits_pairs_in_arrival_order() {
        let mut sink = ResultSink::new(QueryHandler::CaptureSysVars);
        sink.on_column_count(2);
        sink.on_row(&[
            Some("collation_connection".to_string()),
            Some("utf8mb4_general_ci".to_string()),
        ]);
        sink.on_row(&[Some("sql_mode".to_string()), None]);
        sink.on_row_end();

        assert_eq!(
            sink.finish(),
            HandlerOutcome::Captured(vec![
                (
                    "collation_connection".to_string(),
                    Value::text("utf8mb4_general_ci")
                ),
                ("sql_mode".to_string(), Value::Null),
            ])
        );
    }

    #[test]
    fn capture_anomalies_disable_sharing() {
        // Wrong column count.
        let mut sink = ResultSink::new(QueryHandler::CaptureSysVars);
        sink.on_column_count(3);
        sink.on_row(&[Some("a".into()), Some("b".into()), Some("c".into())]);
        sink.on_row_end();
        assert_eq!(sink.finish(), HandlerOutcome::SharingDisabled);

        // NULL key.
        let mut sink = ResultSink::new(QueryHandler::CaptureSysVars);
        sink.on_column_count(2);
        sink.on_row(&[None, Some("b".into())]);
        sink.on_row_end();
        assert_eq!(sink.finish(), HandlerOutcome::SharingDisabled);

        // OK instead of a result set.
        let mut sink = ResultSink::new(QueryHandler::CaptureSysVars);
        sink.on_ok();
        assert_eq!(sink.finish(), HandlerOutcome::SharingDisabled);

        // Server error: not fatal, just stop sharing.
        let mut sink = ResultSink::new(QueryHandler::CaptureSysVars);
        sink.on_column_count(2);
        sink.on_error(MysqlError::new(1064, "syntax error", "42000"));
        assert_eq!(sink.finish(), HandlerOutcome::SharingDisabled);
    }

    #[test]
    fn capture_does_not_commit_partial_state() {
        let mut sink = ResultSink::new(QueryHandler::CaptureSysVars);
        sink.on_column_count(2);
        sink.on_row(&[Some("sql_mode".into()), Some("ANSI".into())]);
        sink.on_row(&[Some("orphan".into())]);
        sink.on_row_end();
        assert_eq!(sink.finish(), HandlerOutcome::SharingDisabled);
    }
}
