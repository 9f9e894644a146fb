//! Lazy preparation of a backend connection.
//!
//! When a client command needs a backend, this processor makes the backend
//! session observationally equivalent to the client's: authenticated as the
//! same user, same default schema, matching session variables, protocol
//! options, transaction characteristics and replication visibility.
//!
//! The connector is a cooperatively scheduled state machine. Each
//! `process()` step either finishes a stage and asks to be re-entered
//! (`Again`), pushes a sub-processor or arms the retry timer and waits for
//! its completion (`Suspend`), asks the caller to flush bytes queued for the
//! client (`SendToClient`), or pops itself (`Done`). Sub-processors run to
//! completion before the next stage observes their effect.

pub mod handlers;
pub mod retry;
pub mod runtime;
pub mod subprocess;


use log::{debug, info, warn};
use tokio::time::Instant;

use crate::connection::{Connection, ServerMode};
use crate::errors::Error;
use crate::messages::{ok_packet, MysqlError};
use crate::session::{reconcile, STATEMENT_ID};
use crate::trace::{self, SpanHandle, SpanStatus};

use handlers::{HandlerOutcome, QueryHandler};
use retry::{connect_error_is_transient, TransientClassifier};
use subprocess::{Completion, ServerOption, SubProcessorRequest};

/// What the caller must do after a `process()` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// Re-enter immediately.
    Again,
    /// Wait for an asynchronous completion (sub-processor or timer).
    Suspend,
    /// Flush bytes queued for the client before re-entering.
    SendToClient,
    /// Pop this processor; the preparation is finished.
    Done,
}

/// A cooperatively scheduled processor.
pub trait Processor {
    fn process(&mut self, conn: &mut Connection) -> Result<Processed, Error>;
}

/// Stages of the preparation flow. The `*Done` stages exist to receive a
/// sub-processor completion; stages whose work turns out unnecessary are
/// skipped outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Connect,
    Connected,
    Authenticated,
    SetVars,
    SetVarsDone,
    SetServerOption,
    SetServerOptionDone,
    FetchSysVars,
    FetchSysVarsDone,
    SetSchema,
    SetSchemaDone,
    WaitGtidExecuted,
    WaitGtidExecutedDone,
    SetTrxCharacteristics,
    SetTrxCharacteristicsDone,
    FetchUserAttrs,
    FetchUserAttrsDone,
    SendAuthOk,
    PoolOrClose,
    FallbackToWrite,
    Done,
}

/// Which handshake flavor `Connected` picked, so its completion can be
/// interpreted when the machine resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeKind {
    ResetConnection,
    ChangeUser,
    Greeting,
}

type OnError = Box<dyn FnOnce(&MysqlError) + Send>;

/// The lazy connector.
pub struct LazyConnector {
    stage: Stage,

    /// Whether preparation runs inside the initial client handshake (the
    /// client still waits for its authentication OK).
    in_handshake: bool,

    started: Instant,

    /// Transaction characteristics captured before the `SET` stages
    /// re-target the backend's session trackers.
    trx_stmt: String,

    handshake: Option<HandshakeKind>,
    retry_pending: bool,
    already_fallback: bool,
    failure: Option<MysqlError>,
    is_transient: TransientClassifier,
    on_error: Option<OnError>,
    finished: bool,

    connect_span: Option<SpanHandle>,
    stage_span: Option<SpanHandle>,
}

impl LazyConnector {
    pub fn new(in_handshake: bool, on_error: impl FnOnce(&MysqlError) + Send + 'static) -> Self {
        LazyConnector {
            stage: Stage::Connect,
            in_handshake,
            started: Instant::now(),
            trx_stmt: String::new(),
            handshake: None,
            retry_pending: false,
            already_fallback: false,
            failure: None,
            is_transient: connect_error_is_transient,
            on_error: Some(Box::new(on_error)),
            finished: false,
            connect_span: None,
            stage_span: None,
        }
    }

    /// Replace the transient-error classifier.
    pub fn with_transient_classifier(mut self, classifier: TransientClassifier) -> Self {
        self.is_transient = classifier;
        self
    }

    /// The failure recorded on the connector, if any.
    pub fn failure(&self) -> Option<&MysqlError> {
        self.failure.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.finished
    }

    /// Whether the read-only to read-write fallback was taken.
    pub fn fell_back(&self) -> bool {
        self.already_fallback
    }

    fn failed(&mut self, err: MysqlError) {
        self.failure = Some(err);
    }

    fn open_stage_span(&mut self, name: &'static str) {
        self.stage_span = Some(trace::trace_span(self.connect_span.as_ref(), name));
    }

    fn end_stage_span(&mut self, status: SpanStatus) {
        if let Some(span) = self.stage_span.take() {
            trace::trace_span_end(span, Some(status));
        }
    }

    fn advance_or_fail(&mut self, next: Stage) -> Result<Processed, Error> {
        self.stage = if self.failure.is_some() {
            Stage::Done
        } else {
            next
        };
        Ok(Processed::Again)
    }

    /// Consume a plain sub-processor completion; a failure is recorded on
    /// the connector.
    fn consume_sub_processor(
        &mut self,
        conn: &mut Connection,
        stage: &'static str,
    ) -> Result<(), Error> {
        match conn.take_completion() {
            Some(Completion::SubProcessor(Ok(()))) => {
                self.end_stage_span(SpanStatus::Ok);
                Ok(())
            }
            Some(Completion::SubProcessor(Err(err))) => {
                self.end_stage_span(SpanStatus::Error);
                self.failed(err);
                Ok(())
            }
            None => Err(Error::MissingCompletion { stage }),
            Some(_) => Err(Error::UnexpectedCompletion { stage }),
        }
    }

    /// Consume a query completion and fold the handler outcome into the
    /// connector and connection state.
    fn consume_query(&mut self, conn: &mut Connection, stage: &'static str) -> Result<(), Error> {
        match conn.take_completion() {
            Some(Completion::Query(outcome)) => {
                match outcome {
                    HandlerOutcome::Ok => self.end_stage_span(SpanStatus::Ok),
                    HandlerOutcome::Failed(err) => {
                        self.end_stage_span(SpanStatus::Error);
                        self.failed(err);
                    }
                    HandlerOutcome::Captured(pairs) => {
                        self.end_stage_span(SpanStatus::Ok);
                        for (name, value) in pairs {
                            conn.session.system_variables.set(name, value);
                        }
                    }
                    HandlerOutcome::SharingDisabled => {
                        self.end_stage_span(SpanStatus::Error);
                        warn!(
                            "Unexpected result while capturing session variables, \
                             disabling connection sharing"
                        );
                        conn.some_state_changed = true;
                    }
                }
                Ok(())
            }
            None => Err(Error::MissingCompletion { stage }),
            Some(_) => Err(Error::UnexpectedCompletion { stage }),
        }
    }

    fn connect(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if self.connect_span.is_none() {
            self.connect_span = Some(trace::trace_span(None, "mysql/connect"));
        }

        if conn.server_socket_open() {
            // Backend is already prepared for this session.
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        }

        self.open_stage_span("connect");
        conn.push_sub_processor(SubProcessorRequest::Connect);
        self.stage = Stage::Connected;
        Ok(Processed::Suspend)
    }

    fn connected(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if let Some(completion) = conn.take_completion() {
            match completion {
                Completion::SubProcessor(Ok(())) => self.end_stage_span(SpanStatus::Ok),
                Completion::SubProcessor(Err(err)) => {
                    self.end_stage_span(SpanStatus::Error);
                    self.failed(err);
                }
                _ => return Err(Error::UnexpectedCompletion { stage: "connected" }),
            }
        }

        if !conn.server_socket_open() {
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        }

        // The SET stages below re-target the backend's session trackers;
        // keep the transaction characteristics as they are right now.
        self.trx_stmt = conn.session.trx_characteristics.clone();

        let Some(server) = conn.server.as_ref() else {
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        };
        let has_greeting = server.greeting.is_some();
        let username_differs = server.username != conn.client.username;
        let attributes_differ = server.sent_attributes != conn.client.sent_attributes;
        let needs_full_handshake =
            !has_greeting || self.in_handshake || username_differs || attributes_differ;

        if let Some(span) = &self.connect_span {
            span.attr("mysql.remote.needs_full_handshake", needs_full_handshake);
            span.attr("mysql.remote.username_differs", username_differs);
            span.attr(
                "mysql.remote.connection_attributes_differ",
                attributes_differ,
            );
        }

        if !needs_full_handshake {
            // Same identity on a warm socket: a session reset is enough. A
            // schema mismatch is tolerated here; SetSchema fixes it later.
            self.handshake = Some(HandshakeKind::ResetConnection);
            self.open_stage_span("reset_connection");
            conn.push_sub_processor(SubProcessorRequest::ResetConnection);
            conn.authenticated = true;
        } else if has_greeting {
            self.handshake = Some(HandshakeKind::ChangeUser);
            self.open_stage_span("change_user");
            conn.push_sub_processor(SubProcessorRequest::ChangeUser {
                in_handshake: self.in_handshake,
            });
        } else {
            self.handshake = Some(HandshakeKind::Greeting);
            self.open_stage_span("greeting");
            conn.push_sub_processor(SubProcessorRequest::ServerGreeting {
                in_handshake: self.in_handshake,
            });
        }

        self.stage = Stage::Authenticated;
        Ok(Processed::Suspend)
    }

    fn on_handshake_error(&mut self, conn: &Connection, err: MysqlError) {
        if self.handshake == Some(HandshakeKind::Greeting)
            && (self.is_transient)(&err)
            && (conn.client.password.is_some() || !conn.server_greeting_stored())
            && Instant::now() < self.started + conn.options.connect_retry_timeout
        {
            debug!("Transient error while connecting to the backend: {err}");
            self.retry_pending = true;
            return;
        }
        self.failed(err);
    }

    fn authenticated(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if let Some(completion) = conn.take_completion() {
            match completion {
                Completion::SubProcessor(Ok(())) => self.end_stage_span(SpanStatus::Ok),
                Completion::SubProcessor(Err(err)) => {
                    self.end_stage_span(SpanStatus::Error);
                    self.on_handshake_error(conn, err);
                }
                _ => {
                    return Err(Error::UnexpectedCompletion {
                        stage: "authenticated",
                    })
                }
            }
        }
        self.handshake = None;

        if self.failure.is_some() {
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        }

        if !conn.authenticated || !conn.server_socket_open() {
            if self.retry_pending {
                self.retry_pending = false;
                debug!(
                    "Retrying backend connect in {:?}",
                    conn.options.connect_retry_interval
                );
                conn.request_wakeup(conn.options.connect_retry_interval);
                self.stage = Stage::Connect;
                return Ok(Processed::Suspend);
            }
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        }

        self.stage = Stage::SetVars;
        Ok(Processed::Again)
    }

    fn set_vars(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        let need_session_trackers = conn.options.connection_sharing && conn.greeting_from_router;
        let stmt = reconcile::set_session_vars_stmt(
            &conn.session.system_variables,
            need_session_trackers,
        );
        if stmt.is_empty() {
            self.stage = Stage::SetServerOption;
            return Ok(Processed::Again);
        }

        if let Some(span) = &self.connect_span {
            for (name, value) in conn.session.system_variables.iter() {
                if name == STATEMENT_ID {
                    continue;
                }
                span.attr(&format!("mysql.session.@@SESSION.{name}"), value);
            }
        }

        self.open_stage_span("set_var");
        conn.push_sub_processor(SubProcessorRequest::Query {
            handler: QueryHandler::FailedQuery { stmt: stmt.clone() },
            stmt,
        });
        self.stage = Stage::SetVarsDone;
        Ok(Processed::Suspend)
    }

    fn set_vars_done(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        self.consume_query(conn, "set_vars_done")?;
        self.advance_or_fail(Stage::SetServerOption)
    }

    fn set_server_option(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        let Some(server) = conn.server.as_ref() else {
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        };
        let client_multi_statements = conn.client.multi_statements();
        if client_multi_statements == server.multi_statements() {
            self.stage = Stage::FetchSysVars;
            return Ok(Processed::Again);
        }

        self.open_stage_span("set_server_option");
        conn.push_sub_processor(SubProcessorRequest::SetOption(
            ServerOption::for_multi_statements(client_multi_statements),
        ));
        self.stage = Stage::SetServerOptionDone;
        Ok(Processed::Suspend)
    }

    fn set_server_option_done(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        self.consume_sub_processor(conn, "set_server_option_done")?;
        self.advance_or_fail(Stage::FetchSysVars)
    }

    fn fetch_sys_vars(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if !conn.connection_sharing_possible {
            self.stage = Stage::SetSchema;
            return Ok(Processed::Again);
        }
        let Some(stmt) = reconcile::fetch_sys_vars_stmt(&conn.session.system_variables) else {
            self.stage = Stage::SetSchema;
            return Ok(Processed::Again);
        };

        self.open_stage_span("fetch_sys_vars");
        conn.push_sub_processor(SubProcessorRequest::Query {
            handler: QueryHandler::CaptureSysVars,
            stmt,
        });
        self.stage = Stage::FetchSysVarsDone;
        Ok(Processed::Suspend)
    }

    fn fetch_sys_vars_done(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        // Capture anomalies only disable sharing; they never fail the
        // preparation.
        self.consume_query(conn, "fetch_sys_vars_done")?;
        self.advance_or_fail(Stage::SetSchema)
    }

    fn set_schema(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        let Some(server) = conn.server.as_ref() else {
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        };
        if conn.client.schema.is_empty() || conn.client.schema == server.schema {
            self.stage = Stage::WaitGtidExecuted;
            return Ok(Processed::Again);
        }

        self.open_stage_span("init_schema");
        conn.push_sub_processor(SubProcessorRequest::InitSchema {
            schema: conn.client.schema.clone(),
        });
        self.stage = Stage::SetSchemaDone;
        Ok(Processed::Suspend)
    }

    fn set_schema_done(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        self.consume_sub_processor(conn, "set_schema_done")?;
        self.advance_or_fail(Stage::WaitGtidExecuted)
    }

    fn wait_gtid_executed(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        let wanted = conn.wait_for_my_writes
            && conn.expected_server_mode == ServerMode::ReadOnly
            && !conn.gtid_at_least_executed.is_empty();
        if !wanted {
            self.stage = Stage::SetTrxCharacteristics;
            return Ok(Processed::Again);
        }

        let stmt = reconcile::gtid_wait_stmt(
            &conn.gtid_at_least_executed,
            conn.wait_for_my_writes_timeout.as_secs(),
        );
        self.open_stage_span("wait_gtid_executed");
        conn.push_sub_processor(SubProcessorRequest::Query {
            handler: QueryHandler::IsTrue {
                sentinel: MysqlError::new(0, "wait_for_my_writes timed out", "HY000"),
            },
            stmt,
        });
        self.stage = Stage::WaitGtidExecutedDone;
        Ok(Processed::Suspend)
    }

    fn wait_gtid_executed_done(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        self.consume_query(conn, "wait_gtid_executed_done")?;
        // A failed wait does not finish the preparation outright: the
        // backend goes back to the pool (or is closed) and a read-write
        // backend may still satisfy the session.
        self.stage = if self.failure.is_some() {
            Stage::PoolOrClose
        } else {
            Stage::SetTrxCharacteristics
        };
        Ok(Processed::Again)
    }

    fn set_trx_characteristics(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if self.trx_stmt.is_empty() {
            self.stage = Stage::FetchUserAttrs;
            return Ok(Processed::Again);
        }

        let (stmt, rest) = reconcile::split_first_stmt(&self.trx_stmt);
        self.trx_stmt = rest;

        self.open_stage_span("set_trx_characteristics");
        conn.push_sub_processor(SubProcessorRequest::Query {
            handler: QueryHandler::FailedQuery { stmt: stmt.clone() },
            stmt,
        });
        self.stage = Stage::SetTrxCharacteristicsDone;
        Ok(Processed::Suspend)
    }

    fn set_trx_characteristics_done(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        self.consume_query(conn, "set_trx_characteristics_done")?;
        // Loop until the script is drained.
        self.advance_or_fail(Stage::SetTrxCharacteristics)
    }

    fn fetch_user_attrs(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if !conn.options.router_require_enforce {
            self.stage = Stage::SendAuthOk;
            return Ok(Processed::Again);
        }

        self.open_stage_span("fetch_user_attrs");
        conn.push_sub_processor(SubProcessorRequest::FetchRouterRequires);
        self.stage = Stage::FetchUserAttrsDone;
        Ok(Processed::Suspend)
    }

    fn fetch_user_attrs_done(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        match conn.take_completion() {
            Some(Completion::RouterRequires(result)) => match result {
                Err(err) => {
                    self.end_stage_span(SpanStatus::Error);
                    self.failed(err);
                }
                Ok(None) => {
                    self.end_stage_span(SpanStatus::Error);
                    warn!(
                        "Required connection attributes for {:?} could not be fetched",
                        conn.client.username
                    );
                    self.failed(MysqlError::access_denied());
                }
                Ok(Some(require)) => match require.enforce(&conn.client) {
                    Ok(()) => self.end_stage_span(SpanStatus::Ok),
                    Err(err) => {
                        self.end_stage_span(SpanStatus::Error);
                        warn!(
                            "Client {:?} does not meet the required connection attributes",
                            conn.client.username
                        );
                        self.failed(err);
                    }
                },
            },
            None => {
                return Err(Error::MissingCompletion {
                    stage: "fetch_user_attrs_done",
                })
            }
            Some(_) => {
                return Err(Error::UnexpectedCompletion {
                    stage: "fetch_user_attrs_done",
                })
            }
        }
        self.advance_or_fail(Stage::SendAuthOk)
    }

    fn send_auth_ok(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if !self.in_handshake {
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        }
        let Some(server) = conn.server.as_ref() else {
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        };
        let status_flags = server.status_flags;

        let seq_id = conn.client.seq_id.wrapping_add(1);
        let packet = ok_packet(seq_id, 0, 0, status_flags, 0);
        conn.client.send_buffer.extend_from_slice(&packet);

        self.stage = Stage::Done;
        Ok(Processed::SendToClient)
    }

    fn pool_or_close(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        // The backend cannot serve this client right now; park it for
        // another session, or close it gracefully when the pool is full.
        let pooled = match (conn.pool.clone(), conn.server.take()) {
            (Some(pool), Some(server)) if server.open => match pool.try_checkin(server) {
                Ok(()) => true,
                Err(server) => {
                    conn.server = Some(server);
                    false
                }
            },
            (_, server) => {
                conn.server = server;
                false
            }
        };

        self.stage = Stage::FallbackToWrite;
        if pooled {
            debug!("Returned backend connection to the pool");
            Ok(Processed::Again)
        } else if conn.server_socket_open() {
            self.open_stage_span("quit");
            conn.push_sub_processor(SubProcessorRequest::Quit);
            Ok(Processed::Suspend)
        } else {
            Ok(Processed::Again)
        }
    }

    fn fallback_to_write(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        // The Quit completion (when the pool was full) needs no inspection.
        if let Some(completion) = conn.take_completion() {
            match completion {
                Completion::SubProcessor(_) => self.end_stage_span(SpanStatus::Ok),
                _ => {
                    return Err(Error::UnexpectedCompletion {
                        stage: "fallback_to_write",
                    })
                }
            }
        }

        if self.already_fallback || conn.expected_server_mode == ServerMode::ReadWrite {
            self.stage = Stage::Done;
            return Ok(Processed::Again);
        }

        info!("Read-only backend cannot satisfy the session, retrying against a read-write one");
        conn.expected_server_mode = ServerMode::ReadWrite;
        self.already_fallback = true;
        self.failure = None;
        conn.authenticated = false;
        if let Some(span) = self.connect_span.take() {
            trace::trace_span_end(span, Some(SpanStatus::Error));
        }
        self.stage = Stage::Connect;
        Ok(Processed::Again)
    }

    fn done(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if let Some(err) = self.failure.clone() {
            if let Some(span) = &self.connect_span {
                span.event("connect::failed");
            }
            debug!("Backend connection preparation failed: {err}");
            if let Some(on_error) = self.on_error.take() {
                on_error(&err);
            }
            conn.authenticated = false;
        }

        if let Some(server) = conn.server.as_mut() {
            server.reset_seq_id();
        }

        if let Some(span) = self.stage_span.take() {
            trace::trace_span_end(span, None);
        }
        if let Some(span) = self.connect_span.take() {
            let status = if self.failure.is_some() {
                SpanStatus::Error
            } else {
                SpanStatus::Ok
            };
            trace::trace_span_end(span, Some(status));
        }

        self.finished = true;
        Ok(Processed::Done)
    }
}

impl Processor for LazyConnector {
    fn process(&mut self, conn: &mut Connection) -> Result<Processed, Error> {
        if self.finished {
            return Ok(Processed::Done);
        }

        // A cancelled retry wait finishes the preparation wherever it was.
        if conn.completion_is_cancelled() {
            let _ = conn.take_completion();
            self.stage = Stage::Done;
        }

        match self.stage {
            Stage::Connect => self.connect(conn),
            Stage::Connected => self.connected(conn),
            Stage::Authenticated => self.authenticated(conn),
            Stage::SetVars => self.set_vars(conn),
            Stage::SetVarsDone => self.set_vars_done(conn),
            Stage::SetServerOption => self.set_server_option(conn),
            Stage::SetServerOptionDone => self.set_server_option_done(conn),
            Stage::FetchSysVars => self.fetch_sys_vars(conn),
            Stage::FetchSysVarsDone => self.fetch_sys_vars_done(conn),
            Stage::SetSchema => self.set_schema(conn),
            Stage::SetSchemaDone => self.set_schema_done(conn),
            Stage::WaitGtidExecuted => self.wait_gtid_executed(conn),
            Stage::WaitGtidExecutedDone => self.wait_gtid_executed_done(conn),
            Stage::SetTrxCharacteristics => self.set_trx_characteristics(conn),
            Stage::SetTrxCharacteristicsDone => self.set_trx_characteristics_done(conn),
            Stage::FetchUserAttrs => self.fetch_user_attrs(conn),
            Stage::FetchUserAttrsDone => self.fetch_user_attrs_done(conn),
            Stage::SendAuthOk => self.send_auth_ok(conn),
            Stage::PoolOrClose => self.pool_or_close(conn),
            Stage::FallbackToWrite => self.fallback_to_write(conn),
            Stage::Done => self.done(conn),
        }
    }
}
