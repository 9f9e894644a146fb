//! The shared connection context the preparation core mutates.
//!
//! One `Connection` exists per client session. It owns both protocol views,
//! the mirrored session state and the flags that steer preparation, plus the
//! small mailbox through which the connector and the cooperative runtime
//! exchange sub-processor requests and completions.

use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientChannel;
use crate::config::Config;
use crate::connector::subprocess::{Completion, SubProcessorRequest};
use crate::pool::ConnectionPool;
use crate::server::ServerChannel;
use crate::session::ExecutionContext;

/// Which kind of backend the client asked to be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    ReadOnly,
    ReadWrite,
}

/// Per-connection snapshot of the settings the connector consults.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub connection_sharing: bool,
    pub connect_retry_timeout: Duration,
    pub connect_retry_interval: Duration,
    pub router_require_enforce: bool,
    pub wait_for_my_writes: bool,
    pub wait_for_my_writes_timeout: Duration,
}

impl ConnectionOptions {
    pub fn from_config(config: &Config) -> ConnectionOptions {
        ConnectionOptions {
            connection_sharing: config.general.connection_sharing,
            connect_retry_timeout: config.general.connect_retry_timeout.as_std(),
            connect_retry_interval: config.general.connect_retry_interval.as_std(),
            router_require_enforce: config.general.router_require_enforce,
            wait_for_my_writes: config.general.wait_for_my_writes,
            wait_for_my_writes_timeout: config.general.wait_for_my_writes_timeout.as_std(),
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> ConnectionOptions {
        ConnectionOptions::from_config(&Config::default())
    }
}

/// The connection state shared between the splice and the connector. The
/// connector mutates it exclusively while active; no locks are needed under
/// the cooperative model.
pub struct Connection {
    pub client: ClientChannel,

    /// Backend channel. `None` until a socket was ever opened or acquired.
    pub server: Option<ServerChannel>,

    pub session: ExecutionContext,

    /// Whether the backend is authenticated as the client's user.
    pub authenticated: bool,

    pub expected_server_mode: ServerMode,

    /// Whether this connection qualifies for sharing at all (protocol and
    /// authentication permitting).
    pub connection_sharing_possible: bool,

    /// Set when backend session state changed in a way the router could not
    /// capture; sharing is off for this connection from then on.
    pub some_state_changed: bool,

    /// Whether the server greeting the client saw was synthesized by the
    /// router rather than relayed from a backend.
    pub greeting_from_router: bool,

    pub wait_for_my_writes: bool,
    pub wait_for_my_writes_timeout: Duration,

    /// GTID set the client's reads must observe. Opaque; empty when unknown.
    pub gtid_at_least_executed: String,

    pub options: ConnectionOptions,

    /// Pool the backend channel may be returned to.
    pub pool: Option<Arc<ConnectionPool>>,

    // Cooperative-scheduling mailbox.
    pending: Option<SubProcessorRequest>,
    completion: Option<Completion>,
    wake_after: Option<Duration>,
}

impl Connection {
    pub fn new(client: ClientChannel, options: ConnectionOptions) -> Connection {
        Connection {
            client,
            server: None,
            session: ExecutionContext::default(),
            authenticated: false,
            expected_server_mode: ServerMode::ReadWrite,
            connection_sharing_possible: false,
            some_state_changed: false,
            greeting_from_router: false,
            wait_for_my_writes: options.wait_for_my_writes,
            wait_for_my_writes_timeout: options.wait_for_my_writes_timeout,
            gtid_at_least_executed: String::new(),
            options,
            pool: None,
            pending: None,
            completion: None,
            wake_after: None,
        }
    }

    #[inline(always)]
    pub fn server_socket_open(&self) -> bool {
        self.server.as_ref().is_some_and(|server| server.open)
    }

    #[inline(always)]
    pub fn server_greeting_stored(&self) -> bool {
        self.server
            .as_ref()
            .is_some_and(|server| server.greeting.is_some())
    }

    /// Push a sub-processor onto the per-connection processor stack. The
    /// runtime pops it, runs the sub-processor to completion and delivers a
    /// [`Completion`].
    pub(crate) fn push_sub_processor(&mut self, request: SubProcessorRequest) {
        debug_assert!(self.pending.is_none(), "sub-processor already pending");
        self.pending = Some(request);
    }

    /// Runtime side: take the pending sub-processor request, if any.
    pub fn take_pending(&mut self) -> Option<SubProcessorRequest> {
        self.pending.take()
    }

    /// Runtime side: deliver a sub-processor completion. Consumed by the
    /// connector on its next `process()` step.
    pub fn deliver(&mut self, completion: Completion) {
        debug_assert!(self.completion.is_none(), "completion already delivered");
        self.completion = Some(completion);
    }

    pub(crate) fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    pub(crate) fn completion_is_cancelled(&self) -> bool {
        matches!(self.completion, Some(Completion::Cancelled))
    }

    /// Ask the runtime for a wakeup after `delay` (the cancellable retry
    /// timer).
    pub(crate) fn request_wakeup(&mut self, delay: Duration) {
        self.wake_after = Some(delay);
    }

    /// Runtime side: take the requested wakeup delay, if any.
    pub fn take_wake_after(&mut self) -> Option<Duration> {
        self.wake_after.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::subprocess::SubProcessorRequest;

    #[test]
    fn options_follow_the_config() {
        let mut config = Config::default();
        config.general.connection_sharing = true;
        config.general.connect_retry_timeout = crate::config::Duration::from_secs(3);

        let options = ConnectionOptions::from_config(&config);
        assert!(options.connection_sharing);
        assert_eq!(options.connect_retry_timeout, Duration::from_secs(3));
        assert_eq!(options.connect_retry_interval, Duration::from_millis(100));
    }

    #[test]
    fn mailbox_roundtrip() {
        let mut conn = Connection::new(ClientChannel::new("app"), ConnectionOptions::default());
        assert!(conn.take_pending().is_none());

        conn.push_sub_processor(SubProcessorRequest::Connect);
        assert!(matches!(
            conn.take_pending(),
            Some(SubProcessorRequest::Connect)
        ));
        assert!(conn.take_pending().is_none());

        conn.deliver(Completion::SubProcessor(Ok(())));
        assert!(!conn.completion_is_cancelled());
        assert!(conn.take_completion().is_some());

        conn.request_wakeup(Duration::from_millis(100));
        assert_eq!(conn.take_wake_after(), Some(Duration::from_millis(100)));
        assert!(conn.take_wake_after().is_none());
    }
}
