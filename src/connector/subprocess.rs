//! The sub-processor contract: requests the state machine pushes onto the
//! per-connection processor stack, and the driver interface through which an
//! outer runtime runs the actual protocol exchanges.

use async_trait::async_trait;
use serde_derive::Deserialize;

use crate::client::ClientChannel;
use crate::connection::Connection;
use crate::messages::constants::{
    MYSQL_OPTION_MULTI_STATEMENTS_OFF, MYSQL_OPTION_MULTI_STATEMENTS_ON,
};
use crate::messages::MysqlError;

use super::handlers::{HandlerOutcome, QueryHandler, ResultSink};

/// `COM_SET_OPTION` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOption {
    MultiStatementsOn,
    MultiStatementsOff,
}

impl ServerOption {
    pub fn for_multi_statements(enabled: bool) -> ServerOption {
        if enabled {
            ServerOption::MultiStatementsOn
        } else {
            ServerOption::MultiStatementsOff
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ServerOption::MultiStatementsOn => MYSQL_OPTION_MULTI_STATEMENTS_ON,
            ServerOption::MultiStatementsOff => MYSQL_OPTION_MULTI_STATEMENTS_OFF,
        }
    }
}

/// Required connection attributes, fetched as a JSON document from the
/// account metadata when enforcement is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RouterRequire {
    /// Client must be connected over TLS.
    #[serde(default)]
    pub ssl: bool,

    /// Client must have presented a certificate.
    #[serde(default)]
    pub x509: bool,

    /// Required issuer of the client certificate.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Required subject of the client certificate.
    #[serde(default)]
    pub subject: Option<String>,
}

impl RouterRequire {
    pub fn from_json(raw: &str) -> Result<RouterRequire, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Check the client channel against the requirements.
    pub fn enforce(&self, client: &ClientChannel) -> Result<(), MysqlError> {
        if self.ssl && !client.is_secure_transport() {
            return Err(MysqlError::access_denied());
        }

        let tls = client.tls.as_ref();

        if self.x509 && !tls.is_some_and(|tls| tls.has_client_cert()) {
            return Err(MysqlError::access_denied());
        }

        if let Some(issuer) = &self.issuer {
            if tls.and_then(|tls| tls.cert_issuer.as_deref()) != Some(issuer.as_str()) {
                return Err(MysqlError::access_denied());
            }
        }

        if let Some(subject) = &self.subject {
            if tls.and_then(|tls| tls.cert_subject.as_deref()) != Some(subject.as_str()) {
                return Err(MysqlError::access_denied());
            }
        }

        Ok(())
    }
}

/// A unit of work the connector pushes onto the processor stack.
#[derive(Debug)]
pub enum SubProcessorRequest {
    /// Open or pool-acquire the backend socket.
    Connect,
    /// Full greeting handshake on a fresh socket.
    ServerGreeting { in_handshake: bool },
    /// Reauthenticate an existing socket as the client's user.
    ChangeUser { in_handshake: bool },
    /// Reset the session on a reused socket.
    ResetConnection,
    /// Toggle a protocol option.
    SetOption(ServerOption),
    /// Select the default schema.
    InitSchema { schema: String },
    /// Execute one statement, streamed into the named handler.
    Query { stmt: String, handler: QueryHandler },
    /// Graceful close.
    Quit,
    /// Fetch the required-connection-attributes document.
    FetchRouterRequires,
}

/// Completion of a sub-processor, delivered back through the connection and
/// consumed when the suspended connector resumes.
#[derive(Debug)]
pub enum Completion {
    SubProcessor(Result<(), MysqlError>),
    Query(HandlerOutcome),
    RouterRequires(Result<Option<RouterRequire>, MysqlError>),
    /// The cancellable retry wait was cancelled; finish without preparing.
    Cancelled,
}

/// Drivers for the external sub-processors. Each call runs the exchange to
/// completion before returning; the connector never observes partial state.
///
/// A successful `server_greeting`/`change_user` marks the connection
/// authenticated; a failed handshake must leave the backend socket closed,
/// so that a retry pass starts from `Connect` again.
#[async_trait]
pub trait SubProcessors {
    async fn connect(&mut self, conn: &mut Connection) -> Result<(), MysqlError>;

    async fn server_greeting(
        &mut self,
        conn: &mut Connection,
        in_handshake: bool,
    ) -> Result<(), MysqlError>;

    async fn change_user(
        &mut self,
        conn: &mut Connection,
        in_handshake: bool,
    ) -> Result<(), MysqlError>;

    async fn reset_connection(&mut self, conn: &mut Connection) -> Result<(), MysqlError>;

    async fn set_option(
        &mut self,
        conn: &mut Connection,
        option: ServerOption,
    ) -> Result<(), MysqlError>;

    async fn init_schema(&mut self, conn: &mut Connection, schema: &str)
        -> Result<(), MysqlError>;

    /// Execute one statement, streaming the result into the sink. Transport
    /// failures are reported through `sink.on_error`.
    async fn query(&mut self, conn: &mut Connection, stmt: &str, sink: &mut ResultSink);

    async fn quit(&mut self, conn: &mut Connection) -> Result<(), MysqlError>;

    async fn fetch_router_requires(
        &mut self,
        conn: &mut Connection,
    ) -> Result<Option<RouterRequire>, MysqlError>;

    /// Flush bytes queued for the client.
    async fn flush_to_client(&mut self, conn: &mut Connection) -> Result<(), MysqlError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientTls;

    fn tls_client(subject: Option<&str>, issuer: Option<&str>) -> ClientChannel {
        let mut client = ClientChannel::new("user1");
        client.tls = Some(ClientTls {
            cert_subject: subject.map(Into::into),
            cert_issuer: issuer.map(Into::into),
        });
        client
    }

    #[test]
    fn from_json_with_defaults() {
        let require = RouterRequire::from_json(r#"{"ssl": true}"#).unwrap();
        assert!(require.ssl);
        assert!(!require.x509);
        assert_eq!(require.issuer, None);

        assert!(RouterRequire::from_json("not-json").is_err());
    }

    #[test]
    fn enforce_ssl() {
        let require = RouterRequire {
            ssl: true,
            ..RouterRequire::default()
        };
        assert!(require.enforce(&ClientChannel::new("user1")).is_err());
        assert!(require.enforce(&tls_client(None, None)).is_ok());
    }

    #[test]
    fn enforce_x509_needs_a_client_cert() {
        let require = RouterRequire {
            x509: true,
            ..RouterRequire::default()
        };
        assert!(require.enforce(&tls_client(None, None)).is_err());
        assert!(require.enforce(&tls_client(Some("CN=client"), None)).is_ok());
    }

    #[test]
    fn enforce_issuer_and_subject() {
        let require = RouterRequire {
            issuer: Some("CN=ca".into()),
            subject: Some("CN=client".into()),
            ..RouterRequire::default()
        };
        assert!(require
            .enforce(&tls_client(Some("CN=client"), Some("CN=ca")))
            .is_ok());
        assert!(require
            .enforce(&tls_client(Some("CN=other"), Some("CN=ca")))
            .is_err());
        assert!(require.enforce(&ClientChannel::new("user1")).is_err());

        let rejected = require.enforce(&tls_client(None, None)).unwrap_err();
        assert_eq!(rejected.code, 1045);
        assert_eq!(rejected.sqlstate, "28000");
    }

    #[test]
    fn server_option_codes() {
        assert_eq!(ServerOption::for_multi_statements(true).code(), 0);
        assert_eq!(ServerOption::for_multi_statements(false).code(), 1);
    }
}
