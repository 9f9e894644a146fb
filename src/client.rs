//! Client-side protocol view.

use std::collections::BTreeMap;

use bytes::BytesMut;

use crate::messages::constants::CLIENT_MULTI_STATEMENTS;

/// TLS facts about the client channel, as far as attribute enforcement
/// needs them. Present when the client connected over TLS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientTls {
    /// Subject of the client certificate, if one was presented.
    pub cert_subject: Option<String>,
    /// Issuer of the client certificate, if one was presented.
    pub cert_issuer: Option<String>,
}

impl ClientTls {
    pub fn has_client_cert(&self) -> bool {
        self.cert_subject.is_some() || self.cert_issuer.is_some()
    }
}

/// The router's view of the client side of the splice.
#[derive(Debug, Default)]
pub struct ClientChannel {
    pub username: String,

    /// Client password when the router learned it during authentication.
    /// Needed to decide whether a failed backend handshake can be retried.
    pub password: Option<String>,

    /// Default schema the client is using. Empty when none was selected.
    pub schema: String,

    /// Connection attributes the client sent at handshake.
    pub sent_attributes: BTreeMap<String, String>,

    pub capabilities: u32,

    pub seq_id: u8,

    pub tls: Option<ClientTls>,

    /// Bytes queued for the client. The outer runtime flushes these when the
    /// connector asks for `SendToClient`.
    pub send_buffer: BytesMut,
}

impl ClientChannel {
    pub fn new(username: impl Into<String>) -> ClientChannel {
        ClientChannel {
            username: username.into(),
            ..ClientChannel::default()
        }
    }

    #[inline(always)]
    pub fn multi_statements(&self) -> bool {
        self.capabilities & CLIENT_MULTI_STATEMENTS != 0
    }

    #[inline(always)]
    pub fn is_secure_transport(&self) -> bool {
        self.tls.is_some()
    }
}
