//! Lazy backend-connection preparation for a MySQL wire-protocol router.
//!
//! When a client command needs a backend, [`connector::LazyConnector`] makes
//! a backend connection observationally equivalent to the client's session
//! state — authenticated as the right user, bound to the right schema, with
//! matching session variables, options, transaction characteristics and
//! replication visibility — before the command is forwarded.
//!
//! The wire codec, the individual protocol exchanges and destination
//! selection are external collaborators behind
//! [`connector::subprocess::SubProcessors`].

pub mod client;
pub mod config;
pub mod connection;
pub mod connector;
pub mod errors;
pub mod messages;
pub mod pool;
pub mod server;
pub mod session;
pub mod trace;
