//! Errors.

use crate::messages::MysqlError;

/// Errors surfaced by the core itself, as opposed to wire-level
/// [`MysqlError`]s, which are plain values stored on the connector and
/// reported through its error callback.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A `*Done` stage ran without a sub-processor completion being
    /// delivered: the runtime driving the processor stack is out of sync.
    #[error("no completion delivered for stage {stage}")]
    MissingCompletion { stage: &'static str },

    /// A completion of an unexpected kind was delivered.
    #[error("unexpected completion delivered for stage {stage}")]
    UnexpectedCompletion { stage: &'static str },

    #[error("failed to flush to client: {0}")]
    ClientFlush(MysqlError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration")]
    Parse(#[source] toml::de::Error),
}
