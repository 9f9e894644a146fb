//! Span open/close hooks for the connect flow.
//!
//! Thin wrappers over `tracing` so the connector can open a span per stage,
//! attach free-form attributes and record a terminal status, without the
//! call sites caring whether a subscriber is installed.

use std::fmt::Display;

use tracing::field::Empty;
use tracing::Span;

/// Status recorded on a span when it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Handle to an open trace span.
#[derive(Debug)]
pub struct SpanHandle {
    span: Span,
}

impl SpanHandle {
    /// Record a key/value attribute on the span.
    pub fn attr(&self, key: &str, value: impl Display) {
        tracing::debug!(parent: &self.span, attribute = key, value = %value);
    }

    /// Record a named event inside the span.
    pub fn event(&self, name: &str) {
        tracing::debug!(parent: &self.span, event = name);
    }
}

/// Open a span. The outer connect span passes no parent.
pub fn trace_span(parent: Option<&SpanHandle>, name: &'static str) -> SpanHandle {
    let span = match parent {
        Some(parent) => tracing::debug_span!(parent: &parent.span, "stage", name, status = Empty),
        None => tracing::debug_span!("stage", name, status = Empty),
    };
    SpanHandle { span }
}

/// Close a span, optionally recording a terminal status.
pub fn trace_span_end(span: SpanHandle, status: Option<SpanStatus>) {
    if let Some(status) = status {
        span.span.record(
            "status",
            match status {
                SpanStatus::Ok => "ok",
                SpanStatus::Error => "error",
            },
        );
    }
    drop(span);
}
