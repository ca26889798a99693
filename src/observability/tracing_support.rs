//! Tracing spans and events for dispatch.

use tracing::{Level, Span, span};

/// Create a span for a URL-addressed dispatch.
///
/// # Example
///
/// ```rust
/// use gridio::observability::span_dispatch;
///
/// let span = span_dispatch("stat", "file:///tmp/a");
/// let _guard = span.enter();
/// // Backend lookup and call here...
/// ```
#[inline]
pub fn span_dispatch(operation: &'static str, url: &str) -> Span {
    span!(Level::DEBUG, "gridio.dispatch", operation, url = %url)
}

/// Create a span for a handle-addressed dispatch.
#[inline]
pub fn span_handle(operation: &'static str, owner: &str) -> Span {
    span!(Level::DEBUG, "gridio.dispatch", operation, plugin = %owner)
}

/// Enter a URL dispatch span and return the guard.
pub fn instrument_dispatch(operation: &'static str, url: &str) -> tracing::span::EnteredSpan {
    span_dispatch(operation, url).entered()
}

/// Enter a handle dispatch span and return the guard.
pub fn instrument_handle(operation: &'static str, owner: &str) -> tracing::span::EnteredSpan {
    span_handle(operation, owner).entered()
}

/// Log a positioned transfer served by seek + read/write emulation.
#[inline]
pub fn trace_emulated_io(operation: &'static str, owner: &str, offset: u64, len: usize) {
    tracing::trace!(operation, plugin = %owner, offset, len, "emulating positioned I/O");
}

/// Log a failed dispatch.
#[inline]
pub fn trace_dispatch_error(operation: &'static str, error: &dyn std::error::Error) {
    tracing::debug!(operation, error = %error, "dispatch failed");
}
