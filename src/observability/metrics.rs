//! Metrics collection using metrics-rs.

use metrics::{Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const DISPATCH_TOTAL: &str = "gridio_dispatch_total";
const DISPATCH_ERRORS: &str = "gridio_dispatch_errors_total";
const DISPATCH_TIME_NS: &str = "gridio_dispatch_time_ns";
const EMULATED_IO: &str = "gridio_emulated_io_total";
const OPEN_HANDLES: &str = "gridio_open_handles";
const PLUGINS_LOADED: &str = "gridio_plugins_loaded";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        DISPATCH_TOTAL,
        Unit::Count,
        "Operations handed to a backend"
    );
    metrics::describe_counter!(
        DISPATCH_ERRORS,
        Unit::Count,
        "Operations that returned an error"
    );
    metrics::describe_histogram!(
        DISPATCH_TIME_NS,
        Unit::Nanoseconds,
        "Time spent in one dispatched operation"
    );
    metrics::describe_counter!(
        EMULATED_IO,
        Unit::Count,
        "Positioned transfers served by seek + read/write"
    );
    metrics::describe_gauge!(OPEN_HANDLES, Unit::Count, "Live descriptor table entries");
    metrics::describe_gauge!(PLUGINS_LOADED, Unit::Count, "Registered backends");
}

/// Record an operation handed to `plugin`.
#[inline]
pub fn record_dispatch(operation: &'static str, plugin: &str) {
    counter!(DISPATCH_TOTAL, "operation" => operation, "plugin" => plugin.to_string()).increment(1);
}

/// Record a failed operation.
#[inline]
pub fn record_dispatch_error(operation: &'static str) {
    counter!(DISPATCH_ERRORS, "operation" => operation).increment(1);
}

/// Record an emulated positioned transfer.
#[inline]
pub fn record_emulated_io(operation: &'static str) {
    counter!(EMULATED_IO, "operation" => operation).increment(1);
}

/// Record the number of live entries of a descriptor table.
#[inline]
pub fn record_open_handles(table: &'static str, live: usize) {
    gauge!(OPEN_HANDLES, "table" => table).set(live as f64);
}

/// Record the number of registered backends.
#[inline]
pub fn record_plugins_loaded(count: usize) {
    gauge!(PLUGINS_LOADED).set(count as f64);
}

/// Guard that records the duration of one dispatch when dropped.
pub struct DispatchTimer {
    operation: &'static str,
    start: Instant,
}

impl DispatchTimer {
    /// Start timing `operation`.
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        histogram!(DISPATCH_TIME_NS, "operation" => self.operation)
            .record(self.start.elapsed().as_nanos() as f64);
    }
}
