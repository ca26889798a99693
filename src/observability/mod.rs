//! Observability features: metrics and tracing.
//!
//! gridio never installs a subscriber or a recorder; applications choose
//! their own.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `gridio_dispatch_total` | Counter | Operations handed to a backend, by operation and plugin |
//! | `gridio_dispatch_errors_total` | Counter | Failed operations, by operation |
//! | `gridio_dispatch_time_ns` | Histogram | Time per dispatched operation |
//! | `gridio_emulated_io_total` | Counter | Positioned transfers emulated with seek |
//! | `gridio_open_handles` | Gauge | Live entries per descriptor table |
//! | `gridio_plugins_loaded` | Gauge | Registered backends |
//!
//! ## Tracing
//!
//! Every dispatch runs in a `gridio.dispatch` span at `DEBUG` carrying the
//! operation and either the URL or the owning plugin. Discovery logs the
//! plugin directory at `DEBUG` and each loaded module at `INFO`.

mod metrics;
mod tracing_support;

pub use self::metrics::{
    DispatchTimer, init_metrics, record_dispatch, record_dispatch_error, record_emulated_io,
    record_open_handles, record_plugins_loaded,
};
pub use tracing_support::{
    instrument_dispatch, instrument_handle, span_dispatch, span_handle, trace_dispatch_error,
    trace_emulated_io,
};
