/*!
 * Monitoring
 * Tracing setup, operation spans and lightweight metrics
 */

mod metrics;
mod tracer;

pub use metrics::{HistogramStats, MetricsCollector, MetricsSnapshot, Timer};
pub use tracer::{init_tracing, span_operation, try_init_tracing, OperationSpan};
