/*!
 * Monitoring
 * Tracing setup and spans for blocking operations
 */

mod tracer;

pub use tracer::{init_tracing, BlockingSpan};
