//! Pipeline stages.
//!
//! Standard composition, outermost first:
//! ```text
//! ExceptionContainmentStage → RequestLoggingStage → ForwardStage
//! ```
//! Containment sits outside logging: a fault is logged once, by containment,
//! and never as a completed request.

pub mod exception;
pub mod forward;
pub mod request_logging;

pub use exception::ExceptionContainmentStage;
pub use forward::ForwardStage;
pub use request_logging::RequestLoggingStage;
