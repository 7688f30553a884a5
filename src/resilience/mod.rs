//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to upstream:
//!     → invoker.rs (breaker gate, then retry loop, then one verdict to the breaker)
//!     → retries.rs (re-run transient failures with backoff.rs delays)
//!     → circuit_breaker.rs (track consecutive failed calls, open/half-open/close)
//!     → clock.rs (time source for all of the above)
//! ```
//!
//! # Design Decisions
//! - Outcomes are values (`CallOutcome`), never errors
//! - Breaker sees one report per logical call, not per attempt
//! - Every time dependency goes through an injected `Clock`

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod invoker;
pub mod outcome;
pub mod retries;

pub use circuit_breaker::{BreakerTransition, CircuitBreaker, CircuitState, Permit};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use invoker::ResilientInvoker;
pub use outcome::{CallOutcome, Failure};
pub use retries::RetryPolicy;
