//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamConfig[] at startup
//!     → registry.rs (one ResilientInvoker per upstream)
//!
//! Per call attempt:
//!     message.rs (buffered UpstreamRequest)
//!     → transport.rs (hyper client, classify response)
//!     → CallOutcome
//! ```

pub mod message;
pub mod registry;
pub mod transport;

pub use message::{UpstreamRequest, UpstreamResponse};
pub use registry::UpstreamRegistry;
pub use transport::{HttpTransport, Transport};
