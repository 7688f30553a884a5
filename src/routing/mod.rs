//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (host, path)
//!     → router.rs (ordered lookup)
//!     → matcher.rs (host AND path-prefix conditions)
//!     → Some(Route { upstream, .. }) or None
//! ```
//!
//! Routes are compiled at startup and immutable at runtime.

pub mod matcher;
pub mod router;

pub use router::{Route, Router};
