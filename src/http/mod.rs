//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID and body limit layers)
//!     → pipeline.rs (RequestContext through the ordered stages)
//!     → middleware/ (containment → logging → forward)
//!     → response.rs (outcome → client response)
//!     → Send to client
//! ```

pub mod middleware;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::{Next, Pipeline, PipelineBuilder, RequestContext, Stage, StageResult};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
