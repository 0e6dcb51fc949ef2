//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, connect info, graceful shutdown)
//!     → pipeline.rs (ordered middleware stages)
//!     → middleware/ (body, cookies, request log, uploads)
//!     → [security stages, see crate::security]
//!     → [route modules, see crate::api]
//!     → response.rs / error.rs (JSON envelopes)
//!     → Send to client
//! ```

pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod response;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{AppState, HttpServer};
