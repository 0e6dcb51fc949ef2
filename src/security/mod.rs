//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request (body + query):
//!     → sanitize.rs (drop `$`-prefixed and dotted keys)
//!     → headers.rs (security response headers)
//!     → xss.rs (strip markup from strings)
//!     → rate_limit.rs (fixed window per client IP)
//!     → hpp.rs (collapse duplicate query parameters)
//!     → cors.rs (cross-origin policy)
//!     → Route dispatch
//! ```
//!
//! # Design Decisions
//! - Input is cleaned in place; handlers never see the raw values
//! - Rejections go through the same JSON error envelope as handler errors
//! - limits.rs bounds concurrent requests ahead of every stage

pub mod cors;
pub mod headers;
pub mod hpp;
pub mod limits;
pub mod query;
pub mod rate_limit;
pub mod sanitize;
pub mod xss;

pub use hpp::PollutedQuery;
pub use limits::InFlightLimit;
pub use rate_limit::{RateLimitState, RateLimiter};
