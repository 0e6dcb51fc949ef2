//! Route modules and the mount table.
//!
//! # Data Flow
//! ```text
//! Pipeline
//!     → mount table (first matching prefix)
//!     → route module handler
//!     → auth.rs (CurrentUser extractor, role checks) where required
//!     → db Collection (validated CRUD)
//!     → http::response envelope
//! ```
//!
//! # Design Decisions
//! - The table is fixed at startup; prefixes never overlap
//! - Handlers only see sanitized input through `Payload` and `RawQuery`
//! - Ownership is checked in the handler, roles in the extractor's `authorize`

use axum::Router;

use crate::http::AppState;

pub mod auth;
pub mod bootcamps;
pub mod courses;
pub mod resource;
pub mod reviews;
pub mod users;

/// One row of the mount table.
pub struct Mount {
    pub prefix: &'static str,
    pub routes: fn() -> Router<AppState>,
}

pub const MOUNTS: [Mount; 5] = [
    Mount {
        prefix: "/api/v1/bootcamps",
        routes: bootcamps::routes,
    },
    Mount {
        prefix: "/api/v1/courses",
        routes: courses::routes,
    },
    Mount {
        prefix: "/api/v1/auth",
        routes: auth::routes,
    },
    Mount {
        prefix: "/api/v1/users",
        routes: users::routes,
    },
    Mount {
        prefix: "/api/v1/reviews",
        routes: reviews::routes,
    },
];

/// Nest every route module under its prefix.
pub fn mount(router: Router<AppState>) -> Router<AppState> {
    MOUNTS.iter().fold(router, |router, mount| {
        tracing::debug!(prefix = mount.prefix, "Mounting routes");
        router.nest(mount.prefix, (mount.routes)())
    })
}
