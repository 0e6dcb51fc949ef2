//! Request-parsing and logging stages of the pipeline.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → body.rs (JSON body → ParsedBody extension)
//!     → cookies.rs (Cookie header → Cookies extension)
//!     → logger.rs (one line per request, development only)
//!     → upload.rs (multipart → UploadedFiles extension + text fields)
//!     → security stages (see crate::security)
//! ```
//!
//! # Design Decisions
//! - Parsed input travels in request extensions; later stages mutate it in place
//! - Every stage carries its own enable flag and becomes a pass-through when off

pub mod body;
pub mod cookies;
pub mod logger;
pub mod upload;

pub use body::{ParsedBody, Payload};
pub use cookies::Cookies;
pub use upload::{UploadedFile, UploadedFiles};

/// On/off state shared by stages without further settings.
#[derive(Debug, Clone, Copy)]
pub struct StageToggle {
    pub enabled: bool,
}

impl StageToggle {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}
