//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream response headers:
//!     → headers.rs (strip blocking/hop-by-hop, inject CORS + CSP)
//!     → Client
//! ```
//!
//! # Design Decisions
//! - The proxy's own policy is permissive by purpose: proxied pages must be
//!   embeddable and scriptable from any origin
//! - The same policy runs on success, passthrough and error responses

pub mod headers;
