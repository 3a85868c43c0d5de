//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Metrics → Fetcher → HTTP server
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Close browser → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: listener first, then subsystems, then serving
//! - Ordered shutdown: stop accept, drain, release the fetcher

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::StartupError;
