//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound connection or exchange:
//!     → timeouts.rs (enforce dial / forward deadline)
//!     → On failure: error returned to the handler, reported as 503
//! ```
//!
//! # Design Decisions
//! - Every destination dial has a deadline
//! - No automatic retries; clients reissue requests themselves

pub mod timeouts;

pub use timeouts::{dial, with_deadline};
