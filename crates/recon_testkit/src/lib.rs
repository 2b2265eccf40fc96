//! # Recon Testkit
//!
//! Test utilities for recon.
//!
//! This crate provides:
//! - Entity fixtures for common catalog shapes
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recon_testkit::prelude::*;
//!
//! let items = chain("service", 3);
//! assert_eq!(items[1].relation_targets().next(), Some("service-0"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
