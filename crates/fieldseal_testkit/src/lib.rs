//! # fieldseal testkit
//!
//! Test utilities for fieldseal.
//!
//! This crate provides:
//! - Fixtures that seed stores with legacy and current values
//! - Store wrappers that simulate concurrent edits and lost connections
//! - Property-based test generators using proptest
//! - Known-answer vectors for both ciphers
//! - An end-to-end harness that tracks plaintexts across runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldseal_testkit::prelude::*;
//!
//! #[test]
//! fn migrates_everything() {
//!     let mut harness = SealHarness::in_memory();
//!     let legacy = secret("legacy");
//!     harness.insert("users", "u1", "twofa_secret", "JBSWY3DP", Seed::Legacy, &legacy);
//!     // ... run a driver, then
//!     harness.verify_all_under(&secret("current"));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use vectors::*;
