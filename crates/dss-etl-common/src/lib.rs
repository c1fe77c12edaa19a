//! DSS ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the DSS extraction workspace.
//!
//! - **Checksums**: sha256 helpers used to verify content store entries
//! - **Errors**: the error type for the helpers in this crate
//! - **Logging**: `tracing` subscriber setup shared by binaries and tests
//!
//! # Example
//!
//! ```no_run
//! use dss_etl_common::checksum;
//!
//! fn check(path: &str, expected: &str) -> dss_etl_common::Result<bool> {
//!     let actual = checksum::compute_file_checksum(path)?;
//!     Ok(checksum::digests_match(&actual, expected))
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
