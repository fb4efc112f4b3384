//! Folio Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the Folio workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `FolioError` and the `Result` alias
//! - **Checksums**: content digests recorded on stored files
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use folio_common::checksum::{sha256_bytes, verify_sha256};
//! use folio_common::Result;
//!
//! fn check(data: &[u8], expected: &str) -> Result<()> {
//!     verify_sha256(data, expected)?;
//!     tracing::info!(checksum = %sha256_bytes(data), "digest verified");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{FolioError, Result};
