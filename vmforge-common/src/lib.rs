//! # vmforge Common
//!
//! Shared utilities for the vmforge components.
//!
//! ## Logging
//!
//! ```rust
//! vmforge_common::init_logging("info").unwrap();
//! ```
//!
//! Use [`init_logging_json`] instead when logs are shipped to an
//! aggregator.

pub mod logging;

pub use logging::{init_logging, init_logging_json};
