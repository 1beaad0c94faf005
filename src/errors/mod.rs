//! Centralized error handling for the globe-latency service
//!
//! Upstream problems (timeouts, non-success responses, bad payloads) are
//! folded into tagged readings by the source layer and never reach a
//! handler. The types here cover what can still fail: configuration, local
//! files, request validation and the watcher's calls to a running server.
//!
//! # Error Categories
//!
//! - **Source Errors**: upstream radar/probe API connectivity and parsing
//! - **Web Errors**: HTTP request validation
//! - **Validation / Configuration**: bad input or bad settings
//!
//! # Usage
//!
//! ```rust
//! use globe_latency::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::validation("range must be one of 1h, 24h, 7d, 30d"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;
