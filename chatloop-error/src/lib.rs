//! # chatloop-error
//!
//! Unified error handling for the chatloop crates.
//!
//! - **ErrorKind**: what went wrong (e.g. `RateLimited`, `ParseFailed`)
//! - **ErrorStatus**: whether retrying could help (`Permanent`, `Temporary`, `Persistent`)
//! - **Context**: key-value pairs that help locate the cause
//! - **Source**: the wrapped underlying error, never leaked as a raw type
//!
//! ## Usage
//!
//! ```rust
//! use chatloop_error::{Error, ErrorKind};
//!
//! fn get_news(seed: f64) -> Result<String, Error> {
//!     Err(Error::new(ErrorKind::FunctionFailed, "news backend unreachable")
//!         .with_operation("news::get")
//!         .with_context("seed", seed.to_string()))
//! }
//!
//! assert_eq!(get_news(10.0).unwrap_err().kind(), ErrorKind::FunctionFailed);
//! ```
//!
//! All fallible operations return `chatloop_error::Result<T>`. External errors
//! are wrapped with `set_source(err)`; later layers only append context.

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using chatloop Error
pub type Result<T> = std::result::Result<T, Error>;
