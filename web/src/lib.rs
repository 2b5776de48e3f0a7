//! # Pazar Web
//!
//! Shared HTTP plumbing for the pazar services. Both service binaries build
//! their routers with axum; this crate carries the pieces they agree on:
//!
//! - [`error::ApiError`]: maps domain error kinds to HTTP status codes and
//!   renders the `{success:false, message, error}` body every endpoint uses
//! - [`response`]: success envelopes (`ApiResponse`, `PaginatedResponse`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod response;

pub use error::ApiError;
pub use response::{ApiResponse, PaginatedResponse, Pagination};
