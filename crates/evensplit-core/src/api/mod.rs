//! REST API client module for the evensplit service.
//!
//! This module provides the `ApiClient` for calling the remote API with
//! the session's bearer token, and `ApiError`, the classified failure
//! every call site reasons about.

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiRequest, LoginResponse, SignUpRequest, SignUpResponse};
pub use error::ApiError;
