//! REST API client module for the inventory service.
//!
//! This module provides the `ApiClient` for logging in and managing product
//! records. The API uses JWT bearer token authentication obtained through
//! the login and signup endpoints.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
