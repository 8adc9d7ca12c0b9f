//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by the remote providers. Request building,
//! bearer authentication and retries live here so the providers only deal
//! with paths and payloads.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: an `ApiClient` built on `reqwest` and `reqwest-middleware`
//!   with exponential backoff on transient failures.

/// Generic HTTP API client with retry middleware.
pub mod ky_http;
