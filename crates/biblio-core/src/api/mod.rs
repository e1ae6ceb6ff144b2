//! REST API client module for the library catalog service.
//!
//! This module provides the `ApiClient` for listing, creating, editing,
//! deleting, borrowing and returning books, plus the login and registration
//! calls.
//!
//! Authenticated calls carry the session token as a bearer credential. A
//! 401 on such a call ends the session in the shared `SessionStore`.

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiConfig, LoginResponse, LoginScheme, DEFAULT_BASE_URL};
pub use error::ApiError;
