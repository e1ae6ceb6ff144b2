//! Core library for biblio: the library catalog API client, the session
//! store that owns the bearer token, configuration, and book models.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use biblio_core::api::{ApiClient, ApiConfig};
//! use biblio_core::auth::{Credentials, MemoryTokenStore, SessionStore};
//!
//! let session = SessionStore::new(Arc::new(MemoryTokenStore::new()));
//! session.restore();
//! let api = ApiClient::new(ApiConfig::default(), session.clone())?;
//! session.login(&api, &Credentials::new("alice", "secret")).await?;
//! for book in api.list_books().await? {
//!     println!("{} by {}", book.title, book.author);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
