//! Authentication module for managing the session token.
//!
//! This module provides:
//! - `SessionStore`: the current token, its persistence and its expiry checks
//! - `Token`: the server-issued bearer credential and its claims
//! - `TokenStore`: device storage backends (file, OS keychain, memory)
//! - `Credentials` / `Registration`: validated login and sign-up input
//!
//! Tokens are persisted under a single `token` key and are only exposed while
//! their `exp` claim lies in the future.

pub mod credentials;
pub mod session;
pub mod storage;
pub mod token;

pub use credentials::{Credentials, Registration};
pub use session::{SessionState, SessionStore};
pub use storage::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore, TOKEN_KEY};
pub use token::{Token, RoleClaim, TokenClaims, TokenStatus};
