use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use validator::Validate;

use super::{Credentials, Token, TokenStatus, TokenStore};
use crate::api::{ApiClient, ApiError};

/// Authentication state of the client process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(Token),
}

impl SessionState {
    pub fn token(&self) -> Option<&Token> {
        match self {
            SessionState::Authenticated(token) => Some(token),
            SessionState::Unauthenticated => None,
        }
    }
}

struct Inner {
    storage: Arc<dyn TokenStore>,
    state: RwLock<SessionState>,
}

/// Single source of truth for "am I logged in, and with what token".
///
/// Clone is cheap and every clone shares the same state, so one store can be
/// handed to the API client and to the front end.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Create an unauthenticated store over `storage`. Call [`restore`] to
    /// pick up a token persisted by a previous run.
    ///
    /// [`restore`]: SessionStore::restore
    pub fn new(storage: Arc<dyn TokenStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                state: RwLock::new(SessionState::Unauthenticated),
            }),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_storage(&self) {
        if let Err(e) = self.inner.storage.clear() {
            warn!(error = %e, "Failed to clear stored token");
        }
    }

    /// Load the persisted token, if any. Expired, malformed or non-access
    /// tokens are discarded and removed from storage.
    pub fn restore(&self) -> SessionState {
        let stored = match self.inner.storage.read() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token");
                None
            }
        };

        let Some(raw) = stored else {
            debug!("No stored token found");
            *self.write_state() = SessionState::Unauthenticated;
            return SessionState::Unauthenticated;
        };

        let token = Token::new(raw);
        match token.check() {
            TokenStatus::Valid(claims) => {
                info!(sub = ?claims.sub, role = ?claims.role_display(), "Session restored");
                let state = SessionState::Authenticated(token);
                *self.write_state() = state.clone();
                state
            }
            status => {
                info!(?status, "Discarding stored token");
                *self.write_state() = SessionState::Unauthenticated;
                self.clear_storage();
                SessionState::Unauthenticated
            }
        }
    }

    /// Current token, or `None` when unauthenticated.
    ///
    /// A token that expired after it was stored is never returned: the read
    /// detects it and ends the session.
    pub fn current_token(&self) -> Option<Token> {
        self.current_token_at(Utc::now())
    }

    /// [`current_token`](Self::current_token) against an explicit clock.
    pub fn current_token_at(&self, now: DateTime<Utc>) -> Option<Token> {
        let token = self.read_state().token().cloned()?;
        if token.check_at(now).is_valid() {
            return Some(token);
        }
        info!("Session token expired");
        self.invalidate(&token);
        None
    }

    pub fn state(&self) -> SessionState {
        match self.current_token() {
            Some(token) => SessionState::Authenticated(token),
            None => SessionState::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_token().is_some()
    }

    /// Exchange credentials for a token and make it the current session.
    ///
    /// On any failure the previous session is left as it was.
    pub async fn login(&self, api: &ApiClient, credentials: &Credentials) -> Result<Token, ApiError> {
        credentials.validate()?;

        let response = api.login(credentials).await?;
        let token = Token::new(response.token);

        match token.check() {
            TokenStatus::Valid(claims) => {
                if let Err(e) = self.inner.storage.write(token.as_str()) {
                    warn!(error = %e, "Failed to persist token, session will not survive restart");
                }
                *self.write_state() = SessionState::Authenticated(token.clone());
                info!(sub = ?claims.sub, role = ?claims.role_display(), "Login successful");
                Ok(token)
            }
            status => {
                warn!(?status, "Server issued an unusable token");
                Err(ApiError::Validation(
                    "Server returned an invalid or expired token".to_string(),
                ))
            }
        }
    }

    /// End the session. Always succeeds; storage failures are only logged.
    pub fn logout(&self) {
        *self.write_state() = SessionState::Unauthenticated;
        self.clear_storage();
        info!("Logged out");
    }

    /// End the session if `token` is still the current one.
    ///
    /// Returns `false` when a different session has replaced it in the
    /// meantime, which is then left alone.
    pub fn invalidate(&self, token: &Token) -> bool {
        {
            let mut state = self.write_state();
            if state.token() != Some(token) {
                return false;
            }
            *state = SessionState::Unauthenticated;
        }
        self.clear_storage();
        info!("Session invalidated");
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::auth::token::test_tokens::{access_token, mint};
    use crate::auth::MemoryTokenStore;

    struct BrokenStore;

    impl TokenStore for BrokenStore {
        fn read(&self) -> anyhow::Result<Option<String>> {
            Err(anyhow::anyhow!("disk unplugged"))
        }
        fn write(&self, _token: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk unplugged"))
        }
        fn clear(&self) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk unplugged"))
        }
    }

    fn store_with(token: &Token) -> (Arc<MemoryTokenStore>, SessionStore) {
        let storage = Arc::new(MemoryTokenStore::with_token(token.as_str()));
        let session = SessionStore::new(storage.clone());
        (storage, session)
    }

    #[test]
    fn test_new_store_is_unauthenticated() {
        let session = SessionStore::new(Arc::new(MemoryTokenStore::new()));
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(session.restore(), SessionState::Unauthenticated);
        assert!(session.current_token().is_none());
    }

    #[test]
    fn test_restore_valid_token() {
        let token = access_token(Duration::hours(1));
        let (storage, session) = store_with(&token);

        assert_eq!(session.restore(), SessionState::Authenticated(token.clone()));
        assert_eq!(session.current_token(), Some(token.clone()));
        assert_eq!(storage.read().unwrap().as_deref(), Some(token.as_str()));

        // A second handle sees the same session
        let other = session.clone();
        assert!(other.is_authenticated());
    }

    #[test]
    fn test_restore_expired_token_clears_storage() {
        let token = access_token(Duration::hours(-1));
        let (storage, session) = store_with(&token);

        assert_eq!(session.restore(), SessionState::Unauthenticated);
        assert!(session.current_token().is_none());
        assert_eq!(storage.read().unwrap(), None);
    }

    #[test]
    fn test_restore_wrong_type_clears_storage() {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let token = mint(serde_json::json!({ "exp": exp, "type": "refresh" }));
        let (storage, session) = store_with(&token);

        assert_eq!(session.restore(), SessionState::Unauthenticated);
        assert_eq!(storage.read().unwrap(), None);
    }

    #[test]
    fn test_restore_garbage_clears_storage() {
        let storage = Arc::new(MemoryTokenStore::with_token("garbage"));
        let session = SessionStore::new(storage.clone());

        assert_eq!(session.restore(), SessionState::Unauthenticated);
        assert_eq!(storage.read().unwrap(), None);
    }

    #[test]
    fn test_restore_with_unreadable_storage() {
        let session = SessionStore::new(Arc::new(BrokenStore));
        assert_eq!(session.restore(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_logout_always_unauthenticates() {
        let token = access_token(Duration::hours(1));
        let (storage, session) = store_with(&token);
        session.restore();

        session.logout();
        assert!(session.current_token().is_none());
        assert_eq!(storage.read().unwrap(), None);

        // Already logged out
        session.logout();
        assert!(session.current_token().is_none());

        // Storage failures do not keep the session alive
        let broken = SessionStore::new(Arc::new(BrokenStore));
        broken.logout();
        assert!(broken.current_token().is_none());
    }

    #[test]
    fn test_invalidate_only_matching_token() {
        let token = access_token(Duration::hours(1));
        let (storage, session) = store_with(&token);
        session.restore();

        let stale = access_token(Duration::hours(2));
        assert!(!session.invalidate(&stale));
        assert_eq!(session.current_token(), Some(token.clone()));

        assert!(session.invalidate(&token));
        assert!(session.current_token().is_none());
        assert_eq!(storage.read().unwrap(), None);

        // Nothing left to invalidate
        assert!(!session.invalidate(&token));
    }

    #[test]
    fn test_current_token_detects_expiry() {
        let token = access_token(Duration::hours(1));
        let (storage, session) = store_with(&token);
        assert!(matches!(session.restore(), SessionState::Authenticated(_)));

        // Still valid just before expiry
        let now = Utc::now();
        assert_eq!(session.current_token_at(now + Duration::minutes(59)), Some(token.clone()));

        assert!(session.current_token_at(now + Duration::hours(2)).is_none());
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert_eq!(storage.read().unwrap(), None);
    }
}
