//! Session lifecycle
//!
//! Creation mints an opaque 256-bit token and persists only its hash;
//! validation looks the hash up and throttles `last_active_at` writes so a
//! chatty client does not turn every request into an UPDATE. Revocation
//! returns the deleted rows so the caller can push their outstanding access
//! tokens into the revocation registry.

use std::sync::Arc;

use crate::{
    config::SessionConfig,
    error::{AuthError, Error},
    repositories::SessionRepository,
    AccountId, Clock, Session, SessionId, SessionToken,
};

pub struct SessionService<S: SessionRepository> {
    sessions: Arc<S>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl<S: SessionRepository> SessionService<S> {
    pub fn new(sessions: Arc<S>, config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions,
            config,
            clock,
        }
    }

    /// Create a session for the account and return it with the raw token.
    /// The token is not recoverable later; only its hash is stored.
    pub async fn create_session(
        &self,
        account_id: &AccountId,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Result<(Session, SessionToken), Error> {
        let now = self.clock.now();
        let token = SessionToken::new_random();

        let session = Session::builder()
            .account_id(account_id.clone())
            .token_hash(token.hash())
            .device_info(device_info)
            .ip_address(ip_address)
            .created_at(now)
            .expires_at(now + self.config.lifetime)
            .build()?;

        let session = self.sessions.create(session).await?;
        tracing::debug!(account_id = %account_id, session_id = %session.id, "Session created");
        Ok((session, token))
    }

    /// Resolve a raw session token to its live session.
    ///
    /// Expired sessions are deleted on sight and reported as
    /// [`AuthError::TokenExpired`]. Activity is stamped at most once per
    /// `activity_update_interval`.
    pub async fn validate(&self, token: &SessionToken) -> Result<Session, Error> {
        let mut session = self
            .sessions
            .find_by_token_hash(&token.hash())
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let now = self.clock.now();
        if session.is_expired(now) {
            self.sessions.delete(&session.id).await?;
            return Err(AuthError::TokenExpired.into());
        }

        if now - session.last_active_at >= self.config.activity_update_interval {
            self.sessions.touch(&session.id, now).await?;
            session.last_active_at = now;
        }

        Ok(session)
    }

    pub async fn get(&self, id: &SessionId) -> Result<Option<Session>, Error> {
        self.sessions.find_by_id(id).await
    }

    /// Stamp activity for a session resolved by other means (an access JWT
    /// carrying its id), with the same throttling as [`Self::validate`].
    pub async fn touch_activity(&self, session: &Session) -> Result<(), Error> {
        let now = self.clock.now();
        if now - session.last_active_at >= self.config.activity_update_interval {
            self.sessions.touch(&session.id, now).await?;
        }
        Ok(())
    }

    /// All sessions for the account, expired ones filtered out.
    pub async fn list_sessions(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        let now = self.clock.now();
        let sessions = self.sessions.list_for_account(account_id).await?;
        Ok(sessions.into_iter().filter(|s| !s.is_expired(now)).collect())
    }

    /// Remember the latest access JWT minted for a session so revoking the
    /// session can blacklist it.
    pub async fn record_access_token(
        &self,
        session_id: &SessionId,
        access_token_hash: &str,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), Error> {
        self.sessions
            .set_access_token(session_id, access_token_hash, expires_at)
            .await
    }

    /// Delete one session, returning it if it existed.
    pub async fn revoke(&self, session_id: &SessionId) -> Result<Option<Session>, Error> {
        let session = self.sessions.find_by_id(session_id).await?;
        if session.is_some() {
            self.sessions.delete(session_id).await?;
            tracing::info!(session_id = %session_id, "Session revoked");
        }
        Ok(session)
    }

    /// Delete every session for the account, returning the deleted rows.
    pub async fn revoke_all(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        let revoked = self.sessions.delete_for_account(account_id).await?;
        tracing::info!(
            account_id = %account_id,
            count = revoked.len(),
            "All sessions revoked"
        );
        Ok(revoked)
    }

    pub async fn cleanup_expired(&self) -> Result<u64, Error> {
        self.sessions.cleanup_expired(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::MockSessionRepository;
    use crate::TestClock;
    use chrono::Duration;

    fn service(clock: Arc<TestClock>) -> SessionService<MockSessionRepository> {
        SessionService::new(
            Arc::new(MockSessionRepository::default()),
            SessionConfig::default(),
            clock,
        )
    }

    #[tokio::test]
    async fn test_create_and_validate() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock.clone());
        let account_id = AccountId::new_random();

        let (session, token) = service
            .create_session(&account_id, Some("Firefox on Linux".to_string()), None)
            .await
            .unwrap();

        let found = service.validate(&token).await.unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.account_id, account_id);
        assert_eq!(found.device_info.as_deref(), Some("Firefox on Linux"));
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock);

        let result = service.validate(&SessionToken::new_random()).await;
        assert!(matches!(result, Err(Error::Auth(AuthError::TokenInvalid))));
    }

    #[tokio::test]
    async fn test_expired_session_deleted_on_validate() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock.clone());
        let account_id = AccountId::new_random();

        let (session, token) = service.create_session(&account_id, None, None).await.unwrap();

        clock.advance(Duration::days(31));
        let result = service.validate(&token).await;
        assert!(matches!(result, Err(Error::Auth(AuthError::TokenExpired))));

        // The row is gone, not just rejected
        assert!(service.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activity_writes_are_throttled() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock.clone());
        let account_id = AccountId::new_random();
        let created = clock.now();

        let (_, token) = service.create_session(&account_id, None, None).await.unwrap();

        clock.advance(Duration::seconds(30));
        let session = service.validate(&token).await.unwrap();
        assert_eq!(session.last_active_at, created);

        clock.advance(Duration::seconds(31));
        let session = service.validate(&token).await.unwrap();
        assert_eq!(session.last_active_at, clock.now());
    }

    #[tokio::test]
    async fn test_revoke_all_returns_sessions() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock);
        let account_id = AccountId::new_random();
        let other = AccountId::new_random();

        let (_, token_a) = service.create_session(&account_id, None, None).await.unwrap();
        let (_, token_b) = service.create_session(&account_id, None, None).await.unwrap();
        let (_, token_other) = service.create_session(&other, None, None).await.unwrap();

        let revoked = service.revoke_all(&account_id).await.unwrap();
        assert_eq!(revoked.len(), 2);

        assert!(service.validate(&token_a).await.is_err());
        assert!(service.validate(&token_b).await.is_err());
        // The other account is untouched
        assert!(service.validate(&token_other).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_reaps_only_expired() {
        let clock = Arc::new(TestClock::starting_now());
        let service = service(clock.clone());
        let account_id = AccountId::new_random();

        service.create_session(&account_id, None, None).await.unwrap();
        clock.advance(Duration::days(15));
        service.create_session(&account_id, None, None).await.unwrap();

        clock.advance(Duration::days(16));
        // First session (31 days old) is expired, second (16 days) is not
        assert_eq!(service.cleanup_expired().await.unwrap(), 1);
        assert_eq!(service.list_sessions(&account_id).await.unwrap().len(), 1);
    }
}
