//! In-memory repository implementations for service unit tests.
//!
//! These honor the same atomicity contracts as a real backend (each mutating
//! method runs under one lock acquisition), so the services' concurrency
//! assumptions are exercised, not just their happy paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::repositories::{
    AccountRepository, IpBlockRepository, LoginHistoryRepository, RevokedTokenRepository,
    SecureTokenRepository, SessionRepository, TwoFactorRepository,
};
use crate::{
    Account, AccountId, BlockType, Error, IpBlockEntry, LoginHistoryEntry, NewAccount, Notifier,
    RevokedToken, SecureToken, SecurityEvent, Session, SessionId, TokenPurpose, TwoFactorRecord,
};

#[derive(Default)]
pub struct MockAccountRepository {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MockAccountRepository {
    pub fn with_account(account: Account) -> Self {
        let repo = Self::default();
        repo.accounts
            .lock()
            .unwrap()
            .insert(account.id.as_str().to_string(), account);
        repo
    }

    pub fn get(&self, id: &AccountId) -> Option<Account> {
        self.accounts.lock().unwrap().get(id.as_str()).cloned()
    }
}

#[async_trait]
impl AccountRepository for MockAccountRepository {
    async fn create(&self, new_account: NewAccount) -> Result<Account, Error> {
        let now = Utc::now();
        let account = Account {
            id: new_account.id.clone(),
            email: new_account.email,
            password_hash: new_account.password_hash,
            is_active: true,
            email_verified_at: new_account.email_verified_at,
            failed_login_attempts: 0,
            locked_until: None,
            last_failed_login_at: None,
            two_factor_enabled: false,
            refresh_token_hash: None,
            refresh_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(account.id.as_str().to_string(), account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, Error> {
        Ok(self.accounts.lock().unwrap().get(id.as_str()).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn find_by_refresh_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, Error> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.refresh_token_hash.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn update_password_hash(&self, id: &AccountId, password_hash: &str) -> Result<(), Error> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(id.as_str()) {
            account.password_hash = Some(password_hash.to_string());
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_failed_login(&self, id: &AccountId, now: DateTime<Utc>) -> Result<u32, Error> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(id.as_str())
            .ok_or(crate::error::StorageError::NotFound)?;
        account.failed_login_attempts += 1;
        account.last_failed_login_at = Some(now);
        Ok(account.failed_login_attempts)
    }

    async fn clear_failed_logins(&self, id: &AccountId) -> Result<(), Error> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(id.as_str()) {
            account.failed_login_attempts = 0;
            account.locked_until = None;
        }
        Ok(())
    }

    async fn lock(
        &self,
        id: &AccountId,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(id.as_str())
            .ok_or(crate::error::StorageError::NotFound)?;
        if account.locked_until.is_some_and(|until| until > now) {
            return Ok(false);
        }
        account.locked_until = Some(locked_until);
        Ok(true)
    }

    async fn set_refresh_token(
        &self,
        id: &AccountId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(id.as_str()) {
            account.refresh_token_hash = Some(token_hash.to_string());
            account.refresh_token_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: &AccountId,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(id.as_str())
            .ok_or(crate::error::StorageError::NotFound)?;
        if account.refresh_token_hash.as_deref() != Some(old_hash) {
            return Ok(false);
        }
        account.refresh_token_hash = Some(new_hash.to_string());
        account.refresh_token_expires_at = Some(expires_at);
        Ok(true)
    }

    async fn clear_refresh_token(&self, id: &AccountId) -> Result<(), Error> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(id.as_str()) {
            account.refresh_token_hash = None;
            account.refresh_token_expires_at = None;
        }
        Ok(())
    }

    async fn set_two_factor_enabled(&self, id: &AccountId, enabled: bool) -> Result<(), Error> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(id.as_str()) {
            account.two_factor_enabled = enabled;
        }
        Ok(())
    }

    async fn mark_email_verified(&self, id: &AccountId, at: DateTime<Utc>) -> Result<(), Error> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(id.as_str()) {
            account.email_verified_at = Some(at);
        }
        Ok(())
    }

    async fn set_active(&self, id: &AccountId, is_active: bool) -> Result<(), Error> {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(id.as_str()) {
            account.is_active = is_active;
        }
        Ok(())
    }

    async fn delete(&self, id: &AccountId) -> Result<(), Error> {
        self.accounts.lock().unwrap().remove(id.as_str());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSessionRepository {
    sessions: Mutex<HashMap<String, Session>>,
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.as_str().to_string(), session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, Error> {
        Ok(self.sessions.lock().unwrap().get(id.as_str()).cloned())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, Error> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn list_for_account(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| &s.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn touch(&self, id: &SessionId, at: DateTime<Utc>) -> Result<(), Error> {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(id.as_str()) {
            session.last_active_at = at;
        }
        Ok(())
    }

    async fn set_access_token(
        &self,
        id: &SessionId,
        access_token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(id.as_str()) {
            session.access_token_hash = Some(access_token_hash.to_string());
            session.access_token_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Error> {
        self.sessions.lock().unwrap().remove(id.as_str());
        Ok(())
    }

    async fn delete_for_account(&self, account_id: &AccountId) -> Result<Vec<Session>, Error> {
        let mut sessions = self.sessions.lock().unwrap();
        let removed: Vec<Session> = sessions
            .values()
            .filter(|s| &s.account_id == account_id)
            .cloned()
            .collect();
        for session in &removed {
            sessions.remove(session.id.as_str());
        }
        Ok(removed)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockRevokedTokenRepository {
    tokens: Mutex<HashMap<String, RevokedToken>>,
}

#[async_trait]
impl RevokedTokenRepository for MockRevokedTokenRepository {
    async fn revoke(&self, token: RevokedToken) -> Result<(), Error> {
        self.tokens
            .lock()
            .unwrap()
            .entry(token.token_hash.clone())
            .or_insert(token);
        Ok(())
    }

    async fn revoke_all(&self, tokens: Vec<RevokedToken>) -> Result<(), Error> {
        let mut map = self.tokens.lock().unwrap();
        for token in tokens {
            map.entry(token.token_hash.clone()).or_insert(token);
        }
        Ok(())
    }

    async fn is_revoked(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(token_hash)
            .is_some_and(|t| t.expires_at > now))
    }

    async fn list_for_account(&self, account_id: &AccountId) -> Result<Vec<RevokedToken>, Error> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .values()
            .filter(|t| &t.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        Ok((before - tokens.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockSecureTokenRepository {
    tokens: Mutex<HashMap<String, SecureToken>>,
}

#[async_trait]
impl SecureTokenRepository for MockSecureTokenRepository {
    async fn create(&self, token: SecureToken) -> Result<SecureToken, Error> {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.token_hash.clone(), token.clone());
        Ok(token)
    }

    async fn peek(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<SecureToken>, Error> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(token_hash)
            .filter(|t| t.purpose == purpose)
            .cloned())
    }

    async fn consume(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.get_mut(token_hash) {
            Some(token) if token.purpose == purpose && token.used_at.is_none() => {
                token.used_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn invalidate_for_account(
        &self,
        account_id: &AccountId,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut tokens = self.tokens.lock().unwrap();
        let mut invalidated = 0;
        for token in tokens.values_mut() {
            if &token.account_id == account_id && token.purpose == purpose && token.used_at.is_none()
            {
                token.used_at = Some(now);
                invalidated += 1;
            }
        }
        Ok(invalidated)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        Ok((before - tokens.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockTwoFactorRepository {
    records: Mutex<HashMap<String, TwoFactorRecord>>,
    backup_codes: Mutex<HashMap<String, HashSet<String>>>,
}

#[async_trait]
impl TwoFactorRepository for MockTwoFactorRepository {
    async fn upsert(&self, record: TwoFactorRecord) -> Result<TwoFactorRecord, Error> {
        self.records
            .lock()
            .unwrap()
            .insert(record.account_id.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn find_by_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<TwoFactorRecord>, Error> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(account_id.as_str())
            .cloned())
    }

    async fn set_enabled(
        &self,
        account_id: &AccountId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        if let Some(record) = self.records.lock().unwrap().get_mut(account_id.as_str()) {
            record.is_enabled = enabled;
            record.updated_at = now;
        }
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<u32, Error> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(account_id.as_str())
            .ok_or(crate::error::StorageError::NotFound)?;
        record.failed_attempts += 1;
        record.updated_at = now;
        Ok(record.failed_attempts)
    }

    async fn clear_failed_attempts(&self, account_id: &AccountId) -> Result<(), Error> {
        if let Some(record) = self.records.lock().unwrap().get_mut(account_id.as_str()) {
            record.failed_attempts = 0;
            record.locked_until = None;
        }
        Ok(())
    }

    async fn lock(
        &self,
        account_id: &AccountId,
        locked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(account_id.as_str())
            .ok_or(crate::error::StorageError::NotFound)?;
        if record.locked_until.is_some_and(|until| until > now) {
            return Ok(false);
        }
        record.locked_until = Some(locked_until);
        Ok(true)
    }

    async fn advance_last_used_step(
        &self,
        account_id: &AccountId,
        step: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(account_id.as_str())
            .ok_or(crate::error::StorageError::NotFound)?;
        if step <= record.last_used_step {
            return Ok(false);
        }
        record.last_used_step = step;
        record.updated_at = now;
        Ok(true)
    }

    async fn replace_backup_codes(
        &self,
        account_id: &AccountId,
        code_hashes: Vec<String>,
        _now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.backup_codes.lock().unwrap().insert(
            account_id.as_str().to_string(),
            code_hashes.into_iter().collect(),
        );
        Ok(())
    }

    async fn consume_backup_code(
        &self,
        account_id: &AccountId,
        code_hash: &str,
    ) -> Result<bool, Error> {
        let mut codes = self.backup_codes.lock().unwrap();
        Ok(codes
            .get_mut(account_id.as_str())
            .is_some_and(|set| set.remove(code_hash)))
    }

    async fn count_backup_codes(&self, account_id: &AccountId) -> Result<u32, Error> {
        Ok(self
            .backup_codes
            .lock()
            .unwrap()
            .get(account_id.as_str())
            .map_or(0, |set| set.len() as u32))
    }

    async fn delete_for_account(&self, account_id: &AccountId) -> Result<(), Error> {
        self.records.lock().unwrap().remove(account_id.as_str());
        self.backup_codes.lock().unwrap().remove(account_id.as_str());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockIpBlockRepository {
    entries: Mutex<Vec<IpBlockEntry>>,
    next_id: AtomicU64,
}

#[async_trait]
impl IpBlockRepository for MockIpBlockRepository {
    async fn create(&self, entry: IpBlockEntry) -> Result<IpBlockEntry, Error> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn find_exact(&self, ip: IpAddr, now: DateTime<Utc>) -> Result<Vec<IpBlockEntry>, Error> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.is_in_force(now)
                    && e.ip_address
                        .as_deref()
                        .is_some_and(|a| a.parse::<IpAddr>() == Ok(ip))
            })
            .cloned()
            .collect())
    }

    async fn list_active_ranges(&self, now: DateTime<Utc>) -> Result<Vec<IpBlockEntry>, Error> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_in_force(now) && e.cidr_range.is_some())
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<IpBlockEntry>, Error> {
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn upsert_auto_block(
        &self,
        ip: IpAddr,
        block_type: BlockType,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<IpBlockEntry, Error> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|e| {
            e.block_type == block_type
                && e.is_in_force(now)
                && e.ip_address
                    .as_deref()
                    .is_some_and(|a| a.parse::<IpAddr>() == Ok(ip))
        }) {
            entry.hit_count += 1;
            entry.expires_at = Some(expires_at);
            return Ok(entry.clone());
        }
        let entry = IpBlockEntry {
            id: format!("ipb_{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            ip_address: Some(ip.to_string()),
            cidr_range: None,
            block_type,
            hit_count: 1,
            expires_at: Some(expires_at),
            is_active: true,
            created_at: now,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn deactivate(&self, id: &str) -> Result<(), Error> {
        if let Some(entry) = self.entries.lock().unwrap().iter_mut().find(|e| e.id == id) {
            entry.is_active = false;
        }
        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.expires_at.map_or(true, |at| at > now));
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockLoginHistoryRepository {
    entries: Mutex<Vec<LoginHistoryEntry>>,
}

impl MockLoginHistoryRepository {
    pub fn entries(&self) -> Vec<LoginHistoryEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoginHistoryRepository for MockLoginHistoryRepository {
    async fn record(&self, entry: LoginHistoryEntry) -> Result<(), Error> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn list_for_account(
        &self,
        account_id: &AccountId,
        limit: u32,
    ) -> Result<Vec<LoginHistoryEntry>, Error> {
        let entries = self.entries.lock().unwrap();
        let mut matched: Vec<LoginHistoryEntry> = entries
            .iter()
            .filter(|e| e.account_id.as_ref() == Some(account_id))
            .cloned()
            .collect();
        matched.reverse();
        matched.truncate(limit as usize);
        Ok(matched)
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut entries = self.entries.lock().unwrap();
        let count = entries.len();
        entries.retain(|e| e.created_at >= before);
        Ok((count - entries.len()) as u64)
    }
}

/// Notifier that records every event it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(SecurityEvent, AccountId)>>,
}

impl RecordingNotifier {
    pub fn events_of(&self, event: SecurityEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        event: SecurityEvent,
        account_id: &AccountId,
        _data: serde_json::Value,
    ) -> Result<(), Error> {
        self.events.lock().unwrap().push((event, account_id.clone()));
        Ok(())
    }
}

/// A fresh active account with a verified email and the given password hash.
pub fn test_account(password_hash: Option<String>) -> Account {
    let now = Utc::now();
    Account {
        id: AccountId::new_random(),
        email: format!("{}@example.com", AccountId::new_random()),
        password_hash,
        is_active: true,
        email_verified_at: Some(now),
        failed_login_attempts: 0,
        locked_until: None,
        last_failed_login_at: None,
        two_factor_enabled: false,
        refresh_token_hash: None,
        refresh_token_expires_at: None,
        created_at: now,
        updated_at: now,
    }
}
