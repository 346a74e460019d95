//! In-memory store for tests and single-node embedded use.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CredentialStore, NewRefreshToken, RefreshTokenRecord, RefreshTokenStore};
use crate::user::{UserRecord, UserStatus, normalize_email};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    tokens: HashMap<Uuid, RefreshTokenRecord>,
}

/// Backs both store traits with a single mutex-guarded map pair.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user record. Replaces any existing record with the same id.
    pub async fn add_user(&self, user: UserRecord) {
        let mut inner = self.inner.lock().await;
        inner.users.insert(user.id, user);
    }

    /// Flip a user's lifecycle state; used to exercise soft-delete paths.
    pub async fn set_user_status(&self, id: Uuid, status: UserStatus) {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&id) {
            user.status = status;
        }
    }

    /// Number of persisted token records, live or revoked.
    pub async fn token_count(&self) -> usize {
        self.inner.lock().await.tokens.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let needle = normalize_email(email);
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|user| normalize_email(&user.email) == needle)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord> {
        let mut inner = self.inner.lock().await;
        if inner
            .tokens
            .values()
            .any(|existing| existing.token_hash == token.token_hash)
        {
            bail!("refresh token hash already exists");
        }
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            family: token.family,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked_at: None,
            ip_address: token.ip_address,
            user_agent: token.user_agent,
            last_used_at: None,
        };
        inner.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_valid_by_hash(
        &self,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tokens
            .values()
            .find(|record| {
                record.token_hash == hash
                    && record.revoked_at.is_none()
                    && record.expires_at > now
            })
            .cloned())
    }

    async fn find_revoked_by_hash(&self, hash: &[u8]) -> Result<Option<RefreshTokenRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tokens
            .values()
            .find(|record| record.token_hash == hash && record.revoked_at.is_some())
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.tokens.get(&id).cloned())
    }

    async fn revoke(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.tokens.get_mut(&id) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut revoked = 0;
        for record in inner.tokens.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_all_for_family(&self, family: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut revoked = 0;
        for record in inner.tokens.values_mut() {
            if record.family == family && record.revoked_at.is_none() {
                record.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.tokens.get_mut(&id) {
            record.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn active_sessions_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<RefreshTokenRecord> = inner
            .tokens
            .values()
            .filter(|record| {
                record.user_id == user_id
                    && record.revoked_at.is_none()
                    && record.expires_at > now
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::store::{NewRefreshToken, RefreshTokenStore};
    use anyhow::Result;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn new_token(user_id: Uuid, hash: &[u8]) -> NewRefreshToken {
        let now = Utc::now();
        NewRefreshToken {
            user_id,
            token_hash: hash.to_vec(),
            family: Uuid::new_v4(),
            issued_at: now,
            expires_at: now + Duration::days(30),
            ip_address: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_hashes() -> Result<()> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        store.create(new_token(user_id, b"hash")).await?;

        let result = store.create(new_token(user_id, b"hash")).await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn revoke_reports_whether_it_flipped_the_record() -> Result<()> {
        let store = MemoryStore::new();
        let record = store.create(new_token(Uuid::new_v4(), b"hash")).await?;
        let now = Utc::now();

        assert!(store.revoke(record.id, now).await?);
        assert!(!store.revoke(record.id, now).await?);
        assert!(!store.revoke(Uuid::new_v4(), now).await?);
        Ok(())
    }

    #[tokio::test]
    async fn valid_lookup_excludes_expired_records() -> Result<()> {
        let store = MemoryStore::new();
        let record = store.create(new_token(Uuid::new_v4(), b"hash")).await?;

        let before_expiry = record.expires_at - Duration::seconds(1);
        assert!(store.find_valid_by_hash(b"hash", before_expiry).await?.is_some());

        let after_expiry = record.expires_at + Duration::seconds(1);
        assert!(store.find_valid_by_hash(b"hash", after_expiry).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn active_sessions_sorted_newest_first() -> Result<()> {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let mut older = new_token(user_id, b"older");
        older.issued_at = now - Duration::hours(2);
        let mut newer = new_token(user_id, b"newer");
        newer.issued_at = now - Duration::hours(1);
        store.create(older).await?;
        store.create(newer).await?;

        let sessions = store.active_sessions_for_user(user_id, now).await?;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].token_hash, b"newer");
        assert_eq!(sessions[1].token_hash, b"older");
        Ok(())
    }
}
