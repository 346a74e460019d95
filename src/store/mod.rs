//! Storage seams consumed by the authority.
//!
//! Both traits are object-safe and held as `Arc<dyn …>` so deployments
//! pick a backend at wiring time. Timestamps are caller-supplied: the
//! authority's injected clock is the single source of time, and adapters
//! never call the system clock themselves.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::user::UserRecord;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgCredentialStore, PgRefreshTokenStore, run_migrations};

/// One persisted refresh token. Records are revoked, never deleted, by
/// this subsystem; retention is the storage layer's concern.
#[derive(Clone, Debug)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: Vec<u8>,
    /// Shared by every token descended from a single login; bounds the
    /// blast radius when reuse is detected.
    pub family: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Fields the authority supplies when persisting a token; the store
/// assigns the id.
#[derive(Clone, Debug)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: Vec<u8>,
    pub family: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Lookup by id. Deleted users are returned with their `Deleted`
    /// status so the caller can branch on the lifecycle state.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord>;

    /// Find a record that is neither revoked nor expired as of `now`.
    async fn find_valid_by_hash(
        &self,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>>;

    /// Find an already-revoked record by hash; the reuse-detection probe.
    async fn find_revoked_by_hash(&self, hash: &[u8]) -> Result<Option<RefreshTokenRecord>>;

    /// Lookup by id regardless of owner or state.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>>;

    /// Revoke a single record. Returns `true` only when this call flipped
    /// the record from live to revoked; a concurrent rotation that loses
    /// this conditional write must not issue a replacement.
    async fn revoke(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Revoke every live record for the user, across families.
    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64>;

    /// Revoke every live record in the family.
    async fn revoke_all_for_family(&self, family: Uuid, at: DateTime<Utc>) -> Result<u64>;

    /// Stamp `last_used_at` on a record; audit trail for the consumed
    /// parent during rotation.
    async fn update_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// All live records for the user as of `now`, newest first.
    async fn active_sessions_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>>;
}
