//! Plain data structures returned by the authority.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::user::SafeUser;

/// Access/refresh pair handed to the client. `expires_in` is the
/// access-token lifetime in seconds.
#[derive(Clone, Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Result of a successful login.
#[derive(Clone, Debug, Serialize)]
pub struct LoginOutcome {
    pub user: SafeUser,
    pub tokens: TokenPair,
}

/// Advisory request provenance recorded alongside a refresh token. Never
/// used for authorization decisions.
#[derive(Clone, Debug, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One live session as shown to its owner. Carries derived and
/// provenance fields only; the token hash itself is never exposed.
#[derive(Clone, Debug, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_current: bool,
}
