//! The session/token authority: credential login, refresh-token
//! rotation, reuse detection, and session management.
//!
//! The authority holds no mutable state of its own; any number of
//! instances may run against the same backing store. Rotation revokes
//! the presented token before its replacement is written, so a replayed
//! token always lands in the not-found branch where the reuse check
//! burns the whole family.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::AuthorityConfig;
use crate::error::Error;
use crate::password::PasswordHasher;
use crate::rate_limit::{NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter};
use crate::store::{CredentialStore, NewRefreshToken, RefreshTokenStore};
use crate::token::{
    AccessTokenClaims, AccessTokenSigner, generate_refresh_token, hash_refresh_token,
};
use crate::types::{ClientMeta, LoginOutcome, SessionInfo, TokenPair};
use crate::user::{SafeUser, UserRecord, UserStatus, normalize_email};

// Credential and token failures share fixed messages; nothing about the
// specific failed check may be observable in the response.
pub(crate) const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub(crate) const INVALID_REFRESH_TOKEN: &str = "Invalid or expired refresh token";
pub(crate) const USER_NOT_FOUND: &str = "User not found";

pub struct SessionAuthority {
    config: AuthorityConfig,
    signer: AccessTokenSigner,
    credentials: Arc<dyn CredentialStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    password_hasher: Arc<dyn PasswordHasher>,
    rate_limiter: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl SessionAuthority {
    /// Wire the authority against its stores. Defaults to the system
    /// clock and a no-op rate limiter.
    pub fn new(
        config: AuthorityConfig,
        credentials: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        password_hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let signer = AccessTokenSigner::new(config.signing_secret());
        Self {
            config,
            signer,
            credentials,
            refresh_tokens,
            password_hasher,
            rate_limiter: Arc::new(NoopRateLimiter),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Authenticate credentials and start a new session lineage.
    ///
    /// Unknown email, deleted user, and wrong password are
    /// indistinguishable in the returned error.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] on any credential mismatch,
    /// [`Error::RateLimited`] when a limiter rejects the attempt, and
    /// [`Error::Internal`] on storage failure.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: ClientMeta,
    ) -> Result<LoginOutcome, Error> {
        let email = normalize_email(email);
        self.check_rate_limits(&email, &client, RateLimitAction::Login)?;

        let user = self
            .credentials
            .find_by_email(&email)
            .await
            .map_err(Error::internal)?;
        let Some(user) = user else {
            return Err(Error::Unauthorized(INVALID_CREDENTIALS));
        };
        if user.status != UserStatus::Active {
            return Err(Error::Unauthorized(INVALID_CREDENTIALS));
        }
        if !self.password_hasher.verify(password, &user.password_hash) {
            return Err(Error::Unauthorized(INVALID_CREDENTIALS));
        }

        // Fresh family: this is a new login lineage, not a rotation.
        let tokens = self
            .issue_pair(&user, Uuid::new_v4(), &client, self.clock.now())
            .await?;

        Ok(LoginOutcome {
            user: SafeUser::from(&user),
            tokens,
        })
    }

    /// Exchange a valid refresh token for a fresh pair, revoking the
    /// presented token and keeping its family.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] with one generic message whether the token
    /// never existed, expired, was already revoked, or was detected as
    /// reused; [`Error::Internal`] on storage failure.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: ClientMeta,
    ) -> Result<TokenPair, Error> {
        if self
            .rate_limiter
            .check_ip(client.ip_address.as_deref(), RateLimitAction::Refresh)
            == RateLimitDecision::Limited
        {
            return Err(Error::RateLimited);
        }

        let hash = hash_refresh_token(refresh_token);
        let now = self.clock.now();

        let record = self
            .refresh_tokens
            .find_valid_by_hash(&hash, now)
            .await
            .map_err(Error::internal)?;
        let Some(record) = record else {
            // Not valid: either junk, expired, or a replay of a consumed
            // token. The reuse probe burns the family in the last case;
            // the caller sees the same error regardless.
            self.revoke_family_on_reuse(&hash, now).await?;
            return Err(Error::Unauthorized(INVALID_REFRESH_TOKEN));
        };

        // Revoke before issuing the replacement. The conditional revoke
        // also arbitrates concurrent rotations of the same token: the
        // loser must not mint a second child.
        let newly_revoked = self
            .refresh_tokens
            .revoke(record.id, now)
            .await
            .map_err(Error::internal)?;
        if !newly_revoked {
            return Err(Error::Unauthorized(INVALID_REFRESH_TOKEN));
        }
        self.refresh_tokens
            .update_last_used(record.id, now)
            .await
            .map_err(Error::internal)?;

        let user = self
            .credentials
            .find_by_id(record.user_id)
            .await
            .map_err(Error::internal)?;
        let user = match user {
            Some(user) if user.status == UserStatus::Active => user,
            // The token was valid but its owner is gone; it stays
            // revoked and no replacement is issued.
            _ => return Err(Error::Unauthorized(USER_NOT_FOUND)),
        };

        self.issue_pair(&user, record.family, &client, now).await
    }

    /// Probe for reuse of an already-revoked token and burn its family.
    ///
    /// Returns `true` when reuse was detected, so the caller can force a
    /// full re-authentication or alert the user.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub async fn detect_token_reuse(&self, refresh_token: &str) -> Result<bool, Error> {
        let hash = hash_refresh_token(refresh_token);
        self.revoke_family_on_reuse(&hash, self.clock.now()).await
    }

    /// Revoke the presented token if it is still live. Idempotent and
    /// deliberately silent about whether anything was revoked.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), Error> {
        let hash = hash_refresh_token(refresh_token);
        let now = self.clock.now();
        let record = self
            .refresh_tokens
            .find_valid_by_hash(&hash, now)
            .await
            .map_err(Error::internal)?;
        if let Some(record) = record {
            self.refresh_tokens
                .revoke(record.id, now)
                .await
                .map_err(Error::internal)?;
        }
        Ok(())
    }

    /// Sign out everywhere: revoke every live token for the user across
    /// all families. Returns how many were revoked.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub async fn logout_all_devices(&self, user_id: Uuid) -> Result<u64, Error> {
        self.refresh_tokens
            .revoke_all_for_user(user_id, self.clock.now())
            .await
            .map_err(Error::internal)
    }

    /// List the user's live sessions, marking the one matching
    /// `current_token` when supplied.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub async fn active_sessions(
        &self,
        user_id: Uuid,
        current_token: Option<&str>,
    ) -> Result<Vec<SessionInfo>, Error> {
        let current_hash = current_token.map(hash_refresh_token);
        let records = self
            .refresh_tokens
            .active_sessions_for_user(user_id, self.clock.now())
            .await
            .map_err(Error::internal)?;

        Ok(records
            .into_iter()
            .map(|record| SessionInfo {
                is_current: current_hash.as_deref() == Some(record.token_hash.as_slice()),
                id: record.id,
                ip_address: record.ip_address,
                user_agent: record.user_agent,
                created_at: record.issued_at,
                last_used_at: record.last_used_at,
            })
            .collect())
    }

    /// Revoke one of the caller's own sessions. The ownership check is
    /// mandatory: a guessed id belonging to someone else is `Forbidden`,
    /// an id matching nothing at all is `NotFound`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::Forbidden`], or [`Error::Internal`].
    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> Result<(), Error> {
        let record = self
            .refresh_tokens
            .find_by_id(session_id)
            .await
            .map_err(Error::internal)?;
        let Some(record) = record else {
            return Err(Error::NotFound);
        };
        if record.user_id != user_id {
            return Err(Error::Forbidden);
        }
        self.refresh_tokens
            .revoke(record.id, self.clock.now())
            .await
            .map_err(Error::internal)?;
        Ok(())
    }

    /// Verify an access token for the consuming request layer.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] for anything but a well-formed, unexpired
    /// access token signed with this authority's key.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, Error> {
        self.signer.verify(token, self.clock.now())
    }

    async fn revoke_family_on_reuse(
        &self,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let revoked = self
            .refresh_tokens
            .find_revoked_by_hash(hash)
            .await
            .map_err(Error::internal)?;
        let Some(revoked) = revoked else {
            return Ok(false);
        };

        let burned = self
            .refresh_tokens
            .revoke_all_for_family(revoked.family, now)
            .await
            .map_err(Error::internal)?;
        warn!(
            user_id = %revoked.user_id,
            family = %revoked.family,
            revoked = burned,
            "revoked refresh token presented again; family invalidated"
        );
        Ok(true)
    }

    async fn issue_pair(
        &self,
        user: &UserRecord,
        family: Uuid,
        client: &ClientMeta,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, Error> {
        let access_ttl = self.config.access_token_ttl_seconds();
        let refresh_ttl = self.config.refresh_token_ttl_seconds();

        let refresh_token = generate_refresh_token().map_err(Error::internal)?;
        self.refresh_tokens
            .create(NewRefreshToken {
                user_id: user.id,
                token_hash: hash_refresh_token(&refresh_token),
                family,
                issued_at: now,
                expires_at: now + Duration::seconds(refresh_ttl),
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
            })
            .await
            .map_err(Error::internal)?;

        let access_token = self.signer.sign(user, now, access_ttl)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: access_ttl.unsigned_abs(),
        })
    }

    fn check_rate_limits(
        &self,
        email: &str,
        client: &ClientMeta,
        action: RateLimitAction,
    ) -> Result<(), Error> {
        if self.rate_limiter.check_email(email, action) == RateLimitDecision::Limited {
            return Err(Error::RateLimited);
        }
        if self
            .rate_limiter
            .check_ip(client.ip_address.as_deref(), action)
            == RateLimitDecision::Limited
        {
            return Err(Error::RateLimited);
        }
        Ok(())
    }
}
