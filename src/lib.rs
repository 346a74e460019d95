//! # Sesio (Session & Token Authority)
//!
//! `sesio` owns the credential-session lifecycle for a self-hosted
//! backend: it authenticates users, mints short-lived access tokens and
//! long-lived refresh tokens, rotates refresh tokens on use, and revokes
//! sessions one at a time or all at once.
//!
//! ## Token Model
//!
//! - **Access tokens** are HS256 JWTs carrying user id, email, role, and
//!   a typed `token_use` discriminator; they are never persisted.
//! - **Refresh tokens** are opaque 256-bit random values. Only a SHA-256
//!   digest is stored; the raw value is shown to the client exactly once.
//! - Every refresh token belongs to a **family** started at login.
//!   Rotation revokes the presented token and writes its successor into
//!   the same family.
//!
//! ## Reuse Detection
//!
//! Presenting an already-revoked refresh token is treated as theft: the
//! entire family is revoked, so both the attacker's copy and the
//! legitimate chain stop working and the owner must log in again. The
//! error message never distinguishes this from an expired or unknown
//! token; the signal is the consequence, not the message.
//!
//! ## Wiring
//!
//! The authority is an explicit value, constructed once and shared by
//! reference — there is no ambient global. Stores, password hashing, the
//! clock, and rate limiting are trait seams; Postgres and in-memory
//! store implementations ship in [`store`].

pub mod authority;
pub mod clock;
pub mod config;
pub mod error;
pub mod password;
pub mod rate_limit;
pub mod store;
pub mod token;
pub mod types;
pub mod user;

pub use authority::SessionAuthority;
pub use config::{AuthorityConfig, parse_expiry_to_seconds};
pub use error::Error;
pub use token::{AccessTokenClaims, TokenUse};
pub use types::{ClientMeta, LoginOutcome, SessionInfo, TokenPair};
pub use user::{Role, SafeUser, UserRecord, UserStatus};
