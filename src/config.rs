//! Authority configuration and token lifetime parsing.

use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

const DEFAULT_ACCESS_TOKEN_TTL: &str = "15m";
const DEFAULT_REFRESH_TOKEN_TTL: &str = "30d";
const FALLBACK_ACCESS_TTL_SECONDS: i64 = 900;
const FALLBACK_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const MIN_SECRET_BYTES: usize = 32;

/// Configuration for [`crate::SessionAuthority`].
///
/// Lifetimes are duration strings of the form `<integer><unit>` with unit
/// `s`, `m`, `h`, or `d`. An unparseable string falls back to the default
/// lifetime instead of failing token issuance.
pub struct AuthorityConfig {
    signing_secret: SecretString,
    access_token_ttl: String,
    refresh_token_ttl: String,
}

impl AuthorityConfig {
    /// Build a configuration around the access-token signing secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the secret is shorter than 32
    /// bytes. This is checked once here so a weak key can never surface as
    /// a per-request failure.
    pub fn new(signing_secret: SecretString) -> Result<Self, Error> {
        if signing_secret.expose_secret().len() < MIN_SECRET_BYTES {
            return Err(Error::Configuration(format!(
                "signing secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        Ok(Self {
            signing_secret,
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL.to_string(),
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL.to_string(),
        })
    }

    #[must_use]
    pub fn with_access_token_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.access_token_ttl = ttl.into();
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl(mut self, ttl: impl Into<String>) -> Self {
        self.refresh_token_ttl = ttl.into();
        self
    }

    pub(crate) fn signing_secret(&self) -> &SecretString {
        &self.signing_secret
    }

    /// Access-token lifetime in seconds; this is the `expires_in` callers see.
    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        parse_expiry_to_seconds(&self.access_token_ttl)
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        parse_duration_seconds(&self.refresh_token_ttl).unwrap_or(FALLBACK_REFRESH_TTL_SECONDS)
    }
}

/// Parse a `<integer><unit>` duration string into seconds, falling back to
/// 900 (15 minutes) when the string is unparseable. Issuance never
/// hard-fails on a misconfigured lifetime.
#[must_use]
pub fn parse_expiry_to_seconds(raw: &str) -> i64 {
    parse_duration_seconds(raw).unwrap_or(FALLBACK_ACCESS_TTL_SECONDS)
}

fn parse_duration_seconds(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.len() < 2 {
        return None;
    }
    let (number, unit) = trimmed.split_at(trimmed.len() - 1);
    let value: i64 = number.parse().ok().filter(|value| *value > 0)?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };
    value.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::{AuthorityConfig, parse_expiry_to_seconds};
    use crate::error::Error;
    use secrecy::SecretString;

    fn test_secret() -> SecretString {
        SecretString::from("sesio-test-secret-with-plenty-of-bytes".to_string())
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthorityConfig::new(test_secret()).expect("config should build");
        assert_eq!(config.access_token_ttl_seconds(), 900);
        assert_eq!(config.refresh_token_ttl_seconds(), 30 * 24 * 60 * 60);

        let config = config
            .with_access_token_ttl("1h")
            .with_refresh_token_ttl("7d");
        assert_eq!(config.access_token_ttl_seconds(), 3600);
        assert_eq!(config.refresh_token_ttl_seconds(), 7 * 24 * 60 * 60);
    }

    #[test]
    fn short_secret_is_a_configuration_error() {
        let result = AuthorityConfig::new(SecretString::from("too-short".to_string()));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn expiry_parsing_units() {
        assert_eq!(parse_expiry_to_seconds("15m"), 900);
        assert_eq!(parse_expiry_to_seconds("1h"), 3600);
        assert_eq!(parse_expiry_to_seconds("7d"), 604_800);
        assert_eq!(parse_expiry_to_seconds("45s"), 45);
    }

    #[test]
    fn unparseable_expiry_falls_back_without_failing() {
        assert_eq!(parse_expiry_to_seconds("bogus"), 900);
        assert_eq!(parse_expiry_to_seconds(""), 900);
        assert_eq!(parse_expiry_to_seconds("15"), 900);
        assert_eq!(parse_expiry_to_seconds("-5m"), 900);
        assert_eq!(parse_expiry_to_seconds("m"), 900);
        assert_eq!(parse_expiry_to_seconds("10w"), 900);
    }

    #[test]
    fn misconfigured_refresh_ttl_falls_back_to_thirty_days() {
        let config = AuthorityConfig::new(test_secret())
            .expect("config should build")
            .with_refresh_token_ttl("whenever");
        assert_eq!(config.refresh_token_ttl_seconds(), 30 * 24 * 60 * 60);
    }
}
