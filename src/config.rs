use std::time::Duration;

use secrecy::{ExposeSecret, SecretSlice};

use crate::error::AuthError;

/// Smallest accepted work factor (argon2 needs at least 8 KiB per lane).
pub const MIN_WORK_FACTOR: u32 = 3;
/// Largest accepted work factor (4 GiB of memory per hash).
pub const MAX_WORK_FACTOR: u32 = 22;
/// Longest accepted token lifetime (ten years).
pub const MAX_TOKEN_TTL_LIMIT: i64 = 10 * 365 * 86_400;
/// Minimum secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Password hashing algorithm, selected once at configuration time.
///
/// Every encoded hash names its own algorithm and parameters, so changing
/// this never invalidates hashes that are already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Argon2id,
    Argon2i,
    Argon2d,
}

impl HashAlgorithm {
    /// PHC identifier as it appears in an encoded hash.
    pub fn ident(&self) -> &'static str {
        match self {
            Self::Argon2id => "argon2id",
            Self::Argon2i => "argon2i",
            Self::Argon2d => "argon2d",
        }
    }

    pub fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "argon2id" => Some(Self::Argon2id),
            "argon2i" => Some(Self::Argon2i),
            "argon2d" => Some(Self::Argon2d),
            _ => None,
        }
    }

    pub(crate) fn as_argon2(&self) -> argon2::Algorithm {
        match self {
            Self::Argon2id => argon2::Algorithm::Argon2id,
            Self::Argon2i => argon2::Algorithm::Argon2i,
            Self::Argon2d => argon2::Algorithm::Argon2d,
        }
    }
}

/// Configuration for hashing, token and CSRF operations.
///
/// Build with [`new`](Self::new) and the builder setters, or with
/// [`from_env`](Self::from_env).  The secret is redacted from `Debug`.
#[derive(Debug)]
pub struct AuthConfig {
    pub secret_key: SecretSlice<u8>,
    pub hash_algorithm: HashAlgorithm,
    /// Argon2 memory cost is `2^work_factor` KiB.
    pub work_factor: u32,
    pub token_ttl_seconds: i64,
    pub max_token_ttl_seconds: i64,
    pub clock_skew_seconds: i64,
    pub max_password_length: usize,
    pub store_timeout: Duration,
}

impl AuthConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret_key: SecretSlice::from(secret.into()),
            hash_algorithm: HashAlgorithm::Argon2id,
            work_factor: 15,
            token_ttl_seconds: 3_600,
            max_token_ttl_seconds: 86_400,
            clock_skew_seconds: 30,
            max_password_length: 1_024,
            store_timeout: Duration::from_millis(2_000),
        }
    }

    /// Build from environment variables already set in the process.
    ///
    /// | Variable                     | Required | Default    |
    /// |------------------------------|----------|------------|
    /// | `AUTH_SECRET_KEY`            | **yes**  | —          |
    /// | `AUTH_HASH_ALGORITHM`        | no       | `argon2id` |
    /// | `AUTH_WORK_FACTOR`           | no       | `15`       |
    /// | `AUTH_TOKEN_TTL_SECONDS`     | no       | `3600`     |
    /// | `AUTH_MAX_TOKEN_TTL_SECONDS` | no       | `86400`    |
    /// | `AUTH_CLOCK_SKEW_SECONDS`    | no       | `30`       |
    /// | `AUTH_MAX_PASSWORD_LENGTH`   | no       | `1024`     |
    /// | `AUTH_STORE_TIMEOUT_MS`      | no       | `2000`     |
    ///
    /// Unparseable optional values are configuration errors rather than
    /// silently falling back.  The result is [`validate`](Self::validate)d.
    pub fn from_env() -> Result<Self, AuthError> {
        let secret = std::env::var("AUTH_SECRET_KEY")
            .map_err(|_| AuthError::ConfigError("AUTH_SECRET_KEY is not set".into()))?;

        let mut config = Self::new(secret.into_bytes());

        if let Some(alg) = env_var("AUTH_HASH_ALGORITHM") {
            config.hash_algorithm = HashAlgorithm::from_ident(&alg.to_ascii_lowercase())
                .ok_or_else(|| {
                    AuthError::ConfigError(format!("unknown AUTH_HASH_ALGORITHM {alg:?}"))
                })?;
        }
        if let Some(v) = parse_env("AUTH_WORK_FACTOR")? {
            config.work_factor = v;
        }
        if let Some(v) = parse_env("AUTH_TOKEN_TTL_SECONDS")? {
            config.token_ttl_seconds = v;
        }
        if let Some(v) = parse_env("AUTH_MAX_TOKEN_TTL_SECONDS")? {
            config.max_token_ttl_seconds = v;
        }
        if let Some(v) = parse_env("AUTH_CLOCK_SKEW_SECONDS")? {
            config.clock_skew_seconds = v;
        }
        if let Some(v) = parse_env("AUTH_MAX_PASSWORD_LENGTH")? {
            config.max_password_length = v;
        }
        if let Some(ms) = parse_env::<u64>("AUTH_STORE_TIMEOUT_MS")? {
            config.store_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the authority unsafe or unusable.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.secret_key.expose_secret().len() < MIN_SECRET_LEN {
            return Err(AuthError::ConfigError(format!(
                "secret key must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if !(MIN_WORK_FACTOR..=MAX_WORK_FACTOR).contains(&self.work_factor) {
            return Err(AuthError::ConfigError(format!(
                "work factor must be within {MIN_WORK_FACTOR}..={MAX_WORK_FACTOR}"
            )));
        }
        if self.max_token_ttl_seconds <= 0 || self.max_token_ttl_seconds > MAX_TOKEN_TTL_LIMIT {
            return Err(AuthError::ConfigError(format!(
                "max token ttl must be within 1..={MAX_TOKEN_TTL_LIMIT} seconds"
            )));
        }
        if self.token_ttl_seconds <= 0 || self.token_ttl_seconds > self.max_token_ttl_seconds {
            return Err(AuthError::ConfigError(
                "token ttl must be positive and not above the max token ttl".into(),
            ));
        }
        if self.clock_skew_seconds < 0 || self.clock_skew_seconds > self.max_token_ttl_seconds {
            return Err(AuthError::ConfigError(
                "clock skew must be within 0..=max token ttl".into(),
            ));
        }
        if self.max_password_length == 0 {
            return Err(AuthError::ConfigError("max password length must be positive".into()));
        }
        if self.store_timeout.is_zero() {
            return Err(AuthError::ConfigError("store timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn hash_algorithm(mut self, v: HashAlgorithm) -> Self {
        self.hash_algorithm = v;
        self
    }
    pub fn work_factor(mut self, v: u32) -> Self {
        self.work_factor = v;
        self
    }
    pub fn token_ttl_seconds(mut self, v: i64) -> Self {
        self.token_ttl_seconds = v;
        self
    }
    pub fn max_token_ttl_seconds(mut self, v: i64) -> Self {
        self.max_token_ttl_seconds = v;
        self
    }
    pub fn clock_skew_seconds(mut self, v: i64) -> Self {
        self.clock_skew_seconds = v;
        self
    }
    pub fn max_password_length(mut self, v: usize) -> Self {
        self.max_password_length = v;
        self
    }
    pub fn store_timeout(mut self, v: Duration) -> Self {
        self.store_timeout = v;
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, AuthError> {
    match env_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AuthError::ConfigError(format!("{name} has an invalid value"))),
    }
}
