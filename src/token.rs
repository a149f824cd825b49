use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngExt;
use secrecy::ExposeSecret;

use crate::claims::{SessionClaims, SessionToken, VerifiedToken};
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::keys::derive_key;
use crate::revocation::{RevocationReason, RevocationSet};

const TOKEN_KEY_LABEL: &str = "session-token/hs256";
const TOKEN_ID_LEN: usize = 32;

/// Random alphanumeric token id.
pub fn generate_jti(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Issues and verifies HS256 session tokens.
///
/// Stateless apart from key material and a clock: revocation state is owned
/// by the caller and passed in.  Expiry is checked against the injected
/// [`Clock`] with `clock_skew` seconds of leeway.
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
    default_ttl: i64,
    max_ttl: i64,
    clock_skew: i64,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("default_ttl", &self.default_ttl)
            .field("max_ttl", &self.max_ttl)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    pub fn new(config: &AuthConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let key = derive_key(config.secret_key.expose_secret(), TOKEN_KEY_LABEL);

        // Time-based checks run against our own clock in `check_times`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = ["exp", "iat", "jti", "nbf", "sub"]
            .into_iter()
            .map(String::from)
            .collect::<HashSet<_>>();

        Self {
            encoding_key: EncodingKey::from_secret(&key),
            decoding_key: DecodingKey::from_secret(&key),
            validation,
            clock,
            default_ttl: config.token_ttl_seconds,
            max_ttl: config.max_token_ttl_seconds,
            clock_skew: config.clock_skew_seconds,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }

    pub fn max_ttl(&self) -> i64 {
        self.max_ttl
    }

    pub fn clock_skew(&self) -> i64 {
        self.clock_skew
    }

    /// Issue a token for `subject_id` valid for `ttl` seconds.
    pub fn issue(&self, subject_id: &str, ttl: i64) -> Result<SessionToken, AuthError> {
        if subject_id.is_empty() {
            return Err(AuthError::InvalidInput("subject id must not be empty".into()));
        }
        if ttl <= 0 || ttl > self.max_ttl {
            return Err(AuthError::InvalidInput(format!(
                "ttl must be within 1..={} seconds",
                self.max_ttl
            )));
        }

        let now = self.clock.now();
        let claims = SessionClaims {
            exp: now.saturating_add(ttl),
            iat: now,
            jti: generate_jti(TOKEN_ID_LEN),
            nbf: now,
            sub: subject_id.to_owned(),
        };

        let encoded = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))?;

        tracing::debug!(token_id = %claims.jti, subject = %claims.sub, exp = claims.exp, "issued session token");
        Ok(SessionToken::from_claims(claims, encoded))
    }

    /// Full check: signature, shape, expiry, then revocation.
    pub fn verify(
        &self,
        token: &str,
        revocations: &RevocationSet,
    ) -> Result<VerifiedToken, AuthError> {
        let claims = self.authenticate(token)?;
        self.check_times(&claims)?;

        if revocations.is_revoked(&claims.jti) {
            return Err(AuthError::Revoked);
        }
        Ok(claims.into())
    }

    /// Signature and shape only; an expired but authentic token passes.
    pub fn authenticate(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::SignatureMismatch,
                _ => AuthError::MalformedToken(e.to_string()),
            },
        )?;

        let claims = data.claims;
        if claims.sub.is_empty() || claims.jti.is_empty() {
            return Err(AuthError::MalformedToken("empty subject or token id".into()));
        }
        if claims.exp <= claims.iat || claims.exp.saturating_sub(claims.iat) > self.max_ttl {
            return Err(AuthError::MalformedToken("lifetime out of range".into()));
        }
        Ok(claims)
    }

    /// Idempotently add `token_id` to `revocations`.
    pub fn revoke(&self, revocations: &RevocationSet, token_id: &str, reason: RevocationReason) {
        if revocations.revoke(token_id, self.clock.now(), reason) {
            tracing::debug!(token_id, ?reason, "revoked session token");
        }
    }

    fn check_times(&self, claims: &SessionClaims) -> Result<(), AuthError> {
        let now = self.clock.now();
        if now > claims.exp.saturating_add(self.clock_skew) {
            return Err(AuthError::Expired);
        }
        if claims.nbf > now.saturating_add(self.clock_skew) {
            return Err(AuthError::MalformedToken("token is not yet valid".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const SECRET: &str = "test-secret-key-that-is-at-least-32-chars";

    fn authority(clock: &ManualClock) -> TokenAuthority {
        let cfg = AuthConfig::new(SECRET).clock_skew_seconds(30);
        TokenAuthority::with_clock(&cfg, Arc::new(clock.clone()))
    }

    #[test]
    fn issue_then_verify() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let revoked = RevocationSet::new(86_400);

        let token = auth.issue("alice", 900).unwrap();
        assert_eq!(token.issued_at, 1_000_000);
        assert_eq!(token.expires_at, 1_000_900);
        assert_eq!(token.token_id.len(), TOKEN_ID_LEN);

        let verified = auth.verify(&token.encoded, &revoked).unwrap();
        assert_eq!(verified.subject_id, "alice");
        assert_eq!(verified.token_id, token.token_id);
    }

    #[test]
    fn expiry_honours_clock_skew() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let revoked = RevocationSet::new(86_400);
        let token = auth.issue("alice", 60).unwrap();

        clock.advance(60 + 30);
        assert!(auth.verify(&token.encoded, &revoked).is_ok());

        clock.advance(1);
        assert!(matches!(
            auth.verify(&token.encoded, &revoked),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn any_payload_mutation_breaks_signature() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let revoked = RevocationSet::new(86_400);
        let token = auth.issue("alice", 60).unwrap();

        let parts: Vec<&str> = token.encoded.split('.').collect();
        assert_eq!(parts.len(), 3);
        let payload = parts[1];

        for i in 0..payload.len() {
            let mut bytes = payload.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();
            let forged = format!("{}.{}.{}", parts[0], mutated, parts[2]);
            assert!(
                matches!(
                    auth.verify(&forged, &revoked),
                    Err(AuthError::SignatureMismatch)
                ),
                "mutation at byte {i} was not detected"
            );
        }
    }

    #[test]
    fn other_secret_rejected() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let other = TokenAuthority::with_clock(
            &AuthConfig::new("another-secret-key-that-is-32-chars!"),
            Arc::new(clock.clone()),
        );
        let token = other.issue("alice", 60).unwrap();
        assert!(matches!(
            auth.verify(&token.encoded, &RevocationSet::new(86_400)),
            Err(AuthError::SignatureMismatch)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let revoked = RevocationSet::new(86_400);
        for input in ["", "invalid.token.here", "a.b", "...."] {
            assert!(
                matches!(
                    auth.verify(input, &revoked),
                    Err(AuthError::MalformedToken(_))
                ),
                "{input:?} should be malformed"
            );
        }
    }

    #[test]
    fn signed_but_wrong_shape_is_malformed() {
        #[derive(serde::Serialize)]
        struct Partial {
            sub: String,
            exp: i64,
        }

        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let key = derive_key(SECRET.as_bytes(), TOKEN_KEY_LABEL);
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Partial {
                sub: "alice".into(),
                exp: 1_000_060,
            },
            &EncodingKey::from_secret(&key),
        )
        .unwrap();

        assert!(matches!(
            auth.verify(&token, &RevocationSet::new(86_400)),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn not_yet_valid_beyond_skew_is_malformed() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let key = derive_key(SECRET.as_bytes(), TOKEN_KEY_LABEL);
        let sign = |nbf: i64| {
            let claims = SessionClaims {
                exp: nbf + 600,
                iat: nbf,
                jti: generate_jti(TOKEN_ID_LEN),
                nbf,
                sub: "alice".into(),
            };
            encode(
                &Header::new(Algorithm::HS256),
                &claims,
                &EncodingKey::from_secret(&key),
            )
            .unwrap()
        };
        let revoked = RevocationSet::new(86_400);

        assert!(auth.verify(&sign(1_000_000 + 30), &revoked).is_ok());
        assert!(matches!(
            auth.verify(&sign(1_000_000 + 30 + 1), &revoked),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn extreme_times_do_not_overflow() {
        let clock = ManualClock::new(i64::MAX - 10);
        let cfg = AuthConfig::new(SECRET)
            .max_token_ttl_seconds(86_400)
            .clock_skew_seconds(i64::MAX - 100_000);
        let auth = TokenAuthority::with_clock(&cfg, Arc::new(clock.clone()));
        let revoked = RevocationSet::new(i64::MAX);

        let token = auth.issue("alice", 60).unwrap();
        assert_eq!(token.expires_at, i64::MAX);
        assert!(auth.verify(&token.encoded, &revoked).is_ok());

        clock.set(1_000_000);
        let token = auth.issue("alice", 60).unwrap();
        clock.advance(10_000);
        assert!(auth.verify(&token.encoded, &revoked).is_ok());
    }

    #[test]
    fn revoke_is_idempotent() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let revoked = RevocationSet::new(86_400);
        let token = auth.issue("alice", 60).unwrap();

        auth.revoke(&revoked, &token.token_id, RevocationReason::Revoked);
        auth.revoke(&revoked, &token.token_id, RevocationReason::Revoked);
        assert_eq!(revoked.len(), 1);
        assert!(matches!(
            auth.verify(&token.encoded, &revoked),
            Err(AuthError::Revoked)
        ));
    }

    #[test]
    fn ttl_bounds_enforced() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        assert!(matches!(auth.issue("alice", 0), Err(AuthError::InvalidInput(_))));
        assert!(matches!(
            auth.issue("alice", auth.max_ttl() + 1),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(auth.issue("", 60), Err(AuthError::InvalidInput(_))));
        assert!(auth.issue("alice", auth.max_ttl()).is_ok());
    }

    #[test]
    fn expired_token_still_authenticates() {
        let clock = ManualClock::new(1_000_000);
        let auth = authority(&clock);
        let token = auth.issue("alice", 60).unwrap();
        clock.advance(10_000);
        assert_eq!(auth.authenticate(&token.encoded).unwrap().sub, "alice");
    }

    #[test]
    fn generate_jti_alphanumeric() {
        let a = generate_jti(32);
        let b = generate_jti(32);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
