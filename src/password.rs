use std::sync::OnceLock;

use argon2::password_hash::{
    rand_core::OsRng, Error as PhcError, PasswordHash, PasswordHasher as _,
    PasswordVerifier as _, SaltString,
};
use argon2::{Argon2, Params, Version};

use crate::config::{AuthConfig, HashAlgorithm, MAX_WORK_FACTOR, MIN_WORK_FACTOR};
use crate::error::AuthError;

/// Argon2 passes over memory; cost is tuned through memory via the work factor.
const TIME_COST: u32 = 2;
const LANES: u32 = 1;

/// Salted, self-describing password hashing.
///
/// Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$digest`),
/// so every stored hash carries the parameters needed to verify it and the
/// configured work factor can be raised without invalidating old hashes.
#[derive(Debug)]
pub struct PasswordHasher {
    algorithm: HashAlgorithm,
    work_factor: u32,
    max_password_length: usize,
    dummy: OnceLock<String>,
}

impl PasswordHasher {
    pub fn new(algorithm: HashAlgorithm, work_factor: u32, max_password_length: usize) -> Self {
        Self {
            algorithm,
            work_factor,
            max_password_length,
            dummy: OnceLock::new(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.hash_algorithm,
            config.work_factor,
            config.max_password_length,
        )
    }

    pub fn work_factor(&self) -> u32 {
        self.work_factor
    }

    /// Hash with the configured work factor.
    pub fn hash(&self, raw_password: &str) -> Result<String, AuthError> {
        self.hash_with(raw_password, self.work_factor)
    }

    /// Hash with an explicit work factor; memory cost is `2^work_factor` KiB.
    pub fn hash_with(&self, raw_password: &str, work_factor: u32) -> Result<String, AuthError> {
        if raw_password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".into()));
        }
        if raw_password.len() > self.max_password_length {
            return Err(AuthError::InvalidInput(format!(
                "password exceeds {} bytes",
                self.max_password_length
            )));
        }

        let argon2 = self.argon2(work_factor)?;
        let salt = SaltString::generate(&mut OsRng);

        argon2
            .hash_password(raw_password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(hash_failure)
    }

    /// Check a candidate against an encoded hash.
    ///
    /// A wrong password is `Ok(false)`; only an unparseable or foreign hash
    /// is an error.
    pub fn verify(&self, raw_password: &str, encoded_hash: &str) -> Result<bool, AuthError> {
        let parsed = parse(encoded_hash)?;

        if raw_password.is_empty() || raw_password.len() > self.max_password_length {
            return Ok(false);
        }

        // Algorithm, version and parameters all come from the parsed hash.
        match Argon2::default().verify_password(raw_password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(e) => Err(AuthError::MalformedHash(e.to_string())),
        }
    }

    /// Build the hash [`verify_dummy`](Self::verify_dummy) checks against.
    /// Call once at startup so the first unknown-user login costs no more
    /// than any other.
    pub fn prepare_dummy(&self) -> Result<(), AuthError> {
        if self.dummy.get().is_none() {
            let hash = self.hash(&crate::token::generate_jti(32))?;
            let _ = self.dummy.set(hash);
        }
        Ok(())
    }

    /// Burn the same work as a real verification, for callers that must not
    /// reveal whether an account exists.
    pub fn verify_dummy(&self, raw_password: &str) {
        if self.dummy.get().is_none() {
            if let Err(e) = self.prepare_dummy() {
                tracing::warn!(error = %e, "could not build dummy password hash");
            }
        }
        if let Some(dummy) = self.dummy.get() {
            let _ = self.verify(raw_password, dummy);
        }
    }

    #[cfg(test)]
    pub(crate) fn dummy_ready(&self) -> bool {
        self.dummy.get().is_some()
    }

    /// Whether a stored hash is weaker than (or different from) what this
    /// hasher would produce today.
    pub fn needs_rehash(&self, encoded_hash: &str) -> Result<bool, AuthError> {
        let parsed = parse(encoded_hash)?;
        let params =
            Params::try_from(&parsed).map_err(|e| AuthError::MalformedHash(e.to_string()))?;

        let algorithm = HashAlgorithm::from_ident(parsed.algorithm.as_str());
        Ok(algorithm != Some(self.algorithm)
            || params.m_cost() < memory_cost(self.work_factor)
            || params.t_cost() < TIME_COST)
    }

    fn argon2(&self, work_factor: u32) -> Result<Argon2<'static>, AuthError> {
        if !(MIN_WORK_FACTOR..=MAX_WORK_FACTOR).contains(&work_factor) {
            return Err(AuthError::InvalidInput(format!(
                "work factor must be within {MIN_WORK_FACTOR}..={MAX_WORK_FACTOR}"
            )));
        }
        let params = Params::new(memory_cost(work_factor), TIME_COST, LANES, None)
            .map_err(|e| AuthError::InvalidInput(format!("invalid work factor: {e}")))?;
        Ok(Argon2::new(self.algorithm.as_argon2(), Version::V0x13, params))
    }
}

/// Argon2 failing on validated input is our fault, not the caller's.
fn hash_failure(e: PhcError) -> AuthError {
    AuthError::Internal(format!("failed to hash password: {e}"))
}

fn memory_cost(work_factor: u32) -> u32 {
    1u32 << work_factor
}

fn parse(encoded_hash: &str) -> Result<PasswordHash<'_>, AuthError> {
    let parsed =
        PasswordHash::new(encoded_hash).map_err(|e| AuthError::MalformedHash(e.to_string()))?;
    if HashAlgorithm::from_ident(parsed.algorithm.as_str()).is_none() {
        return Err(AuthError::MalformedHash(format!(
            "unsupported algorithm {}",
            parsed.algorithm
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(HashAlgorithm::Argon2id, 8, 64)
    }

    #[test]
    fn same_password_hashes_differently() {
        let h = hasher();
        let a = h.hash("Secr3t!").unwrap();
        let b = h.hash("Secr3t!").unwrap();

        assert_ne!(a, b, "fresh salt per call");
        assert!(h.verify("Secr3t!", &a).unwrap());
        assert!(h.verify("Secr3t!", &b).unwrap());
    }

    #[test]
    fn hash_is_self_describing() {
        let hash = hasher().hash("pw").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=256,t=2,p=1$"));
    }

    #[test]
    fn wrong_password_is_false_not_error() {
        let h = hasher();
        let hash = h.hash("correct").unwrap();
        assert!(!h.verify("incorrect", &hash).unwrap());
        assert!(!h.verify("", &hash).unwrap());
    }

    #[test]
    fn empty_and_oversized_passwords_rejected() {
        let h = hasher();
        assert!(matches!(h.hash(""), Err(AuthError::InvalidInput(_))));
        assert!(matches!(
            h.hash(&"x".repeat(65)),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(h.hash(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let h = hasher();
        assert!(matches!(
            h.verify("pw", "not-a-hash"),
            Err(AuthError::MalformedHash(_))
        ));
        assert!(matches!(
            h.verify("pw", "$2b$12$abcdefghijklmnopqrstuv"),
            Err(AuthError::MalformedHash(_))
        ));
    }

    #[test]
    fn old_work_factor_still_verifies() {
        let old = PasswordHasher::new(HashAlgorithm::Argon2id, 6, 64);
        let hash = old.hash("migrate-me").unwrap();

        let current = hasher();
        assert!(current.verify("migrate-me", &hash).unwrap());
        assert!(current.needs_rehash(&hash).unwrap());
        assert!(!old.needs_rehash(&hash).unwrap());
    }

    #[test]
    fn algorithm_change_needs_rehash() {
        let hash = PasswordHasher::new(HashAlgorithm::Argon2i, 8, 64)
            .hash("pw")
            .unwrap();
        assert!(hash.starts_with("$argon2i$"));
        assert!(hasher().needs_rehash(&hash).unwrap());
        assert!(hasher().verify("pw", &hash).unwrap());
    }

    #[test]
    fn dummy_prepared_once() {
        let h = hasher();
        assert!(!h.dummy_ready());
        h.prepare_dummy().unwrap();
        assert!(h.dummy_ready());

        let first = h.dummy.get().cloned();
        h.prepare_dummy().unwrap();
        h.verify_dummy("anything");
        assert_eq!(h.dummy.get().cloned(), first);
    }

    #[test]
    fn argon2_failure_is_internal() {
        let err = hash_failure(PhcError::Crypto);
        assert!(matches!(err, AuthError::Internal(_)));
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn out_of_range_work_factor_rejected() {
        assert!(matches!(
            hasher().hash_with("pw", MAX_WORK_FACTOR + 1),
            Err(AuthError::InvalidInput(_))
        ));
    }
}
