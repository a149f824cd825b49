use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::claims::SessionToken;
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::csrf::{CsrfGuard, CsrfPair};
use crate::error::AuthError;
use crate::password::PasswordHasher;
use crate::revocation::{RevocationReason, RevocationSet};
use crate::store::{Credential, CredentialStore, StoreError};
use crate::token::TokenAuthority;

/// Where a presented token stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token, or one that is not ours.
    Anonymous,
    Authenticated,
    Expired,
    Revoked,
    LoggedOut,
}

/// What a successful login hands back to the transport layer.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: SessionToken,
    pub csrf: CsrfPair,
}

/// Login / authorize / logout over the hasher, token authority and CSRF
/// guard.  Owns the revocation set.
///
/// Share as `Arc<AuthSessionCoordinator>`; every method takes `&self`.
pub struct AuthSessionCoordinator {
    hasher: Arc<PasswordHasher>,
    tokens: TokenAuthority,
    csrf: CsrfGuard,
    revocations: RevocationSet,
    store: Arc<dyn CredentialStore>,
    store_timeout: Duration,
}

impl std::fmt::Debug for AuthSessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSessionCoordinator")
            .field("tokens", &self.tokens)
            .field("revoked", &self.revocations.len())
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl AuthSessionCoordinator {
    pub fn new(config: &AuthConfig, store: Arc<dyn CredentialStore>) -> Result<Self, AuthError> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        config.validate()?;

        let hasher = PasswordHasher::from_config(config);
        hasher.prepare_dummy()?;

        Ok(Self {
            hasher: Arc::new(hasher),
            tokens: TokenAuthority::with_clock(config, clock),
            csrf: CsrfGuard::new(config),
            revocations: RevocationSet::new(
                config
                    .max_token_ttl_seconds
                    .saturating_add(config.clock_skew_seconds),
            ),
            store,
            store_timeout: config.store_timeout,
        })
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn revocations(&self) -> &RevocationSet {
        &self.revocations
    }

    /// Store a new or replacement credential for `subject_id`.
    pub async fn register(&self, subject_id: &str, raw_password: &str) -> Result<(), AuthError> {
        if subject_id.is_empty() {
            return Err(AuthError::InvalidInput("subject id must not be empty".into()));
        }
        let password_hash = self.hash_blocking(raw_password.to_owned()).await?;
        self.bounded(self.store.save_credential(Credential {
            subject_id: subject_id.to_owned(),
            password_hash,
        }))
        .await?;
        tracing::debug!(subject = subject_id, "stored credential");
        Ok(())
    }

    /// Delete the credential for `subject_id`.  Already-issued tokens stay
    /// valid until they expire or are revoked.
    pub async fn remove(&self, subject_id: &str) -> Result<bool, AuthError> {
        self.bounded(self.store.delete_credential(subject_id)).await
    }

    /// Check a username/password pair and open a session.
    ///
    /// An unknown user and a wrong password fail identically, including in
    /// timing.  A store outage is `StoreUnavailable`, never a failed login.
    /// A hash weaker than the current configuration is upgraded on success.
    pub async fn login(&self, username: &str, raw_password: &str) -> Result<LoginOutcome, AuthError> {
        let credential = self
            .bounded(self.store.find_credential(username))
            .await?;

        let Some(credential) = credential else {
            let hasher = self.hasher.clone();
            let candidate = raw_password.to_owned();
            run_blocking(move || hasher.verify_dummy(&candidate)).await?;
            tracing::debug!("login failed");
            return Err(AuthError::AuthenticationFailed);
        };

        let hasher = self.hasher.clone();
        let candidate = raw_password.to_owned();
        let stored = credential.password_hash.clone();
        let verified = run_blocking(move || hasher.verify(&candidate, &stored)).await?;

        match verified {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(subject = %credential.subject_id, "login failed");
                return Err(AuthError::AuthenticationFailed);
            }
            Err(e) => {
                tracing::warn!(subject = %credential.subject_id, error = %e, "stored password hash is unreadable");
                return Err(AuthError::AuthenticationFailed);
            }
        }

        self.upgrade_hash(&credential, raw_password).await;

        let outcome = self.issue_session(&credential.subject_id)?;
        tracing::debug!(subject = %credential.subject_id, token_id = %outcome.token.token_id, "login succeeded");
        Ok(outcome)
    }

    /// Mint a token and a CSRF pair bound to it, without a password check.
    /// Used after login and after a privilege change.
    pub fn issue_session(&self, subject_id: &str) -> Result<LoginOutcome, AuthError> {
        let token = self.tokens.issue(subject_id, self.tokens.default_ttl())?;
        let csrf = self.csrf.issue(&token.token_id);
        Ok(LoginOutcome { token, csrf })
    }

    /// Authorize a request carrying `token` and the CSRF pair.
    pub fn authorize(
        &self,
        token: &str,
        csrf: &CsrfPair,
        is_state_changing: bool,
    ) -> Result<String, AuthError> {
        self.authorize_parts(
            token,
            Some(csrf.cookie_value.as_str()),
            Some(csrf.header_value.as_str()),
            is_state_changing,
        )
    }

    /// Like [`authorize`](Self::authorize) with either CSRF value possibly
    /// missing from the request.
    pub fn authorize_parts(
        &self,
        token: &str,
        csrf_cookie: Option<&str>,
        csrf_header: Option<&str>,
        is_state_changing: bool,
    ) -> Result<String, AuthError> {
        let verified = self.tokens.verify(token, &self.revocations)?;

        if is_state_changing && !self.csrf.verify(&verified.token_id, csrf_cookie, csrf_header) {
            tracing::warn!(token_id = %verified.token_id, "csrf validation failed");
            return Err(AuthError::CsrfValidation);
        }
        Ok(verified.subject_id)
    }

    /// End the session behind `token`.  Idempotent; a token that is not
    /// authentic is ignored, an expired one is still revoked.
    pub fn logout(&self, token: &str) {
        match self.tokens.authenticate(token) {
            Ok(claims) => {
                self.tokens
                    .revoke(&self.revocations, &claims.jti, RevocationReason::Logout)
            }
            Err(e) => tracing::debug!(error = %e, "logout with unusable token ignored"),
        }
    }

    /// Revoke a token by id, e.g. on a privilege change.
    pub fn revoke_token(&self, token_id: &str) {
        self.tokens
            .revoke(&self.revocations, token_id, RevocationReason::Revoked);
    }

    pub fn session_state(&self, token: Option<&str>) -> SessionState {
        let Some(token) = token else {
            return SessionState::Anonymous;
        };
        let Ok(claims) = self.tokens.authenticate(token) else {
            return SessionState::Anonymous;
        };

        if let Some(revocation) = self.revocations.get(&claims.jti) {
            return match revocation.reason {
                RevocationReason::Logout => SessionState::LoggedOut,
                RevocationReason::Revoked => SessionState::Revoked,
            };
        }
        match self.tokens.verify(token, &self.revocations) {
            Ok(_) => SessionState::Authenticated,
            Err(AuthError::Expired) => SessionState::Expired,
            Err(_) => SessionState::Anonymous,
        }
    }

    /// Drop revocations that can no longer match a live token.
    pub fn prune_revocations(&self) -> usize {
        self.revocations.prune(self.tokens.now())
    }

    /// Prune the revocation set every `every` until the coordinator is
    /// dropped or the handle is aborted.
    pub fn spawn_revocation_pruner(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.prune_revocations();
            }
        })
    }

    /// Rehash with current settings, but only over the exact hash that was
    /// just verified: a password changed meanwhile is never overwritten.
    async fn upgrade_hash(&self, credential: &Credential, raw_password: &str) {
        match self.hasher.needs_rehash(&credential.password_hash) {
            Ok(true) => {}
            _ => return,
        }
        let result = match self.hash_blocking(raw_password.to_owned()).await {
            Ok(password_hash) => {
                self.bounded(self.store.replace_credential(
                    &credential.password_hash,
                    Credential {
                        subject_id: credential.subject_id.clone(),
                        password_hash,
                    },
                ))
                .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(true) => tracing::debug!(subject = %credential.subject_id, "upgraded password hash"),
            Ok(false) => {
                tracing::debug!(subject = %credential.subject_id, "credential changed during login, upgrade skipped")
            }
            Err(e) => {
                tracing::warn!(subject = %credential.subject_id, error = %e, "password hash upgrade skipped")
            }
        }
    }

    async fn hash_blocking(&self, raw_password: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        run_blocking(move || hasher.hash(&raw_password)).await?
    }

    /// Run a store call under the configured timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "credential store call failed");
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.store_timeout, "credential store call timed out");
                Err(StoreError::Timeout.into())
            }
        }
    }
}

/// Hashing is CPU-bound; keep it off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))
}
