//! # axum-session-authority
//!
//! The credential and session-token core behind a "JWT + CSRF + salted
//! password" filter chain, for [Axum](https://docs.rs/axum) services:
//!
//! - [`PasswordHasher`]: Argon2 with a tunable work factor; every hash is a
//!   self-describing PHC string, so raising the factor never breaks old
//!   hashes.
//! - [`TokenAuthority`]: HS256 session tokens with sorted-key claims,
//!   expiry with clock-skew leeway, and revocation by token id.
//! - [`CsrfGuard`]: self-contained double-submit CSRF tokens bound to the
//!   session.
//! - [`AuthSessionCoordinator`]: login / authorize / logout, owning the
//!   [`RevocationSet`].
//!
//! Storage is reached through [`CredentialStore`]; routing is left to the
//! application.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum_session_authority::{AuthConfig, AuthSessionCoordinator, MemoryCredentialStore};
//!
//! # async fn example() -> Result<(), axum_session_authority::AuthError> {
//! let config = AuthConfig::from_env()?;
//! let coordinator = Arc::new(AuthSessionCoordinator::new(
//!     &config,
//!     Arc::new(MemoryCredentialStore::new()),
//! )?);
//! let _pruner = coordinator.spawn_revocation_pruner(std::time::Duration::from_secs(60));
//!
//! coordinator.register("alice", "Secr3t!").await?;
//! let session = coordinator.login("alice", "Secr3t!").await?;
//!
//! // Bearer token plus the CSRF cookie/header pair on a state-changing call.
//! let subject = coordinator.authorize(&session.token.encoded, &session.csrf, true)?;
//! assert_eq!(subject, "alice");
//!
//! coordinator.logout(&session.token.encoded);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment variables (`AuthConfig::from_env`)
//!
//! This crate does **not** load `.env` files.
//!
//! | Variable                     | Required | Default    | Notes                                   |
//! |------------------------------|----------|------------|-----------------------------------------|
//! | `AUTH_SECRET_KEY`            | **yes**  | —          | At least 32 bytes                       |
//! | `AUTH_HASH_ALGORITHM`        | no       | `argon2id` | `argon2id`, `argon2i` or `argon2d`      |
//! | `AUTH_WORK_FACTOR`           | no       | `15`       | Memory cost is `2^n` KiB                |
//! | `AUTH_TOKEN_TTL_SECONDS`     | no       | `3600`     |                                         |
//! | `AUTH_MAX_TOKEN_TTL_SECONDS` | no       | `86400`    | Upper bound for any issued token        |
//! | `AUTH_CLOCK_SKEW_SECONDS`    | no       | `30`       | Leeway when checking expiry             |
//! | `AUTH_MAX_PASSWORD_LENGTH`   | no       | `1024`     | Bytes                                   |
//! | `AUTH_STORE_TIMEOUT_MS`      | no       | `2000`     | Bound on every credential store call    |
//!
//! ## Errors
//!
//! Every verification failure renders as the same `401 unauthorized`; which
//! check failed is only visible server-side.  A credential-store outage is a
//! `503`, never a failed login.

pub mod claims;
pub mod clock;
pub mod config;
pub mod csrf;
pub mod error;
mod keys;
pub mod middleware;
pub mod password;
pub mod revocation;
pub mod session;
pub mod store;
pub mod token;

pub use claims::{SessionClaims, SessionToken, VerifiedToken};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, HashAlgorithm};
pub use csrf::{CsrfGuard, CsrfPair, CSRF_COOKIE, CSRF_HEADER};
pub use error::AuthError;
pub use middleware::{csrf_set_cookie, Authorized, OptionalAuthorized, RequestCredentials};
pub use password::PasswordHasher;
pub use revocation::{Revocation, RevocationReason, RevocationSet};
pub use session::{AuthSessionCoordinator, LoginOutcome, SessionState};
pub use store::{Credential, CredentialStore, MemoryCredentialStore, StoreError};
pub use token::{generate_jti, TokenAuthority};
