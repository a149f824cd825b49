use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AuthError;

/// A stored credential.  `password_hash` is a self-describing PHC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub subject_id: String,
    pub password_hash: String,
}

/// Failures of the credential store itself, as opposed to bad credentials.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out")]
    Timeout,
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::StoreUnavailable(e.to_string())
    }
}

/// Narrow get/put/delete interface to wherever credentials live.
///
/// Implementations may be slow or fail; callers bound every call with a
/// timeout and treat failures as [`StoreError`], never as a wrong password.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential(&self, subject_id: &str) -> Result<Option<Credential>, StoreError>;

    async fn save_credential(&self, credential: Credential) -> Result<(), StoreError>;

    /// Save `credential` only if the stored hash for its subject is still
    /// `expected_hash`.  Returns whether the write happened; implementations
    /// must make the compare and the write atomic.
    async fn replace_credential(
        &self,
        expected_hash: &str,
        credential: Credential,
    ) -> Result<bool, StoreError>;

    /// Returns whether a credential was removed.
    async fn delete_credential(&self, subject_id: &str) -> Result<bool, StoreError>;
}

/// In-process store, for tests and single-node setups.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_credential(&self, subject_id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.read().await.get(subject_id).cloned())
    }

    async fn save_credential(&self, credential: Credential) -> Result<(), StoreError> {
        self.credentials
            .write()
            .await
            .insert(credential.subject_id.clone(), credential);
        Ok(())
    }

    async fn replace_credential(
        &self,
        expected_hash: &str,
        credential: Credential,
    ) -> Result<bool, StoreError> {
        let mut credentials = self.credentials.write().await;
        match credentials.get_mut(&credential.subject_id) {
            Some(current) if current.password_hash == expected_hash => {
                *current = credential;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_credential(&self, subject_id: &str) -> Result<bool, StoreError> {
        Ok(self.credentials.write().await.remove(subject_id).is_some())
    }
}
