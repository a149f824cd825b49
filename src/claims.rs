use serde::{Deserialize, Serialize};

/// Signed payload of a session token.
///
/// Fields are declared in sorted-key order and serde writes them in
/// declaration order, so two equal payloads always serialize (and therefore
/// sign) byte-for-byte identically.  Unknown claims are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionClaims {
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Issue time, unix seconds.
    pub iat: i64,
    /// Token id, the revocation handle.
    pub jti: String,
    /// Not-before; always equal to `iat` for tokens issued here.
    pub nbf: i64,
    /// Subject identity.
    pub sub: String,
}

/// An issued session token: its decoded fields plus the compact signed form
/// handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub subject_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub token_id: String,
    /// `header.payload.signature`, sent as `Authorization: Bearer <encoded>`.
    pub encoded: String,
}

impl SessionToken {
    pub(crate) fn from_claims(claims: SessionClaims, encoded: String) -> Self {
        Self {
            subject_id: claims.sub,
            issued_at: claims.iat,
            expires_at: claims.exp,
            token_id: claims.jti,
            encoded,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Seconds of validity left at `now`, ignoring clock skew.
    pub fn remaining(&self, now: i64) -> i64 {
        self.expires_at.saturating_sub(now).max(0)
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.encoded
    }
}

/// What a successful verification yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject_id: String,
    pub token_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl From<SessionClaims> for VerifiedToken {
    fn from(claims: SessionClaims) -> Self {
        Self {
            subject_id: claims.sub,
            token_id: claims.jti,
            issued_at: claims.iat,
            expires_at: claims.exp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_sorted_key_order() {
        let claims = SessionClaims {
            exp: 20,
            iat: 10,
            jti: "abc".into(),
            nbf: 10,
            sub: "alice".into(),
        };
        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(
            json,
            r#"{"exp":20,"iat":10,"jti":"abc","nbf":10,"sub":"alice"}"#
        );
    }

    #[test]
    fn unknown_claims_rejected() {
        let raw = r#"{"exp":20,"iat":10,"jti":"a","nbf":10,"sub":"s","role":"admin"}"#;
        assert!(serde_json::from_str::<SessionClaims>(raw).is_err());
    }

    #[test]
    fn remaining_never_negative() {
        let token = SessionToken {
            subject_id: "s".into(),
            issued_at: 0,
            expires_at: 10,
            token_id: "t".into(),
            encoded: String::new(),
        };
        assert_eq!(token.remaining(4), 6);
        assert_eq!(token.remaining(40), 0);
    }
}
