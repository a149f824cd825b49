use hmac::Mac;
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::keys::{derive_key, HmacSha256};

const CSRF_KEY_LABEL: &str = "csrf/double-submit";
const NONCE_LEN: usize = 32;
/// `nonce.mac`, both hex.
const TOKEN_LEN: usize = NONCE_LEN * 2 + 1 + 64;

/// Cookie name the transport layer stores the CSRF token under.
pub const CSRF_COOKIE: &str = "csrf_token";
/// Header the client echoes the CSRF token back in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// The value pair handed to the client at login: one copy goes into a
/// cookie, the other is for the client to echo in [`CSRF_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfPair {
    pub cookie_value: String,
    pub header_value: String,
}

/// Double-submit-cookie CSRF guard.
///
/// Tokens are self-contained: `nonce.HMAC(key, session_id, nonce)`.  Nothing
/// is stored server-side, and a token minted for one session never validates
/// for another.
#[derive(Clone)]
pub struct CsrfGuard {
    mac: HmacSha256,
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard").finish_non_exhaustive()
    }
}

impl CsrfGuard {
    pub fn new(config: &AuthConfig) -> Self {
        Self::from_secret(config.secret_key.expose_secret())
    }

    pub(crate) fn from_secret(secret: &[u8]) -> Self {
        let key = derive_key(secret, CSRF_KEY_LABEL);
        let mac = match HmacSha256::new_from_slice(&key) {
            Ok(mac) => mac,
            Err(_) => unreachable!("hmac keys have no length limit"),
        };
        Self { mac }
    }

    /// Mint a fresh token bound to `session_id`.
    pub fn issue(&self, session_id: &str) -> CsrfPair {
        let nonce = hex::encode(rand::random::<[u8; NONCE_LEN]>());
        let tag = hex::encode(self.tag(session_id, &nonce).finalize().into_bytes());
        let value = format!("{nonce}.{tag}");

        CsrfPair {
            cookie_value: value.clone(),
            header_value: value,
        }
    }

    /// True only when both values are present, identical, and minted for
    /// `session_id`.  Any malformed input is simply `false`.
    pub fn verify(&self, session_id: &str, cookie: Option<&str>, header: Option<&str>) -> bool {
        let (Some(cookie), Some(header)) = (cookie, header) else {
            return false;
        };
        if session_id.is_empty() || cookie.len() != TOKEN_LEN || header.len() != TOKEN_LEN {
            return false;
        }
        if !bool::from(cookie.as_bytes().ct_eq(header.as_bytes())) {
            return false;
        }

        let Some((nonce, tag)) = cookie.split_once('.') else {
            return false;
        };
        if nonce.len() != NONCE_LEN * 2 || hex::decode(nonce).is_err() {
            return false;
        }
        let Ok(tag) = hex::decode(tag) else {
            return false;
        };

        // verify_slice compares in constant time.
        self.tag(session_id, nonce).verify_slice(&tag).is_ok()
    }

    /// Convenience for a pair already split out of a request.
    pub fn verify_pair(&self, session_id: &str, pair: &CsrfPair) -> bool {
        self.verify(
            session_id,
            Some(pair.cookie_value.as_str()),
            Some(pair.header_value.as_str()),
        )
    }

    fn tag(&self, session_id: &str, nonce: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        // Length prefix keeps (session, nonce) splits unambiguous.
        mac.update(&(session_id.len() as u64).to_be_bytes());
        mac.update(session_id.as_bytes());
        mac.update(nonce.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CsrfGuard {
        CsrfGuard::from_secret(b"test-secret-key-that-is-at-least-32-chars")
    }

    #[test]
    fn matching_pair_for_same_session() {
        let g = guard();
        let pair = g.issue("session-1");
        assert_eq!(pair.cookie_value, pair.header_value);
        assert_eq!(pair.cookie_value.len(), TOKEN_LEN);
        assert!(g.verify_pair("session-1", &pair));
    }

    #[test]
    fn fresh_token_per_issue() {
        let g = guard();
        assert_ne!(g.issue("s").cookie_value, g.issue("s").cookie_value);
    }

    #[test]
    fn missing_header_fails() {
        let g = guard();
        let pair = g.issue("s");
        assert!(!g.verify("s", Some(&pair.cookie_value), None));
        assert!(!g.verify("s", None, Some(&pair.header_value)));
        assert!(!g.verify("s", None, None));
        assert!(!g.verify("s", Some(""), Some("")));
    }

    #[test]
    fn mismatch_fails() {
        let g = guard();
        let a = g.issue("s");
        let b = g.issue("s");
        assert!(!g.verify("s", Some(&a.cookie_value), Some(&b.header_value)));
        assert!(!g.verify("s", Some(&a.cookie_value), Some("wrong")));
    }

    #[test]
    fn other_session_fails() {
        let g = guard();
        let pair = g.issue("session-1");
        assert!(!g.verify_pair("session-2", &pair));
        assert!(!g.verify_pair("", &pair));
    }

    #[test]
    fn other_secret_fails() {
        let pair = guard().issue("s");
        let other = CsrfGuard::from_secret(b"another-secret-key-that-is-32-chars!");
        assert!(!other.verify_pair("s", &pair));
    }

    #[test]
    fn forged_or_garbled_values_fail() {
        let g = guard();
        let pair = g.issue("s");

        let mut flipped = pair.cookie_value.clone().into_bytes();
        let last = flipped.len() - 1;
        flipped[last] = if flipped[last] == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(flipped).unwrap();
        assert!(!g.verify("s", Some(&flipped), Some(&flipped)));

        let junk = "z".repeat(TOKEN_LEN);
        assert!(!g.verify("s", Some(&junk), Some(&junk)));

        let no_dot = "a".repeat(TOKEN_LEN);
        assert!(!g.verify("s", Some(&no_dot), Some(&no_dot)));
    }
}
