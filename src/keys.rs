use hmac::{Hmac, Mac};
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// Derive a purpose-bound 32-byte key from the process secret, so the token
/// signer and the CSRF guard never share key material.
pub(crate) fn derive_key(secret: &[u8], label: &str) -> [u8; 32] {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac keys have no length limit"),
    };
    mac.update(label.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&mac.finalize().into_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_separate_keys() {
        let a = derive_key(b"secret", "one");
        let b = derive_key(b"secret", "two");
        assert_ne!(a, b);
        assert_eq!(a, derive_key(b"secret", "one"));
    }
}
