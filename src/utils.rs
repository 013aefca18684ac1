use russh::keys::{HashAlg, PublicKey};

/// Generate a compact correlation ID (8 hex characters) from the first 4 bytes of a UUID v4.
pub fn generate_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// OpenSSH-style `SHA256:` fingerprint of a public key.
pub fn key_fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}
