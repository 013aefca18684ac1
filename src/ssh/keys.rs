use russh::keys::{Algorithm, PrivateKey};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum HostKeyError {
    #[error("reading host key {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding host key {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("Ed25519 key generation failed: {0}")]
    Generate(String),
}

/// Load every host key named in a colon-separated path list, in order.
///
/// Empty segments are skipped and an empty list yields no keys. Any
/// unreadable or undecodable file fails the whole load: a partial host
/// identity is never returned.
pub fn load_host_keys(paths: Option<&str>) -> Result<Vec<PrivateKey>, HostKeyError> {
    let Some(paths) = paths else {
        return Ok(Vec::new());
    };

    let mut keys = Vec::new();
    for segment in paths.split(':').filter(|s| !s.is_empty()) {
        info!(path = %segment, "Parsing host key");
        keys.push(load_host_key(PathBuf::from(segment))?);
    }
    Ok(keys)
}

fn load_host_key(path: PathBuf) -> Result<PrivateKey, HostKeyError> {
    let key_text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(source) => return Err(HostKeyError::Read { path, source }),
    };
    russh::keys::decode_secret_key(&key_text, None).map_err(|e| HostKeyError::Decode {
        path,
        reason: e.to_string(),
    })
}

/// In-memory Ed25519 key for servers started without configured host keys.
pub fn generate_host_key() -> Result<PrivateKey, HostKeyError> {
    PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519)
        .map_err(|e| HostKeyError::Generate(e.to_string()))
}
