// SPDX-License-Identifier: Apache-2.0
//! Bearer-token authentication for the message ingest API (§6). The raw
//! token is never stored; only its SHA-256 hash is kept, and comparison is
//! constant-time to avoid a timing oracle.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(with = "hex_bytes")]
    hash: [u8; 32],
}

impl StoredToken {
    pub fn verify(&self, candidate: &str) -> bool {
        let candidate_hash = Sha256::digest(candidate.as_bytes());
        self.hash.ct_eq(candidate_hash.as_slice()).into()
    }
}

pub struct RawToken(String);

impl RawToken {
    /// 32 random bytes, hex-encoded — matches the host's token length.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_stored(self) -> StoredToken {
        let hash: [u8; 32] = Sha256::digest(self.0.as_bytes()).into();
        StoredToken { hash }
    }
}

/// On-disk YAML form of the bearer token (§6): only the hash is ever
/// written, mode 0o600 on Unix, matching the host gateway's token-file shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredTokenFile {
    pub token_hash: StoredToken,
}

impl StoredTokenFile {
    /// Generates a new token, writes its hash to `path`, and returns the raw
    /// token for one-time display. Call sites must print it and drop it.
    pub fn generate_and_save(path: &Path) -> anyhow::Result<RawToken> {
        let raw = RawToken::generate();
        let plain = raw.as_str().to_string();
        let file = StoredTokenFile { token_hash: raw.into_stored() };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating token directory {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(&file).context("serializing token file")?;
        write_secret_file(path, yaml.as_bytes())?;
        Ok(RawToken(plain))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading token file {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing token file {}", path.display()))
    }
}

fn write_secret_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("writing secret file {}", path.display()))?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data).with_context(|| format!("writing secret file {}", path.display()))?;
    }
    Ok(())
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes.try_into().map_err(|_| D::Error::custom("expected 32-byte hex"))
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
}

/// Axum middleware for the token-authenticated ingest API (§6: "Missing/
/// invalid token → 401").
pub async fn bearer_auth_mw(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    match extract_bearer(req.headers()) {
        Some(token) if state.token.verify(token) => next.run(req).await,
        _ => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_verifies_against_its_own_hash() {
        let raw = RawToken::generate();
        let plain = raw.as_str().to_string();
        let stored = raw.into_stored();
        assert!(stored.verify(&plain));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let stored = RawToken::generate().into_stored();
        assert!(!stored.verify("not-the-token"));
    }

    #[test]
    fn extract_bearer_strips_the_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("abc123"));
    }

    #[test]
    fn extract_bearer_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn token_file_generate_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.yaml");
        let raw = StoredTokenFile::generate_and_save(&path).unwrap();
        let loaded = StoredTokenFile::load(&path).unwrap();
        assert!(loaded.token_hash.verify(raw.as_str()));
    }
}
