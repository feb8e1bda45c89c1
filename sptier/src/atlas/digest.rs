//! HTTP Digest authentication (RFC 7616) for the Atlas Administration API.
//!
//! Atlas answers the first request with `401` and a `WWW-Authenticate:
//! Digest ...` challenge. The challenge is cached and every later request
//! carries an `Authorization` header computed from it, with an increasing
//! nonce count.

use md5::Md5;
use parking_lot::Mutex;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

use crate::errors::AdvisorError;

#[allow(clippy::expect_used)]
static CHALLENGE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^,\s]*))"#).expect("digest param pattern")
});

/// Hash algorithm named by the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// `MD5` (the Atlas default).
    #[default]
    Md5,
    /// `SHA-256`.
    Sha256,
}

impl DigestAlgorithm {
    fn parse(name: &str) -> Result<Self, AdvisorError> {
        match name.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA-256" => Ok(Self::Sha256),
            other => Err(AdvisorError::provider(format!("unsupported digest algorithm {other}"))),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
        }
    }

    fn hash(self, data: &str) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(data.as_bytes())),
            Self::Sha256 => hex::encode(Sha256::digest(data.as_bytes())),
        }
    }
}

/// A parsed `WWW-Authenticate: Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    /// Protection space.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Opaque value echoed back unchanged.
    pub opaque: Option<String>,
    /// Hash algorithm.
    pub algorithm: DigestAlgorithm,
    /// Whether `qop=auth` is offered.
    pub qop_auth: bool,
}

impl DigestChallenge {
    /// Parses a header value.
    ///
    /// # Errors
    ///
    /// `Provider` when the scheme is not Digest, the nonce is missing or the
    /// algorithm is unsupported.
    pub fn parse(header: &str) -> Result<Self, AdvisorError> {
        let header = header.trim();
        let params = header
            .get(..6)
            .filter(|scheme| scheme.eq_ignore_ascii_case("digest"))
            .map(|_| &header[6..])
            .ok_or_else(|| AdvisorError::provider(format!("expected a Digest challenge, got '{header}'")))?;

        let values: HashMap<String, String> = CHALLENGE_PARAM
            .captures_iter(params)
            .map(|caps| {
                let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
                (caps[1].to_ascii_lowercase(), value.replace("\\\"", "\""))
            })
            .collect();

        let nonce = values
            .get("nonce")
            .cloned()
            .ok_or_else(|| AdvisorError::provider("digest challenge has no nonce"))?;
        let algorithm = values
            .get("algorithm")
            .map_or(Ok(DigestAlgorithm::Md5), |name| DigestAlgorithm::parse(name))?;

        Ok(Self {
            realm: values.get("realm").cloned().unwrap_or_default(),
            nonce,
            opaque: values.get("opaque").cloned(),
            algorithm,
            qop_auth: values
                .get("qop")
                .is_some_and(|qop| qop.split(',').any(|q| q.trim() == "auth")),
        })
    }
}

/// Digest credentials plus the cached challenge.
pub struct DigestAuth {
    username: String,
    password: String,
    challenge: Mutex<Option<DigestChallenge>>,
    nonce_count: AtomicU32,
}

impl DigestAuth {
    /// Creates an authenticator with no challenge yet.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            challenge: Mutex::new(None),
            nonce_count: AtomicU32::new(0),
        }
    }

    /// Whether a challenge has been received.
    #[must_use]
    pub fn has_challenge(&self) -> bool {
        self.challenge.lock().is_some()
    }

    /// Replaces the cached challenge from a `WWW-Authenticate` header.
    pub fn update_challenge(&self, header: &str) -> Result<(), AdvisorError> {
        let challenge = DigestChallenge::parse(header)?;
        tracing::debug!(realm = %challenge.realm, algorithm = challenge.algorithm.name(), "Digest challenge received");
        *self.challenge.lock() = Some(challenge);
        self.nonce_count.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// `Authorization` header for a request, or `None` before any challenge.
    #[must_use]
    pub fn authorization(&self, method: &str, uri: &str) -> Option<String> {
        let challenge = self.challenge.lock().clone()?;
        let nc = self.nonce_count.fetch_add(1, Ordering::SeqCst) + 1;
        let cnonce = hex::encode(rand::random::<[u8; 16]>());
        Some(self.header(&challenge, method, uri, nc, &cnonce))
    }

    fn header(&self, challenge: &DigestChallenge, method: &str, uri: &str, nc: u32, cnonce: &str) -> String {
        let response = self.response(challenge, method, uri, nc, cnonce);
        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{uri}", algorithm={}, response="{response}""#,
            self.username,
            challenge.realm,
            challenge.nonce,
            challenge.algorithm.name(),
        );
        if challenge.qop_auth {
            header.push_str(&format!(r#", qop=auth, nc={nc:08x}, cnonce="{cnonce}""#));
        }
        if let Some(opaque) = &challenge.opaque {
            header.push_str(&format!(r#", opaque="{opaque}""#));
        }
        header
    }

    fn response(&self, challenge: &DigestChallenge, method: &str, uri: &str, nc: u32, cnonce: &str) -> String {
        let algorithm = challenge.algorithm;
        let ha1 = algorithm.hash(&format!("{}:{}:{}", self.username, challenge.realm, self.password));
        let ha2 = algorithm.hash(&format!("{method}:{uri}"));
        if challenge.qop_auth {
            algorithm.hash(&format!("{ha1}:{}:{nc:08x}:{cnonce}:auth:{ha2}", challenge.nonce))
        } else {
            algorithm.hash(&format!("{ha1}:{}:{ha2}", challenge.nonce))
        }
    }
}

impl std::fmt::Debug for DigestAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestAuth")
            .field("username", &self.username)
            .field("has_challenge", &self.has_challenge())
            .finish_non_exhaustive()
    }
}
