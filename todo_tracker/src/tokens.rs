//! Token codec: random plaintext tokens and their stored digests.
//!
//! A token is handed to the user exactly once as a 26 character base32 string.
//! Only the SHA-256 digest of that string is persisted, so a leaked table cannot
//! be replayed. Lookups recompute the digest from the presented plaintext.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::validator::Validator;

/// Length of every plaintext token.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

/// Entropy per token in bytes.
const TOKEN_BYTES: usize = 16;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Activation tokens live for three days.
pub const ACTIVATION_TTL: Duration = Duration::hours(72);

/// Operation class a token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly generated token. Serializes to `{"token","expiry"}`.
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest = hex::encode(&self.hash);
        f.debug_struct("Token")
            .field("plaintext", &"<redacted>")
            .field("hash", &&digest[..12.min(digest.len())])
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Token {
    /// Generate a token for `user_id` that expires `ttl` from now.
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);

        let plaintext = base32_encode(&bytes);
        let hash = hash_plaintext(&plaintext);

        Self {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }
}

/// SHA-256 digest of a plaintext token, as stored.
pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Cheap structural check, run before any lookup.
pub fn validate_token_plaintext(v: &mut Validator, token: &str) {
    v.check(!token.is_empty(), "token", "must be provided");
    v.check(
        token.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        format!("must be {TOKEN_PLAINTEXT_LEN} bytes long"),
    );
    v.check(
        token.bytes().all(|b| BASE32_ALPHABET.contains(&b)),
        "token",
        "must contain only the characters A-Z and 2-7",
    );
}

/// Authentication token lifetime for the given deployment environment.
pub fn authentication_ttl(production: bool) -> Duration {
    if production {
        Duration::days(14)
    } else {
        Duration::days(28)
    }
}

/// RFC 4648 base32, no padding.
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            let index = (buffer >> (bits - 5)) & 0x1f;
            out.push(BASE32_ALPHABET[index as usize] as char);
            bits -= 5;
        }
    }
    if bits > 0 {
        let index = (buffer << (5 - bits)) & 0x1f;
        out.push(BASE32_ALPHABET[index as usize] as char);
    }

    out
}
