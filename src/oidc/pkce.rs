// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PKCE (Proof Key for Code Exchange, RFC 7636)
//!
//! Public frontend clients cannot keep a client secret, so every
//! authorization-code exchange carries an S256 challenge/verifier pair.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// A PKCE S256 verifier/challenge pair
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Random code verifier, sent with the token exchange
    pub verifier: String,
    /// SHA-256 challenge, sent with the authorization request
    pub challenge: String,
}

impl PkceChallenge {
    /// The only challenge method this crate emits
    pub const METHOD: &'static str = "S256";

    /// Generate a fresh verifier and its S256 challenge
    pub fn generate() -> Self {
        // 32 random bytes hex-encoded: 64 chars, within the 43..=128 RFC range
        let verifier: String = rand::random::<[u8; 32]>()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        let challenge = Self::challenge_for(&verifier);
        Self { verifier, challenge }
    }

    /// Compute the S256 challenge for a verifier
    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}
