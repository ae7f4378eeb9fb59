// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Token wire format and the validated token set
//!
//! [`TokenResponse`] mirrors the JSON body of the provider's token endpoint.
//! [`TokenSet`] is the validated form this crate keeps in the session: both
//! tokens together with the absolute expiry, so the "access and refresh token
//! are both present or both absent" invariant holds structurally.
//!
//! Access tokens are treated as opaque bearer strings. When the provider
//! omits `expires_in`, the token is peeked at as a JWT — without signature
//! verification — purely to recover the `exp` and `aud` claims. Signature
//! validation is the resource server's job, not ours.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Minimum interval between a scheduled refresh and token expiry, in seconds
const MIN_REFRESH_MARGIN_SECS: i64 = 5;

/// JSON body returned by the token endpoint for every grant
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Opaque bearer string presented to the resource server
    pub access_token: String,
    /// Expected to be `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
    /// Declared access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Credential used to mint a new access token without re-prompting
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Declared refresh token lifetime in seconds
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
    /// OIDC identity token, unused by the session core
    #[serde(default)]
    pub id_token: Option<String>,
    /// Scopes actually granted
    #[serde(default)]
    pub scope: Option<String>,
}

/// The validated token set held by an authenticated session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Opaque bearer string for `Authorization: Bearer <token>` headers
    pub access_token: String,
    /// Credential presented to the token endpoint on refresh
    pub refresh_token: String,
    /// Token type as declared by the provider
    pub token_type: String,
    /// Instant the token set was accepted
    pub issued_at: DateTime<Utc>,
    /// Absolute expiry derived from the declared lifetime
    pub expires_at: DateTime<Utc>,
    /// `aud` claim decoded from the access token, when it is a JWT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl TokenSet {
    /// Validate a token response into a token set
    ///
    /// Fails with [`SessionError::Provider`] when the response misses the
    /// refresh token or carries no usable lifetime information.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Result<Self, SessionError> {
        let refresh_token = response.refresh_token.ok_or_else(|| SessionError::Provider {
            reason: "token response did not include a refresh_token".to_string(),
        })?;

        let claims = peek_claims(&response.access_token);

        let expires_at = match response.expires_in {
            // Reject lifetimes that overflow the i64 cast or chrono's range
            // instead of panicking on arithmetic
            Some(secs) => i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .ok_or_else(|| SessionError::Provider {
                    reason: format!("token response declares an absurd expires_in of {}", secs),
                })?,
            None => claims
                .as_ref()
                .and_then(|c| c.exp)
                .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
                .ok_or_else(|| SessionError::Provider {
                    reason: "token response carries neither expires_in nor a decodable exp claim"
                        .to_string(),
                })?,
        };

        let token_type = response.token_type.unwrap_or_else(|| "Bearer".to_string());
        if !token_type.eq_ignore_ascii_case("bearer") {
            warn!("provider issued a non-Bearer token type: {}", token_type);
        }

        Ok(Self {
            access_token: response.access_token,
            refresh_token,
            token_type,
            issued_at: now,
            expires_at,
            audience: claims.and_then(|c| c.audiences().into_iter().next()),
        })
    }

    /// Whether the access token is still usable at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Instant the scheduled refresh should fire
    ///
    /// 80% of the token lifetime, but never later than five seconds before
    /// expiry. For very short lifetimes this lands in the past, which the
    /// scheduler treats as "refresh immediately".
    pub fn refresh_at(&self) -> DateTime<Utc> {
        let lifetime = self.expires_at - self.issued_at;
        let margin = Duration::seconds(
            (lifetime.num_seconds() / 5).max(MIN_REFRESH_MARGIN_SECS),
        );
        self.expires_at - margin
    }
}

/// Claims recovered from an access token without signature verification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnverifiedClaims {
    /// Expiry as a Unix timestamp
    #[serde(default)]
    pub exp: Option<i64>,
    /// Audience: a single string or an array of strings
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,
    /// Subject
    #[serde(default)]
    pub sub: Option<String>,
    /// Preferred username, populated by Keycloak-style providers
    #[serde(default)]
    pub preferred_username: Option<String>,
}

impl UnverifiedClaims {
    /// The `aud` claim normalized to a list of strings
    pub fn audiences(&self) -> Vec<String> {
        match &self.aud {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Decode the claims of a JWT access token without verifying its signature
///
/// Returns `None` for opaque (non-JWT) tokens, which are perfectly legal
/// bearer tokens as far as this crate is concerned.
pub fn peek_claims(token: &str) -> Option<UnverifiedClaims> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = Default::default();
    match decode::<UnverifiedClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            debug!("access token is not a decodable JWT: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn response(expires_in: Option<u64>, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "T1".to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in,
            refresh_token: refresh.map(str::to_string),
            refresh_expires_in: None,
            id_token: None,
            scope: None,
        }
    }

    /// Build an unsigned JWT with the given claims payload
    fn fake_jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(b"invalid-signature");
        format!("{}.{}.{}", header, payload, signature)
    }

    #[test]
    fn expiry_derived_from_expires_in() {
        let now = Utc::now();
        let set = TokenSet::from_response(response(Some(60), Some("R1")), now).unwrap();
        assert_eq!(set.expires_at, now + Duration::seconds(60));
        assert!(set.is_fresh(now));
        assert!(set.is_fresh(now + Duration::seconds(59)));
        assert!(!set.is_fresh(now + Duration::seconds(60)));
    }

    #[test]
    fn missing_refresh_token_is_rejected() {
        let err = TokenSet::from_response(response(Some(60), None), Utc::now()).unwrap_err();
        assert!(matches!(err, SessionError::Provider { .. }));
    }

    #[test]
    fn expiry_falls_back_to_exp_claim() {
        let exp = Utc::now().timestamp() + 120;
        let mut resp = response(None, Some("R1"));
        resp.access_token = fake_jwt(serde_json::json!({ "exp": exp, "aud": "appstore" }));
        let set = TokenSet::from_response(resp, Utc::now()).unwrap();
        assert_eq!(set.expires_at.timestamp(), exp);
        assert_eq!(set.audience.as_deref(), Some("appstore"));
    }

    #[test]
    fn expires_in_beyond_i64_is_rejected() {
        // 1e19 seconds does not fit in i64; must not wrap into the past
        let err =
            TokenSet::from_response(response(Some(10_000_000_000_000_000_000), Some("R1")), Utc::now())
                .unwrap_err();
        assert!(matches!(err, SessionError::Provider { .. }));
    }

    #[test]
    fn expires_in_beyond_chrono_range_is_rejected() {
        // Fits in i64 but exceeds what a chrono duration can represent
        let err =
            TokenSet::from_response(response(Some(9_000_000_000_000_000_000), Some("R1")), Utc::now())
                .unwrap_err();
        assert!(matches!(err, SessionError::Provider { .. }));
    }

    #[test]
    fn no_lifetime_information_is_rejected() {
        // Opaque token and no expires_in: nothing to derive the expiry from
        let err = TokenSet::from_response(response(None, Some("R1")), Utc::now()).unwrap_err();
        assert!(matches!(err, SessionError::Provider { .. }));
    }

    #[test]
    fn refresh_fires_at_eighty_percent_of_lifetime() {
        let now = Utc::now();
        let set = TokenSet::from_response(response(Some(60), Some("R1")), now).unwrap();
        // 60s lifetime, 20% margin = 12s, well above the 5s floor
        assert_eq!(set.refresh_at(), now + Duration::seconds(48));
    }

    #[test]
    fn refresh_margin_never_shrinks_below_five_seconds() {
        let now = Utc::now();
        let set = TokenSet::from_response(response(Some(12), Some("R1")), now).unwrap();
        // 20% would be 2.4s; the 5s floor wins
        assert_eq!(set.refresh_at(), now + Duration::seconds(7));
    }

    #[test]
    fn tiny_lifetime_schedules_in_the_past() {
        let now = Utc::now();
        let set = TokenSet::from_response(response(Some(3), Some("R1")), now).unwrap();
        assert!(set.refresh_at() < now);
    }

    #[test]
    fn aud_array_is_normalized() {
        let token = fake_jwt(serde_json::json!({
            "exp": 1_900_000_000i64,
            "aud": ["appstore", "test-app-backend"]
        }));
        let claims = peek_claims(&token).unwrap();
        assert_eq!(claims.audiences(), vec!["appstore", "test-app-backend"]);
    }

    #[test]
    fn opaque_token_peeks_to_none() {
        assert!(peek_claims("not-a-jwt").is_none());
    }
}
