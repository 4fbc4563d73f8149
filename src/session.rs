// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Stateless signed session tokens for the demo login.
//!
//! Token format: `base64url(json{sub, iat, exp?}) "." base64url(hmac_sha256)`,
//! both without padding. The MAC covers the encoded payload segment.

use crate::cookies;
use crate::validator::constant_time_eq;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Why a token could not be made or was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("session secret rejected by HMAC")]
    InvalidKey,
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("payload is not valid claims")]
    BadPayload,
    #[error("missing subject")]
    MissingSubject,
    #[error("token expired")]
    Expired,
}

/// Create a signed token for `subject` issued at `now` (unix seconds).
pub fn create(
    secret: &[u8],
    subject: &str,
    now: i64,
    ttl_secs: Option<u64>,
) -> Result<String, TokenError> {
    let claims = SessionClaims {
        subject: subject.to_string(),
        issued_at: now,
        expires_at: ttl_secs.map(|ttl| now.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))),
    };
    // Serializing a struct of strings and integers cannot fail.
    let json = serde_json::to_vec(&claims).unwrap_or_default();
    let payload = URL_SAFE_NO_PAD.encode(json);
    let signature = URL_SAFE_NO_PAD.encode(sign(secret, payload.as_bytes())?);
    Ok(format!("{payload}.{signature}"))
}

/// Verify a token, returning its claims when the signature matches and it has not expired.
pub fn verify(secret: &[u8], token: &str, now: i64) -> Option<SessionClaims> {
    match decode(secret, token, now) {
        Ok(claims) => Some(claims),
        Err(reason) => {
            debug!(%reason, "session token rejected");
            None
        }
    }
}

fn decode(secret: &[u8], token: &str, now: i64) -> Result<SessionClaims, TokenError> {
    let (payload, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
    if payload.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Malformed)?;
    let mut mac = new_mac(secret)?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::BadSignature)?;

    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::BadPayload)?;
    let claims: SessionClaims =
        serde_json::from_slice(&json).map_err(|_| TokenError::BadPayload)?;

    if claims.subject.trim().is_empty() {
        return Err(TokenError::MissingSubject);
    }
    if matches!(claims.expires_at, Some(exp) if exp < now) {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

fn sign(secret: &[u8], message: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut mac = new_mac(secret)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn new_mac(secret: &[u8]) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)
}

/// Random 32-byte secret, used when none is configured.
pub fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    secret
}

/// Check demo credentials without short-circuiting on the first differing byte.
pub fn credentials_match(
    expected_user: Option<&str>,
    expected_password: Option<&str>,
    user: &str,
    password: &str,
) -> bool {
    let (Some(expected_user), Some(expected_password)) = (expected_user, expected_password) else {
        return false;
    };
    let user_ok = constant_time_eq(expected_user.as_bytes(), user.as_bytes());
    let password_ok = constant_time_eq(expected_password.as_bytes(), password.as_bytes());
    user_ok & password_ok
}

/// Session cookie names: the current one plus names kept for older clients.
#[derive(Debug, Clone)]
pub struct SessionCookieNames {
    pub primary: String,
    pub legacy: Vec<String>,
}

impl SessionCookieNames {
    /// Every name, primary first.
    pub fn all(&self) -> Vec<&str> {
        std::iter::once(self.primary.as_str())
            .chain(self.legacy.iter().map(String::as_str))
            .collect()
    }

    /// Read the session token from request cookies, preferring the primary name.
    pub fn read_token(&self, headers: &HeaderMap) -> Option<String> {
        let jar = cookies::from_headers(headers);
        self.all()
            .into_iter()
            .find_map(|name| jar.get(name).filter(|v| !v.is_empty()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    const SECRET: &[u8] = b"test-secret-key-that-is-long-enough";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_create_and_verify() {
        let token = create(SECRET, "chris", NOW, None).unwrap();
        let claims = verify(SECRET, &token, NOW + 10_000_000).unwrap();
        assert_eq!(claims.subject, "chris");
        assert_eq!(claims.issued_at, NOW);
        assert_eq!(claims.expires_at, None);
    }

    #[test]
    fn test_token_shape() {
        let token = create(SECRET, "chris", NOW, Some(60)).unwrap();
        assert_eq!(token.matches('.').count(), 1);
        assert!(!token.contains('='));
        assert!(!token.contains('+') && !token.contains('/'));
    }

    #[test]
    fn test_expiry_boundary() {
        let token = create(SECRET, "chris", NOW, Some(60)).unwrap();
        assert!(verify(SECRET, &token, NOW + 60).is_some());
        assert!(verify(SECRET, &token, NOW + 61).is_none());
    }

    #[test]
    fn test_any_secret_length_signs() {
        for secret in [&b""[..], b"k", &[7u8; 200][..]] {
            let token = create(secret, "chris", NOW, None).unwrap();
            assert!(verify(secret, &token, NOW).is_some());
        }
    }

    #[test]
    fn test_wrong_secret() {
        let token = create(SECRET, "chris", NOW, None).unwrap();
        assert!(verify(b"another-secret", &token, NOW).is_none());
    }

    #[test]
    fn test_any_signature_char_flip_rejected() {
        let token = create(SECRET, "chris", NOW, Some(3600)).unwrap();
        let (payload, signature) = token.rsplit_once('.').unwrap();
        for i in 0..signature.len() {
            let mut chars: Vec<char> = signature.chars().collect();
            chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
            let flipped: String = chars.into_iter().collect();
            let tampered = format!("{payload}.{flipped}");
            assert!(
                verify(SECRET, &tampered, NOW).is_none(),
                "flip at {i} accepted"
            );
        }
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = create(SECRET, "chris", NOW, None).unwrap();
        let signature = token.rsplit_once('.').unwrap().1;
        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"admin","iat":0}"#);
        assert!(verify(SECRET, &format!("{forged}.{signature}"), NOW).is_none());
    }

    #[test]
    fn test_malformed_tokens() {
        for token in ["", ".", "nodot", "abc.", ".abc", "!!!.!!!"] {
            assert_eq!(decode(SECRET, token, NOW).unwrap_err(), TokenError::Malformed);
        }
    }

    #[test]
    fn test_signed_garbage_payload_rejected() {
        let payload = URL_SAFE_NO_PAD.encode(b"not json");
        let signature = URL_SAFE_NO_PAD.encode(sign(SECRET, payload.as_bytes()).unwrap());
        let token = format!("{payload}.{signature}");
        assert_eq!(decode(SECRET, &token, NOW).unwrap_err(), TokenError::BadPayload);
    }

    #[test]
    fn test_signed_empty_subject_rejected() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"  ","iat":1}"#);
        let signature = URL_SAFE_NO_PAD.encode(sign(SECRET, payload.as_bytes()).unwrap());
        let token = format!("{payload}.{signature}");
        assert_eq!(decode(SECRET, &token, NOW).unwrap_err(), TokenError::MissingSubject);
    }

    #[test]
    fn test_credentials_match() {
        assert!(credentials_match(Some("chris"), Some("pw"), "chris", "pw"));
        assert!(!credentials_match(Some("chris"), Some("pw"), "chris", "wrong"));
        assert!(!credentials_match(Some("chris"), Some("pw"), "chri", "pw"));
        assert!(!credentials_match(None, Some("pw"), "chris", "pw"));
        assert!(!credentials_match(Some("chris"), None, "chris", ""));
    }

    #[test]
    fn test_read_token_prefers_primary_then_legacy() {
        let names = SessionCookieNames {
            primary: "session".to_string(),
            legacy: vec!["sid".to_string()],
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sid=old; session=new"));
        assert_eq!(names.read_token(&headers).as_deref(), Some("new"));

        headers.insert(header::COOKIE, HeaderValue::from_static("sid=old"));
        assert_eq!(names.read_token(&headers).as_deref(), Some("old"));

        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(names.read_token(&headers), None);
    }

    #[test]
    fn test_random_secret_is_random() {
        assert_eq!(random_secret().len(), 32);
        assert_ne!(random_secret(), random_secret());
    }
}
