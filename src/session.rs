//! Signed cookie sessions.
//!
//! The cookie itself is the session record: base64url(JSON claims) plus an
//! HMAC-SHA256 tag over the encoded claims. There is no server-side session
//! table. Tampered, unsigned, or expired cookies decode to `None`.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "abqeri_session";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub uid: String,
    pub email: String,
    pub role: String,
    pub plan: String,
    pub iat: u64,
}

pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn mac(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length")
}

pub fn encode(claims: &SessionClaims, secret: &[u8]) -> String {
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims serialize"));

    let mut signer = mac(secret);
    signer.update(body.as_bytes());
    let tag = URL_SAFE_NO_PAD.encode(signer.finalize().into_bytes());

    format!("{body}.{tag}")
}

pub fn decode(cookie: &str, secret: &[u8], ttl: Duration, now: u64) -> Option<SessionClaims> {
    let (body, tag) = cookie.split_once('.')?;

    let tag_bytes = URL_SAFE_NO_PAD.decode(tag).ok()?;
    let mut verifier = mac(secret);
    verifier.update(body.as_bytes());
    verifier.verify_slice(&tag_bytes).ok()?;

    let claims: SessionClaims =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(body).ok()?).ok()?;

    if now.saturating_sub(claims.iat) > ttl.as_secs() {
        return None;
    }

    Some(claims)
}

/// Pulls the session cookie value out of a `Cookie:` header value.
pub fn cookie_value(header: &str) -> Option<&str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";
    const TTL: Duration = Duration::from_secs(3600);

    fn claims(iat: u64) -> SessionClaims {
        SessionClaims {
            uid: "u1".to_string(),
            email: "a@b.c".to_string(),
            role: "member".to_string(),
            plan: "free".to_string(),
            iat,
        }
    }

    #[test]
    fn roundtrip() {
        let original = claims(1000);

        let cookie = encode(&original, SECRET);
        let decoded = decode(&cookie, SECRET, TTL, 1000).expect("valid cookie");

        assert_eq!(decoded, original);
    }

    #[test]
    fn tampered_body_is_rejected() {
        let cookie = encode(&claims(1000), SECRET);

        let forged_body = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&SessionClaims {
                role: "admin".to_string(),
                ..claims(1000)
            })
            .unwrap(),
        );
        let tag = cookie.split_once('.').unwrap().1;

        assert!(decode(&format!("{forged_body}.{tag}"), SECRET, TTL, 1000).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let cookie = encode(&claims(1000), SECRET);

        assert!(decode(&cookie, b"other-secret", TTL, 1000).is_none());
    }

    #[test]
    fn unsigned_cookie_is_rejected() {
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims(1000)).unwrap());

        assert!(decode(&body, SECRET, TTL, 1000).is_none());
        assert!(decode(&format!("{body}."), SECRET, TTL, 1000).is_none());
    }

    #[test]
    fn expired_cookie_is_rejected() {
        let cookie = encode(&claims(1000), SECRET);

        assert!(decode(&cookie, SECRET, TTL, 1000 + TTL.as_secs()).is_some());
        assert!(decode(&cookie, SECRET, TTL, 1000 + TTL.as_secs() + 1).is_none());
    }

    #[test]
    fn cookie_header_parsing() {
        assert_eq!(
            cookie_value("other=1; abqeri_session=abc.def; x=2"),
            Some("abc.def")
        );
        assert_eq!(cookie_value("other=1"), None);
    }
}
