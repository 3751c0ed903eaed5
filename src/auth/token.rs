//! Ephemeral bearer tokens.
//!
//! A token is the base64 encoding of a small JSON document. The encoding is
//! reversible and carries no message authentication: anyone who knows the
//! format can forge a token. A keyed signature over the payload must replace
//! [`BearerToken::encode`] and [`BearerToken::decode`] before the token can be
//! relied on for integrity.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed token lifetime in seconds.
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Authenticated subject attached to a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub name: String,
}

/// Claims carried by a bearer token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    pub email: String,
    pub name: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
}

impl BearerToken {
    /// Issue claims for `identity` valid for [`TOKEN_TTL_SECS`] from `now`.
    pub fn issue(identity: &Identity, now: DateTime<Utc>) -> Self {
        let iat = now.timestamp();
        Self {
            email: identity.email.clone(),
            name: identity.name.clone(),
            iat,
            exp: iat + TOKEN_TTL_SECS,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of strings and integers cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Reverse [`encode`](Self::encode); `None` on any decoding failure.
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = STANDARD.decode(token.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    pub fn identity(&self) -> Identity {
        Identity {
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Mint an opaque token string for `identity`.
pub fn mint_token(identity: &Identity, now: DateTime<Utc>) -> String {
    BearerToken::issue(identity, now).encode()
}

/// Validate an opaque token string.
///
/// Fails closed: malformed input, an unexpected structure, and expired claims
/// all yield `None`.
pub fn validate_token(token: &str, now: DateTime<Utc>) -> Option<Identity> {
    let claims = BearerToken::decode(token)?;
    if claims.is_expired(now) {
        return None;
    }
    Some(claims.identity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alice() -> Identity {
        Identity {
            email: "alice@hundredxinc.com".to_string(),
            name: "Alice".to_string(),
        }
    }

    #[test]
    fn test_mint_then_validate() {
        let now = Utc::now();
        let token = mint_token(&alice(), now);
        assert_eq!(validate_token(&token, now), Some(alice()));
    }

    #[test]
    fn test_ttl_is_one_hour() {
        let now = Utc::now();
        let claims = BearerToken::decode(&mint_token(&alice(), now)).unwrap();
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.iat, now.timestamp());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let issued = Utc::now() - Duration::seconds(TOKEN_TTL_SECS + 5);
        let token = mint_token(&alice(), issued);
        assert_eq!(validate_token(&token, Utc::now()), None);
    }

    #[test]
    fn test_token_expires_exactly_at_exp() {
        let issued = Utc::now();
        let token = mint_token(&alice(), issued);
        let at_expiry = issued + Duration::seconds(TOKEN_TTL_SECS);
        assert_eq!(validate_token(&token, at_expiry), None);
        let just_before = at_expiry - Duration::seconds(1);
        assert_eq!(validate_token(&token, just_before), Some(alice()));
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let now = Utc::now();
        assert_eq!(validate_token("", now), None);
        assert_eq!(validate_token("not base64 at all!", now), None);
        // Valid base64, but not a claims document.
        let garbage = STANDARD.encode(br#"{"email":"a@b.c"}"#);
        assert_eq!(validate_token(&garbage, now), None);
        let not_json = STANDARD.encode(b"hello");
        assert_eq!(validate_token(&not_json, now), None);
    }

    #[test]
    fn test_reads_tokens_in_wire_format() {
        let now = Utc::now().timestamp();
        let raw = format!(
            r#"{{"email":"bob@hundredxinc.com","name":"Bob","iat":{now},"exp":{}}}"#,
            now + 60
        );
        let token = STANDARD.encode(raw);
        let identity = validate_token(&token, Utc::now()).unwrap();
        assert_eq!(identity.email, "bob@hundredxinc.com");
        assert_eq!(identity.name, "Bob");
    }
}
