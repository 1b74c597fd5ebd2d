//! HS256 session tokens.
//!
//! A token is a compact JWT: `base64url(header).base64url(claims).base64url(sig)`
//! where `sig = HMAC-SHA256(secret, header "." claims)`. Claims carry the
//! username, its roles at login time, and issue/expiry timestamps.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::models::Identity;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

/// Issues and verifies session tokens with a shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    /// Read the secret from the environment variable named in `[auth]`.
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let secret = std::env::var(&config.secret_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.secret_env))?;
        if secret.len() < 16 {
            anyhow::bail!("{} must be at least 16 bytes", config.secret_env);
        }
        Ok(Self::new(secret, config.token_ttl_secs))
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn issue(&self, identity: &Identity) -> String {
        self.issue_at(identity, chrono::Utc::now().timestamp())
    }

    fn issue_at(&self, identity: &Identity, now: i64) -> String {
        let claims = Claims {
            sub: identity.username.clone(),
            roles: identity.roles.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        // Serializing a struct of strings and integers cannot fail.
        let claims_json = serde_json::to_vec(&claims).unwrap_or_default();

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));
        format!("{}.{}", signing_input, signature)
    }

    pub fn verify(&self, token: &str) -> AuthResult<Identity> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    fn verify_at(&self, token: &str, now: i64) -> AuthResult<Identity> {
        let invalid = || AuthError::Unauthorized("invalid session token".into());

        let (signing_input, signature) = token.rsplit_once('.').ok_or_else(invalid)?;
        let (header, claims) = signing_input.split_once('.').ok_or_else(invalid)?;

        let header = URL_SAFE_NO_PAD.decode(header).map_err(|_| invalid())?;
        let header: serde_json::Value = serde_json::from_slice(&header).map_err(|_| invalid())?;
        if header.get("alg").and_then(|a| a.as_str()) != Some("HS256") {
            return Err(invalid());
        }

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let claims = URL_SAFE_NO_PAD.decode(claims).map_err(|_| invalid())?;
        let claims: Claims = serde_json::from_slice(&claims).map_err(|_| invalid())?;
        if claims.exp <= now {
            return Err(AuthError::Unauthorized("session expired".into()));
        }

        Ok(Identity {
            username: claims.sub,
            roles: claims.roles,
        })
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            username: "alice".into(),
            roles: vec!["user".into(), "admin".into()],
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let issuer = TokenIssuer::new("0123456789abcdef", 60);
        let token = issuer.issue(&alice());
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(issuer.verify(&token).unwrap(), alice());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenIssuer::new("0123456789abcdef", 60).issue(&alice());
        let other = TokenIssuer::new("fedcba9876543210", 60);
        assert!(matches!(other.verify(&token), Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let issuer = TokenIssuer::new("0123456789abcdef", 60);
        let token = issuer.issue(&Identity {
            username: "bob".into(),
            roles: vec!["user".into()],
        });
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD
            .encode(r#"{"sub":"bob","roles":["admin"],"iat":0,"exp":99999999999}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert!(issuer.verify(&forged).is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let issuer = TokenIssuer::new("0123456789abcdef", 60);
        let token = issuer.issue_at(&alice(), 1_000);
        assert!(issuer.verify_at(&token, 1_059).is_ok());
        let err = issuer.verify_at(&token, 1_060).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_garbage_rejected() {
        let issuer = TokenIssuer::new("0123456789abcdef", 60);
        for token in ["", "a.b", "a.b.c", "....", "eyJ.eyJ.sig"] {
            assert!(issuer.verify(token).is_err(), "accepted {:?}", token);
        }
    }
}
