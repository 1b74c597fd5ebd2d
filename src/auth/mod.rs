//! Authentication and role gating.
//!
//! The retrieval pipeline never authenticates anything itself. HTTP handlers
//! turn the session cookie into an [`Identity`] through [`AuthGate`] and only
//! then call into ingestion or answering.
//!
//! | Piece | Purpose |
//! |-------|---------|
//! | [`password`] | Argon2 hashing |
//! | [`token`] | HS256 session tokens |
//! | [`users`] | `users` table access |

pub mod password;
pub mod token;
pub mod users;

use crate::error::{AuthError, AuthResult, InputConstraintViolation};
use crate::models::Identity;

pub use token::TokenIssuer;
pub use users::UserStore;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// Verifies session tokens and enforces role requirements.
#[derive(Clone)]
pub struct AuthGate {
    tokens: TokenIssuer,
}

impl AuthGate {
    pub fn new(tokens: TokenIssuer) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Resolve the caller from its session token and require that it holds
    /// at least one of `required_roles`.
    pub fn authorize(&self, token: Option<&str>, required_roles: &[&str]) -> AuthResult<Identity> {
        let token = token.ok_or_else(|| AuthError::Unauthorized("no session".into()))?;
        let identity = self.tokens.verify(token)?;
        require_any_role(&identity, required_roles)?;
        Ok(identity)
    }
}

pub fn require_any_role(identity: &Identity, required_roles: &[&str]) -> AuthResult<()> {
    if identity.has_any_role(required_roles) {
        Ok(())
    } else {
        tracing::warn!(
            username = %identity.username,
            required = ?required_roles,
            "role check failed"
        );
        Err(AuthError::Unauthorized(format!(
            "requires one of: {}",
            required_roles.join(", ")
        )))
    }
}

/// A validated set of role names: trimmed, non-blank, without duplicates,
/// in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleList(Vec<String>);

impl RoleList {
    pub fn parse<I, S>(roles: I) -> Result<Self, InputConstraintViolation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for role in roles {
            let role = role.as_ref().trim();
            if role.is_empty() {
                return Err(InputConstraintViolation::new("role names must not be blank"));
            }
            if role.contains(',') {
                return Err(InputConstraintViolation::new(format!(
                    "role name must not contain ',': {}",
                    role
                )));
            }
            if !out.iter().any(|r| r == role) {
                out.push(role.to_string());
            }
        }
        Ok(Self(out))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}
