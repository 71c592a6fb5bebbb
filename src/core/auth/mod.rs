//! Verification of the bearer tokens the task dispatcher attaches to build
//! requests.

mod oidc;

pub use oidc::OidcTokenVerifier;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::BuildError;

/// The claims a build request token must carry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifiedClaims {
    pub iss: String,
    pub email: String,
    pub aud: String,
    pub exp: u64,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, BuildError>;
}

/// Who may dispatch builds: the issuer, the service account and the audience
/// prefix every token must match.
#[derive(Debug, Clone)]
pub struct ClaimPolicy {
    pub issuer: String,
    pub email: String,
    pub audience_prefix: String,
}

impl ClaimPolicy {
    pub fn check(&self, claims: &VerifiedClaims) -> Result<(), BuildError> {
        if claims.iss != self.issuer {
            return Err(BuildError::Auth("iss is invalid".to_string()));
        }
        if claims.email != self.email {
            return Err(BuildError::Auth("email is invalid".to_string()));
        }
        if !claims.aud.starts_with(&self.audience_prefix) {
            return Err(BuildError::Auth("aud is invalid".to_string()));
        }
        Ok(())
    }
}
