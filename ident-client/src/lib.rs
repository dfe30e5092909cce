//! Relying-party side of identity tokens: resolves keys from a published
//! JWKS document and verifies tokens against them.

mod jwks;
mod verifier;

use thiserror::Error;

pub use jwks::JwksClient;
pub use verifier::{Audience, IdentityClaims, Verifier};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token header carries no kid")]
    MissingKeyId,
    #[error("no published key with kid `{0}`")]
    UnknownKey(String),
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    Immature,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token audience is not accepted")]
    InvalidAudience,
    #[error("token issuer is not accepted")]
    InvalidIssuer,
    #[error("token is missing the `{0}` claim")]
    MissingClaim(String),
    #[error("algorithm {0} is not accepted")]
    UnsupportedAlgorithm(String),
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("could not fetch the key set: {0}")]
    Fetch(#[from] reqwest::Error),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::Immature,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::MissingRequiredClaim(claim) => {
                Self::MissingClaim(claim.clone())
            }
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                Self::UnsupportedAlgorithm(err.to_string())
            }
            _ => Self::Malformed(err.to_string()),
        }
    }
}

pub fn version() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
