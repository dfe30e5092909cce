use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, KeyAlgorithm},
    Algorithm, DecodingKey, Validation,
};
use serde::{Deserialize, Serialize};

use crate::{JwksClient, VerifyError};

/// Only public-key algorithms: a relying party never holds a shared secret.
const ACCEPTED: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// The JWS algorithm a key is declared for, `None` for encryption-only keys.
fn signing_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityClaims {
    #[serde(default)]
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
}

#[derive(Debug)]
pub struct Verifier {
    jwks: JwksClient,
    audience: Vec<String>,
    issuer: Option<String>,
    leeway: u64,
}

impl Verifier {
    pub fn new(jwks: JwksClient) -> Self {
        Self {
            jwks,
            audience: Vec::new(),
            issuer: None,
            leeway: 60,
        }
    }

    /// Accept tokens for `aud`. Without any audience, `aud` is not checked.
    pub fn with_audience(mut self, aud: impl Into<String>) -> Self {
        self.audience.push(aud.into());
        self
    }

    pub fn with_issuer(mut self, iss: impl Into<String>) -> Self {
        self.issuer = Some(iss.into());
        self
    }

    /// Clock skew tolerated on `exp`, `nbf` and `iat`, in seconds.
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn jwks(&self) -> &JwksClient {
        &self.jwks
    }

    pub async fn verify(
        &self,
        token: &str,
    ) -> Result<IdentityClaims, VerifyError> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
        let jwk = self.jwks.key(&kid).await?;
        self.verify_with(&jwk, token)
    }

    /// Verifies `token` against an already resolved key.
    pub fn verify_with(
        &self,
        jwk: &Jwk,
        token: &str,
    ) -> Result<IdentityClaims, VerifyError> {
        let header = decode_header(token)?;
        if !ACCEPTED.contains(&header.alg) {
            return Err(VerifyError::UnsupportedAlgorithm(format!(
                "{:?}",
                header.alg
            )));
        }
        if let Some(key_alg) = jwk.common.key_algorithm {
            if signing_algorithm(key_alg) != Some(header.alg) {
                return Err(VerifyError::UnsupportedAlgorithm(format!(
                    "{:?} token for a {key_alg:?} key",
                    header.alg
                )));
            }
        }

        let key = DecodingKey::from_jwk(jwk)?;
        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway;
        validation.validate_nbf = true;
        if self.audience.is_empty() {
            validation.validate_aud = false;
            validation.set_required_spec_claims(&["exp", "sub"]);
        } else {
            validation.set_audience(&self.audience);
            validation.set_required_spec_claims(&["exp", "sub", "aud"]);
        }
        if let Some(ref iss) = self.issuer {
            validation.set_issuer(&[iss]);
        }

        let claims = decode::<IdentityClaims>(token, &key, &validation)?.claims;
        if claims.sub.is_empty() {
            return Err(VerifyError::MissingClaim("sub".to_owned()));
        }
        if claims.iat > Utc::now().timestamp() + self.leeway as i64 {
            return Err(VerifyError::Immature);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    use super::*;

    const PEM: &str = include_str!("../testdata/rsa.pem");

    fn jwk() -> Jwk {
        serde_json::from_value(json!({
            "kty": "RSA",
            "kid": "test",
            "use": "sig",
            "alg": "RS256",
            "n": include_str!("../testdata/rsa.n").trim(),
            "e": "AQAB",
        }))
        .unwrap()
    }

    fn sign(claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("test".to_owned());
        encode(
            &header,
            &claims,
            &EncodingKey::from_rsa_pem(PEM.as_bytes()).unwrap(),
        )
        .unwrap()
    }

    fn verifier() -> Verifier {
        Verifier::new(JwksClient::new("http://127.0.0.1:1/jwks.json"))
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    #[test]
    fn valid_token_yields_claims() {
        let token = sign(json!({
            "sub": "jbloggs@example.com",
            "iat": now(),
            "nbf": now(),
            "exp": now() + 300,
            "iss": "http://127.0.0.1:30050",
        }));
        let claims = verifier()
            .with_issuer("http://127.0.0.1:30050")
            .verify_with(&jwk(), &token)
            .unwrap();
        assert_eq!(claims.sub, "jbloggs@example.com");
        assert_eq!(claims.aud, None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign(json!({
            "sub": "jbloggs@example.com",
            "iat": now() - 3600,
            "exp": now() - 600,
        }));
        assert!(matches!(
            verifier().verify_with(&jwk(), &token),
            Err(VerifyError::Expired)
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = sign(json!({
            "sub": "jbloggs@example.com",
            "iat": now(),
            "exp": now() + 300,
        }));
        let forged = sign(json!({
            "sub": "someone@example.com",
            "iat": now(),
            "exp": now() + 300,
        }));
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = forged.split('.').nth(1).unwrap();
        assert!(matches!(
            verifier().verify_with(&jwk(), &parts.join(".")),
            Err(VerifyError::InvalidSignature)
        ));
    }

    #[test]
    fn symmetric_tokens_are_refused() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("test".to_owned());
        let token = encode(
            &header,
            &json!({"sub": "x", "iat": now(), "exp": now() + 60}),
            &EncodingKey::from_secret(b"guessable"),
        )
        .unwrap();
        assert!(matches!(
            verifier().verify_with(&jwk(), &token),
            Err(VerifyError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn token_must_match_declared_key_algorithm() {
        let token = sign(json!({
            "sub": "jbloggs@example.com",
            "iat": now(),
            "exp": now() + 300,
        }));
        let mut key = jwk();
        key.common.key_algorithm = Some(KeyAlgorithm::PS256);
        assert!(matches!(
            verifier().verify_with(&key, &token),
            Err(VerifyError::UnsupportedAlgorithm(_))
        ));
        key.common.key_algorithm = None;
        assert!(verifier().verify_with(&key, &token).is_ok());
        assert_eq!(signing_algorithm(KeyAlgorithm::RSA_OAEP), None);
    }

    #[test]
    fn audience_and_issuer_are_checked() {
        let token = sign(json!({
            "sub": "jbloggs@example.com",
            "aud": "explore",
            "iss": "http://a.example",
            "iat": now(),
            "exp": now() + 300,
        }));
        assert!(verifier()
            .with_audience("explore")
            .verify_with(&jwk(), &token)
            .is_ok());
        assert!(matches!(
            verifier().with_audience("stats").verify_with(&jwk(), &token),
            Err(VerifyError::InvalidAudience)
        ));
        assert!(matches!(
            verifier()
                .with_issuer("http://b.example")
                .verify_with(&jwk(), &token),
            Err(VerifyError::InvalidIssuer)
        ));
    }

    #[test]
    fn sub_is_required() {
        let token = sign(json!({"iat": now(), "exp": now() + 300}));
        assert!(matches!(
            verifier().verify_with(&jwk(), &token),
            Err(VerifyError::MissingClaim(claim)) if claim == "sub"
        ));
    }

    #[test]
    fn future_iat_is_rejected() {
        let token = sign(json!({
            "sub": "jbloggs@example.com",
            "iat": now() + 3600,
            "exp": now() + 7200,
        }));
        assert!(matches!(
            verifier().verify_with(&jwk(), &token),
            Err(VerifyError::Immature)
        ));
    }

    #[tokio::test]
    async fn token_without_kid_is_rejected() {
        let token = encode(
            &Header::new(Algorithm::RS256),
            &json!({"sub": "x", "iat": now(), "exp": now() + 60}),
            &EncodingKey::from_rsa_pem(PEM.as_bytes()).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            verifier().verify(&token).await,
            Err(VerifyError::MissingKeyId)
        ));
    }
}
