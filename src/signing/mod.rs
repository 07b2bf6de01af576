//! Compact JWS signing for status lists and access tokens.

use std::str::FromStr;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use thiserror::Error;

use crate::config::{SigningConfig, SigningKeySource};

#[derive(Debug, Error)]
pub enum SignError {
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Failed to read signing key {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid signing key: {0}")]
    InvalidKey(jsonwebtoken::errors::Error),
    #[error("Failed to sign: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

/// Produces a compact JWS over a JSON claim set.
pub trait Signer: Send + Sync {
    /// Sign `claims` with the header `typ` set to `typ`.
    fn sign(&self, typ: &str, claims: &serde_json::Value) -> Result<String, SignError>;

    /// Algorithm written to the `alg` header.
    fn algorithm(&self) -> Algorithm;
}

pub struct JwtSigner {
    algorithm: Algorithm,
    key: EncodingKey,
    key_id: Option<String>,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl JwtSigner {
    pub fn from_config(config: &SigningConfig) -> Result<Self, SignError> {
        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| SignError::UnsupportedAlgorithm(config.algorithm.clone()))?;

        let key = match (&config.key, algorithm) {
            (SigningKeySource::Secret(secret), Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => {
                EncodingKey::from_secret(secret.as_bytes())
            }
            (SigningKeySource::PemFile(path), alg) => {
                let pem = std::fs::read(path).map_err(|source| SignError::KeyFile {
                    path: path.clone(),
                    source,
                })?;
                Self::pem_key(alg, &pem)?
            }
            (SigningKeySource::Secret(_), alg) => {
                return Err(SignError::UnsupportedAlgorithm(format!(
                    "{alg:?} requires SIGNING_KEY_PEM"
                )));
            }
        };

        Ok(Self {
            algorithm,
            key,
            key_id: config.key_id.clone(),
        })
    }

    /// HMAC signer with a shared secret.
    pub fn hmac(algorithm: Algorithm, secret: &[u8]) -> Self {
        Self {
            algorithm,
            key: EncodingKey::from_secret(secret),
            key_id: None,
        }
    }

    fn pem_key(algorithm: Algorithm, pem: &[u8]) -> Result<EncodingKey, SignError> {
        match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem).map_err(SignError::InvalidKey),
            Algorithm::ES256 | Algorithm::ES384 => {
                EncodingKey::from_ec_pem(pem).map_err(SignError::InvalidKey)
            }
            Algorithm::EdDSA => EncodingKey::from_ed_pem(pem).map_err(SignError::InvalidKey),
            other => Err(SignError::UnsupportedAlgorithm(format!(
                "{other:?} cannot use a PEM key"
            ))),
        }
    }
}

impl Signer for JwtSigner {
    fn sign(&self, typ: &str, claims: &serde_json::Value) -> Result<String, SignError> {
        let mut header = Header::new(self.algorithm);
        header.typ = Some(typ.to_string());
        header.kid = self.key_id.clone();
        Ok(jsonwebtoken::encode(&header, claims, &self.key)?)
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

    #[test]
    fn test_hmac_sign_sets_typ_and_kid() {
        let config = SigningConfig {
            algorithm: "HS256".to_string(),
            key_id: Some("k1".to_string()),
            key: SigningKeySource::Secret("secret".to_string()),
        };
        let signer = JwtSigner::from_config(&config).unwrap();

        let exp = chrono::Utc::now().timestamp() + 60;
        let token = signer
            .sign("statuslist+jwt", &serde_json::json!({"sub": "x", "exp": exp}))
            .unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.typ.as_deref(), Some("statuslist+jwt"));
        assert_eq!(header.kid.as_deref(), Some("k1"));
        assert_eq!(header.alg, signer.algorithm());

        let data = decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims["sub"], "x");
    }

    #[test]
    fn test_rejects_unknown_algorithm() {
        let config = SigningConfig {
            algorithm: "none".to_string(),
            ..SigningConfig::default()
        };
        assert!(matches!(
            JwtSigner::from_config(&config),
            Err(SignError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_asymmetric_algorithm_needs_pem() {
        let config = SigningConfig {
            algorithm: "RS256".to_string(),
            ..SigningConfig::default()
        };
        assert!(JwtSigner::from_config(&config).is_err());
    }

    #[test]
    fn test_missing_pem_file() {
        let config = SigningConfig {
            algorithm: "ES256".to_string(),
            key_id: None,
            key: SigningKeySource::PemFile("/nonexistent/key.pem".to_string()),
        };
        assert!(matches!(
            JwtSigner::from_config(&config),
            Err(SignError::KeyFile { .. })
        ));
    }
}
