//! Request signing for the 3Commas API
//!
//! The signed string is the canonical path: `/public/api` + endpoint, plus
//! `?` and the key-sorted `k=v&k=v` query when there is one. HMAC keys
//! produce a hex digest; RSA keys produce a base64 PKCS#1 v1.5 signature.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer as _};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::config::{Credentials, Secret, UserMode, API_PREFIX};
use crate::error::{ClientError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_API_KEY: &str = "APIKEY";
pub const HEADER_SIGNATURE: &str = "Signature";
pub const HEADER_FORCED_MODE: &str = "Forced-Mode";

/// Query parameters, kept sorted by key
pub type QueryParams = BTreeMap<String, String>;

/// Join params as `k=v` pairs with `&`, sorted by key, without re-encoding
pub fn canonical_query(params: &QueryParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Path that both gets signed and gets requested
pub fn signature_path(endpoint: &str, params: &QueryParams) -> String {
    let query = canonical_query(params);
    if query.is_empty() {
        format!("{}{}", API_PREFIX, endpoint)
    } else {
        format!("{}{}?{}", API_PREFIX, endpoint, query)
    }
}

/// Headers attached to one signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub api_key: String,
    pub signature: String,
    pub forced_mode: Option<UserMode>,
}

impl SignedHeaders {
    /// `(name, value)` pairs in send order
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (HEADER_API_KEY, self.api_key.clone()),
            (HEADER_SIGNATURE, self.signature.clone()),
        ];
        if let Some(mode) = self.forced_mode {
            pairs.push((HEADER_FORCED_MODE, mode.as_str().to_string()));
        }
        pairs
    }
}

enum SigningMethod {
    Hmac(Vec<u8>),
    Rsa(SigningKey<Sha256>),
}

/// Builds authentication headers from immutable credentials
pub struct Signer {
    api_key: String,
    mode: Option<UserMode>,
    method: SigningMethod,
}

impl Signer {
    /// Create a signer. RSA keys are parsed here (PKCS#8, then PKCS#1).
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let method = match &credentials.secret {
            Secret::Hmac(secret) => SigningMethod::Hmac(secret.as_bytes().to_vec()),
            Secret::RsaPem(pem) => SigningMethod::Rsa(SigningKey::<Sha256>::new(
                parse_private_key(pem)?,
            )),
        };

        Ok(Self {
            api_key: credentials.api_key.clone(),
            mode: credentials.mode,
            method,
        })
    }

    /// Sign a GET-style request for `endpoint` with `params`
    pub fn sign(&self, method: &str, endpoint: &str, params: &QueryParams) -> Result<SignedHeaders> {
        let path = signature_path(endpoint, params);
        debug!("Signing {} {}", method, path);

        let signature = match &self.method {
            SigningMethod::Hmac(secret) => hmac_signature(secret, &path)?,
            SigningMethod::Rsa(key) => rsa_signature(key, &path)?,
        };

        Ok(SignedHeaders {
            api_key: self.api_key.clone(),
            signature,
            forced_mode: self.mode,
        })
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let method = match self.method {
            SigningMethod::Hmac(_) => "hmac",
            SigningMethod::Rsa(_) => "rsa",
        };
        f.debug_struct("Signer")
            .field("api_key", &self.api_key)
            .field("method", &method)
            .field("mode", &self.mode)
            .finish()
    }
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| {
            error!("Error loading RSA private key: {}", e);
            ClientError::Authentication(format!("Error loading RSA private key: {}", e))
        })
}

fn hmac_signature(secret: &[u8], path: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| ClientError::Authentication(format!("Invalid API secret: {}", e)))?;
    mac.update(path.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn rsa_signature(key: &SigningKey<Sha256>, path: &str) -> Result<String> {
    let signature = key.try_sign(path.as_bytes()).map_err(|e| {
        error!("Error generating RSA signature: {}", e);
        ClientError::Authentication(format!("Error generating RSA signature: {}", e))
    })?;
    let encoded = STANDARD.encode(signature.to_bytes());
    debug!("Generated RSA signature with length {}", encoded.len());
    Ok(encoded)
}
