use ed25519_dalek::{Signer as _, SigningKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::api::error::ApiError;
use crate::config::SigningScheme;

type HmacSha256 = Hmac<Sha256>;

/// Signs the per-request message with the account's private key.
///
/// The exchange expects `METHOD + endpoint-with-query + epoch-millis`
/// signed over UTF-8 bytes, signature hex-encoded lowercase. Key material
/// is only validated at sign time so a misconfigured key shows up as a
/// `Signature` error on the first call, not at startup.
#[derive(Clone)]
pub struct RequestSigner {
    scheme: SigningScheme,
    secret_key: String,
}

impl RequestSigner {
    pub fn new(scheme: SigningScheme, secret_key: impl Into<String>) -> Self {
        Self {
            scheme,
            secret_key: secret_key.into(),
        }
    }

    /// The exact string the exchange verifies
    pub fn signature_message(method: &str, endpoint: &str, epoch_millis: &str) -> String {
        format!("{}{}{}", method, endpoint, epoch_millis)
    }

    pub fn sign(&self, message: &str) -> Result<String, ApiError> {
        match self.scheme {
            SigningScheme::Ed25519 => self.sign_ed25519(message),
            SigningScheme::HmacSha256 => self.sign_hmac(message),
        }
    }

    fn sign_ed25519(&self, message: &str) -> Result<String, ApiError> {
        let bytes = hex::decode(&self.secret_key)
            .map_err(|e| ApiError::Signature(format!("secret key is not hex: {}", e)))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ApiError::Signature("secret key must be 32 bytes".to_string()))?;

        let signing_key = SigningKey::from_bytes(&key);
        let signature = signing_key.sign(message.as_bytes());
        Ok(hex::encode(signature.to_bytes()))
    }

    fn sign_hmac(&self, message: &str) -> Result<String, ApiError> {
        if self.secret_key.is_empty() {
            return Err(ApiError::Signature("secret key is empty".to_string()));
        }
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ApiError::Signature(e.to_string()))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("scheme", &self.scheme)
            .field("secret_key", &"***REDACTED***")
            .finish()
    }
}
