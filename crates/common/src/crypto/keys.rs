use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

const PEM_TAG: &str = "PRIVATE KEY";

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("signature error: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),
}

/// Public half of an Ed25519 keypair.
///
/// Travels as standard base64 on the wire, which is also the text that a
/// node's GUID is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        PublicKey(key)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "invalid public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            )
        })?;
        Ok(PublicKey(VerifyingKey::from_bytes(&bytes)?))
    }
}

impl PublicKey {
    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        let bytes = BASE64
            .decode(text.trim())
            .map_err(|e| anyhow::anyhow!("public key base64 decode error: {}", e))?;
        Self::try_from(bytes.as_slice())
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Verify an Ed25519 signature on a message
    pub fn verify(&self, msg: &[u8], signature: &ed25519_dalek::Signature) -> Result<(), KeyError> {
        self.0.verify_strict(msg, signature)?;
        Ok(())
    }

    /// Verify a base64-encoded signature, as carried in manifest `Signature` fields
    pub fn verify_base64(&self, msg: &[u8], signature: &str) -> Result<(), KeyError> {
        let bytes = BASE64
            .decode(signature)
            .map_err(|e| anyhow::anyhow!("signature base64 decode error: {}", e))?;
        let signature = ed25519_dalek::Signature::from_slice(&bytes)?;
        self.verify(msg, &signature)
    }
}

/// Private half of an Ed25519 keypair.
///
/// Stored on disk as PEM (`key.pem` in the node's config directory).
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&self.public()).finish()
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(bytes: [u8; PRIVATE_KEY_SIZE]) -> Self {
        SecretKey(SigningKey::from_bytes(&bytes))
    }
}

impl SecretKey {
    /// Generate a new key from the system RNG
    pub fn generate() -> Result<Self, KeyError> {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
        Ok(bytes.into())
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_pem(&self) -> String {
        let pem = pem::Pem::new(PEM_TAG, self.to_bytes());
        pem::encode(&pem)
    }

    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| anyhow::anyhow!("failed to parse PEM: {}", e))?;
        if pem.tag() != PEM_TAG {
            return Err(anyhow::anyhow!("unexpected PEM tag: {}", pem.tag()).into());
        }
        let bytes: [u8; PRIVATE_KEY_SIZE] = pem.contents().try_into().map_err(|_| {
            anyhow::anyhow!(
                "invalid private key size, expected {}, got {}",
                PRIVATE_KEY_SIZE,
                pem.contents().len()
            )
        })?;
        Ok(bytes.into())
    }

    pub fn sign(&self, msg: &[u8]) -> ed25519_dalek::Signature {
        self.0.sign(msg)
    }

    /// Sign and encode the signature as base64
    pub fn sign_base64(&self, msg: &[u8]) -> String {
        BASE64.encode(self.sign(msg).to_bytes())
    }
}
