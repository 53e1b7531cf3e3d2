//! Label sealing for secure compounds
//!
//! Each secure compound has its own [`DataKey`]. Labels are sealed one by one
//! and stored as `base64(nonce || ciphertext || tag)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of an AES-256 key in bytes
pub const DATA_KEY_SIZE: usize = 32;

/// Errors that can occur during sealing/opening
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A 256-bit symmetric key for one secure compound
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey([u8; DATA_KEY_SIZE]);

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(..)")
    }
}

impl From<[u8; DATA_KEY_SIZE]> for DataKey {
    fn from(bytes: [u8; DATA_KEY_SIZE]) -> Self {
        DataKey(bytes)
    }
}

impl DataKey {
    pub fn generate() -> Result<Self, SecretError> {
        let mut buff = [0; DATA_KEY_SIZE];
        getrandom::getrandom(&mut buff)
            .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
        Ok(Self(buff))
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        let bytes: [u8; DATA_KEY_SIZE] = data.try_into().map_err(|_| {
            anyhow::anyhow!(
                "invalid data key size, expected {}, got {}",
                DATA_KEY_SIZE,
                data.len()
            )
        })?;
        Ok(bytes.into())
    }

    pub fn from_base64(text: &str) -> Result<Self, SecretError> {
        let bytes = BASE64
            .decode(text)
            .map_err(|e| anyhow::anyhow!("data key base64 decode error: {}", e))?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    /// Encrypt under a fresh random nonce
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, data)
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if data.len() < NONCE_SIZE {
            return Err(anyhow::anyhow!("data too short for nonce").into());
        }
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let plaintext = self
            .cipher()
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| anyhow::anyhow!("decrypt error"))?;
        Ok(plaintext)
    }

    /// Seal a label into its base64 wire form
    pub fn seal(&self, label: &str) -> Result<String, SecretError> {
        Ok(BASE64.encode(self.encrypt(label.as_bytes())?))
    }

    /// Open a label sealed by [`DataKey::seal`]
    pub fn open(&self, sealed: &str) -> Result<String, SecretError> {
        let bytes = BASE64
            .decode(sealed)
            .map_err(|e| anyhow::anyhow!("sealed label base64 decode error: {}", e))?;
        let plaintext = self.decrypt(&bytes)?;
        String::from_utf8(plaintext)
            .map_err(|e| anyhow::anyhow!("sealed label is not utf-8: {}", e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = DataKey::generate().unwrap();
        let sealed = key.seal("holiday photos").unwrap();
        assert_ne!(sealed, "holiday photos");
        assert_eq!(key.open(&sealed).unwrap(), "holiday photos");
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = DataKey::generate().unwrap();
        let other = DataKey::generate().unwrap();
        let sealed = key.seal("label").unwrap();
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn test_short_data() {
        let key = DataKey::generate().unwrap();
        assert!(key.decrypt(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_base64_round_trip() {
        let key = DataKey::generate().unwrap();
        assert_eq!(DataKey::from_base64(&key.to_base64()).unwrap(), key);
    }
}
