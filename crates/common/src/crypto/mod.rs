//! Cryptographic primitives for Sea of Stuff nodes
//!
//! - **Identity & signing**: Ed25519 keypairs. A node's public key is its
//!   certificate; users and roles sign manifests with theirs.
//! - **Label sealing**: AES-256-GCM under a per-compound [`DataKey`], used by
//!   secure compounds to hide content labels.

mod keys;
mod secret;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{DataKey, SecretError, DATA_KEY_SIZE, NONCE_SIZE};
