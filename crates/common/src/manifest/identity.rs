//! Users and roles: the signing side of the manifest layer
//!
//! A user owns one or more roles. Each role has its own keypair, and the
//! user vouches for it by signing the role manifest. Versions and compounds
//! are then signed by a role.

use serde::{Deserialize, Serialize};

use super::{ManifestType, Signable};
use crate::crypto::{KeyError, PublicKey, SecretKey};
use crate::guid::Guid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserManifest {
    pub guid: Guid,
    pub name: String,
    pub public_key: String,
}

impl UserManifest {
    pub fn new(name: impl Into<String>, public_key: &PublicKey) -> Self {
        let public_key = public_key.to_base64();
        Self {
            guid: Guid::hash_str(&public_key),
            name: name.into(),
            public_key,
        }
    }

    pub fn key(&self) -> Option<PublicKey> {
        PublicKey::from_base64(&self.public_key).ok()
    }

    pub fn manifest_type(&self) -> ManifestType {
        ManifestType::User
    }

    pub fn is_valid(&self) -> bool {
        self.guid.is_valid()
            && self.key().is_some()
            && Guid::hash_str(&self.public_key) == self.guid
    }
}

/// A role a user acts under. The user signs the role's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleManifest {
    pub guid: Guid,
    pub name: String,
    pub user: Guid,
    pub public_key: String,
    #[serde(rename = "Signature", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl RoleManifest {
    pub fn new(
        user: &UserManifest,
        user_key: &SecretKey,
        name: impl Into<String>,
        role_key: &PublicKey,
    ) -> Self {
        let name = name.into();
        let public_key = role_key.to_base64();
        let mut role = Self {
            guid: Guid::hash_str(&format!("{}{}{}", user.guid, name, public_key)),
            name,
            user: user.guid,
            public_key,
            signature: None,
        };
        role.sign(user.guid, user_key);
        role
    }

    pub fn key(&self) -> Option<PublicKey> {
        PublicKey::from_base64(&self.public_key).ok()
    }

    /// Check the owning user's signature over this role
    pub fn verify_with(&self, user: &UserManifest) -> bool {
        user.guid == self.user && user.key().is_some_and(|key| self.verify(&key))
    }

    pub fn manifest_type(&self) -> ManifestType {
        ManifestType::Role
    }

    pub fn is_valid(&self) -> bool {
        self.guid.is_valid()
            && self.user.is_valid()
            && self.key().is_some()
            && self.signature.is_some()
            && Guid::hash_str(&self.canonical()) == self.guid
    }
}

impl Signable for RoleManifest {
    fn canonical(&self) -> String {
        format!("{}{}{}", self.user, self.name, self.public_key)
    }

    fn signer(&self) -> Option<Guid> {
        Some(self.user)
    }

    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    fn set_signature(&mut self, _signer: Guid, signature: String) {
        self.signature = Some(signature);
    }
}

/// A role together with its private key, able to sign manifests
#[derive(Debug, Clone)]
pub struct RoleSigner {
    role: RoleManifest,
    key: SecretKey,
}

impl RoleSigner {
    pub fn new(role: RoleManifest, key: SecretKey) -> Result<Self, KeyError> {
        if role.key() != Some(key.public()) {
            return Err(anyhow::anyhow!("key does not belong to role {}", role.guid).into());
        }
        Ok(Self { role, key })
    }

    /// Create a fresh user with a single role
    pub fn generate(
        user_name: &str,
        role_name: &str,
    ) -> Result<(UserManifest, RoleSigner), KeyError> {
        let user_key = SecretKey::generate()?;
        let role_key = SecretKey::generate()?;
        let user = UserManifest::new(user_name, &user_key.public());
        let role = RoleManifest::new(&user, &user_key, role_name, &role_key.public());
        Ok((user, RoleSigner { role, key: role_key }))
    }

    pub fn role(&self) -> &RoleManifest {
        &self.role
    }

    pub fn sign<S: Signable>(&self, item: &mut S) {
        item.sign(self.role.guid, &self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::VersionManifest;

    #[test]
    fn test_user_and_role() {
        let (user, signer) = RoleSigner::generate("alice", "author").unwrap();
        assert!(user.is_valid());
        assert!(signer.role().is_valid());
        assert!(signer.role().verify_with(&user));

        let (other_user, _) = RoleSigner::generate("mallory", "author").unwrap();
        assert!(!signer.role().verify_with(&other_user));
    }

    #[test]
    fn test_role_signs_version() {
        let (_, signer) = RoleSigner::generate("alice", "author").unwrap();
        let mut version = VersionManifest::root(Guid::hash(b"content"), None);
        signer.sign(&mut version);

        assert_eq!(version.signer, Some(signer.role().guid));
        assert!(version.verify(&signer.role().key().unwrap()));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let (_, signer) = RoleSigner::generate("alice", "author").unwrap();
        let stranger = SecretKey::generate().unwrap();
        assert!(RoleSigner::new(signer.role().clone(), stranger).is_err());
    }
}
