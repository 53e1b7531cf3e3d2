//! # Manifests
//!
//! Immutable metadata records describing everything in the store. Every
//! variant shares one contract: a [`Guid`] derived from its immutable
//! fields, a type tag, optional signature, and [`Manifest::is_valid`].
//!
//! On the wire and on disk a manifest is a JSON object internally tagged by
//! `"type"`. Only atoms ever change after creation, and only by gaining
//! locations through [`AtomManifest::merge`].

mod atom;
mod compound;
mod identity;
mod metadata;
mod node;
mod version;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use atom::{AtomManifest, BundleKind, Location, LocationBundle, LocationError};
pub use compound::{CompoundManifest, CompoundType, Content, SecureCompoundManifest};
pub use identity::{RoleManifest, RoleSigner, UserManifest};
pub use metadata::{MetadataManifest, Property};
pub use node::{NodeCapability, NodeManifest, NodeServices, UnknownCapability};
pub use version::VersionManifest;

use crate::crypto::{PublicKey, SecretKey};
use crate::guid::Guid;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to decode manifest: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("expected a {expected} manifest, got {actual}")]
    WrongType {
        expected: ManifestType,
        actual: ManifestType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManifestType {
    Atom,
    Compound,
    SecureCompound,
    Version,
    Node,
    Metadata,
    User,
    Role,
}

impl fmt::Display for ManifestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Append a variable-length field as `<byte length>:<text>` so adjacent
/// fields cannot run into each other
pub(crate) fn push_field(canonical: &mut String, field: &str) {
    canonical.push_str(&field.len().to_string());
    canonical.push(':');
    canonical.push_str(field);
}

/// Manifests that can carry a signature over their canonical form
pub trait Signable {
    /// The canonical string the GUID and signature are computed over
    fn canonical(&self) -> String;
    fn signer(&self) -> Option<Guid>;
    fn signature(&self) -> Option<&str>;
    fn set_signature(&mut self, signer: Guid, signature: String);

    fn sign(&mut self, signer: Guid, key: &SecretKey) {
        let signature = key.sign_base64(self.canonical().as_bytes());
        self.set_signature(signer, signature);
    }

    /// False when unsigned or when the signature does not verify
    fn verify(&self, key: &PublicKey) -> bool {
        match self.signature() {
            Some(signature) => key
                .verify_base64(self.canonical().as_bytes(), signature)
                .is_ok(),
            None => false,
        }
    }
}

/// Manifests that point at physical copies of bytes
pub trait Locatable {
    fn locations(&self) -> &BTreeSet<LocationBundle>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Manifest {
    Atom(AtomManifest),
    Compound(CompoundManifest),
    SecureCompound(SecureCompoundManifest),
    Version(VersionManifest),
    Node(NodeManifest),
    Metadata(MetadataManifest),
    User(UserManifest),
    Role(RoleManifest),
}

impl Manifest {
    pub fn guid(&self) -> Guid {
        match self {
            Manifest::Atom(m) => m.guid,
            Manifest::Compound(m) => m.guid,
            Manifest::SecureCompound(m) => m.guid,
            Manifest::Version(m) => m.guid,
            Manifest::Node(m) => m.guid,
            Manifest::Metadata(m) => m.guid,
            Manifest::User(m) => m.guid,
            Manifest::Role(m) => m.guid,
        }
    }

    pub fn manifest_type(&self) -> ManifestType {
        match self {
            Manifest::Atom(m) => m.manifest_type(),
            Manifest::Compound(m) => m.manifest_type(),
            Manifest::SecureCompound(m) => m.manifest_type(),
            Manifest::Version(m) => m.manifest_type(),
            Manifest::Node(m) => m.manifest_type(),
            Manifest::Metadata(m) => m.manifest_type(),
            Manifest::User(m) => m.manifest_type(),
            Manifest::Role(m) => m.manifest_type(),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Manifest::Atom(m) => m.is_valid(),
            Manifest::Compound(m) => m.is_valid(),
            Manifest::SecureCompound(m) => m.is_valid(),
            Manifest::Version(m) => m.is_valid(),
            Manifest::Node(m) => m.is_valid(),
            Manifest::Metadata(m) => m.is_valid(),
            Manifest::User(m) => m.is_valid(),
            Manifest::Role(m) => m.is_valid(),
        }
    }

    pub fn signature(&self) -> Option<&str> {
        self.as_signable().and_then(|s| s.signature())
    }

    pub fn as_signable(&self) -> Option<&dyn Signable> {
        match self {
            Manifest::Compound(m) => Some(m),
            Manifest::SecureCompound(m) => Some(m),
            Manifest::Version(m) => Some(m),
            Manifest::Role(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&AtomManifest> {
        match self {
            Manifest::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<&VersionManifest> {
        match self {
            Manifest::Version(version) => Some(version),
            _ => None,
        }
    }

    pub fn into_atom(self) -> Result<AtomManifest, ManifestError> {
        match self {
            Manifest::Atom(atom) => Ok(atom),
            other => Err(ManifestError::WrongType {
                expected: ManifestType::Atom,
                actual: other.manifest_type(),
            }),
        }
    }

    pub fn into_node(self) -> Result<NodeManifest, ManifestError> {
        match self {
            Manifest::Node(node) => Ok(node),
            other => Err(ManifestError::WrongType {
                expected: ManifestType::Node,
                actual: other.manifest_type(),
            }),
        }
    }

    pub fn from_json(json: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(json)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

macro_rules! manifest_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Manifest {
                fn from(m: $ty) -> Self {
                    Manifest::$variant(m)
                }
            }
        )*
    };
}

manifest_from! {
    Atom => AtomManifest,
    Compound => CompoundManifest,
    SecureCompound => SecureCompoundManifest,
    Version => VersionManifest,
    Node => NodeManifest,
    Metadata => MetadataManifest,
    User => UserManifest,
    Role => RoleManifest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag() {
        let compound = CompoundManifest::new(
            CompoundType::Data,
            [Content::new("a", Guid::hash(b"a"))],
        );
        let manifest = Manifest::from(compound.clone());
        let json: serde_json::Value = serde_json::from_slice(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "Compound");
        assert_eq!(json["ContentGUID"], compound.guid.to_string());
        assert_eq!(manifest.guid(), compound.guid);
        assert_eq!(manifest.manifest_type(), ManifestType::Compound);
    }

    #[test]
    fn test_round_trip_every_variant() {
        let (user, signer) = RoleSigner::generate("alice", "author").unwrap();
        let atom = AtomManifest::new(
            Guid::hash(b"bytes"),
            [LocationBundle::persistent("file:///data/x".parse().unwrap())],
        );
        let mut version = VersionManifest::root(atom.guid, None);
        signer.sign(&mut version);
        let node = NodeManifest::new(
            &crate::crypto::SecretKey::generate().unwrap().public(),
            "localhost",
            1,
            NodeServices::with([NodeCapability::Storage]),
        );
        let metadata = MetadataManifest::new([("Size".to_string(), Property::Long(5))]);
        let key = crate::crypto::DataKey::generate().unwrap();
        let secure = SecureCompoundManifest::seal(
            CompoundType::Collection,
            [Content::new("x", atom.guid)],
            &key,
            Default::default(),
        )
        .unwrap();

        let manifests: Vec<Manifest> = vec![
            atom.into(),
            CompoundManifest::new(CompoundType::Data, [Content::new("x", Guid::hash(b"bytes"))])
                .into(),
            secure.into(),
            version.into(),
            node.into(),
            metadata.into(),
            user.into(),
            signer.role().clone().into(),
        ];
        for manifest in manifests {
            assert!(manifest.is_valid(), "{:?}", manifest.manifest_type());
            let decoded = Manifest::from_json(&manifest.to_json().unwrap()).unwrap();
            assert_eq!(decoded, manifest);
        }
    }

    #[test]
    fn test_malformed_guid_decodes_as_invalid() {
        let json = br#"{"type":"Atom","guid":"garbage","locations":[{"type":"cache","location":"file:///x"}]}"#;
        let manifest = Manifest::from_json(json).unwrap();
        assert_eq!(manifest.guid(), Guid::Invalid);
        assert!(!manifest.is_valid());
    }

    #[test]
    fn test_wrong_type() {
        let manifest = Manifest::from(MetadataManifest::new([]));
        assert!(matches!(
            manifest.into_atom(),
            Err(ManifestError::WrongType { .. })
        ));
    }
}
