//! Versions: one point in an asset's history

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ManifestType, Signable};
use crate::guid::Guid;

/// A version of an asset.
///
/// All versions of one asset share an `invariant`; `previous` links a version
/// to the versions it supersedes, forming a DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    #[serde(rename = "Invariant")]
    pub invariant: Guid,
    #[serde(rename = "Version")]
    pub guid: Guid,
    #[serde(rename = "ContentGUID")]
    pub content: Guid,
    #[serde(rename = "Previous", default, skip_serializing_if = "BTreeSet::is_empty")]
    pub previous: BTreeSet<Guid>,
    #[serde(rename = "Metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Guid>,
    #[serde(rename = "Signer", default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Guid>,
    #[serde(rename = "Signature", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl VersionManifest {
    /// First version of a new asset. The invariant is seeded from a random
    /// UUID so two assets with the same initial content stay distinct.
    pub fn root(content: Guid, metadata: Option<Guid>) -> Self {
        let seed = Uuid::new_v4();
        let invariant = Guid::hash_str(&format!("{}{}", seed, content));
        Self::build(invariant, content, BTreeSet::new(), metadata)
    }

    /// A version that supersedes `previous` within the asset `invariant`
    pub fn next(
        invariant: Guid,
        content: Guid,
        previous: impl IntoIterator<Item = Guid>,
        metadata: Option<Guid>,
    ) -> Self {
        Self::build(invariant, content, previous.into_iter().collect(), metadata)
    }

    fn build(
        invariant: Guid,
        content: Guid,
        previous: BTreeSet<Guid>,
        metadata: Option<Guid>,
    ) -> Self {
        let mut version = Self {
            invariant,
            guid: Guid::Invalid,
            content,
            previous,
            metadata,
            signer: None,
            signature: None,
        };
        if version.fields_valid() {
            version.guid = Guid::hash_str(&version.canonical());
        }
        version
    }

    fn fields_valid(&self) -> bool {
        self.invariant.is_valid()
            && self.content.is_valid()
            && self.previous.iter().all(Guid::is_valid)
            && self.metadata.map_or(true, |m| m.is_valid())
    }

    pub fn is_root(&self) -> bool {
        self.previous.is_empty()
    }

    pub fn manifest_type(&self) -> ManifestType {
        ManifestType::Version
    }

    pub fn is_valid(&self) -> bool {
        self.guid.is_valid()
            && self.fields_valid()
            && Guid::hash_str(&self.canonical()) == self.guid
    }
}

impl Signable for VersionManifest {
    fn canonical(&self) -> String {
        // previous is a BTreeSet, so iteration order is already sorted
        let mut canonical = format!("Version{}{}", self.invariant, self.content);
        for previous in &self.previous {
            canonical.push_str(&previous.to_string());
        }
        if let Some(metadata) = &self.metadata {
            canonical.push_str(&metadata.to_string());
        }
        canonical
    }

    fn signer(&self) -> Option<Guid> {
        self.signer
    }

    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    fn set_signature(&mut self, signer: Guid, signature: String) {
        self.signer = Some(signer);
        self.signature = Some(signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretKey;

    #[test]
    fn test_root_versions_get_distinct_invariants() {
        let content = Guid::hash(b"content");
        let a = VersionManifest::root(content, None);
        let b = VersionManifest::root(content, None);
        assert_ne!(a.invariant, b.invariant);
        assert!(a.is_valid() && b.is_valid());
        assert!(a.is_root());
    }

    #[test]
    fn test_next_is_deterministic() {
        let root = VersionManifest::root(Guid::hash(b"v1"), None);
        let content = Guid::hash(b"v2");
        let a = VersionManifest::next(root.invariant, content, [root.guid], None);
        let b = VersionManifest::next(root.invariant, content, [root.guid], None);
        assert_eq!(a.guid, b.guid);
        assert_eq!(a.invariant, root.invariant);
        assert!(!a.is_root());
    }

    #[test]
    fn test_invalid_inputs_produce_invalid_version() {
        let version = VersionManifest::next(Guid::hash(b"i"), Guid::Invalid, [], None);
        assert_eq!(version.guid, Guid::Invalid);
        assert!(!version.is_valid());
    }

    #[test]
    fn test_tampered_version_is_invalid() {
        let mut version = VersionManifest::root(Guid::hash(b"v1"), None);
        version.content = Guid::hash(b"other");
        assert!(!version.is_valid());
    }

    #[test]
    fn test_json_keys() {
        let root = VersionManifest::root(Guid::hash(b"v1"), Some(Guid::hash(b"meta")));
        let next = VersionManifest::next(root.invariant, Guid::hash(b"v2"), [root.guid], None);
        let json = serde_json::to_value(&next).unwrap();
        assert_eq!(json["Invariant"], root.invariant.to_string());
        assert_eq!(json["Version"], next.guid.to_string());
        assert_eq!(json["Previous"][0], root.guid.to_string());
        assert!(json.get("Metadata").is_none());
    }

    #[test]
    fn test_sign_and_verify() {
        let key = SecretKey::generate().unwrap();
        let mut version = VersionManifest::root(Guid::hash(b"v1"), None);
        assert!(!version.verify(&key.public()));
        version.sign(Guid::hash(b"role"), &key);
        assert!(version.verify(&key.public()));
        assert!(version.is_valid());
    }
}
