//! Compounds: named groups of other manifests

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{push_field, ManifestType, Signable};
use crate::crypto::{DataKey, SecretError};
use crate::guid::Guid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompoundType {
    Data,
    Collection,
}

impl CompoundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompoundType::Data => "DATA",
            CompoundType::Collection => "COLLECTION",
        }
    }
}

/// A labelled reference to another manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Content {
    pub label: String,
    pub guid: Guid,
}

impl Content {
    pub fn new(label: impl Into<String>, guid: Guid) -> Self {
        Self {
            label: label.into(),
            guid,
        }
    }
}

fn normalize(contents: impl IntoIterator<Item = Content>) -> Vec<Content> {
    let mut contents: Vec<Content> = contents.into_iter().collect();
    contents.sort();
    contents.dedup();
    contents
}

fn canonical_contents(prefix: &str, kind: CompoundType, contents: &[Content]) -> String {
    let mut canonical = format!("{}{}", prefix, kind.as_str());
    for content in contents {
        push_field(&mut canonical, &content.label);
        canonical.push_str(&content.guid.to_string());
    }
    canonical
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundManifest {
    #[serde(rename = "ContentGUID")]
    pub guid: Guid,
    #[serde(rename = "compoundType")]
    pub compound_type: CompoundType,
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(rename = "Signer", default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Guid>,
    #[serde(rename = "Signature", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl CompoundManifest {
    pub fn new(compound_type: CompoundType, contents: impl IntoIterator<Item = Content>) -> Self {
        let contents = normalize(contents);
        let guid = Guid::hash_str(&canonical_contents("Compound", compound_type, &contents));
        Self {
            guid,
            compound_type,
            contents,
            signer: None,
            signature: None,
        }
    }

    pub fn manifest_type(&self) -> ManifestType {
        ManifestType::Compound
    }

    pub fn is_valid(&self) -> bool {
        self.guid.is_valid()
            && self.contents.iter().all(|c| c.guid.is_valid())
            && Guid::hash_str(&canonical_contents(
                "Compound",
                self.compound_type,
                &self.contents,
            )) == self.guid
    }
}

impl Signable for CompoundManifest {
    fn canonical(&self) -> String {
        canonical_contents("Compound", self.compound_type, &self.contents)
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

/// A compound whose labels are sealed under a per-compound [`DataKey`].
///
/// `keys` maps a role GUID to that role's wrapped copy of the data key. The
/// wrapping is done by the role layer; the strings are opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureCompoundManifest {
    #[serde(rename = "ContentGUID")]
    pub guid: Guid,
    #[serde(rename = "compoundType")]
    pub compound_type: CompoundType,
    #[serde(default)]
    pub contents: Vec<Content>,
    #[serde(default)]
    pub keys: BTreeMap<Guid, String>,
    #[serde(rename = "Signer", default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Guid>,
    #[serde(rename = "Signature", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SecureCompoundManifest {
    /// Seal every label of `contents` under `key`
    pub fn seal(
        compound_type: CompoundType,
        contents: impl IntoIterator<Item = Content>,
        key: &DataKey,
        keys: BTreeMap<Guid, String>,
    ) -> Result<Self, SecretError> {
        let sealed = normalize(contents)
            .into_iter()
            .map(|c| Ok(Content::new(key.seal(&c.label)?, c.guid)))
            .collect::<Result<Vec<_>, SecretError>>()?;
        let sealed = normalize(sealed);
        let guid = Guid::hash_str(&canonical_contents("SecureCompound", compound_type, &sealed));
        Ok(Self {
            guid,
            compound_type,
            contents: sealed,
            keys,
            signer: None,
            signature: None,
        })
    }

    /// Recover the plaintext contents
    pub fn open(&self, key: &DataKey) -> Result<Vec<Content>, SecretError> {
        let contents = self
            .contents
            .iter()
            .map(|c| Ok(Content::new(key.open(&c.label)?, c.guid)))
            .collect::<Result<Vec<_>, SecretError>>()?;
        Ok(normalize(contents))
    }

    pub fn wrapped_key(&self, role: &Guid) -> Option<&str> {
        self.keys.get(role).map(String::as_str)
    }

    pub fn manifest_type(&self) -> ManifestType {
        ManifestType::SecureCompound
    }

    pub fn is_valid(&self) -> bool {
        self.guid.is_valid()
            && self.contents.iter().all(|c| c.guid.is_valid())
            && Guid::hash_str(&self.canonical()) == self.guid
    }
}

impl Signable for SecureCompoundManifest {
    fn canonical(&self) -> String {
        canonical_contents("SecureCompound", self.compound_type, &self.contents)
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

    fn contents() -> Vec<Content> {
        vec![
            Content::new("b.txt", Guid::hash(b"b")),
            Content::new("a.txt", Guid::hash(b"a")),
            Content::new("a.txt", Guid::hash(b"a")),
        ]
    }

    #[test]
    fn test_guid_independent_of_insertion_order() {
        let mut reversed = contents();
        reversed.reverse();
        let one = CompoundManifest::new(CompoundType::Data, contents());
        let two = CompoundManifest::new(CompoundType::Data, reversed);
        assert_eq!(one.guid, two.guid);
        assert_eq!(one.contents.len(), 2);
        assert!(one.is_valid());
    }

    #[test]
    fn test_label_cannot_absorb_neighbouring_content() {
        let g1 = Guid::hash(b"one");
        let g2 = Guid::hash(b"two");
        let split = CompoundManifest::new(
            CompoundType::Data,
            vec![Content::new("a", g1), Content::new("b", g2)],
        );
        let joined = CompoundManifest::new(
            CompoundType::Data,
            vec![Content::new(format!("a{}b", g1), g2)],
        );
        assert_ne!(split.contents.len(), joined.contents.len());
        assert_ne!(split.guid, joined.guid);
        assert!(split.is_valid());
        assert!(joined.is_valid());
    }

    #[test]
    fn test_kind_changes_guid() {
        let data = CompoundManifest::new(CompoundType::Data, contents());
        let collection = CompoundManifest::new(CompoundType::Collection, contents());
        assert_ne!(data.guid, collection.guid);
    }

    #[test]
    fn test_tampered_compound_is_invalid() {
        let mut compound = CompoundManifest::new(CompoundType::Data, contents());
        compound.contents.pop();
        assert!(!compound.is_valid());
    }

    #[test]
    fn test_signature() {
        let key = SecretKey::generate().unwrap();
        let role = Guid::hash(b"role");
        let mut compound = CompoundManifest::new(CompoundType::Collection, contents());
        compound.sign(role, &key);

        assert_eq!(compound.signer, Some(role));
        assert!(compound.verify(&key.public()));
        assert!(compound.is_valid());
    }

    #[test]
    fn test_secure_compound_seal_and_open() {
        let key = DataKey::generate().unwrap();
        let role = Guid::hash(b"role");
        let keys = BTreeMap::from([(role, "wrapped".to_string())]);
        let secure =
            SecureCompoundManifest::seal(CompoundType::Data, contents(), &key, keys).unwrap();

        assert!(secure.is_valid());
        assert!(secure.contents.iter().all(|c| !c.label.ends_with(".txt")));
        assert_eq!(secure.wrapped_key(&role), Some("wrapped"));

        let opened = secure.open(&key).unwrap();
        assert_eq!(opened, CompoundManifest::new(CompoundType::Data, contents()).contents);

        let other = DataKey::generate().unwrap();
        assert!(secure.open(&other).is_err());
    }
}
