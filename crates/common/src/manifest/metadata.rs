//! Metadata: typed properties extracted from content

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{push_field, ManifestType};
use crate::guid::Guid;

/// A single typed property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum Property {
    String(String),
    Long(i64),
    Boolean(bool),
    Guid(Guid),
}

impl Property {
    fn type_name(&self) -> &'static str {
        match self {
            Property::String(_) => "STRING",
            Property::Long(_) => "LONG",
            Property::Boolean(_) => "BOOLEAN",
            Property::Guid(_) => "GUID",
        }
    }

    fn value_text(&self) -> String {
        match self {
            Property::String(s) => s.clone(),
            Property::Long(n) => n.to_string(),
            Property::Boolean(b) => b.to_string(),
            Property::Guid(g) => g.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataManifest {
    pub guid: Guid,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
}

impl MetadataManifest {
    pub fn new(properties: impl IntoIterator<Item = (String, Property)>) -> Self {
        let properties: BTreeMap<String, Property> = properties.into_iter().collect();
        let guid = Guid::hash_str(&Self::canonical(&properties));
        Self { guid, properties }
    }

    fn canonical(properties: &BTreeMap<String, Property>) -> String {
        let mut canonical = String::from("Metadata");
        for (name, property) in properties {
            push_field(&mut canonical, name);
            canonical.push_str(property.type_name());
            push_field(&mut canonical, &property.value_text());
        }
        canonical
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn manifest_type(&self) -> ManifestType {
        ManifestType::Metadata
    }

    pub fn is_valid(&self) -> bool {
        self.guid.is_valid() && Guid::hash_str(&Self::canonical(&self.properties)) == self.guid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_guid_is_order_independent() {
        let a = MetadataManifest::new([
            ("Size".to_string(), Property::Long(42)),
            ("Content-Type".to_string(), Property::String("text/plain".into())),
        ]);
        let b = MetadataManifest::new([
            ("Content-Type".to_string(), Property::String("text/plain".into())),
            ("Size".to_string(), Property::Long(42)),
        ]);
        assert_eq!(a.guid, b.guid);
        assert!(a.is_valid());
        assert_eq!(a.get("Size"), Some(&Property::Long(42)));
    }

    #[test]
    fn test_name_and_value_boundaries_change_guid() {
        let two = MetadataManifest::new([
            ("a".to_string(), Property::String("1".into())),
            ("b".to_string(), Property::String("2".into())),
        ]);
        let one = MetadataManifest::new([(
            "a".to_string(),
            Property::String("1bSTRING2".into()),
        )]);
        assert_ne!(two.guid, one.guid);
        assert!(one.is_valid());
    }

    #[test]
    fn test_property_json() {
        let json = serde_json::to_value(Property::Boolean(true)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "BOOLEAN", "value": true}));
    }
}
