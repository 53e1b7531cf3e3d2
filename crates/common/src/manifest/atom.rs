//! Atoms and the locations their bytes can be found at

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use super::{Locatable, ManifestType};
use crate::guid::Guid;

const SOS_SCHEME: &str = "sos://";
const PEER_SCHEME: &str = "peer://";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("unsupported location scheme: {0}")]
    UnsupportedScheme(String),
    #[error("malformed location {0}: {1}")]
    Malformed(String, String),
}

/// Where a copy of an atom's bytes lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// A file on this node's disk
    File(PathBuf),
    /// Bytes held by another node: `sos://<node guid>/<atom guid>`
    Node { node: Guid, atom: Guid },
    /// A plain http(s) URL
    Url(Url),
}

impl Location {
    pub fn node(node: Guid, atom: Guid) -> Self {
        Location::Node { node, atom }
    }

    /// A local file location; only absolute paths have a `file://` form
    pub fn file(path: impl Into<PathBuf>) -> Result<Self, LocationError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(LocationError::Malformed(
                path.display().to_string(),
                "not an absolute file path".to_string(),
            ));
        }
        Ok(Location::File(path))
    }

    pub fn is_local_file(&self) -> bool {
        matches!(self, Location::File(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::File(path) => match Url::from_file_path(path) {
                Ok(url) => write!(f, "{}", url),
                Err(()) => write!(f, "file://{}", path.display()),
            },
            Location::Node { node, atom } => write!(f, "{}{}/{}", SOS_SCHEME, node, atom),
            Location::Url(url) => write!(f, "{}", url),
        }
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| LocationError::Malformed(s.to_string(), reason.to_string());

        if let Some(rest) = s
            .strip_prefix(SOS_SCHEME)
            .or_else(|| s.strip_prefix(PEER_SCHEME))
        {
            let (node, atom) = rest
                .split_once('/')
                .ok_or_else(|| malformed("expected <node>/<atom>"))?;
            let node: Guid = node.parse().map_err(|_| malformed("bad node guid"))?;
            let atom: Guid = atom.parse().map_err(|_| malformed("bad atom guid"))?;
            return Ok(Location::Node { node, atom });
        }

        let url = Url::parse(s).map_err(|e| malformed(&e.to_string()))?;
        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(Location::File)
                .map_err(|_| malformed("not an absolute file path")),
            "http" | "https" => Ok(Location::Url(url)),
            other => Err(LocationError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Role of a copy. Declaration order is resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    Persistent,
    Cache,
    Provenance,
}

/// One physical copy of an atom's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationBundle {
    #[serde(rename = "type")]
    pub kind: BundleKind,
    pub location: Location,
}

impl LocationBundle {
    pub fn new(kind: BundleKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn persistent(location: Location) -> Self {
        Self::new(BundleKind::Persistent, location)
    }

    pub fn cache(location: Location) -> Self {
        Self::new(BundleKind::Cache, location)
    }

    pub fn provenance(location: Location) -> Self {
        Self::new(BundleKind::Provenance, location)
    }
}

/// Manifest for a blob of bytes. The GUID is the hash of the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomManifest {
    pub guid: Guid,
    #[serde(default)]
    pub locations: BTreeSet<LocationBundle>,
}

impl AtomManifest {
    pub fn new(guid: Guid, locations: impl IntoIterator<Item = LocationBundle>) -> Self {
        Self {
            guid,
            locations: locations.into_iter().collect(),
        }
    }

    pub fn manifest_type(&self) -> ManifestType {
        ManifestType::Atom
    }

    pub fn is_valid(&self) -> bool {
        self.guid.is_valid() && !self.locations.is_empty()
    }

    /// Union the other manifest's locations into this one.
    /// Returns whether anything was added.
    pub fn merge(&mut self, other: &AtomManifest) -> bool {
        let before = self.locations.len();
        self.locations.extend(other.locations.iter().cloned());
        self.locations.len() != before
    }

    pub fn add_location(&mut self, bundle: LocationBundle) -> bool {
        self.locations.insert(bundle)
    }
}

impl Locatable for AtomManifest {
    fn locations(&self) -> &BTreeSet<LocationBundle> {
        &self.locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parse() {
        let node = Guid::hash(b"node");
        let atom = Guid::hash(b"atom");

        let sos: Location = format!("sos://{}/{}", node, atom).parse().unwrap();
        assert_eq!(sos, Location::node(node, atom));
        let peer: Location = format!("peer://{}/{}", node, atom).parse().unwrap();
        assert_eq!(peer, sos);
        assert_eq!(sos.to_string(), format!("sos://{}/{}", node, atom));

        let file: Location = "file:///tmp/data/x".parse().unwrap();
        assert_eq!(file, Location::File(PathBuf::from("/tmp/data/x")));
        assert_eq!(file.to_string(), "file:///tmp/data/x");

        let http: Location = "https://example.com/a".parse().unwrap();
        assert!(matches!(http, Location::Url(_)));

        assert!(matches!(
            "ftp://example.com/a".parse::<Location>(),
            Err(LocationError::UnsupportedScheme(_))
        ));
        assert!("sos://nonsense".parse::<Location>().is_err());
    }

    #[test]
    fn test_file_location_must_be_absolute() {
        assert!(matches!(
            Location::file("store/data/x"),
            Err(LocationError::Malformed(..))
        ));
        assert!("file://store/data/x".parse::<Location>().is_err());

        let file = Location::file("/srv/store/data/x").unwrap();
        assert_eq!(file.to_string(), "file:///srv/store/data/x");
        assert_eq!(file.to_string().parse::<Location>().unwrap(), file);
    }

    #[test]
    fn test_bundle_order_prefers_persistent() {
        let a = LocationBundle::provenance("https://a.example/x".parse().unwrap());
        let b = LocationBundle::cache("file:///tmp/b".parse().unwrap());
        let c = LocationBundle::persistent("https://z.example/x".parse().unwrap());
        let atom = AtomManifest::new(Guid::hash(b"x"), [a.clone(), b.clone(), c.clone()]);

        let order: Vec<_> = atom.locations.iter().cloned().collect();
        assert_eq!(order, vec![c, b, a]);
    }

    #[test]
    fn test_merge_is_union() {
        let guid = Guid::hash(b"x");
        let a = LocationBundle::cache("file:///tmp/a".parse().unwrap());
        let b = LocationBundle::cache("file:///tmp/b".parse().unwrap());
        let mut left = AtomManifest::new(guid, [a.clone()]);
        let right = AtomManifest::new(guid, [b.clone()]);

        assert!(left.merge(&right));
        assert!(!left.merge(&right));
        assert_eq!(left.locations, BTreeSet::from([a, b]));
    }

    #[test]
    fn test_empty_atom_is_invalid() {
        assert!(!AtomManifest::new(Guid::hash(b"x"), []).is_valid());
        let bundle = LocationBundle::cache("file:///tmp/a".parse().unwrap());
        assert!(!AtomManifest::new(Guid::Invalid, [bundle]).is_valid());
    }

    #[test]
    fn test_json_shape() {
        let guid = Guid::hash(b"x");
        let atom = AtomManifest::new(guid, [LocationBundle::persistent("file:///d/x".parse().unwrap())]);
        let json = serde_json::to_value(&atom).unwrap();
        assert_eq!(json["locations"][0]["type"], "persistent");
        assert_eq!(json["locations"][0]["location"], "file:///d/x");
    }
}
