use crate::concurrency::ShardedMap;
use crate::guid::Guid;
use crate::manifest::Manifest;

/// In-process manifest tier
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: ShardedMap<Manifest>,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guid: &Guid) -> Option<Manifest> {
        self.entries.get(guid)
    }

    /// Cache `manifest`. An atom merges into the cached copy, so writers that
    /// finish out of order still leave the union of their locations.
    pub fn insert(&self, manifest: Manifest) {
        self.entries
            .upsert_with(manifest.guid(), |cached| match (cached, manifest) {
                (Some(Manifest::Atom(mut cached)), Manifest::Atom(incoming)) => {
                    cached.merge(&incoming);
                    Manifest::Atom(cached)
                }
                (_, manifest) => manifest,
            });
    }

    pub fn evict(&self, guid: &Guid) -> bool {
        self.entries.remove(guid).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{AtomManifest, LocationBundle};

    fn atom(locations: &[&str]) -> Manifest {
        AtomManifest::new(
            Guid::hash(b"atom"),
            locations
                .iter()
                .map(|l| LocationBundle::cache(l.parse().unwrap())),
        )
        .into()
    }

    #[test]
    fn test_stale_atom_does_not_shrink_cached_locations() {
        let cache = ManifestCache::new();
        cache.insert(atom(&["file:///a", "file:///b"]));
        // an older, smaller copy arrives last
        cache.insert(atom(&["file:///a"]));

        let cached = cache.get(&Guid::hash(b"atom")).unwrap();
        assert_eq!(cached, atom(&["file:///a", "file:///b"]));
        assert_eq!(cache.len(), 1);
    }
}
