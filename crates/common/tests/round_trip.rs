//! Manifests survive every tier: cache, local disk, and peers

mod common;

use std::time::Duration;

use ::common::directory::{DirectoryError, FindScope};
use ::common::guid::Guid;
use ::common::manifest::{
    CompoundManifest, CompoundType, Content, Manifest, MetadataManifest, NodeCapability,
    Property, RoleSigner, VersionManifest,
};
use ::common::sos::SosError;
use ::common::testkit::TestNetwork;
use bytes::Bytes;

async fn sample_manifests(peer: &::common::testkit::TestPeer) -> Vec<Manifest> {
    let atom = peer.add_atom(Bytes::from_static(b"round trip")).await.unwrap();
    let compound = CompoundManifest::new(
        CompoundType::Collection,
        [Content::new("file.txt", atom.guid)],
    );
    let metadata = MetadataManifest::new([(
        "Size".to_string(),
        Property::Long(10),
    )]);
    let (user, signer) = RoleSigner::generate("alice", "author").unwrap();
    let mut version = VersionManifest::root(compound.guid, Some(metadata.guid));
    signer.sign(&mut version);

    vec![
        atom.into(),
        compound.into(),
        metadata.into(),
        version.into(),
        user.into(),
        signer.role().clone().into(),
    ]
}

#[tokio::test]
async fn test_round_trip_through_local_tiers() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();

    for manifest in sample_manifests(&alice).await {
        let guid = alice.add_manifest(manifest.clone()).await.unwrap();
        assert_eq!(guid, manifest.guid());

        // cache hit
        assert_eq!(alice.find_manifest(&guid, FindScope::Local).await.unwrap(), manifest);

        // evicted: local store hit
        assert!(alice.directory().evict_cached(&guid));
        assert_eq!(alice.find_manifest(&guid, FindScope::Local).await.unwrap(), manifest);
        assert!(alice.directory().cache().get(&guid).is_some());
    }

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_round_trip_through_remote_tier() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();
    let bob = net
        .add_peer("bob", &[NodeCapability::Dds, NodeCapability::Storage])
        .await
        .unwrap();
    net.introduce_all_peers().await.unwrap();

    let manifests = sample_manifests(&alice).await;
    for manifest in &manifests {
        let (_, handle) = alice
            .add_manifest_replicated(manifest.clone(), 1)
            .await
            .unwrap();
        assert_eq!(handle.outcome().await.successes, vec![bob.guid()]);
    }

    alice.forget_manifests().await.unwrap();
    for manifest in &manifests {
        let guid = manifest.guid();
        assert!(matches!(
            alice.find_manifest(&guid, FindScope::Local).await,
            Err(SosError::Directory(DirectoryError::NotFound(_)))
        ));
        let found = alice.find_manifest(&guid, FindScope::Any).await.unwrap();
        assert_eq!(found.guid(), guid);
        assert!(found.is_valid());

        // backfilled into the local tier
        assert!(alice.find_manifest(&guid, FindScope::Local).await.is_ok());
        // bob is now indexed as a holder
        assert!(alice.directory().index().nodes(&guid).contains(&bob.guid()));
    }

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remote_versions_do_not_move_head() {
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();
    let bob = net.add_peer("bob", &[NodeCapability::Dds]).await.unwrap();
    net.introduce_all_peers().await.unwrap();

    let root = bob.new_asset(Guid::hash(b"v1"), None).await.unwrap();
    let found = alice.find_manifest(&root.guid, FindScope::Any).await.unwrap();
    assert_eq!(found.as_version(), Some(&root));

    assert!(alice.lineage().get_heads(&root.invariant).is_empty());
    assert!(alice.lineage().versions(&root.invariant).contains_key(&root.guid));

    // already on disk, but adding it here still moves HEAD
    alice.add_version(root.clone()).await.unwrap();
    assert_eq!(alice.lineage().get_head(&root.invariant).unwrap(), root.guid);

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_compound_add_is_idempotent() {
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();

    let compound = CompoundManifest::new(
        CompoundType::Data,
        [Content::new("a", Guid::hash(b"a")), Content::new("b", Guid::hash(b"b"))],
    );
    let first = alice.add_manifest(compound.clone().into()).await.unwrap();
    let second = alice.add_manifest(compound.clone().into()).await.unwrap();
    assert_eq!(first, second);

    let files = std::fs::read_dir(alice.storage().manifests_dir())
        .unwrap()
        .count();
    assert_eq!(files, 1);

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_manifest_is_rejected() {
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();

    let mut compound = CompoundManifest::new(CompoundType::Data, [Content::new("a", Guid::hash(b"a"))]);
    compound.contents.clear();
    assert!(matches!(
        alice.add_manifest(compound.into()).await,
        Err(SosError::Directory(DirectoryError::Persist(_)))
    ));

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_guid_never_touches_a_tier() {
    let mut net = TestNetwork::new()
        .unwrap()
        .with_discovery_timeout(Duration::from_millis(200));
    let alice = net.add_peer("alice", &[]).await.unwrap();
    net.add_peer("bob", &[NodeCapability::Dds, NodeCapability::Nds])
        .await
        .unwrap();
    net.introduce_all_peers().await.unwrap();

    let calls = net.network().calls();
    let cached = alice.directory().cache().len();

    assert!(matches!(
        alice.find_manifest(&Guid::Invalid, FindScope::Any).await,
        Err(SosError::Directory(DirectoryError::NotFound(Guid::Invalid)))
    ));
    assert!(alice.get_node(&Guid::Invalid).await.is_err());

    assert_eq!(net.network().calls(), calls);
    assert_eq!(alice.directory().cache().len(), cached);

    net.shutdown().await.unwrap();
}
