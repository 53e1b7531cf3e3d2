//! Asset HEAD and tip tracking through the node facade

mod common;

use std::collections::BTreeSet;

use ::common::crypto::SecretKey;
use ::common::guid::Guid;
use ::common::lineage::LineageError;
use ::common::manifest::VersionManifest;
use ::common::sos::SosError;
use ::common::testkit::{MemoryNetwork, TestNetwork};

#[tokio::test]
async fn test_linear_history() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();

    let v1 = alice.new_asset(Guid::hash(b"draft"), None).await.unwrap();
    assert!(v1.is_root());
    assert_eq!(alice.lineage().get_head(&v1.invariant).unwrap(), v1.guid);

    let v2 = alice
        .next_version(v1.invariant, Guid::hash(b"final"), None)
        .await
        .unwrap();
    assert_eq!(v2.previous, BTreeSet::from([v1.guid]));

    let lineage = alice.lineage();
    assert_eq!(lineage.get_head(&v1.invariant).unwrap(), v2.guid);
    assert_eq!(lineage.get_heads(&v1.invariant), BTreeSet::from([v2.guid]));
    assert_eq!(lineage.get_tips(&v1.invariant), BTreeSet::from([v2.guid]));
    assert_eq!(lineage.versions(&v1.invariant).len(), 2);

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_re_adding_a_version_keeps_one_head_entry() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();

    let version = VersionManifest::root(Guid::hash(b"pushed twice"), None);
    let invariant = version.invariant;
    alice.add_version(version.clone()).await.unwrap();
    alice.add_version(version.clone()).await.unwrap();
    alice.add_manifest(version.clone().into()).await.unwrap();

    let log = alice
        .storage()
        .heads_dir()
        .join(format!("{}.log", invariant));
    let text = tokio::fs::read_to_string(&log).await.unwrap();
    assert_eq!(text.lines().count(), 1);
    assert_eq!(alice.lineage().get_head(&invariant).unwrap(), version.guid);

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fork_is_ambiguous_until_merged() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();

    let v1 = alice.new_asset(Guid::hash(b"base"), None).await.unwrap();
    let left = VersionManifest::next(v1.invariant, Guid::hash(b"left"), [v1.guid], None);
    let right = VersionManifest::next(v1.invariant, Guid::hash(b"right"), [v1.guid], None);
    alice.add_version(left.clone()).await.unwrap();
    alice.add_version(right.clone()).await.unwrap();

    match alice.lineage().get_head(&v1.invariant) {
        Err(LineageError::AmbiguousHead { heads, .. }) => {
            assert_eq!(
                heads.into_iter().collect::<BTreeSet<_>>(),
                BTreeSet::from([left.guid, right.guid])
            );
        }
        other => panic!("expected an ambiguous head, got {:?}", other),
    }

    let merged = alice
        .next_version(v1.invariant, Guid::hash(b"merged"), None)
        .await
        .unwrap();
    assert_eq!(merged.previous, BTreeSet::from([left.guid, right.guid]));
    assert_eq!(alice.lineage().get_head(&v1.invariant).unwrap(), merged.guid);

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_asset() {
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();
    let nowhere = Guid::hash(b"no such asset");

    assert!(matches!(
        alice.lineage().get_head(&nowhere),
        Err(LineageError::NotFound(_))
    ));
    assert!(matches!(
        alice.next_version(nowhere, Guid::hash(b"x"), None).await,
        Err(SosError::Lineage(LineageError::NotFound(_)))
    ));

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_heads_survive_reopen() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let key = SecretKey::generate().unwrap();
    let network = MemoryNetwork::new();

    let (invariant, head) = {
        let node = common::open_node(dir.path(), &key, common::memory_store(), &network).await;
        let v1 = node.new_asset(Guid::hash(b"one"), None).await.unwrap();
        let v2 = node
            .next_version(v1.invariant, Guid::hash(b"two"), None)
            .await
            .unwrap();
        node.shutdown().await.unwrap();
        (v1.invariant, v2.guid)
    };

    let node = common::open_node(dir.path(), &key, common::memory_store(), &network).await;
    assert_eq!(node.lineage().get_head(&invariant).unwrap(), head);
    assert_eq!(node.lineage().get_tips(&invariant), BTreeSet::from([head]));
}
