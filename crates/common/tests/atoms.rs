//! Atom storage, resolution and proof of possession

mod common;

use std::collections::BTreeSet;

use ::common::crypto::SecretKey;
use ::common::directory::FindScope;
use ::common::guid::{Guid, GuidHasher};
use ::common::manifest::{AtomManifest, BundleKind, Location, LocationBundle};
use ::common::sos::SosError;
use ::common::storage::{AtomSource, AtomStoreError};
use ::common::testkit::{MemoryNetwork, TestNetwork};
use bytes::Bytes;
use url::Url;

#[tokio::test]
async fn test_add_atom_from_bytes() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();

    let atom = alice.add_atom(Bytes::from_static(b"hello")).await.unwrap();
    assert_eq!(atom.guid, Guid::hash(b"hello"));
    assert!(atom.is_valid());
    assert!(atom
        .locations
        .iter()
        .any(|b| b.kind == BundleKind::Persistent && b.location.is_local_file()));
    assert_eq!(
        alice.get_atom_content(&atom.guid).await.unwrap(),
        Bytes::from_static(b"hello")
    );

    // adding the same bytes twice keeps one manifest
    let again = alice.add_atom(Bytes::from_static(b"hello")).await.unwrap();
    assert_eq!(again, atom);

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_relative_root_records_readable_file_locations() {
    common::init_tracing();
    let dir = tempfile::tempdir_in(".").unwrap();
    assert!(dir.path().is_relative());
    let key = SecretKey::generate().unwrap();
    let network = MemoryNetwork::new();
    let node = common::open_node(dir.path(), &key, common::memory_store(), &network).await;

    let atom = node.add_atom(Bytes::from_static(b"relative")).await.unwrap();
    assert!(node.storage().root().is_absolute());
    for bundle in &atom.locations {
        let text = bundle.location.to_string();
        assert_eq!(text.parse::<Location>().unwrap(), bundle.location);
    }

    // only the local disk tier can answer now
    node.directory().clear_cache();
    let stored = node.find_manifest(&atom.guid, FindScope::Local).await.unwrap();
    assert_eq!(stored.as_atom(), Some(&atom));
    assert_eq!(
        node.get_atom_content(&atom.guid).await.unwrap(),
        Bytes::from_static(b"relative")
    );

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_add_atom_from_url_records_provenance() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();
    let url = Url::parse("https://data.example/report.csv").unwrap();
    net.network()
        .serve_url(url.clone(), Bytes::from_static(b"a,b\n1,2\n"));

    let atom = alice
        .add_atom(AtomSource::Location(Location::Url(url.clone())))
        .await
        .unwrap();

    assert_eq!(atom.guid, Guid::hash(b"a,b\n1,2\n"));
    assert!(atom
        .locations
        .contains(&LocationBundle::provenance(Location::Url(url))));
    assert!(alice.atoms().has_local(&atom.guid).await);

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_location_is_skipped() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();
    let good = Url::parse("https://good.example/blob").unwrap();
    let bad = Url::parse("https://bad.example/blob").unwrap();
    net.network()
        .serve_url(good.clone(), Bytes::from_static(b"the real thing"));
    net.network()
        .serve_url(bad.clone(), Bytes::from_static(b"tampered"));

    let guid = Guid::hash(b"the real thing");
    let bundles = BTreeSet::from([
        LocationBundle::cache(Location::Url(bad)),
        LocationBundle::cache(Location::Url(good)),
    ]);
    assert_eq!(
        alice.atoms().get_content(&guid, &bundles).await.unwrap(),
        Bytes::from_static(b"the real thing")
    );

    // only the bad copy known: nothing verifies
    alice
        .add_manifest(
            AtomManifest::new(
                Guid::hash(b"never served"),
                [LocationBundle::cache(Location::Url(
                    Url::parse("https://bad.example/blob").unwrap(),
                ))],
            )
            .into(),
        )
        .await
        .unwrap();
    assert!(matches!(
        alice.get_atom_content(&Guid::hash(b"never served")).await,
        Err(SosError::AtomStore(AtomStoreError::NotFound(_)))
    ));

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_challenge() {
    common::init_tracing();
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();
    let atom = alice.add_atom(Bytes::from_static(b"prove it")).await.unwrap();

    let mut expected = GuidHasher::new();
    expected.update(b"prove it");
    expected.update(b"nonce-1");
    assert_eq!(
        alice.challenge(&atom.guid, "nonce-1").await.unwrap(),
        expected.finish()
    );
    assert_ne!(
        alice.challenge(&atom.guid, "nonce-2").await.unwrap(),
        alice.challenge(&atom.guid, "nonce-1").await.unwrap()
    );

    assert!(matches!(
        alice.challenge(&atom.guid, "").await,
        Err(SosError::AtomStore(AtomStoreError::EmptyChallenge))
    ));
    assert_eq!(
        alice
            .challenge(&Guid::hash(b"not held"), "nonce-1")
            .await
            .unwrap(),
        Guid::Invalid
    );

    net.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tampered_local_copy_is_an_integrity_error() {
    let mut net = TestNetwork::new().unwrap();
    let alice = net.add_peer("alice", &[]).await.unwrap();
    let atom = alice.add_atom(Bytes::from_static(b"original")).await.unwrap();

    tokio::fs::write(alice.storage().data_path(&atom.guid), b"modified")
        .await
        .unwrap();
    assert!(matches!(
        alice.atoms().get_local(&atom.guid).await,
        Err(AtomStoreError::Integrity { .. })
    ));

    net.shutdown().await.unwrap();
}
