/// Lightweight test harness for multi-node integration tests
///
/// Nodes run in-process and talk through a [`MemoryNetwork`], an
/// implementation of [`crate::peer::PeerClient`] that routes each call to
/// the target node's [`crate::sos::Sos`]. Individual nodes can be made to
/// fail or hang to exercise timeouts and fallbacks.
///
/// # Example
///
/// ```rust,ignore
/// use common::manifest::NodeCapability;
/// use common::testkit::TestNetwork;
///
/// #[tokio::test]
/// async fn test_replication() -> anyhow::Result<()> {
///     let mut net = TestNetwork::new()?;
///     let alice = net.add_peer("alice", &[]).await?;
///     let bob = net.add_peer("bob", &[NodeCapability::Storage]).await?;
///     net.introduce_all_peers().await?;
///
///     let (atom, handle) = alice.add_atom_replicated(bytes::Bytes::from("hi"), 1).await?;
///     assert!(handle.outcome().await.successes.contains(&bob.guid()));
///     net.shutdown().await?;
///     Ok(())
/// }
/// ```
mod client;
mod network;
mod peer;

pub use client::{Fault, MemoryNetwork};
pub use network::TestNetwork;
pub use peer::TestPeer;
