use log::{info, warn};
use nano_common::{
    p2p::{PeerAddress, Publisher},
    time::{nanos_to_seconds, RunClock, TimestampNanos},
};
use std::{sync::Arc, time::Duration};

use crate::{error::BenchmarkError, generator::GeneratedBlock};

/// What happened while publishing the block set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastReport {
    // Taken right before the first publish
    pub start: TimestampNanos,
    // Taken once the last local send returned
    pub end: TimestampNanos,
    pub published: usize,
    pub delivered: usize,
    pub failures: usize,
    pub peers: usize,
}

pub struct BroadcastCoordinator {
    publisher: Arc<dyn Publisher>,
    clock: RunClock,
}

impl BroadcastCoordinator {
    pub fn new(publisher: Arc<dyn Publisher>, clock: RunClock) -> Self {
        Self { publisher, clock }
    }

    /// Connect to the configured peers, at least one must complete its
    /// handshake within the grace period.
    pub async fn connect(
        &self,
        peers: &[PeerAddress],
        grace_period: Duration,
    ) -> Result<usize, BenchmarkError> {
        info!("Connecting to {} peers", peers.len());
        let ready = self.publisher.connect(peers, grace_period).await;
        if ready == 0 {
            return Err(BenchmarkError::Connectivity(format!(
                "none of the {} peers completed its handshake within {:?}",
                peers.len(),
                grace_period
            )));
        }
        info!("{} of {} peers ready", ready, peers.len());
        Ok(ready)
    }

    /// Publish every block once to every ready peer. Failed sends are
    /// counted, never retried.
    pub async fn broadcast(&self, blocks: &[GeneratedBlock]) -> BroadcastReport {
        let peers = self.publisher.peer_count().await;
        let mut delivered = 0;
        let mut failures = 0;

        let start = self.clock.now();
        for block in blocks {
            let outcome = self.publisher.publish(&block.encoded).await;
            delivered += outcome.delivered;
            failures += outcome.failed;
        }
        let end = self.clock.now();

        if failures > 0 {
            warn!("{} publish attempts failed", failures);
        }
        info!(
            "Published {} blocks to {} peers in {:.3}s",
            blocks.len(),
            peers,
            nanos_to_seconds(end.saturating_sub(start))
        );

        BroadcastReport {
            start,
            end,
            published: blocks.len(),
            delivered,
            failures,
            peers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nano_common::{
        block::{EncodedBlock, StateBlock},
        crypto::{Hash, PublicKey},
        p2p::PublishOutcome,
    };
    use tokio::sync::Mutex;

    // Two peers, the second one rejects every frame
    #[derive(Default)]
    struct HalfBrokenPublisher {
        ready: usize,
        sent: Mutex<Vec<EncodedBlock>>,
    }

    #[async_trait]
    impl Publisher for HalfBrokenPublisher {
        async fn connect(&self, _peers: &[PeerAddress], _grace_period: Duration) -> usize {
            self.ready
        }

        async fn publish(&self, block: &EncodedBlock) -> PublishOutcome {
            self.sent.lock().await.push(block.clone());
            PublishOutcome {
                delivered: 1,
                failed: 1,
            }
        }

        async fn peer_count(&self) -> usize {
            self.ready
        }
    }

    fn blocks(count: u8) -> Vec<GeneratedBlock> {
        (1..=count)
            .map(|i| {
                GeneratedBlock::new(StateBlock::change(
                    PublicKey::from_bytes([i; 32]),
                    Hash::new([i; 32]),
                    PublicKey::from_bytes([0; 32]),
                    1,
                ))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_no_ready_peer_is_a_connectivity_error() {
        let coordinator = BroadcastCoordinator::new(Arc::new(HalfBrokenPublisher::default()), RunClock::start());
        let err = coordinator
            .connect(&[PeerAddress::new("127.0.0.1", 1)], Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchmarkError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let publisher = Arc::new(HalfBrokenPublisher {
            ready: 2,
            ..Default::default()
        });
        let coordinator = BroadcastCoordinator::new(publisher.clone(), RunClock::start());
        assert_eq!(
            coordinator
                .connect(&[PeerAddress::new("a", 1), PeerAddress::new("b", 2)], Duration::from_secs(1))
                .await
                .unwrap(),
            2
        );

        let blocks = blocks(3);
        let report = coordinator.broadcast(&blocks).await;
        assert_eq!(report.published, 3);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failures, 3);
        assert_eq!(report.peers, 2);
        assert!(report.end >= report.start);

        let sent = publisher.sent.lock().await;
        let expected: Vec<EncodedBlock> = blocks.iter().map(|b| b.encoded.clone()).collect();
        assert_eq!(*sent, expected);
    }
}
