//! Best-effort fan-out of cache mutations to secondary stores.
//!
//! The ingestor hands each event to a bounded queue without waiting. A
//! background task applies events to every mirror in order. A full queue or
//! a failing mirror is logged and skipped; ingestion never waits on it.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use lwd_core::compact::CompactBlock;
use lwd_core::traits::BlockMirror;

#[derive(Debug, Clone)]
pub enum MirrorEvent {
    Add(Arc<CompactBlock>),
    Reorg(u64),
}

impl MirrorEvent {
    pub fn height(&self) -> u64 {
        match self {
            Self::Add(block) => block.height,
            Self::Reorg(height) => *height,
        }
    }
}

#[derive(Clone)]
pub struct MirrorFanout {
    tx: mpsc::Sender<MirrorEvent>,
}

impl MirrorFanout {
    /// Start the background task. It runs until every `MirrorFanout` clone
    /// is dropped.
    pub fn spawn(mirrors: Vec<Arc<dyn BlockMirror>>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for mirror in &mirrors {
                    apply(mirror.as_ref(), &event);
                }
            }
            debug!("mirror fan-out stopped");
        });
        (Self { tx }, handle)
    }

    pub fn notify_add(&self, block: &CompactBlock) {
        self.send(MirrorEvent::Add(Arc::new(block.clone())));
    }

    pub fn notify_reorg(&self, height: u64) {
        self.send(MirrorEvent::Reorg(height));
    }

    fn send(&self, event: MirrorEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!(height = event.height(), "mirror queue full, dropping event"),
            Err(TrySendError::Closed(_)) => debug!("mirror fan-out closed"),
        }
    }
}

fn apply(mirror: &dyn BlockMirror, event: &MirrorEvent) {
    let result = match event {
        MirrorEvent::Add(block) => mirror.mirror_add(block),
        MirrorEvent::Reorg(height) => mirror.mirror_reorg(*height),
    };
    if let Err(e) = result {
        warn!(mirror = mirror.name(), "mirror update failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lwd_core::error::MirrorError;
    use lwd_core::traits::BlockCache;
    use parking_lot::Mutex;

    use crate::memory::MemoryBlockCache;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl BlockMirror for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn mirror_add(&self, block: &CompactBlock) -> Result<(), MirrorError> {
            self.seen.lock().push(format!("add {}", block.height));
            Ok(())
        }

        fn mirror_reorg(&self, height: u64) -> Result<(), MirrorError> {
            self.seen.lock().push(format!("reorg {height}"));
            Ok(())
        }
    }

    struct Failing;

    impl BlockMirror for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn mirror_add(&self, _block: &CompactBlock) -> Result<(), MirrorError> {
            Err(MirrorError::Rejected { mirror: "failing".into(), reason: "offline".into() })
        }

        fn mirror_reorg(&self, _height: u64) -> Result<(), MirrorError> {
            Err(MirrorError::Rejected { mirror: "failing".into(), reason: "offline".into() })
        }
    }

    fn block(height: u64) -> CompactBlock {
        CompactBlock { height, hash: vec![1; 32], ..Default::default() }
    }

    #[tokio::test]
    async fn events_reach_every_mirror_in_order() {
        let recording = Arc::new(Recording::default());
        let memory = Arc::new(MemoryBlockCache::new(5, 10));
        let mirrors: Vec<Arc<dyn BlockMirror>> = vec![Arc::new(Failing), recording.clone(), memory.clone()];
        let (fanout, handle) = MirrorFanout::spawn(mirrors, 16);

        fanout.notify_add(&block(5));
        fanout.notify_add(&block(6));
        fanout.notify_reorg(6);
        drop(fanout);
        handle.await.unwrap();

        assert_eq!(*recording.seen.lock(), vec!["add 5", "add 6", "reorg 6"]);
        assert_eq!(memory.latest_height(), Some(5));
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let fanout = MirrorFanout { tx };
        fanout.notify_add(&block(1));
        // The queue is full and nothing drains it; this must return.
        fanout.notify_add(&block(2));
        fanout.notify_reorg(1);
        assert!(matches!(rx.try_recv(), Ok(MirrorEvent::Add(b)) if b.height == 1));
        assert!(rx.try_recv().is_err());
    }
}
