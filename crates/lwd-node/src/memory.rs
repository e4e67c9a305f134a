//! Capacity-bounded in-memory block cache.
//!
//! Holds the most recent `max_entries` blocks. Used as a hot mirror of the
//! file cache: the query path reads here first.

use std::collections::VecDeque;

use parking_lot::RwLock;
use tracing::debug;

use lwd_core::compact::CompactBlock;
use lwd_core::error::{CacheError, MirrorError};
use lwd_core::traits::{BlockCache, BlockMirror};
use lwd_core::types::Hash256;

struct Window {
    blocks: VecDeque<CompactBlock>,
    first_block: u64,
    next_block: u64,
    latest_hash: Option<Hash256>,
}

impl Window {
    fn reset(&mut self, height: u64) {
        self.blocks.clear();
        self.first_block = height;
        self.next_block = height;
        self.latest_hash = None;
    }
}

pub struct MemoryBlockCache {
    window: RwLock<Window>,
    max_entries: usize,
}

impl MemoryBlockCache {
    pub fn new(first_block: u64, max_entries: usize) -> Self {
        Self {
            window: RwLock::new(Window {
                blocks: VecDeque::new(),
                first_block,
                next_block: first_block,
                latest_hash: None,
            }),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.window.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, window: &mut Window, block: &CompactBlock) -> Result<(), CacheError> {
        if block.height != window.next_block {
            return Err(CacheError::NonConsecutiveAdd { expected: window.next_block, got: block.height });
        }
        let hash = block.block_hash().ok_or(CacheError::MissingHash { height: block.height })?;
        window.blocks.push_back(block.clone());
        window.next_block += 1;
        window.latest_hash = Some(hash);
        while window.blocks.len() > self.max_entries {
            window.blocks.pop_front();
            window.first_block += 1;
        }
        Ok(())
    }

    fn truncate(window: &mut Window, height: u64) -> u64 {
        let height = height.max(window.first_block);
        window.blocks.truncate((height - window.first_block) as usize);
        window.next_block = height;
        window.latest_hash = window.blocks.back().and_then(CompactBlock::block_hash);
        height
    }
}

impl BlockCache for MemoryBlockCache {
    fn add(&self, block: &CompactBlock) -> Result<(), CacheError> {
        let mut window = self.window.write();
        self.push(&mut window, block)
    }

    fn reorg(&self, height: u64) -> Result<u64, CacheError> {
        let mut window = self.window.write();
        if height > window.next_block {
            return Err(CacheError::ReorgAheadOfTip { height, next: window.next_block });
        }
        Ok(Self::truncate(&mut window, height))
    }

    fn get(&self, height: u64) -> Result<Option<CompactBlock>, CacheError> {
        let window = self.window.read();
        if height < window.first_block {
            return Ok(None);
        }
        Ok(window.blocks.get((height - window.first_block) as usize).cloned())
    }

    fn latest_height(&self) -> Option<u64> {
        let window = self.window.read();
        (!window.blocks.is_empty()).then(|| window.next_block - 1)
    }

    fn next_height(&self) -> u64 {
        self.window.read().next_block
    }

    fn first_height(&self) -> u64 {
        self.window.read().first_block
    }

    fn latest_hash(&self) -> Option<Hash256> {
        self.window.read().latest_hash
    }
}

/// As a mirror the window follows whatever it is sent: a block below the
/// tip replaces the blocks from its height, and a gap or a block that does
/// not link to the tip restarts the window. The window is therefore always
/// a hash-linked chain, even when events were dropped on the way.
impl BlockMirror for MemoryBlockCache {
    fn name(&self) -> &str {
        "memory"
    }

    fn mirror_add(&self, block: &CompactBlock) -> Result<(), MirrorError> {
        let mut window = self.window.write();
        if block.height < window.first_block || block.height > window.next_block {
            debug!(height = block.height, next = window.next_block, "memory mirror restarting window");
            window.reset(block.height);
        } else if block.height < window.next_block {
            Self::truncate(&mut window, block.height);
        }
        if window.latest_hash.is_some() && window.latest_hash != block.prev_block_hash() {
            debug!(height = block.height, "memory mirror restarting window at unlinked block");
            window.reset(block.height);
        }
        self.push(&mut window, block).map_err(|e| MirrorError::Rejected {
            mirror: self.name().to_string(),
            reason: e.to_string(),
        })
    }

    fn mirror_reorg(&self, height: u64) -> Result<(), MirrorError> {
        let mut window = self.window.write();
        if height < window.next_block {
            Self::truncate(&mut window, height);
        }
        Ok(())
    }
}
