//! File-backed block cache.
//!
//! Two append-only files per chain:
//!
//! - `<chain>-blocks`: serialized [`CompactBlock`]s back to back
//! - `<chain>-lengths`: one little-endian `u32` per block, its serialized length
//!
//! Block data is written before its length, and a reorg truncates the
//! lengths before the data, so a crash at any point leaves at worst
//! unreferenced bytes at the end of the blocks file. Those are trimmed on
//! the next open.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use prost::Message;
use tracing::{debug, info, warn};

use lwd_core::compact::CompactBlock;
use lwd_core::error::CacheError;
use lwd_core::traits::BlockCache;
use lwd_core::types::Hash256;

const LENGTH_SIZE: u64 = 4;

struct CacheState {
    blocks: File,
    lengths: File,
    /// Byte offset of each block; the last entry is the next write offset.
    starts: Vec<u64>,
    first_block: u64,
    next_block: u64,
    latest_hash: Option<Hash256>,
    /// The blocks file may extend past the last indexed block.
    tail_dirty: bool,
}

impl CacheState {
    fn block_count(&self) -> usize {
        self.starts.len() - 1
    }

    fn read_block(&self, index: usize) -> Result<CompactBlock, CacheError> {
        let start = self.starts[index];
        let len = (self.starts[index + 1] - start) as usize;
        let mut buf = vec![0u8; len];
        read_exact_at(&self.blocks, &mut buf, start)?;
        Ok(CompactBlock::decode(buf.as_slice())?)
    }

    fn hash_at(&self, index: usize) -> Result<Hash256, CacheError> {
        let block = self.read_block(index)?;
        block
            .block_hash()
            .ok_or(CacheError::MissingHash { height: self.first_block + index as u64 })
    }

    /// Cut the length index back to `keep` blocks and shrink the window to
    /// match. The data file is trimmed afterwards; if that fails the stale
    /// tail is left for [`CacheState::trim_tail`] before the next append.
    fn truncate_to(&mut self, keep: usize) -> Result<(), CacheError> {
        self.lengths.set_len(keep as u64 * LENGTH_SIZE)?;
        self.starts.truncate(keep + 1);
        self.next_block = self.first_block + keep as u64;
        self.tail_dirty = true;
        self.trim_tail()
    }

    fn trim_tail(&mut self) -> Result<(), CacheError> {
        if self.tail_dirty {
            self.blocks.set_len(self.starts[self.block_count()])?;
            self.tail_dirty = false;
        }
        Ok(())
    }
}

/// Persistent cache over a contiguous height window. Never evicts.
pub struct FileBlockCache {
    state: RwLock<CacheState>,
    blocks_path: PathBuf,
    lengths_path: PathBuf,
}

impl FileBlockCache {
    /// Open or create the cache files for `chain` under `dir`.
    ///
    /// `first_block` is the height of the first block in the files; it is
    /// not persisted, so callers must supply the same value on every open.
    pub fn open(dir: impl AsRef<Path>, chain: &str, first_block: u64) -> Result<Self, CacheError> {
        Self::open_inner(dir.as_ref(), chain, first_block, false)
    }

    /// Open the cache files for `chain`, discarding any existing contents.
    pub fn open_truncated(dir: impl AsRef<Path>, chain: &str, first_block: u64) -> Result<Self, CacheError> {
        Self::open_inner(dir.as_ref(), chain, first_block, true)
    }

    fn open_inner(dir: &Path, chain: &str, first_block: u64, truncate: bool) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        let blocks_path = dir.join(format!("{chain}-blocks"));
        let lengths_path = dir.join(format!("{chain}-lengths"));

        let blocks = open_append(&blocks_path)?;
        let lengths = open_append(&lengths_path)?;
        if truncate {
            info!(path = %blocks_path.display(), "discarding cached blocks");
            lengths.set_len(0)?;
            blocks.set_len(0)?;
        }

        let raw_lengths = fs::read(&lengths_path)?;
        if raw_lengths.len() as u64 % LENGTH_SIZE != 0 {
            return Err(CacheError::Corrupt(format!(
                "{} has {} bytes, not a multiple of {LENGTH_SIZE}",
                lengths_path.display(),
                raw_lengths.len()
            )));
        }

        let mut starts = Vec::with_capacity(raw_lengths.len() / LENGTH_SIZE as usize + 1);
        let mut offset = 0u64;
        starts.push(offset);
        for chunk in raw_lengths.chunks_exact(LENGTH_SIZE as usize) {
            let mut len = [0u8; 4];
            len.copy_from_slice(chunk);
            offset += u64::from(u32::from_le_bytes(len));
            starts.push(offset);
        }

        let data_len = blocks.metadata()?.len();
        if data_len < offset {
            return Err(CacheError::Corrupt(format!(
                "{} has {data_len} bytes, lengths index records {offset}",
                blocks_path.display()
            )));
        }
        if data_len > offset {
            warn!(
                path = %blocks_path.display(),
                trailing = data_len - offset,
                "trimming unindexed block data"
            );
            blocks.set_len(offset)?;
        }

        let mut state = CacheState {
            blocks,
            lengths,
            next_block: first_block + (starts.len() as u64 - 1),
            starts,
            first_block,
            latest_hash: None,
            tail_dirty: false,
        };
        let count = state.block_count();
        if count > 0 {
            state.latest_hash = Some(state.hash_at(count - 1)?);
        }

        info!(
            first = state.first_block,
            next = state.next_block,
            latest_hash = ?state.latest_hash.map(|h| h.to_string()),
            "opened block cache"
        );

        Ok(Self { state: RwLock::new(state), blocks_path, lengths_path })
    }

    pub fn blocks_path(&self) -> &Path {
        &self.blocks_path
    }

    pub fn lengths_path(&self) -> &Path {
        &self.lengths_path
    }

    /// Flush and release both files.
    pub fn close(self) -> Result<(), CacheError> {
        self.sync()?;
        debug!(path = %self.blocks_path.display(), "closed block cache");
        Ok(())
    }
}

impl BlockCache for FileBlockCache {
    fn add(&self, block: &CompactBlock) -> Result<(), CacheError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if block.height != state.next_block {
            return Err(CacheError::NonConsecutiveAdd { expected: state.next_block, got: block.height });
        }
        let hash = block.block_hash().ok_or(CacheError::MissingHash { height: block.height })?;

        let bytes = block.encode_to_vec();
        let len = u32::try_from(bytes.len()).map_err(|_| CacheError::BlockTooLarge(bytes.len()))?;

        // Appends must start exactly at the indexed end of the data file.
        state.trim_tail()?;
        let count = state.block_count();
        let written = state
            .blocks
            .write_all(&bytes)
            .and_then(|()| state.lengths.write_all(&len.to_le_bytes()));
        if let Err(e) = written {
            // Leave the files as they were so later offsets stay valid.
            if let Err(rollback) = state.truncate_to(count) {
                warn!(height = block.height, "failed to roll back partial write: {rollback}");
            }
            return Err(e.into());
        }

        let end = state.starts[count] + u64::from(len);
        state.starts.push(end);
        state.latest_hash = Some(hash);
        state.next_block += 1;
        Ok(())
    }

    fn reorg(&self, height: u64) -> Result<u64, CacheError> {
        let mut state = self.state.write();
        if height > state.next_block {
            return Err(CacheError::ReorgAheadOfTip { height, next: state.next_block });
        }
        let height = height.max(state.first_block);
        let keep = (height - state.first_block) as usize;

        // Read the new tip before anything is cut so a failed read leaves
        // the cache untouched.
        let latest_hash = if keep > 0 { Some(state.hash_at(keep - 1)?) } else { None };
        let truncated = state.truncate_to(keep);
        if state.block_count() == keep {
            state.latest_hash = latest_hash;
        }
        truncated?;

        debug!(height, latest_hash = ?state.latest_hash.map(|h| h.to_string()), "cache reorg");
        Ok(height)
    }

    fn get(&self, height: u64) -> Result<Option<CompactBlock>, CacheError> {
        let state = self.state.read();
        if height < state.first_block || height >= state.next_block {
            return Ok(None);
        }
        state.read_block((height - state.first_block) as usize).map(Some)
    }

    fn latest_height(&self) -> Option<u64> {
        let state = self.state.read();
        (state.next_block > state.first_block).then(|| state.next_block - 1)
    }

    fn next_height(&self) -> u64 {
        self.state.read().next_block
    }

    fn first_height(&self) -> u64 {
        self.state.read().first_block
    }

    fn latest_hash(&self) -> Option<Hash256> {
        self.state.read().latest_hash
    }

    fn sync(&self) -> Result<(), CacheError> {
        let state = self.state.read();
        state.blocks.sync_data()?;
        state.lengths.sync_data()?;
        Ok(())
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().read(true).append(true).create(true).open(path)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn block(height: u64, hash: u8, prev: u8) -> CompactBlock {
        CompactBlock {
            proto_version: 1,
            height,
            hash: vec![hash; 32],
            prev_hash: vec![prev; 32],
            time: 1_600_000_000 + height as u32,
            ..Default::default()
        }
    }

    fn fill(cache: &FileBlockCache, from: u64, to: u64) {
        for h in from..to {
            cache.add(&block(h, h as u8, (h - 1) as u8)).unwrap();
        }
    }

    #[test]
    fn empty_cache_has_no_latest() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 100).unwrap();
        assert_eq!(cache.latest_height(), None);
        assert_eq!(cache.latest_hash(), None);
        assert_eq!(cache.next_height(), 100);
        assert_eq!(cache.get(100).unwrap(), None);
    }

    #[test]
    fn add_then_get_each_height() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 100).unwrap();
        fill(&cache, 100, 110);

        assert_eq!(cache.latest_height(), Some(109));
        for h in 100..110 {
            assert_eq!(cache.get(h).unwrap(), Some(block(h, h as u8, (h - 1) as u8)));
        }
        assert_eq!(cache.get(99).unwrap(), None);
        assert_eq!(cache.get(110).unwrap(), None);
        assert_eq!(cache.latest_hash(), Some(Hash256([109; 32])));
    }

    #[test]
    fn non_consecutive_add_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 100).unwrap();
        let err = cache.add(&block(101, 1, 0)).unwrap_err();
        assert!(matches!(err, CacheError::NonConsecutiveAdd { expected: 100, got: 101 }));
        assert_eq!(cache.next_height(), 100);
    }

    #[test]
    fn block_without_hash_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 0).unwrap();
        let mut b = block(0, 1, 0);
        b.hash.truncate(4);
        assert!(matches!(cache.add(&b), Err(CacheError::MissingHash { height: 0 })));
    }

    #[test]
    fn reorg_then_add_replaces_tip() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 100).unwrap();
        fill(&cache, 100, 104);

        assert_eq!(cache.reorg(101).unwrap(), 101);
        assert_eq!(cache.latest_height(), Some(100));
        assert_eq!(cache.latest_hash(), Some(Hash256([100; 32])));

        cache.add(&block(101, 0xee, 100)).unwrap();
        assert_eq!(cache.latest_height(), Some(101));
        assert_eq!(cache.get(101).unwrap().unwrap().hash, vec![0xee; 32]);
        assert_eq!(cache.get(103).unwrap(), None);
    }

    #[test]
    fn reorg_clamps_below_first_and_rejects_ahead() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 100).unwrap();
        fill(&cache, 100, 103);

        assert!(matches!(
            cache.reorg(104),
            Err(CacheError::ReorgAheadOfTip { height: 104, next: 103 })
        ));
        assert_eq!(cache.reorg(103).unwrap(), 103);
        assert_eq!(cache.reorg(5).unwrap(), 100);
        assert_eq!(cache.latest_height(), None);
        assert_eq!(cache.latest_hash(), None);
        assert_eq!(fs::metadata(cache.lengths_path()).unwrap().len(), 0);
        assert_eq!(fs::metadata(cache.blocks_path()).unwrap().len(), 0);
    }

    #[test]
    fn reopen_restores_window_and_hash() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 100).unwrap();
        fill(&cache, 100, 105);
        cache.close().unwrap();

        let cache = FileBlockCache::open(dir.path(), "test", 100).unwrap();
        assert_eq!(cache.first_height(), 100);
        assert_eq!(cache.next_height(), 105);
        assert_eq!(cache.latest_hash(), Some(Hash256([104; 32])));
        assert_eq!(cache.get(102).unwrap(), Some(block(102, 102, 101)));
    }

    #[test]
    fn reopen_trims_unindexed_data() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 0).unwrap();
        cache.add(&block(0, 7, 0)).unwrap();
        let blocks_path = cache.blocks_path().to_path_buf();
        let indexed = fs::metadata(&blocks_path).unwrap().len();
        cache.close().unwrap();

        // Simulate a crash after the data write but before the length write.
        let mut f = OpenOptions::new().append(true).open(&blocks_path).unwrap();
        f.write_all(&[0xab; 40]).unwrap();
        drop(f);

        let cache = FileBlockCache::open(dir.path(), "test", 0).unwrap();
        assert_eq!(fs::metadata(&blocks_path).unwrap().len(), indexed);
        cache.add(&block(1, 8, 7)).unwrap();
        assert_eq!(cache.get(1).unwrap().unwrap().hash, vec![8; 32]);
    }

    #[test]
    fn short_data_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 0).unwrap();
        cache.add(&block(0, 7, 0)).unwrap();
        let blocks_path = cache.blocks_path().to_path_buf();
        cache.close().unwrap();

        let f = OpenOptions::new().write(true).open(&blocks_path).unwrap();
        f.set_len(3).unwrap();
        drop(f);

        assert!(matches!(FileBlockCache::open(dir.path(), "test", 0), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn partial_length_entry_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("test-lengths"), [1, 0, 0]).unwrap();
        assert!(matches!(FileBlockCache::open(dir.path(), "test", 0), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn append_after_failed_data_trim_starts_at_indexed_end() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 10).unwrap();
        fill(&cache, 10, 14);
        assert_eq!(cache.reorg(12).unwrap(), 12);

        // A reorg whose data trim did not happen: the index is cut but
        // stale bytes remain on disk past it.
        let mut f = OpenOptions::new().append(true).open(cache.blocks_path()).unwrap();
        f.write_all(&[0xcd; 64]).unwrap();
        drop(f);
        cache.state.write().tail_dirty = true;
        assert_eq!(cache.next_height(), 12);
        assert_eq!(cache.latest_hash(), Some(Hash256([11; 32])));

        cache.add(&block(12, 0xee, 11)).unwrap();
        assert_eq!(cache.get(12).unwrap().unwrap().hash, vec![0xee; 32]);
        assert_eq!(cache.get(11).unwrap(), Some(block(11, 11, 10)));
        let state = cache.state.read();
        assert!(!state.tail_dirty);
        assert_eq!(fs::metadata(cache.blocks_path()).unwrap().len(), state.starts[3]);
    }

    #[test]
    fn open_truncated_discards_contents() {
        let dir = TempDir::new().unwrap();
        let cache = FileBlockCache::open(dir.path(), "test", 10).unwrap();
        fill(&cache, 10, 15);
        cache.close().unwrap();

        let cache = FileBlockCache::open_truncated(dir.path(), "test", 10).unwrap();
        assert_eq!(cache.latest_height(), None);
        assert_eq!(cache.next_height(), 10);
    }
}
