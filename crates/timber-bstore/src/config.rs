use std::path::PathBuf;

/// Default cache capacity, in decoded blocks.
pub const DEFAULT_CACHE_MAX: usize = 2048;

/// Configuration for opening a [`BlockStore`](crate::BlockStore).
#[derive(Clone, Debug)]
pub struct BlockStoreConfig {
    /// Directory holding the block data file.
    pub db_path: PathBuf,
    /// Location of the superblock journal (the metadata endpoint).
    pub meta_path: PathBuf,
    /// Block cache capacity, in decoded blocks.
    pub cache_max: usize,
}

impl BlockStoreConfig {
    /// Configuration rooted at one base directory: block data and the
    /// superblock journal both live under `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            meta_path: base.join("superblocks.journal"),
            db_path: base,
            cache_max: DEFAULT_CACHE_MAX,
        }
    }

    /// Override the cache capacity.
    pub fn with_cache_max(mut self, cache_max: usize) -> Self {
        self.cache_max = cache_max;
        self
    }
}
