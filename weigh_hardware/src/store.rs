//! Block storage backends for the parameter cache.
//!
//! A block that was never written reads back as `blank_len` zero bytes, the
//! same as an erased EEPROM page.
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use weigh_traits::{BlockStore, BoxError};

use crate::error::Result;

/// Blocks kept in memory for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct MemoryBlockStore {
    blocks: HashMap<u16, Vec<u8>>,
    blank_len: usize,
}

impl MemoryBlockStore {
    pub fn new(blank_len: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            blank_len,
        }
    }

    pub fn is_written(&self, block: u16) -> bool {
        self.blocks.contains_key(&block)
    }
}

impl BlockStore for MemoryBlockStore {
    fn read_block(&mut self, block: u16) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(self
            .blocks
            .get(&block)
            .cloned()
            .unwrap_or_else(|| vec![0; self.blank_len]))
    }

    fn write_block(&mut self, block: u16, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        self.blocks.insert(block, bytes.to_vec());
        Ok(())
    }
}

/// One `block_<n>.bin` file per block under a directory.
#[derive(Debug, Clone)]
pub struct FileBlockStore {
    dir: PathBuf,
    blank_len: usize,
}

impl FileBlockStore {
    pub fn new(dir: impl Into<PathBuf>, blank_len: usize) -> Self {
        Self {
            dir: dir.into(),
            blank_len,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn block_path(&self, block: u16) -> PathBuf {
        self.dir.join(format!("block_{block}.bin"))
    }

    fn read(&self, block: u16) -> Result<Vec<u8>> {
        match fs::read(self.block_path(block)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(block, "block file missing; reading blank");
                Ok(vec![0; self.blank_len])
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, block: u16, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.block_path(block), bytes)?;
        debug!(block, len = bytes.len(), "block written");
        Ok(())
    }
}

impl BlockStore for FileBlockStore {
    fn read_block(&mut self, block: u16) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(self.read(block)?)
    }

    fn write_block(&mut self, block: u16, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        Ok(self.write(block, bytes)?)
    }
}

/// Replace `path` so readers see either the old block or the new one, never
/// a torn write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let staged = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&staged)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&staged, path)
}
