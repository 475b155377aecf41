//! Destinations for per-tile output.
//!
//! A [`TileSink`] hands out one writable output per tile and is told when
//! that output is complete. `finish` is called once after the whole pass, so
//! sinks with background work can wait for it there.

use crate::error::Result;
use crate::tile::TileCoord;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receiver of compressed tile payloads.
pub trait TileSink {
    type Output: Write;

    /// Start the payload for `tile`.
    fn open(&mut self, tile: TileCoord) -> Result<Self::Output>;

    /// Complete the payload for `tile`. The output is consumed.
    fn close(&mut self, tile: TileCoord, output: Self::Output) -> Result<()>;

    /// Wait for any outstanding work. Called exactly once, even after a
    /// failed pass.
    fn finish(&mut self) -> Result<()>;
}

/// Writes tiles as `root/{x}/{y}.{extension}`.
#[derive(Debug)]
pub struct LocalTileSink {
    root: PathBuf,
    extension: String,
    written: usize,
}

impl LocalTileSink {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            written: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a tile is written to.
    pub fn path_for(&self, tile: TileCoord) -> PathBuf {
        self.root.join(tile.relative_path(&self.extension))
    }
}

impl TileSink for LocalTileSink {
    type Output = BufWriter<File>;

    fn open(&mut self, tile: TileCoord) -> Result<Self::Output> {
        let path = self.path_for(tile);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(BufWriter::new(File::create(path)?))
    }

    fn close(&mut self, _tile: TileCoord, output: Self::Output) -> Result<()> {
        output.into_inner().map_err(|e| e.into_error())?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        log::debug!("Wrote {} tiles under {}", self.written, self.root.display());
        Ok(())
    }
}

/// Collects tile payloads in memory, keyed by tile.
#[derive(Debug, Default)]
pub struct MemoryTileSink {
    tiles: BTreeMap<TileCoord, Vec<u8>>,
}

impl MemoryTileSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tile: TileCoord) -> Option<&[u8]> {
        self.tiles.get(&tile).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<TileCoord, Vec<u8>> {
        self.tiles
    }
}

impl TileSink for MemoryTileSink {
    type Output = Vec<u8>;

    fn open(&mut self, _tile: TileCoord) -> Result<Self::Output> {
        Ok(Vec::new())
    }

    fn close(&mut self, tile: TileCoord, output: Self::Output) -> Result<()> {
        self.tiles.insert(tile, output);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_sink_layout() {
        let dir = TempDir::new().unwrap();
        let mut sink = LocalTileSink::new(dir.path(), "smls.gz");
        let tile = TileCoord::new(602, 770);

        let mut output = sink.open(tile).unwrap();
        output.write_all(b"payload").unwrap();
        sink.close(tile, output).unwrap();
        sink.finish().unwrap();

        let path = dir.path().join("602").join("770.smls.gz");
        assert_eq!(sink.path_for(tile), path);
        assert_eq!(fs::read(path).unwrap(), b"payload");
    }

    #[test]
    fn test_local_sink_overwrites_existing_tile() {
        let dir = TempDir::new().unwrap();
        let mut sink = LocalTileSink::new(dir.path(), "bin");
        let tile = TileCoord::new(1, 2);

        for body in [&b"first, longer"[..], b"second"] {
            let mut output = sink.open(tile).unwrap();
            output.write_all(body).unwrap();
            sink.close(tile, output).unwrap();
        }
        assert_eq!(fs::read(sink.path_for(tile)).unwrap(), b"second");
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemoryTileSink::new();
        let tile = TileCoord::new(3, 4);
        let mut output = sink.open(tile).unwrap();
        output.extend_from_slice(b"abc");
        sink.close(tile, output).unwrap();
        assert_eq!(sink.get(tile), Some(&b"abc"[..]));
        assert_eq!(sink.len(), 1);
    }
}
