//! Read access to a tile set.
//!
//! A source answers one question: give me the payload of this tile, if it
//! exists. Missing tiles are `Ok(None)` because most of the grid is empty;
//! every other failure is an error and must not be mistaken for absence.

use crate::error::Result;
use crate::remote::RemoteContext;
use crate::sink::MemoryTileSink;
use crate::tile::TileCoord;
use bytes::{Buf, Bytes};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Read access to per-tile payloads.
pub trait TileSource: Send + Sync {
    /// Open the payload of `tile`, or `None` if the tile holds no features.
    fn open(&self, tile: TileCoord) -> Result<Option<Box<dyn Read + Send>>>;
}

impl<T: TileSource + ?Sized> TileSource for &T {
    fn open(&self, tile: TileCoord) -> Result<Option<Box<dyn Read + Send>>> {
        (**self).open(tile)
    }
}

impl<T: TileSource + ?Sized> TileSource for Box<T> {
    fn open(&self, tile: TileCoord) -> Result<Option<Box<dyn Read + Send>>> {
        (**self).open(tile)
    }
}

/// Tiles stored as `root/{x}/{y}.{extension}`.
#[derive(Debug, Clone)]
pub struct LocalTileSource {
    root: PathBuf,
    extension: String,
}

impl LocalTileSource {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TileSource for LocalTileSource {
    fn open(&self, tile: TileCoord) -> Result<Option<Box<dyn Read + Send>>> {
        let path = self.root.join(tile.relative_path(&self.extension));
        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(BufReader::new(file)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Tiles stored in an object store under `{x}/{y}.{extension}` keys.
#[derive(Debug, Clone)]
pub struct RemoteTileSource {
    context: RemoteContext,
    extension: String,
}

impl RemoteTileSource {
    pub fn new(context: &RemoteContext, extension: impl Into<String>) -> Self {
        Self {
            context: context.clone(),
            extension: extension.into(),
        }
    }
}

impl TileSource for RemoteTileSource {
    fn open(&self, tile: TileCoord) -> Result<Option<Box<dyn Read + Send>>> {
        let key = tile.relative_path(&self.extension);
        let body = self.context.block_on(self.context.store().get_object(&key))?;
        Ok(body.map(|bytes| Box::new(bytes.reader()) as Box<dyn Read + Send>))
    }
}

/// Tiles held in memory, typically the output of a [`MemoryTileSink`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTileSource {
    tiles: BTreeMap<TileCoord, Bytes>,
}

impl MemoryTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tile: TileCoord, payload: impl Into<Bytes>) {
        self.tiles.insert(tile, payload.into());
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl From<MemoryTileSink> for MemoryTileSource {
    fn from(sink: MemoryTileSink) -> Self {
        Self {
            tiles: sink
                .into_inner()
                .into_iter()
                .map(|(tile, payload)| (tile, Bytes::from(payload)))
                .collect(),
        }
    }
}

impl TileSource for MemoryTileSource {
    fn open(&self, tile: TileCoord) -> Result<Option<Box<dyn Read + Send>>> {
        Ok(self
            .tiles
            .get(&tile)
            .map(|payload| Box::new(payload.clone().reader()) as Box<dyn Read + Send>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeamlessError;
    use crate::remote::{MemoryObjectStore, ObjectStore, TILE_CONTENT_TYPE};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn read_all(mut reader: Box<dyn Read + Send>) -> Vec<u8> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_local_source() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("10")).unwrap();
        fs::write(dir.path().join("10").join("20.smls.gz"), b"tile").unwrap();

        let source = LocalTileSource::new(dir.path(), "smls.gz");
        let reader = source.open(TileCoord::new(10, 20)).unwrap().unwrap();
        assert_eq!(read_all(reader), b"tile");
        assert!(source.open(TileCoord::new(10, 21)).unwrap().is_none());
        assert!(source.open(TileCoord::new(99, 20)).unwrap().is_none());
    }

    #[test]
    fn test_local_source_surfaces_other_errors() {
        let dir = TempDir::new().unwrap();
        // a directory where the tile file should be
        fs::create_dir_all(dir.path().join("1").join("2.smls.gz")).unwrap();
        let source = LocalTileSource::new(dir.path(), "smls.gz");

        // opening a directory succeeds on some platforms; reading it never does
        match source.open(TileCoord::new(1, 2)) {
            Err(SeamlessError::Io(_)) => {}
            Ok(Some(mut reader)) => {
                let mut buf = Vec::new();
                assert!(reader.read_to_end(&mut buf).is_err());
            }
            other => panic!("expected an I/O failure, got {:?}", other.map(|r| r.is_some())),
        }
    }

    #[test]
    fn test_remote_source() {
        let store = Arc::new(MemoryObjectStore::new());
        let context = RemoteContext::new(store.clone()).unwrap();
        context
            .block_on(store.put_object(
                "11/20.smls.gz",
                Bytes::from_static(b"remote tile"),
                TILE_CONTENT_TYPE,
            ))
            .unwrap();

        let source = RemoteTileSource::new(&context, "smls.gz");
        let reader = source.open(TileCoord::new(11, 20)).unwrap().unwrap();
        assert_eq!(read_all(reader), b"remote tile");
        assert!(source.open(TileCoord::new(11, 21)).unwrap().is_none());
    }

    struct UnreachableStore;

    #[async_trait]
    impl ObjectStore for UnreachableStore {
        async fn put_object(&self, _key: &str, _body: Bytes, _content_type: &str) -> Result<()> {
            Err(SeamlessError::storage("connection reset"))
        }

        async fn get_object(&self, _key: &str) -> Result<Option<Bytes>> {
            Err(SeamlessError::storage("connection reset"))
        }
    }

    #[test]
    fn test_remote_transport_failure_is_not_a_missing_tile() {
        let context = RemoteContext::new(Arc::new(UnreachableStore)).unwrap();
        let source = RemoteTileSource::new(&context, "smls.gz");
        assert!(matches!(
            source.open(TileCoord::new(11, 20)),
            Err(SeamlessError::Storage(_))
        ));
    }
}
