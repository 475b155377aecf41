//! Temp-file backed feature storage.
//!
//! Feature bodies are appended to an anonymous temp file as bincode records;
//! only the ID → (offset, length) index stays in memory. Replacing a feature
//! appends a new record and repoints the index. The file is removed by the OS
//! when the backend is dropped, so nothing here is durable.

use super::FeatureBackend;
use crate::error::{Result, SeamlessError};
use crate::feature::{Feature, FeatureId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};

const WRITE_BUFFER_CAPACITY: usize = 256 * 1024;

#[derive(Debug, Clone, Copy)]
struct RecordPos {
    offset: u64,
    len: u32,
}

/// Append-only record file.
///
/// A write or flush that fails part way leaves an unknown number of bytes
/// behind, so every offset after it would be wrong. The file is marked broken
/// instead and all later calls fail.
struct SpillFile<F: Write = File> {
    writer: BufWriter<F>,
    end: u64,
    broken: bool,
}

impl<F: Read + Write + Seek> SpillFile<F> {
    fn new(writer: BufWriter<F>) -> Self {
        Self {
            writer,
            end: 0,
            broken: false,
        }
    }

    fn check(&self) -> Result<()> {
        if self.broken {
            return Err(SeamlessError::storage(
                "spill file is unusable after an earlier write failure",
            ));
        }
        Ok(())
    }

    fn guard<T>(&mut self, outcome: std::io::Result<T>) -> Result<T> {
        outcome.map_err(|e| {
            log::error!("Spill file write failed at offset {}: {}", self.end, e);
            self.broken = true;
            SeamlessError::Io(e)
        })
    }

    fn append(&mut self, bytes: &[u8]) -> Result<RecordPos> {
        self.check()?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| SeamlessError::invalid_input("feature record exceeds 4 GiB"))?;
        let pos = RecordPos {
            offset: self.end,
            len,
        };
        let written = self.writer.write_all(bytes);
        self.guard(written)?;
        self.end += bytes.len() as u64;
        Ok(pos)
    }

    fn read(&mut self, pos: RecordPos) -> Result<Vec<u8>> {
        self.check()?;
        let flushed = self.writer.flush();
        self.guard(flushed)?;
        let file = self.writer.get_mut();
        let mut buf = vec![0u8; pos.len as usize];
        let read = file
            .seek(SeekFrom::Start(pos.offset))
            .and_then(|_| file.read_exact(&mut buf));
        // appends continue from the end regardless of the read outcome
        let restored = file.seek(SeekFrom::Start(self.end));
        self.guard(restored)?;
        read?;
        Ok(buf)
    }
}

/// Feature backend that keeps feature bodies on disk.
pub struct DiskFeatureBackend {
    file: Mutex<SpillFile>,
    index: BTreeMap<FeatureId, RecordPos>,
}

impl DiskFeatureBackend {
    /// Create a backend over a fresh anonymous temp file.
    pub fn new() -> Result<Self> {
        let file = tempfile::tempfile()?;
        log::debug!("Spilling features to anonymous temp file");
        Ok(Self {
            file: Mutex::new(SpillFile::new(BufWriter::with_capacity(
                WRITE_BUFFER_CAPACITY,
                file,
            ))),
            index: BTreeMap::new(),
        })
    }

    /// Bytes appended to the spill file so far, including superseded records.
    pub fn bytes_written(&self) -> u64 {
        self.file.lock().end
    }

    fn load(&self, pos: RecordPos) -> Result<Feature> {
        let bytes = self.file.lock().read(pos)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

impl std::fmt::Debug for DiskFeatureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskFeatureBackend")
            .field("features", &self.index.len())
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}

impl FeatureBackend for DiskFeatureBackend {
    fn insert(&mut self, feature: Feature) -> Result<()> {
        let bytes = bincode::serialize(&feature)?;
        let pos = self.file.get_mut().append(&bytes)?;
        self.index.insert(feature.id, pos);
        Ok(())
    }

    fn get(&self, id: FeatureId) -> Result<Option<Feature>> {
        match self.index.get(&id) {
            Some(pos) => self.load(*pos).map(Some),
            None => Ok(None),
        }
    }

    fn contains(&self, id: FeatureId) -> bool {
        self.index.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn ids(&self) -> Box<dyn Iterator<Item = FeatureId> + '_> {
        Box::new(self.index.keys().copied())
    }

    fn values(&self) -> Box<dyn Iterator<Item = Result<Feature>> + '_> {
        Box::new(self.index.values().map(move |pos| self.load(*pos)))
    }
}
