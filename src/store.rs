//! Feature store with an automatically maintained tile membership index.
//!
//! Every feature added to the store is registered under each zoom-11 tile its
//! envelope touches. The index is derived from geometry at insertion time and
//! is never rebuilt, which is why geometry cannot change after `add`.

use crate::config::Config;
use crate::error::{Result, SeamlessError};
use crate::feature::{Feature, FeatureId};
use crate::storage::{FeatureBackend, MemoryFeatureBackend};
use crate::tile::{TileCoord, TileRange};
use std::collections::BTreeSet;

/// Membership of one feature in one tile.
///
/// Ordered by `(x, y, id)`, so walking the index visits each tile's members
/// contiguously and tiles in x-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileEntry {
    pub x: u32,
    pub y: u32,
    pub id: FeatureId,
}

impl TileEntry {
    pub fn new(tile: TileCoord, id: FeatureId) -> Self {
        Self {
            x: tile.x,
            y: tile.y,
            id,
        }
    }

    pub fn tile(&self) -> TileCoord {
        TileCoord::new(self.x, self.y)
    }
}

/// Keyed feature collection plus its tile index.
pub struct FeatureStore {
    features: Box<dyn FeatureBackend>,
    tiles: BTreeSet<TileEntry>,
    progress_interval: usize,
}

impl FeatureStore {
    /// Store backed by memory.
    pub fn new() -> Self {
        Self::over(Box::new(MemoryFeatureBackend::new()))
    }

    /// Store over a caller-supplied backend.
    ///
    /// The backend must be empty: features already in it would have no tile
    /// entries and never be written.
    pub fn with_backend(features: Box<dyn FeatureBackend>) -> Result<Self> {
        if !features.is_empty() {
            return Err(SeamlessError::invalid_input(format!(
                "backend already holds {} features",
                features.len()
            )));
        }
        Ok(Self::over(features))
    }

    fn over(features: Box<dyn FeatureBackend>) -> Self {
        Self {
            features,
            tiles: BTreeSet::new(),
            progress_interval: 10_000,
        }
    }

    /// Store whose backend and progress logging follow `config`.
    pub fn with_config(config: &Config) -> Result<Self> {
        config.validate().map_err(SeamlessError::InvalidConfig)?;
        let mut store = Self::with_backend(config.feature_storage.create()?)?;
        store.progress_interval = config.progress_interval;
        Ok(store)
    }

    /// Insert a new feature and register it in every tile its envelope touches.
    pub fn add(&mut self, feature: Feature) -> Result<()> {
        let id = feature.id;
        if self.features.contains(id) {
            return Err(SeamlessError::DuplicateId(id));
        }
        let envelope = feature.envelope().ok_or(SeamlessError::EmptyGeometry(id))?;

        self.features.insert(feature)?;
        for tile in TileRange::covering(&envelope).iter() {
            self.tiles.insert(TileEntry::new(tile, id));
        }

        let count = self.features.len();
        if self.progress_interval > 0 && count % self.progress_interval == 0 {
            log::info!("Loaded {} features", count);
        }
        Ok(())
    }

    /// Owned copy of a stored feature.
    pub fn get(&self, id: FeatureId) -> Result<Feature> {
        self.features.get(id)?.ok_or(SeamlessError::NotFound(id))
    }

    /// Replace the properties of an existing feature.
    ///
    /// The geometry must be identical to the stored one; the tile index is
    /// left alone.
    pub fn put(&mut self, feature: Feature) -> Result<()> {
        let stored = self.get(feature.id)?;
        if stored.geometry != feature.geometry {
            return Err(SeamlessError::GeometryMutation(feature.id));
        }
        self.features.insert(feature)
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.features.contains(id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of distinct non-empty tiles.
    pub fn tile_count(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for entry in &self.tiles {
            let tile = entry.tile();
            if last != Some(tile) {
                count += 1;
                last = Some(tile);
            }
        }
        count
    }

    /// All index entries in `(x, y, id)` order.
    pub fn entries(&self) -> impl Iterator<Item = &TileEntry> + '_ {
        self.tiles.iter()
    }

    /// Index entries owned by one feature, in tile order.
    pub fn tiles_for(&self, id: FeatureId) -> Result<Vec<TileEntry>> {
        let feature = self.get(id)?;
        let Some(envelope) = feature.envelope() else {
            return Ok(Vec::new());
        };
        Ok(TileRange::covering(&envelope)
            .iter()
            .map(|tile| TileEntry::new(tile, id))
            .filter(|entry| self.tiles.contains(entry))
            .collect())
    }

    /// Members of a single tile in ID order.
    pub fn members(&self, tile: TileCoord) -> impl Iterator<Item = FeatureId> + '_ {
        let start = TileEntry::new(tile, FeatureId::MIN);
        let end = TileEntry::new(tile, FeatureId::MAX);
        self.tiles.range(start..=end).map(|entry| entry.id)
    }
}

impl Default for FeatureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FeatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStore")
            .field("features", &self.features.len())
            .field("entries", &self.tiles.len())
            .finish()
    }
}
