//! Seamless bounding-box extraction over a tile set.
//!
//! A query reads every tile its box touches. Features that straddle tile
//! borders are stored once per tile, so the same ID can come back several
//! times; the first copy wins. Tiles are coarse, so each decoded feature is
//! also tested against the exact query rectangle and dropped if disjoint.
//!
//! Tiles are fetched and decoded in parallel batches. Results are merged on
//! the calling thread in tile order, which keeps the outcome independent of
//! scheduling.

use crate::codec::{FeatureDecoder, validate_precision};
use crate::config::Config;
use crate::error::{Result, SeamlessError};
use crate::feature::{Feature, FeatureId};
use crate::source::TileSource;
use crate::storage::{FeatureBackend, MemoryFeatureBackend, StorageKind};
use crate::tile::{TileCoord, TileRange};
use geo::{Polygon, Rect};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// A geographic query box, validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryBounds {
    north: f64,
    east: f64,
    south: f64,
    west: f64,
}

impl QueryBounds {
    /// Bounds must be finite with `north >= south` and `east >= west`.
    pub fn new(north: f64, east: f64, south: f64, west: f64) -> Result<Self> {
        let reason = if ![north, east, south, west].iter().all(|v| v.is_finite()) {
            Some("coordinates must be finite")
        } else if north < south {
            Some("north is below south")
        } else if east < west {
            Some("east is west of west")
        } else {
            None
        };

        if let Some(reason) = reason {
            log::warn!(
                "Rejected query bounds n={} e={} s={} w={}: {}",
                north,
                east,
                south,
                west,
                reason
            );
            return Err(SeamlessError::InvalidBounds(reason.to_string()));
        }
        Ok(Self {
            north,
            east,
            south,
            west,
        })
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new((self.west, self.south), (self.east, self.north))
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    /// Tiles touched by the box.
    pub fn tile_range(&self) -> TileRange {
        TileRange::for_bounds(self.north, self.east, self.south, self.west)
    }
}

/// Counts from one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Distinct features added to the result
    pub features: usize,
    /// Tiles in the query range
    pub tiles_in_range: usize,
    /// Tiles that existed and were decoded
    pub tiles_read: usize,
    pub elapsed: Duration,
}

/// Bounding-box queries over a [`TileSource`].
#[derive(Debug)]
pub struct SeamlessExtractor<S> {
    source: S,
    precision: u8,
    parallelism: usize,
}

impl<S: TileSource> SeamlessExtractor<S> {
    /// Extractor for tiles encoded at `precision` decimal digits.
    pub fn new(source: S, precision: u8) -> Self {
        Self {
            source,
            precision,
            parallelism: Config::default().fetch_parallelism,
        }
    }

    pub fn from_config(source: S, config: &Config) -> Self {
        Self::new(source, config.precision).with_parallelism(config.fetch_parallelism)
    }

    /// Number of tiles fetched and decoded concurrently.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Features intersecting the box, keyed and ordered by ID, held in memory.
    pub fn extract(
        &self,
        north: f64,
        east: f64,
        south: f64,
        west: f64,
    ) -> Result<BTreeMap<FeatureId, Feature>> {
        let bounds = QueryBounds::new(north, east, south, west)?;
        let mut results = MemoryFeatureBackend::new();
        self.extract_into(&bounds, &mut results)?;
        Ok(results.into_inner())
    }

    /// Extract into a freshly created backend of the given kind.
    pub fn extract_with(
        &self,
        bounds: &QueryBounds,
        kind: StorageKind,
    ) -> Result<Box<dyn FeatureBackend>> {
        let mut results = kind.create()?;
        self.extract_into(bounds, &mut results)?;
        Ok(results)
    }

    /// Extract into `results`. IDs already present are left untouched.
    pub fn extract_into<B>(&self, bounds: &QueryBounds, results: &mut B) -> Result<ExtractSummary>
    where
        B: FeatureBackend + ?Sized,
    {
        validate_precision(self.precision)?;
        let started = Instant::now();
        let query = bounds.to_polygon();
        let range = bounds.tile_range();
        let tiles: Vec<TileCoord> = range.iter().collect();

        let mut summary = ExtractSummary {
            tiles_in_range: tiles.len(),
            ..ExtractSummary::default()
        };

        for batch in tiles.chunks(self.parallelism) {
            let decoded: Vec<Result<Option<Vec<Feature>>>> = batch
                .par_iter()
                .map(|tile| self.read_tile(*tile, &query))
                .collect();

            for (tile, outcome) in batch.iter().zip(decoded) {
                let Some(features) = outcome? else {
                    continue;
                };
                summary.tiles_read += 1;
                let mut added = 0;
                for feature in features {
                    if !results.contains(feature.id) {
                        results.insert(feature)?;
                        added += 1;
                    }
                }
                summary.features += added;
                log::debug!("Tile {} contributed {} new features", tile, added);
            }
        }

        summary.elapsed = started.elapsed();
        log::info!(
            "Extracted {} features from {} of {} tiles in {:?}",
            summary.features,
            summary.tiles_read,
            summary.tiles_in_range,
            summary.elapsed
        );
        Ok(summary)
    }

    /// Decode one tile, keeping features that touch the query polygon.
    fn read_tile(&self, tile: TileCoord, query: &Polygon<f64>) -> Result<Option<Vec<Feature>>> {
        let Some(reader) = self.source.open(tile)? else {
            return Ok(None);
        };
        let decoder = FeatureDecoder::new(reader)?.with_expected_precision(self.precision)?;

        let mut kept = Vec::new();
        for feature in decoder {
            let feature = feature?;
            if !feature.geometry.is_disjoint(query) {
                kept.push(feature);
            }
        }
        Ok(Some(kept))
    }
}
