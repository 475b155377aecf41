//! Partitioning a feature store into per-tile payloads.

use crate::codec::{FeatureEncoder, validate_precision};
use crate::error::Result;
use crate::feature::{Feature, FeatureId};
use crate::sink::TileSink;
use crate::store::FeatureStore;
use crate::tile::TileCoord;
use std::time::Instant;

/// Counts from one tiling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Tiles written
    pub tiles: usize,
    /// Feature records written; a feature spanning several tiles counts once per tile
    pub features: usize,
}

/// Writes every non-empty tile of a store to a [`TileSink`].
#[derive(Debug)]
pub struct TileWriter<'a> {
    store: &'a FeatureStore,
    precision: u8,
}

impl<'a> TileWriter<'a> {
    pub fn new(store: &'a FeatureStore, precision: u8) -> Self {
        Self { store, precision }
    }

    /// Walk the tile index in order and emit one collection per tile.
    ///
    /// The sink is always finished, also when the pass fails part way, so
    /// background work started for earlier tiles is never left behind. The
    /// pass error takes precedence over a finish error.
    pub fn write_tiles<S: TileSink>(&self, sink: &mut S) -> Result<WriteSummary> {
        let started = Instant::now();
        let pass = self.write_pass(sink);
        let finished = sink.finish();

        match (pass, finished) {
            (Ok(summary), Ok(())) => {
                log::info!(
                    "Wrote {} features to {} tiles in {:?}",
                    summary.features,
                    summary.tiles,
                    started.elapsed()
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), finished) => {
                if let Err(finish_err) = finished {
                    log::warn!("Tile sink also failed to finish: {}", finish_err);
                }
                Err(e)
            }
        }
    }

    fn write_pass<S: TileSink>(&self, sink: &mut S) -> Result<WriteSummary> {
        validate_precision(self.precision)?;

        let mut summary = WriteSummary::default();
        let mut current: Option<TileCoord> = None;
        let mut members: Vec<FeatureId> = Vec::new();

        for entry in self.store.entries() {
            let tile = entry.tile();
            if current != Some(tile) {
                if let Some(done) = current {
                    self.write_tile(sink, done, &members, &mut summary)?;
                    members.clear();
                }
                current = Some(tile);
            }
            members.push(entry.id);
        }

        if let Some(last) = current {
            self.write_tile(sink, last, &members, &mut summary)?;
        }
        Ok(summary)
    }

    fn write_tile<S: TileSink>(
        &self,
        sink: &mut S,
        tile: TileCoord,
        members: &[FeatureId],
        summary: &mut WriteSummary,
    ) -> Result<()> {
        let features = members
            .iter()
            .map(|id| self.store.get(*id))
            .collect::<Result<Vec<Feature>>>()?;

        let mut encoder = FeatureEncoder::new(sink.open(tile)?, self.precision)?;
        encoder.write_collection(&features)?;
        sink.close(tile, encoder.finish()?)?;

        log::debug!("Wrote {} features to tile {}", features.len(), tile);
        summary.tiles += 1;
        summary.features += features.len();
        Ok(())
    }
}
