//! Tile-partitioned polygon feature store with seamless bounding-box extraction.
//!
//! Features are loaded into a [`FeatureStore`], which indexes each one under
//! every zoom-11 tile its envelope touches. A [`TileWriter`] then writes one
//! compressed collection per non-empty tile to a directory or object store.
//! Later, a [`SeamlessExtractor`] answers bounding-box queries by reading only
//! the tiles the box touches, dropping duplicates of border features and
//! anything that does not actually intersect the box.
//!
//! ```rust
//! use seamless::prelude::*;
//!
//! let mut store = FeatureStore::new();
//! let block = Rect::new((-74.01, 40.70), (-74.00, 40.71)).to_polygon();
//! store.add(Feature::new(1, block).with_property("P0010001", 42i64))?;
//!
//! let mut sink = MemoryTileSink::new();
//! TileWriter::new(&store, 6).write_tiles(&mut sink)?;
//!
//! let extractor = SeamlessExtractor::new(MemoryTileSource::from(sink), 6);
//! let found = extractor.extract(40.72, -73.99, 40.69, -74.02)?;
//! assert!(found.contains_key(&1));
//! # Ok::<(), seamless::SeamlessError>(())
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod feature;
pub mod remote;
pub mod sink;
pub mod source;
pub mod storage;
pub mod store;
pub mod tile;
pub mod writer;

#[cfg(feature = "geojson")]
pub mod geojson;

pub use config::Config;
pub use error::{Result, SeamlessError};
pub use extract::{ExtractSummary, QueryBounds, SeamlessExtractor};
pub use feature::{Feature, FeatureGeometry, FeatureId, PropertyValue};
pub use sink::{LocalTileSink, MemoryTileSink, TileSink};
pub use source::{LocalTileSource, MemoryTileSource, RemoteTileSource, TileSource};
pub use storage::{DiskFeatureBackend, FeatureBackend, MemoryFeatureBackend, StorageKind};
pub use store::{FeatureStore, TileEntry};
pub use tile::{TileCoord, TileRange, ZOOM_LEVEL};
pub use writer::{TileWriter, WriteSummary};

pub use remote::{
    MemoryObjectStore, ObjectLocation, ObjectStore, RemoteContext, RemoteTileSink, UploadOptions,
};
#[cfg(feature = "s3")]
pub use remote::S3ObjectStore;

pub use geo::{MultiPolygon, Polygon, Rect};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{Config, Result, SeamlessError};

    pub use geo::{MultiPolygon, Polygon, Rect};

    pub use crate::{Feature, FeatureGeometry, FeatureId, PropertyValue};

    pub use crate::{FeatureStore, TileWriter};

    pub use crate::{LocalTileSink, MemoryTileSink, TileSink};

    pub use crate::{LocalTileSource, MemoryTileSource, TileSource};

    pub use crate::{QueryBounds, SeamlessExtractor};

    pub use crate::{FeatureBackend, StorageKind};

    pub use crate::{TileCoord, ZOOM_LEVEL};
}
