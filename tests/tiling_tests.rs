use seamless::codec::decode_collection;
use seamless::prelude::*;
use seamless::remote::{MemoryObjectStore, RemoteContext, RemoteTileSink, UploadOptions};
use seamless::{RemoteTileSource, SeamlessError, TileRange, WriteSummary};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const EXT: &str = "smls.gz";

fn block(id: FeatureId, west: f64, south: f64, east: f64, north: f64) -> Feature {
    Feature::new(id, Rect::new((west, south), (east, north)).to_polygon())
        .with_property("P0010001", id as i64 * 10)
        .with_property("name", format!("block {id}"))
}

/// A in tile (10, 20), B straddling (10, 20) and (11, 20), C in (11, 20)
/// but east of the test query.
fn scenario_features() -> Vec<Feature> {
    vec![
        block(1, -178.20, 84.725, -178.10, 84.735),
        block(2, -178.10, 84.725, -178.00, 84.735),
        block(3, -177.93, 84.725, -177.91, 84.735),
    ]
}

/// A grid of small blocks around lower Manhattan, several per tile.
fn city_features() -> Vec<Feature> {
    let mut features = Vec::new();
    let mut id = 1000;
    for i in 0..20 {
        for j in 0..20 {
            let west = -74.10 + i as f64 * 0.011;
            let south = 40.60 + j as f64 * 0.011;
            features.push(block(id, west, south, west + 0.01, south + 0.01));
            id += 1;
        }
    }
    features
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn load(features: Vec<Feature>) -> FeatureStore {
    init_logging();
    let mut store = FeatureStore::new();
    for feature in features {
        store.add(feature).unwrap();
    }
    store
}

fn write_dir(store: &FeatureStore, dir: &Path) -> WriteSummary {
    let mut sink = LocalTileSink::new(dir, EXT);
    TileWriter::new(store, 6).write_tiles(&mut sink).unwrap()
}

fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    for x_dir in fs::read_dir(root).unwrap() {
        let x_dir = x_dir.unwrap();
        for tile in fs::read_dir(x_dir.path()).unwrap() {
            let tile = tile.unwrap();
            let key = format!(
                "{}/{}",
                x_dir.file_name().to_string_lossy(),
                tile.file_name().to_string_lossy()
            );
            files.insert(key, fs::read(tile.path()).unwrap());
        }
    }
    files
}

fn tile_ids(root: &Path, x: u32, y: u32) -> Vec<FeatureId> {
    let bytes = fs::read(root.join(TileCoord::new(x, y).relative_path(EXT))).unwrap();
    decode_collection(&bytes).unwrap().iter().map(|f| f.id).collect()
}

#[test]
fn test_scenario_local_directory() {
    let dir = TempDir::new().unwrap();
    let store = load(scenario_features());
    let counts = write_dir(&store, dir.path());
    assert_eq!(counts, WriteSummary { tiles: 2, features: 4 });

    assert_eq!(tile_ids(dir.path(), 10, 20), vec![1, 2]);
    assert_eq!(tile_ids(dir.path(), 11, 20), vec![2, 3]);
    assert_eq!(read_tree(dir.path()).len(), 2);

    let extractor = SeamlessExtractor::new(LocalTileSource::new(dir.path(), EXT), 6);
    let result = extractor.extract(84.735, -177.95, 84.725, -178.05).unwrap();
    assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(
        result[&2].property("name"),
        Some(&PropertyValue::Text("block 2".to_string()))
    );
}

#[test]
fn test_full_extent_extraction_returns_stored_set() {
    let dir = TempDir::new().unwrap();
    let features = city_features();
    let store = load(features.clone());
    let counts = write_dir(&store, dir.path());
    assert!(counts.tiles > 1);
    assert!(counts.features > features.len());

    let extractor = SeamlessExtractor::new(LocalTileSource::new(dir.path(), EXT), 6);
    let result = extractor.extract(41.0, -73.8, 40.5, -74.2).unwrap();
    assert_eq!(result.len(), features.len());

    for original in &features {
        let extracted = &result[&original.id];
        assert_eq!(extracted.properties, original.properties);
        let (a, b) = (extracted.envelope().unwrap(), original.envelope().unwrap());
        assert!((a.min().x - b.min().x).abs() <= 1e-6);
        assert!((a.max().y - b.max().y).abs() <= 1e-6);
    }
}

#[test]
fn test_partial_query_matches_brute_force() {
    let dir = TempDir::new().unwrap();
    let features = city_features();
    write_dir(&load(features.clone()), dir.path());

    let (north, east, south, west) = (40.75, -73.975, 40.68, -74.03);
    let query = Rect::new((west, south), (east, north)).to_polygon();
    let expected: Vec<FeatureId> = features
        .iter()
        .filter(|f| !f.geometry.is_disjoint(&query))
        .map(|f| f.id)
        .collect();
    assert!(!expected.is_empty() && expected.len() < features.len());

    let extractor = SeamlessExtractor::new(LocalTileSource::new(dir.path(), EXT), 6)
        .with_parallelism(3);
    let result = extractor.extract(north, east, south, west).unwrap();
    assert_eq!(result.keys().copied().collect::<Vec<_>>(), expected);
}

#[test]
fn test_rewrite_is_byte_identical() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write_dir(&load(city_features()), first.path());
    // insertion order must not matter either
    let mut reversed = city_features();
    reversed.reverse();
    write_dir(&load(reversed), second.path());

    assert_eq!(read_tree(first.path()), read_tree(second.path()));
}

#[test]
fn test_entries_per_feature_match_envelope_tiles() {
    let store = load(city_features());
    for feature in city_features() {
        let covered = TileRange::covering(&feature.envelope().unwrap()).len();
        assert_eq!(store.tiles_for(feature.id).unwrap().len(), covered);
    }
}

#[test]
fn test_remote_round_trip() {
    let objects = Arc::new(MemoryObjectStore::new());
    let context = RemoteContext::new(objects.clone()).unwrap();
    let store = load(scenario_features());

    let mut sink = RemoteTileSink::new(&context, UploadOptions::default());
    let summary = TileWriter::new(&store, 6).write_tiles(&mut sink).unwrap();
    assert_eq!(summary.tiles, 2);
    assert_eq!(objects.keys(), vec!["10/20.smls.gz", "11/20.smls.gz"]);

    // same bytes as a local write
    let dir = TempDir::new().unwrap();
    write_dir(&store, dir.path());
    let local = read_tree(dir.path());
    for key in objects.keys() {
        assert_eq!(objects.get(&key).unwrap().as_ref(), local[&key].as_slice());
    }

    let extractor = SeamlessExtractor::new(RemoteTileSource::new(&context, EXT), 6);
    let result = extractor.extract(84.735, -177.90, 84.725, -178.20).unwrap();
    assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn test_disk_backed_store_and_results() {
    let dir = TempDir::new().unwrap();
    init_logging();
    let config = Config::default()
        .with_feature_storage(StorageKind::Disk)
        .with_result_storage(StorageKind::Disk);

    let mut store = FeatureStore::with_config(&config).unwrap();
    for feature in city_features() {
        store.add(feature).unwrap();
    }
    write_dir(&store, dir.path());

    let extractor = SeamlessExtractor::from_config(LocalTileSource::new(dir.path(), EXT), &config);
    let bounds = QueryBounds::new(41.0, -73.8, 40.5, -74.2).unwrap();
    let results = extractor
        .extract_with(&bounds, config.result_storage)
        .unwrap();
    assert_eq!(results.len(), city_features().len());
    let ids: Vec<_> = results.ids().collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[test]
fn test_empty_area_and_missing_directory() {
    let dir = TempDir::new().unwrap();
    write_dir(&load(scenario_features()), dir.path());

    let extractor = SeamlessExtractor::new(LocalTileSource::new(dir.path(), EXT), 6);
    assert!(extractor.extract(-33.8, 151.3, -33.9, 151.2).unwrap().is_empty());

    let nowhere = SeamlessExtractor::new(LocalTileSource::new(dir.path().join("none"), EXT), 6);
    assert!(nowhere.extract(84.735, -177.95, 84.725, -178.05).unwrap().is_empty());
}

#[test]
fn test_duplicate_id_is_rejected_end_to_end() {
    let mut store = load(scenario_features());
    let err = store
        .add(block(2, 0.0, 0.0, 1.0, 1.0))
        .unwrap_err();
    assert!(matches!(err, SeamlessError::DuplicateId(2)));

    let dir = TempDir::new().unwrap();
    write_dir(&store, dir.path());
    // the rejected geometry never reached the index
    assert!(!dir.path().join("1024").exists());
}
