use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use seamless::codec::FeatureEncoder;
use seamless::geojson::{features_from_geojson, write_feature_stream};
use seamless::remote::{ObjectLocation, RemoteContext, RemoteTileSink, UploadOptions};
use seamless::{
    Config, FeatureBackend, FeatureStore, LocalTileSink, LocalTileSource, QueryBounds, RemoteTileSource,
    SeamlessExtractor, StorageKind, TileSource, TileWriter,
};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON, or TOML when built with the toml feature)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the features intersecting a bounding box
    Extract(ExtractArgs),
    /// Partition GeoJSON features into a tile set
    Tile(TileArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Tile directory or s3://bucket[/prefix]
    source: String,
    #[arg(allow_negative_numbers = true)]
    north: f64,
    #[arg(allow_negative_numbers = true)]
    east: f64,
    #[arg(allow_negative_numbers = true)]
    south: f64,
    #[arg(allow_negative_numbers = true)]
    west: f64,
    /// Output file; defaults to stdout
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Native)]
    format: OutputFormat,

    /// Keep the result set in a temp file instead of memory
    #[arg(long)]
    on_disk: bool,

    /// Decimal digits the tiles were written with
    #[arg(long)]
    precision: Option<u8>,
}

#[derive(Args, Debug)]
struct TileArgs {
    /// GeoJSON files holding Polygon or MultiPolygon features
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Tile directory or s3://bucket[/prefix]
    #[arg(short, long)]
    out: String,

    /// Keep the feature store in a temp file instead of memory
    #[arg(long)]
    on_disk: bool,

    /// Decimal digits to keep for coordinates
    #[arg(long)]
    precision: Option<u8>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Compressed feature collection, same encoding as the tiles
    Native,
    Geojson,
}

fn load_config(path: Option<&Path>, precision: Option<u8>) -> anyhow::Result<Config> {
    let mut config = match path {
        None => Config::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            if path.extension().is_some_and(|ext| ext == "toml") {
                parse_toml(&text)?
            } else {
                Config::from_json(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
        }
    };

    if let Some(precision) = precision {
        config.precision = precision;
    }
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

#[cfg(feature = "toml")]
fn parse_toml(text: &str) -> anyhow::Result<Config> {
    Config::from_toml(text).context("Invalid TOML config")
}

#[cfg(not(feature = "toml"))]
fn parse_toml(_text: &str) -> anyhow::Result<Config> {
    bail!("TOML configuration requires the toml feature")
}

#[cfg(feature = "s3")]
fn remote_context(uri: &str) -> anyhow::Result<RemoteContext> {
    let location = ObjectLocation::parse(uri)?;
    RemoteContext::s3(&location).with_context(|| format!("Failed to connect to {location}"))
}

#[cfg(not(feature = "s3"))]
fn remote_context(uri: &str) -> anyhow::Result<RemoteContext> {
    ObjectLocation::parse(uri)?;
    bail!("{uri}: object store support requires the s3 feature")
}

fn open_source(uri: &str, config: &Config) -> anyhow::Result<Box<dyn TileSource>> {
    if ObjectLocation::is_remote(uri) {
        let context = remote_context(uri)?;
        Ok(Box::new(RemoteTileSource::new(&context, &config.tile_extension)))
    } else {
        if !Path::new(uri).is_dir() {
            bail!("{uri} is not a directory");
        }
        Ok(Box::new(LocalTileSource::new(uri, &config.tile_extension)))
    }
}

fn write_output(
    writer: impl Write,
    results: &dyn FeatureBackend,
    format: OutputFormat,
    precision: u8,
) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(writer);
    match format {
        OutputFormat::Native => {
            let mut encoder = FeatureEncoder::new(&mut writer, precision)?;
            encoder.write_stream(results.len() as u64, results.values())?;
            encoder.finish()?;
        }
        OutputFormat::Geojson => write_feature_stream(&mut writer, results.values())?,
    }
    writer.flush()?;
    Ok(())
}

fn extract(args: ExtractArgs, config: Config) -> anyhow::Result<()> {
    let source = open_source(&args.source, &config)?;
    let bounds = QueryBounds::new(args.north, args.east, args.south, args.west)?;
    let storage = if args.on_disk {
        StorageKind::Disk
    } else {
        config.result_storage
    };

    let started = Instant::now();
    let extractor = SeamlessExtractor::from_config(source, &config);
    let results = extractor
        .extract_with(&bounds, storage)
        .with_context(|| format!("Failed to extract from {}", args.source))?;
    eprintln!(
        "Read {} features in {} msec",
        results.len(),
        started.elapsed().as_millis()
    );

    let results = results.as_ref();
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_output(file, results, args.format, config.precision)
        }
        None => write_output(io::stdout().lock(), results, args.format, config.precision),
    }
}

fn tile(args: TileArgs, mut config: Config) -> anyhow::Result<()> {
    if args.on_disk {
        config.feature_storage = StorageKind::Disk;
    }

    let mut store = FeatureStore::with_config(&config)?;
    for input in &args.inputs {
        let file =
            File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
        let features = features_from_geojson(BufReader::new(file))
            .with_context(|| format!("Failed to read {}", input.display()))?;
        log::info!("Read {} features from {}", features.len(), input.display());
        for feature in features {
            store.add(feature)?;
        }
    }
    log::info!(
        "Loaded {} features into {} tiles",
        store.len(),
        store.tile_count()
    );

    let writer = TileWriter::new(&store, config.precision);
    let summary = if ObjectLocation::is_remote(&args.out) {
        let context = remote_context(&args.out)?;
        let mut sink = RemoteTileSink::new(&context, UploadOptions::from_config(&config));
        writer.write_tiles(&mut sink)?
    } else {
        let mut sink = LocalTileSink::new(&args.out, &config.tile_extension);
        writer.write_tiles(&mut sink)?
    };

    eprintln!(
        "Wrote {} tiles holding {} feature records to {}",
        summary.tiles, summary.features, args.out
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extract(args) => {
            let config = load_config(cli.config.as_deref(), args.precision)?;
            extract(args, config)
        }
        Command::Tile(args) => {
            let config = load_config(cli.config.as_deref(), args.precision)?;
            tile(args, config)
        }
    }
}
