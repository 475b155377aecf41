//! Compressed feature-collection codec.
//!
//! A payload is a gzip stream holding a small header followed by the
//! features, each one framed with bincode. Coordinates are quantized to a
//! fixed number of decimal digits and delta coded per ring, so the varint
//! encoding keeps neighbouring vertices short.
//!
//! The precision is written into the header. Readers that know which
//! precision they expect can ask the decoder to verify it, since a mismatch
//! would otherwise go unnoticed until geometries come out wrong.

use crate::error::{Result, SeamlessError};
use crate::feature::{Feature, FeatureGeometry, FeatureId, PropertyValue};
use bincode::Options;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

const MAGIC: [u8; 4] = *b"SMLS";
const FORMAT_VERSION: u8 = 1;

/// Highest supported number of decimal digits. Larger scales overflow i64
/// for longitudes near ±180.
pub const MAX_PRECISION: u8 = 15;

/// Default number of decimal digits kept for coordinates.
pub const DEFAULT_PRECISION: u8 = 6;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u8,
    precision: u8,
    count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFeature {
    id: FeatureId,
    multi: bool,
    /// polygon -> ring -> interleaved delta-coded x/y
    polygons: Vec<Vec<Vec<i64>>>,
    properties: Vec<(String, PropertyValue)>,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
}

pub fn validate_precision(precision: u8) -> Result<()> {
    if precision > MAX_PRECISION {
        return Err(SeamlessError::InvalidConfig(format!(
            "precision must be at most {MAX_PRECISION} decimal digits, got {precision}"
        )));
    }
    Ok(())
}

fn scale_for(precision: u8) -> f64 {
    10f64.powi(precision as i32)
}

/// Quantize one ordinate, or `None` if it is not finite or does not fit in i64.
fn quantize(value: f64, scale: f64) -> Option<i64> {
    let scaled = (value * scale).round();
    (scaled.is_finite() && scaled.abs() < i64::MAX as f64).then_some(scaled as i64)
}

fn encode_ring(ring: &LineString<f64>, scale: f64) -> Option<Vec<i64>> {
    let mut out = Vec::with_capacity(ring.0.len() * 2);
    let (mut px, mut py) = (0i64, 0i64);
    for coord in ring.coords() {
        let x = quantize(coord.x, scale)?;
        let y = quantize(coord.y, scale)?;
        out.push(x.checked_sub(px)?);
        out.push(y.checked_sub(py)?);
        px = x;
        py = y;
    }
    Some(out)
}

fn decode_ring(deltas: &[i64], scale: f64) -> Result<LineString<f64>> {
    if deltas.len() % 2 != 0 {
        return Err(SeamlessError::InvalidFormat(
            "ring has an odd number of ordinates".to_string(),
        ));
    }
    let overflow = || SeamlessError::InvalidFormat("ring coordinate overflows".to_string());
    let (mut x, mut y) = (0i64, 0i64);
    let mut coords = Vec::with_capacity(deltas.len() / 2);
    for pair in deltas.chunks_exact(2) {
        x = x.checked_add(pair[0]).ok_or_else(overflow)?;
        y = y.checked_add(pair[1]).ok_or_else(overflow)?;
        coords.push(Coord {
            x: x as f64 / scale,
            y: y as f64 / scale,
        });
    }
    Ok(LineString(coords))
}

fn encode_polygon(polygon: &Polygon<f64>, scale: f64) -> Option<Vec<Vec<i64>>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| encode_ring(ring, scale))
        .collect()
}

fn decode_polygon(rings: &[Vec<i64>], scale: f64) -> Result<Polygon<f64>> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| SeamlessError::InvalidFormat("polygon without rings".to_string()))?;
    let interiors = interiors
        .iter()
        .map(|ring| decode_ring(ring, scale))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(decode_ring(exterior, scale)?, interiors))
}

impl WireFeature {
    fn from_feature(feature: &Feature, scale: f64) -> Result<Self> {
        let polygons = feature
            .geometry
            .polygons()
            .map(|p| encode_polygon(p, scale))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                SeamlessError::invalid_input(format!(
                    "feature {} has a coordinate that is not finite or out of range",
                    feature.id
                ))
            })?;

        Ok(Self {
            id: feature.id,
            multi: matches!(feature.geometry, FeatureGeometry::MultiPolygon(_)),
            polygons,
            properties: feature
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    fn into_feature(self, scale: f64) -> Result<Feature> {
        let mut polygons = self
            .polygons
            .iter()
            .map(|rings| decode_polygon(rings, scale))
            .collect::<Result<Vec<_>>>()?;

        let geometry = if self.multi {
            FeatureGeometry::MultiPolygon(MultiPolygon(polygons))
        } else {
            match (polygons.pop(), polygons.is_empty()) {
                (Some(polygon), true) => FeatureGeometry::Polygon(polygon),
                _ => {
                    return Err(SeamlessError::InvalidFormat(format!(
                        "feature {} is tagged as a polygon but has {} parts",
                        self.id,
                        self.polygons.len()
                    )));
                }
            }
        };

        Ok(Feature {
            id: self.id,
            geometry,
            properties: self.properties.into_iter().collect(),
        })
    }
}

/// Writes one feature collection into a gzip stream.
pub struct FeatureEncoder<W: Write> {
    inner: GzEncoder<W>,
    precision: u8,
    written: bool,
}

impl<W: Write> FeatureEncoder<W> {
    pub fn new(writer: W, precision: u8) -> Result<Self> {
        validate_precision(precision)?;
        Ok(Self {
            inner: GzEncoder::new(writer, Compression::default()),
            precision,
            written: false,
        })
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Encode the collection. A payload carries exactly one collection.
    pub fn write_collection<'a, I>(&mut self, features: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Feature>,
        I::IntoIter: ExactSizeIterator,
    {
        let features = features.into_iter();
        self.write_header(features.len() as u64)?;
        for feature in features {
            self.write_feature(feature)?;
        }
        Ok(())
    }

    /// Encode `count` features pulled one at a time, so the collection never
    /// has to be in memory at once. The source must yield exactly `count`.
    pub fn write_stream<I>(&mut self, count: u64, features: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<Feature>>,
    {
        self.write_header(count)?;
        let mut written = 0u64;
        for feature in features {
            if written == count {
                return Err(SeamlessError::codec(format!(
                    "more than the {count} announced features"
                )));
            }
            self.write_feature(&feature?)?;
            written += 1;
        }
        if written != count {
            return Err(SeamlessError::codec(format!(
                "announced {count} features but only {written} were written"
            )));
        }
        Ok(())
    }

    fn write_header(&mut self, count: u64) -> Result<()> {
        if self.written {
            return Err(SeamlessError::codec("collection already written"));
        }
        self.written = true;

        let header = Header {
            magic: MAGIC,
            version: FORMAT_VERSION,
            precision: self.precision,
            count,
        };
        options().serialize_into(&mut self.inner, &header)?;
        Ok(())
    }

    fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        let wire = WireFeature::from_feature(feature, scale_for(self.precision))?;
        options().serialize_into(&mut self.inner, &wire)?;
        Ok(())
    }

    /// Flush the gzip trailer and hand back the underlying writer.
    pub fn finish(self) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}

/// Lazily decodes a feature collection, one feature per `next()`.
pub struct FeatureDecoder<R: Read> {
    inner: GzDecoder<R>,
    precision: u8,
    scale: f64,
    remaining: u64,
}

impl<R: Read> std::fmt::Debug for FeatureDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureDecoder")
            .field("precision", &self.precision)
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl<R: Read> FeatureDecoder<R> {
    /// Read the collection header from a gzip payload.
    pub fn new(reader: R) -> Result<Self> {
        let mut inner = GzDecoder::new(reader);
        let header: Header = options()
            .deserialize_from(&mut inner)
            .map_err(|e| match *e {
                bincode::ErrorKind::Io(io) if io.kind() != std::io::ErrorKind::UnexpectedEof => {
                    SeamlessError::Io(io)
                }
                other => SeamlessError::InvalidFormat(format!("unreadable header: {other}")),
            })?;

        if header.magic != MAGIC {
            return Err(SeamlessError::InvalidFormat(
                "not a feature collection".to_string(),
            ));
        }
        if header.version != FORMAT_VERSION {
            return Err(SeamlessError::InvalidFormat(format!(
                "unsupported format version {}",
                header.version
            )));
        }
        validate_precision(header.precision)
            .map_err(|_| SeamlessError::InvalidFormat(format!("precision {}", header.precision)))?;

        Ok(Self {
            inner,
            precision: header.precision,
            scale: scale_for(header.precision),
            remaining: header.count,
        })
    }

    /// Fail unless the payload was written at `expected` decimal digits.
    pub fn with_expected_precision(self, expected: u8) -> Result<Self> {
        if self.precision != expected {
            return Err(SeamlessError::PrecisionMismatch {
                expected,
                found: self.precision,
            });
        }
        Ok(self)
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Features not yet decoded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn read_feature(&mut self) -> Result<Feature> {
        let wire: WireFeature = options().deserialize_from(&mut self.inner)?;
        wire.into_feature(self.scale)
    }
}

impl<R: Read> Iterator for FeatureDecoder<R> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let result = self.read_feature();
        if result.is_err() {
            // stream position is unknown after a failure
            self.remaining = 0;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (0, Some(n))
    }
}

/// Encode a collection into a fresh buffer.
pub fn encode_collection(features: &[Feature], precision: u8) -> Result<Vec<u8>> {
    let mut encoder = FeatureEncoder::new(Vec::new(), precision)?;
    encoder.write_collection(features)?;
    encoder.finish()
}

/// Decode a whole collection from bytes.
pub fn decode_collection(bytes: &[u8]) -> Result<Vec<Feature>> {
    FeatureDecoder::new(bytes)?.collect()
}
