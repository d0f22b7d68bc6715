//! GeoTIFF header parsing.
//!
//! Reads the image file directories of a (Big)TIFF through a [`RangeReader`]
//! and extracts the georeferencing needed for STAC items. Pixel data is never
//! touched: the first read fetches a header prefix and later reads happen only
//! for directories or tag values that lie beyond it.
use crate::error::{Error, Result};
use crate::media_type::MediaType;
use crate::projection;
use crate::range_reader::RangeReader;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

// Baseline TIFF tags
const NEW_SUBFILE_TYPE: u16 = 254;
const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const STRIP_OFFSETS: u16 = 273;
const SAMPLES_PER_PIXEL: u16 = 277;
const TILE_WIDTH: u16 = 322;
const TILE_LENGTH: u16 = 323;
const TILE_OFFSETS: u16 = 324;
const SAMPLE_FORMAT: u16 = 339;

// GeoTIFF tags
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

// GeoKeys
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;

const MAX_IFDS: usize = 64;
const MAX_IFD_ENTRIES: u64 = 4096;
/// Largest tag value fetched. Only small arrays and strings are read.
const MAX_TAG_BYTES: u64 = 4 * 1024 * 1024;
/// A COG keeps its first directory right after the header (and GDAL's ghost area).
const MAX_COG_IFD_OFFSET: u64 = 300;
const COG_UNTILED_MAX_SIZE: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float32,
    Float64,
    Other,
}

impl DataType {
    fn from_tags(bits: u64, sample_format: u64) -> Self {
        match (sample_format, bits) {
            (1, 8) => Self::Uint8,
            (1, 16) => Self::Uint16,
            (1, 32) => Self::Uint32,
            (1, 64) => Self::Uint64,
            (2, 8) => Self::Int8,
            (2, 16) => Self::Int16,
            (2, 32) => Self::Int32,
            (2, 64) => Self::Int64,
            (3, 32) => Self::Float32,
            (3, 64) => Self::Float64,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Uint64 => "uint64",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Affine pixel-to-model transform in GDAL/rasterio order:
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// The 3x3 matrix flattened row-major, as written to `proj:transform`.
    pub fn to_proj_transform(&self) -> [f64; 9] {
        [self.a, self.b, self.c, self.d, self.e, self.f, 0.0, 0.0, 1.0]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: u64,
    pub height: u64,
    pub bands: u64,
    pub data_type: DataType,
    pub compression: u16,
    pub is_tiled: bool,
    pub overview_count: usize,
    pub overviews_tiled: bool,
    pub ifd_offsets: Vec<u64>,
    pub first_data_offset: Option<u64>,
    pub epsg: Option<u32>,
    pub is_geographic: bool,
    pub transform: Option<GeoTransform>,
    pub nodata: Option<f64>,
}

impl RasterMetadata {
    /// `[rows, cols]`
    pub fn shape(&self) -> [u64; 2] {
        [self.height, self.width]
    }

    /// Bounding box in the raster's own CRS.
    pub fn native_bbox(&self) -> Option<[f64; 4]> {
        let transform = self.transform?;
        let (w, h) = (self.width as f64, self.height as f64);
        let corners = [
            transform.apply(0.0, 0.0),
            transform.apply(w, 0.0),
            transform.apply(w, h),
            transform.apply(0.0, h),
        ];
        let mut bbox = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
        for (x, y) in corners {
            bbox[0] = bbox[0].min(x);
            bbox[1] = bbox[1].min(y);
            bbox[2] = bbox[2].max(x);
            bbox[3] = bbox[3].max(y);
        }
        Some(bbox)
    }

    /// Bounding box in EPSG:4326 longitude/latitude, reprojected from the
    /// raster's CRS when needed.
    pub fn wgs84_bbox(&self) -> Result<[f64; 4]> {
        let bbox = self
            .native_bbox()
            .ok_or_else(|| Error::UnsupportedCrs("raster has no geotransform".to_string()))?;
        let epsg = self
            .epsg
            .ok_or_else(|| Error::UnsupportedCrs("raster has no EPSG code".to_string()))?;
        projection::transform_bounds(epsg, bbox)
    }

    /// Applies the cloud optimized GeoTIFF layout rules that can be checked
    /// from the directories alone.
    pub fn is_cloud_optimized(&self) -> bool {
        let large = self.width > COG_UNTILED_MAX_SIZE || self.height > COG_UNTILED_MAX_SIZE;
        if large && !self.is_tiled {
            return false;
        }
        if self.overview_count > 0 && !self.overviews_tiled {
            return false;
        }
        match self.ifd_offsets.first() {
            Some(&offset) if offset < MAX_COG_IFD_OFFSET => {}
            _ => return false,
        }
        match self.first_data_offset {
            Some(data) => self.ifd_offsets.iter().all(|&ifd| ifd < data),
            None => false,
        }
    }

    pub fn media_type(&self) -> MediaType {
        if self.is_cloud_optimized() {
            MediaType::Cog
        } else {
            MediaType::GeoTiff
        }
    }
}

struct Header {
    order: ByteOrder,
    big: bool,
    first_ifd: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    tag: u16,
    field_type: u16,
    count: u64,
    /// The raw value/offset field: 4 bytes for classic TIFF, 8 for BigTIFF.
    raw: Vec<u8>,
}

#[derive(Debug, Default)]
struct Directory {
    entries: Vec<Entry>,
}

impl Directory {
    fn get(&self, tag: u16) -> Option<&Entry> {
        self.entries.iter().find(|e| e.tag == tag)
    }
}

fn field_size(field_type: u16) -> Option<u64> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 | 13 => Some(4),
        5 | 10 | 12 | 16 | 17 | 18 => Some(8),
        _ => None,
    }
}

/// Serves reads from the prefetched header when possible.
struct TiffSource<'a, R: RangeReader> {
    reader: &'a R,
    prefix: Vec<u8>,
    order: ByteOrder,
    big: bool,
}

impl<'a, R: RangeReader> TiffSource<'a, R> {
    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::invalid_raster(self.reader.href(), reason)
    }

    async fn bytes(&self, offset: u64, length: u64) -> Result<Cow<'_, [u8]>> {
        let end = offset
            .checked_add(length)
            .ok_or_else(|| self.invalid("offset overflow"))?;
        if end <= self.prefix.len() as u64 {
            return Ok(Cow::Borrowed(&self.prefix[offset as usize..end as usize]));
        }
        let data = self.reader.read_range(offset, length).await?;
        if (data.len() as u64) < length {
            return Err(self.invalid(format!(
                "unexpected end of file reading {length} bytes at offset {offset}"
            )));
        }
        Ok(Cow::Owned(data))
    }

    fn u16_at(&self, data: &[u8]) -> u16 {
        let b = [data[0], data[1]];
        match self.order {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    fn u32_at(&self, data: &[u8]) -> u32 {
        let b = [data[0], data[1], data[2], data[3]];
        match self.order {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }

    fn u64_at(&self, data: &[u8]) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&data[..8]);
        match self.order {
            ByteOrder::Little => u64::from_le_bytes(b),
            ByteOrder::Big => u64::from_be_bytes(b),
        }
    }

    fn offset_at(&self, data: &[u8]) -> u64 {
        if self.big {
            self.u64_at(data)
        } else {
            self.u32_at(data) as u64
        }
    }

    async fn read_directory(&self, offset: u64) -> Result<(Directory, u64)> {
        let (count_size, entry_size) = if self.big {
            (8, 20)
        } else {
            (2, 12)
        };

        let count_bytes = self.bytes(offset, count_size).await?;
        let count = if self.big {
            self.u64_at(&count_bytes)
        } else {
            self.u16_at(&count_bytes) as u64
        };
        if count == 0 || count > MAX_IFD_ENTRIES {
            return Err(self.invalid(format!("implausible directory entry count {count}")));
        }

        let next_len = if self.big { 8 } else { 4 };
        let body = self
            .bytes(offset + count_size, count * entry_size + next_len)
            .await?;

        let mut entries = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let e = &body[i * entry_size as usize..(i + 1) * entry_size as usize];
            let tag = self.u16_at(&e[0..2]);
            let field_type = self.u16_at(&e[2..4]);
            let (count, raw) = if self.big {
                (self.u64_at(&e[4..12]), e[12..20].to_vec())
            } else {
                (self.u32_at(&e[4..8]) as u64, e[8..12].to_vec())
            };
            entries.push(Entry {
                tag,
                field_type,
                count,
                raw,
            });
        }
        let next = self.offset_at(&body[count as usize * entry_size as usize..]);
        Ok((Directory { entries }, next))
    }

    /// Raw bytes of an entry's values, inline or at the referenced offset.
    async fn value_bytes(&self, entry: &Entry) -> Result<Cow<'_, [u8]>> {
        let size = field_size(entry.field_type)
            .ok_or_else(|| self.invalid(format!("tag {} has unknown type", entry.tag)))?;
        let total = size
            .checked_mul(entry.count)
            .ok_or_else(|| self.invalid(format!("tag {} is too large", entry.tag)))?;
        if total <= entry.raw.len() as u64 {
            return Ok(Cow::Owned(entry.raw[..total as usize].to_vec()));
        }
        if total > MAX_TAG_BYTES {
            return Err(self.invalid(format!(
                "tag {} claims {total} bytes of values",
                entry.tag
            )));
        }
        let offset = self.offset_at(&entry.raw);
        self.bytes(offset, total).await
    }

    async fn unsigned(&self, entry: &Entry) -> Result<Vec<u64>> {
        let data = self.value_bytes(entry).await?;
        let values = match entry.field_type {
            1 | 7 => data.iter().map(|&b| b as u64).collect(),
            3 => data.chunks_exact(2).map(|c| self.u16_at(c) as u64).collect(),
            4 | 13 => data.chunks_exact(4).map(|c| self.u32_at(c) as u64).collect(),
            16 | 18 => data.chunks_exact(8).map(|c| self.u64_at(c)).collect(),
            t => {
                return Err(self.invalid(format!(
                    "tag {} has non-integer type {t}",
                    entry.tag
                )))
            }
        };
        Ok(values)
    }

    async fn first_unsigned(&self, entry: &Entry) -> Result<u64> {
        let size = field_size(entry.field_type)
            .ok_or_else(|| self.invalid(format!("tag {} has unknown type", entry.tag)))?;
        let head = if size.saturating_mul(entry.count) > entry.raw.len() as u64 {
            // Offset arrays hold one value per tile; only the first is needed
            let offset = self.offset_at(&entry.raw);
            Entry {
                count: 1,
                raw: self.bytes(offset, size).await?.into_owned(),
                ..entry.clone()
            }
        } else {
            Entry {
                count: entry.count.min(1),
                ..entry.clone()
            }
        };
        self.unsigned(&head)
            .await?
            .first()
            .copied()
            .ok_or_else(|| self.invalid(format!("tag {} is empty", entry.tag)))
    }

    async fn doubles(&self, entry: &Entry) -> Result<Vec<f64>> {
        let data = self.value_bytes(entry).await?;
        let values = match entry.field_type {
            12 => data
                .chunks_exact(8)
                .map(|c| f64::from_bits(self.u64_at(c)))
                .collect(),
            11 => data
                .chunks_exact(4)
                .map(|c| f32::from_bits(self.u32_at(c)) as f64)
                .collect(),
            _ => self
                .unsigned(entry)
                .await?
                .into_iter()
                .map(|v| v as f64)
                .collect(),
        };
        Ok(values)
    }

    async fn ascii(&self, entry: &Entry) -> Result<String> {
        let data = self.value_bytes(entry).await?;
        let text = String::from_utf8_lossy(&data);
        Ok(text.trim_end_matches('\0').trim().to_string())
    }
}

fn parse_header(href: &str, prefix: &[u8]) -> Result<Header> {
    if prefix.len() < 8 {
        return Err(Error::invalid_raster(href, "file is too short to be a TIFF"));
    }
    let order = match &prefix[0..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return Err(Error::invalid_raster(href, "not a TIFF file")),
    };
    let read_u16 = |b: &[u8]| match order {
        ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
        ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
    };
    match read_u16(&prefix[2..4]) {
        42 => {
            let b = [prefix[4], prefix[5], prefix[6], prefix[7]];
            let first_ifd = match order {
                ByteOrder::Little => u32::from_le_bytes(b),
                ByteOrder::Big => u32::from_be_bytes(b),
            } as u64;
            Ok(Header {
                order,
                big: false,
                first_ifd,
            })
        }
        43 => {
            if prefix.len() < 16 || read_u16(&prefix[4..6]) != 8 {
                return Err(Error::invalid_raster(href, "malformed BigTIFF header"));
            }
            let mut b = [0u8; 8];
            b.copy_from_slice(&prefix[8..16]);
            let first_ifd = match order {
                ByteOrder::Little => u64::from_le_bytes(b),
                ByteOrder::Big => u64::from_be_bytes(b),
            };
            Ok(Header {
                order,
                big: true,
                first_ifd,
            })
        }
        magic => Err(Error::invalid_raster(
            href,
            format!("unexpected TIFF magic number {magic}"),
        )),
    }
}

/// Read the georeferencing metadata of a GeoTIFF.
pub async fn read_metadata<R: RangeReader>(
    reader: &R,
    prefetch_bytes: u64,
) -> Result<RasterMetadata> {
    let href = reader.href();
    let prefix = reader.read_range(0, prefetch_bytes.max(16)).await?;
    let header = parse_header(href, &prefix)?;
    debug!(href, big_tiff = header.big, first_ifd = header.first_ifd, "parsed tiff header");

    let source = TiffSource {
        reader,
        prefix,
        order: header.order,
        big: header.big,
    };

    let mut ifd_offsets = vec![];
    let mut directories = vec![];
    let mut offset = header.first_ifd;
    while offset != 0 && directories.len() < MAX_IFDS {
        if ifd_offsets.contains(&offset) {
            return Err(source.invalid("directory chain loops back on itself"));
        }
        let (directory, next) = source.read_directory(offset).await?;
        ifd_offsets.push(offset);
        directories.push(directory);
        offset = next;
    }
    let main = directories
        .first()
        .ok_or_else(|| source.invalid("no image file directory"))?;

    let required = |tag: u16, name: &str| {
        main.get(tag)
            .ok_or_else(|| source.invalid(format!("missing required tag {name}")))
    };
    let width = source.first_unsigned(required(IMAGE_WIDTH, "ImageWidth")?).await?;
    let height = source.first_unsigned(required(IMAGE_LENGTH, "ImageLength")?).await?;

    let bands = match main.get(SAMPLES_PER_PIXEL) {
        Some(e) => source.first_unsigned(e).await?,
        None => 1,
    };
    let bits = match main.get(BITS_PER_SAMPLE) {
        Some(e) => source.first_unsigned(e).await?,
        None => 1,
    };
    let sample_format = match main.get(SAMPLE_FORMAT) {
        Some(e) => source.first_unsigned(e).await?,
        None => 1,
    };
    let compression = match main.get(COMPRESSION) {
        Some(e) => source.first_unsigned(e).await? as u16,
        None => 1,
    };

    let is_tiled = main.get(TILE_WIDTH).is_some() && main.get(TILE_LENGTH).is_some();
    let data_offsets = if is_tiled {
        main.get(TILE_OFFSETS)
    } else {
        main.get(STRIP_OFFSETS)
    };
    let first_data_offset = match data_offsets {
        Some(e) => Some(source.first_unsigned(e).await?),
        None => None,
    };

    let mut overview_count = 0;
    let mut overviews_tiled = true;
    for directory in directories.iter().skip(1) {
        let subfile_type = match directory.get(NEW_SUBFILE_TYPE) {
            Some(e) => source.first_unsigned(e).await?,
            None => 0,
        };
        // Bit 0 marks a reduced resolution copy; masks and other pages are not overviews
        if subfile_type & 1 == 1 && subfile_type & 4 == 0 {
            overview_count += 1;
            overviews_tiled &= directory.get(TILE_WIDTH).is_some();
        }
    }

    let geo_keys = match main.get(GEO_KEY_DIRECTORY) {
        Some(e) => GeoKeys::parse(&source.unsigned(e).await?),
        None => GeoKeys::default(),
    };

    let transform = match main.get(MODEL_TRANSFORMATION) {
        Some(e) => transform_from_matrix(&source.doubles(e).await?),
        None => match (main.get(MODEL_PIXEL_SCALE), main.get(MODEL_TIEPOINT)) {
            (Some(scale), Some(tiepoint)) => transform_from_tiepoint(
                &source.doubles(scale).await?,
                &source.doubles(tiepoint).await?,
            ),
            _ => None,
        },
    };
    let transform = transform.map(|t| {
        if geo_keys.raster_type == Some(RASTER_PIXEL_IS_POINT) {
            // Shift to the pixel corner convention used by GDAL
            GeoTransform {
                c: t.c - (t.a + t.b) / 2.0,
                f: t.f - (t.d + t.e) / 2.0,
                ..t
            }
        } else {
            t
        }
    });

    let nodata = match main.get(GDAL_NODATA) {
        Some(e) => parse_nodata(&source.ascii(e).await?),
        None => None,
    };

    Ok(RasterMetadata {
        width,
        height,
        bands,
        data_type: DataType::from_tags(bits, sample_format),
        compression,
        is_tiled,
        overview_count,
        overviews_tiled,
        ifd_offsets,
        first_data_offset,
        epsg: geo_keys.epsg(),
        is_geographic: geo_keys.model_type == Some(MODEL_TYPE_GEOGRAPHIC),
        transform,
        nodata,
    })
}

fn parse_nodata(text: &str) -> Option<f64> {
    match text.to_ascii_lowercase().as_str() {
        "" => None,
        "nan" => Some(f64::NAN),
        other => other.parse().ok(),
    }
}

fn transform_from_matrix(m: &[f64]) -> Option<GeoTransform> {
    if m.len() < 16 {
        return None;
    }
    Some(GeoTransform {
        a: m[0],
        b: m[1],
        c: m[3],
        d: m[4],
        e: m[5],
        f: m[7],
    })
}

fn transform_from_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<GeoTransform> {
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (sx, sy) = (scale[0], scale[1]);
    Some(GeoTransform {
        a: sx,
        b: 0.0,
        c: x - i * sx,
        d: 0.0,
        e: -sy,
        f: y + j * sy,
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
struct GeoKeys {
    model_type: Option<u16>,
    raster_type: Option<u16>,
    geographic_type: Option<u16>,
    projected_type: Option<u16>,
}

impl GeoKeys {
    fn parse(directory: &[u64]) -> Self {
        let mut keys = Self::default();
        if directory.len() < 4 {
            return keys;
        }
        let count = directory[3] as usize;
        for key in directory[4..].chunks_exact(4).take(count) {
            // Only short values stored directly in the directory are needed
            let (id, location, value) = (key[0] as u16, key[1], key[3] as u16);
            if location != 0 {
                continue;
            }
            match id {
                GT_MODEL_TYPE_GEO_KEY => keys.model_type = Some(value),
                GT_RASTER_TYPE_GEO_KEY => keys.raster_type = Some(value),
                GEOGRAPHIC_TYPE_GEO_KEY => keys.geographic_type = Some(value),
                PROJECTED_CS_TYPE_GEO_KEY => keys.projected_type = Some(value),
                _ => {}
            }
        }
        keys
    }

    fn epsg(&self) -> Option<u32> {
        let known = |code: Option<u16>| code.filter(|&c| c != 0 && c != USER_DEFINED);
        known(self.projected_type)
            .or_else(|| known(self.geographic_type))
            .map(u32::from)
    }
}
