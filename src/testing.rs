//! GeoTIFF fixtures shared by the unit tests.
use std::io::Cursor;
use tiff::encoder::{colortype::Gray8, TiffEncoder};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

fn geo_keys(raster_type: u16) -> [u16; 16] {
    [
        1, 1, 0, 3, // header: version, revision, key count
        1024, 0, 1, 2, // GTModelTypeGeoKey = geographic
        1025, 0, 1, raster_type, // GTRasterTypeGeoKey
        2048, 0, 1, 4326, // GeographicTypeGeoKey
    ]
}

/// A stripped single band uint8 GeoTIFF in EPSG:4326 written with the `tiff`
/// encoder. The directory follows the pixel data, as most writers lay it out.
pub(crate) fn striped_geotiff(
    width: u32,
    height: u32,
    west: f64,
    north: f64,
    scale: f64,
    nodata: Option<&str>,
) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
        let mut image = encoder.new_image::<Gray8>(width, height).unwrap();

        let tags = image.encoder();
        tags.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &[scale, scale, 0.0][..])
            .unwrap();
        tags.write_tag(
            Tag::Unknown(MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, west, north, 0.0][..],
        )
        .unwrap();
        tags.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geo_keys(1)[..])
            .unwrap();
        if let Some(nodata) = nodata {
            tags.write_tag(Tag::Unknown(GDAL_NODATA), nodata).unwrap();
        }

        let pixels = vec![0u8; (width * height) as usize];
        image.write_data(&pixels).unwrap();
    }
    buffer.into_inner()
}

/// A little endian TIFF of 40x40 pixels whose GDAL_NODATA entry claims
/// `count` characters at an offset past the end of the file.
pub(crate) fn tiff_with_nodata_count(big: bool, count: u64) -> Vec<u8> {
    let entries: [(u16, u16, u64, u64); 3] = [
        (256, 4, 1, 40),
        (257, 4, 1, 40),
        (GDAL_NODATA, 2, count, 4096),
    ];
    let mut bytes = b"II".to_vec();
    if big {
        bytes.extend(43u16.to_le_bytes());
        bytes.extend(8u16.to_le_bytes());
        bytes.extend(0u16.to_le_bytes());
        bytes.extend(16u64.to_le_bytes());
        bytes.extend((entries.len() as u64).to_le_bytes());
        for (tag, field_type, count, value) in entries {
            bytes.extend(tag.to_le_bytes());
            bytes.extend(field_type.to_le_bytes());
            bytes.extend(count.to_le_bytes());
            bytes.extend(value.to_le_bytes());
        }
        bytes.extend(0u64.to_le_bytes());
    } else {
        bytes.extend(42u16.to_le_bytes());
        bytes.extend(8u32.to_le_bytes());
        bytes.extend((entries.len() as u16).to_le_bytes());
        for (tag, field_type, count, value) in entries {
            bytes.extend(tag.to_le_bytes());
            bytes.extend(field_type.to_le_bytes());
            bytes.extend((count as u32).to_le_bytes());
            bytes.extend((value as u32).to_le_bytes());
        }
        bytes.extend(0u32.to_le_bytes());
    }
    bytes
}

const TILE_SIZE: u32 = 256;
// Tiles hold placeholder bytes; only the layout is inspected
const TILE_BYTES: u32 = 16;

/// Builder for a hand-assembled tiled classic TIFF with a tiepoint at
/// (-90, 50) and 0.25 degree pixels. By default the directory comes straight
/// after the header and the tiles follow it, which is the COG layout.
pub(crate) struct TiledTiff {
    width: u32,
    height: u32,
    big_endian: bool,
    data_first: bool,
    pixel_is_point: bool,
}

enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
}

impl TiledTiff {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            big_endian: false,
            data_first: false,
            pixel_is_point: false,
        }
    }

    pub(crate) fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    /// Place the tile data before the directory.
    pub(crate) fn data_first(mut self) -> Self {
        self.data_first = true;
        self
    }

    pub(crate) fn pixel_is_point(mut self) -> Self {
        self.pixel_is_point = true;
        self
    }

    fn u16_bytes(&self, v: u16) -> [u8; 2] {
        if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    fn u32_bytes(&self, v: u32) -> [u8; 4] {
        if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    fn encode(&self, value: &Value) -> (u16, u32, Vec<u8>) {
        match value {
            Value::Short(v) => (
                3,
                v.len() as u32,
                v.iter().flat_map(|&x| self.u16_bytes(x)).collect(),
            ),
            Value::Long(v) => (
                4,
                v.len() as u32,
                v.iter().flat_map(|&x| self.u32_bytes(x)).collect(),
            ),
            Value::Double(v) => (
                12,
                v.len() as u32,
                v.iter()
                    .flat_map(|&x| {
                        if self.big_endian {
                            x.to_be_bytes()
                        } else {
                            x.to_le_bytes()
                        }
                    })
                    .collect(),
            ),
        }
    }

    fn entries(&self, tile_offsets: Vec<u32>) -> Vec<(u16, Value)> {
        let tiles = tile_offsets.len();
        let raster_type = if self.pixel_is_point { 2 } else { 1 };
        vec![
            (256, Value::Long(vec![self.width])),
            (257, Value::Long(vec![self.height])),
            (258, Value::Short(vec![8])),
            (259, Value::Short(vec![1])),
            (262, Value::Short(vec![1])),
            (277, Value::Short(vec![1])),
            (322, Value::Short(vec![TILE_SIZE as u16])),
            (323, Value::Short(vec![TILE_SIZE as u16])),
            (324, Value::Long(tile_offsets)),
            (325, Value::Long(vec![TILE_BYTES; tiles])),
            (339, Value::Short(vec![1])),
            (MODEL_PIXEL_SCALE, Value::Double(vec![0.25, 0.25, 0.0])),
            (
                MODEL_TIEPOINT,
                Value::Double(vec![0.0, 0.0, 0.0, -90.0, 50.0, 0.0]),
            ),
            (GEO_KEY_DIRECTORY, Value::Short(geo_keys(raster_type).to_vec())),
        ]
    }

    /// Directory and its out-of-line values for a directory at `ifd_offset`.
    fn directory(&self, ifd_offset: u32, tile_offsets: Vec<u32>) -> Vec<u8> {
        let entries = self.entries(tile_offsets);
        let ifd_len = 2 + 12 * entries.len() as u32 + 4;

        let mut ifd = self.u16_bytes(entries.len() as u16).to_vec();
        let mut values = vec![];
        for (tag, value) in &entries {
            let (field_type, count, bytes) = self.encode(value);
            ifd.extend(self.u16_bytes(*tag));
            ifd.extend(self.u16_bytes(field_type));
            ifd.extend(self.u32_bytes(count));
            if bytes.len() <= 4 {
                let mut inline = bytes.clone();
                inline.resize(4, 0);
                ifd.extend(inline);
            } else {
                ifd.extend(self.u32_bytes(ifd_offset + ifd_len + values.len() as u32));
                values.extend(bytes);
            }
        }
        ifd.extend(self.u32_bytes(0));
        ifd.extend(values);
        ifd
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let tiles = self.width.div_ceil(TILE_SIZE) * self.height.div_ceil(TILE_SIZE);
        let data = vec![0u8; (tiles * TILE_BYTES) as usize];
        let offsets_from =
            |start: u32| -> Vec<u32> { (0..tiles).map(|i| start + i * TILE_BYTES).collect() };

        let mut bytes = if self.big_endian {
            b"MM".to_vec()
        } else {
            b"II".to_vec()
        };
        bytes.extend(self.u16_bytes(42));

        if self.data_first {
            let ifd_offset = 8 + data.len() as u32;
            bytes.extend(self.u32_bytes(ifd_offset));
            bytes.extend(&data);
            bytes.extend(self.directory(ifd_offset, offsets_from(8)));
        } else {
            // Directory length does not depend on the offset values
            let directory_len = self.directory(8, offsets_from(0)).len() as u32;
            bytes.extend(self.u32_bytes(8));
            bytes.extend(self.directory(8, offsets_from(8 + directory_len)));
            bytes.extend(&data);
        }
        bytes
    }
}
