//! Items built from a single raster tile.
use crate::classification::Legends;
use crate::collection::CollectionDefinition;
use crate::error::{Error, Result};
use crate::extensions;
use crate::geotiff::{self, RasterMetadata};
use crate::href_format::HrefFormat;
use crate::identity::{format_datetime, TileIdentity, TileParams, TilePeriod};
use crate::range_reader::{AssetReader, ReaderOptions};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

pub const ASSET_NAME: &str = "data";

pub struct ItemBuilder {
    href_format: HrefFormat,
    reader_options: ReaderOptions,
    legends: Legends,
}

impl ItemBuilder {
    pub fn new(href_format: HrefFormat) -> Self {
        Self {
            href_format,
            reader_options: ReaderOptions::default(),
            legends: Legends::default(),
        }
    }

    pub fn reader_options(mut self, options: ReaderOptions) -> Self {
        self.reader_options = options;
        self
    }

    pub fn legends(mut self, legends: Legends) -> Self {
        self.legends = legends;
        self
    }

    /// Identifiers of the tile behind `href`. Does no I/O.
    pub fn identify(&self, href: &str) -> Result<TileIdentity> {
        TileIdentity::from_href(&self.href_format, href)
    }

    pub fn href_for(&self, params: &TileParams) -> Result<String> {
        params.render(&self.href_format)
    }

    pub async fn create_item(&self, href: &str) -> Result<stac::Item> {
        // A malformed href fails before anything is fetched
        let identity = self.identify(href)?;
        info!(href, id = %identity.id, "Creating item");

        let reader = AssetReader::open(href, &self.reader_options).await?;
        let metadata = geotiff::read_metadata(&reader, self.reader_options.prefetch_bytes).await?;
        debug!(
            href,
            width = metadata.width,
            height = metadata.height,
            epsg = metadata.epsg,
            "Read raster metadata"
        );
        let collection = CollectionDefinition::new(identity.collection(), &self.legends);
        validated_item(collection_item_json(&collection, href, &identity, &metadata)?)
    }

    pub async fn create_item_from_params(&self, params: &TileParams) -> Result<stac::Item> {
        let href = self.href_for(params)?;
        self.create_item(&href).await
    }
}

fn polygon(bbox: [f64; 4]) -> Value {
    let [west, south, east, north] = bbox;
    json!({
        "type": "Polygon",
        "coordinates": [[
            [west, south],
            [east, south],
            [east, north],
            [west, north],
            [west, south],
        ]],
    })
}

/// The item as JSON, before validation.
pub fn item_json(href: &str, identity: &TileIdentity, metadata: &RasterMetadata) -> Result<Value> {
    collection_item_json(&identity.collection().definition(), href, identity, metadata)
}

fn collection_item_json(
    collection: &CollectionDefinition,
    href: &str,
    identity: &TileIdentity,
    metadata: &RasterMetadata,
) -> Result<Value> {
    let bbox = metadata.wgs84_bbox()?;
    let transform = metadata
        .transform
        .ok_or_else(|| Error::invalid_raster(href, "raster has no geotransform"))?;
    let classes = collection.classes(metadata.nodata)?;

    let mut properties = Map::new();
    properties.insert(
        "datetime".to_string(),
        json!(format_datetime(&identity.period.datetime())),
    );
    if let TilePeriod::Change { .. } = identity.period {
        if let (Some(start), Some(end)) =
            (identity.period.start_datetime(), identity.period.end_datetime())
        {
            properties.insert("start_datetime".to_string(), json!(format_datetime(&start)));
            properties.insert("end_datetime".to_string(), json!(format_datetime(&end)));
        }
    }
    properties.insert("version".to_string(), json!(identity.version));
    properties.insert(
        "proj:code".to_string(),
        json!(metadata.epsg.map(|code| format!("EPSG:{code}"))),
    );
    if let Some(native_bbox) = metadata.native_bbox() {
        properties.insert("proj:bbox".to_string(), json!(native_bbox));
    }
    properties.insert("proj:shape".to_string(), json!(metadata.shape()));
    properties.insert(
        "proj:transform".to_string(),
        json!(transform.to_proj_transform()),
    );

    let asset = json!({
        "href": href,
        "type": metadata.media_type().as_str(),
        "title": collection.asset_title,
        "roles": ["data"],
        "classification:classes": classes,
    });

    Ok(json!({
        "type": "Feature",
        "stac_version": "1.0.0",
        "stac_extensions": [
            extensions::PROJECTION,
            extensions::CLASSIFICATION,
            extensions::VERSION,
        ],
        "id": identity.id,
        "collection": collection.id(),
        "geometry": polygon(bbox),
        "bbox": bbox,
        "properties": properties,
        "links": [],
        "assets": Map::from_iter([(ASSET_NAME.to_string(), asset)]),
    }))
}

pub fn build_item(
    href: &str,
    identity: &TileIdentity,
    metadata: &RasterMetadata,
) -> Result<stac::Item> {
    validated_item(item_json(href, identity, metadata)?)
}

fn validated_item(value: Value) -> Result<stac::Item> {
    extensions::validate_item(&value)?;
    let item: stac::Item = serde_json::from_value(value)?;
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionKind;
    use crate::geotiff::{DataType, GeoTransform};
    use crate::media_type;
    use crate::testing;
    use std::fs;
    use tempdir::TempDir;

    const HREF: &str =
        "https://storage.googleapis.com/earthenginepartners-hansen/GLCLU2000-2020/v2/2000/50N_090W.tif";

    fn tile_metadata() -> RasterMetadata {
        RasterMetadata {
            width: 40000,
            height: 40000,
            bands: 1,
            data_type: DataType::Uint8,
            compression: 5,
            is_tiled: true,
            overview_count: 0,
            overviews_tiled: true,
            ifd_offsets: vec![8],
            first_data_offset: Some(4096),
            epsg: Some(4326),
            is_geographic: true,
            transform: Some(GeoTransform {
                a: 0.00025,
                b: 0.0,
                c: -90.0,
                d: 0.0,
                e: -0.00025,
                f: 50.0,
            }),
            nodata: None,
        }
    }

    #[test]
    fn test_identify_annual_tile() {
        let builder = ItemBuilder::new(HrefFormat::default());
        let identity = builder.identify(HREF).unwrap();
        assert_eq!(identity.id, "2000_50N_090W");
        assert_eq!(format_datetime(&identity.period.datetime()), "2000-01-01T00:00:00Z");
    }

    #[test]
    fn test_href_template_substitution() {
        let format = HrefFormat::new("s3://bucket/{version}/{year}/{loc}.tif").unwrap();
        let builder = ItemBuilder::new(format);
        let params = TileParams::new("v2", "2000-2020change", "50N_090W");
        let href = builder.href_for(&params).unwrap();
        assert_eq!(href, "s3://bucket/v2/2000-2020change/50N_090W.tif");

        let value = item_json(&href, &builder.identify(&href).unwrap(), &tile_metadata()).unwrap();
        assert_eq!(value["assets"]["data"]["href"], href);
        assert_eq!(value["collection"], CollectionKind::Change.id());
    }

    #[tokio::test]
    async fn test_malformed_href_fails_before_reading() {
        let builder = ItemBuilder::new(HrefFormat::default());
        let err = builder
            .create_item(&HREF.replace(".tif", ".png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HrefMismatch { .. }), "{err}");
    }

    #[test]
    fn test_item_fields() {
        let identity = TileIdentity::from_href(&HrefFormat::default(), HREF).unwrap();
        let value = item_json(HREF, &identity, &tile_metadata()).unwrap();

        assert_eq!(value["id"], "2000_50N_090W");
        assert_eq!(value["collection"], "glad-glclu2020");
        assert_eq!(value["bbox"], json!([-90.0, 40.0, -80.0, 50.0]));
        assert_eq!(value["geometry"]["coordinates"][0][2], json!([-80.0, 50.0]));

        let properties = &value["properties"];
        assert_eq!(properties["datetime"], "2000-01-01T00:00:00Z");
        assert!(properties.get("start_datetime").is_none());
        assert_eq!(properties["version"], "v2");
        assert_eq!(properties["proj:code"], "EPSG:4326");
        assert_eq!(properties["proj:shape"], json!([40000, 40000]));
        assert_eq!(
            properties["proj:transform"],
            json!([0.00025, 0.0, -90.0, 0.0, -0.00025, 50.0, 0.0, 0.0, 1.0])
        );

        let asset = &value["assets"]["data"];
        assert_eq!(asset["type"], media_type::COG);
        assert_eq!(asset["roles"], json!(["data"]));
        assert_eq!(asset["classification:classes"].as_array().unwrap().len(), 111);
    }

    #[test]
    fn test_change_item_datetimes() {
        let format = HrefFormat::default();
        let href = HREF.replace("/2000/", "/2000-2020change/");
        let identity = TileIdentity::from_href(&format, &href).unwrap();
        let value = item_json(&href, &identity, &tile_metadata()).unwrap();

        assert_eq!(value["id"], "2000-2020change_50N_090W");
        let properties = &value["properties"];
        assert_eq!(properties["datetime"], "2020-01-01T00:00:00Z");
        assert_eq!(properties["start_datetime"], "2000-01-01T00:00:00Z");
        assert_eq!(properties["end_datetime"], "2020-12-31T23:59:59Z");
        assert_eq!(
            value["assets"]["data"]["classification:classes"]
                .as_array()
                .unwrap()
                .len(),
            24
        );
    }

    #[test]
    fn test_round_trip_passes_validators() {
        let identity = TileIdentity::from_href(&HrefFormat::default(), HREF).unwrap();
        let item = build_item(HREF, &identity, &tile_metadata()).unwrap();
        assert_eq!(item.id, "2000_50N_090W");
        assert_eq!(item.assets[ASSET_NAME].href, HREF);

        let text = serde_json::to_string(&item).unwrap();
        let item: stac::Item = serde_json::from_str(&text).unwrap();
        extensions::validate_item(&serde_json::to_value(item).unwrap()).unwrap();
    }

    #[test]
    fn test_projected_tile_footprint() {
        // 1000 x 1000 pixels of 30 m in UTM zone 17N
        let metadata = RasterMetadata {
            width: 1000,
            height: 1000,
            epsg: Some(32617),
            is_geographic: false,
            transform: Some(GeoTransform {
                a: 30.0,
                b: 0.0,
                c: 500_000.0,
                d: 0.0,
                e: -30.0,
                f: 4_500_000.0,
            }),
            ..tile_metadata()
        };
        let identity = TileIdentity::from_href(&HrefFormat::default(), HREF).unwrap();
        let item = build_item(HREF, &identity, &metadata).unwrap();
        let value = serde_json::to_value(item).unwrap();

        let properties = &value["properties"];
        assert_eq!(properties["proj:code"], "EPSG:32617");
        assert_eq!(
            properties["proj:bbox"],
            json!([500_000.0, 4_470_000.0, 530_000.0, 4_500_000.0])
        );
        let bbox = value["bbox"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect::<Vec<_>>();
        assert!((bbox[0] + 81.0).abs() < 1e-6, "{bbox:?}");
        assert!(bbox[1] > 40.3 && bbox[3] < 40.7 && bbox[2] < -80.6, "{bbox:?}");
        assert_eq!(value["geometry"]["coordinates"][0][0], json!([bbox[0], bbox[1]]));
    }

    #[test]
    fn test_crs_missing_from_database() {
        let metadata = RasterMetadata {
            epsg: Some(999_999),
            ..tile_metadata()
        };
        let identity = TileIdentity::from_href(&HrefFormat::default(), HREF).unwrap();
        assert!(matches!(
            item_json(HREF, &identity, &metadata),
            Err(Error::UnsupportedCrs(_))
        ));
    }

    #[tokio::test]
    async fn test_create_item_from_local_file() {
        let dir = TempDir::new("item").unwrap();
        let tile_dir = dir.path().join("v2").join("2010");
        fs::create_dir_all(&tile_dir).unwrap();
        fs::write(
            tile_dir.join("50N_090W.tif"),
            testing::striped_geotiff(40, 40, -90.0, 50.0, 0.25, Some("255")),
        )
        .unwrap();

        let root = dir.path().to_str().unwrap();
        let format = HrefFormat::new(&format!("{root}/{{version}}/{{year}}/{{loc}}.tif")).unwrap();
        let builder = ItemBuilder::new(format);
        let item = builder
            .create_item_from_params(&TileParams::new("v2", "2010", "50N_090W"))
            .await
            .unwrap();

        let value = serde_json::to_value(item).unwrap();
        assert_eq!(value["id"], "2010_50N_090W");
        assert_eq!(value["bbox"], json!([-90.0, 40.0, -80.0, 50.0]));
        assert_eq!(value["properties"]["proj:shape"], json!([40, 40]));
        assert_eq!(value["assets"]["data"]["type"], media_type::GEOTIFF);
    }

    #[tokio::test]
    async fn test_create_item_with_replacement_legend() {
        let dir = TempDir::new("item").unwrap();
        let tile_dir = dir.path().join("v2").join("2000");
        fs::create_dir_all(&tile_dir).unwrap();
        fs::write(
            tile_dir.join("50N_090W.tif"),
            testing::striped_geotiff(8, 8, -90.0, 50.0, 0.25, None),
        )
        .unwrap();
        let legend = dir.path().join("annual_classes.csv");
        fs::write(
            &legend,
            "value,general_class,class,sub_class,color_hint\n1,Stable,Cropland,,FFE6A0\n",
        )
        .unwrap();

        let root = dir.path().to_str().unwrap();
        let format = HrefFormat::new(&format!("{root}/{{version}}/{{year}}/{{loc}}.tif")).unwrap();
        let builder =
            ItemBuilder::new(format).legends(Legends::read(Some(&legend), None).unwrap());
        let item = builder
            .create_item_from_params(&TileParams::new("v2", "2000", "50N_090W"))
            .await
            .unwrap();

        let value = serde_json::to_value(item).unwrap();
        assert_eq!(
            value["assets"]["data"]["classification:classes"],
            json!([{
                "value": 1,
                "name": "stable-cropland",
                "description": "Cropland",
                "color_hint": "FFE6A0"
            }])
        );
    }
}
