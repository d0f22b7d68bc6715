//! Collection metadata for the annual and change products.
use crate::classification::{self, Classification, Legends};
use crate::error::{Error, Result};
use crate::extensions;
use crate::geotiff::{self, DataType};
use crate::identity::{end_of_year, format_datetime, start_of_year};
use crate::item::ASSET_NAME;
use crate::media_type::{self, MediaType};
use crate::range_reader::{AssetReader, ReaderOptions};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

pub const ANNUAL_COLLECTION_ID: &str = "glad-glclu2020";
pub const CHANGE_COLLECTION_ID: &str = "glad-glclu2020-change";

pub const COLLECTION_START_YEAR: i32 = 2000;
pub const COLLECTION_END_YEAR: i32 = 2020;
pub const ANNUAL_YEARS: [i32; 5] = [2000, 2005, 2010, 2015, 2020];
pub const CHANGE_RENDER_KEY: &str = "2000-2020 change";

pub const COLLECTION_BBOX: [f64; 4] = [-180.0, -80.0, 180.0, 80.0];
pub const LICENSE: &str = "CC-BY-4.0";
pub const LICENSE_HREF: &str = "https://creativecommons.org/licenses/by/4.0/";
pub const HOMEPAGE: &str =
    "https://storage.googleapis.com/earthenginepartners-hansen/GLCLU2000-2020/v2/download.html";
pub const THUMBNAIL_HREF: &str = "https://glad.umd.edu/sites/default/files/styles/projects/\
public/datasets_glulc.jpg?itok=bxS-HPMi";
pub const DOI: &str = "10.3389/frsen.2022.856903";
pub const KEYWORDS: [&str; 5] = [
    "land cover",
    "land use",
    "land use change",
    "vegetation",
    "surface water",
];

pub const CITATION: &str = "P.V. Potapov, M.C. Hansen, A.H. Pickens, A. Hernandez-Serna, \
A. Tyukavina, S. Turubanova, V. Zalles, X. Li, A. Khan, F. Stolle, N. Harris, X.-P. Song, \
A. Baggett, I. Kommareddy, A. Komareddy (2022).";

const DESCRIPTION_BODY: &str = "The GLAD Global Land Cover and Land Use Change dataset \
quantifies changes in forest extent and height, cropland, built-up lands, surface water, and \
perennial snow and ice extent from the year 2000 to 2020 at 30-m spatial resolution. The \
global dataset derived from the GLAD Landsat Analysis Ready Data. Each thematic product was \
independently derived using state-of-the-art, locally and regionally calibrated machine \
learning tools. Each thematic layer was validated independently using a statistical \
sampling. The global dataset is available online, with no charges for access and no \
restrictions on subsequent redistribution or use, as long as the proper citation is provided \
as specified by the Creative Commons Attribution License (CC BY). For all questions and \
comment contact Peter Potapov (potapov@umd.edu).";

pub fn collection_description() -> String {
    format!("{DESCRIPTION_BODY}\n\n{CITATION}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Annual,
    Change,
}

impl CollectionKind {
    pub const ALL: [Self; 2] = [Self::Annual, Self::Change];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Annual => ANNUAL_COLLECTION_ID,
            Self::Change => CHANGE_COLLECTION_ID,
        }
    }

    pub fn definition(&self) -> CollectionDefinition {
        CollectionDefinition::for_kind(*self)
    }
}

impl FromStr for CollectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "annual" | ANNUAL_COLLECTION_ID => Ok(Self::Annual),
            "change" | CHANGE_COLLECTION_ID => Ok(Self::Change),
            _ => Err(Error::UnknownCollection(s.to_string())),
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Static description of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDefinition {
    pub kind: CollectionKind,
    pub title: &'static str,
    pub asset_title: &'static str,
    pub asset_description: &'static str,
    legend_csv: Cow<'static, str>,
}

impl CollectionDefinition {
    /// The definition with the bundled legend.
    pub fn for_kind(kind: CollectionKind) -> Self {
        Self::new(kind, &Legends::default())
    }

    pub fn new(kind: CollectionKind, legends: &Legends) -> Self {
        let legend_csv = match kind {
            CollectionKind::Annual => legends.annual.clone(),
            CollectionKind::Change => legends.change.clone(),
        };
        match kind {
            CollectionKind::Annual => Self {
                kind,
                title: "GLAD: Annual maps of land cover and land use",
                asset_title: "Annual maps of land cover and land use",
                asset_description: "Continuous measures of bare ground and tree height inside \
                    and outside of wetlands, seasonal water percent, and binary labels of \
                    built-up, permanent snow/ice, and cropland.",
                legend_csv,
            },
            CollectionKind::Change => Self {
                kind,
                title: "GLAD: Net change of land cover and land use between 2000 and 2020",
                asset_title: "Net change of land cover and land use between 2000 and 2020",
                asset_description: "Land cover and land use states of 2020 with transitions \
                    relative to 2000 labeled.",
                legend_csv,
            },
        }
    }

    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    pub fn classes(&self, nodata: Option<f64>) -> Result<Vec<Classification>> {
        classification::load_legend(&self.legend_csv, nodata)
    }

    /// `(render key, title, start year, end year)` for every render.
    fn render_periods(&self) -> Vec<(String, String, i32, i32)> {
        match self.kind {
            CollectionKind::Annual => ANNUAL_YEARS
                .iter()
                .map(|&year| {
                    (
                        year.to_string(),
                        format!("{} ({year})", self.asset_title),
                        year,
                        year,
                    )
                })
                .collect(),
            CollectionKind::Change => vec![(
                CHANGE_RENDER_KEY.to_string(),
                self.asset_title.to_string(),
                COLLECTION_START_YEAR,
                COLLECTION_END_YEAR,
            )],
        }
    }

    pub fn renders(&self, classes: &[Classification]) -> Value {
        let colormap = classes
            .iter()
            .filter_map(|class| Some((class.value.to_string(), json!(class.rgb()?))))
            .collect::<Map<_, _>>();
        let nodata = classes.iter().find(|class| class.nodata).map(|class| class.value);

        let mut renders = Map::new();
        for (key, title, start, end) in self.render_periods() {
            let mut render = json!({
                "title": title,
                "assets": [ASSET_NAME],
                "datetime": format!(
                    "{}/{}",
                    format_datetime(&start_of_year(start)),
                    format_datetime(&end_of_year(end))
                ),
                "colormap": colormap,
            });
            if let Some(nodata) = nodata {
                render["nodata"] = json!(nodata);
            }
            renders.insert(key, render);
        }
        Value::Object(renders)
    }

    pub fn item_assets(&self, media_type: MediaType, classes: &[Classification]) -> Value {
        let definition = json!({
            "type": media_type.as_str(),
            "title": self.asset_title,
            "description": self.asset_description,
            "roles": ["data"],
            "classification:classes": classes,
        });
        Value::Object(Map::from_iter([(ASSET_NAME.to_string(), definition)]))
    }

    /// The collection as JSON, before validation.
    pub fn to_json(&self, media_type: MediaType, nodata: Option<f64>) -> Result<Value> {
        let classes = self.classes(nodata)?;
        Ok(json!({
            "type": "Collection",
            "stac_version": "1.0.0",
            "stac_extensions": [
                extensions::ITEM_ASSETS,
                extensions::SCIENTIFIC,
                extensions::CLASSIFICATION,
                extensions::RENDER,
            ],
            "id": self.id(),
            "title": self.title,
            "description": collection_description(),
            "keywords": KEYWORDS,
            "license": LICENSE,
            "providers": [{
                "name": "Global Land Analysis and Discovery (GLAD), University of Maryland",
                "roles": ["producer", "licensor"],
                "url": "https://glad.umd.edu",
            }],
            "extent": {
                "spatial": {"bbox": [COLLECTION_BBOX]},
                "temporal": {"interval": [[
                    format_datetime(&start_of_year(COLLECTION_START_YEAR)),
                    format_datetime(&end_of_year(COLLECTION_END_YEAR)),
                ]]},
            },
            "links": [
                {
                    "rel": "license",
                    "href": LICENSE_HREF,
                    "type": media_type::HTML,
                    "title": "CC-BY-4.0 license",
                },
                {
                    "rel": "documentation",
                    "href": HOMEPAGE,
                    "type": media_type::HTML,
                    "title": "GLAD GLCLU Access Page",
                },
                {
                    "rel": "cite-as",
                    "href": format!("https://doi.org/{DOI}"),
                },
            ],
            "assets": {
                "thumbnail": {
                    "href": THUMBNAIL_HREF,
                    "type": media_type::JPEG,
                    "title": self.title,
                    "roles": ["thumbnail"],
                }
            },
            "item_assets": self.item_assets(media_type, &classes),
            "sci:citation": CITATION,
            "sci:doi": DOI,
            "renders": self.renders(&classes),
        }))
    }

    pub fn build(&self, media_type: MediaType, nodata: Option<f64>) -> Result<stac::Collection> {
        let value = self.to_json(media_type, nodata)?;
        extensions::validate_collection(&value)?;
        let collection: stac::Collection = serde_json::from_value(value)?;
        Ok(collection)
    }
}

/// Builds a collection, optionally sniffing the media type and nodata value
/// from a sample asset.
pub struct CollectionBuilder {
    kind: CollectionKind,
    media_type: Option<MediaType>,
    sample_asset_href: Option<String>,
    reader_options: ReaderOptions,
    legends: Legends,
}

impl CollectionBuilder {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            media_type: None,
            sample_asset_href: None,
            reader_options: ReaderOptions::default(),
            legends: Legends::default(),
        }
    }

    pub fn legends(mut self, legends: Legends) -> Self {
        self.legends = legends;
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub fn sample_asset_href(mut self, href: &str) -> Self {
        self.sample_asset_href = Some(href.to_string());
        self
    }

    pub fn reader_options(mut self, options: ReaderOptions) -> Self {
        self.reader_options = options;
        self
    }

    pub async fn build(&self) -> Result<stac::Collection> {
        if self.media_type.is_none() && self.sample_asset_href.is_none() {
            return Err(Error::MissingMediaSource);
        }

        let sample = match &self.sample_asset_href {
            Some(href) => {
                info!(href, "Reading sample asset");
                let reader = AssetReader::open(href, &self.reader_options).await?;
                let metadata =
                    geotiff::read_metadata(&reader, self.reader_options.prefetch_bytes).await?;
                if metadata.data_type != DataType::Uint8 {
                    warn!(
                        href,
                        data_type = %metadata.data_type,
                        "Sample asset is not uint8; class values may not match the legend"
                    );
                }
                Some(metadata)
            }
            None => None,
        };

        let media_type = match (self.media_type, &sample) {
            (Some(media_type), _) => media_type,
            (None, Some(metadata)) => metadata.media_type(),
            (None, None) => return Err(Error::MissingMediaSource),
        };
        let nodata = sample.as_ref().and_then(|metadata| metadata.nodata);

        info!(collection = self.kind.id(), %media_type, "Building collection");
        CollectionDefinition::new(self.kind, &self.legends).build(media_type, nodata)
    }
}
