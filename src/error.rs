use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid href_format: {0}")]
    InvalidHrefFormat(String),

    #[error(
        "Format string missing required parameters: {missing}. \
         Required parameters are: {required}"
    )]
    MissingFormatParameters { missing: String, required: String },

    #[error("could not parse the provided href ({href}) using the provided href_format: {format}")]
    HrefMismatch { href: String, format: String },

    #[error(
        "The year parameter cannot be parsed into either the annual or change formats: {0}\n\
         Make sure the year parameter matches either of these formats:\n\
         YYYY, YYYY-YYYYchange"
    )]
    UnparseableYear(String),

    #[error("No value provided for href_format parameter: {0}")]
    MissingParameter(String),

    #[error("Unknown collection type: {0}")]
    UnknownCollection(String),

    #[error("Unknown media type: {0}")]
    UnknownMediaType(String),

    #[error(
        "either provide a media_type or sample_asset_href in order to determine the media type"
    )]
    MissingMediaSource,

    #[error("Invalid raster {href}: {reason}")]
    InvalidRaster { href: String, reason: String },

    #[error("Unsupported CRS for footprint generation: {0}")]
    UnsupportedCrs(String),

    #[error("Could not project {code} coordinates to WGS84: {reason}")]
    Projection { code: String, reason: String },

    #[error("Invalid classification legend: {0}")]
    Legend(String),

    #[error("Request for {href} failed: {source}")]
    Http {
        href: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request for {href} returned HTTP status {status}")]
    HttpStatus { href: String, status: u16 },

    #[error("S3 request for {href} failed: {reason}")]
    S3 { href: String, reason: String },

    #[error("Schema {uri} could not be used: {reason}")]
    Schema { uri: String, reason: String },

    #[error("STAC validation failed:\n{0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn invalid_raster(href: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRaster {
            href: href.to_string(),
            reason: reason.into(),
        }
    }
}
