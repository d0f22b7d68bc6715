use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

pub const GEOTIFF: &str = "image/tiff; application=geotiff";
pub const COG: &str = "image/tiff; application=geotiff; profile=cloud-optimized";
pub const JSON: &str = "application/json";
pub const HTML: &str = "text/html";
pub const JPEG: &str = "image/jpeg";

/// Media types an asset of this dataset can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    GeoTiff,
    Cog,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeoTiff => GEOTIFF,
            Self::Cog => COG,
        }
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s
            .split(';')
            .map(|part| part.trim().to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join("; ");
        match normalized.as_str() {
            "geotiff" | GEOTIFF => Ok(Self::GeoTiff),
            "cog" | COG => Ok(Self::Cog),
            _ => Err(Error::UnknownMediaType(s.to_string())),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
