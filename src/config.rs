use crate::classification::Legends;
use crate::error::Result;
use crate::href_format::{HrefFormat, DEFAULT_HREF_FORMAT};
use crate::range_reader::{ReaderOptions, DEFAULT_PREFETCH_BYTES};
use crate::s3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Optional settings file. Missing keys take their defaults and CLI flags
/// override whatever the file says.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub href_format: String,
    pub header_prefetch_bytes: u64,
    pub http: HttpSettings,
    pub s3: S3Settings,
    pub legends: LegendSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HttpSettings {
    /// `0` disables the timeout.
    pub timeout_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct S3Settings {
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Legend CSV files used instead of the bundled ones.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct LegendSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            href_format: DEFAULT_HREF_FORMAT.to_string(),
            header_prefetch_bytes: DEFAULT_PREFETCH_BYTES,
            http: HttpSettings::default(),
            s3: S3Settings::default(),
            legends: LegendSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: s3::DEFAULT_REGION.to_string(),
            profile: None,
        }
    }
}

impl Settings {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// The documented defaults, as written by `glad-glclu-stac init-config`.
    pub fn template() -> toml::Table {
        toml::toml! {
            href_format = "https://storage.googleapis.com/earthenginepartners-hansen/GLCLU2000-2020/{version}/{year}/{loc}.tif"

            header_prefetch_bytes = 16384

            [http]
            timeout_secs = 60

            [s3]
            region = "us-west-2"
        }
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let settings: Self = toml::from_str(&table.to_string())?;
        Ok(settings)
    }

    pub fn href_format(&self) -> Result<HrefFormat> {
        HrefFormat::new(&self.href_format)
    }

    pub fn legends(&self) -> Result<Legends> {
        Legends::read(self.legends.annual.as_deref(), self.legends.change.as_deref())
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            prefetch_bytes: self.header_prefetch_bytes,
            http_timeout: match self.http.timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            s3_region: self.s3.region.clone(),
            s3_profile: self.s3.profile.clone(),
        }
    }
}
