//! Byte-range access to raster assets.
//!
//! Only the TIFF directory of an asset is needed to describe it, so every
//! source is read through [`RangeReader::read_range`] rather than downloaded.
use crate::error::{Error, Result};
use crate::s3::{self, S3Object};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;
use url::Url;

/// Default size of the first read of an asset. Large enough to hold the
/// header and first directory of typical GeoTIFFs.
pub const DEFAULT_PREFETCH_BYTES: u64 = 16 * 1024;

pub trait RangeReader {
    fn href(&self) -> &str;

    /// Read up to `length` bytes starting at `offset`. Fewer bytes are returned
    /// only when the end of the asset is reached.
    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    pub prefetch_bytes: u64,
    pub http_timeout: Option<Duration>,
    pub s3_region: String,
    pub s3_profile: Option<String>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            prefetch_bytes: DEFAULT_PREFETCH_BYTES,
            http_timeout: Some(Duration::from_secs(60)),
            s3_region: s3::DEFAULT_REGION.to_string(),
            s3_profile: None,
        }
    }
}

pub struct HttpRangeReader {
    client: reqwest::Client,
    href: String,
}

impl HttpRangeReader {
    pub fn new(href: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|source| Error::Http {
            href: href.to_string(),
            source,
        })?;
        Ok(Self {
            client,
            href: href.to_string(),
        })
    }
}

impl RangeReader for HttpRangeReader {
    fn href(&self) -> &str {
        &self.href
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(vec![]);
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        debug!(href = %self.href, %range, "http range request");

        let http_error = |source| Error::Http {
            href: self.href.clone(),
            source,
        };
        let response = self
            .client
            .get(&self.href)
            .header(RANGE, range)
            .send()
            .await
            .map_err(http_error)?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let bytes = response.bytes().await.map_err(http_error)?;
                Ok(bytes.to_vec())
            }
            // The server ignored the range header and sent the whole object
            StatusCode::OK => {
                let bytes = response.bytes().await.map_err(http_error)?;
                Ok(slice_range(&bytes, offset, length))
            }
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(vec![]),
            status => Err(Error::HttpStatus {
                href: self.href.clone(),
                status: status.as_u16(),
            }),
        }
    }
}

pub struct S3RangeReader {
    client: aws_sdk_s3::Client,
    object: S3Object,
    href: String,
}

impl S3RangeReader {
    pub fn new(client: aws_sdk_s3::Client, href: &str) -> Result<Self> {
        let object = S3Object::from_href(href)?;
        Ok(Self {
            client,
            object,
            href: href.to_string(),
        })
    }

    pub async fn open(href: &str, options: &ReaderOptions) -> Result<Self> {
        let client = match &options.s3_profile {
            Some(profile) => s3::client_from_profile(profile, &options.s3_region).await,
            None => s3::anon_client(&options.s3_region).await,
        };
        Self::new(client, href)
    }
}

impl RangeReader for S3RangeReader {
    fn href(&self) -> &str {
        &self.href
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(vec![]);
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        debug!(href = %self.href, %range, "s3 range request");

        let s3_error = |reason: String| Error::S3 {
            href: self.href.clone(),
            reason,
        };
        let object = self
            .client
            .get_object()
            .bucket(&self.object.bucket)
            .key(&self.object.key)
            .range(range)
            .send()
            .await
            .map_err(|e| s3_error(aws_sdk_s3::error::DisplayErrorContext(&e).to_string()))?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| s3_error(e.to_string()))?;
        Ok(data.to_vec())
    }
}

pub struct LocalRangeReader {
    path: PathBuf,
    href: String,
}

impl LocalRangeReader {
    pub fn new(href: &str, path: PathBuf) -> Self {
        Self {
            path,
            href: href.to_string(),
        }
    }
}

impl RangeReader for LocalRangeReader {
    fn href(&self) -> &str {
        &self.href
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buffer = Vec::new();
        file.take(length).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }
}

pub struct MemoryRangeReader {
    data: Vec<u8>,
    href: String,
}

impl MemoryRangeReader {
    pub fn new(href: &str, data: Vec<u8>) -> Self {
        Self {
            data,
            href: href.to_string(),
        }
    }
}

impl RangeReader for MemoryRangeReader {
    fn href(&self) -> &str {
        &self.href
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        Ok(slice_range(&self.data, offset, length))
    }
}

fn slice_range(data: &[u8], offset: u64, length: u64) -> Vec<u8> {
    let len = data.len() as u64;
    let start = offset.min(len) as usize;
    let end = offset.saturating_add(length).min(len) as usize;
    data[start..end].to_vec()
}

/// A reader for any href the tool accepts: `http(s)://`, `s3://`, `file://`
/// or a plain filesystem path.
pub enum AssetReader {
    Http(HttpRangeReader),
    S3(S3RangeReader),
    Local(LocalRangeReader),
    Memory(MemoryRangeReader),
}

impl AssetReader {
    pub async fn open(href: &str, options: &ReaderOptions) -> Result<Self> {
        let reader = match Url::parse(href) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Self::Http(HttpRangeReader::new(href, options.http_timeout)?),
                "s3" => Self::S3(S3RangeReader::open(href, options).await?),
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| Error::invalid_raster(href, "not a valid file url"))?;
                    Self::Local(LocalRangeReader::new(href, path))
                }
                // Windows drive letters parse as a one letter scheme
                scheme if scheme.len() == 1 => {
                    Self::Local(LocalRangeReader::new(href, PathBuf::from(href)))
                }
                scheme => {
                    return Err(Error::invalid_raster(
                        href,
                        format!("unsupported href scheme '{scheme}'"),
                    ))
                }
            },
            Err(_) => Self::Local(LocalRangeReader::new(href, PathBuf::from(href))),
        };
        Ok(reader)
    }
}

impl RangeReader for AssetReader {
    fn href(&self) -> &str {
        match self {
            Self::Http(r) => r.href(),
            Self::S3(r) => r.href(),
            Self::Local(r) => r.href(),
            Self::Memory(r) => r.href(),
        }
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        match self {
            Self::Http(r) => r.read_range(offset, length).await,
            Self::S3(r) => r.read_range(offset, length).await,
            Self::Local(r) => r.read_range(offset, length).await,
            Self::Memory(r) => r.read_range(offset, length).await,
        }
    }
}
