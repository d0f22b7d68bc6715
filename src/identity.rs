//! Tile identifiers derived from asset hrefs.
use crate::collection::CollectionKind;
use crate::error::{Error, Result};
use crate::href_format::{HrefFormat, ParsedHref};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const ID_SEPARATOR: &str = "_";

/// The temporal coverage encoded in the `year` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilePeriod {
    Annual { year: i32 },
    Change { start_year: i32, end_year: i32 },
}

impl TilePeriod {
    pub fn parse(value: &str) -> Result<Self> {
        static ANNUAL: OnceLock<Regex> = OnceLock::new();
        static CHANGE: OnceLock<Regex> = OnceLock::new();
        let annual = ANNUAL
            .get_or_init(|| Regex::new(r"^(\d{4})$").expect("Regex pattern should always compile"));
        let change = CHANGE.get_or_init(|| {
            Regex::new(r"^(\d{4})-(\d{4})change$").expect("Regex pattern should always compile")
        });

        let unparseable = || Error::UnparseableYear(value.to_string());

        if let Some(captures) = change.captures(value) {
            let start_year: i32 = captures[1].parse().map_err(|_| unparseable())?;
            let end_year: i32 = captures[2].parse().map_err(|_| unparseable())?;
            if start_year > end_year {
                return Err(unparseable());
            }
            return Ok(Self::Change {
                start_year,
                end_year,
            });
        }
        if let Some(captures) = annual.captures(value) {
            let year: i32 = captures[1].parse().map_err(|_| unparseable())?;
            return Ok(Self::Annual { year });
        }
        Err(unparseable())
    }

    pub fn collection(&self) -> CollectionKind {
        match self {
            Self::Annual { .. } => CollectionKind::Annual,
            Self::Change { .. } => CollectionKind::Change,
        }
    }

    /// The nominal item datetime. Change tiles are stamped with the first day
    /// of their final year.
    pub fn datetime(&self) -> DateTime<Utc> {
        match *self {
            Self::Annual { year } => start_of_year(year),
            Self::Change { end_year, .. } => start_of_year(end_year),
        }
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::Annual { .. } => None,
            Self::Change { start_year, .. } => Some(start_of_year(start_year)),
        }
    }

    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::Annual { .. } => None,
            Self::Change { end_year, .. } => Some(end_of_year(end_year)),
        }
    }
}

pub(crate) fn start_of_year(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn end_of_year(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `YYYY-MM-DDTHH:MM:SSZ`
pub(crate) fn format_datetime(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Everything an item needs that can be read off its href alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileIdentity {
    pub id: String,
    pub version: String,
    pub period: TilePeriod,
}

impl TileIdentity {
    pub fn from_href(format: &HrefFormat, href: &str) -> Result<Self> {
        let parsed = format.parse(href)?;
        Self::from_fields(&parsed)
    }

    pub fn from_fields(parsed: &ParsedHref) -> Result<Self> {
        let year = parsed
            .get("year")
            .ok_or_else(|| Error::MissingParameter("year".to_string()))?;
        let version = parsed
            .get("version")
            .ok_or_else(|| Error::MissingParameter("version".to_string()))?;
        let period = TilePeriod::parse(year)?;

        let id = parsed
            .iter()
            .filter(|(name, _)| *name != "version")
            .map(|(_, value)| value)
            .collect::<Vec<_>>()
            .join(ID_SEPARATOR);

        Ok(Self {
            id,
            version: version.to_string(),
            period,
        })
    }

    pub fn collection(&self) -> CollectionKind {
        self.period.collection()
    }
}

/// Identifiers of a tile, used to render its href from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileParams {
    pub version: String,
    pub year: String,
    pub loc: String,
}

impl TileParams {
    pub fn new(version: &str, year: &str, loc: &str) -> Self {
        Self {
            version: version.to_string(),
            year: year.to_string(),
            loc: loc.to_string(),
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("version".to_string(), self.version.clone()),
            ("year".to_string(), self.year.clone()),
            ("loc".to_string(), self.loc.clone()),
        ])
    }

    pub fn render(&self, format: &HrefFormat) -> Result<String> {
        format.render(&self.to_map())
    }
}
