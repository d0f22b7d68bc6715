//! Classification legends for the annual and change maps.
use crate::collection::CollectionKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::path::Path;

pub const ANNUAL_CLASSES_CSV: &str = include_str!("../data/annual_classes.csv");
pub const CHANGE_CLASSES_CSV: &str = include_str!("../data/change_classes.csv");

/// Value marked as nodata when the raster does not declare one.
pub const DEFAULT_NODATA: u16 = 255;

/// One entry of `classification:classes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub value: u16,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_hint: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nodata: bool,
}

impl Classification {
    pub fn rgb(&self) -> Option<[u8; 3]> {
        let hint = self.color_hint.as_deref().filter(|hint| is_hex_color(hint))?;
        let channel = |i: usize| u8::from_str_radix(&hint[i..i + 2], 16).ok();
        Some([channel(0)?, channel(2)?, channel(4)?])
    }
}

#[derive(Debug, Deserialize)]
struct LegendRow {
    value: u16,
    general_class: String,
    class: String,
    sub_class: String,
    color_hint: String,
}

/// Parse a legend CSV. `nodata` is the raster's nodata value; rows matching it
/// are flagged, falling back to [`DEFAULT_NODATA`].
pub fn load_legend(csv_text: &str, nodata: Option<f64>) -> Result<Vec<Classification>> {
    let nodata_value = match nodata {
        Some(v) if v.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(&v) => v as u16,
        _ => DEFAULT_NODATA,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let mut classes = vec![];
    for row in reader.deserialize() {
        let row: LegendRow = row?;

        let color_hint = match row.color_hint.as_str() {
            "" => None,
            hint if is_hex_color(hint) => Some(hint.to_ascii_uppercase()),
            hint => {
                return Err(Error::Legend(format!(
                    "value {} has invalid color hint '{hint}'",
                    row.value
                )))
            }
        };
        let description = if row.sub_class.is_empty() {
            row.class.clone()
        } else {
            format!("{} - {}", row.class, row.sub_class)
        };

        classes.push(Classification {
            value: row.value,
            name: slugify(&[row.general_class, row.class, row.sub_class].join("__")),
            description: Some(description),
            color_hint,
            nodata: row.value == nodata_value,
        });
    }

    if classes.is_empty() {
        return Err(Error::Legend("legend has no classes".to_string()));
    }
    Ok(classes)
}

/// Legend CSV text of both collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Legends {
    pub annual: Cow<'static, str>,
    pub change: Cow<'static, str>,
}

impl Default for Legends {
    fn default() -> Self {
        Self {
            annual: Cow::Borrowed(ANNUAL_CLASSES_CSV),
            change: Cow::Borrowed(CHANGE_CLASSES_CSV),
        }
    }
}

impl Legends {
    /// Replace the bundled legends with the CSV files given. Each file is
    /// parsed once here so a broken legend fails before any item is built.
    pub fn read(annual: Option<&Path>, change: Option<&Path>) -> Result<Self> {
        let read = |path: Option<&Path>, bundled: &'static str| -> Result<Cow<'static, str>> {
            match path {
                Some(path) => {
                    let text = fs::read_to_string(path)?;
                    load_legend(&text, None).map_err(|e| {
                        Error::Legend(format!("{}: {e}", path.display()))
                    })?;
                    Ok(Cow::Owned(text))
                }
                None => Ok(Cow::Borrowed(bundled)),
            }
        };
        Ok(Self {
            annual: read(annual, ANNUAL_CLASSES_CSV)?,
            change: read(change, CHANGE_CLASSES_CSV)?,
        })
    }

    pub fn csv(&self, kind: CollectionKind) -> &str {
        match kind {
            CollectionKind::Annual => &self.annual,
            CollectionKind::Change => &self.change,
        }
    }
}

fn is_hex_color(hint: &str) -> bool {
    hint.len() == 6 && hint.chars().all(|c| c.is_ascii_hexdigit())
}

/// Lowercase ASCII slug: runs of anything other than letters and digits
/// collapse to a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
