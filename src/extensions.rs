//! STAC extension schema URIs and the consistency checks the published JSON
//! schemas cannot express.
//!
//! Field shapes and types are left to [`crate::schema`]. The checks here
//! compare fields with each other: bbox corner order, ring closure, interval
//! order, extension prefixes against `stac_extensions`, repeated class values
//! and render colormaps against the legend. Every violation found is reported
//! in a single [`Error::Validation`].
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const PROJECTION: &str = "https://stac-extensions.github.io/projection/v2.0.0/schema.json";
pub const CLASSIFICATION: &str =
    "https://stac-extensions.github.io/classification/v2.0.0/schema.json";
pub const VERSION: &str = "https://stac-extensions.github.io/version/v1.2.0/schema.json";
pub const ITEM_ASSETS: &str = "https://stac-extensions.github.io/item-assets/v1.0.0/schema.json";
pub const SCIENTIFIC: &str = "https://stac-extensions.github.io/scientific/v1.0.0/schema.json";
pub const RENDER: &str = "https://stac-extensions.github.io/render/v1.0.0/schema.json";

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self.0.join("\n")))
        }
    }
}

pub fn declared_extensions(value: &Value) -> Vec<&str> {
    value
        .get("stac_extensions")
        .and_then(Value::as_array)
        .map(|uris| uris.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn check_type(value: &Value, expected_type: &str, violations: &mut Violations) {
    match value.get("type").and_then(Value::as_str) {
        Some(t) if t == expected_type => {}
        other => violations.push(format!("type must be '{expected_type}', found {other:?}")),
    }
}

fn numbers(value: Option<&Value>) -> Option<Vec<f64>> {
    value?.as_array()?.iter().map(Value::as_f64).collect()
}

fn check_bbox(name: &str, bbox: Option<&Value>, violations: &mut Violations) {
    let corners = numbers(bbox).and_then(|n| <[f64; 4]>::try_from(n).ok());
    let Some([west, south, east, north]) = corners else {
        return;
    };
    if south > north {
        violations.push(format!("{name} has south ({south}) above north ({north})"));
    }
    if west > east {
        violations.push(format!("{name} has west ({west}) east of east ({east})"));
    }
    if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
        violations.push(format!("{name} longitudes must be within [-180, 180]"));
    }
    if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
        violations.push(format!("{name} latitudes must be within [-90, 90]"));
    }
}

fn check_rings(geometry: Option<&Value>, violations: &mut Violations) {
    let Some(geometry) = geometry else {
        return;
    };
    let polygons = match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => vec![geometry.get("coordinates")],
        Some("MultiPolygon") => geometry
            .get("coordinates")
            .and_then(Value::as_array)
            .map(|polygons| polygons.iter().map(Some).collect())
            .unwrap_or_default(),
        _ => return,
    };
    for rings in polygons.into_iter().flatten().filter_map(Value::as_array) {
        for ring in rings.iter().filter_map(Value::as_array) {
            if ring.first() != ring.last() {
                violations.push("geometry has a ring that is not closed");
            }
        }
    }
}

fn datetime(value: Option<&Value>) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value?.as_str()?).ok()
}

fn check_interval(
    name: &str,
    start: Option<&Value>,
    end: Option<&Value>,
    violations: &mut Violations,
) {
    if let (Some(start), Some(end)) = (datetime(start), datetime(end)) {
        if start > end {
            violations.push(format!("{name} starts after it ends"));
        }
    }
}

fn check_class_values(location: &str, classes: Option<&Value>, violations: &mut Violations) {
    let mut seen = HashSet::new();
    for value in classes
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|class| class.get("value").and_then(Value::as_i64))
    {
        if !seen.insert(value) {
            violations.push(format!("{location}: class value {value} is repeated"));
        }
    }
}

fn check_undeclared_prefixes<'a>(
    keys: impl Iterator<Item = &'a String>,
    declared: &[&str],
    violations: &mut Violations,
) {
    for key in keys {
        let uri = match key.split_once(':').map(|(prefix, _)| prefix) {
            Some("proj") => PROJECTION,
            Some("classification") => CLASSIFICATION,
            Some("sci") => SCIENTIFIC,
            _ => continue,
        };
        if !declared.contains(&uri) {
            violations.push(format!("{key} is used without declaring {uri}"));
        }
    }
}

fn check_assets(
    kind: &str,
    assets: Option<&Value>,
    declared: &[&str],
    violations: &mut Violations,
) {
    for (key, asset) in assets.and_then(Value::as_object).into_iter().flatten() {
        let location = format!("{kind}.{key}");
        if let Some(fields) = asset.as_object() {
            check_undeclared_prefixes(fields.keys(), declared, violations);
        }
        check_class_values(&location, asset.get("classification:classes"), violations);
    }
}

pub fn validate_item(item: &Value) -> Result<()> {
    let mut violations = Violations::default();
    check_type(item, "Feature", &mut violations);
    let declared = declared_extensions(item);

    check_bbox("bbox", item.get("bbox"), &mut violations);
    check_rings(item.get("geometry"), &mut violations);

    if let Some(properties) = item.get("properties").and_then(Value::as_object) {
        check_interval(
            "start_datetime/end_datetime",
            properties.get("start_datetime"),
            properties.get("end_datetime"),
            &mut violations,
        );
        check_undeclared_prefixes(properties.keys(), &declared, &mut violations);
    }
    check_assets("assets", item.get("assets"), &declared, &mut violations);

    violations.finish()
}

pub fn validate_collection(collection: &Value) -> Result<()> {
    let mut violations = Violations::default();
    check_type(collection, "Collection", &mut violations);
    let declared = declared_extensions(collection);

    let extent = collection.get("extent");
    check_bbox(
        "extent.spatial.bbox[0]",
        extent.and_then(|e| e.pointer("/spatial/bbox/0")),
        &mut violations,
    );
    check_interval(
        "extent.temporal.interval[0]",
        extent.and_then(|e| e.pointer("/temporal/interval/0/0")),
        extent.and_then(|e| e.pointer("/temporal/interval/0/1")),
        &mut violations,
    );

    if let Some(fields) = collection.as_object() {
        check_undeclared_prefixes(fields.keys(), &declared, &mut violations);
    }
    check_assets("item_assets", collection.get("item_assets"), &declared, &mut violations);

    if let Some(renders) = collection.get("renders").and_then(Value::as_object) {
        let item_assets = collection.get("item_assets").and_then(Value::as_object);
        for (key, render) in renders {
            check_render(key, render, item_assets, &mut violations);
        }
    }

    violations.finish()
}

/// Colormap entries must be RGB(A) bytes keyed by a class value of one of the
/// rendered assets.
fn check_render(
    key: &str,
    render: &Value,
    item_assets: Option<&Map<String, Value>>,
    violations: &mut Violations,
) {
    let Some(colormap) = render.get("colormap").and_then(Value::as_object) else {
        return;
    };
    let class_values = render
        .get("assets")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|asset| item_assets?.get(asset)?.get("classification:classes")?.as_array())
        .flatten()
        .filter_map(|class| class.get("value").and_then(Value::as_i64))
        .collect::<HashSet<_>>();

    for (value, color) in colormap {
        let valid_color = color.as_array().is_some_and(|channels| {
            matches!(channels.len(), 3 | 4)
                && channels.iter().all(|c| c.as_u64().is_some_and(|c| c <= 255))
        });
        if !valid_color {
            violations.push(format!("renders.{key}.colormap entry {value} is not an RGB color"));
        }
        match value.parse::<i64>() {
            Ok(v) if class_values.is_empty() || class_values.contains(&v) => {}
            _ => violations.push(format!(
                "renders.{key}.colormap entry {value} is not a class of the rendered assets"
            )),
        }
    }
}
