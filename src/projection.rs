//! Reprojection of raster footprints to WGS84 longitude/latitude.
//!
//! Coordinate systems are looked up by EPSG code in the `crs-definitions`
//! database and projected with `proj4rs`, so any code the database knows can
//! be turned into an item bbox.
use crate::error::{Error, Result};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

pub const WGS84: u32 = 4326;

/// Points sampled along each edge of a bbox before it is projected.
pub const DENSIFY_POINTS: usize = 21;

fn proj_string(epsg: u32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

fn projection_error(epsg: u32, reason: String) -> Error {
    Error::Projection {
        code: format!("EPSG:{epsg}"),
        reason,
    }
}

/// A coordinate system resolved from its EPSG code.
pub struct Crs {
    epsg: u32,
    proj: Proj,
    geographic: bool,
}

impl Crs {
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        let definition =
            proj_string(epsg).ok_or_else(|| Error::UnsupportedCrs(format!("EPSG:{epsg}")))?;
        let proj = Proj::from_proj_string(definition)
            .map_err(|e| projection_error(epsg, format!("{e:?}")))?;
        Ok(Self {
            epsg,
            proj,
            geographic: definition.contains("+proj=longlat"),
        })
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Longitude/latitude axes, given in degrees.
    pub fn is_geographic(&self) -> bool {
        self.geographic
    }
}

pub struct Transformer {
    source: Crs,
    target: Crs,
}

impl Transformer {
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        Ok(Self {
            source: Crs::from_epsg(source_epsg)?,
            target: Crs::from_epsg(target_epsg)?,
        })
    }

    pub fn project(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.source.epsg == self.target.epsg {
            return Ok((x, y));
        }
        // proj4rs works in radians for geographic systems
        let mut point = if self.source.geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.source.proj, &self.target.proj, &mut point)
            .map_err(|e| projection_error(self.source.epsg, format!("{e:?}")))?;

        if self.target.geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

/// `[west, south, east, north]` in `source_epsg` as a WGS84 bbox. Each edge is
/// sampled at [`DENSIFY_POINTS`] points so edges that curve in longitude and
/// latitude stay inside the result.
pub fn transform_bounds(source_epsg: u32, bbox: [f64; 4]) -> Result<[f64; 4]> {
    if source_epsg == WGS84 {
        return Ok(bbox);
    }
    let transformer = Transformer::new(source_epsg, WGS84)?;
    let [west, south, east, north] = bbox;

    let mut bounds = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
    for i in 0..DENSIFY_POINTS {
        let t = i as f64 / (DENSIFY_POINTS - 1) as f64;
        let x = west + (east - west) * t;
        let y = south + (north - south) * t;
        for (px, py) in [(x, south), (x, north), (west, y), (east, y)] {
            let (lon, lat) = transformer.project(px, py)?;
            bounds[0] = bounds[0].min(lon);
            bounds[1] = bounds[1].min(lat);
            bounds[2] = bounds[2].max(lon);
            bounds[3] = bounds[3].max(lat);
        }
    }
    if !bounds.iter().all(|v| v.is_finite()) {
        return Err(projection_error(
            source_epsg,
            "footprint does not map to finite coordinates".to_string(),
        ));
    }
    Ok(bounds)
}
