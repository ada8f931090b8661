//! Map projection resolution
//!
//! Maps the model's projection code and global attributes to a Proj-style
//! descriptor string that transforms geographic coordinates (degrees) to
//! cartographic coordinates (meters).
//!
//! | code | projection | required attributes |
//! |------|------------|---------------------|
//! | 0 | equirectangular | - |
//! | 1 | Lambert conformal conic | `STAND_LON`, `TRUELAT1`, `TRUELAT2` |
//! | 2 | polar stereographic | `TRUELAT1`, `STAND_LON` |
//! | 3 | Mercator | `TRUELAT1`, `STAND_LON` |
//! | 6 | lat-lon, possibly rotated | `STAND_LON` when the pole is displaced |

use crate::error::{DcError, Result};
use crate::metadata::GlobalAttributes;
use crate::storage::AttributeSource;
use serde::{Deserialize, Serialize};

/// Degrees to meters on the unit sphere, used by the rotated pole transform
const DEG_TO_METER: &str = "0.0174532925199";

/// Map projections understood by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MapProjection {
    LatLon = 0,
    LambertConformal = 1,
    PolarStereographic = 2,
    Mercator = 3,
    RotatedLatLon = 6,
}

impl MapProjection {
    /// Get the projection from its `MAP_PROJ` code
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(MapProjection::LatLon),
            1 => Ok(MapProjection::LambertConformal),
            2 => Ok(MapProjection::PolarStereographic),
            3 => Ok(MapProjection::Mercator),
            6 => Ok(MapProjection::RotatedLatLon),
            _ => Err(DcError::UnsupportedProjection(code)),
        }
    }

    pub fn code(&self) -> i64 {
        *self as i64
    }
}

/// Format a number the way Proj strings are usually written (`-98`, `38.5`)
fn num(value: f64) -> String {
    // normalizes -0
    format!("{}", value + 0.0)
}

fn equirectangular(globals: &GlobalAttributes) -> String {
    format!(
        "+proj=eqc +lon_0={} +lat_0={}",
        num(globals.cen_lon),
        num(globals.cen_lat)
    )
}

/// Build the projection descriptor for `code`
///
/// A planetary-body suffix is always appended: a sphere of the configured
/// radius for non-Earth bodies, WGS84 otherwise.
pub fn resolve_projection(
    code: i64,
    atts: &dyn AttributeSource,
    globals: &GlobalAttributes,
) -> Result<String> {
    let mut proj = match MapProjection::from_code(code)? {
        MapProjection::LatLon => equirectangular(globals),
        MapProjection::LambertConformal => {
            let lon0 = atts.require_f64("STAND_LON")?;
            let lat1 = atts.require_f64("TRUELAT1")?;
            let lat2 = atts.require_f64("TRUELAT2")?;
            format!(
                "+proj=lcc +lon_0={} +lat_1={} +lat_2={}",
                num(lon0),
                num(lat1),
                num(lat2)
            )
        }
        MapProjection::PolarStereographic => {
            let lat_ts = atts.require_f64("TRUELAT1")?;
            let lat0 = if lat_ts < 0.0 { -90.0 } else { 90.0 };
            let lon0 = atts.require_f64("STAND_LON")?;
            format!(
                "+proj=stere +lat_0={} +lat_ts={} +lon_0={}",
                num(lat0),
                num(lat_ts),
                num(lon0)
            )
        }
        MapProjection::Mercator => {
            let lat_ts = atts.require_f64("TRUELAT1")?;
            let lon0 = atts.require_f64("STAND_LON")?;
            format!("+proj=merc +lon_0={} +lat_ts={}", num(lon0), num(lat_ts))
        }
        MapProjection::RotatedLatLon if globals.has_default_pole() => equirectangular(globals),
        MapProjection::RotatedLatLon => {
            let lon0 = atts.require_f64("STAND_LON")?;
            format!(
                "+proj=ob_tran +o_proj=eqc +to_meter={} +o_lat_p={}d +o_lon_p={}d +lon_0={}d",
                DEG_TO_METER,
                num(globals.pole_lat),
                num(180.0 - globals.pole_lon),
                num(-lon0)
            )
        }
    };

    if globals.is_planetary() {
        proj.push_str(&format!(" +ellps=sphere +a={} +es=0", num(globals.radius)));
    } else {
        proj.push_str(" +ellps=WGS84");
    }

    Ok(proj)
}
