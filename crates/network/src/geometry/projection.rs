//! WGS84 <-> UTM projection.
//!
//! All lengths and nearest-point searches run in a planar, meter-based frame.
//! Transforms go through PROJ. A PROJ handle cannot be shared across
//! threads, so each worker keeps its own pair per EPSG code.

use std::cell::RefCell;

use geo::{Coord, LineString};
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use proj::Proj;

use crate::models::types::{Result, TransitError};

const GEOGRAPHIC_CRS: &str = "EPSG:4326";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    North,
    South,
}

/// Forward and inverse transforms for one planar frame
struct Transforms {
    forward: Proj,
    inverse: Proj,
}

impl Transforms {
    fn new(epsg: u32) -> Result<Self> {
        let planar = format!("EPSG:{}", epsg);
        let create = |from: &str, to: &str| {
            Proj::new_known_crs(from, to, None).map_err(|e| {
                TransitError::InvalidData(format!(
                    "cannot build {} -> {} transform: {}",
                    from, to, e
                ))
            })
        };

        Ok(Self {
            forward: create(GEOGRAPHIC_CRS, &planar)?,
            inverse: create(&planar, GEOGRAPHIC_CRS)?,
        })
    }
}

thread_local! {
    static TRANSFORMS: RefCell<HashMap<u32, Transforms>> = RefCell::new(HashMap::new());
}

/// Transverse Mercator projection for one UTM zone.
///
/// `to_planar` takes `Coord { x: lon, y: lat }` in degrees and returns
/// `Coord { x: easting, y: northing }` in meters.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    zone: u8,
    hemisphere: Hemisphere,
}

impl Projector {
    pub fn utm(zone: u8, hemisphere: Hemisphere) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(TransitError::InvalidData(format!(
                "UTM zone must be within 1..=60, got {}",
                zone
            )));
        }

        let projector = Self { zone, hemisphere };
        // Fail here rather than on the first coordinate
        projector.with_transforms(|_| Ok(()))?;
        Ok(projector)
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    /// EPSG code of the planar frame (326xx north, 327xx south)
    pub fn epsg(&self) -> u32 {
        let base = match self.hemisphere {
            Hemisphere::North => 32600,
            Hemisphere::South => 32700,
        };
        base + u32::from(self.zone)
    }

    fn with_transforms<T>(&self, f: impl FnOnce(&Transforms) -> Result<T>) -> Result<T> {
        let epsg = self.epsg();
        TRANSFORMS.with(|cache| {
            let mut cache = cache.borrow_mut();
            let transforms = match cache.entry(epsg) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    log::debug!("Creating EPSG:{} transforms", epsg);
                    entry.insert(Transforms::new(epsg)?)
                }
            };
            f(transforms)
        })
    }

    pub fn to_planar(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        validate_geographic(coord)?;

        let (x, y) = self.with_transforms(|t| {
            t.forward
                .convert((coord.x, coord.y))
                .map_err(|_| TransitError::invalid_coordinate(coord))
        })?;

        if !x.is_finite() || !y.is_finite() {
            return Err(TransitError::invalid_coordinate(coord));
        }
        Ok(Coord { x, y })
    }

    pub fn to_geographic(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Err(TransitError::invalid_coordinate(coord));
        }

        let (x, y) = self.with_transforms(|t| {
            t.inverse
                .convert((coord.x, coord.y))
                .map_err(|_| TransitError::invalid_coordinate(coord))
        })?;

        let geographic = Coord { x, y };
        validate_geographic(geographic).map_err(|_| TransitError::invalid_coordinate(coord))?;
        Ok(geographic)
    }

    pub fn line_to_planar(&self, line: &LineString<f64>) -> Result<LineString<f64>> {
        line.0
            .iter()
            .map(|&c| self.to_planar(c))
            .collect::<Result<Vec<_>>>()
            .map(LineString::new)
    }

    pub fn line_to_geographic(&self, line: &LineString<f64>) -> Result<LineString<f64>> {
        line.0
            .iter()
            .map(|&c| self.to_geographic(c))
            .collect::<Result<Vec<_>>>()
            .map(LineString::new)
    }
}

/// Reject anything outside [-180, 180] x [-90, 90]
pub fn validate_geographic(coord: Coord<f64>) -> Result<()> {
    let in_range = (-180.0..=180.0).contains(&coord.x) && (-90.0..=90.0).contains(&coord.y);
    if in_range {
        Ok(())
    } else {
        Err(TransitError::invalid_coordinate(coord))
    }
}
