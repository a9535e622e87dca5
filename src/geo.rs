//! # Geographic Boxes
//!
//! Bounding boxes are always expressed in decimal degrees with longitudes in
//! [-180, 180]. Most CMIP6 grids store longitude in [0, 360), so the bounds are
//! translated to the dataset's convention before coordinates are selected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BoxViolation, ConfigError};

/// Longitude range convention of a dataset's coordinate variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LongitudeConvention {
    /// Values in [-180, 180]
    Signed,
    /// Values in [0, 360)
    Positive,
}

impl LongitudeConvention {
    /// Classifies a longitude coordinate array. Any value beyond 180 means [0, 360).
    pub fn detect(values: &[f64]) -> Self {
        if values.iter().any(|&v| v > 180.0) {
            LongitudeConvention::Positive
        } else {
            LongitudeConvention::Signed
        }
    }
}

impl fmt::Display for LongitudeConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LongitudeConvention::Signed => f.write_str("[-180, 180]"),
            LongitudeConvention::Positive => f.write_str("[0, 360)"),
        }
    }
}

/// Rectangular selection in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub lon_west: f64,
    pub lon_east: f64,
    pub lat_south: f64,
    pub lat_north: f64,
}

impl GeoBox {
    pub fn new(lon_west: f64, lon_east: f64, lat_south: f64, lat_north: f64) -> Self {
        GeoBox {
            lon_west,
            lon_east,
            lat_south,
            lat_north,
        }
    }

    /// Checks the box, reporting every violated bound at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        if self.lon_west >= self.lon_east {
            violations.push(BoxViolation::Longitude {
                west: self.lon_west,
                east: self.lon_east,
            });
        }
        if self.lat_south >= self.lat_north {
            violations.push(BoxViolation::Latitude {
                south: self.lat_south,
                north: self.lat_north,
            });
        }
        for lon in [self.lon_west, self.lon_east] {
            if !(-180.0..=180.0).contains(&lon) {
                violations.push(BoxViolation::LongitudeOutOfRange(lon));
            }
        }
        for lat in [self.lat_south, self.lat_north] {
            if !(-90.0..=90.0).contains(&lat) {
                violations.push(BoxViolation::LatitudeOutOfRange(lat));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidRegion(violations))
        }
    }

    /// Longitude bounds expressed in the dataset's convention.
    ///
    /// For [0, 360) grids a box starting west of Greenwich is shifted by 360 on
    /// both bounds, keeping west < east.
    pub fn lon_bounds(&self, convention: LongitudeConvention) -> (f64, f64) {
        match convention {
            LongitudeConvention::Positive if self.lon_west < 0.0 => {
                (self.lon_west + 360.0, self.lon_east + 360.0)
            }
            _ => (self.lon_west, self.lon_east),
        }
    }

    pub fn lat_bounds(&self) -> (f64, f64) {
        (self.lat_south, self.lat_north)
    }
}

/// Hemisphere letter for a coordinate, empty on the equator / prime meridian.
fn hemisphere(value: f64, negative: &'static str, positive: &'static str) -> &'static str {
    if value == 0.0 {
        ""
    } else if value < 0.0 {
        negative
    } else {
        positive
    }
}

impl fmt::Display for GeoBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "longitude {}{} to {}{}, latitude {}{} to {}{}",
            self.lon_west.abs(),
            hemisphere(self.lon_west, "W", "E"),
            self.lon_east.abs(),
            hemisphere(self.lon_east, "W", "E"),
            self.lat_south.abs(),
            hemisphere(self.lat_south, "S", "N"),
            self.lat_north.abs(),
            hemisphere(self.lat_north, "S", "N"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latinoamerica() -> GeoBox {
        GeoBox::new(-90.0, -30.0, -60.0, 20.0)
    }

    #[test]
    fn test_valid_box() {
        assert!(latinoamerica().validate().is_ok());
    }

    #[test]
    fn test_degenerate_box_rejected() {
        assert!(GeoBox::new(-30.0, -30.0, -60.0, 20.0).validate().is_err());
        assert!(GeoBox::new(-90.0, -30.0, 20.0, 20.0).validate().is_err());
    }

    #[test]
    fn test_both_axes_reported() {
        match GeoBox::new(10.0, -10.0, 5.0, -5.0).validate() {
            Err(ConfigError::InvalidRegion(violations)) => {
                assert_eq!(violations.len(), 2);
                assert!(matches!(violations[0], BoxViolation::Longitude { .. }));
                assert!(matches!(violations[1], BoxViolation::Latitude { .. }));
            }
            other => panic!("expected InvalidRegion, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        assert!(GeoBox::new(190.0, 200.0, 0.0, 10.0).validate().is_err());
        assert!(GeoBox::new(0.0, 10.0, -95.0, 10.0).validate().is_err());
    }

    #[test]
    fn test_convention_detection() {
        assert_eq!(
            LongitudeConvention::detect(&[0.0, 90.0, 180.0, 270.0, 359.0]),
            LongitudeConvention::Positive
        );
        assert_eq!(
            LongitudeConvention::detect(&[-179.5, 0.0, 179.5]),
            LongitudeConvention::Signed
        );
    }

    #[test]
    fn test_lon_translation_for_positive_grids() {
        assert_eq!(
            latinoamerica().lon_bounds(LongitudeConvention::Positive),
            (270.0, 330.0)
        );
        assert_eq!(
            latinoamerica().lon_bounds(LongitudeConvention::Signed),
            (-90.0, -30.0)
        );
        // Eastern boxes are already valid in [0, 360)
        let asia = GeoBox::new(60.0, 150.0, -10.0, 50.0);
        assert_eq!(asia.lon_bounds(LongitudeConvention::Positive), (60.0, 150.0));
    }

    #[test]
    fn test_latitude_untouched() {
        assert_eq!(latinoamerica().lat_bounds(), (-60.0, 20.0));
    }

    #[test]
    fn test_display_uses_hemisphere_letters() {
        assert_eq!(
            latinoamerica().to_string(),
            "longitude 90W to 30W, latitude 60S to 20N"
        );
        assert_eq!(
            GeoBox::new(0.0, 45.5, -10.0, 0.0).to_string(),
            "longitude 0 to 45.5E, latitude 10S to 0"
        );
    }
}
