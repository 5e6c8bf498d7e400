//! Sensor footprint geometry.
//!
//! A nadir-pointing sensor with full-angle field of view `fov` at altitude `h`
//! sees a circle of radius `h·tan(fov/2)` on the tangent plane below it. The
//! tangent-plane model ignores Earth curvature, so it underestimates the true
//! footprint at wide fields of view or altitudes comparable to the Earth radius.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;
use crate::frames::{earth_fixed_to_geodetic, geodetic_to_earth_fixed, EarthFixed, Ellipsoid, FrameError, Geodetic};

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FootprintError {
    #[error("Field of view must be finite and within (0, 180) degrees, got {0}")]
    InvalidFieldOfView(f64),

    #[error("Altitude must be finite and positive, got {0} km")]
    InvalidAltitude(f64),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Circular ground footprint of a nadir-pointing sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Sensor altitude above the surface (km)
    pub altitude_km: f64,
    /// Half of the full field of view (rad)
    pub half_angle: f64,
    /// Footprint radius (km)
    pub radius_km: f64,
    /// Footprint area (km²)
    pub area_km2: f64,
}

impl Footprint {
    pub fn new(altitude_km: f64, full_fov_deg: f64) -> Result<Self, FootprintError> {
        let half_angle = half_angle(full_fov_deg)?;
        if !altitude_km.is_finite() || altitude_km <= 0.0 {
            return Err(FootprintError::InvalidAltitude(altitude_km));
        }
        let radius_km = altitude_km * half_angle.tan();
        let area_km2 = std::f64::consts::PI * radius_km * radius_km;
        if !area_km2.is_finite() {
            return Err(FootprintError::InvalidAltitude(altitude_km));
        }
        Ok(Footprint {
            altitude_km,
            half_angle,
            radius_km,
            area_km2,
        })
    }
}

/// Footprint area (km²) for a sensor at `altitude_km` with full field of view
/// `full_fov_deg`.
pub fn footprint_area(altitude_km: f64, full_fov_deg: f64) -> Result<f64, FootprintError> {
    Footprint::new(altitude_km, full_fov_deg).map(|f| f.area_km2)
}

/// Footprint radius (km).
pub fn footprint_radius(altitude_km: f64, full_fov_deg: f64) -> Result<f64, FootprintError> {
    Footprint::new(altitude_km, full_fov_deg).map(|f| f.radius_km)
}

fn half_angle(full_fov_deg: f64) -> Result<f64, FootprintError> {
    if !full_fov_deg.is_finite() || full_fov_deg <= 0.0 || full_fov_deg >= 180.0 {
        return Err(FootprintError::InvalidFieldOfView(full_fov_deg));
    }
    Ok(0.5 * full_fov_deg * DEG2RAD)
}

/// Cone from a sensor down to its ground footprint, for visualization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorCone {
    /// Sensor position (km, Earth-fixed)
    pub apex: EarthFixed,
    /// Unit vector along the local vertical, pointing down
    pub axis: [f64; 3],
    /// Sub-sensor point on the ellipsoid (km, Earth-fixed)
    pub nadir: EarthFixed,
    pub footprint: Footprint,
}

impl SensorCone {
    /// Build the cone for a sensor at any Earth-fixed position, propagated or
    /// externally supplied. Altitude is the geodetic height.
    pub fn from_earth_fixed(
        position: &EarthFixed,
        full_fov_deg: f64,
        ellipsoid: &Ellipsoid,
    ) -> Result<Self, FootprintError> {
        let geodetic = earth_fixed_to_geodetic(position, ellipsoid)?;
        let footprint = Footprint::new(geodetic.height, full_fov_deg)?;

        let (sin_lat, cos_lat) = geodetic.latitude.sin_cos();
        let (sin_lon, cos_lon) = geodetic.longitude.sin_cos();
        let axis = [-cos_lat * cos_lon, -cos_lat * sin_lon, -sin_lat];
        let nadir = geodetic_to_earth_fixed(
            &Geodetic::new(geodetic.latitude, geodetic.longitude, 0.0),
            ellipsoid,
        );

        Ok(SensorCone {
            apex: *position,
            axis,
            nadir,
            footprint,
        })
    }

    /// Half-angle of the cone (rad).
    pub fn half_angle(&self) -> f64 {
        self.footprint.half_angle
    }

    /// Radius of the cone base (km).
    pub fn radius_km(&self) -> f64 {
        self.footprint.radius_km
    }

    /// Length from apex to base along the axis (km).
    pub fn height_km(&self) -> f64 {
        self.footprint.altitude_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_reference_footprint() {
        let f = Footprint::new(500.0, 45.0).unwrap();
        let expected_radius = 500.0 * (22.5 * DEG2RAD).tan();
        assert_relative_eq!(f.radius_km, expected_radius, epsilon = 1e-9);
        assert_relative_eq!(f.radius_km, 207.106_781, epsilon = 1e-5);
        assert_relative_eq!(
            footprint_area(500.0, 45.0).unwrap(),
            std::f64::consts::PI * expected_radius * expected_radius,
            epsilon = 1e-6
        );
        assert!((footprint_area(500.0, 45.0).unwrap() - 1.3475e5).abs() < 10.0);
    }

    #[test]
    fn test_monotonic() {
        let mut last = 0.0;
        for alt in [100.0, 200.0, 500.0, 1000.0, 36_000.0] {
            let a = footprint_area(alt, 30.0).unwrap();
            assert!(a > last);
            last = a;
        }
        let mut last = 0.0;
        for fov in [1.0, 10.0, 45.0, 90.0, 170.0, 179.9] {
            let a = footprint_area(700.0, fov).unwrap();
            assert!(a > last);
            last = a;
        }
    }

    #[test]
    fn test_invalid_inputs() {
        for fov in [0.0, -10.0, 180.0, 200.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                footprint_area(500.0, fov),
                Err(FootprintError::InvalidFieldOfView(_))
            ));
        }
        for alt in [0.0, -1.0, f64::NAN, f64::NEG_INFINITY] {
            assert!(matches!(
                footprint_area(alt, 45.0),
                Err(FootprintError::InvalidAltitude(_))
            ));
        }
        assert_relative_eq!(footprint_radius(1000.0, 90.0).unwrap(), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_overflowing_area_rejected() {
        assert_eq!(
            Footprint::new(1e300, 179.0),
            Err(FootprintError::InvalidAltitude(1e300))
        );
        assert!(matches!(
            footprint_area(1e200, 45.0),
            Err(FootprintError::InvalidAltitude(_))
        ));
        assert!(footprint_area(1e100, 45.0).unwrap().is_finite());
    }

    #[test]
    fn test_sensor_cone_over_equator() {
        let wgs84 = Ellipsoid::WGS84;
        let apex = EarthFixed::new(wgs84.a + 500.0, 0.0, 0.0);
        let cone = SensorCone::from_earth_fixed(&apex, 45.0, &wgs84).unwrap();
        assert_relative_eq!(cone.axis[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cone.axis[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cone.axis[2], 0.0, epsilon = 1e-12);
        assert_relative_eq!(cone.height_km(), 500.0, epsilon = 1e-9);
        assert_relative_eq!(cone.nadir.x, wgs84.a, epsilon = 1e-9);
        assert_relative_eq!(cone.radius_km(), footprint_radius(500.0, 45.0).unwrap(), epsilon = 1e-9);
        assert_relative_eq!(cone.half_angle(), 22.5 * DEG2RAD, epsilon = 1e-15);
    }

    #[test]
    fn test_sensor_cone_axis_is_unit_and_reaches_nadir() {
        let wgs84 = Ellipsoid::WGS84;
        let apex = geodetic_to_earth_fixed(&Geodetic::from_degrees(52.0, -1.5, 650.0), &wgs84);
        let cone = SensorCone::from_earth_fixed(&apex, 20.0, &wgs84).unwrap();
        let norm = cone.axis.iter().map(|c| c * c).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);

        // apex + height * axis lands on the nadir point
        let tip = [
            apex.x + cone.height_km() * cone.axis[0],
            apex.y + cone.height_km() * cone.axis[1],
            apex.z + cone.height_km() * cone.axis[2],
        ];
        assert_abs_diff_eq!(tip[0], cone.nadir.x, epsilon = 1e-6);
        assert_abs_diff_eq!(tip[1], cone.nadir.y, epsilon = 1e-6);
        assert_abs_diff_eq!(tip[2], cone.nadir.z, epsilon = 1e-6);
    }

    #[test]
    fn test_sensor_cone_below_surface() {
        let wgs84 = Ellipsoid::WGS84;
        let inside = EarthFixed::new(6000.0, 0.0, 0.0);
        assert!(matches!(
            SensorCone::from_earth_fixed(&inside, 45.0, &wgs84),
            Err(FootprintError::InvalidAltitude(_))
        ));
        assert!(matches!(
            SensorCone::from_earth_fixed(&EarthFixed::new(0.0, 0.0, 0.0), 45.0, &wgs84),
            Err(FootprintError::Frame(FrameError::DegenerateFrameInput { .. }))
        ));
    }
}
