//! Reference frame transforms: inertial (TEME) ↔ Earth-fixed ↔ geodetic.
//!
//! The inertial-to-Earth-fixed step is a rotation about the z axis by the
//! Greenwich mean sidereal angle (TEME → pseudo-Earth-fixed). Polar motion is
//! neglected. All lengths are kilometers.
//!
//! # Example
//! ```
//! use groundtrack::frames::{geodetic_to_earth_fixed, earth_fixed_to_geodetic, Ellipsoid, Geodetic};
//!
//! let site = Geodetic::from_degrees(48.85, 2.35, 0.035);
//! let ecef = geodetic_to_earth_fixed(&site, &Ellipsoid::WGS84);
//! let back = earth_fixed_to_geodetic(&ecef, &Ellipsoid::WGS84).unwrap();
//! assert!((back.height - site.height).abs() < 1e-6);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::constants::*;
use crate::elements::normalize_angle_pm;
use crate::propagator::InertialState;
use crate::time::Epoch;

/// Positions closer than this to the Earth's center have no usable frame.
pub const MIN_FRAME_RADIUS_KM: f64 = 1.0e-3;

/// Geodetic latitude iteration cap and convergence tolerance (rad).
const GEODETIC_MAX_ITERATIONS: usize = 20;
const GEODETIC_TOLERANCE: f64 = 1.0e-14;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FrameError {
    #[error("Position radius {radius_km} km is below {MIN_FRAME_RADIUS_KM} km; frame is undefined")]
    DegenerateFrameInput { radius_km: f64 },

    #[error("Position has a non-finite component")]
    NonFinite,
}

// ── Ellipsoid ──

/// Reference ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Equatorial radius (km)
    pub a: f64,
    /// Flattening
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: 6378.137,
        f: 1.0 / 298.257_223_563,
    };

    pub const WGS72: Ellipsoid = Ellipsoid {
        a: 6378.135,
        f: 1.0 / 298.26,
    };

    /// Polar radius (km).
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// Prime vertical radius of curvature at a geodetic latitude (km).
    fn prime_vertical_radius(&self, sin_lat: f64) -> f64 {
        self.a / (1.0 - self.e2() * sin_lat * sin_lat).sqrt()
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Ellipsoid::WGS84
    }
}

// ── Positions ──

/// Earth-centered, Earth-fixed Cartesian position (km).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarthFixed {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EarthFixed {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        EarthFixed { x, y, z }
    }

    /// Distance from the Earth's center (km).
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Components in meters, for renderers that work in SI units.
    pub fn to_meters(&self) -> [f64; 3] {
        [
            self.x * METERS_PER_KILOMETER,
            self.y * METERS_PER_KILOMETER,
            self.z * METERS_PER_KILOMETER,
        ]
    }

    fn check(&self) -> Result<(), FrameError> {
        if !(self.x.is_finite() && self.y.is_finite() && self.z.is_finite()) {
            return Err(FrameError::NonFinite);
        }
        let radius_km = self.norm();
        if radius_km < MIN_FRAME_RADIUS_KM {
            return Err(FrameError::DegenerateFrameInput { radius_km });
        }
        Ok(())
    }
}

impl From<[f64; 3]> for EarthFixed {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

/// Geodetic position. Latitude in [-π/2, π/2], longitude in [-π, π),
/// height above the ellipsoid in km.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geodetic {
    /// Geodetic latitude (rad)
    pub latitude: f64,
    /// Longitude, east positive (rad)
    pub longitude: f64,
    /// Height above the ellipsoid (km)
    pub height: f64,
}

impl Geodetic {
    pub fn new(latitude: f64, longitude: f64, height: f64) -> Self {
        Geodetic {
            latitude,
            longitude,
            height,
        }
    }

    pub fn from_degrees(latitude_deg: f64, longitude_deg: f64, height: f64) -> Self {
        Self::new(latitude_deg * DEG2RAD, longitude_deg * DEG2RAD, height)
    }

    pub fn latitude_deg(&self) -> f64 {
        self.latitude * RAD2DEG
    }

    pub fn longitude_deg(&self) -> f64 {
        self.longitude * RAD2DEG
    }

    /// Height above the ellipsoid in meters.
    pub fn height_m(&self) -> f64 {
        self.height * METERS_PER_KILOMETER
    }
}

/// Position and velocity in the Earth-fixed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarthFixedState {
    pub position: EarthFixed,
    /// Velocity relative to the rotating Earth (km/s)
    pub velocity: [f64; 3],
    pub epoch: Epoch,
}

// ── Inertial ↔ Earth-fixed ──

fn rotate_z(v: [f64; 3], angle: f64) -> [f64; 3] {
    let (sin_theta, cos_theta) = angle.sin_cos();
    [
        cos_theta * v[0] + sin_theta * v[1],
        -sin_theta * v[0] + cos_theta * v[1],
        v[2],
    ]
}

/// Rotate an inertial (TEME) position into the Earth-fixed frame.
pub fn inertial_to_earth_fixed(position: [f64; 3], epoch: Epoch) -> EarthFixed {
    rotate_z(position, epoch.sidereal_angle()).into()
}

/// Rotate an Earth-fixed position into the inertial (TEME) frame.
pub fn earth_fixed_to_inertial(position: &EarthFixed, epoch: Epoch) -> [f64; 3] {
    rotate_z(position.to_array(), -epoch.sidereal_angle())
}

/// Transform position and velocity. The velocity is relative to the rotating
/// frame, so it includes the ω × r term.
pub fn inertial_state_to_earth_fixed(state: &InertialState) -> EarthFixedState {
    let theta = state.epoch.sidereal_angle();
    let r = rotate_z(state.r, theta);
    let v = rotate_z(state.v, theta);
    EarthFixedState {
        position: r.into(),
        velocity: [v[0] + OMEGA_EARTH * r[1], v[1] - OMEGA_EARTH * r[0], v[2]],
        epoch: state.epoch,
    }
}

// ── Earth-fixed ↔ geodetic ──

/// Invert an Earth-fixed position to geodetic coordinates.
///
/// Fixed-point iteration on latitude, capped at a fixed number of steps.
pub fn earth_fixed_to_geodetic(position: &EarthFixed, ellipsoid: &Ellipsoid) -> Result<Geodetic, FrameError> {
    position.check()?;

    let EarthFixed { x, y, z } = *position;
    let e2 = ellipsoid.e2();
    let p = (x * x + y * y).sqrt();
    let longitude = normalize_angle_pm(y.atan2(x));

    let mut lat = z.atan2(p * (1.0 - e2));
    let mut converged = false;
    for _ in 0..GEODETIC_MAX_ITERATIONS {
        let n = ellipsoid.prime_vertical_radius(lat.sin());
        let next = (z + e2 * n * lat.sin()).atan2(p);
        let delta = (next - lat).abs();
        lat = next;
        if delta < GEODETIC_TOLERANCE {
            converged = true;
            break;
        }
    }
    if !converged {
        trace!(x, y, z, "geodetic latitude hit the iteration cap");
    }

    let (sin_lat, cos_lat) = lat.sin_cos();
    let n = ellipsoid.prime_vertical_radius(sin_lat);
    // Divide by whichever of cos/sin is larger
    let height = if lat.abs() < std::f64::consts::FRAC_PI_4 {
        p / cos_lat - n
    } else {
        z / sin_lat - n * (1.0 - e2)
    };

    Ok(Geodetic {
        latitude: lat,
        longitude,
        height,
    })
}

/// Geodetic coordinates to an Earth-fixed position (closed form).
pub fn geodetic_to_earth_fixed(geodetic: &Geodetic, ellipsoid: &Ellipsoid) -> EarthFixed {
    let (sin_lat, cos_lat) = geodetic.latitude.sin_cos();
    let (sin_lon, cos_lon) = geodetic.longitude.sin_cos();
    let n = ellipsoid.prime_vertical_radius(sin_lat);
    let h = geodetic.height;
    EarthFixed {
        x: (n + h) * cos_lat * cos_lon,
        y: (n + h) * cos_lat * sin_lon,
        z: (n * (1.0 - ellipsoid.e2()) + h) * sin_lat,
    }
}

// ── Inertial ↔ geodetic ──

pub fn inertial_to_geodetic(position: [f64; 3], epoch: Epoch, ellipsoid: &Ellipsoid) -> Result<Geodetic, FrameError> {
    earth_fixed_to_geodetic(&inertial_to_earth_fixed(position, epoch), ellipsoid)
}

pub fn geodetic_to_inertial(geodetic: &Geodetic, epoch: Epoch, ellipsoid: &Ellipsoid) -> [f64; 3] {
    earth_fixed_to_inertial(&geodetic_to_earth_fixed(geodetic, ellipsoid), epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::{FRAC_PI_2, PI};

    fn distance(a: &EarthFixed, b: &EarthFixed) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2) + (a.z - b.z).powi(2)).sqrt()
    }

    #[test]
    fn test_equator_prime_meridian() {
        let g = earth_fixed_to_geodetic(&EarthFixed::new(6378.137, 0.0, 0.0), &Ellipsoid::WGS84).unwrap();
        assert_abs_diff_eq!(g.latitude, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(g.longitude, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(g.height, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_north_pole() {
        let wgs84 = Ellipsoid::WGS84;
        let g = earth_fixed_to_geodetic(&EarthFixed::new(0.0, 0.0, wgs84.b() + 10.0), &wgs84).unwrap();
        assert_relative_eq!(g.latitude, FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(g.height, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_geodetic_round_trip() {
        let wgs84 = Ellipsoid::WGS84;
        let cases = [
            (0.0, 0.0, 0.0),
            (51.6, -120.0, 420.0),
            (-33.9, 151.2, 0.05),
            (89.999, 45.0, 800.0),
            (-89.5, -179.9, 35_786.0),
            (10.0, 179.99, -5.0),
        ];
        for (lat, lon, h) in cases {
            let g = Geodetic::from_degrees(lat, lon, h);
            let ecef = geodetic_to_earth_fixed(&g, &wgs84);
            let back = earth_fixed_to_geodetic(&ecef, &wgs84).unwrap();
            assert_abs_diff_eq!(back.latitude, g.latitude, epsilon = 1e-9);
            assert_abs_diff_eq!(back.longitude, g.longitude, epsilon = 1e-9);
            assert_abs_diff_eq!(back.height, g.height, epsilon = 1e-3);

            // And back again to Cartesian within a meter
            let again = geodetic_to_earth_fixed(&back, &wgs84);
            assert!(distance(&again, &ecef) < 1e-3);
        }
    }

    #[test]
    fn test_longitude_range() {
        let wgs84 = Ellipsoid::WGS84;
        for y in [0.0, -0.0] {
            let g = earth_fixed_to_geodetic(&EarthFixed::new(-7000.0, y, 0.0), &wgs84).unwrap();
            assert_relative_eq!(g.longitude, -PI, epsilon = 1e-15);
        }
        let g = earth_fixed_to_geodetic(&EarthFixed::new(0.0, -7000.0, 0.0), &wgs84).unwrap();
        assert_relative_eq!(g.longitude_deg(), -90.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_and_non_finite() {
        let wgs84 = Ellipsoid::WGS84;
        assert_eq!(
            earth_fixed_to_geodetic(&EarthFixed::new(0.0, 0.0, 0.0), &wgs84),
            Err(FrameError::DegenerateFrameInput { radius_km: 0.0 })
        );
        assert!(matches!(
            earth_fixed_to_geodetic(&EarthFixed::new(1e-4, 0.0, 0.0), &wgs84),
            Err(FrameError::DegenerateFrameInput { .. })
        ));
        assert_eq!(
            earth_fixed_to_geodetic(&EarthFixed::new(f64::NAN, 0.0, 7000.0), &wgs84),
            Err(FrameError::NonFinite)
        );
        assert_eq!(
            inertial_to_geodetic([f64::INFINITY, 0.0, 0.0], Epoch::J2000, &wgs84),
            Err(FrameError::NonFinite)
        );
    }

    #[test]
    fn test_inertial_rotation_round_trip() {
        let t = Epoch::from_utc(2024, 7, 4, 3, 21, 9.5);
        let r = [-4500.0, 3200.0, 4100.0];
        let ecef = inertial_to_earth_fixed(r, t);
        assert_relative_eq!(ecef.norm(), (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt(), epsilon = 1e-9);
        assert_eq!(ecef.z, r[2]);
        let back = earth_fixed_to_inertial(&ecef, t);
        for k in 0..3 {
            assert_abs_diff_eq!(back[k], r[k], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rotation_direction() {
        // With zero sidereal angle offset the x axes coincide; a quarter turn later
        // the inertial x axis appears at -90° longitude
        let t0 = Epoch::J2000;
        let theta = t0.sidereal_angle();
        let r = [7000.0 * theta.cos(), 7000.0 * theta.sin(), 0.0];
        let ecef = inertial_to_earth_fixed(r, t0);
        assert_abs_diff_eq!(ecef.x, 7000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ecef.y, 0.0, epsilon = 1e-9);

        let later = t0.add_seconds(SIDEREAL_DAY / 4.0);
        let g = inertial_to_geodetic(r, later, &Ellipsoid::WGS84).unwrap();
        assert_abs_diff_eq!(g.longitude_deg(), -90.0, epsilon = 1e-3);
    }

    #[test]
    fn test_velocity_includes_earth_rotation() {
        // A point fixed on the rotating equator moves at ω × r inertially
        let t = Epoch::from_utc(2024, 1, 1, 0, 0, 0.0);
        let ground = EarthFixed::new(6378.137, 0.0, 0.0);
        let r = earth_fixed_to_inertial(&ground, t);
        let v = [-OMEGA_EARTH * r[1], OMEGA_EARTH * r[0], 0.0];
        let state = InertialState { r, v, epoch: t };

        let fixed = inertial_state_to_earth_fixed(&state);
        assert!(distance(&fixed.position, &ground) < 1e-9);
        for k in 0..3 {
            assert_abs_diff_eq!(fixed.velocity[k], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_units() {
        let p = EarthFixed::new(1.0, -2.5, 6378.0);
        assert_eq!(p.to_meters(), [1000.0, -2500.0, 6_378_000.0]);
        assert_relative_eq!(Geodetic::new(0.0, 0.0, 0.42).height_m(), 420.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ellipsoids() {
        assert_eq!(Ellipsoid::default(), Ellipsoid::WGS84);
        assert_relative_eq!(Ellipsoid::WGS84.b(), 6356.752314245, epsilon = 1e-6);
        assert_relative_eq!(Ellipsoid::WGS84.e2(), 0.00669437999014, epsilon = 1e-12);

        // Same point, different ellipsoids: heights differ by about the radius offset
        let p = EarthFixed::new(6378.137 + 400.0, 0.0, 0.0);
        let h84 = earth_fixed_to_geodetic(&p, &Ellipsoid::WGS84).unwrap().height;
        let h72 = earth_fixed_to_geodetic(&p, &Ellipsoid::WGS72).unwrap().height;
        assert_abs_diff_eq!(h72 - h84, 0.002, epsilon = 1e-9);
    }
}
