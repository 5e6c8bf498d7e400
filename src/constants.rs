//! Physical, astrodynamic and unit constants.
//!
//! Gravity-model constants for SGP4 live with the propagator
//! ([`crate::propagator::GravityModel`]) and ellipsoid constants live with the
//! frame transforms ([`crate::frames::Ellipsoid`]).

/// Earth gravitational parameter (km³/s²) (WGS-84)
pub const MU_EARTH: f64 = 398600.4418;

/// Earth equatorial radius (km) (WGS-84)
pub const R_EARTH: f64 = 6378.137;

/// Earth rotation rate (rad/s)
pub const OMEGA_EARTH: f64 = 7.2921159e-5;

/// Seconds per sidereal day
pub const SIDEREAL_DAY: f64 = 86164.0905;

/// Minutes per solar day
pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Seconds per minute
pub const SECONDS_PER_MINUTE: f64 = 60.0;

/// Scale from the propagator's native length unit (km) to meters.
///
/// Every length in this crate is in kilometers. Renderers working in meters
/// must go through this constant rather than an inline literal.
pub const METERS_PER_KILOMETER: f64 = 1000.0;

/// Julian date of J2000 (2000-01-01 12:00:00).
pub const JD_J2000: f64 = 2_451_545.0;

/// Julian date of 1949-12-31 00:00:00, the SGP4 "days since 1950" origin.
pub const JD_1950: f64 = 2_433_281.5;

/// Days per Julian century
pub const DAYS_PER_JULIAN_CENTURY: f64 = 36_525.0;

/// Orbital period (minutes) at and above which the deep-space model applies.
pub const DEEP_SPACE_PERIOD_MIN: f64 = 225.0;

/// Two pi
pub const TAU: f64 = std::f64::consts::TAU;

/// Degrees to radians
pub const DEG2RAD: f64 = std::f64::consts::PI / 180.0;

/// Radians to degrees
pub const RAD2DEG: f64 = 180.0 / std::f64::consts::PI;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_meters_per_kilometer() {
        assert_eq!(METERS_PER_KILOMETER, 1000.0);
        assert_relative_eq!(6378.137 * METERS_PER_KILOMETER, 6_378_137.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sidereal_day_matches_rotation_rate() {
        assert_relative_eq!(TAU / OMEGA_EARTH, SIDEREAL_DAY, epsilon = 0.01);
    }

    #[test]
    fn test_epoch_offsets() {
        // J2000 is 18263.5 days after the 1950 origin
        assert_relative_eq!(JD_J2000 - JD_1950, 18_263.5, epsilon = 1e-9);
    }
}
