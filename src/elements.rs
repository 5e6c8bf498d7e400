//! The orbital element record and angle helpers.
//!
//! [`OrbitalElements`] is what the element-set parser produces and what the
//! propagator consumes. Angles are stored in radians and mean motion in
//! radians per minute, so no unit conversion happens after parsing.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::time::Epoch;

/// Mean orbital elements at epoch, as fitted for the SGP4/SDP4 model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElements {
    /// Satellite name (from line 0, if present).
    pub name: Option<String>,
    /// NORAD catalog number.
    pub norad_id: u32,
    /// Classification (U=unclassified, C=classified, S=secret).
    pub classification: char,
    /// International designator (launch year, launch number, piece).
    pub intl_designator: String,
    /// Epoch of the elements.
    pub epoch: Epoch,
    /// First derivative of mean motion divided by two (rad/min²).
    pub mean_motion_dot: f64,
    /// Second derivative of mean motion divided by six (rad/min³).
    pub mean_motion_ddot: f64,
    /// B* drag term (1/Earth radii).
    pub bstar: f64,
    /// Ephemeris type (usually 0).
    pub ephemeris_type: u8,
    /// Element set number.
    pub element_set: u16,
    /// Inclination (rad)
    pub inclination: f64,
    /// Right ascension of ascending node (rad)
    pub raan: f64,
    /// Eccentricity (dimensionless)
    pub eccentricity: f64,
    /// Argument of perigee (rad)
    pub arg_perigee: f64,
    /// Mean anomaly (rad)
    pub mean_anomaly: f64,
    /// Kozai mean motion (rad/min)
    pub mean_motion: f64,
    /// Revolution number at epoch.
    pub rev_number: u32,
}

impl OrbitalElements {
    /// Mean motion in revolutions per day.
    pub fn mean_motion_rev_day(&self) -> f64 {
        self.mean_motion * MINUTES_PER_DAY / TAU
    }

    /// Orbital period (minutes), from the Kozai mean motion.
    pub fn period_minutes(&self) -> f64 {
        TAU / self.mean_motion
    }

    /// Semi-major axis (km) from Kepler's third law.
    ///
    /// Approximate: ignores the J2 correction the propagator applies.
    pub fn semi_major_axis(&self) -> f64 {
        let n_rad_s = self.mean_motion / SECONDS_PER_MINUTE;
        (MU_EARTH / n_rad_s.powi(2)).powf(1.0 / 3.0)
    }

    /// Perigee altitude above the equatorial radius (km).
    pub fn perigee_altitude(&self) -> f64 {
        self.semi_major_axis() * (1.0 - self.eccentricity) - R_EARTH
    }

    /// Apogee altitude above the equatorial radius (km).
    pub fn apogee_altitude(&self) -> f64 {
        self.semi_major_axis() * (1.0 + self.eccentricity) - R_EARTH
    }

    pub fn inclination_deg(&self) -> f64 {
        self.inclination * RAD2DEG
    }

    pub fn raan_deg(&self) -> f64 {
        self.raan * RAD2DEG
    }

    pub fn arg_perigee_deg(&self) -> f64 {
        self.arg_perigee * RAD2DEG
    }

    pub fn mean_anomaly_deg(&self) -> f64 {
        self.mean_anomaly * RAD2DEG
    }
}

impl std::fmt::Display for OrbitalElements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (NORAD {}) @ {}: {:.1}x{:.1} km, {:.1}° inc, {:.4} ecc, {:.4} rev/day",
            self.name.as_deref().unwrap_or("UNKNOWN"),
            self.norad_id,
            self.epoch,
            self.perigee_altitude(),
            self.apogee_altitude(),
            self.inclination_deg(),
            self.eccentricity,
            self.mean_motion_rev_day(),
        )
    }
}

/// Normalize angle to [0, 2π).
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle % TAU;
    if a < 0.0 { a + TAU } else { a }
}

/// Normalize angle to [-π, π).
pub fn normalize_angle_pm(angle: f64) -> f64 {
    let a = normalize_angle(angle);
    if a >= std::f64::consts::PI { a - TAU } else { a }
}
