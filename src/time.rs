//! Time system: continuous instants, calendar interop and the sidereal angle.
//!
//! An [`Epoch`] is a count of nanoseconds since J2000 (2000-01-01T12:00:00)
//! on a continuous UTC scale. Leap seconds are not inserted: element sets are
//! fitted against UTC and the sidereal angle is evaluated with UT1 ≈ UTC, so a
//! continuous count keeps propagation and Earth rotation consistent.
//!
//! # Example
//! ```
//! use groundtrack::time::Epoch;
//!
//! let t0 = Epoch::from_utc(2024, 6, 15, 12, 0, 0.0);
//! let t1 = t0.add_seconds(90.0);
//! assert!((t1 - t0 - 90.0).abs() < 1e-9);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::elements::normalize_angle;

const NANOS_PER_SEC: i128 = 1_000_000_000;
const SECS_PER_DAY: i128 = 86_400;
const NANOS_PER_DAY: i128 = SECS_PER_DAY * NANOS_PER_SEC;

/// 2000-01-01T12:00:00Z as Unix seconds.
const J2000_UNIX_SECS: i128 = 946_728_000;

/// An absolute instant, stored as nanoseconds since J2000 (continuous UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Epoch {
    ns: i128,
}

impl Epoch {
    /// 2000-01-01T12:00:00 UTC.
    pub const J2000: Epoch = Epoch { ns: 0 };

    // ── Constructors ──────────────────────────────────────────────

    /// Create an Epoch from raw nanoseconds since J2000.
    pub const fn from_ns(ns: i128) -> Self {
        Self { ns }
    }

    /// Create an Epoch from seconds since J2000.
    pub fn from_seconds_since_j2000(secs: f64) -> Self {
        Self::J2000.add_seconds(secs)
    }

    /// The current instant according to the system clock.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Create an Epoch from a chrono UTC timestamp.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let unix_ns = dt.timestamp() as i128 * NANOS_PER_SEC + dt.timestamp_subsec_nanos() as i128;
        Self {
            ns: unix_ns - J2000_UNIX_SECS * NANOS_PER_SEC,
        }
    }

    /// Create an Epoch from UTC calendar parts.
    ///
    /// Out-of-range parts are not rejected; they roll over arithmetically
    /// (hour 24 is midnight of the next day).
    pub fn from_utc(year: i32, month: u8, day: u8, hour: u8, min: u8, sec: f64) -> Self {
        let days_since_j2000 = calendar_to_j2000_days(year, month, day);
        let time_of_day_ns = (hour as i128) * 3_600 * NANOS_PER_SEC
            + (min as i128) * 60 * NANOS_PER_SEC
            + (sec * NANOS_PER_SEC as f64).round() as i128;

        // Calendar days are counted noon to noon from J2000
        let ns = days_since_j2000 * NANOS_PER_DAY - NANOS_PER_DAY / 2 + time_of_day_ns;
        Self { ns }
    }

    /// Create an Epoch from the element-set epoch encoding.
    ///
    /// `year` is the full four-digit year; `day_of_year` is fractional with
    /// 1.0 meaning January 1 at 00:00.
    pub fn from_tle_epoch(year: i32, day_of_year: f64) -> Self {
        let jan1_midnight = calendar_to_j2000_days(year, 1, 1) * NANOS_PER_DAY - NANOS_PER_DAY / 2;
        let whole = day_of_year.floor();
        let frac = day_of_year - whole;
        let ns = jan1_midnight
            + (whole as i128 - 1) * NANOS_PER_DAY
            + (frac * NANOS_PER_DAY as f64).round() as i128;
        Self { ns }
    }

    // ── Accessors ─────────────────────────────────────────────────

    /// Raw nanoseconds since J2000.
    pub const fn as_ns(&self) -> i128 {
        self.ns
    }

    /// Seconds since J2000.
    pub fn seconds_since_j2000(&self) -> f64 {
        self.ns as f64 / NANOS_PER_SEC as f64
    }

    /// Fractional days since J2000.
    pub fn days_since_j2000(&self) -> f64 {
        let whole = self.ns.div_euclid(NANOS_PER_DAY);
        let rem = self.ns.rem_euclid(NANOS_PER_DAY);
        whole as f64 + rem as f64 / NANOS_PER_DAY as f64
    }

    /// Fractional days since 1949-12-31 00:00, the origin SGP4 uses.
    pub fn days_since_1950(&self) -> f64 {
        self.days_since_j2000() + (JD_J2000 - JD_1950)
    }

    /// Julian date.
    pub fn julian_date(&self) -> f64 {
        JD_J2000 + self.days_since_j2000()
    }

    /// Greenwich Mean Sidereal Time at this instant (rad, in [0, 2π)).
    pub fn sidereal_angle(&self) -> f64 {
        sidereal_angle(*self)
    }

    /// Convert to a chrono UTC timestamp.
    ///
    /// Instants beyond chrono's representable range saturate to its bounds.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let unix_ns = self.ns + J2000_UNIX_SECS * NANOS_PER_SEC;
        let secs = unix_ns.div_euclid(NANOS_PER_SEC);
        let nanos = unix_ns.rem_euclid(NANOS_PER_SEC) as u32;

        i64::try_from(secs)
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, nanos))
            .unwrap_or(if secs < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }

    // ── Arithmetic ────────────────────────────────────────────────

    /// Duration between two epochs in seconds.
    pub fn duration_since(&self, other: &Epoch) -> f64 {
        (self.ns - other.ns) as f64 / NANOS_PER_SEC as f64
    }

    /// Duration between two epochs in minutes.
    pub fn minutes_since(&self, other: &Epoch) -> f64 {
        self.duration_since(other) / SECONDS_PER_MINUTE
    }

    /// Add seconds to this epoch (rounded to the nearest nanosecond).
    pub fn add_seconds(&self, secs: f64) -> Self {
        Self {
            ns: self.ns + (secs * NANOS_PER_SEC as f64).round() as i128,
        }
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

impl std::ops::Sub for Epoch {
    type Output = f64;
    /// Returns duration in seconds.
    fn sub(self, rhs: Self) -> f64 {
        self.duration_since(&rhs)
    }
}

impl std::ops::Add<f64> for Epoch {
    type Output = Epoch;
    /// Adds seconds.
    fn add(self, secs: f64) -> Epoch {
        self.add_seconds(secs)
    }
}

impl From<DateTime<Utc>> for Epoch {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

/// Greenwich Mean Sidereal Time (IAU-82), in radians within [0, 2π).
///
/// The polynomial is continuous in time, so the angle only wraps at 2π.
pub fn sidereal_angle(epoch: Epoch) -> f64 {
    let t = epoch.days_since_j2000() / DAYS_PER_JULIAN_CENTURY;
    let gmst_secs = -6.2e-6 * t * t * t
        + 0.093_104 * t * t
        + (876_600.0 * 3_600.0 + 8_640_184.812_866) * t
        + 67_310.548_41;
    // 240 seconds of sidereal time per degree
    normalize_angle(gmst_secs / 240.0 * DEG2RAD)
}

// ── Helper: Gregorian calendar to J2000 days ───────────────────────

/// Whole days from J2000 noon to noon of the given calendar date.
/// Valid for Gregorian dates (after 1582-10-15).
fn calendar_to_j2000_days(year: i32, month: u8, day: u8) -> i128 {
    // Meeus, Astronomical Algorithms, Ch.7
    let y = if month <= 2 { year - 1 } else { year } as i128;
    let m = if month <= 2 {
        month as i128 + 12
    } else {
        month as i128
    };
    let d = day as i128;

    let a = y.div_euclid(100);
    let b = 2 - a + a.div_euclid(4);

    let jd_noon = (365.25 * (y + 4716) as f64).floor() as i128
        + (30.6001 * (m + 1) as f64).floor() as i128
        + d
        + b
        - 1524;

    jd_noon - JD_J2000 as i128
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::normalize_angle_pm;
    use approx::assert_relative_eq;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_j2000_epoch_is_zero() {
        let t = Epoch::from_utc(2000, 1, 1, 12, 0, 0.0);
        assert_eq!(t, Epoch::J2000);
        assert_relative_eq!(t.julian_date(), 2_451_545.0, epsilon = 1e-9);
    }

    #[test]
    fn test_epoch_arithmetic() {
        let t1 = Epoch::from_ns(0);
        let t2 = t1.add_seconds(100.0);
        assert!((t2 - t1 - 100.0).abs() < 1e-9);
        assert_eq!(t1 + 100.0, t2);
        assert!(t2 > t1);
        assert_relative_eq!(t2.minutes_since(&t1), 100.0 / 60.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tle_epoch_decoding() {
        // Day 179.78495062 of 2000 is June 27, 18:50:19.73 UTC
        let t = Epoch::from_tle_epoch(2000, 179.784_950_62);
        let dt = t.to_datetime();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2000, 6, 27));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (18, 50, 19));

        let jan1 = Epoch::from_tle_epoch(2024, 1.0);
        assert_eq!(jan1, Epoch::from_utc(2024, 1, 1, 0, 0, 0.0));
    }

    #[test]
    fn test_datetime_round_trip() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 7, 45, 30).unwrap();
        let t = Epoch::from_datetime(dt);
        assert_eq!(t, Epoch::from_utc(2024, 3, 9, 7, 45, 30.0));
        assert_eq!(t.to_datetime(), dt);
    }

    #[test]
    fn test_now_is_recent() {
        let now = Epoch::now();
        assert!(now > Epoch::from_utc(2020, 1, 1, 0, 0, 0.0));
    }

    #[test]
    fn test_sidereal_angle_reference() {
        // Vallado, Example 3-5: 1992-08-20 12:14:00 UT1 -> 152.578787886 deg
        let t = Epoch::from_utc(1992, 8, 20, 12, 14, 0.0);
        assert_relative_eq!(t.sidereal_angle() * RAD2DEG, 152.578_787_886, epsilon = 1e-5);
    }

    #[test]
    fn test_sidereal_angle_continuity_and_period() {
        let t = Epoch::from_utc(2024, 1, 1, 23, 59, 59.5);
        let a0 = sidereal_angle(t);
        let a1 = sidereal_angle(t.add_seconds(1.0));
        // One second of rotation, never a jump
        assert_relative_eq!(normalize_angle_pm(a1 - a0), OMEGA_EARTH, epsilon = 1e-9);

        let a_day = sidereal_angle(t.add_seconds(SIDEREAL_DAY));
        assert!(normalize_angle_pm(a_day - a0).abs() < 1e-7);
    }

    #[test]
    fn test_sidereal_angle_range() {
        for h in 0..48 {
            let a = Epoch::from_utc(2023, 5, 5, 0, 0, 0.0)
                .add_seconds(h as f64 * 1800.0)
                .sidereal_angle();
            assert!((0.0..TAU).contains(&a));
        }
    }
}
