//! Ground-track sampling over a time window.
//!
//! The sampler drives the propagator and frame pipeline at `start + k·step`
//! for `k = 0 .. ceil(duration / step)`, so the window start is included and
//! the end is not. Instants where the model or the frame transform fails are
//! skipped (never interpolated), so a trajectory may have gaps but never
//! holds a non-finite position.
//!
//! # Example
//! ```
//! use groundtrack::propagator::Propagator;
//! use groundtrack::trajectory::TrajectorySampler;
//!
//! let line1 = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9009";
//! let line2 = "2 25544  51.6400 208.5000 0007417  68.0000 292.1000 15.49560000400004";
//! let propagator = Propagator::from_tle(line1, line2).unwrap();
//!
//! let track = TrajectorySampler::new()
//!     .with_sensor_fov(45.0)
//!     .sample(&propagator, propagator.epoch(), 600.0, 60.0)
//!     .unwrap();
//! assert_eq!(track.len(), 10);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::footprint::{Footprint, FootprintError};
use crate::frames::{earth_fixed_to_geodetic, inertial_to_earth_fixed, EarthFixed, Ellipsoid, FrameError, Geodetic};
use crate::propagator::{PropagationFailure, Propagator};
use crate::time::Epoch;

/// Smallest step that still yields distinct instants at nanosecond resolution.
const MIN_STEP_S: f64 = 1.0e-9;

/// Upper bound on the number of instants in one sampling run.
pub const MAX_SAMPLES: usize = 10_000_000;

/// Invalid sampling window.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SampleError {
    #[error("Step must be finite and at least 1 ns, got {0} s")]
    InvalidStep(f64),

    #[error("Duration must be finite and non-negative, got {0} s")]
    InvalidDuration(f64),

    #[error("Window would produce {0} instants, more than the sampling limit")]
    TooManyInstants(f64),

    #[error("Invalid sensor field of view: {0}")]
    Sensor(#[from] FootprintError),
}

/// Why a single instant produced no sample.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error(transparent)]
    Propagation(#[from] PropagationFailure),

    #[error(transparent)]
    Frame(#[from] FrameError),

}

/// One valid point of a ground track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub epoch: Epoch,
    /// Earth-fixed position (km)
    pub position: EarthFixed,
    pub geodetic: Geodetic,
    /// Present when the sampler has a sensor field of view configured and
    /// the sample lies above the ellipsoid.
    pub footprint: Option<Footprint>,
}

/// Samples ordered by strictly increasing epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    samples: Vec<TrajectorySample>,
}

impl Trajectory {
    /// Build a trajectory from externally supplied Earth-fixed positions.
    ///
    /// Samples are sorted by epoch; positions with no geodetic inversion are
    /// dropped and only the first sample at any repeated epoch is kept.
    pub fn from_earth_fixed<I>(positions: I, ellipsoid: &Ellipsoid) -> Self
    where
        I: IntoIterator<Item = (Epoch, EarthFixed)>,
    {
        let mut samples: Vec<TrajectorySample> = positions
            .into_iter()
            .filter_map(|(epoch, position)| match earth_fixed_to_geodetic(&position, ellipsoid) {
                Ok(geodetic) => Some(TrajectorySample {
                    epoch,
                    position,
                    geodetic,
                    footprint: None,
                }),
                Err(e) => {
                    debug!(%epoch, error = %e, "dropping external sample");
                    None
                }
            })
            .collect();
        samples.sort_by_key(|s| s.epoch);
        samples.dedup_by_key(|s| s.epoch);
        Trajectory { samples }
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrajectorySample> {
        self.samples.iter()
    }

    pub fn first(&self) -> Option<&TrajectorySample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&TrajectorySample> {
        self.samples.last()
    }

    /// `(epoch, position)` pairs, the form a renderer consumes.
    pub fn positions(&self) -> Vec<(Epoch, EarthFixed)> {
        self.samples.iter().map(|s| (s.epoch, s.position)).collect()
    }

    /// Sample closest in time to `epoch`. Ties go to the earlier sample.
    pub fn nearest(&self, epoch: Epoch) -> Option<&TrajectorySample> {
        let idx = self.samples.partition_point(|s| s.epoch < epoch);
        let after = self.samples.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.samples.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if (epoch - b.epoch) <= (a.epoch - epoch) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a TrajectorySample;
    type IntoIter = std::slice::Iter<'a, TrajectorySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Sampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySampler {
    /// Ellipsoid for geodetic coordinates.
    pub ellipsoid: Ellipsoid,
    /// Full field of view (deg) of a nadir sensor; attaches a footprint to
    /// every sample above the ellipsoid when set.
    pub sensor_fov_deg: Option<f64>,
}

impl Default for TrajectorySampler {
    fn default() -> Self {
        TrajectorySampler {
            ellipsoid: Ellipsoid::WGS84,
            sensor_fov_deg: None,
        }
    }
}

impl TrajectorySampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ellipsoid(mut self, ellipsoid: Ellipsoid) -> Self {
        self.ellipsoid = ellipsoid;
        self
    }

    pub fn with_sensor_fov(mut self, full_fov_deg: f64) -> Self {
        self.sensor_fov_deg = Some(full_fov_deg);
        self
    }

    /// Propagate and transform a single instant.
    pub fn sample_at(&self, propagator: &Propagator, epoch: Epoch) -> Result<TrajectorySample, TrackError> {
        let state = propagator.propagate(epoch)?;
        let position = inertial_to_earth_fixed(state.r, epoch);
        let geodetic = earth_fixed_to_geodetic(&position, &self.ellipsoid)?;
        // A position just under the ellipsoid is still a valid track point
        let footprint = self.sensor_fov_deg.and_then(|fov| {
            Footprint::new(geodetic.height, fov)
                .map_err(|e| debug!(%epoch, error = %e, "no footprint for sample"))
                .ok()
        });
        Ok(TrajectorySample {
            epoch,
            position,
            geodetic,
            footprint,
        })
    }

    /// Sample the window sequentially.
    pub fn sample(
        &self,
        propagator: &Propagator,
        start: Epoch,
        duration_s: f64,
        step_s: f64,
    ) -> Result<Trajectory, SampleError> {
        let never = AtomicBool::new(false);
        self.sample_cancellable(propagator, start, duration_s, step_s, &never)
    }

    /// Sample the window on the rayon thread pool. Output order and content
    /// match [`TrajectorySampler::sample`].
    pub fn sample_parallel(
        &self,
        propagator: &Propagator,
        start: Epoch,
        duration_s: f64,
        step_s: f64,
    ) -> Result<Trajectory, SampleError> {
        let count = self.instant_count(duration_s, step_s)?;
        let results: Vec<(Epoch, Result<TrajectorySample, TrackError>)> = (0..count)
            .into_par_iter()
            .map(|k| {
                let epoch = instant(start, k, step_s);
                (epoch, self.sample_at(propagator, epoch))
            })
            .collect();

        let mut samples = Vec::with_capacity(count);
        for (epoch, result) in results {
            keep_valid(&mut samples, propagator, epoch, result);
        }
        Ok(finish(samples, propagator, count))
    }

    /// Sample the window sequentially, checking `cancel` before each instant.
    ///
    /// On cancellation the samples produced so far are returned.
    pub fn sample_cancellable(
        &self,
        propagator: &Propagator,
        start: Epoch,
        duration_s: f64,
        step_s: f64,
        cancel: &AtomicBool,
    ) -> Result<Trajectory, SampleError> {
        let count = self.instant_count(duration_s, step_s)?;
        let mut samples = Vec::with_capacity(count);

        for k in 0..count {
            if cancel.load(Ordering::Relaxed) {
                debug!(completed = k, total = count, "sampling cancelled");
                return Ok(Trajectory { samples });
            }
            let epoch = instant(start, k, step_s);
            keep_valid(&mut samples, propagator, epoch, self.sample_at(propagator, epoch));
        }
        Ok(finish(samples, propagator, count))
    }

    fn instant_count(&self, duration_s: f64, step_s: f64) -> Result<usize, SampleError> {
        if !step_s.is_finite() || step_s < MIN_STEP_S {
            return Err(SampleError::InvalidStep(step_s));
        }
        if !duration_s.is_finite() || duration_s < 0.0 {
            return Err(SampleError::InvalidDuration(duration_s));
        }
        if let Some(fov) = self.sensor_fov_deg {
            // Validate the field of view once rather than failing every instant
            Footprint::new(1.0, fov)?;
        }
        let count = (duration_s / step_s).ceil();
        if count > MAX_SAMPLES as f64 {
            return Err(SampleError::TooManyInstants(count));
        }
        Ok(count as usize)
    }
}

/// Sample `propagator` with the default sampler (WGS-84, no sensor).
pub fn sample(
    propagator: &Propagator,
    start: Epoch,
    duration_s: f64,
    step_s: f64,
) -> Result<Trajectory, SampleError> {
    TrajectorySampler::default().sample(propagator, start, duration_s, step_s)
}

fn instant(start: Epoch, k: usize, step_s: f64) -> Epoch {
    start.add_seconds(k as f64 * step_s)
}

fn keep_valid(
    samples: &mut Vec<TrajectorySample>,
    propagator: &Propagator,
    epoch: Epoch,
    result: Result<TrajectorySample, TrackError>,
) {
    match result {
        Ok(sample) => samples.push(sample),
        Err(e) => debug!(
            norad_id = propagator.elements().norad_id,
            %epoch,
            error = %e,
            "skipping sample"
        ),
    }
}

fn finish(samples: Vec<TrajectorySample>, propagator: &Propagator, count: usize) -> Trajectory {
    if samples.is_empty() && count > 0 {
        warn!(
            norad_id = propagator.elements().norad_id,
            instants = count,
            "no valid samples in window"
        );
    }
    Trajectory { samples }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ISS_LINE1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9009";
    const ISS_LINE2: &str = "2 25544  51.6400 208.5000 0007417  68.0000 292.1000 15.49560000400004";
    const DECAYED_LINE1: &str = "1 99998U 24001A   24001.50000000  .00000000  00000-0  00000-0 0  9993";
    const DECAYED_LINE2: &str = "2 99998  51.6000 100.0000 0001000  90.0000 270.0000 17.20000000    19";

    fn iss() -> Propagator {
        Propagator::from_tle(ISS_LINE1, ISS_LINE2).unwrap()
    }

    #[test]
    fn test_one_hour_at_ten_seconds() {
        let p = iss();
        let track = sample(&p, p.epoch(), 3600.0, 10.0).unwrap();
        assert_eq!(track.len(), 360);
        assert_eq!(track.first().unwrap().epoch, p.epoch());
        assert_eq!(track.last().unwrap().epoch, p.epoch().add_seconds(3590.0));
        for pair in track.samples().windows(2) {
            assert!(pair[1].epoch > pair[0].epoch);
        }
    }

    #[test]
    fn test_partial_final_step() {
        let p = iss();
        assert_eq!(sample(&p, p.epoch(), 25.0, 10.0).unwrap().len(), 3);
        assert_eq!(sample(&p, p.epoch(), 0.0, 10.0).unwrap().len(), 0);
    }

    #[test]
    fn test_invalid_window() {
        let p = iss();
        let t = p.epoch();
        assert_eq!(sample(&p, t, 100.0, 0.0), Err(SampleError::InvalidStep(0.0)));
        assert_eq!(sample(&p, t, 100.0, -5.0), Err(SampleError::InvalidStep(-5.0)));
        assert!(matches!(sample(&p, t, 100.0, f64::NAN), Err(SampleError::InvalidStep(_))));
        assert_eq!(sample(&p, t, -1.0, 10.0), Err(SampleError::InvalidDuration(-1.0)));
        assert!(matches!(sample(&p, t, f64::INFINITY, 10.0), Err(SampleError::InvalidDuration(_))));
        assert!(matches!(sample(&p, t, 1.0e12, 1.0e-3), Err(SampleError::TooManyInstants(_))));
        assert!(matches!(
            TrajectorySampler::new().with_sensor_fov(180.0).sample(&p, t, 60.0, 10.0),
            Err(SampleError::Sensor(FootprintError::InvalidFieldOfView(_)))
        ));
    }

    #[test]
    fn test_decayed_yields_empty_trajectory() {
        let p = Propagator::from_tle(DECAYED_LINE1, DECAYED_LINE2).unwrap();
        let track = sample(&p, p.epoch(), 600.0, 60.0).unwrap();
        assert!(track.is_empty());
        assert!(track.nearest(p.epoch()).is_none());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let p = iss();
        let sampler = TrajectorySampler::new().with_sensor_fov(30.0);
        let seq = sampler.sample(&p, p.epoch(), 5400.0, 30.0).unwrap();
        let par = sampler.sample_parallel(&p, p.epoch(), 5400.0, 30.0).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_cancellation() {
        let p = iss();
        let cancel = AtomicBool::new(true);
        let track = TrajectorySampler::new()
            .sample_cancellable(&p, p.epoch(), 3600.0, 10.0, &cancel)
            .unwrap();
        assert!(track.is_empty());
    }

    #[test]
    fn test_footprint_attached() {
        let p = iss();
        let track = TrajectorySampler::new()
            .with_sensor_fov(45.0)
            .sample(&p, p.epoch(), 300.0, 60.0)
            .unwrap();
        for s in &track {
            let fp = s.footprint.unwrap();
            assert_relative_eq!(fp.altitude_km, s.geodetic.height, epsilon = 1e-12);
            assert!(fp.radius_km > 150.0 && fp.radius_km < 200.0);
        }
        let bare = sample(&p, p.epoch(), 300.0, 60.0).unwrap();
        assert!(bare.iter().all(|s| s.footprint.is_none()));
    }

    #[test]
    fn test_footprint_failure_keeps_position() {
        // Ellipsoid larger than the orbit: every height is negative
        let p = iss();
        let oversized = Ellipsoid { a: 7000.0, f: 0.0 };
        let track = TrajectorySampler::new()
            .with_ellipsoid(oversized)
            .with_sensor_fov(45.0)
            .sample(&p, p.epoch(), 300.0, 60.0)
            .unwrap();
        assert_eq!(track.len(), 5);
        for s in &track {
            assert!(s.geodetic.height < 0.0);
            assert!(s.footprint.is_none());
        }
    }

    #[test]
    fn test_nearest() {
        let p = iss();
        let t0 = p.epoch();
        let track = sample(&p, t0, 600.0, 60.0).unwrap();
        assert_eq!(track.nearest(t0.add_seconds(-100.0)).unwrap().epoch, t0);
        assert_eq!(track.nearest(t0.add_seconds(89.0)).unwrap().epoch, t0.add_seconds(60.0));
        assert_eq!(track.nearest(t0.add_seconds(91.0)).unwrap().epoch, t0.add_seconds(120.0));
        // Midpoint tie goes to the earlier sample
        assert_eq!(track.nearest(t0.add_seconds(90.0)).unwrap().epoch, t0.add_seconds(60.0));
        assert_eq!(track.nearest(t0.add_seconds(1e6)).unwrap().epoch, t0.add_seconds(540.0));
    }

    #[test]
    fn test_external_positions() {
        let t0 = Epoch::from_utc(2024, 5, 1, 0, 0, 0.0);
        let positions = vec![
            (t0.add_seconds(20.0), EarthFixed::new(7000.0, 0.0, 0.0)),
            (t0, EarthFixed::new(0.0, 7000.0, 0.0)),
            (t0.add_seconds(10.0), EarthFixed::new(0.0, 0.0, 0.0)),
            (t0, EarthFixed::new(0.0, -7000.0, 0.0)),
        ];
        let track = Trajectory::from_earth_fixed(positions, &Ellipsoid::WGS84);
        let epochs: Vec<Epoch> = track.iter().map(|s| s.epoch).collect();
        assert_eq!(epochs, vec![t0, t0.add_seconds(20.0)]);
        assert_relative_eq!(track.samples()[0].geodetic.longitude_deg(), 90.0, epsilon = 1e-9);
    }
}
