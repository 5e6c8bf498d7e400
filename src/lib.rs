//! # groundtrack
//!
//! Satellite ground-track computation from two-line element sets.
//!
//! Parses TLEs, propagates them with SGP4/SDP4 into the TEME frame, rotates
//! the result into the Earth-fixed frame, converts to geodetic coordinates
//! and samples ground tracks over time windows. Also provides nadir sensor
//! footprint geometry.
//!
//! ```
//! use groundtrack::{sample, Propagator};
//!
//! let line1 = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9009";
//! let line2 = "2 25544  51.6400 208.5000 0007417  68.0000 292.1000 15.49560000400004";
//! let iss = Propagator::from_tle(line1, line2).unwrap();
//! let track = sample(&iss, iss.epoch(), 5400.0, 60.0).unwrap();
//! assert_eq!(track.len(), 90);
//! ```

pub mod constants;
pub mod time;
pub mod elements;
pub mod tle;
pub mod propagator;
mod deep_space;
pub mod frames;
pub mod footprint;
pub mod trajectory;

pub use elements::OrbitalElements;
pub use footprint::{footprint_area, Footprint, FootprintError, SensorCone};
pub use frames::{EarthFixed, Ellipsoid, FrameError, Geodetic};
pub use propagator::{GravityModel, InertialState, PropagationFailure, Propagator};
pub use time::Epoch;
pub use tle::MalformedElementSet;
pub use trajectory::{sample, SampleError, TrackError, Trajectory, TrajectorySample, TrajectorySampler};

#[cfg(feature = "python")]
mod pybridge;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn groundtrack(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pybridge::register(m)?;
    Ok(())
}
