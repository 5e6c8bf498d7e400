//! Python bindings via PyO3 for groundtrack.
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::constants;
use crate::elements::OrbitalElements;
use crate::footprint::{self, SensorCone};
use crate::frames::{earth_fixed_to_geodetic, inertial_to_earth_fixed, EarthFixed, Ellipsoid};
use crate::propagator::{GravityModel, Propagator};
use crate::time::Epoch;
use crate::trajectory::{Trajectory, TrajectorySampler};

fn value_error<E: std::fmt::Display>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn gravity_from_name(name: &str) -> PyResult<GravityModel> {
    match name.to_ascii_lowercase().as_str() {
        "wgs72" => Ok(GravityModel::Wgs72),
        "wgs72old" => Ok(GravityModel::Wgs72Old),
        "wgs84" => Ok(GravityModel::Wgs84),
        other => Err(PyValueError::new_err(format!("Unknown gravity model: {other}"))),
    }
}

// Epoch
#[pyclass(name = "Epoch")]
#[derive(Clone)]
pub struct PyEpoch {
    inner: Epoch,
}

#[pymethods]
impl PyEpoch {
    /// Create from a UTC calendar date.
    #[staticmethod]
    fn from_utc(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: f64) -> Self {
        PyEpoch { inner: Epoch::from_utc(year, month, day, hour, minute, second) }
    }

    #[staticmethod]
    fn from_j2000_seconds(seconds: f64) -> Self {
        PyEpoch { inner: Epoch::from_seconds_since_j2000(seconds) }
    }

    #[staticmethod]
    fn now() -> Self {
        PyEpoch { inner: Epoch::now() }
    }

    fn add_seconds(&self, seconds: f64) -> Self {
        PyEpoch { inner: self.inner.add_seconds(seconds) }
    }

    fn j2000_seconds(&self) -> f64 { self.inner.seconds_since_j2000() }
    fn julian_date(&self) -> f64 { self.inner.julian_date() }

    /// Greenwich mean sidereal time (rad).
    fn gmst(&self) -> f64 { self.inner.sidereal_angle() }

    fn __sub__(&self, other: &PyEpoch) -> f64 {
        self.inner - other.inner
    }

    fn __repr__(&self) -> String {
        format!("Epoch({})", self.inner)
    }
}

// OrbitalElements
#[pyclass(name = "OrbitalElements")]
#[derive(Clone)]
pub struct PyOrbitalElements {
    inner: OrbitalElements,
}

#[pymethods]
impl PyOrbitalElements {
    /// Parse a two-line element set.
    #[staticmethod]
    fn parse(line1: &str, line2: &str) -> PyResult<Self> {
        OrbitalElements::from_tle(line1, line2)
            .map(|e| PyOrbitalElements { inner: e })
            .map_err(value_error)
    }

    /// Parse a TLE from three lines (name + line1 + line2).
    #[staticmethod]
    fn parse_3line(line0: &str, line1: &str, line2: &str) -> PyResult<Self> {
        OrbitalElements::from_tle_3line(line0, line1, line2)
            .map(|e| PyOrbitalElements { inner: e })
            .map_err(value_error)
    }

    /// Parse every element set in a multi-line string.
    #[staticmethod]
    fn parse_batch(text: &str) -> PyResult<Vec<PyOrbitalElements>> {
        OrbitalElements::parse_batch(text)
            .map(|all| all.into_iter().map(|e| PyOrbitalElements { inner: e }).collect())
            .map_err(value_error)
    }

    /// Orbital period (minutes).
    fn period_minutes(&self) -> f64 { self.inner.period_minutes() }
    fn semi_major_axis(&self) -> f64 { self.inner.semi_major_axis() }
    fn perigee_altitude(&self) -> f64 { self.inner.perigee_altitude() }
    fn apogee_altitude(&self) -> f64 { self.inner.apogee_altitude() }

    #[getter] fn name(&self) -> Option<String> { self.inner.name.clone() }
    #[getter] fn norad_id(&self) -> u32 { self.inner.norad_id }
    #[getter] fn classification(&self) -> char { self.inner.classification }
    #[getter] fn intl_designator(&self) -> String { self.inner.intl_designator.clone() }
    #[getter] fn epoch(&self) -> PyEpoch { PyEpoch { inner: self.inner.epoch } }
    #[getter] fn bstar(&self) -> f64 { self.inner.bstar }
    #[getter] fn inclination_deg(&self) -> f64 { self.inner.inclination_deg() }
    #[getter] fn raan_deg(&self) -> f64 { self.inner.raan_deg() }
    #[getter] fn eccentricity(&self) -> f64 { self.inner.eccentricity }
    #[getter] fn arg_perigee_deg(&self) -> f64 { self.inner.arg_perigee_deg() }
    #[getter] fn mean_anomaly_deg(&self) -> f64 { self.inner.mean_anomaly_deg() }
    #[getter] fn mean_motion(&self) -> f64 { self.inner.mean_motion_rev_day() }
    #[getter] fn rev_number(&self) -> u32 { self.inner.rev_number }

    fn __repr__(&self) -> String {
        format!("{}", self.inner)
    }
}

// Propagator
#[pyclass(name = "Propagator")]
pub struct PyPropagator {
    inner: Propagator,
}

#[pymethods]
impl PyPropagator {
    /// Create an SGP4/SDP4 propagator.
    ///
    /// Args:
    ///     elements: Parsed element set
    ///     gravity: "wgs72" (default), "wgs72old" or "wgs84"
    #[new]
    #[pyo3(signature = (elements, gravity="wgs72"))]
    fn new(elements: &PyOrbitalElements, gravity: &str) -> PyResult<Self> {
        let model = gravity_from_name(gravity)?;
        Ok(PyPropagator {
            inner: Propagator::with_gravity(elements.inner.clone(), model),
        })
    }

    #[staticmethod]
    fn from_tle(line1: &str, line2: &str) -> PyResult<Self> {
        Propagator::from_tle(line1, line2)
            .map(|p| PyPropagator { inner: p })
            .map_err(value_error)
    }

    #[getter] fn epoch(&self) -> PyEpoch { PyEpoch { inner: self.inner.epoch() } }
    #[getter] fn is_deep_space(&self) -> bool { self.inner.is_deep_space() }

    /// TEME state at `epoch`.
    ///
    /// Returns [x, y, z, vx, vy, vz] in km and km/s.
    fn propagate(&self, epoch: &PyEpoch) -> PyResult<Vec<f64>> {
        let s = self.inner.propagate(epoch.inner).map_err(value_error)?;
        Ok(vec![s.r[0], s.r[1], s.r[2], s.v[0], s.v[1], s.v[2]])
    }

    /// TEME state `tsince` minutes from the element epoch.
    fn propagate_minutes(&self, tsince: f64) -> PyResult<Vec<f64>> {
        let s = self.inner.propagate_minutes(tsince).map_err(value_error)?;
        Ok(vec![s.r[0], s.r[1], s.r[2], s.v[0], s.v[1], s.v[2]])
    }

    /// Geodetic position at `epoch` as (lat_deg, lon_deg, height_km).
    fn geodetic(&self, epoch: &PyEpoch) -> PyResult<(f64, f64, f64)> {
        let s = self.inner.propagate(epoch.inner).map_err(value_error)?;
        let ecef = inertial_to_earth_fixed(s.r, epoch.inner);
        let g = earth_fixed_to_geodetic(&ecef, &Ellipsoid::WGS84).map_err(value_error)?;
        Ok((g.latitude_deg(), g.longitude_deg(), g.height))
    }

    /// Sample the ground track over a window.
    ///
    /// Returns a list of [j2000_s, x, y, z, lat_deg, lon_deg, height_km] rows.
    /// Instants where the model fails are omitted.
    #[pyo3(signature = (start, duration_s, step_s, parallel=false))]
    fn sample(&self, start: &PyEpoch, duration_s: f64, step_s: f64, parallel: bool) -> PyResult<Vec<Vec<f64>>> {
        let sampler = TrajectorySampler::new();
        let track = if parallel {
            sampler.sample_parallel(&self.inner, start.inner, duration_s, step_s)
        } else {
            sampler.sample(&self.inner, start.inner, duration_s, step_s)
        }
        .map_err(value_error)?;
        Ok(rows(&track))
    }
}

fn rows(track: &Trajectory) -> Vec<Vec<f64>> {
    track
        .iter()
        .map(|s| {
            vec![
                s.epoch.seconds_since_j2000(),
                s.position.x,
                s.position.y,
                s.position.z,
                s.geodetic.latitude_deg(),
                s.geodetic.longitude_deg(),
                s.geodetic.height,
            ]
        })
        .collect()
}

// Free functions
#[pyfunction]
fn footprint_area(altitude_km: f64, full_fov_deg: f64) -> PyResult<f64> {
    footprint::footprint_area(altitude_km, full_fov_deg).map_err(value_error)
}

#[pyfunction]
fn footprint_radius(altitude_km: f64, full_fov_deg: f64) -> PyResult<f64> {
    footprint::footprint_radius(altitude_km, full_fov_deg).map_err(value_error)
}

/// Sensor cone for an Earth-fixed position [x, y, z] in km.
#[pyfunction]
fn sensor_cone<'py>(py: Python<'py>, position: [f64; 3], full_fov_deg: f64) -> PyResult<Bound<'py, PyDict>> {
    let cone = SensorCone::from_earth_fixed(&EarthFixed::from(position), full_fov_deg, &Ellipsoid::WGS84)
        .map_err(value_error)?;
    let dict = PyDict::new_bound(py);
    dict.set_item("apex", cone.apex.to_array())?;
    dict.set_item("axis", cone.axis)?;
    dict.set_item("nadir", cone.nadir.to_array())?;
    dict.set_item("height_km", cone.height_km())?;
    dict.set_item("radius_km", cone.radius_km())?;
    dict.set_item("half_angle_deg", cone.half_angle() * constants::RAD2DEG)?;
    dict.set_item("area_km2", cone.footprint.area_km2)?;
    Ok(dict)
}

// Module registration
pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyEpoch>()?;
    m.add_class::<PyOrbitalElements>()?;
    m.add_class::<PyPropagator>()?;
    m.add_function(wrap_pyfunction!(footprint_area, m)?)?;
    m.add_function(wrap_pyfunction!(footprint_radius, m)?)?;
    m.add_function(wrap_pyfunction!(sensor_cone, m)?)?;
    Ok(())
}
