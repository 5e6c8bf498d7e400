//! Analytical orbit propagation with the SGP4/SDP4 general perturbations model.
//!
//! Near-earth orbits (period < 225 min) use SGP4: secular J2/J4 gravity and
//! B* drag, J3 long-period and J2 short-period corrections. Deep-space orbits
//! add the lunar-solar and resonance terms of SDP4 (see `deep_space`).
//!
//! # Architecture
//! All model coefficients are computed once in [`Propagator::new`]. Propagation
//! takes `&self` and holds no mutable state, so one propagator can be shared
//! across threads and queried at any instant in any order.
//!
//! Output positions and velocities are in the TEME inertial frame.
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::*;
use crate::deep_space::{DeepSpace, DeepSpaceInput, MeanState};
use crate::elements::OrbitalElements;
use crate::time::Epoch;
use crate::tle::MalformedElementSet;

// ── State vector ──

/// Position and velocity in the TEME inertial frame at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InertialState {
    /// Position (km): [x, y, z]
    pub r: [f64; 3],
    /// Velocity (km/s): [vx, vy, vz]
    pub v: [f64; 3],
    /// Instant the state refers to.
    pub epoch: Epoch,
}

impl InertialState {
    /// Position magnitude (km).
    pub fn r_mag(&self) -> f64 {
        (self.r[0].powi(2) + self.r[1].powi(2) + self.r[2].powi(2)).sqrt()
    }

    /// Velocity magnitude (km/s).
    pub fn v_mag(&self) -> f64 {
        (self.v[0].powi(2) + self.v[1].powi(2) + self.v[2].powi(2)).sqrt()
    }

    /// Altitude above the equatorial radius (km).
    pub fn altitude(&self) -> f64 {
        self.r_mag() - R_EARTH
    }

    /// Specific orbital energy (km²/s²).
    pub fn energy(&self) -> f64 {
        self.v_mag().powi(2) / 2.0 - MU_EARTH / self.r_mag()
    }
}

// ── Errors ──

/// Why the model could not produce a state at a given time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagationFailure {
    #[error("Satellite has decayed: radius {radius_er:.4} Earth radii at {tsince_min:.3} min")]
    Decayed { tsince_min: f64, radius_er: f64 },

    #[error("Eccentricity {eccentricity} out of range at {tsince_min:.3} min")]
    InvalidEccentricity { tsince_min: f64, eccentricity: f64 },

    #[error("Kepler's equation did not converge at {tsince_min:.3} min")]
    AnomalyDivergence { tsince_min: f64 },

    #[error("Mean motion {mean_motion} rad/min is not positive at {tsince_min:.3} min")]
    NegativeMeanMotion { tsince_min: f64, mean_motion: f64 },

    #[error("Semi-latus rectum {semi_latus_rectum} is negative at {tsince_min:.3} min")]
    NegativeSemiLatusRectum {
        tsince_min: f64,
        semi_latus_rectum: f64,
    },

    #[error("Model produced a non-finite state at {tsince_min:.3} min")]
    NonFinite { tsince_min: f64 },
}

// ── Gravity models ──

/// Earth gravity constants the model is evaluated with.
///
/// Element sets are fitted with WGS-72, so that is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GravityModel {
    /// WGS-72 with the legacy rounded `xke`.
    Wgs72Old,
    #[default]
    Wgs72,
    Wgs84,
}

/// Constants derived from a [`GravityModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravityConstants {
    /// Gravitational parameter (km³/s²)
    pub mu: f64,
    /// Equatorial radius (km)
    pub radius: f64,
    /// sqrt(mu) in Earth radii^1.5 per minute
    pub xke: f64,
    /// Minutes per time unit
    pub tumin: f64,
    pub j2: f64,
    pub j3: f64,
    pub j4: f64,
    pub j3oj2: f64,
}

impl GravityModel {
    pub fn constants(&self) -> GravityConstants {
        let (mu, radius, j2, j3, j4): (f64, f64, f64, f64, f64) = match self {
            GravityModel::Wgs72Old | GravityModel::Wgs72 => {
                (398600.8, 6378.135, 0.001082616, -0.00000253881, -0.00000165597)
            }
            GravityModel::Wgs84 => (
                398600.5,
                6378.137,
                0.00108262998905,
                -0.00000253215306,
                -0.00000161098761,
            ),
        };
        let xke = match self {
            GravityModel::Wgs72Old => 0.0743669161,
            _ => 60.0 / (radius * radius * radius / mu).sqrt(),
        };
        let mu = match self {
            GravityModel::Wgs72Old => 398600.79964,
            _ => mu,
        };
        GravityConstants {
            mu,
            radius,
            xke,
            tumin: 1.0 / xke,
            j2,
            j3,
            j4,
            j3oj2: j3 / j2,
        }
    }
}

// ── Model coefficients ──

/// Avoids division by zero for inclinations near 180°.
const TEMP4: f64 = 1.5e-12;

/// Kepler solver tolerance and iteration cap.
const KEPLER_TOLERANCE: f64 = 1.0e-12;
const KEPLER_MAX_ITERATIONS: usize = 10;

/// Coefficients computed once from the element set.
#[derive(Debug, Clone)]
struct Sgp4Model {
    /// Un-Kozai'd mean motion (rad/min)
    no: f64,
    /// Truncated drag expansion for low perigees
    simple: bool,
    aycof: f64,
    con41: f64,
    cc1: f64,
    cc4: f64,
    cc5: f64,
    d2: f64,
    d3: f64,
    d4: f64,
    delmo: f64,
    eta: f64,
    argpdot: f64,
    omgcof: f64,
    sinmao: f64,
    t2cof: f64,
    t3cof: f64,
    t4cof: f64,
    t5cof: f64,
    x1mth2: f64,
    x7thm1: f64,
    mdot: f64,
    nodedot: f64,
    xlcof: f64,
    xmcof: f64,
    nodecf: f64,
    deep: Option<DeepSpace>,
}

impl Sgp4Model {
    fn new(el: &OrbitalElements, gc: &GravityConstants) -> Self {
        let x2o3 = 2.0 / 3.0;
        let ecco = el.eccentricity;
        let inclo = el.inclination;
        let argpo = el.arg_perigee;
        let bstar = el.bstar;

        // Recover the un-Kozai'd mean motion and semi-major axis
        let eccsq = ecco * ecco;
        let omeosq = 1.0 - eccsq;
        let rteosq = omeosq.sqrt();
        let cosio = inclo.cos();
        let cosio2 = cosio * cosio;

        let ak = (gc.xke / el.mean_motion).powf(x2o3);
        let d1 = 0.75 * gc.j2 * (3.0 * cosio2 - 1.0) / (rteosq * omeosq);
        let del = d1 / (ak * ak);
        let adel = ak * (1.0 - del * del - del * (1.0 / 3.0 + 134.0 * del * del / 81.0));
        let del = d1 / (adel * adel);
        let no = el.mean_motion / (1.0 + del);

        let ao = (gc.xke / no).powf(x2o3);
        let sinio = inclo.sin();
        let po = ao * omeosq;
        let con42 = 1.0 - 5.0 * cosio2;
        let con41 = -con42 - cosio2 - cosio2;
        let posq = po * po;
        let rp = ao * (1.0 - ecco);

        // Atmospheric density parameters, adjusted for low perigees
        let ss = 78.0 / gc.radius + 1.0;
        let qzms2t = ((120.0 - 78.0) / gc.radius).powi(4);
        let mut simple = rp < 220.0 / gc.radius + 1.0;
        let mut sfour = ss;
        let mut qzms24 = qzms2t;
        let perigee_km = (rp - 1.0) * gc.radius;
        if perigee_km < 156.0 {
            sfour = if perigee_km < 98.0 { 20.0 } else { perigee_km - 78.0 };
            qzms24 = ((120.0 - sfour) / gc.radius).powi(4);
            sfour = sfour / gc.radius + 1.0;
        }

        let pinvsq = 1.0 / posq;
        let tsi = 1.0 / (ao - sfour);
        let eta = ao * ecco * tsi;
        let etasq = eta * eta;
        let eeta = ecco * eta;
        let psisq = (1.0 - etasq).abs();
        let coef = qzms24 * tsi.powi(4);
        let coef1 = coef / psisq.powf(3.5);
        let cc2 = coef1
            * no
            * (ao * (1.0 + 1.5 * etasq + eeta * (4.0 + etasq))
                + 0.375 * gc.j2 * tsi / psisq * con41 * (8.0 + 3.0 * etasq * (8.0 + etasq)));
        let cc1 = bstar * cc2;
        let cc3 = if ecco > 1.0e-4 {
            -2.0 * coef * tsi * gc.j3oj2 * no * sinio / ecco
        } else {
            0.0
        };
        let x1mth2 = 1.0 - cosio2;
        let cc4 = 2.0
            * no
            * coef1
            * ao
            * omeosq
            * (eta * (2.0 + 0.5 * etasq) + ecco * (0.5 + 2.0 * etasq)
                - gc.j2 * tsi / (ao * psisq)
                    * (-3.0 * con41 * (1.0 - 2.0 * eeta + etasq * (1.5 - 0.5 * eeta))
                        + 0.75 * x1mth2 * (2.0 * etasq - eeta * (1.0 + etasq)) * (2.0 * argpo).cos()));
        let cc5 = 2.0 * coef1 * ao * omeosq * (1.0 + 2.75 * (etasq + eeta) + eeta * etasq);

        // Secular rates from J2 and J4
        let cosio4 = cosio2 * cosio2;
        let temp1 = 1.5 * gc.j2 * pinvsq * no;
        let temp2 = 0.5 * temp1 * gc.j2 * pinvsq;
        let temp3 = -0.46875 * gc.j4 * pinvsq * pinvsq * no;
        let mdot = no
            + 0.5 * temp1 * rteosq * con41
            + 0.0625 * temp2 * rteosq * (13.0 - 78.0 * cosio2 + 137.0 * cosio4);
        let argpdot = -0.5 * temp1 * con42
            + 0.0625 * temp2 * (7.0 - 114.0 * cosio2 + 395.0 * cosio4)
            + temp3 * (3.0 - 36.0 * cosio2 + 49.0 * cosio4);
        let xhdot1 = -temp1 * cosio;
        let nodedot =
            xhdot1 + (0.5 * temp2 * (4.0 - 19.0 * cosio2) + 2.0 * temp3 * (3.0 - 7.0 * cosio2)) * cosio;

        let xmcof = if ecco > 1.0e-4 {
            -x2o3 * coef * bstar / eeta
        } else {
            0.0
        };
        let xlcof_den = if (cosio + 1.0).abs() > TEMP4 { 1.0 + cosio } else { TEMP4 };
        let delmo = (1.0 + eta * el.mean_anomaly.cos()).powi(3);

        let mut model = Self {
            no,
            simple,
            aycof: -0.5 * gc.j3oj2 * sinio,
            con41,
            cc1,
            cc4,
            cc5,
            d2: 0.0,
            d3: 0.0,
            d4: 0.0,
            delmo,
            eta,
            argpdot,
            omgcof: bstar * cc3 * argpo.cos(),
            sinmao: el.mean_anomaly.sin(),
            t2cof: 1.5 * cc1,
            t3cof: 0.0,
            t4cof: 0.0,
            t5cof: 0.0,
            x1mth2,
            x7thm1: 7.0 * cosio2 - 1.0,
            mdot,
            nodedot,
            xlcof: -0.25 * gc.j3oj2 * sinio * (3.0 + 5.0 * cosio) / xlcof_den,
            xmcof,
            nodecf: 3.5 * omeosq * xhdot1 * cc1,
            deep: None,
        };

        if TAU / no >= DEEP_SPACE_PERIOD_MIN {
            simple = true;
            model.deep = Some(DeepSpace::new(&DeepSpaceInput {
                epoch_days_1950: el.epoch.days_since_1950(),
                gsto: el.epoch.sidereal_angle(),
                xke: gc.xke,
                ecc: ecco,
                incl: inclo,
                node: el.raan,
                argp: argpo,
                mean_anomaly: el.mean_anomaly,
                mean_motion: no,
                mdot,
                argpdot,
                nodedot,
            }));
        }
        model.simple = simple;

        if !simple {
            let cc1sq = cc1 * cc1;
            let d2 = 4.0 * ao * tsi * cc1sq;
            let temp = d2 * tsi * cc1 / 3.0;
            let d3 = (17.0 * ao + sfour) * temp;
            let d4 = 0.5 * temp * ao * tsi * (221.0 * ao + 31.0 * sfour) * cc1;
            model.d2 = d2;
            model.d3 = d3;
            model.d4 = d4;
            model.t3cof = d2 + 2.0 * cc1sq;
            model.t4cof = 0.25 * (3.0 * d3 + cc1 * (12.0 * d2 + 10.0 * cc1sq));
            model.t5cof = 0.2 * (3.0 * d4 + 12.0 * cc1 * d3 + 6.0 * d2 * d2 + 15.0 * cc1sq * (2.0 * d2 + cc1sq));
        }

        model
    }
}

// ── Propagator ──

/// SGP4/SDP4 propagator bound to one element set.
#[derive(Debug, Clone)]
pub struct Propagator {
    elements: OrbitalElements,
    gravity: GravityModel,
    constants: GravityConstants,
    model: Result<Sgp4Model, PropagationFailure>,
}

impl Propagator {
    /// Initialize the model with the default (WGS-72) gravity constants.
    pub fn new(elements: OrbitalElements) -> Self {
        Self::with_gravity(elements, GravityModel::default())
    }

    /// Initialize the model with explicit gravity constants.
    ///
    /// Elements outside the model's domain (eccentricity outside [0, 1),
    /// non-positive mean motion, non-finite fields) are accepted here; every
    /// propagation then fails with the corresponding [`PropagationFailure`].
    pub fn with_gravity(elements: OrbitalElements, gravity: GravityModel) -> Self {
        let constants = gravity.constants();
        let model = validate(&elements).map(|()| Sgp4Model::new(&elements, &constants));

        match &model {
            Ok(m) => debug!(
                norad_id = elements.norad_id,
                ?gravity,
                deep_space = m.deep.is_some(),
                resonant = m.deep.as_ref().is_some_and(DeepSpace::is_resonant),
                "initialized SGP4 model"
            ),
            Err(e) => warn!(norad_id = elements.norad_id, error = %e, "element set outside model domain"),
        }

        Self {
            elements,
            gravity,
            constants,
            model,
        }
    }

    /// Parse two element lines and initialize the model.
    pub fn from_tle(line1: &str, line2: &str) -> Result<Self, MalformedElementSet> {
        Ok(Self::new(OrbitalElements::from_tle(line1, line2)?))
    }

    pub fn elements(&self) -> &OrbitalElements {
        &self.elements
    }

    pub fn gravity(&self) -> GravityModel {
        self.gravity
    }

    /// Epoch of the underlying element set.
    pub fn epoch(&self) -> Epoch {
        self.elements.epoch
    }

    /// Whether the deep-space (SDP4) branch is active.
    pub fn is_deep_space(&self) -> bool {
        self.model.as_ref().is_ok_and(|m| m.deep.is_some())
    }

    /// State at an absolute instant.
    pub fn propagate(&self, epoch: Epoch) -> Result<InertialState, PropagationFailure> {
        let tsince = epoch.minutes_since(&self.elements.epoch);
        let (r, v) = self.sgp4(tsince)?;
        Ok(InertialState { r, v, epoch })
    }

    /// State `tsince` minutes after the element-set epoch.
    pub fn propagate_minutes(&self, tsince: f64) -> Result<InertialState, PropagationFailure> {
        let (r, v) = self.sgp4(tsince)?;
        Ok(InertialState {
            r,
            v,
            epoch: self.elements.epoch.add_seconds(tsince * SECONDS_PER_MINUTE),
        })
    }

    fn sgp4(&self, t: f64) -> Result<([f64; 3], [f64; 3]), PropagationFailure> {
        let m = self.model.as_ref().map_err(Clone::clone)?;
        let el = &self.elements;
        let gc = &self.constants;
        let x2o3 = 2.0 / 3.0;
        let vkmpersec = gc.radius * gc.xke / SECONDS_PER_MINUTE;

        if !t.is_finite() {
            return Err(PropagationFailure::NonFinite { tsince_min: t });
        }

        // Secular gravity and drag
        let xmdf = el.mean_anomaly + m.mdot * t;
        let argpdf = el.arg_perigee + m.argpdot * t;
        let nodedf = el.raan + m.nodedot * t;
        let t2 = t * t;
        let mut mean = MeanState {
            ecc: el.eccentricity,
            incl: el.inclination,
            node: nodedf + m.nodecf * t2,
            argp: argpdf,
            mean_anomaly: xmdf,
            mean_motion: m.no,
        };
        let mut tempa = 1.0 - m.cc1 * t;
        let mut tempe = el.bstar * m.cc4 * t;
        let mut templ = m.t2cof * t2;

        if !m.simple {
            let delomg = m.omgcof * t;
            let delm = m.xmcof * ((1.0 + m.eta * xmdf.cos()).powi(3) - m.delmo);
            let temp = delomg + delm;
            mean.mean_anomaly = xmdf + temp;
            mean.argp = argpdf - temp;
            let t3 = t2 * t;
            let t4 = t3 * t;
            tempa -= m.d2 * t2 + m.d3 * t3 + m.d4 * t4;
            tempe += el.bstar * m.cc5 * (mean.mean_anomaly.sin() - m.sinmao);
            templ += m.t3cof * t3 + t4 * (m.t4cof + t * m.t5cof);
        }

        if let Some(deep) = &m.deep {
            deep.apply_secular(t, &mut mean);
        }

        if mean.mean_motion <= 0.0 {
            return Err(PropagationFailure::NegativeMeanMotion {
                tsince_min: t,
                mean_motion: mean.mean_motion,
            });
        }

        let am = (gc.xke / mean.mean_motion).powf(x2o3) * tempa * tempa;
        let nm = gc.xke / am.powf(1.5);
        let mut em = mean.ecc - tempe;

        if !(-0.001..1.0).contains(&em) {
            return Err(PropagationFailure::InvalidEccentricity {
                tsince_min: t,
                eccentricity: em,
            });
        }
        if em < 1.0e-6 {
            em = 1.0e-6;
        }

        let mm = mean.mean_anomaly + m.no * templ;
        let xlm = (mm + mean.argp + mean.node) % TAU;
        let nodem = mean.node % TAU;
        let argpm = mean.argp % TAU;

        let mut osc = MeanState {
            ecc: em,
            incl: mean.incl,
            node: nodem,
            argp: argpm,
            mean_anomaly: (xlm - argpm - nodem) % TAU,
            mean_motion: nm,
        };

        // Lunar-solar periodics
        let (mut aycof, mut xlcof, mut con41, mut x1mth2, mut x7thm1) =
            (m.aycof, m.xlcof, m.con41, m.x1mth2, m.x7thm1);
        if let Some(deep) = &m.deep {
            deep.apply_periodics(t, &mut osc);
            if osc.incl < 0.0 {
                osc.incl = -osc.incl;
                osc.node += std::f64::consts::PI;
                osc.argp -= std::f64::consts::PI;
            }
            if !(0.0..=1.0).contains(&osc.ecc) {
                return Err(PropagationFailure::InvalidEccentricity {
                    tsince_min: t,
                    eccentricity: osc.ecc,
                });
            }

            let sinip = osc.incl.sin();
            let cosip = osc.incl.cos();
            aycof = -0.5 * gc.j3oj2 * sinip;
            let den = if (cosip + 1.0).abs() > TEMP4 { 1.0 + cosip } else { TEMP4 };
            xlcof = -0.25 * gc.j3oj2 * sinip * (3.0 + 5.0 * cosip) / den;
            let cosisq = cosip * cosip;
            con41 = 3.0 * cosisq - 1.0;
            x1mth2 = 1.0 - cosisq;
            x7thm1 = 7.0 * cosisq - 1.0;
        }

        // Long-period periodics
        let ep = osc.ecc;
        let axnl = ep * osc.argp.cos();
        let temp = 1.0 / (am * (1.0 - ep * ep));
        let aynl = ep * osc.argp.sin() + temp * aycof;
        let xl = osc.mean_anomaly + osc.argp + osc.node + temp * xlcof * axnl;

        // Kepler's equation in equinoctial form
        let u = (xl - osc.node) % TAU;
        let eo1 = solve_kepler(u, axnl, aynl).ok_or(PropagationFailure::AnomalyDivergence { tsince_min: t })?;

        // Short-period preliminary quantities
        let sineo1 = eo1.sin();
        let coseo1 = eo1.cos();
        let ecose = axnl * coseo1 + aynl * sineo1;
        let esine = axnl * sineo1 - aynl * coseo1;
        let el2 = axnl * axnl + aynl * aynl;
        let pl = am * (1.0 - el2);
        if pl < 0.0 {
            return Err(PropagationFailure::NegativeSemiLatusRectum {
                tsince_min: t,
                semi_latus_rectum: pl,
            });
        }

        let rl = am * (1.0 - ecose);
        let rdotl = am.sqrt() * esine / rl;
        let rvdotl = pl.sqrt() / rl;
        let betal = (1.0 - el2).sqrt();
        let temp = esine / (1.0 + betal);
        let sinu = am / rl * (sineo1 - aynl - axnl * temp);
        let cosu = am / rl * (coseo1 - axnl + aynl * temp);
        let su = sinu.atan2(cosu);
        let sin2u = (cosu + cosu) * sinu;
        let cos2u = 1.0 - 2.0 * sinu * sinu;
        let temp = 1.0 / pl;
        let temp1 = 0.5 * gc.j2 * temp;
        let temp2 = temp1 * temp;

        // Short-period periodics
        let sinip = osc.incl.sin();
        let cosip = osc.incl.cos();
        let mrt = rl * (1.0 - 1.5 * temp2 * betal * con41) + 0.5 * temp1 * x1mth2 * cos2u;
        let su = su - 0.25 * temp2 * x7thm1 * sin2u;
        let xnode = osc.node + 1.5 * temp2 * cosip * sin2u;
        let xinc = osc.incl + 1.5 * temp2 * cosip * sinip * cos2u;
        let mvt = rdotl - nm * temp1 * x1mth2 * sin2u / gc.xke;
        let rvdot = rvdotl + nm * temp1 * (x1mth2 * cos2u + 1.5 * con41) / gc.xke;

        // Orientation vectors
        let sinsu = su.sin();
        let cossu = su.cos();
        let snod = xnode.sin();
        let cnod = xnode.cos();
        let sini = xinc.sin();
        let cosi = xinc.cos();
        let xmx = -snod * cosi;
        let xmy = cnod * cosi;
        let ux = xmx * sinsu + cnod * cossu;
        let uy = xmy * sinsu + snod * cossu;
        let uz = sini * sinsu;
        let vx = xmx * cossu - cnod * sinsu;
        let vy = xmy * cossu - snod * sinsu;
        let vz = sini * cossu;

        if mrt < 1.0 {
            return Err(PropagationFailure::Decayed {
                tsince_min: t,
                radius_er: mrt,
            });
        }

        let mr = mrt * gc.radius;
        let r = [mr * ux, mr * uy, mr * uz];
        let v = [
            (mvt * ux + rvdot * vx) * vkmpersec,
            (mvt * uy + rvdot * vy) * vkmpersec,
            (mvt * uz + rvdot * vz) * vkmpersec,
        ];

        if r.iter().chain(v.iter()).any(|c| !c.is_finite()) {
            return Err(PropagationFailure::NonFinite { tsince_min: t });
        }

        Ok((r, v))
    }
}

/// Reject element sets the model cannot be initialized from.
fn validate(el: &OrbitalElements) -> Result<(), PropagationFailure> {
    let fields = [
        el.inclination,
        el.raan,
        el.eccentricity,
        el.arg_perigee,
        el.mean_anomaly,
        el.mean_motion,
        el.bstar,
    ];
    if fields.iter().any(|f| !f.is_finite()) {
        return Err(PropagationFailure::NonFinite { tsince_min: 0.0 });
    }
    if !(0.0..1.0).contains(&el.eccentricity) {
        return Err(PropagationFailure::InvalidEccentricity {
            tsince_min: 0.0,
            eccentricity: el.eccentricity,
        });
    }
    if el.mean_motion <= 0.0 {
        return Err(PropagationFailure::NegativeMeanMotion {
            tsince_min: 0.0,
            mean_motion: el.mean_motion,
        });
    }
    Ok(())
}

/// Solve Kepler's equation for the eccentric longitude.
///
/// Newton-Raphson with the step clamped to ±0.95 rad. Returns `None` if the
/// correction has not dropped below tolerance within the iteration cap.
fn solve_kepler(u: f64, axnl: f64, aynl: f64) -> Option<f64> {
    let mut eo1 = u;
    for _ in 0..KEPLER_MAX_ITERATIONS {
        let sineo1 = eo1.sin();
        let coseo1 = eo1.cos();
        let f = u - aynl * coseo1 + axnl * sineo1 - eo1;
        let fp = 1.0 - coseo1 * axnl - sineo1 * aynl;
        let delta = (f / fp).clamp(-0.95, 0.95);
        eo1 += delta;
        if delta.abs() < KEPLER_TOLERANCE {
            return Some(eo1);
        }
    }
    None
}

/// Propagate many element sets to the same instant in parallel.
///
/// Results are returned in input order.
pub fn propagate_constellation(
    propagators: &[Propagator],
    epoch: Epoch,
) -> Vec<(u32, Result<InertialState, PropagationFailure>)> {
    propagators
        .par_iter()
        .map(|p| (p.elements.norad_id, p.propagate(epoch)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    // Vallado's verification object
    const SAT5_LINE1: &str = "1 00005U 58002B   00179.78495062  .00000023  00000-0  28098-4 0  4753";
    const SAT5_LINE2: &str = "2 00005  34.2682 348.7242 1859667 331.7664  19.3264 10.82419157413667";

    const ISS_LINE1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9009";
    const ISS_LINE2: &str = "2 25544  51.6400 208.5000 0007417  68.0000 292.1000 15.49560000400004";

    const DECAYED_LINE1: &str = "1 99998U 24001A   24001.50000000  .00000000  00000-0  00000-0 0  9993";
    const DECAYED_LINE2: &str = "2 99998  51.6000 100.0000 0001000  90.0000 270.0000 17.20000000    19";

    const GEO_LINE1: &str = "1 99997U 24002A   24001.50000000 -.00000100  00000-0  00000-0 0  9995";
    const GEO_LINE2: &str = "2 99997   0.0500  80.0000 0002000 100.0000 200.0000  1.00270000    14";

    const MOLNIYA_LINE1: &str = "1 99996U 24003A   24001.50000000  .00000100  00000-0  10000-3 0  9998";
    const MOLNIYA_LINE2: &str = "2 99996  63.4000 250.0000 7000000 270.0000  10.0000  2.00600000    10";

    fn assert_state(state: &InertialState, r: [f64; 3], v: [f64; 3]) {
        for k in 0..3 {
            assert_abs_diff_eq!(state.r[k], r[k], epsilon = 1e-6);
            assert_abs_diff_eq!(state.v[k], v[k], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_reference_vectors_sat5() {
        let p = Propagator::from_tle(SAT5_LINE1, SAT5_LINE2).unwrap();
        assert!(!p.is_deep_space());

        let s0 = p.propagate_minutes(0.0).unwrap();
        assert_state(
            &s0,
            [7022.46529266, -1400.08296755, 0.03995155],
            [1.893841015, 6.405893759, 4.534807250],
        );

        let s360 = p.propagate_minutes(360.0).unwrap();
        assert_state(
            &s360,
            [-7154.03120202, -3783.17682504, -3536.19412294],
            [4.741887409, -4.151817765, -2.093935425],
        );

        let s720 = p.propagate_minutes(720.0).unwrap();
        assert_state(
            &s720,
            [-7134.59340119, 6531.68641334, 3260.27186483],
            [-4.113793027, -2.911922039, -2.557327851],
        );
    }

    #[test]
    fn test_propagate_by_epoch_matches_minutes() {
        let p = Propagator::from_tle(SAT5_LINE1, SAT5_LINE2).unwrap();
        let by_minutes = p.propagate_minutes(360.0).unwrap();
        let by_epoch = p.propagate(p.epoch().add_seconds(360.0 * 60.0)).unwrap();
        for k in 0..3 {
            assert_abs_diff_eq!(by_minutes.r[k], by_epoch.r[k], epsilon = 1e-6);
        }
        assert_eq!(by_minutes.epoch, by_epoch.epoch);
    }

    #[test]
    fn test_deterministic() {
        let p = Propagator::from_tle(ISS_LINE1, ISS_LINE2).unwrap();
        let t = p.epoch().add_seconds(12_345.678);
        let a = p.propagate(t).unwrap();
        let b = p.propagate(t).unwrap();
        for k in 0..3 {
            assert_eq!(a.r[k].to_bits(), b.r[k].to_bits());
            assert_eq!(a.v[k].to_bits(), b.v[k].to_bits());
        }
    }

    #[test]
    fn test_iss_orbit_sanity() {
        let p = Propagator::from_tle(ISS_LINE1, ISS_LINE2).unwrap();
        for minutes in [0.0, 30.0, 92.0, 600.0, 1440.0] {
            let s = p.propagate_minutes(minutes).unwrap();
            assert!(s.altitude() > 380.0 && s.altitude() < 450.0, "alt = {}", s.altitude());
            assert!((s.v_mag() - 7.66).abs() < 0.1, "v = {}", s.v_mag());
        }
    }

    #[test]
    fn test_decayed_element_set() {
        let p = Propagator::from_tle(DECAYED_LINE1, DECAYED_LINE2).unwrap();
        for minutes in [0.0, 10.0, 100.0] {
            assert!(matches!(
                p.propagate_minutes(minutes),
                Err(PropagationFailure::Decayed { .. })
            ));
        }
    }

    #[test]
    fn test_geostationary_deep_space() {
        let p = Propagator::from_tle(GEO_LINE1, GEO_LINE2).unwrap();
        assert!(p.is_deep_space());
        for minutes in [0.0, 720.0, 1440.0, 10_080.0] {
            let s = p.propagate_minutes(minutes).unwrap();
            assert!((s.r_mag() - 42_164.0).abs() < 200.0, "r = {}", s.r_mag());
            assert!((s.v_mag() - 3.075).abs() < 0.05, "v = {}", s.v_mag());
        }
    }

    #[test]
    fn test_molniya_deep_space() {
        let p = Propagator::from_tle(MOLNIYA_LINE1, MOLNIYA_LINE2).unwrap();
        assert!(p.is_deep_space());
        let a = p.elements().semi_major_axis();
        let e = p.elements().eccentricity;
        for k in 0..48 {
            let s = p.propagate_minutes(k as f64 * 30.0).unwrap();
            assert!(s.r_mag() > a * (1.0 - e) - 300.0, "r = {}", s.r_mag());
            assert!(s.r_mag() < a * (1.0 + e) + 300.0, "r = {}", s.r_mag());
        }
    }

    #[test]
    fn test_deep_space_query_order_independent() {
        let p = Propagator::from_tle(GEO_LINE1, GEO_LINE2).unwrap();
        let forward = p.propagate_minutes(5000.0).unwrap();
        let _ = p.propagate_minutes(-2000.0).unwrap();
        let again = p.propagate_minutes(5000.0).unwrap();
        assert_eq!(forward, again);
    }

    #[test]
    fn test_invalid_elements_fail_every_call() {
        let mut el = OrbitalElements::from_tle(ISS_LINE1, ISS_LINE2).unwrap();
        el.eccentricity = 1.2;
        let p = Propagator::new(el);
        assert!(matches!(
            p.propagate_minutes(0.0),
            Err(PropagationFailure::InvalidEccentricity { .. })
        ));

        let mut el = OrbitalElements::from_tle(ISS_LINE1, ISS_LINE2).unwrap();
        el.mean_motion = -0.01;
        assert!(matches!(
            Propagator::new(el).propagate_minutes(10.0),
            Err(PropagationFailure::NegativeMeanMotion { .. })
        ));
    }

    #[test]
    fn test_non_finite_time() {
        let p = Propagator::from_tle(ISS_LINE1, ISS_LINE2).unwrap();
        assert!(matches!(
            p.propagate_minutes(f64::NAN),
            Err(PropagationFailure::NonFinite { .. })
        ));
    }

    #[test]
    fn test_gravity_models() {
        let wgs72 = GravityModel::Wgs72.constants();
        assert_relative_eq!(wgs72.xke, 0.07436691613317342, epsilon = 1e-12);
        assert_relative_eq!(GravityModel::Wgs72Old.constants().xke, 0.0743669161, epsilon = 1e-15);
        assert_relative_eq!(GravityModel::Wgs84.constants().radius, 6378.137, epsilon = 1e-12);
        assert_eq!(GravityModel::default(), GravityModel::Wgs72);

        // Different constants, nearly the same answer
        let el = OrbitalElements::from_tle(ISS_LINE1, ISS_LINE2).unwrap();
        let a = Propagator::with_gravity(el.clone(), GravityModel::Wgs72).propagate_minutes(60.0).unwrap();
        let b = Propagator::with_gravity(el, GravityModel::Wgs84).propagate_minutes(60.0).unwrap();
        let dr = ((a.r[0] - b.r[0]).powi(2) + (a.r[1] - b.r[1]).powi(2) + (a.r[2] - b.r[2]).powi(2)).sqrt();
        assert!(dr > 0.0 && dr < 5.0, "dr = {dr}");
    }

    #[test]
    fn test_kepler_solver() {
        // Circular: eccentric longitude equals mean longitude
        assert_relative_eq!(solve_kepler(1.234, 0.0, 0.0).unwrap(), 1.234, epsilon = 1e-12);
        // e = 0.5 along x: E - e sin E = M
        let ea = solve_kepler(1.0, 0.5, 0.0).unwrap();
        assert_relative_eq!(ea - 0.5 * ea.sin(), 1.0, epsilon = 1e-11);
    }

    #[test]
    fn test_kepler_solver_iteration_cap() {
        // Parabolic limit near periapsis: the clamped steps are still ~1e-2 rad
        // after the last iteration
        assert_eq!(solve_kepler(1.0e-6, 1.0, 0.0), None);
        assert_eq!(solve_kepler(f64::NAN, 0.1, 0.0), None);
    }

    #[test]
    fn test_drag_drives_eccentricity_out_of_range() {
        let mut el = OrbitalElements::from_tle(ISS_LINE1, ISS_LINE2).unwrap();
        el.bstar = 0.5;
        let p = Propagator::new(el);
        assert!(p.propagate_minutes(0.0).is_ok());
        match p.propagate_minutes(10_000.0) {
            Err(PropagationFailure::InvalidEccentricity { tsince_min, eccentricity }) => {
                assert_eq!(tsince_min, 10_000.0);
                assert!(eccentricity < -0.001);
            }
            other => panic!("expected InvalidEccentricity, got {other:?}"),
        }
    }

    #[test]
    fn test_constellation_preserves_order() {
        let props = vec![
            Propagator::from_tle(ISS_LINE1, ISS_LINE2).unwrap(),
            Propagator::from_tle(DECAYED_LINE1, DECAYED_LINE2).unwrap(),
            Propagator::from_tle(SAT5_LINE1, SAT5_LINE2).unwrap(),
        ];
        let t = Epoch::from_utc(2024, 1, 1, 13, 0, 0.0);
        let results = propagate_constellation(&props, t);
        let ids: Vec<u32> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![25544, 99998, 5]);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }
}
