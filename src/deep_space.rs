//! Deep-space (SDP4) perturbations for orbits with periods of 225 minutes or more.
//!
//! Three effects are layered on top of the near-earth secular model:
//! - lunar and solar secular rates on all mean elements,
//! - lunar and solar long-period periodics,
//! - the 12-hour and 24-hour geopotential resonances, integrated numerically
//!   in fixed 720-minute steps.
//!
//! The resonance integrator always starts from epoch. Nothing is cached
//! between calls, so evaluation needs only `&self` and is deterministic.

use std::f64::consts::PI;

use crate::constants::TAU;

// Solar and lunar mean motions (rad/min) and eccentricities
const ZNS: f64 = 1.19459e-5;
const ZES: f64 = 0.01675;
const ZNL: f64 = 1.5835218e-4;
const ZEL: f64 = 0.05490;

// Solar and lunar perturbation coefficients
const C1SS: f64 = 2.9864797e-6;
const C1L: f64 = 4.7968065e-7;

// Geometry of the ecliptic relative to the equator
const ZSINIS: f64 = 0.39785416;
const ZCOSIS: f64 = 0.91744867;
const ZCOSGS: f64 = 0.1945905;
const ZSINGS: f64 = -0.98088458;

// Geopotential resonance coefficients
const Q22: f64 = 1.7891679e-6;
const Q31: f64 = 2.1460748e-6;
const Q33: f64 = 2.2123015e-7;
const ROOT22: f64 = 1.7891679e-6;
const ROOT32: f64 = 3.7393792e-7;
const ROOT44: f64 = 7.3636953e-9;
const ROOT52: f64 = 1.1428639e-7;
const ROOT54: f64 = 2.1765803e-9;

/// Earth rotation rate (rad/min) used by the resonance terms.
const RPTIM: f64 = 4.37526908801129966e-3;

// Resonance phase constants
const FASX2: f64 = 0.13130908;
const FASX4: f64 = 2.8843198;
const FASX6: f64 = 0.37448087;
const G22: f64 = 5.7686396;
const G32: f64 = 0.95240898;
const G44: f64 = 1.8014998;
const G52: f64 = 1.0508330;
const G54: f64 = 4.4108898;

/// Resonance integrator step (min).
const STEP: f64 = 720.0;
const STEP2: f64 = STEP * STEP / 2.0;

/// Below this inclination (or within it of 180°) node rates are dropped.
const SMALL_INCLINATION: f64 = 5.2359877e-2;

/// Below this perturbed inclination the Lyddane modification is used.
const LYDDANE_INCLINATION: f64 = 0.2;

/// Mean elements at some time since epoch, as threaded through SDP4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MeanState {
    pub ecc: f64,
    pub incl: f64,
    pub node: f64,
    pub argp: f64,
    pub mean_anomaly: f64,
    pub mean_motion: f64,
}

/// Element values and near-earth rates the deep-space model is built from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeepSpaceInput {
    /// Days since 1949-12-31 00:00 UTC.
    pub epoch_days_1950: f64,
    /// Greenwich sidereal angle at epoch (rad).
    pub gsto: f64,
    pub xke: f64,
    pub ecc: f64,
    pub incl: f64,
    pub node: f64,
    pub argp: f64,
    pub mean_anomaly: f64,
    /// Un-Kozai'd mean motion (rad/min).
    pub mean_motion: f64,
    pub mdot: f64,
    pub argpdot: f64,
    pub nodedot: f64,
}

/// Long-period coefficients for one perturbing body.
#[derive(Debug, Clone, Copy)]
struct BodyPeriodics {
    e2: f64,
    e3: f64,
    i2: f64,
    i3: f64,
    l2: f64,
    l3: f64,
    l4: f64,
    gh2: f64,
    gh3: f64,
    gh4: f64,
    h2: f64,
    h3: f64,
    /// Mean anomaly of the body at epoch (rad).
    zm0: f64,
    /// Mean motion of the body (rad/min).
    zn: f64,
    /// Eccentricity of the body's apparent orbit.
    ze: f64,
}

/// Periodic contributions (eccentricity, inclination, longitude, perigee, node).
#[derive(Debug, Clone, Copy, Default)]
struct Periodics {
    e: f64,
    i: f64,
    l: f64,
    gh: f64,
    h: f64,
}

impl std::ops::Add for Periodics {
    type Output = Periodics;
    fn add(self, rhs: Periodics) -> Periodics {
        Periodics {
            e: self.e + rhs.e,
            i: self.i + rhs.i,
            l: self.l + rhs.l,
            gh: self.gh + rhs.gh,
            h: self.h + rhs.h,
        }
    }
}

impl BodyPeriodics {
    fn from_terms(terms: &ThirdBodyTerms, emsq: f64, zm0: f64, zn: f64, ze: f64) -> Self {
        let t = terms;
        Self {
            e2: 2.0 * t.s1 * t.s6,
            e3: 2.0 * t.s1 * t.s7,
            i2: 2.0 * t.s2 * t.z12,
            i3: 2.0 * t.s2 * (t.z13 - t.z11),
            l2: -2.0 * t.s3 * t.z2,
            l3: -2.0 * t.s3 * (t.z3 - t.z1),
            l4: -2.0 * t.s3 * (-21.0 - 9.0 * emsq) * ze,
            gh2: 2.0 * t.s4 * t.z32,
            gh3: 2.0 * t.s4 * (t.z33 - t.z31),
            gh4: -18.0 * t.s4 * ze,
            h2: -2.0 * t.s2 * t.z22,
            h3: -2.0 * t.s2 * (t.z23 - t.z21),
            zm0,
            zn,
            ze,
        }
    }

    fn evaluate(&self, t: f64) -> Periodics {
        let zm = self.zm0 + self.zn * t;
        let zf = zm + 2.0 * self.ze * zm.sin();
        let sinzf = zf.sin();
        let f2 = 0.5 * sinzf * sinzf - 0.25;
        let f3 = -0.5 * sinzf * zf.cos();
        Periodics {
            e: self.e2 * f2 + self.e3 * f3,
            i: self.i2 * f2 + self.i3 * f3,
            l: self.l2 * f2 + self.l3 * f3 + self.l4 * sinzf,
            gh: self.gh2 * f2 + self.gh3 * f3 + self.gh4 * sinzf,
            h: self.h2 * f2 + self.h3 * f3,
        }
    }
}

/// Orientation of a perturbing body's orbit plus its strength coefficient.
struct ThirdBodyGeometry {
    cosg: f64,
    sing: f64,
    cosi: f64,
    sini: f64,
    cosh: f64,
    sinh: f64,
    cc: f64,
}

/// Orientation of the satellite orbit at epoch.
struct OrbitGeometry {
    sinim: f64,
    cosim: f64,
    sinomm: f64,
    cosomm: f64,
    em: f64,
    emsq: f64,
    betasq: f64,
    rtemsq: f64,
    xnoi: f64,
}

/// Intermediate terms coupling the satellite orbit to one perturbing body.
#[derive(Debug, Clone, Copy)]
struct ThirdBodyTerms {
    s1: f64,
    s2: f64,
    s3: f64,
    s4: f64,
    s5: f64,
    s6: f64,
    s7: f64,
    z1: f64,
    z2: f64,
    z3: f64,
    z11: f64,
    z12: f64,
    z13: f64,
    z21: f64,
    z22: f64,
    z23: f64,
    z31: f64,
    z32: f64,
    z33: f64,
}

impl ThirdBodyTerms {
    fn new(body: &ThirdBodyGeometry, orbit: &OrbitGeometry) -> Self {
        let (cosim, sinim) = (orbit.cosim, orbit.sinim);
        let (cosomm, sinomm) = (orbit.cosomm, orbit.sinomm);
        let emsq = orbit.emsq;

        let a1 = body.cosg * body.cosh + body.sing * body.cosi * body.sinh;
        let a3 = -body.sing * body.cosh + body.cosg * body.cosi * body.sinh;
        let a7 = -body.cosg * body.sinh + body.sing * body.cosi * body.cosh;
        let a8 = body.sing * body.sini;
        let a9 = body.sing * body.sinh + body.cosg * body.cosi * body.cosh;
        let a10 = body.cosg * body.sini;
        let a2 = cosim * a7 + sinim * a8;
        let a4 = cosim * a9 + sinim * a10;
        let a5 = -sinim * a7 + cosim * a8;
        let a6 = -sinim * a9 + cosim * a10;

        let x1 = a1 * cosomm + a2 * sinomm;
        let x2 = a3 * cosomm + a4 * sinomm;
        let x3 = -a1 * sinomm + a2 * cosomm;
        let x4 = -a3 * sinomm + a4 * cosomm;
        let x5 = a5 * sinomm;
        let x6 = a6 * sinomm;
        let x7 = a5 * cosomm;
        let x8 = a6 * cosomm;

        let z31 = 12.0 * x1 * x1 - 3.0 * x3 * x3;
        let z32 = 24.0 * x1 * x2 - 6.0 * x3 * x4;
        let z33 = 12.0 * x2 * x2 - 3.0 * x4 * x4;
        let z1 = 3.0 * (a1 * a1 + a2 * a2) + z31 * emsq;
        let z2 = 6.0 * (a1 * a3 + a2 * a4) + z32 * emsq;
        let z3 = 3.0 * (a3 * a3 + a4 * a4) + z33 * emsq;
        let z11 = -6.0 * a1 * a5 + emsq * (-24.0 * x1 * x7 - 6.0 * x3 * x5);
        let z12 = -6.0 * (a1 * a6 + a3 * a5)
            + emsq * (-24.0 * (x2 * x7 + x1 * x8) - 6.0 * (x3 * x6 + x4 * x5));
        let z13 = -6.0 * a3 * a6 + emsq * (-24.0 * x2 * x8 - 6.0 * x4 * x6);
        let z21 = 6.0 * a2 * a5 + emsq * (24.0 * x1 * x5 - 6.0 * x3 * x7);
        let z22 = 6.0 * (a4 * a5 + a2 * a6)
            + emsq * (24.0 * (x2 * x5 + x1 * x6) - 6.0 * (x4 * x7 + x3 * x8));
        let z23 = 6.0 * a4 * a6 + emsq * (24.0 * x2 * x6 - 6.0 * x4 * x8);

        let s3 = body.cc * orbit.xnoi;
        let s2 = -0.5 * s3 / orbit.rtemsq;
        let s4 = s3 * orbit.rtemsq;

        Self {
            s1: -15.0 * orbit.em * s4,
            s2,
            s3,
            s4,
            s5: x1 * x3 + x2 * x4,
            s6: x2 * x3 + x1 * x4,
            s7: x2 * x4 - x1 * x3,
            z1: z1 + z1 + orbit.betasq * z31,
            z2: z2 + z2 + orbit.betasq * z32,
            z3: z3 + z3 + orbit.betasq * z33,
            z11,
            z12,
            z13,
            z21,
            z22,
            z23,
            z31,
            z32,
            z33,
        }
    }

    /// Secular rates (e, i, M, ω, Ω·sin i) induced by this body with mean motion `zn`.
    fn secular_rates(&self, zn: f64, emsq: f64) -> [f64; 5] {
        [
            self.s1 * zn * self.s5,
            self.s2 * zn * (self.z11 + self.z13),
            -zn * self.s3 * (self.z1 + self.z3 - 14.0 - 6.0 * emsq),
            self.s4 * zn * (self.z31 + self.z33 - 6.0),
            -zn * self.s2 * (self.z21 + self.z23),
        ]
    }
}

/// Geopotential resonance parameters.
#[derive(Debug, Clone, Copy)]
enum Resonance {
    /// Geosynchronous (24-hour) resonance.
    Synchronous {
        del1: f64,
        del2: f64,
        del3: f64,
    },
    /// Half-day (12-hour) resonance for eccentric orbits such as Molniya.
    HalfDay {
        d2201: f64,
        d2211: f64,
        d3210: f64,
        d3222: f64,
        d4410: f64,
        d4422: f64,
        d5220: f64,
        d5232: f64,
        d5421: f64,
        d5433: f64,
        argpo: f64,
        argpdot: f64,
    },
}

#[derive(Debug, Clone, Copy)]
struct ResonanceState {
    kind: Resonance,
    xfact: f64,
    xlamo: f64,
}

impl ResonanceState {
    /// Rates of the resonance longitude and mean motion at the integrator state.
    fn derivatives(&self, xli: f64, xni: f64, atime: f64) -> (f64, f64, f64) {
        let xldot = xni + self.xfact;
        match self.kind {
            Resonance::Synchronous { del1, del2, del3 } => {
                let xndt = del1 * (xli - FASX2).sin()
                    + del2 * (2.0 * (xli - FASX4)).sin()
                    + del3 * (3.0 * (xli - FASX6)).sin();
                let xnddt = del1 * (xli - FASX2).cos()
                    + 2.0 * del2 * (2.0 * (xli - FASX4)).cos()
                    + 3.0 * del3 * (3.0 * (xli - FASX6)).cos();
                (xldot, xndt, xnddt * xldot)
            }
            Resonance::HalfDay {
                d2201,
                d2211,
                d3210,
                d3222,
                d4410,
                d4422,
                d5220,
                d5232,
                d5421,
                d5433,
                argpo,
                argpdot,
            } => {
                let xomi = argpo + argpdot * atime;
                let x2omi = xomi + xomi;
                let x2li = xli + xli;
                let xndt = d2201 * (x2omi + xli - G22).sin()
                    + d2211 * (xli - G22).sin()
                    + d3210 * (xomi + xli - G32).sin()
                    + d3222 * (-xomi + xli - G32).sin()
                    + d4410 * (x2omi + x2li - G44).sin()
                    + d4422 * (x2li - G44).sin()
                    + d5220 * (xomi + xli - G52).sin()
                    + d5232 * (-xomi + xli - G52).sin()
                    + d5421 * (xomi + x2li - G54).sin()
                    + d5433 * (-xomi + x2li - G54).sin();
                let xnddt = d2201 * (x2omi + xli - G22).cos()
                    + d2211 * (xli - G22).cos()
                    + d3210 * (xomi + xli - G32).cos()
                    + d3222 * (-xomi + xli - G32).cos()
                    + d5220 * (xomi + xli - G52).cos()
                    + d5232 * (-xomi + xli - G52).cos()
                    + 2.0
                        * (d4410 * (x2omi + x2li - G44).cos()
                            + d4422 * (x2li - G44).cos()
                            + d5421 * (xomi + x2li - G54).cos()
                            + d5433 * (-xomi + x2li - G54).cos());
                (xldot, xndt, xnddt * xldot)
            }
        }
    }

    /// Integrate from epoch to `t` minutes. Returns mean motion and longitude at `t`.
    fn integrate(&self, t: f64, no: f64) -> (f64, f64) {
        let delt = if t > 0.0 { STEP } else { -STEP };
        let mut atime = 0.0;
        let mut xli = self.xlamo;
        let mut xni = no;

        loop {
            let (xldot, xndt, xnddt) = self.derivatives(xli, xni, atime);
            if (t - atime).abs() < STEP {
                let ft = t - atime;
                let nm = xni + xndt * ft + xnddt * ft * ft * 0.5;
                let xl = xli + xldot * ft + xndt * ft * ft * 0.5;
                return (nm, xl);
            }
            xli += xldot * delt + xndt * STEP2;
            xni += xndt * delt + xnddt * STEP2;
            atime += delt;
        }
    }
}

/// Precomputed deep-space model for one element set.
#[derive(Debug, Clone)]
pub(crate) struct DeepSpace {
    gsto: f64,
    mean_motion: f64,
    solar: BodyPeriodics,
    lunar: BodyPeriodics,
    dedt: f64,
    didt: f64,
    dmdt: f64,
    domdt: f64,
    dnodt: f64,
    resonance: Option<ResonanceState>,
}

impl DeepSpace {
    pub(crate) fn new(input: &DeepSpaceInput) -> Self {
        let em = input.ecc;
        let nm = input.mean_motion;
        let snodm = input.node.sin();
        let cnodm = input.node.cos();
        let emsq = em * em;
        let betasq = 1.0 - emsq;

        let orbit = OrbitGeometry {
            sinim: input.incl.sin(),
            cosim: input.incl.cos(),
            sinomm: input.argp.sin(),
            cosomm: input.argp.cos(),
            em,
            emsq,
            betasq,
            rtemsq: betasq.sqrt(),
            xnoi: 1.0 / nm,
        };

        // Lunar orbit orientation at epoch
        let day = input.epoch_days_1950 + 18261.5;
        let xnodce = (4.5236020 - 9.2422029e-4 * day) % TAU;
        let stem = xnodce.sin();
        let ctem = xnodce.cos();
        let zcosil = 0.91375164 - 0.03568096 * ctem;
        let zsinil = (1.0 - zcosil * zcosil).sqrt();
        let zsinhl = 0.089683511 * stem / zsinil;
        let zcoshl = (1.0 - zsinhl * zsinhl).sqrt();
        let gam = 5.8351514 + 0.0019443680 * day;
        let zx = 0.39785416 * stem / zsinil;
        let zy = zcoshl * ctem + 0.91744867 * zsinhl * stem;
        let zx = gam + zx.atan2(zy) - xnodce;

        let solar_terms = ThirdBodyTerms::new(
            &ThirdBodyGeometry {
                cosg: ZCOSGS,
                sing: ZSINGS,
                cosi: ZCOSIS,
                sini: ZSINIS,
                cosh: cnodm,
                sinh: snodm,
                cc: C1SS,
            },
            &orbit,
        );
        let lunar_terms = ThirdBodyTerms::new(
            &ThirdBodyGeometry {
                cosg: zx.cos(),
                sing: zx.sin(),
                cosi: zcosil,
                sini: zsinil,
                cosh: zcoshl * cnodm + zsinhl * snodm,
                sinh: snodm * zcoshl - cnodm * zsinhl,
                cc: C1L,
            },
            &orbit,
        );

        let zmol = (4.7199672 + 0.22997150 * day - gam) % TAU;
        let zmos = (6.2565837 + 0.017201977 * day) % TAU;
        let solar = BodyPeriodics::from_terms(&solar_terms, emsq, zmos, ZNS, ZES);
        let lunar = BodyPeriodics::from_terms(&lunar_terms, emsq, zmol, ZNL, ZEL);

        // Secular rates
        let near_polar_equatorial =
            input.incl < SMALL_INCLINATION || input.incl > PI - SMALL_INCLINATION;
        let (sinim, cosim) = (orbit.sinim, orbit.cosim);

        let [ses, sis, sls, sghs, shs] = solar_terms.secular_rates(ZNS, emsq);
        let mut shs = if near_polar_equatorial { 0.0 } else { shs };
        if sinim != 0.0 {
            shs /= sinim;
        }
        let sgs = sghs - cosim * shs;

        let [sel, sil, sll, sghl, shll] = lunar_terms.secular_rates(ZNL, emsq);
        let shll = if near_polar_equatorial { 0.0 } else { shll };

        let dedt = ses + sel;
        let didt = sis + sil;
        let dmdt = sls + sll;
        let mut domdt = sgs + sghl;
        let mut dnodt = shs;
        if sinim != 0.0 {
            domdt -= cosim / sinim * shll;
            dnodt += shll / sinim;
        }

        let mut model = Self {
            gsto: input.gsto,
            mean_motion: nm,
            solar,
            lunar,
            dedt,
            didt,
            dmdt,
            domdt,
            dnodt,
            resonance: None,
        };
        model.resonance = model.resonance_for(input, &orbit);
        model
    }

    /// Whether the 12-hour or 24-hour resonance applies to this orbit.
    pub(crate) fn is_resonant(&self) -> bool {
        self.resonance.is_some()
    }

    fn resonance_for(&self, input: &DeepSpaceInput, orbit: &OrbitGeometry) -> Option<ResonanceState> {
        let nm = input.mean_motion;
        let em = input.ecc;
        let synchronous = nm > 0.0034906585 && nm < 0.0052359877;
        let half_day = (8.26e-3..=9.24e-3).contains(&nm) && em >= 0.5;
        if !synchronous && !half_day {
            return None;
        }

        let theta = input.gsto % TAU;
        let aonv = (nm / input.xke).powf(2.0 / 3.0);
        let (sinim, cosim) = (orbit.sinim, orbit.cosim);

        if half_day {
            let cosisq = cosim * cosim;
            let emsq = orbit.emsq;
            let eoc = em * emsq;
            let g201 = -0.306 - (em - 0.64) * 0.440;

            let (g211, g310, g322, g410, g422, g520);
            if em <= 0.65 {
                g211 = 3.616 - 13.2470 * em + 16.2900 * emsq;
                g310 = -19.302 + 117.3900 * em - 228.4190 * emsq + 156.5910 * eoc;
                g322 = -18.9068 + 109.7927 * em - 214.6334 * emsq + 146.5816 * eoc;
                g410 = -41.122 + 242.6940 * em - 471.0940 * emsq + 313.9530 * eoc;
                g422 = -146.407 + 841.8800 * em - 1629.014 * emsq + 1083.4350 * eoc;
                g520 = -532.114 + 3017.977 * em - 5740.032 * emsq + 3708.2760 * eoc;
            } else {
                g211 = -72.099 + 331.819 * em - 508.738 * emsq + 266.724 * eoc;
                g310 = -346.844 + 1582.851 * em - 2415.925 * emsq + 1246.113 * eoc;
                g322 = -342.585 + 1554.908 * em - 2366.899 * emsq + 1215.972 * eoc;
                g410 = -1052.797 + 4758.686 * em - 7193.992 * emsq + 3651.957 * eoc;
                g422 = -3581.690 + 16178.110 * em - 24462.770 * emsq + 12422.520 * eoc;
                g520 = if em > 0.715 {
                    -5149.66 + 29936.92 * em - 54087.36 * emsq + 31324.56 * eoc
                } else {
                    1464.74 - 4664.75 * em + 3763.64 * emsq
                };
            }

            let (g533, g521, g532);
            if em < 0.7 {
                g533 = -919.22770 + 4988.61 * em - 9064.77 * emsq + 5542.21 * eoc;
                g521 = -822.71072 + 4568.6173 * em - 8491.4146 * emsq + 5337.524 * eoc;
                g532 = -853.66600 + 4690.25 * em - 8624.77 * emsq + 5341.4 * eoc;
            } else {
                g533 = -37995.78 + 161616.52 * em - 229838.2 * emsq + 109377.94 * eoc;
                g521 = -51752.104 + 218913.95 * em - 309468.16 * emsq + 146349.42 * eoc;
                g532 = -40023.88 + 170470.89 * em - 242699.48 * emsq + 115605.82 * eoc;
            }

            let sini2 = sinim * sinim;
            let f220 = 0.75 * (1.0 + 2.0 * cosim + cosisq);
            let f221 = 1.5 * sini2;
            let f321 = 1.875 * sinim * (1.0 - 2.0 * cosim - 3.0 * cosisq);
            let f322 = -1.875 * sinim * (1.0 + 2.0 * cosim - 3.0 * cosisq);
            let f441 = 35.0 * sini2 * f220;
            let f442 = 39.375 * sini2 * sini2;
            let f522 = 9.84375
                * sinim
                * (sini2 * (1.0 - 2.0 * cosim - 5.0 * cosisq)
                    + 1.0 / 3.0 * (-2.0 + 4.0 * cosim + 6.0 * cosisq));
            let f523 = sinim
                * (4.92187512 * sini2 * (-2.0 - 4.0 * cosim + 10.0 * cosisq)
                    + 6.56250012 * (1.0 + 2.0 * cosim - 3.0 * cosisq));
            let f542 = 29.53125
                * sinim
                * (2.0 - 8.0 * cosim + cosisq * (-12.0 + 8.0 * cosim + 10.0 * cosisq));
            let f543 = 29.53125
                * sinim
                * (-2.0 - 8.0 * cosim + cosisq * (12.0 + 8.0 * cosim - 10.0 * cosisq));

            let mut temp1 = 3.0 * nm * nm * aonv * aonv;
            let temp = temp1 * ROOT22;
            let (d2201, d2211) = (temp * f220 * g201, temp * f221 * g211);
            temp1 *= aonv;
            let temp = temp1 * ROOT32;
            let (d3210, d3222) = (temp * f321 * g310, temp * f322 * g322);
            temp1 *= aonv;
            let temp = 2.0 * temp1 * ROOT44;
            let (d4410, d4422) = (temp * f441 * g410, temp * f442 * g422);
            temp1 *= aonv;
            let temp = temp1 * ROOT52;
            let (d5220, d5232) = (temp * f522 * g520, temp * f523 * g532);
            let temp = 2.0 * temp1 * ROOT54;
            let (d5421, d5433) = (temp * f542 * g521, temp * f543 * g533);

            Some(ResonanceState {
                kind: Resonance::HalfDay {
                    d2201,
                    d2211,
                    d3210,
                    d3222,
                    d4410,
                    d4422,
                    d5220,
                    d5232,
                    d5421,
                    d5433,
                    argpo: input.argp,
                    argpdot: input.argpdot,
                },
                xfact: input.mdot + self.dmdt + 2.0 * (input.nodedot + self.dnodt - RPTIM) - nm,
                xlamo: (input.mean_anomaly + input.node + input.node - theta - theta) % TAU,
            })
        } else {
            let emsq = orbit.emsq;
            let g200 = 1.0 + emsq * (-2.5 + 0.8125 * emsq);
            let g310 = 1.0 + 2.0 * emsq;
            let g300 = 1.0 + emsq * (-6.0 + 6.60937 * emsq);
            let f220 = 0.75 * (1.0 + cosim) * (1.0 + cosim);
            let f311 = 0.9375 * sinim * sinim * (1.0 + 3.0 * cosim) - 0.75 * (1.0 + cosim);
            let f330 = 1.875 * (1.0 + cosim).powi(3);
            let del1 = 3.0 * nm * nm * aonv * aonv;
            let xpidot = input.argpdot + input.nodedot;

            Some(ResonanceState {
                kind: Resonance::Synchronous {
                    del1: del1 * f311 * g310 * Q31 * aonv,
                    del2: 2.0 * del1 * f220 * g200 * Q22,
                    del3: 3.0 * del1 * f330 * g300 * Q33 * aonv,
                },
                xfact: input.mdot + xpidot - RPTIM + self.dmdt + self.domdt + self.dnodt - nm,
                xlamo: (input.mean_anomaly + input.node + input.argp - theta) % TAU,
            })
        }
    }

    /// Apply lunar-solar secular rates and resonance effects at `t` minutes.
    pub(crate) fn apply_secular(&self, t: f64, mean: &mut MeanState) {
        mean.ecc += self.dedt * t;
        mean.incl += self.didt * t;
        mean.argp += self.domdt * t;
        mean.node += self.dnodt * t;
        mean.mean_anomaly += self.dmdt * t;

        if let Some(resonance) = &self.resonance {
            let theta = (self.gsto + t * RPTIM) % TAU;
            let (nm, xl) = resonance.integrate(t, self.mean_motion);
            mean.mean_anomaly = match resonance.kind {
                Resonance::Synchronous { .. } => xl - mean.node - mean.argp + theta,
                Resonance::HalfDay { .. } => xl - 2.0 * mean.node + 2.0 * theta,
            };
            mean.mean_motion = nm;
        }
    }

    /// Apply lunar-solar long-period periodics at `t` minutes.
    pub(crate) fn apply_periodics(&self, t: f64, osc: &mut MeanState) {
        let p = self.solar.evaluate(t) + self.lunar.evaluate(t);

        osc.incl += p.i;
        osc.ecc += p.e;
        let sinip = osc.incl.sin();
        let cosip = osc.incl.cos();

        if osc.incl >= LYDDANE_INCLINATION {
            let ph = p.h / sinip;
            osc.argp += p.gh - cosip * ph;
            osc.node += ph;
            osc.mean_anomaly += p.l;
        } else {
            // Lyddane modification for low inclinations
            let sinop = osc.node.sin();
            let cosop = osc.node.cos();
            let alfdp = sinip * sinop + (p.h * cosop + p.i * cosip * sinop);
            let betdp = sinip * cosop + (-p.h * sinop + p.i * cosip * cosop);
            osc.node %= TAU;
            let xls = osc.mean_anomaly + osc.argp + p.l + p.gh + (cosip - p.i * sinip) * osc.node;
            let xnoh = osc.node;
            osc.node = alfdp.atan2(betdp);
            if (xnoh - osc.node).abs() > PI {
                if osc.node < xnoh {
                    osc.node += TAU;
                } else {
                    osc.node -= TAU;
                }
            }
            osc.mean_anomaly += p.l;
            osc.argp = xls - osc.mean_anomaly - cosip * osc.node;
        }
    }
}
