//! Inverse kinematics: hkl to six-circle poses.

mod detector;
mod one_sample;
mod reference;
mod symmetry;
mod three_sample;
mod two_sample;

pub use detector::DetectorAngles;
pub use reference::ReferenceAngles;
pub use symmetry::{cartesian, SymmetricValues};

use crate::constraints::{DetectorValue, ReferenceValue, SamplePair, SampleValue, SolverMode};
use crate::error::{GeometryError, HklError, VerificationError};
use crate::kinematics::{angles_to_hkl, virtual_angles, wavevector, VirtualAngles};
use crate::linalg::{angle_between, angle_difference, bounded_asin, cut_angle, normalize_checked};
use crate::position::{Axis, Position};
use crate::traits::Hardware;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Below this a sine or cosine counts as zero (parallel or collinear axes).
    pub degenerate_tolerance: f64,
    /// Allowed overshoot of a sine/cosine argument beyond ±1.
    pub bound_tolerance: f64,
    /// Angle and rotation-element agreement used when matching candidates.
    pub angle_tolerance: f64,
    /// Relative agreement of the forward-computed hkl.
    pub hkl_tolerance: f64,
    /// Return every verified pose instead of failing on ambiguity.
    pub return_all_solutions: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            degenerate_tolerance: 1e-8,
            bound_tolerance: 1e-6,
            angle_tolerance: 1e-6,
            hkl_tolerance: 1e-6,
            return_all_solutions: false,
        }
    }
}

/// One verified pose, in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct HklSolution {
    pub position: Position,
    pub virtual_angles: VirtualAngles,
    /// Diagnostics about degenerate decompositions taken on the way.
    pub notes: Vec<String>,
}

/// Quantities shared by every solving branch.
pub(crate) struct Problem<'a> {
    /// Unit Q in the phi frame.
    pub q_phi: Vector3<f64>,
    /// Unit reference vector in the phi frame.
    pub n_phi: Vector3<f64>,
    pub theta: f64,
    pub tau: f64,
    pub hardware: &'a dyn Hardware,
    pub settings: &'a SolverSettings,
}

impl Problem<'_> {
    /// Cuts `value` into the axis window; `None` when it is outside the limits.
    pub fn admit(&self, axis: Axis, value: f64) -> Option<f64> {
        let cut = self.hardware.cut_angle(axis, cut_angle(value));
        self.hardware.is_within_limits(axis, cut).then_some(cut)
    }

    pub fn same_angle(&self, a: f64, b: f64) -> bool {
        angle_difference(a, b) < self.settings.angle_tolerance
    }

    pub fn is_degenerate(&self, value: f64) -> bool {
        value.abs() < self.settings.degenerate_tolerance
    }
}

/// A pose produced by a branch before the forward re-check.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub position: Position,
    pub notes: Vec<String>,
}

impl Candidate {
    pub fn new(angles: [f64; 6], notes: Vec<String>) -> Self {
        Self {
            position: Position::from_radians(angles),
            notes,
        }
    }
}

/// Two poses are the same when every axis agrees modulo 2π.
pub(crate) fn same_position(a: &Position, b: &Position, tolerance: f64) -> bool {
    a.angles()
        .iter()
        .zip(b.angles().iter())
        .all(|(x, y)| angle_difference(*x, *y) < tolerance)
}

/// Solves `hkl` for the resolved constraint mode.
///
/// `n_phi` is the reference vector in the phi frame; `ub` maps hkl onto it.
/// Every returned pose has been re-run through the forward kinematics.
pub fn solve(
    hkl: &Vector3<f64>,
    wavelength: f64,
    ub: &Matrix3<f64>,
    n_phi: &Vector3<f64>,
    mode: &SolverMode,
    hardware: &dyn Hardware,
    settings: &SolverSettings,
) -> Result<Vec<HklSolution>, HklError> {
    let k = wavevector(wavelength)?;
    let q = ub * hkl;
    let q_norm = q.norm();
    if q_norm < settings.degenerate_tolerance {
        return Err(GeometryError::ReflectionAtOrigin.into());
    }
    let sin_theta = q_norm / (2.0 * k);
    let theta = bounded_asin(sin_theta, settings.bound_tolerance).ok_or(
        GeometryError::ReflectionTooLong {
            wavelength,
            sin_theta,
        },
    )?;
    let n_unit = normalize_checked(n_phi, settings.degenerate_tolerance).ok_or_else(|| {
        GeometryError::Degenerate("reference vector has zero length".to_string())
    })?;
    let problem = Problem {
        q_phi: q / q_norm,
        n_phi: n_unit,
        theta,
        tau: angle_between(&q, &n_unit),
        hardware,
        settings,
    };
    log::debug!(
        "solving hkl {:?}: theta {:.6}, tau {:.6} (deg)",
        hkl.as_slice(),
        theta.to_degrees(),
        problem.tau.to_degrees()
    );

    let candidates = match *mode {
        SolverMode::DetectorReferenceSample {
            detector,
            reference,
            sample,
        } => one_sample::solve(&problem, detector, reference, sample)?,
        SolverMode::ReferenceTwoSample { reference, pair } => {
            two_sample::solve(&problem, reference, pair)?
        }
        SolverMode::ThreeSample { fixed, free } => three_sample::solve(&problem, &fixed, free)?,
    };
    log::debug!("{} candidate pose(s) before verification", candidates.len());

    candidates
        .into_iter()
        .map(|candidate| -> Result<HklSolution, HklError> {
            let virtual_angles = verify(&problem, hkl, wavelength, ub, mode, &candidate.position)?;
            Ok(HklSolution {
                position: candidate.position,
                virtual_angles,
                notes: candidate.notes,
            })
        })
        .collect()
}

fn verify(
    problem: &Problem<'_>,
    hkl: &Vector3<f64>,
    wavelength: f64,
    ub: &Matrix3<f64>,
    mode: &SolverMode,
    position: &Position,
) -> Result<VirtualAngles, VerificationError> {
    let fail = |message: String| VerificationError { message };
    let computed = angles_to_hkl(position, wavelength, ub)
        .map_err(|err| fail(format!("forward calculation failed: {err}")))?;
    let allowed = problem.settings.hkl_tolerance * hkl.norm().max(1.0);
    if (computed - hkl).norm() > allowed {
        return Err(fail(format!(
            "pose [{position}] gives hkl {:?}, requested {:?}",
            computed.as_slice(),
            hkl.as_slice()
        )));
    }

    let angles = virtual_angles(position, &problem.n_phi, problem.settings.degenerate_tolerance);
    let mut checks: Vec<(&str, bool)> = Vec::with_capacity(4);
    let same = |a: f64, b: f64| problem.same_angle(a, b);
    let p = position;

    match *mode {
        SolverMode::DetectorReferenceSample {
            detector,
            reference,
            sample,
        } => {
            checks.push(match detector {
                DetectorValue::Delta(v) => ("delta", same(p.delta, v)),
                DetectorValue::Nu(v) => ("nu", same(p.nu, v)),
                DetectorValue::Qaz(v) => ("qaz", same(angles.qaz, v)),
                DetectorValue::Naz(v) => ("naz", same(angles.naz, v)),
            });
            checks.push(reference_check(problem, reference, &angles));
            checks.push(match sample {
                SampleValue::Mu(v) => ("mu", same(p.mu, v)),
                SampleValue::Eta(v) => ("eta", same(p.eta, v)),
                SampleValue::Chi(v) => ("chi", same(p.chi, v)),
                SampleValue::Phi(v) => ("phi", same(p.phi, v)),
                SampleValue::MuIsNu => ("mu_is_nu", same(p.mu, p.nu)),
                SampleValue::Bisect => ("bisect", same(2.0 * p.eta, p.delta)),
            });
        }
        SolverMode::ReferenceTwoSample { reference, pair } => {
            checks.push(reference_check(problem, reference, &angles));
            let (first, second) = match pair {
                SamplePair::ChiPhi { chi, phi } => (("chi", same(p.chi, chi)), ("phi", same(p.phi, phi))),
                SamplePair::MuEta { mu, eta } => (("mu", same(p.mu, mu)), ("eta", same(p.eta, eta))),
                SamplePair::MuChi { mu, chi } => (("mu", same(p.mu, mu)), ("chi", same(p.chi, chi))),
            };
            checks.push(first);
            checks.push(second);
        }
        SolverMode::ThreeSample { fixed, .. } => {
            for (axis, value) in fixed {
                checks.push((axis.name(), same(p.get(axis), value)));
            }
        }
    }

    match checks.iter().find(|(_, ok)| !ok) {
        Some((name, _)) => Err(fail(format!(
            "pose [{position}] does not satisfy the {name} constraint"
        ))),
        None => Ok(angles),
    }
}

fn reference_check(
    problem: &Problem<'_>,
    reference: ReferenceValue,
    angles: &VirtualAngles,
) -> (&'static str, bool) {
    let tolerance = problem.settings.angle_tolerance;
    match reference {
        ReferenceValue::AEqB => ("a_eq_b", (angles.alpha - angles.beta).abs() < tolerance),
        ReferenceValue::Alpha(v) => ("alpha", (angles.alpha - v).abs() < tolerance),
        ReferenceValue::Beta(v) => ("beta", (angles.beta - v).abs() < tolerance),
        ReferenceValue::Psi(v) => (
            "psi",
            angles.psi.map_or(false, |psi| problem.same_angle(psi, v)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::NoHardware;
    use std::f64::consts::PI;

    fn cubic_ub() -> Matrix3<f64> {
        Matrix3::identity() * (2.0 * PI)
    }

    fn mode() -> SolverMode {
        SolverMode::DetectorReferenceSample {
            detector: DetectorValue::Delta(0.0),
            reference: ReferenceValue::AEqB,
            sample: SampleValue::Mu(0.0),
        }
    }

    #[test]
    fn origin_and_too_long_reflections_fail_early() {
        let settings = SolverSettings::default();
        let err = solve(
            &Vector3::zeros(),
            1.0,
            &cubic_ub(),
            &Vector3::z(),
            &mode(),
            &NoHardware,
            &settings,
        )
        .expect_err("origin");
        assert!(matches!(err, HklError::Geometry(GeometryError::ReflectionAtOrigin)));

        let err = solve(
            &Vector3::new(3.0, 0.0, 0.0),
            1.0,
            &cubic_ub(),
            &Vector3::z(),
            &mode(),
            &NoHardware,
            &settings,
        )
        .expect_err("too long");
        assert!(matches!(
            err,
            HklError::Geometry(GeometryError::ReflectionTooLong { .. })
        ));
    }

    #[test]
    fn settings_round_trip_with_defaults_for_missing_fields() {
        let parsed: SolverSettings =
            serde_json::from_str(r#"{"return_all_solutions": true}"#).expect("valid json");
        assert!(parsed.return_all_solutions);
        assert_eq!(parsed.hkl_tolerance, 1e-6);
    }

    #[test]
    fn verification_rejects_a_wrong_pose() {
        let settings = SolverSettings::default();
        let problem = Problem {
            q_phi: Vector3::x(),
            n_phi: Vector3::z(),
            theta: PI / 6.0,
            tau: PI / 2.0,
            hardware: &NoHardware,
            settings: &settings,
        };
        let wrong = Position::from_degrees([0.0, 0.0, 60.0, 0.0, 0.0, 0.0]);
        let err = verify(&problem, &Vector3::x(), 1.0, &cubic_ub(), &mode(), &wrong)
            .expect_err("hkl (0, -0.5, 0.87) is not (1, 0, 0)");
        assert!(err.message.contains("gives hkl"));
    }
}
