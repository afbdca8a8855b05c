//! One detector, one reference and one sample constraint.

use super::detector::{self, DetectorAngles};
use super::reference;
use super::symmetry::{cartesian, SymmetricValues};
use super::{Candidate, Problem};
use crate::constraints::{DetectorValue, ReferenceValue, SampleValue};
use crate::error::{GeometryError, HklError, LimitError};
use crate::geometry::{circle_matrix, sample_rotation};
use crate::kinematics::{n_lab_direction, n_lab_from_psi, q_lab_direction};
use crate::linalg::{bounded_acos, bounded_asin, max_abs_difference, rotation_from_vector_pairs};
use crate::position::Axis;
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

pub(crate) fn solve(
    problem: &Problem<'_>,
    detector: DetectorValue,
    reference: ReferenceValue,
    sample: SampleValue,
) -> Result<Vec<Candidate>, HklError> {
    let references = reference::solve(problem, reference)?;

    // Each detector pose paired with every reference-vector direction it allows.
    let mut branches: Vec<(DetectorAngles, Vec<Vector3<f64>>)> = Vec::new();
    match detector {
        DetectorValue::Naz(naz) => {
            let alpha = references[0].alpha;
            let n_lab = n_lab_direction(naz, alpha);
            for pose in detector::solve_naz(problem, naz, alpha)? {
                if let ReferenceValue::Psi(psi) = reference {
                    let q_lab = q_lab_direction(problem.theta, pose.qaz);
                    let forward = crate::kinematics::psi_angle(
                        &q_lab,
                        &n_lab,
                        problem.theta,
                        problem.tau,
                        problem.settings.degenerate_tolerance,
                    );
                    if !forward.is_some_and(|value| problem.same_angle(value, psi)) {
                        continue;
                    }
                }
                branches.push((pose, vec![n_lab]));
            }
            if branches.is_empty() {
                return Err(GeometryError::Unreachable(
                    "no scattering azimuth gives the requested psi".to_string(),
                )
                .into());
            }
        }
        other => {
            for pose in detector::solve(problem, other)? {
                let normals = references
                    .iter()
                    .map(|r| n_lab_from_psi(problem.theta, pose.qaz, problem.tau, r.psi))
                    .collect();
                branches.push((pose, normals));
            }
        }
    }

    let mut candidates = Vec::new();
    let mut first_error: Option<HklError> = None;
    for (pose, normals) in branches {
        match best_sample_pose(problem, &pose, &normals, sample) {
            Ok(candidate) => candidates.push(candidate),
            Err(err) => {
                log::debug!("detector pose {pose:?} rejected: {err}");
                first_error.get_or_insert(err);
            }
        }
    }
    match (candidates.is_empty(), first_error) {
        (true, Some(err)) => Err(err),
        _ => Ok(candidates),
    }
}

/// Shortest-distance sample pose for one detector pose over all reference
/// directions.
fn best_sample_pose(
    problem: &Problem<'_>,
    pose: &DetectorAngles,
    normals: &[Vector3<f64>],
    sample: SampleValue,
) -> Result<Candidate, HklError> {
    let (fixed_axis, fixed_value) = match sample {
        SampleValue::Mu(v) => (Axis::Mu, v),
        SampleValue::Eta(v) => (Axis::Eta, v),
        SampleValue::Chi(v) => (Axis::Chi, v),
        SampleValue::Phi(v) => (Axis::Phi, v),
        SampleValue::MuIsNu => (Axis::Mu, pose.nu),
        SampleValue::Bisect => (Axis::Eta, pose.delta / 2.0),
    };
    let q_lab = q_lab_direction(problem.theta, pose.qaz);
    let tolerance = problem.settings.angle_tolerance;

    let mut best: Option<(f64, [f64; 4], Vec<String>)> = None;
    let mut reachable = false;
    let mut decomposed = false;
    for n_lab in normals {
        let z = rotation_from_vector_pairs(
            &problem.q_phi,
            &problem.n_phi,
            &q_lab,
            n_lab,
            problem.settings.degenerate_tolerance,
        )
        .ok_or(GeometryError::ParallelReference)?;
        let mut notes = Vec::new();
        let primaries = match decompose(problem, &z, fixed_axis, fixed_value, &mut notes) {
            Ok(primaries) => primaries,
            Err(err) => {
                log::debug!("no {fixed_axis} decomposition: {err}");
                continue;
            }
        };
        decomposed = true;
        for primary in primaries {
            let sets: [SymmetricValues; 4] = std::array::from_fn(|i| {
                if Axis::SAMPLE[i] == fixed_axis {
                    SymmetricValues::literal(primary[i])
                } else {
                    SymmetricValues::new(primary[i], tolerance)
                }
            });
            for angles in cartesian(&sets) {
                let [mu, eta, chi, phi] = angles;
                if max_abs_difference(&sample_rotation(mu, eta, chi, phi), &z) > tolerance {
                    continue;
                }
                reachable = true;
                let Some(cut) = admit_sample(problem, angles) else {
                    continue;
                };
                let distance: f64 = Axis::SAMPLE
                    .iter()
                    .zip(cut)
                    .filter(|(axis, _)| **axis != fixed_axis)
                    .map(|(_, value)| value.abs())
                    .sum();
                if best.as_ref().map_or(true, |(d, _, _)| distance < *d - tolerance) {
                    best = Some((distance, cut, notes.clone()));
                }
            }
        }
    }

    match best {
        Some((_, [mu, eta, chi, phi], notes)) => Ok(Candidate::new(
            [mu, pose.delta, pose.nu, eta, chi, phi],
            notes,
        )),
        None if reachable => Err(LimitError::Exhausted(format!(
            "{fixed_axis} fixed at {:.4}: every sample pose is outside the limits",
            fixed_value.to_degrees()
        ))
        .into()),
        None if decomposed => Err(GeometryError::Unreachable(format!(
            "no sample rotation with {fixed_axis} = {:.4}",
            fixed_value.to_degrees()
        ))
        .into()),
        None => Err(GeometryError::Unreachable(format!(
            "{fixed_axis} = {:.4} cannot orient Q and the reference vector",
            fixed_value.to_degrees()
        ))
        .into()),
    }
}

pub(crate) fn admit_sample(problem: &Problem<'_>, angles: [f64; 4]) -> Option<[f64; 4]> {
    let mut cut = [0.0; 4];
    for (slot, (axis, value)) in cut.iter_mut().zip(Axis::SAMPLE.iter().zip(angles)) {
        *slot = problem.admit(*axis, value)?;
    }
    Some(cut)
}

/// Decomposes Z with one circle fixed. Returns primary (mu, eta, chi, phi)
/// solutions; degenerate cases pick the decomposition with the undetermined
/// angle at zero and leave a note.
fn decompose(
    problem: &Problem<'_>,
    z: &Matrix3<f64>,
    axis: Axis,
    value: f64,
    notes: &mut Vec<String>,
) -> Result<Vec<[f64; 4]>, GeometryError> {
    let bound = problem.settings.bound_tolerance;
    let mut degenerate = |message: &str| {
        log::warn!("{message}");
        notes.push(message.to_string());
    };

    match axis {
        Axis::Mu => {
            let e = circle_matrix(Axis::Mu, -value) * z;
            let sin_chi = e[(0, 2)].hypot(e[(1, 2)]);
            if problem.is_degenerate(sin_chi) {
                degenerate("chi is 0 or 180: eta and phi are collinear, phi set to 0");
                let chi = if e[(2, 2)] > 0.0 { 0.0 } else { PI };
                return Ok(vec![[value, e[(0, 1)].atan2(e[(1, 1)]), chi, 0.0]]);
            }
            let chi = sin_chi.atan2(e[(2, 2)]);
            let eta = (-e[(1, 2)]).atan2(e[(0, 2)]);
            let phi = (-e[(2, 1)]).atan2(-e[(2, 0)]);
            Ok(vec![[value, eta, chi, phi]])
        }
        Axis::Phi => {
            let a = z * circle_matrix(Axis::Phi, value).transpose();
            let eta = bounded_asin(a[(0, 1)], bound)
                .ok_or_else(|| GeometryError::Unreachable("eta out of range".to_string()))?;
            if problem.is_degenerate(eta.cos()) {
                degenerate("eta is +-90: mu and chi are collinear, chi set to 0");
                let mu = (-a[(1, 2)]).atan2(a[(2, 2)]);
                return Ok(vec![[mu, eta, 0.0, value]]);
            }
            let mu = a[(2, 1)].atan2(a[(1, 1)]);
            let chi = a[(0, 2)].atan2(a[(0, 0)]);
            Ok(vec![[mu, eta, chi, value]])
        }
        Axis::Eta => {
            let cos_eta = value.cos();
            let chis = if problem.is_degenerate(cos_eta) {
                degenerate("eta is +-90: mu and chi are collinear, chi set to 0");
                vec![0.0]
            } else {
                let chi = bounded_asin(z[(0, 2)] / cos_eta, bound).ok_or_else(|| {
                    GeometryError::Unreachable(format!(
                        "eta = {:.4} cannot reach this orientation",
                        value.to_degrees()
                    ))
                })?;
                vec![chi, PI - chi]
            };
            let mut primaries = Vec::with_capacity(2);
            for chi in chis {
                let w = circle_matrix(Axis::Eta, value) * circle_matrix(Axis::Chi, chi);
                let (mu, phi) = outer_pair(problem, z, &w, &mut degenerate);
                primaries.push([mu, value, chi, phi]);
            }
            Ok(primaries)
        }
        Axis::Chi => {
            let sin_chi = value.sin();
            if problem.is_degenerate(sin_chi) {
                degenerate("chi is 0 or 180: eta and phi are collinear, phi set to 0");
                let b = z * circle_matrix(Axis::Chi, value).transpose();
                let mu = (-b[(1, 2)]).atan2(b[(2, 2)]);
                let eta = b[(0, 1)].atan2(b[(0, 0)]);
                return Ok(vec![[mu, eta, value, 0.0]]);
            }
            let eta = bounded_acos(z[(0, 2)] / sin_chi, bound).ok_or_else(|| {
                GeometryError::Unreachable(format!(
                    "chi = {:.4} cannot reach this orientation",
                    value.to_degrees()
                ))
            })?;
            let mut primaries = Vec::with_capacity(2);
            for eta in [eta, -eta] {
                let w = circle_matrix(Axis::Eta, eta) * circle_matrix(Axis::Chi, value);
                let (mu, phi) = outer_pair(problem, z, &w, &mut degenerate);
                primaries.push([mu, eta, value, phi]);
            }
            Ok(primaries)
        }
        Axis::Delta | Axis::Nu => Err(GeometryError::Degenerate(format!(
            "{axis} is not a sample circle"
        ))),
    }
}

/// Solves Z = MU · W · PHI for (mu, phi) with the middle rotation W known.
fn outer_pair(
    problem: &Problem<'_>,
    z: &Matrix3<f64>,
    w: &Matrix3<f64>,
    degenerate: &mut impl FnMut(&str),
) -> (f64, f64) {
    if problem.is_degenerate(w[(1, 2)].hypot(w[(2, 2)])) {
        degenerate("chi axis along the beam: mu and phi are collinear, phi set to 0");
        let a = z * w.transpose();
        return (a[(2, 1)].atan2(a[(1, 1)]), 0.0);
    }
    let mu = z[(2, 2)].atan2(z[(1, 2)]) - w[(2, 2)].atan2(w[(1, 2)]);
    let phi = z[(0, 1)].atan2(z[(0, 0)]) - w[(0, 1)].atan2(w[(0, 0)]);
    (mu, phi)
}
