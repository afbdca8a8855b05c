//! Three sample circles fixed: A + B cos y + C sin y = −sin θ in the free
//! circle's right-handed angle y.

use super::detector;
use super::one_sample::admit_sample;
use super::{same_position, Candidate, Problem};
use crate::constraints::DetectorValue;
use crate::error::{GeometryError, HklError, LimitError};
use crate::geometry::{circle_axis, circle_matrix, sample_rotation};
use crate::linalg::bounded_acos;
use crate::position::Axis;
use nalgebra::{Matrix3, Vector3};

pub(crate) fn solve(
    problem: &Problem<'_>,
    fixed: &[(Axis, f64); 3],
    free: Axis,
) -> Result<Vec<Candidate>, HklError> {
    let mut angles = [0.0; 4];
    for (i, axis) in Axis::SAMPLE.iter().enumerate() {
        if let Some((_, value)) = fixed.iter().find(|(f, _)| f == axis) {
            angles[i] = *value;
        }
    }
    let free_index = Axis::SAMPLE
        .iter()
        .position(|axis| *axis == free)
        .ok_or_else(|| GeometryError::Degenerate(format!("{free} is not a sample circle")))?;

    let mut outer = Matrix3::identity();
    let mut inner = Matrix3::identity();
    for (i, axis) in Axis::SAMPLE.iter().enumerate() {
        if i < free_index {
            outer *= circle_matrix(*axis, angles[i]);
        } else if i > free_index {
            inner *= circle_matrix(*axis, angles[i]);
        }
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut reachable = false;
    let mut first_error: Option<HklError> = None;
    for value in free_angles(problem, &outer, &inner, free)? {
        let mut pose = angles;
        pose[free_index] = value;
        let [mu, eta, chi, phi] = pose;
        let q_lab = sample_rotation(mu, eta, chi, phi) * problem.q_phi;
        if (q_lab.y + problem.theta.sin()).abs() > problem.settings.angle_tolerance {
            continue;
        }
        reachable = true;
        let Some([mu, eta, chi, phi]) = admit_sample(problem, pose) else {
            continue;
        };
        let qaz = q_lab.x.atan2(q_lab.z);
        match detector::solve(problem, DetectorValue::Qaz(qaz)) {
            Ok(found) => {
                for detector in found {
                    let candidate =
                        Candidate::new([mu, detector.delta, detector.nu, eta, chi, phi], Vec::new());
                    let tolerance = problem.settings.angle_tolerance;
                    if !candidates
                        .iter()
                        .any(|c| same_position(&c.position, &candidate.position, tolerance))
                    {
                        candidates.push(candidate);
                    }
                }
            }
            Err(err) => {
                log::debug!("{free} = {:.4} rejected: {err}", value.to_degrees());
                first_error.get_or_insert(err);
            }
        }
    }

    match candidates.len() {
        0 => Err(match first_error {
            Some(err) => err,
            None if reachable => LimitError::Exhausted(format!(
                "every {free} solution is outside the limits"
            ))
            .into(),
            None => GeometryError::Unreachable(format!("no {free} angle satisfies Bragg")).into(),
        }),
        1 => Ok(candidates),
        count if !problem.settings.return_all_solutions => {
            Err(LimitError::Ambiguous { count }.into())
        }
        _ => Ok(candidates),
    }
}

/// Roots of A + B cos y + C sin y = −sin θ mapped back to circle angles.
fn free_angles(
    problem: &Problem<'_>,
    outer: &Matrix3<f64>,
    inner: &Matrix3<f64>,
    free: Axis,
) -> Result<Vec<f64>, GeometryError> {
    let (axis, sense) = circle_axis(free);
    let m: Vector3<f64> = outer.transpose() * Vector3::y();
    let p: Vector3<f64> = inner * problem.q_phi;

    let a = m.dot(&axis) * axis.dot(&p);
    let b = m.dot(&p) - a;
    let c = m.dot(&axis.cross(&p));
    let r = b.hypot(c);
    let d = -problem.theta.sin() - a;

    if problem.is_degenerate(r) {
        return Err(if problem.is_degenerate(d) {
            GeometryError::Degenerate(format!("Bragg condition does not depend on {free}"))
        } else {
            GeometryError::Unreachable(format!("{free} cannot bring Q into diffraction"))
        });
    }
    let offset = bounded_acos(d / r, problem.settings.bound_tolerance).ok_or_else(|| {
        GeometryError::Unreachable(format!("no {free} angle satisfies Bragg"))
    })?;
    let phase = c.atan2(b);
    let mut roots = vec![phase + offset];
    if !problem.is_degenerate(offset) {
        roots.push(phase - offset);
    }
    Ok(roots.into_iter().map(|y| sense * y).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{AxisLimits, NoHardware};
    use crate::solver::SolverSettings;
    use crate::traits::Hardware;
    use std::f64::consts::PI;

    fn problem<'a>(hardware: &'a dyn Hardware, settings: &'a SolverSettings) -> Problem<'a> {
        Problem {
            q_phi: Vector3::z(),
            n_phi: Vector3::x(),
            theta: PI / 6.0,
            tau: PI / 2.0,
            hardware,
            settings,
        }
    }

    fn fixed_except(free: Axis) -> [(Axis, f64); 3] {
        let mut fixed = [(Axis::Mu, 0.0); 3];
        let others = Axis::SAMPLE.iter().filter(|axis| **axis != free);
        for (slot, axis) in fixed.iter_mut().zip(others) {
            *slot = (*axis, 0.0);
        }
        fixed
    }

    #[test]
    fn free_mu_has_two_roots_and_is_ambiguous() {
        let settings = SolverSettings::default();
        let p = problem(&NoHardware, &settings);
        let err = solve(&p, &fixed_except(Axis::Mu), Axis::Mu).expect_err("two roots");
        assert!(matches!(err, HklError::Limits(LimitError::Ambiguous { count: 2 })));

        let settings = SolverSettings {
            return_all_solutions: true,
            ..SolverSettings::default()
        };
        let p = problem(&NoHardware, &settings);
        let all = solve(&p, &fixed_except(Axis::Mu), Axis::Mu).expect("all roots");
        let mut mus: Vec<f64> = all.iter().map(|c| c.position.mu.to_degrees()).collect();
        mus.sort_by(f64::total_cmp);
        assert!((mus[0] - 30.0).abs() < 1e-9);
        assert!((mus[1] - 150.0).abs() < 1e-9);
    }

    #[test]
    fn mu_limit_selects_one_root() {
        let settings = SolverSettings::default();
        let limits = AxisLimits::new().with_degrees(Axis::Mu, Some(-90.0), Some(90.0));
        let p = problem(&limits, &settings);
        let found = solve(&p, &fixed_except(Axis::Mu), Axis::Mu).expect("one root");
        assert_eq!(found.len(), 1);
        let pose = found[0].position;
        assert!((pose.mu.to_degrees() - 30.0).abs() < 1e-9);
        assert!(pose.delta.abs() < 1e-9);
        assert!((pose.nu.to_degrees() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn circle_collinear_with_q_cannot_diffract() {
        let settings = SolverSettings::default();
        let p = problem(&NoHardware, &settings);
        // phi rotates about z, which is Q itself here.
        let err = solve(&p, &fixed_except(Axis::Phi), Axis::Phi).expect_err("phi is useless");
        assert!(matches!(
            err,
            HklError::Geometry(GeometryError::Unreachable(_))
        ));
    }
}
