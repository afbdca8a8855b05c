use super::detector;
use super::one_sample::admit_sample;
use super::reference;
use super::{Candidate, Problem};
use crate::constraints::{DetectorValue, ReferenceValue, SamplePair};
use crate::error::{GeometryError, HklError, LimitError};
use crate::geometry::{circle_matrix, sample_rotation};
use crate::kinematics::psi_angle;
use crate::linalg::{bounded_acos, normalize_checked};
use crate::position::Axis;
use nalgebra::Vector3;
use std::f64::consts::PI;

pub(crate) fn solve(
    problem: &Problem<'_>,
    reference: ReferenceValue,
    pair: SamplePair,
) -> Result<Vec<Candidate>, HklError> {
    let references = reference::solve(problem, reference)?;
    let alpha = references[0].alpha;
    let beams = beam_in_phi_frame(problem, alpha)?;

    let mut candidates = Vec::new();
    let mut reachable = false;
    let mut first_error: Option<HklError> = None;
    for beam in beams {
        let mut notes = Vec::new();
        let poses = sample_poses(problem, &beam, pair, &mut notes);
        for angles in poses {
            let [mu, eta, chi, phi] = angles;
            let z = sample_rotation(mu, eta, chi, phi);
            if ((z * beam) - Vector3::y()).amax() > problem.settings.angle_tolerance {
                continue;
            }
            let q_lab = z * problem.q_phi;
            if let ReferenceValue::Psi(psi) = reference {
                let n_lab = z * problem.n_phi;
                let forward = psi_angle(
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
            reachable = true;
            let Some([mu, eta, chi, phi]) = admit_sample(problem, angles) else {
                continue;
            };
            let qaz = q_lab.x.atan2(q_lab.z);
            match detector::solve(problem, DetectorValue::Qaz(qaz)) {
                Ok(found) if !found.is_empty() => {
                    candidates.extend(found.into_iter().map(|pose| {
                        Candidate::new([mu, pose.delta, pose.nu, eta, chi, phi], notes.clone())
                    }));
                    // One pose per beam root; the others differ by symmetry only.
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    log::debug!(
                        "sample pose ({mu:.4}, {eta:.4}, {chi:.4}, {phi:.4}) rejected: {err}"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
    }

    if !candidates.is_empty() {
        return Ok(candidates);
    }
    if let Some(err) = first_error {
        return Err(err);
    }
    if reachable {
        Err(LimitError::Exhausted(format!(
            "{pair:?}: every sample pose is outside the limits"
        ))
        .into())
    } else {
        Err(GeometryError::Unreachable(format!(
            "{pair:?} cannot bring Q into diffraction"
        ))
        .into())
    }
}

/// Beam direction in the phi frame, y' = a·q̂ + b·n̂ + c·(q̂ × n̂). The two
/// signs of c are the two roots.
fn beam_in_phi_frame(
    problem: &Problem<'_>,
    alpha: f64,
) -> Result<Vec<Vector3<f64>>, GeometryError> {
    let (s_tau, c_tau) = problem.tau.sin_cos();
    let s2 = s_tau * s_tau;
    if problem.is_degenerate(s2) {
        return Err(GeometryError::ParallelReference);
    }
    let (st, sa) = (problem.theta.sin(), alpha.sin());
    let a = (-st + sa * c_tau) / s2;
    let b = (-sa + st * c_tau) / s2;
    let in_plane = a * a + b * b + 2.0 * a * b * c_tau;
    let c_squared = (1.0 - in_plane) / s2;
    if c_squared < -problem.settings.bound_tolerance {
        return Err(GeometryError::Unreachable(format!(
            "alpha = {:.4} is incompatible with theta and tau",
            alpha.to_degrees()
        )));
    }
    let c = c_squared.max(0.0).sqrt();
    let cross = problem.q_phi.cross(&problem.n_phi);
    let base = problem.q_phi * a + problem.n_phi * b;

    let mut roots = vec![base + cross * c];
    if !problem.is_degenerate(c) {
        roots.push(base - cross * c);
    }
    Ok(roots
        .into_iter()
        .filter_map(|y| normalize_checked(&y, problem.settings.degenerate_tolerance))
        .collect())
}

/// Sample angles (mu, eta, chi, phi) taking the beam from `beam` in the phi
/// frame onto the lab beam with two circles fixed.
fn sample_poses(
    problem: &Problem<'_>,
    beam: &Vector3<f64>,
    pair: SamplePair,
    notes: &mut Vec<String>,
) -> Vec<[f64; 4]> {
    let mut degenerate = |message: &str| {
        log::warn!("{message}");
        notes.push(message.to_string());
    };
    match pair {
        SamplePair::ChiPhi { chi, phi } => {
            let w = circle_matrix(Axis::Chi, chi) * circle_matrix(Axis::Phi, phi) * beam;
            let r = w.x.hypot(w.y);
            if problem.is_degenerate(r) {
                degenerate("beam along the eta axis: eta is arbitrary, set to 0");
                return vec![[(-w.z).atan2(0.0), 0.0, chi, phi]];
            }
            let eta = (-w.x).atan2(w.y);
            vec![
                [(-w.z).atan2(r), eta, chi, phi],
                [(-w.z).atan2(-r), eta + PI, chi, phi],
            ]
        }
        SamplePair::MuEta { mu, eta } => {
            let m = (circle_matrix(Axis::Mu, mu) * circle_matrix(Axis::Eta, eta)).transpose()
                * Vector3::y();
            let rho = beam.x.hypot(beam.y);
            let phis = if problem.is_degenerate(rho) {
                degenerate("beam along the phi axis: phi is arbitrary, set to 0");
                vec![0.0]
            } else {
                let gamma = beam.x.atan2(beam.y);
                match bounded_acos(m.y / rho, problem.settings.bound_tolerance) {
                    Some(offset) => vec![offset - gamma, -offset - gamma],
                    None => return Vec::new(),
                }
            };
            phis.into_iter()
                .map(|phi| {
                    let u = circle_matrix(Axis::Phi, phi) * beam;
                    let chi = m.x.atan2(m.z) - u.x.atan2(u.z);
                    [mu, eta, chi, phi]
                })
                .collect()
        }
        SamplePair::MuChi { mu, chi } => {
            let phi = (-beam.x).atan2(beam.y);
            [phi, phi + PI]
                .into_iter()
                .map(|phi| {
                    let u = circle_matrix(Axis::Phi, phi) * beam;
                    [mu, (-u.z).atan2(u.y), chi, phi]
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::NoHardware;
    use crate::solver::SolverSettings;
    use std::f64::consts::FRAC_PI_2;

    fn problem<'a>(settings: &'a SolverSettings) -> Problem<'a> {
        let q = Vector3::new(1.0, 0.5, 0.3).normalize();
        let n = Vector3::new(0.2, -0.1, 1.0).normalize();
        Problem {
            q_phi: q,
            n_phi: n,
            theta: 0.4,
            tau: q.dot(&n).acos(),
            hardware: &NoHardware,
            settings,
        }
    }

    #[test]
    fn beam_roots_satisfy_all_three_conditions() {
        let settings = SolverSettings::default();
        let p = problem(&settings);
        let alpha = 0.1;
        let roots = beam_in_phi_frame(&p, alpha).expect("reachable");
        assert_eq!(roots.len(), 2);
        for y in roots {
            assert!((y.norm() - 1.0).abs() < 1e-12);
            assert!((p.q_phi.dot(&y) + p.theta.sin()).abs() < 1e-12);
            assert!((p.n_phi.dot(&y) + alpha.sin()).abs() < 1e-12);
        }
    }

    #[test]
    fn each_pair_maps_the_beam_onto_y() {
        let settings = SolverSettings::default();
        let p = problem(&settings);
        let beam = beam_in_phi_frame(&p, 0.1).expect("reachable")[0];
        for pair in [
            SamplePair::ChiPhi { chi: 0.3, phi: -0.2 },
            SamplePair::MuEta { mu: 0.4, eta: 0.3 },
            SamplePair::MuChi { mu: 0.0, chi: FRAC_PI_2 },
        ] {
            let mut notes = Vec::new();
            let poses = sample_poses(&p, &beam, pair, &mut notes);
            assert!(!poses.is_empty(), "{pair:?}");
            assert!(notes.is_empty());
            for [mu, eta, chi, phi] in poses {
                let lab = sample_rotation(mu, eta, chi, phi) * beam;
                assert!((lab - Vector3::y()).amax() < 1e-9, "{pair:?}: {lab:?}");
            }
        }
    }

    #[test]
    fn beam_along_eta_axis_is_noted() {
        let settings = SolverSettings::default();
        let p = problem(&settings);
        let mut notes = Vec::new();
        let poses = sample_poses(
            &p,
            &Vector3::z(),
            SamplePair::ChiPhi { chi: 0.0, phi: 0.0 },
            &mut notes,
        );
        assert_eq!(poses.len(), 1);
        assert_eq!(notes.len(), 1);
        let [mu, eta, chi, phi] = poses[0];
        let lab = sample_rotation(mu, eta, chi, phi) * Vector3::z();
        assert!((lab - Vector3::y()).amax() < 1e-9);
    }
}
