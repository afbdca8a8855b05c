use super::symmetry::{cartesian, SymmetricValues};
use super::Problem;
use crate::constraints::DetectorValue;
use crate::error::{GeometryError, HklError, LimitError};
use crate::linalg::{bound, bounded_acos, cut_angle};
use crate::position::Axis;

/// Detector arm pose with the azimuth of its scattering plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorAngles {
    pub delta: f64,
    pub nu: f64,
    pub qaz: f64,
}

fn qaz_of(delta: f64, nu: f64) -> f64 {
    delta.sin().atan2(delta.cos() * nu.sin())
}

/// Detector poses for 2θ and one detector constraint (delta, nu or qaz).
///
/// Each distinct scattering-plane azimuth gives one pose. Within an azimuth,
/// the representation with cos(delta) > 0 is preferred.
pub(crate) fn solve(
    problem: &Problem<'_>,
    constraint: DetectorValue,
) -> Result<Vec<DetectorAngles>, HklError> {
    let two_theta = 2.0 * problem.theta;
    let (s2t, c2t) = two_theta.sin_cos();
    let tolerance = problem.settings.bound_tolerance;
    let unreachable = |what: String| GeometryError::Unreachable(what);

    let expand = |value: f64| SymmetricValues::new(value, problem.settings.angle_tolerance);
    let sets: [SymmetricValues; 2] = match constraint {
        DetectorValue::Delta(delta) => {
            let cd = delta.cos();
            if problem.is_degenerate(cd) {
                let err = if problem.is_degenerate(c2t) {
                    GeometryError::Degenerate("nu is arbitrary with delta at 90".to_string())
                } else {
                    unreachable("delta at 90 only reaches 2theta = 90".to_string())
                };
                return Err(err.into());
            }
            let nu = bounded_acos(c2t / cd, tolerance).ok_or_else(|| {
                unreachable(format!(
                    "delta {:.4} exceeds 2theta {:.4}",
                    delta.to_degrees(),
                    two_theta.to_degrees()
                ))
            })?;
            [SymmetricValues::literal(delta), expand(nu)]
        }
        DetectorValue::Nu(nu) => {
            let cn = nu.cos();
            if problem.is_degenerate(cn) {
                let err = if problem.is_degenerate(c2t) {
                    GeometryError::Degenerate("delta is arbitrary with nu at 90".to_string())
                } else {
                    unreachable("nu at 90 only reaches 2theta = 90".to_string())
                };
                return Err(err.into());
            }
            let delta = bounded_acos(c2t / cn, tolerance).ok_or_else(|| {
                unreachable(format!(
                    "nu {:.4} exceeds 2theta {:.4}",
                    nu.to_degrees(),
                    two_theta.to_degrees()
                ))
            })?;
            [expand(delta), SymmetricValues::literal(nu)]
        }
        DetectorValue::Qaz(qaz) => {
            let sd = bound(s2t * qaz.sin(), tolerance)
                .ok_or_else(|| unreachable("qaz out of range".to_string()))?;
            [expand(sd.asin()), expand((s2t * qaz.cos()).atan2(c2t))]
        }
        DetectorValue::Naz(_) => {
            return Err(GeometryError::Degenerate(
                "naz needs the reference solution; use the naz branch".to_string(),
            )
            .into())
        }
    };

    let mut verified = 0usize;
    // (qaz, cos delta, pose with cut angles)
    let mut admitted: Vec<(f64, f64, DetectorAngles)> = Vec::new();
    for [delta, nu] in cartesian(&sets) {
        let consistent = (delta.cos() * nu.cos() - c2t).abs() < problem.settings.angle_tolerance;
        let qaz = qaz_of(delta, nu);
        let on_azimuth = match constraint {
            DetectorValue::Qaz(target) => problem.same_angle(qaz, target),
            _ => true,
        };
        if !(consistent && on_azimuth) {
            continue;
        }
        verified += 1;
        let (Some(delta_cut), Some(nu_cut)) =
            (problem.admit(Axis::Delta, delta), problem.admit(Axis::Nu, nu))
        else {
            continue;
        };
        admitted.push((
            qaz,
            delta.cos(),
            DetectorAngles {
                delta: delta_cut,
                nu: nu_cut,
                qaz,
            },
        ));
    }
    if verified == 0 {
        return Err(unreachable("no detector pose reproduces 2theta".to_string()).into());
    }
    if admitted.is_empty() {
        return Err(LimitError::Exhausted(format!(
            "all {verified} detector poses are outside the delta/nu limits"
        ))
        .into());
    }

    let mut chosen: Vec<DetectorAngles> = Vec::new();
    let mut groups: Vec<f64> = Vec::new();
    for (qaz, _, _) in &admitted {
        if !groups.iter().any(|g| problem.same_angle(*g, *qaz)) {
            groups.push(*qaz);
        }
    }
    for group in groups {
        let members: Vec<&(f64, f64, DetectorAngles)> = admitted
            .iter()
            .filter(|(qaz, _, _)| problem.same_angle(*qaz, group))
            .collect();
        let best = members
            .iter()
            .map(|(_, cd, _)| *cd)
            .fold(f64::NEG_INFINITY, f64::max);
        let top: Vec<DetectorAngles> = members
            .iter()
            .filter(|(_, cd, _)| (cd - best).abs() < problem.settings.angle_tolerance)
            .map(|(_, _, pose)| *pose)
            .collect();
        let first = top[0];
        let distinct = 1 + top[1..]
            .iter()
            .filter(|pose| !problem.same_angle(pose.nu, first.nu))
            .count();
        if distinct > 1 {
            return Err(LimitError::Ambiguous { count: distinct }.into());
        }
        chosen.push(first);
    }
    log::debug!("{} detector pose(s) for {constraint:?}", chosen.len());
    Ok(chosen)
}

/// Detector poses when the reference azimuth naz and incidence alpha are fixed:
/// cos(qaz − naz) = (cos tau − sin theta sin alpha) / (cos theta cos alpha).
pub(crate) fn solve_naz(
    problem: &Problem<'_>,
    naz: f64,
    alpha: f64,
) -> Result<Vec<DetectorAngles>, HklError> {
    let (st, ct) = problem.theta.sin_cos();
    let (sa, ca) = alpha.sin_cos();
    if problem.is_degenerate(ct * ca) {
        return Err(GeometryError::Degenerate(
            "qaz is arbitrary when theta or alpha is 90".to_string(),
        )
        .into());
    }
    let offset = bounded_acos(
        (problem.tau.cos() - st * sa) / (ct * ca),
        problem.settings.bound_tolerance,
    )
    .ok_or_else(|| {
        GeometryError::Unreachable("naz and alpha are inconsistent with tau".to_string())
    })?;

    let mut azimuths = vec![cut_angle(naz + offset)];
    if !problem.same_angle(naz + offset, naz - offset) {
        azimuths.push(cut_angle(naz - offset));
    }
    let mut poses = Vec::new();
    let mut first_error = None;
    for qaz in azimuths {
        match solve(problem, DetectorValue::Qaz(qaz)) {
            Ok(found) => poses.extend(found),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match (poses.is_empty(), first_error) {
        (true, Some(err)) => Err(err),
        _ => Ok(poses),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{AxisLimits, NoHardware};
    use crate::solver::SolverSettings;
    use crate::traits::Hardware;
    use nalgebra::Vector3;

    fn problem<'a>(
        theta_deg: f64,
        hardware: &'a dyn Hardware,
        settings: &'a SolverSettings,
    ) -> Problem<'a> {
        Problem {
            q_phi: Vector3::x(),
            n_phi: Vector3::z(),
            theta: theta_deg.to_radians(),
            tau: std::f64::consts::FRAC_PI_2,
            hardware,
            settings,
        }
    }

    #[test]
    fn fixed_delta_gives_one_pose_per_azimuth() {
        let settings = SolverSettings::default();
        let p = problem(30.0, &NoHardware, &settings);
        let poses = solve(&p, DetectorValue::Delta(0.0)).expect("reachable");
        assert_eq!(poses.len(), 2);
        assert!((poses[0].nu.to_degrees() - 60.0).abs() < 1e-9);
        assert!(poses[0].qaz.abs() < 1e-12);
        assert!((poses[1].nu.to_degrees() + 60.0).abs() < 1e-9);
    }

    #[test]
    fn qaz_prefers_positive_cos_delta_but_falls_back_inside_limits() {
        let settings = SolverSettings::default();
        let p = problem(30.0, &NoHardware, &settings);
        let qaz = 0.4;
        let poses = solve(&p, DetectorValue::Qaz(qaz)).expect("reachable");
        assert_eq!(poses.len(), 1);
        assert!(poses[0].delta.cos() > 0.0);
        assert!((qaz_of(poses[0].delta, poses[0].nu) - qaz).abs() < 1e-9);

        let limits = AxisLimits::new().with_degrees(Axis::Delta, Some(90.0), Some(270.0));
        let p = problem(30.0, &limits, &settings);
        let poses = solve(&p, DetectorValue::Qaz(qaz)).expect("other branch");
        assert_eq!(poses.len(), 1);
        assert!(poses[0].delta.cos() < 0.0);
        let two_theta = (poses[0].delta.cos() * poses[0].nu.cos()).acos();
        assert!((two_theta.to_degrees() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_delta_is_unreachable_and_limits_exhaust() {
        let settings = SolverSettings::default();
        let p = problem(10.0, &NoHardware, &settings);
        assert!(matches!(
            solve(&p, DetectorValue::Delta(40.0_f64.to_radians())),
            Err(HklError::Geometry(GeometryError::Unreachable(_)))
        ));

        let limits = AxisLimits::new().with_degrees(Axis::Nu, Some(100.0), Some(120.0));
        let p = problem(10.0, &limits, &settings);
        assert!(matches!(
            solve(&p, DetectorValue::Delta(0.0)),
            Err(HklError::Limits(LimitError::Exhausted(_)))
        ));
    }

    #[test]
    fn naz_branch_matches_tau() {
        let settings = SolverSettings::default();
        let mut p = problem(30.0, &NoHardware, &settings);
        p.tau = 1.1;
        let (naz, alpha) = (0.3, 0.2);
        let poses = solve_naz(&p, naz, alpha).expect("reachable");
        assert!(!poses.is_empty());
        for pose in poses {
            let q = crate::kinematics::q_lab_direction(p.theta, pose.qaz);
            let n = crate::kinematics::n_lab_direction(naz, alpha);
            assert!((q.dot(&n) - p.tau.cos()).abs() < 1e-9);
        }
    }
}
