use super::Problem;
use crate::constraints::ReferenceValue;
use crate::error::GeometryError;
use crate::linalg::{bounded_acos, bounded_asin};
use std::f64::consts::FRAC_PI_2;

/// Reference-vector angles consistent with (theta, tau) and one reference
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceAngles {
    pub psi: f64,
    pub alpha: f64,
    pub beta: f64,
}

/// Solves the remaining two of (psi, alpha, beta) from
/// sin(alpha) = cos(tau)sin(theta) − cos(theta)sin(tau)cos(psi) and
/// sin(beta)  = cos(tau)sin(theta) + cos(theta)sin(tau)cos(psi).
///
/// A constrained alpha or beta fixes cos(psi) only, so both signs of psi
/// are returned.
pub(crate) fn solve(
    problem: &Problem<'_>,
    reference: ReferenceValue,
) -> Result<Vec<ReferenceAngles>, GeometryError> {
    let (st, ct) = problem.theta.sin_cos();
    let (s_tau, c_tau) = problem.tau.sin_cos();
    if problem.is_degenerate(s_tau) {
        return Err(GeometryError::ParallelReference);
    }
    if problem.is_degenerate(ct) {
        return Err(GeometryError::Degenerate(
            "psi is undefined for back-scattering (theta = 90)".to_string(),
        ));
    }
    let tolerance = problem.settings.bound_tolerance;
    let asin = |value: f64, what: &str| {
        bounded_asin(value, tolerance).ok_or_else(|| {
            GeometryError::Unreachable(format!("{what} would need sine {value:.6}"))
        })
    };
    let psi_pair = |cos_psi: f64, what: &str| -> Result<Vec<f64>, GeometryError> {
        let psi = bounded_acos(cos_psi, tolerance).ok_or_else(|| {
            GeometryError::Unreachable(format!("{what} would need cos(psi) = {cos_psi:.6}"))
        })?;
        if problem.is_degenerate(psi.sin()) {
            Ok(vec![psi])
        } else {
            Ok(vec![psi, -psi])
        }
    };
    let in_plane = c_tau * st;
    let out_of_plane = ct * s_tau;

    let solutions = match reference {
        ReferenceValue::Psi(psi) => {
            let cp = psi.cos();
            vec![ReferenceAngles {
                psi,
                alpha: asin(in_plane - out_of_plane * cp, "psi")?,
                beta: asin(in_plane + out_of_plane * cp, "psi")?,
            }]
        }
        ReferenceValue::Alpha(alpha) => {
            let beta = asin(2.0 * in_plane - alpha.sin(), "alpha")?;
            psi_pair((in_plane - alpha.sin()) / out_of_plane, "alpha")?
                .into_iter()
                .map(|psi| ReferenceAngles { psi, alpha, beta })
                .collect()
        }
        ReferenceValue::Beta(beta) => {
            let alpha = asin(2.0 * in_plane - beta.sin(), "beta")?;
            psi_pair((beta.sin() - in_plane) / out_of_plane, "beta")?
                .into_iter()
                .map(|psi| ReferenceAngles { psi, alpha, beta })
                .collect()
        }
        ReferenceValue::AEqB => {
            let alpha = asin(in_plane, "a_eq_b")?;
            [FRAC_PI_2, -FRAC_PI_2]
                .into_iter()
                .map(|psi| ReferenceAngles {
                    psi,
                    alpha,
                    beta: alpha,
                })
                .collect()
        }
    };
    Ok(solutions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::NoHardware;
    use crate::solver::SolverSettings;
    use nalgebra::Vector3;

    fn problem(theta_deg: f64, tau_deg: f64, settings: &SolverSettings) -> Problem<'_> {
        Problem {
            q_phi: Vector3::x(),
            n_phi: Vector3::z(),
            theta: theta_deg.to_radians(),
            tau: tau_deg.to_radians(),
            hardware: &NoHardware,
            settings,
        }
    }

    #[test]
    fn alpha_constraint_yields_both_psi_signs() {
        let settings = SolverSettings::default();
        let p = problem(30.0, 70.0, &settings);
        let alpha = 5.0_f64.to_radians();
        let solutions = solve(&p, ReferenceValue::Alpha(alpha)).expect("reachable");
        assert_eq!(solutions.len(), 2);
        assert!((solutions[0].psi + solutions[1].psi).abs() < 1e-12);
        for s in &solutions {
            let back = solve(&p, ReferenceValue::Psi(s.psi)).expect("reachable");
            assert!((back[0].alpha - alpha).abs() < 1e-12);
            assert!((back[0].beta - s.beta).abs() < 1e-12);
        }
    }

    #[test]
    fn equal_angles_sit_at_right_angle_psi() {
        let settings = SolverSettings::default();
        let p = problem(30.0, 90.0, &settings);
        let solutions = solve(&p, ReferenceValue::AEqB).expect("reachable");
        assert_eq!(solutions.len(), 2);
        assert!(solutions.iter().all(|s| s.alpha.abs() < 1e-12 && s.beta == s.alpha));
    }

    #[test]
    fn parallel_reference_is_reported() {
        let settings = SolverSettings::default();
        let p = problem(30.0, 0.0, &settings);
        for reference in [
            ReferenceValue::AEqB,
            ReferenceValue::Alpha(0.1),
            ReferenceValue::Beta(0.1),
            ReferenceValue::Psi(0.1),
        ] {
            assert_eq!(solve(&p, reference), Err(GeometryError::ParallelReference));
        }
    }

    #[test]
    fn impossible_incidence_is_unreachable() {
        let settings = SolverSettings::default();
        let p = problem(10.0, 10.0, &settings);
        assert!(matches!(
            solve(&p, ReferenceValue::Alpha(80.0_f64.to_radians())),
            Err(GeometryError::Unreachable(_))
        ));
    }
}
