use crate::error::{GeometryError, HklError};
use crate::geometry::{incident_direction, q_phi, sample_rotation, scattered_direction};
use crate::linalg::{angle_between, normalize_checked};
use crate::position::Position;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Derived angles for one pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VirtualAngles {
    pub theta: f64,
    /// Azimuth of the scattering plane, measured from z towards x.
    pub qaz: f64,
    /// Azimuth of the reference vector in the lab frame.
    pub naz: f64,
    /// Angle between Q and the reference vector.
    pub tau: f64,
    /// Rotation of the reference vector about Q; undefined when the
    /// reference is parallel to Q or the beam is back-scattered.
    pub psi: Option<f64>,
    /// Incidence angle of the beam on the reference surface.
    pub alpha: f64,
    /// Exit angle.
    pub beta: f64,
}

impl VirtualAngles {
    pub fn two_theta(&self) -> f64 {
        2.0 * self.theta
    }
}

/// Wavevector magnitude 2π/λ.
pub fn wavevector(wavelength: f64) -> Result<f64, HklError> {
    if !wavelength.is_finite() || wavelength <= 0.0 {
        return Err(HklError::InvalidWavelength(wavelength));
    }
    Ok(2.0 * PI / wavelength)
}

pub fn invert_ub(ub: &Matrix3<f64>) -> Result<Matrix3<f64>, GeometryError> {
    ub.try_inverse()
        .ok_or_else(|| GeometryError::Degenerate("UB matrix is singular".to_string()))
}

/// hkl reached by a six-circle pose.
pub fn angles_to_hkl(
    position: &Position,
    wavelength: f64,
    ub: &Matrix3<f64>,
) -> Result<Vector3<f64>, HklError> {
    let k = wavevector(wavelength)?;
    Ok(invert_ub(ub)? * q_phi(position, k))
}

/// Virtual angles for a six-circle pose and a unit phi-frame reference vector.
pub fn virtual_angles(position: &Position, n_phi: &Vector3<f64>, tolerance: f64) -> VirtualAngles {
    let p = position.to_radians();
    let (sd, cd) = p.delta.sin_cos();
    let (sn, cn) = p.nu.sin_cos();

    let two_theta = (cd * cn).clamp(-1.0, 1.0).acos();
    let theta = two_theta / 2.0;
    let qaz = sd.atan2(cd * sn);

    let n_lab = sample_rotation(p.mu, p.eta, p.chi, p.phi) * n_phi;
    let naz = n_lab.x.atan2(n_lab.z);
    let alpha = (-n_lab.y).clamp(-1.0, 1.0).asin();
    let k_out = scattered_direction(p.delta, p.nu);
    let beta = n_lab.dot(&k_out).clamp(-1.0, 1.0).asin();

    let q_lab = k_out - incident_direction();
    let tau = angle_between(&q_lab, &n_lab);
    let psi = psi_angle(&q_lab, &n_lab, theta, tau, tolerance);

    VirtualAngles {
        theta,
        qaz,
        naz,
        tau,
        psi,
        alpha,
        beta,
    }
}

/// psi = atan2(n·e3, n·e_perp) in the frame (q̂, e_perp, e3) where e_perp is
/// the in-plane direction perpendicular to Q.
pub(crate) fn psi_angle(
    q_lab: &Vector3<f64>,
    n_lab: &Vector3<f64>,
    theta: f64,
    tau: f64,
    tolerance: f64,
) -> Option<f64> {
    let q_unit = normalize_checked(q_lab, tolerance)?;
    let (st, ct) = theta.sin_cos();
    if ct.abs() < tolerance || tau.sin().abs() < tolerance {
        return None;
    }
    let e_perp = (incident_direction() + q_unit * st) / ct;
    let e3 = q_unit.cross(&e_perp);
    Some(n_lab.dot(&e3).atan2(n_lab.dot(&e_perp)))
}

/// Lab-frame unit Q for a scattering angle and azimuth.
pub fn q_lab_direction(theta: f64, qaz: f64) -> Vector3<f64> {
    let (st, ct) = theta.sin_cos();
    let (sq, cq) = qaz.sin_cos();
    Vector3::new(ct * sq, -st, ct * cq)
}

/// Lab-frame unit reference vector from its azimuth and incidence angle.
pub fn n_lab_direction(naz: f64, alpha: f64) -> Vector3<f64> {
    let (sa, ca) = alpha.sin_cos();
    let (sn, cn) = naz.sin_cos();
    Vector3::new(ca * sn, -sa, ca * cn)
}

/// Lab-frame unit reference vector from (theta, qaz, tau, psi).
pub fn n_lab_from_psi(theta: f64, qaz: f64, tau: f64, psi: f64) -> Vector3<f64> {
    let q_unit = q_lab_direction(theta, qaz);
    let (st, ct) = theta.sin_cos();
    let e_perp = (incident_direction() + q_unit * st) / ct;
    let e3 = q_unit.cross(&e_perp);
    let (s_tau, c_tau) = tau.sin_cos();
    let (s_psi, c_psi) = psi.sin_cos();
    q_unit * c_tau + (e_perp * c_psi + e3 * s_psi) * s_tau
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::q_lab;
    use approx::assert_abs_diff_eq;

    const TOL: f64 = 1e-10;

    fn pose(deg: [f64; 6]) -> Position {
        Position::from_degrees(deg)
    }

    #[test]
    fn cubic_100_at_nu_sixty() {
        let ub = Matrix3::identity() * (2.0 * PI);
        // |hkl| = 1 at wavelength 1 scatters at theta = 30°.
        let position = pose([0.0, 0.0, 60.0, 0.0, 0.0, 0.0]);
        let q = q_phi(&position, 2.0 * PI);
        let hkl = angles_to_hkl(&position, 1.0, &ub).expect("valid");
        assert_abs_diff_eq!(hkl * (2.0 * PI), q, epsilon = 1e-12);
        assert!((hkl.norm() - 1.0).abs() < 1e-12);

        let angles = virtual_angles(&position, &Vector3::z(), TOL);
        assert!((angles.two_theta().to_degrees() - 60.0).abs() < 1e-9);
        assert!(angles.qaz.abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_wavelength_and_singular_ub() {
        let position = pose([0.0; 6]);
        assert!(matches!(
            angles_to_hkl(&position, 0.0, &Matrix3::identity()),
            Err(HklError::InvalidWavelength(_))
        ));
        assert!(matches!(
            angles_to_hkl(&position, 1.0, &Matrix3::zeros()),
            Err(HklError::Geometry(GeometryError::Degenerate(_)))
        ));
    }

    #[test]
    fn incidence_and_exit_follow_psi_identities() {
        let n_phi = Vector3::new(0.3, -0.2, 0.9).normalize();
        for deg in [
            [3.0, 25.0, 40.0, 10.0, 35.0, -20.0],
            [-7.0, -12.0, 70.0, 55.0, -80.0, 140.0],
            [0.0, 60.0, 0.0, 30.0, 90.0, 0.0],
        ] {
            let angles = virtual_angles(&pose(deg), &n_phi, TOL);
            let psi = angles.psi.expect("generic pose");
            let (st, ct) = angles.theta.sin_cos();
            let (s_tau, c_tau) = angles.tau.sin_cos();
            assert!((angles.alpha.sin() - (c_tau * st - ct * s_tau * psi.cos())).abs() < 1e-10);
            assert!((angles.beta.sin() - (c_tau * st + ct * s_tau * psi.cos())).abs() < 1e-10);

            let p = pose(deg).to_radians();
            let n_lab = sample_rotation(p.mu, p.eta, p.chi, p.phi) * n_phi;
            assert_abs_diff_eq!(
                n_lab_from_psi(angles.theta, angles.qaz, angles.tau, psi),
                n_lab,
                epsilon = 1e-10
            );
            assert_abs_diff_eq!(n_lab_direction(angles.naz, angles.alpha), n_lab, epsilon = 1e-10);
            assert_abs_diff_eq!(
                q_lab_direction(angles.theta, angles.qaz),
                q_lab(p.delta, p.nu, 1.0).normalize(),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn psi_is_undefined_along_q() {
        // At delta = 0, nu = 60° the lab Q is (0, -sin 30°, cos 30°).
        let position = pose([0.0, 0.0, 60.0, 0.0, 0.0, 0.0]);
        let n_phi = Vector3::new(0.0, -0.5, 0.75_f64.sqrt());
        let angles = virtual_angles(&position, &n_phi, 1e-6);
        assert!(angles.tau.abs() < 1e-6);
        assert!(angles.psi.is_none());
        assert!((angles.alpha - angles.theta).abs() < 1e-12);
    }
}
