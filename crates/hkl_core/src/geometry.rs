//! Lab frame: the beam travels along +y, z is up. The sample stack is
//! mu (about x) carrying eta (about −z) carrying chi (about y) carrying
//! phi (about −z). The detector arm is nu (about x) carrying delta (about −z).

use crate::linalg::{x_rotation, y_rotation, z_rotation};
use crate::position::{Axis, Position};
use crate::traits::Geometry;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Per-circle rotation matrices for one pose.
#[derive(Debug, Clone, Copy)]
pub struct CircleMatrices {
    pub mu: Matrix3<f64>,
    pub delta: Matrix3<f64>,
    pub nu: Matrix3<f64>,
    pub eta: Matrix3<f64>,
    pub chi: Matrix3<f64>,
    pub phi: Matrix3<f64>,
}

impl CircleMatrices {
    pub fn new(position: &Position) -> Self {
        let p = position.to_radians();
        Self {
            mu: circle_matrix(Axis::Mu, p.mu),
            delta: circle_matrix(Axis::Delta, p.delta),
            nu: circle_matrix(Axis::Nu, p.nu),
            eta: circle_matrix(Axis::Eta, p.eta),
            chi: circle_matrix(Axis::Chi, p.chi),
            phi: circle_matrix(Axis::Phi, p.phi),
        }
    }

    /// Phi frame to lab frame.
    pub fn sample(&self) -> Matrix3<f64> {
        self.mu * self.eta * self.chi * self.phi
    }

    /// Rotation applied to the incident wavevector to give the scattered one.
    pub fn detector(&self) -> Matrix3<f64> {
        self.nu * self.delta
    }
}

/// Rotation axis and handedness of a circle: the circle matrix is a
/// right-handed rotation by `sense * angle` about `axis`.
pub fn circle_axis(axis: Axis) -> (Vector3<f64>, f64) {
    match axis {
        Axis::Mu | Axis::Nu => (Vector3::x(), 1.0),
        Axis::Chi => (Vector3::y(), 1.0),
        Axis::Delta | Axis::Eta | Axis::Phi => (Vector3::z(), -1.0),
    }
}

pub fn circle_matrix(axis: Axis, angle: f64) -> Matrix3<f64> {
    match axis {
        Axis::Mu | Axis::Nu => x_rotation(angle),
        Axis::Chi => y_rotation(angle),
        Axis::Delta | Axis::Eta | Axis::Phi => z_rotation(-angle),
    }
}

/// Sample stack rotation for angles in radians.
pub fn sample_rotation(mu: f64, eta: f64, chi: f64, phi: f64) -> Matrix3<f64> {
    circle_matrix(Axis::Mu, mu)
        * circle_matrix(Axis::Eta, eta)
        * circle_matrix(Axis::Chi, chi)
        * circle_matrix(Axis::Phi, phi)
}

/// Unit incident-beam direction.
pub fn incident_direction() -> Vector3<f64> {
    Vector3::y()
}

/// Unit scattered-beam direction for detector angles in radians.
pub fn scattered_direction(delta: f64, nu: f64) -> Vector3<f64> {
    circle_matrix(Axis::Nu, nu) * circle_matrix(Axis::Delta, delta) * incident_direction()
}

/// Momentum transfer in the lab frame for wavevector magnitude `k`.
pub fn q_lab(delta: f64, nu: f64, k: f64) -> Vector3<f64> {
    (scattered_direction(delta, nu) - incident_direction()) * k
}

/// Momentum transfer in the phi frame for a six-circle pose.
pub fn q_phi(position: &Position, k: f64) -> Vector3<f64> {
    let p = position.to_radians();
    let lab = q_lab(p.delta, p.nu, k);
    sample_rotation(p.mu, p.eta, p.chi, p.phi).transpose() * lab
}

/// Full six-circle instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SixCircle;

impl Geometry for SixCircle {
    fn name(&self) -> &'static str {
        "sixc"
    }

    fn to_six_circle(&self, position: &Position) -> Position {
        *position
    }
}

/// Vertical four-circle instrument: mu and nu do not exist and read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FourCircle;

impl Geometry for FourCircle {
    fn name(&self) -> &'static str {
        "fourc"
    }

    fn to_six_circle(&self, position: &Position) -> Position {
        let mut pinned = *position;
        pinned.mu = 0.0;
        pinned.nu = 0.0;
        pinned
    }

    fn pinned_axes(&self) -> &'static [Axis] {
        &[Axis::Mu, Axis::Nu]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn scattering_angle_follows_both_detector_circles() {
        let (delta, nu) = (0.4_f64, -0.7_f64);
        let q = q_lab(delta, nu, 1.0);
        let two_theta = (delta.cos() * nu.cos()).acos();
        assert!((q.norm() - 2.0 * (two_theta / 2.0).sin()).abs() < 1e-12);
    }

    #[test]
    fn delta_scatters_in_horizontal_plane() {
        let q = q_lab(std::f64::consts::FRAC_PI_2, 0.0, 1.0);
        assert_abs_diff_eq!(q, Vector3::new(1.0, -1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn four_circle_ignores_mu_and_nu() {
        let pos = Position::from_degrees([10.0, 40.0, 5.0, 20.0, 80.0, -30.0]);
        let mut plain = pos;
        plain.mu = 0.0;
        plain.nu = 0.0;
        assert_abs_diff_eq!(
            FourCircle.calculate_q_phi(&pos),
            SixCircle.calculate_q_phi(&plain),
            epsilon = 1e-12
        );
    }

    #[test]
    fn sample_rotation_matches_circle_product() {
        let pos = Position::from_radians([0.1, 0.0, 0.0, 0.2, 0.3, 0.4]);
        let matrices = CircleMatrices::new(&pos);
        assert_abs_diff_eq!(
            matrices.sample(),
            sample_rotation(0.1, 0.2, 0.3, 0.4),
            epsilon = 1e-12
        );
    }
}
