//! Unit cell and the Busing–Levy B matrix.

use crate::error::GeometryError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tolerance on the spherical-triangle cosines before a cell is rejected.
const COSINE_TOLERANCE: f64 = 1e-6;

/// Direct-lattice parameters: lengths in Å, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeParameters {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl LatticeParameters {
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        }
    }

    pub fn cubic(a: f64) -> Self {
        Self::new(a, a, a, 90.0, 90.0, 90.0)
    }

    fn validate(&self) -> Result<(), GeometryError> {
        for (name, length) in [("a", self.a), ("b", self.b), ("c", self.c)] {
            if !length.is_finite() || length <= 0.0 {
                return Err(GeometryError::InvalidLattice(format!(
                    "length {name} must be positive, got {length}"
                )));
            }
        }
        for (name, angle) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
        ] {
            if !angle.is_finite() || angle <= 0.0 || angle >= 180.0 {
                return Err(GeometryError::InvalidLattice(format!(
                    "angle {name} must lie strictly between 0 and 180 degrees, got {angle}"
                )));
            }
        }
        Ok(())
    }
}

/// A crystal under study. The B matrix is derived once from the lattice and
/// replaced together with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    pub name: String,
    lattice: LatticeParameters,
    b_matrix: Matrix3<f64>,
    volume: f64,
}

impl Crystal {
    pub fn new(name: impl Into<String>, lattice: LatticeParameters) -> Result<Self, GeometryError> {
        lattice.validate()?;
        let (b_matrix, volume) = busing_levy_b(&lattice)?;
        Ok(Self {
            name: name.into(),
            lattice,
            b_matrix,
            volume,
        })
    }

    pub fn lattice(&self) -> &LatticeParameters {
        &self.lattice
    }

    /// Maps hkl onto a Cartesian reciprocal-space vector (2π convention).
    pub fn b_matrix(&self) -> &Matrix3<f64> {
        &self.b_matrix
    }

    /// Direct cell volume in Å³.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Interplanar spacing d(hkl) from the direct metric tensor; zero at the origin.
    pub fn hkl_plane_distance(&self, hkl: &Vector3<f64>) -> f64 {
        let l = &self.lattice;
        let (ca, cb, cg) = (
            l.alpha.to_radians().cos(),
            l.beta.to_radians().cos(),
            l.gamma.to_radians().cos(),
        );
        let metric = Matrix3::new(
            l.a * l.a,
            l.a * l.b * cg,
            l.a * l.c * cb,
            l.a * l.b * cg,
            l.b * l.b,
            l.b * l.c * ca,
            l.a * l.c * cb,
            l.b * l.c * ca,
            l.c * l.c,
        );
        let Some(reciprocal_metric) = metric.try_inverse() else {
            return 0.0;
        };
        let inverse_square = hkl.dot(&(reciprocal_metric * hkl));
        if inverse_square <= 0.0 {
            return 0.0;
        }
        1.0 / inverse_square.sqrt()
    }

    /// Angle in radians between two reciprocal-lattice directions.
    pub fn angle_between_hkls(&self, first: &Vector3<f64>, second: &Vector3<f64>) -> f64 {
        crate::linalg::angle_between(&(self.b_matrix * first), &(self.b_matrix * second))
    }
}

fn checked_acos(value: f64, what: &str) -> Result<f64, GeometryError> {
    crate::linalg::bounded_acos(value, COSINE_TOLERANCE).ok_or_else(|| {
        GeometryError::InvalidLattice(format!(
            "cell angles are inconsistent ({what} has cosine {value:.6})"
        ))
    })
}

fn busing_levy_b(l: &LatticeParameters) -> Result<(Matrix3<f64>, f64), GeometryError> {
    let (alpha1, alpha2, alpha3) = (
        l.alpha.to_radians(),
        l.beta.to_radians(),
        l.gamma.to_radians(),
    );
    let (ca1, ca2, ca3) = (alpha1.cos(), alpha2.cos(), alpha3.cos());
    let (sa1, sa2, sa3) = (alpha1.sin(), alpha2.sin(), alpha3.sin());

    let beta2 = checked_acos((ca1 * ca3 - ca2) / (sa1 * sa3), "beta*")?;
    let beta3 = checked_acos((ca1 * ca2 - ca3) / (sa1 * sa2), "gamma*")?;
    checked_acos((ca2 * ca3 - ca1) / (sa2 * sa3), "alpha*")?;

    let volume_term = 1.0 + 2.0 * ca1 * ca2 * ca3 - ca1 * ca1 - ca2 * ca2 - ca3 * ca3;
    if volume_term < COSINE_TOLERANCE {
        return Err(GeometryError::InvalidLattice(
            "cell angles do not span a volume".to_string(),
        ));
    }
    let volume = l.a * l.b * l.c * volume_term.sqrt();

    let b1 = 2.0 * PI * l.b * l.c * sa1 / volume;
    let b2 = 2.0 * PI * l.a * l.c * sa2 / volume;
    let b3 = 2.0 * PI * l.a * l.b * sa3 / volume;

    let b = Matrix3::new(
        b1,
        b2 * beta3.cos(),
        b3 * beta2.cos(),
        0.0,
        b2 * beta3.sin(),
        -b3 * beta2.sin() * ca1,
        0.0,
        0.0,
        2.0 * PI / l.c,
    );
    Ok((b, volume))
}
