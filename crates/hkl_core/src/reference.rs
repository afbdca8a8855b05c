use crate::error::{GeometryError, HklError};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Surface-normal / azimuthal reference direction.
///
/// Exactly one frame is authoritative; the other is derived through UB on
/// request, so replacing UB never leaves a stale copy behind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceVector {
    /// Reciprocal-lattice (crystal) coordinates.
    Hkl(Vector3<f64>),
    /// Phi-frame (lab, all circles at zero) coordinates.
    Phi(Vector3<f64>),
}

impl Default for ReferenceVector {
    fn default() -> Self {
        ReferenceVector::Phi(Vector3::z())
    }
}

impl ReferenceVector {
    pub fn set_hkl(&mut self, hkl: Vector3<f64>) {
        *self = ReferenceVector::Hkl(hkl);
    }

    pub fn set_phi(&mut self, phi: Vector3<f64>) {
        *self = ReferenceVector::Phi(phi);
    }

    /// Unit reference direction in the phi frame.
    pub fn n_phi(&self, ub: Option<&Matrix3<f64>>) -> Result<Vector3<f64>, HklError> {
        let raw = match self {
            ReferenceVector::Phi(v) => *v,
            ReferenceVector::Hkl(v) => ub.ok_or(HklError::NoUb)? * v,
        };
        crate::linalg::normalize_checked(&raw, 1e-12).ok_or_else(|| {
            GeometryError::Degenerate("reference vector has zero length".to_string()).into()
        })
    }

    /// Reference direction in crystal coordinates.
    pub fn n_hkl(&self, ub: Option<&Matrix3<f64>>) -> Result<Vector3<f64>, HklError> {
        match self {
            ReferenceVector::Hkl(v) => Ok(*v),
            ReferenceVector::Phi(v) => {
                let inverse = ub
                    .ok_or(HklError::NoUb)?
                    .try_inverse()
                    .ok_or_else(|| GeometryError::Degenerate("UB is singular".to_string()))?;
                Ok(inverse * v)
            }
        }
    }
}
