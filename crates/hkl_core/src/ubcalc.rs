//! Orientation (U) and UB calculation from measured reflections.
//!
//! U rotates the crystal's Cartesian reciprocal frame (B·hkl) into the phi
//! frame; UB = U·B maps hkl straight onto the phi-frame momentum transfer.

use crate::crystal::{Crystal, LatticeParameters};
use crate::error::{Advisory, GeometryError, HklError};
use crate::linalg::{axis_angle_rotation, normalize_checked, rotation_from_vector_pairs};
use crate::reference::ReferenceVector;
use crate::reflections::{Reflection, ReflectionList};
use crate::traits::Geometry;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Below this norm a reflection vector, or the cross product of two of them,
/// carries no usable direction.
pub const ORIENTATION_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationMethod {
    TwoReflections,
    /// Rotation about the reflection's own direction is undetermined.
    OneReflection,
    ManualU,
    ManualUb,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationMatrix {
    /// Absent when UB was entered by hand without a crystal to factor out B.
    pub u: Option<Matrix3<f64>>,
    pub ub: Matrix3<f64>,
    pub method: OrientationMethod,
}

/// U from two reflections via orthonormal triads in the crystal and phi frames.
pub fn u_from_two_reflections(
    first: &Reflection,
    second: &Reflection,
    b_matrix: &Matrix3<f64>,
    geometry: &dyn Geometry,
) -> Result<Matrix3<f64>, GeometryError> {
    let h1c = b_matrix * first.hkl;
    let h2c = b_matrix * second.hkl;
    let q1 = geometry.calculate_q_phi(&first.position);
    let q2 = geometry.calculate_q_phi(&second.position);

    let unit = |v: &Vector3<f64>, what: &str| {
        normalize_checked(v, ORIENTATION_TOLERANCE).ok_or_else(|| {
            GeometryError::InvalidOrientationReflection(format!("{what} has no usable signal"))
        })
    };
    let h1c = unit(&h1c, "first reflection hkl")?;
    let h2c = unit(&h2c, "second reflection hkl")?;
    let q1 = unit(&q1, "first reflection position")?;
    let q2 = unit(&q2, "second reflection position")?;

    rotation_from_vector_pairs(&h1c, &h2c, &q1, &q2, ORIENTATION_TOLERANCE).ok_or_else(|| {
        GeometryError::InvalidOrientationReflection(
            "the two reflections are parallel or anti-parallel".to_string(),
        )
    })
}

/// Minimal rotation carrying the crystal-frame hkl direction onto the measured q.
pub fn u_from_one_reflection(
    reflection: &Reflection,
    b_matrix: &Matrix3<f64>,
    geometry: &dyn Geometry,
) -> Result<Matrix3<f64>, GeometryError> {
    let h = normalize_checked(&(b_matrix * reflection.hkl), ORIENTATION_TOLERANCE).ok_or_else(
        || GeometryError::InvalidOrientationReflection("reflection hkl is zero".to_string()),
    )?;
    let q = normalize_checked(
        &geometry.calculate_q_phi(&reflection.position),
        ORIENTATION_TOLERANCE,
    )
    .ok_or_else(|| {
        GeometryError::InvalidOrientationReflection(
            "reflection position has no scattering".to_string(),
        )
    })?;

    let cos_angle = h.dot(&q).clamp(-1.0, 1.0);
    match normalize_checked(&h.cross(&q), 1e-12) {
        Some(axis) => Ok(axis_angle_rotation(&axis, cos_angle.acos())),
        None if cos_angle > 0.0 => Ok(Matrix3::identity()),
        None => {
            // Anti-parallel: any axis perpendicular to h works.
            let helper = if h.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
            let axis = h.cross(&helper).normalize();
            Ok(axis_angle_rotation(&axis, PI))
        }
    }
}

/// Orientation state for one sample: crystal, reflections, reference vector and UB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UbCalculation {
    pub name: String,
    crystal: Option<Crystal>,
    reflections: ReflectionList,
    #[serde(default)]
    reference: ReferenceVector,
    orientation: Option<OrientationMatrix>,
    auto_calculate: bool,
}

impl UbCalculation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            crystal: None,
            reflections: ReflectionList::default(),
            reference: ReferenceVector::default(),
            orientation: None,
            auto_calculate: true,
        }
    }

    pub fn crystal(&self) -> Option<&Crystal> {
        self.crystal.as_ref()
    }

    pub fn reflections(&self) -> &ReflectionList {
        &self.reflections
    }

    pub fn orientation(&self) -> Option<&OrientationMatrix> {
        self.orientation.as_ref()
    }

    pub fn ub(&self) -> Option<&Matrix3<f64>> {
        self.orientation.as_ref().map(|o| &o.ub)
    }

    pub fn u(&self) -> Option<&Matrix3<f64>> {
        self.orientation.as_ref().and_then(|o| o.u.as_ref())
    }

    pub fn require_ub(&self) -> Result<&Matrix3<f64>, HklError> {
        self.ub().ok_or(HklError::NoUb)
    }

    /// False while a manually entered U/UB is protected from recalculation.
    pub fn auto_calculate(&self) -> bool {
        self.auto_calculate
    }

    /// Replaces the lattice. An existing U is kept and UB rebuilt on the new B.
    pub fn set_lattice(
        &mut self,
        name: impl Into<String>,
        lattice: LatticeParameters,
    ) -> Result<(), HklError> {
        let crystal = Crystal::new(name, lattice)?;
        let b = *crystal.b_matrix();
        if let Some(orientation) = self.orientation.as_mut() {
            match (orientation.method, orientation.u) {
                (OrientationMethod::ManualUb, _) | (_, None) => {
                    orientation.u = b.try_inverse().map(|b_inv| orientation.ub * b_inv);
                }
                (_, Some(u)) => orientation.ub = u * b,
            }
        }
        self.crystal = Some(crystal);
        Ok(())
    }

    pub fn add_reflection(
        &mut self,
        reflection: Reflection,
        geometry: &dyn Geometry,
    ) -> Result<Option<Advisory>, HklError> {
        let index = self.reflections.push(reflection);
        self.after_reflection_edit(index < 2, geometry)
    }

    pub fn edit_reflection(
        &mut self,
        index: usize,
        reflection: Reflection,
        geometry: &dyn Geometry,
    ) -> Result<Option<Advisory>, HklError> {
        self.reflections.replace(index, reflection)?;
        self.after_reflection_edit(index < 2, geometry)
    }

    pub fn delete_reflection(
        &mut self,
        index: usize,
        geometry: &dyn Geometry,
    ) -> Result<Option<Advisory>, HklError> {
        self.reflections.remove(index)?;
        self.after_reflection_edit(index < 2, geometry)
    }

    pub fn swap_reflections(
        &mut self,
        first: usize,
        second: usize,
        geometry: &dyn Geometry,
    ) -> Result<Option<Advisory>, HklError> {
        self.reflections.swap(first, second)?;
        self.after_reflection_edit(first.min(second) < 2 && first != second, geometry)
    }

    fn after_reflection_edit(
        &mut self,
        touches_orientation: bool,
        geometry: &dyn Geometry,
    ) -> Result<Option<Advisory>, HklError> {
        if !touches_orientation || self.reflections.len() < 2 {
            return Ok(None);
        }
        if !self.auto_calculate {
            log::debug!("{}: orientation reflections changed, UB is manual", self.name);
            return Ok(Some(Advisory::AutoCalculationDisabled));
        }
        if self.crystal.is_none() {
            log::debug!("{}: orientation reflections changed, no crystal yet", self.name);
            return Ok(None);
        }
        log::debug!("{}: recalculating UB after reflection edit", self.name);
        self.calculate_ub(geometry)
    }

    /// Computes U and UB from the first one or two reflections and re-enables
    /// automatic recalculation.
    pub fn calculate_ub(&mut self, geometry: &dyn Geometry) -> Result<Option<Advisory>, HklError> {
        let crystal = self.crystal.as_ref().ok_or(HklError::NoCrystal)?;
        let b = *crystal.b_matrix();
        let (u, method) = match self.reflections.orientation_pair() {
            (Some(first), Some(second)) => (
                u_from_two_reflections(first, second, &b, geometry)?,
                OrientationMethod::TwoReflections,
            ),
            (Some(first), None) => (
                u_from_one_reflection(first, &b, geometry)?,
                OrientationMethod::OneReflection,
            ),
            (None, _) => return Err(HklError::NoReflections),
        };
        self.orientation = Some(OrientationMatrix {
            u: Some(u),
            ub: u * b,
            method,
        });
        self.auto_calculate = true;
        log::debug!("{}: UB calculated ({:?})", self.name, method);
        Ok((method == OrientationMethod::OneReflection).then_some(Advisory::LowConfidenceOrientation))
    }

    /// Sets U by hand. Requires a crystal to form UB.
    pub fn set_u_manual(&mut self, u: Matrix3<f64>) -> Result<(), HklError> {
        let b = *self.crystal.as_ref().ok_or(HklError::NoCrystal)?.b_matrix();
        self.orientation = Some(OrientationMatrix {
            u: Some(u),
            ub: u * b,
            method: OrientationMethod::ManualU,
        });
        self.auto_calculate = false;
        Ok(())
    }

    /// Sets UB by hand; U is factored out when a crystal is present.
    pub fn set_ub_manual(&mut self, ub: Matrix3<f64>) {
        let u = self
            .crystal
            .as_ref()
            .and_then(|c| c.b_matrix().try_inverse())
            .map(|b_inv| ub * b_inv);
        self.orientation = Some(OrientationMatrix {
            u,
            ub,
            method: OrientationMethod::ManualUb,
        });
        self.auto_calculate = false;
    }

    pub fn reference(&self) -> &ReferenceVector {
        &self.reference
    }

    pub fn set_reference_hkl(&mut self, hkl: Vector3<f64>) {
        self.reference.set_hkl(hkl);
    }

    pub fn set_reference_phi(&mut self, phi: Vector3<f64>) {
        self.reference.set_phi(phi);
    }

    pub fn n_phi(&self) -> Result<Vector3<f64>, HklError> {
        self.reference.n_phi(self.ub())
    }

    pub fn n_hkl(&self) -> Result<Vector3<f64>, HklError> {
        self.reference.n_hkl(self.ub())
    }
}
