//! Session facade: one crystal orientation, one constraint set and the
//! geometry they are solved against.

use crate::constraints::ConstraintSet;
use crate::crystal::LatticeParameters;
use crate::error::{Advisory, GeometryError, HklError};
use crate::hardware::PinnedAxes;
use crate::kinematics::{self, wavevector, VirtualAngles};
use crate::linalg::bounded_asin;
use crate::position::Position;
use crate::reflections::Reflection;
use crate::solver::{self, HklSolution, SolverSettings};
use crate::traits::{Geometry, Hardware};
use crate::ubcalc::UbCalculation;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Plain state of a calculator, for the caller to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatorState {
    pub ubcalc: UbCalculation,
    pub constraints: ConstraintSet,
    #[serde(default)]
    pub settings: SolverSettings,
}

#[derive(Debug, Clone)]
pub struct HklCalculator<G: Geometry> {
    geometry: G,
    ubcalc: UbCalculation,
    constraints: ConstraintSet,
    settings: SolverSettings,
}

impl<G: Geometry> HklCalculator<G> {
    pub fn new(name: impl Into<String>, geometry: G) -> Self {
        Self {
            geometry,
            ubcalc: UbCalculation::new(name),
            constraints: ConstraintSet::new(),
            settings: SolverSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn from_state(geometry: G, state: CalculatorState) -> Self {
        Self {
            geometry,
            ubcalc: state.ubcalc,
            constraints: state.constraints,
            settings: state.settings,
        }
    }

    pub fn state(&self) -> CalculatorState {
        CalculatorState {
            ubcalc: self.ubcalc.clone(),
            constraints: self.constraints.clone(),
            settings: self.settings,
        }
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn ubcalc(&self) -> &UbCalculation {
        &self.ubcalc
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut ConstraintSet {
        &mut self.constraints
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SolverSettings {
        &mut self.settings
    }

    pub fn set_lattice(
        &mut self,
        name: impl Into<String>,
        lattice: LatticeParameters,
    ) -> Result<(), HklError> {
        self.ubcalc.set_lattice(name, lattice)
    }

    pub fn add_reflection(&mut self, reflection: Reflection) -> Result<Option<Advisory>, HklError> {
        self.ubcalc.add_reflection(reflection, &self.geometry)
    }

    pub fn edit_reflection(
        &mut self,
        index: usize,
        reflection: Reflection,
    ) -> Result<Option<Advisory>, HklError> {
        self.ubcalc.edit_reflection(index, reflection, &self.geometry)
    }

    pub fn delete_reflection(&mut self, index: usize) -> Result<Option<Advisory>, HklError> {
        self.ubcalc.delete_reflection(index, &self.geometry)
    }

    pub fn swap_reflections(
        &mut self,
        first: usize,
        second: usize,
    ) -> Result<Option<Advisory>, HklError> {
        self.ubcalc.swap_reflections(first, second, &self.geometry)
    }

    pub fn calculate_ub(&mut self) -> Result<Option<Advisory>, HklError> {
        self.ubcalc.calculate_ub(&self.geometry)
    }

    pub fn set_u_manual(&mut self, u: Matrix3<f64>) -> Result<(), HklError> {
        self.ubcalc.set_u_manual(u)
    }

    pub fn set_ub_manual(&mut self, ub: Matrix3<f64>) {
        self.ubcalc.set_ub_manual(ub);
    }

    pub fn set_reference_hkl(&mut self, hkl: Vector3<f64>) {
        self.ubcalc.set_reference_hkl(hkl);
    }

    pub fn set_reference_phi(&mut self, phi: Vector3<f64>) {
        self.ubcalc.set_reference_phi(phi);
    }

    /// hkl and virtual angles for a physical pose of this geometry.
    pub fn angles_to_hkl(
        &self,
        position: &Position,
        wavelength: f64,
    ) -> Result<(Vector3<f64>, VirtualAngles), HklError> {
        let six = self.geometry.to_six_circle(&position.to_radians());
        let ub = self.ubcalc.require_ub()?;
        let hkl = kinematics::angles_to_hkl(&six, wavelength, ub)?;
        let n_phi = self.ubcalc.n_phi()?;
        let angles =
            kinematics::virtual_angles(&six, &n_phi, self.settings.degenerate_tolerance);
        Ok((hkl, angles))
    }

    /// Every pose reaching `hkl` under the active constraints, in radians.
    ///
    /// `hardware` supplies the axis limits and, for tracked constraints, the
    /// live position. Axes the geometry lacks only accept zero.
    pub fn hkl_to_angles(
        &self,
        hkl: &Vector3<f64>,
        wavelength: f64,
        hardware: &dyn Hardware,
    ) -> Result<Vec<HklSolution>, HklError> {
        let hardware = PinnedAxes::new(hardware, self.geometry.pinned_axes());
        let mode = self.constraints.resolve(&hardware)?;
        let ub = self.ubcalc.require_ub()?;
        let n_phi = self.ubcalc.n_phi()?;
        log::debug!(
            "{} ({}): hkl {:?} at {wavelength} A",
            self.ubcalc.name,
            self.geometry.name(),
            hkl.as_slice()
        );
        solver::solve(hkl, wavelength, ub, &n_phi, &mode, &hardware, &self.settings)
    }

    /// Scattering angle 2θ of `hkl`, in radians.
    pub fn two_theta(&self, hkl: &Vector3<f64>, wavelength: f64) -> Result<f64, HklError> {
        let k = wavevector(wavelength)?;
        let q = self.ubcalc.require_ub()? * hkl;
        let sin_theta = q.norm() / (2.0 * k);
        let theta = bounded_asin(sin_theta, self.settings.bound_tolerance).ok_or(
            GeometryError::ReflectionTooLong {
                wavelength,
                sin_theta,
            },
        )?;
        Ok(2.0 * theta)
    }

    /// Angle between two reciprocal-lattice directions, in radians.
    pub fn angle_between_hkls(
        &self,
        first: &Vector3<f64>,
        second: &Vector3<f64>,
    ) -> Result<f64, HklError> {
        let crystal = self.ubcalc.crystal().ok_or(HklError::NoCrystal)?;
        Ok(crystal.angle_between_hkls(first, second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintName;
    use crate::error::LimitError;
    use crate::geometry::{FourCircle, SixCircle};
    use crate::hardware::{AxisLimits, NoHardware};
    use crate::position::{Axis, Position};
    use crate::reflections::Beam;
    use std::f64::consts::PI;

    fn cubic() -> HklCalculator<SixCircle> {
        let mut calc = HklCalculator::new("cubic", SixCircle);
        calc.set_lattice("unit", LatticeParameters::cubic(1.0))
            .expect("valid lattice");
        calc.set_ub_manual(Matrix3::identity() * (2.0 * PI));
        calc
    }

    fn constrain<G: Geometry>(calc: &mut HklCalculator<G>, name: &str, value: f64) {
        let name: ConstraintName = name.parse().expect("known name");
        calc.constraints_mut()
            .constrain_value(name, value)
            .expect("room for it");
    }

    #[test]
    fn cubic_hundred_reflection_scatters_at_sixty_degrees() {
        let mut calc = cubic();
        calc.constraints_mut()
            .constrain("a_eq_b".parse().expect("known"))
            .expect("room");
        constrain(&mut calc, "delta", 0.0);
        constrain(&mut calc, "mu", 0.0);

        let hkl = Vector3::new(1.0, 0.0, 0.0);
        let two_theta = calc.two_theta(&hkl, 1.0).expect("reachable");
        assert!((two_theta.to_degrees() - 60.0).abs() < 1e-9);

        let solutions = calc.hkl_to_angles(&hkl, 1.0, &NoHardware).expect("solvable");
        assert_eq!(solutions.len(), 2);
        let first = &solutions[0];
        assert!((first.position.nu.to_degrees() - 60.0).abs() < 1e-6);
        assert!((first.virtual_angles.alpha - first.virtual_angles.beta).abs() < 1e-6);

        let (back, _) = calc.angles_to_hkl(&first.position, 1.0).expect("forward");
        assert!((back - hkl).norm() < 1e-6);
    }

    #[test]
    fn queries_without_ub_or_constraints_fail() {
        let calc = HklCalculator::new("empty", SixCircle);
        let err = calc
            .angles_to_hkl(&Position::zero(), 1.0)
            .expect_err("no UB");
        assert!(matches!(err, HklError::NoUb));

        let calc = cubic();
        let err = calc
            .hkl_to_angles(&Vector3::x(), 1.0, &NoHardware)
            .expect_err("no constraints");
        assert!(err.to_string().contains("not fully constrained"));
    }

    #[test]
    fn four_circle_pins_mu_and_nu_when_reading_a_pose() {
        let mut calc = HklCalculator::new("fourc", FourCircle);
        calc.set_ub_manual(Matrix3::identity() * (2.0 * PI));
        let pose = Position::from_degrees([25.0, 60.0, 40.0, 30.0, 0.0, 0.0]);
        let (hkl, angles) = calc.angles_to_hkl(&pose, 1.0).expect("forward");
        assert!((angles.two_theta().to_degrees() - 60.0).abs() < 1e-9);
        assert!(hkl.z.abs() < 1e-9);
    }

    #[test]
    fn four_circle_solutions_keep_mu_and_nu_at_zero() {
        let mut calc = HklCalculator::new("fourc", FourCircle);
        calc.set_ub_manual(Matrix3::identity() * (2.0 * PI));
        let start = Position::from_degrees([0.0, 40.0, 0.0, 25.0, 35.0, 10.0]).to_radians();
        let (hkl, angles) = calc.angles_to_hkl(&start, 1.0).expect("forward");
        constrain(&mut calc, "nu", 0.0);
        constrain(&mut calc, "mu", 0.0);
        constrain(&mut calc, "psi", angles.psi.expect("psi defined"));

        let solutions = calc.hkl_to_angles(&hkl, 1.0, &NoHardware).expect("solvable");
        assert!(!solutions.is_empty());
        for solution in &solutions {
            assert_eq!(solution.position.mu, 0.0);
            assert_eq!(solution.position.nu, 0.0);
            let (back, _) = calc.angles_to_hkl(&solution.position, 1.0).expect("forward");
            assert!((back - hkl).norm() < 1e-6);
        }
    }

    #[test]
    fn four_circle_rejects_poses_needing_mu() {
        let mut calc = HklCalculator::new("fourc", FourCircle);
        calc.set_ub_manual(Matrix3::identity() * (2.0 * PI));
        for name in ["eta", "chi", "phi"] {
            constrain(&mut calc, name, 0.0);
        }
        let limits = AxisLimits::new().with_degrees(Axis::Mu, Some(-90.0), Some(90.0));
        let err = calc
            .hkl_to_angles(&Vector3::z(), 1.0, &limits)
            .expect_err("only mu can reach (001)");
        assert!(matches!(err, HklError::Limits(LimitError::Exhausted(_))));

        let mut six = HklCalculator::new("sixc", SixCircle);
        six.set_ub_manual(Matrix3::identity() * (2.0 * PI));
        *six.constraints_mut() = calc.constraints().clone();
        let found = six
            .hkl_to_angles(&Vector3::z(), 1.0, &limits)
            .expect("mu = 30 reaches it");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn state_survives_json() {
        let mut calc = cubic();
        constrain(&mut calc, "delta", 0.0);
        calc.add_reflection(Reflection::new(
            [1.0, 0.0, 0.0],
            Position::from_degrees([0.0, 0.0, 60.0, 0.0, 0.0, 30.0]),
            Beam::Energy(12.398),
            Some("first"),
        ))
        .expect("stored");

        let json = serde_json::to_string(&calc.state()).expect("serialisable");
        let state: CalculatorState = serde_json::from_str(&json).expect("parsable");
        let restored = HklCalculator::from_state(SixCircle, state);
        let (ub, original) = (
            restored.ubcalc().require_ub().expect("kept"),
            calc.ubcalc().require_ub().expect("set"),
        );
        assert!((ub - original).amax() < 1e-12);
        assert_eq!(restored.constraints(), calc.constraints());
        assert_eq!(restored.ubcalc().reflections().len(), 1);
        assert!(!restored.ubcalc().auto_calculate());
        assert!(restored.constraints().is_constrained("delta".parse().expect("known")));
    }

    #[test]
    fn angle_between_needs_a_crystal() {
        let calc = HklCalculator::new("empty", SixCircle);
        assert!(matches!(
            calc.angle_between_hkls(&Vector3::x(), &Vector3::y()),
            Err(HklError::NoCrystal)
        ));
        let angle = cubic()
            .angle_between_hkls(&Vector3::x(), &Vector3::new(1.0, 1.0, 0.0))
            .expect("crystal set");
        assert!((angle.to_degrees() - 45.0).abs() < 1e-9);
    }
}
