use crate::geometry;
use crate::position::{Axis, Position};
use anyhow::bail;
use nalgebra::Vector3;

/// A diffractometer kinematic family.
///
/// The kinematics core works on six-circle poses; a geometry maps its own
/// physical poses onto that frame and supplies the momentum-transfer direction
/// used by the orientation calculation.
pub trait Geometry {
    fn name(&self) -> &'static str;

    /// Maps a physical pose onto the six-circle (mu, delta, nu, eta, chi, phi) frame.
    fn to_six_circle(&self, position: &Position) -> Position;

    /// Six-circle axes this geometry does not have; they stay at zero.
    fn pinned_axes(&self) -> &'static [Axis] {
        &[]
    }

    /// Momentum transfer in the phi frame for `position`, in units of the wavevector.
    fn calculate_q_phi(&self, position: &Position) -> Vector3<f64> {
        let six = self.to_six_circle(&position.to_radians());
        geometry::q_phi(&six, 1.0)
    }
}

/// The live instrument, as seen by the solver.
///
/// Supplies current angles for tracking constraints and the operator's axis
/// limits. Every method has a permissive default so callers without hardware
/// can pass a unit adapter.
pub trait Hardware {
    fn axis_names(&self) -> [&'static str; 6] {
        Axis::ALL.map(Axis::name)
    }

    /// Current pose. May block on the instrument.
    fn position(&self) -> anyhow::Result<Position> {
        bail!("no live hardware position available")
    }

    /// Wraps `value` (radians) into the axis' configured window.
    fn cut_angle(&self, _axis: Axis, value: f64) -> f64 {
        value
    }

    fn is_within_limits(&self, _axis: Axis, _value: f64) -> bool {
        true
    }
}
