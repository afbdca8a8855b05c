//! The `hkl_core` crate is the kinematics engine of a six-circle diffractometer.
//! It converts between instrument angles and reciprocal-lattice (hkl)
//! coordinates for a crystal whose orientation has been measured.
//!
//! Key components:
//! - **Crystal**: lattice parameters and the B matrix.
//! - **UB calculation**: U and UB from one or two orientation reflections, or set by hand.
//! - **Constraints**: which detector, reference and sample degrees of freedom are fixed.
//! - **Kinematics**: forward angles → hkl with virtual angles (`kinematics`) and the
//!   closed-form inverse solver (`solver`).
//! - **Traits**: `Geometry` (kinematic family) and `Hardware` (axis limits and live position).
//!
//! All angles are radians unless a [`Position`] says otherwise.
pub mod calculator;
pub mod constraints;
pub mod crystal;
pub mod error;
pub mod geometry;
pub mod hardware;
pub mod kinematics;
pub mod linalg;
pub mod position;
pub mod reference;
pub mod reflections;
pub mod solver;
pub mod traits;
pub mod ubcalc;

pub use calculator::{CalculatorState, HklCalculator};
pub use constraints::{ConstraintName, ConstraintSet, ConstraintValue};
pub use crystal::{Crystal, LatticeParameters};
pub use error::{
    Advisory, ConstraintError, GeometryError, HklError, LimitError, VerificationError,
};
pub use geometry::{FourCircle, SixCircle};
pub use hardware::{AxisLimits, NoHardware};
pub use kinematics::VirtualAngles;
pub use position::{AngleUnit, Axis, Position};
pub use reflections::{Beam, Reflection};
pub use solver::{HklSolution, SolverSettings};
pub use traits::{Geometry, Hardware};
