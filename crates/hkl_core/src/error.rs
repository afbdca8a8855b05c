use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid lattice: {0}")]
    InvalidLattice(String),

    #[error("invalid orientation reflection: {0}")]
    InvalidOrientationReflection(String),

    #[error("reflection is at the origin of reciprocal space")]
    ReflectionAtOrigin,

    #[error("reflection unreachable: |Q| is too long for wavelength {wavelength} (sin(theta) = {sin_theta:.6})")]
    ReflectionTooLong { wavelength: f64, sin_theta: f64 },

    #[error("scattering vector is parallel to the reference vector; psi is undefined")]
    ParallelReference,

    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("reflection unreachable with current constraints: {0}")]
    Unreachable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    #[error("'{0}' is not a constraint name")]
    UnknownName(String),

    #[error("cannot constrain {name}; first unconstrain one of {current}")]
    TooManyConstraints { name: String, current: String },

    #[error("{0} is not constrained")]
    NotConstrained(String),

    #[error("{0} constraint takes no value")]
    Valueless(String),

    #[error("{0} is tracking the hardware; untrack it before setting a value")]
    Tracking(String),

    #[error("{0} has no physical axis and cannot track the hardware")]
    NotTrackable(String),

    #[error("{0} is constrained but has no value")]
    MissingValue(String),

    #[error("not fully constrained: {0}")]
    NotFullyConstrained(String),

    #[error("constraint combination is valid but not implemented: {0}")]
    Unimplemented(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LimitError {
    #[error("no solution in reachable detector/sample range: {0}")]
    Exhausted(String),

    #[error("{count} distinct solutions remain; narrow the axis limits to choose one")]
    Ambiguous { count: usize },
}

/// A returned pose does not reproduce the requested reflection.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("internal verification failed: {message}")]
pub struct VerificationError {
    pub message: String,
}

#[derive(Error, Debug)]
pub enum HklError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Limits(#[from] LimitError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("no crystal lattice has been set")]
    NoCrystal,

    #[error("no UB matrix: add orientation reflections or set it manually")]
    NoUb,

    #[error("no orientation reflections have been added")]
    NoReflections,

    #[error("reflection {index} does not exist ({len} stored)")]
    ReflectionIndex { index: usize, len: usize },

    #[error("wavelength must be positive, got {0}")]
    InvalidWavelength(f64),

    #[error("hardware read failed: {0}")]
    Hardware(#[from] anyhow::Error),
}

/// One-line notices that accompany a successful operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    AlreadyConstrained(String),
    Replaced { old: String, new: String },
    WasNotConstrained(String),
    AutoCalculationDisabled,
    LowConfidenceOrientation,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::AlreadyConstrained(name) => write!(f, "{name} is already constrained"),
            Advisory::Replaced { old, new } => write!(f, "{old} constraint replaced by {new}"),
            Advisory::WasNotConstrained(name) => write!(f, "{name} was not constrained"),
            Advisory::AutoCalculationDisabled => write!(
                f,
                "UB was set manually; not recalculating (run calculate_ub to re-enable)"
            ),
            Advisory::LowConfidenceOrientation => write!(
                f,
                "U computed from a single reflection; rotation about it is undetermined"
            ),
        }
    }
}
