use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The six physical circles of the diffractometer, in pose order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Mu,
    Delta,
    Nu,
    Eta,
    Chi,
    Phi,
}

impl Axis {
    pub const ALL: [Axis; 6] = [
        Axis::Mu,
        Axis::Delta,
        Axis::Nu,
        Axis::Eta,
        Axis::Chi,
        Axis::Phi,
    ];

    /// Sample circles, outermost first.
    pub const SAMPLE: [Axis; 4] = [Axis::Mu, Axis::Eta, Axis::Chi, Axis::Phi];

    pub fn name(self) -> &'static str {
        match self {
            Axis::Mu => "mu",
            Axis::Delta => "delta",
            Axis::Nu => "nu",
            Axis::Eta => "eta",
            Axis::Chi => "chi",
            Axis::Phi => "phi",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Axis::Mu => 0,
            Axis::Delta => 1,
            Axis::Nu => 2,
            Axis::Eta => 3,
            Axis::Chi => 4,
            Axis::Phi => 5,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Axis::ALL
            .iter()
            .copied()
            .find(|axis| axis.name() == s)
            .ok_or_else(|| format!("'{s}' is not a diffractometer axis"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnit {
    Degrees,
    Radians,
}

/// One instrument pose: six angles tagged with the unit they are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub mu: f64,
    pub delta: f64,
    pub nu: f64,
    pub eta: f64,
    pub chi: f64,
    pub phi: f64,
    pub unit: AngleUnit,
}

impl Position {
    pub fn new(angles: [f64; 6], unit: AngleUnit) -> Self {
        let [mu, delta, nu, eta, chi, phi] = angles;
        Self {
            mu,
            delta,
            nu,
            eta,
            chi,
            phi,
            unit,
        }
    }

    pub fn from_degrees(angles: [f64; 6]) -> Self {
        Self::new(angles, AngleUnit::Degrees)
    }

    pub fn from_radians(angles: [f64; 6]) -> Self {
        Self::new(angles, AngleUnit::Radians)
    }

    pub fn zero() -> Self {
        Self::from_radians([0.0; 6])
    }

    /// Angles in pose order (mu, delta, nu, eta, chi, phi), in `self.unit`.
    pub fn angles(&self) -> [f64; 6] {
        [self.mu, self.delta, self.nu, self.eta, self.chi, self.phi]
    }

    pub fn get(&self, axis: Axis) -> f64 {
        self.angles()[axis.index()]
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Mu => self.mu = value,
            Axis::Delta => self.delta = value,
            Axis::Nu => self.nu = value,
            Axis::Eta => self.eta = value,
            Axis::Chi => self.chi = value,
            Axis::Phi => self.phi = value,
        }
    }

    pub fn to_unit(&self, unit: AngleUnit) -> Position {
        if unit == self.unit {
            return *self;
        }
        let convert: fn(f64) -> f64 = match unit {
            AngleUnit::Degrees => f64::to_degrees,
            AngleUnit::Radians => f64::to_radians,
        };
        Position::new(self.angles().map(convert), unit)
    }

    pub fn to_radians(&self) -> Position {
        self.to_unit(AngleUnit::Radians)
    }

    pub fn to_degrees(&self) -> Position {
        self.to_unit(AngleUnit::Degrees)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deg = self.to_degrees();
        write!(
            f,
            "mu {:.4} delta {:.4} nu {:.4} eta {:.4} chi {:.4} phi {:.4} (deg)",
            deg.mu, deg.delta, deg.nu, deg.eta, deg.chi, deg.phi
        )
    }
}
