//! Constraint registry and mode resolution.
//!
//! Constraints partition into three categories. The shape of
//! [`ConstraintSet`] enforces the per-category limits: one detector slot,
//! one reference slot and three sample slots.

use crate::error::{Advisory, ConstraintError, HklError};
use crate::position::{Axis, Position};
use crate::traits::Hardware;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorConstraint {
    Delta,
    Nu,
    Qaz,
    /// Azimuth of the reference vector; solved jointly with the reference angle.
    Naz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceConstraint {
    AEqB,
    Alpha,
    Beta,
    Psi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleConstraint {
    Mu,
    Eta,
    Chi,
    Phi,
    MuIsNu,
    Bisect,
}

impl SampleConstraint {
    fn axis(self) -> Option<Axis> {
        match self {
            SampleConstraint::Mu => Some(Axis::Mu),
            SampleConstraint::Eta => Some(Axis::Eta),
            SampleConstraint::Chi => Some(Axis::Chi),
            SampleConstraint::Phi => Some(Axis::Phi),
            SampleConstraint::MuIsNu | SampleConstraint::Bisect => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintName {
    Detector(DetectorConstraint),
    Reference(ReferenceConstraint),
    Sample(SampleConstraint),
}

impl ConstraintName {
    pub const ALL: [ConstraintName; 14] = [
        ConstraintName::Detector(DetectorConstraint::Delta),
        ConstraintName::Detector(DetectorConstraint::Nu),
        ConstraintName::Detector(DetectorConstraint::Qaz),
        ConstraintName::Detector(DetectorConstraint::Naz),
        ConstraintName::Reference(ReferenceConstraint::AEqB),
        ConstraintName::Reference(ReferenceConstraint::Alpha),
        ConstraintName::Reference(ReferenceConstraint::Beta),
        ConstraintName::Reference(ReferenceConstraint::Psi),
        ConstraintName::Sample(SampleConstraint::Mu),
        ConstraintName::Sample(SampleConstraint::Eta),
        ConstraintName::Sample(SampleConstraint::Chi),
        ConstraintName::Sample(SampleConstraint::Phi),
        ConstraintName::Sample(SampleConstraint::MuIsNu),
        ConstraintName::Sample(SampleConstraint::Bisect),
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConstraintName::Detector(d) => match d {
                DetectorConstraint::Delta => "delta",
                DetectorConstraint::Nu => "nu",
                DetectorConstraint::Qaz => "qaz",
                DetectorConstraint::Naz => "naz",
            },
            ConstraintName::Reference(r) => match r {
                ReferenceConstraint::AEqB => "a_eq_b",
                ReferenceConstraint::Alpha => "alpha",
                ReferenceConstraint::Beta => "beta",
                ReferenceConstraint::Psi => "psi",
            },
            ConstraintName::Sample(s) => match s {
                SampleConstraint::Mu => "mu",
                SampleConstraint::Eta => "eta",
                SampleConstraint::Chi => "chi",
                SampleConstraint::Phi => "phi",
                SampleConstraint::MuIsNu => "mu_is_nu",
                SampleConstraint::Bisect => "bisect",
            },
        }
    }

    /// Constraints that are a relationship rather than a number.
    pub fn is_valueless(self) -> bool {
        matches!(
            self,
            ConstraintName::Reference(ReferenceConstraint::AEqB)
                | ConstraintName::Sample(SampleConstraint::MuIsNu)
                | ConstraintName::Sample(SampleConstraint::Bisect)
        )
    }

    /// Physical axis the constraint pins, if any. Only these can track hardware.
    pub fn axis(self) -> Option<Axis> {
        match self {
            ConstraintName::Detector(DetectorConstraint::Delta) => Some(Axis::Delta),
            ConstraintName::Detector(DetectorConstraint::Nu) => Some(Axis::Nu),
            ConstraintName::Detector(_) | ConstraintName::Reference(_) => None,
            ConstraintName::Sample(s) => s.axis(),
        }
    }
}

impl fmt::Display for ConstraintName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for ConstraintName {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConstraintName::ALL
            .iter()
            .copied()
            .find(|name| name.name() == s)
            .ok_or_else(|| ConstraintError::UnknownName(s.to_string()))
    }
}

/// Value slot of an active constraint. Angles are in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintValue {
    #[default]
    Unset,
    Fixed(f64),
    /// Read from the live axis at every solve.
    Tracking,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorValue {
    Delta(f64),
    Nu(f64),
    Qaz(f64),
    Naz(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceValue {
    AEqB,
    Alpha(f64),
    Beta(f64),
    Psi(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Mu(f64),
    Eta(f64),
    Chi(f64),
    Phi(f64),
    MuIsNu,
    Bisect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplePair {
    ChiPhi { chi: f64, phi: f64 },
    MuEta { mu: f64, eta: f64 },
    /// Only mu = 0 with chi = 90° is solvable.
    MuChi { mu: f64, chi: f64 },
}

/// A fully constrained, implemented combination with every value resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverMode {
    DetectorReferenceSample {
        detector: DetectorValue,
        reference: ReferenceValue,
        sample: SampleValue,
    },
    ReferenceTwoSample {
        reference: ReferenceValue,
        pair: SamplePair,
    },
    ThreeSample {
        fixed: [(Axis, f64); 3],
        free: Axis,
    },
}

impl SolverMode {
    /// The reference constraint, when the mode has one.
    pub fn reference(&self) -> Option<ReferenceValue> {
        match self {
            SolverMode::DetectorReferenceSample { reference, .. }
            | SolverMode::ReferenceTwoSample { reference, .. } => Some(*reference),
            SolverMode::ThreeSample { .. } => None,
        }
    }
}

/// Tolerance on the mu = 0, chi = 90° pair.
const MU_CHI_TOLERANCE: f64 = 1e-6;

/// The active constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    detector: Option<(DetectorConstraint, ConstraintValue)>,
    reference: Option<(ReferenceConstraint, ConstraintValue)>,
    sample: [Option<(SampleConstraint, ConstraintValue)>; 3],
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active constraint names: detector, reference, then samples in
    /// insertion order.
    pub fn active(&self) -> Vec<ConstraintName> {
        self.entries().map(|(name, _)| name).collect()
    }

    pub fn count(&self) -> usize {
        self.entries().count()
    }

    pub fn is_constrained(&self, name: ConstraintName) -> bool {
        self.value(name).is_some()
    }

    pub fn value(&self, name: ConstraintName) -> Option<ConstraintValue> {
        self.entries().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    fn entries(&self) -> impl Iterator<Item = (ConstraintName, ConstraintValue)> + '_ {
        let detector = self
            .detector
            .map(|(d, v)| (ConstraintName::Detector(d), v));
        let reference = self
            .reference
            .map(|(r, v)| (ConstraintName::Reference(r), v));
        detector.into_iter().chain(reference).chain(
            self.sample
                .iter()
                .flatten()
                .map(|&(s, v)| (ConstraintName::Sample(s), v)),
        )
    }

    fn sample_count(&self) -> usize {
        self.sample.iter().flatten().count()
    }

    fn slot_mut(&mut self, name: ConstraintName) -> Option<&mut ConstraintValue> {
        match name {
            ConstraintName::Detector(d) => match self.detector.as_mut() {
                Some((current, value)) if *current == d => Some(value),
                _ => None,
            },
            ConstraintName::Reference(r) => match self.reference.as_mut() {
                Some((current, value)) if *current == r => Some(value),
                _ => None,
            },
            ConstraintName::Sample(s) => self
                .sample
                .iter_mut()
                .flatten()
                .find(|(current, _)| *current == s)
                .map(|(_, value)| value),
        }
    }

    fn too_many(&self, name: ConstraintName) -> ConstraintError {
        let current = self
            .active()
            .iter()
            .map(|n| n.name())
            .collect::<Vec<_>>()
            .join(", ");
        ConstraintError::TooManyConstraints {
            name: name.name().to_string(),
            current,
        }
    }

    /// Activates `name` with no value. Replacing a constraint in the same
    /// category is reported through the returned advisory.
    pub fn constrain(&mut self, name: ConstraintName) -> Result<Option<Advisory>, ConstraintError> {
        if self.is_constrained(name) {
            return Ok(Some(Advisory::AlreadyConstrained(name.name().to_string())));
        }
        let full = self.count() >= 3;
        match name {
            ConstraintName::Detector(d) => match self.detector.replace((d, ConstraintValue::Unset)) {
                Some((old, _)) => Ok(Some(replaced(ConstraintName::Detector(old), name))),
                None if full => {
                    self.detector = None;
                    Err(self.too_many(name))
                }
                None => Ok(None),
            },
            ConstraintName::Reference(r) => {
                match self.reference.replace((r, ConstraintValue::Unset)) {
                    Some((old, _)) => Ok(Some(replaced(ConstraintName::Reference(old), name))),
                    None if full => {
                        self.reference = None;
                        Err(self.too_many(name))
                    }
                    None => Ok(None),
                }
            }
            ConstraintName::Sample(s) => {
                if !full {
                    if let Some(slot) = self.sample.iter_mut().find(|slot| slot.is_none()) {
                        *slot = Some((s, ConstraintValue::Unset));
                        return Ok(None);
                    }
                }
                if self.sample_count() == 1 {
                    if let Some(slot) = self.sample.iter_mut().find(|slot| slot.is_some()) {
                        let old = slot.replace((s, ConstraintValue::Unset));
                        if let Some((old, _)) = old {
                            return Ok(Some(replaced(ConstraintName::Sample(old), name)));
                        }
                    }
                }
                Err(self.too_many(name))
            }
        }
    }

    /// Activates `name` and assigns `value` in one step.
    pub fn constrain_value(
        &mut self,
        name: ConstraintName,
        value: f64,
    ) -> Result<Option<Advisory>, ConstraintError> {
        let advisory = self.constrain(name)?;
        self.set_value(name, value)?;
        Ok(advisory)
    }

    pub fn unconstrain(&mut self, name: ConstraintName) -> Option<Advisory> {
        let removed = match name {
            ConstraintName::Detector(d) => {
                let hit = matches!(self.detector, Some((current, _)) if current == d);
                if hit {
                    self.detector = None;
                }
                hit
            }
            ConstraintName::Reference(r) => {
                let hit = matches!(self.reference, Some((current, _)) if current == r);
                if hit {
                    self.reference = None;
                }
                hit
            }
            ConstraintName::Sample(s) => {
                match self
                    .sample
                    .iter_mut()
                    .find(|slot| matches!(slot, Some((current, _)) if *current == s))
                {
                    Some(slot) => {
                        *slot = None;
                        true
                    }
                    None => false,
                }
            }
        };
        (!removed).then(|| Advisory::WasNotConstrained(name.name().to_string()))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Assigns a fixed value in radians.
    pub fn set_value(&mut self, name: ConstraintName, value: f64) -> Result<(), ConstraintError> {
        if name.is_valueless() {
            return Err(ConstraintError::Valueless(name.name().to_string()));
        }
        let slot = self
            .slot_mut(name)
            .ok_or_else(|| ConstraintError::NotConstrained(name.name().to_string()))?;
        if *slot == ConstraintValue::Tracking {
            return Err(ConstraintError::Tracking(name.name().to_string()));
        }
        *slot = ConstraintValue::Fixed(value);
        Ok(())
    }

    /// Constrains `name` if needed and takes its value from the live axis.
    pub fn track(&mut self, name: ConstraintName) -> Result<Option<Advisory>, ConstraintError> {
        if name.axis().is_none() {
            return Err(ConstraintError::NotTrackable(name.name().to_string()));
        }
        let advisory = self.constrain(name)?;
        if let Some(slot) = self.slot_mut(name) {
            *slot = ConstraintValue::Tracking;
        }
        Ok(advisory)
    }

    /// Stops tracking; the constraint stays active with no value.
    pub fn untrack(&mut self, name: ConstraintName) -> Result<(), ConstraintError> {
        let slot = self
            .slot_mut(name)
            .ok_or_else(|| ConstraintError::NotConstrained(name.name().to_string()))?;
        if *slot == ConstraintValue::Tracking {
            *slot = ConstraintValue::Unset;
        }
        Ok(())
    }

    /// Three constraints are active. Says nothing about whether the solver handles them.
    pub fn is_fully_constrained(&self) -> bool {
        self.count() == 3
    }

    /// Whether the solver handles this combination of names.
    pub fn is_combination_implemented(&self) -> bool {
        self.is_fully_constrained() && self.check_combination().is_ok()
    }

    fn sample_names(&self) -> Vec<SampleConstraint> {
        self.sample.iter().flatten().map(|(s, _)| *s).collect()
    }

    fn check_combination(&self) -> Result<(), ConstraintError> {
        let samples = self.sample_names();
        let unimplemented = |what: String| Err(ConstraintError::Unimplemented(what));
        match (self.detector, self.reference, samples.as_slice()) {
            (Some((DetectorConstraint::Naz, _)), Some(_), [SampleConstraint::MuIsNu]) => {
                unimplemented("naz with mu_is_nu".to_string())
            }
            (Some(_), Some(_), [_]) => Ok(()),
            (Some(_), None, [_, _]) => {
                unimplemented("one detector with two sample constraints".to_string())
            }
            (None, Some(_), [a, b]) => match sample_pair_kind(*a, *b) {
                Some(_) => Ok(()),
                None => unimplemented(format!(
                    "reference with sample pair {}/{}",
                    ConstraintName::Sample(*a),
                    ConstraintName::Sample(*b)
                )),
            },
            (None, None, [a, b, c]) => {
                if [a, b, c].iter().any(|s| s.axis().is_none()) {
                    unimplemented("mu_is_nu or bisect with two other sample constraints".to_string())
                } else {
                    Ok(())
                }
            }
            _ => Err(ConstraintError::NotFullyConstrained(self.summary())),
        }
    }

    /// Resolves values (reading the hardware once if anything tracks) and
    /// returns the solving mode.
    pub fn resolve(&self, hardware: &dyn Hardware) -> Result<SolverMode, HklError> {
        if !self.is_fully_constrained() {
            return Err(ConstraintError::NotFullyConstrained(self.summary()).into());
        }
        self.check_combination()?;

        let live = if self.entries().any(|(_, v)| v == ConstraintValue::Tracking) {
            Some(hardware.position()?.to_radians())
        } else {
            None
        };
        let number = |name: ConstraintName, value: ConstraintValue| {
            resolve_number(name, value, live.as_ref())
        };

        let reference = match self.reference {
            Some((r, v)) => Some(match r {
                ReferenceConstraint::AEqB => ReferenceValue::AEqB,
                ReferenceConstraint::Alpha => ReferenceValue::Alpha(number(ConstraintName::Reference(r), v)?),
                ReferenceConstraint::Beta => ReferenceValue::Beta(number(ConstraintName::Reference(r), v)?),
                ReferenceConstraint::Psi => ReferenceValue::Psi(number(ConstraintName::Reference(r), v)?),
            }),
            None => None,
        };
        let mut samples = Vec::with_capacity(3);
        for &(s, v) in self.sample.iter().flatten() {
            let name = ConstraintName::Sample(s);
            samples.push(match s {
                SampleConstraint::Mu => SampleValue::Mu(number(name, v)?),
                SampleConstraint::Eta => SampleValue::Eta(number(name, v)?),
                SampleConstraint::Chi => SampleValue::Chi(number(name, v)?),
                SampleConstraint::Phi => SampleValue::Phi(number(name, v)?),
                SampleConstraint::MuIsNu => SampleValue::MuIsNu,
                SampleConstraint::Bisect => SampleValue::Bisect,
            });
        }

        let mode = match (self.detector, reference, samples.as_slice()) {
            (Some((d, v)), Some(reference), [sample]) => {
                let value = number(ConstraintName::Detector(d), v)?;
                let detector = match d {
                    DetectorConstraint::Delta => DetectorValue::Delta(value),
                    DetectorConstraint::Nu => DetectorValue::Nu(value),
                    DetectorConstraint::Qaz => DetectorValue::Qaz(value),
                    DetectorConstraint::Naz => DetectorValue::Naz(value),
                };
                SolverMode::DetectorReferenceSample {
                    detector,
                    reference,
                    sample: *sample,
                }
            }
            (None, Some(reference), [a, b]) => SolverMode::ReferenceTwoSample {
                reference,
                pair: resolve_pair(*a, *b)?,
            },
            (None, None, [a, b, c]) => {
                let mut fixed = [(Axis::Mu, 0.0); 3];
                for (slot, value) in fixed.iter_mut().zip([a, b, c]) {
                    *slot = sample_axis_value(value).ok_or_else(|| {
                        ConstraintError::Unimplemented(
                            "valueless constraint among three samples".to_string(),
                        )
                    })?;
                }
                let free = Axis::SAMPLE
                    .iter()
                    .copied()
                    .find(|axis| fixed.iter().all(|(f, _)| f != axis))
                    .ok_or_else(|| ConstraintError::NotFullyConstrained(self.summary()))?;
                SolverMode::ThreeSample { fixed, free }
            }
            _ => return Err(ConstraintError::NotFullyConstrained(self.summary()).into()),
        };
        log::debug!("constraints resolved to {mode:?}");
        Ok(mode)
    }

    fn summary(&self) -> String {
        let active = self.active();
        if active.is_empty() {
            return "no constraints are active".to_string();
        }
        let names = active.iter().map(|n| n.name()).collect::<Vec<_>>().join(", ");
        format!("{} of 3 active ({names})", active.len())
    }
}

fn replaced(old: ConstraintName, new: ConstraintName) -> Advisory {
    Advisory::Replaced {
        old: old.name().to_string(),
        new: new.name().to_string(),
    }
}

fn resolve_number(
    name: ConstraintName,
    value: ConstraintValue,
    live: Option<&Position>,
) -> Result<f64, ConstraintError> {
    match value {
        ConstraintValue::Fixed(v) => Ok(v),
        ConstraintValue::Tracking => match (name.axis(), live) {
            (Some(axis), Some(position)) => Ok(position.get(axis)),
            _ => Err(ConstraintError::MissingValue(name.name().to_string())),
        },
        ConstraintValue::Unset => Err(ConstraintError::MissingValue(name.name().to_string())),
    }
}

fn sample_axis_value(value: &SampleValue) -> Option<(Axis, f64)> {
    match *value {
        SampleValue::Mu(v) => Some((Axis::Mu, v)),
        SampleValue::Eta(v) => Some((Axis::Eta, v)),
        SampleValue::Chi(v) => Some((Axis::Chi, v)),
        SampleValue::Phi(v) => Some((Axis::Phi, v)),
        SampleValue::MuIsNu | SampleValue::Bisect => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairKind {
    ChiPhi,
    MuEta,
    MuChi,
}

fn sample_pair_kind(a: SampleConstraint, b: SampleConstraint) -> Option<PairKind> {
    use SampleConstraint::*;
    match (a, b) {
        (Chi, Phi) | (Phi, Chi) => Some(PairKind::ChiPhi),
        (Mu, Eta) | (Eta, Mu) => Some(PairKind::MuEta),
        (Mu, Chi) | (Chi, Mu) => Some(PairKind::MuChi),
        _ => None,
    }
}

fn resolve_pair(a: SampleValue, b: SampleValue) -> Result<SamplePair, ConstraintError> {
    let value_of = |axis: Axis| {
        [a, b]
            .iter()
            .filter_map(sample_axis_value)
            .find(|(ax, _)| *ax == axis)
            .map(|(_, v)| v)
    };
    let pair = match (value_of(Axis::Mu), value_of(Axis::Eta), value_of(Axis::Chi), value_of(Axis::Phi)) {
        (None, None, Some(chi), Some(phi)) => SamplePair::ChiPhi { chi, phi },
        (Some(mu), Some(eta), None, None) => SamplePair::MuEta { mu, eta },
        (Some(mu), None, Some(chi), None) => {
            let right_angle = std::f64::consts::FRAC_PI_2;
            if mu.abs() > MU_CHI_TOLERANCE || (chi - right_angle).abs() > MU_CHI_TOLERANCE {
                return Err(ConstraintError::Unimplemented(
                    "mu and chi pair other than mu = 0, chi = 90".to_string(),
                ));
            }
            SamplePair::MuChi { mu, chi }
        }
        _ => {
            return Err(ConstraintError::Unimplemented(
                "reference with this sample pair".to_string(),
            ))
        }
    };
    Ok(pair)
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.entries() {
            match value {
                _ if name.is_valueless() => writeln!(f, "    {name}")?,
                ConstraintValue::Fixed(v) => writeln!(f, "    {name:<8} = {:.4}", v.to_degrees())?,
                ConstraintValue::Tracking => writeln!(f, "    {name:<8} tracking")?,
                ConstraintValue::Unset => writeln!(f, "    {name:<8} ---")?,
            }
        }
        if !self.is_fully_constrained() {
            write!(f, "!   {} of 3 constraints active", self.count())
        } else if let Err(err) = self.check_combination() {
            write!(f, "!   {err}")
        } else {
            write!(f, "    fully constrained")
        }
    }
}
