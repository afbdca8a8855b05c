use crate::error::HklError;
use crate::position::Position;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// hc in keV·Å.
pub const HC_KEV_ANGSTROM: f64 = 12.398_419_843_320_026;

pub fn energy_to_wavelength(energy_kev: f64) -> f64 {
    HC_KEV_ANGSTROM / energy_kev
}

pub fn wavelength_to_energy(wavelength: f64) -> f64 {
    HC_KEV_ANGSTROM / wavelength
}

/// Beam description as recorded with a reflection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Beam {
    /// Wavelength in Å.
    Wavelength(f64),
    /// Photon energy in keV.
    Energy(f64),
}

impl Beam {
    pub fn wavelength(&self) -> f64 {
        match *self {
            Beam::Wavelength(w) => w,
            Beam::Energy(e) => energy_to_wavelength(e),
        }
    }
}

/// A measured orientation reflection. Edits replace the entry wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub hkl: Vector3<f64>,
    pub position: Position,
    pub beam: Beam,
    pub tag: Option<String>,
    pub timestamp: SystemTime,
}

impl Reflection {
    pub fn new(hkl: [f64; 3], position: Position, beam: Beam, tag: Option<&str>) -> Self {
        Self {
            hkl: Vector3::from(hkl),
            position,
            beam,
            tag: tag.map(str::to_owned),
            timestamp: SystemTime::now(),
        }
    }
}

/// Ordered reflection store; the first two entries orient the crystal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectionList {
    reflections: Vec<Reflection>,
}

impl ReflectionList {
    pub fn len(&self) -> usize {
        self.reflections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reflections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reflection> {
        self.reflections.iter()
    }

    pub fn get(&self, index: usize) -> Result<&Reflection, HklError> {
        self.reflections.get(index).ok_or(HklError::ReflectionIndex {
            index,
            len: self.len(),
        })
    }

    /// Appends and returns the new entry's index.
    pub fn push(&mut self, reflection: Reflection) -> usize {
        self.reflections.push(reflection);
        self.reflections.len() - 1
    }

    pub fn replace(&mut self, index: usize, reflection: Reflection) -> Result<Reflection, HklError> {
        let len = self.len();
        let slot = self
            .reflections
            .get_mut(index)
            .ok_or(HklError::ReflectionIndex { index, len })?;
        Ok(std::mem::replace(slot, reflection))
    }

    pub fn remove(&mut self, index: usize) -> Result<Reflection, HklError> {
        self.check(index)?;
        Ok(self.reflections.remove(index))
    }

    pub fn swap(&mut self, first: usize, second: usize) -> Result<(), HklError> {
        self.check(first)?;
        self.check(second)?;
        self.reflections.swap(first, second);
        Ok(())
    }

    /// The entries that drive the orientation calculation.
    pub fn orientation_pair(&self) -> (Option<&Reflection>, Option<&Reflection>) {
        (self.reflections.first(), self.reflections.get(1))
    }

    fn check(&self, index: usize) -> Result<(), HklError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(HklError::ReflectionIndex {
                index,
                len: self.len(),
            })
        }
    }
}
