use crate::linalg::{angle_difference, cut_angle};

/// Numeric representations of one circle angle that leave the crystal
/// orientation problem unchanged: {v, −v, π+v, π−v}, cut into (−π, π] and
/// de-duplicated. Near 0 this collapses to {0, π}; near π/2 to {π/2, −π/2}.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricValues {
    values: [f64; 4],
    len: usize,
}

impl SymmetricValues {
    pub fn new(value: f64, tolerance: f64) -> Self {
        let mut set = Self {
            values: [0.0; 4],
            len: 0,
        };
        for raw in [
            value,
            -value,
            std::f64::consts::PI + value,
            std::f64::consts::PI - value,
        ] {
            let candidate = cut_angle(raw);
            let seen = set
                .iter()
                .any(|existing| angle_difference(existing, candidate) < tolerance);
            if !seen {
                set.values[set.len] = candidate;
                set.len += 1;
            }
        }
        set
    }

    /// A constrained circle: only its own value is tried.
    pub fn literal(value: f64) -> Self {
        Self {
            values: [value, 0.0, 0.0, 0.0],
            len: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.as_slice().iter().copied()
    }
}

/// Cartesian product in enumeration order: the first set varies slowest.
pub fn cartesian<const N: usize>(sets: &[SymmetricValues; N]) -> Vec<[f64; N]> {
    let mut product = vec![[0.0; N]];
    for (i, set) in sets.iter().enumerate() {
        product = product
            .into_iter()
            .flat_map(|prefix| {
                set.iter().map(move |value| {
                    let mut next = prefix;
                    next[i] = value;
                    next
                })
            })
            .collect();
    }
    product
}
