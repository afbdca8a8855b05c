use crate::linalg::angle_difference;
use crate::position::{Axis, Position};
use crate::traits::Hardware;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Adapter for calculations without an instrument: no limits, no live position.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHardware;

impl Hardware for NoHardware {}

/// Operator-configured axis windows in radians, optionally paired with a
/// last-known pose for tracking constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    limits: [AxisWindow; 6],
    #[serde(default)]
    position: Option<Position>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisWindow {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

const LIMIT_TOLERANCE: f64 = 1e-9;

impl AxisLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window for `axis` in degrees.
    pub fn with_degrees(mut self, axis: Axis, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.set_limits(axis, lower.map(f64::to_radians), upper.map(f64::to_radians));
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn set_limits(&mut self, axis: Axis, lower: Option<f64>, upper: Option<f64>) {
        self.limits[axis.index()] = AxisWindow { lower, upper };
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = Some(position);
    }

    pub fn window(&self, axis: Axis) -> AxisWindow {
        self.limits[axis.index()]
    }
}

impl Hardware for AxisLimits {
    fn position(&self) -> anyhow::Result<Position> {
        match self.position {
            Some(position) => Ok(position),
            None => bail!("no position recorded for tracking"),
        }
    }

    /// Wraps into `[lower, lower + 2π)` when a lower limit is set.
    fn cut_angle(&self, axis: Axis, value: f64) -> f64 {
        match self.window(axis).lower {
            Some(lower) => {
                let start = lower - LIMIT_TOLERANCE;
                start + (value - start).rem_euclid(2.0 * PI)
            }
            None => value,
        }
    }

    fn is_within_limits(&self, axis: Axis, value: f64) -> bool {
        let window = self.window(axis);
        let above = window
            .lower
            .map_or(true, |lower| value >= lower - LIMIT_TOLERANCE);
        let below = window
            .upper
            .map_or(true, |upper| value <= upper + LIMIT_TOLERANCE);
        above && below
    }
}

/// Holds the axes a geometry lacks at zero on top of another adapter.
pub(crate) struct PinnedAxes<'a> {
    inner: &'a dyn Hardware,
    pinned: &'static [Axis],
}

impl<'a> PinnedAxes<'a> {
    pub fn new(inner: &'a dyn Hardware, pinned: &'static [Axis]) -> Self {
        Self { inner, pinned }
    }

    fn is_pinned(&self, axis: Axis) -> bool {
        self.pinned.contains(&axis)
    }
}

impl Hardware for PinnedAxes<'_> {
    fn axis_names(&self) -> [&'static str; 6] {
        self.inner.axis_names()
    }

    fn position(&self) -> anyhow::Result<Position> {
        self.inner.position()
    }

    fn cut_angle(&self, axis: Axis, value: f64) -> f64 {
        if self.is_pinned(axis) && angle_difference(value, 0.0) < PINNED_TOLERANCE {
            return 0.0;
        }
        self.inner.cut_angle(axis, value)
    }

    fn is_within_limits(&self, axis: Axis, value: f64) -> bool {
        if self.is_pinned(axis) && value.abs() >= PINNED_TOLERANCE {
            return false;
        }
        self.inner.is_within_limits(axis, value)
    }
}

const PINNED_TOLERANCE: f64 = 1e-8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_angle_moves_into_window_before_limit_check() {
        let limits = AxisLimits::new().with_degrees(Axis::Nu, Some(0.0), Some(180.0));
        let cut = limits.cut_angle(Axis::Nu, (-60.0_f64).to_radians());
        assert!((cut.to_degrees() - 300.0).abs() < 1e-9);
        assert!(!limits.is_within_limits(Axis::Nu, cut));

        let cut = limits.cut_angle(Axis::Nu, (-300.0_f64).to_radians());
        assert!((cut.to_degrees() - 60.0).abs() < 1e-9);
        assert!(limits.is_within_limits(Axis::Nu, cut));
    }

    #[test]
    fn unlimited_axes_accept_everything() {
        let limits = AxisLimits::new().with_degrees(Axis::Mu, Some(-10.0), Some(10.0));
        assert!(limits.is_within_limits(Axis::Chi, 3.0));
        assert_eq!(limits.cut_angle(Axis::Chi, -3.0), -3.0);
        assert!(!limits.is_within_limits(Axis::Mu, 0.5));
    }

    #[test]
    fn lower_limit_itself_is_kept() {
        let limits = AxisLimits::new().with_degrees(Axis::Eta, Some(-90.0), Some(90.0));
        let cut = limits.cut_angle(Axis::Eta, (-90.0_f64).to_radians());
        assert!((cut.to_degrees() + 90.0).abs() < 1e-6);
        assert!(limits.is_within_limits(Axis::Eta, cut));
    }

    #[test]
    fn pinned_axes_only_admit_zero() {
        let limits = AxisLimits::new().with_degrees(Axis::Mu, Some(-90.0), Some(90.0));
        let pinned = PinnedAxes::new(&limits, &[Axis::Mu, Axis::Nu]);

        let cut = pinned.cut_angle(Axis::Mu, 2.0 * PI - 1e-12);
        assert_eq!(cut, 0.0);
        assert!(pinned.is_within_limits(Axis::Mu, cut));

        let cut = pinned.cut_angle(Axis::Mu, 0.5);
        assert!(!pinned.is_within_limits(Axis::Mu, cut));
        assert!(!pinned.is_within_limits(Axis::Nu, 0.5));
        assert!(pinned.is_within_limits(Axis::Delta, 0.5));
        assert!(pinned.position().is_err());
    }

    #[test]
    fn tracking_position_requires_a_record() {
        assert!(AxisLimits::new().position().is_err());
        let pos = Position::from_degrees([0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(AxisLimits::new().with_position(pos).position().ok(), Some(pos));
        assert!(NoHardware.position().is_err());
    }
}
