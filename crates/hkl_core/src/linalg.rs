use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

/// Right-handed rotation by `angle` about the x axis.
pub fn x_rotation(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

/// Right-handed rotation by `angle` about the y axis.
pub fn y_rotation(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

/// Right-handed rotation by `angle` about the z axis.
pub fn z_rotation(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Right-handed rotation by `angle` about an arbitrary unit `axis` (Rodrigues).
pub fn axis_angle_rotation(axis: &Vector3<f64>, angle: f64) -> Matrix3<f64> {
    let k = Matrix3::new(
        0.0, -axis.z, axis.y, //
        axis.z, 0.0, -axis.x, //
        -axis.y, axis.x, 0.0,
    );
    let (s, c) = angle.sin_cos();
    Matrix3::identity() + k * s + k * k * (1.0 - c)
}

/// Clamps a sine/cosine argument into [-1, 1].
///
/// Returns `None` when the value overshoots by more than `tolerance`, which
/// callers translate into an "unreachable" error for their own context.
pub fn bound(value: f64, tolerance: f64) -> Option<f64> {
    if !value.is_finite() || value.abs() > 1.0 + tolerance {
        return None;
    }
    Some(value.clamp(-1.0, 1.0))
}

pub fn bounded_acos(value: f64, tolerance: f64) -> Option<f64> {
    bound(value, tolerance).map(f64::acos)
}

pub fn bounded_asin(value: f64, tolerance: f64) -> Option<f64> {
    bound(value, tolerance).map(f64::asin)
}

/// Angle in [0, π] between two vectors; zero when either vector vanishes.
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let na = a.norm();
    let nb = b.norm();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (a.dot(b) / (na * nb)).clamp(-1.0, 1.0).acos()
}

/// Wraps an angle into the canonical (−π, π] range.
pub fn cut_angle(angle: f64) -> f64 {
    let mut wrapped = angle % (2.0 * PI);
    if wrapped <= -PI {
        wrapped += 2.0 * PI;
    } else if wrapped > PI {
        wrapped -= 2.0 * PI;
    }
    wrapped
}

/// Smallest absolute difference between two angles modulo 2π.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    cut_angle(a - b).abs()
}

/// Unit vector along `v`, or `None` if its norm is below `tolerance`.
pub fn normalize_checked(v: &Vector3<f64>, tolerance: f64) -> Option<Vector3<f64>> {
    let norm = v.norm();
    if !norm.is_finite() || norm < tolerance {
        return None;
    }
    Some(v / norm)
}

/// Rotation taking the pair (`a_from`, `b_from`) onto (`a_to`, `b_to`).
///
/// Builds the orthonormal triads t1 = a, t3 = a × b, t2 = t3 × t1 in both
/// frames and returns `T_to · T_fromᵀ`. The first vector of each pair is
/// matched exactly; the second only fixes the rotation about it. Fails when a
/// vector vanishes or the two vectors of a pair are (anti)parallel.
pub fn rotation_from_vector_pairs(
    a_from: &Vector3<f64>,
    b_from: &Vector3<f64>,
    a_to: &Vector3<f64>,
    b_to: &Vector3<f64>,
    tolerance: f64,
) -> Option<Matrix3<f64>> {
    let from = orthonormal_triad(a_from, b_from, tolerance)?;
    let to = orthonormal_triad(a_to, b_to, tolerance)?;
    Some(to * from.transpose())
}

fn orthonormal_triad(a: &Vector3<f64>, b: &Vector3<f64>, tolerance: f64) -> Option<Matrix3<f64>> {
    let t1 = normalize_checked(a, tolerance)?;
    let b_unit = normalize_checked(b, tolerance)?;
    let t3 = normalize_checked(&t1.cross(&b_unit), tolerance)?;
    let t2 = normalize_checked(&t3.cross(&t1), tolerance)?;
    Some(Matrix3::from_columns(&[t1, t2, t3]))
}

/// Largest absolute element-wise difference between two matrices.
pub fn max_abs_difference(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
    (a - b).iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rotation_builders_are_right_handed() {
        let quarter = PI / 2.0;
        assert_abs_diff_eq!(
            x_rotation(quarter) * Vector3::y(),
            Vector3::z(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            y_rotation(quarter) * Vector3::z(),
            Vector3::x(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            z_rotation(quarter) * Vector3::x(),
            Vector3::y(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn axis_angle_matches_axis_builders() {
        let angle = 0.37;
        assert_abs_diff_eq!(
            axis_angle_rotation(&Vector3::y(), angle),
            y_rotation(angle),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            axis_angle_rotation(&Vector3::z(), -angle),
            z_rotation(-angle),
            epsilon = 1e-12
        );
    }

    #[test]
    fn bound_accepts_small_overshoot_only() {
        assert_eq!(bound(1.0 + 1e-9, 1e-6), Some(1.0));
        assert_eq!(bound(-1.0 - 1e-9, 1e-6), Some(-1.0));
        assert_eq!(bound(1.01, 1e-6), None);
        assert_eq!(bound(f64::NAN, 1e-6), None);
    }

    #[test]
    fn cut_angle_wraps_into_half_open_range() {
        assert!((cut_angle(PI) - PI).abs() < 1e-12);
        assert!((cut_angle(-PI) - PI).abs() < 1e-12);
        assert!((cut_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((cut_angle(-5.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!(angle_difference(PI - 1e-9, -PI + 1e-9) < 1e-8);
    }

    #[test]
    fn vector_pair_rotation_is_proper_and_maps_pairs() {
        let a = Vector3::new(1.0, 0.2, -0.3);
        let b = Vector3::new(-0.4, 1.0, 0.5);
        let r = x_rotation(0.3) * z_rotation(-1.1) * y_rotation(0.7);
        let rot = rotation_from_vector_pairs(&a, &b, &(r * a), &(r * b), 1e-6)
            .expect("non-parallel pair");
        assert_abs_diff_eq!(rot, r, epsilon = 1e-12);
        assert!((rot.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn vector_pair_rotation_rejects_parallel_pair() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(-2.0, 0.0, 0.0);
        assert!(rotation_from_vector_pairs(&a, &b, &a, &Vector3::y(), 1e-6).is_none());
    }
}
