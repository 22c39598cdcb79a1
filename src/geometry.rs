//! Fundamental geometric helpers for truss modelling.

use nalgebra::SVector;

/// Position, force or displacement in `D` dimensional space.
///
/// Positions are measured in metres, forces in newtons.
pub type Vector<const D: usize> = SVector<f64, D>;

/// Standard gravitational acceleration in metres per second squared.
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Convenience helper for creating planar vectors.
///
/// # Examples
/// ```
/// use stabwerk::point2;
///
/// let origin = point2(0.0, 0.0);
/// assert_eq!(origin.x, 0.0);
/// ```
#[must_use]
pub fn point2(x: f64, y: f64) -> Vector<2> {
    Vector::<2>::new(x, y)
}

/// Convenience helper for creating spatial vectors.
///
/// # Examples
/// ```
/// use stabwerk::point3;
///
/// let load = point3(1.0, 0.0, -5.0);
/// assert_eq!(load.z, -5.0);
/// ```
#[must_use]
pub fn point3(x: f64, y: f64, z: f64) -> Vector<3> {
    Vector::<3>::new(x, y, z)
}

/// Gravitational acceleration pointing down the last axis.
///
/// For a planar truss this is the negative y direction, for a spatial
/// truss the negative z direction.
#[must_use]
pub fn default_gravity<const D: usize>() -> Vector<D> {
    let mut gravity = Vector::<D>::zeros();
    if D > 0 {
        gravity[D - 1] = -STANDARD_GRAVITY;
    }
    gravity
}

/// Unit vector at `from` pointing towards `to`.
///
/// Coincident points have no direction, in which case the zero vector is
/// returned.
#[must_use]
pub fn unit_vector_between<const D: usize>(from: &Vector<D>, to: &Vector<D>) -> Vector<D> {
    (to - from)
        .try_normalize(0.0)
        .unwrap_or_else(Vector::<D>::zeros)
}

/// Euclidean distance between two points.
#[must_use]
pub fn distance<const D: usize>(a: &Vector<D>, b: &Vector<D>) -> f64 {
    (b - a).norm()
}
