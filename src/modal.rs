//! Small vibrations of a truss around a static equilibrium.
//!
//! Around an equilibrium the equations of motion linearize to
//! `m ẍ = A x`, with `A` the tangent stiffness. Harmonic solutions
//! `x = φ sin(ωt)` follow from the eigenproblem `-A φ = ω² M φ`, which is
//! turned into a standard symmetric one by the scaling `M^{-1/2}`.

use std::f64::consts::PI;

use nalgebra::linalg::SymmetricEigen;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array3, ArrayView2};
use tracing::warn;

use crate::errors::AnalysisError;
use crate::geometry::Vector;
use crate::truss::Truss;

/// Relative asymmetry of the stiffness matrix above which a warning is logged.
const ASYMMETRY_TOLERANCE: f64 = 1e-9;

/// Natural frequencies and mode shapes of a truss.
#[derive(Clone, Debug, PartialEq)]
pub struct Eigenmodes {
    /// Natural frequencies in hertz, ascending.
    frequencies: Vec<f64>,
    /// Mode shapes, `n_modes × n_points × D`, zero at the supports.
    shapes: Array3<f64>,
}

impl Eigenmodes {
    /// Natural frequencies in hertz, sorted ascending.
    #[must_use]
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// All mode shapes as an `n_modes × n_points × D` array.
    #[must_use]
    pub fn shapes(&self) -> &Array3<f64> {
        &self.shapes
    }

    /// Number of modes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    /// Whether the truss has no free degrees of freedom.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Shape of one mode as an `n_points × D` array of unit norm.
    #[must_use]
    pub fn mode(&self, mode: usize) -> Option<ArrayView2<'_, f64>> {
        (mode < self.len()).then(|| self.shapes.index_axis(ndarray::Axis(0), mode))
    }

    /// Point positions deflected along a mode shape.
    ///
    /// Returns `points + amplitude * sin(phase) * shape`, the configuration
    /// of the vibrating truss at the given phase of the oscillation. `None`
    /// when the mode does not exist or the point count does not match.
    #[must_use]
    pub fn displaced_points<const D: usize>(
        &self,
        points: &[Vector<D>],
        mode: usize,
        amplitude: f64,
        phase: f64,
    ) -> Option<Vec<Vector<D>>> {
        let shape = self.mode(mode)?;
        if shape.nrows() != points.len() || shape.ncols() != D {
            return None;
        }
        let scale = amplitude * phase.sin();
        Some(
            points
                .iter()
                .zip(shape.outer_iter())
                .map(|(point, row)| point + Vector::<D>::from_fn(|axis, _| row[axis]) * scale)
                .collect(),
        )
    }
}

/// Compute the eigenmodes of a truss from its tangent stiffness.
///
/// `stiffness` is the `node_count * D` tangent stiffness at the current
/// configuration and `bar_forces` the bar forces there. The configuration
/// has to be a static equilibrium and every node needs a positive mass.
///
/// # Errors
///
/// Returns [`AnalysisError::NotInEquilibrium`] away from equilibrium and
/// [`AnalysisError::MasslessNode`] when a node has no mass.
pub fn eigenmodes<const D: usize>(
    truss: &Truss<D>,
    stiffness: &DMatrix<f64>,
    bar_forces: &[f64],
) -> Result<Eigenmodes, AnalysisError> {
    if !truss.is_in_equilibrium_with(bar_forces) {
        return Err(AnalysisError::NotInEquilibrium {
            residual: truss.equilibrium_residual(bar_forces),
            threshold: truss.tolerance().threshold(truss.reference_force(bar_forces)),
        });
    }
    if let Some(&node) = truss.nodes().iter().find(|&&node| truss.masses()[node] <= 0.0) {
        return Err(AnalysisError::MasslessNode(node));
    }

    let n = truss.node_count() * D;
    if n == 0 {
        return Ok(Eigenmodes {
            frequencies: Vec::new(),
            shapes: Array3::zeros((0, truss.point_count(), D)),
        });
    }
    let inverse_sqrt_mass = DVector::from_iterator(
        n,
        truss
            .nodes()
            .iter()
            .flat_map(|&node| std::iter::repeat(truss.masses()[node].sqrt().recip()).take(D)),
    );

    let restoring = -stiffness;
    let asymmetry = (&restoring - restoring.transpose()).norm();
    if asymmetry > ASYMMETRY_TOLERANCE * restoring.norm() {
        warn!(
            asymmetry,
            "stiffness matrix is not symmetric; discarding the imaginary parts of the eigenvalues"
        );
    }
    let symmetric = (&restoring + restoring.transpose()) * 0.5;
    let scaled = DMatrix::from_fn(n, n, |row, column| {
        symmetric[(row, column)] * inverse_sqrt_mass[row] * inverse_sqrt_mass[column]
    });

    let eigen = SymmetricEigen::new(scaled);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let negative: Vec<f64> = eigen.eigenvalues.iter().copied().filter(|&value| value < 0.0).collect();
    if !negative.is_empty() {
        warn!(
            count = negative.len(),
            smallest = negative.iter().copied().fold(0.0_f64, f64::min),
            "clamping negative eigenvalues to zero"
        );
    }

    let mut frequencies = Vec::with_capacity(n);
    let mut shapes = Array3::zeros((n, truss.point_count(), D));
    for (mode, &index) in order.iter().enumerate() {
        frequencies.push(eigen.eigenvalues[index].max(0.0).sqrt() / (2.0 * PI));

        let mut shape = eigen.eigenvectors.column(index).component_mul(&inverse_sqrt_mass);
        let norm = shape.norm();
        if norm > 0.0 {
            shape /= norm;
        }
        // Largest component positive, so the sign of a mode is reproducible.
        let largest = shape.iamax();
        if shape[largest] < 0.0 {
            shape.neg_mut();
        }
        for (slot, &node) in truss.nodes().iter().enumerate() {
            for axis in 0..D {
                shapes[[mode, node, axis]] = shape[slot * D + axis];
            }
        }
    }

    Ok(Eigenmodes { frequencies, shapes })
}
