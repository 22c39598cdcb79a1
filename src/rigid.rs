//! Bar forces of a truss with inextensible bars.
//!
//! With rigid bars the positions never change; the bar forces are the
//! unknowns of a linear system expressing equilibrium at every node:
//!
//! ```text
//! A * bar_forces + external + weight = 0     (node rows only)
//! ```
//!
//! where column `b` of `A` holds the unit vectors of bar `b` at each node.

use nalgebra::{DMatrix, DVector};

use crate::errors::AnalysisError;
use crate::truss::{flatten_nodes, Truss};

/// Assemble the rigid system matrix (`node_count * D` × `bar_count`).
///
/// Entry `(n * D + axis, b)` is component `axis` of the unit vector of bar
/// `b` at the `n`-th node, zero when the bar does not touch that node.
#[must_use]
pub fn system_matrix<const D: usize>(truss: &Truss<D>) -> DMatrix<f64> {
    let mut matrix = DMatrix::zeros(truss.node_count() * D, truss.bar_count());
    for (n, &node) in truss.nodes().iter().enumerate() {
        for bar in truss.bars_at(node) {
            let unit = truss.unit_vector(node, bar);
            for axis in 0..D {
                matrix[(n * D + axis, bar)] = unit[axis];
            }
        }
    }
    matrix
}

/// Solve for the bar forces that hold every node in equilibrium.
///
/// # Errors
///
/// Returns [`AnalysisError::NonSquareSystem`] when the number of node force
/// components differs from the number of bars and
/// [`AnalysisError::SingularSystem`] when the system matrix is singular.
/// Both indicate a truss that is not statically determinate.
pub fn bar_forces<const D: usize>(truss: &Truss<D>) -> Result<Vec<f64>, AnalysisError> {
    let matrix = system_matrix(truss);
    if matrix.nrows() != matrix.ncols() {
        return Err(AnalysisError::NonSquareSystem {
            equations: matrix.nrows(),
            unknowns: matrix.ncols(),
        });
    }
    if matrix.is_empty() {
        return Ok(Vec::new());
    }
    let loads: Vec<_> = truss
        .external_forces()
        .iter()
        .zip(truss.gravity_forces())
        .map(|(external, weight)| external + weight)
        .collect();
    let rhs: DVector<f64> = -flatten_nodes(&loads, truss.nodes());
    let solution = matrix
        .lu()
        .solve(&rhs)
        .ok_or(AnalysisError::SingularSystem)?;
    Ok(solution.iter().copied().collect())
}
