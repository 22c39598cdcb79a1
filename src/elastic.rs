//! Bars that obey Hooke's law.
//!
//! A bar with stiffness `S` and rest length `L0` carries the force
//! `S * (L / L0 - 1)` at length `L`, positive for tension. Equilibrium is a
//! nonlinear problem in the node coordinates and is handed to the Newton
//! solver together with the analytic tangent stiffness.

use nalgebra::{DMatrix, DVector, SMatrix};
use tracing::debug;

use crate::config::RootOptions;
use crate::errors::{AnalysisError, TrussEditError};
use crate::geometry::{unit_vector_between, Vector};
use crate::solver::root::{newton_with_jacobian, RootReport};
use crate::truss::{check_length, flatten_nodes, Truss};

/// Stiffness in newtons used when none is given, stiff enough that the
/// bars behave almost rigidly.
pub const DEFAULT_STIFFNESS: f64 = 1e8;

/// Material data of the bars of an elastic truss.
///
/// The rest lengths are captured from the geometry at construction, so a
/// freshly built truss without loads is stress free.
#[derive(Clone, Debug, PartialEq)]
pub struct ElasticBars {
    /// Stiffness `S = E * A` of every bar in newtons.
    stiffness: Vec<f64>,
    /// Unstressed length of every bar in metres.
    rest_lengths: Vec<f64>,
}

impl ElasticBars {
    /// Create bars with individual stiffnesses, relaxed at the current geometry.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::LengthMismatch`] when the number of
    /// stiffnesses differs from the number of bars and
    /// [`TrussEditError::InvalidStiffness`] for non-positive values.
    pub fn new<const D: usize>(
        truss: &Truss<D>,
        stiffness: impl IntoIterator<Item = f64>,
    ) -> Result<Self, TrussEditError> {
        let stiffness: Vec<f64> = stiffness.into_iter().collect();
        check_length("stiffness", truss.bar_count(), stiffness.len())?;
        if let Some((bar, &value)) = stiffness
            .iter()
            .enumerate()
            .find(|(_, value)| !value.is_finite() || **value <= 0.0)
        {
            return Err(TrussEditError::InvalidStiffness {
                bar,
                stiffness: value,
            });
        }
        Ok(Self {
            stiffness,
            rest_lengths: truss.bar_lengths(),
        })
    }

    /// Create bars that all share the same stiffness.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::InvalidStiffness`] for a non-positive value.
    pub fn uniform<const D: usize>(truss: &Truss<D>, stiffness: f64) -> Result<Self, TrussEditError> {
        Self::new(truss, vec![stiffness; truss.bar_count()])
    }

    /// Create bars with [`DEFAULT_STIFFNESS`].
    #[must_use]
    pub fn with_default_stiffness<const D: usize>(truss: &Truss<D>) -> Self {
        Self {
            stiffness: vec![DEFAULT_STIFFNESS; truss.bar_count()],
            rest_lengths: truss.bar_lengths(),
        }
    }

    /// Replace the rest lengths, e.g. to build a prestressed truss.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::LengthMismatch`] when the number of lengths
    /// differs from the number of bars and
    /// [`TrussEditError::InvalidRestLength`] for non-positive values.
    pub fn with_rest_lengths(
        mut self,
        rest_lengths: impl IntoIterator<Item = f64>,
    ) -> Result<Self, TrussEditError> {
        let rest_lengths: Vec<f64> = rest_lengths.into_iter().collect();
        check_length("rest lengths", self.stiffness.len(), rest_lengths.len())?;
        if let Some((bar, &length)) = rest_lengths
            .iter()
            .enumerate()
            .find(|(_, length)| !length.is_finite() || **length <= 0.0)
        {
            return Err(TrussEditError::InvalidRestLength { bar, length });
        }
        self.rest_lengths = rest_lengths;
        Ok(self)
    }

    /// Stiffness of every bar in newtons.
    #[must_use]
    pub fn stiffness(&self) -> &[f64] {
        &self.stiffness
    }

    /// Rest length of every bar in metres.
    #[must_use]
    pub fn rest_lengths(&self) -> &[f64] {
        &self.rest_lengths
    }

    /// Bar forces at the current geometry, positive for tension.
    #[must_use]
    pub fn bar_forces<const D: usize>(&self, truss: &Truss<D>) -> Vec<f64> {
        self.bar_forces_at(truss, truss.points())
    }

    /// Bar forces for arbitrary point positions.
    pub(crate) fn bar_forces_at<const D: usize>(&self, truss: &Truss<D>, points: &[Vector<D>]) -> Vec<f64> {
        truss
            .bar_lengths_at(points)
            .iter()
            .zip(&self.stiffness)
            .zip(&self.rest_lengths)
            .map(|((length, stiffness), rest)| stiffness * (length / rest - 1.0))
            .collect()
    }

    /// Jacobian of the net node forces with respect to the node coordinates.
    ///
    /// The matrix is `node_count * D` square, rows and columns ordered by
    /// node and then by axis. For a bar with unit vector `e`, length `L` and
    /// rest length `L0` the block coupling an endpoint with itself is
    /// `-S/L e eᵀ - S (1/L0 - 1/L) I`; the block coupling the two endpoints
    /// is its negative. Supports contribute no rows or columns.
    #[must_use]
    pub fn tangent_stiffness<const D: usize>(&self, truss: &Truss<D>) -> DMatrix<f64> {
        self.tangent_stiffness_at(truss, truss.points())
    }

    /// [`ElasticBars::tangent_stiffness`] for arbitrary point positions.
    pub(crate) fn tangent_stiffness_at<const D: usize>(
        &self,
        truss: &Truss<D>,
        points: &[Vector<D>],
    ) -> DMatrix<f64> {
        let n = truss.node_count() * D;
        let mut matrix = DMatrix::zeros(n, n);
        // Position of every point in the node ordering, None for supports.
        let mut slot = vec![None; truss.point_count()];
        for (index, &node) in truss.nodes().iter().enumerate() {
            slot[node] = Some(index);
        }

        for (bar, &[start, end]) in truss.bars().iter().enumerate() {
            let length = (points[end] - points[start]).norm();
            let e = unit_vector_between(&points[start], &points[end]);
            let stiffness = self.stiffness[bar];
            let block: SMatrix<f64, D, D> = -(e * e.transpose()) * (stiffness / length)
                - SMatrix::<f64, D, D>::identity()
                    * (stiffness * (1.0 / self.rest_lengths[bar] - 1.0 / length));

            for (row, column, sign) in [
                (start, start, 1.0),
                (end, end, 1.0),
                (start, end, -1.0),
                (end, start, -1.0),
            ] {
                let (Some(row), Some(column)) = (slot[row], slot[column]) else {
                    continue;
                };
                let mut target = matrix.view_mut((row * D, column * D), (D, D));
                target += block * sign;
            }
        }
        matrix
    }

    /// Move the nodes into static equilibrium.
    ///
    /// A truss that already satisfies the equilibrium check is left alone
    /// and reported as converged after zero iterations. Otherwise Newton's
    /// method runs on the node coordinates with the tangent stiffness as
    /// Jacobian. On success the node positions are updated; on failure they
    /// stay where they were.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::NotConverged`] with the solver report when
    /// the iteration does not converge or stops before the truss meets its
    /// equilibrium tolerance.
    pub fn find_equilibrium<const D: usize>(
        &self,
        truss: &mut Truss<D>,
        options: &RootOptions,
    ) -> Result<RootReport, AnalysisError> {
        let forces = self.bar_forces(truss);
        if truss.is_in_equilibrium_with(&forces) {
            return Ok(already_balanced(truss, &forces));
        }

        let model: &Truss<D> = truss;
        let mut x = model.node_coordinates();
        let mut iterations = 0;
        let mut evaluations = 0;
        // The step test of Newton's method is relative to the coordinates,
        // so it can stop short of the force tolerance far from the origin.
        let report = loop {
            let mut report = newton_with_jacobian(
                |x: &DVector<f64>| {
                    let points = model.points_with_nodes(x);
                    let forces = self.bar_forces_at(model, &points);
                    flatten_nodes(&model.net_forces_at(&points, &forces), model.nodes())
                },
                |x: &DVector<f64>, _: &DVector<f64>| {
                    self.tangent_stiffness_at(model, &model.points_with_nodes(x))
                },
                x,
                &(*options).with_max_iterations(options.max_iterations - iterations),
            );
            let stalled = report.iterations == 0;
            iterations += report.iterations;
            evaluations += report.evaluations;
            report.iterations = iterations;
            report.evaluations = evaluations;
            if !report.success {
                return Err(AnalysisError::NotConverged(report));
            }

            let points = model.points_with_nodes(&report.x);
            if model.is_in_equilibrium_at(&points, &self.bar_forces_at(model, &points)) {
                break report;
            }
            if stalled || iterations >= options.max_iterations {
                report.success = false;
                report.message = "step tolerance reached outside the equilibrium tolerance".to_owned();
                return Err(AnalysisError::NotConverged(report));
            }
            debug!(
                iterations,
                residual = report.residual_norm,
                "newton stopped outside the equilibrium tolerance, continuing"
            );
            x = report.x;
        };
        truss.set_node_coordinates(&report.x);
        debug!(
            iterations = report.iterations,
            residual = report.residual_norm,
            "elastic truss reached equilibrium"
        );
        Ok(report)
    }
}

/// Report for a truss that needed no iteration at all.
pub(crate) fn already_balanced<const D: usize>(truss: &Truss<D>, bar_forces: &[f64]) -> RootReport {
    let residual = flatten_nodes(&truss.net_forces_excluding_supports(bar_forces), truss.nodes());
    RootReport {
        success: true,
        message: "truss is already in equilibrium".to_owned(),
        iterations: 0,
        evaluations: 1,
        residual_norm: residual.norm(),
        x: truss.node_coordinates(),
    }
}
