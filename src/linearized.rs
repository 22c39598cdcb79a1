//! First order approximation of an elastic truss around a reference
//! configuration.
//!
//! The bar forces are expanded to first order in the displacement from the
//! reference configuration `x0`:
//!
//! ```text
//! F = F(x0) + S / L0 * e0 · (Δx_end - Δx_start)
//! ```
//!
//! with `e0` the unit vector from the start to the end of the bar at `x0`.
//! The reference is a private copy of the positions. It only moves when
//! [`Linearization::relinearize`] is called, never behind the caller's back.

use nalgebra::DVector;
use tracing::debug;

use crate::config::RootOptions;
use crate::elastic::{already_balanced, ElasticBars};
use crate::errors::AnalysisError;
use crate::geometry::{unit_vector_between, Vector};
use crate::solver::root::RootReport;
use crate::truss::{flatten_nodes, Truss};

/// Linearized force law of an elastic truss.
#[derive(Clone, Debug, PartialEq)]
pub struct Linearization<const D: usize> {
    /// Material data of the underlying elastic bars.
    bars: ElasticBars,
    /// Point positions at the linearization point.
    reference: Vec<Vector<D>>,
    /// Exact elastic bar forces at the reference.
    reference_forces: Vec<f64>,
}

impl<const D: usize> Linearization<D> {
    /// Linearize the given bars around the current geometry of `truss`.
    #[must_use]
    pub fn new(truss: &Truss<D>, bars: ElasticBars) -> Self {
        let reference_forces = bars.bar_forces(truss);
        Self {
            bars,
            reference: truss.points().to_vec(),
            reference_forces,
        }
    }

    /// Material data of the bars.
    #[must_use]
    pub fn bars(&self) -> &ElasticBars {
        &self.bars
    }

    /// Point positions at the linearization point.
    #[must_use]
    pub fn reference(&self) -> &[Vector<D>] {
        &self.reference
    }

    /// Bar forces at the linearization point.
    #[must_use]
    pub fn reference_forces(&self) -> &[f64] {
        &self.reference_forces
    }

    /// Move the linearization point to the current geometry of `truss`.
    pub fn relinearize(&mut self, truss: &Truss<D>) {
        self.reference.clear();
        self.reference.extend_from_slice(truss.points());
        self.reference_forces = self.bars.bar_forces(truss);
    }

    /// Linearized bar forces at the current geometry.
    #[must_use]
    pub fn bar_forces(&self, truss: &Truss<D>) -> Vec<f64> {
        self.bar_forces_at(truss, truss.points())
    }

    /// Linearized bar forces for arbitrary point positions.
    pub(crate) fn bar_forces_at(&self, truss: &Truss<D>, points: &[Vector<D>]) -> Vec<f64> {
        let reference = &self.reference;
        truss
            .bars()
            .iter()
            .enumerate()
            .map(|(bar, &[start, end])| {
                let e0 = unit_vector_between(&reference[start], &reference[end]);
                let stretch = (points[end] - reference[end]) - (points[start] - reference[start]);
                self.reference_forces[bar]
                    + self.bars.stiffness()[bar] / self.bars.rest_lengths()[bar] * e0.dot(&stretch)
            })
            .collect()
    }

    /// Perform one linear equilibrium step.
    ///
    /// Relinearizes at the current geometry, solves `A Δx = -F` with the
    /// tangent stiffness `A` and the net node forces `F`, moves the nodes by
    /// `Δx` and relinearizes again at the new geometry.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::SingularStiffness`] when the tangent
    /// stiffness cannot be inverted. The truss is unchanged in that case.
    pub fn linear_step(&mut self, truss: &mut Truss<D>) -> Result<(), AnalysisError> {
        self.relinearize(truss);
        let forces = flatten_nodes(
            &truss.net_forces_excluding_supports(&self.reference_forces),
            truss.nodes(),
        );
        if forces.is_empty() {
            return Ok(());
        }
        let stiffness = self.bars.tangent_stiffness(truss);
        let step = stiffness
            .lu()
            .solve(&(-forces))
            .ok_or(AnalysisError::SingularStiffness)?;
        let coordinates: DVector<f64> = truss.node_coordinates() + step;
        truss.set_node_coordinates(&coordinates);
        self.relinearize(truss);
        Ok(())
    }

    /// Reach equilibrium by repeated linear steps.
    ///
    /// Stops as soon as the truss passes the equilibrium check, or gives up
    /// after `options.max_iterations` steps. On failure the positions and the
    /// linearization point are restored to their state before the call.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::SingularStiffness`] when a step cannot be
    /// solved and [`AnalysisError::NotConverged`] when the step budget runs out.
    pub fn find_equilibrium(
        &mut self,
        truss: &mut Truss<D>,
        options: &RootOptions,
    ) -> Result<RootReport, AnalysisError> {
        let forces = self.bar_forces(truss);
        if truss.is_in_equilibrium_with(&forces) {
            return Ok(already_balanced(truss, &forces));
        }

        let saved_nodes = truss.node_coordinates();
        let saved_state = self.clone();
        let restore = |this: &mut Self, truss: &mut Truss<D>| {
            *this = saved_state.clone();
            truss.set_node_coordinates(&saved_nodes);
        };

        for iteration in 1..=options.max_iterations {
            if let Err(error) = self.linear_step(truss) {
                restore(self, truss);
                return Err(error);
            }
            let forces = self.bar_forces(truss);
            debug!(
                iteration,
                residual = truss.equilibrium_residual(&forces),
                "linearized step"
            );
            if truss.is_in_equilibrium_with(&forces) {
                let mut report = already_balanced(truss, &forces);
                report.message = "linear steps reached equilibrium".to_owned();
                report.iterations = iteration;
                report.evaluations = iteration;
                return Ok(report);
            }
        }

        let forces = self.bar_forces(truss);
        let residual = flatten_nodes(&truss.net_forces_excluding_supports(&forces), truss.nodes());
        let report = RootReport {
            success: false,
            message: "maximum number of linear steps reached".to_owned(),
            iterations: options.max_iterations,
            evaluations: options.max_iterations,
            residual_norm: residual.norm(),
            x: truss.node_coordinates(),
        };
        restore(self, truss);
        Err(AnalysisError::NotConverged(report))
    }
}
