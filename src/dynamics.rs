//! Motion of an elastic truss under its bar forces, loads and damping.
//!
//! Every node obeys `m a = F_bars + F_ext + m g - c v`; supports stay where
//! they are. The state vector handed to the integrator holds the node
//! positions followed by the node velocities, each flattened by node and
//! then by axis.

use nalgebra::DVector;
use ndarray::Array3;
use tracing::debug;

use crate::config::OdeOptions;
use crate::errors::{AnalysisError, TrussEditError};
use crate::geometry::Vector;
use crate::law::{ForceLaw, TrussModel};
use crate::solver::ode::dormand_prince;
use crate::truss::{check_length, flatten_nodes, scatter_nodes};

/// Bar forces as a function of the point positions.
type BarForceFn<'a, const D: usize> = Box<dyn Fn(&[Vector<D>]) -> Vec<f64> + 'a>;

/// Time history of a truss, sampled at the integrator's output times.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    /// Sample times in seconds.
    pub times: Vec<f64>,
    /// Point positions, `n_samples × n_points × D`.
    pub positions: Array3<f64>,
    /// Point velocities, `n_samples × n_points × D`; zero at supports.
    pub velocities: Array3<f64>,
    /// Number of force evaluations.
    pub evaluations: usize,
    /// Number of accepted integration steps.
    pub accepted_steps: usize,
    /// Number of rejected integration steps.
    pub rejected_steps: usize,
}

impl Trajectory {
    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the trajectory holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// An elastic or linearized truss with point masses and velocity damping.
///
/// # Examples
/// ```
/// use stabwerk::{point2, DynamicTruss, OdeOptions, Truss, TrussModel};
///
/// let truss = Truss::builder(vec![point2(0.0, 1.0), point2(0.0, 0.0)])
///     .supports([0])
///     .bars([[0, 1]])
///     .masses([0.0, 1.0])
///     .build()
///     .expect("valid truss");
/// let model = TrussModel::elastic(truss, 1e4).expect("valid stiffness");
/// let dynamics = DynamicTruss::new(model).with_uniform_damping(5.0).expect("valid damping");
///
/// let trajectory = dynamics
///     .solve(1.0, None, None, &OdeOptions::default().with_sampling(1.0, 0.1))
///     .expect("integration succeeds");
/// assert_eq!(trajectory.len(), 10);
/// // The support never moves.
/// assert_eq!(trajectory.positions[[9, 0, 1]], 1.0);
/// ```
#[derive(Clone, Debug)]
pub struct DynamicTruss<const D: usize> {
    /// Truss and force law.
    model: TrussModel<D>,
    /// Damping coefficient of every point in kilograms per second.
    damping: Vec<f64>,
}

impl<const D: usize> DynamicTruss<D> {
    /// Wrap a model without damping.
    #[must_use]
    pub fn new(model: TrussModel<D>) -> Self {
        let damping = vec![0.0; model.truss().point_count()];
        Self { model, damping }
    }

    /// Assign a damping coefficient to every point.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::LengthMismatch`] when the number of
    /// coefficients differs from the number of points and
    /// [`TrussEditError::InvalidDamping`] for negative values.
    pub fn with_damping(
        mut self,
        damping: impl IntoIterator<Item = f64>,
    ) -> Result<Self, TrussEditError> {
        let damping: Vec<f64> = damping.into_iter().collect();
        check_length("damping", self.model.truss().point_count(), damping.len())?;
        if let Some((point, &value)) = damping
            .iter()
            .enumerate()
            .find(|(_, value)| !value.is_finite() || **value < 0.0)
        {
            return Err(TrussEditError::InvalidDamping {
                point,
                damping: value,
            });
        }
        self.damping = damping;
        Ok(self)
    }

    /// Use the same damping coefficient for every point.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::InvalidDamping`] for a negative value.
    pub fn with_uniform_damping(self, damping: f64) -> Result<Self, TrussEditError> {
        let count = self.model.truss().point_count();
        self.with_damping(vec![damping; count])
    }

    /// The underlying model.
    #[must_use]
    pub fn model(&self) -> &TrussModel<D> {
        &self.model
    }

    /// Mutable access to the underlying model.
    pub fn model_mut(&mut self) -> &mut TrussModel<D> {
        &mut self.model
    }

    /// Damping coefficient of every point in kilograms per second.
    #[must_use]
    pub fn damping(&self) -> &[f64] {
        &self.damping
    }

    /// Time derivative of the state at the given positions and velocities.
    ///
    /// Returns the velocities and accelerations of every point. Both are
    /// zero at supports, whatever the input says. The truss itself is not
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Unsupported`] for a rigid model,
    /// [`AnalysisError::MasslessNode`] when a node has no mass and
    /// [`AnalysisError::InvalidInitialState`] when the arrays do not match
    /// the number of points.
    pub fn state_derivative(
        &self,
        positions: &[Vector<D>],
        velocities: &[Vector<D>],
    ) -> Result<(Vec<Vector<D>>, Vec<Vector<D>>), AnalysisError> {
        self.check_state(positions)?;
        self.check_state(velocities)?;
        let bar_forces = self.bar_force_fn()?;
        self.check_masses()?;

        let mut velocities = velocities.to_vec();
        for &support in self.model.truss().supports() {
            velocities[support] = Vector::<D>::zeros();
        }
        let accelerations = self.accelerations(&bar_forces, positions, &velocities);
        Ok((velocities, accelerations))
    }

    /// Integrate the equations of motion over `duration` seconds.
    ///
    /// `initial_positions` defaults to the current geometry and
    /// `initial_velocities` to rest; only their node entries are used. The
    /// truss keeps its positions; the motion is returned as a [`Trajectory`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidDuration`] for a negative or
    /// non-finite `duration`, the errors of
    /// [`DynamicTruss::state_derivative`] and
    /// [`AnalysisError::IntegrationFailed`] when the integrator gives up.
    pub fn solve(
        &self,
        duration: f64,
        initial_positions: Option<&[Vector<D>]>,
        initial_velocities: Option<&[Vector<D>]>,
        options: &OdeOptions,
    ) -> Result<Trajectory, AnalysisError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(AnalysisError::InvalidDuration(duration));
        }
        let truss = self.model.truss();
        let positions = initial_positions.unwrap_or(truss.points());
        self.check_state(positions)?;
        if let Some(velocities) = initial_velocities {
            self.check_state(velocities)?;
        }
        let bar_forces = self.bar_force_fn()?;
        self.check_masses()?;

        let n = truss.node_count() * D;
        let mut y0 = DVector::zeros(2 * n);
        y0.rows_mut(0, n).copy_from(&flatten_nodes(positions, truss.nodes()));
        if let Some(velocities) = initial_velocities {
            y0.rows_mut(n, n).copy_from(&flatten_nodes(velocities, truss.nodes()));
        }

        let rhs = |_t: f64, y: &DVector<f64>| {
            let points = truss.points_with_nodes(&y.rows(0, n).into_owned());
            let mut velocities = vec![Vector::<D>::zeros(); truss.point_count()];
            scatter_nodes(&mut velocities, truss.nodes(), &y.rows(n, n).into_owned());
            let accelerations = self.accelerations(&bar_forces, &points, &velocities);

            let mut derivative = DVector::zeros(2 * n);
            derivative.rows_mut(0, n).copy_from(&y.rows(n, n));
            derivative
                .rows_mut(n, n)
                .copy_from(&flatten_nodes(&accelerations, truss.nodes()));
            derivative
        };
        let solution = dormand_prince(rhs, (0.0, duration), y0, options);
        if !solution.success {
            return Err(AnalysisError::IntegrationFailed {
                time: solution.final_time,
                reason: solution.message,
            });
        }
        debug!(
            samples = solution.t.len(),
            accepted = solution.accepted_steps,
            rejected = solution.rejected_steps,
            "truss dynamics integrated"
        );

        let samples = solution.t.len();
        let mut positions = Array3::zeros((samples, truss.point_count(), D));
        let mut velocities = Array3::zeros((samples, truss.point_count(), D));
        for (sample, state) in solution.y.iter().enumerate() {
            let points = truss.points_with_nodes(&state.rows(0, n).into_owned());
            for (point, position) in points.iter().enumerate() {
                for axis in 0..D {
                    positions[[sample, point, axis]] = position[axis];
                }
            }
            for (slot, &node) in truss.nodes().iter().enumerate() {
                for axis in 0..D {
                    velocities[[sample, node, axis]] = state[n + slot * D + axis];
                }
            }
        }

        Ok(Trajectory {
            times: solution.t,
            positions,
            velocities,
            evaluations: solution.evaluations,
            accepted_steps: solution.accepted_steps,
            rejected_steps: solution.rejected_steps,
        })
    }

    /// Acceleration of every point, zero at supports.
    fn accelerations(
        &self,
        bar_forces: &BarForceFn<'_, D>,
        points: &[Vector<D>],
        velocities: &[Vector<D>],
    ) -> Vec<Vector<D>> {
        let truss = self.model.truss();
        let forces = truss.net_forces_at(points, &bar_forces(points));
        let mut accelerations = vec![Vector::<D>::zeros(); truss.point_count()];
        for &node in truss.nodes() {
            accelerations[node] =
                (forces[node] - velocities[node] * self.damping[node]) / truss.masses()[node];
        }
        accelerations
    }

    /// Bar force function of the model's law.
    fn bar_force_fn(&self) -> Result<BarForceFn<'_, D>, AnalysisError> {
        let truss = self.model.truss();
        match self.model.law() {
            ForceLaw::Rigid => Err(self.model.unsupported("dynamics")),
            ForceLaw::Elastic(bars) => Ok(Box::new(move |points: &[Vector<D>]| {
                bars.bar_forces_at(truss, points)
            })),
            ForceLaw::Linearized(linearization) => {
                Ok(Box::new(move |points: &[Vector<D>]| {
                    linearization.bar_forces_at(truss, points)
                }))
            }
        }
    }

    /// Reject nodes without mass.
    fn check_masses(&self) -> Result<(), AnalysisError> {
        let truss = self.model.truss();
        match truss.nodes().iter().find(|&&node| truss.masses()[node] <= 0.0) {
            Some(&node) => Err(AnalysisError::MasslessNode(node)),
            None => Ok(()),
        }
    }

    /// Reject per-point arrays of the wrong length.
    fn check_state(&self, values: &[Vector<D>]) -> Result<(), AnalysisError> {
        let expected = self.model.truss().point_count();
        if values.len() == expected {
            Ok(())
        } else {
            Err(AnalysisError::InvalidInitialState {
                expected,
                actual: values.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::geometry::point2;
    use crate::truss::Truss;

    fn pendulum(mass: f64) -> Truss<2> {
        Truss::builder(vec![point2(0.0, 1.0), point2(0.0, 0.0)])
            .supports([0])
            .bars([[0, 1]])
            .masses([0.0, mass])
            .build()
            .expect("valid truss")
    }

    #[test]
    fn rigid_models_cannot_move() {
        let dynamics = DynamicTruss::new(TrussModel::rigid(pendulum(1.0)));
        let result = dynamics.solve(1.0, None, None, &OdeOptions::default());
        assert_eq!(
            result,
            Err(AnalysisError::Unsupported {
                operation: "dynamics",
                law: "rigid"
            })
        );
    }

    #[test]
    fn massless_nodes_are_rejected() {
        let model = TrussModel::elastic(pendulum(0.0), 1e4).expect("valid stiffness");
        let dynamics = DynamicTruss::new(model);
        assert_eq!(
            dynamics.solve(1.0, None, None, &OdeOptions::default()),
            Err(AnalysisError::MasslessNode(1))
        );
    }

    #[test]
    fn damping_is_validated_and_broadcast() {
        let model = TrussModel::elastic(pendulum(1.0), 1e4).expect("valid stiffness");
        let dynamics = DynamicTruss::new(model.clone())
            .with_uniform_damping(0.5)
            .expect("valid damping");
        assert_eq!(dynamics.damping(), &[0.5, 0.5]);
        assert_eq!(
            DynamicTruss::new(model.clone()).with_damping([0.0, -1.0]).err(),
            Some(TrussEditError::InvalidDamping {
                point: 1,
                damping: -1.0
            })
        );
        assert!(DynamicTruss::new(model).with_damping([1.0]).is_err());
    }

    #[test]
    fn state_derivative_includes_damping_and_gravity() {
        let model = TrussModel::elastic(pendulum(2.0), 1e4).expect("valid stiffness");
        let dynamics = DynamicTruss::new(model)
            .with_uniform_damping(4.0)
            .expect("valid damping");
        let points = dynamics.model().truss().points().to_vec();
        let velocities = vec![point2(1.0, 1.0), point2(1.0, 0.0)];
        let (v, a) = dynamics
            .state_derivative(&points, &velocities)
            .expect("elastic model");
        assert_eq!(v[0], point2(0.0, 0.0));
        assert_eq!(v[1], point2(1.0, 0.0));
        assert_eq!(a[0], point2(0.0, 0.0));
        assert_relative_eq!(a[1].x, -2.0, epsilon = 1e-12);
        assert_relative_eq!(a[1].y, -9.81, epsilon = 1e-12);
    }

    #[test]
    fn duration_must_be_finite_and_non_negative() {
        let model = TrussModel::elastic(pendulum(1.0), 1e4).expect("valid stiffness");
        let dynamics = DynamicTruss::new(model);
        for duration in [-1.0, f64::INFINITY] {
            assert_eq!(
                dynamics.solve(duration, None, None, &OdeOptions::default()),
                Err(AnalysisError::InvalidDuration(duration))
            );
        }
        assert!(matches!(
            dynamics.solve(f64::NAN, None, None, &OdeOptions::default()),
            Err(AnalysisError::InvalidDuration(_))
        ));
        let still = dynamics
            .solve(0.0, None, None, &OdeOptions::default())
            .expect("an empty span is valid");
        assert_eq!(still.positions[[0, 1, 1]], 0.0);
    }

    #[test]
    fn wrong_initial_state_is_rejected() {
        let model = TrussModel::elastic(pendulum(1.0), 1e4).expect("valid stiffness");
        let dynamics = DynamicTruss::new(model);
        let result = dynamics.solve(1.0, Some(&[point2(0.0, 0.0)]), None, &OdeOptions::default());
        assert_eq!(
            result,
            Err(AnalysisError::InvalidInitialState {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn damped_mass_settles_at_the_static_sag() {
        let model = TrussModel::elastic(pendulum(1.0), 1e3).expect("valid stiffness");
        let dynamics = DynamicTruss::new(model)
            .with_uniform_damping(20.0)
            .expect("valid damping");
        let trajectory = dynamics
            .solve(
                5.0,
                None,
                None,
                &OdeOptions::default().with_tolerances(1e-8, 1e-10),
            )
            .expect("integration succeeds");
        let last = trajectory.len() - 1;
        assert_relative_eq!(trajectory.times[last], 5.0, epsilon = 1e-12);
        // Static sag: S * d / L0 = m g.
        assert_relative_eq!(trajectory.positions[[last, 1, 1]], -9.81e-3, epsilon = 1e-6);
        assert_relative_eq!(trajectory.velocities[[last, 1, 1]], 0.0, epsilon = 1e-5);
        assert_eq!(trajectory.positions[[last, 0, 1]], 1.0);
    }
}
