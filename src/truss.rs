//! Core data structures for pin-jointed trusses: geometry, topology and the
//! bookkeeping of forces that does not depend on a constitutive law.

use nalgebra::DVector;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::config::{EquilibriumTolerance, SolverConfig};
use crate::errors::TrussEditError;
use crate::geometry::{default_gravity, distance, unit_vector_between, Vector};

/// Geometry, topology and loading of a pin-jointed truss.
///
/// Points are either supports, whose position is fixed externally, or
/// nodes, whose position follows from equilibrium. Bars connect two
/// distinct points and carry axial forces only. The topology (bars and
/// supports) is fixed once the truss is built; positions, loads and masses
/// may change afterwards.
///
/// The truss itself knows nothing about how bars respond to deformation.
/// Every query that needs bar forces takes them as an argument, so the
/// same geometry can be combined with any [`ForceLaw`](crate::ForceLaw).
#[derive(Clone, Debug)]
pub struct Truss<const D: usize> {
    /// Current position of every point in metres.
    points: Vec<Vector<D>>,
    /// Point indices joined by each bar.
    bars: Vec<[usize; 2]>,
    /// Incidence graph; the edge index of a bar equals its bar index.
    topology: UnGraph<(), ()>,
    /// Sorted indices of the support points.
    supports: Vec<usize>,
    /// Sorted indices of the node points.
    nodes: Vec<usize>,
    /// Mass of every point in kilograms.
    masses: Vec<f64>,
    /// External load on every point in newtons.
    external_forces: Vec<Vector<D>>,
    /// Gravitational acceleration in metres per second squared.
    gravity: Vector<D>,
    /// Policy deciding when the truss counts as being in equilibrium.
    tolerance: EquilibriumTolerance,
}

/// Planar truss.
pub type Truss2 = Truss<2>;
/// Spatial truss.
pub type Truss3 = Truss<3>;

/// Step-by-step construction of a [`Truss`].
///
/// # Examples
/// ```
/// use stabwerk::{point2, Truss};
///
/// let truss = Truss::builder(vec![point2(0.0, 0.0), point2(1.0, 0.0), point2(2.0, 0.0)])
///     .supports([0, 2])
///     .bars([[0, 1], [1, 2]])
///     .masses([0.0, 1.0, 0.0])
///     .build()
///     .expect("valid truss");
/// assert_eq!(truss.nodes(), &[1]);
/// assert_eq!(truss.bar_count(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct TrussBuilder<const D: usize> {
    /// Initial point positions.
    points: Vec<Vector<D>>,
    /// Support indices in the order supplied.
    supports: Vec<usize>,
    /// Bars in the order supplied.
    bars: Vec<[usize; 2]>,
    /// Point masses, zero when absent.
    masses: Option<Vec<f64>>,
    /// External forces, zero when absent.
    external_forces: Option<Vec<Vector<D>>>,
    /// Gravitational acceleration.
    gravity: Vector<D>,
    /// Equilibrium tolerance policy.
    tolerance: EquilibriumTolerance,
}

impl<const D: usize> TrussBuilder<D> {
    /// Declare which points are supports.
    #[must_use]
    pub fn supports(mut self, supports: impl IntoIterator<Item = usize>) -> Self {
        self.supports = supports.into_iter().collect();
        self
    }

    /// Declare the bars as pairs of point indices.
    #[must_use]
    pub fn bars(mut self, bars: impl IntoIterator<Item = [usize; 2]>) -> Self {
        self.bars = bars.into_iter().collect();
        self
    }

    /// Assign a mass in kilograms to every point.
    #[must_use]
    pub fn masses(mut self, masses: impl IntoIterator<Item = f64>) -> Self {
        self.masses = Some(masses.into_iter().collect());
        self
    }

    /// Assign an external force in newtons to every point.
    #[must_use]
    pub fn external_forces(mut self, forces: impl IntoIterator<Item = Vector<D>>) -> Self {
        self.external_forces = Some(forces.into_iter().collect());
        self
    }

    /// Override the gravitational acceleration.
    #[must_use]
    pub fn gravity(mut self, gravity: Vector<D>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Switch gravity off.
    #[must_use]
    pub fn without_gravity(self) -> Self {
        self.gravity(Vector::<D>::zeros())
    }

    /// Override the equilibrium tolerance policy.
    #[must_use]
    pub fn tolerance(mut self, tolerance: EquilibriumTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Take the equilibrium tolerance from a loaded [`SolverConfig`].
    #[must_use]
    pub fn config(self, config: &SolverConfig) -> Self {
        self.tolerance(config.tolerance)
    }

    /// Validate the input and create the truss.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError`] when an index is out of range, a support is
    /// listed twice, a bar is degenerate or has zero length, a mass is
    /// invalid, or a per-point array has the wrong length.
    pub fn build(self) -> Result<Truss<D>, TrussEditError> {
        let n_points = self.points.len();

        let mut supports = self.supports;
        if let Some(&unknown) = supports.iter().find(|&&point| point >= n_points) {
            return Err(TrussEditError::UnknownPoint(unknown));
        }
        supports.sort_unstable();
        if let Some(pair) = supports.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(TrussEditError::DuplicateSupport(pair[0]));
        }
        let nodes = (0..n_points)
            .filter(|point| supports.binary_search(point).is_err())
            .collect();

        let mut topology = UnGraph::with_capacity(n_points, self.bars.len());
        for _ in 0..n_points {
            topology.add_node(());
        }
        for (bar, &[start, end]) in self.bars.iter().enumerate() {
            for point in [start, end] {
                if point >= n_points {
                    return Err(TrussEditError::UnknownPoint(point));
                }
            }
            if start == end {
                return Err(TrussEditError::DegenerateBar { bar, point: start });
            }
            if distance(&self.points[start], &self.points[end]) == 0.0 {
                return Err(TrussEditError::ZeroLengthBar(bar));
            }
            topology.add_edge(NodeIndex::new(start), NodeIndex::new(end), ());
        }

        let masses = match self.masses {
            Some(masses) => {
                check_length("masses", n_points, masses.len())?;
                if let Some((point, &mass)) = masses
                    .iter()
                    .enumerate()
                    .find(|(_, mass)| !mass.is_finite() || **mass < 0.0)
                {
                    return Err(TrussEditError::InvalidMass { point, mass });
                }
                masses
            }
            None => vec![0.0; n_points],
        };

        let external_forces = match self.external_forces {
            Some(forces) => {
                check_length("external forces", n_points, forces.len())?;
                forces
            }
            None => vec![Vector::<D>::zeros(); n_points],
        };

        Ok(Truss {
            points: self.points,
            bars: self.bars,
            topology,
            supports,
            nodes,
            masses,
            external_forces,
            gravity: self.gravity,
            tolerance: self.tolerance,
        })
    }
}

/// Reject per-point or per-bar data whose length does not match.
pub(crate) fn check_length(
    quantity: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), TrussEditError> {
    if expected == actual {
        Ok(())
    } else {
        Err(TrussEditError::LengthMismatch {
            quantity,
            expected,
            actual,
        })
    }
}

impl<const D: usize> Truss<D> {
    /// Start building a truss from the initial point positions.
    #[must_use]
    pub fn builder(points: Vec<Vector<D>>) -> TrussBuilder<D> {
        TrussBuilder {
            points,
            supports: Vec::new(),
            bars: Vec::new(),
            masses: None,
            external_forces: None,
            gravity: default_gravity(),
            tolerance: EquilibriumTolerance::default(),
        }
    }

    /// Return the number of spatial dimensions.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        D
    }

    /// Return the number of points.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Return the number of bars.
    #[must_use]
    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    /// Return the number of support points.
    #[must_use]
    pub fn support_count(&self) -> usize {
        self.supports.len()
    }

    /// Return the number of node points.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Return the current point positions.
    #[must_use]
    pub fn points(&self) -> &[Vector<D>] {
        &self.points
    }

    /// Return the current position of a point.
    #[must_use]
    pub fn point(&self, point: usize) -> Option<&Vector<D>> {
        self.points.get(point)
    }

    /// Return the point pairs joined by the bars.
    #[must_use]
    pub fn bars(&self) -> &[[usize; 2]] {
        &self.bars
    }

    /// Return the point pair joined by a bar.
    #[must_use]
    pub fn bar(&self, bar: usize) -> Option<[usize; 2]> {
        self.bars.get(bar).copied()
    }

    /// Return the sorted support indices.
    #[must_use]
    pub fn supports(&self) -> &[usize] {
        &self.supports
    }

    /// Return the sorted node indices.
    #[must_use]
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    /// Check whether a point is a support.
    #[must_use]
    pub fn is_support(&self, point: usize) -> bool {
        self.supports.binary_search(&point).is_ok()
    }

    /// Return the point masses in kilograms.
    #[must_use]
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Return the external forces in newtons.
    #[must_use]
    pub fn external_forces(&self) -> &[Vector<D>] {
        &self.external_forces
    }

    /// Return the gravitational acceleration.
    #[must_use]
    pub fn gravity(&self) -> &Vector<D> {
        &self.gravity
    }

    /// Return the equilibrium tolerance policy.
    #[must_use]
    pub fn tolerance(&self) -> &EquilibriumTolerance {
        &self.tolerance
    }

    /// Return the indices of all bars attached to a point.
    #[must_use]
    pub fn bars_at(&self, point: usize) -> Vec<usize> {
        if point >= self.point_count() {
            return Vec::new();
        }
        let mut bars: Vec<usize> = self
            .topology
            .edges(NodeIndex::new(point))
            .map(|edge| edge.id().index())
            .collect();
        bars.sort_unstable();
        bars
    }

    /// Unit vector at `point` pointing along `bar` towards its other end.
    ///
    /// Returns the zero vector when the bar does not touch the point.
    ///
    /// # Examples
    /// ```
    /// use stabwerk::{point2, Truss};
    ///
    /// let truss = Truss::builder(vec![point2(0.0, 0.0), point2(0.0, 2.0), point2(1.0, 0.0)])
    ///     .bars([[0, 1]])
    ///     .build()
    ///     .expect("valid truss");
    /// assert_eq!(truss.unit_vector(1, 0), point2(0.0, -1.0));
    /// assert_eq!(truss.unit_vector(2, 0), point2(0.0, 0.0));
    /// ```
    #[must_use]
    pub fn unit_vector(&self, point: usize, bar: usize) -> Vector<D> {
        self.unit_vector_at(&self.points, point, bar)
    }

    /// [`Truss::unit_vector`] evaluated for arbitrary point positions.
    pub(crate) fn unit_vector_at(&self, points: &[Vector<D>], point: usize, bar: usize) -> Vector<D> {
        match self.bars.get(bar) {
            Some(&[start, end]) if point == start => unit_vector_between(&points[start], &points[end]),
            Some(&[start, end]) if point == end => unit_vector_between(&points[end], &points[start]),
            _ => Vector::<D>::zeros(),
        }
    }

    /// Current length of a bar in metres.
    #[must_use]
    pub fn bar_length(&self, bar: usize) -> Option<f64> {
        self.bars
            .get(bar)
            .map(|&[start, end]| distance(&self.points[start], &self.points[end]))
    }

    /// Current lengths of all bars in metres.
    #[must_use]
    pub fn bar_lengths(&self) -> Vec<f64> {
        self.bar_lengths_at(&self.points)
    }

    /// Bar lengths for arbitrary point positions.
    pub(crate) fn bar_lengths_at(&self, points: &[Vector<D>]) -> Vec<f64> {
        self.bars
            .iter()
            .map(|&[start, end]| distance(&points[start], &points[end]))
            .collect()
    }

    /// Weight of every point in newtons.
    #[must_use]
    pub fn gravity_forces(&self) -> Vec<Vector<D>> {
        self.masses.iter().map(|&mass| self.gravity * mass).collect()
    }

    /// Resultant force of the bars on every point.
    ///
    /// `bar_forces` holds one scalar per bar, positive for tension.
    #[must_use]
    pub fn bar_forces_on_points(&self, bar_forces: &[f64]) -> Vec<Vector<D>> {
        self.bar_forces_on_points_at(&self.points, bar_forces)
    }

    /// [`Truss::bar_forces_on_points`] evaluated for arbitrary point positions.
    pub(crate) fn bar_forces_on_points_at(
        &self,
        points: &[Vector<D>],
        bar_forces: &[f64],
    ) -> Vec<Vector<D>> {
        let mut forces = vec![Vector::<D>::zeros(); points.len()];
        for (bar, (&[start, end], &force)) in self.bars.iter().zip(bar_forces).enumerate() {
            forces[start] += self.unit_vector_at(points, start, bar) * force;
            forces[end] += self.unit_vector_at(points, end, bar) * force;
        }
        forces
    }

    /// Sum of external, gravitational and bar forces on every point.
    ///
    /// At nodes this is the residual that vanishes in equilibrium; at
    /// supports it is balanced by the support reaction.
    #[must_use]
    pub fn net_forces_excluding_supports(&self, bar_forces: &[f64]) -> Vec<Vector<D>> {
        self.net_forces_at(&self.points, bar_forces)
    }

    /// [`Truss::net_forces_excluding_supports`] for arbitrary point positions.
    pub(crate) fn net_forces_at(&self, points: &[Vector<D>], bar_forces: &[f64]) -> Vec<Vector<D>> {
        let mut forces = self.bar_forces_on_points_at(points, bar_forces);
        for ((force, external), mass) in forces
            .iter_mut()
            .zip(&self.external_forces)
            .zip(&self.masses)
        {
            *force += external + self.gravity * *mass;
        }
        forces
    }

    /// Reaction forces the supports exert, in support order.
    #[must_use]
    pub fn support_reactions(&self, bar_forces: &[f64]) -> Vec<Vector<D>> {
        let forces = self.net_forces_excluding_supports(bar_forces);
        self.supports.iter().map(|&point| -forces[point]).collect()
    }

    /// Net force on every point including the support reactions.
    ///
    /// The result is zero at supports by construction.
    #[must_use]
    pub fn total_forces(&self, bar_forces: &[f64]) -> Vec<Vector<D>> {
        let mut forces = self.net_forces_excluding_supports(bar_forces);
        for &point in &self.supports {
            forces[point] = Vector::<D>::zeros();
        }
        forces
    }

    /// Largest force magnitude among bars, external loads and weights.
    #[must_use]
    pub fn reference_force(&self, bar_forces: &[f64]) -> f64 {
        let bar = bar_forces.iter().fold(0.0_f64, |max, force| max.max(force.abs()));
        let external = self
            .external_forces
            .iter()
            .fold(0.0_f64, |max, force| max.max(force.norm()));
        let weight = self
            .masses
            .iter()
            .fold(0.0_f64, |max, mass| max.max((self.gravity * *mass).norm()));
        bar.max(external).max(weight)
    }

    /// Largest net force on any node in newtons.
    #[must_use]
    pub fn equilibrium_residual(&self, bar_forces: &[f64]) -> f64 {
        let forces = self.net_forces_excluding_supports(bar_forces);
        self.nodes
            .iter()
            .fold(0.0_f64, |max, &node| max.max(forces[node].norm()))
    }

    /// Check the equilibrium condition for the given bar forces.
    ///
    /// True when the net force on every node is below
    /// `rtol * reference_force + atol`.
    #[must_use]
    pub fn is_in_equilibrium_with(&self, bar_forces: &[f64]) -> bool {
        self.is_in_equilibrium_at(&self.points, bar_forces)
    }

    /// [`Truss::is_in_equilibrium_with`] for arbitrary point positions.
    pub(crate) fn is_in_equilibrium_at(&self, points: &[Vector<D>], bar_forces: &[f64]) -> bool {
        let threshold = self.tolerance.threshold(self.reference_force(bar_forces));
        let forces = self.net_forces_at(points, bar_forces);
        self.nodes
            .iter()
            .all(|&node| forces[node].norm() < threshold)
    }

    /// Update the position of a point.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::UnknownPoint`] when `point` is not part of this truss
    /// and [`TrussEditError::ZeroLengthBar`] when the move collapses a bar.
    pub fn move_point(&mut self, point: usize, position: Vector<D>) -> Result<(), TrussEditError> {
        if point >= self.point_count() {
            return Err(TrussEditError::UnknownPoint(point));
        }
        for bar in self.bars_at(point) {
            let [start, end] = self.bars[bar];
            let other = if start == point { end } else { start };
            if distance(&position, &self.points[other]) == 0.0 {
                return Err(TrussEditError::ZeroLengthBar(bar));
            }
        }
        self.points[point] = position;
        Ok(())
    }

    /// Replace all point positions.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::LengthMismatch`] when the number of points
    /// differs from the truss and [`TrussEditError::ZeroLengthBar`] when the
    /// new positions collapse a bar. The truss is unchanged on error.
    pub fn set_points(&mut self, points: Vec<Vector<D>>) -> Result<(), TrussEditError> {
        check_length("points", self.point_count(), points.len())?;
        if let Some(bar) = self
            .bars
            .iter()
            .position(|&[start, end]| distance(&points[start], &points[end]) == 0.0)
        {
            return Err(TrussEditError::ZeroLengthBar(bar));
        }
        self.points = points;
        Ok(())
    }

    /// Apply an external force to a point.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::UnknownPoint`] when `point` is not part of this truss.
    pub fn set_external_force(&mut self, point: usize, force: Vector<D>) -> Result<(), TrussEditError> {
        let slot = self
            .external_forces
            .get_mut(point)
            .ok_or(TrussEditError::UnknownPoint(point))?;
        *slot = force;
        Ok(())
    }

    /// Replace all external forces.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::LengthMismatch`] when the number of forces
    /// differs from the number of points.
    pub fn set_external_forces(&mut self, forces: Vec<Vector<D>>) -> Result<(), TrussEditError> {
        check_length("external forces", self.point_count(), forces.len())?;
        self.external_forces = forces;
        Ok(())
    }

    /// Remove all external forces.
    pub fn clear_external_forces(&mut self) {
        for force in &mut self.external_forces {
            *force = Vector::<D>::zeros();
        }
    }

    /// Assign a mass to a point.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::UnknownPoint`] when `point` is not part of this truss
    /// and [`TrussEditError::InvalidMass`] for negative or non-finite masses.
    pub fn set_mass(&mut self, point: usize, mass: f64) -> Result<(), TrussEditError> {
        if !mass.is_finite() || mass < 0.0 {
            return Err(TrussEditError::InvalidMass { point, mass });
        }
        let slot = self
            .masses
            .get_mut(point)
            .ok_or(TrussEditError::UnknownPoint(point))?;
        *slot = mass;
        Ok(())
    }

    /// Change the gravitational acceleration.
    pub fn set_gravity(&mut self, gravity: Vector<D>) {
        self.gravity = gravity;
    }

    /// Change the equilibrium tolerance policy.
    pub fn set_tolerance(&mut self, tolerance: EquilibriumTolerance) {
        self.tolerance = tolerance;
    }

    /// Node coordinates flattened into one vector (`node_count * D`).
    #[must_use]
    pub fn node_coordinates(&self) -> DVector<f64> {
        flatten_nodes(&self.points, &self.nodes)
    }

    /// Point positions with the nodes moved to the flattened `coordinates`.
    pub(crate) fn points_with_nodes(&self, coordinates: &DVector<f64>) -> Vec<Vector<D>> {
        let mut points = self.points.clone();
        scatter_nodes(&mut points, &self.nodes, coordinates);
        points
    }

    /// Move the nodes to the flattened `coordinates`.
    pub(crate) fn set_node_coordinates(&mut self, coordinates: &DVector<f64>) {
        scatter_nodes(&mut self.points, &self.nodes, coordinates);
    }
}

/// Gather the vectors at `nodes` into one flat vector.
pub(crate) fn flatten_nodes<const D: usize>(vectors: &[Vector<D>], nodes: &[usize]) -> DVector<f64> {
    DVector::from_iterator(
        nodes.len() * D,
        nodes.iter().flat_map(|&node| vectors[node].iter().copied()),
    )
}

/// Write a flat vector back into the vectors at `nodes`.
pub(crate) fn scatter_nodes<const D: usize>(
    vectors: &mut [Vector<D>],
    nodes: &[usize],
    flat: &DVector<f64>,
) {
    for (n, &node) in nodes.iter().enumerate() {
        for axis in 0..D {
            vectors[node][axis] = flat[n * D + axis];
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::geometry::point2;

    fn triangle() -> Truss<2> {
        Truss::builder(vec![point2(0.0, 0.0), point2(2.0, 0.0), point2(1.0, 1.0)])
            .supports([1, 0])
            .bars([[0, 2], [1, 2], [0, 1]])
            .masses([0.0, 0.0, 2.0])
            .external_forces([point2(0.0, 0.0), point2(0.0, 0.0), point2(5.0, 0.0)])
            .build()
            .expect("valid truss")
    }

    #[test]
    fn supports_and_nodes_partition_the_points() {
        let truss = triangle();
        assert_eq!(truss.supports(), &[0, 1]);
        assert_eq!(truss.nodes(), &[2]);
        assert!(truss.is_support(0));
        assert!(!truss.is_support(2));
        assert_eq!(truss.support_count() + truss.node_count(), truss.point_count());
    }

    #[test]
    fn invalid_topology_is_rejected() {
        let points = vec![point2(0.0, 0.0), point2(1.0, 0.0)];

        let error = Truss::builder(points.clone())
            .supports([5])
            .build()
            .expect_err("unknown support rejected");
        assert_eq!(error, TrussEditError::UnknownPoint(5));

        let error = Truss::builder(points.clone())
            .supports([1, 1])
            .build()
            .expect_err("duplicate support rejected");
        assert_eq!(error, TrussEditError::DuplicateSupport(1));

        let error = Truss::builder(points.clone())
            .bars([[0, 1], [1, 1]])
            .build()
            .expect_err("degenerate bar rejected");
        assert_eq!(error, TrussEditError::DegenerateBar { bar: 1, point: 1 });

        let error = Truss::builder(vec![point2(0.0, 0.0), point2(0.0, 0.0)])
            .bars([[0, 1]])
            .build()
            .expect_err("zero length rejected");
        assert_eq!(error, TrussEditError::ZeroLengthBar(0));

        let error = Truss::builder(points.clone())
            .masses([1.0])
            .build()
            .expect_err("short mass array rejected");
        assert_eq!(
            error,
            TrussEditError::LengthMismatch {
                quantity: "masses",
                expected: 2,
                actual: 1
            }
        );

        let error = Truss::builder(points)
            .masses([1.0, -1.0])
            .build()
            .expect_err("negative mass rejected");
        assert_eq!(error, TrussEditError::InvalidMass { point: 1, mass: -1.0 });
    }

    #[test]
    fn unit_vectors_point_away_from_the_queried_point() {
        let truss = triangle();
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let e = truss.unit_vector(2, 0);
        assert_relative_eq!(e.x, -s, epsilon = 1e-15);
        assert_relative_eq!(e.y, -s, epsilon = 1e-15);
        let e = truss.unit_vector(0, 0);
        assert_relative_eq!(e.x, s, epsilon = 1e-15);
        assert_relative_eq!(e.y, s, epsilon = 1e-15);
        assert_eq!(truss.unit_vector(2, 2), point2(0.0, 0.0));
        assert_eq!(truss.unit_vector(0, 99), point2(0.0, 0.0));
    }

    #[test]
    fn bar_lengths_follow_the_geometry() {
        let truss = triangle();
        let lengths = truss.bar_lengths();
        assert_relative_eq!(lengths[0], 2.0_f64.sqrt());
        assert_relative_eq!(lengths[1], 2.0_f64.sqrt());
        assert_relative_eq!(lengths[2], 2.0);
        assert_eq!(truss.bar_length(3), None);
        assert_eq!(truss.bars_at(2), vec![0, 1]);
        assert_eq!(truss.bars_at(0), vec![0, 2]);
    }

    #[test]
    fn tension_pulls_the_endpoints_together() {
        let truss = triangle();
        let forces = truss.bar_forces_on_points(&[0.0, 0.0, 10.0]);
        assert_eq!(forces[0], point2(10.0, 0.0));
        assert_eq!(forces[1], point2(-10.0, 0.0));
        assert_eq!(forces[2], point2(0.0, 0.0));
    }

    #[test]
    fn gravity_uses_point_masses() {
        let truss = triangle();
        let weights = truss.gravity_forces();
        assert_eq!(weights[2], point2(0.0, -19.62));
        assert_eq!(weights[0], point2(0.0, 0.0));
    }

    #[test]
    fn reactions_balance_the_applied_loads() {
        let truss = triangle();
        let bar_forces = [3.0, -4.0, 1.5];
        let reactions = truss.support_reactions(&bar_forces);
        let mut total = reactions.iter().sum::<Vector<2>>();
        total += truss.external_forces().iter().sum::<Vector<2>>();
        total += truss.gravity_forces().iter().sum::<Vector<2>>();
        // Node residual plus reactions plus loads must vanish: bar forces are internal.
        let residual = truss.net_forces_excluding_supports(&bar_forces)[2];
        assert_relative_eq!((total - residual).norm(), 0.0, epsilon = 1e-12);
        let totals = truss.total_forces(&bar_forces);
        assert_eq!(totals[0], point2(0.0, 0.0));
        assert_eq!(totals[2], residual);
    }

    #[test]
    fn equilibrium_check_uses_the_tolerance_policy() {
        let truss = Truss::builder(vec![point2(0.0, 0.0), point2(1.0, 0.0)])
            .supports([0])
            .bars([[0, 1]])
            .without_gravity()
            .external_forces([point2(0.0, 0.0), point2(100.0, 0.0)])
            .build()
            .expect("valid truss");
        assert!(truss.is_in_equilibrium_with(&[100.0]));
        assert!(truss.is_in_equilibrium_with(&[100.0 + 5e-5]));
        assert!(!truss.is_in_equilibrium_with(&[100.1]));
        assert_relative_eq!(truss.equilibrium_residual(&[90.0]), 10.0);
        assert_eq!(truss.reference_force(&[90.0]), 100.0);
    }

    #[test]
    fn editing_rejects_unknown_points() {
        let mut truss = triangle();
        assert_eq!(
            truss.move_point(9, point2(0.0, 0.0)),
            Err(TrussEditError::UnknownPoint(9))
        );
        assert_eq!(
            truss.move_point(2, point2(0.0, 0.0)),
            Err(TrussEditError::ZeroLengthBar(0))
        );
        assert_eq!(
            truss.set_external_force(9, point2(0.0, 0.0)),
            Err(TrussEditError::UnknownPoint(9))
        );
        assert_eq!(truss.set_mass(9, 1.0), Err(TrussEditError::UnknownPoint(9)));
        assert!(truss.set_points(vec![point2(0.0, 0.0)]).is_err());

        truss.move_point(2, point2(1.0, 2.0)).expect("move succeeds");
        assert_relative_eq!(truss.bar_length(0).expect("bar exists"), 5.0_f64.sqrt());
        truss.clear_external_forces();
        assert!(truss.external_forces().iter().all(|force| force.norm() == 0.0));
    }

    #[test]
    fn set_points_keeps_bars_apart() {
        let mut truss = triangle();
        let before = truss.points().to_vec();
        assert_eq!(
            truss.set_points(vec![point2(0.0, 0.0), point2(2.0, 0.0), point2(2.0, 0.0)]),
            Err(TrussEditError::ZeroLengthBar(1))
        );
        assert_eq!(truss.points(), before.as_slice());

        truss
            .set_points(vec![point2(0.0, 0.0), point2(2.0, 0.0), point2(1.0, 3.0)])
            .expect("bars keep their length");
        assert_eq!(truss.point(2), Some(&point2(1.0, 3.0)));
    }

    fn loaded_bar(config: &SolverConfig) -> Truss<2> {
        Truss::builder(vec![point2(0.0, 0.0), point2(1.0, 0.0)])
            .supports([0])
            .bars([[0, 1]])
            .without_gravity()
            .external_forces([point2(0.0, 0.0), point2(100.0, 0.0)])
            .config(config)
            .build()
            .expect("valid truss")
    }

    #[test]
    fn configured_tolerance_decides_equilibrium() {
        let config = SolverConfig::from_json(r#"{ "tolerance": { "rtol": 0.01, "atol": 0.0 } }"#)
            .expect("valid configuration");
        let loose = loaded_bar(&config);
        assert_eq!(loose.tolerance().rtol, 0.01);
        assert!(loose.is_in_equilibrium_with(&[100.5]));

        let strict = loaded_bar(&SolverConfig::default());
        assert!(!strict.is_in_equilibrium_with(&[100.5]));
    }

    #[test]
    fn equilibrium_can_be_checked_at_other_positions() {
        let truss = loaded_bar(&SolverConfig::default());
        let mut points = truss.points().to_vec();
        assert!(truss.is_in_equilibrium_at(&points, &[100.0]));
        points[1] = point2(0.0, 1.0);
        assert!(!truss.is_in_equilibrium_at(&points, &[100.0]));
        assert!(truss.is_in_equilibrium_with(&[100.0]));
    }

    #[test]
    fn node_coordinates_round_trip() {
        let mut truss = triangle();
        let coordinates = truss.node_coordinates();
        assert_eq!(coordinates.as_slice(), &[1.0, 1.0]);
        let moved = DVector::from_vec(vec![1.5, 0.5]);
        let points = truss.points_with_nodes(&moved);
        assert_eq!(points[2], point2(1.5, 0.5));
        assert_eq!(truss.point(2), Some(&point2(1.0, 1.0)));
        truss.set_node_coordinates(&moved);
        assert_eq!(truss.point(2), Some(&point2(1.5, 0.5)));
    }
}
