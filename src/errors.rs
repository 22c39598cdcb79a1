//! Error types produced while building or analysing trusses.

use thiserror::Error;

use crate::solver::root::RootReport;

/// Error returned when a truss analysis fails.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// Returned when the rigid system matrix is not square, i.e. the number of
    /// node force components differs from the number of bars.
    #[error(
        "rigid system has {equations} node force components but {unknowns} bar forces; \
         the truss is statically indeterminate or under-constrained"
    )]
    NonSquareSystem {
        /// Number of node force components (rows).
        equations: usize,
        /// Number of bars (columns).
        unknowns: usize,
    },
    /// Returned when the rigid system matrix cannot be inverted.
    #[error("rigid system matrix is singular; check supports and connectivity")]
    SingularSystem,
    /// Returned when the tangent stiffness matrix cannot be inverted.
    #[error("tangent stiffness matrix is singular; the truss is a mechanism at this configuration")]
    SingularStiffness,
    /// Returned when the nonlinear equilibrium search does not converge.
    #[error("equilibrium search failed after {} iterations: {}", .0.iterations, .0.message)]
    NotConverged(RootReport),
    /// Returned when eigenmodes are requested away from static equilibrium.
    #[error(
        "eigenmodes require static equilibrium; largest node force {residual:.3e} N \
         exceeds tolerance {threshold:.3e} N"
    )]
    NotInEquilibrium {
        /// Largest net force on a node in newtons.
        residual: f64,
        /// Equilibrium threshold in newtons.
        threshold: f64,
    },
    /// Returned when a node without mass takes part in a modal or dynamic analysis.
    #[error("node {0} has no mass")]
    MasslessNode(usize),
    /// Returned when an operation is not defined for the selected force law.
    #[error("{operation} is not available for a {law} truss")]
    Unsupported {
        /// Name of the requested operation.
        operation: &'static str,
        /// Name of the force law.
        law: &'static str,
    },
    /// Returned when the time integration cannot continue.
    #[error("time integration failed at t = {time:.6e} s: {reason}")]
    IntegrationFailed {
        /// Time reached before the failure in seconds.
        time: f64,
        /// Diagnostic message of the integrator.
        reason: String,
    },
    /// Returned when a simulation is asked to run for a negative or
    /// non-finite duration.
    #[error("simulation duration must be finite and non-negative, got {0} s")]
    InvalidDuration(f64),
    /// Returned when initial positions or velocities do not match the truss.
    #[error("initial state has {actual} points but the truss has {expected}")]
    InvalidInitialState {
        /// Number of points in the truss.
        expected: usize,
        /// Number of points supplied.
        actual: usize,
    },
}

/// Error returned when building or editing a [`Truss`](crate::Truss) with
/// invalid data.
///
/// Attempting to reference a point that is not part of the truss, or
/// supplying per-point data of the wrong length, returns a descriptive variant
/// so callers can decide how to recover.
///
/// # Examples
///
/// ```
/// use stabwerk::{point2, Truss, TrussEditError};
///
/// let error = Truss::builder(vec![point2(0.0, 0.0), point2(1.0, 0.0)])
///     .bars([[0, 7]])
///     .build()
///     .expect_err("unknown point is rejected");
/// assert_eq!(error, TrussEditError::UnknownPoint(7));
/// ```
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TrussEditError {
    /// Returned when a point cannot be found in the truss.
    #[error("point {0} does not exist in this truss")]
    UnknownPoint(usize),
    /// Returned when a bar connects a point with itself.
    #[error("bar {bar} connects point {point} with itself")]
    DegenerateBar {
        /// Index of the offending bar.
        bar: usize,
        /// Index of the repeated point.
        point: usize,
    },
    /// Returned when a bar spans zero distance.
    #[error("bar {0} has zero length")]
    ZeroLengthBar(usize),
    /// Returned when a point is listed as support more than once.
    #[error("point {0} is listed as support more than once")]
    DuplicateSupport(usize),
    /// Returned when a per-point or per-bar array has the wrong length.
    #[error("{quantity} has {actual} entries but {expected} are required")]
    LengthMismatch {
        /// Name of the offending quantity.
        quantity: &'static str,
        /// Required number of entries.
        expected: usize,
        /// Supplied number of entries.
        actual: usize,
    },
    /// Returned when a point mass is negative or not finite.
    #[error("point {point} has invalid mass {mass}")]
    InvalidMass {
        /// Index of the affected point.
        point: usize,
        /// Rejected mass in kilograms.
        mass: f64,
    },
    /// Returned when a bar stiffness is zero, negative or not finite.
    #[error("bar {bar} has invalid stiffness {stiffness} (must be positive)")]
    InvalidStiffness {
        /// Index of the affected bar.
        bar: usize,
        /// Rejected stiffness in newtons.
        stiffness: f64,
    },
    /// Returned when a rest length is zero, negative or not finite.
    #[error("bar {bar} has invalid rest length {length} (must be positive)")]
    InvalidRestLength {
        /// Index of the affected bar.
        bar: usize,
        /// Rejected rest length in metres.
        length: f64,
    },
    /// Returned when a damping coefficient is negative or not finite.
    #[error("point {point} has invalid damping coefficient {damping}")]
    InvalidDamping {
        /// Index of the affected point.
        point: usize,
        /// Rejected damping coefficient in kilograms per second.
        damping: f64,
    },
}
