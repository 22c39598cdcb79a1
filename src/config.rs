//! Configuration types for the equilibrium, root finding and time
//! integration routines.

use serde::{Deserialize, Serialize};

/// Tolerance policy deciding when a truss counts as being in equilibrium.
///
/// A truss is in equilibrium when the net force on every node is smaller
/// than `rtol * f_max + atol`, where `f_max` is the largest magnitude among
/// the bar forces, the external forces and the weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquilibriumTolerance {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance in newtons.
    pub atol: f64,
}

impl Default for EquilibriumTolerance {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-12,
        }
    }
}

impl EquilibriumTolerance {
    /// Set the relative tolerance.
    #[must_use]
    pub fn with_rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    /// Set the absolute tolerance.
    #[must_use]
    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    /// Largest admissible node force given the reference force magnitude.
    #[must_use]
    pub fn threshold(&self, max_force: f64) -> f64 {
        self.rtol * max_force + self.atol
    }
}

/// Options for the Newton root finder used by the nonlinear equilibrium
/// search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootOptions {
    /// Maximum number of Newton iterations before giving up.
    pub max_iterations: usize,
    /// Relative step size below which the iteration counts as converged.
    pub xtol: f64,
    /// Residual norm below which the iteration counts as converged.
    /// Zero disables the residual test.
    pub ftol: f64,
    /// Relative perturbation used for the finite difference Jacobian.
    pub fd_step: f64,
    /// Maximum number of step halvings in the backtracking line search.
    pub line_search_steps: usize,
}

impl Default for RootOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            xtol: 1.490_116_119_384_765_6e-8,
            ftol: 0.0,
            fd_step: 1.490_116_119_384_765_6e-8,
            line_search_steps: 8,
        }
    }
}

impl RootOptions {
    /// Set the iteration limit.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative step tolerance.
    #[must_use]
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    /// Set the residual tolerance.
    #[must_use]
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }
}

/// Options for the adaptive Runge-Kutta integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdeOptions {
    /// Relative tolerance of the local error estimate.
    pub rtol: f64,
    /// Absolute tolerance of the local error estimate.
    pub atol: f64,
    /// Initial step size in seconds, chosen automatically when `None`.
    pub first_step: Option<f64>,
    /// Largest admissible step size in seconds. Finite so the value
    /// survives a JSON round trip.
    pub max_step: f64,
    /// Step size in seconds below which the integration is aborted.
    pub min_step: f64,
    /// Maximum number of attempted steps.
    pub max_steps: usize,
    /// Times at which the solution is reported. When `None` every accepted
    /// step is reported.
    pub t_eval: Option<Vec<f64>>,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            first_step: None,
            max_step: f64::MAX,
            min_step: 1e-12,
            max_steps: 1_000_000,
            t_eval: None,
        }
    }
}

impl OdeOptions {
    /// Set the relative and absolute tolerances.
    #[must_use]
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }

    /// Set the largest admissible step size.
    #[must_use]
    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = max_step;
        self
    }

    /// Set the initial step size.
    #[must_use]
    pub fn with_first_step(mut self, first_step: f64) -> Self {
        self.first_step = Some(first_step);
        self
    }

    /// Report the solution at the given times.
    #[must_use]
    pub fn with_t_eval(mut self, t_eval: Vec<f64>) -> Self {
        self.t_eval = Some(t_eval);
        self
    }

    /// Report the solution at `0, dt, 2 dt, ...` up to and excluding
    /// `duration`.
    #[must_use]
    pub fn with_sampling(self, duration: f64, dt: f64) -> Self {
        let samples = (duration / dt).ceil() as usize;
        let times = (0..samples)
            .map(|i| i as f64 * dt)
            .filter(|t| *t < duration)
            .collect();
        self.with_t_eval(times)
    }
}

/// All solver settings in one place, loadable from JSON.
///
/// # Examples
/// ```
/// use stabwerk::SolverConfig;
///
/// let config = SolverConfig::from_json(r#"{ "root": { "max_iterations": 20 } }"#)
///     .expect("valid configuration");
/// assert_eq!(config.root.max_iterations, 20);
/// assert_eq!(config.tolerance.rtol, 1e-6);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Equilibrium tolerance policy.
    pub tolerance: EquilibriumTolerance,
    /// Nonlinear root finder settings.
    pub root: RootOptions,
    /// Time integration settings.
    pub ode: OdeOptions,
}

impl SolverConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] produced by malformed input.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialise the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] produced by the serialiser.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
