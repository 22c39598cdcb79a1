//! Damped Newton method for systems of nonlinear equations.
//!
//! The iteration solves `J(x) dx = -f(x)` with an LU factorisation and
//! halves the step until the residual norm decreases. The Jacobian is either
//! supplied by the caller or approximated with forward differences.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::config::RootOptions;

/// Outcome of a root search.
#[derive(Debug, Clone, PartialEq)]
pub struct RootReport {
    /// Whether the iteration converged.
    pub success: bool,
    /// Human-readable reason for termination.
    pub message: String,
    /// Number of Newton iterations performed.
    pub iterations: usize,
    /// Number of function evaluations, including those for the Jacobian.
    pub evaluations: usize,
    /// Euclidean norm of the residual at `x`.
    pub residual_norm: f64,
    /// Final iterate. Only meaningful when `success` is true.
    pub x: DVector<f64>,
}

/// Find a root of `f` starting at `x0` using a forward difference Jacobian.
///
/// # Examples
/// ```
/// use nalgebra::DVector;
/// use stabwerk::solver::root::newton;
/// use stabwerk::RootOptions;
///
/// let report = newton(
///     |x: &DVector<f64>| DVector::from_vec(vec![x[0] * x[0] - 2.0]),
///     DVector::from_vec(vec![1.0]),
///     &RootOptions::default(),
/// );
/// assert!(report.success);
/// assert!((report.x[0] - 2.0_f64.sqrt()).abs() < 1e-10);
/// ```
pub fn newton<F>(mut f: F, x0: DVector<f64>, options: &RootOptions) -> RootReport
where
    F: FnMut(&DVector<f64>) -> DVector<f64>,
{
    let fd_step = options.fd_step;
    iterate(
        &mut f,
        |f, x, fx| (forward_difference(f, x, fx, fd_step), x.len()),
        x0,
        options,
    )
}

/// Find a root of `f` starting at `x0` with an explicit Jacobian.
///
/// `jacobian` receives the current iterate and the residual there. The
/// iteration stops when the residual norm drops to `options.ftol`, when a
/// full Newton step is smaller than `xtol * (|x| + xtol)`, or after
/// `options.max_iterations` iterations, whichever comes first.
pub fn newton_with_jacobian<F, J>(
    mut f: F,
    mut jacobian: J,
    x0: DVector<f64>,
    options: &RootOptions,
) -> RootReport
where
    F: FnMut(&DVector<f64>) -> DVector<f64>,
    J: FnMut(&DVector<f64>, &DVector<f64>) -> DMatrix<f64>,
{
    iterate(&mut f, |_, x, fx| (jacobian(x, fx), 0), x0, options)
}

/// Newton iteration shared by both entry points.
///
/// `jacobian` returns the matrix and the number of extra function
/// evaluations spent on it.
fn iterate<F, J>(f: &mut F, mut jacobian: J, x0: DVector<f64>, options: &RootOptions) -> RootReport
where
    F: FnMut(&DVector<f64>) -> DVector<f64>,
    J: FnMut(&mut F, &DVector<f64>, &DVector<f64>) -> (DMatrix<f64>, usize),
{
    let mut x = x0;
    let mut fx = f(&x);
    let mut evaluations = 1;
    let mut norm = fx.norm();

    let finish = |success: bool, message: &str, iterations, evaluations, norm, x| RootReport {
        success,
        message: message.to_owned(),
        iterations,
        evaluations,
        residual_norm: norm,
        x,
    };

    for iteration in 0..options.max_iterations {
        if !norm.is_finite() {
            return finish(false, "residual is not finite", iteration, evaluations, norm, x);
        }
        if norm <= options.ftol {
            return finish(true, "residual is below tolerance", iteration, evaluations, norm, x);
        }

        let (matrix, jacobian_evaluations) = jacobian(f, &x, &fx);
        evaluations += jacobian_evaluations;
        let Some(step) = matrix.lu().solve(&(-&fx)) else {
            return finish(false, "Jacobian is singular", iteration, evaluations, norm, x);
        };

        let step_norm = step.norm();
        if step_norm <= options.xtol * (x.norm() + options.xtol) {
            x += step;
            fx = f(&x);
            evaluations += 1;
            norm = fx.norm();
            return finish(
                norm.is_finite(),
                "relative step is below tolerance",
                iteration + 1,
                evaluations,
                norm,
                x,
            );
        }

        let mut scale = 1.0;
        let mut accepted = None;
        for _ in 0..=options.line_search_steps {
            let candidate = &x + &step * scale;
            let f_candidate = f(&candidate);
            evaluations += 1;
            let candidate_norm = f_candidate.norm();
            if candidate_norm.is_finite() && candidate_norm < norm {
                accepted = Some((candidate, f_candidate, candidate_norm));
                break;
            }
            scale *= 0.5;
        }
        let Some((candidate, f_candidate, candidate_norm)) = accepted else {
            return finish(
                false,
                "line search could not reduce the residual",
                iteration + 1,
                evaluations,
                norm,
                x,
            );
        };

        debug!(
            iteration,
            residual = candidate_norm,
            step = step_norm * scale,
            "newton iteration"
        );
        x = candidate;
        fx = f_candidate;
        norm = candidate_norm;
    }

    if norm <= options.ftol {
        return finish(
            true,
            "residual is below tolerance",
            options.max_iterations,
            evaluations,
            norm,
            x,
        );
    }
    finish(
        false,
        "maximum number of iterations reached",
        options.max_iterations,
        evaluations,
        norm,
        x,
    )
}

/// Forward difference approximation of the Jacobian of `f` at `x`.
///
/// `fx` must hold `f(x)`. Each column perturbs one coordinate by
/// `relative_step * max(|x_i|, 1)`.
pub fn forward_difference<F>(
    f: &mut F,
    x: &DVector<f64>,
    fx: &DVector<f64>,
    relative_step: f64,
) -> DMatrix<f64>
where
    F: FnMut(&DVector<f64>) -> DVector<f64> + ?Sized,
{
    let mut matrix = DMatrix::zeros(fx.len(), x.len());
    let mut perturbed = x.clone();
    for column in 0..x.len() {
        let h = relative_step * x[column].abs().max(1.0);
        perturbed[column] = x[column] + h;
        let df = (f(&perturbed) - fx) / h;
        matrix.set_column(column, &df);
        perturbed[column] = x[column];
    }
    matrix
}
