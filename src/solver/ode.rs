//! Adaptive explicit Runge-Kutta integration.
//!
//! The Dormand-Prince 5(4) pair advances with the fifth order solution and
//! controls the step size with the embedded fourth order error estimate.
//! Output at requested times is interpolated with cubic Hermite polynomials
//! built from the end-point states and derivatives of each accepted step.

use nalgebra::DVector;
use tracing::{debug, warn};

use crate::config::OdeOptions;

/// Node coefficients of the Dormand-Prince tableau.
const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

/// Stage coefficients of the Dormand-Prince tableau (lower triangle).
const A: [[f64; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];

/// Difference between the fifth and fourth order weights.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339_200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Safety factor applied to the optimal step size.
const SAFETY: f64 = 0.9;
/// Smallest step size reduction per attempt.
const MIN_FACTOR: f64 = 0.2;
/// Largest step size increase per accepted step.
const MAX_FACTOR: f64 = 10.0;

/// Sampled solution of an initial value problem.
#[derive(Debug, Clone, PartialEq)]
pub struct OdeSolution {
    /// Output times.
    pub t: Vec<f64>,
    /// States at the output times.
    pub y: Vec<DVector<f64>>,
    /// Whether the end of the time span was reached.
    pub success: bool,
    /// Human-readable reason for termination.
    pub message: String,
    /// Time reached when the integration stopped.
    pub final_time: f64,
    /// Number of right-hand side evaluations.
    pub evaluations: usize,
    /// Number of accepted steps.
    pub accepted_steps: usize,
    /// Number of rejected steps.
    pub rejected_steps: usize,
}

/// Integrate `dy/dt = rhs(t, y)` from `t_span.0` to `t_span.1`.
///
/// When `options.t_eval` is set, the solution is reported at those times
/// (values outside the span are ignored); otherwise at the start time and
/// after every accepted step.
///
/// # Examples
/// ```
/// use nalgebra::DVector;
/// use stabwerk::solver::ode::dormand_prince;
/// use stabwerk::OdeOptions;
///
/// // Exponential decay y' = -y.
/// let solution = dormand_prince(
///     |_, y: &DVector<f64>| -y,
///     (0.0, 1.0),
///     DVector::from_vec(vec![1.0]),
///     &OdeOptions::default().with_tolerances(1e-8, 1e-10),
/// );
/// assert!(solution.success);
/// let last = solution.y.last().expect("at least one sample");
/// assert!((last[0] - (-1.0_f64).exp()).abs() < 1e-7);
/// ```
pub fn dormand_prince<F>(
    mut rhs: F,
    t_span: (f64, f64),
    y0: DVector<f64>,
    options: &OdeOptions,
) -> OdeSolution
where
    F: FnMut(f64, &DVector<f64>) -> DVector<f64>,
{
    let (t0, t_end) = t_span;
    let mut samples = Samples::new(t0, t_end, options.t_eval.as_deref());

    let mut t = t0;
    let mut y = y0;
    let mut f = rhs(t, &y);
    let mut evaluations = 1;
    let mut accepted_steps = 0;
    let mut rejected_steps = 0;

    samples.record_start(t, &y);

    let finish = |samples: Samples,
                  success: bool,
                  message: String,
                  final_time: f64,
                  evaluations: usize,
                  accepted_steps: usize,
                  rejected_steps: usize| {
        let (t, y) = samples.into_parts();
        OdeSolution {
            t,
            y,
            success,
            message,
            final_time,
            evaluations,
            accepted_steps,
            rejected_steps,
        }
    };

    if t_end <= t0 {
        return finish(samples, true, "empty time span".to_owned(), t, evaluations, 0, 0);
    }

    let mut h = match options.first_step {
        Some(step) => step,
        None => {
            evaluations += 1;
            initial_step(&mut rhs, t, &y, &f, options)
        }
    }
    .min(options.max_step)
    .min(t_end - t0);
    let mut previous_rejected = false;

    for _ in 0..options.max_steps {
        if h < options.min_step {
            warn!(time = t, step = h, "step size below minimum");
            return finish(
                samples,
                false,
                format!("step size {h:.3e} s fell below the minimum {:.3e} s", options.min_step),
                t,
                evaluations,
                accepted_steps,
                rejected_steps,
            );
        }

        let last_step = t + h >= t_end;
        let step = if last_step { t_end - t } else { h };
        let (y_new, f_new, error) = attempt(&mut rhs, t, &y, &f, step, options);
        evaluations += 6;

        if error.is_finite() && error <= 1.0 {
            let t_new = if last_step { t_end } else { t + step };
            samples.record_step(t, &y, &f, t_new, &y_new, &f_new);
            t = t_new;
            y = y_new;
            f = f_new;
            accepted_steps += 1;

            if last_step {
                debug!(accepted_steps, rejected_steps, evaluations, "integration finished");
                return finish(
                    samples,
                    true,
                    "reached the end of the time span".to_owned(),
                    t,
                    evaluations,
                    accepted_steps,
                    rejected_steps,
                );
            }

            let mut factor = if error == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * error.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };
            if previous_rejected {
                factor = factor.min(1.0);
            }
            h = (step * factor).min(options.max_step);
            previous_rejected = false;
        } else {
            let factor = if error.is_finite() {
                (SAFETY * error.powf(-0.2)).clamp(MIN_FACTOR, 1.0)
            } else {
                MIN_FACTOR
            };
            h = step * factor;
            rejected_steps += 1;
            previous_rejected = true;
        }
    }

    finish(
        samples,
        false,
        format!("maximum number of {} steps reached", options.max_steps),
        t,
        evaluations,
        accepted_steps,
        rejected_steps,
    )
}

/// Take one Dormand-Prince step and return the new state, its derivative
/// and the scaled root-mean-square error estimate.
fn attempt<F>(
    rhs: &mut F,
    t: f64,
    y: &DVector<f64>,
    f: &DVector<f64>,
    h: f64,
    options: &OdeOptions,
) -> (DVector<f64>, DVector<f64>, f64)
where
    F: FnMut(f64, &DVector<f64>) -> DVector<f64>,
{
    let mut k: Vec<DVector<f64>> = Vec::with_capacity(7);
    k.push(f.clone());
    let mut state = y.clone();
    for stage in 1..7 {
        state.copy_from(y);
        for (j, kj) in k.iter().enumerate() {
            if A[stage][j] != 0.0 {
                state.axpy(h * A[stage][j], kj, 1.0);
            }
        }
        k.push(rhs(t + C[stage] * h, &state));
    }

    // The last stage is the fifth order solution and k[6] its derivative.
    let mut error = DVector::zeros(y.len());
    for (j, kj) in k.iter().enumerate() {
        if E[j] != 0.0 {
            error.axpy(h * E[j], kj, 1.0);
        }
    }
    let norm = scaled_rms(&error, y, &state, options);
    let f_new = k[6].clone();
    (state, f_new, norm)
}

/// Root-mean-square of `error` scaled by the mixed tolerance.
fn scaled_rms(error: &DVector<f64>, y: &DVector<f64>, y_new: &DVector<f64>, options: &OdeOptions) -> f64 {
    if error.is_empty() {
        return 0.0;
    }
    let sum: f64 = error
        .iter()
        .zip(y.iter().zip(y_new.iter()))
        .map(|(e, (a, b))| {
            let scale = options.atol + options.rtol * a.abs().max(b.abs());
            (e / scale).powi(2)
        })
        .sum();
    (sum / error.len() as f64).sqrt()
}

/// Starting step size following Hairer, Nørsett and Wanner.
fn initial_step<F>(rhs: &mut F, t: f64, y: &DVector<f64>, f: &DVector<f64>, options: &OdeOptions) -> f64
where
    F: FnMut(f64, &DVector<f64>) -> DVector<f64>,
{
    let zeros = DVector::zeros(y.len());
    let d0 = scaled_rms(y, y, &zeros, options);
    let d1 = scaled_rms(f, y, &zeros, options);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
    let y1 = y + f * h0;
    let f1 = rhs(t + h0, &y1);
    let d2 = scaled_rms(&(f1 - f), y, &zeros, options) / h0;
    let h1 = if d1.max(d2) <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(0.2)
    };
    (100.0 * h0).min(h1)
}

/// Output collector for either dense sampling or step-by-step recording.
struct Samples {
    /// Requested output times not yet reached, in ascending order.
    pending: Option<std::collections::VecDeque<f64>>,
    /// Recorded times.
    t: Vec<f64>,
    /// Recorded states.
    y: Vec<DVector<f64>>,
}

impl Samples {
    /// Prepare the collector for the span `[t0, t_end]`.
    fn new(t0: f64, t_end: f64, t_eval: Option<&[f64]>) -> Self {
        let pending = t_eval.map(|times| {
            let mut inside: Vec<f64> = times
                .iter()
                .copied()
                .filter(|time| *time >= t0 && *time <= t_end)
                .collect();
            if inside.len() < times.len() {
                warn!(
                    ignored = times.len() - inside.len(),
                    "output times outside the integration span are ignored"
                );
            }
            inside.sort_by(f64::total_cmp);
            inside.into_iter().collect()
        });
        Self {
            pending,
            t: Vec::new(),
            y: Vec::new(),
        }
    }

    /// Record the initial state.
    fn record_start(&mut self, t0: f64, y0: &DVector<f64>) {
        match &mut self.pending {
            None => {
                self.t.push(t0);
                self.y.push(y0.clone());
            }
            Some(pending) => {
                while pending.front().is_some_and(|time| *time <= t0) {
                    pending.pop_front();
                    self.t.push(t0);
                    self.y.push(y0.clone());
                }
            }
        }
    }

    /// Record an accepted step from `(t, y)` to `(t_new, y_new)`.
    fn record_step(
        &mut self,
        t: f64,
        y: &DVector<f64>,
        f: &DVector<f64>,
        t_new: f64,
        y_new: &DVector<f64>,
        f_new: &DVector<f64>,
    ) {
        match &mut self.pending {
            None => {
                self.t.push(t_new);
                self.y.push(y_new.clone());
            }
            Some(pending) => {
                while let Some(&time) = pending.front() {
                    if time > t_new {
                        break;
                    }
                    pending.pop_front();
                    self.t.push(time);
                    self.y.push(hermite(t, y, f, t_new, y_new, f_new, time));
                }
            }
        }
    }

    /// Hand out the recorded samples.
    fn into_parts(self) -> (Vec<f64>, Vec<DVector<f64>>) {
        (self.t, self.y)
    }
}

/// Cubic Hermite interpolation between two states with known derivatives.
fn hermite(
    t0: f64,
    y0: &DVector<f64>,
    f0: &DVector<f64>,
    t1: f64,
    y1: &DVector<f64>,
    f1: &DVector<f64>,
    time: f64,
) -> DVector<f64> {
    let h = t1 - t0;
    if h == 0.0 {
        return y1.clone();
    }
    let s = (time - t0) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;
    y0 * h00 + f0 * (h10 * h) + y1 * h01 + f1 * (h11 * h)
}
