//! Generic numerical routines the truss analyses delegate to.
//!
//! Neither routine knows about trusses: the root finder works on a vector
//! function and the integrator on a first order system `y' = f(t, y)`.

pub mod ode;
pub mod root;
