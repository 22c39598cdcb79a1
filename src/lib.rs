#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_doc_code_examples)]
#![warn(clippy::missing_docs_in_private_items)]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod dynamics;
pub mod elastic;
pub mod errors;
pub mod geometry;
pub mod law;
pub mod linearized;
pub mod modal;
pub mod report;
pub mod rigid;
pub mod solver;
pub mod truss;

pub use config::{EquilibriumTolerance, OdeOptions, RootOptions, SolverConfig};
pub use dynamics::{DynamicTruss, Trajectory};
pub use elastic::{ElasticBars, DEFAULT_STIFFNESS};
pub use errors::{AnalysisError, TrussEditError};
pub use geometry::{point2, point3, Vector, STANDARD_GRAVITY};
pub use law::{ForceLaw, TrussModel};
pub use linearized::Linearization;
pub use modal::Eigenmodes;
pub use report::{render_summary, ForceBreakdown};
pub use solver::root::RootReport;
pub use truss::{Truss, Truss2, Truss3, TrussBuilder};
