//! Force laws and the truss models built from them.
//!
//! A [`TrussModel`] pairs the geometry of a [`Truss`] with a [`ForceLaw`]
//! describing how its bars respond to deformation. All analyses dispatch on
//! the law, so rigid, elastic and linearized trusses share one interface.

use crate::config::RootOptions;
use crate::elastic::{self, ElasticBars};
use crate::errors::{AnalysisError, TrussEditError};
use crate::geometry::Vector;
use crate::linearized::Linearization;
use crate::modal::{self, Eigenmodes};
use crate::report::ForceBreakdown;
use crate::rigid;
use crate::solver::root::RootReport;
use crate::truss::{check_length, Truss};

/// How the bars of a truss respond to deformation.
#[derive(Clone, Debug, PartialEq)]
pub enum ForceLaw<const D: usize> {
    /// Inextensible bars; forces follow from statics alone.
    Rigid,
    /// Bars obeying Hooke's law.
    Elastic(ElasticBars),
    /// Elastic bars linearized around a reference configuration.
    Linearized(Linearization<D>),
}

impl<const D: usize> ForceLaw<D> {
    /// Short name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rigid => "rigid",
            Self::Elastic(_) => "elastic",
            Self::Linearized(_) => "linearized",
        }
    }

    /// Material data of elastic or linearized bars.
    #[must_use]
    pub fn elastic_bars(&self) -> Option<&ElasticBars> {
        match self {
            Self::Rigid => None,
            Self::Elastic(bars) => Some(bars),
            Self::Linearized(linearization) => Some(linearization.bars()),
        }
    }
}

/// A truss together with the force law of its bars.
///
/// # Examples
/// ```
/// use stabwerk::{point2, RootOptions, Truss, TrussModel};
///
/// let truss = Truss::builder(vec![point2(0.0, 0.0), point2(2.0, 0.0), point2(1.0, 1.0)])
///     .supports([0, 1])
///     .bars([[0, 2], [1, 2]])
///     .external_forces([point2(0.0, 0.0), point2(0.0, 0.0), point2(0.0, -100.0)])
///     .build()
///     .expect("valid truss");
///
/// let mut model = TrussModel::elastic(truss, 1e8).expect("valid stiffness");
/// model.find_equilibrium(&RootOptions::default()).expect("equilibrium");
/// let forces = model.bar_scalar_forces().expect("elastic forces");
/// assert!((forces[0] + 100.0 / 2.0_f64.sqrt()).abs() < 1e-3);
/// ```
#[derive(Clone, Debug)]
pub struct TrussModel<const D: usize> {
    /// Geometry, topology and loads.
    truss: Truss<D>,
    /// Constitutive law of the bars.
    law: ForceLaw<D>,
}

impl<const D: usize> TrussModel<D> {
    /// Combine a truss with an explicit force law.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::LengthMismatch`] when the material data of
    /// the law does not match the number of bars of the truss.
    pub fn new(truss: Truss<D>, law: ForceLaw<D>) -> Result<Self, TrussEditError> {
        if let Some(bars) = law.elastic_bars() {
            check_length("stiffness", truss.bar_count(), bars.stiffness().len())?;
        }
        if let ForceLaw::Linearized(linearization) = &law {
            check_length(
                "reference points",
                truss.point_count(),
                linearization.reference().len(),
            )?;
        }
        Ok(Self { truss, law })
    }

    /// Truss with inextensible bars.
    #[must_use]
    pub fn rigid(truss: Truss<D>) -> Self {
        Self {
            truss,
            law: ForceLaw::Rigid,
        }
    }

    /// Truss whose bars all share the stiffness `stiffness` in newtons.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::InvalidStiffness`] for a non-positive value.
    pub fn elastic(truss: Truss<D>, stiffness: f64) -> Result<Self, TrussEditError> {
        let bars = ElasticBars::uniform(&truss, stiffness)?;
        Ok(Self {
            truss,
            law: ForceLaw::Elastic(bars),
        })
    }

    /// Truss with elastic bars described by `bars`.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::LengthMismatch`] when `bars` does not match
    /// the truss.
    pub fn with_elastic_bars(truss: Truss<D>, bars: ElasticBars) -> Result<Self, TrussEditError> {
        Self::new(truss, ForceLaw::Elastic(bars))
    }

    /// Elastic truss linearized around its current geometry.
    ///
    /// # Errors
    ///
    /// Returns [`TrussEditError::InvalidStiffness`] for a non-positive value.
    pub fn linearized(truss: Truss<D>, stiffness: f64) -> Result<Self, TrussEditError> {
        let bars = ElasticBars::uniform(&truss, stiffness)?;
        let linearization = Linearization::new(&truss, bars);
        Ok(Self {
            truss,
            law: ForceLaw::Linearized(linearization),
        })
    }

    /// Linearized copy of this model around its current geometry.
    ///
    /// Elastic and linearized models keep their material data. The copy
    /// owns its own geometry, so later edits to either model do not affect
    /// the other.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Unsupported`] for a rigid model.
    pub fn linearize(&self) -> Result<Self, AnalysisError> {
        let bars = self
            .law
            .elastic_bars()
            .ok_or_else(|| self.unsupported("linearization"))?;
        Ok(Self {
            truss: self.truss.clone(),
            law: ForceLaw::Linearized(Linearization::new(&self.truss, bars.clone())),
        })
    }

    /// The geometry of the model.
    #[must_use]
    pub fn truss(&self) -> &Truss<D> {
        &self.truss
    }

    /// Mutable access to the geometry, e.g. to move supports or change loads.
    ///
    /// A linearized model keeps its reference configuration until
    /// [`TrussModel::relinearize`] is called.
    pub fn truss_mut(&mut self) -> &mut Truss<D> {
        &mut self.truss
    }

    /// The force law of the model.
    #[must_use]
    pub fn law(&self) -> &ForceLaw<D> {
        &self.law
    }

    /// Split the model into its geometry and force law.
    #[must_use]
    pub fn into_parts(self) -> (Truss<D>, ForceLaw<D>) {
        (self.truss, self.law)
    }

    /// Move the linearization point to the current geometry.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Unsupported`] unless the model is linearized.
    pub fn relinearize(&mut self) -> Result<(), AnalysisError> {
        match &mut self.law {
            ForceLaw::Linearized(linearization) => {
                linearization.relinearize(&self.truss);
                Ok(())
            }
            _ => Err(self.unsupported("relinearization")),
        }
    }

    /// Perform a single linear equilibrium step.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Unsupported`] unless the model is linearized
    /// and [`AnalysisError::SingularStiffness`] for a singular tangent.
    pub fn linear_step(&mut self) -> Result<(), AnalysisError> {
        match &mut self.law {
            ForceLaw::Linearized(linearization) => linearization.linear_step(&mut self.truss),
            _ => Err(self.unsupported("a linear step")),
        }
    }

    /// Scalar force of every bar, positive for tension.
    ///
    /// # Errors
    ///
    /// A rigid truss returns [`AnalysisError::NonSquareSystem`] or
    /// [`AnalysisError::SingularSystem`] when it is not statically
    /// determinate. Elastic and linearized trusses never fail.
    pub fn bar_scalar_forces(&self) -> Result<Vec<f64>, AnalysisError> {
        match &self.law {
            ForceLaw::Rigid => rigid::bar_forces(&self.truss),
            ForceLaw::Elastic(bars) => Ok(bars.bar_forces(&self.truss)),
            ForceLaw::Linearized(linearization) => Ok(linearization.bar_forces(&self.truss)),
        }
    }

    /// Bar forces for arbitrary point positions.
    pub(crate) fn bar_scalar_forces_at(&self, points: &[Vector<D>]) -> Result<Vec<f64>, AnalysisError> {
        match &self.law {
            ForceLaw::Rigid => Err(self.unsupported("bar forces at arbitrary positions")),
            ForceLaw::Elastic(bars) => Ok(bars.bar_forces_at(&self.truss, points)),
            ForceLaw::Linearized(linearization) => {
                Ok(linearization.bar_forces_at(&self.truss, points))
            }
        }
    }

    /// Resultant force of the bars on every point.
    ///
    /// # Errors
    ///
    /// See [`TrussModel::bar_scalar_forces`].
    pub fn bar_forces_on_points(&self) -> Result<Vec<Vector<D>>, AnalysisError> {
        Ok(self.truss.bar_forces_on_points(&self.bar_scalar_forces()?))
    }

    /// Sum of external, gravitational and bar forces on every point.
    ///
    /// # Errors
    ///
    /// See [`TrussModel::bar_scalar_forces`].
    pub fn net_forces_excluding_supports(&self) -> Result<Vec<Vector<D>>, AnalysisError> {
        Ok(self
            .truss
            .net_forces_excluding_supports(&self.bar_scalar_forces()?))
    }

    /// Reaction forces of the supports, in support order.
    ///
    /// # Errors
    ///
    /// See [`TrussModel::bar_scalar_forces`].
    pub fn support_reactions(&self) -> Result<Vec<Vector<D>>, AnalysisError> {
        Ok(self.truss.support_reactions(&self.bar_scalar_forces()?))
    }

    /// Net force on every point including the support reactions.
    ///
    /// # Errors
    ///
    /// See [`TrussModel::bar_scalar_forces`].
    pub fn total_forces(&self) -> Result<Vec<Vector<D>>, AnalysisError> {
        Ok(self.truss.total_forces(&self.bar_scalar_forces()?))
    }

    /// Whether every node is in static equilibrium.
    ///
    /// A rigid truss whose forces cannot be determined is not in equilibrium.
    #[must_use]
    pub fn is_in_equilibrium(&self) -> bool {
        self.bar_scalar_forces()
            .is_ok_and(|forces| self.truss.is_in_equilibrium_with(&forces))
    }

    /// Every force acting on the truss, collected for reporting.
    ///
    /// # Errors
    ///
    /// See [`TrussModel::bar_scalar_forces`].
    pub fn force_breakdown(&self) -> Result<ForceBreakdown<D>, AnalysisError> {
        Ok(ForceBreakdown::new(&self.truss, self.bar_scalar_forces()?))
    }

    /// Bring the truss into static equilibrium.
    ///
    /// Rigid trusses never move, so the call only checks that the bar forces
    /// are determinate. Elastic trusses run Newton's method, linearized ones
    /// repeated linear steps. In every case a failed search leaves the
    /// positions untouched.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`rigid::bar_forces`],
    /// [`ElasticBars::find_equilibrium`] and
    /// [`Linearization::find_equilibrium`].
    pub fn find_equilibrium(&mut self, options: &RootOptions) -> Result<RootReport, AnalysisError> {
        match &mut self.law {
            ForceLaw::Rigid => {
                let forces = rigid::bar_forces(&self.truss)?;
                Ok(elastic::already_balanced(&self.truss, &forces))
            }
            ForceLaw::Elastic(bars) => bars.find_equilibrium(&mut self.truss, options),
            ForceLaw::Linearized(linearization) => {
                linearization.find_equilibrium(&mut self.truss, options)
            }
        }
    }

    /// Natural frequencies and mode shapes around the current equilibrium.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Unsupported`] for a rigid truss,
    /// [`AnalysisError::NotInEquilibrium`] away from equilibrium and
    /// [`AnalysisError::MasslessNode`] when a node has no mass.
    pub fn eigenmodes(&self) -> Result<Eigenmodes, AnalysisError> {
        let bars = self
            .law
            .elastic_bars()
            .ok_or_else(|| self.unsupported("eigenmode analysis"))?;
        let forces = self.bar_scalar_forces()?;
        modal::eigenmodes(&self.truss, &bars.tangent_stiffness(&self.truss), &forces)
    }

    /// Error for an operation the current law does not provide.
    pub(crate) fn unsupported(&self, operation: &'static str) -> AnalysisError {
        AnalysisError::Unsupported {
            operation,
            law: self.law.name(),
        }
    }
}
