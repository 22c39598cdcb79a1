//! Force breakdowns and their textual summary.

use std::fmt;

use crate::geometry::Vector;
use crate::truss::Truss;

/// Every force acting on a truss, evaluated at one configuration.
///
/// Per-point arrays are indexed by point; reactions are zero at nodes and
/// residuals are zero at supports.
#[derive(Clone, Debug, PartialEq)]
pub struct ForceBreakdown<const D: usize> {
    /// Point indices joined by each bar.
    pub bars: Vec<[usize; 2]>,
    /// Sorted support indices.
    pub supports: Vec<usize>,
    /// Scalar bar forces in newtons, positive for tension.
    pub bar_forces: Vec<f64>,
    /// External loads in newtons.
    pub external: Vec<Vector<D>>,
    /// Weights in newtons.
    pub gravity: Vec<Vector<D>>,
    /// Resultant bar forces in newtons.
    pub from_bars: Vec<Vector<D>>,
    /// Support reactions in newtons.
    pub reactions: Vec<Vector<D>>,
    /// Net force on every node in newtons.
    pub residuals: Vec<Vector<D>>,
}

impl<const D: usize> ForceBreakdown<D> {
    /// Collect the forces of `truss` for the given bar forces.
    #[must_use]
    pub fn new(truss: &Truss<D>, bar_forces: Vec<f64>) -> Self {
        let net = truss.net_forces_excluding_supports(&bar_forces);
        let mut reactions = vec![Vector::<D>::zeros(); truss.point_count()];
        let mut residuals = net.clone();
        for &support in truss.supports() {
            reactions[support] = -net[support];
            residuals[support] = Vector::<D>::zeros();
        }
        Self {
            bars: truss.bars().to_vec(),
            supports: truss.supports().to_vec(),
            from_bars: truss.bar_forces_on_points(&bar_forces),
            bar_forces,
            external: truss.external_forces().to_vec(),
            gravity: truss.gravity_forces(),
            reactions,
            residuals,
        }
    }

    /// Largest net force on any node in newtons.
    #[must_use]
    pub fn largest_residual(&self) -> f64 {
        self.residuals
            .iter()
            .fold(0.0_f64, |max, force| max.max(force.norm()))
    }
}

/// Components of a vector as `(+1.000e0, -2.000e1)`.
struct Components<'a, const D: usize>(&'a Vector<D>);

impl<const D: usize> fmt::Display for Components<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (axis, value) in self.0.iter().enumerate() {
            if axis > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value:+.3e}")?;
        }
        f.write_str(")")
    }
}

impl<const D: usize> fmt::Display for ForceBreakdown<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Truss force summary ({} bars, {} points, {} supports)",
            self.bars.len(),
            self.external.len(),
            self.supports.len()
        )?;

        // Sign convention: tension positive.
        writeln!(f, "Bar forces:")?;
        for (bar, (&[start, end], &force)) in self.bars.iter().zip(&self.bar_forces).enumerate() {
            let state = if force > 0.0 {
                "tension"
            } else if force < 0.0 {
                "compression"
            } else {
                "unloaded"
            };
            writeln!(f, "  bar {bar} ({start}-{end}): {force:+.3e} N {state}")?;
        }

        writeln!(f, "Support reactions:")?;
        for &support in &self.supports {
            writeln!(
                f,
                "  point {support}: {} N",
                Components(&self.reactions[support])
            )?;
        }

        write!(f, "Largest node residual: {:.3e} N", self.largest_residual())
    }
}

/// Render a textual summary of a force breakdown.
///
/// Lists every bar force labelled as tension or compression, the support
/// reactions and the largest remaining node force.
#[must_use]
pub fn render_summary<const D: usize>(breakdown: &ForceBreakdown<D>) -> String {
    breakdown.to_string()
}
