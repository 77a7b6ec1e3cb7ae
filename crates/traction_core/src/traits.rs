use crate::error::Result;

/// A second-order system split into positions `q` and velocities `v`.
///
/// Velocities are integrated from accelerations; positions from
/// `position_rates`, which may rotate or otherwise map the velocities
/// (e.g. body-frame velocity to world-frame displacement). The two vectors
/// need not have the same length.
pub trait MechanicalSystem {
    /// Side data produced by an acceleration evaluation.
    type Report;

    fn position_dim(&self) -> usize;

    fn velocity_dim(&self) -> usize;

    /// Evaluates `dv/dt` at `(q, v)`.
    /// t: current time
    /// out: buffer of length `velocity_dim`
    fn accelerations(&self, t: f64, q: &[f64], v: &[f64], out: &mut [f64]) -> Result<Self::Report>;

    /// Evaluates `dq/dt` at `(q, v)` into a buffer of length `position_dim`.
    fn position_rates(&self, q: &[f64], v: &[f64], out: &mut [f64]);
}

/// A time-stepping scheme.
pub trait Steppable {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// q, v: current state (updated after step; untouched on error)
    ///
    /// Returns the report of the evaluation at the start of the step.
    fn step<M: MechanicalSystem>(
        &mut self,
        system: &M,
        t: &mut f64,
        q: &mut [f64],
        v: &mut [f64],
        dt: f64,
    ) -> Result<M::Report>;
}
