use crate::error::{KmcError, KmcResult};
use crate::state::Population;

/// Tunable numerical parameters of [`crate::KmcSolver`].
///
/// The defaults make [`crate::KmcSolver::advance_hybrid`] behave as pure
/// tau-leaping: nothing is critical and the SSA fallback never triggers.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverParameters {
    /// Reactions that can fire fewer than this many times are critical (`Ncrit`).
    pub critical_threshold: Population,
    /// Maximum SSA firings per hybrid sub-step when leaping is inefficient (`numSSA`).
    pub max_ssa_steps: u64,
    pub max_newton_iterations: usize,
    /// Relative leap error tolerance in the Cao leap bound (`eps`).
    pub leap_epsilon: f64,
    /// Hybrid falls back to SSA when `total propensity * dt` is below this (`SSAlim`).
    pub ssa_threshold: f64,
    pub newton_exit_tolerance: f64,
    /// Optional cap on consecutive rejections within one sub-step. Without it,
    /// halving only stops once the sub-step no longer advances the clock.
    pub max_rejections: Option<usize>,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            critical_threshold: 0,
            max_ssa_steps: 0,
            max_newton_iterations: 100,
            leap_epsilon: f64::MAX,
            ssa_threshold: 0.0,
            newton_exit_tolerance: 1.0e-6,
            max_rejections: None,
        }
    }
}

impl SolverParameters {
    /// Positional form of the six chemistry-facing knobs; the rejection cap is left as is.
    pub fn set_solver_parameters(
        &mut self,
        critical_threshold: Population,
        max_ssa_steps: u64,
        max_newton_iterations: usize,
        leap_epsilon: f64,
        ssa_threshold: f64,
        newton_exit_tolerance: f64,
    ) {
        self.critical_threshold = critical_threshold;
        self.max_ssa_steps = max_ssa_steps;
        self.max_newton_iterations = max_newton_iterations;
        self.leap_epsilon = leap_epsilon;
        self.ssa_threshold = ssa_threshold;
        self.newton_exit_tolerance = newton_exit_tolerance;
    }

    pub fn with_critical_threshold(mut self, value: Population) -> Self {
        self.critical_threshold = value;
        self
    }

    pub fn with_max_ssa_steps(mut self, value: u64) -> Self {
        self.max_ssa_steps = value;
        self
    }

    pub fn with_max_newton_iterations(mut self, value: usize) -> Self {
        self.max_newton_iterations = value;
        self
    }

    pub fn with_leap_epsilon(mut self, value: f64) -> Self {
        self.leap_epsilon = value;
        self
    }

    pub fn with_ssa_threshold(mut self, value: f64) -> Self {
        self.ssa_threshold = value;
        self
    }

    pub fn with_newton_exit_tolerance(mut self, value: f64) -> Self {
        self.newton_exit_tolerance = value;
        self
    }

    pub fn with_max_rejections(mut self, value: usize) -> Self {
        self.max_rejections = Some(value);
        self
    }

    pub fn validate(&self) -> KmcResult<()> {
        if self.critical_threshold < 0 {
            return Err(KmcError::InvalidParameter(
                "critical threshold must be non-negative".into(),
            ));
        }
        if self.leap_epsilon.is_nan() || self.leap_epsilon <= 0.0 {
            return Err(KmcError::InvalidParameter(
                "leap epsilon must be positive".into(),
            ));
        }
        if self.ssa_threshold.is_nan() || self.ssa_threshold < 0.0 {
            return Err(KmcError::InvalidParameter(
                "SSA threshold must be non-negative".into(),
            ));
        }
        if !self.newton_exit_tolerance.is_finite() || self.newton_exit_tolerance <= 0.0 {
            return Err(KmcError::InvalidParameter(
                "Newton exit tolerance must be positive and finite".into(),
            ));
        }
        if self.max_rejections == Some(0) {
            return Err(KmcError::InvalidParameter(
                "max_rejections must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
