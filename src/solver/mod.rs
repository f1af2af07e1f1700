//! Stochastic advancement of a population state over a reaction network.
//!
//! The solver holds only numerical parameters. Every routine takes the state
//! and the (sub-)list of reactions it operates on, plus the random generator
//! to draw from.

mod drivers;
mod implicit;
mod leap;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::{KmcError, KmcResult};
use crate::params::SolverParameters;
use crate::random::uniform01;
use crate::reaction::KmcReaction;
use crate::state::{KmcState, Population};

/// Gi in the Cao leap bound, fixed at the worst case of a third-order self reaction.
const CAO_GI: f64 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeapPropagator {
    ExplicitEuler = 0,
    Midpoint = 1,
    Prc = 2,
    ImplicitEuler = 3,
}

impl LeapPropagator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExplicitEuler => "explicit_euler",
            Self::Midpoint => "midpoint",
            Self::Prc => "prc",
            Self::ImplicitEuler => "implicit_euler",
        }
    }
}

impl fmt::Display for LeapPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for LeapPropagator {
    type Error = KmcError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ExplicitEuler),
            1 => Ok(Self::Midpoint),
            2 => Ok(Self::Prc),
            3 => Ok(Self::ImplicitEuler),
            other => Err(KmcError::InvalidParameter(format!(
                "unsupported leap propagator code {} (expected 0=explicit Euler, 1=midpoint, 2=PRC, or 3=implicit Euler)",
                other
            ))),
        }
    }
}

impl FromStr for LeapPropagator {
    type Err = KmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euler" | "explicit_euler" => Ok(Self::ExplicitEuler),
            "midpoint" => Ok(Self::Midpoint),
            "prc" => Ok(Self::Prc),
            "implicit" | "implicit_euler" => Ok(Self::ImplicitEuler),
            other => Err(KmcError::InvalidParameter(format!(
                "unrecognized leap propagator '{}'",
                other
            ))),
        }
    }
}

/// Advancement strategy for [`KmcSolver::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Ssa,
    Tau(LeapPropagator),
    /// Critical reactions by SSA, the rest by the given leap scheme.
    Hybrid(LeapPropagator),
}

impl Algorithm {
    /// Parses `"ssa"`, `"tau"` or `"hybrid"`; leap-based algorithms default to explicit Euler.
    pub fn parse(name: &str, propagator: Option<&str>) -> KmcResult<Self> {
        let propagator = propagator
            .map(LeapPropagator::from_str)
            .transpose()?
            .unwrap_or(LeapPropagator::ExplicitEuler);
        match name.to_ascii_lowercase().as_str() {
            "ssa" => Ok(Self::Ssa),
            "tau" => Ok(Self::Tau(propagator)),
            "hybrid" => Ok(Self::Hybrid(propagator)),
            other => Err(KmcError::InvalidParameter(format!(
                "unrecognized algorithm '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub accepted_substeps: u64,
    pub rejected_substeps: u64,
    pub ssa_firings: u64,
    pub leaps: u64,
}

impl AdvanceReport {
    pub fn merge(&mut self, other: &AdvanceReport) {
        self.accepted_substeps += other.accepted_substeps;
        self.rejected_substeps += other.rejected_substeps;
        self.ssa_firings += other.ssa_firings;
        self.leaps += other.leaps;
    }
}

#[derive(Clone, Debug, Default)]
pub struct KmcSolver {
    params: SolverParameters,
}

impl KmcSolver {
    pub fn new(params: SolverParameters) -> KmcResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn parameters(&self) -> &SolverParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: SolverParameters) -> KmcResult<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Sets `Ncrit`, `numSSA`, Newton iterations, `eps`, `SSAlim` and the Newton exit tolerance.
    pub fn set_solver_parameters(
        &mut self,
        critical_threshold: Population,
        max_ssa_steps: u64,
        max_newton_iterations: usize,
        leap_epsilon: f64,
        ssa_threshold: f64,
        newton_exit_tolerance: f64,
    ) -> KmcResult<()> {
        let mut params = self.params.clone();
        params.set_solver_parameters(
            critical_threshold,
            max_ssa_steps,
            max_newton_iterations,
            leap_epsilon,
            ssa_threshold,
            newton_exit_tolerance,
        );
        self.set_parameters(params)
    }

    pub fn propensities<R: KmcReaction>(&self, state: &R::State, reactions: &[&R]) -> Vec<f64> {
        reactions.iter().map(|r| r.propensity(state)).collect()
    }

    pub fn total_propensity<R: KmcReaction>(&self, state: &R::State, reactions: &[&R]) -> f64 {
        reactions.iter().map(|r| r.propensity(state)).sum()
    }

    /// Linearized change vector of each reaction, found by firing it once on a zeroed copy of `state`.
    pub fn stoichiometry_matrix<R: KmcReaction>(
        &self,
        state: &R::State,
        reactions: &[&R],
    ) -> Vec<Vec<Population>> {
        let zeros = vec![0; state.num_linear()];
        let mut scratch = state.clone();
        reactions
            .iter()
            .map(|reaction| {
                scratch.linear_in(&zeros);
                reaction.advance_state(&mut scratch, 1);
                scratch.linear_out()
            })
            .collect()
    }

    pub fn partition_reactions<'a, R: KmcReaction>(
        &self,
        state: &R::State,
        reactions: &[&'a R],
    ) -> (Vec<&'a R>, Vec<&'a R>) {
        reactions
            .iter()
            .copied()
            .partition(|r| r.critical_number_of_reactions(state) < self.params.critical_threshold)
    }

    /// Exponential waiting time `ln(1/u) / A` for total propensity `A`.
    pub fn critical_time_step<G: Rng + ?Sized>(&self, total_propensity: f64, rng: &mut G) -> f64 {
        let total = total_propensity.max(f64::MIN_POSITIVE);
        let u = uniform01(rng);
        (1.0 / u).ln() / total
    }

    pub fn critical_time_step_from<G: Rng + ?Sized>(&self, propensities: &[f64], rng: &mut G) -> f64 {
        if propensities.is_empty() {
            return f64::MAX;
        }
        self.critical_time_step(propensities.iter().sum(), rng)
    }

    pub fn critical_time_step_for<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &R::State,
        critical_reactions: &[&R],
        rng: &mut G,
    ) -> f64 {
        let propensities = self.propensities(state, critical_reactions);
        self.critical_time_step_from(&propensities, rng)
    }

    /// Cao-Gillespie-Petzold leap bound over the non-critical reactions.
    ///
    /// For each reactant `i` with `X_i > 0`, with `mu_i = sum_j |nu_ij a_j|`,
    /// `sigma2_i = sum_j nu_ij^2 a_j` and `f = max(eps X_i / g_i, 1)`, the bound
    /// is `min(f / mu_i, f^2 / sigma2_i)` minimized over all reactants.
    pub fn non_critical_time_step<R: KmcReaction>(
        &self,
        state: &R::State,
        reactions: &[&R],
        propensities: &[f64],
    ) -> f64 {
        debug_assert_eq!(reactions.len(), propensities.len());
        let Some(first) = reactions.first() else {
            return f64::MAX;
        };
        let species: BTreeSet<usize> = reactions
            .iter()
            .flat_map(|r| r.reactants().iter().copied())
            .collect();

        let mut dt = f64::MAX;
        for reactant in species {
            let population = first.population(reactant, state);
            if population <= 0 {
                continue;
            }
            let mut mu = 0.0;
            let mut sigma2 = 0.0;
            for (reaction, &propensity) in reactions.iter().zip(propensities) {
                let nu = reaction.state_change(reactant) as f64;
                mu += (nu * propensity).abs();
                sigma2 += (nu * nu * propensity).abs();
            }
            let f = (self.params.leap_epsilon * population as f64 / CAO_GI).max(1.0);
            if mu > f64::MIN_POSITIVE {
                dt = dt.min(f / mu);
            }
            if sigma2 > f64::MIN_POSITIVE {
                dt = dt.min(f * f / sigma2);
            }
        }
        dt
    }

    /// Fires exactly one reaction picked with probability proportional to its propensity.
    ///
    /// Returns the index of the fired reaction, or `None` when nothing can fire.
    pub fn step_ssa<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        propensities: &[f64],
        rng: &mut G,
    ) -> Option<usize> {
        debug_assert_eq!(reactions.len(), propensities.len());
        let total: f64 = propensities.iter().sum();
        if reactions.is_empty() || total.is_nan() || total <= 0.0 {
            return None;
        }
        let chosen = select_reaction(propensities, uniform01(rng) * total)?;
        reactions[chosen].advance_state(state, 1);
        Some(chosen)
    }

    /// Exact SSA over `dt`: fire reactions one by one until the next event falls outside `dt`.
    pub fn advance_ssa<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        dt: f64,
        rng: &mut G,
    ) -> AdvanceReport {
        let mut report = AdvanceReport::default();
        if reactions.is_empty() {
            return report;
        }
        let mut elapsed = 0.0;
        while elapsed <= dt {
            let propensities = self.propensities(state, reactions);
            let next_dt = self.critical_time_step_from(&propensities, rng);
            if elapsed + next_dt <= dt && self.step_ssa(state, reactions, &propensities, rng).is_some()
            {
                report.ssa_firings += 1;
            }
            elapsed += next_dt;
        }
        report.accepted_substeps += 1;
        report
    }
}

/// First reaction with positive propensity whose cumulative sum reaches `target`.
pub(crate) fn select_reaction(propensities: &[f64], target: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (idx, &propensity) in propensities.iter().enumerate() {
        if propensity <= 0.0 {
            continue;
        }
        cumulative += propensity;
        last_positive = Some(idx);
        if cumulative >= target {
            return Some(idx);
        }
    }
    last_positive
}
