use log::{debug, trace, warn};
use rand::Rng;

use super::{AdvanceReport, Algorithm, KmcSolver, LeapPropagator};
use crate::error::{KmcError, KmcResult};
use crate::reaction::{KmcReaction, ReactionList};
use crate::state::KmcState;

impl KmcSolver {
    /// Advances `state` by `dt` over the whole network with the selected algorithm.
    pub fn advance<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &ReactionList<R>,
        dt: f64,
        algorithm: Algorithm,
        rng: &mut G,
    ) -> KmcResult<AdvanceReport> {
        let reactions = reactions.as_refs();
        match algorithm {
            Algorithm::Ssa => Ok(self.advance_ssa(state, &reactions, dt, rng)),
            Algorithm::Tau(propagator) => self.advance_tau(state, &reactions, dt, propagator, rng),
            Algorithm::Hybrid(propagator) => {
                self.advance_hybrid(state, &reactions, dt, propagator, rng)
            }
        }
    }

    fn underflow(&self, elapsed: f64, attempted: f64, rejections: usize) -> KmcError {
        warn!(
            "sub-step underflow: {rejections} consecutive rejections, attempted {attempted:e} after {elapsed:e}"
        );
        KmcError::StepUnderflow {
            elapsed,
            attempted,
            rejections,
        }
    }

    /// True once `attempted` can no longer move the clock past `elapsed`, or the rejection cap is hit.
    fn exhausted(&self, elapsed: f64, attempted: f64, rejections: usize) -> bool {
        attempted <= 0.0
            || elapsed + attempted == elapsed
            || self
                .params
                .max_rejections
                .is_some_and(|cap| rejections > cap)
    }

    /// Tau-leaping with a fixed scheme: try the whole remaining interval, halve on an invalid result.
    pub fn advance_tau<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        dt: f64,
        propagator: LeapPropagator,
        rng: &mut G,
    ) -> KmcResult<AdvanceReport> {
        let mut report = AdvanceReport::default();
        if reactions.is_empty() || dt.is_nan() || dt <= 0.0 {
            return Ok(report);
        }
        let mut elapsed = 0.0;
        while elapsed < dt {
            let mut substep = dt - elapsed;
            let mut rejections = 0;
            loop {
                let mut trial = state.clone();
                self.leap(propagator, &mut trial, reactions, substep, rng);
                report.leaps += 1;
                if trial.is_valid_state() {
                    *state = trial;
                    elapsed += substep;
                    report.accepted_substeps += 1;
                    break;
                }
                rejections += 1;
                report.rejected_substeps += 1;
                debug!("{propagator} leap over {substep:e} produced an invalid state; halving");
                substep *= 0.5;
                if self.exhausted(elapsed, substep, rejections) {
                    return Err(self.underflow(elapsed, substep, rejections));
                }
            }
        }
        Ok(report)
    }

    /// Adaptive hybrid: critical reactions fire one at a time via SSA, the
    /// rest are leaped with `propagator`, and plain SSA takes over whenever
    /// `total propensity * dt` drops below the SSA threshold.
    pub fn advance_hybrid<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        dt: f64,
        propagator: LeapPropagator,
        rng: &mut G,
    ) -> KmcResult<AdvanceReport> {
        let mut report = AdvanceReport::default();
        if dt.is_nan() || dt <= 0.0 {
            return Ok(report);
        }
        let mut elapsed = 0.0;
        while elapsed < dt {
            let (critical, non_critical) = self.partition_reactions(state, reactions);
            let critical_propensities = self.propensities(state, &critical);
            let non_critical_propensities = self.propensities(state, &non_critical);
            let dt_crit = self.critical_time_step_from(&critical_propensities, rng);
            let mut dt_non_crit =
                self.non_critical_time_step(state, &non_critical, &non_critical_propensities);

            let mut rejections = 0;
            loop {
                let remaining = dt - elapsed;
                let substep = remaining.min(dt_crit).min(dt_non_crit);
                let non_critical_only =
                    dt_non_crit < dt_crit || critical.is_empty() || dt_crit > remaining;

                if non_critical_only && self.prefers_ssa(state, reactions, substep) {
                    let consumed = self.ssa_substep(state, reactions, substep, &mut report, rng);
                    trace!("hybrid: SSA fallback consumed {consumed:e} of {substep:e}");
                    elapsed += consumed;
                    report.accepted_substeps += 1;
                    break;
                }

                let mut trial = state.clone();
                let mut fired_critical = false;
                if non_critical_only {
                    trace!(
                        "hybrid: leaping {} non-critical reactions over {substep:e}",
                        non_critical.len()
                    );
                    self.leap(propagator, &mut trial, &non_critical, substep, rng);
                } else {
                    trace!(
                        "hybrid: firing one of {} critical reactions, leaping over {substep:e}",
                        critical.len()
                    );
                    fired_critical = self
                        .step_ssa(&mut trial, &critical, &critical_propensities, rng)
                        .is_some();
                    self.leap(propagator, &mut trial, &non_critical, substep, rng);
                }
                report.leaps += 1;

                if trial.is_valid_state() {
                    *state = trial;
                    elapsed += substep;
                    report.accepted_substeps += 1;
                    if fired_critical {
                        report.ssa_firings += 1;
                    }
                    break;
                }
                rejections += 1;
                report.rejected_substeps += 1;
                dt_non_crit = 0.5 * dt_non_crit.min(substep);
                debug!("hybrid: invalid state after {substep:e}; non-critical step now {dt_non_crit:e}");
                if self.exhausted(elapsed, dt_non_crit, rejections) {
                    return Err(self.underflow(elapsed, dt_non_crit, rejections));
                }
            }
        }
        Ok(report)
    }

    fn prefers_ssa<R: KmcReaction>(&self, state: &R::State, reactions: &[&R], substep: f64) -> bool {
        self.params.max_ssa_steps > 0
            && self.total_propensity(state, reactions) * substep < self.params.ssa_threshold
    }

    /// Runs SSA over the full network on `state` directly until `substep` is
    /// consumed or the SSA step budget runs out. Returns the simulated time.
    fn ssa_substep<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        substep: f64,
        report: &mut AdvanceReport,
        rng: &mut G,
    ) -> f64 {
        let mut elapsed = 0.0;
        let mut fired = 0;
        while elapsed < substep && fired < self.params.max_ssa_steps {
            let propensities = self.propensities(state, reactions);
            let dt_react = self.critical_time_step(propensities.iter().sum(), rng);
            if elapsed + dt_react < substep {
                self.step_ssa(state, reactions, &propensities, rng);
                elapsed += dt_react;
                fired += 1;
            } else {
                elapsed = substep;
            }
        }
        report.ssa_firings += fired;
        elapsed
    }
}
