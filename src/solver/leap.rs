use rand::Rng;

use super::{KmcSolver, LeapPropagator};
use crate::random::poisson;
use crate::reaction::KmcReaction;
use crate::state::Population;

impl KmcSolver {
    /// One leap of the given scheme over `dt`. The result may be an invalid state.
    pub fn leap<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        propagator: LeapPropagator,
        state: &mut R::State,
        reactions: &[&R],
        dt: f64,
        rng: &mut G,
    ) {
        match propagator {
            LeapPropagator::ExplicitEuler => self.step_explicit_euler(state, reactions, dt, rng),
            LeapPropagator::Midpoint => self.step_midpoint(state, reactions, dt, rng),
            LeapPropagator::Prc => self.step_prc(state, reactions, dt, rng),
            LeapPropagator::ImplicitEuler => {
                self.step_implicit_euler(state, reactions, dt, rng);
            }
        }
    }

    /// Plain tau-leap: `k_j ~ Poisson(a_j(x) dt)` for every reaction.
    pub fn step_explicit_euler<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        dt: f64,
        rng: &mut G,
    ) {
        if reactions.is_empty() {
            return;
        }
        let propensities = self.propensities(state, reactions);
        fire_poisson(state, reactions, &propensities, dt, rng);
    }

    /// Second-order leap with propensities taken at a deterministic midpoint prediction.
    pub fn step_midpoint<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        dt: f64,
        rng: &mut G,
    ) {
        if reactions.is_empty() {
            return;
        }
        let propensities = self.propensities(state, reactions);
        let mut midpoint = state.clone();
        for (reaction, &propensity) in reactions.iter().zip(&propensities) {
            let firings = (0.5 * propensity * dt).ceil() as Population;
            reaction.advance_state(&mut midpoint, firings);
        }
        let midpoint_propensities = self.propensities(&midpoint, reactions);
        fire_poisson(state, reactions, &midpoint_propensities, dt, rng);
    }

    /// Leap with first-order propensity correction
    /// `a_j += dt/2 * sum_k a_k (a_j(x + nu_k) - a_j(x))`.
    pub fn step_prc<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        dt: f64,
        rng: &mut G,
    ) {
        if reactions.is_empty() {
            return;
        }
        let base = self.propensities(state, reactions);
        let mut corrected = base.clone();
        let mut shifted = state.clone();
        for (k, reaction_k) in reactions.iter().enumerate() {
            reaction_k.advance_state(&mut shifted, 1);
            for (j, reaction_j) in reactions.iter().enumerate() {
                let eta = reaction_j.propensity(&shifted) - base[j];
                corrected[j] += 0.5 * dt * base[k] * eta;
            }
            reaction_k.advance_state(&mut shifted, -1);
        }
        fire_poisson(state, reactions, &corrected, dt, rng);
    }
}

fn fire_poisson<R: KmcReaction, G: Rng + ?Sized>(
    state: &mut R::State,
    reactions: &[&R],
    propensities: &[f64],
    dt: f64,
    rng: &mut G,
) {
    for (reaction, &propensity) in reactions.iter().zip(propensities) {
        let firings = poisson(rng, propensity * dt);
        reaction.advance_state(state, firings);
    }
}
