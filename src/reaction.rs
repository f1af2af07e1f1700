use std::collections::BTreeMap;

use crate::error::{KmcError, KmcResult};
use crate::state::{DualState, KmcState, Population, SingleState};

/// One reaction channel as seen by the solver.
///
/// Species are referenced by index only, so the same reaction can be applied to
/// any number of independent states.
pub trait KmcReaction {
    type State: KmcState;

    fn rate(&self) -> f64;

    /// Refreshes the rate constant. Must be kept current before propensities are evaluated.
    fn set_rate(&mut self, rate: f64);

    fn propensity(&self, state: &Self::State) -> f64;

    /// Number of firings before the first reactant with a negative change runs out.
    ///
    /// Returns [`Population::MAX`] when no species is consumed.
    fn critical_number_of_reactions(&self, state: &Self::State) -> Population;

    /// Applies `num_reactions` firings. Negative counts undo firings.
    fn advance_state(&self, state: &mut Self::State, num_reactions: Population);

    /// Net change of reactive species `species` per firing, zero if unaffected.
    fn state_change(&self, species: usize) -> Population;

    fn reactants(&self) -> &[usize];

    /// Population of reactant species `species` in `state`, indexed the way this reaction indexes it.
    fn population(&self, species: usize, state: &Self::State) -> Population;

    fn check_species(&self, state: &Self::State) -> KmcResult<()>;
}

#[derive(Clone, Debug)]
struct Reactant {
    species: usize,
    count: Population,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SpeciesDelta {
    species: usize,
    delta: Population,
}

/// Mass-action bookkeeping shared by both reaction flavours.
#[derive(Clone, Debug)]
struct Kinetics {
    rate: f64,
    factor: f64,
    reactant_list: Vec<usize>,
    reactants: Vec<Reactant>,
    deltas: Vec<SpeciesDelta>,
}

impl Kinetics {
    fn new(reactants: &[usize], products: &[usize]) -> Self {
        let mut multiplicity: BTreeMap<usize, Population> = BTreeMap::new();
        for &species in reactants {
            *multiplicity.entry(species).or_insert(0) += 1;
        }
        let factor = multiplicity
            .values()
            .map(|&count| 1.0 / factorial(count))
            .product();
        let grouped = multiplicity
            .into_iter()
            .map(|(species, count)| Reactant { species, count })
            .collect();
        Self {
            rate: 0.0,
            factor,
            reactant_list: reactants.to_vec(),
            reactants: grouped,
            deltas: build_species_deltas(reactants, products),
        }
    }

    #[inline]
    fn propensity(&self, populations: &[Population]) -> f64 {
        let mut propensity = self.rate * self.factor;
        for reactant in &self.reactants {
            let available = populations[reactant.species];
            if available < reactant.count {
                return 0.0;
            }
            propensity *= falling_factorial(available, reactant.count);
        }
        propensity
    }

    fn critical_number(&self, populations: &[Population]) -> Population {
        self.deltas
            .iter()
            .filter(|d| d.delta < 0)
            .map(|d| populations[d.species] / d.delta.abs())
            .min()
            .unwrap_or(Population::MAX)
    }

    fn state_change(&self, species: usize) -> Population {
        lookup_delta(&self.deltas, species)
    }

    fn highest_species(&self) -> Option<usize> {
        self.reactant_list
            .iter()
            .copied()
            .chain(self.deltas.iter().map(|d| d.species))
            .max()
    }
}

fn build_species_deltas(consumed: &[usize], produced: &[usize]) -> Vec<SpeciesDelta> {
    let mut net: BTreeMap<usize, Population> = BTreeMap::new();
    for &species in consumed {
        *net.entry(species).or_insert(0) -= 1;
    }
    for &species in produced {
        *net.entry(species).or_insert(0) += 1;
    }
    net.into_iter()
        .filter_map(|(species, delta)| (delta != 0).then_some(SpeciesDelta { species, delta }))
        .collect()
}

#[inline]
fn lookup_delta(deltas: &[SpeciesDelta], species: usize) -> Population {
    deltas
        .binary_search_by_key(&species, |d| d.species)
        .map(|idx| deltas[idx].delta)
        .unwrap_or(0)
}

#[inline]
fn apply_deltas(deltas: &[SpeciesDelta], populations: &mut [Population], num_reactions: Population) {
    for d in deltas {
        let slot = &mut populations[d.species];
        *slot = slot.saturating_add(num_reactions.saturating_mul(d.delta));
    }
}

fn check_range(species: Option<usize>, len: usize) -> KmcResult<()> {
    match species {
        Some(species) if species >= len => Err(KmcError::species(species, len)),
        _ => Ok(()),
    }
}

fn factorial(n: Population) -> f64 {
    (2..=n).map(|i| i as f64).product()
}

/// `value * (value - 1) * ... * (value - count + 1)`, zero when `value < count`.
#[inline]
pub(crate) fn falling_factorial(value: Population, count: Population) -> f64 {
    match count {
        0 => 1.0,
        1 => value as f64,
        _ if value < count => 0.0,
        _ => {
            let mut acc = 1.0;
            for i in 0..count {
                acc *= (value - i) as f64;
            }
            acc
        }
    }
}

#[derive(Clone, Debug)]
pub struct SingleStateReaction {
    products: Vec<usize>,
    kinetics: Kinetics,
}

impl SingleStateReaction {
    pub fn new(reactants: &[usize], products: &[usize]) -> Self {
        Self {
            products: products.to_vec(),
            kinetics: Kinetics::new(reactants, products),
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.kinetics.rate = rate;
        self
    }

    pub fn products(&self) -> &[usize] {
        &self.products
    }

    pub fn propensity_factor(&self) -> f64 {
        self.kinetics.factor
    }
}

impl KmcReaction for SingleStateReaction {
    type State = SingleState;

    fn rate(&self) -> f64 {
        self.kinetics.rate
    }

    fn set_rate(&mut self, rate: f64) {
        self.kinetics.rate = rate;
    }

    fn propensity(&self, state: &SingleState) -> f64 {
        self.kinetics.propensity(state.populations())
    }

    fn critical_number_of_reactions(&self, state: &SingleState) -> Population {
        self.kinetics.critical_number(state.populations())
    }

    fn advance_state(&self, state: &mut SingleState, num_reactions: Population) {
        apply_deltas(&self.kinetics.deltas, state.populations_mut(), num_reactions);
    }

    fn state_change(&self, species: usize) -> Population {
        self.kinetics.state_change(species)
    }

    fn reactants(&self) -> &[usize] {
        &self.kinetics.reactant_list
    }

    fn population(&self, species: usize, state: &SingleState) -> Population {
        state[species]
    }

    fn check_species(&self, state: &SingleState) -> KmcResult<()> {
        check_range(self.kinetics.highest_species(), state.num_species())
    }
}

/// Reaction acting on a [`DualState`]: reactive species on both sides plus
/// non-reactive byproducts on the product side.
#[derive(Clone, Debug)]
pub struct DualStateReaction {
    reactive_products: Vec<usize>,
    non_reactive_products: Vec<usize>,
    non_reactive_deltas: Vec<SpeciesDelta>,
    kinetics: Kinetics,
}

impl DualStateReaction {
    pub fn new(
        lhs_reactives: &[usize],
        rhs_reactives: &[usize],
        rhs_non_reactives: &[usize],
    ) -> KmcResult<Self> {
        if lhs_reactives.is_empty() {
            return Err(KmcError::InvalidReaction(
                "dual-state reactions need at least one reactive reactant".into(),
            ));
        }
        Ok(Self {
            reactive_products: rhs_reactives.to_vec(),
            non_reactive_products: rhs_non_reactives.to_vec(),
            non_reactive_deltas: build_species_deltas(&[], rhs_non_reactives),
            kinetics: Kinetics::new(lhs_reactives, rhs_reactives),
        })
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.kinetics.rate = rate;
        self
    }

    pub fn reactive_products(&self) -> &[usize] {
        &self.reactive_products
    }

    pub fn non_reactive_products(&self) -> &[usize] {
        &self.non_reactive_products
    }

    pub fn propensity_factor(&self) -> f64 {
        self.kinetics.factor
    }

    pub fn non_reactive_change(&self, species: usize) -> Population {
        lookup_delta(&self.non_reactive_deltas, species)
    }
}

impl KmcReaction for DualStateReaction {
    type State = DualState;

    fn rate(&self) -> f64 {
        self.kinetics.rate
    }

    fn set_rate(&mut self, rate: f64) {
        self.kinetics.rate = rate;
    }

    fn propensity(&self, state: &DualState) -> f64 {
        self.kinetics.propensity(state.reactive())
    }

    fn critical_number_of_reactions(&self, state: &DualState) -> Population {
        self.kinetics.critical_number(state.reactive())
    }

    fn advance_state(&self, state: &mut DualState, num_reactions: Population) {
        apply_deltas(&self.kinetics.deltas, state.reactive_mut(), num_reactions);
        apply_deltas(&self.non_reactive_deltas, state.non_reactive_mut(), num_reactions);
    }

    fn state_change(&self, species: usize) -> Population {
        self.kinetics.state_change(species)
    }

    fn reactants(&self) -> &[usize] {
        &self.kinetics.reactant_list
    }

    fn population(&self, species: usize, state: &DualState) -> Population {
        state.reactive()[species]
    }

    fn check_species(&self, state: &DualState) -> KmcResult<()> {
        check_range(self.kinetics.highest_species(), state.num_reactive())?;
        let highest_product = self.non_reactive_deltas.iter().map(|d| d.species).max();
        check_range(highest_product, state.num_non_reactive())
    }
}

/// Ordered reaction network. Order only matters for reproducibility of random draws.
#[derive(Clone, Debug)]
pub struct ReactionList<R> {
    reactions: Vec<R>,
}

impl<R> Default for ReactionList<R> {
    fn default() -> Self {
        Self {
            reactions: Vec::new(),
        }
    }
}

impl<R> From<Vec<R>> for ReactionList<R> {
    fn from(reactions: Vec<R>) -> Self {
        Self { reactions }
    }
}

impl<R> FromIterator<R> for ReactionList<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            reactions: iter.into_iter().collect(),
        }
    }
}

impl<R: KmcReaction> ReactionList<R> {
    pub fn new(reactions: Vec<R>) -> Self {
        Self { reactions }
    }

    pub fn push(&mut self, reaction: R) {
        self.reactions.push(reaction);
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&R> {
        self.reactions.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut R> {
        self.reactions.get_mut(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.reactions.iter()
    }

    pub fn as_refs(&self) -> Vec<&R> {
        self.reactions.iter().collect()
    }

    pub fn rates(&self) -> Vec<f64> {
        self.reactions.iter().map(KmcReaction::rate).collect()
    }

    pub fn set_rates(&mut self, rates: &[f64]) -> KmcResult<()> {
        if rates.len() != self.reactions.len() {
            return Err(KmcError::Shape(format!(
                "rate count {} does not match reaction count {}",
                rates.len(),
                self.reactions.len()
            )));
        }
        for (reaction, &rate) in self.reactions.iter_mut().zip(rates) {
            reaction.set_rate(rate);
        }
        Ok(())
    }

    pub fn validate_against(&self, state: &R::State) -> KmcResult<()> {
        self.reactions
            .iter()
            .try_for_each(|reaction| reaction.check_species(state))
    }
}
