//! Advancing many independent states (e.g. one per mesh cell) in parallel.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::error::{KmcError, KmcResult};
use crate::random::stream_rng;
use crate::reaction::{KmcReaction, ReactionList};
use crate::solver::{AdvanceReport, Algorithm, KmcSolver};
use crate::state::KmcState;

#[derive(Clone, Debug, Default)]
pub struct EnsembleOptions {
    /// Base seed; cell `i` draws from stream `i` of it.
    pub seed: Option<u64>,
    pub n_threads: Option<usize>,
}

/// Advances every state in `states` by `dt`.
///
/// Each cell owns its random stream, so results do not depend on the thread
/// count. On failure one of the cell errors is returned; cells that succeeded
/// keep their advanced populations.
pub fn advance_ensemble<R, S>(
    solver: &KmcSolver,
    states: &mut [S],
    reactions: &ReactionList<R>,
    dt: f64,
    algorithm: Algorithm,
    options: &EnsembleOptions,
) -> KmcResult<Vec<AdvanceReport>>
where
    R: KmcReaction<State = S> + Sync,
    S: KmcState + Send,
{
    let seed = options.seed;

    let mut simulate = || -> KmcResult<Vec<AdvanceReport>> {
        states
            .par_iter_mut()
            .enumerate()
            .map(|(cell, state)| {
                reactions.validate_against(state)?;
                let mut rng = stream_rng(seed, cell as u64);
                solver.advance(state, reactions, dt, algorithm, &mut rng)
            })
            .collect()
    };

    match options.n_threads {
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| KmcError::ThreadPool(e.to_string()))?
            .install(|| simulate()),
        None => simulate(),
    }
}
