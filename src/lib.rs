//! Discrete stochastic chemical kinetics.
//!
//! Advances integer species populations under the chemical master equation
//! with exact Gillespie simulation (SSA), tau-leaping (explicit Euler,
//! midpoint, PRC, implicit Euler) or an adaptive hybrid of the two. Steps that
//! would drive a population negative are rejected and retried with a halved
//! sub-step.
//!
//! ```
//! use kinetic_mc::{Algorithm, KmcSolver, LeapPropagator, ReactionList, SingleState,
//!     SingleStateReaction, SolverParameters};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! // A -> B with rate 1.
//! let reactions = ReactionList::new(vec![SingleStateReaction::new(&[0], &[1]).with_rate(1.0)]);
//! let solver = KmcSolver::new(SolverParameters::default()).unwrap();
//! let mut state = SingleState::from(vec![100, 0]);
//! let mut rng = ChaCha8Rng::seed_from_u64(7);
//!
//! let algorithm = Algorithm::Hybrid(LeapPropagator::ExplicitEuler);
//! solver.advance(&mut state, &reactions, 0.5, algorithm, &mut rng).unwrap();
//! assert_eq!(state[0] + state[1], 100);
//! ```

mod ensemble;
mod error;
mod params;
pub mod random;
mod reaction;
mod solver;
mod state;

#[cfg(feature = "python")]
mod python;

pub use ensemble::{advance_ensemble, EnsembleOptions};
pub use error::{KmcError, KmcResult};
pub use params::SolverParameters;
pub use reaction::{DualStateReaction, KmcReaction, ReactionList, SingleStateReaction};
pub use solver::{AdvanceReport, Algorithm, KmcSolver, LeapPropagator};
pub use state::{DualState, KmcState, Population, SingleState};
