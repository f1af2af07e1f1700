//! Implicit (backward) Euler tau-leaping.
//!
//! Solves `F(X) = X - c - dt * sum_j nu_j a_j(X) = 0` by Newton iteration,
//! where `c = x + sum_j nu_j (P(a_j(x) dt) - a_j(x) dt)` is sampled once before
//! the iteration starts. Propensities are evaluated at `round(X)`.

use std::cell::RefCell;

use log::warn;
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use super::{KmcSolver, LeapPropagator};
use crate::reaction::KmcReaction;
use crate::state::{KmcState, Population};

/// Population written on linear-solve failure so the caller rejects the step.
const REJECTED_POPULATION: Population = -1;

struct NewtonScratch {
    x: DVector<f64>,
    f: DVector<f64>,
    c: DVector<f64>,
    probe: DVector<f64>,
    f_probe: DVector<f64>,
    jacobian: DMatrix<f64>,
    rounded: Vec<Population>,
}

impl Default for NewtonScratch {
    fn default() -> Self {
        Self {
            x: DVector::zeros(0),
            f: DVector::zeros(0),
            c: DVector::zeros(0),
            probe: DVector::zeros(0),
            f_probe: DVector::zeros(0),
            jacobian: DMatrix::zeros(0, 0),
            rounded: Vec::new(),
        }
    }
}

impl NewtonScratch {
    fn ensure(&mut self, n: usize) {
        if self.x.len() != n {
            self.x = DVector::zeros(n);
            self.f = DVector::zeros(n);
            self.c = DVector::zeros(n);
            self.probe = DVector::zeros(n);
            self.f_probe = DVector::zeros(n);
            self.jacobian = DMatrix::zeros(n, n);
            self.rounded.resize(n, 0);
        }
    }
}

thread_local! {
    static NEWTON_SCRATCH: RefCell<NewtonScratch> = RefCell::new(NewtonScratch::default());
}

/// Residual evaluation context; `eval` is a reusable copy of the state the
/// rounded iterate is written into.
struct Residual<'a, R: KmcReaction> {
    reactions: &'a [&'a R],
    nu: &'a [Vec<Population>],
    dt: f64,
    eval: R::State,
}

impl<R: KmcReaction> Residual<'_, R> {
    fn evaluate(
        &mut self,
        x: &DVector<f64>,
        c: &DVector<f64>,
        rounded: &mut [Population],
        out: &mut DVector<f64>,
    ) {
        for (slot, &value) in rounded.iter_mut().zip(x.iter()) {
            *slot = value.round() as Population;
        }
        self.eval.linear_in(rounded);
        for i in 0..x.len() {
            out[i] = x[i] - c[i];
        }
        for (reaction, nu_j) in self.reactions.iter().zip(self.nu) {
            let propensity = reaction.propensity(&self.eval);
            if propensity == 0.0 {
                continue;
            }
            for (i, &nu_ij) in nu_j.iter().enumerate() {
                out[i] -= self.dt * nu_ij as f64 * propensity;
            }
        }
    }
}

fn max_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()))
}

impl KmcSolver {
    /// One implicit Euler leap. Returns `false` when the Newton linear solve
    /// failed, in which case every population is set to `-1`.
    pub fn step_implicit_euler<R: KmcReaction, G: Rng + ?Sized>(
        &self,
        state: &mut R::State,
        reactions: &[&R],
        dt: f64,
        rng: &mut G,
    ) -> bool {
        if reactions.is_empty() {
            return true;
        }
        let n = state.num_linear();
        let nu = self.stoichiometry_matrix(state, reactions);
        let propensities = self.propensities(state, reactions);

        let mut explicit = state.clone();
        let sampled = self
            .advance_tau(&mut explicit, reactions, dt, LeapPropagator::ExplicitEuler, rng)
            .is_ok();
        if !sampled {
            warn!("implicit Euler: explicit predictor failed over dt={dt:e}; rejecting leap");
            state.linear_in(&vec![REJECTED_POPULATION; n]);
            return false;
        }
        let predictor = explicit.linear_out();

        let mut residual = Residual {
            reactions,
            nu: &nu,
            dt,
            eval: state.clone(),
        };

        let converged = NEWTON_SCRATCH.with(|cell| {
            let mut scratch = cell.borrow_mut();
            scratch.ensure(n);
            let NewtonScratch {
                x,
                f,
                c,
                probe,
                f_probe,
                jacobian,
                rounded,
            } = &mut *scratch;

            for i in 0..n {
                c[i] = predictor[i] as f64;
                x[i] = predictor[i] as f64;
            }
            for (nu_j, &propensity) in nu.iter().zip(&propensities) {
                for (i, &nu_ij) in nu_j.iter().enumerate() {
                    c[i] -= nu_ij as f64 * propensity * dt;
                }
            }

            probe.fill(0.0);
            residual.evaluate(probe, c, rounded, f);
            let initial_norm = max_norm(f);

            for _ in 0..self.params.max_newton_iterations {
                residual.evaluate(x, c, rounded, f);
                for j in 0..n {
                    probe.copy_from(&*x);
                    let delta = (0.01 * x[j]).max(1.0);
                    probe[j] += delta;
                    residual.evaluate(probe, c, rounded, f_probe);
                    for i in 0..n {
                        jacobian[(i, j)] = (f_probe[i] - f[i]) / delta;
                    }
                }

                // Newton step X <- X - J^{-1} F.
                let step = jacobian.clone().lu().solve(&*f);
                match step {
                    Some(dx) if dx.iter().all(|v| v.is_finite()) => *x -= dx,
                    _ => {
                        warn!("implicit Euler: singular Newton system (n={n}, dt={dt:e}); rejecting leap");
                        return false;
                    }
                }

                residual.evaluate(x, c, rounded, f);
                if max_norm(f) <= self.params.newton_exit_tolerance * initial_norm {
                    break;
                }
            }

            for (slot, &value) in rounded.iter_mut().zip(x.iter()) {
                *slot = value.round() as Population;
            }
            true
        });

        if converged {
            NEWTON_SCRATCH.with(|cell| state.linear_in(&cell.borrow().rounded));
        } else {
            state.linear_in(&vec![REJECTED_POPULATION; n]);
        }
        converged
    }
}
