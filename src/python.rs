#![allow(unsafe_op_in_unsafe_fn)]

use numpy::{
    Element, IxDyn, PyArrayDyn, PyArrayMethods, PyReadonlyArray1, PyReadonlyArray2,
    PyUntypedArrayMethods,
};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::ensemble::{advance_ensemble, EnsembleOptions};
use crate::error::{KmcError, KmcResult};
use crate::params::SolverParameters;
use crate::reaction::{ReactionList, SingleStateReaction};
use crate::solver::{Algorithm, KmcSolver};
use crate::state::{Population, SingleState};

impl From<KmcError> for PyErr {
    fn from(err: KmcError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

fn flatten_pyarray2<T: Copy + Element>(
    array: PyReadonlyArray2<T>,
    name: &str,
) -> Result<(usize, usize, Vec<T>), KmcError> {
    let shape = array.shape();
    if shape.len() != 2 {
        return Err(KmcError::Shape(format!("{name} must be 2-dimensional")));
    }
    let data = array
        .as_slice()
        .map_err(|_| KmcError::Shape(format!("{name} must be contiguous")))?;
    Ok((shape[0], shape[1], data.to_vec()))
}

fn read_array1<T: Copy + Element>(
    array: PyReadonlyArray1<T>,
    expected: usize,
    name: &str,
) -> Result<Vec<T>, KmcError> {
    let slice = array
        .as_slice()
        .map_err(|_| KmcError::Shape(format!("{name} array must be contiguous")))?;
    if slice.len() != expected {
        return Err(KmcError::Shape(format!(
            "{name} length {} does not match reaction count {}",
            slice.len(),
            expected
        )));
    }
    Ok(slice.to_vec())
}

fn build_network(
    reactants: &[Vec<usize>],
    products: &[Vec<usize>],
    rates: &[f64],
) -> KmcResult<ReactionList<SingleStateReaction>> {
    if reactants.len() != products.len() {
        return Err(KmcError::Shape(format!(
            "reactant lists ({}) and product lists ({}) differ in length",
            reactants.len(),
            products.len()
        )));
    }
    let mut network = reactants
        .iter()
        .zip(products)
        .map(|(lhs, rhs)| SingleStateReaction::new(lhs, rhs))
        .collect::<ReactionList<_>>();
    network.set_rates(rates)?;
    Ok(network)
}

#[allow(clippy::too_many_arguments)]
fn build_parameters(
    critical_threshold: Option<Population>,
    max_ssa_steps: Option<u64>,
    max_newton_iterations: Option<usize>,
    leap_epsilon: Option<f64>,
    ssa_threshold: Option<f64>,
    newton_exit_tolerance: Option<f64>,
) -> SolverParameters {
    let mut params = SolverParameters::default();
    if let Some(value) = critical_threshold {
        params.critical_threshold = value;
    }
    if let Some(value) = max_ssa_steps {
        params.max_ssa_steps = value;
    }
    if let Some(value) = max_newton_iterations {
        params.max_newton_iterations = value;
    }
    if let Some(value) = leap_epsilon {
        params.leap_epsilon = value;
    }
    if let Some(value) = ssa_threshold {
        params.ssa_threshold = value;
    }
    if let Some(value) = newton_exit_tolerance {
        params.newton_exit_tolerance = value;
    }
    params
}

/// Advances a batch of independent cells over a single-state mass-action network.
///
/// `states` is an `(n_cells, n_species)` int64 array; a new array of the same
/// shape is returned.
#[pyfunction(signature = (
    reactants,
    products,
    rates,
    states,
    dt,
    algorithm="hybrid",
    propagator=None,
    n_threads=None,
    seed=None,
    critical_threshold=None,
    max_ssa_steps=None,
    max_newton_iterations=None,
    leap_epsilon=None,
    ssa_threshold=None,
    newton_exit_tolerance=None
))]
#[allow(clippy::too_many_arguments)]
pub fn advance_cells(
    py: Python<'_>,
    reactants: Vec<Vec<usize>>,
    products: Vec<Vec<usize>>,
    rates: PyReadonlyArray1<f64>,
    states: PyReadonlyArray2<Population>,
    dt: f64,
    algorithm: &str,
    propagator: Option<&str>,
    n_threads: Option<usize>,
    seed: Option<u64>,
    critical_threshold: Option<Population>,
    max_ssa_steps: Option<u64>,
    max_newton_iterations: Option<usize>,
    leap_epsilon: Option<f64>,
    ssa_threshold: Option<f64>,
    newton_exit_tolerance: Option<f64>,
) -> PyResult<Py<PyAny>> {
    if dt.is_nan() || dt < 0.0 {
        return Err(PyValueError::new_err("dt must be non-negative"));
    }
    let algorithm = Algorithm::parse(algorithm, propagator)?;
    let rates = read_array1(rates, reactants.len(), "rate")?;
    let network = build_network(&reactants, &products, &rates)?;
    let solver = KmcSolver::new(build_parameters(
        critical_threshold,
        max_ssa_steps,
        max_newton_iterations,
        leap_epsilon,
        ssa_threshold,
        newton_exit_tolerance,
    ))?;
    let (n_cells, n_species, flat) = flatten_pyarray2(states, "states")?;
    let options = EnsembleOptions { seed, n_threads };

    let advanced = py.detach(move || -> KmcResult<Vec<Population>> {
        let mut cells: Vec<SingleState> = if n_species == 0 {
            vec![SingleState::new(0); n_cells]
        } else {
            flat.chunks_exact(n_species)
                .map(|row| SingleState::from(row.to_vec()))
                .collect()
        };
        advance_ensemble(&solver, &mut cells, &network, dt, algorithm, &options)?;
        Ok(cells
            .iter()
            .flat_map(|cell| cell.populations().iter().copied())
            .collect())
    })?;

    let dims = vec![n_cells, n_species];
    let array = unsafe { PyArrayDyn::<Population>::new(py, IxDyn(&dims), false) };
    unsafe {
        array
            .as_slice_mut()
            .map_err(|_| PyValueError::new_err("failed to export populations"))?
            .copy_from_slice(&advanced);
    }
    Ok(array.into_any().unbind())
}

#[pymodule]
fn kinetic_mc(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(advance_cells, module)?)?;
    Ok(())
}
