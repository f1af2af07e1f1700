use std::fmt;
use std::ops::{Index, IndexMut};

/// Integer species population. Signed so that rejected leaps can be represented.
pub type Population = i64;

/// A population vector the solver can copy, validate and flatten.
///
/// The linearized form is what the implicit Newton solve iterates on; it must be
/// a fixed, caller-independent ordering of every population component.
pub trait KmcState: Clone {
    fn is_valid_state(&self) -> bool;

    fn linear_out(&self) -> Vec<Population>;

    /// Overwrites the state from a linearized vector of length [`Self::num_linear`].
    fn linear_in(&mut self, linear: &[Population]);

    fn num_linear(&self) -> usize;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SingleState {
    populations: Vec<Population>,
}

impl SingleState {
    pub fn new(num_species: usize) -> Self {
        Self {
            populations: vec![0; num_species],
        }
    }

    pub fn num_species(&self) -> usize {
        self.populations.len()
    }

    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    pub fn populations_mut(&mut self) -> &mut [Population] {
        &mut self.populations
    }
}

impl From<Vec<Population>> for SingleState {
    fn from(populations: Vec<Population>) -> Self {
        Self { populations }
    }
}

impl Index<usize> for SingleState {
    type Output = Population;

    #[inline]
    fn index(&self, species: usize) -> &Population {
        &self.populations[species]
    }
}

impl IndexMut<usize> for SingleState {
    #[inline]
    fn index_mut(&mut self, species: usize) -> &mut Population {
        &mut self.populations[species]
    }
}

impl KmcState for SingleState {
    fn is_valid_state(&self) -> bool {
        self.populations.iter().all(|&p| p >= 0)
    }

    fn linear_out(&self) -> Vec<Population> {
        self.populations.clone()
    }

    fn linear_in(&mut self, linear: &[Population]) {
        debug_assert_eq!(linear.len(), self.populations.len());
        self.populations.copy_from_slice(linear);
    }

    fn num_linear(&self) -> usize {
        self.populations.len()
    }
}

/// Populations split into species that take part in reactions and
/// non-reactive byproduct counters (e.g. emitted photons).
///
/// Non-reactive species are only ever produced, never consumed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DualState {
    reactive: Vec<Population>,
    non_reactive: Vec<Population>,
}

impl DualState {
    pub fn new(num_reactive: usize, num_non_reactive: usize) -> Self {
        Self {
            reactive: vec![0; num_reactive],
            non_reactive: vec![0; num_non_reactive],
        }
    }

    pub fn num_reactive(&self) -> usize {
        self.reactive.len()
    }

    pub fn num_non_reactive(&self) -> usize {
        self.non_reactive.len()
    }

    pub fn reactive(&self) -> &[Population] {
        &self.reactive
    }

    pub fn reactive_mut(&mut self) -> &mut [Population] {
        &mut self.reactive
    }

    pub fn non_reactive(&self) -> &[Population] {
        &self.non_reactive
    }

    pub fn non_reactive_mut(&mut self) -> &mut [Population] {
        &mut self.non_reactive
    }
}

impl KmcState for DualState {
    fn is_valid_state(&self) -> bool {
        self.reactive
            .iter()
            .chain(self.non_reactive.iter())
            .all(|&p| p >= 0)
    }

    fn linear_out(&self) -> Vec<Population> {
        let mut out = Vec::with_capacity(self.num_linear());
        out.extend_from_slice(&self.reactive);
        out.extend_from_slice(&self.non_reactive);
        out
    }

    fn linear_in(&mut self, linear: &[Population]) {
        debug_assert_eq!(linear.len(), self.num_linear());
        let (reactive, non_reactive) = linear.split_at(self.reactive.len());
        self.reactive.copy_from_slice(reactive);
        self.non_reactive.copy_from_slice(non_reactive);
    }

    fn num_linear(&self) -> usize {
        self.reactive.len() + self.non_reactive.len()
    }
}

fn write_tuple(f: &mut fmt::Formatter<'_>, values: &[Population]) -> fmt::Result {
    write!(f, "(")?;
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            write!(f, ",")?;
        }
        write!(f, "{value}")?;
    }
    write!(f, ")")
}

impl fmt::Display for DualState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DualState {{ reactive: ")?;
        write_tuple(f, &self.reactive)?;
        write!(f, ", non_reactive: ")?;
        write_tuple(f, &self.non_reactive)?;
        write!(f, " }}")
    }
}

impl fmt::Display for SingleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SingleState ")?;
        write_tuple(f, &self.populations)
    }
}
