use rand::rngs::StdRng;

use super::per_row;
use crate::array::Array;
use crate::error::Result;
use crate::operation::{InputRecord, OperationSpec, OutputRecord, Transform};

type BatchedFn = dyn Fn(&[Array], usize, &mut StdRng) -> Array + Send + Sync;
type SequentialFn = dyn Fn(&[Array], &mut StdRng) -> Array + Send + Sync;

enum Mode {
    Batched(Box<BatchedFn>),
    Sequential(Box<SequentialFn>),
}

/// A stochastic model step.
///
/// Every chunk gets a generator seeded from its own sub-stream, so the
/// simulated data does not depend on the order in which chunks are run.
pub struct Simulator {
    mode: Mode,
    observed: Option<Array>,
}

impl Simulator {
    /// `f(parents, n, rng)` returns all `n` samples at once.
    pub fn batched(
        f: impl Fn(&[Array], usize, &mut StdRng) -> Array + Send + Sync + 'static,
    ) -> Self {
        Self {
            mode: Mode::Batched(Box::new(f)),
            observed: None,
        }
    }

    /// `f(parent_rows, rng)` returns one sample; it is called once per sample
    /// and the results are stacked.
    pub fn sequential(f: impl Fn(&[Array], &mut StdRng) -> Array + Send + Sync + 'static) -> Self {
        Self {
            mode: Mode::Sequential(Box::new(f)),
            observed: None,
        }
    }

    /// Use `observed` instead of simulating from the parents' observed values.
    pub fn with_observed(mut self, observed: impl Into<Array>) -> Self {
        self.observed = Some(observed.into());
        self
    }
}

impl Transform for Simulator {
    fn apply(&self, input: &InputRecord) -> Result<OutputRecord> {
        let mut rng = input.random_state.unwrap_or_default().rng();
        let data = match &self.mode {
            Mode::Batched(f) => f(&input.data, input.n, &mut rng),
            Mode::Sequential(f) => per_row(&input.data, input.n, |row| Ok(f(row, &mut rng)))?,
        };
        Ok(data.into())
    }
}

impl From<Simulator> for OperationSpec {
    fn from(mut simulator: Simulator) -> Self {
        let observed = simulator.observed.take();
        let spec = OperationSpec::new(simulator)
            .with_kind("simulator")
            .with_randomness();
        match observed {
            Some(observed) => spec.with_observed(observed),
            None => spec.inherit_observed(),
        }
    }
}
