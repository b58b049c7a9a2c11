use crate::array::Array;
use crate::error::{Error, Result};
use crate::operation::{InputRecord, OperationSpec, OutputRecord, Transform};

type BatchedFn = dyn Fn(&[Array], &[Array]) -> Array + Send + Sync;
type SequentialFn = dyn Fn(&[Array], &[Array]) -> f64 + Send + Sync;

enum Mode {
    Batched(Box<BatchedFn>),
    Sequential(Box<SequentialFn>),
}

/// Distance between simulated samples and the observed data.
///
/// The transform receives the parents' batches together with the parents'
/// observed values and yields one distance per sample, as a `(n, 1)` column.
pub struct Discrepancy {
    mode: Mode,
}

impl Discrepancy {
    /// `f(parents, observed)` returns a `(n, 1)` column for the batch.
    pub fn batched(f: impl Fn(&[Array], &[Array]) -> Array + Send + Sync + 'static) -> Self {
        Self {
            mode: Mode::Batched(Box::new(f)),
        }
    }

    /// `f(parent_rows, observed_rows)` returns the distance of one sample.
    pub fn sequential(f: impl Fn(&[Array], &[Array]) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            mode: Mode::Sequential(Box::new(f)),
        }
    }
}

impl Transform for Discrepancy {
    fn apply(&self, input: &InputRecord) -> Result<OutputRecord> {
        let observed = input
            .observed
            .as_deref()
            .ok_or_else(|| Error::MissingObserved("discrepancy input".into()))?;

        let data = match &self.mode {
            Mode::Batched(f) => f(&input.data, observed),
            Mode::Sequential(f) => {
                let observed_rows = observed
                    .iter()
                    .map(|o| o.row(0))
                    .collect::<Result<Vec<_>>>()?;
                let mut distances = Vec::with_capacity(input.n);
                for i in 0..input.n {
                    let rows = input
                        .data
                        .iter()
                        .map(|batch| batch.row(i))
                        .collect::<Result<Vec<_>>>()?;
                    distances.push(f(&rows, &observed_rows));
                }
                Array::column(distances)
            }
        };
        Ok(data.into())
    }
}

impl From<Discrepancy> for OperationSpec {
    fn from(discrepancy: Discrepancy) -> Self {
        OperationSpec::new(discrepancy)
            .with_kind("discrepancy")
            .with_observed_inputs()
            .with_columns(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(data: Vec<Array>, observed: Option<Vec<Array>>) -> InputRecord {
        InputRecord {
            n: data[0].nrows(),
            data,
            index: 0,
            random_state: None,
            observed,
        }
    }

    #[test]
    fn sequential_compares_each_row_to_observed() {
        let distance = Discrepancy::sequential(|rows, observed| {
            (rows[0].values()[0] - observed[0].values()[0]).abs()
        });
        let input = record(
            vec![Array::column(vec![1.0, -2.0, 5.0])],
            Some(vec![Array::column(vec![1.0])]),
        );
        let out = distance.apply(&input).unwrap().data;
        assert_eq!(out.shape(), &[3, 1]);
        assert_eq!(out.values(), &[0.0, 3.0, 4.0]);
    }

    #[test]
    fn requires_observed_inputs() {
        let distance = Discrepancy::batched(|data, _| data[0].clone());
        let input = record(vec![Array::column(vec![1.0])], None);
        assert!(matches!(distance.apply(&input), Err(Error::MissingObserved(_))));
    }
}
