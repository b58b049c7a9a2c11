use super::per_row;
use crate::array::Array;
use crate::error::Result;
use crate::operation::{InputRecord, OperationSpec, OutputRecord, Transform};

type SummaryFn = dyn Fn(&[Array]) -> Array + Send + Sync;

/// A summary statistic computed from the parents' samples.
pub struct Summary {
    f: Box<SummaryFn>,
    sequential: bool,
    observed: Option<Array>,
}

impl Summary {
    /// `f(parents)` summarizes a whole batch.
    pub fn batched(f: impl Fn(&[Array]) -> Array + Send + Sync + 'static) -> Self {
        Self {
            f: Box::new(f),
            sequential: false,
            observed: None,
        }
    }

    /// `f(parent_rows)` summarizes one sample.
    pub fn sequential(f: impl Fn(&[Array]) -> Array + Send + Sync + 'static) -> Self {
        Self {
            sequential: true,
            ..Self::batched(f)
        }
    }

    pub fn with_observed(mut self, observed: impl Into<Array>) -> Self {
        self.observed = Some(observed.into());
        self
    }
}

impl Transform for Summary {
    fn apply(&self, input: &InputRecord) -> Result<OutputRecord> {
        let data = if self.sequential {
            per_row(&input.data, input.n, |row| Ok((self.f)(row)))?
        } else {
            (self.f)(&input.data)
        };
        Ok(data.into())
    }
}

impl From<Summary> for OperationSpec {
    fn from(mut summary: Summary) -> Self {
        let observed = summary.observed.take();
        let spec = OperationSpec::new(summary).with_kind("summary");
        match observed {
            Some(observed) => spec.with_observed(observed),
            None => spec.inherit_observed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(data: Vec<Array>, n: usize) -> InputRecord {
        InputRecord {
            data,
            n,
            index: 0,
            random_state: None,
            observed: None,
        }
    }

    #[test]
    fn sequential_mean_of_each_row() {
        let summary = Summary::sequential(|row| {
            let values = row[0].values();
            Array::vector(vec![values.iter().sum::<f64>() / values.len() as f64])
        });
        let batch = Array::from_rows(vec![vec![1.0, 3.0], vec![2.0, 6.0]]).unwrap();
        let out = summary.apply(&record(vec![batch], 2)).unwrap().data;
        assert_eq!(out.shape(), &[2, 1]);
        assert_eq!(out.values(), &[2.0, 4.0]);
    }

    #[test]
    fn batched_sees_the_whole_batch() {
        let summary = Summary::batched(|data| data[0].map(|v| v * v));
        let out = summary
            .apply(&record(vec![Array::column(vec![2.0, 3.0])], 2))
            .unwrap()
            .data;
        assert_eq!(out.values(), &[4.0, 9.0]);
    }
}
