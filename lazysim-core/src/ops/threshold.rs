use crate::array::Array;
use crate::error::{Error, Result};
use crate::operation::{InputRecord, OperationSpec, OutputRecord, Transform};

/// Accepts samples whose value lies strictly below a cutoff.
///
/// Reads the first column of its single parent and yields 1.0 for accepted
/// samples, 0.0 otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    cutoff: f64,
}

impl Threshold {
    pub fn new(cutoff: f64) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }
}

impl Transform for Threshold {
    fn apply(&self, input: &InputRecord) -> Result<OutputRecord> {
        let batch = input.data.first().ok_or_else(|| Error::Arity {
            node: "threshold".into(),
            expected: 1,
            actual: 0,
        })?;
        let width = match batch.nrows() {
            0 => 1,
            rows => (batch.values().len() / rows).max(1),
        };
        let accepted = batch
            .values()
            .chunks(width)
            .map(|row| if row[0] < self.cutoff { 1.0 } else { 0.0 })
            .collect();
        Ok(Array::column(accepted).into())
    }
}

impl From<Threshold> for OperationSpec {
    fn from(threshold: Threshold) -> Self {
        OperationSpec::new(threshold)
            .with_kind("threshold")
            .with_arity(1)
            .with_columns(1)
    }
}
