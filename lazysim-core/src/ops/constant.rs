use crate::array::Array;
use crate::error::Result;
use crate::operation::{InputRecord, OperationSpec, OutputRecord, Transform};

/// A fixed value, repeated for every sample. Its observed value is the
/// value itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    value: Array,
}

impl Constant {
    pub fn new(value: impl Into<Array>) -> Self {
        Self {
            value: value.into().normalize(1),
        }
    }

    /// The value as a single-row batch.
    pub fn value(&self) -> &Array {
        &self.value
    }
}

impl Transform for Constant {
    fn apply(&self, input: &InputRecord) -> Result<OutputRecord> {
        Ok(self.value.tile_rows(input.n).into())
    }
}

impl From<Constant> for OperationSpec {
    fn from(constant: Constant) -> Self {
        let observed = constant.value.clone();
        OperationSpec::new(constant)
            .with_kind("constant")
            .with_observed(observed)
    }
}
