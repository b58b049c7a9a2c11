//! Leaf Operation Kinds
//!
//! Ready-made transforms for the usual steps of a simulator model. Each
//! kind converts into an [`OperationSpec`](crate::operation::OperationSpec)
//! with the capabilities it needs, so it can be passed straight to
//! [`Graph::add_operation`](crate::graph::Graph::add_operation):
//!
//! | kind            | randomness | observed              | output          |
//! |-----------------|------------|-----------------------|-----------------|
//! | [`Constant`]    | no         | its value             | value per row   |
//! | [`Simulator`]   | yes        | given or inherited    | `(n, ...)`      |
//! | [`Summary`]     | no         | given or inherited    | `(n, ...)`      |
//! | [`Discrepancy`] | no         | reads parents'        | `(n, 1)`        |
//! | [`Threshold`]   | no         | none                  | `(n, 1)` of 0/1 |
//!
//! Simulators, summaries and discrepancies accept either a batched function
//! or a sequential one that is run once per sample.

mod constant;
mod discrepancy;
mod simulator;
mod summary;
mod threshold;

use crate::array::Array;
use crate::error::Result;

pub use constant::Constant;
pub use discrepancy::Discrepancy;
pub use simulator::Simulator;
pub use summary::Summary;
pub use threshold::Threshold;

/// Run `f` on the `i`-th sample of every batch for `i in 0..n` and stack
/// the results along a new leading axis.
pub(crate) fn per_row(
    data: &[Array],
    n: usize,
    mut f: impl FnMut(&[Array]) -> Result<Array>,
) -> Result<Array> {
    let mut outputs = Vec::with_capacity(n);
    for i in 0..n {
        let row = data
            .iter()
            .map(|batch| batch.row(i))
            .collect::<Result<Vec<_>>>()?;
        outputs.push(f(&row)?);
    }
    Array::stack(&outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_row_stacks_outputs() {
        let a = Array::column(vec![1.0, 2.0]);
        let b = Array::column(vec![10.0, 20.0]);
        let out = per_row(&[a, b], 2, |row| {
            Ok(Array::vector(vec![row[0].values()[0] + row[1].values()[0]]))
        })
        .unwrap();
        assert_eq!(out.shape(), &[2, 1]);
        assert_eq!(out.values(), &[11.0, 22.0]);
    }

    #[test]
    fn per_row_fails_on_short_batch() {
        let a = Array::column(vec![1.0]);
        assert!(per_row(&[a], 2, |row| Ok(row[0].clone())).is_err());
    }
}
