//! Aggregation kernels, one module per table kind.
//!
//! Each kernel is a [`crate::TableWriter`] that validates its table type
//! and a [`crate::TableEntry`] holding per-key state. Elements arrive and
//! leave in their canonical encodings; only sums and weights are ever
//! materialized as values.

mod bootstrap_sum;
mod collection;
mod distinct_sample;
mod maximum;
mod sample;
mod set;
mod sum;
mod top;
mod unique;
mod weighted_sample;

pub use bootstrap_sum::BootstrapSumWriter;
pub use collection::CollectionWriter;
pub use distinct_sample::DistinctSampleWriter;
pub use maximum::MaximumWriter;
pub use sample::SampleWriter;
pub use set::SetWriter;
pub use sum::SumWriter;
pub use top::TopWriter;
pub use unique::UniqueWriter;
pub use weighted_sample::WeightedSampleWriter;

use szl_codec::Decoder;
use szl_types::{TypedValue, ValueOps};

use crate::entry::MergeError;

/// The weight of an unweighted add: 1 in every leaf of the weight type.
pub(crate) fn unit_weight(ops: &ValueOps) -> TypedValue {
    let mut w = ops.zero();
    fill_units(&mut w);
    w
}

fn fill_units(v: &mut TypedValue) {
    match v {
        TypedValue::Int(i) => *i = 1,
        TypedValue::Uint(u) => *u = 1,
        TypedValue::Float(f) => *f = 1.0,
        TypedValue::Tuple(fields) => fields.iter_mut().for_each(fill_units),
        _ => {}
    }
}

/// Every flush payload opens with `(extra, n)`.
pub(crate) fn merge_header(dec: &mut Decoder<'_>) -> Result<(i64, i64), MergeError> {
    let extra = dec.get_int()?;
    let nvals = dec.get_int()?;
    Ok((extra, nvals))
}
