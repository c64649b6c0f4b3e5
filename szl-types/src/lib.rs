//! Value model and type descriptors shared by the Sawzall table runtime.
//!
//! Output values are tagged [`TypedValue`]s described by an [`SzlType`].
//! [`ValueOps`] provides the positional leaf operations (add, compare,
//! assign-at-position) the aggregation kernels are built on.

mod kind;
mod ops;
mod szl_type;
mod value;

pub use kind::Kind;
pub use ops::{ValueError, ValueOps, WeightOrd};
pub use szl_type::{SzlField, SzlType, TableProperties};
pub use value::{TypedValue, Weight};
