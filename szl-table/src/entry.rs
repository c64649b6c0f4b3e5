use szl_codec::CodecError;
use szl_types::{SzlType, TypedValue, ValueError, ValueOps};
use thiserror::Error;

/// Failures from table creation and element additions.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("invalid table type: {0}")]
    InvalidType(String),
    #[error("unknown table kind: {0}")]
    UnknownKind(String),
    #[error("table kind does not support {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// A failed merge. The receiving entry's state is undefined afterwards;
/// there is no rollback, and the caller is expected to discard the entry.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merge decode failed: {0}")]
    Decode(#[from] CodecError),
    #[error("merged state has incompatible shape: {0}")]
    Shape(&'static str),
}

impl From<ValueError> for MergeError {
    fn from(_: ValueError) -> Self {
        MergeError::Shape("value shape mismatch")
    }
}

pub type MergeResult = Result<(), MergeError>;

/// One per-unique-key instance of an aggregation kernel.
///
/// `add`/`add_weighted` return the signed change in estimated memory use so
/// the driver can keep an approximate running total. `flush` serializes
/// enough state for a peer of the same shape to `merge`, then resets the
/// entry; `flush_display` produces UI rows and does not reset.
pub trait TableEntry {
    fn add(&mut self, _elem: &[u8]) -> Result<isize, TableError> {
        Err(TableError::Unsupported("add"))
    }

    fn add_weighted(&mut self, _elem: &[u8], _weight: &TypedValue) -> Result<isize, TableError> {
        Err(TableError::Unsupported("add_weighted"))
    }

    fn flush(&mut self) -> Vec<u8> {
        Vec::new()
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn merge(&mut self, _val: &[u8]) -> MergeResult {
        Err(MergeError::Shape("table kind does not merge"))
    }

    fn clear(&mut self) {}

    /// Estimated bytes currently in use.
    fn memory(&self) -> usize;

    /// Rows the next `flush_display` will produce.
    fn tuple_count(&self) -> usize {
        0
    }

    /// Count of all additions ever, including dropped or aggregated-away
    /// elements.
    fn tot_elems(&self) -> i64 {
        0
    }
}

/// Common writer state shared by every kernel's writer.
#[derive(Debug)]
pub struct WriterCore {
    pub param: i64,
    pub has_indices: bool,
    pub has_weight: bool,
    pub aggregates: bool,
    pub filters: bool,
    pub element_ops: ValueOps,
    pub weight_ops: ValueOps,
}

impl WriterCore {
    pub fn new(ty: &SzlType, aggregates: bool, filters: bool) -> Self {
        let element_ty = ty
            .element()
            .map(|e| e.ty().clone())
            .unwrap_or_else(SzlType::int);
        let weight_ty = ty
            .weight()
            .map(|w| w.ty().clone())
            .unwrap_or_else(SzlType::int);
        Self {
            param: ty.param(),
            has_indices: !ty.indices().is_empty(),
            has_weight: ty.has_weight(),
            aggregates,
            filters,
            element_ops: ValueOps::new(&element_ty),
            weight_ops: ValueOps::new(&weight_ty),
        }
    }
}

/// Per-table factory for entries, carrying the validated type information.
pub trait TableWriter {
    fn core(&self) -> &WriterCore;

    /// Build a fresh entry for the given encoded index.
    fn create_entry(&self, index: &[u8]) -> Box<dyn TableEntry>;

    /// Reseed the kernel's randomness, so retried shards are repeatable.
    /// A no-op for deterministic kernels.
    fn set_random_seed(&mut self, _seed: &str) {}

    fn param(&self) -> i64 {
        self.core().param
    }

    fn has_indices(&self) -> bool {
        self.core().has_indices
    }

    fn has_weight(&self) -> bool {
        self.core().has_weight
    }

    fn aggregates(&self) -> bool {
        self.core().aggregates
    }

    fn filters(&self) -> bool {
        self.core().filters
    }

    fn element_ops(&self) -> &ValueOps {
        &self.core().element_ops
    }

    fn weight_ops(&self) -> &ValueOps {
        &self.core().weight_ops
    }
}
