//! The Sawzall output-table runtime: aggregation kernels, the sketch and
//! heap structures they are built on, and the emit driver that routes
//! encoded records to per-key kernel state.
//!
//! A record enters through an [`Emitter`], lands in a [`TableEntry`]
//! keyed by its encoded indices, and leaves as a flushed byte string
//! another entry of the same shape can [`TableEntry::merge`] — the
//! deterministic, associative protocol that makes map-reduce reassembly
//! well defined.

mod emitter;
mod entry;
mod hash;
mod heap;
pub mod kernels;
mod registry;
mod sketch;
mod topheap;

pub use emitter::{EmitSink, Emitter, GroupKind, MemorySink, PrintSink};
pub use entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
pub use hash::fingerprint64;
pub use heap::{BoundedHeap, HeapItem};
pub use registry::{Registry, TableKind, WriterCreator};
pub use sketch::{dims, Sketch, SketchDims, SketchIndex, MAX_TABS, MIN_TABS};
pub use topheap::TopHeap;
