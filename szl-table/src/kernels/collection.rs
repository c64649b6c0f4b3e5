use szl_types::SzlType;

use crate::entry::{TableEntry, TableError, TableWriter, WriterCore};

/// `table collection of T`: a pass-through. Records do not aggregate; the
/// emit driver writes them straight out, and this kernel exists only so
/// the registry can produce a type-valid entry.
#[derive(Debug)]
pub struct CollectionWriter {
    core: WriterCore,
}

impl CollectionWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        Ok(Box::new(Self {
            core: WriterCore::new(ty, false, false),
        }))
    }
}

impl TableWriter for CollectionWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        Box::new(CollectionEntry)
    }
}

#[derive(Debug)]
struct CollectionEntry;

impl TableEntry for CollectionEntry {
    fn memory(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}
