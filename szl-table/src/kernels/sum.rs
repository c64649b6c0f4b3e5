use szl_codec::{Decoder, Encoder, ValueCodec};
use szl_types::{SzlType, TypedValue, ValueOps};

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::kernels::merge_header;

/// `table sum of T`: the component-wise sum of everything added.
#[derive(Debug)]
pub struct SumWriter {
    core: WriterCore,
}

impl SumWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        let element = ty
            .element()
            .ok_or_else(|| TableError::InvalidType("sum table without an element".into()))?;
        if !ValueOps::is_addable(element.ty()) {
            return Err(TableError::InvalidType(format!(
                "can't add elements of type {}",
                element.ty().kind()
            )));
        }
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
        }))
    }
}

impl TableWriter for SumWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        Box::new(SumEntry::new(self.core.element_ops.clone()))
    }
}

#[derive(Debug)]
struct SumEntry {
    ops: ValueOps,
    sum: TypedValue,
    tot_elems: i64,
}

impl SumEntry {
    fn new(ops: ValueOps) -> Self {
        let sum = ops.zero();
        Self {
            ops,
            sum,
            tot_elems: 0,
        }
    }
}

impl TableEntry for SumEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        let mut dec = Decoder::new(elem);
        let v = self.ops.decode_value(&mut dec)?;
        self.tot_elems += 1;
        let before = self.ops.memory(&self.sum);
        self.ops.add(&v, &mut self.sum)?;
        Ok(self.ops.memory(&self.sum) as isize - before as isize)
    }

    fn flush(&mut self) -> Vec<u8> {
        if self.tot_elems == 0 {
            return Vec::new();
        }
        let mut enc = Encoder::new();
        enc.put_int(self.tot_elems);
        if self.ops.encode_value(&self.sum, &mut enc).is_err() {
            return Vec::new();
        }
        self.clear();
        enc.take()
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        if self.tot_elems == 0 {
            return vec![Vec::new()];
        }
        let mut enc = Encoder::new();
        if self.ops.encode_value(&self.sum, &mut enc).is_err() {
            return Vec::new();
        }
        vec![enc.take()]
    }

    fn merge(&mut self, val: &[u8]) -> MergeResult {
        if val.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(val);
        let extra = dec.get_int()?;
        if extra <= 0 {
            return Err(MergeError::Shape("non-positive element count"));
        }
        let sum = self.ops.decode_value(&mut dec)?;
        if !dec.done() {
            return Err(MergeError::Shape("trailing bytes after sum"));
        }
        self.ops.add(&sum, &mut self.sum)?;
        self.tot_elems += extra;
        Ok(())
    }

    fn clear(&mut self) {
        self.tot_elems = 0;
        self.sum = self.ops.zero();
    }

    fn memory(&self) -> usize {
        core::mem::size_of::<Self>() + self.ops.memory(&self.sum)
    }

    fn tuple_count(&self) -> usize {
        1
    }

    fn tot_elems(&self) -> i64 {
        self.tot_elems
    }
}
