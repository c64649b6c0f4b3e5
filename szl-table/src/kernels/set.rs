use std::collections::BTreeSet;

use szl_codec::{Decoder, Encoder, ValueCodec};
use szl_types::{SzlType, ValueOps};

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::kernels::merge_header;

/// `table set(N) of T`: up to N distinct elements, in encoded order.
/// One element past capacity marks the set overflowed; an overflowed set
/// flushes as empty and displays nothing.
#[derive(Debug)]
pub struct SetWriter {
    core: WriterCore,
}

impl SetWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
        }))
    }
}

impl TableWriter for SetWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        Box::new(SetEntry {
            ops: self.core.element_ops.clone(),
            set: BTreeSet::new(),
            max_elems: self.core.param.max(0) as usize,
            tot_elems: 0,
        })
    }
}

// Rough per-node bookkeeping, matching the accounting the driver expects.
const NODE_SIZE: usize = 4 * core::mem::size_of::<usize>() + core::mem::size_of::<Vec<u8>>();

#[derive(Debug)]
struct SetEntry {
    ops: ValueOps,
    set: BTreeSet<Vec<u8>>,
    max_elems: usize,
    tot_elems: i64,
}

impl TableEntry for SetEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        self.tot_elems += 1;
        // Once overflowed, nothing further is stored.
        if self.set.len() > self.max_elems {
            return Ok(0);
        }
        if self.set.insert(elem.to_vec()) {
            Ok((NODE_SIZE + elem.len()) as isize)
        } else {
            Ok(0)
        }
    }

    fn flush(&mut self) -> Vec<u8> {
        if self.set.len() > self.max_elems || self.set.is_empty() {
            return Vec::new();
        }
        let mut enc = Encoder::new();
        enc.put_int(self.tot_elems - self.set.len() as i64);
        enc.put_int(self.set.len() as i64);
        let mut out = enc.take();
        for elem in &self.set {
            // Entries are already encoded; no wrapping or delimiting.
            out.extend_from_slice(elem);
        }
        self.clear();
        out
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        if self.set.len() > self.max_elems {
            return Vec::new();
        }
        if self.set.is_empty() {
            return vec![Vec::new()];
        }
        self.set.iter().cloned().collect()
    }

    fn merge(&mut self, val: &[u8]) -> MergeResult {
        if val.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(val);
        let (extra, nvals) = merge_header(&mut dec)?;
        for _ in 0..nvals {
            let start = dec.position();
            self.ops.skip_value(&mut dec)?;
            let encoded = &val[start..dec.position()];
            self.add(encoded)
                .map_err(|_| MergeError::Shape("element add failed"))?;
        }
        self.tot_elems += extra;
        Ok(())
    }

    fn clear(&mut self) {
        self.tot_elems = 0;
        self.set.clear();
    }

    fn memory(&self) -> usize {
        core::mem::size_of::<Self>()
            + (1 + self.set.len()) * NODE_SIZE
            + self.set.iter().map(Vec::len).sum::<usize>()
    }

    fn tuple_count(&self) -> usize {
        self.set.len()
    }

    fn tot_elems(&self) -> i64 {
        self.tot_elems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(n: i64) -> Box<dyn TableWriter> {
        let mut ty = SzlType::table("set");
        ty.set_element("", SzlType::string()).set_param(n);
        SetWriter::create(&ty).unwrap()
    }

    fn encoded(s: &str) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_string(s).unwrap();
        enc.take()
    }

    #[test]
    fn keeps_distinct_elements() {
        let w = writer(3);
        let mut entry = w.create_entry(b"");
        for s in ["a", "b", "a", "c"] {
            entry.add(&encoded(s)).unwrap();
        }
        assert_eq!(entry.tuple_count(), 3);
        assert_eq!(entry.tot_elems(), 4);

        let out = entry.flush();
        let mut dec = Decoder::new(&out);
        assert_eq!(dec.get_int().unwrap(), 1); // 4 adds, 3 kept
        assert_eq!(dec.get_int().unwrap(), 3);
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(dec.get_string().unwrap());
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert!(dec.done());
    }

    #[test]
    fn overflow_flushes_empty() {
        let w = writer(3);
        let mut entry = w.create_entry(b"");
        for s in ["a", "b", "c", "d"] {
            entry.add(&encoded(s)).unwrap();
        }
        assert!(entry.flush().is_empty());
        assert!(entry.flush_display().is_empty());
    }

    #[test]
    fn merge_combines_and_may_overflow() {
        let w = writer(2);
        let mut a = w.create_entry(b"");
        let mut b = w.create_entry(b"");
        a.add(&encoded("x")).unwrap();
        b.add(&encoded("y")).unwrap();
        b.add(&encoded("z")).unwrap();

        let flushed = b.flush();
        a.merge(&flushed).unwrap();
        // x, y, z in a set(2): overflowed.
        assert!(a.flush().is_empty());
    }

    #[test]
    fn merge_rejects_truncated_payload() {
        let w = writer(4);
        let mut entry = w.create_entry(b"");
        let mut enc = Encoder::new();
        enc.put_int(0);
        enc.put_int(2);
        enc.put_string("only-one").unwrap();
        assert!(entry.merge(&enc.take()).is_err());
    }
}
