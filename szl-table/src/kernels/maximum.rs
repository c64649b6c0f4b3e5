use szl_codec::{Decoder, Encoder, ValueCodec};
use szl_types::{Kind, SzlType, TypedValue, ValueOps, WeightOrd};

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::heap::BoundedHeap;
use crate::kernels::{merge_header, unit_weight};

/// `table maximum(N) of T weight W` and `table minimum(N)`: the N
/// elements with the best weights, for any ordered weight type.
#[derive(Debug)]
pub struct MaximumWriter {
    core: WriterCore,
    ord: WeightOrd,
}

impl MaximumWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        let weight = ty
            .weight()
            .ok_or_else(|| TableError::InvalidType("maximum/minimum without weight".into()))?;
        if !ValueOps::is_ordered(weight.ty()) {
            return Err(TableError::InvalidType("can't compare weights".into()));
        }
        let ord = if ty.table_kind() == Some("minimum") {
            WeightOrd::KeepSmallest
        } else {
            WeightOrd::KeepBiggest
        };
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
            ord,
        }))
    }
}

impl TableWriter for MaximumWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        Box::new(MaximumEntry {
            ops: self.core.weight_ops.clone(),
            heap: BoundedHeap::new(
                self.core.weight_ops.clone(),
                self.ord,
                self.core.param.max(0) as usize,
            ),
            tot_elems: 0,
        })
    }
}

#[derive(Debug)]
struct MaximumEntry {
    ops: ValueOps,
    heap: BoundedHeap,
    tot_elems: i64,
}

impl TableEntry for MaximumEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        let one = unit_weight(&self.ops);
        self.add_weighted(elem, &one)
    }

    fn add_weighted(&mut self, elem: &[u8], weight: &TypedValue) -> Result<isize, TableError> {
        self.tot_elems += 1;
        Ok(self.heap.add(elem, weight))
    }

    fn flush(&mut self) -> Vec<u8> {
        if self.heap.is_empty() {
            return Vec::new();
        }
        let mut enc = Encoder::new();
        enc.put_int(self.tot_elems - self.heap.len() as i64);
        enc.put_int(self.heap.len() as i64);
        self.heap.sort();
        for item in self.heap.items() {
            enc.put_bytes(&item.value);
            if self.ops.encode_value(&item.weight, &mut enc).is_err() {
                return Vec::new();
            }
        }
        self.clear();
        enc.take()
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        if self.heap.is_empty() {
            return vec![Vec::new()];
        }
        self.heap.sort();
        let rows = self
            .heap
            .items()
            .iter()
            .map(|item| {
                let mut enc = Encoder::new();
                let _ = self.ops.encode_value(&item.weight, &mut enc);
                let mut row = item.value.clone();
                row.extend_from_slice(enc.data());
                row
            })
            .collect();
        self.heap.reheap();
        rows
    }

    fn merge(&mut self, val: &[u8]) -> MergeResult {
        if val.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(val);
        let (extra, nvals) = merge_header(&mut dec)?;

        let max = self.heap.max_elems() as i64;
        if nvals > max || (nvals < max && extra != 0) {
            return Err(MergeError::Shape("partial is under-full"));
        }

        for _ in 0..nvals {
            dec.skip(Kind::Bytes)?;
            self.ops.skip_value(&mut dec)?;
        }
        if !dec.done() {
            return Err(MergeError::Shape("trailing bytes after elements"));
        }

        dec.restart();
        dec.skip(Kind::Int)?;
        dec.skip(Kind::Int)?;
        for _ in 0..nvals {
            let elem = dec.get_bytes()?;
            let weight = self.ops.decode_value(&mut dec)?;
            self.add_weighted(&elem, &weight)
                .map_err(|_| MergeError::Shape("element add failed"))?;
        }
        self.tot_elems += extra;
        Ok(())
    }

    fn clear(&mut self) {
        self.tot_elems = 0;
        self.heap.clear();
    }

    fn memory(&self) -> usize {
        core::mem::size_of::<Self>() + self.heap.memory()
    }

    fn tuple_count(&self) -> usize {
        self.heap.len()
    }

    fn tot_elems(&self) -> i64 {
        self.tot_elems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(kind: &str, n: i64, weight: SzlType) -> Box<dyn TableWriter> {
        let mut ty = SzlType::table(kind);
        ty.set_element("", SzlType::string())
            .set_weight("", weight)
            .set_param(n);
        MaximumWriter::create(&ty).unwrap()
    }

    fn encoded(s: &str) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_string(s).unwrap();
        enc.take()
    }

    #[test]
    fn maximum_keeps_heaviest_sorted_best_first() {
        let w = writer("maximum", 2, SzlType::int());
        let mut entry = w.create_entry(b"");
        for (s, wgt) in [("x", 5i64), ("y", 3), ("z", 7)] {
            entry.add_weighted(&encoded(s), &TypedValue::Int(wgt)).unwrap();
        }

        let out = entry.flush();
        let mut dec = Decoder::new(&out);
        assert_eq!(dec.get_int().unwrap(), 1);
        assert_eq!(dec.get_int().unwrap(), 2);
        let first = dec.get_bytes().unwrap();
        assert_eq!(dec.get_int().unwrap(), 7);
        let second = dec.get_bytes().unwrap();
        assert_eq!(dec.get_int().unwrap(), 5);
        assert_eq!(first, encoded("z"));
        assert_eq!(second, encoded("x"));
        assert!(dec.done());
    }

    #[test]
    fn minimum_keeps_lightest() {
        let w = writer("minimum", 2, SzlType::int());
        let mut entry = w.create_entry(b"");
        for (s, wgt) in [("x", 5i64), ("y", 3), ("z", 7)] {
            entry.add_weighted(&encoded(s), &TypedValue::Int(wgt)).unwrap();
        }
        let out = entry.flush();
        let mut dec = Decoder::new(&out);
        dec.skip(Kind::Int).unwrap();
        dec.skip(Kind::Int).unwrap();
        assert_eq!(dec.get_bytes().unwrap(), encoded("y"));
        assert_eq!(dec.get_int().unwrap(), 3);
    }

    #[test]
    fn string_weights_are_ordered() {
        let w = writer("maximum", 1, SzlType::string());
        let mut entry = w.create_entry(b"");
        for (s, wgt) in [("a", "apple"), ("b", "pear"), ("c", "fig")] {
            entry
                .add_weighted(&encoded(s), &TypedValue::Str(wgt.into()))
                .unwrap();
        }
        let rows = entry.flush_display();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with(encoded("b").as_slice()));
    }

    #[test]
    fn display_does_not_reset() {
        let w = writer("maximum", 4, SzlType::int());
        let mut entry = w.create_entry(b"");
        entry
            .add_weighted(&encoded("x"), &TypedValue::Int(1))
            .unwrap();
        let _ = entry.flush_display();
        assert_eq!(entry.tot_elems(), 1);
        assert_eq!(entry.tuple_count(), 1);
        // The heap still accepts adds after the display pass.
        entry
            .add_weighted(&encoded("y"), &TypedValue::Int(2))
            .unwrap();
        assert_eq!(entry.tuple_count(), 2);
    }

    #[test]
    fn merge_round_trips() {
        let w = writer("maximum", 3, SzlType::int());
        let mut a = w.create_entry(b"");
        let mut b = w.create_entry(b"");
        a.add_weighted(&encoded("a"), &TypedValue::Int(10)).unwrap();
        b.add_weighted(&encoded("b"), &TypedValue::Int(20)).unwrap();
        b.add_weighted(&encoded("c"), &TypedValue::Int(5)).unwrap();

        let flushed = b.flush();
        a.merge(&flushed).unwrap();
        assert_eq!(a.tot_elems(), 3);

        let out = a.flush();
        let mut dec = Decoder::new(&out);
        dec.skip(Kind::Int).unwrap();
        assert_eq!(dec.get_int().unwrap(), 3);
        assert_eq!(dec.get_bytes().unwrap(), encoded("b"));
    }
}
