use rand::rngs::StdRng;
use rand::Rng;

use szl_codec::{Decoder, Encoder};
use szl_types::{SzlType, TypedValue, ValueOps, WeightOrd};

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::hash::rng_from_seed;
use crate::heap::BoundedHeap;
use crate::kernels::merge_header;

/// `table sample(N) of T`: uniform sample without replacement. Every
/// element gets a fresh random tag and the heap keeps the N smallest tags.
#[derive(Debug)]
pub struct SampleWriter {
    core: WriterCore,
    seed: Option<String>,
}

impl SampleWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
            seed: None,
        }))
    }
}

impl TableWriter for SampleWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        Box::new(SampleEntry {
            heap: BoundedHeap::new(
                ValueOps::new(&SzlType::int()),
                WeightOrd::KeepSmallest,
                self.core.param.max(0) as usize,
            ),
            rng: rng_from_seed(self.seed.as_deref()),
            tot_elems: 0,
        })
    }

    fn set_random_seed(&mut self, seed: &str) {
        self.seed = Some(seed.to_owned());
    }
}

#[derive(Debug)]
struct SampleEntry {
    heap: BoundedHeap,
    rng: StdRng,
    tot_elems: i64,
}

impl TableEntry for SampleEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        self.tot_elems += 1;
        let tag = TypedValue::Int(self.rng.gen());
        Ok(self.heap.add(elem, &tag))
    }

    fn flush(&mut self) -> Vec<u8> {
        if self.heap.is_empty() {
            return Vec::new();
        }
        let mut enc = Encoder::new();
        enc.put_int(self.tot_elems - self.heap.len() as i64);
        enc.put_int(self.heap.len() as i64);
        for item in self.heap.items() {
            enc.put_bytes(&item.value);
        }
        self.clear();
        enc.take()
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        if self.heap.is_empty() {
            return vec![Vec::new()];
        }
        self.heap.items().iter().map(|e| e.value.clone()).collect()
    }

    fn merge(&mut self, val: &[u8]) -> MergeResult {
        if val.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(val);
        let (extra, nvals) = merge_header(&mut dec)?;

        // An under-full partial with dropped elements cannot be resampled
        // without bias.
        let max = self.heap.max_elems() as i64;
        if nvals > max || (nvals < max && extra != 0) {
            return Err(MergeError::Shape("sample partial is under-full"));
        }

        for _ in 0..nvals {
            dec.skip(szl_types::Kind::Bytes)?;
        }
        if !dec.done() {
            return Err(MergeError::Shape("trailing bytes after sample"));
        }

        // The payload is well-formed; resample its elements.
        dec.restart();
        dec.skip(szl_types::Kind::Int)?;
        dec.skip(szl_types::Kind::Int)?;
        for _ in 0..nvals {
            let elem = dec.get_bytes()?;
            self.add(&elem)
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

    fn writer(n: i64, seed: &str) -> Box<dyn TableWriter> {
        let mut ty = SzlType::table("sample");
        ty.set_element("", SzlType::string()).set_param(n);
        let mut w = SampleWriter::create(&ty).unwrap();
        w.set_random_seed(seed);
        w
    }

    fn encoded(s: &str) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_string(s).unwrap();
        enc.take()
    }

    #[test]
    fn keeps_at_most_n_elements() {
        let w = writer(5, "seed");
        let mut entry = w.create_entry(b"");
        for i in 0..100 {
            entry.add(&encoded(&format!("e{i}"))).unwrap();
        }
        assert_eq!(entry.tuple_count(), 5);
        assert_eq!(entry.tot_elems(), 100);

        let out = entry.flush();
        let mut dec = Decoder::new(&out);
        assert_eq!(dec.get_int().unwrap(), 95);
        assert_eq!(dec.get_int().unwrap(), 5);
        for _ in 0..5 {
            dec.get_bytes().unwrap();
        }
        assert!(dec.done());
    }

    #[test]
    fn merge_accepts_full_or_exact_partials() {
        let w = writer(4, "seed");

        // Full partial (extra > 0) merges.
        let mut full = w.create_entry(b"");
        for i in 0..10 {
            full.add(&encoded(&format!("f{i}"))).unwrap();
        }
        let full_flush = full.flush();
        let mut dst = w.create_entry(b"");
        dst.merge(&full_flush).unwrap();
        assert_eq!(dst.tot_elems(), 10);

        // Under-full partial with extra == 0 merges.
        let mut small = w.create_entry(b"");
        small.add(&encoded("only")).unwrap();
        let small_flush = small.flush();
        let mut dst2 = w.create_entry(b"");
        dst2.merge(&small_flush).unwrap();
        assert_eq!(dst2.tot_elems(), 1);
    }

    #[test]
    fn merge_rejects_biased_partials() {
        let w = writer(4, "seed");
        let mut dst = w.create_entry(b"");
        // Claims 2 kept out of 7 with capacity 4: under-full but dropped.
        let mut enc = Encoder::new();
        enc.put_int(5);
        enc.put_int(2);
        enc.put_bytes(b"a");
        enc.put_bytes(b"b");
        assert!(dst.merge(&enc.take()).is_err());
    }

    #[test]
    fn seeded_samples_are_reproducible() {
        let run = || {
            let w = writer(3, "fixed");
            let mut entry = w.create_entry(b"");
            for i in 0..50 {
                entry.add(&encoded(&format!("e{i}"))).unwrap();
            }
            entry.flush()
        };
        assert_eq!(run(), run());
    }
}
