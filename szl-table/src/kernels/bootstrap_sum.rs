use rand::rngs::StdRng;
use rand::Rng;

use szl_codec::{Decoder, Encoder, ValueCodec};
use szl_types::{SzlType, TypedValue, ValueOps};

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::hash::rng_from_seed;

/// `table bootstrapsum(N) of T`: the exact sum plus N-1 bootstrap
/// replicas, each resampling every element a Poisson(1) number of times.
/// The flushed form is `(count, value…)` with exactly N values; slot 0 is
/// the exact sum.
#[derive(Debug)]
pub struct BootstrapSumWriter {
    core: WriterCore,
    seed: Option<String>,
}

impl BootstrapSumWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        let element = ty
            .element()
            .ok_or_else(|| TableError::InvalidType("bootstrapsum table without an element".into()))?;
        if !ValueOps::is_numeric(element.ty()) {
            return Err(TableError::InvalidType(
                "element must be an int, float, or tuple thereof".into(),
            ));
        }
        if ty.param() < 1 {
            return Err(TableError::InvalidType(
                "bootstrapsum tables need a positive sample count".into(),
            ));
        }
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
            seed: None,
        }))
    }
}

impl TableWriter for BootstrapSumWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        let ops = self.core.element_ops.clone();
        let sums = vec![ops.zero(); self.core.param as usize];
        Box::new(BootstrapSumEntry {
            ops,
            sums,
            rng: rng_from_seed(self.seed.as_deref()),
            tot_elems: 0,
        })
    }

    fn set_random_seed(&mut self, seed: &str) {
        self.seed = Some(seed.to_owned());
    }
}

#[derive(Debug)]
struct BootstrapSumEntry {
    ops: ValueOps,
    sums: Vec<TypedValue>,
    rng: StdRng,
    tot_elems: i64,
}

impl BootstrapSumEntry {
    /// Knuth's Poisson(1) sampler; small counts, so the repeated-add cost
    /// is negligible.
    fn poisson_one(&mut self) -> u32 {
        let limit = (-1.0f64).exp();
        let mut k = 0u32;
        let mut p = 1.0f64;
        loop {
            p *= self.rng.gen::<f64>();
            if p <= limit {
                return k;
            }
            k += 1;
        }
    }
}

impl TableEntry for BootstrapSumEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        let mut dec = Decoder::new(elem);
        let v = self.ops.decode_value(&mut dec)?;
        self.tot_elems += 1;
        self.ops.add(&v, &mut self.sums[0])?;
        for i in 1..self.sums.len() {
            for _ in 0..self.poisson_one() {
                self.ops.add(&v, &mut self.sums[i])?;
            }
        }
        Ok(0)
    }

    fn flush(&mut self) -> Vec<u8> {
        if self.tot_elems == 0 {
            return Vec::new();
        }
        let mut enc = Encoder::new();
        enc.put_int(self.tot_elems);
        for sum in &self.sums {
            if self.ops.encode_value(sum, &mut enc).is_err() {
                return Vec::new();
            }
        }
        self.clear();
        enc.take()
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        if self.tot_elems == 0 {
            return vec![Vec::new()];
        }
        let mut enc = Encoder::new();
        for sum in &self.sums {
            if self.ops.encode_value(sum, &mut enc).is_err() {
                return Vec::new();
            }
        }
        vec![enc.take()]
    }

    fn merge(&mut self, val: &[u8]) -> MergeResult {
        if val.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(val);
        let count = dec.get_int()?;
        if count <= 0 {
            return Err(MergeError::Shape("non-positive element count"));
        }
        for i in 0..self.sums.len() {
            let v = self.ops.decode_value(&mut dec)?;
            self.ops.add(&v, &mut self.sums[i])?;
        }
        if !dec.done() {
            return Err(MergeError::Shape("trailing bytes after samples"));
        }
        self.tot_elems += count;
        Ok(())
    }

    fn clear(&mut self) {
        self.tot_elems = 0;
        for sum in self.sums.iter_mut() {
            *sum = self.ops.zero();
        }
    }

    fn memory(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.sums.iter().map(|s| self.ops.memory(s)).sum::<usize>()
    }

    fn tuple_count(&self) -> usize {
        1
    }

    fn tot_elems(&self) -> i64 {
        self.tot_elems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(n: i64) -> Box<dyn TableWriter> {
        let mut ty = SzlType::table("bootstrapsum");
        ty.set_element("", SzlType::int()).set_param(n);
        let mut w = BootstrapSumWriter::create(&ty).unwrap();
        w.set_random_seed("fixed");
        w
    }

    fn encoded(i: i64) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_int(i);
        enc.take()
    }

    #[test]
    fn slot_zero_is_the_exact_sum() {
        let w = writer(5);
        let mut entry = w.create_entry(b"");
        for i in 1..=10 {
            entry.add(&encoded(i)).unwrap();
        }
        let out = entry.flush();
        let mut dec = Decoder::new(&out);
        assert_eq!(dec.get_int().unwrap(), 10);
        assert_eq!(dec.get_int().unwrap(), 55);
        for _ in 1..5 {
            // Replicas resample, so anything from 0 upward is possible;
            // they must decode and the payload must be exactly N values.
            dec.get_int().unwrap();
        }
        assert!(dec.done());
    }

    #[test]
    fn merge_adds_slot_wise() {
        let w = writer(3);
        let mut a = w.create_entry(b"");
        let mut b = w.create_entry(b"");
        a.add(&encoded(100)).unwrap();
        b.add(&encoded(11)).unwrap();
        b.add(&encoded(22)).unwrap();

        let flushed = b.flush();
        a.merge(&flushed).unwrap();
        assert_eq!(a.tot_elems(), 3);

        let out = a.flush();
        let mut dec = Decoder::new(&out);
        assert_eq!(dec.get_int().unwrap(), 3);
        assert_eq!(dec.get_int().unwrap(), 133);
    }

    #[test]
    fn rejects_non_numeric_elements() {
        let mut ty = SzlType::table("bootstrapsum");
        ty.set_element("", SzlType::string()).set_param(4);
        assert!(BootstrapSumWriter::create(&ty).is_err());
    }

    #[test]
    fn weighted_adds_are_unsupported() {
        let w = writer(3);
        let mut entry = w.create_entry(b"");
        assert!(entry
            .add_weighted(&encoded(1), &TypedValue::Int(2))
            .is_err());
    }
}
