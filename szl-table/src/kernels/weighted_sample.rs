use rand::rngs::StdRng;
use rand::Rng;

use szl_codec::{Decoder, Encoder};
use szl_types::{Kind, SzlType, TypedValue, ValueOps, WeightOrd};

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::hash::rng_from_seed;
use crate::heap::BoundedHeap;
use crate::kernels::merge_header;

/// `table weightedsample(N) of T weight W`: sample without replacement
/// where selection probability follows the weight. Each element gets the
/// exponential key `-ln(u) / w` and the heap keeps the N smallest keys.
/// Weights that are not strictly positive never enter the reservoir.
#[derive(Debug)]
pub struct WeightedSampleWriter {
    core: WriterCore,
    seed: Option<String>,
}

impl WeightedSampleWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        let weight = ty.weight().ok_or_else(|| {
            TableError::InvalidType("weightedsample table without a weight".into())
        })?;
        if !matches!(weight.ty().kind(), Kind::Int | Kind::Float) {
            return Err(TableError::InvalidType(
                "weightedsample weight must be an int or float".into(),
            ));
        }
        if ty.param() < 1 {
            return Err(TableError::InvalidType(
                "weightedsample tables need a positive sample size".into(),
            ));
        }
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
            seed: None,
        }))
    }
}

impl TableWriter for WeightedSampleWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        Box::new(WeightedSampleEntry {
            heap: BoundedHeap::new(
                ValueOps::new(&SzlType::float()),
                WeightOrd::KeepSmallest,
                self.core.param as usize,
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
struct WeightedSampleEntry {
    heap: BoundedHeap,
    rng: StdRng,
    tot_elems: i64,
}

impl WeightedSampleEntry {
    /// Exponential sampling key for a strictly positive weight; `None`
    /// for weights that never enter the reservoir (≤ 0 or NaN).
    fn key_for(&mut self, w: f64) -> Option<f64> {
        if !(w > 0.0) {
            return None;
        }
        let mut u: f64 = self.rng.gen();
        while u <= 0.0 {
            u = self.rng.gen();
        }
        Some(-u.ln() / w)
    }

    fn add_with_weight(&mut self, elem: &[u8], w: f64) -> isize {
        match self.key_for(w) {
            Some(key) => {
                self.tot_elems += 1;
                self.heap.add(elem, &TypedValue::Float(key))
            }
            None => 0,
        }
    }
}

impl TableEntry for WeightedSampleEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        Ok(self.add_with_weight(elem, 1.0))
    }

    fn add_weighted(&mut self, elem: &[u8], weight: &TypedValue) -> Result<isize, TableError> {
        let w = match weight {
            TypedValue::Int(i) => *i as f64,
            TypedValue::Float(f) => *f,
            _ => return Err(TableError::Unsupported("non-scalar weight")),
        };
        Ok(self.add_with_weight(elem, w))
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
        self.heap
            .items()
            .iter()
            .map(|item| {
                let mut row = item.value.clone();
                let mut enc = Encoder::new();
                if let TypedValue::Float(key) = item.weight {
                    enc.put_float(key);
                }
                row.extend_from_slice(enc.data());
                row
            })
            .collect()
    }

    fn merge(&mut self, val: &[u8]) -> MergeResult {
        if val.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(val);
        let (extra, nvals) = merge_header(&mut dec)?;

        let max = self.heap.max_elems() as i64;
        if nvals > max || (nvals < max && extra != 0) {
            return Err(MergeError::Shape("sample partial is under-full"));
        }

        for _ in 0..nvals {
            dec.skip(Kind::Bytes)?;
        }
        if !dec.done() {
            return Err(MergeError::Shape("trailing bytes after sample"));
        }

        dec.restart();
        dec.skip(Kind::Int)?;
        dec.skip(Kind::Int)?;
        for _ in 0..nvals {
            let elem = dec.get_bytes()?;
            self.add_with_weight(&elem, 1.0);
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

    fn writer(n: i64, weight: SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        let mut ty = SzlType::table("weightedsample");
        ty.set_element("", SzlType::string())
            .set_weight("", weight)
            .set_param(n);
        WeightedSampleWriter::create(&ty)
    }

    fn encoded(s: &str) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_string(s).unwrap();
        enc.take()
    }

    #[test]
    fn rejects_bad_weight_types_and_params() {
        assert!(writer(10, SzlType::string()).is_err());
        assert!(writer(0, SzlType::int()).is_err());
        assert!(writer(-1, SzlType::float()).is_err());
        assert!(writer(1, SzlType::int()).is_ok());
        assert!(writer(1000, SzlType::float()).is_ok());
    }

    #[test]
    fn non_positive_and_nan_weights_never_enter() {
        let mut w = writer(16, SzlType::float()).unwrap();
        w.set_random_seed("s");
        let mut entry = w.create_entry(b"");
        for (name, weight) in [
            ("neg", -1.0),
            ("zero", 0.0),
            ("nan", f64::NAN),
            ("pos", 2.0),
        ] {
            entry
                .add_weighted(&encoded(name), &TypedValue::Float(weight))
                .unwrap();
        }
        assert_eq!(entry.tuple_count(), 1);
        assert_eq!(entry.tot_elems(), 1);
    }

    #[test]
    fn heavier_elements_dominate_the_sample() {
        let mut w = writer(10, SzlType::int()).unwrap();
        w.set_random_seed("deterministic");
        let mut entry = w.create_entry(b"");
        // One heavy element among many light ones.
        for i in 0..40 {
            entry
                .add_weighted(&encoded(&format!("light{i}")), &TypedValue::Int(1))
                .unwrap();
        }
        entry
            .add_weighted(&encoded("heavy"), &TypedValue::Int(1_000_000))
            .unwrap();
        let rows = entry.flush_display();
        assert!(rows
            .iter()
            .any(|row| row.starts_with(encoded("heavy").as_slice())));
    }

    #[test]
    fn merge_resamples_flushed_elements() {
        let w = writer(4, SzlType::int()).unwrap();
        let mut src = w.create_entry(b"");
        for i in 0..3 {
            src.add_weighted(&encoded(&format!("e{i}")), &TypedValue::Int(1))
                .unwrap();
        }
        let flushed = src.flush();
        let mut dst = w.create_entry(b"");
        dst.merge(&flushed).unwrap();
        assert_eq!(dst.tot_elems(), 3);
        assert_eq!(dst.tuple_count(), 3);
    }
}
