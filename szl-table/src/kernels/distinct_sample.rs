use std::collections::BTreeMap;

use md5::{Digest, Md5};

use szl_codec::{Decoder, Encoder, ValueCodec};
use szl_types::{Kind, SzlType, TypedValue, ValueOps};

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::kernels::{merge_header, unit_weight};

/// `table distinctsample(N) of T weight W`: keeps the N distinct elements
/// with the smallest hash values, plus the aggregated weight of every
/// occurrence of each kept element.
#[derive(Debug)]
pub struct DistinctSampleWriter {
    core: WriterCore,
}

impl DistinctSampleWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        let weight = ty
            .weight()
            .ok_or_else(|| TableError::InvalidType("distinctsample table without weight".into()))?;
        if !ValueOps::is_addable(weight.ty()) {
            return Err(TableError::InvalidType(
                "The weights must be addable (ints, floats, or tuples thereof)".into(),
            ));
        }
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
        }))
    }
}

impl TableWriter for DistinctSampleWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        Box::new(DistinctSampleEntry {
            ops: self.core.weight_ops.clone(),
            samples: BTreeMap::new(),
            max_elems: self.core.param.max(0) as usize,
            tot_elems: 0,
        })
    }
}

/// Samples order by MD5 digest, ties broken by the element bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SampleKey {
    digest: [u8; 16],
    value: Vec<u8>,
}

impl SampleKey {
    fn new(value: &[u8]) -> Self {
        Self {
            digest: Md5::digest(value).into(),
            value: value.to_vec(),
        }
    }
}

#[derive(Debug)]
struct DistinctSampleEntry {
    ops: ValueOps,
    samples: BTreeMap<SampleKey, TypedValue>,
    max_elems: usize,
    tot_elems: i64,
}

impl TableEntry for DistinctSampleEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        let one = unit_weight(&self.ops);
        self.add_weighted(elem, &one)
    }

    fn add_weighted(&mut self, elem: &[u8], weight: &TypedValue) -> Result<isize, TableError> {
        self.tot_elems += 1;

        let key = SampleKey::new(elem);
        if let Some(kept) = self.samples.get_mut(&key) {
            self.ops.add(weight, kept)?;
            return Ok(0);
        }

        if self.samples.len() < self.max_elems {
            let delta = elem.len() + self.ops.memory(weight);
            self.samples.insert(key, weight.clone());
            return Ok(delta as isize);
        }

        // Full: replace the largest hash if the new element orders below it.
        let evict = match self.samples.last_key_value() {
            Some((largest, kept)) if key < *largest => {
                Some((largest.clone(), largest.value.len() + self.ops.memory(kept)))
            }
            _ => None,
        };
        match evict {
            Some((largest, freed)) => {
                self.samples.remove(&largest);
                let delta = elem.len() + self.ops.memory(weight);
                self.samples.insert(key, weight.clone());
                Ok(delta as isize - freed as isize)
            }
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> Vec<u8> {
        if self.samples.is_empty() {
            return Vec::new();
        }
        let mut enc = Encoder::new();
        enc.put_int(self.tot_elems - self.samples.len() as i64);
        enc.put_int(self.samples.len() as i64);
        // Pairs leave in increasing hash order.
        for (key, weight) in &self.samples {
            enc.put_bytes(&key.value);
            if self.ops.encode_value(weight, &mut enc).is_err() {
                return Vec::new();
            }
        }
        self.clear();
        enc.take()
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        if self.samples.is_empty() {
            return vec![Vec::new()];
        }
        self.samples
            .iter()
            .map(|(key, weight)| {
                let mut enc = Encoder::new();
                let _ = self.ops.encode_value(weight, &mut enc);
                let mut row = key.value.clone();
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
        if nvals > self.max_elems as i64 {
            return Err(MergeError::Shape("more samples than capacity"));
        }

        for _ in 0..nvals {
            dec.skip(Kind::Bytes)?;
            self.ops.skip_value(&mut dec)?;
        }
        if !dec.done() {
            return Err(MergeError::Shape("trailing bytes after samples"));
        }

        dec.restart();
        dec.skip(Kind::Int)?;
        dec.skip(Kind::Int)?;
        for _ in 0..nvals {
            let elem = dec.get_bytes()?;
            let weight = self.ops.decode_value(&mut dec)?;
            self.add_weighted(&elem, &weight)
                .map_err(|_| MergeError::Shape("sample add failed"))?;
        }
        self.tot_elems += extra;
        Ok(())
    }

    fn clear(&mut self) {
        self.tot_elems = 0;
        self.samples.clear();
    }

    fn memory(&self) -> usize {
        core::mem::size_of::<Self>()
            + self
                .samples
                .iter()
                .map(|(key, weight)| {
                    core::mem::size_of::<SampleKey>() + key.value.len() + self.ops.memory(weight)
                })
                .sum::<usize>()
    }

    fn tuple_count(&self) -> usize {
        self.samples.len()
    }

    fn tot_elems(&self) -> i64 {
        self.tot_elems
    }
}
