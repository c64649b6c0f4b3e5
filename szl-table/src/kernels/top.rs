use szl_codec::{Decoder, Encoder, ValueCodec};
use szl_types::{Kind, SzlType, TypedValue, ValueOps, WeightOrd};

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::kernels::{merge_header, unit_weight};
use crate::sketch::{dims, Sketch, SketchDims};
use crate::topheap::TopHeap;

/// Most elements a top table may report.
const MAX_TOPS: i64 = 1000;

/// How many candidates to track per reported element, and how much sketch
/// to size per reported element.
const CANDIDATES_PER_TOP: i64 = 10;
const SKETCH_PER_TOP: i64 = 100;

/// `table top(N) of T weight W`: approximate heavy hitters. Tracks `10·N`
/// exact candidates; once full, evicted weight estimates live in a lazily
/// allocated CountSketch sized for `100·N`.
#[derive(Debug)]
pub struct TopWriter {
    core: WriterCore,
}

impl TopWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        let weight = ty
            .weight()
            .ok_or_else(|| TableError::InvalidType("top table without weight".into()))?;
        if !ValueOps::is_numeric(weight.ty()) {
            return Err(TableError::InvalidType(
                "top tables must be weighted by an int, float, or tuple thereof".into(),
            ));
        }
        if ty.param() > MAX_TOPS {
            return Err(TableError::InvalidType(format!(
                "top tables can't report more than {MAX_TOPS} elements"
            )));
        }
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
        }))
    }
}

impl TableWriter for TopWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        let param = self.core.param.max(0);
        Box::new(TopEntry {
            ops: self.core.weight_ops.clone(),
            param: param as usize,
            tops: TopHeap::new(
                self.core.weight_ops.clone(),
                WeightOrd::KeepBiggest,
                (param * CANDIDATES_PER_TOP) as usize,
            ),
            sketch: None,
            sketch_dims: dims((param * SKETCH_PER_TOP) as usize),
            tot_elems: 0,
        })
    }
}

#[derive(Debug)]
struct TopEntry {
    ops: ValueOps,
    param: usize,
    tops: TopHeap,
    sketch: Option<Sketch>,
    sketch_dims: SketchDims,
    tot_elems: i64,
}

impl TableEntry for TopEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        let one = unit_weight(&self.ops);
        self.add_weighted(elem, &one)
    }

    fn add_weighted(&mut self, elem: &[u8], weight: &TypedValue) -> Result<isize, TableError> {
        self.tot_elems += 1;
        if self.tops.max_elems() == 0 {
            return Ok(0);
        }

        // Already a candidate: adjust its weight in place.
        if let Some(slot) = self.tops.find(elem) {
            return Ok(self.tops.add_to_weight(slot, weight)?);
        }

        // Candidates fill before the sketch is ever consulted.
        if self.tops.len() != self.tops.max_elems() {
            return Ok(self.tops.add_new(elem, weight));
        }

        let mut delta = 0;
        if self.sketch.is_none() {
            let sketch = Sketch::new(self.ops.clone(), self.sketch_dims);
            delta += sketch.memory() as isize;
            self.sketch = Some(sketch);
        }
        let Some(sketch) = self.sketch.as_mut() else {
            return Ok(delta);
        };

        let index = sketch.compute_index(elem);
        let sketched = sketch.estimate(&index)?;
        let mut total = weight.clone();
        self.ops.add(&sketched, &mut total)?;

        let worst = self.tops.smallest();
        if self.ops.less(&total, &worst.weight) {
            // Still below the worst candidate; it only counts in the sketch.
            sketch.add_sub(&index, weight, true)?;
        } else {
            // Promote: pull the sketched share back out, demote the current
            // worst into the sketch under its own index, and swap.
            let worst_value = worst.value.clone();
            let worst_weight = worst.weight.clone();
            sketch.add_sub(&index, &sketched, false)?;
            let worst_index = sketch.compute_index(&worst_value);
            sketch.add_sub(&worst_index, &worst_weight, true)?;
            delta += self.tops.replace_smallest(elem, &total);
        }
        Ok(delta)
    }

    fn flush(&mut self) -> Vec<u8> {
        if self.tops.is_empty() {
            return Vec::new();
        }
        let mut enc = Encoder::new();
        enc.put_int(self.tot_elems - self.tops.len() as i64);
        enc.put_int(self.tops.len() as i64);
        self.tops.sort();
        for i in 0..self.tops.len() {
            let item = self.tops.element(i);
            enc.put_bytes(&item.value);
            if self.ops.encode_value(&item.weight, &mut enc).is_err() {
                return Vec::new();
            }
        }
        match &self.sketch {
            Some(sketch) => {
                enc.put_int(sketch.tab_size() as i64);
                enc.put_int(sketch.n_tabs() as i64);
                if sketch.encode(&mut enc).is_err() {
                    return Vec::new();
                }
            }
            None => {
                enc.put_int(0);
                enc.put_int(0);
            }
        }
        self.clear();
        enc.take()
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        if self.tot_elems == 0 {
            return vec![Vec::new()];
        }
        self.tops.sort();

        // Error bars for the UI, one float per weight leaf.
        let deviations = match self.sketch.as_mut() {
            Some(sketch) => sketch.std_deviation().unwrap_or_default(),
            None => vec![0.0; self.ops.nflats()],
        };
        let mut err_enc = Encoder::new();
        for d in &deviations {
            err_enc.put_float(*d);
        }

        let nv = self.param.min(self.tops.len());
        let mut rows = Vec::with_capacity(nv);
        for i in 0..nv {
            let item = self.tops.element(i);
            let mut enc = Encoder::new();
            let _ = self.ops.encode_value(&item.weight, &mut enc);
            let mut row = item.value.clone();
            row.extend_from_slice(enc.data());
            row.extend_from_slice(err_enc.data());
            rows.push(row);
        }
        self.tops.reheap();
        rows
    }

    // A candidate may be present on only one side, with its weight buried
    // in the other side's sketch. Update current candidates from the
    // incoming sketch first, then feed the incoming candidates through the
    // normal add path, then fold the residual sketch in; this keeps every
    // candidate's weight inclusive of both sides' sketches.
    fn merge(&mut self, val: &[u8]) -> MergeResult {
        if val.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(val);
        let (extra, nvals) = merge_header(&mut dec)?;
        if nvals > self.tops.max_elems() as i64 {
            return Err(MergeError::Shape("more candidates than capacity"));
        }

        for _ in 0..nvals {
            dec.skip(Kind::Bytes)?;
            self.ops.skip_value(&mut dec)?;
        }

        let tab_size = dec.get_int()?;
        let n_tabs = dec.get_int()?;
        let mut incoming = if n_tabs != 0 {
            if n_tabs != self.sketch_dims.n_tabs as i64 || tab_size != self.sketch_dims.tab_size as i64
            {
                return Err(MergeError::Shape("sketch dimensions differ"));
            }
            let mut sketch = Sketch::new(self.ops.clone(), self.sketch_dims);
            sketch.decode(&mut dec)?;
            Some(sketch)
        } else if tab_size != 0 {
            return Err(MergeError::Shape("sketch with rows but no columns"));
        } else {
            None
        };
        if !dec.done() {
            return Err(MergeError::Shape("trailing bytes after sketch"));
        }

        // Committed from here on; an error leaves partial state behind.
        if let Some(sketch) = incoming.as_mut() {
            for slot in 0..self.tops.len() {
                let value = self.tops.element(slot).value.clone();
                let index = sketch.compute_index(&value);
                let est = sketch.estimate(&index)?;
                self.tops.add_to_weight(slot, &est)?;
                sketch.add_sub(&index, &est, false)?;
            }
        }

        dec.restart();
        dec.skip(Kind::Int)?;
        dec.skip(Kind::Int)?;
        for _ in 0..nvals {
            let elem = dec.get_bytes()?;
            let weight = self.ops.decode_value(&mut dec)?;
            self.add_weighted(&elem, &weight)
                .map_err(|_| MergeError::Shape("candidate add failed"))?;
        }

        if let Some(sketch) = incoming {
            match self.sketch.as_mut() {
                Some(own) => own.add_sketch(&sketch)?,
                None => self.sketch = Some(sketch),
            }
        }
        self.tot_elems += extra;
        Ok(())
    }

    fn clear(&mut self) {
        self.tot_elems = 0;
        self.tops.clear();
        self.sketch = None;
    }

    fn memory(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.tops.memory()
            + self.sketch.as_ref().map_or(0, Sketch::memory)
    }

    fn tuple_count(&self) -> usize {
        self.param.min(self.tops.len())
    }

    fn tot_elems(&self) -> i64 {
        self.tot_elems
    }
}
