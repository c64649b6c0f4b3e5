use core::cmp::Ordering;
use core::mem;

use md5::{Digest, Md5};

use szl_codec::{CodecError, Decoder, Encoder, ValueCodec};
use szl_types::{ValueError, ValueOps, Weight};

/// Bounds on the number of sketch rows. The row count is always odd so the
/// median estimator is well defined.
pub const MIN_TABS: usize = 15;
pub const MAX_TABS: usize = 31;

/// The `(nTabs, tabSize)` shape of a sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SketchDims {
    pub n_tabs: usize,
    pub tab_size: usize,
}

/// Shape of a sketch with approximately `total_size` cells: `tab_size` the
/// next power of two above `total_size / 31`, `n_tabs` the largest odd
/// count in `[15, 31]` that fits.
pub fn dims(total_size: usize) -> SketchDims {
    let ts = total_size / MAX_TABS;
    let mut bits = 2;
    while bits < 32 && ts > (1 << bits) {
        bits += 1;
    }
    let mut tabs = MAX_TABS;
    while tabs > MIN_TABS {
        if ((tabs - 2) << bits) < total_size {
            break;
        }
        tabs -= 2;
    }
    SketchDims {
        n_tabs: tabs,
        tab_size: 1 << bits,
    }
}

/// Per-element cell coordinates: one `(cell, sign)` pair per row.
#[derive(Debug, Clone)]
pub struct SketchIndex {
    cells: [(u32, bool); MAX_TABS],
}

impl SketchIndex {
    fn empty() -> Self {
        Self {
            cells: [(0, false); MAX_TABS],
        }
    }
}

/// Frequency-estimate sketch over weighted elements, after Charikar, Chen
/// and Farach-Colton's CountSketch.
///
/// Weights live in a flat `n_tabs * tab_size` table; each element hashes to
/// one signed cell per row, and the estimate for an element is the
/// per-leaf median of its sign-corrected row values.
#[derive(Debug)]
pub struct Sketch {
    ops: ValueOps,
    weights: Vec<Weight>,
    scratch: Vec<Weight>,
    n_tabs: usize,
    tab_size: usize,
    tab_bits: u32,
}

impl Sketch {
    /// Build an empty sketch; `dims` must come from [`dims`].
    pub fn new(ops: ValueOps, shape: SketchDims) -> Self {
        debug_assert!(
            (MIN_TABS..=MAX_TABS).contains(&shape.n_tabs)
                && shape.n_tabs % 2 == 1
                && shape.tab_size.is_power_of_two()
        );
        let zero = ops.zero();
        Self {
            weights: vec![zero.clone(); shape.n_tabs * shape.tab_size],
            scratch: vec![zero; shape.n_tabs],
            n_tabs: shape.n_tabs,
            tab_size: shape.tab_size,
            tab_bits: shape.tab_size.trailing_zeros(),
            ops,
        }
    }

    pub fn n_tabs(&self) -> usize {
        self.n_tabs
    }

    pub fn tab_size(&self) -> usize {
        self.tab_size
    }

    /// Hash an element into per-row cell coordinates. Bits come from the
    /// MD5 digest of the element, rehashing the digest when exhausted.
    pub fn compute_index(&self, s: &[u8]) -> SketchIndex {
        let mut digest: [u8; 16] = Md5::digest(s).into();
        let mut index = SketchIndex::empty();
        let mut digi = 0;
        let mut bits: u64 = 0;
        let mut nbits = 0;
        let mut origin = 0u32;
        for row in 0..self.n_tabs {
            while nbits < self.tab_bits + 1 {
                if digi == digest.len() {
                    digest = Md5::digest(digest).into();
                    digi = 0;
                }
                bits |= (digest[digi] as u64) << nbits;
                digi += 1;
                nbits += 8;
            }
            let cell = (bits as u32) & ((1 << self.tab_bits) - 1);
            bits >>= self.tab_bits;
            let sign = bits & 1 == 1;
            bits >>= 1;
            nbits -= self.tab_bits + 1;
            index.cells[row] = (origin + cell, sign);
            origin += self.tab_size as u32;
        }
        index
    }

    /// Adjust the weight for an index: add `value` in each row, or
    /// subtract it where the row's sign says so. The symmetry around
    /// `is_add` is what lets sketches merge and candidates demote cleanly.
    pub fn add_sub(
        &mut self,
        index: &SketchIndex,
        value: &Weight,
        is_add: bool,
    ) -> Result<(), ValueError> {
        for row in 0..self.n_tabs {
            let (cell, sign) = index.cells[row];
            debug_assert!(
                (cell as usize) >= row * self.tab_size && (cell as usize) < (row + 1) * self.tab_size
            );
            let w = &mut self.weights[cell as usize];
            if sign == is_add {
                self.ops.sub(value, w)?;
            } else {
                self.ops.add(value, w)?;
            }
        }
        Ok(())
    }

    /// Median estimate of the weight at an index, per leaf position.
    /// Allocates no permanent memory; negations use the scratch row.
    pub fn estimate(&mut self, index: &SketchIndex) -> Result<Weight, ValueError> {
        let n_tabs = self.n_tabs;
        for row in 0..n_tabs {
            let (cell, sign) = index.cells[row];
            if sign {
                self.scratch[row] = self.ops.negate(&self.weights[cell as usize])?;
            }
        }

        // Each slot points at either the weight table or the scratch row.
        let mut slots = [(false, 0u32); MAX_TABS];
        for row in 0..n_tabs {
            let (cell, sign) = index.cells[row];
            slots[row] = if sign { (true, row as u32) } else { (false, cell) };
        }

        let mut est = self.ops.zero();
        let mid = n_tabs >> 1;
        let ops = &self.ops;
        let weights = &self.weights;
        let scratch = &self.scratch;
        for pos in 0..ops.nflats() {
            let row = &mut slots[..n_tabs];
            row.select_nth_unstable_by(mid, |a, b| {
                let va = resolve(*a, scratch, weights);
                let vb = resolve(*b, scratch, weights);
                if ops.less_at_pos(va, pos, vb) {
                    Ordering::Less
                } else if ops.less_at_pos(vb, pos, va) {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            });
            ops.assign_at_pos(resolve(row[mid], scratch, weights), pos, &mut est)?;
        }
        Ok(est)
    }

    /// Estimated standard deviation of the per-column estimates, one value
    /// per leaf position. Display only.
    pub fn std_deviation(&mut self) -> Result<Vec<f64>, ValueError> {
        let nvals = self.ops.nflats();
        let mut deviations = vec![0.0; nvals];
        if self.tab_size == 0 {
            return Ok(deviations);
        }

        let mut columns = Vec::with_capacity(self.tab_size * nvals);
        let mut ave = vec![0.0; nvals];
        let mut colv = Vec::new();
        for col in 0..self.tab_size {
            let mut index = SketchIndex::empty();
            for row in 0..self.n_tabs {
                index.cells[row] = ((row * self.tab_size + col) as u32, false);
            }
            let est = self.estimate(&index)?;
            self.ops.to_float(&est, &mut colv);
            for (j, &v) in colv.iter().enumerate() {
                columns.push(v);
                ave[j] += v;
            }
        }

        for a in ave.iter_mut() {
            *a /= self.tab_size as f64;
        }
        for col in 0..self.tab_size {
            for j in 0..nvals {
                let d = columns[col * nvals + j] - ave[j];
                deviations[j] += d * d;
            }
        }
        for d in deviations.iter_mut() {
            *d = if *d > 1e-8 {
                (*d / self.tab_size as f64).sqrt()
            } else {
                0.0
            };
        }
        Ok(deviations)
    }

    /// Component-wise add of a sketch with identical shape.
    pub fn add_sketch(&mut self, other: &Sketch) -> Result<(), ValueError> {
        if other.n_tabs != self.n_tabs || other.tab_size != self.tab_size {
            return Err(ValueError::ShapeMismatch);
        }
        for (src, dst) in other.weights.iter().zip(self.weights.iter_mut()) {
            self.ops.add(src, dst)?;
        }
        Ok(())
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<(), CodecError> {
        for w in &self.weights {
            self.ops.encode_value(w, enc)?;
        }
        Ok(())
    }

    pub fn decode(&mut self, dec: &mut Decoder<'_>) -> Result<(), CodecError> {
        for w in self.weights.iter_mut() {
            *w = self.ops.decode_value(dec)?;
        }
        Ok(())
    }

    pub fn memory(&self) -> usize {
        mem::size_of::<Self>()
            + self
                .weights
                .iter()
                .chain(self.scratch.iter())
                .map(|w| self.ops.memory(w))
                .sum::<usize>()
    }
}

fn resolve<'a>(slot: (bool, u32), scratch: &'a [Weight], weights: &'a [Weight]) -> &'a Weight {
    if slot.0 {
        &scratch[slot.1 as usize]
    } else {
        &weights[slot.1 as usize]
    }
}
