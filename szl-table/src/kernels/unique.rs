use hashbrown::HashSet;
use md5::{Digest, Md5};

use szl_codec::{Decoder, Encoder, Token};
use szl_types::SzlType;

use crate::entry::{MergeError, MergeResult, TableEntry, TableError, TableWriter, WriterCore};
use crate::kernels::merge_header;

/// `table unique(N) of T`: estimates the number of distinct elements
/// without storing them. Elements become evenly spaced 64-bit hash keys;
/// the N smallest are kept, and coverage of the key space gives
///
/// ```text
/// unique = n < N ? n : (N << bits-in-hash) / biggest-kept-key
/// ```
#[derive(Debug)]
pub struct UniqueWriter {
    core: WriterCore,
}

impl UniqueWriter {
    pub fn create(ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        Ok(Box::new(Self {
            core: WriterCore::new(ty, true, false),
        }))
    }
}

impl TableWriter for UniqueWriter {
    fn core(&self) -> &WriterCore {
        &self.core
    }

    fn create_entry(&self, _index: &[u8]) -> Box<dyn TableEntry> {
        Box::new(UniqueEntry {
            heap: Vec::new(),
            exists: HashSet::new(),
            max_elems: self.core.param.max(0) as usize,
            is_sorted: false,
            tot_elems: 0,
        })
    }
}

/// Size of each flushed hash, zero-padded past the 8 packed bytes.
const HASH_SIZE: usize = 24;
const DIGEST_LEN: usize = 16;

#[derive(Debug)]
struct UniqueEntry {
    // Max-heap of the smallest kept keys, biggest at slot 0.
    heap: Vec<u64>,
    exists: HashSet<u64>,
    max_elems: usize,
    is_sorted: bool,
    tot_elems: i64,
}

impl UniqueEntry {
    fn pack(digest: &[u8]) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }

    fn unpack(hash: u64) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];
        out[..8].copy_from_slice(&hash.to_be_bytes());
        out
    }

    fn add_hash(&mut self, hash: u64) -> isize {
        self.tot_elems += 1;
        if self.max_elems == 0 {
            return 0;
        }
        if self.exists.contains(&hash) {
            return 0;
        }
        if self.heap.len() < self.max_elems {
            self.is_sorted = false;
            self.heap.push(hash);
            self.sift_up(self.heap.len() - 1);
            self.exists.insert(hash);
            (2 * core::mem::size_of::<u64>()) as isize
        } else if hash < self.heap[0] {
            self.is_sorted = false;
            let evicted = self.heap[0];
            self.exists.remove(&evicted);
            self.heap[0] = hash;
            self.sift_down(0, self.heap.len());
            self.exists.insert(hash);
            0
        } else {
            // Duplicates of the biggest kept key land here too.
            0
        }
    }

    /// Distinct-count estimate, clamped to the number of elements seen.
    ///
    /// The division below is 64 bit / 32 bit, good for roughly
    /// `msb(num) - msb(denom)` bits. Stripping leading zero bytes of the
    /// denominator and renormalizing afterwards keeps about 32 bits of
    /// precision in the intermediate result.
    fn estimate(&self) -> i64 {
        if self.max_elems == 0 {
            return 0;
        }
        if self.heap.len() < self.max_elems {
            return self.heap.len() as i64;
        }

        let unpacked = Self::unpack(self.heap[0]);
        let mut z = 0;
        while z < DIGEST_LEN && unpacked[z] == 0 {
            z += 1;
        }
        let z = z.min(DIGEST_LEN - 4);
        let mut biggest_small = u32::from_be_bytes([
            unpacked[z],
            unpacked[z + 1],
            unpacked[z + 2],
            unpacked[z + 3],
        ]);
        if biggest_small == 0 {
            biggest_small = 1;
        }

        let n = self.heap.len() as u64;
        let msb = 63 - n.leading_zeros() as i64;
        let r = ((n << (31 - msb)) << 32) / biggest_small as u64;

        let tot = self.tot_elems;
        let renorm = z as i64 * 8 - (31 - msb);
        let r = if renorm < 0 {
            r >> (-renorm)
        } else {
            let cap = (tot as u64).checked_shr(renorm as u32).unwrap_or(0);
            if r > cap {
                return tot;
            }
            r.checked_shl(renorm as u32).unwrap_or(0)
        };
        if r > tot as u64 {
            tot
        } else {
            r as i64
        }
    }

    /// Leave the array sorted biggest to smallest, which is still a valid
    /// max-heap.
    fn make_sorted(&mut self) {
        if self.is_sorted {
            return;
        }
        self.sort();
        self.heap.reverse();
        self.is_sorted = true;
        debug_assert!(self.is_heap());
    }

    fn sort(&mut self) {
        let mut ne = self.heap.len();
        while ne > 1 {
            ne -= 1;
            self.heap.swap(0, ne);
            self.sift_down(0, ne);
        }
    }

    fn sift_up(&mut self, mut h: usize) {
        while h != 0 {
            let parent = (h - 1) >> 1;
            if self.heap[h] <= self.heap[parent] {
                break;
            }
            self.heap.swap(h, parent);
            h = parent;
        }
    }

    fn sift_down(&mut self, mut h: usize, nheap: usize) {
        loop {
            let mut kid = (h << 1) + 1;
            if kid >= nheap {
                break;
            }
            if kid + 1 < nheap && self.heap[kid + 1] > self.heap[kid] {
                kid += 1;
            }
            if self.heap[kid] <= self.heap[h] {
                break;
            }
            self.heap.swap(h, kid);
            h = kid;
        }
    }

    fn is_heap(&self) -> bool {
        (1..self.heap.len()).all(|i| {
            let parent = (i - 1) >> if self.is_sorted { 0 } else { 1 };
            self.heap[i] < self.heap[parent]
        })
    }
}

impl TableEntry for UniqueEntry {
    fn add(&mut self, elem: &[u8]) -> Result<isize, TableError> {
        let digest: [u8; 16] = Md5::digest(elem).into();
        Ok(self.add_hash(Self::pack(&digest)))
    }

    fn flush(&mut self) -> Vec<u8> {
        if self.heap.is_empty() {
            return Vec::new();
        }
        let mut enc = Encoder::new();
        enc.put_int(self.tot_elems - self.heap.len() as i64);
        enc.put_int(self.heap.len() as i64);
        self.make_sorted();
        for &hash in &self.heap {
            let mut buf = [0u8; HASH_SIZE];
            buf[..8].copy_from_slice(&hash.to_be_bytes());
            enc.put_bytes(&buf);
        }
        self.clear();
        enc.take()
    }

    fn flush_display(&mut self) -> Vec<Vec<u8>> {
        if self.tot_elems == 0 {
            return vec![Vec::new()];
        }
        let mut enc = Encoder::new();
        enc.put_int(self.estimate());
        vec![enc.take()]
    }

    fn merge(&mut self, val: &[u8]) -> MergeResult {
        if val.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(val);
        let (extra, nvals) = merge_header(&mut dec)?;
        if nvals == 0 {
            return Ok(());
        }
        for _ in 0..nvals {
            if dec.peek()? != Token::Bytes {
                return Err(MergeError::Shape("expected a hash"));
            }
            let hash = dec.get_bytes()?;
            if hash.len() != HASH_SIZE {
                return Err(MergeError::Shape("bad hash size"));
            }
            self.add_hash(Self::pack(&hash));
        }
        if !dec.done() {
            return Err(MergeError::Shape("trailing bytes after hashes"));
        }
        self.tot_elems += extra;
        Ok(())
    }

    fn clear(&mut self) {
        self.tot_elems = 0;
        self.heap.clear();
        self.exists.clear();
        self.is_sorted = false;
    }

    fn memory(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.exists.capacity() * core::mem::size_of::<u64>()
            + self.heap.capacity() * core::mem::size_of::<u64>()
    }

    fn tuple_count(&self) -> usize {
        1
    }

    fn tot_elems(&self) -> i64 {
        self.tot_elems
    }
}
