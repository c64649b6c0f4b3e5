use core::mem;

use szl_types::{ValueOps, Weight, WeightOrd};

/// A value and its weight, as stored by the bounded heaps.
#[derive(Debug, Clone)]
pub struct HeapItem {
    pub value: Vec<u8>,
    pub weight: Weight,
}

/// Fixed-capacity heap of weighted elements with the *worst* item at
/// slot 0: the smallest weight under [`WeightOrd::KeepBiggest`], the
/// biggest under [`WeightOrd::KeepSmallest`].
///
/// `sort` destroys the heap property into best-first order for flushing;
/// `reheap` reverses the sort in place and restores it.
#[derive(Debug)]
pub struct BoundedHeap {
    items: Vec<HeapItem>,
    ops: ValueOps,
    ord: WeightOrd,
    max_elems: usize,
}

impl BoundedHeap {
    pub fn new(ops: ValueOps, ord: WeightOrd, max_elems: usize) -> Self {
        Self {
            items: Vec::new(),
            ops,
            ord,
            max_elems,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_elems(&self) -> usize {
        self.max_elems
    }

    /// The item at heap slot `i`; ordering is only meaningful after `sort`.
    pub fn element(&self, i: usize) -> &HeapItem {
        &self.items[i]
    }

    pub fn items(&self) -> &[HeapItem] {
        &self.items
    }

    /// Add an element, dropping it if it does not beat the current worst.
    /// Returns the change in estimated memory use.
    pub fn add(&mut self, value: &[u8], weight: &Weight) -> isize {
        if self.items.len() < self.max_elems {
            let gained = value.len() + self.ops.memory(weight) + mem::size_of::<HeapItem>();
            self.items.push(HeapItem {
                value: value.to_vec(),
                weight: weight.clone(),
            });
            self.sift_up(self.items.len() - 1);
            gained as isize
        } else if self.max_elems > 0 && self.ord.before(&self.ops, &self.items[0].weight, weight) {
            let worst = &mut self.items[0];
            let lost = worst.value.len() + self.ops.memory(&worst.weight);
            worst.value = value.to_vec();
            worst.weight = weight.clone();
            let gained = value.len() + self.ops.memory(weight);
            self.sift_down(0, self.items.len());
            gained as isize - lost as isize
        } else {
            0
        }
    }

    /// Sort in place so the best element is first. The heap property is
    /// gone afterwards; `add` must not be called until `reheap`.
    pub fn sort(&mut self) {
        let mut ne = self.items.len();
        while ne > 1 {
            ne -= 1;
            self.items.swap(0, ne);
            self.sift_down(0, ne);
        }
    }

    /// Reverse a `sort`, restoring the heap property as a side effect.
    pub fn reheap(&mut self) {
        self.items.reverse();
        debug_assert!(self.is_heap());
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn memory(&self) -> usize {
        mem::size_of::<Self>()
            + self
                .items
                .iter()
                .map(|item| mem::size_of::<HeapItem>() + item.value.len() + self.ops.memory(&item.weight))
                .sum::<usize>()
    }

    /// Validity check: heap order and completeness.
    pub fn is_heap(&self) -> bool {
        (1..self.items.len()).all(|i| {
            let parent = (i - 1) >> 1;
            !self
                .ord
                .before(&self.ops, &self.items[i].weight, &self.items[parent].weight)
        })
    }

    fn sift_up(&mut self, mut h: usize) {
        while h != 0 {
            let parent = (h - 1) >> 1;
            if !self
                .ord
                .before(&self.ops, &self.items[h].weight, &self.items[parent].weight)
            {
                break;
            }
            self.items.swap(h, parent);
            h = parent;
        }
    }

    fn sift_down(&mut self, mut h: usize, nheap: usize) {
        loop {
            let mut kid = (h << 1) + 1;
            if kid >= nheap {
                break;
            }
            if kid + 1 < nheap
                && self
                    .ord
                    .before(&self.ops, &self.items[kid + 1].weight, &self.items[kid].weight)
            {
                kid += 1;
            }
            if self
                .ord
                .before(&self.ops, &self.items[h].weight, &self.items[kid].weight)
            {
                break;
            }
            self.items.swap(h, kid);
            h = kid;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use szl_types::{SzlType, TypedValue};

    fn int_heap(ord: WeightOrd, max: usize) -> BoundedHeap {
        BoundedHeap::new(ValueOps::new(&SzlType::int()), ord, max)
    }

    fn weights(heap: &BoundedHeap) -> Vec<i64> {
        heap.items()
            .iter()
            .map(|e| match e.weight {
                TypedValue::Int(i) => i,
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn keeps_the_biggest_weights() {
        let mut heap = int_heap(WeightOrd::KeepBiggest, 3);
        for (v, w) in [(b"a", 5i64), (b"b", 3), (b"c", 7), (b"d", 4), (b"e", 9)] {
            heap.add(v, &TypedValue::Int(w));
            assert!(heap.is_heap());
        }
        let mut kept = weights(&heap);
        kept.sort_unstable();
        assert_eq!(kept, vec![5, 7, 9]);
    }

    #[test]
    fn keeps_the_smallest_weights() {
        let mut heap = int_heap(WeightOrd::KeepSmallest, 2);
        for w in [5i64, 1, 4, 2, 9] {
            heap.add(b"x", &TypedValue::Int(w));
            assert!(heap.is_heap());
        }
        let mut kept = weights(&heap);
        kept.sort_unstable();
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn drop_returns_zero_delta() {
        let mut heap = int_heap(WeightOrd::KeepBiggest, 1);
        assert!(heap.add(b"a", &TypedValue::Int(10)) > 0);
        assert_eq!(heap.add(b"b", &TypedValue::Int(3)), 0);
        assert_eq!(weights(&heap), vec![10]);
    }

    #[test]
    fn sort_then_reheap_round_trips() {
        let mut heap = int_heap(WeightOrd::KeepBiggest, 8);
        for w in [3i64, 1, 4, 1, 5, 9, 2, 6] {
            heap.add(b"x", &TypedValue::Int(w));
        }
        heap.sort();
        let sorted = weights(&heap);
        let mut expect = vec![3, 1, 4, 1, 5, 9, 2, 6];
        expect.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(sorted, expect);

        heap.reheap();
        assert!(heap.is_heap());
        heap.add(b"x", &TypedValue::Int(7));
        assert!(heap.is_heap());
    }

    #[test]
    fn zero_capacity_drops_everything() {
        let mut heap = int_heap(WeightOrd::KeepBiggest, 0);
        assert_eq!(heap.add(b"a", &TypedValue::Int(1)), 0);
        assert!(heap.is_empty());
    }
}
