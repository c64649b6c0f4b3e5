use std::io;

use hashbrown::HashMap;
use itertools::Itertools;
use tracing::error;

use szl_codec::{Decoder, Encoder};
use szl_types::{Kind, TypedValue};

use crate::entry::{MergeResult, TableEntry, TableWriter};
use crate::hash::fingerprint64;

/// Group kinds of the structured emit protocol.
///
/// An emit is `EMIT ( INDEX? ELEMENT WEIGHT? )`, with scalar puts and
/// nested ARRAY/MAP/TUPLE groups free to compose inside the three slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Emit,
    Index,
    Element,
    Weight,
    Array,
    Map,
    Tuple,
}

/// Receives finished key/value rows from the driver.
pub trait EmitSink {
    fn write(&mut self, key: &[u8], value: &[u8]);
}

/// Collects rows in memory; handy for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<(Vec<u8>, Vec<u8>)>,
}

impl EmitSink for MemorySink {
    fn write(&mut self, key: &[u8], value: &[u8]) {
        self.rows.push((key.to_vec(), value.to_vec()));
    }
}

/// Pretty-prints `name[key] = value` rows to a writer.
#[derive(Debug)]
pub struct PrintSink<W: io::Write> {
    name: String,
    out: W,
}

impl<W: io::Write> PrintSink<W> {
    pub fn new(name: impl Into<String>, out: W) -> Self {
        Self {
            name: name.into(),
            out,
        }
    }
}

impl<W: io::Write> EmitSink for PrintSink<W> {
    fn write(&mut self, key: &[u8], value: &[u8]) {
        let key_print = Decoder::new(key).pretty_print().unwrap_or_default();
        let value_print = Decoder::new(value).pretty_print().unwrap_or_default();
        let _ = writeln!(self.out, "{}[{}] = {}", self.name, key_print, value_print);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    None,
    Key,
    Value,
}

/// The emit driver for one output table.
///
/// Builds encoded keys and values from the begin/end/put call protocol,
/// routes each finished emit to the per-key kernel entry (creating it on
/// first use), and serves the flush, display and merge cycles.
///
/// Protocol violations never panic; they poison the current emit, set a
/// sticky error flag, and produce no output.
pub struct Emitter<S: EmitSink> {
    name: String,
    writer: Box<dyn TableWriter>,
    table: HashMap<Vec<u8>, Box<dyn TableEntry>>,
    key: Encoder,
    value: Encoder,
    target: Target,
    in_weight: bool,
    saw_index: bool,
    saw_element: bool,
    saw_weight: bool,
    weight: TypedValue,
    weight_pos: i32,
    depth: usize,
    arrays: Vec<usize>,
    memory_estimate: isize,
    display: bool,
    errors_detected: bool,
    emit_ok: bool,
    rr_shard: usize,
    sink: S,
}

impl<S: EmitSink> Emitter<S> {
    pub fn new(name: impl Into<String>, writer: Box<dyn TableWriter>, display: bool, sink: S) -> Self {
        let weight = writer.weight_ops().zero();
        Self {
            name: name.into(),
            writer,
            table: HashMap::new(),
            key: Encoder::new(),
            value: Encoder::new(),
            target: Target::None,
            in_weight: false,
            saw_index: false,
            saw_element: false,
            saw_weight: false,
            weight,
            weight_pos: -1,
            depth: 0,
            arrays: Vec::new(),
            memory_estimate: 0,
            display,
            errors_detected: false,
            emit_ok: true,
            rr_shard: 0,
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn writer(&self) -> &dyn TableWriter {
        self.writer.as_ref()
    }

    pub fn writer_mut(&mut self) -> &mut dyn TableWriter {
        self.writer.as_mut()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// True if any emit has violated the protocol or failed to aggregate.
    pub fn errors_detected(&self) -> bool {
        self.errors_detected
    }

    pub fn begin(&mut self, group: GroupKind, len: i64) {
        match group {
            GroupKind::Emit => {
                if self.target != Target::None || self.depth != 0 {
                    self.fail("emit opened inside another group");
                    return;
                }
                self.emit_ok = true;
                self.weight_pos = -1;
                self.in_weight = false;
                self.saw_index = false;
                self.saw_element = false;
                self.saw_weight = false;
            }
            GroupKind::Index => {
                if self.target != Target::None || self.depth != 0 {
                    self.fail("index group out of place");
                    return;
                }
                // Slots come in INDEX ELEMENT WEIGHT order, at most once each.
                if self.saw_index || self.saw_element || self.saw_weight {
                    self.fail("index group out of order");
                    return;
                }
                self.saw_index = true;
                self.depth += 1;
                self.target = Target::Key;
                self.key.reset();
            }
            GroupKind::Element => {
                if self.target != Target::None || self.depth != 0 {
                    self.fail("element group out of place");
                    return;
                }
                if self.saw_element || self.saw_weight {
                    self.fail("element group out of order");
                    return;
                }
                self.saw_element = true;
                self.depth += 1;
                self.target = Target::Value;
                self.value.reset();
            }
            GroupKind::Weight => {
                if self.target != Target::None || self.depth != 0 || !self.writer.has_weight() {
                    self.fail("weight group out of place");
                    return;
                }
                if !self.saw_element || self.saw_weight {
                    self.fail("weight group out of order");
                    return;
                }
                self.saw_weight = true;
                self.in_weight = true;
                self.weight_pos = 0;
                self.weight = self.writer.weight_ops().zero();
                self.depth += 1;
            }
            GroupKind::Tuple => {
                if self.target == Target::None && !self.in_weight {
                    self.fail("tuple outside any emit slot");
                    return;
                }
                if !self.in_weight && self.arrays.last() == Some(&(self.depth - 1)) {
                    if let Some(enc) = self.encoder() {
                        enc.start(Kind::Tuple);
                    }
                }
                self.depth += 1;
            }
            GroupKind::Array | GroupKind::Map => {
                if self.in_weight {
                    self.fail("arrays or maps inside weights is not currently supported");
                    return;
                }
                if self.target == Target::None {
                    self.fail("composite outside any emit slot");
                    return;
                }
                let depth = self.depth;
                if let Some(enc) = self.encoder() {
                    if group == GroupKind::Array {
                        enc.start(Kind::Array);
                    } else {
                        enc.start(Kind::Map);
                        enc.put_int(len);
                    }
                }
                self.arrays.push(depth);
                self.depth += 1;
            }
        }
    }

    pub fn end(&mut self, group: GroupKind, _len: i64) {
        if group == GroupKind::Emit {
            self.finish_emit();
            return;
        }

        if (self.target == Target::None && !self.in_weight) || self.depth == 0 {
            self.fail("end without a matching begin");
            return;
        }
        self.depth -= 1;

        match group {
            GroupKind::Array | GroupKind::Map => {
                let depth = self.depth;
                if let Some(enc) = self.encoder() {
                    enc.end(if group == GroupKind::Array {
                        Kind::Array
                    } else {
                        Kind::Map
                    });
                }
                if self.arrays.pop() != Some(depth) {
                    self.fail("mismatched composite nesting");
                    return;
                }
            }
            GroupKind::Tuple => {
                if !self.in_weight && self.arrays.last() == Some(&(self.depth.wrapping_sub(1))) {
                    if let Some(enc) = self.encoder() {
                        enc.end(Kind::Tuple);
                    }
                }
            }
            _ => {}
        }

        if self.depth == 0 {
            if !self.arrays.is_empty() {
                self.fail("unclosed composite group");
            }
            self.target = Target::None;
            self.in_weight = false;
        }
    }

    pub fn put_bool(&mut self, b: bool) {
        if self.in_weight {
            let pos = self.next_weight_pos();
            if self
                .writer
                .weight_ops()
                .put_bool(pos, b, &mut self.weight)
                .is_err()
            {
                self.fail("weight shape mismatch");
            }
        } else if let Some(enc) = self.encoder() {
            enc.put_bool(b);
        } else {
            self.fail("put outside any group");
        }
    }

    pub fn put_bytes(&mut self, p: &[u8]) {
        if self.in_weight {
            let pos = self.next_weight_pos();
            if self
                .writer
                .weight_ops()
                .put_bytes(pos, p, &mut self.weight)
                .is_err()
            {
                self.fail("weight shape mismatch");
            }
        } else if let Some(enc) = self.encoder() {
            enc.put_bytes(p);
        } else {
            self.fail("put outside any group");
        }
    }

    pub fn put_int(&mut self, i: i64) {
        if self.in_weight {
            let pos = self.next_weight_pos();
            if self
                .writer
                .weight_ops()
                .put_int(pos, i, &mut self.weight)
                .is_err()
            {
                self.fail("weight shape mismatch");
            }
        } else if let Some(enc) = self.encoder() {
            enc.put_int(i);
        } else {
            self.fail("put outside any group");
        }
    }

    pub fn put_uint(&mut self, u: u64) {
        if self.in_weight {
            let pos = self.next_weight_pos();
            if self
                .writer
                .weight_ops()
                .put_uint(pos, u, &mut self.weight)
                .is_err()
            {
                self.fail("weight shape mismatch");
            }
        } else if let Some(enc) = self.encoder() {
            enc.put_uint(u);
        } else {
            self.fail("put outside any group");
        }
    }

    pub fn put_float(&mut self, f: f64) {
        if self.in_weight {
            let pos = self.next_weight_pos();
            if self
                .writer
                .weight_ops()
                .put_float(pos, f, &mut self.weight)
                .is_err()
            {
                self.fail("weight shape mismatch");
            }
        } else if let Some(enc) = self.encoder() {
            enc.put_float(f);
        } else {
            self.fail("put outside any group");
        }
    }

    pub fn put_fingerprint(&mut self, fp: u64) {
        if self.in_weight {
            let pos = self.next_weight_pos();
            if self
                .writer
                .weight_ops()
                .put_fingerprint(pos, fp, &mut self.weight)
                .is_err()
            {
                self.fail("weight shape mismatch");
            }
        } else if let Some(enc) = self.encoder() {
            enc.put_fingerprint(fp);
        } else {
            self.fail("put outside any group");
        }
    }

    pub fn put_string(&mut self, s: &str) {
        if self.in_weight {
            let pos = self.next_weight_pos();
            if self
                .writer
                .weight_ops()
                .put_string(pos, s, &mut self.weight)
                .is_err()
            {
                self.fail("weight shape mismatch");
            }
        } else {
            let failed = match self.encoder() {
                Some(enc) => enc.put_string(s).is_err(),
                None => true,
            };
            if failed {
                self.fail("bad string put");
            }
        }
    }

    pub fn put_time(&mut self, t: u64) {
        if self.in_weight {
            let pos = self.next_weight_pos();
            if self
                .writer
                .weight_ops()
                .put_time(pos, t, &mut self.weight)
                .is_err()
            {
                self.fail("weight shape mismatch");
            }
        } else if let Some(enc) = self.encoder() {
            enc.put_time(t);
        } else {
            self.fail("put outside any group");
        }
    }

    /// Shorthand for an element-only int emit.
    pub fn emit_int(&mut self, i: i64) {
        self.begin(GroupKind::Emit, 1);
        self.begin(GroupKind::Element, 1);
        self.put_int(i);
        self.end(GroupKind::Element, 1);
        self.end(GroupKind::Emit, 1);
    }

    /// Shorthand for an element-only float emit.
    pub fn emit_float(&mut self, f: f64) {
        self.begin(GroupKind::Emit, 1);
        self.begin(GroupKind::Element, 1);
        self.put_float(f);
        self.end(GroupKind::Element, 1);
        self.end(GroupKind::Emit, 1);
    }

    /// Merge a peer's flushed value into the entry for `index`.
    pub fn merge(&mut self, index: &[u8], val: &[u8]) -> MergeResult {
        let writer = &*self.writer;
        let entry = self
            .table
            .entry(index.to_vec())
            .or_insert_with(|| writer.create_entry(index));
        entry.merge(val)
    }

    /// Flush every entry in key order, writing non-empty values to the
    /// sink, and clear the table. With the print sink this groups all
    /// values of a key on one row, unlike `display_results`.
    pub fn flush_all(&mut self) {
        let mut table = std::mem::take(&mut self.table);
        for (key, entry) in table.iter_mut().sorted_by(|a, b| a.0.cmp(b.0)) {
            let value = entry.flush();
            if !value.is_empty() {
                self.sink.write(key, &value);
            }
        }
        self.memory_estimate = 0;
    }

    /// Write every entry's display rows to the sink, in key order.
    /// Does not reset.
    pub fn display_results(&mut self) {
        let mut table = std::mem::take(&mut self.table);
        for (key, entry) in table.iter_mut().sorted_by(|a, b| a.0.cmp(b.0)) {
            for row in entry.flush_display() {
                self.sink.write(key, &row);
            }
        }
        self.table = table;
    }

    /// Drop all entries, displaying them first when display is on.
    pub fn clear(&mut self) {
        if self.display {
            self.display_results();
        }
        self.table.clear();
        self.memory_estimate = 0;
    }

    /// Rows the next display pass would produce, over all keys.
    pub fn tuple_count(&self) -> usize {
        self.table.values().map(|e| e.tuple_count()).sum()
    }

    /// Memory in use per the kernels' own accounting.
    pub fn memory_usage(&self) -> usize {
        self.table.values().map(|e| e.memory()).sum()
    }

    /// Running estimate fed by per-add memory deltas.
    pub fn memory_estimate(&self) -> isize {
        self.memory_estimate
    }

    /// Output shard for a finished row: keyed by fingerprint for
    /// aggregating or indexed tables, round-robin otherwise.
    pub fn shard_for_key(&mut self, key: &[u8], nshards: usize) -> usize {
        if nshards == 0 {
            return 0;
        }
        if self.writer.aggregates() || self.writer.has_indices() {
            let mut buf = Vec::with_capacity(self.name.len() + key.len());
            buf.extend_from_slice(self.name.as_bytes());
            buf.extend_from_slice(key);
            (fingerprint64(&buf) % nshards as u64) as usize
        } else {
            let shard = self.rr_shard;
            self.rr_shard = (self.rr_shard + 1) % nshards;
            shard
        }
    }

    fn finish_emit(&mut self) {
        if self.target != Target::None || self.depth != 0 {
            self.fail("emit closed with open groups");
            return;
        }
        if !self.saw_element {
            self.fail("emit without an element");
            return;
        }
        if (self.weight_pos > 0) != self.writer.has_weight() {
            self.fail("weight missing or unexpected");
            return;
        }
        if !self.emit_ok {
            return;
        }

        let key = self.key.data().to_vec();
        if self.writer.aggregates() {
            let writer = &*self.writer;
            let entry = self
                .table
                .entry(key.clone())
                .or_insert_with(|| writer.create_entry(&key));
            let result = if self.weight_pos > 0 {
                entry.add_weighted(self.value.data(), &self.weight)
            } else {
                entry.add(self.value.data())
            };
            match result {
                Ok(delta) => self.memory_estimate += delta,
                Err(_) => self.fail("aggregation failed"),
            }
        } else {
            if self.writer.has_weight() {
                self.fail("weighted emit to a non-aggregating table");
                return;
            }
            let value = self.value.take();
            self.sink.write(&key, &value);
        }
    }

    fn next_weight_pos(&mut self) -> usize {
        let pos = self.weight_pos.max(0) as usize;
        self.weight_pos += 1;
        pos
    }

    fn encoder(&mut self) -> Option<&mut Encoder> {
        match self.target {
            Target::Key => Some(&mut self.key),
            Target::Value => Some(&mut self.value),
            Target::None => None,
        }
    }

    fn fail(&mut self, what: &str) {
        error!(table = %self.name, "{what}");
        self.errors_detected = true;
        self.emit_ok = false;
    }
}
