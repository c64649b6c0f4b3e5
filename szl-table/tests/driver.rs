//! End-to-end emit scenarios through the driver, and the emit protocol
//! state machine.

use szl_codec::{Decoder, Encoder};
use szl_table::{Emitter, GroupKind, MemorySink, Registry, TableWriter};
use szl_types::SzlType;

fn emitter_for(ty: &SzlType, name: &str) -> Emitter<MemorySink> {
    let writer = Registry::default().create(ty).unwrap();
    Emitter::new(name, writer, false, MemorySink::default())
}

fn seeded_emitter_for(ty: &SzlType, name: &str, seed: &str) -> Emitter<MemorySink> {
    let mut writer = Registry::default().create(ty).unwrap();
    writer.set_random_seed(seed);
    Emitter::new(name, writer, false, MemorySink::default())
}

fn emit_string(emitter: &mut Emitter<MemorySink>, s: &str) {
    emitter.begin(GroupKind::Emit, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.put_string(s);
    emitter.end(GroupKind::Element, 1);
    emitter.end(GroupKind::Emit, 1);
}

fn emit_weighted(emitter: &mut Emitter<MemorySink>, s: &str, weight: i64) {
    emitter.begin(GroupKind::Emit, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.put_string(s);
    emitter.end(GroupKind::Element, 1);
    emitter.begin(GroupKind::Weight, 1);
    emitter.put_int(weight);
    emitter.end(GroupKind::Weight, 1);
    emitter.end(GroupKind::Emit, 1);
}

fn encoded_string(s: &str) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.put_string(s).unwrap();
    enc.take()
}

#[test]
fn sum_of_int_scenario() {
    let mut ty = SzlType::table("sum");
    ty.set_element("", SzlType::int());
    let mut emitter = emitter_for(&ty, "t");

    for i in [1, 2, 3] {
        emitter.emit_int(i);
    }
    assert!(!emitter.errors_detected());

    emitter.flush_all();
    let rows = &emitter.sink().rows;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].0.is_empty(), "sum table has no indices");
    let mut dec = Decoder::new(&rows[0].1);
    assert_eq!(dec.get_int().unwrap(), 3); // tot_elems
    assert_eq!(dec.get_int().unwrap(), 6); // the sum
    assert!(dec.done());
}

#[test]
fn set_scenario_with_overflow() {
    let mut ty = SzlType::table("set");
    ty.set_element("", SzlType::string()).set_param(3);
    let mut emitter = emitter_for(&ty, "t");

    for s in ["a", "b", "a", "c"] {
        emit_string(&mut emitter, s);
    }
    assert_eq!(emitter.tuple_count(), 3);

    // One more distinct element overflows the set; flush becomes empty.
    emit_string(&mut emitter, "d");
    emitter.flush_all();
    assert!(emitter.sink().rows.is_empty());
}

#[test]
fn maximum_scenario_sorted_display() {
    let mut ty = SzlType::table("maximum");
    ty.set_element("", SzlType::string())
        .set_weight("", SzlType::int())
        .set_param(2);
    let mut emitter = emitter_for(&ty, "t");

    emit_weighted(&mut emitter, "x", 5);
    emit_weighted(&mut emitter, "y", 3);
    emit_weighted(&mut emitter, "z", 7);
    assert!(!emitter.errors_detected());

    emitter.display_results();
    let rows = &emitter.sink().rows;
    assert_eq!(rows.len(), 2);
    assert!(rows[0].1.starts_with(&encoded_string("z")));
    assert!(rows[1].1.starts_with(&encoded_string("x")));
}

#[test]
fn top_scenario_finds_heavy_hitters() {
    let mut ty = SzlType::table("top");
    ty.set_element("", SzlType::string())
        .set_weight("", SzlType::int())
        .set_param(2);
    let mut emitter = emitter_for(&ty, "t");

    for _ in 0..100 {
        emit_weighted(&mut emitter, "a", 1);
    }
    for _ in 0..50 {
        emit_weighted(&mut emitter, "b", 1);
    }
    for _ in 0..49 {
        emit_weighted(&mut emitter, "c", 1);
    }
    for s in ["d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s",
        "t", "u", "v", "w", "x", "y", "z"]
    {
        emit_weighted(&mut emitter, s, 1);
    }

    emitter.display_results();
    let rows = &emitter.sink().rows;
    assert_eq!(rows.len(), 2);
    assert!(rows[0].1.starts_with(&encoded_string("a")));
    assert!(rows[1].1.starts_with(&encoded_string("b")));
}

#[test]
fn unique_scenario_estimates_cardinality() {
    let mut ty = SzlType::table("unique");
    ty.set_element("", SzlType::string()).set_param(1024);
    let mut emitter = emitter_for(&ty, "t");

    for i in 0..10_000 {
        emit_string(&mut emitter, &format!("token-{i}"));
    }
    emitter.display_results();
    let rows = &emitter.sink().rows;
    assert_eq!(rows.len(), 1);
    let mut dec = Decoder::new(&rows[0].1);
    let estimate = dec.get_int().unwrap();
    assert!(
        (9_000..=11_000).contains(&estimate),
        "estimate {estimate} outside ±10%"
    );
}

#[test]
fn indexed_emits_key_separate_entries() {
    let mut ty = SzlType::table("sum");
    ty.set_element("", SzlType::int())
        .add_index("host", SzlType::string());
    let mut emitter = emitter_for(&ty, "t");

    for (host, n) in [("alpha", 1), ("beta", 10), ("alpha", 2)] {
        emitter.begin(GroupKind::Emit, 1);
        emitter.begin(GroupKind::Index, 1);
        emitter.put_string(host);
        emitter.end(GroupKind::Index, 1);
        emitter.begin(GroupKind::Element, 1);
        emitter.put_int(n);
        emitter.end(GroupKind::Element, 1);
        emitter.end(GroupKind::Emit, 1);
    }
    emitter.flush_all();

    let mut rows = emitter.sink().rows.clone();
    rows.sort();
    assert_eq!(rows.len(), 2);
    let mut dec = Decoder::new(&rows[0].0);
    assert_eq!(dec.get_string().unwrap(), "alpha");
    let mut dec = Decoder::new(&rows[0].1);
    assert_eq!(dec.get_int().unwrap(), 2);
    assert_eq!(dec.get_int().unwrap(), 3);
}

#[test]
fn composite_elements_are_marker_encoded() {
    let mut ty = SzlType::table("collection");
    ty.set_element("", SzlType::array_of(SzlType::int()));
    let mut emitter = emitter_for(&ty, "t");

    emitter.begin(GroupKind::Emit, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.begin(GroupKind::Array, 2);
    emitter.put_int(7);
    emitter.put_int(8);
    emitter.end(GroupKind::Array, 2);
    emitter.end(GroupKind::Element, 1);
    emitter.end(GroupKind::Emit, 1);

    // Collections pass straight through to the sink.
    let rows = &emitter.sink().rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        Decoder::new(&rows[0].1).pretty_print().unwrap(),
        "[7, 8]"
    );
}

#[test]
fn weight_group_on_unweighted_table_is_an_error() {
    let mut ty = SzlType::table("sum");
    ty.set_element("", SzlType::int());
    let mut emitter = emitter_for(&ty, "t");

    emitter.begin(GroupKind::Emit, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.put_int(1);
    emitter.end(GroupKind::Element, 1);
    emitter.begin(GroupKind::Weight, 1);
    emitter.put_int(2);
    emitter.end(GroupKind::Weight, 1);
    emitter.end(GroupKind::Emit, 1);

    assert!(emitter.errors_detected());
    emitter.flush_all();
    assert!(emitter.sink().rows.is_empty());
}

#[test]
fn array_inside_weight_is_an_error() {
    let mut ty = SzlType::table("maximum");
    ty.set_element("", SzlType::string())
        .set_weight("", SzlType::int())
        .set_param(2);
    let mut emitter = emitter_for(&ty, "t");

    emitter.begin(GroupKind::Emit, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.put_string("x");
    emitter.end(GroupKind::Element, 1);
    emitter.begin(GroupKind::Weight, 1);
    emitter.begin(GroupKind::Array, 1);
    emitter.put_int(1);
    emitter.end(GroupKind::Array, 1);
    emitter.end(GroupKind::Weight, 1);
    emitter.end(GroupKind::Emit, 1);

    assert!(emitter.errors_detected());
    emitter.flush_all();
    assert!(emitter.sink().rows.is_empty());
}

#[test]
fn unbalanced_groups_poison_the_emit() {
    let mut ty = SzlType::table("sum");
    ty.set_element("", SzlType::int());
    let mut emitter = emitter_for(&ty, "t");

    // ELEMENT opened inside ELEMENT.
    emitter.begin(GroupKind::Emit, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.put_int(1);
    emitter.end(GroupKind::Element, 1);
    emitter.end(GroupKind::Emit, 1);

    assert!(emitter.errors_detected());
    emitter.flush_all();
    assert!(emitter.sink().rows.is_empty());

    // A poisoned emit does not leak into the next one.
    emitter.emit_int(5);
    emitter.flush_all();
    assert_eq!(emitter.sink().rows.len(), 1);
}

#[test]
fn weight_shape_mismatch_is_an_error() {
    let mut ty = SzlType::table("maximum");
    ty.set_element("", SzlType::string())
        .set_weight("", SzlType::int())
        .set_param(2);
    let mut emitter = emitter_for(&ty, "t");

    emitter.begin(GroupKind::Emit, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.put_string("x");
    emitter.end(GroupKind::Element, 1);
    emitter.begin(GroupKind::Weight, 1);
    emitter.put_float(2.5); // weight type is int
    emitter.end(GroupKind::Weight, 1);
    emitter.end(GroupKind::Emit, 1);

    assert!(emitter.errors_detected());
}

#[test]
fn driver_merge_routes_to_entries() {
    let mut ty = SzlType::table("sum");
    ty.set_element("", SzlType::int());
    let mut a = emitter_for(&ty, "t");
    let mut b = emitter_for(&ty, "t");

    a.emit_int(4);
    b.emit_int(38);
    b.flush_all();
    let (key, val) = b.sink().rows[0].clone();
    a.merge(&key, &val).unwrap();

    a.flush_all();
    let mut dec = Decoder::new(&a.sink().rows[0].1);
    assert_eq!(dec.get_int().unwrap(), 2);
    assert_eq!(dec.get_int().unwrap(), 42);
}

#[test]
fn sharding_is_stable_for_aggregating_tables() {
    let mut ty = SzlType::table("sum");
    ty.set_element("", SzlType::int());
    let mut emitter = emitter_for(&ty, "t");
    let key = encoded_string("k");
    let first = emitter.shard_for_key(&key, 16);
    assert_eq!(first, emitter.shard_for_key(&key, 16));

    // Non-aggregating, index-less tables go round-robin.
    let mut cty = SzlType::table("collection");
    cty.set_element("", SzlType::int());
    let mut collection = emitter_for(&cty, "c");
    let shards: Vec<usize> = (0..4).map(|_| collection.shard_for_key(b"", 3)).collect();
    assert_eq!(shards, vec![0, 1, 2, 0]);
}

#[test]
fn seeded_sample_tables_reproduce() {
    let mut ty = SzlType::table("sample");
    ty.set_element("", SzlType::string()).set_param(4);
    let run = || {
        let mut emitter = seeded_emitter_for(&ty, "t", "retry-seed");
        for i in 0..64 {
            emit_string(&mut emitter, &format!("e{i}"));
        }
        emitter.flush_all();
        emitter.sink().rows.clone()
    };
    assert_eq!(run(), run());
}

#[test]
fn slot_order_violations_are_errors() {
    let mut ty = SzlType::table("sum");
    ty.set_element("", SzlType::int())
        .add_index("host", SzlType::string());
    let mut emitter = emitter_for(&ty, "t");

    // INDEX after ELEMENT violates the slot order.
    emitter.begin(GroupKind::Emit, 1);
    emitter.begin(GroupKind::Element, 1);
    emitter.put_int(1);
    emitter.end(GroupKind::Element, 1);
    emitter.begin(GroupKind::Index, 1);
    emitter.put_string("h");
    emitter.end(GroupKind::Index, 1);
    emitter.end(GroupKind::Emit, 1);
    assert!(emitter.errors_detected());
    emitter.flush_all();
    assert!(emitter.sink().rows.is_empty());
}

#[test]
fn emit_without_an_element_is_an_error() {
    let mut ty = SzlType::table("sum");
    ty.set_element("", SzlType::int());
    let mut emitter = emitter_for(&ty, "t");

    emitter.begin(GroupKind::Emit, 1);
    emitter.end(GroupKind::Emit, 1);
    assert!(emitter.errors_detected());
    emitter.flush_all();
    assert!(emitter.sink().rows.is_empty());
}
