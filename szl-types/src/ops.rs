use core::cmp::Ordering;
use core::mem;

use thiserror::Error;

use crate::{Kind, SzlType, TypedValue};

/// Errors from positional value operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("type is not numeric")]
    NotNumeric,
    #[error("type has no flat leaf representation")]
    NotFlat,
    #[error("value shape does not match its type")]
    ShapeMismatch,
    #[error("leaf position {0} out of range")]
    Position(usize),
}

/// Positional leaf operations over [`TypedValue`]s of one type.
///
/// A flat type (a base type, or a tuple whose leaves are all base types)
/// exposes its leaves in declaration order; `nflats` counts them. The
/// arithmetic, comparison and leaf-assignment operations below are all
/// positional over that sequence — order matters and is stable.
#[derive(Debug, Clone)]
pub struct ValueOps {
    ty: SzlType,
    flats: Option<Vec<Kind>>,
}

impl ValueOps {
    pub fn new(ty: &SzlType) -> Self {
        Self {
            flats: flat_kinds(ty),
            ty: ty.clone(),
        }
    }

    pub fn ty(&self) -> &SzlType {
        &self.ty
    }

    /// Number of scalar leaves of a flat type; 1 for non-flat types.
    pub fn nflats(&self) -> usize {
        self.flats.as_ref().map_or(1, Vec::len)
    }

    pub fn flat_kind(&self, pos: usize) -> Option<Kind> {
        self.flats.as_ref().and_then(|f| f.get(pos)).copied()
    }

    /// Numeric types support component-wise add/subtract/negate:
    /// int, uint, float, and tuples whose leaves are all numeric.
    pub fn is_numeric(ty: &SzlType) -> bool {
        match ty.kind() {
            Kind::Int | Kind::Uint | Kind::Float => true,
            Kind::Tuple => {
                !ty.fields().is_empty() && ty.fields().iter().all(|f| Self::is_numeric(f.ty()))
            }
            _ => false,
        }
    }

    pub fn is_addable(ty: &SzlType) -> bool {
        Self::is_numeric(ty)
    }

    /// Ordered types support the lexicographic compare used for weights.
    pub fn is_ordered(ty: &SzlType) -> bool {
        match ty.kind() {
            kind if kind.is_base() => true,
            Kind::Tuple => {
                !ty.fields().is_empty() && ty.fields().iter().all(|f| Self::is_ordered(f.ty()))
            }
            _ => false,
        }
    }

    /// The zero value of this type, with composite shape materialized.
    pub fn zero(&self) -> TypedValue {
        zero_of(&self.ty)
    }

    /// `dst += src`, component-wise over numeric leaves.
    pub fn add(&self, src: &TypedValue, dst: &mut TypedValue) -> Result<(), ValueError> {
        if !Self::is_numeric(&self.ty) {
            return Err(ValueError::NotNumeric);
        }
        add_value(src, dst)
    }

    /// `dst -= src`, component-wise over numeric leaves.
    pub fn sub(&self, src: &TypedValue, dst: &mut TypedValue) -> Result<(), ValueError> {
        if !Self::is_numeric(&self.ty) {
            return Err(ValueError::NotNumeric);
        }
        sub_value(src, dst)
    }

    pub fn negate(&self, v: &TypedValue) -> Result<TypedValue, ValueError> {
        if !Self::is_numeric(&self.ty) {
            return Err(ValueError::NotNumeric);
        }
        negate_value(v)
    }

    /// Lexicographic compare over the flat leaf sequence.
    pub fn cmp(&self, a: &TypedValue, b: &TypedValue) -> Ordering {
        cmp_value(a, b)
    }

    pub fn less(&self, a: &TypedValue, b: &TypedValue) -> bool {
        self.cmp(a, b) == Ordering::Less
    }

    /// Compare the `pos`-th leaf of `a` against the `pos`-th leaf of `b`.
    pub fn less_at_pos(&self, a: &TypedValue, pos: usize, b: &TypedValue) -> bool {
        match (leaf_at(a, pos), leaf_at(b, pos)) {
            (Some(la), Some(lb)) => cmp_value(la, lb) == Ordering::Less,
            _ => false,
        }
    }

    /// Copy the `pos`-th leaf of `src` into the `pos`-th leaf of `dst`.
    pub fn assign_at_pos(
        &self,
        src: &TypedValue,
        pos: usize,
        dst: &mut TypedValue,
    ) -> Result<(), ValueError> {
        let leaf = leaf_at(src, pos).ok_or(ValueError::Position(pos))?.clone();
        let slot = leaf_at_mut(dst, pos).ok_or(ValueError::Position(pos))?;
        *slot = leaf;
        Ok(())
    }

    /// Render each leaf as an f64, in leaf order.
    pub fn to_float(&self, v: &TypedValue, out: &mut Vec<f64>) {
        out.clear();
        collect_floats(v, out);
    }

    pub fn put_bool(&self, pos: usize, b: bool, dst: &mut TypedValue) -> Result<(), ValueError> {
        self.set_leaf(pos, TypedValue::Bool(b), dst)
    }

    pub fn put_int(&self, pos: usize, i: i64, dst: &mut TypedValue) -> Result<(), ValueError> {
        self.set_leaf(pos, TypedValue::Int(i), dst)
    }

    pub fn put_uint(&self, pos: usize, u: u64, dst: &mut TypedValue) -> Result<(), ValueError> {
        self.set_leaf(pos, TypedValue::Uint(u), dst)
    }

    pub fn put_float(&self, pos: usize, f: f64, dst: &mut TypedValue) -> Result<(), ValueError> {
        self.set_leaf(pos, TypedValue::Float(f), dst)
    }

    pub fn put_fingerprint(
        &self,
        pos: usize,
        fp: u64,
        dst: &mut TypedValue,
    ) -> Result<(), ValueError> {
        self.set_leaf(pos, TypedValue::Fingerprint(fp), dst)
    }

    pub fn put_time(&self, pos: usize, t: u64, dst: &mut TypedValue) -> Result<(), ValueError> {
        self.set_leaf(pos, TypedValue::Time(t), dst)
    }

    pub fn put_bytes(&self, pos: usize, b: &[u8], dst: &mut TypedValue) -> Result<(), ValueError> {
        self.set_leaf(pos, TypedValue::Bytes(b.to_vec()), dst)
    }

    pub fn put_string(&self, pos: usize, s: &str, dst: &mut TypedValue) -> Result<(), ValueError> {
        self.set_leaf(pos, TypedValue::Str(s.to_owned()), dst)
    }

    /// Estimated heap bytes held by `v`.
    pub fn memory(&self, v: &TypedValue) -> usize {
        mem_value(v)
    }

    fn set_leaf(&self, pos: usize, leaf: TypedValue, dst: &mut TypedValue) -> Result<(), ValueError> {
        let flats = self.flats.as_ref().ok_or(ValueError::NotFlat)?;
        let expected = *flats.get(pos).ok_or(ValueError::Position(pos))?;
        if leaf.kind() != expected {
            return Err(ValueError::ShapeMismatch);
        }
        let slot = leaf_at_mut(dst, pos).ok_or(ValueError::Position(pos))?;
        *slot = leaf;
        Ok(())
    }
}

/// Heap orientation for the bounded heaps: which element counts as *worst*
/// (kept at the top, next to be evicted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightOrd {
    /// Keep the biggest weights; the smallest sits at the top.
    KeepBiggest,
    /// Keep the smallest weights; the biggest sits at the top.
    KeepSmallest,
}

impl WeightOrd {
    /// True when `a` belongs nearer the top of the heap than `b`.
    pub fn before(self, ops: &ValueOps, a: &TypedValue, b: &TypedValue) -> bool {
        match self {
            WeightOrd::KeepBiggest => ops.cmp(a, b) == Ordering::Less,
            WeightOrd::KeepSmallest => ops.cmp(a, b) == Ordering::Greater,
        }
    }
}

fn flat_kinds(ty: &SzlType) -> Option<Vec<Kind>> {
    match ty.kind() {
        kind if kind.is_base() => Some(vec![kind]),
        Kind::Tuple => {
            let mut all = Vec::with_capacity(ty.fields().len());
            for field in ty.fields() {
                all.extend(flat_kinds(field.ty())?);
            }
            Some(all)
        }
        _ => None,
    }
}

fn zero_of(ty: &SzlType) -> TypedValue {
    match ty.kind() {
        Kind::Bool => TypedValue::Bool(false),
        Kind::Int => TypedValue::Int(0),
        Kind::Uint => TypedValue::Uint(0),
        Kind::Float => TypedValue::Float(0.0),
        Kind::Fingerprint => TypedValue::Fingerprint(0),
        Kind::Time => TypedValue::Time(0),
        Kind::Bytes => TypedValue::Bytes(Vec::new()),
        Kind::String => TypedValue::Str(String::new()),
        Kind::Tuple => TypedValue::Tuple(ty.fields().iter().map(|f| zero_of(f.ty())).collect()),
        Kind::Array => TypedValue::Array(Vec::new()),
        _ => TypedValue::Map(Vec::new()),
    }
}

fn add_value(src: &TypedValue, dst: &mut TypedValue) -> Result<(), ValueError> {
    match (src, dst) {
        (TypedValue::Int(a), TypedValue::Int(b)) => *b = b.wrapping_add(*a),
        (TypedValue::Uint(a), TypedValue::Uint(b)) => *b = b.wrapping_add(*a),
        (TypedValue::Float(a), TypedValue::Float(b)) => *b += *a,
        (TypedValue::Tuple(xs), TypedValue::Tuple(ys)) if xs.len() == ys.len() => {
            for (x, y) in xs.iter().zip(ys.iter_mut()) {
                add_value(x, y)?;
            }
        }
        _ => return Err(ValueError::ShapeMismatch),
    }
    Ok(())
}

fn sub_value(src: &TypedValue, dst: &mut TypedValue) -> Result<(), ValueError> {
    match (src, dst) {
        (TypedValue::Int(a), TypedValue::Int(b)) => *b = b.wrapping_sub(*a),
        (TypedValue::Uint(a), TypedValue::Uint(b)) => *b = b.wrapping_sub(*a),
        (TypedValue::Float(a), TypedValue::Float(b)) => *b -= *a,
        (TypedValue::Tuple(xs), TypedValue::Tuple(ys)) if xs.len() == ys.len() => {
            for (x, y) in xs.iter().zip(ys.iter_mut()) {
                sub_value(x, y)?;
            }
        }
        _ => return Err(ValueError::ShapeMismatch),
    }
    Ok(())
}

fn negate_value(v: &TypedValue) -> Result<TypedValue, ValueError> {
    Ok(match v {
        TypedValue::Int(i) => TypedValue::Int(i.wrapping_neg()),
        TypedValue::Uint(u) => TypedValue::Uint(u.wrapping_neg()),
        TypedValue::Float(f) => TypedValue::Float(-f),
        TypedValue::Tuple(xs) => {
            TypedValue::Tuple(xs.iter().map(negate_value).collect::<Result<_, _>>()?)
        }
        _ => return Err(ValueError::ShapeMismatch),
    })
}

fn cmp_value(a: &TypedValue, b: &TypedValue) -> Ordering {
    match (a, b) {
        (TypedValue::Bool(x), TypedValue::Bool(y)) => x.cmp(y),
        (TypedValue::Int(x), TypedValue::Int(y)) => x.cmp(y),
        (TypedValue::Uint(x), TypedValue::Uint(y)) => x.cmp(y),
        (TypedValue::Fingerprint(x), TypedValue::Fingerprint(y)) => x.cmp(y),
        (TypedValue::Time(x), TypedValue::Time(y)) => x.cmp(y),
        (TypedValue::Float(x), TypedValue::Float(y)) => x.total_cmp(y),
        (TypedValue::Bytes(x), TypedValue::Bytes(y)) => x.cmp(y),
        (TypedValue::Str(x), TypedValue::Str(y)) => x.cmp(y),
        (TypedValue::Tuple(xs), TypedValue::Tuple(ys)) => {
            for (x, y) in xs.iter().zip(ys.iter()) {
                let ord = cmp_value(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        _ => Ordering::Equal,
    }
}

fn leaf_at(v: &TypedValue, pos: usize) -> Option<&TypedValue> {
    let mut pos = pos;
    leaf_ref(v, &mut pos)
}

fn leaf_ref<'v>(v: &'v TypedValue, pos: &mut usize) -> Option<&'v TypedValue> {
    if let TypedValue::Tuple(fields) = v {
        for field in fields {
            if let Some(leaf) = leaf_ref(field, pos) {
                return Some(leaf);
            }
        }
        None
    } else if *pos == 0 {
        Some(v)
    } else {
        *pos -= 1;
        None
    }
}

fn leaf_at_mut(v: &mut TypedValue, pos: usize) -> Option<&mut TypedValue> {
    let mut pos = pos;
    leaf_ref_mut(v, &mut pos)
}

fn leaf_ref_mut<'v>(v: &'v mut TypedValue, pos: &mut usize) -> Option<&'v mut TypedValue> {
    if let TypedValue::Tuple(fields) = v {
        for field in fields {
            if let Some(leaf) = leaf_ref_mut(field, pos) {
                return Some(leaf);
            }
        }
        None
    } else if *pos == 0 {
        Some(v)
    } else {
        *pos -= 1;
        None
    }
}

fn collect_floats(v: &TypedValue, out: &mut Vec<f64>) {
    match v {
        TypedValue::Bool(b) => out.push(if *b { 1.0 } else { 0.0 }),
        TypedValue::Int(i) => out.push(*i as f64),
        TypedValue::Uint(u) => out.push(*u as f64),
        TypedValue::Float(f) => out.push(*f),
        TypedValue::Fingerprint(fp) => out.push(*fp as f64),
        TypedValue::Time(t) => out.push(*t as f64),
        TypedValue::Tuple(fields) => fields.iter().for_each(|f| collect_floats(f, out)),
        _ => out.push(0.0),
    }
}

fn mem_value(v: &TypedValue) -> usize {
    mem::size_of::<TypedValue>()
        + match v {
            TypedValue::Bytes(b) => b.len(),
            TypedValue::Str(s) => s.len(),
            TypedValue::Array(xs) | TypedValue::Tuple(xs) => xs.iter().map(mem_value).sum(),
            TypedValue::Map(pairs) => pairs
                .iter()
                .map(|(k, v)| mem_value(k) + mem_value(v))
                .sum(),
            _ => 0,
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SzlField;

    fn pair_type() -> SzlType {
        SzlType::tuple_of(vec![
            SzlField::new("count", SzlType::int()),
            SzlField::new("mass", SzlType::float()),
        ])
    }

    #[test]
    fn numeric_classification() {
        assert!(ValueOps::is_numeric(&SzlType::int()));
        assert!(ValueOps::is_numeric(&pair_type()));
        assert!(!ValueOps::is_numeric(&SzlType::string()));
        assert!(!ValueOps::is_numeric(&SzlType::array_of(SzlType::int())));
        assert!(ValueOps::is_ordered(&SzlType::string()));
        assert!(!ValueOps::is_ordered(&SzlType::map_of(
            SzlType::string(),
            SzlType::int()
        )));
    }

    #[test]
    fn tuple_add_is_component_wise() {
        let ops = ValueOps::new(&pair_type());
        let mut sum = ops.zero();
        let v = TypedValue::Tuple(vec![TypedValue::Int(2), TypedValue::Float(0.5)]);
        ops.add(&v, &mut sum).unwrap();
        ops.add(&v, &mut sum).unwrap();
        assert_eq!(
            sum,
            TypedValue::Tuple(vec![TypedValue::Int(4), TypedValue::Float(1.0)])
        );
        ops.sub(&v, &mut sum).unwrap();
        assert_eq!(
            sum,
            TypedValue::Tuple(vec![TypedValue::Int(2), TypedValue::Float(0.5)])
        );
    }

    #[test]
    fn add_rejects_shape_mismatch() {
        let ops = ValueOps::new(&pair_type());
        let mut sum = ops.zero();
        assert_eq!(
            ops.add(&TypedValue::Int(1), &mut sum),
            Err(ValueError::ShapeMismatch)
        );
    }

    #[test]
    fn positional_access_flattens_nested_tuples() {
        let nested = SzlType::tuple_of(vec![
            SzlField::new("a", SzlType::int()),
            SzlField::new("bc", pair_type()),
        ]);
        let ops = ValueOps::new(&nested);
        assert_eq!(ops.nflats(), 3);

        let mut v = ops.zero();
        ops.put_int(0, 7, &mut v).unwrap();
        ops.put_int(1, 8, &mut v).unwrap();
        ops.put_float(2, 9.5, &mut v).unwrap();
        assert_eq!(
            v,
            TypedValue::Tuple(vec![
                TypedValue::Int(7),
                TypedValue::Tuple(vec![TypedValue::Int(8), TypedValue::Float(9.5)]),
            ])
        );

        let mut w = ops.zero();
        ops.assign_at_pos(&v, 2, &mut w).unwrap();
        assert!(ops.less_at_pos(&w, 0, &v));
        assert!(!ops.less_at_pos(&w, 2, &v));
    }

    #[test]
    fn put_with_wrong_kind_is_a_shape_error() {
        let ops = ValueOps::new(&SzlType::int());
        let mut v = ops.zero();
        assert_eq!(
            ops.put_float(0, 1.0, &mut v),
            Err(ValueError::ShapeMismatch)
        );
        assert_eq!(ops.put_int(1, 1, &mut v), Err(ValueError::Position(1)));
    }

    #[test]
    fn lexicographic_compare_over_leaves() {
        let ops = ValueOps::new(&pair_type());
        let a = TypedValue::Tuple(vec![TypedValue::Int(1), TypedValue::Float(9.0)]);
        let b = TypedValue::Tuple(vec![TypedValue::Int(2), TypedValue::Float(0.0)]);
        assert!(ops.less(&a, &b));
        assert!(WeightOrd::KeepBiggest.before(&ops, &a, &b));
        assert!(WeightOrd::KeepSmallest.before(&ops, &b, &a));
    }

    #[test]
    fn negate_and_to_float() {
        let ops = ValueOps::new(&pair_type());
        let v = TypedValue::Tuple(vec![TypedValue::Int(3), TypedValue::Float(-2.5)]);
        let n = ops.negate(&v).unwrap();
        assert_eq!(
            n,
            TypedValue::Tuple(vec![TypedValue::Int(-3), TypedValue::Float(2.5)])
        );
        let mut floats = Vec::new();
        ops.to_float(&v, &mut floats);
        assert_eq!(floats, vec![3.0, -2.5]);
    }
}
