use crate::Kind;

/// A tagged Sawzall output value.
///
/// Composite values own their children. `Bytes` carries arbitrary bytes
/// with no null interpretation; `Str` length is in encoded UTF-8 bytes,
/// not code points. Maps preserve insertion order of their pairs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypedValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Fingerprint(u64),
    Time(u64),
    Bytes(Vec<u8>),
    Str(String),
    Array(Vec<TypedValue>),
    Tuple(Vec<TypedValue>),
    Map(Vec<(TypedValue, TypedValue)>),
}

/// A weight is a [`TypedValue`] whose type the owning [`crate::ValueOps`]
/// has verified to be numeric.
pub type Weight = TypedValue;

impl TypedValue {
    pub fn kind(&self) -> Kind {
        match self {
            TypedValue::Bool(_) => Kind::Bool,
            TypedValue::Int(_) => Kind::Int,
            TypedValue::Uint(_) => Kind::Uint,
            TypedValue::Float(_) => Kind::Float,
            TypedValue::Fingerprint(_) => Kind::Fingerprint,
            TypedValue::Time(_) => Kind::Time,
            TypedValue::Bytes(_) => Kind::Bytes,
            TypedValue::Str(_) => Kind::String,
            TypedValue::Array(_) => Kind::Array,
            TypedValue::Tuple(_) => Kind::Tuple,
            TypedValue::Map(_) => Kind::Map,
        }
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        TypedValue::Bool(b)
    }
}

impl From<i64> for TypedValue {
    fn from(i: i64) -> Self {
        TypedValue::Int(i)
    }
}

impl From<f64> for TypedValue {
    fn from(f: f64) -> Self {
        TypedValue::Float(f)
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::Str(s.to_owned())
    }
}

impl From<&[u8]> for TypedValue {
    fn from(b: &[u8]) -> Self {
        TypedValue::Bytes(b.to_vec())
    }
}
