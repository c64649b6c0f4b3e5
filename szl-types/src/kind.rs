use strum::{Display, EnumString};

/// Top-level kind of a Sawzall type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kind {
    Void,
    Bool,
    Bytes,
    Fingerprint,
    Float,
    Int,
    String,
    Time,
    Uint,
    Tuple,
    Array,
    Map,
    Table,
    Function,
}

impl Kind {
    /// Base kinds are the scalar leaves a flat value decomposes into.
    pub fn is_base(self) -> bool {
        matches!(
            self,
            Kind::Bool
                | Kind::Bytes
                | Kind::Fingerprint
                | Kind::Float
                | Kind::Int
                | Kind::String
                | Kind::Time
                | Kind::Uint
        )
    }
}
