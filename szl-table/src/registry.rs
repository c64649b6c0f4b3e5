use core::str::FromStr;

use hashbrown::HashMap;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use szl_types::{SzlType, TableProperties};

use crate::entry::{TableError, TableWriter};
use crate::kernels::{
    BootstrapSumWriter, CollectionWriter, DistinctSampleWriter, MaximumWriter, SampleWriter,
    SetWriter, SumWriter, TopWriter, UniqueWriter, WeightedSampleWriter,
};

/// The built-in table kinds, named as they appear in table declarations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum TableKind {
    Collection,
    Sum,
    Set,
    Sample,
    WeightedSample,
    Maximum,
    Minimum,
    Top,
    Unique,
    DistinctSample,
    BootstrapSum,
}

impl TableKind {
    pub fn properties(self) -> TableProperties {
        TableProperties {
            name: self.into(),
            has_param: !matches!(self, TableKind::Collection | TableKind::Sum),
            has_weight: matches!(
                self,
                TableKind::WeightedSample
                    | TableKind::Maximum
                    | TableKind::Minimum
                    | TableKind::Top
                    | TableKind::DistinctSample
            ),
        }
    }

    fn creator(self) -> WriterCreator {
        match self {
            TableKind::Collection => CollectionWriter::create,
            TableKind::Sum => SumWriter::create,
            TableKind::Set => SetWriter::create,
            TableKind::Sample => SampleWriter::create,
            TableKind::WeightedSample => WeightedSampleWriter::create,
            TableKind::Maximum | TableKind::Minimum => MaximumWriter::create,
            TableKind::Top => TopWriter::create,
            TableKind::Unique => UniqueWriter::create,
            TableKind::DistinctSample => DistinctSampleWriter::create,
            TableKind::BootstrapSum => BootstrapSumWriter::create,
        }
    }
}

/// Constructor for a kind's writer; validates the type it is given.
pub type WriterCreator = fn(&SzlType) -> Result<Box<dyn TableWriter>, TableError>;

/// Maps table-kind names to writer constructors.
///
/// `Registry::default()` installs the built-in kinds; embedders may
/// register additional ones under fresh names.
pub struct Registry {
    creators: HashMap<String, WriterCreator>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        use strum::IntoEnumIterator;
        for kind in TableKind::iter() {
            registry.register(kind.into(), kind.creator());
        }
        registry
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            creators: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, creator: WriterCreator) {
        self.creators.insert(name.to_owned(), creator);
    }

    /// Build a writer for a table type, validating structure, kind name
    /// and weight expectations.
    pub fn create(&self, ty: &SzlType) -> Result<Box<dyn TableWriter>, TableError> {
        ty.valid().map_err(TableError::InvalidType)?;
        let kind_name = ty
            .table_kind()
            .ok_or_else(|| TableError::InvalidType("not a table type".into()))?;
        let creator = self
            .creators
            .get(kind_name)
            .ok_or_else(|| TableError::UnknownKind(kind_name.to_owned()))?;

        if let Ok(kind) = TableKind::from_str(kind_name) {
            let props = kind.properties();
            if props.has_weight && !ty.has_weight() {
                return Err(TableError::InvalidType(format!(
                    "{kind_name} tables require a weight"
                )));
            }
            if !props.has_weight && ty.has_weight() {
                return Err(TableError::InvalidType(format!(
                    "{kind_name} tables do not take a weight"
                )));
            }
        }
        creator(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(kind: &str) -> SzlType {
        let mut ty = SzlType::table(kind);
        ty.set_element("", SzlType::string()).set_param(10);
        ty
    }

    #[test]
    fn kind_names_round_trip() {
        assert_eq!(TableKind::from_str("weightedsample").unwrap(), TableKind::WeightedSample);
        assert_eq!(TableKind::DistinctSample.to_string(), "distinctsample");
        assert!(TableKind::from_str("histogram").is_err());
    }

    #[test]
    fn builtin_kinds_resolve() {
        let registry = Registry::default();
        assert!(registry.create(&table("set")).is_ok());
        assert!(registry.create(&table("sample")).is_ok());
        assert!(registry.create(&table("unique")).is_ok());
        assert!(matches!(
            registry.create(&table("histogram")),
            Err(TableError::UnknownKind(_))
        ));
    }

    #[test]
    fn weight_expectations_are_enforced() {
        let registry = Registry::default();
        // maximum needs a weight.
        assert!(registry.create(&table("maximum")).is_err());
        let mut ok = table("maximum");
        ok.set_weight("", SzlType::int());
        assert!(registry.create(&ok).is_ok());
        // sum must not have one.
        let mut bad = table("sum");
        bad.set_weight("", SzlType::int());
        assert!(registry.create(&bad).is_err());
    }

    #[test]
    fn custom_kinds_can_be_registered() {
        let mut registry = Registry::empty();
        registry.register("mirror", CollectionWriter::create);
        let mut ty = SzlType::table("mirror");
        ty.set_element("", SzlType::int());
        assert!(registry.create(&ty).is_ok());
    }
}
