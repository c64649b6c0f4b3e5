use crate::Kind;

/// A possibly-labelled component of a type (tuple field, table index,
/// element or weight slot).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SzlField {
    label: String,
    ty: SzlType,
}

impl SzlField {
    pub fn new(label: impl Into<String>, ty: SzlType) -> Self {
        Self {
            label: label.into(),
            ty,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ty(&self) -> &SzlType {
        &self.ty
    }
}

/// Structural type descriptor for output-table values.
///
/// Base kinds carry nothing extra. Tuples carry `fields`, arrays an
/// `element`, maps a key and value field. A `table` type names its table
/// kind and carries the aggregation parameter, indices, element and an
/// optional weight.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SzlType {
    kind: Kind,
    table: Option<String>,
    param: i64,
    element: Option<Box<SzlField>>,
    weight: Option<Box<SzlField>>,
    indices: Vec<SzlField>,
    fields: Vec<SzlField>,
}

impl SzlType {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            table: None,
            param: 0,
            element: None,
            weight: None,
            indices: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn bool() -> Self {
        Self::new(Kind::Bool)
    }

    pub fn bytes() -> Self {
        Self::new(Kind::Bytes)
    }

    pub fn fingerprint() -> Self {
        Self::new(Kind::Fingerprint)
    }

    pub fn float() -> Self {
        Self::new(Kind::Float)
    }

    pub fn int() -> Self {
        Self::new(Kind::Int)
    }

    pub fn string() -> Self {
        Self::new(Kind::String)
    }

    pub fn time() -> Self {
        Self::new(Kind::Time)
    }

    pub fn uint() -> Self {
        Self::new(Kind::Uint)
    }

    pub fn tuple_of(fields: Vec<SzlField>) -> Self {
        let mut ty = Self::new(Kind::Tuple);
        ty.fields = fields;
        ty
    }

    pub fn array_of(element: SzlType) -> Self {
        let mut ty = Self::new(Kind::Array);
        ty.element = Some(Box::new(SzlField::new("", element)));
        ty
    }

    /// Map key and value types are stored as the two `fields`.
    pub fn map_of(key: SzlType, value: SzlType) -> Self {
        let mut ty = Self::new(Kind::Map);
        ty.fields = vec![SzlField::new("", key), SzlField::new("", value)];
        ty
    }

    /// A table type of the named table kind, e.g. `"sum"` or `"top"`.
    pub fn table(table_kind: impl Into<String>) -> Self {
        let mut ty = Self::new(Kind::Table);
        ty.table = Some(table_kind.into());
        ty
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn table_kind(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn param(&self) -> i64 {
        self.param
    }

    pub fn set_param(&mut self, param: i64) -> &mut Self {
        self.param = param;
        self
    }

    pub fn element(&self) -> Option<&SzlField> {
        self.element.as_deref()
    }

    pub fn set_element(&mut self, label: impl Into<String>, ty: SzlType) -> &mut Self {
        self.element = Some(Box::new(SzlField::new(label, ty)));
        self
    }

    pub fn weight(&self) -> Option<&SzlField> {
        self.weight.as_deref()
    }

    pub fn has_weight(&self) -> bool {
        self.weight.is_some()
    }

    pub fn set_weight(&mut self, label: impl Into<String>, ty: SzlType) -> &mut Self {
        self.weight = Some(Box::new(SzlField::new(label, ty)));
        self
    }

    pub fn indices(&self) -> &[SzlField] {
        &self.indices
    }

    pub fn add_index(&mut self, label: impl Into<String>, ty: SzlType) -> &mut Self {
        self.indices.push(SzlField::new(label, ty));
        self
    }

    pub fn fields(&self) -> &[SzlField] {
        &self.fields
    }

    pub fn add_field(&mut self, label: impl Into<String>, ty: SzlType) -> &mut Self {
        self.fields.push(SzlField::new(label, ty));
        self
    }

    pub fn base_type(&self) -> bool {
        self.kind.is_base()
    }

    pub fn tuple_type(&self) -> bool {
        self.kind == Kind::Tuple
    }

    pub fn table_type(&self) -> bool {
        self.kind == Kind::Table
    }

    /// Structural well-formedness. Kernel-specific constraints (addable
    /// elements, ordered weights, parameter ranges) are the registry's job.
    pub fn valid(&self) -> Result<(), String> {
        match self.kind {
            Kind::Table => {
                if self.table.is_none() {
                    return Err("table type without a table kind name".into());
                }
                let element = self
                    .element
                    .as_ref()
                    .ok_or_else(|| String::from("table type without an element"))?;
                element.ty().valid()?;
                if let Some(weight) = &self.weight {
                    weight.ty().valid()?;
                }
                for index in &self.indices {
                    if !index.ty().base_type() {
                        return Err(format!(
                            "table index '{}' must have a base type",
                            index.label()
                        ));
                    }
                }
                Ok(())
            }
            Kind::Tuple => self.fields.iter().try_for_each(|f| f.ty().valid()),
            Kind::Array => self
                .element
                .as_ref()
                .ok_or_else(|| String::from("array type without an element type"))
                .and_then(|e| e.ty().valid()),
            Kind::Map => {
                if self.fields.len() != 2 {
                    return Err("map type must carry a key and a value type".into());
                }
                self.fields.iter().try_for_each(|f| f.ty().valid())
            }
            Kind::Void | Kind::Function => Err(format!("{} is not a value type", self.kind)),
            _ => Ok(()),
        }
    }
}

/// Static properties of a table kind, consulted by the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableProperties {
    pub name: &'static str,
    pub has_param: bool,
    pub has_weight: bool,
}
