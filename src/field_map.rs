//! Per-record-type registry of queryable fields.
//!
//! A `FieldMap<T>` is built once per record type, usually at startup, and
//! only read afterwards. Names are matched case-insensitively. Each entry
//! holds an accessor closure over `T`, the static type and nullability of
//! the accessor's result, the storage names used by each backend, and the
//! capability flags that gate filtering, sorting and projection.

use crate::error::{Capability, CompileError};
use crate::value::{FieldType, Value, ValueType};
use bitflags::bitflags;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const FILTER = 1 << 0;
        const SORT = 1 << 1;
        const SELECT = 1 << 2;
    }
}

impl Capabilities {
    pub fn allows(self, capability: Capability) -> bool {
        self.contains(match capability {
            Capability::Filter => Capabilities::FILTER,
            Capability::Sort => Capabilities::SORT,
            Capability::Select => Capabilities::SELECT,
        })
    }
}

/// Reads a field's value out of a record.
pub type Accessor<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FieldMapError {
    #[error("field `{0}` is already registered")]
    Duplicate(String),
    #[error("field name must not be empty")]
    EmptyName,
}

/// One registered field.
pub struct Field<T> {
    name: String,
    column: String,
    property: Option<String>,
    value_type: ValueType,
    nullable: bool,
    capabilities: Capabilities,
    accessor: Accessor<T>,
}

impl<T: 'static> Field<T> {
    /// Registers `name` with every capability. The relational column
    /// defaults to `name`; the document property must be set explicitly.
    pub fn new<V, F>(name: impl Into<String>, accessor: F) -> Self
    where
        V: FieldType + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            property: None,
            value_type: V::VALUE_TYPE,
            nullable: V::NULLABLE,
            capabilities: Capabilities::all(),
            accessor: Arc::new(move |record: &T| accessor(record).into_value()),
        }
    }
}

impl<T> Field<T> {
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Sets both the relational column and the document property.
    pub fn stored_as(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.column(name.clone()).property(name)
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    pub fn property_name(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// Document property, or an error naming the field when none is mapped.
    pub fn require_property(&self) -> Result<&str, CompileError> {
        self.property_name()
            .ok_or_else(|| CompileError::UnmappedField {
                field: self.name.clone(),
                backend: "document",
            })
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn caps(&self) -> Capabilities {
        self.capabilities
    }

    pub fn read(&self, record: &T) -> Value {
        (self.accessor)(record)
    }

    /// Converts a literal to this field's type. `Null` is accepted only for
    /// nullable fields; numeric literals widen when exact.
    pub fn coerce(&self, value: &Value) -> Result<Value, CompileError> {
        let Some(actual) = value.value_type() else {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(CompileError::NullNotAllowed(self.name.clone()))
            };
        };
        value
            .clone()
            .coerce_to(self.value_type)
            .ok_or_else(|| CompileError::TypeMismatch {
                field: self.name.clone(),
                expected: self.value_type,
                actual,
            })
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            column: self.column.clone(),
            property: self.property.clone(),
            value_type: self.value_type,
            nullable: self.nullable,
            capabilities: self.capabilities,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("property", &self.property)
            .field("value_type", &self.value_type)
            .field("nullable", &self.nullable)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Case-insensitive registry of [`Field`]s for record type `T`.
pub struct FieldMap<T> {
    fields: Vec<Field<T>>,
    index: HashMap<String, usize>,
}

impl<T> FieldMap<T> {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a field, rejecting names already present in any letter case.
    pub fn register(&mut self, field: Field<T>) -> Result<&mut Self, FieldMapError> {
        if field.name.trim().is_empty() {
            return Err(FieldMapError::EmptyName);
        }
        let key = field.name.to_lowercase();
        if self.index.contains_key(&key) {
            return Err(FieldMapError::Duplicate(field.name));
        }
        self.index.insert(key, self.fields.len());
        self.fields.push(field);
        Ok(self)
    }

    /// Builder form of [`FieldMap::register`].
    pub fn with(mut self, field: Field<T>) -> Result<Self, FieldMapError> {
        self.register(field)?;
        Ok(self)
    }

    pub fn try_get(&self, name: &str) -> Option<&Field<T>> {
        self.index
            .get(&name.to_lowercase())
            .map(|&idx| &self.fields[idx])
    }

    /// Looks up `name` and checks it carries `capability`.
    pub fn resolve(&self, name: &str, capability: Capability) -> Result<&Field<T>, CompileError> {
        let field = self
            .try_get(name)
            .ok_or_else(|| CompileError::FieldNotFound(name.to_string()))?;
        if !field.capabilities.allows(capability) {
            return Err(CompileError::MissingCapability {
                field: field.name.clone(),
                capability,
            });
        }
        Ok(field)
    }

    pub fn can_filter(&self, name: &str) -> bool {
        self.has(name, Capability::Filter)
    }

    pub fn can_sort(&self, name: &str) -> bool {
        self.has(name, Capability::Sort)
    }

    pub fn can_select(&self, name: &str) -> bool {
        self.has(name, Capability::Select)
    }

    fn has(&self, name: &str, capability: Capability) -> bool {
        self.try_get(name)
            .is_some_and(|f| f.capabilities.allows(capability))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Field<T>> {
        self.fields.iter()
    }
}

impl<T> Default for FieldMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FieldMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.fields.iter()).finish()
    }
}
