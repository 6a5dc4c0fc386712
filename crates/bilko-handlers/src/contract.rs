// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input contracts declared by handlers and checked at compile time.
//!
//! A contract is a flat field list: required-ness, a value type, and an
//! optional enum of allowed values. Enums may be fixed or resolved lazily at
//! check time (for vocabularies only the handler's backing service knows).

use std::fmt;
use std::sync::Arc;

/// The value types a contract field can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
}

impl FieldType {
    /// The contract-facing name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Check a JSON value against this type.
    #[must_use]
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a field's allowed values come from.
#[derive(Clone)]
pub enum EnumSource {
    /// A fixed set of allowed values.
    Fixed(Vec<serde_json::Value>),
    /// Allowed values resolved at check time.
    Lazy(Arc<dyn Fn() -> Vec<serde_json::Value> + Send + Sync>),
}

impl EnumSource {
    /// Resolve the allowed values.
    #[must_use]
    pub fn resolve(&self) -> Vec<serde_json::Value> {
        match self {
            Self::Fixed(values) => values.clone(),
            Self::Lazy(f) => f(),
        }
    }
}

impl fmt::Debug for EnumSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(values) => f.debug_tuple("Fixed").field(values).finish(),
            Self::Lazy(_) => f.debug_tuple("Lazy").field(&"<fn>").finish(),
        }
    }
}

/// One field in an input contract.
#[derive(Debug, Clone)]
pub struct ContractField {
    /// Input key this field constrains.
    pub name: String,

    /// Whether the key must be present.
    pub required: bool,

    /// Required value type.
    pub field_type: FieldType,

    /// Optional set of allowed values.
    pub allowed: Option<EnumSource>,
}

impl ContractField {
    /// A required field of the given type.
    #[must_use]
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            required: true,
            field_type,
            allowed: None,
        }
    }

    /// An optional field of the given type.
    #[must_use]
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            required: false,
            field_type,
            allowed: None,
        }
    }

    /// Restrict the field to a fixed set of values.
    #[must_use]
    pub fn one_of(mut self, values: Vec<serde_json::Value>) -> Self {
        self.allowed = Some(EnumSource::Fixed(values));
        self
    }

    /// Restrict the field to values resolved at check time.
    #[must_use]
    pub fn one_of_lazy(
        mut self,
        resolve: impl Fn() -> Vec<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        self.allowed = Some(EnumSource::Lazy(Arc::new(resolve)));
        self
    }
}

/// An input contract a handler declares for its step type.
#[derive(Debug, Clone, Default)]
pub struct InputContract {
    /// Constrained fields. Keys not listed are unconstrained.
    pub fields: Vec<ContractField>,
}

impl InputContract {
    /// An empty contract constraining nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field constraint.
    #[must_use]
    pub fn field(mut self, field: ContractField) -> Self {
        self.fields.push(field);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_checks_cover_all_json_shapes() {
        assert!(FieldType::String.matches(&json!("x")));
        assert!(FieldType::Number.matches(&json!(1.5)));
        assert!(FieldType::Boolean.matches(&json!(true)));
        assert!(FieldType::Object.matches(&json!({})));
        assert!(FieldType::Array.matches(&json!([])));
        assert!(!FieldType::Array.matches(&json!({})));
        assert!(!FieldType::String.matches(&json!(1)));
    }

    #[test]
    fn lazy_enum_resolves_at_check_time() {
        let field = ContractField::required("model", FieldType::String)
            .one_of_lazy(|| vec![json!("small"), json!("large")]);
        let allowed = field.allowed.as_ref().unwrap().resolve();
        assert_eq!(allowed, vec![json!("small"), json!("large")]);
    }

    #[test]
    fn contract_builder_accumulates_fields() {
        let contract = InputContract::new()
            .field(ContractField::required("url", FieldType::String))
            .field(ContractField::optional("headers", FieldType::Object));
        assert_eq!(contract.fields.len(), 2);
        assert!(contract.fields[0].required);
        assert!(!contract.fields[1].required);
    }
}
