//! Declarative input descriptors and the JSON Schema they expand into
//!
//! Tools, prompts and resources describe their arguments as an ordered map of
//! field descriptors. The map is either built in code or deserialized from the
//! short declarative form `{"a": {"type": "number", "description": "..."}}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldDescriptor>>,
    #[serde(default)]
    pub optional: bool,
}

impl FieldDescriptor {
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            description: None,
            enum_values: None,
            default: None,
            items: None,
            optional: false,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn array(items: FieldDescriptor) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(FieldType::Array)
        }
    }

    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// JSON Schema fragment for this field alone.
    pub fn to_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.kind));
        if let Some(description) = &self.description {
            schema.insert("description".to_string(), json!(description));
        }
        if let Some(values) = &self.enum_values {
            schema.insert("enum".to_string(), json!(values));
        }
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.clone());
        }
        if let Some(items) = &self.items {
            schema.insert("items".to_string(), items.to_schema());
        }
        Value::Object(schema)
    }
}

/// Ordered field-descriptor map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFields(Vec<(String, FieldDescriptor)>);

impl InputFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing an earlier field of the same name in place.
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = descriptor,
            None => self.0.push((name, descriptor)),
        }
        self
    }

    /// Accepts the declarative JSON form. Every entry must deserialize as a
    /// [`FieldDescriptor`].
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let map: Map<String, Value> = serde_json::from_value(value)?;
        map.into_iter()
            .map(|(name, descriptor)| Ok((name, serde_json::from_value(descriptor)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .map(Self)
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.0
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.0
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSchema {
    pub schema: Value,
    pub required: Vec<String>,
}

pub fn build_schema(fields: Option<&InputFields>) -> BuiltSchema {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for (name, descriptor) in fields.into_iter().flat_map(InputFields::iter) {
        if !descriptor.optional {
            required.push(name.to_string());
        }
        properties.insert(name.to_string(), descriptor.to_schema());
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }

    BuiltSchema {
        schema: Value::Object(schema),
        required,
    }
}
