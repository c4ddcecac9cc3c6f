//! Message type registry consulted by the checker.
//!
//! The checker only needs two questions answered: which fields (with which
//! CEL types) a message declares, and which number an enum value carries.
//! [`TypeRegistry`] is that seam; [`MessageRegistry`] is an in-memory
//! implementation and [`crate::ProtoTypeRegistry`] answers from protobuf
//! descriptors.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::{CelType, ANY_TYPE_NAME, DURATION_TYPE_NAME, TIMESTAMP_TYPE_NAME};

/// Read-only lookup of message and enum declarations.
///
/// Implementations must be safe to share between concurrent checks.
pub trait TypeRegistry: fmt::Debug + Send + Sync {
    /// Look up a message by fully qualified name.
    fn find_message(&self, name: &str) -> Option<MessageType>;

    /// Look up the number of `value_name` within the enum `enum_name`.
    fn find_enum_value(&self, enum_name: &str, value_name: &str) -> Option<i32>;

    /// Look up the CEL type of a single field.
    fn find_field_type(&self, message: &str, field: &str) -> Option<CelType> {
        self.find_message(message)?.field(field).cloned()
    }
}

/// A message declaration: its name and the CEL type of each field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageType {
    pub name: String,
    pub fields: BTreeMap<String, CelType>,
}

impl MessageType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, cel_type: CelType) -> Self {
        self.fields.insert(name.into(), cel_type);
        self
    }

    pub fn field(&self, name: &str) -> Option<&CelType> {
        self.fields.get(name)
    }
}

/// In-memory registry built from explicit declarations.
#[derive(Debug, Clone, Default)]
pub struct MessageRegistry {
    messages: HashMap<String, MessageType>,
    enums: HashMap<String, HashMap<String, i32>>,
}

impl MessageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with the protobuf well-known types.
    pub fn with_well_known_types() -> Self {
        let mut registry = Self::new();
        registry.add_well_known_types();
        registry
    }

    pub fn with_message(mut self, message: MessageType) -> Self {
        self.add_message(message);
        self
    }

    pub fn add_message(&mut self, message: MessageType) {
        self.messages.insert(message.name.clone(), message);
    }

    pub fn with_enum(mut self, name: impl Into<String>, values: &[(&str, i32)]) -> Self {
        self.add_enum(name, values);
        self
    }

    pub fn add_enum(&mut self, name: impl Into<String>, values: &[(&str, i32)]) {
        let values = values
            .iter()
            .map(|(value_name, number)| (value_name.to_string(), *number))
            .collect();
        self.enums.insert(name.into(), values);
    }

    fn add_well_known_types(&mut self) {
        let wrappers = [
            ("google.protobuf.BoolValue", CelType::Bool),
            ("google.protobuf.BytesValue", CelType::Bytes),
            ("google.protobuf.DoubleValue", CelType::Double),
            ("google.protobuf.FloatValue", CelType::Double),
            ("google.protobuf.Int32Value", CelType::Int),
            ("google.protobuf.Int64Value", CelType::Int),
            ("google.protobuf.StringValue", CelType::String),
            ("google.protobuf.UInt32Value", CelType::UInt),
            ("google.protobuf.UInt64Value", CelType::UInt),
        ];
        for (name, value_type) in wrappers {
            self.add_message(MessageType::new(name).with_field("value", value_type));
        }

        for name in [TIMESTAMP_TYPE_NAME, DURATION_TYPE_NAME] {
            self.add_message(
                MessageType::new(name)
                    .with_field("seconds", CelType::Int)
                    .with_field("nanos", CelType::Int),
            );
        }
        self.add_message(
            MessageType::new(ANY_TYPE_NAME)
                .with_field("type_url", CelType::String)
                .with_field("value", CelType::Bytes),
        );
        self.add_message(
            MessageType::new("google.protobuf.Struct")
                .with_field("fields", CelType::map(CelType::String, CelType::Dyn)),
        );
        self.add_message(
            MessageType::new("google.protobuf.ListValue")
                .with_field("values", CelType::list(CelType::Dyn)),
        );
        self.add_message(
            MessageType::new("google.protobuf.Value")
                .with_field("null_value", CelType::Null)
                .with_field("number_value", CelType::Double)
                .with_field("string_value", CelType::String)
                .with_field("bool_value", CelType::Bool)
                .with_field("struct_value", CelType::map(CelType::String, CelType::Dyn))
                .with_field("list_value", CelType::list(CelType::Dyn)),
        );
        self.add_enum("google.protobuf.NullValue", &[("NULL_VALUE", 0)]);
    }
}

impl TypeRegistry for MessageRegistry {
    fn find_message(&self, name: &str) -> Option<MessageType> {
        self.messages.get(name).cloned()
    }

    fn find_enum_value(&self, enum_name: &str, value_name: &str) -> Option<i32> {
        self.enums.get(enum_name)?.get(value_name).copied()
    }

    fn find_field_type(&self, message: &str, field: &str) -> Option<CelType> {
        self.messages.get(message)?.field(field).cloned()
    }
}

/// Convert a message type name to its CEL type representation.
///
/// Well-known types are mapped onto the CEL types they stand for:
/// - Wrapper types -> `CelType::Wrapper(inner)`
/// - `google.protobuf.Value` -> `CelType::Dyn`
/// - `google.protobuf.ListValue` -> `list(dyn)`
/// - `google.protobuf.Struct` -> `map(string, dyn)`
/// - `google.protobuf.NullValue` -> `null_type`
/// - Any other message, including Any, Timestamp and Duration -> `CelType::Message(name)`
pub fn message_to_cel_type(full_name: &str) -> CelType {
    match full_name {
        "google.protobuf.BoolValue" => CelType::wrapper(CelType::Bool),
        "google.protobuf.BytesValue" => CelType::wrapper(CelType::Bytes),
        "google.protobuf.DoubleValue" | "google.protobuf.FloatValue" => {
            CelType::wrapper(CelType::Double)
        }
        "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => {
            CelType::wrapper(CelType::Int)
        }
        "google.protobuf.StringValue" => CelType::wrapper(CelType::String),
        "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
            CelType::wrapper(CelType::UInt)
        }
        "google.protobuf.Value" => CelType::Dyn,
        "google.protobuf.ListValue" => CelType::list(CelType::Dyn),
        "google.protobuf.Struct" => CelType::map(CelType::String, CelType::Dyn),
        "google.protobuf.NullValue" => CelType::Null,
        _ => CelType::message(full_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_type_mapping() {
        assert_eq!(
            message_to_cel_type("google.protobuf.Int64Value"),
            CelType::wrapper(CelType::Int)
        );
        assert_eq!(
            message_to_cel_type("google.protobuf.Struct"),
            CelType::map(CelType::String, CelType::Dyn)
        );
        assert_eq!(message_to_cel_type("google.protobuf.Value"), CelType::Dyn);
        assert_eq!(message_to_cel_type(TIMESTAMP_TYPE_NAME), CelType::timestamp());
    }

    #[test]
    fn test_regular_message_type() {
        assert_eq!(
            message_to_cel_type("my.package.MyMessage"),
            CelType::message("my.package.MyMessage")
        );
    }

    #[test]
    fn test_message_registry_lookup() {
        let registry = MessageRegistry::new()
            .with_message(MessageType::new("pkg.Msg").with_field("id", CelType::Int))
            .with_enum("pkg.Color", &[("RED", 0), ("BLUE", 2)]);

        assert_eq!(registry.find_field_type("pkg.Msg", "id"), Some(CelType::Int));
        assert_eq!(registry.find_field_type("pkg.Msg", "missing"), None);
        assert!(registry.find_message("pkg.Other").is_none());
        assert_eq!(registry.find_enum_value("pkg.Color", "BLUE"), Some(2));
        assert_eq!(registry.find_enum_value("pkg.Color", "GREEN"), None);
    }

    #[test]
    fn test_well_known_registry() {
        let registry = MessageRegistry::with_well_known_types();
        assert_eq!(
            registry.find_field_type("google.protobuf.Int64Value", "value"),
            Some(CelType::Int)
        );
        assert_eq!(registry.find_enum_value("google.protobuf.NullValue", "NULL_VALUE"), Some(0));
    }
}
