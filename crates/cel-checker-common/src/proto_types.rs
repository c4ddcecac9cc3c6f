//! Descriptor-backed registry for checking against protobuf message types.
//!
//! `ProtoTypeRegistry` wraps a `prost_reflect::DescriptorPool` and answers
//! the [`TypeRegistry`] questions from message and enum descriptors.

use prost_reflect::prost::Message;
use prost_reflect::{DescriptorError, DescriptorPool, FieldDescriptor, Kind};
use thiserror::Error;

use crate::registry::{message_to_cel_type, MessageType, TypeRegistry};
use crate::CelType;

/// Failure to load descriptors into a [`ProtoTypeRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid file descriptor set encoding: {0}")]
    Decode(#[from] prost_reflect::prost::DecodeError),
    #[error("invalid descriptors: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Registry for protobuf type information.
#[derive(Debug, Clone)]
pub struct ProtoTypeRegistry {
    pool: DescriptorPool,
}

impl ProtoTypeRegistry {
    /// Create a registry over the global descriptor pool.
    pub fn new() -> Self {
        Self {
            pool: DescriptorPool::global(),
        }
    }

    /// Create a registry from an existing descriptor pool.
    pub fn from_pool(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    /// Add file descriptors to the registry.
    ///
    /// The bytes should be a serialized `FileDescriptorSet`.
    pub fn add_file_descriptor_set(&mut self, bytes: &[u8]) -> Result<(), RegistryError> {
        let fds = prost_reflect::prost_types::FileDescriptorSet::decode(bytes)?;
        self.pool.add_file_descriptor_set(fds)?;
        Ok(())
    }

    /// Get the underlying descriptor pool.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Convert a field descriptor to a CEL type.
    fn field_to_cel_type(&self, field: &FieldDescriptor) -> CelType {
        if field.is_map() {
            // Map fields are repeated entries with `key` and `value` fields.
            if let Kind::Message(entry) = field.kind() {
                let key_type = entry
                    .get_field_by_name("key")
                    .map(|f| kind_to_cel_type(f.kind()))
                    .unwrap_or(CelType::Dyn);
                let value_type = entry
                    .get_field_by_name("value")
                    .map(|f| kind_to_cel_type(f.kind()))
                    .unwrap_or(CelType::Dyn);
                return CelType::map(key_type, value_type);
            }
            return CelType::map(CelType::Dyn, CelType::Dyn);
        }

        let base_type = kind_to_cel_type(field.kind());
        if field.is_list() {
            CelType::list(base_type)
        } else {
            base_type
        }
    }
}

impl Default for ProtoTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry for ProtoTypeRegistry {
    fn find_message(&self, name: &str) -> Option<MessageType> {
        let descriptor = self.pool.get_message_by_name(name)?;
        let mut message = MessageType::new(descriptor.full_name());
        for field in descriptor.fields() {
            let cel_type = self.field_to_cel_type(&field);
            message.fields.insert(field.name().to_string(), cel_type);
        }
        Some(message)
    }

    fn find_enum_value(&self, enum_name: &str, value_name: &str) -> Option<i32> {
        let descriptor = self.pool.get_enum_by_name(enum_name)?;
        let value = descriptor.get_value_by_name(value_name)?;
        Some(value.number())
    }

    fn find_field_type(&self, message: &str, field: &str) -> Option<CelType> {
        let descriptor = self.pool.get_message_by_name(message)?;
        let field = descriptor.get_field_by_name(field)?;
        Some(self.field_to_cel_type(&field))
    }
}

/// Convert a proto Kind to a CEL type.
fn kind_to_cel_type(kind: Kind) -> CelType {
    match kind {
        Kind::Bool => CelType::Bool,
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 | Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            CelType::Int
        }
        Kind::Uint32 | Kind::Fixed32 | Kind::Uint64 | Kind::Fixed64 => CelType::UInt,
        Kind::Float | Kind::Double => CelType::Double,
        Kind::String => CelType::String,
        Kind::Bytes => CelType::Bytes,
        Kind::Message(msg) => message_to_cel_type(msg.full_name()),
        Kind::Enum(e) if e.full_name() == "google.protobuf.NullValue" => CelType::Null,
        Kind::Enum(_) => CelType::Int,
    }
}
