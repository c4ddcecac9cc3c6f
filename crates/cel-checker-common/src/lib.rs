//! Common types for the CEL checker: type model, values, expression tree,
//! declarations and the message registry seam.
//!
//! This crate provides the vocabulary shared by the checker and its callers:
//!
//! - **Type Model**: `CelType`, the closed set of CEL types including the
//!   checking-only variants (`TypeParam`, `Function`, `Error`).
//! - **Values**: `CelValue` for literal and enum constants.
//! - **Expression Tree**: `Expr` with stable per-node ids, plus `ExprFactory`
//!   for building trees (including the standard macro expansions).
//! - **Declarations**: `VariableDecl`, `OverloadDecl`, `FunctionDecl`.
//! - **Registry**: `TypeRegistry` with in-memory and descriptor-backed implementations.
//! - **Diagnostics**: `CheckError` and `CheckErrorKind`.

use std::fmt;
use std::sync::Arc;

mod ast;
pub use ast::{Expr, ExprFactory, ExprKind, ListElement, MapEntry, StructField, ACCUMULATOR_VAR};

mod decls;
pub use decls::{FunctionDecl, OverloadDecl, VariableDecl};

mod error;
pub use error::{CheckError, CheckErrorKind};

pub mod operators;

pub mod registry;
pub use registry::{message_to_cel_type, MessageRegistry, MessageType, TypeRegistry};

pub mod proto_types;
pub use proto_types::{ProtoTypeRegistry, RegistryError};

/// Fully qualified name of the timestamp message.
pub const TIMESTAMP_TYPE_NAME: &str = "google.protobuf.Timestamp";
/// Fully qualified name of the duration message.
pub const DURATION_TYPE_NAME: &str = "google.protobuf.Duration";
/// Fully qualified name of the any message.
pub const ANY_TYPE_NAME: &str = "google.protobuf.Any";

// ==================== CelValue ====================

/// A constant bound to an identifier at check time, such as an enum value.
#[derive(Debug, Clone, PartialEq)]
pub enum CelValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl CelValue {
    pub fn cel_type(&self) -> CelType {
        match self {
            CelValue::Null => CelType::Null,
            CelValue::Bool(_) => CelType::Bool,
            CelValue::Int(_) => CelType::Int,
            CelValue::UInt(_) => CelType::UInt,
            CelValue::Double(_) => CelType::Double,
            CelValue::String(_) => CelType::String,
            CelValue::Bytes(_) => CelType::Bytes,
        }
    }
}

impl fmt::Display for CelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CelValue::Null => write!(f, "null"),
            CelValue::Bool(v) => write!(f, "{}", v),
            CelValue::Int(v) => write!(f, "{}", v),
            CelValue::UInt(v) => write!(f, "{}u", v),
            CelValue::Double(v) => write!(f, "{}", v),
            CelValue::String(v) => write!(f, "{:?}", v),
            CelValue::Bytes(v) => write!(f, "b\"{}\"", String::from_utf8_lossy(v)),
        }
    }
}

// ==================== CelType ====================

/// CEL types as seen by the checker.
///
/// Every variant has a stable discriminant (see [`CelType::kind`]) and a
/// canonical textual form (see [`CelType::display_name`]) used in
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CelType {
    // ==================== Scalars ====================
    /// Boolean type
    Bool,
    /// Signed 64-bit integer
    Int,
    /// Unsigned 64-bit integer
    UInt,
    /// 64-bit floating point
    Double,
    /// Unicode string
    String,
    /// Byte sequence
    Bytes,
    /// The type of `null`
    Null,
    /// Dynamic type, compatible with every other type
    Dyn,

    // ==================== Parameterized Collections ====================
    /// Homogeneous list: `list(T)`
    List(Arc<CelType>),
    /// Key-value map: `map(K, V)`
    Map(Arc<CelType>, Arc<CelType>),

    // ==================== Named Types ====================
    /// Message type with fully qualified name.
    Message(Arc<str>),
    /// Nullable well-known wrapper around a primitive (`google.protobuf.Int64Value`).
    Wrapper(Arc<CelType>),
    /// Type value: `type(T)`.
    Type(Arc<CelType>),
    /// Application-defined type with optional type parameters.
    Opaque {
        name: Arc<str>,
        params: Arc<[CelType]>,
    },
    /// Optional value: `optional_type(T)`.
    Optional(Arc<CelType>),

    // ==================== Type Checking Types ====================
    /// An overload signature packed as `(result, params...)`.
    Function {
        result: Arc<CelType>,
        params: Arc<[CelType]>,
    },
    /// Free or bound type placeholder.
    TypeParam(Arc<str>),
    /// Result of a failed check. Compatible with everything so that one
    /// error does not cascade into others.
    Error(Arc<CheckError>),
}

/// Coarse discriminant of a [`CelType`].
///
/// All scalar types share one kind, mirroring how the checker decides whether
/// a second type written for the same node conflicts with the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    List,
    Map,
    Message,
    Wrapper,
    Type,
    Opaque,
    Optional,
    Function,
    TypeParam,
    Error,
}

// ==================== Constructors ====================

impl CelType {
    /// Create a list type with the given element type.
    ///
    /// # Example
    /// ```
    /// use cel_checker_common::CelType;
    /// let list_of_int = CelType::list(CelType::Int);
    /// assert_eq!(list_of_int.display_name(), "list(int)");
    /// ```
    pub fn list(elem: CelType) -> Self {
        CelType::List(Arc::new(elem))
    }

    /// Create a map type with the given key and value types.
    ///
    /// # Example
    /// ```
    /// use cel_checker_common::CelType;
    /// let map_str_int = CelType::map(CelType::String, CelType::Int);
    /// assert_eq!(map_str_int.display_name(), "map(string, int)");
    /// ```
    pub fn map(key: CelType, value: CelType) -> Self {
        CelType::Map(Arc::new(key), Arc::new(value))
    }

    /// Create a message type with the given fully qualified name.
    pub fn message(name: &str) -> Self {
        CelType::Message(Arc::from(name))
    }

    /// The `google.protobuf.Timestamp` message type.
    pub fn timestamp() -> Self {
        CelType::message(TIMESTAMP_TYPE_NAME)
    }

    /// The `google.protobuf.Duration` message type.
    pub fn duration() -> Self {
        CelType::message(DURATION_TYPE_NAME)
    }

    /// Create a wrapper type.
    pub fn wrapper(inner: CelType) -> Self {
        CelType::Wrapper(Arc::new(inner))
    }

    /// Create a type value representing `type(T)`.
    ///
    /// # Example
    /// ```
    /// use cel_checker_common::CelType;
    /// assert_eq!(CelType::type_of(CelType::Int).display_name(), "type(int)");
    /// ```
    pub fn type_of(inner: CelType) -> Self {
        CelType::Type(Arc::new(inner))
    }

    /// Create an opaque type with the given name and parameter types.
    pub fn opaque(name: &str, params: &[CelType]) -> Self {
        CelType::Opaque {
            name: Arc::from(name),
            params: Arc::from(params),
        }
    }

    /// Create an optional type: `optional_type(T)`.
    pub fn optional(inner: CelType) -> Self {
        CelType::Optional(Arc::new(inner))
    }

    /// Pack an overload signature into a single comparable type.
    ///
    /// # Example
    /// ```
    /// use cel_checker_common::CelType;
    /// let func = CelType::function(CelType::Int, &[CelType::String]);
    /// assert_eq!(func.display_name(), "function(int, string)");
    /// ```
    pub fn function(result: CelType, params: &[CelType]) -> Self {
        CelType::Function {
            result: Arc::new(result),
            params: Arc::from(params),
        }
    }

    /// Create a type parameter with the given name.
    pub fn type_param(name: &str) -> Self {
        CelType::TypeParam(Arc::from(name))
    }

    /// Create an error type carrying the diagnostic that produced it.
    pub fn error(error: CheckError) -> Self {
        CelType::Error(Arc::new(error))
    }
}

// ==================== Type Properties ====================

impl CelType {
    /// Returns the coarse discriminant of this type.
    pub fn kind(&self) -> TypeKind {
        match self {
            CelType::Bool
            | CelType::Int
            | CelType::UInt
            | CelType::Double
            | CelType::String
            | CelType::Bytes
            | CelType::Null
            | CelType::Dyn => TypeKind::Scalar,
            CelType::List(_) => TypeKind::List,
            CelType::Map(_, _) => TypeKind::Map,
            CelType::Message(_) => TypeKind::Message,
            CelType::Wrapper(_) => TypeKind::Wrapper,
            CelType::Type(_) => TypeKind::Type,
            CelType::Opaque { .. } => TypeKind::Opaque,
            CelType::Optional(_) => TypeKind::Optional,
            CelType::Function { .. } => TypeKind::Function,
            CelType::TypeParam(_) => TypeKind::TypeParam,
            CelType::Error(_) => TypeKind::Error,
        }
    }

    /// Returns true if this is a primitive type.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            CelType::Bool
                | CelType::Int
                | CelType::UInt
                | CelType::Double
                | CelType::String
                | CelType::Bytes
        )
    }

    /// Returns true for `dyn`.
    pub fn is_dyn(&self) -> bool {
        matches!(self, CelType::Dyn)
    }

    /// Returns true for the error type.
    pub fn is_error(&self) -> bool {
        matches!(self, CelType::Error(_))
    }

    /// Returns true for `dyn` or the error type.
    pub fn is_dyn_or_error(&self) -> bool {
        matches!(self, CelType::Dyn | CelType::Error(_))
    }

    /// Returns true for `optional_type(T)`.
    pub fn is_optional(&self) -> bool {
        matches!(self, CelType::Optional(_))
    }

    /// Returns the wrapped type of an optional, or the type itself otherwise.
    pub fn unwrap_optional(&self) -> &CelType {
        match self {
            CelType::Optional(inner) => inner,
            other => other,
        }
    }

    /// Get the message name if this is a message type.
    pub fn message_name(&self) -> Option<&str> {
        match self {
            CelType::Message(name) => Some(name),
            _ => None,
        }
    }

    /// Returns true if any type parameter occurs within this type.
    pub fn has_type_params(&self) -> bool {
        match self {
            CelType::TypeParam(_) => true,
            CelType::List(elem) => elem.has_type_params(),
            CelType::Map(key, val) => key.has_type_params() || val.has_type_params(),
            CelType::Wrapper(inner) | CelType::Type(inner) | CelType::Optional(inner) => {
                inner.has_type_params()
            }
            CelType::Opaque { params, .. } => params.iter().any(CelType::has_type_params),
            CelType::Function { result, params } => {
                result.has_type_params() || params.iter().any(CelType::has_type_params)
            }
            _ => false,
        }
    }
}

// ==================== Display ====================

impl CelType {
    /// Returns the canonical textual form of this type as used in diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            CelType::Bool => "bool".to_string(),
            CelType::Int => "int".to_string(),
            CelType::UInt => "uint".to_string(),
            CelType::Double => "double".to_string(),
            CelType::String => "string".to_string(),
            CelType::Bytes => "bytes".to_string(),
            CelType::Null => "null_type".to_string(),
            CelType::Dyn => "dyn".to_string(),
            CelType::List(elem) => format!("list({})", elem.display_name()),
            CelType::Map(key, val) => {
                format!("map({}, {})", key.display_name(), val.display_name())
            }
            CelType::Message(name) => name.to_string(),
            CelType::Wrapper(inner) => format!("wrapper({})", inner.display_name()),
            CelType::Type(inner) => format!("type({})", inner.display_name()),
            CelType::Opaque { name, params } => {
                if params.is_empty() {
                    name.to_string()
                } else {
                    format!("{}({})", name, join_display(params))
                }
            }
            CelType::Optional(inner) => format!("optional_type({})", inner.display_name()),
            CelType::Function { result, params } => {
                if params.is_empty() {
                    format!("function({})", result.display_name())
                } else {
                    format!("function({}, {})", result.display_name(), join_display(params))
                }
            }
            CelType::TypeParam(name) => name.to_string(),
            CelType::Error(_) => "*error*".to_string(),
        }
    }
}

/// Join the display names of a slice of types with `", "`.
pub fn join_display(types: &[CelType]) -> String {
    types
        .iter()
        .map(CelType::display_name)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
