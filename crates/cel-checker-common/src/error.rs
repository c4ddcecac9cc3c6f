//! Diagnostics produced while checking an expression.

use thiserror::Error;

use crate::{join_display, CelType};

/// A type checking diagnostic.
///
/// Pairs the kind of problem with the id of the node it was found on. The
/// same value is carried inside [`CelType::Error`] so that error-typed nodes
/// keep a link to the diagnostic that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{kind}")]
pub struct CheckError {
    /// The kind of error.
    pub kind: CheckErrorKind,
    /// The expression ID where the error occurred.
    pub expr_id: i64,
}

impl CheckError {
    /// Create a new check error.
    pub fn new(kind: CheckErrorKind, expr_id: i64) -> Self {
        Self { kind, expr_id }
    }

    /// Create an undeclared reference error.
    pub fn undeclared_reference(container: &str, name: &str, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::UndeclaredReference {
                container: container.to_string(),
                name: name.to_string(),
            },
            expr_id,
        )
    }

    /// Create a no matching overload error.
    pub fn no_matching_overload(function: &str, arg_types: Vec<CelType>, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::NoMatchingOverload {
                function: function.to_string(),
                arg_types,
            },
            expr_id,
        )
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: CelType, actual: CelType, expr_id: i64) -> Self {
        Self::new(CheckErrorKind::TypeMismatch { expected, actual }, expr_id)
    }

    /// Create an undefined field error.
    pub fn undefined_field(field: &str, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::UndefinedField {
                field: field.to_string(),
            },
            expr_id,
        )
    }

    /// Create an internal invariant violation.
    pub fn internal(message: impl Into<String>, expr_id: i64) -> Self {
        Self::new(CheckErrorKind::Internal(message.into()), expr_id)
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Returns true if this error aborts checking rather than being collected.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, CheckErrorKind::Internal(_))
    }
}

/// The kind of type checking error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum CheckErrorKind {
    /// Reference to an undeclared variable, function or type.
    #[error("undeclared reference to '{name}' (in container '{container}')")]
    UndeclaredReference { container: String, name: String },

    /// Field not declared on a message type.
    #[error("undefined field '{field}'")]
    UndefinedField { field: String },

    /// The registry does not know a message type the checker already resolved.
    #[error("unexpected failed resolution of '{type_name}'")]
    UnresolvedType { type_name: String },

    /// An identifier used as a message name does not denote a type.
    #[error("'{0}' is not a type")]
    NotAType(CelType),

    /// A type used in a message literal is not a message.
    #[error("'{0}' is not a message type")]
    NotAMessageType(CelType),

    /// No overload of the function accepts the argument types.
    #[error("found no matching overload for '{function}' applied to '({})'", join_display(.arg_types))]
    NoMatchingOverload {
        function: String,
        arg_types: Vec<CelType>,
    },

    /// A value is not assignable to the type required at its position.
    #[error("expected type '{expected}' but got '{actual}'")]
    TypeMismatch { expected: CelType, actual: CelType },

    /// Field selection on a type without fields.
    #[error("type '{0}' does not support field selection")]
    FieldSelectionUnsupported(CelType),

    /// The range of a comprehension is not iterable.
    #[error("expression of type '{0}' cannot be range of a comprehension (must be list, map, or dynamic)")]
    InvalidComprehensionRange(CelType),

    /// A node was assigned two types of different kinds.
    #[error("incompatible type already exists for expression: existing '{existing}', new '{new}'")]
    IncompatibleType { existing: CelType, new: CelType },

    /// A node was assigned two different references.
    #[error("reference already exists for expression: existing '{existing}', new '{new}'")]
    ConflictingReference { existing: String, new: String },

    /// Nesting exceeded the configured recursion budget.
    #[error("expression nesting exceeds maximum depth of {0}")]
    RecursionLimit(usize),

    /// A malformed tree that no parser should produce. Aborts checking.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undeclared_reference() {
        let err = CheckError::undeclared_reference("", "foo", 1);
        assert_eq!(err.message(), "undeclared reference to 'foo' (in container '')");

        let err = CheckError::undeclared_reference("a.b", "foo", 1);
        assert_eq!(err.message(), "undeclared reference to 'foo' (in container 'a.b')");
    }

    #[test]
    fn test_no_matching_overload() {
        let err = CheckError::no_matching_overload("_!=_", vec![CelType::Int, CelType::Null], 4);
        assert_eq!(
            err.message(),
            "found no matching overload for '_!=_' applied to '(int, null_type)'"
        );
        assert_eq!(err.expr_id, 4);
    }

    #[test]
    fn test_type_mismatch() {
        let err = CheckError::type_mismatch(CelType::Bool, CelType::Int, 1);
        assert_eq!(err.to_string(), "expected type 'bool' but got 'int'");
    }

    #[test]
    fn test_range_message() {
        let err = CheckError::new(CheckErrorKind::InvalidComprehensionRange(CelType::Bool), 2);
        assert!(err.message().starts_with("expression of type 'bool' cannot be range"));
    }

    #[test]
    fn test_fatal_only_for_internal() {
        assert!(CheckError::internal("bad shape", 1).is_fatal());
        assert!(!CheckError::undefined_field("f", 1).is_fatal());
    }
}
