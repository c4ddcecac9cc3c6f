//! Errors raised while building a checking environment.

use thiserror::Error;

/// A declaration that cannot be added to a [`crate::CheckerEnv`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// An identifier with this name is already declared.
    #[error("overlapping identifier for name '{name}'")]
    OverlappingIdentifier { name: String },

    /// An overload with this id is already declared with a different signature.
    #[error("overlapping overload for name '{function}' (id '{overload_id}')")]
    OverlappingOverload {
        function: String,
        overload_id: String,
    },

    /// A container alias that cannot be used.
    #[error("invalid alias '{alias}': {reason}")]
    InvalidAlias { alias: String, reason: &'static str },

    /// Several conflicting declarations, one message per line.
    #[error("{}", join_lines(.0))]
    Conflicts(Vec<EnvError>),
}

impl EnvError {
    /// Collapse the conflicts found while adding declarations.
    pub(crate) fn from_conflicts(mut conflicts: Vec<EnvError>) -> Result<(), EnvError> {
        match conflicts.len() {
            0 => Ok(()),
            1 => Err(conflicts.remove(0)),
            _ => Err(EnvError::Conflicts(conflicts)),
        }
    }
}

fn join_lines(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
