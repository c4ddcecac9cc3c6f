//! Namespace resolution for identifiers, functions and type names.
//!
//! A container is the package an expression is written in. A name used in
//! the expression may refer to a declaration in the container, in any
//! enclosing namespace, or at the root; [`Container::resolve_candidate_names`]
//! lists those possibilities from most to least qualified.

use std::collections::HashMap;

use cel_checker_common::{Expr, ExprKind};

use crate::errors::EnvError;

/// The namespace an expression is checked in, plus its aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    name: String,
    aliases: HashMap<String, String>,
}

impl Container {
    /// Create a container with the given dotted name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: HashMap::new(),
        }
    }

    /// The container's dotted name, empty for the root container.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the container, keeping its aliases.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an alias, returning the updated container.
    pub fn with_alias(mut self, alias: &str, qualified_name: &str) -> Result<Self, EnvError> {
        self.add_alias(alias, qualified_name)?;
        Ok(self)
    }

    /// Make the simple name `alias` stand for `qualified_name`.
    ///
    /// Aliases must be a single segment and may not be redefined.
    pub fn add_alias(&mut self, alias: &str, qualified_name: &str) -> Result<(), EnvError> {
        let invalid = |reason| EnvError::InvalidAlias {
            alias: alias.to_string(),
            reason,
        };
        if alias.is_empty() || alias.contains('.') {
            return Err(invalid("alias must be a non-empty simple identifier"));
        }
        if qualified_name.is_empty() || qualified_name.starts_with('.') {
            return Err(invalid("alias target must be a qualified name"));
        }
        if let Some(existing) = self.aliases.get(alias) {
            if existing != qualified_name {
                return Err(invalid("alias collides with an existing alias"));
            }
        }
        self.aliases.insert(alias.to_string(), qualified_name.to_string());
        Ok(())
    }

    /// List the fully qualified names `name` may refer to, most qualified first.
    ///
    /// With container `a.b.c` and name `R.s` the candidates are `a.b.c.R.s`,
    /// `a.b.R.s`, `a.R.s` and `R.s`. A leading `.` skips container
    /// resolution; an alias on the first segment replaces it.
    pub fn resolve_candidate_names(&self, name: &str) -> Vec<String> {
        if let Some(stripped) = name.strip_prefix('.') {
            let qualified = self.find_alias(stripped).unwrap_or_else(|| stripped.to_string());
            return vec![qualified];
        }
        if let Some(alias) = self.find_alias(name) {
            return vec![alias];
        }
        if self.name.is_empty() {
            return vec![name.to_string()];
        }

        let mut candidates = Vec::new();
        let mut prefix = self.name.as_str();
        loop {
            candidates.push(format!("{}.{}", prefix, name));
            match prefix.rfind('.') {
                Some(i) => prefix = &prefix[..i],
                None => break,
            }
        }
        candidates.push(name.to_string());
        candidates
    }

    /// Expand `name` if its first segment is an alias.
    fn find_alias(&self, name: &str) -> Option<String> {
        let (simple, rest) = match name.split_once('.') {
            Some((simple, rest)) => (simple, Some(rest)),
            None => (name, None),
        };
        let qualified = self.aliases.get(simple)?;
        Some(match rest {
            Some(rest) => format!("{}.{}", qualified, rest),
            None => qualified.clone(),
        })
    }
}

/// Flatten an identifier or a chain of field selections into a dotted name.
///
/// Returns `None` for anything else, including presence tests.
pub fn to_qualified_name(expr: &Expr) -> Option<String> {
    let mut fields: Vec<&str> = Vec::new();
    let mut current = expr;
    loop {
        match &current.kind {
            ExprKind::Ident(name) => {
                let mut qualified = name.clone();
                for field in fields.iter().rev() {
                    qualified.push('.');
                    qualified.push_str(field);
                }
                return Some(qualified);
            }
            ExprKind::Select {
                operand,
                field,
                test_only: false,
            } => {
                fields.push(field.as_str());
                current = operand;
            }
            _ => return None,
        }
    }
}
