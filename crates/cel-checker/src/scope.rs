//! Identifier scopes.
//!
//! The root identifiers of a [`CheckerEnv`](crate::CheckerEnv) live in one
//! [`Scope`]. Each comprehension pushes frames onto a [`ScopeStack`] for its
//! accumulator and iteration variables, so a loop variable named like an
//! outer identifier hides it until the frame is popped.

use std::collections::HashMap;

use cel_checker_common::VariableDecl;

/// Identifier declarations keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    decls: HashMap<String, VariableDecl>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an identifier, returning the declaration it replaces.
    pub fn declare(&mut self, decl: VariableDecl) -> Option<VariableDecl> {
        self.decls.insert(decl.name.clone(), decl)
    }

    pub fn find(&self, name: &str) -> Option<&VariableDecl> {
        self.decls.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

/// Nested frames of comprehension variables, innermost last.
///
/// The stack always keeps its root frame.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Scope::new()],
        }
    }

    /// Open a new innermost frame.
    pub fn push(&mut self) {
        self.frames.push(Scope::new());
    }

    /// Close the innermost frame. The root frame is never closed.
    pub fn pop(&mut self) -> Option<Scope> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Declare an identifier in the innermost frame.
    pub fn declare(&mut self, decl: VariableDecl) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.declare(decl);
            }
            None => {
                let mut root = Scope::new();
                root.declare(decl);
                self.frames.push(root);
            }
        }
    }

    /// Find the innermost declaration of `name`.
    pub fn find(&self, name: &str) -> Option<&VariableDecl> {
        self.frames.iter().rev().find_map(|frame| frame.find(name))
    }

    /// Number of open frames, the root included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}
