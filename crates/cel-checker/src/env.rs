//! Declaration environment for CEL type checking.
//!
//! [`CheckerEnv`] holds everything declared up front: the container, root
//! identifiers, functions, the message registry and checker options. It is
//! immutable while checking. [`ScopedEnv`] layers the comprehension scopes of
//! one checking pass on top of it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cel_checker_common::{
    message_to_cel_type, CelType, CelValue, FunctionDecl, MessageRegistry, TypeRegistry,
    VariableDecl,
};

use crate::container::Container;
use crate::errors::EnvError;
use crate::scope::{Scope, ScopeStack};
use crate::standard_library::{CROSS_TYPE_NUMERIC_COMPARISON_OVERLOADS, STANDARD_LIBRARY};

/// Default bound on expression nesting.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 250;

/// How list and map literals with mixed element types are typed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AggregateLiteralElementType {
    /// Mixed element types widen to `dyn`.
    #[default]
    DynElementType,
    /// Mixed element types are reported as a type mismatch.
    HomogeneousElementType,
}

/// Type environment for CEL type checking (mirrors cel-go `checker.Env`).
#[derive(Debug, Clone)]
pub struct CheckerEnv {
    container: Container,
    idents: Scope,
    functions: HashMap<String, FunctionDecl>,
    registry: Arc<dyn TypeRegistry>,
    aggregate_literal_element_type: AggregateLiteralElementType,
    disabled_overloads: HashSet<String>,
    max_recursion_depth: usize,
}

impl Default for CheckerEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckerEnv {
    /// Create an empty environment in the root container.
    ///
    /// The registry knows the protobuf well-known types. Cross-type numeric
    /// comparisons are disabled.
    pub fn new() -> Self {
        Self {
            container: Container::default(),
            idents: Scope::new(),
            functions: HashMap::new(),
            registry: Arc::new(MessageRegistry::with_well_known_types()),
            aggregate_literal_element_type: AggregateLiteralElementType::default(),
            disabled_overloads: CROSS_TYPE_NUMERIC_COMPARISON_OVERLOADS
                .iter()
                .map(|id| id.to_string())
                .collect(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }

    /// Create an environment with the CEL standard library.
    pub fn with_standard_library() -> Self {
        let mut env = Self::new();

        for func in STANDARD_LIBRARY.iter() {
            env.functions.insert(func.name.clone(), func.clone());
        }

        // Type names usable as values, e.g. `type(x) == int`.
        for (name, cel_type) in [
            ("bool", CelType::Bool),
            ("int", CelType::Int),
            ("uint", CelType::UInt),
            ("double", CelType::Double),
            ("string", CelType::String),
            ("bytes", CelType::Bytes),
            ("list", CelType::list(CelType::Dyn)),
            ("map", CelType::map(CelType::Dyn, CelType::Dyn)),
            ("null_type", CelType::Null),
            ("type", CelType::type_of(CelType::Dyn)),
            ("dyn", CelType::Dyn),
            ("optional_type", CelType::optional(CelType::Dyn)),
        ] {
            env.idents.declare(VariableDecl::new(name, CelType::type_of(cel_type)));
        }

        env
    }

    // ==================== Builder ====================

    /// Set the container namespace.
    pub fn with_container(mut self, name: impl Into<String>) -> Self {
        self.container = self.container.with_name(name);
        self
    }

    /// Make a simple name stand for a qualified one.
    pub fn with_alias(mut self, alias: &str, qualified_name: &str) -> Result<Self, EnvError> {
        self.container.add_alias(alias, qualified_name)?;
        Ok(self)
    }

    /// Use the given registry for message and enum lookups.
    pub fn with_registry(mut self, registry: Arc<dyn TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Declare a variable, replacing any existing declaration of that name.
    pub fn with_variable(mut self, name: &str, cel_type: CelType) -> Self {
        self.idents.declare(VariableDecl::new(name, cel_type));
        self
    }

    /// Declare a function, merging its overloads into an existing declaration.
    ///
    /// Overloads whose id is already declared are replaced.
    pub fn with_function(mut self, decl: FunctionDecl) -> Self {
        match self.functions.get_mut(&decl.name) {
            Some(existing) => {
                for overload in decl.overloads {
                    existing.overloads.retain(|o| o.id != overload.id);
                    existing.overloads.push(overload);
                }
            }
            None => {
                self.functions.insert(decl.name.clone(), decl);
            }
        }
        self
    }

    /// Report mixed element types in list and map literals as errors
    /// instead of widening to `dyn`.
    pub fn with_homogeneous_aggregate_literals(mut self) -> Self {
        self.aggregate_literal_element_type = AggregateLiteralElementType::HomogeneousElementType;
        self
    }

    /// Allow comparisons such as `1 < 2.0` between numbers of different types.
    pub fn with_cross_type_numeric_comparisons(mut self, enabled: bool) -> Self {
        if enabled {
            for id in CROSS_TYPE_NUMERIC_COMPARISON_OVERLOADS {
                self.disabled_overloads.remove(id);
            }
        } else {
            self.disabled_overloads
                .extend(CROSS_TYPE_NUMERIC_COMPARISON_OVERLOADS.iter().map(|id| id.to_string()));
        }
        self
    }

    /// Bound the nesting depth the checker descends into.
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    // ==================== Strict Declaration ====================

    /// Declare identifiers, rejecting a name already declared with a
    /// different type.
    ///
    /// Redeclaring a name with the same type is a no-op. Every non-conflicting
    /// declaration is added and all conflicts are reported together.
    pub fn add_idents(&mut self, decls: impl IntoIterator<Item = VariableDecl>) -> Result<(), EnvError> {
        let mut conflicts = Vec::new();
        for decl in decls {
            match self.idents.find(&decl.name) {
                Some(prior) if prior.cel_type == decl.cel_type => {}
                Some(_) => conflicts.push(EnvError::OverlappingIdentifier { name: decl.name }),
                None => {
                    self.idents.declare(decl);
                }
            }
        }
        EnvError::from_conflicts(conflicts)
    }

    /// Declare functions, merging overloads into existing declarations.
    ///
    /// Redeclaring an overload id with the same signature is a no-op; with a
    /// different signature it is an error. As with [`Self::add_idents`], all
    /// conflicts are reported together.
    pub fn add_functions(&mut self, decls: impl IntoIterator<Item = FunctionDecl>) -> Result<(), EnvError> {
        let mut conflicts = Vec::new();
        for decl in decls {
            let existing = self
                .functions
                .entry(decl.name.clone())
                .or_insert_with(|| FunctionDecl::new(decl.name.clone()));
            for overload in decl.overloads {
                match existing.overload(&overload.id) {
                    Some(prior) if prior.signature_matches(&overload) => {}
                    Some(_) => conflicts.push(EnvError::OverlappingOverload {
                        function: decl.name.clone(),
                        overload_id: overload.id,
                    }),
                    None => existing.overloads.push(overload),
                }
            }
        }
        EnvError::from_conflicts(conflicts)
    }

    // ==================== Lookup ====================

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn registry(&self) -> &dyn TypeRegistry {
        self.registry.as_ref()
    }

    pub fn aggregate_literal_element_type(&self) -> AggregateLiteralElementType {
        self.aggregate_literal_element_type
    }

    pub fn max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    /// Returns true if the overload is excluded from resolution.
    pub fn is_overload_disabled(&self, overload_id: &str) -> bool {
        self.disabled_overloads.contains(overload_id)
    }

    /// Resolve a function name against the container.
    pub fn lookup_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.container
            .resolve_candidate_names(name)
            .iter()
            .find_map(|candidate| self.functions.get(candidate))
    }

    /// Resolve an identifier against the container, without local scopes.
    pub fn lookup_ident(&self, name: &str) -> Option<VariableDecl> {
        self.lookup_ident_in(&ScopeStack::new(), name)
    }

    /// Resolve an identifier, trying each candidate name in local scopes,
    /// root declarations, registry messages and registry enum values.
    fn lookup_ident_in(&self, scopes: &ScopeStack, name: &str) -> Option<VariableDecl> {
        for candidate in self.container.resolve_candidate_names(name) {
            if let Some(decl) = scopes.find(&candidate).or_else(|| self.idents.find(&candidate)) {
                return Some(decl.clone());
            }

            if self.registry.find_message(&candidate).is_some() {
                let cel_type = CelType::type_of(message_to_cel_type(&candidate));
                return Some(VariableDecl::new(candidate, cel_type));
            }

            if let Some((enum_name, value_name)) = candidate.rsplit_once('.') {
                if let Some(number) = self.registry.find_enum_value(enum_name, value_name) {
                    return Some(VariableDecl::constant(
                        candidate.clone(),
                        CelType::Int,
                        CelValue::Int(i64::from(number)),
                    ));
                }
            }
        }
        None
    }
}

/// A [`CheckerEnv`] plus the comprehension scopes of one checking pass.
#[derive(Debug)]
pub struct ScopedEnv<'a> {
    env: &'a CheckerEnv,
    scopes: ScopeStack,
}

impl<'a> ScopedEnv<'a> {
    pub fn new(env: &'a CheckerEnv) -> Self {
        Self {
            env,
            scopes: ScopeStack::new(),
        }
    }

    pub fn env(&self) -> &'a CheckerEnv {
        self.env
    }

    /// Enter a child scope whose declarations shadow the enclosing ones.
    pub fn enter_scope(&mut self) {
        self.scopes.push();
        tracing::trace!(depth = self.scopes.depth(), "entered scope");
    }

    /// Return to the parent scope.
    pub fn exit_scope(&mut self) {
        self.scopes.pop();
        tracing::trace!(depth = self.scopes.depth(), "exited scope");
    }

    /// Declare identifiers in the current scope, shadowing outer ones.
    pub fn add_idents(&mut self, decls: impl IntoIterator<Item = VariableDecl>) {
        for decl in decls {
            self.scopes.declare(decl);
        }
    }

    pub fn lookup_ident(&self, name: &str) -> Option<VariableDecl> {
        self.env.lookup_ident_in(&self.scopes, name)
    }

    pub fn lookup_function(&self, name: &str) -> Option<&'a FunctionDecl> {
        self.env.lookup_function(name)
    }

    pub fn container(&self) -> &'a Container {
        self.env.container()
    }

    pub fn is_overload_disabled(&self, overload_id: &str) -> bool {
        self.env.is_overload_disabled(overload_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cel_checker_common::{MessageType, OverloadDecl};

    fn test_registry() -> Arc<dyn TypeRegistry> {
        Arc::new(
            MessageRegistry::with_well_known_types()
                .with_message(MessageType::new("acme.Account").with_field("id", CelType::Int))
                .with_enum("acme.State", &[("ACTIVE", 0), ("CLOSED", 3)]),
        )
    }

    #[test]
    fn test_new_env() {
        let env = CheckerEnv::new();
        assert!(env.lookup_ident("x").is_none());
        assert!(env.lookup_function("_+_").is_none());
        assert_eq!(env.max_recursion_depth(), DEFAULT_MAX_RECURSION_DEPTH);
    }

    #[test]
    fn test_standard_library() {
        let env = CheckerEnv::with_standard_library();
        assert!(env.lookup_function("_+_").is_some());
        assert!(env.lookup_function("size").is_some());
        assert_eq!(
            env.lookup_ident("int").map(|d| d.cel_type),
            Some(CelType::type_of(CelType::Int))
        );
    }

    #[test]
    fn test_container_resolution() {
        let env = CheckerEnv::new()
            .with_container("a.b")
            .with_variable("a.x", CelType::Int)
            .with_variable("a.b.x", CelType::String);

        assert_eq!(env.lookup_ident("x").map(|d| d.name), Some("a.b.x".to_string()));
        assert_eq!(env.lookup_ident(".a.x").map(|d| d.cel_type), Some(CelType::Int));
    }

    #[test]
    fn test_alias_survives_container_change() {
        let env = CheckerEnv::new()
            .with_alias("R", "acme.Account")
            .unwrap()
            .with_container("other")
            .with_registry(test_registry());
        assert_eq!(
            env.lookup_ident("R").map(|d| d.cel_type),
            Some(CelType::type_of(CelType::message("acme.Account")))
        );
    }

    #[test]
    fn test_registry_fallback() {
        let env = CheckerEnv::new().with_registry(test_registry()).with_container("acme");

        let account = env.lookup_ident("Account").unwrap();
        assert_eq!(account.name, "acme.Account");
        assert_eq!(account.cel_type, CelType::type_of(CelType::message("acme.Account")));

        let closed = env.lookup_ident("State.CLOSED").unwrap();
        assert_eq!(closed.name, "acme.State.CLOSED");
        assert_eq!(closed.cel_type, CelType::Int);
        assert_eq!(closed.value, Some(CelValue::Int(3)));

        let wrapper = env.lookup_ident("google.protobuf.Int64Value").unwrap();
        assert_eq!(wrapper.cel_type, CelType::type_of(CelType::wrapper(CelType::Int)));
    }

    #[test]
    fn test_add_idents_rejects_overlap() {
        let mut env = CheckerEnv::new();
        env.add_idents([VariableDecl::new("x", CelType::Int)]).unwrap();
        env.add_idents([VariableDecl::new("x", CelType::Int)]).unwrap();

        let err = env
            .add_idents([VariableDecl::new("x", CelType::String)])
            .unwrap_err();
        assert_eq!(err, EnvError::OverlappingIdentifier { name: "x".into() });
        assert_eq!(env.lookup_ident("x").map(|d| d.cel_type), Some(CelType::Int));
    }

    #[test]
    fn test_add_idents_reports_every_conflict() {
        let mut env = CheckerEnv::new()
            .with_variable("x", CelType::Int)
            .with_variable("y", CelType::Int);
        let err = env
            .add_idents([
                VariableDecl::new("x", CelType::String),
                VariableDecl::new("z", CelType::Bool),
                VariableDecl::new("y", CelType::String),
            ])
            .unwrap_err();
        assert_eq!(
            err,
            EnvError::Conflicts(vec![
                EnvError::OverlappingIdentifier { name: "x".into() },
                EnvError::OverlappingIdentifier { name: "y".into() },
            ])
        );
        assert_eq!(env.lookup_ident("z").map(|d| d.cel_type), Some(CelType::Bool));
    }

    #[test]
    fn test_add_functions_merges() {
        let mut env = CheckerEnv::with_standard_library();
        let decl = FunctionDecl::new("size").with_overload(OverloadDecl::function(
            "size_int",
            vec![CelType::Int],
            CelType::Int,
        ));
        env.add_functions([decl.clone()]).unwrap();
        env.add_functions([decl]).unwrap();

        let size = env.lookup_function("size").unwrap();
        assert!(size.overload("size_string").is_some());
        assert_eq!(size.overloads.iter().filter(|o| o.id == "size_int").count(), 1);

        let conflicting = FunctionDecl::new("size").with_overload(OverloadDecl::function(
            "size_int",
            vec![CelType::Int],
            CelType::UInt,
        ));
        assert!(matches!(
            env.add_functions([conflicting]),
            Err(EnvError::OverlappingOverload { .. })
        ));
    }

    #[test]
    fn test_cross_type_comparisons_toggle() {
        let env = CheckerEnv::with_standard_library();
        assert!(env.is_overload_disabled("less_int64_double"));

        let env = env.with_cross_type_numeric_comparisons(true);
        assert!(!env.is_overload_disabled("less_int64_double"));
    }

    #[test]
    fn test_scoped_env_shadowing() {
        let env = CheckerEnv::new().with_variable("x", CelType::Int);
        let mut scoped = ScopedEnv::new(&env);

        scoped.enter_scope();
        scoped.add_idents([VariableDecl::new("x", CelType::String)]);
        assert_eq!(scoped.lookup_ident("x").map(|d| d.cel_type), Some(CelType::String));

        scoped.exit_scope();
        assert_eq!(scoped.lookup_ident("x").map(|d| d.cel_type), Some(CelType::Int));
    }
}
