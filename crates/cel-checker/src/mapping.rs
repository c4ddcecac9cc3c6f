//! Type parameter substitutions accumulated during one checking pass.

use std::collections::HashMap;
use std::sync::Arc;

use cel_checker_common::CelType;

/// Bindings from type parameter names to the types discovered for them.
///
/// The checker keeps a single mapping for the whole expression. Candidate
/// matches work on a copy which replaces the checker's mapping only when the
/// match succeeds, so a failed overload never leaves partial bindings behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    bindings: HashMap<Arc<str>, CelType>,
}

impl Mapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a type parameter name to a type, replacing any previous binding.
    pub fn add(&mut self, param: Arc<str>, cel_type: CelType) {
        self.bindings.insert(param, cel_type);
    }

    /// Find the binding of `cel_type` if it is a bound type parameter.
    pub fn find(&self, cel_type: &CelType) -> Option<&CelType> {
        match cel_type {
            CelType::TypeParam(name) => self.bindings.get(name.as_ref()),
            _ => None,
        }
    }

    /// Find the binding of a type parameter by name.
    pub fn find_param(&self, name: &str) -> Option<&CelType> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_find() {
        let mut mapping = Mapping::new();
        mapping.add(Arc::from("T"), CelType::Int);

        assert_eq!(mapping.find(&CelType::type_param("T")), Some(&CelType::Int));
        assert_eq!(mapping.find_param("T"), Some(&CelType::Int));
        assert_eq!(mapping.find(&CelType::type_param("U")), None);
        assert_eq!(mapping.find(&CelType::Int), None);
    }

    #[test]
    fn test_copies_are_independent() {
        let mut mapping = Mapping::new();
        mapping.add(Arc::from("T"), CelType::Int);

        let mut copy = mapping.clone();
        copy.add(Arc::from("U"), CelType::String);

        assert_eq!(mapping.len(), 1);
        assert_eq!(copy.len(), 2);
    }
}
