//! Identifier and function declarations the checker resolves names against.

use std::collections::BTreeSet;

use crate::{CelType, CelValue};

/// A declared identifier: a variable, a type name or an enum constant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    /// Fully qualified name.
    pub name: String,
    pub cel_type: CelType,
    /// Known value, set for enum constants.
    pub value: Option<CelValue>,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, cel_type: CelType) -> Self {
        Self {
            name: name.into(),
            cel_type,
            value: None,
        }
    }

    /// An identifier bound to a value known at check time.
    pub fn constant(name: impl Into<String>, cel_type: CelType, value: CelValue) -> Self {
        Self {
            value: Some(value),
            ..Self::new(name, cel_type)
        }
    }
}

/// One signature of a function.
///
/// Member overloads (`target.f(x)`) list the receiver as their first
/// parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct OverloadDecl {
    /// Overload id reported in references, e.g. `add_int64`.
    pub id: String,
    pub params: Vec<CelType>,
    pub result: CelType,
    pub is_member: bool,
    /// Type parameter names, instantiated afresh at every call site.
    pub type_params: Vec<String>,
}

impl OverloadDecl {
    fn with_style(id: impl Into<String>, params: Vec<CelType>, result: CelType, is_member: bool) -> Self {
        Self {
            id: id.into(),
            params,
            result,
            is_member,
            type_params: Vec::new(),
        }
    }

    /// A global overload, called as `f(a, b)`.
    pub fn function(id: impl Into<String>, params: Vec<CelType>, result: CelType) -> Self {
        Self::with_style(id, params, result, false)
    }

    /// A receiver-style overload, called as `a.f(b)`.
    pub fn method(id: impl Into<String>, params: Vec<CelType>, result: CelType) -> Self {
        Self::with_style(id, params, result, true)
    }

    pub fn with_type_params(mut self, names: Vec<String>) -> Self {
        self.type_params = names;
        self
    }

    /// Names to instantiate for a call: the declared type parameters, then
    /// any other parameter the signature mentions, sorted.
    pub fn type_param_names(&self) -> Vec<String> {
        let mentioned: BTreeSet<String> = self
            .params
            .iter()
            .chain(std::iter::once(&self.result))
            .flat_map(type_params_in)
            .collect();

        let mut names = self.type_params.clone();
        names.extend(mentioned.into_iter().filter(|name| !self.type_params.contains(name)));
        names
    }

    /// Same calling style, parameters and result.
    pub fn signature_matches(&self, other: &OverloadDecl) -> bool {
        self.is_member == other.is_member && self.params == other.params && self.result == other.result
    }
}

/// Every type parameter name occurring in `ty`, depth first.
fn type_params_in(ty: &CelType) -> Vec<String> {
    let mut names = Vec::new();
    let mut pending = vec![ty];
    while let Some(current) = pending.pop() {
        match current {
            CelType::TypeParam(name) => names.push(name.to_string()),
            CelType::List(inner) | CelType::Wrapper(inner) | CelType::Type(inner) | CelType::Optional(inner) => {
                pending.push(inner)
            }
            CelType::Map(key, value) => pending.extend([key.as_ref(), value.as_ref()]),
            CelType::Opaque { params, .. } => pending.extend(params.iter()),
            CelType::Function { result, params } => {
                pending.push(result);
                pending.extend(params.iter());
            }
            _ => {}
        }
    }
    names
}

/// A named function and all of its overloads.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// Possibly namespaced, e.g. `optional.of`.
    pub name: String,
    pub overloads: Vec<OverloadDecl>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    pub fn with_overload(self, overload: OverloadDecl) -> Self {
        self.with_overloads([overload])
    }

    pub fn with_overloads(mut self, overloads: impl IntoIterator<Item = OverloadDecl>) -> Self {
        self.overloads.extend(overloads);
        self
    }

    pub fn overload(&self, id: &str) -> Option<&OverloadDecl> {
        self.overloads.iter().find(|o| o.id == id)
    }
}
