//! Assignability, substitution and generality over [`CelType`].
//!
//! These functions implement the type algebra the checker runs on. Type
//! parameters are bound through a [`Mapping`]; the fallible entry points
//! ([`is_assignable`], [`is_assignable_list`]) work on a copy of the mapping
//! and hand it back only when the whole check succeeds.

use std::sync::Arc;

use cel_checker_common::CelType;

use crate::mapping::Mapping;

// ==================== Entry Points ====================

/// Check whether `t1` can be used where `t2` is expected.
///
/// Returns the updated mapping on success. The input mapping is never
/// modified.
pub fn is_assignable(m: &Mapping, t1: &CelType, t2: &CelType) -> Option<Mapping> {
    let mut copy = m.clone();
    if internal_is_assignable(&mut copy, t1, t2) {
        Some(copy)
    } else {
        None
    }
}

/// Pairwise [`is_assignable`] over two equally long lists.
pub fn is_assignable_list(m: &Mapping, l1: &[CelType], l2: &[CelType]) -> Option<Mapping> {
    let mut copy = m.clone();
    if internal_is_assignable_list(&mut copy, l1, l2) {
        Some(copy)
    } else {
        None
    }
}

/// Mapping-free compatibility check between a target and a source type.
///
/// Type parameters on either side are accepted without binding. Wrapper
/// types accept `null`, their primitive and the same wrapper; a primitive
/// accepts its wrapper.
pub fn is_assignable_type(target: &CelType, source: &CelType) -> bool {
    if is_exact_type(target, source) {
        return true;
    }
    match (target, source) {
        (CelType::TypeParam(_), _) | (_, CelType::TypeParam(_)) => true,
        (CelType::Wrapper(_), CelType::Null) => true,
        (CelType::Wrapper(a), CelType::Wrapper(b)) => is_assignable_type(a, b),
        (CelType::Wrapper(inner), s) if s.is_primitive() => is_assignable_type(inner, s),
        (t, CelType::Wrapper(inner)) if t.is_primitive() => is_assignable_type(t, inner),
        (CelType::List(a), CelType::List(b))
        | (CelType::Type(a), CelType::Type(b))
        | (CelType::Optional(a), CelType::Optional(b)) => is_assignable_type(a, b),
        (CelType::Map(ak, av), CelType::Map(bk, bv)) => {
            is_assignable_type(ak, bk) && is_assignable_type(av, bv)
        }
        (
            CelType::Opaque { name: n1, params: p1 },
            CelType::Opaque { name: n2, params: p2 },
        ) => {
            n1 == n2
                && p1.len() == p2.len()
                && p1.iter().zip(p2.iter()).all(|(a, b)| is_assignable_type(a, b))
        }
        (
            CelType::Function { result: r1, params: p1 },
            CelType::Function { result: r2, params: p2 },
        ) => {
            is_assignable_type(r1, r2)
                && p1.len() == p2.len()
                && p1.iter().zip(p2.iter()).all(|(a, b)| is_assignable_type(a, b))
        }
        _ => false,
    }
}

/// Returns whichever of the two types is more general.
///
/// `t1` wins when it is equally or less specific than `t2`.
pub fn most_general(t1: &CelType, t2: &CelType) -> CelType {
    if is_equal_or_less_specific(t1, t2) {
        t1.clone()
    } else {
        t2.clone()
    }
}

/// Replace bound type parameters with their bindings, recursively.
///
/// Unbound parameters become `dyn` when `type_param_to_dyn` is set and are
/// otherwise left as they are.
pub fn substitute(m: &Mapping, t: &CelType, type_param_to_dyn: bool) -> CelType {
    substitute_guarded(m, t, type_param_to_dyn, &mut Vec::new())
}

/// Pack an overload signature into one type so that a single substitution
/// instantiates the result and all parameters together.
pub fn function_type(result: CelType, params: &[CelType]) -> CelType {
    CelType::function(result, params)
}

/// Exact structural equality. Any two error types are equal regardless of
/// the diagnostic they carry.
pub fn is_exact_type(t1: &CelType, t2: &CelType) -> bool {
    match (t1, t2) {
        (CelType::Error(_), CelType::Error(_)) => true,
        (CelType::List(a), CelType::List(b))
        | (CelType::Wrapper(a), CelType::Wrapper(b))
        | (CelType::Type(a), CelType::Type(b))
        | (CelType::Optional(a), CelType::Optional(b)) => is_exact_type(a, b),
        (CelType::Map(ak, av), CelType::Map(bk, bv)) => is_exact_type(ak, bk) && is_exact_type(av, bv),
        (
            CelType::Opaque { name: n1, params: p1 },
            CelType::Opaque { name: n2, params: p2 },
        ) => n1 == n2 && all_exact(p1, p2),
        (
            CelType::Function { result: r1, params: p1 },
            CelType::Function { result: r2, params: p2 },
        ) => is_exact_type(r1, r2) && all_exact(p1, p2),
        _ => t1 == t2,
    }
}

fn all_exact(l1: &[CelType], l2: &[CelType]) -> bool {
    l1.len() == l2.len() && l1.iter().zip(l2).all(|(a, b)| is_exact_type(a, b))
}

// ==================== Assignability ====================

fn internal_is_assignable(m: &mut Mapping, t1: &CelType, t2: &CelType) -> bool {
    if let CelType::TypeParam(_) = t2 {
        let (valid, has_substitution) = is_valid_type_substitution(m, t1, t2);
        if valid {
            return true;
        }
        if has_substitution {
            return false;
        }
    }
    if let CelType::TypeParam(_) = t1 {
        return is_valid_type_substitution(m, t2, t1).0;
    }

    if t1.is_dyn_or_error() || t2.is_dyn_or_error() {
        return true;
    }

    if matches!(t1, CelType::Null) {
        return null_assignable(t2);
    }
    if matches!(t2, CelType::Null) {
        return null_assignable(t1);
    }

    match t1 {
        CelType::Bool
        | CelType::Int
        | CelType::UInt
        | CelType::Double
        | CelType::String
        | CelType::Bytes
        | CelType::Message(_)
        | CelType::Wrapper(_) => is_assignable_type(t2, t1),
        CelType::Type(_) => matches!(t2, CelType::Type(_)),
        CelType::Opaque { name: n1, params: p1 } => match t2 {
            CelType::Opaque { name: n2, params: p2 } => {
                n1 == n2 && internal_is_assignable_list(m, p1, p2)
            }
            _ => false,
        },
        CelType::Function { result: r1, params: p1 } => match t2 {
            CelType::Function { result: r2, params: p2 } => {
                internal_is_assignable(m, r1, r2) && internal_is_assignable_list(m, p1, p2)
            }
            _ => false,
        },
        CelType::Optional(a) => match t2 {
            CelType::Optional(b) => internal_is_assignable(m, a, b),
            _ => false,
        },
        CelType::List(a) => match t2 {
            CelType::List(b) => internal_is_assignable(m, a, b),
            _ => false,
        },
        CelType::Map(ak, av) => match t2 {
            CelType::Map(bk, bv) => {
                internal_is_assignable(m, ak, bk) && internal_is_assignable(m, av, bv)
            }
            _ => false,
        },
        _ => false,
    }
}

fn internal_is_assignable_list(m: &mut Mapping, l1: &[CelType], l2: &[CelType]) -> bool {
    if l1.len() != l2.len() {
        return false;
    }
    l1.iter()
        .zip(l2)
        .all(|(t1, t2)| internal_is_assignable(m, t1, t2))
}

/// Try to bind the type parameter `t2` to `t1`.
///
/// Returns `(valid, has_substitution)`, where `has_substitution` reports
/// whether `t2` was already bound before the call.
fn is_valid_type_substitution(m: &mut Mapping, t1: &CelType, t2: &CelType) -> (bool, bool) {
    if is_exact_type(t1, t2) {
        return (true, true);
    }
    let CelType::TypeParam(param) = t2 else {
        return (false, false);
    };

    if let Some(bound) = m.find_param(param).cloned() {
        if is_exact_type(t1, &bound) {
            return (true, true);
        }
        if internal_is_assignable(m, t1, &bound) {
            let widened = most_general(t1, &bound);
            if not_referenced_in(m, t2, &widened) {
                m.add(Arc::clone(param), widened);
            }
            return (true, true);
        }
        return (false, true);
    }

    if not_referenced_in(m, t2, t1) {
        m.add(Arc::clone(param), t1.clone());
        return (true, false);
    }
    (false, false)
}

/// Null is assignable to nullable types only.
fn null_assignable(t: &CelType) -> bool {
    match t {
        CelType::Null | CelType::Message(_) | CelType::Opaque { .. } => true,
        _ => is_assignable_type(t, &CelType::Null),
    }
}

// ==================== Generality ====================

fn is_equal_or_less_specific(t1: &CelType, t2: &CelType) -> bool {
    if matches!(t1, CelType::Dyn | CelType::Type(_)) {
        return true;
    }
    if matches!(t2, CelType::Dyn | CelType::Type(_)) {
        return false;
    }
    if t1.kind() != t2.kind() {
        return false;
    }
    match (t1, t2) {
        (
            CelType::Opaque { name: n1, params: p1 },
            CelType::Opaque { name: n2, params: p2 },
        ) => {
            n1 == n2
                && p1.len() == p2.len()
                && p1.iter().zip(p2.iter()).all(|(a, b)| is_equal_or_less_specific(a, b))
        }
        (CelType::List(a), CelType::List(b)) | (CelType::Optional(a), CelType::Optional(b)) => {
            is_equal_or_less_specific(a, b)
        }
        (CelType::Map(ak, av), CelType::Map(bk, bv)) => {
            is_equal_or_less_specific(ak, bk) && is_equal_or_less_specific(av, bv)
        }
        _ => is_exact_type(t1, t2),
    }
}

// ==================== Substitution ====================

/// Occurs check: true if the type parameter `param` does not appear in
/// `within`, following bindings through the mapping.
fn not_referenced_in(m: &Mapping, param: &CelType, within: &CelType) -> bool {
    if is_exact_type(param, within) {
        return false;
    }
    match within {
        CelType::TypeParam(_) => match m.find(within) {
            Some(bound) => not_referenced_in(m, param, bound),
            None => true,
        },
        CelType::List(inner)
        | CelType::Wrapper(inner)
        | CelType::Type(inner)
        | CelType::Optional(inner) => not_referenced_in(m, param, inner),
        CelType::Map(key, val) => not_referenced_in(m, param, key) && not_referenced_in(m, param, val),
        CelType::Opaque { params, .. } => params.iter().all(|p| not_referenced_in(m, param, p)),
        CelType::Function { result, params } => {
            not_referenced_in(m, param, result) && params.iter().all(|p| not_referenced_in(m, param, p))
        }
        _ => true,
    }
}

fn substitute_guarded(
    m: &Mapping,
    t: &CelType,
    type_param_to_dyn: bool,
    resolving: &mut Vec<Arc<str>>,
) -> CelType {
    let recurse = |inner: &CelType, resolving: &mut Vec<Arc<str>>| {
        substitute_guarded(m, inner, type_param_to_dyn, resolving)
    };
    match t {
        CelType::TypeParam(name) => {
            // A parameter already being resolved means a cyclic binding.
            if let Some(bound) = m.find_param(name).filter(|_| !resolving.contains(name)) {
                resolving.push(Arc::clone(name));
                let resolved = recurse(bound, resolving);
                resolving.pop();
                return resolved;
            }
            if type_param_to_dyn {
                CelType::Dyn
            } else {
                t.clone()
            }
        }
        CelType::List(elem) => CelType::list(recurse(elem, resolving)),
        CelType::Map(key, val) => CelType::map(recurse(key, resolving), recurse(val, resolving)),
        CelType::Wrapper(inner) => CelType::wrapper(recurse(inner, resolving)),
        CelType::Type(inner) => CelType::type_of(recurse(inner, resolving)),
        CelType::Optional(inner) => CelType::optional(recurse(inner, resolving)),
        CelType::Opaque { name, params } => {
            let params: Vec<CelType> = params.iter().map(|p| recurse(p, resolving)).collect();
            CelType::opaque(name, &params)
        }
        CelType::Function { result, params } => {
            let result = recurse(result, resolving);
            let params: Vec<CelType> = params.iter().map(|p| recurse(p, resolving)).collect();
            CelType::function(result, &params)
        }
        _ => t.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cel_checker_common::CheckError;

    fn param(name: &str) -> CelType {
        CelType::type_param(name)
    }

    fn error_type() -> CelType {
        CelType::error(CheckError::undefined_field("f", 1))
    }

    #[test]
    fn test_exact_type_ignores_error_payload() {
        let a = CelType::error(CheckError::undefined_field("a", 1));
        let b = CelType::error(CheckError::undefined_field("b", 2));
        assert!(is_exact_type(&a, &b));
        assert!(is_exact_type(&CelType::list(a), &CelType::list(b)));
        assert!(!is_exact_type(&CelType::Int, &CelType::UInt));
    }

    #[test]
    fn test_primitive_assignability() {
        let m = Mapping::new();
        assert!(is_assignable(&m, &CelType::Int, &CelType::Int).is_some());
        assert!(is_assignable(&m, &CelType::Int, &CelType::String).is_none());
        assert!(is_assignable(&m, &CelType::Int, &CelType::Dyn).is_some());
        assert!(is_assignable(&m, &CelType::Dyn, &CelType::Int).is_some());
        assert!(is_assignable(&m, &error_type(), &CelType::Bytes).is_some());
    }

    #[test]
    fn test_null_assignability() {
        let m = Mapping::new();
        assert!(is_assignable(&m, &CelType::Null, &CelType::message("a.B")).is_some());
        assert!(is_assignable(&m, &CelType::Null, &CelType::wrapper(CelType::Int)).is_some());
        assert!(is_assignable(&m, &CelType::Null, &CelType::opaque("set", &[])).is_some());
        assert!(is_assignable(&m, &CelType::Int, &CelType::Null).is_none());
        assert!(is_assignable(&m, &CelType::Null, &CelType::list(CelType::Int)).is_none());
    }

    #[test]
    fn test_wrapper_assignability() {
        let m = Mapping::new();
        let wrapped = CelType::wrapper(CelType::Int);
        assert!(is_assignable(&m, &CelType::Int, &wrapped).is_some());
        assert!(is_assignable(&m, &wrapped, &CelType::Int).is_some());
        assert!(is_assignable(&m, &wrapped, &wrapped).is_some());
        assert!(is_assignable(&m, &CelType::String, &wrapped).is_none());
    }

    #[test]
    fn test_message_assignability_is_nominal() {
        let m = Mapping::new();
        assert!(is_assignable(&m, &CelType::message("a.B"), &CelType::message("a.B")).is_some());
        assert!(is_assignable(&m, &CelType::message("a.B"), &CelType::message("a.C")).is_none());
    }

    #[test]
    fn test_type_param_binding() {
        let m = Mapping::new();
        let bound = is_assignable(&m, &CelType::Int, &param("T")).expect("binds");
        assert_eq!(bound.find_param("T"), Some(&CelType::Int));
        assert!(m.is_empty());

        // A second use must agree with the first binding.
        assert!(is_assignable(&bound, &CelType::Int, &param("T")).is_some());
        assert!(is_assignable(&bound, &CelType::String, &param("T")).is_none());
    }

    #[test]
    fn test_binding_widens_to_dyn() {
        let m = is_assignable(&Mapping::new(), &CelType::Int, &param("T")).expect("binds");
        let m = is_assignable(&m, &CelType::Dyn, &param("T")).expect("widens");
        assert_eq!(m.find_param("T"), Some(&CelType::Dyn));
    }

    #[test]
    fn test_list_assignability_binds_element() {
        let m = Mapping::new();
        let m = is_assignable_list(
            &m,
            &[CelType::list(CelType::Int), CelType::list(CelType::Int)],
            &[CelType::list(param("T")), CelType::list(param("T"))],
        )
        .expect("assignable");
        assert_eq!(substitute(&m, &param("T"), false), CelType::Int);
    }

    #[test]
    fn test_list_length_mismatch() {
        let m = Mapping::new();
        assert!(is_assignable_list(&m, &[CelType::Int], &[CelType::Int, CelType::Int]).is_none());
    }

    #[test]
    fn test_failed_list_leaves_mapping_untouched() {
        let m = Mapping::new();
        let result = is_assignable_list(
            &m,
            &[CelType::Int, CelType::String],
            &[param("T"), param("T")],
        );
        assert!(result.is_none());
        assert!(m.is_empty());
    }

    #[test]
    fn test_occurs_check() {
        let m = Mapping::new();
        assert!(is_assignable(&m, &CelType::list(param("T")), &param("T")).is_none());
    }

    #[test]
    fn test_optional_and_map_structure() {
        let m = Mapping::new();
        let opt_int = CelType::optional(CelType::Int);
        assert!(is_assignable(&m, &opt_int, &CelType::optional(param("T"))).is_some());
        assert!(is_assignable(&m, &opt_int, &CelType::Int).is_none());

        let map = CelType::map(CelType::String, CelType::Int);
        let generic = CelType::map(param("K"), param("V"));
        let bound = is_assignable(&m, &map, &generic).expect("binds");
        assert_eq!(substitute(&bound, &generic, false), map);
    }

    #[test]
    fn test_type_values_match_any_type_value() {
        let m = Mapping::new();
        assert!(is_assignable(&m, &CelType::type_of(CelType::Int), &CelType::type_of(CelType::Dyn)).is_some());
        assert!(is_assignable(&m, &CelType::type_of(CelType::Int), &CelType::Int).is_none());
    }

    #[test]
    fn test_function_assignability() {
        let m = Mapping::new();
        let concrete = function_type(CelType::Int, &[CelType::Int]);
        let generic = function_type(param("T"), &[param("T")]);
        assert!(is_assignable(&m, &concrete, &generic).is_some());
        assert!(is_assignable(&m, &concrete, &CelType::Int).is_none());
    }

    #[test]
    fn test_most_general() {
        assert_eq!(most_general(&CelType::Dyn, &CelType::Int), CelType::Dyn);
        assert_eq!(most_general(&CelType::Int, &CelType::Dyn), CelType::Dyn);
        assert_eq!(most_general(&CelType::Int, &CelType::Int), CelType::Int);
        assert_eq!(
            most_general(&CelType::list(CelType::Dyn), &CelType::list(CelType::Int)),
            CelType::list(CelType::Dyn)
        );
        assert_eq!(
            most_general(&CelType::list(CelType::Int), &CelType::list(CelType::Dyn)),
            CelType::list(CelType::Dyn)
        );
    }

    #[test]
    fn test_substitute_follows_chains() {
        let mut m = Mapping::new();
        m.add(Arc::from("A"), param("B"));
        m.add(Arc::from("B"), CelType::String);
        assert_eq!(
            substitute(&m, &CelType::list(param("A")), false),
            CelType::list(CelType::String)
        );
    }

    #[test]
    fn test_substitute_unbound_params() {
        let m = Mapping::new();
        let t = CelType::map(param("K"), CelType::Int);
        assert_eq!(substitute(&m, &t, false), t);
        assert_eq!(substitute(&m, &t, true), CelType::map(CelType::Dyn, CelType::Int));
    }

    #[test]
    fn test_substitute_survives_cycles() {
        let mut m = Mapping::new();
        m.add(Arc::from("A"), param("B"));
        m.add(Arc::from("B"), param("A"));
        assert_eq!(substitute(&m, &param("A"), true), CelType::Dyn);
    }

    #[test]
    fn test_is_assignable_type_ignores_params() {
        assert!(is_assignable_type(&CelType::list(param("T")), &CelType::list(CelType::Int)));
        assert!(is_assignable_type(&CelType::wrapper(CelType::Int), &CelType::Null));
        assert!(!is_assignable_type(&CelType::Int, &CelType::Null));
    }
}
