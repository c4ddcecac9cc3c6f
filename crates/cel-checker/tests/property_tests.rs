//! Property tests for the type algebra and the checker.
//!
//! Invariants that hold for any input:
//!
//! 1. Assignability is reflexive on ground types
//! 2. `dyn` is assignable to and from every type
//! 3. Substitution without bindings leaves ground types unchanged
//! 4. `most_general` prefers `dyn` and is idempotent
//! 5. Checking is deterministic and closes every type parameter
//! 6. Joining literal element types yields the joined type, `dyn` or an error
//! 7. A node reached twice through shared ids checks like a single node

mod common;

use cel_checker::types::{is_assignable, is_exact_type, most_general, substitute};
use cel_checker::{check, Mapping};
use cel_checker_common::operators;
use cel_checker_common::{CelType, Expr, ExprFactory, ExprKind};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

const MESSAGE_POOL: &[&str] = &["cel.test.TestAllTypes", "acme.Account", "a.B"];

fn arb_primitive() -> impl Strategy<Value = CelType> {
    prop_oneof![
        Just(CelType::Bool),
        Just(CelType::Int),
        Just(CelType::UInt),
        Just(CelType::Double),
        Just(CelType::String),
        Just(CelType::Bytes),
    ]
}

fn arb_leaf() -> impl Strategy<Value = CelType> {
    prop_oneof![
        4 => arb_primitive(),
        1 => Just(CelType::Null),
        1 => Just(CelType::Dyn),
        1 => Just(CelType::timestamp()),
        1 => prop::sample::select(MESSAGE_POOL).prop_map(CelType::message),
        1 => arb_primitive().prop_map(CelType::wrapper),
    ]
}

/// Types without type parameters.
fn arb_ground_type() -> impl Strategy<Value = CelType> {
    arb_leaf().prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(CelType::list),
            (inner.clone(), inner.clone()).prop_map(|(k, v)| CelType::map(k, v)),
            inner.clone().prop_map(CelType::optional),
            inner.prop_map(CelType::type_of),
        ]
    })
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Int(i64),
    Str(u8),
    Undeclared,
}

fn arb_literal() -> impl Strategy<Value = Operand> {
    prop_oneof![
        any::<i64>().prop_map(Operand::Int),
        any::<u8>().prop_map(Operand::Str),
    ]
}

fn arb_operand() -> impl Strategy<Value = Operand> {
    prop_oneof![
        4 => arb_literal(),
        1 => Just(Operand::Undeclared),
    ]
}

fn literal(f: &mut ExprFactory, operand: Operand) -> Expr {
    match operand {
        Operand::Int(v) => f.int(v),
        Operand::Str(v) => f.string(format!("s{}", v)),
        Operand::Undeclared => f.ident("missing"),
    }
}

// ---------------------------------------------------------------------------
// Type algebra
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn assignability_is_reflexive(t in arb_ground_type()) {
        prop_assert!(is_assignable(&Mapping::new(), &t, &t).is_some());
    }

    #[test]
    fn dyn_is_assignable_both_ways(t in arb_ground_type()) {
        let m = Mapping::new();
        prop_assert!(is_assignable(&m, &CelType::Dyn, &t).is_some());
        prop_assert!(is_assignable(&m, &t, &CelType::Dyn).is_some());
    }

    #[test]
    fn failed_assignability_leaves_mapping_alone(t in arb_ground_type()) {
        let mut m = Mapping::new();
        m.add("T".into(), CelType::Int);
        let before = m.clone();
        let _ = is_assignable(&m, &CelType::type_param("T"), &t);
        prop_assert_eq!(m, before);
    }

    #[test]
    fn substitution_without_bindings_is_identity(t in arb_ground_type()) {
        let m = Mapping::new();
        prop_assert!(is_exact_type(&substitute(&m, &t, true), &t));
        prop_assert!(is_exact_type(&substitute(&m, &t, false), &t));
    }

    #[test]
    fn unbound_param_closes_to_dyn(t in arb_ground_type()) {
        let m = Mapping::new();
        let open = CelType::list(CelType::map(t.clone(), CelType::type_param("_var0")));
        let closed = substitute(&m, &open, true);
        prop_assert_eq!(closed, CelType::list(CelType::map(t, CelType::Dyn)));
    }

    #[test]
    fn most_general_prefers_dyn(t in arb_ground_type()) {
        prop_assert_eq!(most_general(&CelType::Dyn, &t), CelType::Dyn);
        prop_assert_eq!(most_general(&t, &t), t);
    }
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn checking_is_deterministic(operands in prop::collection::vec(arb_operand(), 0..8)) {
        let mut f = ExprFactory::new();
        let elements = operands.iter().map(|op| literal(&mut f, *op)).collect();
        let expr = f.list(elements);
        let env = common::test_env();

        let first = check(&expr, &env).unwrap();
        let second = check(&expr, &env).unwrap();
        prop_assert_eq!(&first.type_map, &second.type_map);
        prop_assert_eq!(&first.reference_map, &second.reference_map);
        prop_assert_eq!(&first.errors, &second.errors);
        prop_assert_eq!(&first.expr, &second.expr);
        prop_assert!(first.type_map.values().all(|t| !t.has_type_params()));

        let undeclared = operands.iter().filter(|op| matches!(op, Operand::Undeclared)).count();
        prop_assert_eq!(first.errors.len(), undeclared);
        prop_assert!(matches!(first.result_type(), Some(CelType::List(_))));
    }

    #[test]
    fn list_literal_joins_element_types(operands in prop::collection::vec(arb_literal(), 1..8)) {
        let mut f = ExprFactory::new();
        let elements = operands.iter().map(|op| literal(&mut f, *op)).collect();
        let expr = f.list(elements);
        let result = check(&expr, &common::test_env()).unwrap();

        let all_int = operands.iter().all(|op| matches!(op, Operand::Int(_)));
        let all_str = operands.iter().all(|op| matches!(op, Operand::Str(_)));
        let expected = if all_int {
            CelType::list(CelType::Int)
        } else if all_str {
            CelType::list(CelType::String)
        } else {
            CelType::list(CelType::Dyn)
        };
        prop_assert!(result.is_ok());
        prop_assert_eq!(result.result_type(), Some(&expected));
    }

    #[test]
    fn homogeneous_literals_reject_mixed_elements(operands in prop::collection::vec(arb_literal(), 1..8)) {
        let mut f = ExprFactory::new();
        let elements = operands.iter().map(|op| literal(&mut f, *op)).collect();
        let expr = f.list(elements);
        let env = common::test_env().with_homogeneous_aggregate_literals();
        let result = check(&expr, &env).unwrap();

        let mixed = operands.windows(2).any(|pair| {
            !matches!(
                pair,
                [Operand::Int(_), Operand::Int(_)] | [Operand::Str(_), Operand::Str(_)]
            )
        });
        prop_assert_eq!(!result.is_ok(), mixed);
        if !mixed {
            prop_assert!(!matches!(result.result_type(), Some(CelType::List(elem)) if elem.is_dyn()));
        }
    }

    #[test]
    fn shared_nodes_check_like_single_nodes(operand in arb_literal()) {
        let mut f = ExprFactory::new();
        let elem = literal(&mut f, operand);
        let single = f.list(vec![elem]);
        let shared = Expr::new(single.id, ExprKind::List(match &single.kind {
            ExprKind::List(elements) => vec![elements[0].clone(), elements[0].clone()],
            _ => unreachable!(),
        }));
        let env = common::test_env();

        let once = check(&single, &env).unwrap();
        let twice = check(&shared, &env).unwrap();
        prop_assert!(twice.is_ok());
        prop_assert_eq!(once.type_map, twice.type_map);
    }

    #[test]
    fn int_addition_chains_stay_int(values in prop::collection::vec(any::<i64>(), 1..12)) {
        let mut f = ExprFactory::new();
        let mut iter = values.into_iter();
        let first = iter.next().unwrap_or_default();
        let mut expr = f.int(first);
        for v in iter {
            let rhs = f.int(v);
            expr = f.binary(operators::ADD, expr, rhs);
        }
        let result = check(&expr, &common::test_env()).unwrap();
        prop_assert!(result.is_ok());
        prop_assert_eq!(result.result_type(), Some(&CelType::Int));
    }
}
