//! Common test utilities for cel-checker integration tests.

use std::sync::Arc;

use cel_checker::{check, CheckResult, CheckerEnv};
use cel_checker_common::{CelType, Expr, MessageRegistry, MessageType, ProtoTypeRegistry};
use prost_reflect::prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
};
use prost_reflect::DescriptorPool;

pub const TEST_ALL_TYPES: &str = "cel.test.TestAllTypes";
pub const NESTED_MESSAGE: &str = "cel.test.TestAllTypes.NestedMessage";

/// Registry with the well-known types and a `cel.test.TestAllTypes` message.
#[allow(dead_code)]
pub fn test_registry() -> MessageRegistry {
    MessageRegistry::with_well_known_types()
        .with_message(
            MessageType::new(TEST_ALL_TYPES)
                .with_field("single_int64", CelType::Int)
                .with_field("single_int32", CelType::Int)
                .with_field("single_uint64", CelType::UInt)
                .with_field("single_double", CelType::Double)
                .with_field("single_bool", CelType::Bool)
                .with_field("single_string", CelType::String)
                .with_field("single_bytes", CelType::Bytes)
                .with_field("single_any", CelType::message("google.protobuf.Any"))
                .with_field("single_timestamp", CelType::timestamp())
                .with_field("single_duration", CelType::duration())
                .with_field("single_value", CelType::Dyn)
                .with_field("single_struct", CelType::map(CelType::String, CelType::Dyn))
                .with_field("single_int64_wrapper", CelType::wrapper(CelType::Int))
                .with_field("single_string_wrapper", CelType::wrapper(CelType::String))
                .with_field("repeated_int64", CelType::list(CelType::Int))
                .with_field("repeated_string", CelType::list(CelType::String))
                .with_field("map_string_int64", CelType::map(CelType::String, CelType::Int))
                .with_field("standalone_message", CelType::message(NESTED_MESSAGE))
                .with_field("standalone_enum", CelType::Int),
        )
        .with_message(MessageType::new(NESTED_MESSAGE).with_field("bb", CelType::Int))
        .with_enum("cel.test.GlobalEnum", &[("GOO", 0), ("GAR", 1), ("GAZ", 2)])
}

/// Standard library environment with `x` declared as a `TestAllTypes`.
#[allow(dead_code)]
pub fn test_env() -> CheckerEnv {
    CheckerEnv::with_standard_library()
        .with_registry(Arc::new(test_registry()))
        .with_variable("x", CelType::message(TEST_ALL_TYPES))
}

/// Registry built from protobuf descriptors for a small `acme.Account` message.
#[allow(dead_code)]
pub fn proto_registry() -> ProtoTypeRegistry {
    let field = |name: &str, number: i32, ty: Type, label: Label| FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    };
    let account = DescriptorProto {
        name: Some("Account".to_string()),
        field: vec![
            field("id", 1, Type::Int64, Label::Optional),
            field("tags", 2, Type::String, Label::Repeated),
            field("balance", 3, Type::Double, Label::Optional),
        ],
        ..Default::default()
    };
    let file = FileDescriptorProto {
        name: Some("acme/account.proto".to_string()),
        package: Some("acme".to_string()),
        message_type: vec![account],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    };
    let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })
        .expect("valid descriptors");
    ProtoTypeRegistry::from_pool(pool)
}

/// Check an expression and assert it has no errors.
#[allow(dead_code)]
pub fn assert_checks(expr: &Expr, env: &CheckerEnv) -> CheckResult {
    let result = check(expr, env).expect("well-formed expression");
    if !result.is_ok() {
        panic!(
            "unexpected check errors: {:?}",
            error_messages(&result)
        );
    }
    result
}

/// Check an expression and assert the type of its root.
#[allow(dead_code)]
pub fn assert_type(expr: &Expr, env: &CheckerEnv, expected: CelType) -> CheckResult {
    let result = assert_checks(expr, env);
    assert_eq!(result.result_type(), Some(&expected));
    result
}

/// Check an expression and return its error messages, asserting there is at least one.
#[allow(dead_code)]
pub fn assert_check_errors(expr: &Expr, env: &CheckerEnv) -> Vec<String> {
    let result = check(expr, env).expect("well-formed expression");
    if result.is_ok() {
        panic!("expected check errors, but got type {:?}", result.result_type());
    }
    error_messages(&result)
}

#[allow(dead_code)]
pub fn error_messages(result: &CheckResult) -> Vec<String> {
    result.errors.iter().map(|e| e.message()).collect()
}
