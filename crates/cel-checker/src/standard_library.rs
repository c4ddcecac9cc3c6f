//! CEL standard library declarations.
//!
//! Operators and built-in functions with the overload ids cel-go uses, plus
//! the optional-value library.

use std::sync::LazyLock;

use cel_checker_common::operators;
use cel_checker_common::{CelType, FunctionDecl, OverloadDecl};

/// The CEL standard library containing all built-in operators and functions.
pub static STANDARD_LIBRARY: LazyLock<Vec<FunctionDecl>> = LazyLock::new(build_standard_library);

/// Overloads comparing numbers of different types, disabled by default.
pub const CROSS_TYPE_NUMERIC_COMPARISON_OVERLOADS: [&str; 24] = [
    "less_double_int64",
    "less_double_uint64",
    "less_int64_double",
    "less_int64_uint64",
    "less_uint64_double",
    "less_uint64_int64",
    "less_equals_double_int64",
    "less_equals_double_uint64",
    "less_equals_int64_double",
    "less_equals_int64_uint64",
    "less_equals_uint64_double",
    "less_equals_uint64_int64",
    "greater_double_int64",
    "greater_double_uint64",
    "greater_int64_double",
    "greater_int64_uint64",
    "greater_uint64_double",
    "greater_uint64_int64",
    "greater_equals_double_int64",
    "greater_equals_double_uint64",
    "greater_equals_int64_double",
    "greater_equals_int64_uint64",
    "greater_equals_uint64_double",
    "greater_equals_uint64_int64",
];

/// Look up a standard library function by name.
pub fn get_standard_function(name: &str) -> Option<&'static FunctionDecl> {
    STANDARD_LIBRARY.iter().find(|f| f.name == name)
}

fn param(name: &str) -> CelType {
    CelType::type_param(name)
}

fn generic(overload: OverloadDecl, params: &[&str]) -> OverloadDecl {
    overload.with_type_params(params.iter().map(|p| p.to_string()).collect())
}

fn build_standard_library() -> Vec<FunctionDecl> {
    let mut funcs = Vec::new();
    add_arithmetic(&mut funcs);
    add_comparisons(&mut funcs);
    add_logic(&mut funcs);
    add_collections(&mut funcs);
    add_conversions(&mut funcs);
    add_strings(&mut funcs);
    add_time_accessors(&mut funcs);
    add_optionals(&mut funcs);
    funcs
}

// ==================== Operators ====================

fn add_arithmetic(funcs: &mut Vec<FunctionDecl>) {
    let ts = CelType::timestamp;
    let dur = CelType::duration;

    funcs.push(
        FunctionDecl::new(operators::ADD)
            .with_overload(OverloadDecl::function("add_int64", vec![CelType::Int, CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("add_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt))
            .with_overload(OverloadDecl::function("add_double", vec![CelType::Double, CelType::Double], CelType::Double))
            .with_overload(OverloadDecl::function("add_string", vec![CelType::String, CelType::String], CelType::String))
            .with_overload(OverloadDecl::function("add_bytes", vec![CelType::Bytes, CelType::Bytes], CelType::Bytes))
            .with_overload(generic(
                OverloadDecl::function(
                    "add_list",
                    vec![CelType::list(param("T")), CelType::list(param("T"))],
                    CelType::list(param("T")),
                ),
                &["T"],
            ))
            .with_overload(OverloadDecl::function("add_timestamp_duration", vec![ts(), dur()], ts()))
            .with_overload(OverloadDecl::function("add_duration_timestamp", vec![dur(), ts()], ts()))
            .with_overload(OverloadDecl::function("add_duration_duration", vec![dur(), dur()], dur())),
    );

    funcs.push(
        FunctionDecl::new(operators::SUBTRACT)
            .with_overload(OverloadDecl::function("subtract_int64", vec![CelType::Int, CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("subtract_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt))
            .with_overload(OverloadDecl::function("subtract_double", vec![CelType::Double, CelType::Double], CelType::Double))
            .with_overload(OverloadDecl::function("subtract_timestamp_timestamp", vec![ts(), ts()], dur()))
            .with_overload(OverloadDecl::function("subtract_timestamp_duration", vec![ts(), dur()], ts()))
            .with_overload(OverloadDecl::function("subtract_duration_duration", vec![dur(), dur()], dur())),
    );

    for (name, prefix) in [(operators::MULTIPLY, "multiply"), (operators::DIVIDE, "divide")] {
        funcs.push(FunctionDecl::new(name).with_overloads(
            [("int64", CelType::Int), ("uint64", CelType::UInt), ("double", CelType::Double)]
                .into_iter()
                .map(|(suffix, t)| {
                    OverloadDecl::function(format!("{prefix}_{suffix}"), vec![t.clone(), t.clone()], t)
                }),
        ));
    }

    funcs.push(
        FunctionDecl::new(operators::MODULO)
            .with_overload(OverloadDecl::function("modulo_int64", vec![CelType::Int, CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("modulo_uint64", vec![CelType::UInt, CelType::UInt], CelType::UInt)),
    );

    funcs.push(
        FunctionDecl::new(operators::NEGATE)
            .with_overload(OverloadDecl::function("negate_int64", vec![CelType::Int], CelType::Int))
            .with_overload(OverloadDecl::function("negate_double", vec![CelType::Double], CelType::Double)),
    );
}

fn add_comparisons(funcs: &mut Vec<FunctionDecl>) {
    funcs.push(FunctionDecl::new(operators::EQUALS).with_overload(generic(
        OverloadDecl::function("equals", vec![param("T"), param("T")], CelType::Bool),
        &["T"],
    )));
    funcs.push(FunctionDecl::new(operators::NOT_EQUALS).with_overload(generic(
        OverloadDecl::function("not_equals", vec![param("T"), param("T")], CelType::Bool),
        &["T"],
    )));

    let same_type = [
        ("bool", CelType::Bool),
        ("int64", CelType::Int),
        ("uint64", CelType::UInt),
        ("double", CelType::Double),
        ("string", CelType::String),
        ("bytes", CelType::Bytes),
        ("timestamp", CelType::timestamp()),
        ("duration", CelType::duration()),
    ];
    let numeric = [
        ("int64", CelType::Int),
        ("uint64", CelType::UInt),
        ("double", CelType::Double),
    ];

    for (name, prefix) in [
        (operators::LESS, "less"),
        (operators::LESS_EQUALS, "less_equals"),
        (operators::GREATER, "greater"),
        (operators::GREATER_EQUALS, "greater_equals"),
    ] {
        let mut func = FunctionDecl::new(name);
        for (suffix, t) in &same_type {
            func = func.with_overload(OverloadDecl::function(
                format!("{prefix}_{suffix}"),
                vec![t.clone(), t.clone()],
                CelType::Bool,
            ));
        }
        for (lhs_name, lhs) in &numeric {
            for (rhs_name, rhs) in &numeric {
                if lhs_name == rhs_name {
                    continue;
                }
                func = func.with_overload(OverloadDecl::function(
                    format!("{prefix}_{lhs_name}_{rhs_name}"),
                    vec![lhs.clone(), rhs.clone()],
                    CelType::Bool,
                ));
            }
        }
        funcs.push(func);
    }
}

fn add_logic(funcs: &mut Vec<FunctionDecl>) {
    let binary_bool = vec![CelType::Bool, CelType::Bool];
    funcs.push(
        FunctionDecl::new(operators::LOGICAL_AND)
            .with_overload(OverloadDecl::function("logical_and", binary_bool.clone(), CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new(operators::LOGICAL_OR)
            .with_overload(OverloadDecl::function("logical_or", binary_bool, CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new(operators::LOGICAL_NOT)
            .with_overload(OverloadDecl::function("logical_not", vec![CelType::Bool], CelType::Bool)),
    );
    funcs.push(
        FunctionDecl::new(operators::NOT_STRICTLY_FALSE)
            .with_overload(OverloadDecl::function("not_strictly_false", vec![CelType::Bool], CelType::Bool)),
    );
    funcs.push(FunctionDecl::new(operators::CONDITIONAL).with_overload(generic(
        OverloadDecl::function(
            "conditional",
            vec![CelType::Bool, param("T"), param("T")],
            param("T"),
        ),
        &["T"],
    )));
}

fn add_collections(funcs: &mut Vec<FunctionDecl>) {
    let list_t = || CelType::list(param("T"));
    let map_kv = || CelType::map(param("K"), param("V"));

    funcs.push(
        FunctionDecl::new(operators::INDEX)
            .with_overload(generic(
                OverloadDecl::function("index_list", vec![list_t(), CelType::Int], param("T")),
                &["T"],
            ))
            .with_overload(generic(
                OverloadDecl::function("index_map", vec![map_kv(), param("K")], param("V")),
                &["K", "V"],
            ))
            .with_overload(generic(
                OverloadDecl::function(
                    "optional_list_index_int",
                    vec![CelType::optional(list_t()), CelType::Int],
                    CelType::optional(param("T")),
                ),
                &["T"],
            ))
            .with_overload(generic(
                OverloadDecl::function(
                    "optional_map_index_value",
                    vec![CelType::optional(map_kv()), param("K")],
                    CelType::optional(param("V")),
                ),
                &["K", "V"],
            )),
    );

    funcs.push(
        FunctionDecl::new(operators::IN)
            .with_overload(generic(
                OverloadDecl::function("in_list", vec![param("T"), list_t()], CelType::Bool),
                &["T"],
            ))
            .with_overload(generic(
                OverloadDecl::function("in_map", vec![param("K"), map_kv()], CelType::Bool),
                &["K", "V"],
            )),
    );

    funcs.push(
        FunctionDecl::new("size")
            .with_overload(OverloadDecl::function("size_string", vec![CelType::String], CelType::Int))
            .with_overload(OverloadDecl::function("size_bytes", vec![CelType::Bytes], CelType::Int))
            .with_overload(generic(OverloadDecl::function("size_list", vec![list_t()], CelType::Int), &["T"]))
            .with_overload(generic(OverloadDecl::function("size_map", vec![map_kv()], CelType::Int), &["K", "V"]))
            .with_overload(OverloadDecl::method("string_size", vec![CelType::String], CelType::Int))
            .with_overload(OverloadDecl::method("bytes_size", vec![CelType::Bytes], CelType::Int))
            .with_overload(generic(OverloadDecl::method("list_size", vec![list_t()], CelType::Int), &["T"]))
            .with_overload(generic(OverloadDecl::method("map_size", vec![map_kv()], CelType::Int), &["K", "V"])),
    );
}

fn add_conversions(funcs: &mut Vec<FunctionDecl>) {
    // (function, result type, [(source name, source type)])
    let conversions: [(&str, CelType, Vec<(&str, CelType)>); 8] = [
        (
            "int",
            CelType::Int,
            vec![
                ("int64", CelType::Int),
                ("uint64", CelType::UInt),
                ("double", CelType::Double),
                ("string", CelType::String),
                ("timestamp", CelType::timestamp()),
            ],
        ),
        (
            "uint",
            CelType::UInt,
            vec![
                ("uint64", CelType::UInt),
                ("int64", CelType::Int),
                ("double", CelType::Double),
                ("string", CelType::String),
            ],
        ),
        (
            "double",
            CelType::Double,
            vec![
                ("double", CelType::Double),
                ("int64", CelType::Int),
                ("uint64", CelType::UInt),
                ("string", CelType::String),
            ],
        ),
        (
            "string",
            CelType::String,
            vec![
                ("string", CelType::String),
                ("int64", CelType::Int),
                ("uint64", CelType::UInt),
                ("double", CelType::Double),
                ("bytes", CelType::Bytes),
                ("bool", CelType::Bool),
                ("timestamp", CelType::timestamp()),
                ("duration", CelType::duration()),
            ],
        ),
        (
            "bytes",
            CelType::Bytes,
            vec![("bytes", CelType::Bytes), ("string", CelType::String)],
        ),
        (
            "bool",
            CelType::Bool,
            vec![("bool", CelType::Bool), ("string", CelType::String)],
        ),
        (
            "timestamp",
            CelType::timestamp(),
            vec![
                ("timestamp", CelType::timestamp()),
                ("string", CelType::String),
                ("int64", CelType::Int),
            ],
        ),
        (
            "duration",
            CelType::duration(),
            vec![("duration", CelType::duration()), ("string", CelType::String)],
        ),
    ];

    for (name, result, sources) in conversions {
        let target = match name {
            "int" => "int64",
            "uint" => "uint64",
            other => other,
        };
        funcs.push(FunctionDecl::new(name).with_overloads(sources.into_iter().map(
            |(source, source_type)| {
                OverloadDecl::function(format!("{source}_to_{target}"), vec![source_type], result.clone())
            },
        )));
    }

    funcs.push(FunctionDecl::new("dyn").with_overload(generic(
        OverloadDecl::function("to_dyn", vec![param("T")], CelType::Dyn),
        &["T"],
    )));
    funcs.push(FunctionDecl::new("type").with_overload(generic(
        OverloadDecl::function("type", vec![param("T")], CelType::type_of(param("T"))),
        &["T"],
    )));
}

fn add_strings(funcs: &mut Vec<FunctionDecl>) {
    let string_pair = || vec![CelType::String, CelType::String];
    for (name, id) in [
        ("contains", "contains_string"),
        ("startsWith", "starts_with_string"),
        ("endsWith", "ends_with_string"),
    ] {
        funcs.push(FunctionDecl::new(name).with_overload(OverloadDecl::method(id, string_pair(), CelType::Bool)));
    }
    funcs.push(
        FunctionDecl::new("matches")
            .with_overload(OverloadDecl::function("matches", string_pair(), CelType::Bool))
            .with_overload(OverloadDecl::method("matches_string", string_pair(), CelType::Bool)),
    );
}

fn add_time_accessors(funcs: &mut Vec<FunctionDecl>) {
    // (method, timestamp overload id, has duration overload)
    let accessors = [
        ("getFullYear", "timestamp_to_year", false),
        ("getMonth", "timestamp_to_month", false),
        ("getDate", "timestamp_to_day_of_month_1_based", false),
        ("getDayOfMonth", "timestamp_to_day_of_month", false),
        ("getDayOfWeek", "timestamp_to_day_of_week", false),
        ("getDayOfYear", "timestamp_to_day_of_year", false),
        ("getHours", "timestamp_to_hours", true),
        ("getMinutes", "timestamp_to_minutes", true),
        ("getSeconds", "timestamp_to_seconds", true),
        ("getMilliseconds", "timestamp_to_milliseconds", true),
    ];

    for (name, id, on_duration) in accessors {
        let mut func = FunctionDecl::new(name)
            .with_overload(OverloadDecl::method(id, vec![CelType::timestamp()], CelType::Int))
            .with_overload(OverloadDecl::method(
                format!("{id}_with_tz"),
                vec![CelType::timestamp(), CelType::String],
                CelType::Int,
            ));
        if on_duration {
            let unit = id.trim_start_matches("timestamp_to_");
            func = func.with_overload(OverloadDecl::method(
                format!("duration_to_{unit}"),
                vec![CelType::duration()],
                CelType::Int,
            ));
        }
        funcs.push(func);
    }
}

fn add_optionals(funcs: &mut Vec<FunctionDecl>) {
    let opt_t = || CelType::optional(param("T"));

    funcs.push(FunctionDecl::new("optional.of").with_overload(generic(
        OverloadDecl::function("optional_of", vec![param("T")], opt_t()),
        &["T"],
    )));
    funcs.push(FunctionDecl::new("optional.ofNonZeroValue").with_overload(generic(
        OverloadDecl::function("optional_ofNonZeroValue", vec![param("T")], opt_t()),
        &["T"],
    )));
    funcs.push(
        FunctionDecl::new("optional.none")
            .with_overload(generic(OverloadDecl::function("optional_none", vec![], opt_t()), &["T"])),
    );
    funcs.push(FunctionDecl::new("value").with_overload(generic(
        OverloadDecl::method("optional_value", vec![opt_t()], param("T")),
        &["T"],
    )));
    funcs.push(FunctionDecl::new("hasValue").with_overload(generic(
        OverloadDecl::method("optional_hasValue", vec![opt_t()], CelType::Bool),
        &["T"],
    )));
    funcs.push(FunctionDecl::new("or").with_overload(generic(
        OverloadDecl::method("optional_or_optional", vec![opt_t(), opt_t()], opt_t()),
        &["T"],
    )));
    funcs.push(FunctionDecl::new("orValue").with_overload(generic(
        OverloadDecl::method("optional_orValue_value", vec![opt_t(), param("T")], param("T")),
        &["T"],
    )));
    funcs.push(
        FunctionDecl::new(operators::OPT_INDEX)
            .with_overload(generic(
                OverloadDecl::function(
                    "list_optindex_optional_int",
                    vec![CelType::list(param("T")), CelType::Int],
                    opt_t(),
                ),
                &["T"],
            ))
            .with_overload(generic(
                OverloadDecl::function(
                    "map_optindex_optional_value",
                    vec![CelType::map(param("K"), param("V")), param("K")],
                    CelType::optional(param("V")),
                ),
                &["K", "V"],
            )),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_standard_library_loads() {
        assert!(!STANDARD_LIBRARY.is_empty());
    }

    #[test]
    fn test_add_operator() {
        let add = get_standard_function(operators::ADD).unwrap();
        assert!(add.overload("add_int64").is_some());
        assert!(add.overload("add_list").is_some_and(|o| o.type_params == vec!["T"]));
        assert_eq!(add.overloads.len(), 9);
    }

    #[test]
    fn test_overload_ids_are_unique() {
        let mut seen = HashSet::new();
        for func in STANDARD_LIBRARY.iter() {
            for overload in &func.overloads {
                assert!(seen.insert(overload.id.clone()), "duplicate id {}", overload.id);
            }
        }
    }

    #[test]
    fn test_function_names_are_unique() {
        let mut seen = HashSet::new();
        for func in STANDARD_LIBRARY.iter() {
            assert!(seen.insert(func.name.clone()), "duplicate function {}", func.name);
        }
    }

    #[test]
    fn test_cross_type_comparisons_are_declared() {
        let declared: HashSet<&str> = STANDARD_LIBRARY
            .iter()
            .flat_map(|f| f.overloads.iter().map(|o| o.id.as_str()))
            .collect();
        for id in CROSS_TYPE_NUMERIC_COMPARISON_OVERLOADS {
            assert!(declared.contains(id), "missing {id}");
        }
    }

    #[test]
    fn test_size_has_both_standalone_and_method() {
        let size = get_standard_function("size").unwrap();
        assert!(size.overloads.iter().any(|o| !o.is_member));
        assert!(size.overloads.iter().any(|o| o.is_member));
    }

    #[test]
    fn test_conversion_ids() {
        let int = get_standard_function("int").unwrap();
        assert!(int.overload("double_to_int64").is_some());
        let string = get_standard_function("string").unwrap();
        assert!(string.overload("duration_to_string").is_some());
    }

    #[test]
    fn test_time_accessors() {
        let hours = get_standard_function("getHours").unwrap();
        assert!(hours.overload("timestamp_to_hours_with_tz").is_some());
        assert!(hours.overload("duration_to_hours").is_some());
        let year = get_standard_function("getFullYear").unwrap();
        assert_eq!(year.overloads.len(), 2);
    }
}
