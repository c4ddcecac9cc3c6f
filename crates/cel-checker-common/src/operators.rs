//! Function names the parser emits for CEL operators and macros.

pub const ADD: &str = "_+_";
pub const SUBTRACT: &str = "_-_";
pub const MULTIPLY: &str = "_*_";
pub const DIVIDE: &str = "_/_";
pub const MODULO: &str = "_%_";
pub const NEGATE: &str = "-_";

pub const EQUALS: &str = "_==_";
pub const NOT_EQUALS: &str = "_!=_";
pub const LESS: &str = "_<_";
pub const LESS_EQUALS: &str = "_<=_";
pub const GREATER: &str = "_>_";
pub const GREATER_EQUALS: &str = "_>=_";

pub const LOGICAL_AND: &str = "_&&_";
pub const LOGICAL_OR: &str = "_||_";
pub const LOGICAL_NOT: &str = "!_";
pub const CONDITIONAL: &str = "_?_:_";

pub const INDEX: &str = "_[_]";
pub const OPT_INDEX: &str = "_[?_]";
/// Optional field selection `a.?b`, emitted as `_?._(a, "b")`.
pub const OPT_SELECT: &str = "_?._";
pub const IN: &str = "@in";

/// Loop condition helper used by `all` and `exists`.
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";

/// Returns true for the variadic logical operators, which are checked
/// without generic overload matching.
pub fn is_logical(function: &str) -> bool {
    function == LOGICAL_AND || function == LOGICAL_OR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_logical() {
        assert!(is_logical(LOGICAL_AND));
        assert!(is_logical(LOGICAL_OR));
        assert!(!is_logical(LOGICAL_NOT));
        assert!(!is_logical(EQUALS));
    }
}
