//! Checker-input expression tree.
//!
//! The tree mirrors the parsed CEL form after macro expansion: operators are
//! calls to well-known function names (see [`crate::operators`]) and macros
//! are comprehensions. Every node carries an id that is unique within the
//! tree; diagnostics, types and references are keyed by it.

use crate::operators;

/// Name of the accumulator variable introduced by the standard macros.
pub const ACCUMULATOR_VAR: &str = "@result";

/// An expression node with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Unique identifier for this node.
    pub id: i64,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: i64, kind: ExprKind) -> Self {
        Self { id, kind }
    }
}

/// A list element that may be optional (`[?x]`).
#[derive(Debug, Clone, PartialEq)]
pub struct ListElement {
    pub expr: Expr,
    pub optional: bool,
}

/// A map entry that may be optional (`{?k: v}`).
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub id: i64,
    pub key: Expr,
    pub value: Expr,
    pub optional: bool,
}

/// A message literal field initializer that may be optional.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub id: i64,
    pub name: String,
    pub value: Expr,
    pub optional: bool,
}

/// The shape of an expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),

    /// Identifier, possibly dotted once canonicalized. A leading `.` marks a
    /// root-qualified name.
    Ident(String),

    /// Field selection `operand.field`, or `has(operand.field)` when `test_only`.
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
    },

    /// Function call. Operators are calls as well (`_+_`, `_[_]`, ...).
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },

    // Collections
    List(Vec<ListElement>),
    Map(Vec<MapEntry>),

    /// Message literal: `TypeName{field: value, ...}`.
    Struct {
        message_name: String,
        fields: Vec<StructField>,
    },

    /// Comprehension expression (result of macro expansion).
    ///
    /// Semantics:
    /// ```text
    /// let accu_var = accu_init
    /// for (let iter_var, iter_var2 in iter_range) {
    ///    if (!loop_condition) { break }
    ///    accu_var = loop_step
    /// }
    /// return result
    /// ```
    Comprehension {
        /// The name of the first iteration variable.
        iter_var: String,
        /// The name of the second iteration variable, empty if not set.
        iter_var2: String,
        iter_range: Box<Expr>,
        accu_var: String,
        accu_init: Box<Expr>,
        loop_condition: Box<Expr>,
        loop_step: Box<Expr>,
        result: Box<Expr>,
    },
}

/// Builds expression trees with unique, increasing node ids.
///
/// Stands in for a parser in hosts and tests that construct expressions
/// programmatically. The macro helpers expand to the same comprehension
/// shapes the CEL parser produces.
#[derive(Debug)]
pub struct ExprFactory {
    next_id: i64,
}

impl Default for ExprFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprFactory {
    /// Create a factory whose first node id is 1.
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocate the next node id.
    pub fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn node(&mut self, kind: ExprKind) -> Expr {
        Expr::new(self.next_id(), kind)
    }

    // ==================== Literals ====================

    pub fn null(&mut self) -> Expr {
        self.node(ExprKind::Null)
    }

    pub fn bool(&mut self, value: bool) -> Expr {
        self.node(ExprKind::Bool(value))
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.node(ExprKind::Int(value))
    }

    pub fn uint(&mut self, value: u64) -> Expr {
        self.node(ExprKind::UInt(value))
    }

    pub fn double(&mut self, value: f64) -> Expr {
        self.node(ExprKind::Double(value))
    }

    pub fn string(&mut self, value: impl Into<String>) -> Expr {
        self.node(ExprKind::String(value.into()))
    }

    pub fn bytes(&mut self, value: impl Into<Vec<u8>>) -> Expr {
        self.node(ExprKind::Bytes(value.into()))
    }

    // ==================== References ====================

    pub fn ident(&mut self, name: impl Into<String>) -> Expr {
        self.node(ExprKind::Ident(name.into()))
    }

    pub fn select(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        self.node(ExprKind::Select {
            operand: Box::new(operand),
            field: field.into(),
            test_only: false,
        })
    }

    /// `has(operand.field)`.
    pub fn presence_test(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        self.node(ExprKind::Select {
            operand: Box::new(operand),
            field: field.into(),
            test_only: true,
        })
    }

    /// `operand.?field`.
    pub fn optional_select(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        let field = self.string(field);
        self.call(operators::OPT_SELECT, vec![operand, field])
    }

    /// Build a dotted identifier chain `a.b.c` as nested selects.
    pub fn qualified(&mut self, name: &str) -> Expr {
        let mut parts = name.split('.');
        let first = parts.next().unwrap_or_default();
        let mut expr = self.ident(first);
        for part in parts {
            expr = self.select(expr, part);
        }
        expr
    }

    // ==================== Calls ====================

    pub fn call(&mut self, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.node(ExprKind::Call {
            target: None,
            function: function.into(),
            args,
        })
    }

    pub fn member_call(&mut self, target: Expr, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.node(ExprKind::Call {
            target: Some(Box::new(target)),
            function: function.into(),
            args,
        })
    }

    pub fn binary(&mut self, function: &str, lhs: Expr, rhs: Expr) -> Expr {
        self.call(function, vec![lhs, rhs])
    }

    // ==================== Aggregates ====================

    pub fn list(&mut self, elements: Vec<Expr>) -> Expr {
        let elements = elements
            .into_iter()
            .map(|expr| ListElement { expr, optional: false })
            .collect();
        self.node(ExprKind::List(elements))
    }

    /// List literal with per-element optional markers.
    pub fn list_with_optionals(&mut self, elements: Vec<(Expr, bool)>) -> Expr {
        let elements = elements
            .into_iter()
            .map(|(expr, optional)| ListElement { expr, optional })
            .collect();
        self.node(ExprKind::List(elements))
    }

    pub fn map(&mut self, entries: Vec<(Expr, Expr)>) -> Expr {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key, value, false))
            .collect();
        self.map_with_optionals(entries)
    }

    pub fn map_with_optionals(&mut self, entries: Vec<(Expr, Expr, bool)>) -> Expr {
        let entries = entries
            .into_iter()
            .map(|(key, value, optional)| MapEntry {
                id: self.next_id(),
                key,
                value,
                optional,
            })
            .collect();
        self.node(ExprKind::Map(entries))
    }

    pub fn message(&mut self, message_name: impl Into<String>, fields: Vec<(&str, Expr)>) -> Expr {
        let fields = fields
            .into_iter()
            .map(|(name, value)| (name, value, false))
            .collect();
        self.message_with_optionals(message_name, fields)
    }

    pub fn message_with_optionals(
        &mut self,
        message_name: impl Into<String>,
        fields: Vec<(&str, Expr, bool)>,
    ) -> Expr {
        let fields = fields
            .into_iter()
            .map(|(name, value, optional)| StructField {
                id: self.next_id(),
                name: name.to_string(),
                value,
                optional,
            })
            .collect();
        self.node(ExprKind::Struct {
            message_name: message_name.into(),
            fields,
        })
    }

    // ==================== Comprehensions ====================

    #[allow(clippy::too_many_arguments)]
    pub fn comprehension(
        &mut self,
        iter_var: &str,
        iter_var2: &str,
        iter_range: Expr,
        accu_var: &str,
        accu_init: Expr,
        loop_condition: Expr,
        loop_step: Expr,
        result: Expr,
    ) -> Expr {
        self.node(ExprKind::Comprehension {
            iter_var: iter_var.to_string(),
            iter_var2: iter_var2.to_string(),
            iter_range: Box::new(iter_range),
            accu_var: accu_var.to_string(),
            accu_init: Box::new(accu_init),
            loop_condition: Box::new(loop_condition),
            loop_step: Box::new(loop_step),
            result: Box::new(result),
        })
    }

    /// `range.all(var, predicate)`.
    pub fn all(&mut self, range: Expr, var: &str, predicate: Expr) -> Expr {
        let init = self.bool(true);
        let accu = self.ident(ACCUMULATOR_VAR);
        let condition = self.call(operators::NOT_STRICTLY_FALSE, vec![accu]);
        let accu = self.ident(ACCUMULATOR_VAR);
        let step = self.binary(operators::LOGICAL_AND, accu, predicate);
        let result = self.ident(ACCUMULATOR_VAR);
        self.comprehension(var, "", range, ACCUMULATOR_VAR, init, condition, step, result)
    }

    /// `range.exists(var, predicate)`.
    pub fn exists(&mut self, range: Expr, var: &str, predicate: Expr) -> Expr {
        let init = self.bool(false);
        let accu = self.ident(ACCUMULATOR_VAR);
        let not_accu = self.call(operators::LOGICAL_NOT, vec![accu]);
        let condition = self.call(operators::NOT_STRICTLY_FALSE, vec![not_accu]);
        let accu = self.ident(ACCUMULATOR_VAR);
        let step = self.binary(operators::LOGICAL_OR, accu, predicate);
        let result = self.ident(ACCUMULATOR_VAR);
        self.comprehension(var, "", range, ACCUMULATOR_VAR, init, condition, step, result)
    }

    /// `range.exists_one(var, predicate)`.
    pub fn exists_one(&mut self, range: Expr, var: &str, predicate: Expr) -> Expr {
        let init = self.int(0);
        let condition = self.bool(true);
        let accu = self.ident(ACCUMULATOR_VAR);
        let one = self.int(1);
        let incremented = self.binary(operators::ADD, accu, one);
        let accu = self.ident(ACCUMULATOR_VAR);
        let step = self.call(operators::CONDITIONAL, vec![predicate, incremented, accu]);
        let accu = self.ident(ACCUMULATOR_VAR);
        let one = self.int(1);
        let result = self.binary(operators::EQUALS, accu, one);
        self.comprehension(var, "", range, ACCUMULATOR_VAR, init, condition, step, result)
    }

    /// `range.map(var, transform)`.
    pub fn map_macro(&mut self, range: Expr, var: &str, transform: Expr) -> Expr {
        let init = self.list(Vec::new());
        let condition = self.bool(true);
        let accu = self.ident(ACCUMULATOR_VAR);
        let single = self.list(vec![transform]);
        let step = self.binary(operators::ADD, accu, single);
        let result = self.ident(ACCUMULATOR_VAR);
        self.comprehension(var, "", range, ACCUMULATOR_VAR, init, condition, step, result)
    }

    /// `range.filter(var, predicate)`.
    pub fn filter(&mut self, range: Expr, var: &str, predicate: Expr) -> Expr {
        let init = self.list(Vec::new());
        let condition = self.bool(true);
        let accu = self.ident(ACCUMULATOR_VAR);
        let elem = self.ident(var);
        let single = self.list(vec![elem]);
        let appended = self.binary(operators::ADD, accu, single);
        let accu = self.ident(ACCUMULATOR_VAR);
        let step = self.call(operators::CONDITIONAL, vec![predicate, appended, accu]);
        let result = self.ident(ACCUMULATOR_VAR);
        self.comprehension(var, "", range, ACCUMULATOR_VAR, init, condition, step, result)
    }
}
