//! Core type checker implementation.
//!
//! The checker walks an expression once, resolving identifiers and function
//! overloads against a [`CheckerEnv`], and records a type and (where
//! applicable) a reference for every node. Type parameters introduced by
//! generic overloads and empty literals are bound in a single [`Mapping`];
//! every recorded type is closed over that mapping when checking finishes,
//! so parameters that stayed unbound become `dyn`.
//!
//! User mistakes are collected as diagnostics and the offending node gets an
//! error type, which is assignable to everything so one mistake does not
//! cascade. Only malformed trees abort checking.

use std::collections::HashMap;
use std::sync::Arc;

use cel_checker_common::operators;
use cel_checker_common::{
    CelType, CheckError, CheckErrorKind, Expr, ExprKind, FunctionDecl, ListElement, MapEntry,
    OverloadDecl, StructField, VariableDecl, ANY_TYPE_NAME, DURATION_TYPE_NAME,
    TIMESTAMP_TYPE_NAME,
};

use crate::container::to_qualified_name;
use crate::env::{AggregateLiteralElementType, CheckerEnv, ScopedEnv};
use crate::mapping::Mapping;
use crate::reference::ReferenceInfo;
use crate::types::{
    function_type, is_assignable, is_assignable_list, is_assignable_type, is_exact_type,
    most_general, substitute,
};

/// Overload id recorded for optional field selection.
const SELECT_OPTIONAL_FIELD: &str = "select_optional_field";

/// Result of type checking an expression.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// The checked expression with identifiers, selections, calls and
    /// message names rewritten to their fully qualified forms.
    pub expr: Expr,
    /// Map from expression ID to inferred type.
    pub type_map: HashMap<i64, CelType>,
    /// Map from expression ID to resolved reference.
    pub reference_map: HashMap<i64, ReferenceInfo>,
    /// Errors encountered during type checking.
    pub errors: Vec<CheckError>,
}

impl CheckResult {
    /// Check if type checking was successful (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the type for an expression ID.
    pub fn get_type(&self, expr_id: i64) -> Option<&CelType> {
        self.type_map.get(&expr_id)
    }

    /// Get the reference for an expression ID.
    pub fn get_reference(&self, expr_id: i64) -> Option<&ReferenceInfo> {
        self.reference_map.get(&expr_id)
    }

    /// The type of the whole expression.
    pub fn result_type(&self) -> Option<&CelType> {
        self.type_map.get(&self.expr.id)
    }
}

/// Type check an expression against an environment.
///
/// Diagnostics for user mistakes are returned in [`CheckResult::errors`].
/// An `Err` is returned only for a malformed tree, such as a comprehension
/// without an iteration variable.
///
/// # Example
/// ```
/// use cel_checker::{check, CheckerEnv};
/// use cel_checker_common::{operators, CelType, ExprFactory};
///
/// let env = CheckerEnv::with_standard_library();
/// let mut f = ExprFactory::new();
/// let (one, two) = (f.int(1), f.int(2));
/// let expr = f.binary(operators::ADD, one, two);
///
/// let result = check(&expr, &env).unwrap();
/// assert!(result.is_ok());
/// assert_eq!(result.result_type(), Some(&CelType::Int));
/// ```
#[tracing::instrument(skip_all, fields(root = expr.id))]
pub fn check(expr: &Expr, env: &CheckerEnv) -> Result<CheckResult, CheckError> {
    let result = Checker::new(env).check(expr)?;
    tracing::debug!(
        errors = result.errors.len(),
        result = ?result.result_type().map(CelType::display_name),
        "checked expression"
    );
    Ok(result)
}

/// Type checker state for a single expression.
#[derive(Debug)]
pub struct Checker<'a> {
    env: ScopedEnv<'a>,
    type_map: HashMap<i64, CelType>,
    reference_map: HashMap<i64, ReferenceInfo>,
    errors: Vec<CheckError>,
    mapping: Mapping,
    free_type_var_counter: u64,
    depth: usize,
}

impl<'a> Checker<'a> {
    /// Create a checker over the given environment.
    pub fn new(env: &'a CheckerEnv) -> Self {
        Self {
            env: ScopedEnv::new(env),
            type_map: HashMap::new(),
            reference_map: HashMap::new(),
            errors: Vec::new(),
            mapping: Mapping::new(),
            free_type_var_counter: 0,
            depth: 0,
        }
    }

    /// Check an expression, consuming the checker.
    pub fn check(mut self, expr: &Expr) -> Result<CheckResult, CheckError> {
        let checked = self.check_expr(expr)?;

        let type_map = self
            .type_map
            .iter()
            .map(|(id, cel_type)| (*id, substitute(&self.mapping, cel_type, true)))
            .collect();

        Ok(CheckResult {
            expr: checked,
            type_map,
            reference_map: self.reference_map,
            errors: self.errors,
        })
    }

    // ==================== Bookkeeping ====================

    /// Record the type of a node. A second type of a different kind is
    /// reported and the first one kept.
    fn set_type(&mut self, expr_id: i64, cel_type: CelType) {
        if let Some(existing) = self.type_map.get(&expr_id) {
            if existing.kind() != cel_type.kind() {
                let kind = CheckErrorKind::IncompatibleType {
                    existing: existing.clone(),
                    new: cel_type,
                };
                self.errors.push(CheckError::new(kind, expr_id));
                return;
            }
        }
        self.type_map.insert(expr_id, cel_type);
    }

    /// Record the reference of a node. Function references to the same
    /// function accumulate overload ids; any other difference is reported.
    fn set_reference(&mut self, expr_id: i64, reference: ReferenceInfo) {
        match self.reference_map.get_mut(&expr_id) {
            None => {
                self.reference_map.insert(expr_id, reference);
            }
            Some(existing) if *existing == reference => {}
            Some(existing)
                if existing.is_function() && reference.is_function() && existing.name == reference.name =>
            {
                for id in &reference.overload_ids {
                    existing.add_overload(id);
                }
            }
            Some(existing) => {
                let kind = CheckErrorKind::ConflictingReference {
                    existing: existing.to_string(),
                    new: reference.to_string(),
                };
                self.errors.push(CheckError::new(kind, expr_id));
            }
        }
    }

    /// Record a diagnostic and give the node an error type.
    fn report_error_type(&mut self, expr_id: i64, error: CheckError) {
        self.errors.push(error.clone());
        self.set_type(expr_id, CelType::error(error));
    }

    fn type_of(&self, expr_id: i64) -> CelType {
        self.type_map.get(&expr_id).cloned().unwrap_or(CelType::Dyn)
    }

    fn new_type_var(&mut self) -> CelType {
        let var = CelType::type_param(&format!("_var{}", self.free_type_var_counter));
        self.free_type_var_counter += 1;
        var
    }

    /// Assignability against the checker's mapping, committing bindings on success.
    fn is_assignable(&mut self, t1: &CelType, t2: &CelType) -> bool {
        match is_assignable(&self.mapping, t1, t2) {
            Some(mapping) => {
                self.mapping = mapping;
                true
            }
            None => false,
        }
    }

    fn assert_type(&mut self, expr_id: i64, expected: &CelType) {
        let actual = self.type_of(expr_id);
        if !self.is_assignable(expected, &actual) {
            self.errors
                .push(CheckError::type_mismatch(expected.clone(), actual, expr_id));
        }
    }

    // ==================== Dispatch ====================

    fn check_expr(&mut self, expr: &Expr) -> Result<Expr, CheckError> {
        let limit = self.env.env().max_recursion_depth();
        if self.depth >= limit {
            let error = CheckError::new(CheckErrorKind::RecursionLimit(limit), expr.id);
            self.report_error_type(expr.id, error);
            return Ok(cut_subtree(expr));
        }

        self.depth += 1;
        let checked = self.check_kind(expr);
        self.depth -= 1;
        checked
    }

    fn check_kind(&mut self, expr: &Expr) -> Result<Expr, CheckError> {
        match &expr.kind {
            ExprKind::Null => self.check_literal(expr, CelType::Null),
            ExprKind::Bool(_) => self.check_literal(expr, CelType::Bool),
            ExprKind::Int(_) => self.check_literal(expr, CelType::Int),
            ExprKind::UInt(_) => self.check_literal(expr, CelType::UInt),
            ExprKind::Double(_) => self.check_literal(expr, CelType::Double),
            ExprKind::String(_) => self.check_literal(expr, CelType::String),
            ExprKind::Bytes(_) => self.check_literal(expr, CelType::Bytes),
            ExprKind::Ident(name) => Ok(self.check_ident(expr, name)),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => self.check_select(expr, operand, field, *test_only),
            ExprKind::Call {
                target,
                function,
                args,
            } => self.check_call(expr, target.as_deref(), function, args),
            ExprKind::List(elements) => self.check_list(expr, elements),
            ExprKind::Map(entries) => self.check_map(expr, entries),
            ExprKind::Struct {
                message_name,
                fields,
            } => self.check_struct(expr, message_name, fields),
            ExprKind::Comprehension { .. } => self.check_comprehension(expr),
        }
    }

    fn check_literal(&mut self, expr: &Expr, cel_type: CelType) -> Result<Expr, CheckError> {
        self.set_type(expr.id, cel_type);
        Ok(expr.clone())
    }

    // ==================== Identifiers and Selection ====================

    fn check_ident(&mut self, expr: &Expr, name: &str) -> Expr {
        match self.env.lookup_ident(name) {
            Some(decl) => self.resolve_ident(expr.id, decl),
            None => {
                let error = CheckError::undeclared_reference(self.env.container().name(), name, expr.id);
                self.report_error_type(expr.id, error);
                expr.clone()
            }
        }
    }

    /// Type a node as a resolved identifier and rewrite it to the declared name.
    fn resolve_ident(&mut self, expr_id: i64, decl: VariableDecl) -> Expr {
        self.set_type(expr_id, decl.cel_type);
        self.set_reference(expr_id, ReferenceInfo::ident(&decl.name, decl.value));
        Expr::new(expr_id, ExprKind::Ident(decl.name))
    }

    fn check_select(
        &mut self,
        expr: &Expr,
        operand: &Expr,
        field: &str,
        test_only: bool,
    ) -> Result<Expr, CheckError> {
        // `a.b.c` may name a declaration outright.
        if let Some(qualified) = to_qualified_name(expr) {
            if let Some(decl) = self.env.lookup_ident(&qualified) {
                return Ok(self.resolve_ident(expr.id, decl));
            }
        }

        let (operand, field_type) = self.check_select_field(expr.id, operand, field, false)?;
        let result_type = if test_only { CelType::Bool } else { field_type };
        let result_type = substitute(&self.mapping, &result_type, false);
        self.set_type(expr.id, result_type);

        Ok(Expr::new(
            expr.id,
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.to_string(),
                test_only,
            },
        ))
    }

    /// Check the operand of a selection and compute the selected field's type.
    ///
    /// Selecting through an optional, or selecting with `.?`, yields an
    /// optional result.
    fn check_select_field(
        &mut self,
        expr_id: i64,
        operand: &Expr,
        field: &str,
        optional: bool,
    ) -> Result<(Expr, CelType), CheckError> {
        let checked = self.check_expr(operand)?;
        let operand_type = substitute(&self.mapping, &self.type_of(operand.id), false);
        let target = operand_type.unwrap_optional().clone();

        let field_type = match &target {
            CelType::Map(_, value) => (**value).clone(),
            CelType::Message(name) => self.lookup_field_type(expr_id, name, field),
            CelType::TypeParam(_) => {
                self.is_assignable(&CelType::Dyn, &target);
                CelType::Dyn
            }
            t if t.is_dyn_or_error() => CelType::Dyn,
            _ => {
                let error = CheckError::new(CheckErrorKind::FieldSelectionUnsupported(target.clone()), expr_id);
                self.errors.push(error.clone());
                CelType::error(error)
            }
        };

        let field_type = if optional || operand_type.is_optional() {
            CelType::optional(field_type)
        } else {
            field_type
        };
        Ok((checked, field_type))
    }

    /// `_?._(operand, "field")`
    fn check_optional_select(
        &mut self,
        expr: &Expr,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> Result<Expr, CheckError> {
        let (operand, field_expr, field) = match (target, args) {
            (None, [operand, field_expr]) => match &field_expr.kind {
                ExprKind::String(field) => (operand, field_expr, field),
                _ => {
                    return Err(CheckError::internal(
                        "optional field selection requires a string field name",
                        expr.id,
                    ))
                }
            },
            _ => {
                return Err(CheckError::internal(
                    "optional field selection requires an operand and a field name",
                    expr.id,
                ))
            }
        };

        let (operand, field_type) = self.check_select_field(expr.id, operand, field, true)?;
        self.set_type(field_expr.id, CelType::String);
        let result_type = substitute(&self.mapping, &field_type, false);
        self.set_type(expr.id, result_type);
        self.set_reference(
            expr.id,
            ReferenceInfo::function(operators::OPT_SELECT, vec![SELECT_OPTIONAL_FIELD.to_string()]),
        );

        Ok(Expr::new(
            expr.id,
            ExprKind::Call {
                target: None,
                function: operators::OPT_SELECT.to_string(),
                args: vec![operand, field_expr.clone()],
            },
        ))
    }

    /// Look up a field type in the registry, reporting a miss.
    fn lookup_field_type(&mut self, expr_id: i64, message: &str, field: &str) -> CelType {
        let registry = self.env.env().registry();
        let Some(message_type) = registry.find_message(message) else {
            let kind = CheckErrorKind::UnresolvedType {
                type_name: message.to_string(),
            };
            let error = CheckError::new(kind, expr_id);
            self.errors.push(error.clone());
            return CelType::error(error);
        };

        match message_type.field(field) {
            Some(field_type) => field_type.clone(),
            None => {
                let error = CheckError::undefined_field(field, expr_id);
                self.errors.push(error.clone());
                CelType::error(error)
            }
        }
    }

    // ==================== Calls ====================

    fn check_call(
        &mut self,
        expr: &Expr,
        target: Option<&Expr>,
        function: &str,
        args: &[Expr],
    ) -> Result<Expr, CheckError> {
        if function == operators::OPT_SELECT {
            return self.check_optional_select(expr, target, args);
        }

        let mut checked_args = Vec::with_capacity(args.len());
        for arg in args {
            checked_args.push(self.check_expr(arg)?);
        }

        let Some(target) = target else {
            let Some(func) = self.env.lookup_function(function) else {
                let error = CheckError::undeclared_reference(self.env.container().name(), function, expr.id);
                self.report_error_type(expr.id, error);
                return Ok(call_expr(expr.id, None, function, checked_args));
            };
            self.resolve_call(expr.id, func, None, &checked_args);
            return Ok(call_expr(expr.id, None, &func.name, checked_args));
        };

        // `ns.fn(x)` may name a namespaced function rather than a method on `ns`.
        if let Some(prefix) = to_qualified_name(target) {
            let qualified = format!("{}.{}", prefix, function);
            if let Some(func) = self.env.lookup_function(&qualified) {
                self.resolve_call(expr.id, func, None, &checked_args);
                return Ok(call_expr(expr.id, None, &func.name, checked_args));
            }
        }

        let checked_target = self.check_expr(target)?;
        let Some(func) = self.env.lookup_function(function) else {
            let error = CheckError::undeclared_reference(self.env.container().name(), function, expr.id);
            self.report_error_type(expr.id, error);
            return Ok(call_expr(expr.id, Some(checked_target), function, checked_args));
        };
        self.resolve_call(expr.id, func, Some(&checked_target), &checked_args);
        Ok(call_expr(expr.id, Some(checked_target), &func.name, checked_args))
    }

    /// Resolve the overloads of a call and record its type and reference.
    fn resolve_call(&mut self, call_id: i64, func: &FunctionDecl, target: Option<&Expr>, args: &[Expr]) {
        match self.resolve_overload(call_id, func, target, args) {
            Ok((result_type, reference)) => {
                tracing::debug!(
                    function = %func.name,
                    overloads = ?reference.overload_ids,
                    result = %result_type,
                    "resolved overload"
                );
                self.set_type(call_id, result_type);
                self.set_reference(call_id, reference);
            }
            Err(errors) => {
                tracing::debug!(function = %func.name, errors = errors.len(), "overload resolution failed");
                let result_type = errors
                    .first()
                    .cloned()
                    .map(CelType::error)
                    .unwrap_or(CelType::Dyn);
                self.errors.extend(errors);
                self.set_type(call_id, result_type);
            }
        }
    }

    /// Find every overload the arguments satisfy.
    ///
    /// Several matches with different result types make the result `dyn`.
    fn resolve_overload(
        &mut self,
        call_id: i64,
        func: &FunctionDecl,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> Result<(CelType, ReferenceInfo), Vec<CheckError>> {
        let is_member = target.is_some();
        let arg_exprs: Vec<&Expr> = target.into_iter().chain(args).collect();
        let arg_types: Vec<CelType> = arg_exprs.iter().map(|arg| self.type_of(arg.id)).collect();

        let mut result_type: Option<CelType> = None;
        let mut reference: Option<ReferenceInfo> = None;

        for overload in &func.overloads {
            if self.env.is_overload_disabled(&overload.id) || overload.is_member != is_member {
                continue;
            }
            if operators::is_logical(&func.name) {
                return self.check_logical_args(&func.name, &overload.id, &arg_exprs, &arg_types);
            }

            let (overload_result, params) = self.instantiate(overload);
            let Some(mapping) = is_assignable_list(&self.mapping, &arg_types, &params) else {
                continue;
            };
            self.mapping = mapping;

            let overload_result = substitute(&self.mapping, &overload_result, false);
            reference
                .get_or_insert_with(|| ReferenceInfo::function(&func.name, Vec::new()))
                .add_overload(&overload.id);
            result_type = Some(match result_type {
                Some(previous) if !previous.is_dyn() && !is_exact_type(&previous, &overload_result) => {
                    CelType::Dyn
                }
                Some(previous) => previous,
                None => overload_result,
            });
        }

        match (result_type, reference) {
            (Some(result_type), Some(reference)) => Ok((result_type, reference)),
            _ => {
                let closed = arg_types
                    .iter()
                    .map(|t| substitute(&self.mapping, t, true))
                    .collect();
                Err(vec![CheckError::no_matching_overload(&func.name, closed, call_id)])
            }
        }
    }

    /// `&&` and `||` accept any number of arguments, each of which must be
    /// bool. The call is typed bool even when an argument is not.
    fn check_logical_args(
        &mut self,
        function: &str,
        overload_id: &str,
        arg_exprs: &[&Expr],
        arg_types: &[CelType],
    ) -> Result<(CelType, ReferenceInfo), Vec<CheckError>> {
        for (arg, arg_type) in arg_exprs.iter().zip(arg_types) {
            if !self.is_assignable(arg_type, &CelType::Bool) {
                self.errors
                    .push(CheckError::type_mismatch(CelType::Bool, arg_type.clone(), arg.id));
            }
        }
        Ok((
            CelType::Bool,
            ReferenceInfo::function(function, vec![overload_id.to_string()]),
        ))
    }

    /// Replace an overload's type parameters with fresh type variables.
    fn instantiate(&mut self, overload: &OverloadDecl) -> (CelType, Vec<CelType>) {
        let type_params = overload.type_param_names();
        if type_params.is_empty() {
            return (overload.result.clone(), overload.params.clone());
        }

        let mut fresh = Mapping::new();
        for name in type_params {
            let var = self.new_type_var();
            fresh.add(Arc::from(name.as_str()), var);
        }
        match substitute(&fresh, &function_type(overload.result.clone(), &overload.params), false) {
            CelType::Function { result, params } => ((*result).clone(), params.to_vec()),
            _ => (overload.result.clone(), overload.params.clone()),
        }
    }

    // ==================== Aggregates ====================

    fn check_list(&mut self, expr: &Expr, elements: &[ListElement]) -> Result<Expr, CheckError> {
        let mut elem_type = None;
        let mut checked = Vec::with_capacity(elements.len());

        for element in elements {
            let checked_elem = self.check_expr(&element.expr)?;
            let mut cel_type = self.type_of(element.expr.id);
            if element.optional {
                cel_type = self.check_optional_entry(element.expr.id, &cel_type);
            }
            elem_type = Some(self.join_types(element.expr.id, elem_type, cel_type));
            checked.push(ListElement {
                expr: checked_elem,
                optional: element.optional,
            });
        }

        let elem_type = match elem_type {
            Some(t) => t,
            None => self.new_type_var(),
        };
        self.set_type(expr.id, CelType::list(elem_type));
        Ok(Expr::new(expr.id, ExprKind::List(checked)))
    }

    fn check_map(&mut self, expr: &Expr, entries: &[MapEntry]) -> Result<Expr, CheckError> {
        let mut key_type = None;
        let mut value_type = None;
        let mut checked = Vec::with_capacity(entries.len());

        for entry in entries {
            let key = self.check_expr(&entry.key)?;
            let cel_type = self.type_of(entry.key.id);
            key_type = Some(self.join_types(entry.key.id, key_type, cel_type));

            let value = self.check_expr(&entry.value)?;
            let mut cel_type = self.type_of(entry.value.id);
            if entry.optional {
                cel_type = self.check_optional_entry(entry.value.id, &cel_type);
            }
            value_type = Some(self.join_types(entry.value.id, value_type, cel_type));

            checked.push(MapEntry {
                id: entry.id,
                key,
                value,
                optional: entry.optional,
            });
        }

        let key_type = match key_type {
            Some(t) => t,
            None => self.new_type_var(),
        };
        let value_type = match value_type {
            Some(t) => t,
            None => self.new_type_var(),
        };
        self.set_type(expr.id, CelType::map(key_type, value_type));
        Ok(Expr::new(expr.id, ExprKind::Map(checked)))
    }

    /// An optional entry (`[?x]`, `{?k: x}`) must hold an optional value.
    /// Returns the unwrapped value type.
    fn check_optional_entry(&mut self, expr_id: i64, cel_type: &CelType) -> CelType {
        let unwrapped = cel_type.unwrap_optional().clone();
        if !cel_type.is_optional() && !cel_type.is_dyn_or_error() {
            self.errors.push(CheckError::type_mismatch(
                CelType::optional(unwrapped.clone()),
                unwrapped.clone(),
                expr_id,
            ));
        }
        unwrapped
    }

    /// Join the element type seen so far with the next element's type.
    fn join_types(&mut self, expr_id: i64, previous: Option<CelType>, current: CelType) -> CelType {
        let Some(previous) = previous else {
            return current;
        };
        if self.is_assignable(&previous, &current) {
            return most_general(&previous, &current);
        }
        match self.env.env().aggregate_literal_element_type() {
            AggregateLiteralElementType::DynElementType => CelType::Dyn,
            AggregateLiteralElementType::HomogeneousElementType => {
                let error = CheckError::type_mismatch(previous, current, expr_id);
                self.errors.push(error.clone());
                CelType::error(error)
            }
        }
    }

    fn check_struct(
        &mut self,
        expr: &Expr,
        message_name: &str,
        fields: &[StructField],
    ) -> Result<Expr, CheckError> {
        let Some(decl) = self.env.lookup_ident(message_name) else {
            let error = CheckError::undeclared_reference(self.env.container().name(), message_name, expr.id);
            self.report_error_type(expr.id, error);
            let mut checked = Vec::with_capacity(fields.len());
            for field in fields {
                let value = self.check_expr(&field.value)?;
                checked.push(StructField {
                    id: field.id,
                    name: field.name.clone(),
                    value,
                    optional: field.optional,
                });
            }
            return Ok(Expr::new(
                expr.id,
                ExprKind::Struct {
                    message_name: message_name.to_string(),
                    fields: checked,
                },
            ));
        };

        self.set_reference(expr.id, ReferenceInfo::ident(&decl.name, None));
        let mut type_name = decl.name.clone();
        let message_type = match &decl.cel_type {
            CelType::Error(_) => decl.cel_type.clone(),
            CelType::Type(inner) => {
                if let Some(name) = well_known_type_name(inner) {
                    type_name = name;
                    (**inner).clone()
                } else if let CelType::Message(name) = inner.as_ref() {
                    type_name = name.to_string();
                    (**inner).clone()
                } else {
                    let error = CheckError::new(CheckErrorKind::NotAMessageType((**inner).clone()), expr.id);
                    self.errors.push(error.clone());
                    CelType::error(error)
                }
            }
            other => {
                let error = CheckError::new(CheckErrorKind::NotAType(other.clone()), expr.id);
                self.errors.push(error.clone());
                CelType::error(error)
            }
        };
        self.set_type(expr.id, message_type.clone());

        let mut checked = Vec::with_capacity(fields.len());
        for field in fields {
            let value = self.check_expr(&field.value)?;
            let field_type = if message_type.is_error() {
                message_type.clone()
            } else {
                self.lookup_field_type(field.id, &type_name, &field.name)
            };

            let mut value_type = self.type_of(field.value.id);
            if field.optional {
                value_type = self.check_optional_entry(field.value.id, &value_type);
            }
            if !self.is_assignable(&field_type, &value_type) {
                self.errors
                    .push(CheckError::type_mismatch(field_type, value_type, field.id));
            }

            checked.push(StructField {
                id: field.id,
                name: field.name.clone(),
                value,
                optional: field.optional,
            });
        }

        Ok(Expr::new(
            expr.id,
            ExprKind::Struct {
                message_name: type_name,
                fields: checked,
            },
        ))
    }

    // ==================== Comprehensions ====================

    fn check_comprehension(&mut self, expr: &Expr) -> Result<Expr, CheckError> {
        let ExprKind::Comprehension {
            iter_var,
            iter_var2,
            iter_range,
            accu_var,
            accu_init,
            loop_condition,
            loop_step,
            result,
        } = &expr.kind
        else {
            return Err(CheckError::internal("expected a comprehension", expr.id));
        };
        if iter_var.is_empty() {
            return Err(CheckError::internal("comprehension without an iteration variable", expr.id));
        }
        if accu_var.is_empty() {
            return Err(CheckError::internal("comprehension without an accumulator variable", expr.id));
        }

        let checked_range = self.check_expr(iter_range)?;
        let checked_init = self.check_expr(accu_init)?;
        let accu_type = self.type_of(accu_init.id);
        let range_type = substitute(&self.mapping, &self.type_of(iter_range.id), false);
        let two_vars = !iter_var2.is_empty();

        let (var_type, var2_type) = match &range_type {
            CelType::List(elem) if two_vars => (CelType::Int, (**elem).clone()),
            CelType::List(elem) => ((**elem).clone(), CelType::Dyn),
            CelType::Map(key, value) => ((**key).clone(), (**value).clone()),
            CelType::Dyn | CelType::Error(_) | CelType::TypeParam(_) => {
                self.is_assignable(&CelType::Dyn, &range_type);
                (CelType::Dyn, CelType::Dyn)
            }
            _ => {
                let kind = CheckErrorKind::InvalidComprehensionRange(range_type.clone());
                let error = CheckError::new(kind, iter_range.id);
                self.errors.push(error.clone());
                (CelType::error(error.clone()), CelType::error(error))
            }
        };

        // The accumulator scope encloses the iteration scope so that the
        // result sees the accumulator but not the iteration variables.
        self.env.enter_scope();
        self.env.add_idents([VariableDecl::new(accu_var, accu_type.clone())]);

        self.env.enter_scope();
        let mut loop_vars = vec![VariableDecl::new(iter_var, var_type)];
        if two_vars {
            loop_vars.push(VariableDecl::new(iter_var2, var2_type));
        }
        self.env.add_idents(loop_vars);

        let checked_condition = self.check_expr(loop_condition)?;
        self.assert_type(loop_condition.id, &CelType::Bool);
        let checked_step = self.check_expr(loop_step)?;
        self.assert_type(loop_step.id, &accu_type);
        self.env.exit_scope();

        let checked_result = self.check_expr(result)?;
        self.env.exit_scope();

        let result_type = substitute(&self.mapping, &self.type_of(result.id), false);
        self.set_type(expr.id, result_type);

        Ok(Expr::new(
            expr.id,
            ExprKind::Comprehension {
                iter_var: iter_var.clone(),
                iter_var2: iter_var2.clone(),
                iter_range: Box::new(checked_range),
                accu_var: accu_var.clone(),
                accu_init: Box::new(checked_init),
                loop_condition: Box::new(checked_condition),
                loop_step: Box::new(checked_step),
                result: Box::new(checked_result),
            },
        ))
    }
}

fn call_expr(id: i64, target: Option<Expr>, function: &str, args: Vec<Expr>) -> Expr {
    Expr::new(
        id,
        ExprKind::Call {
            target: target.map(Box::new),
            function: function.to_string(),
            args,
        },
    )
}

/// Stand-in for a subtree left unchecked by the recursion budget. It keeps
/// the node id; leaves are kept whole and compound nodes lose their children.
fn cut_subtree(expr: &Expr) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Null
        | ExprKind::Bool(_)
        | ExprKind::Int(_)
        | ExprKind::UInt(_)
        | ExprKind::Double(_)
        | ExprKind::String(_)
        | ExprKind::Bytes(_)
        | ExprKind::Ident(_) => expr.kind.clone(),
        ExprKind::Call { function, .. } => ExprKind::Call {
            target: None,
            function: function.clone(),
            args: Vec::new(),
        },
        ExprKind::List(_) => ExprKind::List(Vec::new()),
        ExprKind::Map(_) => ExprKind::Map(Vec::new()),
        ExprKind::Struct { message_name, .. } => ExprKind::Struct {
            message_name: message_name.clone(),
            fields: Vec::new(),
        },
        ExprKind::Select { .. } | ExprKind::Comprehension { .. } => ExprKind::Null,
    };
    Expr::new(expr.id, kind)
}

/// The message name a well-known type is constructed with, e.g.
/// `google.protobuf.Int64Value{value: 1}`.
fn well_known_type_name(cel_type: &CelType) -> Option<String> {
    let name = match cel_type {
        CelType::Wrapper(inner) if is_assignable_type(cel_type, &CelType::Null) => match inner.as_ref() {
            CelType::Bool => "google.protobuf.BoolValue",
            CelType::Bytes => "google.protobuf.BytesValue",
            CelType::Double => "google.protobuf.DoubleValue",
            CelType::Int => "google.protobuf.Int64Value",
            CelType::String => "google.protobuf.StringValue",
            CelType::UInt => "google.protobuf.UInt64Value",
            _ => return None,
        },
        CelType::Dyn => "google.protobuf.Value",
        CelType::Null => "google.protobuf.NullValue",
        CelType::List(elem) if elem.is_dyn() => "google.protobuf.ListValue",
        CelType::Map(key, value) if matches!(key.as_ref(), CelType::String) && value.is_dyn() => {
            "google.protobuf.Struct"
        }
        CelType::Message(name)
            if [ANY_TYPE_NAME, TIMESTAMP_TYPE_NAME, DURATION_TYPE_NAME].contains(&name.as_ref()) =>
        {
            return Some(name.to_string());
        }
        _ => return None,
    };
    Some(name.to_string())
}
