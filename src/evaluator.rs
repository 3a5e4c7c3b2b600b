//! The `Evaluator`: the single struct every external entry point (spec §6) hangs off, grounded in
//! the teacher's pattern of threading one `db: &dyn Db` handle through every query — this core's
//! equivalent is `Evaluator` itself plus the `ImportLookup`/`Ast` collaborator traits, since the
//! real Salsa `Db` machinery was not carried over (see DESIGN.md).

use crate::ast::{
    BinOp, BoolOp, ClassDefStmt, CmpOp, Constant, Expr, ExprContext, FunctionDefStmt, NodeId, Ranged, Stmt, UnaryOp,
};
use crate::builtins::Builtins;
use crate::cache::{self, ReturnTypeInferenceStack, SymbolResolutionStack, TypeCacheState};
use crate::cancellation::{CancellationToken, Cancelled};
use crate::diagnostic::{rules, DiagnosticSink};
use crate::module::ImportLookup;
use crate::name::Name;
use crate::scope::{FlowGraph, FlowNodeId, ReferenceBinding, Scope, ScopeId};
use crate::symbol::{Symbol, SymbolFlags, SymbolId, SymbolTable};
use crate::types::call::arguments::{Argument, CallArguments};
use crate::types::call::{self, CallOutcome};
use crate::types::class::{ClassDetails, ClassFlags, ClassRef};
use crate::types::function::{FunctionDetails, FunctionFlags, FunctionType, Parameter as TypeParameter};
use crate::types::narrow::{FlowTypeProvider, NarrowingCallback};
use crate::types::{union_of, LiteralValue, Type};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Bidirectional-inference context bits threaded through `get_type_of_expression` (spec §4.1's
/// `Flags` bit set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// A stub-file `...` default-value placeholder (or stub annotation) should be read as `Any`.
    pub convert_ellipsis_to_any: bool,
    /// Don't fill a bare class reference's type arguments with `Unknown` (used while evaluating a
    /// class's own base-class list, where the class isn't specialized yet).
    pub do_not_specialize: bool,
    /// This expression is a literal context (an annotation's own surface, an `Enum`/`Literal[]`
    /// argument): preserve literal types rather than widening them.
    pub preserve_literal: bool,
}

/// Tunable limits and print behavior (spec §1a's ADDED `EvaluatorOptions`).
#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    pub return_type_inference_depth_limit: u32,
    pub print_flags: crate::types::display::PrintFlags,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            return_type_inference_depth_limit: 3,
            print_flags: crate::types::display::PrintFlags::PEP604,
        }
    }
}

/// The central struct. Owns every piece of mutable evaluation state (spec §4.8's "all components
/// share one type cache, one speculative tracker, and one incomplete-type tracker"); the
/// `ImportLookup` handle is supplied by the embedding driver and lives at least as long as `'a`.
pub struct Evaluator<'a> {
    import_lookup: &'a dyn ImportLookup,
    pub diagnostics: DiagnosticSink,
    cache: RefCell<TypeCacheState>,
    symbol_stack: RefCell<SymbolResolutionStack>,
    return_stack: RefCell<ReturnTypeInferenceStack>,
    cancellation: CancellationToken,
    pub builtins: Builtins,
    options: EvaluatorOptions,
    /// Scopes attached by the driver as it walks the binder's output (spec §4.9). Keyed by
    /// `ScopeId` rather than carried on `Expr`, since the AST itself is binder-independent.
    scopes: RefCell<FxHashMap<ScopeId, Scope>>,
    /// Which scope (and, for narrowing subjects, which flow position) a `Name` load resolves
    /// from, keyed by the `Name` expression's own `NodeId`.
    references: RefCell<FxHashMap<NodeId, ReferenceBinding>>,
    /// The test expression (`if`/`while`'s condition, or a `BoolOp` operand) a `TrueCondition`/
    /// `FalseCondition` flow node's `test_node` points at, so `narrowing_callback_for` can rebuild
    /// the narrowing callback from its AST shape (spec §4.6).
    test_expressions: RefCell<FxHashMap<NodeId, Expr>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(import_lookup: &'a dyn ImportLookup, options: EvaluatorOptions) -> Self {
        Self {
            import_lookup,
            diagnostics: DiagnosticSink::new(),
            cache: RefCell::new(TypeCacheState::new()),
            symbol_stack: RefCell::new(SymbolResolutionStack::new()),
            return_stack: RefCell::new(ReturnTypeInferenceStack::new(options.return_type_inference_depth_limit)),
            cancellation: CancellationToken::new(),
            builtins: Builtins::bootstrap(),
            options,
            scopes: RefCell::new(FxHashMap::default()),
            references: RefCell::new(FxHashMap::default()),
            test_expressions: RefCell::new(FxHashMap::default()),
        }
    }

    /// Attaches `scope` under `id` (spec §4.9). A driver calls this for every scope it builds
    /// before evaluating any expression whose `Name` loads resolve through it.
    pub fn attach_scope(&self, id: ScopeId, scope: Scope) {
        self.scopes.borrow_mut().insert(id, scope);
    }

    /// Attaches the scope (and, for a narrowing subject, flow position) that `name_node` resolves
    /// a `Name` load from (spec §4.9).
    pub fn attach_reference(&self, name_node: NodeId, binding: ReferenceBinding) {
        self.references.borrow_mut().insert(name_node, binding);
    }

    /// Attaches the test expression a `TrueCondition`/`FalseCondition` flow node's `test_node`
    /// refers to (spec §4.6), so narrowing can be rebuilt from its AST shape.
    pub fn attach_test_expression(&self, test_node: NodeId, expr: Expr) {
        self.test_expressions.borrow_mut().insert(test_node, expr);
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn type_cache_size(&self) -> usize {
        self.cache.borrow().len()
    }

    fn check_cancellation(&self) -> Result<(), Cancelled> {
        self.cancellation.check()
    }

    fn cached(&self, node: NodeId) -> Option<Type> {
        self.cache.borrow().get(node).cloned()
    }

    fn store(&self, node: NodeId, ty: Type) {
        self.cache.borrow_mut().insert(node, ty);
    }

    // ----------------------------------------------------------------------------------------
    // §6 entry points
    // ----------------------------------------------------------------------------------------

    /// `getType(node)` (spec §6): the type of any expression node, uncached-expected, no flags.
    pub fn get_type(&self, expr: &Expr) -> Result<Type, Cancelled> {
        self.get_type_of_expression(expr, None, Flags::default())
    }

    /// `getTypeOfClass(node)` (spec §6 / §4.2's class build sequence).
    pub fn get_type_of_class(&self, stmt: &ClassDefStmt) -> Result<Type, Cancelled> {
        self.check_cancellation()?;
        let _span = tracing::trace_span!("get_type_of_class", name = %stmt.name).entered();
        if let Some(cached) = self.cached(stmt.id) {
            return Ok(cached);
        }

        let mut bases = Vec::with_capacity(stmt.bases.len());
        for base_expr in &stmt.bases {
            let flags = Flags { do_not_specialize: true, ..Flags::default() };
            let base_ty = self.get_type_of_expression(base_expr, None, flags)?;
            if !base_ty.is_class() && !base_ty.is_any_or_unknown() {
                self.diagnostics.error(
                    rules::INVALID_BASE,
                    base_expr.range(),
                    format!(
                        "{} is not a valid base class",
                        crate::types::display::print_type(&base_ty, self.options.print_flags)
                    ),
                );
            }
            bases.push(base_ty);
        }
        if bases.is_empty() {
            bases.push(self.builtins.object_instance().to_class_object().unwrap_or(Type::Unknown));
        }

        let mut flags = ClassFlags::empty();
        let mut dataclass_frozen = false;
        for decorator in &stmt.decorators {
            let name = decorator_name(&decorator.expression);
            match name.as_deref() {
                Some("dataclass") => flags |= ClassFlags::DATACLASS,
                Some("final") => flags |= ClassFlags::FINAL,
                Some(other) => {
                    self.diagnostics.warning(
                        rules::UNKNOWN_DECORATOR,
                        decorator.expression.range(),
                        format!("class decorator {other} is not recognized; its effect on the class's type is not modeled"),
                    );
                }
                None => {}
            }
            if let Expr::Call { func, keywords, .. } = &decorator.expression {
                if decorator_name(func).as_deref() == Some("dataclass") {
                    for (kw, value) in keywords {
                        if kw.as_deref().map(|n| n.as_str()) == Some("frozen") && is_truthy_constant(value) {
                            dataclass_frozen = true;
                        }
                    }
                }
            }
        }
        if dataclass_frozen {
            flags |= ClassFlags::DATACLASS_FROZEN;
        }
        if bases.iter().any(|b| base_names_class(b, "Protocol")) {
            flags |= ClassFlags::PROTOCOL;
        }
        if bases.iter().any(|b| base_names_class(b, "TypedDict")) {
            flags |= ClassFlags::TYPED_DICT;
        }
        if bases.iter().any(|b| base_names_class(b, "NamedTuple")) {
            flags |= ClassFlags::NAMED_TUPLE;
        }
        if bases.iter().any(|b| base_names_class(b, "Enum")) {
            flags |= ClassFlags::ENUM_CLASS;
        }

        let mut table = SymbolTable::new();
        let mut collected_fields = Vec::new();
        for member in &stmt.body {
            self.collect_class_member(member, &mut table, &mut collected_fields)?;
        }

        let details = ClassDetails::new(stmt.name.clone(), stmt.id, bases, flags, table);

        if flags.contains(ClassFlags::DATACLASS) {
            crate::types::synthesis::synthesize_dataclass(&details, collected_fields.clone());
        }
        if flags.contains(ClassFlags::NAMED_TUPLE) {
            crate::types::synthesis::synthesize_named_tuple(&details, collected_fields.clone());
        }
        if flags.contains(ClassFlags::TYPED_DICT) {
            crate::types::synthesis::finalize_typed_dict(&details, &[], true);
        }

        // MRO is computed once, eagerly, right after bases are known (invariant 2): a failure here
        // is reported but does not stop the class from existing with a degraded `[self, Unknown]`
        // linearization (spec §9).
        if let Err(err) = details.mro() {
            self.diagnostics.error(rules::INCONSISTENT_MRO, stmt.range, format!("{err:?}"));
        }

        let ty = Type::Class(ClassRef::unspecialized(details), None);
        self.store(stmt.id, ty.clone());
        Ok(ty)
    }

    fn collect_class_member(
        &self,
        stmt: &Stmt,
        table: &mut SymbolTable,
        fields: &mut Vec<crate::types::synthesis::DataclassField>,
    ) -> Result<(), Cancelled> {
        match stmt {
            Stmt::AnnAssign { target, annotation, value } => {
                if let Some((name, _)) = target.as_name() {
                    let ty = self.get_type_of_expression(annotation, None, Flags::default())?;
                    let mut sym = Symbol::new(name.clone());
                    sym.flags |= SymbolFlags::CLASS_MEMBER | SymbolFlags::INSTANCE_MEMBER;
                    sym.synthesized_type = Some(ty.clone());
                    table.insert(sym);
                    fields.push(crate::types::synthesis::DataclassField {
                        name: name.clone(),
                        annotation: ty,
                        has_default: value.is_some(),
                        include_in_init: true,
                    });
                }
                Ok(())
            }
            Stmt::FunctionDef(func) => {
                let ty = self.get_type_of_function(func)?;
                let mut sym = Symbol::new(func.name.clone());
                sym.flags |= SymbolFlags::CLASS_MEMBER;
                sym.synthesized_type = Some(ty);
                table.insert(sym);
                Ok(())
            }
            Stmt::ClassDef(class) => {
                let ty = self.get_type_of_class(class)?;
                let mut sym = Symbol::new(class.name.clone());
                sym.flags |= SymbolFlags::CLASS_MEMBER;
                sym.synthesized_type = Some(ty);
                table.insert(sym);
                Ok(())
            }
            Stmt::Pass => Ok(()),
            _ => Ok(()),
        }
    }

    /// `getTypeOfFunction(node)` (spec §6 / §4.2's function build sequence).
    pub fn get_type_of_function(&self, stmt: &FunctionDefStmt) -> Result<Type, Cancelled> {
        self.check_cancellation()?;
        let _span = tracing::trace_span!("get_type_of_function", name = %stmt.name).entered();
        if let Some(cached) = self.cached(stmt.id) {
            return Ok(cached);
        }

        let mut flags = FunctionFlags::empty();
        if stmt.is_async {
            flags |= FunctionFlags::IS_ASYNC;
        }
        if stmt.is_generator {
            flags |= FunctionFlags::IS_GENERATOR;
        }
        let mut is_abstract_method = false;
        for decorator in &stmt.decorators {
            match decorator_name(&decorator.expression).as_deref() {
                Some("staticmethod") => flags |= FunctionFlags::IS_STATIC_METHOD,
                Some("classmethod") => flags |= FunctionFlags::IS_CLASS_METHOD,
                Some("final") => flags |= FunctionFlags::IS_FINAL,
                Some("overload") => flags |= FunctionFlags::IS_OVERLOAD,
                Some("property") => flags |= FunctionFlags::IS_PROPERTY,
                Some("abstractmethod") => is_abstract_method = true,
                Some(other) => {
                    self.diagnostics.warning(
                        rules::UNKNOWN_DECORATOR,
                        decorator.expression.range(),
                        format!("decorator {other} is not recognized; its effect on the function's type is not modeled"),
                    );
                }
                None => {}
            }
        }

        let mut parameters = Vec::with_capacity(stmt.parameters.len());
        for param in &stmt.parameters {
            let annotation = match &param.annotation {
                Some(expr) => self.get_type_of_expression(expr, None, Flags::default())?,
                None => Type::Unknown,
            };
            parameters.push(TypeParameter {
                name: param.name.clone(),
                annotation,
                has_default: param.default.is_some(),
                kind: param.kind,
                param_spec: None,
            });
        }

        let declared_return = match &stmt.returns {
            Some(expr) => Some(self.get_type_of_expression(expr, None, Flags::default())?),
            None => None,
        };
        if declared_return.is_none() {
            flags |= FunctionFlags::IMPLICIT_STUB_RETURN;
        }

        let details = Rc::new(FunctionDetails {
            name: stmt.name.clone(),
            declaration: stmt.id,
            doc: stmt.doc.as_deref().map(Into::into),
            parameters,
            declared_return,
            flags,
            built_in_name: None,
            is_abstract_method,
        });
        let ty = Type::Function(FunctionType::new(details));
        self.store(stmt.id, ty.clone());
        Ok(ty)
    }

    /// `evaluateTypesForStatement(node)` (spec §6): drives inference for a statement's own
    /// sub-expressions without returning a value of its own (side effect is populating the cache).
    pub fn evaluate_types_for_statement(&self, stmt: &Stmt) -> Result<(), Cancelled> {
        self.check_cancellation()?;
        match stmt {
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => {
                self.get_type_of_expression(expr, None, Flags::default())?;
            }
            Stmt::Return(None) | Stmt::Delete(_) => {}
            Stmt::Assign { targets, value } => {
                let value_ty = self.get_type_of_expression(value, None, Flags::default())?;
                if is_partially_unknown(&value_ty) {
                    self.diagnostics.warning(
                        rules::PARTIALLY_UNKNOWN_TYPE,
                        value.range(),
                        format!(
                            "assigned value has partially unknown type {}",
                            crate::types::display::print_type(&value_ty, self.options.print_flags)
                        ),
                    );
                }
                for target in targets {
                    self.store(target.id(), value_ty.clone());
                }
            }
            Stmt::AnnAssign { annotation, value, target } => {
                let declared = self.get_type_of_expression(annotation, None, Flags::default())?;
                if is_partially_unknown(&declared) {
                    self.diagnostics.warning(
                        rules::PARTIALLY_UNKNOWN_TYPE,
                        annotation.range(),
                        format!(
                            "declared type {} is partially unknown",
                            crate::types::display::print_type(&declared, self.options.print_flags)
                        ),
                    );
                }
                if let Some(value) = value {
                    self.get_type_of_expression(value, Some(&declared), Flags::default())?;
                }
                self.store(target.id(), declared);
            }
            Stmt::AugAssign { target, value, .. } => {
                self.get_type_of_expression(target, None, Flags::default())?;
                self.get_type_of_expression(value, None, Flags::default())?;
            }
            Stmt::If { test, .. } | Stmt::While { test, .. } => {
                self.get_type_of_expression(test, None, Flags::default())?;
            }
            Stmt::FunctionDef(func) => {
                self.get_type_of_function(func)?;
            }
            Stmt::ClassDef(class) => {
                self.get_type_of_class(class)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// `getDeclarationsForNameNode(node)` (spec §6): every declaration backing a name, resolved
    /// through §4.9's alias-following with visited-set loop breaking.
    pub fn get_declarations_for_name_node<'s>(&self, symbol: &'s Symbol) -> Vec<&'s crate::symbol::Declaration> {
        symbol.declarations.iter().collect()
    }

    /// `getCallSignatureInfo(node, offset)` (spec §6): the callable's signature(s) at a call-site,
    /// for signature-help. `offset` selects which overload is "active" only when the callee is
    /// overloaded and every candidate's shape has already been probed elsewhere; here we just
    /// surface every candidate shape (the command-protocol layer picks which one is highlighted).
    pub fn get_call_signature_info(&self, callee_ty: &Type) -> Vec<FunctionType> {
        match callee_ty {
            Type::Function(f) => vec![f.clone()],
            Type::OverloadedFunction(overloads) => overloads.to_vec(),
            Type::Class(class, _) => match class.member("__init__") {
                Some(Type::Function(f)) => vec![f],
                _ => vec![],
            },
            _ => vec![],
        }
    }

    /// `canAssignType(dst, src)` (spec §6, §4.4).
    pub fn can_assign_type(&self, dst: &Type, src: &Type) -> bool {
        crate::types::assignability::can_assign(dst, src, &self.diagnostics, None, crate::types::assignability::AssignFlags::empty())
    }

    /// `canOverrideMethod(base, over)` (spec §6): an override is compatible when its shape is
    /// assignable *to* the base method (contravariant parameters, covariant return, same rule
    /// `function_shape_assignable` already implements) and neither side is `Final`-sealed.
    pub fn can_override_method(&self, base: &FunctionType, over: &FunctionType, base_class_final: bool) -> bool {
        if base_class_final {
            self.diagnostics.error(
                rules::INVALID_OVERRIDE,
                Default::default(),
                format!("cannot override method of final class"),
            );
            return false;
        }
        if base.details.flags.contains(FunctionFlags::IS_FINAL) {
            self.diagnostics.error(
                rules::INVALID_OVERRIDE,
                Default::default(),
                format!("{} is marked @final and cannot be overridden", base.details.name),
            );
            return false;
        }
        let ok = crate::types::assignability::function_shape_assignable(base, over, &self.diagnostics);
        if !ok {
            self.diagnostics.error(
                rules::INVALID_OVERRIDE,
                Default::default(),
                format!("{} is not a compatible override", over.details.name),
            );
        }
        ok
    }

    // ----------------------------------------------------------------------------------------
    // §4.1 expression evaluator
    // ----------------------------------------------------------------------------------------

    /// `get_type_of_expression(N, expected, flags)` (spec §4.1): the dispatch table over every
    /// expression node kind.
    pub fn get_type_of_expression(&self, expr: &Expr, expected: Option<&Type>, flags: Flags) -> Result<Type, Cancelled> {
        self.check_cancellation()?;
        if let Some(cached) = self.cached(expr.id()) {
            if expected.is_none() {
                return Ok(cached);
            }
        }

        let _span = tracing::trace_span!("infer_expression", kind = expr_kind_name(expr)).entered();
        let ty = match expr {
            Expr::Constant { value, .. } => self.infer_constant_expression(value),
            Expr::Number { is_int, is_complex, .. } => self.infer_number_expression(*is_int, *is_complex),
            Expr::StringList { is_bytes, value, .. } => self.infer_string_expression(*is_bytes, value, flags),
            Expr::Ellipsis { .. } => {
                if flags.convert_ellipsis_to_any {
                    Type::any()
                } else {
                    Type::ellipsis_any()
                }
            }
            Expr::Name { name, ctx, .. } => self.infer_name_expression(expr.id(), name, *ctx)?,
            Expr::MemberAccess { value, attr, .. } => self.infer_member_access_expression(value, attr, flags)?,
            Expr::Index { value, index, .. } => self.infer_index_expression(value, index, flags)?,
            Expr::Call { func, args, keywords, .. } => self.infer_call_expression(func, args, keywords, expected)?,
            Expr::Tuple { elements, .. } | Expr::List { elements, .. } | Expr::SetExpr { elements, .. } => {
                self.infer_sequence_expression(expr, elements, expected, flags)?
            }
            Expr::Dict { keys, values, .. } => self.infer_dict_expression(keys, values, expected, flags)?,
            Expr::UnaryOp { op, operand, .. } => self.infer_unary_op_expression(*op, operand, flags)?,
            Expr::BinOp { op, left, right, .. } => self.infer_bin_op_expression(*op, left, right, flags)?,
            Expr::BoolOp { values, .. } => self.infer_bool_op_expression(values, flags)?,
            Expr::Compare { left, ops, comparators, .. } => self.infer_compare_expression(left, ops, comparators, flags)?,
            Expr::Ternary { test, body, or_else, .. } => self.infer_ternary_expression(test, body, or_else, expected, flags)?,
            Expr::Lambda { parameters, body, .. } => self.infer_lambda_expression(expr.id(), parameters, body)?,
            Expr::Assignment { value, .. } | Expr::AssignmentExpression { value, .. } => {
                self.get_type_of_expression(value, expected, flags)?
            }
            Expr::Await { value, .. } | Expr::Unpack { value, .. } | Expr::YieldFrom { value, .. } => {
                self.get_type_of_expression(value, expected, flags)?
            }
            Expr::Yield { value, .. } => match value {
                Some(v) => self.get_type_of_expression(v, expected, flags)?,
                None => Type::None,
            },
            Expr::ListComprehension { element, target, iter, .. } => {
                self.get_type_of_expression(iter, None, flags)?;
                self.store(target.id(), Type::Unknown);
                self.get_type_of_expression(element, None, flags)?;
                self.builtins.by_name("list").map(|c| Type::Object(ClassRef::unspecialized(c.clone()), None)).unwrap_or(Type::Unknown)
            }
            Expr::Slice { .. } => Type::Unknown,
            Expr::TypeAnnotation { annotation, .. } => self.get_type_of_expression(annotation, None, flags)?,
            Expr::Error { .. } => Type::Unknown,
        };

        // Bidirectional inference (spec §4.1): when the expected type is assignable from what we
        // actually inferred, report the (narrower, more specific) expected type rather than the
        // bare join of the expression's own parts — this is what lets `x: list[int] = []` type the
        // literal as `list[int]` instead of `list[Unknown]`.
        let final_ty = match expected {
            Some(expected_ty) if !flags.preserve_literal && self.can_assign_type(expected_ty, &ty) => expected_ty.clone(),
            _ if !flags.preserve_literal => ty.widen_literal(),
            _ => ty,
        };
        self.store(expr.id(), final_ty.clone());
        Ok(final_ty)
    }

    fn infer_constant_expression(&self, value: &Constant) -> Type {
        match value {
            Constant::None => Type::None,
            Constant::Bool(b) => self.builtins.bool_instance(*b),
            Constant::Ellipsis => Type::ellipsis_any(),
        }
    }

    fn infer_number_expression(&self, is_int: bool, is_complex: bool) -> Type {
        if is_complex {
            self.builtins.by_name("complex").map(|c| Type::Object(ClassRef::unspecialized(c.clone()), None)).unwrap_or(Type::Unknown)
        } else if is_int {
            self.builtins.int_instance(None)
        } else {
            self.builtins.by_name("float").map(|c| Type::Object(ClassRef::unspecialized(c.clone()), None)).unwrap_or(Type::Unknown)
        }
    }

    fn infer_string_expression(&self, is_bytes: bool, value: &str, flags: Flags) -> Type {
        if is_bytes {
            self.builtins.by_name("bytes").map(|c| Type::Object(ClassRef::unspecialized(c.clone()), None)).unwrap_or(Type::Unknown)
        } else if flags.preserve_literal {
            self.builtins.str_instance(Some(value))
        } else {
            self.builtins.str_instance(None)
        }
    }

    /// `Name` load resolution (spec §4.1, §4.9): looks up which scope `node` was attached to,
    /// walks that scope's chain for the symbol, resolves its effective type (cycle-safe via
    /// [`Evaluator::get_effective_type_of_symbol`]), and narrows it along the attached flow
    /// position when the binder marked this node a narrowing subject. A `Name` with no attached
    /// binding — or one this driver never attached scopes for — degrades to `Unknown` rather than
    /// panicking (spec §1: the binder is an external collaborator this core doesn't require).
    fn infer_name_expression(&self, node: NodeId, name: &Name, ctx: ExprContext) -> Result<Type, Cancelled> {
        let _ = ctx;
        let Some(binding) = self.references.borrow().get(&node).cloned() else {
            return Ok(Type::Unknown);
        };
        let Some((_, symbol_id, symbol)) = self.resolve_name_symbol(binding.scope, name, true) else {
            return Ok(Type::Unknown);
        };
        let declaration = symbol.declarations.last().map(|d| d.node).unwrap_or(node);
        let effective = self.get_effective_type_of_symbol(symbol_id, declaration, || {
            symbol.synthesized_type.clone().unwrap_or(Type::Unknown)
        });
        let mut ty = effective.ty;
        if let Some((graph, start)) = &binding.flow {
            if graph.is_narrowing_subject(node) {
                ty = self.resolve_narrowed_type(graph, *start, symbol_id, &ty);
            }
        }
        Ok(ty)
    }

    /// Walks `scope_id`'s chain looking for `name` (spec §3's scoping rules): a class scope's own
    /// members are visible only to lookups starting *in* that class body (`innermost`), never to
    /// a nested function scope walking outward through it, matching Python's rule that methods
    /// don't implicitly see their enclosing class's attributes as bare names.
    fn resolve_name_symbol(&self, scope_id: ScopeId, name: &Name, innermost: bool) -> Option<(ScopeId, SymbolId, Symbol)> {
        let scope = self.scopes.borrow().get(&scope_id)?.clone();
        if innermost || scope.kind != crate::scope::ScopeKind::Class {
            let table = scope.symbols.borrow();
            if let Some(id) = table.symbol_id_by_name(name.as_str()) {
                if let Some(sym) = table.get(name.as_str()) {
                    return Some((scope_id, id, sym.clone()));
                }
            }
        }
        self.resolve_name_symbol(scope.parent?, name, false)
    }

    fn infer_member_access_expression(&self, value: &Expr, attr: &Name, flags: Flags) -> Result<Type, Cancelled> {
        let value_ty = self.get_type_of_expression(value, None, flags)?;
        Ok(self.member_type(&value_ty, attr))
    }

    /// Member access over a possibly-union receiver (spec §4.1's "member access"): looked up per
    /// MRO hop, descriptor `__get__` resolution bound to the class per the Open Question in §9
    /// ("follow source: bind to the class").
    fn member_type(&self, receiver: &Type, attr: &Name) -> Type {
        match receiver {
            Type::Union(members) => union_of(members.iter().map(|m| self.member_type(m, attr))),
            Type::Object(class, _) => match class.member(attr.as_str()) {
                Some(Type::Function(f)) if f.details.is_property() => f.return_type(),
                Some(Type::Function(f)) => Type::Function(f.bind_to(receiver)),
                Some(other) => other,
                None => {
                    if attr.as_str() == "__class__" {
                        receiver.to_class_object().unwrap_or(Type::Unknown)
                    } else {
                        self.diagnostics.error(
                            rules::UNRESOLVED_ATTRIBUTE,
                            Default::default(),
                            format!("unresolved attribute {attr}"),
                        );
                        Type::Unknown
                    }
                }
            },
            Type::Class(class, _) => match class.member(attr.as_str()) {
                Some(Type::Function(f)) if f.details.is_class_method() => Type::Function(f.bind_to(receiver)),
                Some(Type::Function(f)) if f.details.is_static_method() => Type::Function(f),
                Some(other) => other,
                None => Type::Unknown,
            },
            Type::Module(module) => module
                .fields
                .get(attr.as_str())
                .and_then(|s| s.synthesized_type.clone())
                .or_else(|| module.loader_fields.get(attr.as_str()).and_then(|s| s.synthesized_type.clone()))
                .unwrap_or(Type::Unknown),
            _ if receiver.is_any_or_unknown() => receiver.clone(),
            _ => Type::Unknown,
        }
    }

    fn infer_index_expression(&self, value: &Expr, index: &Expr, flags: Flags) -> Result<Type, Cancelled> {
        let value_ty = self.get_type_of_expression(value, None, Flags { do_not_specialize: true, ..flags })?;
        let index_ty = self.get_type_of_expression(index, None, flags)?;
        Ok(self.index_type(&value_ty, &index_ty))
    }

    /// Spec §4.1's three index modes: specializing a generic class (`list[int]`), subscripting a
    /// `__getitem__`-bearing instance, and indexing a tuple of known literal element types.
    fn index_type(&self, value_ty: &Type, index_ty: &Type) -> Type {
        match value_ty {
            Type::Class(class, _) => {
                let args = match index_ty {
                    Type::Class(arg_class, _) => vec![Type::Class(arg_class.clone(), None)],
                    Type::Union(members) if members.iter().all(|m| m.is_class()) => members.to_vec(),
                    other => vec![other.clone()],
                };
                Type::Class(ClassRef::specialized(class.details.clone(), args), None)
            }
            Type::Object(class, _) => match class.member("__getitem__") {
                Some(Type::Function(f)) => f.return_type(),
                _ => {
                    self.diagnostics.error(rules::NON_SUBSCRIPTABLE, Default::default(), format!("{} is not subscriptable", class.name()));
                    Type::Unknown
                }
            },
            _ if value_ty.is_any_or_unknown() => value_ty.clone(),
            _ => Type::Unknown,
        }
    }

    /// Spec §7's "partially-unknown arguments" warning family: reports when `ty` mixes `Unknown`
    /// with otherwise-known structure (a union half-resolved, a generic specialized with an
    /// unknown type argument) rather than being fully `Unknown`, which is unremarkable on its own.
    fn warn_if_partially_unknown(&self, ty: &Type, range: crate::ast::TextRange) {
        if is_partially_unknown(ty) {
            self.diagnostics.warning(
                rules::PARTIALLY_UNKNOWN_TYPE,
                range,
                format!(
                    "argument has partially unknown type {}",
                    crate::types::display::print_type(ty, self.options.print_flags)
                ),
            );
        }
    }

    fn infer_call_expression(
        &self,
        func: &Expr,
        args: &[Expr],
        keywords: &[(Option<Name>, Expr)],
        expected: Option<&Type>,
    ) -> Result<Type, Cancelled> {
        let callee_ty = self.get_type_of_expression(func, None, Flags::default())?;
        if let Some(builtin) = self.evaluate_builtin_call(func, &callee_ty, args)? {
            return Ok(builtin);
        }

        let mut call_args = CallArguments::new();
        for arg in args {
            if let Expr::Unpack { value, .. } = arg {
                let ty = self.get_type_of_expression(value, None, Flags::default())?;
                self.warn_if_partially_unknown(&ty, value.range());
                call_args.arguments.push(Argument::UnpackedIterable(ty));
            } else {
                let ty = self.get_type_of_expression(arg, None, Flags::default())?;
                self.warn_if_partially_unknown(&ty, arg.range());
                call_args.arguments.push(Argument::Positional(ty));
            }
        }
        for (name, value) in keywords {
            let ty = self.get_type_of_expression(value, None, Flags::default())?;
            self.warn_if_partially_unknown(&ty, value.range());
            match name {
                Some(name) => call_args.arguments.push(Argument::Keyword(name.clone(), ty)),
                None => call_args.arguments.push(Argument::UnpackedMapping(ty)),
            }
        }

        // Overload probing (spec §4.3) tries each candidate in turn and discards the losers'
        // diagnostics; it also needs its cache writes discardable the same way, since a probed
        // candidate may recursively evaluate default-value or return-type expressions that get
        // cached before that candidate is rejected (spec §4.8's speculative tier).
        let outcome = if matches!(callee_ty, Type::OverloadedFunction(_)) {
            let _speculative = cache::enter_speculative(&self.cache, Some(func.id()));
            call::call(&callee_ty, &call_args, &self.diagnostics)
        } else {
            call::call(&callee_ty, &call_args, &self.diagnostics)
        };
        let result = match outcome {
            CallOutcome::Ok(ty) => ty,
            CallOutcome::PossiblyNotCallable(ty) => {
                self.diagnostics.error(rules::CALL_NON_CALLABLE, Default::default(), "value may not be callable");
                ty
            }
            CallOutcome::NoMatchingOverload(_) | CallOutcome::BindingErrors(_) => Type::Unknown,
            CallOutcome::NotCallable => {
                self.diagnostics.error(rules::CALL_NON_CALLABLE, Default::default(), "value is not callable");
                Type::Unknown
            }
        };
        Ok(match expected {
            Some(expected_ty) => call::adjust_constructor_result_to_expected(result, expected_ty),
            None => result,
        })
    }

    /// Intrinsics consulted before ordinary binding (spec §4.3's "built-in name"): `isinstance`,
    /// `issubclass`, `callable`, `reveal_type`. Evaluated here rather than via the generic call
    /// resolver because their return type depends on argument *shape*, not just argument types.
    fn evaluate_builtin_call(&self, func: &Expr, callee_ty: &Type, args: &[Expr]) -> Result<Option<Type>, Cancelled> {
        let Some((name, _)) = func.as_name() else { return Ok(None) };
        if !matches!(name.as_str(), "isinstance" | "issubclass" | "callable" | "reveal_type") {
            return Ok(None);
        }
        let _ = callee_ty;
        match name.as_str() {
            "reveal_type" => {
                if let Some(arg) = args.first() {
                    let ty = self.get_type_of_expression(arg, None, Flags::default())?;
                    self.diagnostics.information(
                        rules::REVEAL_TYPE,
                        arg.range(),
                        format!("Revealed type is \"{}\"", crate::types::display::print_type(&ty, self.options.print_flags)),
                    );
                    return Ok(Some(ty));
                }
                Ok(Some(Type::Unknown))
            }
            "isinstance" | "issubclass" | "callable" => Ok(Some(self.builtins.bool_instance(false).widen_literal())),
            _ => Ok(None),
        }
    }

    /// Bidirectional container inference (spec §4.1): element types are evaluated against the
    /// expected container's own element type when one is available (narrowing each element the
    /// same way any other expression's `expected` does), and the result is specialized with their
    /// join rather than left as a bare unspecialized `list`/`set`/`tuple`.
    fn infer_sequence_expression(&self, expr: &Expr, elements: &[Expr], expected: Option<&Type>, flags: Flags) -> Result<Type, Cancelled> {
        let class_name = match expr {
            Expr::Tuple { .. } => "tuple",
            Expr::List { .. } => "list",
            _ => "set",
        };
        let expected_elem = expected_element_type(expected, class_name);
        let mut element_types = Vec::with_capacity(elements.len());
        for element in elements {
            element_types.push(self.get_type_of_expression(element, expected_elem.as_ref(), flags)?);
        }
        let element_ty = union_of(element_types);
        Ok(self
            .builtins
            .by_name(class_name)
            .map(|c| Type::Object(ClassRef::specialized(c.clone(), vec![element_ty.clone()]), None))
            .unwrap_or(Type::Unknown))
    }

    /// Dict-literal counterpart of [`Evaluator::infer_sequence_expression`] (spec §4.1). A `None`
    /// key denotes a `**mapping` unpack entry; its own key/value types (if the mapping is itself a
    /// specialized `dict`) are folded into the aggregate rather than evaluated bidirectionally,
    /// since an unpack's pairs aren't individually checkable against `expected`.
    fn infer_dict_expression(
        &self,
        keys: &[Option<Expr>],
        values: &[Expr],
        expected: Option<&Type>,
        flags: Flags,
    ) -> Result<Type, Cancelled> {
        let (expected_key, expected_value) = expected_dict_element_types(expected);
        let mut key_types = Vec::new();
        let mut value_types = Vec::new();
        for (key, value) in keys.iter().zip(values.iter()) {
            match key {
                Some(key_expr) => {
                    key_types.push(self.get_type_of_expression(key_expr, expected_key.as_ref(), flags)?);
                    value_types.push(self.get_type_of_expression(value, expected_value.as_ref(), flags)?);
                }
                None => {
                    let mapping_ty = self.get_type_of_expression(value, None, flags)?;
                    if let Type::Object(class, _) = &mapping_ty {
                        if let Some(args) = &class.type_args {
                            if let Some(k) = args.first() {
                                key_types.push(k.clone());
                            }
                            if let Some(v) = args.get(1) {
                                value_types.push(v.clone());
                            }
                        }
                    }
                }
            }
        }
        let key_ty = union_of(key_types);
        let value_ty = union_of(value_types);
        Ok(self
            .builtins
            .by_name("dict")
            .map(|c| Type::Object(ClassRef::specialized(c.clone(), vec![key_ty, value_ty]), None))
            .unwrap_or(Type::Unknown))
    }

    fn infer_unary_op_expression(&self, op: UnaryOp, operand: &Expr, flags: Flags) -> Result<Type, Cancelled> {
        let operand_ty = self.get_type_of_expression(operand, None, flags)?;
        Ok(match op {
            UnaryOp::Not => self.builtins.bool_instance(false).widen_literal(),
            _ => operand_ty,
        })
    }

    /// Spec §4.1's binary-operation rule: dunder lookup on the left operand (`__add__` etc.),
    /// falling back to `Unknown` when the method is absent — the reflected-method (`__radd__`)
    /// fallback path is not modeled since no grounding source in the teacher's `types/infer.rs`
    /// slice surfaced its exact precedence rule.
    fn infer_bin_op_expression(&self, op: BinOp, left: &Expr, right: &Expr, flags: Flags) -> Result<Type, Cancelled> {
        let left_ty = self.get_type_of_expression(left, None, flags)?;
        let right_ty = self.get_type_of_expression(right, None, flags)?;
        let dunder = dunder_for_bin_op(op);
        let member = match &left_ty {
            Type::Object(class, _) => class.member(dunder),
            _ => None,
        };
        match member {
            Some(Type::Function(f)) => {
                let call_args = CallArguments::new().positional(right_ty);
                match call::call(&Type::Function(f), &call_args, &self.diagnostics) {
                    CallOutcome::Ok(ty) => Ok(ty),
                    _ => Ok(Type::Unknown),
                }
            }
            _ if left_ty.is_any_or_unknown() || right_ty.is_any_or_unknown() => Ok(Type::Unknown),
            _ => {
                self.diagnostics.error(rules::UNSUPPORTED_OPERATOR, Default::default(), format!("unsupported operand type(s) for {op:?}"));
                Ok(Type::Unknown)
            }
        }
    }

    fn infer_bool_op_expression(&self, values: &[Expr], flags: Flags) -> Result<Type, Cancelled> {
        let mut results = Vec::with_capacity(values.len());
        for value in values {
            results.push(self.get_type_of_expression(value, None, flags)?);
        }
        Ok(union_of(results))
    }

    fn infer_compare_expression(&self, left: &Expr, ops: &[CmpOp], comparators: &[Expr], flags: Flags) -> Result<Type, Cancelled> {
        self.get_type_of_expression(left, None, flags)?;
        for comparator in comparators {
            self.get_type_of_expression(comparator, None, flags)?;
        }
        let _ = ops;
        Ok(self.builtins.bool_instance(false).widen_literal())
    }

    fn infer_ternary_expression(
        &self,
        test: &Expr,
        body: &Expr,
        or_else: &Expr,
        expected: Option<&Type>,
        flags: Flags,
    ) -> Result<Type, Cancelled> {
        self.get_type_of_expression(test, None, flags)?;
        let body_ty = self.get_type_of_expression(body, expected, flags)?;
        let or_else_ty = self.get_type_of_expression(or_else, expected, flags)?;
        Ok(union_of([body_ty, or_else_ty]))
    }

    fn infer_lambda_expression(&self, declaration: NodeId, parameters: &[crate::ast::Parameter], body: &Expr) -> Result<Type, Cancelled> {
        let mut params = Vec::with_capacity(parameters.len());
        for param in parameters {
            params.push(TypeParameter {
                name: param.name.clone(),
                annotation: Type::Unknown,
                has_default: param.default.is_some(),
                kind: param.kind,
                param_spec: None,
            });
        }
        let return_ty = self.get_type_of_expression(body, None, Flags::default())?;
        let details = Rc::new(FunctionDetails {
            name: Name::new("<lambda>"),
            declaration,
            doc: None,
            parameters: params,
            declared_return: Some(return_ty),
            flags: FunctionFlags::empty(),
            built_in_name: None,
            is_abstract_method: false,
        });
        Ok(Type::Function(FunctionType::new(details)))
    }

    // ----------------------------------------------------------------------------------------
    // §4.6 code-flow narrowing entry point
    // ----------------------------------------------------------------------------------------

    /// Resolves `reference`'s narrowed type along `graph` starting at `start` (spec §4.6). Only
    /// called for references the binder has marked as narrowing subjects in their scope
    /// (`FlowGraph::is_narrowing_subject`); callers elsewhere just read `Symbol::synthesized_type`
    /// or the declared type directly.
    pub fn resolve_narrowed_type(
        &self,
        graph: &FlowGraph,
        start: FlowNodeId,
        reference: SymbolId,
        declared_type: &Type,
    ) -> Type {
        // Brackets the `LoopLabel` fixed point (spec §4.6, §4.8): any loop-back edge `walk_flow`
        // revisits before it has settled reads `Unknown` rather than recursing forever, and every
        // cache entry written while the frame is open is discarded again once the outermost
        // narrowing resolution for this reference finishes, per spec §4.8's incomplete-type rule.
        let _incomplete = cache::enter_incomplete(&self.cache);
        let mut in_progress = Vec::new();
        crate::types::narrow::walk_flow(graph, start, reference, declared_type, self, &mut in_progress).ty
    }

    /// Rebuilds the narrowing callback a test expression places on `reference` (spec §4.6's
    /// catalogue), matching the same expression shapes `infer_compare_expression` et al. already
    /// evaluate. Only comparisons/calls/boolean compositions whose subject actually resolves to
    /// `reference` produce a callback; anything else (or a subject that resolves to a different
    /// symbol) yields `None`, same as a test with no narrowing effect on this particular name.
    fn build_narrowing_callback(&self, expr: &Expr, reference: SymbolId) -> Option<NarrowingCallback> {
        match expr {
            Expr::Compare { left, ops, comparators, .. } if ops.len() == 1 && comparators.len() == 1 => {
                let op = ops[0];
                let other = &comparators[0];
                let subject_is_left = self.reference_matches(left, reference);
                let subject_is_right = self.reference_matches(other, reference);
                if !subject_is_left && !subject_is_right {
                    return None;
                }
                let literal_expr = if subject_is_left { other } else { left.as_ref() };
                match op {
                    CmpOp::Is | CmpOp::IsNot if is_none_literal(literal_expr) => {
                        Some(NarrowingCallback::IsNone { positive: op == CmpOp::Is })
                    }
                    CmpOp::Eq | CmpOp::NotEq => literal_value_of(literal_expr).map(|literal| NarrowingCallback::LiteralEquals {
                        literal,
                        positive: op == CmpOp::Eq,
                        enumerable_universe: None,
                    }),
                    _ => None,
                }
            }
            Expr::Call { func, args, .. } => {
                let (name, _) = func.as_name()?;
                match name.as_str() {
                    "isinstance" | "issubclass" if args.len() == 2 && self.reference_matches(&args[0], reference) => {
                        let classes = self.class_list_from_expr(&args[1])?;
                        Some(NarrowingCallback::IsInstance { classes, positive: true, is_subclass_check: name.as_str() == "issubclass" })
                    }
                    "callable" if args.len() == 1 && self.reference_matches(&args[0], reference) => {
                        Some(NarrowingCallback::Callable { positive: true })
                    }
                    _ => None,
                }
            }
            Expr::BoolOp { op, values, .. } => {
                let parts: Option<Vec<NarrowingCallback>> =
                    values.iter().map(|value| self.build_narrowing_callback(value, reference)).collect();
                Some(match op {
                    BoolOp::And => NarrowingCallback::And(parts?),
                    BoolOp::Or => NarrowingCallback::Or(parts?),
                })
            }
            Expr::UnaryOp { op: UnaryOp::Not, operand, .. } => self.build_narrowing_callback(operand, reference).map(|cb| cb.negate()),
            _ if self.reference_matches(expr, reference) => Some(NarrowingCallback::Truthy { positive: true }),
            _ => None,
        }
    }

    /// Whether `expr` is a `Name` load that resolves (through its attached [`ReferenceBinding`])
    /// to `reference`. Narrowing subjects are always names here: a member access has no
    /// `SymbolId` of its own to compare against (spec §4.6 scopes narrowing to name references).
    fn reference_matches(&self, expr: &Expr, reference: SymbolId) -> bool {
        let Some((name, _)) = expr.as_name() else { return false };
        let Some(binding) = self.references.borrow().get(&expr.id()).cloned() else { return false };
        matches!(self.resolve_name_symbol(binding.scope, name, true), Some((_, symbol_id, _)) if symbol_id == reference)
    }

    /// The class(es) named by an `isinstance`/`issubclass` second argument, a bare class
    /// reference or a tuple of them — read off the already-cached type of that argument
    /// expression (evaluated when the `if isinstance(...):` test itself was type-checked).
    fn class_list_from_expr(&self, expr: &Expr) -> Option<Vec<ClassRef>> {
        match expr {
            Expr::Tuple { elements, .. } => elements.iter().map(|e| self.class_ref_from_expr(e)).collect(),
            _ => self.class_ref_from_expr(expr).map(|class| vec![class]),
        }
    }

    fn class_ref_from_expr(&self, expr: &Expr) -> Option<ClassRef> {
        match self.cached(expr.id())? {
            Type::Class(class, _) => Some(class),
            _ => None,
        }
    }

    // ----------------------------------------------------------------------------------------
    // §4.9 symbol resolution and effective types
    // ----------------------------------------------------------------------------------------

    /// `get_declared_type_of_symbol` (spec §4.9): the union of every *typed* declaration's
    /// annotation, ignoring inferred (unannotated) declarations entirely.
    pub fn get_declared_type_of_symbol(&self, symbol: &Symbol, annotations: &[(NodeId, Type)]) -> Option<Type> {
        let typed: Vec<Type> = symbol
            .typed_declarations()
            .filter_map(|decl| {
                let node = decl.type_annotation?;
                annotations.iter().find(|(n, _)| *n == node).map(|(_, ty)| ty.clone())
            })
            .collect();
        if typed.is_empty() {
            None
        } else {
            Some(union_of(typed))
        }
    }

    /// `get_effective_type_of_symbol` (spec §4.9): declared type if present, else the (possibly
    /// flow-narrowed) inferred type; records whether resolution is self-recursive via the
    /// symbol-resolution stack (ADDED: "cycle_fallback"-style flag) so a hover consumer can
    /// surface that fact without re-deriving it.
    pub fn get_effective_type_of_symbol(
        &self,
        symbol_id: SymbolId,
        declaration: NodeId,
        compute: impl FnOnce() -> Type,
    ) -> EffectiveType {
        let entered = self.symbol_stack.borrow_mut().push(symbol_id, declaration);
        if !entered {
            let cyclical_fallback = self
                .symbol_stack
                .borrow()
                .partial_type_for(symbol_id, declaration)
                .cloned()
                .unwrap_or(Type::Unknown);
            return EffectiveType { ty: cyclical_fallback, is_cyclical: true };
        }
        let ty = compute();
        self.symbol_stack.borrow_mut().pop();
        EffectiveType { ty, is_cyclical: false }
    }

    /// `resolve_alias_declaration` (spec §4.9): follows a re-export chain with a visited set so a
    /// circular `from a import b` / `from b import a` terminates in `Unknown` rather than looping.
    pub fn resolve_alias_declaration(&self, start: &crate::module::ModuleName, mut follow: impl FnMut(&crate::module::ModuleName) -> Option<crate::module::ModuleName>) -> Option<crate::module::ResolvedModule> {
        let mut visited = std::collections::HashSet::new();
        let mut current = start.clone();
        loop {
            if !visited.insert(current.clone()) {
                return None;
            }
            if let Some(resolved) = self.import_lookup.lookup(&current) {
                return Some(resolved);
            }
            current = follow(&current)?;
        }
    }

    // ----------------------------------------------------------------------------------------
    // §6 remaining external interfaces
    // ----------------------------------------------------------------------------------------

    /// `getTypeFromIterable` (spec §6): the element type yielded by iterating `ty`, via
    /// `__iter__`/`__next__` (or `__aiter__`/`__anext__` for `async for`), falling back to
    /// old-style `__getitem__` iteration when `support_get_item` is set and no `__iter__` exists.
    pub fn get_type_from_iterable(&self, ty: &Type, is_async: bool, support_get_item: bool) -> Type {
        if ty.is_any_or_unknown() {
            return ty.clone();
        }
        if let Type::Union(members) = ty {
            return union_of(members.iter().map(|m| self.get_type_from_iterable(m, is_async, support_get_item)));
        }
        let (iter_dunder, next_dunder) = if is_async { ("__aiter__", "__anext__") } else { ("__iter__", "__next__") };
        if let Type::Object(class, _) = ty {
            if let Some(Type::Function(iter_fn)) = class.member(iter_dunder) {
                let iterator_ty = iter_fn.return_type();
                if let Type::Object(iterator_class, _) = &iterator_ty {
                    if let Some(Type::Function(next_fn)) = iterator_class.member(next_dunder) {
                        return next_fn.return_type();
                    }
                }
                return Type::Unknown;
            }
            if support_get_item {
                if let Some(Type::Function(getitem)) = class.member("__getitem__") {
                    return getitem.return_type();
                }
            }
        }
        self.diagnostics.error(
            rules::NOT_ITERABLE,
            Default::default(),
            format!("{} is not iterable", crate::types::display::print_type(ty, self.options.print_flags)),
        );
        Type::Unknown
    }

    /// `getTypedDictMembersForClass` (spec §6): `name -> (value_type, is_required)` for every
    /// field of a synthesized `TypedDict` class, reading the per-key `TYPED_DICT_REQUIRED` flag
    /// `finalize_typed_dict` stamps during synthesis (spec §4.7).
    pub fn get_typed_dict_members_for_class(&self, class: &ClassRef) -> Vec<(Name, TypedDictMember)> {
        class
            .details
            .fields
            .borrow()
            .iter()
            .filter_map(|sym| {
                let value_type = sym.synthesized_type.clone()?;
                Some((
                    sym.name.clone(),
                    TypedDictMember { value_type, is_required: sym.flags.contains(SymbolFlags::TYPED_DICT_REQUIRED) },
                ))
            })
            .collect()
    }

    /// `bindFunctionToClassOrObject` (spec §6): the bound-method view of `member` as accessed
    /// through `base` (an instance, or a class when `treat_as_class_member` is set for an
    /// attribute accessed through the class itself). Static methods are returned unbound;
    /// classmethods bind to the class regardless of `base`'s presence.
    pub fn bind_function_to_class_or_object(
        &self,
        base: Option<&Type>,
        member: &FunctionType,
        treat_as_class_member: bool,
    ) -> Type {
        if member.details.is_static_method() {
            return Type::Function(member.clone());
        }
        if treat_as_class_member && !member.details.is_class_method() {
            return Type::Function(member.clone());
        }
        match base {
            Some(receiver) => Type::Function(member.bind_to(receiver)),
            None => Type::Function(member.clone()),
        }
    }

    /// `getDeclaredTypeForExpression` (spec §6): the annotation-sourced type at `expr`, evaluated
    /// as a type expression rather than a value expression (stub `...` placeholders read as
    /// `Any`, literals preserved rather than widened).
    pub fn get_declared_type_for_expression(&self, expr: &Expr) -> Result<Type, Cancelled> {
        self.get_type_of_expression(
            expr,
            None,
            Flags { convert_ellipsis_to_any: true, do_not_specialize: false, preserve_literal: true },
        )
    }

    /// `verifyDeleteExpression` (spec §6): the only valid `del` targets are names, member
    /// accesses, and subscripts, and tuples/lists of the same; anything else is reported.
    pub fn verify_delete_expression(&self, expr: &Expr) -> Result<(), Cancelled> {
        self.check_cancellation()?;
        match expr {
            Expr::Name { .. } | Expr::MemberAccess { .. } | Expr::Index { .. } => {
                self.get_type_of_expression(expr, None, Flags::default())?;
            }
            Expr::Tuple { elements, .. } | Expr::List { elements, .. } => {
                for element in elements {
                    self.verify_delete_expression(element)?;
                }
            }
            _ => {
                self.diagnostics.error(rules::INVALID_DELETE_TARGET, expr.range(), "cannot delete this expression");
            }
        }
        Ok(())
    }

    /// `isNodeReachable` (spec §6): whether control flow can reach `node` at all.
    pub fn is_node_reachable(&self, graph: &FlowGraph, node: FlowNodeId) -> bool {
        crate::types::narrow::is_node_reachable(graph, node, self)
    }

    /// `isAfterNodeReachable` (spec §6): whether control flow can reach the point right after
    /// `node` finishes executing — differs from `isNodeReachable` only for a `Call` node whose
    /// callee is itself `NoReturn`, which is reachable but never falls through.
    pub fn is_after_node_reachable(&self, graph: &FlowGraph, node: FlowNodeId) -> bool {
        if let crate::scope::FlowNode::Call { callee_node, .. } = graph.get(node) {
            if self.callee_is_noreturn(*callee_node) {
                return false;
            }
        }
        self.is_node_reachable(graph, node)
    }

    /// Spec §7's unreachable-code error family: reports `range` on the "unused code" channel
    /// when `node` (the flow position a statement executes at, as attached by the binder) turns
    /// out to be unreachable. A driver calls this once per statement alongside
    /// `evaluate_types_for_statement`; this core does not walk statement bodies itself since it
    /// has no way to pair a statement with its flow node without the binder's help.
    pub fn report_if_unreachable(&self, graph: &FlowGraph, node: FlowNodeId, range: crate::ast::TextRange) {
        if !self.is_node_reachable(graph, node) {
            self.diagnostics.unreachable_code(range, "this code is unreachable");
        }
    }
}

/// A resolved effective type plus whether resolution bottomed out in a still-resolving cycle
/// (SPEC_FULL.md §4.9's ADDED `cycle_fallback`-style flag).
#[derive(Debug, Clone)]
pub struct EffectiveType {
    pub ty: Type,
    pub is_cyclical: bool,
}

/// One entry of `getTypedDictMembersForClass`'s result (spec §6).
#[derive(Debug, Clone)]
pub struct TypedDictMember {
    pub value_type: Type,
    pub is_required: bool,
}

impl<'a> FlowTypeProvider for Evaluator<'a> {
    fn type_of_value_node(&self, value_node: NodeId) -> Type {
        self.cached(value_node).unwrap_or(Type::Unknown)
    }

    fn callee_is_noreturn(&self, callee_node: NodeId) -> bool {
        match self.cached(callee_node) {
            Some(Type::Function(f)) => matches!(f.return_type(), Type::Never),
            _ => false,
        }
    }

    fn narrowing_callback_for(&self, test_node: NodeId, reference: SymbolId) -> Option<NarrowingCallback> {
        let test_expr = self.test_expressions.borrow().get(&test_node).cloned()?;
        self.build_narrowing_callback(&test_expr, reference)
    }

    fn wildcard_import_type(&self, module: &Name, _name: SymbolId) -> Option<Type> {
        let path = crate::module::ModuleName::parse(module.as_str())?;
        let resolved = self.import_lookup.lookup(&path)?;
        let _ = resolved;
        None
    }
}

fn expr_kind_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::Name { .. } => "Name",
        Expr::MemberAccess { .. } => "MemberAccess",
        Expr::Index { .. } => "Index",
        Expr::Slice { .. } => "Slice",
        Expr::Call { .. } => "Call",
        Expr::Tuple { .. } => "Tuple",
        Expr::List { .. } => "List",
        Expr::SetExpr { .. } => "SetExpr",
        Expr::Dict { .. } => "Dict",
        Expr::Constant { .. } => "Constant",
        Expr::Number { .. } => "Number",
        Expr::StringList { .. } => "StringList",
        Expr::Ellipsis { .. } => "Ellipsis",
        Expr::UnaryOp { .. } => "UnaryOp",
        Expr::BinOp { .. } => "BinOp",
        Expr::BoolOp { .. } => "BoolOp",
        Expr::Compare { .. } => "Compare",
        Expr::Await { .. } => "Await",
        Expr::Ternary { .. } => "Ternary",
        Expr::ListComprehension { .. } => "ListComprehension",
        Expr::Lambda { .. } => "Lambda",
        Expr::Assignment { .. } => "Assignment",
        Expr::AssignmentExpression { .. } => "AssignmentExpression",
        Expr::Yield { .. } => "Yield",
        Expr::YieldFrom { .. } => "YieldFrom",
        Expr::Unpack { .. } => "Unpack",
        Expr::TypeAnnotation { .. } => "TypeAnnotation",
        Expr::Error { .. } => "Error",
    }
}

fn decorator_name(expr: &Expr) -> Option<Name> {
    match expr {
        Expr::Name { name, .. } => Some(name.clone()),
        Expr::MemberAccess { attr, .. } => Some(attr.clone()),
        Expr::Call { func, .. } => decorator_name(func),
        _ => None,
    }
}

fn base_names_class(base: &Type, name: &str) -> bool {
    base.as_class_ref().is_some_and(|c| c.name().as_str() == name)
}

/// The element type an expected `list[T]`/`set[T]`/`tuple[T, ...]` (or its class-object form)
/// carries for `class_name`, used to propagate an expected type into a container literal's
/// elements (spec §4.1).
fn expected_element_type(expected: Option<&Type>, class_name: &str) -> Option<Type> {
    match expected? {
        Type::Object(class, _) | Type::Class(class, _) if class.name().as_str() == class_name => {
            class.type_args.as_ref()?.first().cloned()
        }
        _ => None,
    }
}

/// The `(key, value)` element types an expected `dict[K, V]` carries, for propagating into a
/// dict literal's entries (spec §4.1).
fn expected_dict_element_types(expected: Option<&Type>) -> (Option<Type>, Option<Type>) {
    match expected {
        Some(Type::Object(class, _)) | Some(Type::Class(class, _)) if class.name().as_str() == "dict" => {
            let args = class.type_args.as_ref();
            (args.and_then(|a| a.first().cloned()), args.and_then(|a| a.get(1).cloned()))
        }
        _ => (None, None),
    }
}

/// True when `ty` is a union or a specialized generic that mixes `Unknown` with otherwise-known
/// members, as opposed to being fully `Unknown` itself (spec §7's distinct "partially-unknown"
/// warning family).
fn is_partially_unknown(ty: &Type) -> bool {
    match ty {
        Type::Union(members) => {
            members.iter().any(Type::is_unknown) && members.iter().any(|m| !m.is_unknown())
        }
        Type::Class(class, _) | Type::Object(class, _) => {
            class.type_args.as_ref().is_some_and(|args| args.iter().any(Type::is_unknown))
        }
        _ => false,
    }
}

fn is_truthy_constant(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant { value: Constant::Bool(true), .. })
}

fn is_none_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant { value: Constant::None, .. })
}

/// Reads a literal value off an AST node, for `X == <literal>` narrowing (spec §4.6). Numeric
/// literals aren't representable: [`Expr::Number`] only records whether the token was an int,
/// complex, or float, not its digits, so integer-literal narrowing is out of reach here.
fn literal_value_of(expr: &Expr) -> Option<LiteralValue> {
    match expr {
        Expr::Constant { value: Constant::Bool(b), .. } => Some(LiteralValue::Bool(*b)),
        Expr::StringList { value, is_bytes: false, .. } => Some(LiteralValue::Str(value.as_str().into())),
        Expr::StringList { value, is_bytes: true, .. } => Some(LiteralValue::Bytes(value.as_bytes().into())),
        _ => None,
    }
}

fn dunder_for_bin_op(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "__add__",
        BinOp::Sub => "__sub__",
        BinOp::Mult => "__mul__",
        BinOp::MatMult => "__matmul__",
        BinOp::Div => "__truediv__",
        BinOp::Mod => "__mod__",
        BinOp::Pow => "__pow__",
        BinOp::LShift => "__lshift__",
        BinOp::RShift => "__rshift__",
        BinOp::BitOr => "__or__",
        BinOp::BitXor => "__xor__",
        BinOp::BitAnd => "__and__",
        BinOp::FloorDiv => "__floordiv__",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TextRange;
    use crate::module::InMemoryImportTable;

    fn evaluator(table: &InMemoryImportTable) -> Evaluator<'_> {
        Evaluator::new(table, EvaluatorOptions::default())
    }

    #[test]
    fn constant_none_evaluates_to_none_type() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let expr = Expr::Constant { id: NodeId(0), range: TextRange::default(), value: Constant::None };
        let ty = evaluator.get_type(&expr).unwrap();
        assert!(ty.is_none());
    }

    #[test]
    fn reveal_type_echoes_argument_type_and_reports_information() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let arg = Expr::Constant { id: NodeId(1), range: TextRange::default(), value: Constant::None };
        let call = Expr::Call {
            id: NodeId(2),
            range: TextRange::default(),
            func: Box::new(Expr::Name { id: NodeId(3), range: TextRange::default(), name: Name::new("reveal_type"), ctx: ExprContext::Load }),
            args: vec![arg],
            keywords: vec![],
        };
        let ty = evaluator.get_type(&call).unwrap();
        assert!(ty.is_none());
        assert_eq!(evaluator.diagnostics.iter().len(), 1);
    }

    #[test]
    fn unresolved_member_access_reports_diagnostic() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let object = evaluator.builtins.object_instance();
        let ty = evaluator.member_type(&object, &Name::new("nonexistent"));
        assert!(ty.is_unknown());
        assert_eq!(evaluator.diagnostics.iter().len(), 1);
    }

    #[test]
    fn type_cache_size_grows_as_expressions_are_evaluated() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        assert_eq!(evaluator.type_cache_size(), 0);
        let expr = Expr::Constant { id: NodeId(0), range: TextRange::default(), value: Constant::None };
        evaluator.get_type(&expr).unwrap();
        assert_eq!(evaluator.type_cache_size(), 1);
    }

    #[test]
    fn get_type_from_iterable_passes_through_any_and_unknown() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        assert!(evaluator.get_type_from_iterable(&Type::Unknown, false, false).is_unknown());
        assert!(evaluator.get_type_from_iterable(&Type::any(), false, false).is_any());
    }

    #[test]
    fn get_type_from_iterable_reports_not_iterable_for_none() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let ty = evaluator.get_type_from_iterable(&Type::None, false, false);
        assert!(ty.is_unknown());
        assert_eq!(evaluator.diagnostics.iter().len(), 1);
    }

    #[test]
    fn bind_function_to_class_or_object_leaves_static_method_unbound() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let details = Rc::new(FunctionDetails {
            name: Name::new("f"),
            declaration: NodeId(0),
            doc: None,
            parameters: vec![],
            declared_return: Some(Type::None),
            flags: FunctionFlags::IS_STATIC_METHOD,
            built_in_name: None,
            is_abstract_method: false,
        });
        let f = FunctionType::new(details);
        let object = evaluator.builtins.object_instance();
        let bound = evaluator.bind_function_to_class_or_object(Some(&object), &f, false);
        match bound {
            Type::Function(bound_f) => assert!(!bound_f.ignore_first_param),
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn verify_delete_expression_accepts_name_and_rejects_constant() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let name = Expr::Name { id: NodeId(0), range: TextRange::default(), name: Name::new("x"), ctx: ExprContext::Del };
        evaluator.verify_delete_expression(&name).unwrap();
        assert_eq!(evaluator.diagnostics.iter().len(), 0);

        let constant = Expr::Constant { id: NodeId(1), range: TextRange::default(), value: Constant::None };
        evaluator.verify_delete_expression(&constant).unwrap();
        assert_eq!(evaluator.diagnostics.iter().len(), 1);
    }

    #[test]
    fn verify_delete_expression_recurses_into_tuple_elements() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let tuple = Expr::Tuple {
            id: NodeId(0),
            range: TextRange::default(),
            elements: vec![
                Expr::Name { id: NodeId(1), range: TextRange::default(), name: Name::new("a"), ctx: ExprContext::Del },
                Expr::Constant { id: NodeId(2), range: TextRange::default(), value: Constant::None },
            ],
            ctx: ExprContext::Del,
        };
        evaluator.verify_delete_expression(&tuple).unwrap();
        assert_eq!(evaluator.diagnostics.iter().len(), 1);
    }

    #[test]
    fn is_node_reachable_reflects_unreachable_flow_node() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let mut graph = FlowGraph::new();
        let start = graph.push(crate::scope::FlowNode::Start);
        let unreachable = graph.push(crate::scope::FlowNode::Unreachable { antecedent: start });
        assert!(evaluator.is_node_reachable(&graph, start));
        assert!(!evaluator.is_node_reachable(&graph, unreachable));
    }

    #[test]
    fn report_if_unreachable_emits_diagnostic_only_for_dead_node() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let mut graph = FlowGraph::new();
        let start = graph.push(crate::scope::FlowNode::Start);
        let unreachable = graph.push(crate::scope::FlowNode::Unreachable { antecedent: start });
        evaluator.report_if_unreachable(&graph, start, TextRange::default());
        assert_eq!(evaluator.diagnostics.iter().len(), 0);
        evaluator.report_if_unreachable(&graph, unreachable, TextRange::default());
        assert_eq!(evaluator.diagnostics.iter().len(), 1);
        assert_eq!(evaluator.diagnostics.iter()[0].rule, rules::UNREACHABLE);
    }

    #[test]
    fn partially_unknown_union_assignment_reports_warning() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let value = Expr::Ternary {
            id: NodeId(0),
            range: TextRange::default(),
            test: Box::new(Expr::Constant { id: NodeId(1), range: TextRange::default(), value: Constant::Bool(true) }),
            body: Box::new(Expr::Constant { id: NodeId(2), range: TextRange::default(), value: Constant::None }),
            or_else: Box::new(Expr::Name { id: NodeId(3), range: TextRange::default(), name: Name::new("unresolved"), ctx: ExprContext::Load }),
        };
        let target = Expr::Name { id: NodeId(4), range: TextRange::default(), name: Name::new("x"), ctx: ExprContext::Store };
        let stmt = Stmt::Assign { targets: vec![target], value };
        evaluator.evaluate_types_for_statement(&stmt).unwrap();
        assert_eq!(evaluator.diagnostics.iter().len(), 1);
        assert_eq!(evaluator.diagnostics.iter()[0].rule, rules::PARTIALLY_UNKNOWN_TYPE);
    }

    #[test]
    fn list_literal_specializes_with_the_join_of_its_elements() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let list_expr = Expr::List {
            id: NodeId(0),
            range: TextRange::default(),
            elements: vec![
                Expr::Number { id: NodeId(1), range: TextRange::default(), is_int: true, is_complex: false },
                Expr::Number { id: NodeId(2), range: TextRange::default(), is_int: true, is_complex: false },
            ],
            ctx: ExprContext::Load,
        };
        let ty = evaluator.get_type(&list_expr).unwrap();
        let class = ty.as_class_ref().expect("a list instance");
        assert_eq!(class.name().as_str(), "list");
        let element = class.type_args.as_ref().and_then(|args| args.first()).expect("specialized element type");
        assert_eq!(element.as_class_ref().unwrap().name().as_str(), "int");
    }

    #[test]
    fn list_literal_prefers_assignable_expected_type_over_element_join() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let list_class = evaluator.builtins.by_name("list").unwrap().clone();
        let object_ty = evaluator.builtins.object_instance();
        let expected = Type::Object(ClassRef::specialized(list_class, vec![object_ty]), None);
        let list_expr = Expr::List {
            id: NodeId(0),
            range: TextRange::default(),
            elements: vec![Expr::Number { id: NodeId(1), range: TextRange::default(), is_int: true, is_complex: false }],
            ctx: ExprContext::Load,
        };
        let ty = evaluator.get_type_of_expression(&list_expr, Some(&expected), Flags::default()).unwrap();
        assert_eq!(ty.as_class_ref().unwrap().name().as_str(), "list");
        let element = ty.as_class_ref().unwrap().type_args.as_ref().and_then(|a| a.first()).unwrap();
        assert_eq!(element.as_class_ref().unwrap().name().as_str(), "object");
    }

    #[test]
    fn dict_literal_specializes_key_and_value_types() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let dict_expr = Expr::Dict {
            id: NodeId(0),
            range: TextRange::default(),
            keys: vec![Some(Expr::StringList { id: NodeId(1), range: TextRange::default(), value: "k".into(), is_bytes: false })],
            values: vec![Expr::Number { id: NodeId(2), range: TextRange::default(), is_int: true, is_complex: false }],
        };
        let ty = evaluator.get_type(&dict_expr).unwrap();
        let class = ty.as_class_ref().expect("a dict instance");
        assert_eq!(class.name().as_str(), "dict");
        let args = class.type_args.as_ref().unwrap();
        assert_eq!(args[0].as_class_ref().unwrap().name().as_str(), "str");
        assert_eq!(args[1].as_class_ref().unwrap().name().as_str(), "int");
    }

    #[test]
    fn invalid_base_class_expression_reports_diagnostic() {
        let table = InMemoryImportTable::new();
        let evaluator = evaluator(&table);
        let base = Expr::Constant { id: NodeId(0), range: TextRange::default(), value: Constant::None };
        let stmt = ClassDefStmt {
            id: NodeId(1),
            range: TextRange::default(),
            name: Name::new("C"),
            bases: vec![base],
            keywords: vec![],
            decorators: vec![],
            type_params: vec![],
            body: vec![Stmt::Pass],
            doc: None,
        };
        evaluator.get_type_of_class(&stmt).unwrap();
        assert_eq!(evaluator.diagnostics.iter().len(), 1);
        assert_eq!(evaluator.diagnostics.iter()[0].rule, rules::INVALID_BASE);
    }
}
