//! The call / overload resolver: dispatches a call onto a function, overload set, class
//! constructor, union of callables, or dunder `__call__`, and turns a binding failure into a
//! reported diagnostic.

pub mod arguments;
pub mod bind;

use super::class::ClassRef;
use super::function::FunctionType;
use super::generics::substitute;
use super::Type;
use crate::diagnostic::{rules, DiagnosticSink};
use arguments::CallArguments;
use bind::{bind_call_with_inference, CallError};

#[derive(Debug, Clone)]
pub enum CallOutcome {
    Ok(Type),
    /// No overload candidate validated; carries the argument types for the diagnostic message —
    /// a single "no overload matches" diagnostic with printed argument types.
    NoMatchingOverload(Vec<Type>),
    NotCallable,
    /// A union callee where at least one member lacked `__call__` entirely: reported, not
    /// hard-failed.
    PossiblyNotCallable(Type),
    BindingErrors(Vec<CallError>),
}

/// Calls `callee` with `args`, dispatching on its shape, including the union-callee case.
pub fn call(callee: &Type, args: &CallArguments, diag: &DiagnosticSink) -> CallOutcome {
    match callee {
        Type::Function(f) => call_function(f, args, diag),
        Type::OverloadedFunction(overloads) => call_overloaded(overloads, args, diag),
        Type::Class(class, _) => call_constructor(class, args, diag),
        Type::Object(class, _) => match class.member("__call__") {
            Some(Type::Function(f)) => call_function(&f.bind_to(&Type::Object(class.clone(), None)), args, diag),
            Some(Type::OverloadedFunction(overloads)) => call_overloaded(&overloads, args, diag),
            _ => CallOutcome::NotCallable,
        },
        Type::Union(members) => call_union(members, args, diag),
        _ if callee.is_any_or_unknown() => CallOutcome::Ok(callee.clone()),
        _ => CallOutcome::NotCallable,
    }
}

fn call_function(f: &FunctionType, args: &CallArguments, diag: &DiagnosticSink) -> CallOutcome {
    match bind_call_with_inference(f, args, diag) {
        Ok(ty) => CallOutcome::Ok(ty),
        Err(errors) => {
            for error in &errors {
                diag.error(error.rule(), Default::default(), format!("{error:?}"));
            }
            CallOutcome::BindingErrors(errors)
        }
    }
}

/// Overload selection: only `@overload`-decorated members participate; the trailing
/// non-overloaded implementation (if present, conventionally last in `overloads` when the caller
/// appended it) is used only as a fallback. Each candidate is probed speculatively (diagnostics
/// suppressed); the first candidate without errors wins.
fn call_overloaded(overloads: &[FunctionType], args: &CallArguments, diag: &DiagnosticSink) -> CallOutcome {
    for candidate in overloads {
        let probe_sink = DiagnosticSink::new();
        let _suppressed = probe_sink.suppress();
        if let Ok(ty) = bind_call_with_inference(candidate, args, &probe_sink) {
            return CallOutcome::Ok(ty);
        }
    }
    let arg_types: Vec<Type> = args
        .arguments
        .iter()
        .map(|a| match a {
            arguments::Argument::Positional(t)
            | arguments::Argument::Keyword(_, t)
            | arguments::Argument::UnpackedIterable(t)
            | arguments::Argument::UnpackedMapping(t) => t.clone(),
        })
        .collect();
    diag.error(
        rules::NO_MATCHING_OVERLOAD,
        Default::default(),
        format!("no overload matches argument types {arg_types:?}"),
    );
    CallOutcome::NoMatchingOverload(arg_types)
}

/// Union-of-callables rule: the call as a whole succeeds only if every callable member accepts
/// the arguments; non-callable members yield `PossiblyNotCallable` rather than hard-failing the
/// whole union.
fn call_union(members: &[Type], args: &CallArguments, diag: &DiagnosticSink) -> CallOutcome {
    let mut results = Vec::new();
    let mut saw_not_callable = false;
    for member in members {
        match call(member, args, diag) {
            CallOutcome::Ok(ty) => results.push(ty),
            CallOutcome::NotCallable => saw_not_callable = true,
            other => return other,
        }
    }
    let combined = super::union_of(results);
    if saw_not_callable {
        CallOutcome::PossiblyNotCallable(combined)
    } else {
        CallOutcome::Ok(combined)
    }
}

/// Spec §4.3's constructor validation order: `__init__` first (usually more precise
/// annotations), then `__new__`; either may be skipped via the synthesized "skip constructor
/// check" flag (e.g. `NamedTuple`, whose precise signature already lives on `__new__`).
fn call_constructor(class: &ClassRef, args: &CallArguments, diag: &DiagnosticSink) -> CallOutcome {
    let specialized = class.auto_specialize();
    if specialized.details.is_abstract() {
        diag.error(
            rules::ABSTRACT_INSTANTIATION,
            Default::default(),
            format!("cannot instantiate abstract class {}", specialized.name()),
        );
    }
    if let Some(Type::Function(init)) = specialized.member("__init__") {
        let bound = init.bind_to(&Type::Object(specialized.clone(), None));
        return match bind_call_with_inference(&bound, args, diag) {
            Ok(_) => CallOutcome::Ok(Type::Object(specialized, None)),
            Err(errors) => CallOutcome::BindingErrors(errors),
        };
    }
    if let Some(Type::Function(new_fn)) = specialized.member("__new__") {
        return match bind_call_with_inference(&new_fn, args, diag) {
            Ok(ty) => CallOutcome::Ok(ty),
            Err(errors) => CallOutcome::BindingErrors(errors),
        };
    }
    CallOutcome::Ok(Type::Object(specialized, None))
}

/// Adjusts a constructed instance toward a caller-provided `expected` type by re-solving the
/// class's TypeVar map bidirectionally against it (spec §4.3's "constructor bidirectional
/// inference"). A best-effort nudge, not a second binding pass: if `expected` doesn't share the
/// constructed class, the original result is returned unchanged.
pub fn adjust_constructor_result_to_expected(result: Type, expected: &Type) -> Type {
    let (Type::Object(result_class, _), Type::Object(expected_class, _)) = (&result, expected) else {
        return result;
    };
    if !std::rc::Rc::ptr_eq(&result_class.details, &expected_class.details) {
        return result;
    }
    let (Some(result_args), Some(expected_args)) = (&result_class.type_args, &expected_class.type_args) else {
        return result;
    };
    let mut map = super::generics::TypeVarMap::new();
    for (param, arg) in result_class.details.type_params.iter().zip(expected_args.iter()) {
        if result_args.iter().any(|a| a.is_unknown()) {
            map.bind_unconditional(param.clone(), arg.clone());
        }
    }
    if map.is_empty() {
        return result;
    }
    let specialized_args: Vec<Type> =
        result_class.details.type_params.iter().map(|p| substitute(&Type::TypeVar(p.clone()), &map)).collect();
    Type::Object(ClassRef::specialized(result_class.details.clone(), specialized_args), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;
    use crate::name::Name;
    use crate::types::class::{ClassDetails, ClassFlags};
    use crate::types::function::{FunctionDetails, FunctionFlags, Parameter};
    use crate::ast::ParameterKind;
    use crate::symbol::SymbolTable;
    use std::rc::Rc;

    #[test]
    fn calling_any_yields_unknown_free_pass() {
        let diag = DiagnosticSink::new();
        let outcome = call(&Type::any(), &CallArguments::new(), &diag);
        assert!(matches!(outcome, CallOutcome::Ok(_)));
    }

    #[test]
    fn calling_none_is_not_callable() {
        let diag = DiagnosticSink::new();
        let outcome = call(&Type::None, &CallArguments::new(), &diag);
        assert!(matches!(outcome, CallOutcome::NotCallable));
    }

    #[test]
    fn overload_selects_first_matching_candidate() {
        let int_param = Parameter {
            name: Name::new("x"),
            annotation: Type::None,
            has_default: false,
            kind: ParameterKind::PositionalOrKeyword,
            param_spec: None,
        };
        let str_param = Parameter {
            name: Name::new("x"),
            annotation: Type::Unknown,
            has_default: false,
            kind: ParameterKind::PositionalOrKeyword,
            param_spec: None,
        };
        let overload_a = FunctionType::new(Rc::new(FunctionDetails {
            name: Name::new("g"),
            declaration: NodeId(0),
            doc: None,
            parameters: vec![int_param],
            declared_return: Some(Type::None),
            flags: FunctionFlags::IS_OVERLOAD,
            built_in_name: None,
            is_abstract_method: false,
        }));
        let overload_b = FunctionType::new(Rc::new(FunctionDetails {
            name: Name::new("g"),
            declaration: NodeId(1),
            doc: None,
            parameters: vec![str_param],
            declared_return: Some(Type::Never),
            flags: FunctionFlags::IS_OVERLOAD,
            built_in_name: None,
            is_abstract_method: false,
        }));
        let diag = DiagnosticSink::new();
        let args = CallArguments::new().positional(Type::Unknown);
        let outcome = call_overloaded(&[overload_a, overload_b], &args, &diag);
        // `Unknown` is assignable to either parameter; the first candidate wins.
        assert!(matches!(outcome, CallOutcome::Ok(Type::None)));
    }

    #[test]
    fn constructor_without_init_falls_back_to_plain_instance() {
        let object = ClassDetails::new(Name::new("object"), NodeId(0), vec![], ClassFlags::empty(), SymbolTable::new());
        let class_ty = Type::Class(ClassRef::unspecialized(object), None);
        let diag = DiagnosticSink::new();
        let outcome = call(&class_ty, &CallArguments::new(), &diag);
        assert!(matches!(outcome, CallOutcome::Ok(Type::Object(..))));
    }

    #[test]
    fn instantiating_class_with_unimplemented_abstract_method_reports_diagnostic() {
        let abstract_method = FunctionType::new(Rc::new(FunctionDetails {
            name: Name::new("frob"),
            declaration: NodeId(0),
            doc: None,
            parameters: vec![],
            declared_return: Some(Type::None),
            flags: crate::types::function::FunctionFlags::empty(),
            built_in_name: None,
            is_abstract_method: true,
        }));
        let mut table = SymbolTable::new();
        let mut sym = crate::symbol::Symbol::new(Name::new("frob"));
        sym.flags |= crate::symbol::SymbolFlags::CLASS_MEMBER;
        sym.synthesized_type = Some(Type::Function(abstract_method));
        table.insert(sym);
        let class = ClassDetails::new(Name::new("Shape"), NodeId(1), vec![], ClassFlags::empty(), table);
        let class_ty = Type::Class(ClassRef::unspecialized(class), None);
        let diag = DiagnosticSink::new();
        let outcome = call(&class_ty, &CallArguments::new(), &diag);
        assert!(matches!(outcome, CallOutcome::Ok(Type::Object(..))));
        assert_eq!(diag.iter().len(), 1);
        assert_eq!(diag.iter()[0].rule, rules::ABSTRACT_INSTANTIATION);
    }
}
