//! Argument binding: matching a call's positional/keyword arguments against a parameter list.

use super::arguments::{Argument, CallArguments};
use crate::ast::ParameterKind;
use crate::diagnostic::{rules, DiagnosticSink};
use crate::name::Name;
use crate::types::assignability::{can_assign, AssignFlags};
use crate::types::function::{FunctionType, Parameter};
use crate::types::generics::{substitute, TypeVarMap};
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    MissingArgument(Name),
    TooManyPositionalArguments,
    UnknownArgument(Name),
    ParameterAlreadyAssigned(Name),
    /// A positional argument's type didn't match its parameter's declared type.
    ArgumentTypeMismatch { parameter: Name },
}

impl CallError {
    pub fn rule(&self) -> &'static str {
        match self {
            CallError::MissingArgument(_) => rules::MISSING_ARGUMENT,
            CallError::TooManyPositionalArguments => rules::TOO_MANY_POSITIONAL_ARGUMENTS,
            CallError::UnknownArgument(_) => rules::UNKNOWN_ARGUMENT,
            CallError::ParameterAlreadyAssigned(_) => rules::PARAMETER_ALREADY_ASSIGNED,
            CallError::ArgumentTypeMismatch { .. } => rules::INVALID_ASSIGNMENT,
        }
    }
}

/// Segments `parameters` at the positional-only boundary, the keyword-only boundary, and any
/// `*args`/`**kwargs` boundary markers.
struct ParameterShape<'p> {
    positional: Vec<&'p Parameter>,
    vararg: Option<&'p Parameter>,
    keyword_only: Vec<&'p Parameter>,
    kwvararg: Option<&'p Parameter>,
}

fn shape(parameters: &[Parameter]) -> ParameterShape<'_> {
    let mut positional = Vec::new();
    let mut vararg = None;
    let mut keyword_only = Vec::new();
    let mut kwvararg = None;
    for p in parameters {
        match p.kind {
            ParameterKind::PositionalOnly | ParameterKind::PositionalOrKeyword => positional.push(p),
            ParameterKind::Vararg => vararg = Some(p),
            ParameterKind::KeywordOnly => keyword_only.push(p),
            ParameterKind::KwVararg => kwvararg = Some(p),
        }
    }
    ParameterShape { positional, vararg, keyword_only, kwvararg }
}

/// One binding attempt: matches `args` against `parameters`, populating `map` with any TypeVar
/// assignments along the way, and type-checks each matched argument against its parameter's
/// (possibly still-TypeVar-containing) annotation.
///
/// Returns every error found rather than stopping at the first one, so the caller can report all
/// binding errors for a single diagnostic.
pub fn bind_arguments(
    parameters: &[Parameter],
    args: &CallArguments,
    diag: &DiagnosticSink,
    map: &mut TypeVarMap,
) -> Vec<CallError> {
    let mut errors = Vec::new();
    let shape = shape(parameters);
    let mut assigned: Vec<bool> = vec![false; shape.positional.len()];
    let mut keyword_assigned: Vec<bool> = vec![false; shape.keyword_only.len()];
    let mut next_positional = 0usize;

    for arg in &args.arguments {
        match arg {
            Argument::Positional(ty) | Argument::UnpackedIterable(ty) => {
                if next_positional < shape.positional.len() {
                    let param = shape.positional[next_positional];
                    assigned[next_positional] = true;
                    check_argument(param, ty, diag, map, &mut errors);
                    next_positional += 1;
                } else if let Some(vararg) = shape.vararg {
                    check_argument(vararg, ty, diag, map, &mut errors);
                } else {
                    errors.push(CallError::TooManyPositionalArguments);
                }
            }
            Argument::Keyword(name, ty) => {
                bind_keyword(name, ty, &shape, &mut assigned, &mut keyword_assigned, diag, map, &mut errors);
            }
            Argument::UnpackedMapping(ty) => {
                // Without statically-known keys, a `**mapping` is absorbed by `**kwargs` (or
                // accepted loosely against every remaining keyword-only parameter) rather than
                // rejected outright.
                if let Some(kwvararg) = shape.kwvararg {
                    check_argument(kwvararg, ty, diag, map, &mut errors);
                }
            }
        }
    }

    for (i, param) in shape.positional.iter().enumerate() {
        if !assigned[i] && !param.has_default {
            errors.push(CallError::MissingArgument(param.name.clone()));
        }
    }
    for (i, param) in shape.keyword_only.iter().enumerate() {
        if !keyword_assigned[i] && !param.has_default {
            errors.push(CallError::MissingArgument(param.name.clone()));
        }
    }

    errors
}

fn bind_keyword(
    name: &Name,
    ty: &Type,
    shape: &ParameterShape<'_>,
    assigned: &mut [bool],
    keyword_assigned: &mut [bool],
    diag: &DiagnosticSink,
    map: &mut TypeVarMap,
    errors: &mut Vec<CallError>,
) {
    if let Some(i) = shape.positional.iter().position(|p| p.kind == ParameterKind::PositionalOrKeyword && &p.name == name) {
        if assigned[i] {
            errors.push(CallError::ParameterAlreadyAssigned(name.clone()));
            return;
        }
        assigned[i] = true;
        check_argument(shape.positional[i], ty, diag, map, errors);
        return;
    }
    if let Some(i) = shape.keyword_only.iter().position(|p| &p.name == name) {
        if keyword_assigned[i] {
            errors.push(CallError::ParameterAlreadyAssigned(name.clone()));
            return;
        }
        keyword_assigned[i] = true;
        check_argument(shape.keyword_only[i], ty, diag, map, errors);
        return;
    }
    if let Some(kwvararg) = shape.kwvararg {
        check_argument(kwvararg, ty, diag, map, errors);
        return;
    }
    errors.push(CallError::UnknownArgument(name.clone()));
}

fn check_argument(
    param: &Parameter,
    arg_ty: &Type,
    diag: &DiagnosticSink,
    map: &mut TypeVarMap,
    errors: &mut Vec<CallError>,
) {
    if !can_assign(&param.annotation, arg_ty, diag, Some(map), AssignFlags::empty()) {
        errors.push(CallError::ArgumentTypeMismatch { parameter: param.name.clone() });
    }
}

/// Spec §4.3's two-speculative-pass TypeVar matching structure: up to two passes accumulate
/// TypeVar assignments (later arguments can refine earlier ones), then the map is locked and
/// arguments are re-validated against the now-concrete parameter types, and finally the return
/// type is specialized through the locked map.
pub fn bind_call_with_inference(
    function: &FunctionType,
    args: &CallArguments,
    diag: &DiagnosticSink,
) -> Result<Type, Vec<CallError>> {
    let parameters = function.visible_parameters();
    let needs_type_var_pass = parameters.iter().any(|p| matches!(p.annotation, Type::TypeVar(_)));

    let mut map = TypeVarMap::new();
    if needs_type_var_pass {
        for _ in 0..2 {
            let sink = DiagnosticSink::new();
            let _suppressed = sink.suppress();
            bind_arguments(parameters, args, &sink, &mut map);
        }
    }
    map.lock();

    let errors = bind_arguments(parameters, args, diag, &mut map);
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(substitute(&function.return_type(), &map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;
    use crate::name::Name;
    use crate::types::function::{FunctionDetails, FunctionFlags};
    use std::rc::Rc;

    fn param(name: &str, annotation: Type, has_default: bool) -> Parameter {
        Parameter {
            name: Name::new(name),
            annotation,
            has_default,
            kind: ParameterKind::PositionalOrKeyword,
            param_spec: None,
        }
    }

    fn function(parameters: Vec<Parameter>, declared_return: Option<Type>) -> FunctionType {
        FunctionType::new(Rc::new(FunctionDetails {
            name: Name::new("f"),
            declaration: NodeId(0),
            doc: None,
            parameters,
            declared_return,
            flags: FunctionFlags::empty(),
            built_in_name: None,
            is_abstract_method: false,
        }))
    }

    #[test]
    fn missing_required_argument_is_reported() {
        let f = function(vec![param("x", Type::Unknown, false)], None);
        let diag = DiagnosticSink::new();
        let result = bind_call_with_inference(&f, &CallArguments::new(), &diag);
        assert!(matches!(result, Err(errs) if matches!(&errs[0], CallError::MissingArgument(n) if n.as_str() == "x")));
    }

    #[test]
    fn default_parameter_is_optional() {
        let f = function(vec![param("x", Type::Unknown, true)], None);
        let diag = DiagnosticSink::new();
        let result = bind_call_with_inference(&f, &CallArguments::new(), &diag);
        assert!(result.is_ok());
    }

    #[test]
    fn unknown_keyword_without_kwargs_sink_errors() {
        let f = function(vec![], None);
        let diag = DiagnosticSink::new();
        let args = CallArguments::new().keyword(Name::new("y"), Type::Unknown);
        let result = bind_call_with_inference(&f, &args, &diag);
        assert!(matches!(result, Err(errs) if matches!(&errs[0], CallError::UnknownArgument(n) if n.as_str() == "y")));
    }
}
