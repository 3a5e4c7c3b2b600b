//! `canAssignType` (spec §4.4), grounded in the teacher's `Type::is_assignable_to` plus its
//! protocol/TypedDict/class-inheritance helpers split across `types/class.rs` and `types/infer.rs`.

use super::class::ClassRef;
use super::function::FunctionType;
use super::generics::{assign_to_type_var, substitute, SolveMode, TypeVarMap, Variance};
use super::Type;
use crate::diagnostic::DiagnosticSink;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AssignFlags: u8 {
        /// Compare generic arguments (and `Union`-to-`Union`) for equality rather than the
        /// usual variance/subtype rule (spec §4.4 step 5).
        const INVARIANT = 1 << 0;
        /// `src` being a `TypeVar` should be solved *against* `dst` rather than specialized away
        /// (spec §4.4 step 4's "reverse-matching flag").
        const REVERSE_TYPE_VAR_MATCHING = 1 << 1;
    }
}

/// `dst`'s numeric-tower ancestors, checked before the general inheritance walk (SPEC_FULL.md's
/// ADDED numeric-tower table: `int -> float -> complex`, plus `bool -> int`).
const NUMERIC_TOWER: &[(&str, &str)] =
    &[("bool", "int"), ("int", "float"), ("int", "complex"), ("float", "complex")];

fn numeric_tower_assignable(dst_name: &str, src_name: &str) -> bool {
    if dst_name == src_name {
        return true;
    }
    // Transitive closure over the small fixed table above.
    let mut frontier = vec![src_name];
    let mut seen = std::collections::HashSet::new();
    while let Some(name) = frontier.pop() {
        if !seen.insert(name) {
            continue;
        }
        if name == dst_name {
            return true;
        }
        for (from, to) in NUMERIC_TOWER {
            if *from == name {
                frontier.push(to);
            }
        }
    }
    false
}

/// `canAssignType(dst, src, diag, type_var_map?, flags) -> bool` (spec §4.4's eleven-step
/// algorithm). Populates `type_var_map` when `dst` is or contains a `TypeVar`; emits diagnostics
/// into `diag` on failure only when the caller isn't in a suppressed/speculative region (the
/// sink itself tracks suppression, spec §7).
pub fn can_assign(
    dst: &Type,
    src: &Type,
    diag: &DiagnosticSink,
    mut type_var_map: Option<&mut TypeVarMap>,
    flags: AssignFlags,
) -> bool {
    // Step 1: identity / Unbound.
    if matches!(src, Type::Unbound) || dst.same_type(src) {
        return true;
    }

    // Step 2: dst is TypeVar.
    if let Type::TypeVar(tv) = dst {
        return match type_var_map.as_deref_mut() {
            Some(map) => assign_to_type_var(tv, src, map, SolveMode::Widening, diag),
            None => {
                if let Some(bound) = &tv.bound {
                    can_assign(bound, src, diag, None, flags)
                } else if !tv.constraints.is_empty() {
                    tv.constraints.iter().any(|c| can_assign(c, src, diag, None, flags))
                } else {
                    true
                }
            }
        };
    }

    // Step 3: Any/Unknown absorb both ways.
    if dst.is_any_or_unknown() || src.is_any_or_unknown() {
        return true;
    }

    // Step 4: src is TypeVar.
    if let Type::TypeVar(tv) = src {
        if flags.contains(AssignFlags::REVERSE_TYPE_VAR_MATCHING) {
            return match type_var_map.as_deref_mut() {
                Some(map) => assign_to_type_var(tv, dst, map, SolveMode::Narrowing, diag),
                None => true,
            };
        }
        let concrete = tv.bound.clone().unwrap_or(Type::Unknown);
        return can_assign(dst, &concrete, diag, type_var_map, flags);
    }

    // Step 5: invariance.
    if flags.contains(AssignFlags::INVARIANT) {
        if let (Type::Union(_), Type::Union(_)) = (dst, src) {
            return dst.same_type(src);
        }
    }

    // Step 6: src is Union -> every member must match.
    if let Type::Union(members) = src {
        return members.iter().all(|m| can_assign(dst, m, diag, type_var_map.as_deref_mut(), flags));
    }

    // Step 7: dst is Union -> at least one member matches; None into Optional[T] special case
    // falls naturally out of the `any` below since `None` is itself a union member there.
    if let Type::Union(members) = dst {
        return members.iter().any(|m| can_assign(m, src, diag, type_var_map.as_deref_mut(), flags));
    }

    // Step 8: literal mismatch on dst.
    if let (Type::Object(_, Some(dst_lit)), Type::Object(_, Some(src_lit))) = (dst, src) {
        if dst_lit != src_lit {
            return false;
        }
    }

    // Step 11: dst is the built-in `object`.
    if is_builtin_object(dst) {
        return true;
    }

    match (dst, src) {
        (Type::None, Type::None) => true,
        (Type::Never, _) => false,
        (_, Type::Never) => true,

        // Step 9: class-to-class.
        (Type::Class(dst_class, _) | Type::Object(dst_class, _), Type::Class(src_class, _) | Type::Object(src_class, _)) => {
            let both_instances = dst.is_object() && src.is_object();
            if both_instances && dst_class.details.is_protocol() {
                return protocol_matches(dst_class, src_class, diag, type_var_map, flags);
            }
            if both_instances && dst_class.details.is_typed_dict() && src_class.details.is_typed_dict() {
                return typed_dict_matches(dst_class, src_class, diag);
            }
            if numeric_tower_assignable(dst_class.name(), src_class.name()) {
                return true;
            }
            class_inheritance_assignable(dst_class, src_class, diag, type_var_map, flags)
        }

        // Step 10: dst is Function.
        (Type::Function(dst_fn), Type::OverloadedFunction(overloads)) => overloads
            .iter()
            .any(|candidate| function_shape_assignable(dst_fn, candidate, diag)),
        (Type::Function(dst_fn), Type::Function(src_fn)) => {
            function_shape_assignable(dst_fn, src_fn, diag)
        }
        (Type::Function(dst_fn), Type::Class(src_class, _)) => {
            // A class object used where a callable is expected: synthesize its constructor
            // shape from `__init__`'s parameters (spec §4.4 step 10).
            match src_class.member("__init__") {
                Some(Type::Function(ctor)) => function_shape_assignable(dst_fn, &ctor, diag),
                _ => true,
            }
        }
        (Type::Function(dst_fn), Type::Object(src_class, _)) => match src_class.member("__call__") {
            Some(Type::Function(call_fn)) => function_shape_assignable(dst_fn, &call_fn, diag),
            Some(Type::OverloadedFunction(overloads)) => {
                overloads.iter().any(|f| function_shape_assignable(dst_fn, f, diag))
            }
            _ => false,
        },

        (Type::Module(a), Type::Module(b)) => std::rc::Rc::ptr_eq(&a.fields, &b.fields),

        _ => false,
    }
}

fn is_builtin_object(ty: &Type) -> bool {
    matches!(ty, Type::Object(class, _) if class.name().as_str() == "object" && class.details.bases.is_empty())
}

/// Spec §4.4.a: every non-ignored member of the destination protocol must be matched on `src`.
fn protocol_matches(
    dst_class: &ClassRef,
    src_class: &ClassRef,
    diag: &DiagnosticSink,
    mut type_var_map: Option<&mut TypeVarMap>,
    flags: AssignFlags,
) -> bool {
    let Ok(mro) = dst_class.details.mro() else { return false };
    for ancestor in mro.classes() {
        if ancestor.name().as_str() == "object" {
            continue;
        }
        let fields = ancestor.details.fields.borrow();
        for symbol in fields.iter() {
            if symbol.ignored_for_protocol_match() {
                continue;
            }
            let Some(member_ty) = symbol.synthesized_type.clone() else { continue };
            let Some(src_member) = src_class.member(symbol.name.as_str()) else { return false };
            if symbol.is_class_var() && !src_member_is_class_var(src_class, symbol.name.as_str()) {
                return false;
            }
            let specialized = if let Some(args) = &ancestor.type_args {
                let mut map = TypeVarMap::new();
                for (param, arg) in ancestor.details.type_params.iter().zip(args.iter()) {
                    map.bind_unconditional(param.clone(), arg.clone());
                }
                substitute(&member_ty, &map)
            } else {
                member_ty
            };
            if !can_assign(&specialized, &src_member, diag, type_var_map.as_deref_mut(), flags) {
                return false;
            }
        }
    }
    true
}

fn src_member_is_class_var(src_class: &ClassRef, name: &str) -> bool {
    src_class
        .details
        .fields
        .borrow()
        .get(name)
        .map(|s| s.is_class_var())
        .unwrap_or(false)
}

/// Spec §4.4.b: structural check over required+optional keys; required on `dst` must be required
/// on `src`; values compared invariantly (the platform's governing spec treats TypedDict values
/// as invariant; see DESIGN.md's Open Question resolution).
fn typed_dict_matches(dst_class: &ClassRef, src_class: &ClassRef, diag: &DiagnosticSink) -> bool {
    let dst_fields = dst_class.details.fields.borrow();
    let src_fields = src_class.details.fields.borrow();
    for name in dst_fields.names() {
        let Some(dst_symbol) = dst_fields.get(name) else { continue };
        let Some(src_symbol) = src_fields.get(name) else { return false };
        let dst_required = dst_symbol.flags.contains(crate::symbol::SymbolFlags::TYPED_DICT_REQUIRED);
        let src_required = src_symbol.flags.contains(crate::symbol::SymbolFlags::TYPED_DICT_REQUIRED);
        if dst_required && !src_required {
            return false;
        }
        let (Some(dst_ty), Some(src_ty)) =
            (&dst_symbol.synthesized_type, &src_symbol.synthesized_type)
        else {
            continue;
        };
        if !can_assign(dst_ty, src_ty, diag, None, AssignFlags::INVARIANT)
            || !can_assign(src_ty, dst_ty, diag, None, AssignFlags::INVARIANT)
        {
            return false;
        }
    }
    true
}

/// Spec §4.4.c: walk the inheritance chain from `src` up to `dst`, specializing at each hop, then
/// compare type arguments at the final hop under each parameter's declared variance.
fn class_inheritance_assignable(
    dst_class: &ClassRef,
    src_class: &ClassRef,
    diag: &DiagnosticSink,
    mut type_var_map: Option<&mut TypeVarMap>,
    flags: AssignFlags,
) -> bool {
    let Ok(mro) = src_class.details.mro() else { return false };
    let Some(hop) = mro.classes().into_iter().find(|c| std::rc::Rc::ptr_eq(&c.details, &dst_class.details)) else {
        return false;
    };

    let (Some(dst_args), Some(hop_args)) = (&dst_class.type_args, &hop.type_args) else {
        return true;
    };
    if dst_args.len() != hop_args.len() {
        return false;
    }
    for (i, (dst_arg, hop_arg)) in dst_args.iter().zip(hop_args.iter()).enumerate() {
        let variance = dst_class
            .details
            .type_params
            .get(i)
            .map(|p| p.variance)
            .unwrap_or(Variance::Invariant);
        let ok = match variance {
            Variance::Covariant => can_assign(dst_arg, hop_arg, diag, type_var_map.as_deref_mut(), flags),
            Variance::Contravariant => can_assign(hop_arg, dst_arg, diag, type_var_map.as_deref_mut(), flags),
            Variance::Invariant => {
                can_assign(dst_arg, hop_arg, diag, type_var_map.as_deref_mut(), flags | AssignFlags::INVARIANT)
                    && can_assign(hop_arg, dst_arg, diag, type_var_map.as_deref_mut(), flags | AssignFlags::INVARIANT)
            }
        };
        if !ok {
            return false;
        }
    }
    true
}

/// Spec §4.4.d: positional parameters matched by index (contravariant), named-only by name,
/// required-count check, return type compared covariantly.
pub fn function_shape_assignable(dst: &FunctionType, src: &FunctionType, diag: &DiagnosticSink) -> bool {
    let dst_params = dst.visible_parameters();
    let src_params = src.visible_parameters();

    let dst_positional: Vec<_> = dst_params.iter().filter(|p| p.is_positional()).collect();
    let src_positional: Vec<_> = src_params.iter().filter(|p| p.is_positional()).collect();
    let src_has_vararg = src_params.iter().any(|p| p.is_vararg());

    if dst_positional.len() > src_positional.len() && !src_has_vararg {
        return false;
    }
    for (dst_param, src_param) in dst_positional.iter().zip(src_positional.iter()) {
        if !can_assign(&src_param.annotation, &dst_param.annotation, diag, None, AssignFlags::empty()) {
            return false;
        }
    }

    let dst_required_positional = dst_positional.iter().filter(|p| !p.has_default).count();
    let src_required_positional = src_positional.iter().filter(|p| !p.has_default).count();
    if src_required_positional > dst_positional.len() {
        return false;
    }
    let _ = dst_required_positional;

    for dst_param in dst_params.iter().filter(|p| p.is_keyword() && !p.is_positional()) {
        match src_params.iter().find(|p| p.name == dst_param.name) {
            Some(src_param) => {
                if !can_assign(&src_param.annotation, &dst_param.annotation, diag, None, AssignFlags::empty()) {
                    return false;
                }
            }
            None => {
                if !src_params.iter().any(|p| p.is_kwvararg()) {
                    return false;
                }
            }
        }
    }

    can_assign(&dst.return_type(), &src.return_type(), diag, None, AssignFlags::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;
    use crate::name::Name;
    use crate::symbol::SymbolTable;
    use crate::types::class::{ClassDetails, ClassFlags};
    use std::rc::Rc;

    fn class(name: &str, bases: Vec<Type>) -> Rc<ClassDetails> {
        ClassDetails::new(Name::new(name), NodeId(0), bases, ClassFlags::empty(), SymbolTable::new())
    }

    #[test]
    fn any_absorbs_both_ways() {
        let diag = DiagnosticSink::new();
        assert!(can_assign(&Type::any(), &Type::None, &diag, None, AssignFlags::empty()));
        assert!(can_assign(&Type::None, &Type::any(), &diag, None, AssignFlags::empty()));
    }

    #[test]
    fn union_dst_matches_any_member() {
        let diag = DiagnosticSink::new();
        let dst = super::super::union_of([Type::None, Type::Unknown]);
        assert!(can_assign(&dst, &Type::None, &diag, None, AssignFlags::empty()));
    }

    #[test]
    fn union_src_requires_every_member_match() {
        let diag = DiagnosticSink::new();
        let src = super::super::union_of([Type::None, Type::Never]);
        assert!(can_assign(&Type::None, &src, &diag, None, AssignFlags::empty()));
    }

    #[test]
    fn numeric_tower_allows_int_into_float() {
        let diag = DiagnosticSink::new();
        let object = class("object", vec![]);
        let object_ty = Type::Class(ClassRef::unspecialized(object), None);
        let int_class = class("int", vec![object_ty.clone()]);
        let float_class = class("float", vec![object_ty]);
        let int_ty = Type::Object(ClassRef::unspecialized(int_class), None);
        let float_ty = Type::Object(ClassRef::unspecialized(float_class), None);
        assert!(can_assign(&float_ty, &int_ty, &diag, None, AssignFlags::empty()));
        assert!(!can_assign(&int_ty, &float_ty, &diag, None, AssignFlags::empty()));
    }

    #[test]
    fn subclass_assignable_to_base() {
        let diag = DiagnosticSink::new();
        let object = class("object", vec![]);
        let object_ty = Type::Class(ClassRef::unspecialized(object), None);
        let base = class("Base", vec![object_ty]);
        let base_ty = Type::Class(ClassRef::unspecialized(base.clone()), None);
        let derived = class("Derived", vec![base_ty]);
        let base_instance = Type::Object(ClassRef::unspecialized(base), None);
        let derived_instance = Type::Object(ClassRef::unspecialized(derived), None);
        assert!(can_assign(&base_instance, &derived_instance, &diag, None, AssignFlags::empty()));
        assert!(!can_assign(&derived_instance, &base_instance, &diag, None, AssignFlags::empty()));
    }
}
