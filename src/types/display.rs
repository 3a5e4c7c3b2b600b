//! `printType`/`printFunctionParts` (spec §6), grounded in the teacher's `types/display.rs`.

use super::class::ClassRef;
use super::function::FunctionType;
use super::Type;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PrintFlags: u8 {
        /// Render `Unknown` the same as `Any` (spec §6: user-facing output collapses the
        /// diagnostic-only distinction).
        const PRINT_UNKNOWN_WITH_ANY = 1 << 0;
        /// Omit `[Unknown, ...]` type arguments when every one of them is `Unknown`.
        const OMIT_TYPE_ARGUMENTS_IF_ANY = 1 << 1;
        /// Render `X | Y` (PEP 604) instead of `Union[X, Y]`.
        const PEP604 = 1 << 2;
    }
}

/// Renders `ty` for diagnostics/hover, honoring `flags` (spec §6's `printType`).
pub fn print_type(ty: &Type, flags: PrintFlags) -> String {
    match ty {
        Type::Unbound => "Unbound".to_string(),
        Type::Unknown => {
            if flags.contains(PrintFlags::PRINT_UNKNOWN_WITH_ANY) {
                "Any".to_string()
            } else {
                "Unknown".to_string()
            }
        }
        Type::Any { is_ellipsis } => {
            if *is_ellipsis {
                "...".to_string()
            } else {
                "Any".to_string()
            }
        }
        Type::None => "None".to_string(),
        Type::Never => "Never".to_string(),
        Type::Class(class, literal) => match literal {
            Some(lit) => format!("type[Literal[{lit}]]"),
            None => format!("type[{}]", print_class_ref(class, flags)),
        },
        Type::Object(class, literal) => match literal {
            Some(lit) => format!("Literal[{lit}]"),
            None => print_class_ref(class, flags),
        },
        Type::Function(f) => print_function(f, flags),
        Type::OverloadedFunction(overloads) => {
            let parts: Vec<_> = overloads.iter().map(|f| print_function(f, flags)).collect();
            format!("Overload[{}]", parts.join(", "))
        }
        Type::Module(_) => "Module".to_string(),
        Type::Union(members) => print_union(members, flags),
        Type::TypeVar(tv) => tv.name.to_string(),
    }
}

fn print_class_ref(class: &ClassRef, flags: PrintFlags) -> String {
    let Some(args) = &class.type_args else {
        return class.name().to_string();
    };
    if args.is_empty() {
        return class.name().to_string();
    }
    if flags.contains(PrintFlags::OMIT_TYPE_ARGUMENTS_IF_ANY) && args.iter().all(Type::is_unknown) {
        return class.name().to_string();
    }
    let rendered: Vec<_> = args.iter().map(|a| print_type(a, flags)).collect();
    format!("{}[{}]", class.name(), rendered.join(", "))
}

fn print_union(members: &[Type], flags: PrintFlags) -> String {
    let rendered: Vec<_> = members.iter().map(|m| print_type(m, flags)).collect();
    if flags.contains(PrintFlags::PEP604) {
        rendered.join(" | ")
    } else {
        format!("Union[{}]", rendered.join(", "))
    }
}

/// Spec §6's `printFunctionParts`: `(params) -> returnType`, each parameter rendered with its
/// binder-assigned marker (`*`/`**`/nothing) and `= ...` for ones with a default.
pub fn print_function(f: &FunctionType, flags: PrintFlags) -> String {
    let params: Vec<String> = f
        .visible_parameters()
        .iter()
        .map(|p| {
            let marker = match p.kind {
                crate::ast::ParameterKind::Vararg => "*",
                crate::ast::ParameterKind::KwVararg => "**",
                _ => "",
            };
            let default = if p.has_default { " = ..." } else { "" };
            format!("{marker}{}: {}{default}", p.name, print_type(&p.annotation, flags))
        })
        .collect();
    format!("({}) -> {}", params.join(", "), print_type(&f.return_type(), flags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_prints_as_any_when_flagged() {
        assert_eq!(print_type(&Type::Unknown, PrintFlags::empty()), "Unknown");
        assert_eq!(print_type(&Type::Unknown, PrintFlags::PRINT_UNKNOWN_WITH_ANY), "Any");
    }

    #[test]
    fn union_renders_pep604_when_flagged() {
        let ty = super::super::union_of([Type::None, Type::Unknown]);
        let rendered = print_type(&ty, PrintFlags::PEP604);
        assert!(rendered.contains('|'));
        let rendered = print_type(&ty, PrintFlags::empty());
        assert!(rendered.starts_with("Union["));
    }

    #[test]
    fn ellipsis_any_prints_as_dots() {
        assert_eq!(print_type(&Type::ellipsis_any(), PrintFlags::empty()), "...");
    }
}
