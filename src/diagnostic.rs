//! The diagnostic sink (spec §6, §7).
//!
//! A driver embedding this core gets back a [`DiagnosticSink`] full of [`Diagnostic`]s after
//! calling any evaluator entry point; this module does not format, persist, or filter by
//! configuration — that's the surrounding application's job (spec §1's "diagnostic sink" external
//! collaborator note describes the final destination; this struct is the in-core accumulator that
//! feeds it).

use crate::ast::TextRange;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

/// One of two channels a message can land on (spec §7.3): ordinary diagnostics, or the "unused
/// code" channel used for unreachable-code reporting, whose range is deliberately widened to
/// cover the whole unreachable region rather than just the offending node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Diagnostics,
    UnusedCode,
}

/// A suggested fix action (spec §1: "only *suggestion* of fixes"). Never applied by this core.
#[derive(Debug, Clone)]
pub struct ActionPayload {
    pub title: String,
    pub insertion_offset: u32,
    pub replacement: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: &'static str,
    pub severity: Severity,
    pub message: String,
    pub range: TextRange,
    pub channel: Channel,
    pub action: Option<ActionPayload>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} [{}]: {}", self.severity, self.range, self.rule, self.message)
    }
}

/// Well-known rule tags, grouped roughly as the teacher groups its lint registry. Not every rule
/// a full implementation would need is named here — only the ones this core's modules actually
/// raise.
pub mod rules {
    /// A value of an incompatible type was assigned to a name, parameter, or attribute with a
    /// narrower declared type.
    pub const INVALID_ASSIGNMENT: &str = "invalid-assignment";
    pub const UNRESOLVED_REFERENCE: &str = "unresolved-reference";
    pub const POSSIBLY_UNBOUND_REFERENCE: &str = "possibly-unbound-reference";
    pub const UNRESOLVED_ATTRIBUTE: &str = "unresolved-attribute";
    pub const CALL_NON_CALLABLE: &str = "call-non-callable";
    pub const NO_MATCHING_OVERLOAD: &str = "no-matching-overload";
    pub const MISSING_ARGUMENT: &str = "missing-argument";
    pub const TOO_MANY_POSITIONAL_ARGUMENTS: &str = "too-many-positional-arguments";
    pub const UNKNOWN_ARGUMENT: &str = "unknown-argument";
    pub const PARAMETER_ALREADY_ASSIGNED: &str = "parameter-already-assigned";
    pub const UNSUPPORTED_OPERATOR: &str = "unsupported-operator";
    pub const INCONSISTENT_MRO: &str = "inconsistent-mro";
    pub const INVALID_BASE: &str = "invalid-base";
    pub const ABSTRACT_INSTANTIATION: &str = "abstract-instantiation";
    pub const INVALID_TYPE_VARIABLE_CONSTRAINTS: &str = "invalid-typevar-constraints";
    pub const INVALID_OVERRIDE: &str = "invalid-override";
    pub const UNKNOWN_DECORATOR: &str = "unknown-decorator";
    pub const NON_SUBSCRIPTABLE: &str = "non-subscriptable";
    pub const REVEAL_TYPE: &str = "reveal-type";
    pub const UNREACHABLE: &str = "unreachable";
    pub const PARTIALLY_UNKNOWN_TYPE: &str = "partially-unknown-type";
    pub const INTERNAL_ERROR: &str = "internal-error";
    pub const NOT_ITERABLE: &str = "not-iterable";
    pub const INVALID_DELETE_TARGET: &str = "invalid-delete-target";
}

/// Accumulates diagnostics produced while evaluating one region (spec §6's "addDiagnosticWithTextRange").
///
/// Mirrors the teacher's `InferContext`: diagnostics are appended behind a `RefCell` so they can
/// be reported from `&self` methods deep in the recursive evaluator, and suppression is a simple
/// depth counter rather than a boolean, so nested suppressed contexts compose correctly.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: std::cell::RefCell<Vec<Diagnostic>>,
    suppression_depth: std::cell::Cell<u32>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppression_depth.get() > 0
    }

    /// Enter a suppressed region (overload probing, contextual return-type inference, speculative
    /// narrowing sub-evaluation, default-value re-checks — spec §7's four suppression contexts).
    /// The returned guard restores the previous depth on drop, even on early `?`-return.
    pub fn suppress(&self) -> SuppressionGuard<'_> {
        self.suppression_depth.set(self.suppression_depth.get() + 1);
        SuppressionGuard { sink: self }
    }

    fn push(&self, diagnostic: Diagnostic) {
        if self.is_suppressed() {
            return;
        }
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    pub fn error(&self, rule: &'static str, range: TextRange, message: impl Into<String>) {
        self.push(Diagnostic {
            rule,
            severity: Severity::Error,
            message: message.into(),
            range,
            channel: Channel::Diagnostics,
            action: None,
        });
    }

    pub fn warning(&self, rule: &'static str, range: TextRange, message: impl Into<String>) {
        self.push(Diagnostic {
            rule,
            severity: Severity::Warning,
            message: message.into(),
            range,
            channel: Channel::Diagnostics,
            action: None,
        });
    }

    pub fn information(&self, rule: &'static str, range: TextRange, message: impl Into<String>) {
        self.push(Diagnostic {
            rule,
            severity: Severity::Information,
            message: message.into(),
            range,
            channel: Channel::Diagnostics,
            action: None,
        });
    }

    pub fn unreachable_code(&self, range: TextRange, message: impl Into<String>) {
        self.push(Diagnostic {
            rule: rules::UNREACHABLE,
            severity: Severity::Information,
            message: message.into(),
            range,
            channel: Channel::UnusedCode,
            action: None,
        });
    }

    pub fn with_action(
        &self,
        rule: &'static str,
        severity: Severity,
        range: TextRange,
        message: impl Into<String>,
        action: ActionPayload,
    ) {
        self.push(Diagnostic {
            rule,
            severity,
            message: message.into(),
            range,
            channel: Channel::Diagnostics,
            action: Some(action),
        });
    }

    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics.borrow_mut())
    }

    pub fn iter(&self) -> std::cell::Ref<'_, Vec<Diagnostic>> {
        self.diagnostics.borrow()
    }
}

#[must_use]
pub struct SuppressionGuard<'a> {
    sink: &'a DiagnosticSink,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        let depth = self.sink.suppression_depth.get();
        debug_assert!(depth > 0);
        self.sink.suppression_depth.set(depth - 1);
    }
}
