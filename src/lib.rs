//! The type evaluator core of a gradually-typed, Python-family static type checker.
//!
//! This crate is the engine, not the application: it owns the algebraic type model, the
//! expression evaluator, the class/function builder, the call and overload resolver, the
//! assignability engine, the `TypeVar` constraint solver, the code-flow narrower, the
//! dataclass/`TypedDict`/`NamedTuple`/`Enum` synthesis pipeline, the multi-tier cache, and symbol
//! resolution.
//!
//! What it does *not* own — the parser, the binder/scope builder, the import resolver, the
//! diagnostic sink's eventual destination, and any command protocol or CLI surface — are external
//! collaborators whose contracts are defined at the module boundaries below ([`ast`], [`scope`],
//! [`module`], [`diagnostic`]). An embedding application supplies real implementations of those
//! contracts and drives the evaluator through [`evaluator::Evaluator`]'s entry points.
//!
//! ```no_run
//! use ty_core::evaluator::{Evaluator, EvaluatorOptions};
//! use ty_core::module::InMemoryImportTable;
//!
//! let imports = InMemoryImportTable::new();
//! let evaluator = Evaluator::new(&imports, EvaluatorOptions::default());
//! // evaluator.get_type(&some_expr)?;
//! ```

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod cancellation;
pub mod diagnostic;
pub mod error;
pub mod evaluator;
pub mod module;
pub mod name;
pub mod scope;
pub mod symbol;
pub mod types;

pub use cancellation::{CancellationToken, Cancelled};
pub use diagnostic::{Diagnostic, DiagnosticSink, Severity};
pub use error::InternalError;
pub use evaluator::{Evaluator, EvaluatorOptions, Flags};
pub use name::Name;
pub use types::Type;
